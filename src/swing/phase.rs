use serde::{Deserialize, Serialize};

use super::geometry::{angle, displacement, round_to};
use crate::config::{MissingJointPolicy, PhaseThresholds};
use crate::error::AnalysisError;
use crate::pose::PoseFrame;

/// スイングのフェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Ready,
    Backswing,
    Contact,
    FollowThrough,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Backswing => "BACKSWING",
            Self::Contact => "CONTACT",
            Self::FollowThrough => "FOLLOW_THROUGH",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1フレーム分の判定結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    #[serde(rename = "frame")]
    pub frame_id: String,
    pub phase: Phase,
    /// 肘角度（度、小数1桁）
    pub elbow_angle: f64,
    /// 手首の水平速度（正規化幅/フレーム、小数4桁）
    pub wrist_velocity: f64,
}

/// 手首速度と肘角度によるフェーズ分割
///
/// 呼び出し間で状態を持たない。前フレームの手首位置は1回の走査の中だけで使う。
#[derive(Debug, Clone, Default)]
pub struct PhaseSegmenter {
    thresholds: PhaseThresholds,
}

impl PhaseSegmenter {
    pub fn new(thresholds: PhaseThresholds) -> Self {
        Self { thresholds }
    }

    /// ライブ入力の事前チェックでポリシーを参照する
    pub fn thresholds(&self) -> &PhaseThresholds {
        &self.thresholds
    }

    /// 信号からフェーズを決める。上から順に最初に一致したものを採用
    pub fn classify(&self, elbow_angle: f64, wrist_velocity: f64) -> Phase {
        let t = &self.thresholds;
        if wrist_velocity.abs() < t.ready_velocity {
            Phase::Ready
        } else if wrist_velocity < -t.backswing_velocity {
            Phase::Backswing
        } else if elbow_angle > t.contact_angle && wrist_velocity.abs() > t.contact_velocity {
            Phase::Contact
        } else {
            Phase::FollowThrough
        }
    }

    /// フレーム列をフェーズ列に変換
    ///
    /// 出力順は入力順。必須関節の欠けたフレームは `missing_joints` ポリシーに従う。
    pub fn segment(&self, frames: &[PoseFrame]) -> Result<Vec<PhaseRecord>, AnalysisError> {
        let mut records = Vec::with_capacity(frames.len());
        let mut prev_wrist_x: Option<f64> = None;

        for frame in frames {
            let joints = frame.arm_joints();

            let (elbow_angle, wrist_x) = match joints.resolve(&frame.frame_id) {
                Ok(arm) => (
                    angle(arm.shoulder.xy(), arm.elbow.xy(), arm.wrist.xy()),
                    Some(arm.wrist.x),
                ),
                Err(err) => match self.thresholds.missing_joints {
                    MissingJointPolicy::Abort => return Err(err),
                    MissingJointPolicy::Skip => continue,
                    MissingJointPolicy::Sentinel => {
                        let elbow_angle = match (joints.shoulder, joints.elbow, joints.wrist) {
                            (Some(s), Some(e), Some(w)) => angle(s.xy(), e.xy(), w.xy()),
                            _ => 0.0,
                        };
                        (elbow_angle, joints.wrist.map(|w| w.x))
                    }
                },
            };

            let wrist_velocity = match wrist_x {
                Some(x) => displacement(prev_wrist_x, x),
                None => 0.0,
            };
            let phase = self.classify(elbow_angle, wrist_velocity);

            records.push(PhaseRecord {
                frame_id: frame.frame_id.clone(),
                phase,
                elbow_angle: round_to(elbow_angle, 1),
                wrist_velocity: round_to(wrist_velocity, 4),
            });

            if let Some(x) = wrist_x {
                prev_wrist_x = Some(x);
            }
        }

        Ok(records)
    }
}
