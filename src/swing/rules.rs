use serde::{Deserialize, Serialize};

use super::phase::{Phase, PhaseRecord};
use crate::config::RuleThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

/// 診断結果1件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub code: String,
    pub issue: String,
    pub severity: Severity,
    pub tip: String,
}

impl FeedbackItem {
    fn new(code: &str, issue: &str, severity: Severity, tip: &str) -> Self {
        Self {
            code: code.to_string(),
            issue: issue.to_string(),
            severity,
            tip: tip.to_string(),
        }
    }

    /// "FH01: Arm too bent at peak"
    pub fn summary(&self) -> String {
        format!("{}: {}", self.code, self.issue)
    }
}

/// シャドー・ドライブ・フォアハンドのルール評価
///
/// ルールは上から順に評価し、最初に成立したものだけを返す。
/// どれも成立しなければ FH99。
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluator {
    thresholds: RuleThresholds,
}

impl RuleEvaluator {
    pub fn new(thresholds: RuleThresholds) -> Self {
        Self { thresholds }
    }

    /// 常にちょうど1件の FeedbackItem を返す
    pub fn evaluate(&self, phases: &[PhaseRecord]) -> Vec<FeedbackItem> {
        vec![self.verdict(phases)]
    }

    fn verdict(&self, phases: &[PhaseRecord]) -> FeedbackItem {
        // FH00: コンタクトなし
        let Some(contact) = in_phase(phases, Phase::Contact).next() else {
            return FeedbackItem::new(
                "FH00",
                "No swing peak detected",
                Severity::High,
                "Make a full forward swing with clear acceleration.",
            );
        };

        // FH01: 最初のコンタクトで肘が伸びていない
        if contact.elbow_angle < self.thresholds.min_contact_angle {
            return FeedbackItem::new(
                "FH01",
                "Arm too bent at peak",
                Severity::High,
                "Extend your hitting arm more during the swing.",
            );
        }

        // FH02 / FH03: フェーズの欠落
        if in_phase(phases, Phase::Backswing).next().is_none() {
            return FeedbackItem::new(
                "FH02",
                "No backswing detected",
                Severity::Medium,
                "Turn your shoulder and load your arm before swinging forward.",
            );
        }

        if in_phase(phases, Phase::FollowThrough).next().is_none() {
            return FeedbackItem::new(
                "FH03",
                "No follow-through",
                Severity::Medium,
                "Allow your swing to continue after the peak.",
            );
        }

        // FH04: バックスイングより速く振り出せていない
        let max_back_vel = in_phase(phases, Phase::Backswing)
            .map(|r| r.wrist_velocity)
            .reduce(f64::min)
            .unwrap_or(0.0);

        if contact.wrist_velocity <= max_back_vel.abs() {
            return FeedbackItem::new(
                "FH04",
                "Low acceleration through swing",
                Severity::Medium,
                "Accelerate your paddle more as you swing forward.",
            );
        }

        // FH05: フォロースルーが途切れる
        let positive_follow = in_phase(phases, Phase::FollowThrough)
            .filter(|r| r.wrist_velocity > 0.0)
            .count();

        if positive_follow < self.thresholds.min_follow_through_frames {
            return FeedbackItem::new(
                "FH05",
                "Short follow-through",
                Severity::Low,
                "Let your swing finish smoothly instead of stopping early.",
            );
        }

        FeedbackItem::new(
            "FH99",
            "Good shadow drive forehand",
            Severity::None,
            "Nice swing! Your arm extension and acceleration look solid.",
        )
    }
}

fn in_phase(phases: &[PhaseRecord], phase: Phase) -> impl Iterator<Item = &PhaseRecord> {
    phases.iter().filter(move |r| r.phase == phase)
}
