use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::phase::{PhaseRecord, PhaseSegmenter};
use super::rules::{FeedbackItem, RuleEvaluator};
use crate::config::{Config, LiveConfig, MissingJointPolicy};
use crate::error::AnalysisError;
use crate::pose::PoseFrame;

/// ライブ評価の結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveAssessment {
    pub frames_used: usize,
    pub phases: Vec<PhaseRecord>,
    pub feedback: Vec<FeedbackItem>,
}

/// 直近フレームのスライディングウィンドウ
///
/// 呼び出し側が所有する（接続ごとに1つ）。プロセス共有のインスタンスは作らない。
pub struct LiveSession {
    buffer_size: usize,
    min_frames: usize,
    frames: VecDeque<PoseFrame>,
    segmenter: PhaseSegmenter,
    evaluator: RuleEvaluator,
}

impl LiveSession {
    pub fn new(live: &LiveConfig, segmenter: PhaseSegmenter, evaluator: RuleEvaluator) -> Self {
        let buffer_size = live.buffer_size.max(1);
        Self {
            buffer_size,
            min_frames: live.min_frames.clamp(1, buffer_size),
            frames: VecDeque::with_capacity(buffer_size),
            segmenter,
            evaluator,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.live,
            PhaseSegmenter::new(config.segmenter.clone()),
            RuleEvaluator::new(config.rules.clone()),
        )
    }

    /// フレームを追加。buffer_size を超えたら古いものから捨てる
    ///
    /// `abort` ポリシーでは必須関節の欠けたフレームを受け付けない。
    /// 拒否したフレームはウィンドウに入らない。
    pub fn push(&mut self, frame: PoseFrame) -> Result<(), AnalysisError> {
        if self.segmenter.thresholds().missing_joints == MissingJointPolicy::Abort {
            frame.arm_joints().resolve(&frame.frame_id)?;
        }
        if self.frames.len() == self.buffer_size {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.frames.len() >= self.min_frames
    }

    /// 現在のウィンドウを評価。min_frames 未満なら None
    pub fn assess(&self) -> Result<Option<LiveAssessment>, AnalysisError> {
        if !self.is_ready() {
            return Ok(None);
        }
        let window: Vec<PoseFrame> = self.frames.iter().cloned().collect();
        let phases = self.segmenter.segment(&window)?;
        let feedback = self.evaluator.evaluate(&phases);
        Ok(Some(LiveAssessment {
            frames_used: window.len(),
            phases,
            feedback,
        }))
    }

    pub fn reset(&mut self) {
        self.frames.clear();
    }
}
