use thiserror::Error;

use crate::pose::LandmarkName;

/// 解析パイプラインの型付きエラー
///
/// 「スイングなし」「コンタクトなし」などはエラーではなく FeedbackItem で返す。
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("frame {frame_id}: insufficient landmarks, missing {}", format_missing(.missing))]
    InsufficientLandmarks {
        frame_id: String,
        missing: Vec<LandmarkName>,
    },

    #[error("duplicate frame id: {0}")]
    DuplicateFrame(String),

    #[error("invalid landmark: {0}")]
    InvalidLandmark(String),

    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("feedback not found for session {0}, run analysis first")]
    FeedbackNotFound(String),
}

fn format_missing(missing: &[LandmarkName]) -> String {
    missing
        .iter()
        .map(|name| name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
