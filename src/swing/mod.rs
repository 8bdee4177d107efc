pub mod geometry;
pub mod live;
pub mod phase;
pub mod rules;

pub use geometry::{angle, displacement, round_to};
pub use live::{LiveAssessment, LiveSession};
pub use phase::{Phase, PhaseRecord, PhaseSegmenter};
pub use rules::{FeedbackItem, RuleEvaluator, Severity};
