pub mod coaching;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod pose;
pub mod protocol;
pub mod swing;

pub use error::AnalysisError;
