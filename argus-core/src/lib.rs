//! argus-core: shared data model for the Argus proctoring pipeline
//!
//! Holds the per-frame readings exchanged between the analytics stages,
//! the error taxonomy, and the configuration sections every stage is
//! constructed from. Nothing here touches pixels or the async runtime.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    BehaviorConfig, ConditioningConfig, ConfigError, DetectorConfig, GazeConfig, ObjectConfig,
    PipelineConfig, ProctorConfig, SamplingConfig, ScoringConfig, ServerConfig,
};
pub use error::{ProctorError, Result};
pub use types::*;
