pub mod aliases;
pub mod calibration;
pub mod config;
pub mod consensus;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod knowledge;
pub mod schema;
pub mod threat;

pub use config::{EngineConfig, Ruleset};
pub use engine::DetectionEngine;
pub use error::EngineError;
