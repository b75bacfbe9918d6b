pub mod identification;
pub mod threat;

pub use identification::{IdentificationReport, SourceFailure};
pub use threat::ThreatReport;

// Schema version constants
pub const SCHEMA_VERSION: &str = "0.1.0";
