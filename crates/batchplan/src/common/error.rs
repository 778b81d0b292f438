use thiserror::Error;

use crate::catalog::ArchitectureFamily;

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("Invalid job resource request: {0}")]
    InvalidRequest(String),
    #[error("Architecture `{0}` is not present in the catalog")]
    UnknownArchitecture(String),
    #[error(
        "No {family} architecture can host a subtask that requires {required_memory_gb} GB of memory"
    )]
    NoFeasibleArchitecture {
        family: ArchitectureFamily,
        required_memory_gb: f64,
    },
    /// Reserved for a stricter validation of core overrides below the computed
    /// requirement. Core overrides are currently accepted verbatim, so this is
    /// never raised.
    #[error("Override conflicts with the computed requirement: {0}")]
    OverrideConflict(String),
    #[error("Job resource request has remote execution disabled")]
    NotEnabled,
    #[error("Invalid catalog entry `{name}`: {reason}")]
    InvalidCatalogEntry { name: String, reason: String },
}
