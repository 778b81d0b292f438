//! Sizing and pricing of batch job requests.
//!
//! The caller describes one subtask's resource profile as a
//! [`JobResourceRequest`]; the [`AllocationEngine`] turns it into a
//! [`JobAllocationPlan`] that the submission layer renders into scheduler
//! syntax. The engine is a pure computation over immutable inputs and may be
//! called concurrently without coordination.

pub mod engine;
pub mod plan;
pub mod request;

pub use engine::{AllocationEngine, RemoteIdentity};
pub use plan::JobAllocationPlan;
pub use request::JobResourceRequest;
