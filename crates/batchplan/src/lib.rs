pub mod advisory;
pub mod allocation;
pub mod catalog;
pub mod common;

pub type Error = crate::common::error::AllocationError;
pub type Result<T> = std::result::Result<T, Error>;

pub type Map<K, V> = hashbrown::HashMap<K, V>;

// Reexports
pub use advisory::QueueTimeAdvisory;
pub use allocation::engine::{AllocationEngine, RemoteIdentity};
pub use allocation::plan::JobAllocationPlan;
pub use allocation::request::JobResourceRequest;
pub use catalog::{ArchitectureCatalog, ArchitectureDescriptor, ArchitectureFamily};
