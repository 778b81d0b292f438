//! Catalog of the node architectures that batch jobs can be sized for.
//!
//! The catalog is built once from configuration and injected into the
//! allocation engine by reference; nothing in it changes at runtime.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::common::error::AllocationError;

/// Back-end family of an architecture, which decides the sizing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchitectureFamily {
    /// On-premises cluster; nodes are reserved whole.
    Dedicated,
    /// Cloud-rented cluster; a fraction of a node may be reserved.
    Shared,
}

impl std::fmt::Display for ArchitectureFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchitectureFamily::Dedicated => write!(f, "dedicated"),
            ArchitectureFamily::Shared => write!(f, "shared"),
        }
    }
}

/// Capacity and cost of one node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureDescriptor {
    name: String,
    family: ArchitectureFamily,
    max_cores: u32,
    max_memory_gb: f64,
    min_cores: u32,
    cost_rate_per_core_hour: f64,
    queue_name: String,
}

impl ArchitectureDescriptor {
    pub fn new(
        name: &str,
        family: ArchitectureFamily,
        max_cores: u32,
        max_memory_gb: f64,
        min_cores: u32,
        cost_rate_per_core_hour: f64,
        queue_name: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            family,
            max_cores,
            max_memory_gb,
            min_cores,
            cost_rate_per_core_hour,
            queue_name: queue_name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> ArchitectureFamily {
        self.family
    }

    pub fn max_cores(&self) -> u32 {
        self.max_cores
    }

    pub fn max_memory_gb(&self) -> f64 {
        self.max_memory_gb
    }

    pub fn min_cores(&self) -> u32 {
        self.min_cores
    }

    pub fn cost_rate_per_core_hour(&self) -> f64 {
        self.cost_rate_per_core_hour
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn memory_per_core_gb(&self) -> f64 {
        self.max_memory_gb / f64::from(self.max_cores)
    }

    /// Whole-GB node memory. Nodes carry an integer number of GB, while the
    /// configured figure may be a rounded-down ratio times the core count
    /// (e.g. 5.33 GB/core * 24 cores = 127.92 instead of 128).
    pub fn rounded_max_memory_gb(&self) -> f64 {
        self.max_memory_gb.round()
    }

    fn validate(&self) -> crate::Result<()> {
        let fail = |reason: &str| {
            Err(AllocationError::InvalidCatalogEntry {
                name: self.name.clone(),
                reason: reason.to_string(),
            })
        };
        if self.name.is_empty() {
            return fail("architecture name is empty");
        }
        if self.max_cores == 0 {
            return fail("max_cores must be positive");
        }
        if self.max_memory_gb <= 0.0 || !self.max_memory_gb.is_finite() {
            return fail("max_memory_gb must be positive");
        }
        if self.min_cores == 0 || self.min_cores > self.max_cores {
            return fail("min_cores must be in 1..=max_cores");
        }
        if self.cost_rate_per_core_hour < 0.0 || !self.cost_rate_per_core_hour.is_finite() {
            return fail("cost_rate_per_core_hour must not be negative");
        }
        Ok(())
    }
}

/// Immutable, ordered set of architecture descriptors.
#[derive(Debug, Clone)]
pub struct ArchitectureCatalog {
    descriptors: Vec<ArchitectureDescriptor>,
}

impl ArchitectureCatalog {
    pub fn new(descriptors: Vec<ArchitectureDescriptor>) -> crate::Result<Self> {
        for descriptor in &descriptors {
            descriptor.validate()?;
        }
        if let Some(name) = descriptors
            .iter()
            .map(|descriptor| descriptor.name())
            .duplicates()
            .next()
        {
            return Err(AllocationError::InvalidCatalogEntry {
                name: name.to_string(),
                reason: "architecture defined twice".to_string(),
            });
        }
        Ok(Self { descriptors })
    }

    pub fn by_name(&self, name: &str) -> crate::Result<&ArchitectureDescriptor> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.name() == name)
            .ok_or_else(|| AllocationError::UnknownArchitecture(name.to_string()))
    }

    /// Descriptors of the given family, in catalog order.
    pub fn by_family(&self, family: ArchitectureFamily) -> Vec<&ArchitectureDescriptor> {
        self.descriptors
            .iter()
            .filter(|descriptor| descriptor.family() == family)
            .collect()
    }

    /// Selects the architecture for subtasks that each need
    /// `memory_gb_per_subtask` GB.
    ///
    /// The least expensive entry whose memory-per-core ratio lets every core
    /// run one subtask is preferred. If no entry has such a ratio, the job is
    /// memory-bound on any node, so the entry with the largest ratio whose
    /// whole-node memory still fits a single subtask is used instead.
    pub fn select_architecture(
        &self,
        family: ArchitectureFamily,
        memory_gb_per_subtask: f64,
    ) -> crate::Result<&ArchitectureDescriptor> {
        let candidates = self.by_family(family);

        let selected = candidates
            .iter()
            .filter(|a| a.memory_per_core_gb() >= memory_gb_per_subtask)
            .min_by(|a, b| {
                a.cost_rate_per_core_hour()
                    .total_cmp(&b.cost_rate_per_core_hour())
            })
            .copied()
            .or_else(|| {
                candidates
                    .iter()
                    .filter(|a| a.max_memory_gb() >= memory_gb_per_subtask)
                    .max_by(|a, b| {
                        a.memory_per_core_gb()
                            .total_cmp(&b.memory_per_core_gb())
                            .then_with(|| {
                                b.cost_rate_per_core_hour()
                                    .total_cmp(&a.cost_rate_per_core_hour())
                            })
                    })
                    .copied()
            });

        match selected {
            Some(architecture) => {
                log::debug!(
                    "Selected architecture {} for {memory_gb_per_subtask} GB per subtask",
                    architecture.name()
                );
                Ok(architecture)
            }
            None => Err(AllocationError::NoFeasibleArchitecture {
                family,
                required_memory_gb: memory_gb_per_subtask,
            }),
        }
    }
}
