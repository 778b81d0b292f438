use serde::{Deserialize, Serialize};

use crate::common::error::AllocationError;

/// Caller-supplied description of one subtask's resource needs, plus optional
/// overrides of the sizing that the engine would otherwise compute.
///
/// Overrides are `None` when unset; they are checked against the catalog only
/// when the engine runs. Parsing of raw configuration strings (where a blank
/// field means "unset") belongs to an adapter outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResourceRequest {
    /// RAM needed by each subtask, in GB.
    pub memory_gb_per_subtask: f64,
    /// Typical (median) runtime of one subtask.
    pub subtask_typical_runtime_hours: f64,
    /// Longest runtime any subtask may need.
    pub subtask_max_runtime_hours: f64,
    /// Architecture to use verbatim instead of auto-selection.
    pub architecture_hint: Option<String>,
    /// Minimum cores to request per node (shared family only).
    pub min_cores_override: Option<u32>,
    /// Minimum RAM to request per node in GB (shared family only).
    pub min_memory_gb_override: Option<f64>,
    /// Subtasks each active core should process serially.
    pub subtasks_per_core_override: Option<f64>,
    /// Upper bound on the number of nodes to request.
    pub max_nodes_override: Option<u32>,
    /// Whether this job should be submitted to the batch system at all.
    pub enabled: bool,
}

impl JobResourceRequest {
    pub fn new(
        memory_gb_per_subtask: f64,
        subtask_typical_runtime_hours: f64,
        subtask_max_runtime_hours: f64,
    ) -> Self {
        Self {
            memory_gb_per_subtask,
            subtask_typical_runtime_hours,
            subtask_max_runtime_hours,
            architecture_hint: None,
            min_cores_override: None,
            min_memory_gb_override: None,
            subtasks_per_core_override: None,
            max_nodes_override: None,
            enabled: true,
        }
    }

    /// The architecture hint, with a blank string treated as unset.
    pub fn hinted_architecture(&self) -> Option<&str> {
        self.architecture_hint
            .as_deref()
            .filter(|hint| !hint.is_empty())
    }

    pub fn validate(&self) -> crate::Result<()> {
        require_positive(self.memory_gb_per_subtask, "memory_gb_per_subtask")?;
        require_positive(
            self.subtask_typical_runtime_hours,
            "subtask_typical_runtime_hours",
        )?;
        require_positive(self.subtask_max_runtime_hours, "subtask_max_runtime_hours")?;
        if self.subtask_max_runtime_hours < self.subtask_typical_runtime_hours {
            return Err(AllocationError::InvalidRequest(format!(
                "subtask_max_runtime_hours ({}) is below subtask_typical_runtime_hours ({})",
                self.subtask_max_runtime_hours, self.subtask_typical_runtime_hours
            )));
        }
        if let Some(cores) = self.min_cores_override {
            if cores == 0 {
                return Err(AllocationError::InvalidRequest(
                    "min_cores_override must be positive".to_string(),
                ));
            }
        }
        if let Some(memory) = self.min_memory_gb_override {
            require_positive(memory, "min_memory_gb_override")?;
        }
        if let Some(subtasks) = self.subtasks_per_core_override {
            require_positive(subtasks, "subtasks_per_core_override")?;
        }
        if let Some(nodes) = self.max_nodes_override {
            if nodes == 0 {
                return Err(AllocationError::InvalidRequest(
                    "max_nodes_override must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn require_positive(value: f64, what: &str) -> crate::Result<()> {
    if value <= 0.0 || !value.is_finite() {
        return Err(AllocationError::InvalidRequest(format!(
            "{what} must be positive, got {value}"
        )));
    }
    Ok(())
}
