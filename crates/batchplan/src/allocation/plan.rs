use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::ArchitectureDescriptor;
use crate::common::timeutils::{duration_to_hours, format_wall_time};

/// Result of sizing one job: what to request from the batch scheduler and
/// what it is expected to cost.
///
/// Created fresh per engine call and never mutated; the submission layer
/// renders it into job-script/CLI syntax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAllocationPlan {
    architecture: ArchitectureDescriptor,
    min_cores_per_node: u32,
    min_memory_gb_per_node: f64,
    active_cores_per_node: u32,
    node_count: u32,
    wall_time: Duration,
    queue_name: String,
    remote_group: String,
    estimated_cost: f64,
}

impl JobAllocationPlan {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        architecture: ArchitectureDescriptor,
        min_cores_per_node: u32,
        min_memory_gb_per_node: f64,
        active_cores_per_node: u32,
        node_count: u32,
        wall_time: Duration,
        queue_name: String,
        remote_group: String,
        estimated_cost: f64,
    ) -> Self {
        Self {
            architecture,
            min_cores_per_node,
            min_memory_gb_per_node,
            active_cores_per_node,
            node_count,
            wall_time,
            queue_name,
            remote_group,
            estimated_cost,
        }
    }

    pub fn architecture(&self) -> &ArchitectureDescriptor {
        &self.architecture
    }

    pub fn min_cores_per_node(&self) -> u32 {
        self.min_cores_per_node
    }

    pub fn min_memory_gb_per_node(&self) -> f64 {
        self.min_memory_gb_per_node
    }

    /// Cores expected to be simultaneously busy on one node; smaller than
    /// [`Self::min_cores_per_node`] when memory is the binding constraint.
    pub fn active_cores_per_node(&self) -> u32 {
        self.active_cores_per_node
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn wall_time(&self) -> Duration {
        self.wall_time
    }

    pub fn wall_time_hours(&self) -> f64 {
        duration_to_hours(&self.wall_time)
    }

    /// Wall time in the scheduler's `H:MM:SS` syntax.
    pub fn requested_wall_time(&self) -> String {
        format_wall_time(&self.wall_time)
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn remote_group(&self) -> &str {
        &self.remote_group
    }

    /// Estimated cost in the cluster's billing unit (dollars, SBUs, ...),
    /// billed over reserved cores rather than active ones.
    pub fn estimated_cost(&self) -> f64 {
        self.estimated_cost
    }

    /// Combines the plans of several tasks of one pipeline module into an
    /// overall estimate. Node counts and costs are summed; wall time and
    /// active cores take the largest value; the remaining fields are assumed
    /// identical across the plans (same architecture, queue and group) and
    /// carry over from the first. Returns `None` for an empty collection.
    pub fn aggregate<'a>(
        plans: impl IntoIterator<Item = &'a JobAllocationPlan>,
    ) -> Option<JobAllocationPlan> {
        let mut plans = plans.into_iter();
        let mut aggregated = plans.next()?.clone();
        for plan in plans {
            aggregated.wall_time = aggregated.wall_time.max(plan.wall_time);
            aggregated.active_cores_per_node = aggregated
                .active_cores_per_node
                .max(plan.active_cores_per_node);
            aggregated.node_count += plan.node_count;
            aggregated.estimated_cost += plan.estimated_cost;
        }
        Some(aggregated)
    }
}
