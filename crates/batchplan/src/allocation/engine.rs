use serde::{Deserialize, Serialize};

use crate::allocation::plan::JobAllocationPlan;
use crate::allocation::request::JobResourceRequest;
use crate::catalog::{ArchitectureCatalog, ArchitectureDescriptor, ArchitectureFamily};
use crate::common::error::AllocationError;
use crate::common::timeutils::duration_from_hours;

/// Group/user identity under which jobs are billed and submitted, passed
/// through unchanged from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub group: String,
    pub user: String,
}

/// Sizes and prices one job at a time against an injected catalog.
///
/// Every call is an independent, synchronous computation over immutable
/// inputs; the engine can be shared freely across callers.
pub struct AllocationEngine<'a> {
    catalog: &'a ArchitectureCatalog,
    identity: RemoteIdentity,
}

impl<'a> AllocationEngine<'a> {
    pub fn new(catalog: &'a ArchitectureCatalog, identity: RemoteIdentity) -> Self {
        Self { catalog, identity }
    }

    /// Produces the allocation plan for `total_subtasks` subtasks with the
    /// given per-subtask resource profile, on a node type of the given
    /// family (unless the request names an architecture explicitly).
    pub fn plan(
        &self,
        request: &JobResourceRequest,
        family: ArchitectureFamily,
        total_subtasks: u32,
    ) -> crate::Result<JobAllocationPlan> {
        if !request.enabled {
            return Err(AllocationError::NotEnabled);
        }
        request.validate()?;

        let architecture = match request.hinted_architecture() {
            Some(hint) => self.catalog.by_name(hint)?,
            None => self
                .catalog
                .select_architecture(family, request.memory_gb_per_subtask)?,
        };
        log::info!(
            "Sizing {total_subtasks} subtasks on architecture {}",
            architecture.name()
        );

        let footprint = node_footprint(architecture, request);
        let active_cores = active_cores_per_node(&footprint, request.memory_gb_per_subtask);
        let throughput = throughput(request, active_cores, total_subtasks);

        // Billing covers every reserved core for the whole wall-time window,
        // idle or not.
        let estimated_cost = f64::from(throughput.node_count)
            * f64::from(footprint.min_cores)
            * throughput.wall_time_hours
            * architecture.cost_rate_per_core_hour();

        Ok(JobAllocationPlan::new(
            architecture.clone(),
            footprint.min_cores,
            footprint.min_memory_gb,
            active_cores,
            throughput.node_count,
            duration_from_hours(throughput.wall_time_hours),
            architecture.queue_name().to_string(),
            self.identity.group.clone(),
            estimated_cost,
        ))
    }
}

struct NodeFootprint {
    min_cores: u32,
    min_memory_gb: f64,
}

/// Cores one subtask occupies through its memory share, floored at the
/// architecture-specific minimum.
fn required_cores(architecture: &ArchitectureDescriptor, memory_gb_per_subtask: f64) -> u32 {
    let cores_for_memory = (memory_gb_per_subtask / architecture.memory_per_core_gb()).ceil() as u32;
    cores_for_memory.max(architecture.min_cores())
}

fn required_memory_gb(
    architecture: &ArchitectureDescriptor,
    memory_gb_per_subtask: f64,
    required_cores: u32,
) -> f64 {
    memory_gb_per_subtask
        .ceil()
        .max(f64::from(required_cores) * architecture.memory_per_core_gb())
}

/// Chooses the per-node core/memory request. Dedicated nodes cannot be
/// rented partially, so that family always reserves nodes whole; shared
/// nodes default to a third of the node and honor user overrides.
fn node_footprint(
    architecture: &ArchitectureDescriptor,
    request: &JobResourceRequest,
) -> NodeFootprint {
    let required_cores = required_cores(architecture, request.memory_gb_per_subtask);
    let required_memory_gb =
        required_memory_gb(architecture, request.memory_gb_per_subtask, required_cores);

    match architecture.family() {
        ArchitectureFamily::Dedicated => NodeFootprint {
            min_cores: architecture.max_cores(),
            min_memory_gb: required_memory_gb.max(architecture.rounded_max_memory_gb()),
        },
        ArchitectureFamily::Shared => {
            let default_cores = architecture.max_cores() / 3;
            let default_memory_gb = architecture.max_memory_gb() / 3.0;

            // A core override is taken verbatim; a memory override is still
            // floored so that at least one subtask fits per node.
            let min_cores = request
                .min_cores_override
                .unwrap_or_else(|| required_cores.max(default_cores));
            let min_memory_gb = match request.min_memory_gb_override {
                Some(memory_gb) if memory_gb < request.memory_gb_per_subtask => {
                    let corrected = request.memory_gb_per_subtask.ceil();
                    log::warn!(
                        "Memory override of {memory_gb} GB cannot fit one subtask, \
                         raising to {corrected} GB"
                    );
                    corrected
                }
                Some(memory_gb) => memory_gb,
                None => required_memory_gb.max(default_memory_gb),
            };
            NodeFootprint {
                min_cores,
                min_memory_gb,
            }
        }
    }
}

/// Cores expected to be simultaneously busy on one node: bounded by the
/// memory budget and by the reserved core count.
fn active_cores_per_node(footprint: &NodeFootprint, memory_gb_per_subtask: f64) -> u32 {
    let memory_bound = (footprint.min_memory_gb / memory_gb_per_subtask).floor() as u32;
    memory_bound.min(footprint.min_cores)
}

struct Throughput {
    node_count: u32,
    wall_time_hours: f64,
}

/// Node count and wall time. Each active core processes several subtasks
/// serially within the wall-time budget; a node cap or a user-supplied
/// subtasks-per-core figure raises the serial count (and with it the wall
/// time) rather than the node count.
fn throughput(
    request: &JobResourceRequest,
    active_cores_per_node: u32,
    total_subtasks: u32,
) -> Throughput {
    let typical = request.subtask_typical_runtime_hours;
    let mut slots =
        ((request.subtask_max_runtime_hours / typical).floor() as u64).max(1);

    if let Some(max_nodes) = request.max_nodes_override {
        let capacity = u64::from(active_cores_per_node) * u64::from(max_nodes);
        slots = slots.max(u64::from(total_subtasks).div_ceil(capacity));
    }
    if let Some(subtasks_per_core) = request.subtasks_per_core_override {
        let requested = (subtasks_per_core.floor() as u64).max(1);
        if requested >= slots {
            slots = requested;
        } else {
            log::warn!(
                "User-supplied subtasks per core {subtasks_per_core} too small, \
                 using computed value of {slots}"
            );
        }
    }

    let node_count = u64::from(total_subtasks)
        .div_ceil(u64::from(active_cores_per_node) * slots)
        .max(1) as u32;
    let wall_time_hours = request.subtask_max_runtime_hours.max(slots as f64 * typical);
    Throughput {
        node_count,
        wall_time_hours,
    }
}

#[cfg(test)]
mod tests {
    use super::{AllocationEngine, RemoteIdentity};
    use crate::allocation::request::JobResourceRequest;
    use crate::catalog::{ArchitectureCatalog, ArchitectureDescriptor, ArchitectureFamily};
    use crate::common::error::AllocationError;

    const TOTAL_SUBTASKS: u32 = 500;

    fn catalog() -> ArchitectureCatalog {
        ArchitectureCatalog::new(vec![
            ArchitectureDescriptor::new(
                "lean",
                ArchitectureFamily::Shared,
                48,
                192.0,
                4,
                0.308,
                "cloud",
            ),
            ArchitectureDescriptor::new(
                "rich",
                ArchitectureFamily::Shared,
                48,
                768.0,
                1,
                0.452,
                "cloud",
            ),
            ArchitectureDescriptor::new(
                "cluster",
                ArchitectureFamily::Dedicated,
                24,
                127.92,
                24,
                0.80,
                "normal",
            ),
        ])
        .unwrap()
    }

    fn identity() -> RemoteIdentity {
        RemoteIdentity {
            group: "g12345".to_string(),
            user: "pipeline".to_string(),
        }
    }

    fn request(memory_gb_per_subtask: f64) -> JobResourceRequest {
        JobResourceRequest::new(memory_gb_per_subtask, 0.5, 4.5)
    }

    #[test]
    fn test_shared_small_memory() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let plan = engine
            .plan(&request(1.0), ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();
        assert_eq!(plan.architecture().name(), "lean");
        assert_eq!(plan.min_cores_per_node(), 16);
        assert_eq!(plan.min_memory_gb_per_node(), 64.0);
        assert_eq!(plan.active_cores_per_node(), 16);
        assert_eq!(plan.node_count(), 4);
        assert_eq!(plan.requested_wall_time(), "4:30:00");
        assert_eq!(plan.queue_name(), "cloud");
        assert_eq!(plan.remote_group(), "g12345");
        let expected_cost = 4.0 * 16.0 * 4.5 * 0.308;
        assert!((plan.estimated_cost() - expected_cost).abs() < 1e-9);
    }

    #[test]
    fn test_shared_memory_bound() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let plan = engine
            .plan(&request(32.0), ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();
        assert_eq!(plan.architecture().name(), "rich");
        assert_eq!(plan.min_cores_per_node(), 16);
        assert_eq!(plan.min_memory_gb_per_node(), 256.0);
        assert_eq!(plan.active_cores_per_node(), 8);
        assert_eq!(plan.node_count(), 7);
    }

    #[test]
    fn test_shared_one_subtask_per_node() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let plan = engine
            .plan(&request(384.0), ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();
        assert_eq!(plan.min_cores_per_node(), 24);
        assert_eq!(plan.min_memory_gb_per_node(), 384.0);
        assert_eq!(plan.active_cores_per_node(), 1);
        assert_eq!(plan.node_count(), 56);
    }

    #[test]
    fn test_core_override_honored_verbatim() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let baseline = engine
            .plan(&request(384.0), ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();

        let mut overridden = request(384.0);
        overridden.min_cores_override = Some(36);
        let plan = engine
            .plan(&overridden, ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();
        assert_eq!(plan.min_cores_per_node(), 36);
        assert_eq!(plan.min_memory_gb_per_node(), 384.0);
        assert_eq!(plan.node_count(), 56);
        // Billing follows the reserved cores, so the cost scales with the
        // override even though no extra subtasks run.
        let expected = baseline.estimated_cost() * 36.0 / 24.0;
        assert!((plan.estimated_cost() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_memory_override_below_subtask_requirement_is_raised() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let baseline = engine
            .plan(&request(384.0), ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();

        let mut overridden = request(384.0);
        overridden.min_memory_gb_override = Some(200.0);
        let plan = engine
            .plan(&overridden, ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();
        assert_eq!(plan, baseline);
    }

    #[test]
    fn test_memory_override_above_subtask_requirement_is_kept() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let mut overridden = request(32.0);
        overridden.min_memory_gb_override = Some(64.0);
        let plan = engine
            .plan(&overridden, ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();
        assert_eq!(plan.min_memory_gb_per_node(), 64.0);
        assert_eq!(plan.active_cores_per_node(), 2);
    }

    #[test]
    fn test_dedicated_reserves_whole_nodes() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let plan = engine
            .plan(&request(6.0), ArchitectureFamily::Dedicated, TOTAL_SUBTASKS)
            .unwrap();
        assert_eq!(plan.architecture().name(), "cluster");
        assert_eq!(plan.min_cores_per_node(), 24);
        assert_eq!(plan.min_memory_gb_per_node(), 128.0);
        assert_eq!(plan.active_cores_per_node(), 21);
        assert_eq!(plan.node_count(), 3);
        assert_eq!(plan.queue_name(), "normal");
    }

    #[test]
    fn test_idempotence() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let first = engine
            .plan(&request(32.0), ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();
        let second = engine
            .plan(&request(32.0), ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_node_count_monotonic_in_subtask_count() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let mut previous = 0;
        for total_subtasks in [1, 10, 100, 500, 1000, 5000, 50_000] {
            let plan = engine
                .plan(&request(6.0), ArchitectureFamily::Shared, total_subtasks)
                .unwrap();
            assert!(plan.node_count() >= previous);
            previous = plan.node_count();
        }
    }

    #[test]
    fn test_footprint_monotonic_in_subtask_memory() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let mut previous_cores = 0;
        let mut previous_memory = 0.0;
        for memory_gb in [1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 384.0, 768.0] {
            let plan = engine
                .plan(&request(memory_gb), ArchitectureFamily::Shared, TOTAL_SUBTASKS)
                .unwrap();
            assert!(plan.min_cores_per_node() >= previous_cores);
            assert!(plan.min_memory_gb_per_node() >= previous_memory);
            previous_cores = plan.min_cores_per_node();
            previous_memory = plan.min_memory_gb_per_node();
        }
    }

    #[test]
    fn test_disabled_request_is_refused() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let mut disabled = request(1.0);
        disabled.enabled = false;
        assert!(matches!(
            engine.plan(&disabled, ArchitectureFamily::Shared, TOTAL_SUBTASKS),
            Err(AllocationError::NotEnabled)
        ));
    }

    #[test]
    fn test_unknown_hint_is_refused() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let mut hinted = request(1.0);
        hinted.architecture_hint = Some("epyc".to_string());
        assert!(matches!(
            engine.plan(&hinted, ArchitectureFamily::Shared, TOTAL_SUBTASKS),
            Err(AllocationError::UnknownArchitecture(name)) if name == "epyc"
        ));
    }

    #[test]
    fn test_hint_bypasses_selection() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        // Auto-selection would pick "lean" for 1 GB subtasks.
        let mut hinted = request(1.0);
        hinted.architecture_hint = Some("rich".to_string());
        let plan = engine
            .plan(&hinted, ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();
        assert_eq!(plan.architecture().name(), "rich");
    }

    #[test]
    fn test_infeasible_memory_is_refused() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        assert!(matches!(
            engine.plan(&request(1000.0), ArchitectureFamily::Shared, TOTAL_SUBTASKS),
            Err(AllocationError::NoFeasibleArchitecture { .. })
        ));
    }

    #[test]
    fn test_max_nodes_cap_extends_wall_time() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let mut capped = request(1.0);
        capped.max_nodes_override = Some(1);
        let plan = engine
            .plan(&capped, ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();
        // 500 subtasks on 16 active cores of a single node: 32 serial
        // subtasks per core.
        assert_eq!(plan.node_count(), 1);
        assert_eq!(plan.requested_wall_time(), "16:00:00");
    }

    #[test]
    fn test_loose_max_nodes_changes_nothing() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let baseline = engine
            .plan(&request(1.0), ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();
        let mut capped = request(1.0);
        capped.max_nodes_override = Some(100);
        let plan = engine
            .plan(&capped, ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();
        assert_eq!(plan, baseline);
    }

    #[test]
    fn test_subtasks_per_core_override() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());

        let mut stretched = request(1.0);
        stretched.subtasks_per_core_override = Some(12.0);
        let plan = engine
            .plan(&stretched, ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();
        assert_eq!(plan.node_count(), 3);
        assert_eq!(plan.requested_wall_time(), "6:00:00");

        // An override below the computed serial count would leave subtasks
        // unprocessed and is ignored.
        let mut too_small = request(1.0);
        too_small.subtasks_per_core_override = Some(6.0);
        let plan = engine
            .plan(&too_small, ArchitectureFamily::Shared, TOTAL_SUBTASKS)
            .unwrap();
        assert_eq!(plan.node_count(), 4);
        assert_eq!(plan.requested_wall_time(), "4:30:00");
    }

    #[test]
    fn test_zero_subtasks_still_requests_one_node() {
        let catalog = catalog();
        let engine = AllocationEngine::new(&catalog, identity());
        let plan = engine
            .plan(&request(1.0), ArchitectureFamily::Shared, 0)
            .unwrap();
        assert_eq!(plan.node_count(), 1);
    }
}
