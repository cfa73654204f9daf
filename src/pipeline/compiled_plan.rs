use crate::pipeline::component::ComponentKind;
use crate::pipeline::id::ComponentId;
use crate::pipeline::stream::StreamDescriptor;
use crate::pipeline::window::{FrameSpec, WindowResolver};
use std::sync::Arc;

/// Compiled execution plan for a pipeline graph.
/// Built at `start` and kept until `reset`.
#[derive(Debug, Clone)]
pub struct CompiledPlan {
    /// Slot indices in start order: topological, grouped by kind
    pub order: Vec<usize>,

    /// One entry per slot, indexed like the graph
    pub nodes: Vec<PlannedNode>,

    /// Compilation statistics
    pub stats: PlanStats,
}

/// Resolved shape of one component for one run
#[derive(Debug, Clone)]
pub struct PlannedNode {
    pub id: ComponentId,
    pub kind: ComponentKind,

    /// Descriptor of the produced stream, if any
    pub output: Option<Arc<StreamDescriptor>>,

    /// Buffer capacity in samples (0 without output)
    pub capacity: usize,

    /// Largest block the component writes at once
    pub write_block: usize,

    /// Largest block written before waiting for space again. Always fits
    /// next to a reader that is waiting for its largest frame.
    pub write_chunk: usize,

    /// Stream inputs in connection order
    pub inputs: Vec<PlannedInput>,

    pub frame: Option<FrameSpec>,
}

/// One stream input of a stage
#[derive(Debug, Clone)]
pub struct PlannedInput {
    pub source: ComponentId,
    pub resolver: WindowResolver,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, Default)]
pub struct PlanStats {
    /// Total number of components in the graph
    pub total_components: usize,

    pub sensors: usize,
    pub providers: usize,
    pub transformers: usize,
    pub consumers: usize,
    pub handlers: usize,

    /// Number of event channels
    pub channels: usize,

    /// Number of stream buffers to allocate
    pub buffers: usize,

    /// Sum of all buffer capacities in samples
    pub buffered_samples: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl CompiledPlan {
    /// Check if the plan has any components
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn node(&self, id: ComponentId) -> Option<&PlannedNode> {
        self.nodes.get(id.index())
    }

    /// Rate of the stream produced by `id`
    pub fn output_rate(&self, id: ComponentId) -> Option<f64> {
        self.node(id)
            .and_then(|n| n.output.as_ref())
            .map(|d| d.sample_rate)
    }

    /// Worker-carrying slots in start order
    pub fn workers(&self) -> impl Iterator<Item = usize> + '_ {
        self.order
            .iter()
            .copied()
            .filter(|&idx| self.nodes[idx].kind.has_worker())
    }
}
