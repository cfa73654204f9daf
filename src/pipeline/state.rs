//! Pipeline lifecycle states.

use std::fmt;

/// Lifecycle state of a [`Pipeline`](crate::pipeline::Pipeline).
///
/// ```text
/// Configured ──start──► Starting ──► Running ──stop──► Stopping ──► Stopped
///     ▲           │ (enter hook failed)                                │
///     └───────────┴──────────────────────reset─────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    /// Graph may be mutated
    #[default]
    Configured,
    /// Compiling, allocating and entering components
    Starting,
    /// Workers are live
    Running,
    /// Workers are being drained and joined
    Stopping,
    /// Every worker joined or abandoned; graph retained
    Stopped,
}

impl PipelineState {
    /// True when graph mutations are accepted
    pub fn is_mutable(&self) -> bool {
        matches!(self, PipelineState::Configured)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Configured => "configured",
            PipelineState::Starting => "starting",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
