//! Multi-rate stream pipeline.
//!
//! Sensors own providers, which write periodic samples into their own
//! [`TimeBuffer`]. Transformers and consumers pull fixed-duration windows from
//! one or more buffers, each at its own rate, and transformers write a derived
//! stream that further stages may read. Event channels carry discrete
//! occurrences from producing components to event handlers.
//!
//! # Architecture
//!
//! ```text
//! [Sensor]
//!    ├─ [Provider 50 Hz] ──► buffer ──┬──► [Transformer] ──► buffer ──► [Consumer]
//!    └─ [Provider 40 Hz] ──► buffer ──┘                                    │
//!                                                                   event channel
//!                                                                          ▼
//!                                                                   [EventHandler]
//! ```
//!
//! # Design
//!
//! - **Thread per component**: every provider, stage and handler runs on its
//!   own worker thread for the length of a run.
//! - **Bounded waits**: buffer reads, space waits, event pushes, connect
//!   rendezvous and joins all carry a timeout.
//! - **Drift-free windows**: window boundaries are computed from the
//!   activation index, so rounding never accumulates.
//! - **Overwrite and count**: a write never blocks on a slow reader; lapped
//!   samples are counted as lost for that reader.

pub mod buffer;
pub mod compiled_plan;
mod compiler;
pub mod component;
pub mod error;
pub mod event;
pub mod executor;
pub mod id;
pub mod nodes;
pub mod rendezvous;
pub mod state;
pub mod stats;
pub mod stream;
pub mod window;
mod worker;

pub use buffer::{BufferStats, ReaderStats, TimeBuffer, WriteOutcome};
pub use compiled_plan::{CompiledPlan, PlanStats, PlannedInput, PlannedNode};
pub use component::{
    Component, ComponentKind, ConnectContext, Consumer, EventListener, OutputContext, OutputSpec,
    Pacing, ProcessContext, Provider, ProviderStatus, Sensor, Transformer,
};
pub use error::{
    BufferError, ComponentError, OptionError, PipelineError, PipelineResult, StreamError,
};
pub use event::{Event, EventContext, EventPayload, EventSender, EventState};
pub use executor::Pipeline;
pub use id::{ChannelId, ComponentId, ReaderId, SensorHandle};
pub use rendezvous::{Rendezvous, WaitOutcome};
pub use state::PipelineState;
pub use stats::{ComponentReport, StopReport, WorkerCounters, WorkerOutcome};
pub use stream::{Stream, StreamDescriptor};
pub use window::{FrameSpec, Window, WindowResolver};
