//! Component contracts.
//!
//! The pipeline knows five kinds of component. Each kind is a trait; the
//! pipeline stores them in the closed [`Component`] enum so that every
//! dispatch on kind is an exhaustive `match`.
//!
//! | Kind          | Trait             | Runs on                         |
//! |---------------|-------------------|---------------------------------|
//! | Sensor        | [`Sensor`]        | caller of `start`/`stop` only   |
//! | Provider      | [`Provider`]      | own thread, clocked             |
//! | Transformer   | [`Transformer`]   | own thread, driven by inputs    |
//! | Consumer      | [`Consumer`]      | own thread, driven by inputs    |
//! | Event handler | [`EventListener`] | own thread, driven by its queue |
//!
//! Hooks return [`ComponentError`]; `process` may also panic; both end only
//! that component's worker.

use crate::config::Options;
use crate::pipeline::error::ComponentError;
use crate::pipeline::event::{Event, EventContext, EventSender};
use crate::pipeline::rendezvous::{Rendezvous, WaitOutcome};
use crate::pipeline::stream::{Stream, StreamDescriptor};
use crate::pipeline::window::FrameSpec;
use crate::types::SampleType;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Closed set of component kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Sensor,
    Provider,
    Transformer,
    Consumer,
    EventHandler,
}

impl ComponentKind {
    /// Whether the kind writes a stream buffer
    pub fn produces_stream(&self) -> bool {
        matches!(self, ComponentKind::Provider | ComponentKind::Transformer)
    }

    /// Whether the kind reads stream inputs
    pub fn consumes_stream(&self) -> bool {
        matches!(self, ComponentKind::Transformer | ComponentKind::Consumer)
    }

    /// Whether the kind gets a worker thread
    pub fn has_worker(&self) -> bool {
        !matches!(self, ComponentKind::Sensor)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Sensor => "sensor",
            ComponentKind::Provider => "provider",
            ComponentKind::Transformer => "transformer",
            ComponentKind::Consumer => "consumer",
            ComponentKind::EventHandler => "event handler",
        };
        f.write_str(name)
    }
}

/// Passed to [`Sensor::connect`]
pub struct ConnectContext {
    name: String,
    rendezvous: Rendezvous,
    timeout: Duration,
}

impl ConnectContext {
    pub(crate) fn new(name: impl Into<String>, rendezvous: Rendezvous, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            rendezvous,
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle for the device callback to notify once the device is ready
    pub fn rendezvous(&self) -> Rendezvous {
        self.rendezvous.clone()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Block until the device callback notifies, bounded by the connect timeout
    pub fn wait_for_device(&self) -> Result<(), ComponentError> {
        match self.rendezvous.wait(self.timeout) {
            WaitOutcome::Notified => Ok(()),
            WaitOutcome::TimedOut => Err(ComponentError::Timeout(self.timeout)),
        }
    }
}

/// Passed to every `process` call
pub struct ProcessContext<'a> {
    pub component: &'a str,
    /// Zero-based activation counter
    pub activation: u64,
    /// Start of the processed window in seconds since the pipeline started
    pub time: f64,
    /// Cursor advance of each input after this activation (empty for providers)
    pub steps: &'a [usize],
    events: Option<&'a EventSender>,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(
        component: &'a str,
        activation: u64,
        time: f64,
        steps: &'a [usize],
        events: Option<&'a EventSender>,
    ) -> Self {
        Self {
            component,
            activation,
            time,
            steps,
            events,
        }
    }

    /// Window start in whole milliseconds
    pub fn time_ms(&self) -> u64 {
        (self.time.max(0.0) * 1000.0).round() as u64
    }

    /// Whether this component owns an event channel
    pub fn has_events(&self) -> bool {
        self.events.is_some()
    }

    /// Push an event on this component's channel. Returns its sequence
    /// number, or `None` when the component owns no channel.
    pub fn emit(&self, event: Event) -> Option<u64> {
        self.events.map(|sender| sender.emit(event))
    }
}

/// Passed to [`Transformer::output_spec`]
pub struct OutputContext<'a> {
    pub inputs: &'a [Arc<StreamDescriptor>],
    pub frame: FrameSpec,
}

/// Shape of a transformer's output per activation
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub dim: usize,
    pub sample_type: SampleType,
    /// Output rate is `samples_per_activation / step`
    pub samples_per_activation: usize,
    pub labels: Vec<String>,
}

impl OutputSpec {
    pub fn new(dim: usize, sample_type: SampleType, samples_per_activation: usize) -> Self {
        Self {
            dim,
            sample_type,
            samples_per_activation,
            labels: Vec::new(),
        }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }
}

/// How a provider's worker is clocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Samples are produced as the wall clock advances
    #[default]
    Realtime,
    /// Samples are produced as fast as downstream readers consume them
    Unpaced,
}

/// Returned from [`Provider::process`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    /// The whole block was filled
    Ready,
    /// No more data; only the first `filled` samples are valid
    Exhausted { filled: usize },
}

/// A device connection shared by its providers
pub trait Sensor: Send {
    fn name(&self) -> &str;

    fn connect(&mut self, ctx: &mut ConnectContext) -> Result<(), ComponentError>;

    fn disconnect(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }

    fn options(&self) -> Option<&Options> {
        None
    }

    fn options_mut(&mut self) -> Option<&mut Options> {
        None
    }
}

/// One stream channel of a sensor
pub trait Provider: Send {
    fn name(&self) -> &str;

    /// Shape of the produced stream, read at start after options are applied
    fn descriptor(&self) -> Result<StreamDescriptor, ComponentError>;

    fn enter(&mut self, _output: &StreamDescriptor) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Fill all `output.num()` samples
    fn process(
        &mut self,
        output: &mut Stream,
        ctx: &ProcessContext,
    ) -> Result<ProviderStatus, ComponentError>;

    fn exit(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }

    fn pacing(&self) -> Pacing {
        Pacing::Realtime
    }

    fn options(&self) -> Option<&Options> {
        None
    }

    fn options_mut(&mut self) -> Option<&mut Options> {
        None
    }
}

/// A stage with inputs and one output stream
pub trait Transformer: Send {
    fn name(&self) -> &str;

    fn output_spec(&self, ctx: &OutputContext) -> Result<OutputSpec, ComponentError>;

    fn enter(
        &mut self,
        _inputs: &[Arc<StreamDescriptor>],
        _output: &StreamDescriptor,
    ) -> Result<(), ComponentError> {
        Ok(())
    }

    /// `output` is sized to `samples_per_activation`
    fn process(
        &mut self,
        inputs: &[Stream],
        output: &mut Stream,
        ctx: &ProcessContext,
    ) -> Result<(), ComponentError>;

    fn exit(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }

    fn options(&self) -> Option<&Options> {
        None
    }

    fn options_mut(&mut self) -> Option<&mut Options> {
        None
    }
}

/// A terminal stage
pub trait Consumer: Send {
    fn name(&self) -> &str;

    fn enter(&mut self, _inputs: &[Arc<StreamDescriptor>]) -> Result<(), ComponentError> {
        Ok(())
    }

    fn process(&mut self, inputs: &[Stream], ctx: &ProcessContext) -> Result<(), ComponentError>;

    fn exit(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }

    fn options(&self) -> Option<&Options> {
        None
    }

    fn options_mut(&mut self) -> Option<&mut Options> {
        None
    }
}

/// Receives events from the channels it is subscribed to
pub trait EventListener: Send {
    fn name(&self) -> &str;

    fn enter(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }

    fn notify(&mut self, event: &Event, ctx: &EventContext) -> Result<(), ComponentError>;

    fn exit(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }

    fn options(&self) -> Option<&Options> {
        None
    }

    fn options_mut(&mut self) -> Option<&mut Options> {
        None
    }
}

/// Any component, owned by the pipeline graph between runs
pub enum Component {
    Sensor(Box<dyn Sensor>),
    Provider(Box<dyn Provider>),
    Transformer(Box<dyn Transformer>),
    Consumer(Box<dyn Consumer>),
    EventHandler(Box<dyn EventListener>),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Sensor(_) => ComponentKind::Sensor,
            Component::Provider(_) => ComponentKind::Provider,
            Component::Transformer(_) => ComponentKind::Transformer,
            Component::Consumer(_) => ComponentKind::Consumer,
            Component::EventHandler(_) => ComponentKind::EventHandler,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Component::Sensor(c) => c.name(),
            Component::Provider(c) => c.name(),
            Component::Transformer(c) => c.name(),
            Component::Consumer(c) => c.name(),
            Component::EventHandler(c) => c.name(),
        }
    }

    pub fn options(&self) -> Option<&Options> {
        match self {
            Component::Sensor(c) => c.options(),
            Component::Provider(c) => c.options(),
            Component::Transformer(c) => c.options(),
            Component::Consumer(c) => c.options(),
            Component::EventHandler(c) => c.options(),
        }
    }

    pub fn options_mut(&mut self) -> Option<&mut Options> {
        match self {
            Component::Sensor(c) => c.options_mut(),
            Component::Provider(c) => c.options_mut(),
            Component::Transformer(c) => c.options_mut(),
            Component::Consumer(c) => c.options_mut(),
            Component::EventHandler(c) => c.options_mut(),
        }
    }

    /// Run the kind's exit hook (`disconnect` for sensors)
    pub fn exit(&mut self) -> Result<(), ComponentError> {
        match self {
            Component::Sensor(c) => c.disconnect(),
            Component::Provider(c) => c.exit(),
            Component::Transformer(c) => c.exit(),
            Component::Consumer(c) => c.exit(),
            Component::EventHandler(c) => c.exit(),
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}
