//! Mock components for exercising the pipeline

use parking_lot::Mutex;
use sigflow_rs::pipeline::{
    ComponentError, ConnectContext, Consumer, Event, EventContext, EventListener, EventPayload,
    ProcessContext, Sensor, Stream, StreamDescriptor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One window as seen by a [`CollectingConsumer`]
#[derive(Debug, Clone, PartialEq)]
pub struct SeenWindow {
    pub activation: u64,
    pub time: f64,
    /// Dimension 0 of every input, widened to f64
    pub inputs: Vec<Vec<f64>>,
}

pub type Seen = Arc<Mutex<Vec<SeenWindow>>>;

/// Records every window it is handed
pub struct CollectingConsumer {
    name: String,
    seen: Seen,
    entered: Arc<AtomicUsize>,
    exited: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl CollectingConsumer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            seen: Arc::new(Mutex::new(Vec::new())),
            entered: Arc::new(AtomicUsize::new(0)),
            exited: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Sleep `delay` in every activation
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn seen(&self) -> Seen {
        self.seen.clone()
    }

    /// (enter calls, exit calls)
    pub fn hooks(&self) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        (self.entered.clone(), self.exited.clone())
    }
}

impl Consumer for CollectingConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn enter(&mut self, _inputs: &[Arc<StreamDescriptor>]) -> Result<(), ComponentError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().clear();
        Ok(())
    }

    fn process(&mut self, inputs: &[Stream], ctx: &ProcessContext) -> Result<(), ComponentError> {
        self.seen.lock().push(SeenWindow {
            activation: ctx.activation,
            time: ctx.time,
            inputs: inputs.iter().map(|s| s.column_f64(0)).collect(),
        });
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        Ok(())
    }

    fn exit(&mut self) -> Result<(), ComponentError> {
        self.exited.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A sensor whose connect always fails
pub struct FailingSensor {
    name: String,
}

impl FailingSensor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Sensor for FailingSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self, _ctx: &mut ConnectContext) -> Result<(), ComponentError> {
        Err(ComponentError::failed("device refused the connection"))
    }
}

/// Panics on the given activation
pub struct PanickingConsumer {
    name: String,
    at: u64,
}

impl PanickingConsumer {
    pub fn new(name: &str, at: u64) -> Self {
        Self {
            name: name.to_string(),
            at,
        }
    }
}

impl Consumer for PanickingConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, _inputs: &[Stream], ctx: &ProcessContext) -> Result<(), ComponentError> {
        if ctx.activation == self.at {
            panic!("boom at activation {}", ctx.activation);
        }
        Ok(())
    }
}

/// Blocks inside `process` far longer than any shutdown timeout
pub struct StubbornConsumer {
    name: String,
    block_for: Duration,
}

impl StubbornConsumer {
    pub fn new(name: &str, block_for: Duration) -> Self {
        Self {
            name: name.to_string(),
            block_for,
        }
    }
}

impl Consumer for StubbornConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, _inputs: &[Stream], _ctx: &ProcessContext) -> Result<(), ComponentError> {
        thread::sleep(self.block_for);
        Ok(())
    }
}

/// Emits one event per activation carrying the activation index
pub struct EmittingConsumer {
    name: String,
}

impl EmittingConsumer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Consumer for EmittingConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, _inputs: &[Stream], ctx: &ProcessContext) -> Result<(), ComponentError> {
        ctx.emit(
            Event::new(self.name.clone(), "tick")
                .at(ctx.time_ms())
                .with_payload(EventPayload::Ints(vec![ctx.activation as i64])),
        );
        Ok(())
    }
}

/// Records every event, optionally sleeping per event
pub struct RecordingListener {
    name: String,
    delay: Duration,
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingListener {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn events(&self) -> Arc<Mutex<Vec<Event>>> {
        self.events.clone()
    }
}

impl EventListener for RecordingListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify(&mut self, event: &Event, _ctx: &EventContext) -> Result<(), ComponentError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Re-emits every event it hears on its own channel
pub struct RelayListener {
    name: String,
}

impl RelayListener {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl EventListener for RelayListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify(&mut self, event: &Event, ctx: &EventContext) -> Result<(), ComponentError> {
        let relayed = Event::new(&self.name, format!("{}-relayed", event.name))
            .at(event.time_ms)
            .with_payload(event.payload.clone());
        ctx.emit(relayed)
            .map(|_| ())
            .ok_or_else(|| ComponentError::failed("relay owns no channel"))
    }
}

/// Sequence numbers of recorded events
pub fn seqs(events: &Mutex<Vec<Event>>) -> Vec<u64> {
    events.lock().iter().map(|e| e.seq).collect()
}
