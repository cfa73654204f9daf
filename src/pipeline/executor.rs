//! Pipeline executor: graph ownership and the run lifecycle.
//!
//! The graph is built while the pipeline is `Configured`. `start` compiles it,
//! allocates one buffer per producing component, runs every enter hook in
//! start order and then spawns one worker thread per provider, stage and
//! handler. `stop` winds the run down source-first and hands every component
//! back to its slot, so the same graph can be `reset` and started again.

use crate::config::{OptionValue, Options, PipelineConfig};
use crate::pipeline::buffer::{BufferStats, TimeBuffer};
use crate::pipeline::compiled_plan::CompiledPlan;
use crate::pipeline::compiler::PipelineCompiler;
use crate::pipeline::component::{
    Component, ComponentKind, ConnectContext, Consumer, EventListener, Provider, Sensor,
    Transformer,
};
use crate::pipeline::error::{ComponentError, OptionError, PipelineError, PipelineResult};
use crate::pipeline::event::{EventSender, ListenerQueue};
use crate::pipeline::id::{ChannelId, ComponentId, ReaderId, SensorHandle};
use crate::pipeline::rendezvous::Rendezvous;
use crate::pipeline::state::PipelineState;
use crate::pipeline::stats::{ComponentReport, StopReport, WorkerCounters, WorkerOutcome};
use crate::pipeline::stream::StreamDescriptor;
use crate::pipeline::window::FrameSpec;
use crate::pipeline::worker::{
    spawn_worker, RunShared, StageInput, StopSignal, WorkerContext, WorkerExit, WorkerJob,
};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A component and its wiring.
pub(crate) struct ComponentSlot {
    pub(crate) name: String,
    pub(crate) kind: ComponentKind,
    /// `None` while a worker owns the component, or after it was abandoned
    pub(crate) component: Option<Component>,
    /// Stream inputs of a stage, in connection order
    pub(crate) inputs: Vec<ComponentId>,
    pub(crate) frame: Option<FrameSpec>,
    /// Owning sensor of a provider
    pub(crate) sensor: Option<ComponentId>,
    /// Channels a handler listens on
    pub(crate) subscriptions: Vec<ChannelId>,
    /// Channel owned by a producing component
    pub(crate) channel: Option<ChannelId>,
}

impl ComponentSlot {
    fn new(component: Component) -> Self {
        Self {
            name: component.name().to_string(),
            kind: component.kind(),
            component: Some(component),
            inputs: Vec::new(),
            frame: None,
            sensor: None,
            subscriptions: Vec::new(),
            channel: None,
        }
    }
}

/// An event channel and its listeners.
pub(crate) struct ChannelSlot {
    pub(crate) owner: ComponentId,
    pub(crate) listeners: Vec<ComponentId>,
}

struct RunningWorker {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

/// Everything that only exists between `start` and `stop`
struct RunState {
    shared: Arc<RunShared>,
    done_rx: Receiver<WorkerExit>,
    workers: HashMap<usize, RunningWorker>,
    buffers: Vec<Option<Arc<TimeBuffer>>>,
    /// Readers registered by each stage, as (source slot, reader)
    readers: Vec<Vec<(usize, ReaderId)>>,
    queues: Vec<Option<Arc<ListenerQueue>>>,
    /// Exits received while waiting for another worker
    exits: HashMap<usize, WorkerExit>,
    started_at: Instant,
}

impl RunState {
    /// Wait for the exit of `idx` until `deadline`
    fn await_exit(&mut self, idx: usize, deadline: Instant) -> bool {
        while !self.exits.contains_key(&idx) {
            match self.done_rx.recv_deadline(deadline) {
                Ok(exit) => {
                    self.exits.insert(exit.id.index(), exit);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return false
                }
            }
        }
        true
    }

    fn signal(&self, idx: usize) -> Option<&Arc<StopSignal>> {
        self.workers.get(&idx).map(|w| &w.signal)
    }
}

/// A multi-rate stream pipeline.
///
/// ```ignore
/// let mut pipeline = Pipeline::new(PipelineConfig::default());
/// let acc = pipeline.add_sensor(SimulatedSensor::new("acc"), vec![
///     Box::new(SignalGenerator::new("acc-x", 50.0, Waveform::Sine)),
/// ])?;
/// pipeline.add_consumer(StreamWriter::new("rec", "acc.ssj"), &acc.providers, FrameSpec::new(0.5))?;
/// pipeline.start()?;
/// let report = pipeline.stop()?;
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    state: PipelineState,
    slots: Vec<ComponentSlot>,
    channels: Vec<ChannelSlot>,
    rendezvous: Rendezvous,
    plan: Option<CompiledPlan>,
    run: Option<RunState>,
    last_report: Option<StopReport>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            state: PipelineState::Configured,
            slots: Vec::new(),
            channels: Vec::new(),
            rendezvous: Rendezvous::new(),
            plan: None,
            run: None,
            last_report: None,
        }
    }

    // ── Graph building ──

    /// Add a sensor with its providers
    pub fn add_sensor(
        &mut self,
        sensor: impl Sensor + 'static,
        providers: Vec<Box<dyn Provider>>,
    ) -> PipelineResult<SensorHandle> {
        self.ensure_configured("add_sensor")?;
        let sensor = self.push(Component::Sensor(Box::new(sensor)));
        let providers = providers
            .into_iter()
            .map(|provider| self.attach_provider(sensor, provider))
            .collect();
        Ok(SensorHandle { sensor, providers })
    }

    /// Attach one more provider to an existing sensor
    pub fn add_provider(
        &mut self,
        sensor: ComponentId,
        provider: impl Provider + 'static,
    ) -> PipelineResult<ComponentId> {
        self.ensure_configured("add_provider")?;
        let slot = self.slot(sensor)?;
        if slot.kind != ComponentKind::Sensor {
            return Err(PipelineError::Configuration(format!(
                "'{}' is a {}, providers can only be attached to sensors",
                slot.name, slot.kind
            )));
        }
        Ok(self.attach_provider(sensor, Box::new(provider)))
    }

    /// Add a transformer reading `frame`-sized windows from every input
    pub fn add_transformer(
        &mut self,
        transformer: impl Transformer + 'static,
        inputs: &[ComponentId],
        frame: FrameSpec,
    ) -> PipelineResult<ComponentId> {
        self.ensure_configured("add_transformer")?;
        self.add_stage(Component::Transformer(Box::new(transformer)), inputs, frame)
    }

    /// Add a consumer reading `frame`-sized windows from every input
    pub fn add_consumer(
        &mut self,
        consumer: impl Consumer + 'static,
        inputs: &[ComponentId],
        frame: FrameSpec,
    ) -> PipelineResult<ComponentId> {
        self.ensure_configured("add_consumer")?;
        self.add_stage(Component::Consumer(Box::new(consumer)), inputs, frame)
    }

    /// Add `input` to the inputs of `stage`
    pub fn connect(&mut self, stage: ComponentId, input: ComponentId) -> PipelineResult<()> {
        self.ensure_configured("connect")?;
        self.check_stream_source(input)?;
        let slot = self.slot(stage)?;
        if !slot.kind.consumes_stream() {
            return Err(PipelineError::Configuration(format!(
                "{} '{}' has no stream inputs",
                slot.kind, slot.name
            )));
        }
        self.slots[stage.index()].inputs.push(input);
        Ok(())
    }

    /// Channel owned by `owner`, created on first use
    pub fn event_channel(&mut self, owner: ComponentId) -> PipelineResult<ChannelId> {
        self.ensure_configured("event_channel")?;
        let slot = self.slot(owner)?;
        if let Some(channel) = slot.channel {
            return Ok(channel);
        }
        if slot.kind == ComponentKind::Sensor {
            return Err(PipelineError::Configuration(format!(
                "{} '{}' cannot own an event channel",
                slot.kind, slot.name
            )));
        }
        let channel = ChannelId(self.channels.len() as u32);
        self.channels.push(ChannelSlot {
            owner,
            listeners: Vec::new(),
        });
        self.slots[owner.index()].channel = Some(channel);
        Ok(channel)
    }

    /// Add an event handler listening on `channel`
    pub fn register_event_listener(
        &mut self,
        listener: impl EventListener + 'static,
        channel: ChannelId,
    ) -> PipelineResult<ComponentId> {
        self.ensure_configured("register_event_listener")?;
        if channel.index() >= self.channels.len() {
            return Err(PipelineError::UnknownChannel(channel));
        }
        let id = self.push(Component::EventHandler(Box::new(listener)));
        self.slots[id.index()].subscriptions.push(channel);
        self.channels[channel.index()].listeners.push(id);
        Ok(id)
    }

    /// Let an existing handler listen on one more channel
    pub fn subscribe(&mut self, listener: ComponentId, channel: ChannelId) -> PipelineResult<()> {
        self.ensure_configured("subscribe")?;
        if channel.index() >= self.channels.len() {
            return Err(PipelineError::UnknownChannel(channel));
        }
        let slot = self.slot(listener)?;
        if slot.kind != ComponentKind::EventHandler {
            return Err(PipelineError::Configuration(format!(
                "{} '{}' cannot listen to events",
                slot.kind, slot.name
            )));
        }
        if slot.subscriptions.contains(&channel) {
            return Ok(());
        }
        self.slots[listener.index()].subscriptions.push(channel);
        self.channels[channel.index()].listeners.push(listener);
        Ok(())
    }

    /// Set a declared option of a component
    pub fn set_option(
        &mut self,
        component: ComponentId,
        name: &str,
        value: impl Into<OptionValue>,
    ) -> PipelineResult<()> {
        let value = value.into();
        self.with_options("set_option", component, name, |options| {
            options.set(name, value)
        })
    }

    /// Parse `raw` with the option's declared kind and set it
    pub fn set_option_str(
        &mut self,
        component: ComponentId,
        name: &str,
        raw: &str,
    ) -> PipelineResult<()> {
        self.with_options("set_option", component, name, |options| {
            options.set_str(name, raw)
        })
    }

    fn with_options(
        &mut self,
        operation: &'static str,
        component: ComponentId,
        name: &str,
        apply: impl FnOnce(&mut Options) -> Result<(), OptionError>,
    ) -> PipelineResult<()> {
        self.ensure_configured(operation)?;
        let slot = self
            .slots
            .get_mut(component.index())
            .ok_or(PipelineError::UnknownComponent(component))?;
        let result = match slot.component.as_mut().and_then(Component::options_mut) {
            Some(options) => apply(options),
            None => Err(OptionError::UnknownOption(name.to_string())),
        };
        result.map_err(|source| PipelineError::Option {
            component: slot.name.clone(),
            source,
        })
    }

    // ── Lifecycle ──

    /// Compile, enter every component and spawn the workers.
    ///
    /// On failure the pipeline stays `Configured`; components that were
    /// already entered have had their exit hooks run.
    pub fn start(&mut self) -> PipelineResult<()> {
        self.ensure_configured("start")?;
        self.state = PipelineState::Starting;
        info!("Pipeline starting with {} components", self.slots.len());

        let plan = match PipelineCompiler::compile(&self.slots, &self.channels, &self.config) {
            Ok(plan) => plan,
            Err(e) => {
                self.state = PipelineState::Configured;
                return Err(e);
            }
        };

        let buffers: Vec<Option<Arc<TimeBuffer>>> = plan
            .nodes
            .iter()
            .map(|node| {
                node.output
                    .as_ref()
                    .map(|d| Arc::new(TimeBuffer::new(d.clone(), node.capacity)))
            })
            .collect();

        if let Err(e) = self.enter_all(&plan, &buffers) {
            self.state = PipelineState::Configured;
            return Err(e);
        }

        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let mut run = RunState {
            shared: Arc::new(RunShared::new(self.config.fatal_processing_errors, done_tx)),
            done_rx,
            workers: HashMap::new(),
            buffers,
            readers: vec![Vec::new(); self.slots.len()],
            queues: vec![None; self.slots.len()],
            exits: HashMap::new(),
            started_at: Instant::now(),
        };
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot.kind == ComponentKind::EventHandler {
                run.queues[idx] = Some(Arc::new(ListenerQueue::new(
                    slot.name.clone(),
                    self.config.event_queue_capacity,
                )));
            }
        }
        let senders: Vec<Option<EventSender>> = self.build_senders(&run);

        // Every reader is registered before the first worker writes
        let mut jobs = Vec::new();
        let mut unspawned = Vec::new();
        let mut spawn_error = None;
        for idx in plan.workers().collect::<Vec<_>>() {
            let Some(component) = self.slots[idx].component.take() else {
                continue;
            };
            match self.build_job(idx, component, &plan, &mut run) {
                Ok(job) => jobs.push((idx, job)),
                Err(component) => {
                    self.slots[idx].component = Some(component);
                    unspawned.extend(plan.workers().skip_while(|&i| i != idx));
                    spawn_error = Some(PipelineError::Configuration(format!(
                        "'{}' has no run-time state for its worker",
                        self.slots[idx].name
                    )));
                    break;
                }
            }
        }
        if spawn_error.is_some() {
            for (idx, job) in jobs.drain(..) {
                self.slots[idx].component = Some(job.into_component());
                unspawned.push(idx);
            }
        }

        let mut jobs = jobs.into_iter();
        for (idx, job) in jobs.by_ref() {
            let signal = Arc::new(StopSignal::new());
            let ctx = WorkerContext {
                id: ComponentId(idx as u32),
                name: self.slots[idx].name.clone(),
                signal: signal.clone(),
                shared: run.shared.clone(),
                events: senders[idx].clone(),
                tick: self.config.provider_tick(),
            };
            match spawn_worker(ctx, job) {
                Ok(handle) => {
                    run.workers.insert(
                        idx,
                        RunningWorker {
                            signal,
                            handle: Some(handle),
                        },
                    );
                }
                Err((source, job)) => {
                    error!("Failed to spawn worker for '{}': {}", self.slots[idx].name, source);
                    self.slots[idx].component = Some(job.into_component());
                    unspawned.push(idx);
                    spawn_error = Some(PipelineError::Spawn {
                        component: self.slots[idx].name.clone(),
                        source,
                    });
                    break;
                }
            }
        }
        for (idx, job) in jobs {
            self.slots[idx].component = Some(job.into_component());
            unspawned.push(idx);
        }
        for &idx in &unspawned {
            if let Some(buffer) = &run.buffers[idx] {
                buffer.close();
            }
            let slot = &mut self.slots[idx];
            if let Some(Err(e)) = slot.component.as_mut().map(Component::exit) {
                warn!("Exit hook of '{}' failed while unwinding: {}", slot.name, e);
            }
        }

        self.plan = Some(plan);
        self.run = Some(run);
        self.state = PipelineState::Running;

        if let Some(e) = spawn_error {
            // Wind down what did start, then go back to a restartable graph
            if let Err(stop_error) = self.stop() {
                warn!("Stop after failed spawn: {}", stop_error);
            }
            self.reset()?;
            return Err(e);
        }

        info!("Pipeline running with {} workers", self.live_workers());
        Ok(())
    }

    /// Run enter hooks in start order, unwinding on the first failure
    fn enter_all(
        &mut self,
        plan: &CompiledPlan,
        buffers: &[Option<Arc<TimeBuffer>>],
    ) -> PipelineResult<()> {
        let mut entered: Vec<usize> = Vec::with_capacity(plan.order.len());
        for &idx in &plan.order {
            match self.enter_one(idx, plan, buffers) {
                Ok(()) => entered.push(idx),
                Err(source) => {
                    let component = self.slots[idx].name.clone();
                    error!("Enter hook of '{}' failed: {}", component, source);
                    for &done in entered.iter().rev() {
                        let slot = &mut self.slots[done];
                        if let Some(Err(e)) = slot.component.as_mut().map(Component::exit) {
                            warn!("Exit hook of '{}' failed while unwinding: {}", slot.name, e);
                        }
                    }
                    return Err(PipelineError::Connect { component, source });
                }
            }
        }
        Ok(())
    }

    fn enter_one(
        &mut self,
        idx: usize,
        plan: &CompiledPlan,
        buffers: &[Option<Arc<TimeBuffer>>],
    ) -> Result<(), ComponentError> {
        let node = &plan.nodes[idx];
        let inputs: Vec<Arc<StreamDescriptor>> = node
            .inputs
            .iter()
            .filter_map(|input| buffers[input.source.index()].as_ref())
            .map(|buffer| buffer.descriptor().clone())
            .collect();
        let slot = &mut self.slots[idx];
        debug!("Entering {} '{}'", slot.kind, slot.name);
        match slot.component.as_mut() {
            Some(Component::Sensor(sensor)) => {
                let mut ctx = ConnectContext::new(
                    slot.name.clone(),
                    self.rendezvous.clone(),
                    self.config.connect_timeout(),
                );
                sensor.connect(&mut ctx)
            }
            Some(Component::Provider(provider)) => match &node.output {
                Some(output) => provider.enter(output),
                None => Err(ComponentError::failed("no resolved output stream")),
            },
            Some(Component::Transformer(transformer)) => match &node.output {
                Some(output) => transformer.enter(&inputs, output),
                None => Err(ComponentError::failed("no resolved output stream")),
            },
            Some(Component::Consumer(consumer)) => consumer.enter(&inputs),
            Some(Component::EventHandler(listener)) => listener.enter(),
            None => Err(ComponentError::failed("component is owned elsewhere")),
        }
    }

    /// One sender per channel, keyed by the owning slot
    fn build_senders(&self, run: &RunState) -> Vec<Option<EventSender>> {
        let mut senders = vec![None; self.slots.len()];
        for (ci, channel) in self.channels.iter().enumerate() {
            let queues = channel
                .listeners
                .iter()
                .filter_map(|l| run.queues[l.index()].clone())
                .collect();
            senders[channel.owner.index()] = Some(EventSender::new(
                ChannelId(ci as u32),
                queues,
                self.config.event_push_timeout(),
            ));
        }
        senders
    }

    fn build_job(
        &self,
        idx: usize,
        component: Component,
        plan: &CompiledPlan,
        run: &mut RunState,
    ) -> Result<WorkerJob, Component> {
        let node = &plan.nodes[idx];
        let slot = &self.slots[idx];
        let mut stage_inputs = Vec::with_capacity(node.inputs.len());
        for (i, input) in node.inputs.iter().enumerate() {
            let source = input.source.index();
            if let Some(buffer) = run.buffers[source].clone() {
                let reader = buffer.register_reader(format!("{}#{}", slot.name, i));
                run.readers[idx].push((source, reader));
                stage_inputs.push(StageInput {
                    buffer,
                    reader,
                    resolver: input.resolver.clone(),
                });
            }
        }
        let read_timeout = node
            .frame
            .map(|f| self.config.read_timeout(f.size.max(f.step_secs())))
            .unwrap_or_else(|| self.config.read_timeout(0.0));

        let output = run.buffers[idx].clone();
        let queue = run.queues[idx].clone();
        match (component, output, queue) {
            (Component::Provider(provider), Some(output), _) => Ok(WorkerJob::Provider {
                provider,
                output,
                block: node.write_block,
            }),
            (Component::Transformer(transformer), Some(output), _) => {
                Ok(WorkerJob::Transformer {
                    transformer,
                    inputs: stage_inputs,
                    output,
                    block: node.write_block,
                    chunk: node.write_chunk,
                    read_timeout,
                })
            }
            (Component::Consumer(consumer), _, _) => Ok(WorkerJob::Consumer {
                consumer,
                inputs: stage_inputs,
                read_timeout,
            }),
            (Component::EventHandler(listener), _, Some(queue)) => {
                Ok(WorkerJob::Listener { listener, queue })
            }
            (component, _, _) => Err(component),
        }
    }

    /// Stop the run and collect the report.
    ///
    /// Providers are signalled first. Every stage then gets the drain timeout
    /// to finish the data left in its inputs, in start order, followed by the
    /// handlers. A worker that ignores its abort for the join timeout is
    /// abandoned: `ShutdownTimeout` is returned and the pipeline is `Stopped`
    /// with the report available from [`Pipeline::last_report`].
    pub fn stop(&mut self) -> PipelineResult<StopReport> {
        match self.state {
            PipelineState::Running => {}
            PipelineState::Stopped => return Ok(self.last_report.clone().unwrap_or_default()),
            state => {
                return Err(PipelineError::InvalidState {
                    operation: "stop",
                    state,
                })
            }
        }
        let (Some(mut run), Some(plan)) = (self.run.take(), self.plan.clone()) else {
            self.state = PipelineState::Stopped;
            return Ok(StopReport::default());
        };
        self.state = PipelineState::Stopping;
        info!("Pipeline stopping");

        let kind_of = |idx: usize| plan.nodes[idx].kind;
        for idx in plan.workers().filter(|&i| kind_of(i) == ComponentKind::Provider) {
            if let Some(signal) = run.signal(idx) {
                signal.request_stop();
            }
        }

        let mut abandoned = Vec::new();
        let stream_workers: Vec<usize> = plan
            .workers()
            .filter(|&i| kind_of(i) != ComponentKind::EventHandler && run.workers.contains_key(&i))
            .collect();
        for idx in stream_workers {
            let timeout = if kind_of(idx) == ComponentKind::Provider {
                self.config.join_timeout()
            } else {
                self.config.drain_timeout()
            };
            if !self.wind_down(&mut run, idx, timeout) {
                abandoned.push(idx);
            }
            if let Some(buffer) = &run.buffers[idx] {
                buffer.close();
            }
        }

        for &idx in &plan.order {
            if kind_of(idx) != ComponentKind::Sensor {
                continue;
            }
            let slot = &mut self.slots[idx];
            if let Some(Err(e)) = slot.component.as_mut().map(Component::exit) {
                error!("Disconnect of sensor '{}' failed: {}", slot.name, e);
            }
        }

        // One at a time in start order, so a handler feeding another has
        // drained before its listener is asked to stop
        let handlers: Vec<usize> = plan
            .workers()
            .filter(|&i| kind_of(i) == ComponentKind::EventHandler && run.workers.contains_key(&i))
            .collect();
        for idx in handlers {
            if let Some(signal) = run.signal(idx) {
                signal.request_stop();
            }
            if !self.wind_down(&mut run, idx, self.config.drain_timeout()) {
                abandoned.push(idx);
            }
        }

        for (idx, worker) in run.workers.iter_mut() {
            if abandoned.contains(idx) {
                continue;
            }
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    error!("Worker '{}' panicked outside its hooks", self.slots[*idx].name);
                }
            }
        }

        let report = self.collect_report(&plan, &mut run);
        self.state = PipelineState::Stopped;
        info!(
            "Pipeline stopped after {:.3}s: {} lost samples, {} dropped events",
            report.run_time.as_secs_f64(),
            report.total_lost_samples(),
            report.total_dropped_events()
        );
        self.last_report = Some(report.clone());

        if abandoned.is_empty() {
            Ok(report)
        } else {
            Err(PipelineError::ShutdownTimeout {
                components: abandoned
                    .iter()
                    .map(|&idx| self.slots[idx].name.clone())
                    .collect(),
            })
        }
    }

    /// Wait for a signalled worker, escalating to abort. Returns `false` if abandoned.
    fn wind_down(&self, run: &mut RunState, idx: usize, timeout: Duration) -> bool {
        let name = &self.slots[idx].name;
        if run.await_exit(idx, Instant::now() + timeout) {
            return true;
        }
        warn!("'{}' did not finish within {:?}, aborting", name, timeout);
        if let Some(signal) = run.signal(idx) {
            signal.request_abort();
        }
        if run.await_exit(idx, Instant::now() + self.config.join_timeout()) {
            return true;
        }
        error!(
            "{}",
            PipelineError::ShutdownTimeout {
                components: vec![name.clone()],
            }
        );
        false
    }

    /// Return components to their slots and build the report
    fn collect_report(&mut self, plan: &CompiledPlan, run: &mut RunState) -> StopReport {
        let mut components = Vec::with_capacity(plan.order.len());
        for &idx in &plan.order {
            let exit = run.exits.remove(&idx);
            let slot = &mut self.slots[idx];
            let (outcome, counters) = match exit {
                Some(exit) => {
                    slot.component = Some(exit.component);
                    (Some(exit.outcome), exit.counters)
                }
                None if slot.kind.has_worker() && run.workers.contains_key(&idx) => {
                    (Some(WorkerOutcome::Abandoned), WorkerCounters::default())
                }
                None => (None, WorkerCounters::default()),
            };
            let lost_samples = run.readers[idx]
                .iter()
                .filter_map(|&(source, reader)| {
                    let stats = run.buffers[source].as_ref()?.stats();
                    stats.readers.get(reader.index()).map(|r| r.lost)
                })
                .sum();
            let dropped_events = run.queues[idx].as_ref().map_or(0, |q| q.dropped());
            components.push(ComponentReport {
                id: ComponentId(idx as u32),
                name: slot.name.clone(),
                kind: slot.kind,
                outcome,
                counters,
                lost_samples,
                dropped_events,
            });
        }
        StopReport {
            components,
            run_time: run.started_at.elapsed(),
        }
    }

    /// Return a stopped pipeline to `Configured`. A no-op when already configured.
    pub fn reset(&mut self) -> PipelineResult<()> {
        match self.state {
            PipelineState::Configured => Ok(()),
            PipelineState::Stopped => {
                self.plan = None;
                self.run = None;
                self.last_report = None;
                self.state = PipelineState::Configured;
                info!("Pipeline reset");
                Ok(())
            }
            state => Err(PipelineError::InvalidState {
                operation: "reset",
                state,
            }),
        }
    }

    // ── Observers ──

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Number of components in the graph
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn component_name(&self, id: ComponentId) -> Option<&str> {
        self.slots.get(id.index()).map(|s| s.name.as_str())
    }

    pub fn component_kind(&self, id: ComponentId) -> Option<ComponentKind> {
        self.slots.get(id.index()).map(|s| s.kind)
    }

    /// Options of a component that is not currently owned by a worker
    pub fn options(&self, id: ComponentId) -> Option<&Options> {
        self.slots
            .get(id.index())?
            .component
            .as_ref()
            .and_then(Component::options)
    }

    /// Worker threads currently alive
    pub fn live_workers(&self) -> usize {
        self.run.as_ref().map_or(0, |run| run.shared.live.get())
    }

    /// Wait until every provider and stage worker has ended on its own,
    /// e.g. after a file source reached its end. Handlers keep running until
    /// `stop`. Returns `false` on timeout.
    pub fn wait_until_finished(&self, timeout: Duration) -> bool {
        match &self.run {
            Some(run) => run.shared.streams.wait_zero(timeout),
            None => true,
        }
    }

    /// Counters of the buffer written by `id` during the current run
    pub fn buffer_stats(&self, id: ComponentId) -> Option<BufferStats> {
        self.run
            .as_ref()?
            .buffers
            .get(id.index())?
            .as_ref()
            .map(|b| b.stats())
    }

    pub fn last_report(&self) -> Option<&StopReport> {
        self.last_report.as_ref()
    }

    /// Rendezvous handed to sensors in their connect phase
    pub fn rendezvous(&self) -> Rendezvous {
        self.rendezvous.clone()
    }

    /// Plan of the current or last run
    pub fn plan(&self) -> Option<&CompiledPlan> {
        self.plan.as_ref()
    }

    // ── Internals ──

    fn ensure_configured(&self, operation: &'static str) -> PipelineResult<()> {
        if self.state.is_mutable() {
            Ok(())
        } else {
            Err(PipelineError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn slot(&self, id: ComponentId) -> PipelineResult<&ComponentSlot> {
        self.slots
            .get(id.index())
            .ok_or(PipelineError::UnknownComponent(id))
    }

    fn push(&mut self, component: Component) -> ComponentId {
        let id = ComponentId(self.slots.len() as u32);
        debug!("Adding {} '{}' as {}", component.kind(), component.name(), id);
        self.slots.push(ComponentSlot::new(component));
        id
    }

    fn attach_provider(&mut self, sensor: ComponentId, provider: Box<dyn Provider>) -> ComponentId {
        let id = self.push(Component::Provider(provider));
        self.slots[id.index()].sensor = Some(sensor);
        id
    }

    fn check_stream_source(&self, input: ComponentId) -> PipelineResult<()> {
        let source = self.slot(input)?;
        if source.kind.produces_stream() {
            Ok(())
        } else {
            Err(PipelineError::Configuration(format!(
                "{} '{}' produces no stream",
                source.kind, source.name
            )))
        }
    }

    fn add_stage(
        &mut self,
        component: Component,
        inputs: &[ComponentId],
        frame: FrameSpec,
    ) -> PipelineResult<ComponentId> {
        for &input in inputs {
            self.check_stream_source(input)?;
        }
        let id = self.push(component);
        let slot = &mut self.slots[id.index()];
        slot.inputs = inputs.to_vec();
        slot.frame = Some(frame);
        Ok(id)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.state == PipelineState::Running {
            if let Err(e) = self.stop() {
                error!("Stop on drop failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("components", &self.slots.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}
