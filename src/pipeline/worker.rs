//! Worker threads.
//!
//! Every provider, transformer, consumer and event handler runs on its own
//! thread for the length of one run. The component is moved into the thread
//! and sent back over the run's exit channel when the worker ends, together
//! with its counters and outcome.
//!
//! - Providers loop until asked to stop: clocked by the monotonic clock when
//!   realtime, by buffer space when unpaced.
//! - Stages ignore stop requests and drain their inputs until every input is
//!   exhausted; only an abort ends them early. Transformers wait for space in
//!   their output, so a slow reader throttles the stages feeding it.
//! - Handlers drain their queue once stop is requested. A handler that owns a
//!   channel forwards events through it while draining.

use crate::pipeline::buffer::{TimeBuffer, WriteOutcome};
use crate::pipeline::component::{
    Component, Consumer, EventListener, Pacing, ProcessContext, Provider, ProviderStatus,
    Transformer,
};
use crate::pipeline::error::{BufferError, ComponentError, PipelineError};
use crate::pipeline::event::{EventContext, EventSender, ListenerQueue};
use crate::pipeline::id::{ComponentId, ReaderId};
use crate::pipeline::stats::{WorkerCounters, WorkerOutcome};
use crate::pipeline::stream::Stream;
use crate::pipeline::window::WindowResolver;
use crossbeam_channel::{bounded, Sender};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct SignalFlags {
    stop: bool,
    abort: bool,
}

/// Cooperative stop/abort request for one worker
#[derive(Default)]
pub(crate) struct StopSignal {
    flags: Mutex<SignalFlags>,
    cvar: Condvar,
}

impl StopSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn request_stop(&self) {
        self.flags.lock().stop = true;
        self.cvar.notify_all();
    }

    pub(crate) fn request_abort(&self) {
        let mut flags = self.flags.lock();
        flags.stop = true;
        flags.abort = true;
        drop(flags);
        self.cvar.notify_all();
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.flags.lock().stop
    }

    pub(crate) fn abort_requested(&self) -> bool {
        self.flags.lock().abort
    }

    /// Sleep until `deadline` unless signalled first. Returns whether a stop was requested.
    pub(crate) fn sleep_until(&self, deadline: Instant) -> bool {
        let mut flags = self.flags.lock();
        while !flags.stop {
            if self.cvar.wait_until(&mut flags, deadline).timed_out() {
                break;
            }
        }
        flags.stop
    }
}

/// Number of live worker threads
#[derive(Default)]
pub(crate) struct LiveCounter {
    count: Mutex<usize>,
    cvar: Condvar,
}

impl LiveCounter {
    pub(crate) fn add(&self) {
        *self.count.lock() += 1;
    }

    pub(crate) fn done(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.cvar.notify_all();
        }
    }

    pub(crate) fn get(&self) -> usize {
        *self.count.lock()
    }

    /// Wait until no worker is live. Returns `false` on timeout.
    pub(crate) fn wait_zero(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.cvar.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

/// Sent by every worker when it ends
pub(crate) struct WorkerExit {
    pub(crate) id: ComponentId,
    pub(crate) component: Component,
    pub(crate) outcome: WorkerOutcome,
    pub(crate) counters: WorkerCounters,
}

/// State shared by all workers of one run
pub(crate) struct RunShared {
    pub(crate) start: Instant,
    /// Every live worker
    pub(crate) live: LiveCounter,
    /// Live provider and stage workers
    pub(crate) streams: LiveCounter,
    fault: AtomicBool,
    fatal_errors: bool,
    done_tx: Sender<WorkerExit>,
}

impl RunShared {
    pub(crate) fn new(fatal_errors: bool, done_tx: Sender<WorkerExit>) -> Self {
        Self {
            start: Instant::now(),
            live: LiveCounter::default(),
            streams: LiveCounter::default(),
            fault: AtomicBool::new(false),
            fatal_errors,
            done_tx,
        }
    }

    pub(crate) fn faulted(&self) -> bool {
        self.fault.load(Ordering::Acquire)
    }

    fn report_failure(&self, component: &str) {
        if self.fatal_errors && !self.fault.swap(true, Ordering::AcqRel) {
            error!("Aborting run after failure in '{}'", component);
        }
    }
}

struct LiveGuard {
    shared: Arc<RunShared>,
    stream: bool,
}

impl LiveGuard {
    fn new(shared: Arc<RunShared>, stream: bool) -> Self {
        shared.live.add();
        if stream {
            shared.streams.add();
        }
        Self { shared, stream }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        if self.stream {
            self.shared.streams.done();
        }
        self.shared.live.done();
    }
}

/// One stream input of a stage
pub(crate) struct StageInput {
    pub(crate) buffer: Arc<TimeBuffer>,
    pub(crate) reader: ReaderId,
    pub(crate) resolver: WindowResolver,
}

/// What a worker thread runs
pub(crate) enum WorkerJob {
    Provider {
        provider: Box<dyn Provider>,
        output: Arc<TimeBuffer>,
        block: usize,
    },
    Transformer {
        transformer: Box<dyn Transformer>,
        inputs: Vec<StageInput>,
        output: Arc<TimeBuffer>,
        block: usize,
        chunk: usize,
        read_timeout: Duration,
    },
    Consumer {
        consumer: Box<dyn Consumer>,
        inputs: Vec<StageInput>,
        read_timeout: Duration,
    },
    Listener {
        listener: Box<dyn EventListener>,
        queue: Arc<ListenerQueue>,
    },
}

impl WorkerJob {
    /// The component a job would have run
    pub(crate) fn into_component(self) -> Component {
        match self {
            WorkerJob::Provider { provider, .. } => Component::Provider(provider),
            WorkerJob::Transformer { transformer, .. } => Component::Transformer(transformer),
            WorkerJob::Consumer { consumer, .. } => Component::Consumer(consumer),
            WorkerJob::Listener { listener, .. } => Component::EventHandler(listener),
        }
    }
}

/// Per-worker context
pub(crate) struct WorkerContext {
    pub(crate) id: ComponentId,
    pub(crate) name: String,
    pub(crate) signal: Arc<StopSignal>,
    pub(crate) shared: Arc<RunShared>,
    pub(crate) events: Option<EventSender>,
    /// Poll granularity for clocks and queues
    pub(crate) tick: Duration,
}

impl WorkerContext {
    fn fail(&self, message: String, counters: &mut WorkerCounters) -> WorkerOutcome {
        counters.errors += 1;
        error!(
            "{}",
            PipelineError::Processing {
                component: self.name.clone(),
                message: message.clone(),
            }
        );
        self.shared.report_failure(&self.name);
        WorkerOutcome::Failed(message)
    }

    fn write(
        &self,
        output: &TimeBuffer,
        stream: &Stream,
        counters: &mut WorkerCounters,
    ) -> Result<(), BufferError> {
        if let WriteOutcome::Overrun { lost } = output.write(stream)? {
            counters.overruns += 1;
            warn!(
                "{}",
                PipelineError::BufferOverrun {
                    component: self.name.clone(),
                    lost,
                }
            );
        }
        counters.samples_written += stream.num() as u64;
        Ok(())
    }

    /// Write `stream` in chunks of at most `chunk` samples, waiting for space
    /// before each one. An abort stops the waiting, not the write.
    fn write_throttled(
        &self,
        output: &TimeBuffer,
        stream: &Stream,
        chunk: usize,
        scratch: &mut Stream,
        counters: &mut WorkerCounters,
    ) -> Result<(), BufferError> {
        let chunk = chunk.max(1);
        let rate = stream.sample_rate();
        let mut offset = 0;
        while offset < stream.num() {
            let n = chunk.min(stream.num() - offset);
            while !output.wait_for_space(n, self.tick) {
                if self.signal.abort_requested() || self.shared.faulted() || output.is_closed() {
                    break;
                }
            }
            if offset == 0 && n == stream.num() {
                return self.write(output, stream, counters);
            }
            scratch.resize(n);
            scratch.copy_samples_from(0, stream, offset, n)?;
            scratch.set_time(stream.time() + offset as f64 / rate);
            self.write(output, scratch, counters)?;
            offset += n;
        }
        Ok(())
    }

    /// Run an exit hook, logging its failure
    fn finish(
        &self,
        counters: &mut WorkerCounters,
        exit: impl FnOnce() -> Result<(), ComponentError>,
    ) {
        if let Err(message) = guarded(exit) {
            counters.errors += 1;
            error!("Exit hook of '{}' failed: {}", self.name, message);
        }
    }
}

/// Start a worker thread for `job`. On failure the job is handed back.
pub(crate) fn spawn_worker(
    ctx: WorkerContext,
    job: WorkerJob,
) -> Result<JoinHandle<()>, (std::io::Error, WorkerJob)> {
    // Counted before the thread exists so `live_workers` never misses a starting worker
    let guard = LiveGuard::new(ctx.shared.clone(), !matches!(job, WorkerJob::Listener { .. }));
    let (job_tx, job_rx) = bounded::<WorkerJob>(1);
    let spawned = thread::Builder::new()
        .name(format!("sigflow-{}", ctx.name))
        .spawn(move || {
            let _guard = guard;
            let Ok(job) = job_rx.recv() else {
                return;
            };
            debug!("Worker '{}' started", ctx.name);
            let mut counters = WorkerCounters::default();
            let (component, outcome) = match job {
                WorkerJob::Provider {
                    provider,
                    output,
                    block,
                } => run_provider(&ctx, provider, &output, block, &mut counters),
                WorkerJob::Transformer {
                    transformer,
                    mut inputs,
                    output,
                    block,
                    chunk,
                    read_timeout,
                } => {
                    let mut stage = Stage::Transformer {
                        transformer,
                        output: output.clone(),
                        stream: Stream::new(output.descriptor().clone(), block),
                        scratch: Stream::new(output.descriptor().clone(), 0),
                        block,
                        chunk,
                    };
                    let outcome = stage_loop(&ctx, &mut stage, &mut inputs, read_timeout, &mut counters);
                    (stage.finish(&ctx, &inputs, &mut counters), outcome)
                }
                WorkerJob::Consumer {
                    consumer,
                    mut inputs,
                    read_timeout,
                } => {
                    let mut stage = Stage::Consumer(consumer);
                    let outcome = stage_loop(&ctx, &mut stage, &mut inputs, read_timeout, &mut counters);
                    (stage.finish(&ctx, &inputs, &mut counters), outcome)
                }
                WorkerJob::Listener { listener, queue } => {
                    run_listener(&ctx, listener, &queue, &mut counters)
                }
            };
            info!(
                "Worker '{}' ended: {:?} after {} activations",
                ctx.name, outcome, counters.activations
            );
            let _ = ctx.shared.done_tx.send(WorkerExit {
                id: ctx.id,
                component,
                outcome,
                counters,
            });
        });
    match spawned {
        Ok(handle) => {
            let _ = job_tx.send(job);
            Ok(handle)
        }
        Err(e) => Err((e, job)),
    }
}

/// Run a component hook, turning errors and panics into a message
fn guarded<T>(f: impl FnOnce() -> Result<T, ComponentError>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn run_provider(
    ctx: &WorkerContext,
    mut provider: Box<dyn Provider>,
    output: &TimeBuffer,
    block: usize,
    counters: &mut WorkerCounters,
) -> (Component, WorkerOutcome) {
    let outcome = provider_loop(ctx, provider.as_mut(), output, block, counters);
    ctx.finish(counters, || provider.exit());
    output.close();
    (Component::Provider(provider), outcome)
}

fn provider_loop(
    ctx: &WorkerContext,
    provider: &mut dyn Provider,
    output: &TimeBuffer,
    block: usize,
    counters: &mut WorkerCounters,
) -> WorkerOutcome {
    let descriptor = output.descriptor().clone();
    let rate = descriptor.sample_rate;
    let pacing = provider.pacing();
    let block = block.max(1);
    let mut stream = Stream::new(descriptor, block);
    let mut produced: u64 = 0;

    loop {
        if ctx.signal.stop_requested() {
            return WorkerOutcome::Stopped;
        }
        if ctx.shared.faulted() {
            return WorkerOutcome::Aborted;
        }

        let n = match pacing {
            Pacing::Realtime => {
                let due = (ctx.shared.start.elapsed().as_secs_f64() * rate).floor() as u64;
                let pending = due.saturating_sub(produced);
                if pending == 0 {
                    let next = ctx.shared.start
                        + Duration::from_secs_f64((produced + 1) as f64 / rate);
                    ctx.signal.sleep_until(next.min(Instant::now() + ctx.tick));
                    continue;
                }
                pending.min(block as u64) as usize
            }
            Pacing::Unpaced => {
                if !output.wait_for_space(block, ctx.tick) {
                    continue;
                }
                block
            }
        };

        stream.resize(n);
        stream.set_time(produced as f64 / rate);
        let process_ctx = ProcessContext::new(
            &ctx.name,
            counters.activations,
            stream.time(),
            &[],
            ctx.events.as_ref(),
        );
        let status = match guarded(|| provider.process(&mut stream, &process_ctx)) {
            Ok(status) => status,
            Err(message) => return ctx.fail(message, counters),
        };

        let filled = match status {
            ProviderStatus::Ready => n,
            ProviderStatus::Exhausted { filled } => filled.min(n),
        };
        if filled > 0 {
            stream.resize(filled);
            if let Err(e) = ctx.write(output, &stream, counters) {
                return ctx.fail(e.to_string(), counters);
            }
            produced += filled as u64;
        }
        counters.activations += 1;

        if let ProviderStatus::Exhausted { .. } = status {
            info!("Provider '{}' exhausted after {} samples", ctx.name, produced);
            return WorkerOutcome::Exhausted;
        }
    }
}

enum Stage {
    Transformer {
        transformer: Box<dyn Transformer>,
        output: Arc<TimeBuffer>,
        stream: Stream,
        scratch: Stream,
        block: usize,
        chunk: usize,
    },
    Consumer(Box<dyn Consumer>),
}

impl Stage {
    fn process(
        &mut self,
        ctx: &WorkerContext,
        windows: &[Stream],
        process_ctx: &ProcessContext,
        counters: &mut WorkerCounters,
    ) -> Result<(), String> {
        match self {
            Stage::Transformer {
                transformer,
                output,
                stream,
                scratch,
                block,
                chunk,
            } => {
                stream.resize(*block);
                stream.set_time(process_ctx.time);
                guarded(|| transformer.process(windows, stream, process_ctx))?;
                ctx.write_throttled(output, stream, *chunk, scratch, counters)
                    .map_err(|e| e.to_string())
            }
            Stage::Consumer(consumer) => guarded(|| consumer.process(windows, process_ctx)),
        }
    }

    /// Release inputs, run the exit hook, close the output
    fn finish(
        self,
        ctx: &WorkerContext,
        inputs: &[StageInput],
        counters: &mut WorkerCounters,
    ) -> Component {
        for input in inputs {
            input.buffer.deactivate_reader(input.reader);
        }
        match self {
            Stage::Transformer {
                mut transformer,
                output,
                ..
            } => {
                ctx.finish(counters, || transformer.exit());
                output.close();
                Component::Transformer(transformer)
            }
            Stage::Consumer(mut consumer) => {
                ctx.finish(counters, || consumer.exit());
                Component::Consumer(consumer)
            }
        }
    }
}

fn stage_loop(
    ctx: &WorkerContext,
    stage: &mut Stage,
    inputs: &mut [StageInput],
    read_timeout: Duration,
    counters: &mut WorkerCounters,
) -> WorkerOutcome {
    let mut windows: Vec<Stream> = inputs
        .iter()
        .map(|input| Stream::new(input.buffer.descriptor().clone(), 0))
        .collect();
    let mut steps = vec![0usize; inputs.len()];

    'activation: loop {
        if ctx.signal.abort_requested() || ctx.shared.faulted() {
            return WorkerOutcome::Aborted;
        }

        for (i, input) in inputs.iter().enumerate() {
            let window = input.resolver.peek();
            match input
                .buffer
                .read_next_into(input.reader, window.frame, read_timeout, &mut windows[i])
            {
                Ok(()) => steps[i] = window.step,
                Err(e @ BufferError::Underrun { .. }) => {
                    counters.underruns += 1;
                    warn!(
                        "{}",
                        PipelineError::BufferUnderrun {
                            component: ctx.name.clone(),
                            source: e,
                        }
                    );
                    continue 'activation;
                }
                Err(BufferError::Exhausted { available }) => {
                    debug!(
                        "Input {} of '{}' exhausted with {} samples left",
                        i, ctx.name, available
                    );
                    return WorkerOutcome::Exhausted;
                }
                Err(e) => return ctx.fail(e.to_string(), counters),
            }
        }

        let time = windows.first().map(Stream::time).unwrap_or(0.0);
        let process_ctx = ProcessContext::new(
            &ctx.name,
            counters.activations,
            time,
            &steps,
            ctx.events.as_ref(),
        );
        if let Err(message) = stage.process(ctx, &windows, &process_ctx, counters) {
            return ctx.fail(message, counters);
        }

        for (input, &step) in inputs.iter_mut().zip(&steps) {
            if let Err(e) = input.buffer.advance(input.reader, step) {
                return ctx.fail(e.to_string(), counters);
            }
            input.resolver.commit();
        }
        counters.activations += 1;
    }
}

fn run_listener(
    ctx: &WorkerContext,
    mut listener: Box<dyn EventListener>,
    queue: &ListenerQueue,
    counters: &mut WorkerCounters,
) -> (Component, WorkerOutcome) {
    let outcome = loop {
        if ctx.signal.abort_requested() {
            break WorkerOutcome::Aborted;
        }
        match queue.recv_timeout(ctx.tick) {
            Some(event) => {
                let event_ctx =
                    EventContext::new(&ctx.name, queue.dropped()).with_events(ctx.events.as_ref());
                match guarded(|| listener.notify(&event, &event_ctx)) {
                    Ok(()) => counters.activations += 1,
                    Err(message) => {
                        counters.errors += 1;
                        error!(
                            "Listener '{}' failed on event '{}' #{}: {}",
                            ctx.name, event.name, event.seq, message
                        );
                    }
                }
            }
            None if ctx.signal.stop_requested() && queue.len() == 0 => {
                break WorkerOutcome::Stopped;
            }
            None => {}
        }
    };
    ctx.finish(counters, || listener.exit());
    debug!(
        "Listener '{}' delivered {} events, dropped {}",
        queue.name(),
        queue.delivered(),
        queue.dropped()
    );
    (Component::EventHandler(listener), outcome)
}
