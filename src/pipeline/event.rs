//! Out-of-band events and their channels.
//!
//! A component emits [`Event`]s on its own channel. Every listener owns one
//! bounded queue and one thread; a channel fans each event out to the queues
//! of all listeners subscribed to it, so each listener sees each event once
//! and in push order.
//!
//! When a listener falls behind, a push blocks for at most the configured
//! push timeout. After that the oldest event in that listener's queue is
//! dropped (and counted) to make room, and the producer moves on.

use crate::pipeline::id::ChannelId;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Whether an event is still ongoing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventState {
    Continued,
    #[default]
    Completed,
}

/// Opaque event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum EventPayload {
    #[default]
    Empty,
    Text(String),
    Floats(Vec<f64>),
    Ints(Vec<i64>),
    Bytes(Vec<u8>),
}

/// An event as delivered to listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub sender: String,
    pub name: String,
    /// Milliseconds since the pipeline started
    pub time_ms: u64,
    pub duration_ms: u64,
    pub state: EventState,
    pub payload: EventPayload,
    /// Position in the channel's push order, assigned on push
    pub seq: u64,
}

impl Event {
    pub fn new(sender: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            name: name.into(),
            time_ms: 0,
            duration_ms: 0,
            state: EventState::Completed,
            payload: EventPayload::Empty,
            seq: 0,
        }
    }

    pub fn at(mut self, time_ms: u64) -> Self {
        self.time_ms = time_ms;
        self
    }

    pub fn lasting(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_state(mut self, state: EventState) -> Self {
        self.state = state;
        self
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }
}

/// What a listener gets alongside each event
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    pub listener: &'a str,
    /// Events this listener has lost to queue overflow so far
    pub dropped: u64,
    events: Option<&'a EventSender>,
}

impl<'a> EventContext<'a> {
    pub fn new(listener: &'a str, dropped: u64) -> Self {
        Self {
            listener,
            dropped,
            events: None,
        }
    }

    pub(crate) fn with_events(mut self, events: Option<&'a EventSender>) -> Self {
        self.events = events;
        self
    }

    /// Emit on the listener's own channel. Returns the sequence number, or
    /// `None` if the listener owns no channel.
    pub fn emit(&self, event: Event) -> Option<u64> {
        self.events.map(|sender| sender.emit(event))
    }
}

/// Bounded queue feeding one listener thread
pub(crate) struct ListenerQueue {
    name: String,
    tx: Sender<Arc<Event>>,
    rx: Receiver<Arc<Event>>,
    dropped: AtomicU64,
    delivered: AtomicU64,
}

impl ListenerQueue {
    pub(crate) fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            name: name.into(),
            tx,
            rx,
            dropped: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue, evicting the oldest event after `timeout` if the queue stays full
    fn push(&self, event: Arc<Event>, timeout: Duration) {
        let event = match self.tx.send_timeout(event, timeout) {
            Ok(()) => return,
            Err(SendTimeoutError::Timeout(event)) => event,
            Err(SendTimeoutError::Disconnected(_)) => return,
        };
        if let Ok(evicted) = self.rx.try_recv() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "Listener '{}' queue full, dropped event '{}' #{} ({} dropped so far)",
                self.name, evicted.name, evicted.seq, total
            );
        }
        if let Err(TrySendError::Full(lost) | TrySendError::Disconnected(lost)) = self.tx.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Listener '{}' queue still full, dropped event '{}'", self.name, lost.name);
        }
    }

    /// Next event, or `None` after `timeout`
    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Option<Arc<Event>> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                Some(event)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&self) -> Option<Arc<Event>> {
        let event = self.rx.try_recv().ok()?;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Some(event)
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }
}

/// Run-time state of one channel
struct ChannelRuntime {
    id: ChannelId,
    next_seq: AtomicU64,
    listeners: Vec<Arc<ListenerQueue>>,
    push_timeout: Duration,
}

/// Cloneable handle used by a component to emit on its channel
#[derive(Clone)]
pub struct EventSender {
    channel: Arc<ChannelRuntime>,
}

impl EventSender {
    pub(crate) fn new(
        id: ChannelId,
        listeners: Vec<Arc<ListenerQueue>>,
        push_timeout: Duration,
    ) -> Self {
        Self {
            channel: Arc::new(ChannelRuntime {
                id,
                next_seq: AtomicU64::new(0),
                listeners,
                push_timeout,
            }),
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel.id
    }

    /// Number of listeners this channel fans out to
    pub fn listeners(&self) -> usize {
        self.channel.listeners.len()
    }

    /// Stamp `event` with the next sequence number and deliver it to every
    /// subscribed listener. Returns the sequence number.
    pub fn emit(&self, mut event: Event) -> u64 {
        let seq = self.channel.next_seq.fetch_add(1, Ordering::Relaxed);
        event.seq = seq;
        let event = Arc::new(event);
        for queue in &self.channel.listeners {
            queue.push(event.clone(), self.channel.push_timeout);
        }
        seq
    }

    /// Events pushed so far
    pub fn pushed(&self) -> u64 {
        self.channel.next_seq.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("channel", &self.channel.id)
            .field("listeners", &self.channel.listeners.len())
            .finish()
    }
}
