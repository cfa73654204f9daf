//! Fixed-capacity circular sample buffer with one writer and many readers.
//!
//! Every stream-producing component owns one [`TimeBuffer`]. Downstream stages
//! register a reader each and pull windows from their own cursor. Reads block
//! on a condition variable until the requested window is complete, the writer
//! closes, or the timeout passes. Partial windows are never returned.
//!
//! When the writer laps a reader, the write still commits. Samples that were
//! overwritten before any window of that reader covered them are counted as
//! lost, both for the reader and for the buffer. The reader's next window
//! starts at the oldest retained sample.

use crate::pipeline::error::{BufferError, StreamError};
use crate::pipeline::id::ReaderId;
use crate::pipeline::stream::{Stream, StreamDescriptor};
use crate::types::SampleData;
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a committed write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The write overwrote unread samples of at least one reader
    Overrun { lost: u64 },
}

/// Per-reader counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderStats {
    pub name: String,
    pub cursor: u64,
    pub lost: u64,
    pub active: bool,
}

/// Snapshot of buffer counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferStats {
    pub capacity: usize,
    pub written: u64,
    pub overrun_events: u64,
    pub lost_samples: u64,
    pub closed: bool,
    pub readers: Vec<ReaderStats>,
}

struct ReaderState {
    name: String,
    /// Start of the next window; may fall behind the oldest retained sample
    cursor: u64,
    /// Everything below was delivered, stepped over or already counted as lost
    seen: u64,
    lost: u64,
    active: bool,
}

impl ReaderState {
    /// Where the next window really starts
    fn position(&self, oldest: u64) -> u64 {
        self.cursor.max(oldest)
    }
}

struct BufferInner {
    storage: SampleData,
    /// Absolute index of the next sample to be written
    written: u64,
    /// Time of absolute sample 0, taken from the first write
    origin: Option<f64>,
    closed: bool,
    readers: Vec<ReaderState>,
    overrun_events: u64,
    lost_samples: u64,
}

impl BufferInner {
    fn oldest(&self, capacity: usize) -> u64 {
        self.written.saturating_sub(capacity as u64)
    }

    fn min_active_cursor(&self, capacity: usize) -> Option<u64> {
        let oldest = self.oldest(capacity);
        self.readers
            .iter()
            .filter(|r| r.active)
            .map(|r| r.position(oldest))
            .min()
    }
}

/// Circular storage for one stream.
pub struct TimeBuffer {
    descriptor: Arc<StreamDescriptor>,
    capacity: usize,
    inner: Mutex<BufferInner>,
    /// Signalled on write and close
    readable: Condvar,
    /// Signalled when readers advance or go away
    writable: Condvar,
}

impl TimeBuffer {
    /// A buffer holding `capacity` samples of `descriptor`'s shape
    pub fn new(descriptor: Arc<StreamDescriptor>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let storage = SampleData::zeroed(descriptor.sample_type, capacity * descriptor.dim);
        Self {
            descriptor,
            capacity,
            inner: Mutex::new(BufferInner {
                storage,
                written: 0,
                origin: None,
                closed: false,
                readers: Vec::new(),
                overrun_events: 0,
                lost_samples: 0,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    /// A buffer sized to hold `seconds` of data, rounded up to whole samples
    pub fn with_duration(descriptor: Arc<StreamDescriptor>, seconds: f64) -> Self {
        let capacity = Self::capacity_for(&descriptor, seconds);
        Self::new(descriptor, capacity)
    }

    /// `ceil(seconds * rate)`, at least one sample
    pub fn capacity_for(descriptor: &StreamDescriptor, seconds: f64) -> usize {
        ((seconds * descriptor.sample_rate).ceil() as usize).max(1)
    }

    pub fn descriptor(&self) -> &Arc<StreamDescriptor> {
        &self.descriptor
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a reader whose cursor starts at the current write position
    pub fn register_reader(&self, name: impl Into<String>) -> ReaderId {
        let mut inner = self.inner.lock();
        let cursor = inner.written;
        inner.readers.push(ReaderState {
            name: name.into(),
            cursor,
            seen: cursor,
            lost: 0,
            active: true,
        });
        ReaderId((inner.readers.len() - 1) as u32)
    }

    /// Stop tracking a reader for overruns and backpressure
    pub fn deactivate_reader(&self, reader: ReaderId) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.readers.get_mut(reader.index()) {
            state.active = false;
        }
        drop(inner);
        self.writable.notify_all();
    }

    /// Append all samples of `stream`. Always commits while the buffer is open.
    pub fn write(&self, stream: &Stream) -> Result<WriteOutcome, BufferError> {
        let n = stream.num();
        if n > self.capacity {
            return Err(BufferError::TooLarge {
                requested: n,
                capacity: self.capacity,
            });
        }
        self.check_stream(stream)?;

        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(BufferError::Closed);
        }
        if inner.origin.is_none() {
            inner.origin = Some(stream.time() - inner.written as f64 / self.descriptor.sample_rate);
        }

        let new_written = inner.written + n as u64;
        let new_oldest = new_written.saturating_sub(self.capacity as u64);
        let mut lost = 0;
        for reader in inner.readers.iter_mut().filter(|r| r.active) {
            if reader.seen < new_oldest {
                let skipped = new_oldest - reader.seen;
                reader.seen = new_oldest;
                reader.lost += skipped;
                lost += skipped;
            }
        }

        let dim = self.descriptor.dim;
        let mut pos = inner.written;
        let mut copied = 0;
        while copied < n {
            let slot = (pos % self.capacity as u64) as usize;
            let chunk = (n - copied).min(self.capacity - slot);
            inner
                .storage
                .copy_from(slot * dim, stream.data(), copied * dim, chunk * dim)?;
            copied += chunk;
            pos += chunk as u64;
        }
        inner.written = new_written;

        let outcome = if lost > 0 {
            inner.overrun_events += 1;
            inner.lost_samples += lost;
            WriteOutcome::Overrun { lost }
        } else {
            WriteOutcome::Written
        };
        drop(inner);
        self.readable.notify_all();
        Ok(outcome)
    }

    /// Block until `n` more samples fit without lapping any active reader.
    /// Returns `false` on timeout or when the buffer is closed.
    pub fn wait_for_space(&self, n: usize, timeout: Duration) -> bool {
        if n > self.capacity {
            return false;
        }
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return false;
            }
            let fits = match inner.min_active_cursor(self.capacity) {
                None => true,
                Some(cursor) => inner.written + n as u64 <= cursor + self.capacity as u64,
            };
            if fits {
                return true;
            }
            if self.writable.wait_until(&mut inner, deadline).timed_out() {
                return match inner.min_active_cursor(self.capacity) {
                    None => true,
                    Some(cursor) => inner.written + n as u64 <= cursor + self.capacity as u64,
                };
            }
        }
    }

    /// Mark the writer finished. Readers can still drain retained samples.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Copy `count` samples from `reader`'s next window into `out`.
    ///
    /// The window starts at the reader's cursor, or at the oldest retained
    /// sample if the writer lapped the reader. The cursor only moves with
    /// [`advance`](Self::advance).
    pub fn read_next_into(
        &self,
        reader: ReaderId,
        count: usize,
        timeout: Duration,
        out: &mut Stream,
    ) -> Result<(), BufferError> {
        let capacity = self.capacity;
        let mut inner = self.wait_window(count, timeout, |inner| {
            inner
                .readers
                .get(reader.index())
                .map(|r| r.position(inner.oldest(capacity)))
                .ok_or(BufferError::UnknownReader(reader.index()))
        })?;
        let oldest = inner.oldest(capacity);
        let state = &mut inner.readers[reader.index()];
        let start = state.position(oldest);
        state.cursor = start;
        state.seen = state.seen.max(start + count as u64);
        self.copy_window(&inner, start, count, out)
    }

    /// Like [`read_next_into`](Self::read_next_into), returning a new stream
    pub fn read_next(
        &self,
        reader: ReaderId,
        count: usize,
        timeout: Duration,
    ) -> Result<Stream, BufferError> {
        let mut out = Stream::new(self.descriptor.clone(), count);
        self.read_next_into(reader, count, timeout, &mut out)?;
        Ok(out)
    }

    /// Move `reader`'s cursor forward by `count` samples from where its last
    /// window started. Samples stepped over are not counted as lost.
    pub fn advance(&self, reader: ReaderId, count: usize) -> Result<(), BufferError> {
        let mut inner = self.inner.lock();
        let oldest = inner.oldest(self.capacity);
        let state = inner
            .readers
            .get_mut(reader.index())
            .ok_or(BufferError::UnknownReader(reader.index()))?;
        state.cursor = (state.cursor + count as u64).max(oldest);
        state.seen = state.seen.max(state.cursor);
        drop(inner);
        self.writable.notify_all();
        Ok(())
    }

    /// Read the absolute window `[start, start + count)`
    pub fn read(&self, start: u64, count: usize, timeout: Duration) -> Result<Stream, BufferError> {
        let inner = self.wait_window(count, timeout, |_| Ok(start))?;
        let mut out = Stream::new(self.descriptor.clone(), count);
        self.copy_window(&inner, start, count, &mut out)?;
        Ok(out)
    }

    /// Read the window starting at `start_secs` lasting `duration_secs`,
    /// both resolved with the buffer's rate.
    pub fn read_time(
        &self,
        start_secs: f64,
        duration_secs: f64,
        timeout: Duration,
    ) -> Result<Stream, BufferError> {
        let rate = self.descriptor.sample_rate;
        let origin = self.inner.lock().origin.unwrap_or(0.0);
        let offset = ((start_secs - origin) * rate).round();
        let count = (duration_secs * rate).round().max(0.0) as usize;
        if offset < 0.0 {
            let oldest = self.inner.lock().oldest(self.capacity);
            return Err(BufferError::Expired { start: 0, oldest });
        }
        self.read(offset as u64, count, timeout)
    }

    /// Samples written but not yet consumed by `reader`
    pub fn available(&self, reader: ReaderId) -> usize {
        let inner = self.inner.lock();
        inner
            .readers
            .get(reader.index())
            .map(|r| {
                let start = r.position(inner.oldest(self.capacity));
                inner.written.saturating_sub(start) as usize
            })
            .unwrap_or(0)
    }

    pub fn written(&self) -> u64 {
        self.inner.lock().written
    }

    pub fn stats(&self) -> BufferStats {
        let inner = self.inner.lock();
        BufferStats {
            capacity: self.capacity,
            written: inner.written,
            overrun_events: inner.overrun_events,
            lost_samples: inner.lost_samples,
            closed: inner.closed,
            readers: inner
                .readers
                .iter()
                .map(|r| ReaderStats {
                    name: r.name.clone(),
                    cursor: r.cursor,
                    lost: r.lost,
                    active: r.active,
                })
                .collect(),
        }
    }

    fn check_stream(&self, stream: &Stream) -> Result<(), StreamError> {
        let d = stream.descriptor();
        if d.sample_type != self.descriptor.sample_type {
            return Err(StreamError::TypeMismatch {
                expected: self.descriptor.sample_type,
                actual: d.sample_type,
            });
        }
        if d.dim != self.descriptor.dim {
            return Err(StreamError::DimensionMismatch {
                expected: self.descriptor.dim,
                actual: d.dim,
            });
        }
        stream.check_len()
    }

    /// Wait until `[start, start + count)` is fully written, where `start`
    /// is re-evaluated after every wake-up.
    fn wait_window<F>(
        &self,
        count: usize,
        timeout: Duration,
        start_of: F,
    ) -> Result<MutexGuard<'_, BufferInner>, BufferError>
    where
        F: Fn(&BufferInner) -> Result<u64, BufferError>,
    {
        if count > self.capacity {
            return Err(BufferError::TooLarge {
                requested: count,
                capacity: self.capacity,
            });
        }
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        let mut timed_out = false;
        loop {
            let start = start_of(&*inner)?;
            let oldest = inner.oldest(self.capacity);
            if start < oldest {
                return Err(BufferError::Expired { start, oldest });
            }
            let available = inner.written.saturating_sub(start) as usize;
            if available >= count {
                return Ok(inner);
            }
            if inner.closed {
                return Err(BufferError::Exhausted { available });
            }
            if timed_out {
                return Err(BufferError::Underrun {
                    requested: count,
                    available,
                });
            }
            timed_out = self.readable.wait_until(&mut inner, deadline).timed_out();
        }
    }

    fn copy_window(
        &self,
        inner: &BufferInner,
        start: u64,
        count: usize,
        out: &mut Stream,
    ) -> Result<(), BufferError> {
        let dim = self.descriptor.dim;
        if out.num() != count {
            out.resize(count);
        }
        let origin = inner.origin.unwrap_or(0.0);
        out.set_time(origin + start as f64 / self.descriptor.sample_rate);

        let mut copied = 0;
        let mut pos = start;
        while copied < count {
            let slot = (pos % self.capacity as u64) as usize;
            let chunk = (count - copied).min(self.capacity - slot);
            out.data_mut()
                .copy_from(copied * dim, &inner.storage, slot * dim, chunk * dim)?;
            copied += chunk;
            pos += chunk as u64;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TimeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeBuffer")
            .field("descriptor", &self.descriptor)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
