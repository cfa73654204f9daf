//! Turns threshold crossings of one input dimension into events.

use crate::config::options::keys;
use crate::config::Options;
use crate::pipeline::component::{Consumer, ProcessContext};
use crate::pipeline::error::ComponentError;
use crate::pipeline::event::{Event, EventPayload, EventState};
use crate::pipeline::stream::{Stream, StreamDescriptor};
use std::sync::Arc;
use tracing::{trace, warn};

const DIMENSION: &str = "dimension";
const EVENT_NAME: &str = "eventName";
const UPDATE_INTERVAL: &str = "updateInterval";

#[derive(Debug, Clone, Copy)]
struct Active {
    start: f64,
    peak: f64,
    last_update: f64,
}

/// Hysteresis detector.
///
/// An event starts when the value rises above `thresholdHigh` and ends when
/// it falls below `thresholdLow`. On the falling edge a `Completed` event is
/// emitted carrying the start time, the duration and the peak value. With
/// `updateInterval` > 0, `Continued` events are emitted at that interval while
/// the event is active.
pub struct ThresholdEventSender {
    name: String,
    options: Options,
    low: f64,
    high: f64,
    dimension: usize,
    update_interval: f64,
    event_name: String,
    active: Option<Active>,
}

impl ThresholdEventSender {
    pub fn new(name: impl Into<String>, low: f64, high: f64) -> Self {
        let mut options = Options::new()
            .float(keys::THRESHOLD_LOW, 0.0, "Value below which an active event ends")
            .float(keys::THRESHOLD_HIGH, 1.0, "Value above which an event starts")
            .int(DIMENSION, 0, "Input dimension to watch")
            .text(EVENT_NAME, "threshold", "Name of emitted events")
            .float(UPDATE_INTERVAL, 0.0, "Seconds between Continued updates, 0 for none");
        options.preset(keys::THRESHOLD_LOW, low);
        options.preset(keys::THRESHOLD_HIGH, high);
        Self {
            name: name.into(),
            options,
            low,
            high,
            dimension: 0,
            update_interval: 0.0,
            event_name: String::new(),
            active: None,
        }
    }

    pub fn with_update_interval(mut self, seconds: f64) -> Self {
        self.options.preset(UPDATE_INTERVAL, seconds);
        self
    }

    fn event(&self, active: &Active, now: f64, state: EventState) -> Event {
        Event::new(self.name.clone(), self.event_name.clone())
            .at(secs_to_ms(active.start))
            .lasting(secs_to_ms(now - active.start))
            .with_state(state)
            .with_payload(EventPayload::Floats(vec![active.peak]))
    }

    fn step(&mut self, value: f64, now: f64, ctx: &ProcessContext) {
        let current = self.active;
        match current {
            None if value > self.high => {
                trace!("'{}' rose above {} at {:.3}s", self.name, self.high, now);
                self.active = Some(Active {
                    start: now,
                    peak: value,
                    last_update: now,
                });
            }
            None => {}
            Some(active) if value < self.low => {
                ctx.emit(self.event(&active, now, EventState::Completed));
                self.active = None;
            }
            Some(mut active) => {
                active.peak = active.peak.max(value);
                if self.update_interval > 0.0 && now - active.last_update >= self.update_interval {
                    active.last_update = now;
                    ctx.emit(self.event(&active, now, EventState::Continued));
                }
                self.active = Some(active);
            }
        }
    }
}

fn secs_to_ms(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

impl Consumer for ThresholdEventSender {
    fn name(&self) -> &str {
        &self.name
    }

    fn enter(&mut self, inputs: &[Arc<StreamDescriptor>]) -> Result<(), ComponentError> {
        self.low = self.options.get_float(keys::THRESHOLD_LOW)?;
        self.high = self.options.get_float(keys::THRESHOLD_HIGH)?;
        if self.low > self.high {
            return Err(ComponentError::Failed(format!(
                "{} ({}) above {} ({})",
                keys::THRESHOLD_LOW,
                self.low,
                keys::THRESHOLD_HIGH,
                self.high
            )));
        }
        self.dimension = self.options.get_usize(DIMENSION)?;
        if inputs.first().map_or(true, |d| self.dimension >= d.dim) {
            return Err(ComponentError::Failed(format!(
                "dimension {} not present in the first input",
                self.dimension
            )));
        }
        self.update_interval = self.options.get_float(UPDATE_INTERVAL)?;
        self.event_name = self.options.get_text(EVENT_NAME)?.to_string();
        self.active = None;
        Ok(())
    }

    fn process(&mut self, inputs: &[Stream], ctx: &ProcessContext) -> Result<(), ComponentError> {
        let Some(input) = inputs.first() else {
            return Ok(());
        };
        if !ctx.has_events() && ctx.activation == 0 {
            warn!("'{}' owns no event channel, crossings are not reported", self.name);
        }
        // With overlapping frames only the samples this activation steps past are new
        let fresh = ctx.steps.first().copied().unwrap_or(input.num()).min(input.num());
        let rate = input.sample_rate();
        for i in 0..fresh {
            if let Some(value) = input.get_f64(i, self.dimension) {
                self.step(value, input.time() + i as f64 / rate, ctx);
            }
        }
        Ok(())
    }

    fn exit(&mut self) -> Result<(), ComponentError> {
        if let Some(active) = self.active.take() {
            warn!(
                "'{}' stopped during an active event started at {:.3}s",
                self.name, active.start
            );
        }
        Ok(())
    }

    fn options(&self) -> Option<&Options> {
        Some(&self.options)
    }

    fn options_mut(&mut self) -> Option<&mut Options> {
        Some(&mut self.options)
    }
}
