//! Per-run counters and the report returned by `Pipeline::stop`.

use crate::pipeline::component::ComponentKind;
use crate::pipeline::id::ComponentId;
use serde::Serialize;
use std::time::Duration;

/// How a worker ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum WorkerOutcome {
    /// Stop was requested and honored
    Stopped,
    /// Its input (or its device) ran out of data
    Exhausted,
    /// Abort was requested, or another worker failed with fatal errors enabled
    Aborted,
    /// A hook returned an error or panicked
    Failed(String),
    /// Did not exit within the join timeout; its component is lost
    Abandoned,
}

impl WorkerOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, WorkerOutcome::Failed(_) | WorkerOutcome::Abandoned)
    }
}

/// Counters a worker keeps while it runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerCounters {
    pub activations: u64,
    pub underruns: u64,
    /// Writes that overwrote unread samples of a downstream reader
    pub overruns: u64,
    pub samples_written: u64,
    /// Failed hooks, including caught listener failures
    pub errors: u64,
}

/// What one component did during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentReport {
    #[serde(skip)]
    pub id: ComponentId,
    pub name: String,
    pub kind: ComponentKind,
    /// `None` for sensors, which have no worker
    pub outcome: Option<WorkerOutcome>,
    #[serde(flatten)]
    pub counters: WorkerCounters,
    /// Samples this component missed because its inputs were overwritten
    pub lost_samples: u64,
    /// Events dropped from this listener's queue
    pub dropped_events: u64,
}

/// Report of a finished run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StopReport {
    pub components: Vec<ComponentReport>,
    /// Time between the end of `start` and the end of `stop`
    #[serde(with = "duration_secs")]
    pub run_time: Duration,
}

impl StopReport {
    pub fn get(&self, id: ComponentId) -> Option<&ComponentReport> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&ComponentReport> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn abandoned(&self) -> Vec<&str> {
        self.components
            .iter()
            .filter(|c| c.outcome == Some(WorkerOutcome::Abandoned))
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ComponentReport> {
        self.components
            .iter()
            .filter(|c| c.outcome.as_ref().is_some_and(WorkerOutcome::is_failure))
    }

    pub fn total_lost_samples(&self) -> u64 {
        self.components.iter().map(|c| c.lost_samples).sum()
    }

    pub fn total_dropped_events(&self) -> u64 {
        self.components.iter().map(|c| c.dropped_events).sum()
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, outcome: Option<WorkerOutcome>, lost: u64) -> ComponentReport {
        ComponentReport {
            id: ComponentId(0),
            name: name.to_string(),
            kind: ComponentKind::Consumer,
            outcome,
            counters: WorkerCounters::default(),
            lost_samples: lost,
            dropped_events: 0,
        }
    }

    #[test]
    fn test_report_queries() {
        let stop = StopReport {
            components: vec![
                report("a", Some(WorkerOutcome::Exhausted), 3),
                report("b", Some(WorkerOutcome::Abandoned), 0),
                report("c", Some(WorkerOutcome::Failed("boom".into())), 1),
                report("s", None, 0),
            ],
            run_time: Duration::from_secs(1),
        };
        assert_eq!(stop.abandoned(), vec!["b"]);
        assert_eq!(stop.failures().count(), 2);
        assert_eq!(stop.total_lost_samples(), 4);
        assert!(stop.by_name("s").is_some());
    }

    #[test]
    fn test_report_serializes_flat_counters() {
        let stop = StopReport {
            components: vec![report("a", Some(WorkerOutcome::Stopped), 0)],
            run_time: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&stop).unwrap();
        assert_eq!(json["run_time"], 1.5);
        assert_eq!(json["components"][0]["activations"], 0);
        assert_eq!(json["components"][0]["outcome"]["outcome"], "stopped");
    }
}
