//! Stage trace events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Whether an event marks the start or the end of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracePhase {
    Start,
    Done,
}

impl fmt::Display for TracePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TracePhase::Start => f.write_str("start"),
            TracePhase::Done => f.write_str("done"),
        }
    }
}

/// One entry of a run's append-only trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub stage: String,
    pub phase: TracePhase,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl TraceEvent {
    pub fn start(stage: impl Into<String>) -> Self {
        Self::new(stage, TracePhase::Start)
    }

    pub fn done(stage: impl Into<String>) -> Self {
        Self::new(stage, TracePhase::Done)
    }

    fn new(stage: impl Into<String>, phase: TracePhase) -> Self {
        Self {
            stage: stage.into(),
            phase,
            timestamp: Utc::now(),
            extra: Map::new(),
        }
    }

    /// Attach a metric to the event
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// `"{stage}:{phase}"`, e.g. `research:start`
    pub fn label(&self) -> String {
        format!("{}:{}", self.stage, self.phase)
    }

    /// Extra fields rendered as `k=v` pairs
    pub fn extra_summary(&self) -> String {
        self.extra
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{k}={s}"),
                other => format!("{k}={other}"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
