//! Structured JSONL run trace
//!
//! One line per federation event, every line carrying the run id so
//! interleaved runs against the same file can be told apart.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use rtilink::LogicalTime;

/// Federation lifecycle and exchange events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FedEvent {
    Joined {
        federation: String,
        federate: String,
    },
    Initialized {
        regulating: bool,
        constrained: bool,
        lookahead: f64,
    },
    BarrierCrossed {
        label: String,
    },
    AdvanceGranted {
        proposed: LogicalTime,
        granted: LogicalTime,
    },
    AttributeSent {
        binding: String,
        time: LogicalTime,
    },
    EventDelivered {
        binding: String,
        time: LogicalTime,
    },
    WrappedUp,
}

impl FedEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            FedEvent::Joined { .. } => "joined",
            FedEvent::Initialized { .. } => "initialized",
            FedEvent::BarrierCrossed { .. } => "barrier-crossed",
            FedEvent::AdvanceGranted { .. } => "advance-granted",
            FedEvent::AttributeSent { .. } => "attribute-sent",
            FedEvent::EventDelivered { .. } => "event-delivered",
            FedEvent::WrappedUp => "wrapped-up",
        }
    }
}

/// One trace line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub ts: DateTime<Utc>,
    #[serde(rename = "run-id")]
    pub run_id: Uuid,
    pub event: FedEvent,
}

/// Append-only JSONL writer for one run
pub struct TraceLogger {
    run_id: Uuid,
    writer: BufWriter<File>,
}

impl TraceLogger {
    pub fn open(path: &Path) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            run_id: Uuid::now_v7(),
            writer: BufWriter::new(file),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// A trace failure never takes the federation down with it
    pub fn record(&mut self, event: FedEvent) {
        let entry = TraceEntry {
            ts: Utc::now(),
            run_id: self.run_id,
            event,
        };
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize trace entry");
                return;
            }
        };
        if let Err(e) = writeln!(self.writer, "{}", line).and_then(|_| self.writer.flush()) {
            warn!(error = %e, "failed to write trace entry");
        }
    }
}
