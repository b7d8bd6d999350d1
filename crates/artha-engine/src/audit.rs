//! Decision audit log.
//!
//! JSONL stream of every decision the engine takes — one serialized record
//! per line, append-only. The stream exists to answer "why was this trade
//! taken (or not)?" after the fact without replaying the session. Optional:
//! the engine runs identically with it disabled.

use crate::arbiter::DecisionRecord;
use artha_models::{ActionKind, ActionReason, ClosurePhase, InstrumentId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// One audit line.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Arbitration verdict for one signal (digest included).
    SignalDecision(DecisionRecord),

    EntryOpened {
        ts: DateTime<Utc>,
        instrument: InstrumentId,
        qty: u32,
        order_ref: String,
    },

    ActionDispatched {
        ts: DateTime<Utc>,
        instrument: InstrumentId,
        kind: ActionKind,
        qty: u32,
        reason: ActionReason,
        order_ref: String,
    },

    DispatchFailed {
        ts: DateTime<Utc>,
        instrument: InstrumentId,
        kind: ActionKind,
        error: String,
    },

    ReconcileRepair {
        ts: DateTime<Utc>,
        instrument: InstrumentId,
        /// "orphan" or "phantom".
        repair: &'static str,
    },

    PhaseTransition {
        ts: DateTime<Utc>,
        from: ClosurePhase,
        to: ClosurePhase,
    },
}

pub struct AuditLog {
    writer: BufWriter<File>,
}

impl AuditLog {
    /// Open (append) the JSONL file at `path`.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Append one event.
    pub fn append(&mut self, event: &AuditEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(event)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_events_written_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let ts = Utc.with_ymd_and_hms(2026, 8, 7, 15, 0, 0).unwrap();
        {
            let mut log = AuditLog::open(&path).unwrap();
            log.append(&AuditEvent::PhaseTransition {
                ts,
                from: ClosurePhase::Normal,
                to: ClosurePhase::Gradual,
            })
            .unwrap();
            log.append(&AuditEvent::ReconcileRepair {
                ts,
                instrument: InstrumentId::new("SBIN"),
                repair: "orphan",
            })
            .unwrap();
        }

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "phase_transition");
        assert_eq!(first["to"], "gradual");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["repair"], "orphan");
    }
}
