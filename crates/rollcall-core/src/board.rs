//! Attendance board: the in-memory display model.
//!
//! Holds the record list in arrival order together with control enablement,
//! the status line, and stage visibility. Every mutation publishes a fresh
//! snapshot on a `watch` channel so views can re-render from scratch.

use crate::types::AttendanceRecord;
use tokio::sync::watch;

/// Enablement of the start/stop controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub start_enabled: bool,
    pub stop_enabled: bool,
}

impl Controls {
    pub const IDLE: Controls = Controls {
        start_enabled: true,
        stop_enabled: false,
    };
    pub const STREAMING: Controls = Controls {
        start_enabled: false,
        stop_enabled: true,
    };
}

/// Point-in-time copy of everything a view renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub records: Vec<AttendanceRecord>,
    pub controls: Controls,
    pub status: String,
    /// Whether the live video/encode surface is shown.
    pub stage_visible: bool,
}

impl BoardSnapshot {
    /// Render the table in list order, header first.
    pub fn render_table(&self) -> String {
        let mut out = String::from("Name | Date | Status\n");
        for record in &self.records {
            out.push_str(&record.to_string());
            out.push('\n');
        }
        out
    }
}

impl Default for BoardSnapshot {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            controls: Controls::IDLE,
            status: String::new(),
            stage_visible: false,
        }
    }
}

/// Shared display model. Cheap to wrap in an `Arc` and share with tasks.
pub struct AttendanceBoard {
    tx: watch::Sender<BoardSnapshot>,
}

impl AttendanceBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BoardSnapshot::default());
        Self { tx }
    }

    /// Append one record. No deduplication.
    pub fn push(&self, record: AttendanceRecord) {
        tracing::debug!(name = %record.full_name(), status = %record.status_type, "record appended");
        self.tx.send_modify(|s| s.records.push(record));
    }

    /// Append records after the existing ones, preserving their order.
    /// Returns how many were appended.
    pub fn extend(&self, records: Vec<AttendanceRecord>) -> usize {
        let count = records.len();
        if count > 0 {
            self.tx.send_modify(|s| s.records.extend(records));
        }
        count
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        tracing::debug!(status = %status, "status");
        self.tx.send_modify(|s| s.status = status);
    }

    /// Flip controls and stage visibility between streaming and idle.
    pub fn set_streaming(&self, streaming: bool) {
        self.tx.send_modify(|s| {
            s.controls = if streaming {
                Controls::STREAMING
            } else {
                Controls::IDLE
            };
            s.stage_visible = streaming;
        });
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.tx.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive a snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<BoardSnapshot> {
        self.tx.subscribe()
    }
}

impl Default for AttendanceBoard {
    fn default() -> Self {
        Self::new()
    }
}
