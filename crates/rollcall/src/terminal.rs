//! Terminal view of the attendance board.
//!
//! Status lines go to stderr next to the logs; the table goes to stdout.

use rollcall_core::{AttendanceBoard, BoardSnapshot};
use tokio::task::JoinHandle;

/// What changed since the last rendered snapshot.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ViewUpdate {
    pub status: Option<String>,
    pub table: Option<String>,
}

/// Tracks what the terminal last showed.
#[derive(Debug, Default)]
pub struct ViewState {
    status: String,
    rows: Option<usize>,
}

impl ViewState {
    /// Diff a snapshot against what is on screen. The table is re-rendered
    /// in full whenever the row count changes.
    pub fn update(&mut self, snapshot: &BoardSnapshot) -> ViewUpdate {
        let mut update = ViewUpdate::default();
        if snapshot.status != self.status {
            self.status = snapshot.status.clone();
            if !self.status.is_empty() {
                update.status = Some(self.status.clone());
            }
        }
        if self.rows != Some(snapshot.records.len()) {
            self.rows = Some(snapshot.records.len());
            update.table = Some(snapshot.render_table());
        }
        update
    }
}

/// Render board changes until the board is dropped.
pub fn spawn_view(board: &AttendanceBoard) -> JoinHandle<()> {
    let mut rx = board.subscribe();
    tokio::spawn(async move {
        let mut state = ViewState::default();
        loop {
            let update = state.update(&rx.borrow_and_update());
            if let Some(status) = update.status {
                eprintln!("[status] {status}");
            }
            if let Some(table) = update.table {
                println!("{table}");
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::AttendanceRecord;
    use std::sync::Arc;

    fn record(first: &str) -> AttendanceRecord {
        AttendanceRecord {
            first_name: first.into(),
            last_name: "B".into(),
            date: "2024-01-01".into(),
            status_type: "present".into(),
        }
    }

    #[test]
    fn test_first_update_renders_header() {
        let mut state = ViewState::default();
        let update = state.update(&BoardSnapshot::default());
        assert_eq!(update.status, None);
        assert_eq!(update.table.as_deref(), Some("Name | Date | Status\n"));
    }

    #[test]
    fn test_status_change_alone_skips_table() {
        let mut state = ViewState::default();
        let mut snap = BoardSnapshot::default();
        state.update(&snap);

        snap.status = "Camera started. Streaming...".into();
        let update = state.update(&snap);
        assert_eq!(update.status.as_deref(), Some("Camera started. Streaming..."));
        assert!(update.table.is_none());

        assert_eq!(state.update(&snap), ViewUpdate::default());
    }

    #[test]
    fn test_new_record_rerenders_whole_table() {
        let mut state = ViewState::default();
        let mut snap = BoardSnapshot::default();
        snap.records.push(record("A"));
        state.update(&snap);

        snap.records.push(record("C"));
        let table = state.update(&snap).table.unwrap();
        assert_eq!(
            table,
            "Name | Date | Status\nA B | 2024-01-01 | present\nC B | 2024-01-01 | present\n"
        );
    }

    #[tokio::test]
    async fn test_view_exits_when_board_dropped() {
        let board = Arc::new(AttendanceBoard::new());
        let view = spawn_view(&board);
        board.push(record("A"));
        drop(board);
        tokio::time::timeout(std::time::Duration::from_secs(5), view)
            .await
            .expect("view did not exit")
            .unwrap();
    }
}
