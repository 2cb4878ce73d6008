//! rollcall-core: Attendance records and the display model.
//!
//! Wire types shared with the recognition backend, plus the in-memory
//! board that mirrors what the operator sees: controls, status, and the
//! attendance table.

pub mod board;
pub mod types;

pub use board::{AttendanceBoard, BoardSnapshot, Controls};
pub use types::{AttendanceRecord, RemoteConfig};
