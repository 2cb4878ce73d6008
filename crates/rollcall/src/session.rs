//! Capture-and-report session.
//!
//! `Client` owns at most one active session. `start` acquires the camera
//! and begins periodic capture; every tick grabs a frame, encodes it, and
//! submits it to the backend as an independent job. `stop` cancels the
//! session token (discarding in-flight jobs), releases the camera, then
//! appends the absentee list.
//!
//! Phases: `Idle → Starting → Streaming → Stopping → Idle`, with
//! `Starting → Idle` when the camera cannot be acquired.

use std::sync::Arc;
use std::time::Duration;

use rollcall_core::AttendanceBoard;
use rollcall_hw::{CameraError, DeviceOpener};
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;
use uuid::Uuid;

use crate::backend::AttendanceBackend;
use crate::capture::{self, CaptureError, CaptureHandle, Grabber};

pub const STATUS_REQUESTING: &str = "Requesting camera...";
pub const STATUS_UNSUPPORTED: &str = "Camera not supported.";
pub const STATUS_ACCESS_FAILED: &str = "Failed to access camera.";
pub const STATUS_STREAMING: &str = "Camera started. Streaming...";
pub const STATUS_STREAM_ERROR: &str = "Streaming error (check backend).";
pub const STATUS_STOPPED: &str = "Camera stopped.";
pub const STATUS_ABSENT_FAILED: &str = "Camera stopped. Absentee list unavailable (check backend).";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("camera not supported: {0}")]
    UnsupportedDevice(CameraError),
    #[error("failed to access camera: {0}")]
    DeviceAcquisition(CameraError),
    #[error("capture thread failed: {0}")]
    CaptureThread(CaptureError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Streaming,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Time between capture ticks.
    pub capture_interval: Duration,
    /// JPEG quality, 1–100.
    pub jpeg_quality: u8,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_millis(300),
            jpeg_quality: 70,
        }
    }
}

/// Everything owned by a streaming session.
struct ActiveSession {
    id: Uuid,
    cancel: CancellationToken,
    /// Cancels the session if the client is dropped mid-stream.
    _guard: DropGuard,
    ticker: JoinHandle<()>,
    capture: CaptureHandle,
}

/// The capture-and-report client. `start` and `stop` are its only mutators.
pub struct Client<O: DeviceOpener, B: AttendanceBackend> {
    opener: Arc<O>,
    backend: Arc<B>,
    board: Arc<AttendanceBoard>,
    options: SessionOptions,
    phase: Phase,
    active: Option<ActiveSession>,
}

impl<O: DeviceOpener, B: AttendanceBackend> Client<O, B> {
    pub fn new(opener: O, backend: B, board: Arc<AttendanceBoard>, options: SessionOptions) -> Self {
        Self {
            opener: Arc::new(opener),
            backend: Arc::new(backend),
            board,
            options,
            phase: Phase::Idle,
            active: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn board(&self) -> &Arc<AttendanceBoard> {
        &self.board
    }

    /// Acquire the camera and begin periodic capture.
    ///
    /// A no-op while a session is already active.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.phase != Phase::Idle {
            tracing::warn!(phase = ?self.phase, "start ignored: session already active");
            return Ok(());
        }

        self.phase = Phase::Starting;
        self.board.set_status(STATUS_REQUESTING);

        let capture =
            match capture::spawn_capture(self.opener.clone(), self.options.jpeg_quality).await {
                Ok(capture) => capture,
                Err(e) => {
                    self.phase = Phase::Idle;
                    let err = match e {
                        CaptureError::Camera(e) if e.is_unsupported() => {
                            self.board.set_status(STATUS_UNSUPPORTED);
                            SessionError::UnsupportedDevice(e)
                        }
                        CaptureError::Camera(e) => {
                            self.board.set_status(STATUS_ACCESS_FAILED);
                            SessionError::DeviceAcquisition(e)
                        }
                        other => {
                            self.board.set_status(STATUS_ACCESS_FAILED);
                            SessionError::CaptureThread(other)
                        }
                    };
                    tracing::error!(error = %err, "camera start failed");
                    return Err(err);
                }
            };

        let id = Uuid::new_v4();
        tracing::info!(
            session = %id,
            width = capture.width,
            height = capture.height,
            "camera resolution"
        );

        self.board.set_streaming(true);
        self.board.set_status(STATUS_STREAMING);

        let cancel = CancellationToken::new();
        let ticker = tokio::spawn(
            run_capture_loop(
                capture.grabber(),
                self.backend.clone(),
                self.board.clone(),
                cancel.clone(),
                self.options.capture_interval,
            )
            .instrument(tracing::info_span!("session", id = %id)),
        );

        self.active = Some(ActiveSession {
            id,
            _guard: cancel.clone().drop_guard(),
            cancel,
            ticker,
            capture,
        });
        self.phase = Phase::Streaming;
        Ok(())
    }

    /// Stop capture, release the camera, and append the absentee list.
    ///
    /// A no-op when no session is active.
    pub async fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            tracing::debug!(phase = ?self.phase, "stop ignored: no active session");
            return;
        };

        self.phase = Phase::Stopping;
        active.cancel.cancel();
        if let Err(e) = active.ticker.await {
            tracing::warn!(error = %e, "capture loop ended abnormally");
        }
        active.capture.release().await;

        self.board.set_streaming(false);
        self.board.set_status(STATUS_STOPPED);

        match self.backend.absentees().await {
            Ok(records) => {
                let count = self.board.extend(records);
                tracing::info!(session = %active.id, absentees = count, "session stopped");
            }
            Err(e) => {
                tracing::warn!(session = %active.id, error = %e, "absentee fetch failed");
                self.board.set_status(STATUS_ABSENT_FAILED);
            }
        }

        self.phase = Phase::Idle;
    }
}

/// Fire a capture job every `period` until cancelled. Missed ticks are
/// skipped, never queued. On exit all in-flight jobs are aborted.
async fn run_capture_loop<B: AttendanceBackend>(
    grabber: Grabber,
    backend: Arc<B>,
    board: Arc<AttendanceBoard>,
    cancel: CancellationToken,
    period: Duration,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut inflight = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        tracing::error!(error = %e, "capture job panicked");
                    }
                }
            }
            _ = interval.tick() => {
                inflight.spawn(
                    capture_and_report(
                        grabber.clone(),
                        backend.clone(),
                        board.clone(),
                        cancel.clone(),
                    )
                    .in_current_span(),
                );
            }
        }
    }

    let pending = inflight.len();
    inflight.shutdown().await;
    tracing::debug!(pending, "capture loop stopped");
}

/// One tick: grab, encode, submit, merge. Results that land after the
/// session is cancelled are dropped.
async fn capture_and_report<B: AttendanceBackend>(
    grabber: Grabber,
    backend: Arc<B>,
    board: Arc<AttendanceBoard>,
    cancel: CancellationToken,
) {
    let job = async {
        let jpeg = match grabber.grab_jpeg().await {
            Ok(jpeg) => jpeg,
            Err(CaptureError::Encode(e)) => {
                tracing::debug!(error = %e, "frame encode failed; skipping tick");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed; skipping tick");
                return None;
            }
        };
        Some(backend.take_attendance(jpeg).await)
    };

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        outcome = job => outcome,
    };
    if cancel.is_cancelled() {
        tracing::trace!("discarding result from cancelled session");
        return;
    }

    match outcome {
        Some(Ok(Some(record))) => board.push(record),
        Some(Ok(None)) | None => {}
        Some(Err(e)) => {
            tracing::warn!(error = %e, "stream error");
            board.set_status(STATUS_STREAM_ERROR);
        }
    }
}
