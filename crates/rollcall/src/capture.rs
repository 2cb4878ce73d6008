use std::sync::Arc;

use rollcall_hw::{CameraError, DeviceOpener, FrameError, FrameSource};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("frame encode failed: {0}")]
    Encode(#[from] FrameError),
    #[error("failed to spawn capture thread: {0}")]
    Spawn(std::io::Error),
    #[error("capture thread exited")]
    ChannelClosed,
}

/// Messages sent from async tasks to the capture thread.
enum CaptureRequest {
    Grab {
        reply: oneshot::Sender<Result<Vec<u8>, CaptureError>>,
    },
}

/// Clone-safe handle for requesting encoded frames.
#[derive(Clone)]
pub struct Grabber {
    tx: mpsc::Sender<CaptureRequest>,
}

impl Grabber {
    /// Grab the current frame and encode it as JPEG.
    pub async fn grab_jpeg(&self) -> Result<Vec<u8>, CaptureError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CaptureRequest::Grab { reply: reply_tx })
            .await
            .map_err(|_| CaptureError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CaptureError::ChannelClosed)?
    }
}

/// Owner of the capture thread. The device lives exactly as long as the
/// thread; `release` ends both.
pub struct CaptureHandle {
    grabber: Grabber,
    thread: std::thread::JoinHandle<()>,
    pub width: u32,
    pub height: u32,
}

impl CaptureHandle {
    pub fn grabber(&self) -> Grabber {
        self.grabber.clone()
    }

    pub async fn grab_jpeg(&self) -> Result<Vec<u8>, CaptureError> {
        self.grabber.grab_jpeg().await
    }

    /// Close the request channel and wait for the thread to drop the device.
    ///
    /// Outstanding `Grabber` clones keep the thread alive, so callers must
    /// drop them first.
    pub async fn release(self) {
        let Self { grabber, thread, .. } = self;
        drop(grabber);
        join_thread(thread).await;
        tracing::debug!("capture device released");
    }
}

/// Join the capture thread without blocking a runtime worker.
async fn join_thread(thread: std::thread::JoinHandle<()>) {
    match tokio::task::spawn_blocking(move || thread.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => tracing::error!("capture thread panicked"),
        Err(e) => tracing::error!(error = %e, "failed to join capture thread"),
    }
}

/// Spawn the capture thread and open the device on it.
///
/// Resolves once the device is open, or with the open error. Frames are
/// encoded on the capture thread so async tasks never block on pixels.
pub async fn spawn_capture<O: DeviceOpener>(
    opener: Arc<O>,
    jpeg_quality: u8,
) -> Result<CaptureHandle, CaptureError> {
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(u32, u32), CameraError>>();
    let (tx, mut rx) = mpsc::channel::<CaptureRequest>(4);

    let thread = std::thread::Builder::new()
        .name("rollcall-capture".into())
        .spawn(move || {
            let mut source = match opener.open() {
                Ok(source) => source,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if ready_tx.send(Ok(source.resolution())).is_err() {
                return;
            }

            tracing::debug!("capture thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    CaptureRequest::Grab { reply } => {
                        // The requester was aborted while this sat in the queue.
                        if reply.is_closed() {
                            continue;
                        }
                        let result = source
                            .grab()
                            .map_err(CaptureError::from)
                            .and_then(|frame| {
                                frame.encode_jpeg(jpeg_quality).map_err(CaptureError::from)
                            });
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::debug!("capture thread exiting");
        })
        .map_err(CaptureError::Spawn)?;

    let (width, height) = match ready_rx.await {
        Ok(Ok(resolution)) => resolution,
        Ok(Err(e)) => {
            join_thread(thread).await;
            return Err(CaptureError::Camera(e));
        }
        Err(_) => {
            join_thread(thread).await;
            return Err(CaptureError::ChannelClosed);
        }
    };

    Ok(CaptureHandle {
        grabber: Grabber { tx },
        thread,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_hw::{Frame, PixelLayout};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SolidSource {
        released: Arc<AtomicUsize>,
        valid: bool,
    }

    impl FrameSource for SolidSource {
        fn resolution(&self) -> (u32, u32) {
            (8, 8)
        }

        fn grab(&mut self) -> Result<Frame, CameraError> {
            let len = if self.valid { 8 * 8 * 3 } else { 7 };
            Ok(Frame {
                data: vec![120; len],
                width: 8,
                height: 8,
                layout: PixelLayout::Rgb8,
            })
        }
    }

    impl Drop for SolidSource {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct SolidOpener {
        released: Arc<AtomicUsize>,
        valid: bool,
        fail: bool,
    }

    impl DeviceOpener for SolidOpener {
        type Source = SolidSource;

        fn open(&self) -> Result<SolidSource, CameraError> {
            if self.fail {
                return Err(CameraError::DeviceBusy);
            }
            Ok(SolidSource {
                released: self.released.clone(),
                valid: self.valid,
            })
        }
    }

    fn opener(valid: bool, fail: bool) -> (Arc<SolidOpener>, Arc<AtomicUsize>) {
        let released = Arc::new(AtomicUsize::new(0));
        let opener = Arc::new(SolidOpener {
            released: released.clone(),
            valid,
            fail,
        });
        (opener, released)
    }

    /// Takes `delay` per grab and counts every grab it starts.
    struct SlowSource {
        grabs: Arc<AtomicUsize>,
        delay: std::time::Duration,
    }

    impl FrameSource for SlowSource {
        fn resolution(&self) -> (u32, u32) {
            (8, 8)
        }

        fn grab(&mut self) -> Result<Frame, CameraError> {
            self.grabs.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(Frame {
                data: vec![120; 8 * 8 * 3],
                width: 8,
                height: 8,
                layout: PixelLayout::Rgb8,
            })
        }
    }

    struct SlowOpener {
        grabs: Arc<AtomicUsize>,
    }

    impl DeviceOpener for SlowOpener {
        type Source = SlowSource;

        fn open(&self) -> Result<SlowSource, CameraError> {
            Ok(SlowSource {
                grabs: self.grabs.clone(),
                delay: std::time::Duration::from_millis(200),
            })
        }
    }

    #[tokio::test]
    async fn test_grab_returns_jpeg_and_release_drops_device() {
        let (opener, released) = opener(true, false);
        let handle = spawn_capture(opener, 70).await.unwrap();
        assert_eq!((handle.width, handle.height), (8, 8));

        let jpeg = handle.grab_jpeg().await.unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(released.load(Ordering::SeqCst), 0);

        handle.release().await;
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_encode_failure_is_reported() {
        let (opener, _) = opener(false, false);
        let handle = spawn_capture(opener, 70).await.unwrap();
        assert!(matches!(
            handle.grab_jpeg().await,
            Err(CaptureError::Encode(FrameError::InvalidLength { .. }))
        ));
        handle.release().await;
    }

    #[tokio::test]
    async fn test_open_failure() {
        let (opener, released) = opener(true, true);
        let err = spawn_capture(opener, 70).await.err().unwrap();
        assert!(matches!(err, CaptureError::Camera(CameraError::DeviceBusy)));
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_release_waits_for_outstanding_grabbers() {
        let (opener, _) = opener(true, false);
        let handle = spawn_capture(opener, 70).await.unwrap();
        let grabber = handle.grabber();
        let release = tokio::spawn(handle.release());
        // The outstanding clone keeps the thread alive until it is dropped.
        assert!(grabber.grab_jpeg().await.is_ok());
        drop(grabber);
        release.await.unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_requests_are_not_grabbed() {
        let grabs = Arc::new(AtomicUsize::new(0));
        let opener = Arc::new(SlowOpener {
            grabs: grabs.clone(),
        });
        let handle = spawn_capture(opener, 70).await.unwrap();

        let requesters: Vec<_> = (0..6)
            .map(|_| {
                let grabber = handle.grabber();
                tokio::spawn(async move { grabber.grab_jpeg().await })
            })
            .collect();

        // Wait until the thread is inside the first grab, then abandon everything.
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while grabs.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("capture thread never started grabbing");
        for requester in &requesters {
            requester.abort();
        }
        for requester in requesters {
            let _ = requester.await;
        }

        handle.release().await;
        assert_eq!(grabs.load(Ordering::SeqCst), 1);
    }
}
