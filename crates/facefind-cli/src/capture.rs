//! Capture loop: camera + face-presence checks on a dedicated thread.
//!
//! The thread owns the frame source and the detector. It ticks at a bounded
//! rate, publishes a "face ready" flag on a watch channel, keeps the most
//! recent frame for still capture, and releases the camera when stopped.

use facefind_core::detector::{DetectorError, FacePresence};
use facefind_hw::{CameraError, Frame, FrameSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{oneshot, watch};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera unavailable")]
    Unavailable,
    #[error("no frame captured yet")]
    NoFrame,
    #[error("failed to start capture thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    /// Minimum spacing between two presence checks.
    pub interval: Duration,
    /// Frames to discard before the first check.
    pub warmup_frames: usize,
}

enum CaptureRequest {
    Still {
        reply: oneshot::Sender<Result<Frame, CaptureError>>,
    },
    Stop,
}

/// Something that can hand over a still for matching.
#[allow(async_fn_in_trait)]
pub trait StillSource {
    fn is_ready(&self) -> bool;
    async fn capture(&self) -> Result<Frame, CaptureError>;
}

/// A photo loaded from disk, always ready to submit.
pub struct StillImage {
    frame: Frame,
}

impl StillImage {
    pub fn open(path: &std::path::Path) -> Result<Self, image::ImageError> {
        let image = image::open(path)?.to_rgb8();
        tracing::info!(path = %path.display(), width = image.width(), height = image.height(), "loaded still");
        Ok(Self {
            frame: Frame::new(image, 0),
        })
    }
}

impl StillSource for StillImage {
    fn is_ready(&self) -> bool {
        true
    }

    async fn capture(&self) -> Result<Frame, CaptureError> {
        Ok(self.frame.clone())
    }
}

/// Handle to a running capture loop. Stopping (or dropping) it releases the camera.
pub struct CaptureHandle {
    tx: Option<mpsc::Sender<CaptureRequest>>,
    ready: watch::Receiver<bool>,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Receiver for the readiness flag.
    pub fn readiness(&self) -> watch::Receiver<bool> {
        self.ready.clone()
    }

    /// Stop the loop and wait for the camera to be released. Idempotent.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::Release);
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(CaptureRequest::Stop);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("capture thread panicked");
            }
        }
    }
}

impl StillSource for CaptureHandle {
    fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Most recent frame seen by the loop.
    async fn capture(&self) -> Result<Frame, CaptureError> {
        let tx = self.tx.as_ref().ok_or(CaptureError::Unavailable)?;
        let (reply, reply_rx) = oneshot::channel();
        tx.send(CaptureRequest::Still { reply })
            .map_err(|_| CaptureError::Unavailable)?;
        reply_rx.await.map_err(|_| CaptureError::Unavailable)?
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the capture loop on its own OS thread.
///
/// `open_source` and `load_detector` run on that thread, camera first. If
/// either fails the error is logged, readiness stays `false`, and still
/// requests fail with [`CaptureError::Unavailable`]; nothing is retried.
pub fn spawn_capture<S, D, OpenSource, LoadDetector>(
    open_source: OpenSource,
    load_detector: LoadDetector,
    settings: CaptureSettings,
) -> Result<CaptureHandle, CaptureError>
where
    S: FrameSource + 'static,
    D: FacePresence + 'static,
    OpenSource: FnOnce() -> Result<S, CameraError> + Send + 'static,
    LoadDetector: FnOnce() -> Result<D, DetectorError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let (ready_tx, ready_rx) = watch::channel(false);
    let cancel = Arc::new(AtomicBool::new(false));
    let thread_cancel = Arc::clone(&cancel);

    let thread = std::thread::Builder::new()
        .name("facefind-capture".into())
        .spawn(move || {
            let mut source = match open_source() {
                Ok(source) => source,
                Err(e) => {
                    tracing::error!(error = %e, "camera unavailable; capture stays not ready");
                    return;
                }
            };

            let detector = match load_detector() {
                Ok(detector) => detector,
                Err(e) => {
                    tracing::error!(error = %e, "face detector unavailable; capture stays not ready");
                    source.stop();
                    return;
                }
            };

            tracing::info!(interval_ms = settings.interval.as_millis() as u64, "capture loop started");
            run_loop(&mut source, detector, settings, &rx, &ready_tx, &thread_cancel);
            source.stop();
            ready_tx.send_replace(false);
            tracing::info!("capture loop stopped");
        })?;

    Ok(CaptureHandle {
        tx: Some(tx),
        ready: ready_rx,
        cancel,
        thread: Some(thread),
    })
}

fn run_loop<S: FrameSource, D: FacePresence>(
    source: &mut S,
    mut detector: D,
    settings: CaptureSettings,
    rx: &mpsc::Receiver<CaptureRequest>,
    ready: &watch::Sender<bool>,
    cancel: &AtomicBool,
) {
    if settings.warmup_frames > 0 {
        tracing::debug!(count = settings.warmup_frames, "discarding warmup frames");
        for _ in 0..settings.warmup_frames {
            if cancel.load(Ordering::Acquire) {
                return;
            }
            let _ = source.next_frame();
        }
    }

    let mut latest: Option<Frame> = None;
    let mut next_tick = Instant::now();

    loop {
        if cancel.load(Ordering::Acquire) {
            return;
        }

        // Serve still requests until the next tick is due.
        let wait = next_tick.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok(CaptureRequest::Still { reply }) => {
                let _ = reply.send(latest.clone().ok_or(CaptureError::NoFrame));
                continue;
            }
            Ok(CaptureRequest::Stop) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let started = Instant::now();
        let face_ready = check_frame(source, &mut detector, &mut latest);
        publish(ready, face_ready);
        next_tick = started + settings.interval;
    }
}

/// Read one frame and ask the detector about it.
///
/// Capture and detector failures count as "no face".
fn check_frame<S: FrameSource, D: FacePresence>(
    source: &mut S,
    detector: &mut D,
    latest: &mut Option<Frame>,
) -> bool {
    let frame = match source.next_frame() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "frame capture failed");
            return false;
        }
    };

    let face_ready = match detector.detect(&frame.image) {
        Ok(presence) => {
            tracing::trace!(seq = frame.sequence, faces = presence.faces, "presence check");
            presence.single_face()
        }
        Err(e) => {
            tracing::warn!(seq = frame.sequence, error = %e, "face detection failed; treating frame as empty");
            false
        }
    };

    *latest = Some(frame);
    face_ready
}

fn publish(ready: &watch::Sender<bool>, face_ready: bool) {
    let changed = ready.send_if_modified(|current| {
        let changed = *current != face_ready;
        *current = face_ready;
        changed
    });
    if changed {
        if face_ready {
            tracing::debug!("face detected");
        } else {
            tracing::debug!("no face in frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facefind_core::detector::{FaceBox, Presence};
    use image::RgbImage;
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(5);

    fn settings() -> CaptureSettings {
        CaptureSettings {
            interval: Duration::from_millis(5),
            warmup_frames: 2,
        }
    }

    #[derive(Clone, Default)]
    struct Probe {
        frames: Arc<AtomicUsize>,
        stopped: Arc<AtomicBool>,
        detections: Arc<AtomicUsize>,
    }

    struct FakeCamera {
        probe: Probe,
        fail: bool,
    }

    impl FrameSource for FakeCamera {
        fn next_frame(&mut self) -> Result<Frame, CameraError> {
            if self.probe.stopped.load(Ordering::SeqCst) {
                return Err(CameraError::Stopped);
            }
            let seq = self.probe.frames.fetch_add(1, Ordering::SeqCst) as u32;
            if self.fail {
                return Err(CameraError::CaptureFailed("unplugged".into()));
            }
            Ok(Frame::new(RgbImage::new(8, 6), seq))
        }

        fn stop(&mut self) {
            self.probe.stopped.store(true, Ordering::SeqCst);
        }
    }

    /// Reports a fixed face count, or fails every call.
    struct FakeDetector {
        probe: Probe,
        faces: Option<usize>,
    }

    impl FacePresence for FakeDetector {
        fn detect(&mut self, _frame: &RgbImage) -> Result<Presence, DetectorError> {
            self.probe.detections.fetch_add(1, Ordering::SeqCst);
            let faces = self
                .faces
                .ok_or_else(|| DetectorError::InferenceFailed("model exploded".into()))?;
            let boxes: Vec<FaceBox> = (0..faces)
                .map(|i| FaceBox {
                    x: i as f32 * 100.0,
                    y: 0.0,
                    width: 50.0,
                    height: 50.0,
                    confidence: 0.9,
                })
                .collect();
            Ok(Presence::from_faces(&boxes))
        }
    }

    fn start(probe: &Probe, faces: Option<usize>) -> CaptureHandle {
        let camera_probe = probe.clone();
        let detector_probe = probe.clone();
        spawn_capture(
            move || Ok(FakeCamera { probe: camera_probe, fail: false }),
            move || Ok(FakeDetector { probe: detector_probe, faces }),
            settings(),
        )
        .unwrap()
    }

    async fn wait_for_detections(probe: &Probe, n: usize) {
        tokio::time::timeout(WAIT, async {
            while probe.detections.load(Ordering::SeqCst) < n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("detector never ran");
    }

    #[tokio::test]
    async fn test_single_face_becomes_ready() {
        let probe = Probe::default();
        let mut handle = start(&probe, Some(1));
        let mut ready = handle.readiness();

        tokio::time::timeout(WAIT, ready.wait_for(|r| *r))
            .await
            .expect("readiness never turned true")
            .unwrap();
        assert!(handle.is_ready());

        let still = handle.capture().await.unwrap();
        assert_eq!(still.width(), 8);
        handle.stop();
    }

    #[tokio::test]
    async fn test_two_faces_are_not_ready() {
        let probe = Probe::default();
        let handle = start(&probe, Some(2));
        wait_for_detections(&probe, 5).await;
        assert!(!handle.is_ready());
    }

    #[tokio::test]
    async fn test_detector_failure_keeps_loop_running() {
        let probe = Probe::default();
        let handle = start(&probe, None);
        wait_for_detections(&probe, 5).await;

        assert!(!handle.is_ready());
        // Frames are still kept for capture even when detection fails.
        assert!(handle.capture().await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_releases_camera() {
        let probe = Probe::default();
        let mut handle = start(&probe, Some(1));
        wait_for_detections(&probe, 1).await;

        handle.stop();
        assert!(probe.stopped.load(Ordering::SeqCst));
        assert!(!*handle.readiness().borrow());
        assert!(matches!(handle.capture().await, Err(CaptureError::Unavailable)));
    }

    #[tokio::test]
    async fn test_drop_releases_camera() {
        let probe = Probe::default();
        let handle = start(&probe, Some(1));
        wait_for_detections(&probe, 1).await;

        drop(handle);
        assert!(probe.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_warmup_frames_are_discarded() {
        let probe = Probe::default();
        let _handle = start(&probe, Some(1));
        wait_for_detections(&probe, 1).await;
        // Two warmup reads happen before the first checked frame.
        assert!(probe.frames.load(Ordering::SeqCst) >= 3);
    }

    /// Takes a few milliseconds per frame, like a real device.
    struct SlowCamera {
        probe: Probe,
    }

    impl FrameSource for SlowCamera {
        fn next_frame(&mut self) -> Result<Frame, CameraError> {
            std::thread::sleep(Duration::from_millis(5));
            let seq = self.probe.frames.fetch_add(1, Ordering::SeqCst) as u32;
            Ok(Frame::new(RgbImage::new(8, 6), seq))
        }

        fn stop(&mut self) {
            self.probe.stopped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_stop_interrupts_warmup() {
        let probe = Probe::default();
        let camera_probe = probe.clone();
        let mut handle = spawn_capture(
            move || Ok(SlowCamera { probe: camera_probe }),
            || Ok(FakeDetector { probe: Probe::default(), faces: Some(1) }),
            CaptureSettings {
                interval: Duration::from_millis(5),
                warmup_frames: 10_000,
            },
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(30));

        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(probe.frames.load(Ordering::SeqCst) < 10_000);
        assert!(probe.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_capture_failure_reads_as_no_face() {
        let probe = Probe::default();
        let camera_probe = probe.clone();
        let handle = spawn_capture(
            move || Ok(FakeCamera { probe: camera_probe, fail: true }),
            || Ok(FakeDetector { probe: Probe::default(), faces: Some(1) }),
            settings(),
        )
        .unwrap();

        tokio::time::timeout(WAIT, async {
            while probe.frames.load(Ordering::SeqCst) < 6 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        assert!(!handle.is_ready());
        assert!(matches!(handle.capture().await, Err(CaptureError::NoFrame)));
    }

    #[tokio::test]
    async fn test_still_image_from_disk() {
        let path = std::env::temp_dir().join(format!("facefind-still-{}.png", std::process::id()));
        RgbImage::from_pixel(12, 9, image::Rgb([10, 20, 30])).save(&path).unwrap();

        let still = StillImage::open(&path).unwrap();
        assert!(still.is_ready());
        let frame = still.capture().await.unwrap();
        assert_eq!((frame.width(), frame.height()), (12, 9));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_still_image_missing_file() {
        assert!(StillImage::open(std::path::Path::new("/nonexistent/selfie.jpg")).is_err());
    }

    #[tokio::test]
    async fn test_camera_open_failure_is_permanently_not_ready() {
        let handle = spawn_capture(
            || -> Result<FakeCamera, CameraError> {
                Err(CameraError::PermissionDenied("/dev/video0".into()))
            },
            || Ok(FakeDetector { probe: Probe::default(), faces: Some(1) }),
            settings(),
        )
        .unwrap();

        assert!(matches!(handle.capture().await, Err(CaptureError::Unavailable)));
        assert!(!handle.is_ready());
    }

    #[tokio::test]
    async fn test_detector_load_failure_releases_camera() {
        let probe = Probe::default();
        let camera_probe = probe.clone();
        let handle = spawn_capture(
            move || Ok(FakeCamera { probe: camera_probe, fail: false }),
            || -> Result<FakeDetector, DetectorError> {
                Err(DetectorError::ModelNotFound("/models/det_10g.onnx".into()))
            },
            settings(),
        )
        .unwrap();

        assert!(matches!(handle.capture().await, Err(CaptureError::Unavailable)));
        assert!(probe.stopped.load(Ordering::SeqCst));
        assert!(!handle.is_ready());
    }
}
