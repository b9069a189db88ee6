//! Frame sinks
//!
//! Processed frames fan out to two consumers: a preview (fire-and-forget)
//! and a virtual camera. Both are external collaborators behind traits; the
//! capture loop calls the sink synchronously and must never be blocked
//! indefinitely, so virtual camera delivery goes through a bounded queue
//! with drop-if-full semantics.

use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::frame::Frame;

/// Negotiated virtual camera stream parameters, fixed at stream start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// A virtual camera backend.
///
/// `start` negotiates the fixed resolution/frame rate; a failed start must
/// not prevent preview-only operation.
pub trait VirtualCamera: Send {
    /// Negotiate the stream. Idempotent once active.
    fn start(&mut self, config: StreamConfig) -> Result<(), String>;

    /// Deliver one frame. May block briefly; bounded by the backend.
    fn send(&mut self, frame: &Frame) -> Result<(), String>;

    /// Tear the stream down.
    fn stop(&mut self);

    /// Whether the stream is up.
    fn is_active(&self) -> bool;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Consumer of processed frames, invoked synchronously from the capture
/// loop. Both methods default to no-ops so either side is optional.
pub trait FrameSink: Send {
    /// Preview delivery, fire-and-forget.
    fn on_preview(&mut self, _frame: &Frame) {}

    /// Virtual camera delivery.
    fn on_publish(&mut self, _frame: &Frame) {}
}

/// Sink that drops everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {}

/// Preview side of a bounded channel pair. Frames are cloned in and dropped
/// when the consumer lags; the capture loop never waits on the preview.
pub struct PreviewSender {
    tx: Sender<Frame>,
}

impl PreviewSender {
    /// Create a preview channel holding at most `capacity` frames.
    pub fn channel(capacity: usize) -> (PreviewSender, Receiver<Frame>) {
        let (tx, rx) = bounded(capacity);
        (PreviewSender { tx }, rx)
    }

    fn offer(&self, frame: &Frame) {
        match self.tx.try_send(frame.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                // Consumer is behind; this preview frame is expendable.
                log::trace!("Preview queue full, dropping frame");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Virtual camera wrapper that decouples delivery from the capture loop.
///
/// Frames go into a bounded queue; a worker thread drains it into the
/// backend. When the backend is slow the queue fills and new frames are
/// dropped, which throttles output without ever blocking capture.
pub struct BufferedCamera {
    tx: Option<Sender<Frame>>,
    worker: Option<JoinHandle<()>>,
    dropped: u64,
}

impl BufferedCamera {
    /// Start the backend and its delivery worker.
    ///
    /// Returns an error when the backend fails to negotiate the stream; the
    /// caller is expected to continue preview-only.
    pub fn start(
        mut backend: Box<dyn VirtualCamera>,
        config: StreamConfig,
        queue_depth: usize,
    ) -> Result<Self, String> {
        backend.start(config)?;
        log::info!(
            "Virtual camera '{}' started ({}x{} @ {} fps)",
            backend.backend_name(),
            config.width,
            config.height,
            config.fps
        );

        let (tx, rx): (Sender<Frame>, Receiver<Frame>) = bounded(queue_depth);
        let worker = std::thread::Builder::new()
            .name("vcam-delivery".to_string())
            .spawn(move || {
                for frame in rx.iter() {
                    if let Err(e) = backend.send(&frame) {
                        log::warn!("Virtual camera delivery failed: {}", e);
                    }
                }
                backend.stop();
                log::info!("Virtual camera delivery worker stopped");
            })
            .map_err(|e| format!("Failed to spawn delivery worker: {}", e))?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            dropped: 0,
        })
    }

    /// Queue one frame, dropping it when the queue is full.
    pub fn publish(&mut self, frame: &Frame) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(frame.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped % 100 == 1 {
                    log::warn!(
                        "Virtual camera queue full, {} frame(s) dropped so far",
                        self.dropped
                    );
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("Virtual camera delivery worker is gone");
                self.tx = None;
            }
        }
    }

    /// Frames dropped because the queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// Close the queue and join the delivery worker.
    pub fn stop(&mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for BufferedCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The capture loop's composite sink: optional preview plus optional
/// virtual camera, each independently absent.
#[derive(Default)]
pub struct Router {
    preview: Option<PreviewSender>,
    camera: Option<BufferedCamera>,
}

impl Router {
    pub fn new(preview: Option<PreviewSender>, camera: Option<BufferedCamera>) -> Self {
        Self { preview, camera }
    }
}

impl FrameSink for Router {
    fn on_preview(&mut self, frame: &Frame) {
        if let Some(preview) = &self.preview {
            preview.offer(frame);
        }
    }

    fn on_publish(&mut self, frame: &Frame) {
        if let Some(camera) = &mut self.camera {
            camera.publish(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    /// Backend that records frames and can be told to run slow.
    struct RecordingCamera {
        frames: Arc<Mutex<Vec<Frame>>>,
        delay: Duration,
        active: bool,
        fail_start: bool,
    }

    impl VirtualCamera for RecordingCamera {
        fn start(&mut self, _config: StreamConfig) -> Result<(), String> {
            if self.fail_start {
                return Err("backend unavailable".to_string());
            }
            self.active = true;
            Ok(())
        }

        fn send(&mut self, frame: &Frame) -> Result<(), String> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            self.frames.lock().push(frame.clone());
            Ok(())
        }

        fn stop(&mut self) {
            self.active = false;
        }

        fn is_active(&self) -> bool {
            self.active
        }

        fn backend_name(&self) -> &'static str {
            "recording"
        }
    }

    fn config() -> StreamConfig {
        StreamConfig {
            width: 4,
            height: 4,
            fps: 30,
        }
    }

    #[test]
    fn test_preview_channel_drops_when_full() {
        let (sender, rx) = PreviewSender::channel(2);
        let frame = Frame::new(2, 2);
        for _ in 0..5 {
            sender.offer(&frame);
        }
        // Only the capacity survives; nothing blocked.
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_buffered_camera_delivers_frames() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let backend = Box::new(RecordingCamera {
            frames: frames.clone(),
            delay: Duration::ZERO,
            active: false,
            fail_start: false,
        });

        let mut camera = BufferedCamera::start(backend, config(), 8).unwrap();
        for i in 0..4u8 {
            camera.publish(&Frame::filled(2, 2, [i, i, i]));
        }
        camera.stop();

        let delivered = frames.lock();
        assert_eq!(delivered.len(), 4);
        assert_eq!(delivered[3].pixel(0, 0), [3, 3, 3]);
    }

    #[test]
    fn test_buffered_camera_drops_instead_of_blocking() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let backend = Box::new(RecordingCamera {
            frames: frames.clone(),
            delay: Duration::from_millis(50),
            active: false,
            fail_start: false,
        });

        let mut camera = BufferedCamera::start(backend, config(), 1).unwrap();
        let frame = Frame::new(2, 2);
        let begin = std::time::Instant::now();
        for _ in 0..20 {
            camera.publish(&frame);
        }
        // 20 publishes against a 50ms-per-frame backend must not take
        // anywhere near 20 * 50ms.
        assert!(begin.elapsed() < Duration::from_millis(200));
        assert!(camera.dropped_frames() > 0);
        camera.stop();
    }

    #[test]
    fn test_failed_start_reports_error() {
        let backend = Box::new(RecordingCamera {
            frames: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
            active: false,
            fail_start: true,
        });
        assert!(BufferedCamera::start(backend, config(), 4).is_err());
    }

    #[test]
    fn test_router_with_no_consumers_is_a_no_op() {
        let mut router = Router::default();
        let frame = Frame::new(2, 2);
        router.on_preview(&frame);
        router.on_publish(&frame);
    }
}
