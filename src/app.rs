//! Capture loop
//!
//! One dedicated worker thread drives source -> pipeline -> sinks. The
//! running flag is polled before every frame acquisition, so clearing it
//! from any thread stops the loop within one frame interval; an in-flight
//! frame is allowed to finish. The effect registry is the only state the
//! control surface mutates while the loop runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::camera::FrameSource;
use crate::clock::SystemClock;
use crate::effects::{EffectPipeline, EffectRegistry};
use crate::output::FrameSink;
use crate::overlay::OverlayStore;

/// Owns the capture worker and the state shared with the control surface.
pub struct App {
    registry: Arc<EffectRegistry>,
    overlays: Arc<OverlayStore>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl App {
    /// Create an app around shared registry and overlay state.
    pub fn new(registry: Arc<EffectRegistry>, overlays: Arc<OverlayStore>) -> Self {
        Self {
            registry,
            overlays,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Shared effect registry handle for the control surface.
    pub fn registry(&self) -> Arc<EffectRegistry> {
        self.registry.clone()
    }

    /// Shared overlay store handle.
    pub fn overlays(&self) -> Arc<OverlayStore> {
        self.overlays.clone()
    }

    /// The running flag; clearing it stops the loop before its next
    /// acquisition.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Whether the capture worker is live.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the capture worker over the given source and sink.
    pub fn start(
        &mut self,
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        fps: u32,
    ) -> Result<(), String> {
        if self.worker.is_some() {
            return Err("capture loop already running".to_string());
        }

        self.running.store(true, Ordering::Release);

        let registry = self.registry.clone();
        let overlays = self.overlays.clone();
        let running = self.running.clone();

        let worker = std::thread::Builder::new()
            .name("capture-loop".to_string())
            .spawn(move || {
                capture_loop(source, sink, registry, overlays, running, fps);
            })
            .map_err(|e| format!("Failed to spawn capture thread: {}", e))?;

        self.worker = Some(worker);
        Ok(())
    }

    /// Stop the loop and join the worker.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The worker body: poll the flag, read, process, deliver, pace.
fn capture_loop(
    mut source: Box<dyn FrameSource>,
    mut sink: Box<dyn FrameSink>,
    registry: Arc<EffectRegistry>,
    overlays: Arc<OverlayStore>,
    running: Arc<AtomicBool>,
    fps: u32,
) {
    let fps = fps.max(1);
    let interval = Duration::from_nanos(1_000_000_000u64 / fps as u64);
    let mut pipeline = EffectPipeline::new(Arc::new(SystemClock));

    log::info!("Capture loop started ({} fps target)", fps);

    while running.load(Ordering::Acquire) {
        let begin = Instant::now();

        match source.read() {
            Ok(Some(mut frame)) => {
                pipeline.process(&mut frame, &registry, &overlays);
                sink.on_preview(&frame);
                sink.on_publish(&frame);
            }
            Ok(None) => {
                log::info!("End of stream");
                break;
            }
            Err(e) => {
                log::warn!("{}", e);
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
        }

        let elapsed = begin.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }

    running.store(false, Ordering::Release);
    log::info!("Capture loop stopped");
}
