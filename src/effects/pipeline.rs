//! Effect pipeline
//!
//! Applies the enabled effects to one frame in a fixed order. The glitch
//! stage runs first because it owns the sequencer's time-sensitive
//! transitions; every later stage sees whatever the glitch stage produced.
//! A stage that cannot run is logged and skipped, leaving the frame as of
//! the previous stage; nothing here ever aborts a whole frame.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::clock::Clock;
use crate::frame::Frame;
use crate::overlay::OverlayStore;

use super::registry::EffectRegistry;
use super::sequencer::GlitchSequencer;
use super::stages::{self, StageResult, StaticOverlayCache};
use super::Effect;

/// One independent RNG stream per randomized stage, so no stage's draws can
/// perturb another's.
struct StageRngs {
    tear: StdRng,
    vhs: StdRng,
    noise: StdRng,
    color: StdRng,
    tracking: StdRng,
    artifacts: StdRng,
}

impl StageRngs {
    fn from_os() -> Self {
        Self {
            tear: StdRng::from_os_rng(),
            vhs: StdRng::from_os_rng(),
            noise: StdRng::from_os_rng(),
            color: StdRng::from_os_rng(),
            tracking: StdRng::from_os_rng(),
            artifacts: StdRng::from_os_rng(),
        }
    }

    fn from_seed(seed: u64) -> Self {
        let derive = |i: u64| StdRng::seed_from_u64(seed.wrapping_add(i));
        Self {
            tear: derive(1),
            vhs: derive(2),
            noise: derive(3),
            color: derive(4),
            tracking: derive(5),
            artifacts: derive(6),
        }
    }
}

/// The per-frame effect chain. Owned by the capture loop thread; the only
/// shared inputs are the registry (snapshotted per call) and the overlay
/// store (atomically swapped collections).
pub struct EffectPipeline {
    clock: Arc<dyn Clock>,
    sequencer: GlitchSequencer,
    static_cache: StaticOverlayCache,
    rngs: StageRngs,
}

impl EffectPipeline {
    /// Create a pipeline driven by the given clock, with OS-seeded RNGs.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            clock,
            sequencer: GlitchSequencer::new(now),
            static_cache: StaticOverlayCache::new(StdRng::from_os_rng()),
            rngs: StageRngs::from_os(),
        }
    }

    /// Create a pipeline with deterministic RNG streams (tests).
    pub fn with_seed(clock: Arc<dyn Clock>, seed: u64) -> Self {
        let now = clock.now();
        Self {
            clock,
            sequencer: GlitchSequencer::with_seed(now, seed),
            static_cache: StaticOverlayCache::new(StdRng::seed_from_u64(seed.wrapping_add(7))),
            rngs: StageRngs::from_seed(seed),
        }
    }

    /// Whether a glitch burst is currently presenting.
    pub fn glitch_active(&self) -> bool {
        self.sequencer.is_active()
    }

    /// Drop any in-flight glitch burst and restart its trigger timer.
    pub fn reset(&mut self) {
        self.sequencer.reset(self.clock.now());
    }

    /// Apply all enabled effects to `frame` in place.
    ///
    /// Reads one consistent registry snapshot for the whole invocation.
    /// Dimensions and channel count are never changed.
    pub fn process(&mut self, frame: &mut Frame, registry: &EffectRegistry, overlays: &OverlayStore) {
        let snapshot = registry.snapshot();
        let now = self.clock.now();

        // Glitch first: the sequencer's transitions are tied to this call's
        // timestamp. Consulted only while the effect is enabled.
        let glitch = snapshot.effect(Effect::Glitch);
        if glitch.enabled {
            let timing = snapshot.glitch_timing();
            let collection = overlays.glitch_frames();
            if let Some(overlay) =
                self.sequencer
                    .advance(now, timing, glitch.intensity, &collection)
            {
                run(stages::blend_overlay(frame, &overlay, timing.blend_alpha));
            }
        }

        let st = snapshot.effect(Effect::Static);
        if st.enabled {
            run(stages::apply_static(
                frame,
                st.intensity,
                &mut self.static_cache,
                now,
            ));
        }

        let tear = snapshot.effect(Effect::Tear);
        if tear.enabled {
            run(stages::apply_tear(frame, &mut self.rngs.tear));
        }

        let vhs = snapshot.effect(Effect::Vhs);
        if vhs.enabled {
            run(stages::apply_vhs(frame, vhs.intensity, &mut self.rngs.vhs));
        }

        let noise = snapshot.effect(Effect::Noise);
        if noise.enabled {
            run(stages::apply_noise(
                frame,
                noise.intensity,
                &mut self.rngs.noise,
            ));
        }

        let color = snapshot.effect(Effect::ColorDistortion);
        if color.enabled {
            run(stages::apply_color_distortion(
                frame,
                color.intensity,
                &mut self.rngs.color,
            ));
        }

        let chromatic = snapshot.effect(Effect::Chromatic);
        if chromatic.enabled {
            run(stages::apply_chromatic(frame, chromatic.intensity));
        }

        let tracking = snapshot.effect(Effect::Tracking);
        if tracking.enabled {
            run(stages::apply_tracking(
                frame,
                tracking.intensity,
                &mut self.rngs.tracking,
            ));
        }

        let artifacts = snapshot.effect(Effect::Artifacts);
        if artifacts.enabled {
            run(stages::apply_artifacts(
                frame,
                artifacts.intensity,
                &mut self.rngs.artifacts,
            ));
        }
    }
}

/// Fold one stage outcome: failures are logged and the frame carries on as
/// of the previous stage.
fn run(outcome: StageResult) {
    if let Err(e) = outcome {
        log::warn!("{}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::frame::{FRAME_CHANNELS, FRAME_HEIGHT, FRAME_WIDTH};
    use std::time::Duration;

    fn pipeline_parts() -> (Arc<ManualClock>, EffectPipeline, EffectRegistry, OverlayStore) {
        let clock = Arc::new(ManualClock::new());
        let pipeline = EffectPipeline::with_seed(clock.clone(), 1234);
        let registry = EffectRegistry::new();
        // Start from everything off; tests opt effects in.
        for effect in Effect::ALL {
            registry.set_enabled(effect, false);
        }
        (clock, pipeline, registry, OverlayStore::empty())
    }

    #[test]
    fn test_all_disabled_is_bit_identical() {
        let (_clock, mut pipeline, registry, overlays) = pipeline_parts();
        let mut frame = Frame::filled(FRAME_WIDTH, FRAME_HEIGHT, [31, 77, 119]);
        let before = frame.clone();
        pipeline.process(&mut frame, &registry, &overlays);
        assert_eq!(frame, before);
    }

    #[test]
    fn test_dimensions_invariant_with_everything_enabled() {
        let (_clock, mut pipeline, registry, overlays) = pipeline_parts();
        overlays.set_glitch_frames(vec![Arc::new(Frame::filled(
            FRAME_WIDTH,
            FRAME_HEIGHT,
            [255, 0, 255],
        ))]);
        for effect in Effect::ALL {
            registry.set_enabled(effect, true);
            registry.set_intensity(effect, 0.7);
        }

        let mut frame = Frame::filled(FRAME_WIDTH, FRAME_HEIGHT, [90, 90, 90]);
        for _ in 0..5 {
            pipeline.process(&mut frame, &registry, &overlays);
            assert_eq!(frame.width(), FRAME_WIDTH);
            assert_eq!(frame.height(), FRAME_HEIGHT);
            assert_eq!(
                frame.data().len(),
                FRAME_WIDTH as usize * FRAME_HEIGHT as usize * FRAME_CHANNELS
            );
        }
    }

    #[test]
    fn test_noise_only_spreads_black_frame() {
        let (_clock, mut pipeline, registry, overlays) = pipeline_parts();
        registry.set_enabled(Effect::Noise, true);
        registry.set_intensity(Effect::Noise, 0.4);

        let mut frame = Frame::new(FRAME_WIDTH, FRAME_HEIGHT);
        pipeline.process(&mut frame, &registry, &overlays);

        let n = frame.data().len() as f64;
        let mean = frame.data().iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = frame
            .data()
            .iter()
            .map(|&v| (v as f64 - mean) * (v as f64 - mean))
            .sum::<f64>()
            / n;
        assert!(var > 10.0, "variance {} too small for sigma 12", var);
    }

    #[test]
    fn test_chromatic_only_offsets_channels_by_five() {
        let (_clock, mut pipeline, registry, overlays) = pipeline_parts();
        registry.set_enabled(Effect::Chromatic, true);
        registry.set_intensity(Effect::Chromatic, 1.0);

        let mut frame = Frame::filled(FRAME_WIDTH, FRAME_HEIGHT, [128, 128, 128]);
        pipeline.process(&mut frame, &registry, &overlays);

        let y = FRAME_HEIGHT / 2;
        // Red shifted +5, blue shifted -5, green untouched.
        assert_eq!(frame.pixel(0, y), [0, 128, 128]);
        assert_eq!(frame.pixel(4, y), [0, 128, 128]);
        assert_eq!(frame.pixel(5, y), [128, 128, 128]);
        assert_eq!(frame.pixel(FRAME_WIDTH - 1, y), [128, 128, 0]);
        assert_eq!(frame.pixel(FRAME_WIDTH - 6, y), [128, 128, 128]);
    }

    #[test]
    fn test_glitch_replaces_frame_at_full_alpha() {
        let (clock, mut pipeline, registry, overlays) = pipeline_parts();
        let overlay = Arc::new(Frame::filled(FRAME_WIDTH, FRAME_HEIGHT, [200, 10, 60]));
        overlays.set_glitch_frames(vec![overlay.clone()]);

        registry.set_enabled(Effect::Glitch, true);
        registry.set_intensity(Effect::Glitch, 1.0);

        // Walk time forward until a burst triggers (frequency is 2s at
        // intensity 1.0, trigger probability 1.0).
        let mut replaced = false;
        for _ in 0..50 {
            clock.advance(Duration::from_millis(100));
            let mut frame = Frame::filled(FRAME_WIDTH, FRAME_HEIGHT, [1, 1, 1]);
            pipeline.process(&mut frame, &registry, &overlays);
            if frame.data() == overlay.data() {
                replaced = true;
                break;
            }
        }
        assert!(replaced, "glitch burst never replaced the frame");
        assert!(pipeline.glitch_active());
    }

    #[test]
    fn test_glitch_disabled_never_consults_sequencer() {
        let (clock, mut pipeline, registry, overlays) = pipeline_parts();
        overlays.set_glitch_frames(vec![Arc::new(Frame::filled(
            FRAME_WIDTH,
            FRAME_HEIGHT,
            [255, 255, 255],
        ))]);
        registry.set_intensity(Effect::Glitch, 1.0);
        registry.set_enabled(Effect::Glitch, false);

        let mut frame = Frame::new(FRAME_WIDTH, FRAME_HEIGHT);
        for _ in 0..100 {
            clock.advance(Duration::from_millis(100));
            pipeline.process(&mut frame, &registry, &overlays);
        }
        assert!(!pipeline.glitch_active());
        assert!(frame.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_failing_stage_leaves_other_stages_applied() {
        // 40x40 is too small for the artifacts stage but fine for chromatic.
        let (_clock, mut pipeline, registry, overlays) = pipeline_parts();
        registry.set_enabled(Effect::Chromatic, true);
        registry.set_intensity(Effect::Chromatic, 1.0);
        registry.set_enabled(Effect::Artifacts, true);
        registry.set_intensity(Effect::Artifacts, 1.0);

        let mut frame = Frame::filled(40, 40, [128, 128, 128]);
        pipeline.process(&mut frame, &registry, &overlays);

        // Chromatic still ran: red channel vacated on the left edge.
        assert_eq!(frame.pixel(0, 20)[0], 0);
        assert_eq!(frame.pixel(0, 20)[1], 128);
    }

    #[test]
    fn test_empty_glitch_collection_degrades_to_passthrough() {
        let (clock, mut pipeline, registry, overlays) = pipeline_parts();
        registry.set_enabled(Effect::Glitch, true);
        registry.set_intensity(Effect::Glitch, 1.0);

        let mut frame = Frame::filled(FRAME_WIDTH, FRAME_HEIGHT, [9, 9, 9]);
        let before = frame.clone();
        for _ in 0..60 {
            clock.advance(Duration::from_millis(100));
            pipeline.process(&mut frame, &registry, &overlays);
        }
        assert_eq!(frame, before);
    }
}
