//! Glitch burst sequencer
//!
//! Timing state machine behind the glitch effect. Idle until the configured
//! frequency has elapsed since the last trigger, then a random draw against
//! the glitch intensity decides whether a burst starts. A burst presents 1-3
//! overlay frames, each held for the configured duration, re-picking the
//! overlay between burst frames. The state is owned by the pipeline thread
//! and only ever mutated on pipeline invocations.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use crate::frame::Frame;

use super::registry::GlitchTiming;

/// Timer state for the glitch burst machine.
#[derive(Debug)]
struct TimerState {
    active: bool,
    last_trigger: Instant,
    frame_start: Instant,
    frames_remaining: u32,
    current_overlay: Option<Arc<Frame>>,
}

/// The glitch burst state machine.
pub struct GlitchSequencer {
    rng: StdRng,
    state: TimerState,
}

impl GlitchSequencer {
    /// Create an idle sequencer. `now` seeds the trigger timer, so the first
    /// burst cannot fire before one full frequency interval has elapsed.
    pub fn new(now: Instant) -> Self {
        Self::with_rng(now, StdRng::from_os_rng())
    }

    /// Create a sequencer with a seeded RNG (tests).
    pub fn with_seed(now: Instant, seed: u64) -> Self {
        Self::with_rng(now, StdRng::seed_from_u64(seed))
    }

    fn with_rng(now: Instant, rng: StdRng) -> Self {
        Self {
            rng,
            state: TimerState {
                active: false,
                last_trigger: now,
                frame_start: now,
                frames_remaining: 0,
                current_overlay: None,
            },
        }
    }

    /// Whether a burst is currently presenting an overlay.
    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// Drop any in-flight burst and restart the trigger timer at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.state = TimerState {
            active: false,
            last_trigger: now,
            frame_start: now,
            frames_remaining: 0,
            current_overlay: None,
        };
    }

    /// Advance the machine one pipeline invocation and return the overlay to
    /// blend, if any.
    ///
    /// `overlays` is the current glitch-frame collection; when it is empty no
    /// new burst frame can be picked and the blend is disabled for this call.
    pub fn advance(
        &mut self,
        now: Instant,
        timing: &GlitchTiming,
        intensity: f32,
        overlays: &[Arc<Frame>],
    ) -> Option<Arc<Frame>> {
        let state = &mut self.state;

        if !state.active {
            let since_trigger = now.duration_since(state.last_trigger).as_secs_f32();
            if since_trigger > timing.frequency
                && !overlays.is_empty()
                && self.rng.random::<f32>() < intensity
            {
                state.active = true;
                state.last_trigger = now;
                state.frame_start = now;
                state.current_overlay = overlays.choose(&mut self.rng).cloned();
                state.frames_remaining =
                    timing.frames_in_burst.choose(&mut self.rng).copied().unwrap_or(1);
            }
        } else if now.duration_since(state.frame_start).as_secs_f32() >= timing.duration {
            if state.frames_remaining > 1 {
                // Next burst frame: new overlay, timer restarts.
                state.current_overlay = overlays.choose(&mut self.rng).cloned();
                state.frame_start = now;
                state.frames_remaining -= 1;
            } else {
                state.active = false;
                state.frames_remaining = 0;
                state.current_overlay = None;
                return None;
            }
        }

        if state.active {
            state.current_overlay.clone()
        } else {
            None
        }
    }
}
