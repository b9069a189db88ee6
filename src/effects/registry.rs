//! Effect registry
//!
//! Holds the per-effect enabled flag, intensity and speed, plus the glitch
//! timing parameters derived from the glitch intensity. The control surface
//! mutates it from its own thread; the pipeline reads a whole-state snapshot
//! once per frame so a single effect's fields are never observed half
//! updated.

use parking_lot::RwLock;

use super::Effect;

/// Consistently-read copy of one effect's state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectSnapshot {
    pub enabled: bool,
    pub intensity: f32,
    pub speed: f32,
}

/// Glitch burst timing parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct GlitchTiming {
    /// Seconds each burst frame stays on screen.
    pub duration: f32,
    /// Minimum seconds between trigger attempts.
    pub frequency: f32,
    /// Derived burst chance, recomputed from the glitch intensity.
    pub burst_chance: f32,
    /// Allowed burst lengths, sampled uniformly on trigger.
    pub frames_in_burst: Vec<u32>,
    /// Overlay blend ratio; 1.0 fully replaces the frame.
    pub blend_alpha: f32,
}

impl Default for GlitchTiming {
    fn default() -> Self {
        // Raw startup values; the first glitch intensity write recomputes
        // duration/frequency/burst_chance.
        Self {
            duration: 2.0,
            frequency: 3.0,
            burst_chance: 2.5,
            frames_in_burst: vec![1, 2, 3],
            blend_alpha: 1.0,
        }
    }
}

/// Full registry state, copied wholesale into per-frame snapshots.
#[derive(Clone, Debug)]
pub struct RegistrySnapshot {
    effects: [EffectSnapshot; 9],
    glitch: GlitchTiming,
}

impl RegistrySnapshot {
    /// State of one effect.
    pub fn effect(&self, effect: Effect) -> EffectSnapshot {
        self.effects[index_of(effect)]
    }

    /// Glitch timing parameters.
    pub fn glitch_timing(&self) -> &GlitchTiming {
        &self.glitch
    }
}

/// Registry error.
#[derive(Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// The effect name does not match any registered effect.
    UnknownEffect(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::UnknownEffect(name) => write!(f, "unknown effect: {}", name),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Thread-safe per-effect state shared between the control surface and the
/// pipeline thread.
pub struct EffectRegistry {
    state: RwLock<RegistrySnapshot>,
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectRegistry {
    /// Create a registry with the default effect set: static, glitch and
    /// tear enabled at their default intensities, everything else off.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(default_state()),
        }
    }

    /// Restore startup defaults.
    pub fn reset(&self) {
        *self.state.write() = default_state();
    }

    /// Enable or disable one effect.
    pub fn set_enabled(&self, effect: Effect, enabled: bool) {
        self.state.write().effects[index_of(effect)].enabled = enabled;
    }

    /// Set one effect's intensity, clamped to [0, 1].
    ///
    /// Setting the glitch intensity also recomputes the derived burst
    /// timing: fixed 0.5 s duration, 2-4 s frequency, up to 0.8 burst
    /// chance.
    pub fn set_intensity(&self, effect: Effect, intensity: f32) {
        let intensity = intensity.clamp(0.0, 1.0);
        let mut state = self.state.write();
        state.effects[index_of(effect)].intensity = intensity;

        if effect == Effect::Glitch {
            state.glitch.duration = 0.5;
            state.glitch.frequency = (2.0f32).max((1.0 - intensity) * 4.0);
            state.glitch.burst_chance = (0.8f32).min(intensity * 0.8);
        }
    }

    /// Set one effect's speed multiplier, clamped to be positive.
    pub fn set_speed(&self, effect: Effect, speed: f32) {
        self.state.write().effects[index_of(effect)].speed = speed.max(f32::MIN_POSITIVE);
    }

    /// String-keyed variant of [`set_enabled`](Self::set_enabled).
    pub fn set_enabled_by_name(&self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        let effect = lookup(name)?;
        self.set_enabled(effect, enabled);
        Ok(())
    }

    /// String-keyed variant of [`set_intensity`](Self::set_intensity).
    pub fn set_intensity_by_name(&self, name: &str, intensity: f32) -> Result<(), RegistryError> {
        let effect = lookup(name)?;
        self.set_intensity(effect, intensity);
        Ok(())
    }

    /// String-keyed variant of [`set_speed`](Self::set_speed).
    pub fn set_speed_by_name(&self, name: &str, speed: f32) -> Result<(), RegistryError> {
        let effect = lookup(name)?;
        self.set_speed(effect, speed);
        Ok(())
    }

    /// One effect's state, read consistently.
    pub fn effect(&self, effect: Effect) -> EffectSnapshot {
        self.state.read().effects[index_of(effect)]
    }

    /// String-keyed variant of [`effect`](Self::effect).
    pub fn effect_by_name(&self, name: &str) -> Result<EffectSnapshot, RegistryError> {
        Ok(self.effect(lookup(name)?))
    }

    /// Current glitch timing parameters.
    pub fn glitch_timing(&self) -> GlitchTiming {
        self.state.read().glitch.clone()
    }

    /// Overwrite the glitch timing parameters (configuration surface).
    ///
    /// Duration/frequency are kept positive, burst lengths non-empty and
    /// blend alpha inside [0, 1].
    pub fn set_glitch_timing(&self, timing: GlitchTiming) {
        let mut timing = timing;
        timing.duration = timing.duration.max(f32::MIN_POSITIVE);
        timing.frequency = timing.frequency.max(0.0);
        timing.blend_alpha = timing.blend_alpha.clamp(0.0, 1.0);
        timing.frames_in_burst.retain(|&n| n > 0);
        if timing.frames_in_burst.is_empty() {
            timing.frames_in_burst = vec![1];
        }
        self.state.write().glitch = timing;
    }

    /// Whole-state copy for one pipeline invocation.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.state.read().clone()
    }
}

fn lookup(name: &str) -> Result<Effect, RegistryError> {
    Effect::from_name(name).ok_or_else(|| RegistryError::UnknownEffect(name.to_string()))
}

fn index_of(effect: Effect) -> usize {
    Effect::ALL.iter().position(|&e| e == effect).unwrap()
}

fn default_state() -> RegistrySnapshot {
    let defaults: [(bool, f32); 9] = [
        (true, 0.1),  // static
        (true, 0.1),  // glitch
        (true, 0.3),  // tear
        (false, 0.1), // vhs
        (false, 0.4), // noise
        (false, 0.5), // color_distortion
        (false, 0.3), // chromatic
        (false, 0.3), // tracking
        (false, 0.3), // artifacts
    ];

    let effects = defaults.map(|(enabled, intensity)| EffectSnapshot {
        enabled,
        intensity,
        speed: 1.0,
    });

    RegistrySnapshot {
        effects,
        glitch: GlitchTiming::default(),
    }
}
