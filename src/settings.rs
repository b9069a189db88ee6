//! Startup settings
//!
//! The enumerated configuration surface consumed by the effect registry at
//! startup: per-effect enable/intensity/speed plus the glitch timing knobs
//! and the capture rate. Loaded from a JSON file; a missing file means
//! defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::effects::{Effect, EffectRegistry, GlitchTiming};

/// Startup configuration, one field per published option.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupSettings {
    pub static_enabled: bool,
    pub static_intensity: f32,
    pub static_speed: f32,

    pub glitch_enabled: bool,
    pub glitch_intensity: f32,
    pub glitch_speed: f32,

    pub tear_enabled: bool,
    pub tear_intensity: f32,
    pub tear_speed: f32,

    pub vhs_enabled: bool,
    pub vhs_intensity: f32,
    pub vhs_speed: f32,

    pub noise_enabled: bool,
    pub noise_intensity: f32,
    pub noise_speed: f32,

    pub color_distortion_enabled: bool,
    pub color_distortion_intensity: f32,
    pub color_distortion_speed: f32,

    pub chromatic_enabled: bool,
    pub chromatic_intensity: f32,
    pub chromatic_speed: f32,

    pub tracking_enabled: bool,
    pub tracking_intensity: f32,
    pub tracking_speed: f32,

    pub artifacts_enabled: bool,
    pub artifacts_intensity: f32,
    pub artifacts_speed: f32,

    /// Seconds each glitch burst frame stays up.
    pub glitch_duration: f32,
    /// Seconds between glitch trigger windows.
    pub glitch_frequency: f32,
    /// Burst chance knob (derived again on intensity changes).
    pub glitch_burst_chance: f32,
    /// Allowed burst lengths.
    pub glitch_frames_in_burst: Vec<u32>,
    /// Overlay blend ratio; 1.0 fully replaces the frame.
    pub glitch_blend_alpha: f32,

    /// Capture target frame rate.
    pub fps: u32,
}

impl Default for StartupSettings {
    fn default() -> Self {
        Self {
            static_enabled: true,
            static_intensity: 0.1,
            static_speed: 1.0,

            glitch_enabled: true,
            glitch_intensity: 0.1,
            glitch_speed: 1.0,

            tear_enabled: true,
            tear_intensity: 0.3,
            tear_speed: 1.0,

            vhs_enabled: false,
            vhs_intensity: 0.1,
            vhs_speed: 1.0,

            noise_enabled: false,
            noise_intensity: 0.4,
            noise_speed: 1.0,

            color_distortion_enabled: false,
            color_distortion_intensity: 0.5,
            color_distortion_speed: 1.0,

            chromatic_enabled: false,
            chromatic_intensity: 0.3,
            chromatic_speed: 1.0,

            tracking_enabled: false,
            tracking_intensity: 0.3,
            tracking_speed: 1.0,

            artifacts_enabled: false,
            artifacts_intensity: 0.3,
            artifacts_speed: 1.0,

            glitch_duration: 2.0,
            glitch_frequency: 3.0,
            glitch_burst_chance: 2.5,
            glitch_frames_in_burst: vec![1, 2, 3],
            glitch_blend_alpha: 1.0,

            fps: 10,
        }
    }
}

/// Settings-related errors.
#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "IO error: {}", e),
            SettingsError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for SettingsError {}

impl StartupSettings {
    /// Load settings from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(SettingsError::Io)?;
        let mut settings: Self = serde_json::from_str(&contents).map_err(SettingsError::Json)?;
        settings.clamp();
        Ok(settings)
    }

    /// Load settings, falling back to defaults when the file is missing or
    /// malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load_from_file(path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Using default settings ({}: {})", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save settings to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self).map_err(SettingsError::Json)?;
        fs::write(path, json).map_err(SettingsError::Io)
    }

    /// Clamp every value to its valid range.
    pub fn clamp(&mut self) {
        for (intensity, speed) in self.effect_fields_mut() {
            *intensity = intensity.clamp(0.0, 1.0);
            *speed = speed.max(f32::MIN_POSITIVE);
        }
        self.glitch_duration = self.glitch_duration.max(f32::MIN_POSITIVE);
        self.glitch_frequency = self.glitch_frequency.max(0.0);
        self.glitch_blend_alpha = self.glitch_blend_alpha.clamp(0.0, 1.0);
        self.glitch_frames_in_burst.retain(|&n| n > 0);
        if self.glitch_frames_in_burst.is_empty() {
            self.glitch_frames_in_burst = vec![1];
        }
        self.fps = self.fps.clamp(1, 60);
    }

    /// Push this configuration into a registry.
    ///
    /// Glitch timing from the file wins over the values derived while
    /// applying the glitch intensity.
    pub fn apply(&self, registry: &EffectRegistry) {
        for (effect, enabled, intensity, speed) in self.effect_values() {
            registry.set_enabled(effect, enabled);
            registry.set_intensity(effect, intensity);
            registry.set_speed(effect, speed);
        }
        registry.set_glitch_timing(GlitchTiming {
            duration: self.glitch_duration,
            frequency: self.glitch_frequency,
            burst_chance: self.glitch_burst_chance,
            frames_in_burst: self.glitch_frames_in_burst.clone(),
            blend_alpha: self.glitch_blend_alpha,
        });
    }

    fn effect_values(&self) -> [(Effect, bool, f32, f32); 9] {
        [
            (Effect::Static, self.static_enabled, self.static_intensity, self.static_speed),
            (Effect::Glitch, self.glitch_enabled, self.glitch_intensity, self.glitch_speed),
            (Effect::Tear, self.tear_enabled, self.tear_intensity, self.tear_speed),
            (Effect::Vhs, self.vhs_enabled, self.vhs_intensity, self.vhs_speed),
            (Effect::Noise, self.noise_enabled, self.noise_intensity, self.noise_speed),
            (
                Effect::ColorDistortion,
                self.color_distortion_enabled,
                self.color_distortion_intensity,
                self.color_distortion_speed,
            ),
            (
                Effect::Chromatic,
                self.chromatic_enabled,
                self.chromatic_intensity,
                self.chromatic_speed,
            ),
            (
                Effect::Tracking,
                self.tracking_enabled,
                self.tracking_intensity,
                self.tracking_speed,
            ),
            (
                Effect::Artifacts,
                self.artifacts_enabled,
                self.artifacts_intensity,
                self.artifacts_speed,
            ),
        ]
    }

    fn effect_fields_mut(&mut self) -> [(&mut f32, &mut f32); 9] {
        [
            (&mut self.static_intensity, &mut self.static_speed),
            (&mut self.glitch_intensity, &mut self.glitch_speed),
            (&mut self.tear_intensity, &mut self.tear_speed),
            (&mut self.vhs_intensity, &mut self.vhs_speed),
            (&mut self.noise_intensity, &mut self.noise_speed),
            (&mut self.color_distortion_intensity, &mut self.color_distortion_speed),
            (&mut self.chromatic_intensity, &mut self.chromatic_speed),
            (&mut self.tracking_intensity, &mut self.tracking_speed),
            (&mut self.artifacts_intensity, &mut self.artifacts_speed),
        ]
    }
}
