//! Effects system
//!
//! - **Registry** (`registry.rs`): per-effect enabled/intensity/speed state,
//!   thread-safely mutable from a control surface and read by the pipeline
//!   as consistent snapshots.
//! - **Sequencer** (`sequencer.rs`): the glitch burst timing state machine.
//! - **Stages** (`stages.rs`): the per-frame pixel transforms.
//! - **Pipeline** (`pipeline.rs`): the fixed-order fold over stages.

mod pipeline;
mod registry;
mod sequencer;
mod stages;

pub use pipeline::*;
pub use registry::*;
pub use sequencer::*;
pub use stages::StageError;

/// The nine toggleable effects, in pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Effect {
    Static,
    Glitch,
    Tear,
    Vhs,
    Noise,
    ColorDistortion,
    Chromatic,
    Tracking,
    Artifacts,
}

impl Effect {
    /// All effects, in pipeline order.
    pub const ALL: [Effect; 9] = [
        Effect::Static,
        Effect::Glitch,
        Effect::Tear,
        Effect::Vhs,
        Effect::Noise,
        Effect::ColorDistortion,
        Effect::Chromatic,
        Effect::Tracking,
        Effect::Artifacts,
    ];

    /// Stable configuration key for this effect.
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Static => "static",
            Effect::Glitch => "glitch",
            Effect::Tear => "tear",
            Effect::Vhs => "vhs",
            Effect::Noise => "noise",
            Effect::ColorDistortion => "color_distortion",
            Effect::Chromatic => "chromatic",
            Effect::Tracking => "tracking",
            Effect::Artifacts => "artifacts",
        }
    }

    /// Parse a configuration key. Unknown names are rejected, never
    /// silently mapped to new state.
    pub fn from_name(name: &str) -> Option<Effect> {
        Effect::ALL.iter().copied().find(|e| e.name() == name)
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for effect in Effect::ALL {
            assert_eq!(Effect::from_name(effect.name()), Some(effect));
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        assert_eq!(Effect::from_name("bloom"), None);
        assert_eq!(Effect::from_name(""), None);
    }
}
