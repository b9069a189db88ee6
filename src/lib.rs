//! glitchcam - live camera glitch effects
//!
//! Captures camera frames, runs them through a chain of configurable
//! distortion effects (static, glitch bursts, screen tear, VHS, noise,
//! color distortion, chromatic aberration, tracking, digital artifacts) and
//! republishes the processed stream to a preview consumer and a virtual
//! camera sink.
//!
//! # Architecture
//!
//! - `frame`: the fixed-resolution RGB buffer every transform mutates.
//! - `overlay`: glitch-frame and extra-overlay image collections.
//! - `effects`: registry, glitch burst sequencer, transform stages and the
//!   fixed-order pipeline.
//! - `camera`: frame source trait + nokhwa implementation.
//! - `output`: preview and virtual camera sinks.
//! - `app`: the capture loop worker tying it all together.

pub mod app;
pub mod camera;
pub mod clock;
pub mod effects;
pub mod frame;
pub mod output;
pub mod overlay;
pub mod settings;

pub use app::App;
