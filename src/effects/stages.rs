//! Per-frame pixel transforms
//!
//! Each stage mutates the frame in place and reports success or a skip
//! reason. Stages never change the frame dimensions or channel count, and
//! every stage draws randomness only from the RNG handed to it, so stages
//! cannot couple through shared random state.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::frame::{Frame, FRAME_CHANNELS};

/// Cached static-noise refresh cap (30 Hz).
const STATIC_REFRESH: Duration = Duration::from_nanos(1_000_000_000 / 30);

/// A stage that could not run; the pipeline logs it and moves on.
#[derive(Debug)]
pub struct StageError {
    stage: &'static str,
    reason: String,
}

impl StageError {
    fn new(stage: &'static str, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }

    /// Name of the stage that was skipped.
    pub fn stage(&self) -> &'static str {
        self.stage
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} stage skipped: {}", self.stage, self.reason)
    }
}

impl std::error::Error for StageError {}

pub(super) type StageResult = Result<(), StageError>;

/// Weighted blend of two u8 samples, rounded like the original compositor.
#[inline]
fn blend_u8(a: u8, wa: f32, b: u8, wb: f32) -> u8 {
    (a as f32 * wa + b as f32 * wb + 0.5).clamp(0.0, 255.0) as u8
}

/// Roll one row of interleaved pixels horizontally with wraparound.
fn roll_row(row: &mut [u8], width: usize, shift: i32) {
    if width == 0 {
        return;
    }
    let by = shift.rem_euclid(width as i32) as usize * FRAME_CHANNELS;
    if by != 0 {
        row.rotate_right(by);
    }
}

/// Roll a single channel horizontally with wraparound, every row.
fn roll_channel(frame: &mut Frame, channel: usize, shift: i32) {
    let width = frame.width() as usize;
    if width == 0 || shift.rem_euclid(width as i32) == 0 {
        return;
    }
    let row_len = frame.row_len();
    let mut scratch = vec![0u8; width];
    for y in 0..frame.height() {
        let offset = frame.row_offset(y);
        let row = &mut frame.data_mut()[offset..offset + row_len];
        for x in 0..width {
            scratch[x] = row[x * FRAME_CHANNELS + channel];
        }
        scratch.rotate_right(shift.rem_euclid(width as i32) as usize);
        for x in 0..width {
            row[x * FRAME_CHANNELS + channel] = scratch[x];
        }
    }
}

/// Shift a single channel horizontally, filling vacated pixels with zero.
fn shift_channel_zero_fill(frame: &mut Frame, channel: usize, shift: i32) {
    if shift == 0 {
        return;
    }
    let width = frame.width() as i32;
    let row_len = frame.row_len();
    let mut scratch = vec![0u8; width as usize];
    for y in 0..frame.height() {
        let offset = frame.row_offset(y);
        let row = &mut frame.data_mut()[offset..offset + row_len];
        for x in 0..width {
            let src = x - shift;
            scratch[x as usize] = if src >= 0 && src < width {
                row[src as usize * FRAME_CHANNELS + channel]
            } else {
                0
            };
        }
        for x in 0..width as usize {
            row[x * FRAME_CHANNELS + channel] = scratch[x];
        }
    }
}

/// Glitch overlay blend at the configured alpha (1.0 fully replaces the
/// frame).
pub(super) fn blend_overlay(frame: &mut Frame, overlay: &Frame, alpha: f32) -> StageResult {
    if overlay.width() != frame.width() || overlay.height() != frame.height() {
        return Err(StageError::new(
            "glitch",
            format!(
                "overlay is {}x{}, frame is {}x{}",
                overlay.width(),
                overlay.height(),
                frame.width(),
                frame.height()
            ),
        ));
    }

    let alpha = alpha.clamp(0.0, 1.0);
    let src = overlay.data();
    for (dst, &over) in frame.data_mut().iter_mut().zip(src.iter()) {
        *dst = blend_u8(*dst, 1.0 - alpha, over, alpha);
    }
    Ok(())
}

/// Cached static-noise overlay, regenerated at most 30 times per second no
/// matter how fast the pipeline runs.
pub(super) struct StaticOverlayCache {
    buf: Vec<u8>,
    last_update: Option<Instant>,
    rng: StdRng,
}

impl StaticOverlayCache {
    pub(super) fn new(rng: StdRng) -> Self {
        Self {
            buf: Vec::new(),
            last_update: None,
            rng,
        }
    }

    /// Grayscale noise buffer for the given frame size, refreshed when
    /// stale.
    fn overlay(&mut self, now: Instant, width: u32, height: u32) -> &[u8] {
        let len = width as usize * height as usize;
        let stale = match self.last_update {
            Some(at) => now.duration_since(at) >= STATIC_REFRESH,
            None => true,
        };
        if stale || self.buf.len() != len {
            self.buf.resize(len, 0);
            for v in self.buf.iter_mut() {
                *v = self.rng.random_range(50..150);
            }
            self.last_update = Some(now);
        }
        &self.buf
    }
}

/// Static: cached grayscale noise blended as color at `intensity * 0.3`.
pub(super) fn apply_static(
    frame: &mut Frame,
    intensity: f32,
    cache: &mut StaticOverlayCache,
    now: Instant,
) -> StageResult {
    let alpha = intensity * 0.3;
    let (width, height) = (frame.width(), frame.height());
    let overlay = cache.overlay(now, width, height);

    for (px, &gray) in frame
        .data_mut()
        .chunks_exact_mut(FRAME_CHANNELS)
        .zip(overlay.iter())
    {
        for v in px.iter_mut() {
            *v = blend_u8(*v, 1.0 - alpha, gray, alpha);
        }
    }
    Ok(())
}

/// Screen tear: a random horizontal band rolled sideways with wraparound.
pub(super) fn apply_tear(frame: &mut Frame, rng: &mut StdRng) -> StageResult {
    let height = frame.height();
    let width = frame.width() as usize;

    let tear_point = rng.random_range(0..=height);
    let tear_height = rng.random_range(10..=50u32);
    if tear_point + tear_height >= height {
        // Band falls off the bottom; the original leaves the frame alone.
        return Ok(());
    }

    let shift = rng.random_range(-50..=50i32);
    let row_len = frame.row_len();
    for y in tear_point..tear_point + tear_height {
        let offset = frame.row_offset(y);
        roll_row(&mut frame.data_mut()[offset..offset + row_len], width, shift);
    }
    Ok(())
}

/// VHS: blurred noise underlay, every-other-row scanlines and a small
/// per-channel color bleed shift.
pub(super) fn apply_vhs(frame: &mut Frame, intensity: f32, rng: &mut StdRng) -> StageResult {
    let width = frame.width() as usize;
    let height = frame.height() as usize;

    let mut noise = vec![0u8; width * height * FRAME_CHANNELS];
    for v in noise.iter_mut() {
        *v = rng.random_range(0..255);
    }
    blur_3x3(&mut noise, width, height);

    // Color bleed: red and blue drift apart, green stays put.
    for (channel, direction) in [(0usize, 1.0f32), (2usize, -1.0f32)] {
        let shift = (2.0 * intensity * direction) as i32;
        roll_channel(frame, channel, shift);
    }

    let frame_weight = 1.0 - intensity * 0.3;
    let noise_weight = intensity * 0.1;
    let scan_weight = intensity * 0.2;
    let row_len = frame.row_len();

    for y in 0..height {
        let offset = y * row_len;
        let row = &mut frame.data_mut()[offset..offset + row_len];
        let scan = if y % 2 == 0 { 25.0 * scan_weight } else { 0.0 };
        for (v, &n) in row.iter_mut().zip(noise[offset..offset + row_len].iter()) {
            let mixed = *v as f32 * frame_weight + n as f32 * noise_weight + scan;
            *v = (mixed + 0.5).clamp(0.0, 255.0) as u8;
        }
    }
    Ok(())
}

/// Separable 3x3 binomial blur over an interleaved RGB buffer, edge clamped.
fn blur_3x3(buf: &mut [u8], width: usize, height: usize) {
    if width == 0 || height == 0 {
        return;
    }
    let row_len = width * FRAME_CHANNELS;
    let mut tmp = vec![0u8; buf.len()];

    // Horizontal pass.
    for y in 0..height {
        for x in 0..width {
            let left = x.saturating_sub(1);
            let right = (x + 1).min(width - 1);
            for c in 0..FRAME_CHANNELS {
                let sum = buf[y * row_len + left * FRAME_CHANNELS + c] as u32
                    + 2 * buf[y * row_len + x * FRAME_CHANNELS + c] as u32
                    + buf[y * row_len + right * FRAME_CHANNELS + c] as u32;
                tmp[y * row_len + x * FRAME_CHANNELS + c] = (sum / 4) as u8;
            }
        }
    }

    // Vertical pass.
    for y in 0..height {
        let up = y.saturating_sub(1);
        let down = (y + 1).min(height - 1);
        for x in 0..row_len {
            let sum = tmp[up * row_len + x] as u32
                + 2 * tmp[y * row_len + x] as u32
                + tmp[down * row_len + x] as u32;
            buf[y * row_len + x] = (sum / 4) as u8;
        }
    }
}

/// Additive Gaussian sensor noise, sigma = `intensity * 30`.
pub(super) fn apply_noise(frame: &mut Frame, intensity: f32, rng: &mut StdRng) -> StageResult {
    let sigma = intensity * 30.0;
    if sigma <= 0.0 {
        return Ok(());
    }
    let normal = Normal::new(0.0f32, sigma)
        .map_err(|e| StageError::new("noise", format!("bad sigma {}: {}", sigma, e)))?;

    for v in frame.data_mut().iter_mut() {
        let n: f32 = normal.sample(rng);
        *v = (*v as f32 + n).clamp(0.0, 255.0) as u8;
    }
    Ok(())
}

/// Color distortion: per-channel brightness scaling with random bias, then
/// red/blue pulled apart horizontally.
pub(super) fn apply_color_distortion(
    frame: &mut Frame,
    intensity: f32,
    rng: &mut StdRng,
) -> StageResult {
    // Channel gain per the original: blue brightens most, green dims.
    let gains = [
        1.0 + intensity * 0.15, // red
        1.0 - intensity * 0.1,  // green
        1.0 + intensity * 0.2,  // blue
    ];
    let biases: [f32; 3] = [
        rng.random_range(-20..=20) as f32,
        rng.random_range(-20..=20) as f32,
        rng.random_range(-20..=20) as f32,
    ];

    for px in frame.data_mut().chunks_exact_mut(FRAME_CHANNELS) {
        for c in 0..FRAME_CHANNELS {
            let v = px[c] as f32 * gains[c] + biases[c];
            px[c] = (v + 0.5).clamp(0.0, 255.0) as u8;
        }
    }

    let shift = (intensity * 4.0) as i32;
    shift_channel_zero_fill(frame, 0, shift);
    shift_channel_zero_fill(frame, 2, -shift);
    Ok(())
}

/// Chromatic aberration: red and blue offset in opposite directions by
/// `5 * intensity` pixels, green untouched.
pub(super) fn apply_chromatic(frame: &mut Frame, intensity: f32) -> StageResult {
    let shift = (5.0 * intensity) as i32;
    shift_channel_zero_fill(frame, 0, shift);
    shift_channel_zero_fill(frame, 2, -shift);
    Ok(())
}

/// VHS tracking: sometimes wipe a horizontal band with blended noise.
pub(super) fn apply_tracking(frame: &mut Frame, intensity: f32, rng: &mut StdRng) -> StageResult {
    if rng.random::<f32>() > intensity {
        return Ok(());
    }

    let height = frame.height();
    if height < 21 {
        return Err(StageError::new("tracking", "frame too short for a band"));
    }

    let y_pos = rng.random_range(0..=height - 20);
    let max_height = ((20.0 * intensity) as u32).max(11);
    let band_height = rng.random_range(10..=max_height).min(height - y_pos);

    let row_len = frame.row_len();
    for y in y_pos..y_pos + band_height {
        let offset = frame.row_offset(y);
        let row = &mut frame.data_mut()[offset..offset + row_len];
        for v in row.iter_mut() {
            let n: u8 = rng.random_range(0..255);
            *v = blend_u8(*v, 1.0 - intensity, n, intensity);
        }
    }
    Ok(())
}

/// Digital artifacts: a handful of blocks either pixel-sorted or rolled.
pub(super) fn apply_artifacts(frame: &mut Frame, intensity: f32, rng: &mut StdRng) -> StageResult {
    let width = frame.width();
    let height = frame.height();
    if width <= 50 || height <= 50 {
        return Err(StageError::new("artifacts", "frame too small for blocks"));
    }

    let count = (rng.random_range(3..=8) as f32 * intensity) as u32;
    for _ in 0..count {
        let x = rng.random_range(0..=width - 50);
        let y = rng.random_range(0..=height - 50);
        let block_w = rng.random_range(20..=((50.0 * intensity) as u32).max(21)).min(width - x);
        let block_h = rng.random_range(10..=((30.0 * intensity) as u32).max(11)).min(height - y);

        if rng.random::<f32>() < 0.5 {
            sort_block_rows(frame, x, y, block_w, block_h);
        } else {
            let shift = (rng.random_range(-10..=10) as f32 * intensity) as i32;
            roll_block_rows(frame, x, y, block_w, block_h, shift);
        }
    }
    Ok(())
}

/// Sort each channel of each row inside the block independently.
fn sort_block_rows(frame: &mut Frame, x: u32, y: u32, block_w: u32, block_h: u32) {
    let mut scratch = vec![0u8; block_w as usize];
    for row in y..y + block_h {
        let start = frame.row_offset(row) + x as usize * FRAME_CHANNELS;
        let span = &mut frame.data_mut()[start..start + block_w as usize * FRAME_CHANNELS];
        for c in 0..FRAME_CHANNELS {
            for (i, px) in span.chunks_exact(FRAME_CHANNELS).enumerate() {
                scratch[i] = px[c];
            }
            scratch.sort_unstable();
            for (i, px) in span.chunks_exact_mut(FRAME_CHANNELS).enumerate() {
                px[c] = scratch[i];
            }
        }
    }
}

/// Roll each row inside the block horizontally with wraparound.
fn roll_block_rows(frame: &mut Frame, x: u32, y: u32, block_w: u32, block_h: u32, shift: i32) {
    for row in y..y + block_h {
        let start = frame.row_offset(row) + x as usize * FRAME_CHANNELS;
        let span = &mut frame.data_mut()[start..start + block_w as usize * FRAME_CHANNELS];
        roll_row(span, block_w as usize, shift);
    }
}
