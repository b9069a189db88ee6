//! Overlay image store
//!
//! Loads and caches the two image collections the pipeline blends from:
//! glitch frames and extra overlays. Every image is resized to the working
//! resolution at load time so the per-frame blend never resizes. A reload
//! rebuilds the collection off to the side and swaps it in whole, so a reader
//! mid-frame sees either the old collection or the new one, never a mix.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::FilterType;
use parking_lot::RwLock;

use crate::frame::{Frame, FRAME_HEIGHT, FRAME_WIDTH};

/// An immutable, atomically replaceable sequence of overlay frames.
type Collection = Arc<Vec<Arc<Frame>>>;

/// Store for the glitch-frame and extra-overlay image collections.
pub struct OverlayStore {
    glitch_dir: PathBuf,
    extra_dir: PathBuf,
    glitch_frames: RwLock<Collection>,
    extra_images: RwLock<Collection>,
}

impl OverlayStore {
    /// Load both collections from their directories.
    ///
    /// Missing or empty directories yield empty collections; the pipeline
    /// degrades to "no overlay" rather than failing.
    pub fn new(glitch_dir: impl Into<PathBuf>, extra_dir: impl Into<PathBuf>) -> Self {
        let glitch_dir = glitch_dir.into();
        let extra_dir = extra_dir.into();
        let glitch_frames = Arc::new(load_collection(&glitch_dir));
        let extra_images = Arc::new(load_collection(&extra_dir));

        log::info!(
            "Overlay store: {} glitch frame(s) from {}, {} extra overlay(s) from {}",
            glitch_frames.len(),
            glitch_dir.display(),
            extra_images.len(),
            extra_dir.display()
        );

        Self {
            glitch_dir,
            extra_dir,
            glitch_frames: RwLock::new(glitch_frames),
            extra_images: RwLock::new(extra_images),
        }
    }

    /// Create an empty store with no backing directories (tests, headless).
    pub fn empty() -> Self {
        Self {
            glitch_dir: PathBuf::new(),
            extra_dir: PathBuf::new(),
            glitch_frames: RwLock::new(Arc::new(Vec::new())),
            extra_images: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Current glitch-frame collection.
    pub fn glitch_frames(&self) -> Collection {
        self.glitch_frames.read().clone()
    }

    /// Current extra-overlay collection.
    pub fn extra_images(&self) -> Collection {
        self.extra_images.read().clone()
    }

    /// Rebuild the glitch-frame collection from disk and swap it in.
    pub fn reload(&self) {
        let rebuilt = Arc::new(load_collection(&self.glitch_dir));
        log::info!("Overlay store: reloaded {} glitch frame(s)", rebuilt.len());
        *self.glitch_frames.write() = rebuilt;
    }

    /// Rebuild the extra-overlay collection from disk and swap it in.
    pub fn reload_extra(&self) {
        let rebuilt = Arc::new(load_collection(&self.extra_dir));
        log::info!("Overlay store: reloaded {} extra overlay(s)", rebuilt.len());
        *self.extra_images.write() = rebuilt;
    }

    /// Replace the glitch collection directly (tests).
    #[cfg(test)]
    pub(crate) fn set_glitch_frames(&self, frames: Vec<Arc<Frame>>) {
        *self.glitch_frames.write() = Arc::new(frames);
    }
}

/// Load every readable image in `dir`, resized to the working resolution.
///
/// Unreadable entries are skipped with a warning; a missing directory yields
/// an empty collection.
fn load_collection(dir: &Path) -> Vec<Arc<Frame>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Overlay directory {} unreadable: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("png") | Some("jpg") | Some("jpeg")
            )
        })
        .collect();
    // Stable ordering so a reload with unchanged files is a no-op.
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        match load_frame(&path) {
            Ok(frame) => frames.push(Arc::new(frame)),
            Err(e) => {
                log::warn!("Skipping overlay {}: {}", path.display(), e);
            }
        }
    }
    frames
}

/// Decode one image file into a working-resolution frame.
fn load_frame(path: &Path) -> Result<Frame, String> {
    let img = image::open(path).map_err(|e| e.to_string())?;
    let resized = img
        .resize_exact(FRAME_WIDTH, FRAME_HEIGHT, FilterType::Triangle)
        .to_rgb8();
    Frame::from_raw(FRAME_WIDTH, FRAME_HEIGHT, resized.into_raw())
        .ok_or_else(|| "decoded buffer has unexpected length".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Unique scratch directory under the system temp dir.
    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "glitchcam-overlay-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_png(dir: &Path, name: &str, rgb: [u8; 3]) {
        let img = RgbImage::from_pixel(8, 8, Rgb(rgb));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_missing_directory_yields_empty_collection() {
        let store = OverlayStore::new("/nonexistent/frames", "/nonexistent/extra");
        assert!(store.glitch_frames().is_empty());
        assert!(store.extra_images().is_empty());
    }

    #[test]
    fn test_load_resizes_to_working_resolution() {
        let dir = scratch_dir("resize");
        write_png(&dir, "a.png", [200, 0, 0]);
        let store = OverlayStore::new(&dir, "/nonexistent/extra");

        let frames = store.glitch_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].width(), FRAME_WIDTH);
        assert_eq!(frames[0].height(), FRAME_HEIGHT);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_corrupt_files_are_skipped() {
        let dir = scratch_dir("corrupt");
        write_png(&dir, "good.png", [0, 200, 0]);
        std::fs::write(dir.join("bad.png"), b"not a png").unwrap();
        let store = OverlayStore::new(&dir, "/nonexistent/extra");

        assert_eq!(store.glitch_frames().len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_extra_collection_loads_and_reloads() {
        let dir = scratch_dir("extra");
        write_png(&dir, "sticker.png", [9, 9, 9]);
        let store = OverlayStore::new("/nonexistent/frames", &dir);

        assert_eq!(store.extra_images().len(), 1);
        write_png(&dir, "second.png", [8, 8, 8]);
        store.reload_extra();
        assert_eq!(store.extra_images().len(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_reload_swaps_whole_collection() {
        let dir = scratch_dir("reload");
        write_png(&dir, "a.png", [1, 2, 3]);
        let store = OverlayStore::new(&dir, "/nonexistent/extra");

        // A reader holding the old collection keeps it intact across reload.
        let before = store.glitch_frames();
        assert_eq!(before.len(), 1);

        write_png(&dir, "b.png", [4, 5, 6]);
        write_png(&dir, "c.png", [7, 8, 9]);
        store.reload();

        assert_eq!(before.len(), 1);
        assert_eq!(store.glitch_frames().len(), 3);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
