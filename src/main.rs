//! glitchcam - main entry point
//!
//! Headless runner: opens a camera, applies the configured effect chain and
//! serves the processed stream until interrupted. The preview and virtual
//! camera consumers attach through the sink interfaces; without a platform
//! backend the stream is processed and dropped, which is still useful for
//! soak-testing effect settings.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use glitchcam::app::App;
use glitchcam::camera::NokhwaSource;
use glitchcam::effects::EffectRegistry;
use glitchcam::output::Router;
use glitchcam::overlay::OverlayStore;
use glitchcam::settings::StartupSettings;

const SETTINGS_FILE: &str = "glitchcam.json";
const FRAMES_DIR: &str = "static/frames";
const EXTRA_DIR: &str = "static/extra";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("glitchcam v{}", env!("CARGO_PKG_VERSION"));

    // Optional args: [camera index] [settings path]
    let mut args = std::env::args().skip(1);
    let camera_index: u32 = args
        .next()
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(0);
    let settings_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE));

    let settings = StartupSettings::load_or_default(&settings_path);

    let devices = NokhwaSource::list_devices();
    if devices.is_empty() {
        log::error!("No capture devices found");
        std::process::exit(1);
    }
    for device in &devices {
        log::info!("Camera {}: {}", device.index, device.label);
    }

    let source = match NokhwaSource::open(camera_index) {
        Ok(source) => source,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let registry = Arc::new(EffectRegistry::new());
    settings.apply(&registry);

    let overlays = Arc::new(OverlayStore::new(FRAMES_DIR, EXTRA_DIR));

    // No platform virtual camera backend is wired in here; consumers attach
    // a preview receiver or a VirtualCamera impl through the library API.
    let sink = Router::default();

    let mut app = App::new(registry, overlays);
    if let Err(e) = app.start(Box::new(source), Box::new(sink), settings.fps) {
        log::error!("{}", e);
        std::process::exit(1);
    }

    let running = app.running_flag();
    ctrlc::set_handler(move || {
        log::info!("Interrupt received, stopping");
        running.store(false, std::sync::atomic::Ordering::Release);
    })
    .expect("Failed to install interrupt handler");

    // Park until the loop winds down (interrupt or end-of-stream).
    while app.is_running() {
        std::thread::sleep(Duration::from_millis(100));
    }
    app.stop();

    log::info!("Done");
}
