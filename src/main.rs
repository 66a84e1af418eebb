//! Argus multi-camera capture rig.

use std::path::Path;
use std::sync::Arc;

use argus::supervisor::Supervisor;
use argus::Config;
use color_eyre::Result;
use tracing::info;

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "argus=info".to_owned()),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("argus starting");

    let config_path = std::env::var("ARGUS_CONFIG").unwrap_or_else(|_| "argus.toml".to_owned());
    let config = Config::load(Path::new(&config_path))?;
    info!(?config, "configuration loaded");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    #[cfg(feature = "driver-v4l2")]
    let driver = Arc::new(argus::camera::v4l2::V4l2Driver::new());
    #[cfg(not(feature = "driver-v4l2"))]
    let driver = Arc::new(argus::camera::sim::SimDriver::paced(&config.pg_serial, 30.0));

    #[cfg(feature = "display-sdl2")]
    let display = argus::display::sdl2::Sdl2Display::new(config.preview_width, config.preview_height)?;
    #[cfg(not(feature = "display-sdl2"))]
    let display = argus::display::HeadlessDisplay::new();

    Supervisor::new(&config, driver, display).run(&runtime)?;

    info!("argus shut down cleanly");
    Ok(())
}
