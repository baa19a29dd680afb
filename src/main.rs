#![cfg_attr(windows, windows_subsystem = "windows")]
mod cli_app;
mod config;
mod constants;
mod device;
mod dispatcher;
mod emulators;
mod error;
mod focus;
mod gui_app;
mod output;
mod poller_worker;
mod status;
mod transform;
mod virtual_pad;

use cli_app::CliApp;
use eframe::{NativeOptions, egui};
use gui_app::GuiApp;
use tracing_subscriber::EnvFilter;

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .init();
}

fn main() -> anyhow::Result<()> {
    setup_logging();

    // --cli / --legacy run the console interface instead of the window
    if std::env::args().any(|arg| arg == "--cli" || arg == "--legacy") {
        return CliApp::new()?.run();
    }

    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([640.0, 720.0])
            .with_min_inner_size([480.0, 480.0]),
        ..Default::default()
    };

    eframe::run_native(
        "G29 to Roblox Interface",
        options,
        Box::new(|_cc| Ok(Box::new(GuiApp::new()) as Box<dyn eframe::App>)),
    )
    .map_err(|e| anyhow::anyhow!("GUI error: {e}"))
}
