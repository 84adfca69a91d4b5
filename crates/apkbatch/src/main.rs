//! Bulk downloader and installer for Android packages listed in a CSV ledger.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use mimalloc::MiMalloc;
use tracing::{error, info, warn};

use crate::{
    adb::AdbBridge,
    console::{Reporter, TerminalReporter},
    downloader::Downloader,
    ledger::Ledger,
    menu::Menu,
    settings::SettingsHandler,
    task::BatchRunner,
    utils::resolve_binary_path,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod adb;
mod console;
mod downloader;
mod ledger;
mod local_packages;
mod logging;
mod menu;
mod models;
mod settings;
mod task;
mod utils;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        error!(message = %panic_info, %backtrace, "Panic");
        original_hook(panic_info);
    }));

    let work_dir = std::env::current_dir().context("Failed to determine working directory")?;
    let (settings, settings_error) = SettingsHandler::new(work_dir.clone()).load_or_default();
    let _guard = logging::setup_logging(&work_dir, &settings.log_level)?;
    info!(version = env!("CARGO_PKG_VERSION"), work_dir = %work_dir.display(), ?settings, "Starting");

    let reporter: Arc<dyn Reporter> = Arc::new(TerminalReporter::new());
    if let Some(e) = settings_error {
        warn!(error = e.as_ref() as &dyn std::error::Error, "Failed to load settings, using defaults");
        reporter.warn(&format!("Ignoring settings.json ({e:#}), using defaults"));
    }

    // A missing adb only matters once a workflow needs a device
    let adb_path = resolve_binary_path(Some(settings.adb_path.as_str()), "adb").unwrap_or_else(|e| {
        warn!(error = e.as_ref() as &dyn std::error::Error, "adb not resolved, falling back to plain `adb`");
        PathBuf::from("adb")
    });
    let bridge = Arc::new(AdbBridge::new(adb_path, settings.install_timeout()));
    let downloader = Downloader::new(&settings, reporter.clone())?;
    let ledger = Arc::new(Ledger::new(work_dir.join(&settings.ledger_file)));
    let runner = BatchRunner::new(&settings, work_dir, ledger, downloader, bridge, reporter.clone());

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    Menu::new(runner, reporter, stdin).run().await?;
    info!("Exiting");
    Ok(())
}
