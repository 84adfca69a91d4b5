use std::time::Duration;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

const MAX_WORKERS: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Path to the adb binary. Empty means "find `adb` on PATH".
    pub adb_path: String,
    /// Ledger file name, relative to the working directory
    pub ledger_file: String,
    pub package_extension: String,
    /// Number of concurrent workers in parallel mode
    pub workers: usize,
    pub parallel: bool,
    pub show_progress: bool,
    pub download_timeout_secs: u64,
    pub install_timeout_secs: u64,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            adb_path: String::new(),
            ledger_file: "download.csv".to_string(),
            package_extension: "apk".to_string(),
            workers: 5,
            parallel: true,
            show_progress: true,
            download_timeout_secs: 30,
            install_timeout_secs: 300,
            log_level: "debug".to_string(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.workers >= 1, "workers must be at least 1, got {}", self.workers);
        ensure!(
            self.workers <= MAX_WORKERS,
            "workers must be at most {MAX_WORKERS}, got {}",
            self.workers
        );
        ensure!(self.download_timeout_secs > 0, "download_timeout_secs must be positive");
        ensure!(self.install_timeout_secs > 0, "install_timeout_secs must be positive");
        ensure!(!self.ledger_file.trim().is_empty(), "ledger_file must not be empty");
        ensure!(
            !self.package_extension.trim().is_empty() && !self.package_extension.contains('.'),
            "package_extension must be a bare extension such as \"apk\""
        );
        Ok(())
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    /// Worker count actually used for a batch (sequential mode runs one at a time)
    pub fn effective_workers(&self) -> usize {
        if self.parallel { self.workers.max(1) } else { 1 }
    }
}
