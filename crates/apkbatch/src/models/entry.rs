use serde::Deserialize;

use super::{DownloadStatus, InstallStatus};

/// Download link recorded for packages installed from disk with no ledger row
pub const LOCAL_INSTALL_MARKER: &str = "local install";

/// One row of the ledger, keyed by application name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "App Name", alias = "应用名")]
    pub name: String,
    #[serde(rename = "Download Link", alias = "下载链接", default)]
    pub download_url: String,
    #[serde(rename = "Download Status", alias = "下载状态", default)]
    pub download_status: DownloadStatus,
    #[serde(rename = "Install Status", alias = "安装状态", default)]
    pub install_status: InstallStatus,
}

impl LedgerEntry {
    pub const HEADERS: [&'static str; 4] =
        ["App Name", "Download Link", "Download Status", "Install Status"];

    pub fn new(
        name: impl Into<String>,
        download_url: impl Into<String>,
        download_status: DownloadStatus,
        install_status: InstallStatus,
    ) -> Self {
        Self {
            name: name.into(),
            download_url: download_url.into(),
            download_status,
            install_status,
        }
    }

    /// Fields in column order, ready to be written as a CSV record
    pub fn to_record(&self) -> [String; 4] {
        [
            self.name.clone(),
            self.download_url.clone(),
            self.download_status.to_string(),
            self.install_status.to_string(),
        ]
    }
}
