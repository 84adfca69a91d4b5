use std::{convert::Infallible, str::FromStr};

use derive_more::Display;
use serde::{Deserialize, Deserializer};

/// Outcome of the download phase for one ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Default, Display)]
pub enum DownloadStatus {
    #[default]
    #[display("not-attempted")]
    NotAttempted,
    #[display("success")]
    Success,
    /// The package was already on disk (local install workflow)
    #[display("already-downloaded")]
    AlreadyDownloaded,
    #[display("failure: {_0}")]
    Failed(String),
}

/// Outcome of the install phase for one ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Default, Display)]
pub enum InstallStatus {
    #[default]
    #[display("not-installed")]
    NotInstalled,
    #[display("success")]
    Success,
    #[display("failure: {_0}")]
    Failed(String),
}

impl DownloadStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::AlreadyDownloaded)
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(non_empty_reason(reason.into()))
    }
}

impl InstallStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(non_empty_reason(reason.into()))
    }
}

/// Reason recorded when a failure carries no text of its own
const UNKNOWN_REASON: &str = "unknown error";

fn non_empty_reason(reason: String) -> String {
    if reason.trim().is_empty() { UNKNOWN_REASON.to_string() } else { reason }
}

/// Extracts the reason from `failure: <reason>` and the legacy `…失败: <reason>` forms.
fn failure_reason(raw: &str) -> Option<String> {
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("failure") || lower.starts_with("failed") || raw.contains("失败") {
        let reason = match raw.split_once(':').or_else(|| raw.split_once('：')) {
            Some((_, reason)) => non_empty_reason(reason.trim().to_string()),
            None => raw.trim().to_string(),
        };
        return Some(reason);
    }
    None
}

fn looks_successful(raw: &str) -> bool {
    raw.to_ascii_lowercase().contains("success") || raw.contains("成功")
}

impl FromStr for DownloadStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("not-attempted") {
            return Ok(Self::NotAttempted);
        }
        if let Some(reason) = failure_reason(raw) {
            return Ok(Self::Failed(reason));
        }
        if raw.eq_ignore_ascii_case("already-downloaded") || raw == "已下载" {
            return Ok(Self::AlreadyDownloaded);
        }
        if looks_successful(raw) {
            return Ok(Self::Success);
        }
        Ok(Self::Failed(raw.to_string()))
    }
}

impl FromStr for InstallStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("not-installed") || raw == "未安装" {
            return Ok(Self::NotInstalled);
        }
        if let Some(reason) = failure_reason(raw) {
            return Ok(Self::Failed(reason));
        }
        if looks_successful(raw) {
            return Ok(Self::Success);
        }
        Ok(Self::Failed(raw.to_string()))
    }
}

impl<'de> Deserialize<'de> for DownloadStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

impl<'de> Deserialize<'de> for InstallStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}
