use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use tracing::{debug, instrument};

/// Resolves a binary either from an explicitly configured path or from `PATH`
#[instrument(level = "debug", ret, err)]
pub fn resolve_binary_path(configured: Option<&str>, name: &str) -> Result<PathBuf> {
    if let Some(configured) = configured.map(str::trim).filter(|p| !p.is_empty()) {
        let path = Path::new(configured);
        ensure!(path.is_file(), "Configured {name} path {} is not a file", path.display());
        debug!(path = %path.display(), "Using configured binary");
        return Ok(path.to_path_buf());
    }
    which::which(name).with_context(|| format!("Could not find `{name}` on PATH"))
}
