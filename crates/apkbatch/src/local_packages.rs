//! Package files already sitting in the working directory.

use std::{
    error::Error,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fs_err::tokio as fs;
use humansize::{DECIMAL, format_size};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPackage {
    pub path: PathBuf,
    /// File name without the extension, used as the application name
    pub name: String,
    pub size: u64,
}

impl LocalPackage {
    pub fn file_name(&self) -> String {
        self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }

    pub fn display_size(&self) -> String {
        format_size(self.size, DECIMAL)
    }
}

/// Package files directly inside `dir`, sorted by file name
pub async fn find_packages(dir: &Path, extension: &str) -> Result<Vec<LocalPackage>> {
    let mut rd =
        fs::read_dir(dir).await.with_context(|| format!("Failed to list {}", dir.display()))?;
    let mut packages = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        let matches_ext = path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension));
        if !matches_ext {
            continue;
        }
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(error = &e as &dyn Error, path = %path.display(), "Failed to stat package file");
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        packages.push(LocalPackage { path, name, size: meta.len() });
    }
    packages.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(dir = %dir.display(), count = packages.len(), "Found local packages");
    Ok(packages)
}

/// Deletes each package file, returning per-file results in input order
pub async fn delete_packages(packages: &[LocalPackage]) -> Vec<(&LocalPackage, Result<()>)> {
    let mut results = Vec::with_capacity(packages.len());
    for package in packages {
        let result = fs::remove_file(&package.path).await.map_err(anyhow::Error::from);
        match &result {
            Ok(()) => info!(path = %package.path.display(), "Deleted package file"),
            Err(e) => {
                warn!(error = e.as_ref() as &dyn Error, path = %package.path.display(), "Failed to delete package file")
            }
        }
        results.push((package, result));
    }
    results
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn finds_only_package_files_sorted() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("zeta.apk"), b"zz").unwrap();
        std::fs::write(dir.path().join("Alpha.APK"), b"a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"n").unwrap();
        std::fs::write(dir.path().join("half.apk.part"), b"p").unwrap();
        std::fs::create_dir(dir.path().join("folder.apk")).unwrap();

        let packages = find_packages(dir.path(), "apk").await.unwrap();
        let names: Vec<_> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "zeta"]);
        assert_eq!(packages[1].size, 2);
        assert_eq!(packages[1].file_name(), "zeta.apk");
    }

    #[tokio::test]
    async fn empty_directory_has_no_packages() {
        let dir = tempdir().unwrap();
        assert!(find_packages(dir.path(), "apk").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_reports_each_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.apk"), b"a").unwrap();
        std::fs::write(dir.path().join("b.apk"), b"b").unwrap();
        let mut packages = find_packages(dir.path(), "apk").await.unwrap();
        packages.push(LocalPackage {
            path: dir.path().join("missing.apk"),
            name: "missing".into(),
            size: 0,
        });

        let results = delete_packages(&packages).await;
        let ok: Vec<_> = results.iter().map(|(p, r)| (p.name.as_str(), r.is_ok())).collect();
        assert_eq!(ok, [("a", true), ("b", true), ("missing", false)]);
        assert!(find_packages(dir.path(), "apk").await.unwrap().is_empty());
    }

    #[test]
    fn sizes_are_human_readable() {
        let package = LocalPackage { path: "x.apk".into(), name: "x".into(), size: 1_500_000 };
        assert_eq!(package.display_size(), "1.50 MB");
    }
}
