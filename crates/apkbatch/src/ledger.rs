//! CSV-backed record of per-application download and install outcomes.

mod lock;

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fs_err::tokio as fs;
use futures::TryStreamExt as _;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use self::lock::LedgerFileLock;
use crate::models::{DownloadStatus, InstallStatus, LedgerEntry};

/// The ledger file plus the discipline for updating it.
///
/// Every update is a whole-file load-modify-save. `guard` serializes those
/// cycles within this process and [`LedgerFileLock`] across processes.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    guard: Mutex<()>,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), guard: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Creates an empty ledger with just the header row. Returns `true` if a file was created.
    #[instrument(skip(self), fields(path = %self.path.display()), err)]
    pub async fn initialize_if_absent(&self) -> Result<bool> {
        let _guard = self.guard.lock().await;
        if self.exists() {
            return Ok(false);
        }
        let _lock = LedgerFileLock::acquire(&self.path).await?;
        if self.exists() {
            return Ok(false);
        }
        write_entries(&self.path, &[]).await?;
        info!("Created empty ledger");
        Ok(true)
    }

    /// Reads every row of the ledger
    #[instrument(skip(self), fields(path = %self.path.display(), count = tracing::field::Empty), err)]
    pub async fn load(&self) -> Result<Vec<LedgerEntry>> {
        let entries = read_entries(&self.path).await?;
        tracing::Span::current().record("count", entries.len());
        Ok(entries)
    }

    /// Rows to process in a batch: one per name, first occurrence wins
    pub async fn pending(&self) -> Result<Vec<LedgerEntry>> {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for entry in self.load().await? {
            if seen.insert(entry.name.clone()) {
                pending.push(entry);
            } else {
                warn!(name = %entry.name, "Duplicate ledger row ignored");
            }
        }
        Ok(pending)
    }

    /// Updates the statuses of the row named `name`, or appends a new row
    #[instrument(skip(self), fields(path = %self.path.display()), err)]
    pub async fn upsert(
        &self,
        name: &str,
        url: &str,
        download_status: DownloadStatus,
        install_status: InstallStatus,
    ) -> Result<()> {
        let _guard = self.guard.lock().await;
        let _lock = LedgerFileLock::acquire(&self.path).await?;

        let mut entries = if self.exists() { read_entries(&self.path).await? } else { Vec::new() };
        let inserted = apply_upsert(
            &mut entries,
            LedgerEntry::new(name, url, download_status, install_status),
        );
        write_entries(&self.path, &entries).await?;
        debug!(inserted, rows = entries.len(), "Ledger updated");
        Ok(())
    }
}

/// Applies one update to the in-memory rows. Returns `true` if a row was appended.
fn apply_upsert(entries: &mut Vec<LedgerEntry>, update: LedgerEntry) -> bool {
    match entries.iter_mut().find(|e| e.name == update.name) {
        Some(existing) => {
            existing.download_status = update.download_status;
            existing.install_status = update.install_status;
            false
        }
        None => {
            entries.push(update);
            true
        }
    }
}

async fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>> {
    let file = fs::File::open(path).await.context("Could not open ledger file")?;
    let mut reader = csv_async::AsyncReaderBuilder::new().flexible(true).create_deserializer(file);
    let records = reader.deserialize::<LedgerEntry>();
    let entries: Vec<LedgerEntry> = records
        .try_collect()
        .await
        .with_context(|| format!("Failed to parse ledger {}", path.display()))?;

    Ok(entries
        .into_iter()
        .filter_map(|mut entry| {
            entry.name = entry.name.trim().to_string();
            entry.download_url = entry.download_url.trim().to_string();
            if entry.name.is_empty() {
                warn!(url = %entry.download_url, "Skipping ledger row without a name");
                None
            } else {
                Some(entry)
            }
        })
        .collect())
}

/// Writes all rows to a temporary file and swaps it into place
async fn write_entries(path: &Path, entries: &[LedgerEntry]) -> Result<()> {
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let file = fs::File::create(&tmp).await?;
    let mut writer = csv_async::AsyncWriterBuilder::new().create_writer(file);
    writer.write_record(&LedgerEntry::HEADERS).await.context("Failed to write ledger header")?;
    for entry in entries {
        writer
            .write_record(&entry.to_record())
            .await
            .with_context(|| format!("Failed to write ledger row for {}", entry.name))?;
    }
    writer.flush().await.context("Failed to flush ledger")?;
    drop(writer);

    fs::rename(&tmp, path).await.with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
