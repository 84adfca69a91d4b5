use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use fs_err::tokio::{File, OpenOptions};
use fs4::fs_err3_tokio::AsyncFileExt as _;
use tokio::time::{Duration, Instant, sleep};
use tracing::trace;

const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Advisory lock held across a ledger load-modify-save cycle.
/// Guards against other processes working on the same ledger file.
pub(super) struct LedgerFileLock(File);

impl LedgerFileLock {
    pub(super) fn path_for(ledger: &Path) -> PathBuf {
        let mut name = ledger.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".lock");
        ledger.with_file_name(name)
    }

    pub(super) async fn acquire(ledger: &Path) -> Result<Self> {
        let lock_path = Self::path_for(ledger);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)
            .await?;
        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            match file.try_lock_exclusive()? {
                true => break,
                false if Instant::now() >= deadline => {
                    bail!("Timed out waiting for {}", lock_path.display())
                }
                false => sleep(Duration::from_millis(20)).await,
            }
        }
        trace!(path = %lock_path.display(), "Acquired ledger lock");
        Ok(Self(file))
    }
}

impl Drop for LedgerFileLock {
    fn drop(&mut self) {
        let _ = self.0.unlock();
    }
}
