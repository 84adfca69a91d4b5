//! Streams package files over HTTP into the working directory.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::{Context, Result, bail};
use fs_err::tokio as fs;
use futures::StreamExt as _;
use tokio::io::{AsyncWriteExt as _, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    console::{NoProgress, ProgressSink, Reporter},
    models::{DownloadStatus, Settings},
};

/// Body bytes are written to disk in pieces of at most this size
const WRITE_CHUNK: usize = 1024;

/// Result of one fetch: the finished file (on success) and the status to record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub path: Option<PathBuf>,
    pub status: DownloadStatus,
}

#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    reporter: Arc<dyn Reporter>,
    extension: String,
    show_progress: bool,
}

impl Downloader {
    pub fn new(settings: &Settings, reporter: Arc<dyn Reporter>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(settings.download_timeout())
            .read_timeout(settings.download_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            reporter,
            extension: settings.package_extension.clone(),
            show_progress: settings.show_progress,
        })
    }

    /// Where the package for `name` lives inside `dir`
    pub fn package_path(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        package_path(dir, name, &self.extension)
    }

    /// Downloads `url` into `dest_dir`. Never fails; errors become a failure status.
    #[instrument(skip(self, url, dest_dir, token), fields(url = %url))]
    pub async fn fetch(
        &self,
        name: &str,
        url: &str,
        dest_dir: &Path,
        token: &CancellationToken,
    ) -> FetchOutcome {
        let result = match self.package_path(dest_dir, name) {
            Ok(dst) => {
                let part = part_path(&dst);
                let result = token
                    .run_until_cancelled(self.download(name, url, &dst, &part))
                    .await
                    .unwrap_or_else(|| Err(anyhow::anyhow!("cancelled")));
                if result.is_err() {
                    // The in-flight future may have been dropped before its own cleanup ran
                    let _ = fs::remove_file(&part).await;
                }
                result
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(path) => {
                info!(path = %path.display(), "Download finished");
                FetchOutcome { path: Some(path), status: DownloadStatus::Success }
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Download failed");
                FetchOutcome { path: None, status: DownloadStatus::failed(format!("{e:#}")) }
            }
        }
    }

    async fn download(&self, name: &str, url: &str, dst: &Path, part: &Path) -> Result<PathBuf> {
        if url.trim().is_empty() {
            bail!("no download link");
        }

        let resp = self.client.get(url).send().await?.error_for_status()?;
        let total = resp.content_length().filter(|len| *len > 0);
        debug!(content_length = ?total, dst = %dst.display(), "Downloading file");

        let progress: Box<dyn ProgressSink> = if self.show_progress {
            self.reporter.progress(name, total)
        } else {
            Box::new(NoProgress)
        };

        match stream_to_file(resp, part, progress.as_ref()).await {
            Ok(written) => {
                progress.finish();
                fs::rename(part, dst)
                    .await
                    .with_context(|| format!("Failed to move download into {}", dst.display()))?;
                debug!(bytes = written, "Wrote package file");
                Ok(dst.to_path_buf())
            }
            Err(e) => {
                progress.abandon();
                let _ = fs::remove_file(part).await;
                Err(e)
            }
        }
    }
}

async fn stream_to_file(
    resp: reqwest::Response,
    part: &Path,
    progress: &dyn ProgressSink,
) -> Result<u64> {
    let file = fs::File::create(part)
        .await
        .with_context(|| format!("Failed to create {}", part.display()))?;
    let mut out = BufWriter::new(file);
    let mut written = 0u64;
    let mut stream = resp.bytes_stream();
    while let Some(item) = stream.next().await {
        let chunk = item?;
        for piece in chunk.chunks(WRITE_CHUNK) {
            out.write_all(piece).await?;
            written += piece.len() as u64;
            progress.advance(piece.len() as u64);
        }
    }
    out.flush().await?;
    Ok(written)
}

pub(crate) fn package_path(dir: &Path, name: &str, extension: &str) -> Result<PathBuf> {
    let stem = sanitize_filename::sanitize(name.trim());
    if stem.is_empty() {
        bail!("\"{name}\" has no usable file name");
    }
    Ok(dir.join(format!("{stem}.{extension}")))
}

/// Unique in-progress file next to `dst`, so concurrent fetches never share one
fn part_path(dst: &Path) -> PathBuf {
    static NEXT_ID: AtomicU64 = AtomicU64::new(0);
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let mut name = dst.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}-{id}.part", std::process::id()));
    dst.with_file_name(name)
}
