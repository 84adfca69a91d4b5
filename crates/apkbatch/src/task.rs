//! Batch workflows: fan ledger entries or local packages out to a bounded
//! worker pool, then report per-phase counts.

mod counters;

use std::{collections::HashMap, future::Future, path::PathBuf, sync::Arc};

use anyhow::{Result, bail};
use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

pub use counters::BatchReport;
use counters::PhaseCounter;

use crate::{
    adb::{DeviceBridge, DeviceId, install_package},
    console::Reporter,
    downloader::Downloader,
    ledger::Ledger,
    local_packages::{LocalPackage, find_packages},
    models::{DownloadStatus, InstallStatus, LOCAL_INSTALL_MARKER, LedgerEntry, Settings},
};

#[derive(Debug, Default)]
struct Tallies {
    download: PhaseCounter,
    install: PhaseCounter,
}

/// Runs the three batch workflows against one working directory
#[derive(Clone)]
pub struct BatchRunner {
    ledger: Arc<Ledger>,
    downloader: Downloader,
    bridge: Arc<dyn DeviceBridge>,
    reporter: Arc<dyn Reporter>,
    work_dir: PathBuf,
    extension: String,
    workers: usize,
}

impl BatchRunner {
    pub fn new(
        settings: &Settings,
        work_dir: PathBuf,
        ledger: Arc<Ledger>,
        downloader: Downloader,
        bridge: Arc<dyn DeviceBridge>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            ledger,
            downloader,
            bridge,
            reporter,
            work_dir,
            extension: settings.package_extension.clone(),
            workers: settings.effective_workers(),
        }
    }

    pub fn bridge(&self) -> &dyn DeviceBridge {
        self.bridge.as_ref()
    }

    pub fn work_dir(&self) -> &std::path::Path {
        &self.work_dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Downloads every pending ledger entry without installing anything
    #[instrument(skip_all, err)]
    pub async fn download_only(&self, token: &CancellationToken) -> Result<BatchReport> {
        let tallies = self.run_downloads(None, token).await?;
        let report = BatchReport { download: Some(tallies.download.tally()), install: None };
        self.summarize(&report);
        Ok(report)
    }

    /// Downloads every pending ledger entry and installs each successful download onto `device`
    #[instrument(skip_all, fields(device = %device), err)]
    pub async fn download_and_install(
        &self,
        device: &DeviceId,
        token: &CancellationToken,
    ) -> Result<BatchReport> {
        let tallies = self.run_downloads(Some(device.clone()), token).await?;
        let report = BatchReport {
            download: Some(tallies.download.tally()),
            install: Some(tallies.install.tally()),
        };
        self.summarize(&report);
        Ok(report)
    }

    async fn run_downloads(
        &self,
        device: Option<DeviceId>,
        token: &CancellationToken,
    ) -> Result<Arc<Tallies>> {
        let (entries, collisions) = self.split_colliding(self.pending_entries().await?);
        let tallies = Arc::new(Tallies::default());
        for (entry, first) in collisions {
            self.reject_collision(entry, &first, &tallies).await;
        }

        let job_tallies = tallies.clone();
        let job_token = token.clone();
        self.dispatch(entries, move |runner, entry| {
            let tallies = job_tallies.clone();
            let token = job_token.clone();
            let device = device.clone();
            async move { runner.process_entry(entry, device, &tallies, &token).await }
        })
        .await;
        Ok(tallies)
    }

    /// Installs the package files already in the working directory onto `device`
    #[instrument(skip_all, fields(device = %device), err)]
    pub async fn install_local(
        &self,
        device: &DeviceId,
        token: &CancellationToken,
    ) -> Result<BatchReport> {
        if self.ledger.initialize_if_absent().await? {
            self.reporter.info(&format!("Created empty ledger {}", self.ledger.path().display()));
        }
        let packages = find_packages(&self.work_dir, &self.extension).await?;
        if packages.is_empty() {
            bail!("No .{} files found in {}", self.extension, self.work_dir.display());
        }

        let mut known_urls: HashMap<String, String> = HashMap::new();
        for entry in self.ledger.load().await? {
            if !entry.download_url.is_empty() {
                known_urls.entry(entry.name).or_insert(entry.download_url);
            }
        }
        let known_urls = Arc::new(known_urls);

        info!(count = packages.len(), "Installing local packages");
        let tallies = Arc::new(Tallies::default());
        let job_tallies = tallies.clone();
        let job_token = token.clone();
        let device = device.clone();
        self.dispatch(packages, move |runner, package| {
            let tallies = job_tallies.clone();
            let token = job_token.clone();
            let device = device.clone();
            let known_urls = known_urls.clone();
            async move {
                let url = known_urls
                    .get(&package.name)
                    .map(String::as_str)
                    .unwrap_or(LOCAL_INSTALL_MARKER);
                runner.process_local(package, url, &device, &tallies, &token).await
            }
        })
        .await;

        let report = BatchReport { download: None, install: Some(tallies.install.tally()) };
        self.summarize(&report);
        Ok(report)
    }

    async fn pending_entries(&self) -> Result<Vec<LedgerEntry>> {
        if !self.ledger.exists() {
            bail!("Ledger file {} not found", self.ledger.path().display());
        }
        let entries = self.ledger.pending().await?;
        info!(count = entries.len(), "Loaded pending entries");
        Ok(entries)
    }

    /// Separates entries whose package file name is already taken by an earlier entry.
    /// Distinct names can sanitize to the same file; returns the name that claimed it first.
    fn split_colliding(
        &self,
        entries: Vec<LedgerEntry>,
    ) -> (Vec<LedgerEntry>, Vec<(LedgerEntry, String)>) {
        let mut claimed: HashMap<PathBuf, String> = HashMap::new();
        let mut accepted = Vec::with_capacity(entries.len());
        let mut collisions = Vec::new();
        for entry in entries {
            // Unusable names are left to fail in the fetch itself
            let Ok(path) = self.downloader.package_path(&self.work_dir, &entry.name) else {
                accepted.push(entry);
                continue;
            };
            match claimed.get(&path) {
                Some(first) => {
                    warn!(name = %entry.name, first = %first, path = %path.display(), "Package file name collision");
                    collisions.push((entry, first.clone()));
                }
                None => {
                    claimed.insert(path, entry.name.clone());
                    accepted.push(entry);
                }
            }
        }
        (accepted, collisions)
    }

    async fn reject_collision(&self, entry: LedgerEntry, first: &str, tallies: &Tallies) {
        tallies.download.begin();
        tallies.download.record(false);
        let status = DownloadStatus::failed(format!("package file name collides with {first}"));
        self.reporter.error(&format!("Download of {} failed: {status}", entry.name));
        self.record(&entry.name, &entry.download_url, status, InstallStatus::NotInstalled).await;
    }

    /// Runs `job` for every item, at most `workers` at a time, and waits for all of them.
    /// With a single worker the items run strictly one after another.
    async fn dispatch<T, F, Fut>(&self, items: Vec<T>, job: F)
    where
        T: Send + 'static,
        F: Fn(Self, T) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.workers <= 1 {
            for item in items {
                if let Err(e) = tokio::spawn(job(self.clone(), item)).await {
                    self.report_crash(&e);
                }
            }
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for item in items {
            let semaphore = semaphore.clone();
            let fut = job(self.clone(), item);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                fut.await;
            });
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                self.report_crash(&e);
            }
        }
    }

    fn report_crash(&self, e: &JoinError) {
        error!(error = e as &dyn std::error::Error, "Batch task panicked");
        self.reporter.error(&format!("A batch task crashed, its item counts as failed: {e}"));
    }

    async fn process_entry(
        self,
        entry: LedgerEntry,
        device: Option<DeviceId>,
        tallies: &Tallies,
        token: &CancellationToken,
    ) {
        let name = entry.name.as_str();
        tallies.download.begin();
        self.reporter.info(&format!("Downloading {name}..."));
        let fetched = self.downloader.fetch(name, &entry.download_url, &self.work_dir, token).await;
        tallies.download.record(fetched.status.is_success());
        match (&fetched.path, &fetched.status) {
            (Some(path), _) => {
                self.reporter.success(&format!("{name} downloaded to {}", path.display()))
            }
            (None, status) => self.reporter.error(&format!("Download of {name} failed: {status}")),
        }

        let install_status = match (&device, &fetched.path) {
            (Some(device), Some(path)) => {
                tallies.install.begin();
                let status = self.install(name, device, path, token).await;
                tallies.install.record(status.is_success());
                status
            }
            _ => InstallStatus::NotInstalled,
        };

        self.record(name, &entry.download_url, fetched.status, install_status).await;
    }

    async fn process_local(
        self,
        package: LocalPackage,
        url: &str,
        device: &DeviceId,
        tallies: &Tallies,
        token: &CancellationToken,
    ) {
        tallies.install.begin();
        let status = self.install(&package.name, device, &package.path, token).await;
        tallies.install.record(status.is_success());
        self.record(&package.name, url, DownloadStatus::AlreadyDownloaded, status).await;
    }

    async fn install(
        &self,
        name: &str,
        device: &DeviceId,
        path: &std::path::Path,
        token: &CancellationToken,
    ) -> InstallStatus {
        self.reporter.info(&format!("Installing {}...", path.display()));
        let status = install_package(self.bridge.as_ref(), device, path, token).await;
        match &status {
            InstallStatus::Success => self.reporter.success(&format!("{name} installed")),
            other => self.reporter.error(&format!("Install of {name} failed: {other}")),
        }
        status
    }

    async fn record(
        &self,
        name: &str,
        url: &str,
        download_status: DownloadStatus,
        install_status: InstallStatus,
    ) {
        let summary = format!("{download_status}, {install_status}");
        match self.ledger.upsert(name, url, download_status, install_status).await {
            Ok(()) => info!(name, status = %summary, "Recorded status"),
            Err(e) => {
                error!(name, error = e.as_ref() as &dyn std::error::Error, "Failed to record status");
                self.reporter.error(&format!("Could not record status of {name}: {e:#}"));
            }
        }
    }

    fn summarize(&self, report: &BatchReport) {
        for (phase, label, tally) in [
            ("download", "Downloads", report.download),
            ("install", "Installs", report.install),
        ] {
            if let Some(tally) = tally {
                info!(
                    phase,
                    success = tally.success,
                    failure = tally.failure,
                    total = tally.total(),
                    "Phase finished"
                );
                self.reporter.highlight(&format!("{label} finished: {tally}"));
            }
        }
    }
}
