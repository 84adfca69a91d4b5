use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use super::{CommandOutput, DeviceBridge, DeviceId};

/// In-memory device bridge for exercising batches without a device
#[derive(Debug, Default)]
pub struct FakeBridge {
    listing: Option<String>,
    rejected: HashMap<String, String>,
    panics_on: Option<String>,
    delay: Duration,
    installs: Mutex<Vec<(DeviceId, PathBuf)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeBridge {
    /// Bridge whose device listing is `listing`
    pub fn with_listing(listing: &str) -> Self {
        Self { listing: Some(listing.to_string()), ..Self::default() }
    }

    /// Bridge that cannot be run at all
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Makes installing the file named `file_name` fail with `reason`
    pub fn reject(mut self, file_name: &str, reason: &str) -> Self {
        self.rejected.insert(file_name.to_string(), reason.to_string());
        self
    }

    /// Makes installing the file named `file_name` panic
    pub fn panic_on(mut self, file_name: &str) -> Self {
        self.panics_on = Some(file_name.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn installs(&self) -> Vec<(DeviceId, PathBuf)> {
        self.installs.lock().unwrap().clone()
    }

    pub fn installed_files(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .installs()
            .into_iter()
            .map(|(_, path)| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceBridge for FakeBridge {
    async fn list_devices(&self) -> Result<String> {
        self.listing.clone().ok_or_else(|| anyhow!("adb: command not found"))
    }

    async fn install(&self, device: &DeviceId, apk_path: &Path) -> Result<CommandOutput> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.installs.lock().unwrap().push((device.clone(), apk_path.to_path_buf()));

        let file_name = apk_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if self.panics_on.as_deref() == Some(file_name.as_str()) {
            panic!("simulated crash installing {file_name}");
        }
        Ok(match self.rejected.get(&file_name) {
            Some(reason) => CommandOutput {
                stdout: "Performing Streamed Install\n".to_string(),
                stderr: format!("adb: failed to install {}: Failure [{reason}]\n", apk_path.display()),
                exit_code: Some(1),
            },
            None => CommandOutput {
                stdout: "Performing Streamed Install\nSuccess\n".to_string(),
                stderr: String::new(),
                exit_code: Some(0),
            },
        })
    }
}
