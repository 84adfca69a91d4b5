//! Access to the device bridge (`adb`) as an external process.

mod devices;
#[cfg(test)]
mod fake;
mod install;

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use derive_more::Display;
use tokio::{process::Command, time::timeout};
use tracing::{debug, instrument, trace};

pub use devices::{LocateError, locate_device};
#[cfg(test)]
pub use fake::FakeBridge;
pub use install::install_package;

const LIST_DEVICES_TIMEOUT: Duration = Duration::from_secs(10);

/// Serial of the device a batch installs onto. Only valid for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Captured result of one bridge invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Operations the batch needs from the device bridge
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// Raw output of the device listing command
    async fn list_devices(&self) -> Result<String>;

    /// Installs a local package file onto the given device.
    /// A non-zero exit is returned as output, not as an error.
    async fn install(&self, device: &DeviceId, apk_path: &Path) -> Result<CommandOutput>;
}

/// [`DeviceBridge`] backed by the `adb` binary
#[derive(Debug, Clone)]
pub struct AdbBridge {
    adb_path: PathBuf,
    install_timeout: Duration,
}

impl AdbBridge {
    pub fn new(adb_path: PathBuf, install_timeout: Duration) -> Self {
        Self { adb_path, install_timeout }
    }

    /// Runs adb with the given arguments, killing it if it outlives `limit`
    #[instrument(level = "debug", skip(self), fields(adb = %self.adb_path.display()), err)]
    async fn run(&self, args: &[&str], limit: Duration) -> Result<CommandOutput> {
        let mut command = Command::new(&self.adb_path);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(target_os = "windows")]
        // CREATE_NO_WINDOW
        command.creation_flags(0x08000000);

        let output = match timeout(limit, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(e).with_context(|| {
                    format!("Failed to run {} {}", self.adb_path.display(), args.join(" "))
                });
            }
            Err(_) => bail!("adb {} timed out after {}s", args.join(" "), limit.as_secs()),
        };

        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };
        trace!(?output, "adb finished");
        Ok(output)
    }
}

#[async_trait]
impl DeviceBridge for AdbBridge {
    async fn list_devices(&self) -> Result<String> {
        let output = self.run(&["devices"], LIST_DEVICES_TIMEOUT).await?;
        if !output.success() {
            let message = output.stderr.trim();
            return Err(anyhow!(
                "adb devices exited with {:?}: {}",
                output.exit_code,
                if message.is_empty() { output.stdout.trim() } else { message }
            ));
        }
        debug!(lines = output.stdout.lines().count(), "Listed devices");
        Ok(output.stdout)
    }

    async fn install(&self, device: &DeviceId, apk_path: &Path) -> Result<CommandOutput> {
        let apk = apk_path.to_string_lossy();
        self.run(&["-s", device.as_str(), "install", &apk], self.install_timeout).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use tempfile::{TempDir, tempdir};

    use super::{devices::parse_ready_devices, *};

    /// Writes an executable shell script standing in for adb
    fn fake_adb(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("adb");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_devices_returns_stdout() {
        let dir = tempdir().unwrap();
        let adb = fake_adb(
            &dir,
            r#"[ "$1" = "devices" ] || exit 3
printf 'List of devices attached\nemulator-5554\tdevice\n\n'"#,
        );
        let bridge = AdbBridge::new(adb, Duration::from_secs(5));

        let output = bridge.list_devices().await.unwrap();
        assert_eq!(parse_ready_devices(&output), vec![DeviceId::new("emulator-5554")]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_devices_fails_on_nonzero_exit() {
        let dir = tempdir().unwrap();
        let adb = fake_adb(&dir, "echo 'cannot connect to daemon' >&2\nexit 1");
        let bridge = AdbBridge::new(adb, Duration::from_secs(5));

        let err = bridge.list_devices().await.unwrap_err();
        assert!(format!("{err:#}").contains("cannot connect to daemon"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn install_passes_serial_and_path() {
        let dir = tempdir().unwrap();
        let adb = fake_adb(&dir, r#"echo "$@""#);
        let bridge = AdbBridge::new(adb, Duration::from_secs(5));

        let output =
            bridge.install(&DeviceId::new("R58M123"), Path::new("/tmp/app.apk")).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "-s R58M123 install /tmp/app.apk");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn install_reports_nonzero_exit_as_output() {
        let dir = tempdir().unwrap();
        let adb = fake_adb(&dir, "echo 'adb: failed to install' >&2\nexit 1");
        let bridge = AdbBridge::new(adb, Duration::from_secs(5));

        let output =
            bridge.install(&DeviceId::new("R58M123"), Path::new("/tmp/app.apk")).await.unwrap();
        assert_eq!(output.exit_code, Some(1));
        assert!(output.stderr.contains("failed to install"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn hung_install_times_out() {
        let dir = tempdir().unwrap();
        let adb = fake_adb(&dir, "sleep 10");
        let bridge = AdbBridge::new(adb, Duration::from_millis(200));

        let err = bridge
            .install(&DeviceId::new("R58M123"), Path::new("/tmp/app.apk"))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("timed out"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_binary_is_an_error() {
        let bridge = AdbBridge::new(PathBuf::from("/nonexistent/adb"), Duration::from_secs(1));
        assert!(bridge.list_devices().await.is_err());
    }
}
