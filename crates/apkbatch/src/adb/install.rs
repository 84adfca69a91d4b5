use std::{error::Error, path::Path};

use lazy_regex::regex_captures;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::{CommandOutput, DeviceBridge, DeviceId};
use crate::models::InstallStatus;

/// Installs one package file, one attempt. Never fails: errors become the returned status.
#[instrument(skip(bridge, token), fields(apk = %apk_path.display()))]
pub async fn install_package(
    bridge: &dyn DeviceBridge,
    device: &DeviceId,
    apk_path: &Path,
    token: &CancellationToken,
) -> InstallStatus {
    if token.is_cancelled() {
        return InstallStatus::failed("cancelled");
    }
    let status = match token.run_until_cancelled(bridge.install(device, apk_path)).await {
        None => InstallStatus::failed("cancelled"),
        Some(Err(e)) => {
            warn!(error = e.as_ref() as &dyn Error, "Install command could not run");
            InstallStatus::failed(format!("{e:#}"))
        }
        Some(Ok(output)) => interpret_install_output(&output),
    };
    match &status {
        InstallStatus::Success => info!("Package installed"),
        other => warn!(status = %other, "Package install failed"),
    }
    status
}

/// Maps the bridge's install output to a status.
///
/// Some adb versions exit 0 even when the package manager rejects the package,
/// so a `Failure [...]` marker wins over the exit code.
fn interpret_install_output(output: &CommandOutput) -> InstallStatus {
    let marker = [&output.stdout, &output.stderr].into_iter().find_map(|stream| {
        regex_captures!(r"Failure \[([^\]]*)\]", stream).map(|(_, reason)| reason.to_string())
    });
    if let Some(reason) = marker {
        return InstallStatus::failed(reason);
    }
    if output.success() {
        return InstallStatus::Success;
    }

    let stderr = output.stderr.trim();
    let stdout = output.stdout.trim();
    let detail = if !stderr.is_empty() {
        last_line(stderr)
    } else if !stdout.is_empty() {
        last_line(stdout)
    } else {
        match output.exit_code {
            Some(code) => format!("adb exited with code {code}"),
            None => "adb was terminated by a signal".to_string(),
        }
    };
    InstallStatus::failed(detail)
}

fn last_line(text: &str) -> String {
    text.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or(text).trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::{Result, bail};
    use async_trait::async_trait;

    use super::*;

    fn output(stdout: &str, stderr: &str, exit_code: Option<i32>) -> CommandOutput {
        CommandOutput { stdout: stdout.into(), stderr: stderr.into(), exit_code }
    }

    #[test]
    fn zero_exit_is_success() {
        let status = interpret_install_output(&output("Performing Streamed Install\nSuccess\n", "", Some(0)));
        assert_eq!(status, InstallStatus::Success);
    }

    #[test]
    fn failure_marker_overrides_zero_exit() {
        let status = interpret_install_output(&output(
            "Performing Streamed Install\nFailure [INSTALL_FAILED_VERSION_DOWNGRADE]\n",
            "",
            Some(0),
        ));
        assert_eq!(status, InstallStatus::failed("INSTALL_FAILED_VERSION_DOWNGRADE"));
    }

    #[test]
    fn empty_failure_marker_gets_a_reason() {
        let status = interpret_install_output(&output("Failure []\n", "", Some(1)));
        assert_eq!(status, InstallStatus::failed("unknown error"));
        assert_eq!(status.to_string().parse::<InstallStatus>().unwrap(), status);
    }

    #[test]
    fn nonzero_exit_uses_last_stderr_line() {
        let status = interpret_install_output(&output(
            "",
            "Performing Streamed Install\nadb: failed to install app.apk: timeout\n",
            Some(1),
        ));
        assert_eq!(status, InstallStatus::failed("adb: failed to install app.apk: timeout"));
    }

    #[test]
    fn silent_nonzero_exit_reports_code() {
        let status = interpret_install_output(&output("", "", Some(255)));
        assert_eq!(status, InstallStatus::failed("adb exited with code 255"));
    }

    struct RecordingBridge {
        calls: Mutex<Vec<(String, String)>>,
        fail_to_spawn: bool,
    }

    #[async_trait]
    impl DeviceBridge for RecordingBridge {
        async fn list_devices(&self) -> Result<String> {
            Ok(String::new())
        }

        async fn install(&self, device: &DeviceId, apk_path: &Path) -> Result<CommandOutput> {
            if self.fail_to_spawn {
                bail!("No such file or directory (os error 2)");
            }
            self.calls
                .lock()
                .unwrap()
                .push((device.to_string(), apk_path.display().to_string()));
            Ok(output("Success\n", "", Some(0)))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn installs_on_the_given_device() {
        let bridge = RecordingBridge { calls: Mutex::new(Vec::new()), fail_to_spawn: false };
        let status = install_package(
            &bridge,
            &DeviceId::new("R58M123"),
            Path::new("/work/app.apk"),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(status, InstallStatus::Success);
        assert_eq!(
            bridge.calls.lock().unwrap().as_slice(),
            &[("R58M123".to_string(), "/work/app.apk".to_string())]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn spawn_error_becomes_failure_status() {
        let bridge = RecordingBridge { calls: Mutex::new(Vec::new()), fail_to_spawn: true };
        let status = install_package(
            &bridge,
            &DeviceId::new("R58M123"),
            Path::new("/work/app.apk"),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(status, InstallStatus::Failed(reason) if reason.contains("os error 2")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_token_skips_install() {
        let bridge = RecordingBridge { calls: Mutex::new(Vec::new()), fail_to_spawn: false };
        let token = CancellationToken::new();
        token.cancel();
        let status =
            install_package(&bridge, &DeviceId::new("R58M123"), Path::new("/work/app.apk"), &token)
                .await;
        assert_eq!(status, InstallStatus::failed("cancelled"));
        assert!(bridge.calls.lock().unwrap().is_empty());
    }
}
