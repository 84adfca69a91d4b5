use derive_more::Display;
use tracing::{debug, info, instrument, warn};

use super::{DeviceBridge, DeviceId};

/// State token `adb devices` prints for an online, authorized device
const READY_STATE: &str = "device";

/// Why a single target device could not be chosen
#[derive(Debug, Display)]
pub enum LocateError {
    #[display("No device detected, check the connection and try again")]
    NoDevice,
    #[display(
        "{} devices detected ({}), connect exactly one device and try again",
        _0.len(),
        _0.iter().map(DeviceId::as_str).collect::<Vec<_>>().join(", ")
    )]
    MultipleDevices(Vec<DeviceId>),
    #[display("Failed to query devices: {_0:#}")]
    Bridge(anyhow::Error),
}

impl std::error::Error for LocateError {}

/// Serials of all ready devices in `adb devices` output.
///
/// Lines are `<serial>\t<state>`; only lines whose trailing token is the ready
/// state count, so `offline` and `unauthorized` devices are skipped.
pub fn parse_ready_devices(output: &str) -> Vec<DeviceId> {
    output
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                [serial, .., state] if *state == READY_STATE && !serial.starts_with('*') => {
                    Some(DeviceId::new(*serial))
                }
                _ => None,
            }
        })
        .collect()
}

/// Finds the single ready device to install onto
#[instrument(skip(bridge))]
pub async fn locate_device(bridge: &dyn DeviceBridge) -> Result<DeviceId, LocateError> {
    let output = bridge.list_devices().await.map_err(LocateError::Bridge)?;
    let mut devices = parse_ready_devices(&output);
    debug!(count = devices.len(), ?devices, "Parsed ready devices");

    match devices.len() {
        0 => {
            warn!("No ready device found");
            Err(LocateError::NoDevice)
        }
        1 => {
            let device = devices.remove(0);
            info!(serial = %device, "Located device");
            Ok(device)
        }
        _ => {
            warn!(?devices, "Multiple ready devices found, refusing to pick one");
            Err(LocateError::MultipleDevices(devices))
        }
    }
}
