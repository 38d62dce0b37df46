use anyhow::{bail, Context, Result};
use log::{info, warn};
use serialport::{SerialPortInfo, SerialPortType};
use crate::drivers::brainflow::{BrainFlowSource, BRAINFLOW_DEVICE_NAME};
use crate::drivers::simulated::{SimulatedSource, SIMULATED_DEVICE_NAME};
use crate::drivers::StreamReceiver;
/// Resolved acquisition endpoint: which backend, and which unit of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceId {
    pub name: String,
    pub serial: Option<String>,
}
/// Picks a device when the configuration leaves it open.
///
/// An explicit name (or a bare serial, which implies an OpenBCI dongle) wins.
/// Otherwise the first USB serial port is assumed to be an OpenBCI dongle,
/// and without one the simulated stream is used.
pub fn resolve_device(name: Option<&str>, serial: Option<&str>) -> DeviceId {
    match (name, serial) {
        (Some(name), serial) => DeviceId {
            name: name.to_string(),
            serial: serial.map(str::to_string),
        },
        (None, Some(serial)) => DeviceId {
            name: BRAINFLOW_DEVICE_NAME.to_string(),
            serial: Some(serial.to_string()),
        },
        (None, None) => {
            let ports = match serialport::available_ports() {
                Ok(ports) => ports,
                Err(e) => {
                    warn!("could not enumerate serial ports: {e}");
                    Vec::new()
                }
            };
            pick_from_ports(&ports)
        }
    }
}
fn pick_from_ports(ports: &[SerialPortInfo]) -> DeviceId {
    let dongle = ports
        .iter()
        .find(|p| matches!(p.port_type, SerialPortType::UsbPort(_)));
    match dongle {
        Some(port) => {
            info!("Found USB serial port {}, assuming OpenBCI dongle", port.port_name);
            DeviceId {
                name: BRAINFLOW_DEVICE_NAME.to_string(),
                serial: Some(port.port_name.clone()),
            }
        }
        None => {
            warn!("No amplifier found, falling back to the simulated stream");
            DeviceId {
                name: SIMULATED_DEVICE_NAME.to_string(),
                serial: None,
            }
        }
    }
}
/// Opens the stream behind `device`, sized for `window_sec` windows kept in a
/// `buffer_sec` rolling buffer.
pub fn connect(
    device: &DeviceId,
    window_sec: f64,
    buffer_sec: f64,
) -> Result<Box<dyn StreamReceiver>> {
    match device.name.as_str() {
        SIMULATED_DEVICE_NAME => {
            let seed = device
                .serial
                .as_deref()
                .map(|s| s.parse::<u64>())
                .transpose()
                .context("simulated device serial must be a numeric seed")?;
            Ok(Box::new(SimulatedSource::new(window_sec, buffer_sec, seed)?))
        }
        BRAINFLOW_DEVICE_NAME => {
            let Some(port) = device.serial.as_deref() else {
                bail!("device '{}' needs a serial port", device.name);
            };
            Ok(Box::new(BrainFlowSource::connect(port, window_sec, buffer_sec)?))
        }
        other => bail!("unknown device '{other}'"),
    }
}
