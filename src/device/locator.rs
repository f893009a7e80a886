//! Controller discovery.
//!
//! Candidates are tried in a fixed order and the first port that opens
//! wins:
//!
//! 1. the configured known port, if any;
//! 2. enumerated ports whose hardware id contains the vendor signature;
//! 3. the conventional platform port names.
//!
//! Nothing here retries or sleeps; the connection supervisor decides when
//! to look again.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialPortInfo, SerialPortType, StopBits,
};

use super::transport::{LineTransport, SerialLink};
use crate::config::LocatorConfig;
use crate::error::LocateError;

/// An enumerated serial port, as reported by `GET /device/ports`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct PortInfo {
    /// OS port name (`/dev/ttyACM0`, `COM3`, ...).
    pub name: String,
    /// Hardware id string, e.g. `USB VID:PID=2E8A:0005 SER=E6614103`.
    pub hardware_id: String,
    /// Whether the hardware id contains the configured vendor signature.
    pub matches_signature: bool,
}

/// Finds and opens the controller.
#[async_trait]
pub trait DeviceLocator: Send + Sync + fmt::Debug {
    /// Opens the first reachable controller port.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::DeviceNotFound`] when every candidate failed.
    async fn locate(&self) -> Result<Box<dyn LineTransport>, LocateError>;

    /// Lists the ports visible to this locator.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::Enumerate`] if the OS refuses enumeration.
    async fn list_ports(&self) -> Result<Vec<PortInfo>, LocateError> {
        Ok(Vec::new())
    }
}

/// Production locator backed by `tokio-serial`.
#[derive(Debug, Clone)]
pub struct SerialLocator {
    config: LocatorConfig,
}

impl SerialLocator {
    /// Creates a locator with the given discovery settings.
    #[must_use]
    pub const fn new(config: LocatorConfig) -> Self {
        Self { config }
    }

    async fn open(&self, port_name: &str) -> Result<Box<dyn LineTransport>, tokio_serial::Error> {
        let path = port_name.to_string();
        let baud_rate = self.config.baud_rate;
        let read_timeout = self.config.read_timeout;
        let stream = run_blocking(move || {
            tokio_serial::new(&path, baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(read_timeout)
                .open_native_async()
        })
        .await?;
        Ok(Box::new(SerialLink::new(stream, port_name, read_timeout)))
    }

    async fn enumerate(&self) -> Result<Vec<PortInfo>, LocateError> {
        let signature = self.config.vendor_signature.clone();
        run_blocking(move || {
            tokio_serial::available_ports().map(|ports| {
                ports
                    .iter()
                    .map(|info| describe_port(info, &signature))
                    .collect::<Vec<_>>()
            })
        })
        .await
        .map_err(|e| LocateError::Enumerate(e.to_string()))
    }
}

/// Runs a blocking serial call on the blocking pool. A task that panicked
/// or was cancelled counts as a failed call.
async fn run_blocking<T, F>(f: F) -> Result<T, tokio_serial::Error>
where
    F: FnOnce() -> Result<T, tokio_serial::Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|err| {
        tokio_serial::Error::new(
            tokio_serial::ErrorKind::Unknown,
            format!("serial task failed: {err}"),
        )
    })?
}

#[async_trait]
impl DeviceLocator for SerialLocator {
    async fn locate(&self) -> Result<Box<dyn LineTransport>, LocateError> {
        let enumerated = self.enumerate().await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "port enumeration failed; using fallback names only");
            Vec::new()
        });
        let plan = candidate_plan(&self.config, &enumerated);

        for port_name in &plan {
            match self.open(port_name).await {
                Ok(link) => {
                    tracing::info!(
                        port = %port_name,
                        baud = self.config.baud_rate,
                        "connected to controller"
                    );
                    return Ok(link);
                }
                Err(err) => {
                    tracing::debug!(port = %port_name, error = %err, "port did not open");
                }
            }
        }

        tracing::warn!(tried = plan.len(), "controller not found on any port");
        Err(LocateError::DeviceNotFound { tried: plan.len() })
    }

    async fn list_ports(&self) -> Result<Vec<PortInfo>, LocateError> {
        self.enumerate().await
    }
}

/// Orders the port names to try, without duplicates.
#[must_use]
pub fn candidate_plan(config: &LocatorConfig, enumerated: &[PortInfo]) -> Vec<String> {
    let signature_matches = enumerated
        .iter()
        .filter(|p| p.matches_signature)
        .map(|p| p.name.clone());

    let mut plan: Vec<String> = Vec::new();
    for name in config
        .known_port
        .iter()
        .cloned()
        .chain(signature_matches)
        .chain(config.candidate_ports.iter().cloned())
    {
        if !plan.contains(&name) {
            plan.push(name);
        }
    }
    plan
}

/// Case-insensitive substring match of the vendor signature.
#[must_use]
pub fn matches_signature(hardware_id: &str, signature: &str) -> bool {
    !signature.is_empty()
        && hardware_id
            .to_ascii_uppercase()
            .contains(&signature.to_ascii_uppercase())
}

/// Formats a USB hardware id the way serial tooling conventionally prints it.
#[must_use]
pub fn usb_hardware_id(vid: u16, pid: u16, serial_number: Option<&str>) -> String {
    match serial_number {
        Some(sn) => format!("USB VID:PID={vid:04X}:{pid:04X} SER={sn}"),
        None => format!("USB VID:PID={vid:04X}:{pid:04X}"),
    }
}

fn describe_port(info: &SerialPortInfo, signature: &str) -> PortInfo {
    let hardware_id = match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            usb_hardware_id(usb.vid, usb.pid, usb.serial_number.as_deref())
        }
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::BluetoothPort => "BLUETOOTH".to_string(),
        SerialPortType::Unknown => "n/a".to_string(),
    };
    PortInfo {
        name: info.port_name.clone(),
        matches_signature: matches_signature(&hardware_id, signature),
        hardware_id,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_calls_run_off_the_runtime_thread() {
        let runtime_thread = std::thread::current().id();
        let worker = run_blocking(|| Ok(std::thread::current().id())).await;
        let Ok(worker) = worker else {
            panic!("blocking call failed");
        };
        assert_ne!(worker, runtime_thread);
    }

    #[tokio::test]
    async fn panicked_blocking_call_is_a_failed_candidate() {
        let result: Result<(), _> = run_blocking(|| panic!("driver crashed")).await;
        let Err(err) = result else {
            panic!("expected failure");
        };
        assert_eq!(err.kind(), tokio_serial::ErrorKind::Unknown);
    }

    fn port(name: &str, hwid: &str) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            hardware_id: hwid.to_string(),
            matches_signature: matches_signature(hwid, "2E8A"),
        }
    }

    #[test]
    fn signature_match_ignores_case() {
        assert!(matches_signature("USB VID:PID=2e8a:0005", "2E8A"));
        assert!(matches_signature("USB VID:PID=2E8A:0005", "2e8a"));
        assert!(!matches_signature("USB VID:PID=0403:6001", "2E8A"));
        assert!(!matches_signature("anything", ""));
    }

    #[test]
    fn usb_hardware_id_format() {
        assert_eq!(
            usb_hardware_id(0x2e8a, 0x5, Some("E661")),
            "USB VID:PID=2E8A:0005 SER=E661"
        );
        assert_eq!(usb_hardware_id(0x0403, 0x6001, None), "USB VID:PID=0403:6001");
    }

    #[test]
    fn plan_prefers_signature_matches_over_fallbacks() {
        let cfg = LocatorConfig::default();
        let ports = vec![
            port("/dev/ttyUSB0", "USB VID:PID=0403:6001"),
            port("/dev/ttyACM3", "USB VID:PID=2E8A:0005 SER=1"),
        ];
        let plan = candidate_plan(&cfg, &ports);
        assert_eq!(
            plan,
            vec![
                "/dev/ttyACM3",
                "/dev/ttyACM0",
                "/dev/ttyACM1",
                "COM3",
                "COM4",
                "/dev/tty.Bluetooth-Incoming-Port",
            ]
        );
    }

    #[test]
    fn plan_puts_known_port_first_and_dedups() {
        let cfg = LocatorConfig {
            known_port: Some("/dev/ttyACM0".to_string()),
            ..LocatorConfig::default()
        };
        let ports = vec![port("/dev/ttyACM0", "USB VID:PID=2E8A:000A")];
        let plan = candidate_plan(&cfg, &ports);
        assert_eq!(plan.first().map(String::as_str), Some("/dev/ttyACM0"));
        assert_eq!(plan.iter().filter(|p| *p == "/dev/ttyACM0").count(), 1);
        assert_eq!(plan.len(), 5);
    }

    #[tokio::test]
    async fn missing_ports_yield_not_found() {
        let cfg = LocatorConfig {
            vendor_signature: "NO-SUCH-VENDOR".to_string(),
            candidate_ports: vec![
                "/nonexistent/conveyor-bridge-a".to_string(),
                "/nonexistent/conveyor-bridge-b".to_string(),
            ],
            ..LocatorConfig::default()
        };
        let locator = SerialLocator::new(cfg);
        let result = locator.locate().await;
        assert_eq!(
            result.err(),
            Some(LocateError::DeviceNotFound { tried: 2 })
        );
    }
}
