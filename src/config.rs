//! Bridge configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Anything unset or unparsable falls
//! back to the default used by the conveyor firmware.

use std::net::SocketAddr;
use std::time::Duration;

/// Raspberry Pi Pico USB vendor id, as it appears in a hardware id string.
pub const DEFAULT_VENDOR_SIGNATURE: &str = "2E8A";

/// Baud rate the conveyor firmware listens on.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Per-read bound on the serial handle.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a conversation waits for a terminal status.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep between "bytes available" checks while awaiting a response.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Conventional port names tried, in order, when no port matches the vendor
/// signature. The Bluetooth pseudo-port never hosts the controller but is
/// tried last for parity with older setups.
pub const DEFAULT_CANDIDATE_PORTS: [&str; 5] = [
    "/dev/ttyACM0",
    "/dev/ttyACM1",
    "COM3",
    "COM4",
    "/dev/tty.Bluetooth-Incoming-Port",
];

/// How a `<verb>_<n>` progress token maps to the reported `position`.
///
/// Firmware revisions disagree on whether step numbers start at 0 or 1,
/// so this is an explicit deployment choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PositionConvention {
    /// Report `n` unchanged.
    #[default]
    Raw,
    /// Report `n - 1`.
    ZeroBased,
}

impl PositionConvention {
    /// Applies the convention to a parsed step number.
    #[must_use]
    pub const fn apply(self, n: i64) -> i64 {
        match self {
            Self::Raw => n,
            Self::ZeroBased => n.saturating_sub(1),
        }
    }
}

/// Timing and reporting knobs for one command/response conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTiming {
    /// Deadline for a terminal status, measured from the command write.
    pub response_timeout: Duration,
    /// Sleep between availability checks.
    pub poll_interval: Duration,
    /// Position reporting convention.
    pub position_convention: PositionConvention,
}

impl Default for RelayTiming {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            position_convention: PositionConvention::Raw,
        }
    }
}

/// Settings for discovering and opening the controller's serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorConfig {
    /// Port tried before any scanning, if configured.
    pub known_port: Option<String>,
    /// Case-insensitive substring looked for in each port's hardware id.
    pub vendor_signature: String,
    /// Fallback port names, tried in order.
    pub candidate_ports: Vec<String>,
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Per-read timeout on the opened handle.
    pub read_timeout: Duration,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            known_port: None,
            vendor_signature: DEFAULT_VENDOR_SIGNATURE.to_string(),
            candidate_ports: DEFAULT_CANDIDATE_PORTS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Top-level bridge configuration.
///
/// Loaded once at startup via [`BridgeConfig::from_env`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8000`).
    pub listen_addr: SocketAddr,

    /// Device discovery settings.
    pub locator: LocatorConfig,

    /// Conversation timing.
    pub timing: RelayTiming,
}

impl BridgeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
            .parse()?;

        let defaults = LocatorConfig::default();
        let known_port = std::env::var("DEVICE_PORT")
            .ok()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        let vendor_signature =
            std::env::var("DEVICE_VENDOR_SIGNATURE").unwrap_or(defaults.vendor_signature);
        let candidate_ports = std::env::var("DEVICE_CANDIDATE_PORTS")
            .ok()
            .map(|list| parse_port_list(&list))
            .unwrap_or(defaults.candidate_ports);

        let locator = LocatorConfig {
            known_port,
            vendor_signature,
            candidate_ports,
            baud_rate: parse_env("SERIAL_BAUD_RATE", DEFAULT_BAUD_RATE),
            read_timeout: parse_env_millis("SERIAL_READ_TIMEOUT_MS", DEFAULT_READ_TIMEOUT),
        };

        let position_convention = if parse_env_bool("POSITION_ZERO_BASED", false) {
            PositionConvention::ZeroBased
        } else {
            PositionConvention::Raw
        };
        let timing = RelayTiming {
            response_timeout: parse_env_millis("RESPONSE_TIMEOUT_MS", DEFAULT_RESPONSE_TIMEOUT),
            poll_interval: parse_env_millis("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL),
            position_convention,
        };

        Ok(Self {
            listen_addr,
            locator,
            timing,
        })
    }
}

/// Splits a comma-separated port list, dropping blank entries.
fn parse_port_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable holding milliseconds. Zero is rejected
/// in favour of `default`.
fn parse_env_millis(key: &str, default: Duration) -> Duration {
    match parse_env::<u64>(key, 0) {
        0 => default,
        ms => Duration::from_millis(ms),
    }
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("TRUE") | Some("1") => true,
        Some("false") | Some("FALSE") | Some("0") => false,
        _ => default,
    }
}
