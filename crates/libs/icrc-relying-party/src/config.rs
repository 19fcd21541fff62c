use std::fs;
use std::path::Path;
use std::time::Duration;

use icrc_agent::polling::millis;
use icrc_rpc::parse_origin;
use serde::Deserialize;

use crate::error::RelyingPartyError;
use crate::window::{WindowOptions, DEFAULT_WINDOW_NAME};

/// Requests the user has to act on.
pub const INTERACTIVE_TIMEOUT: Duration = Duration::from_millis(120_000);
/// Requests the signer answers on its own.
pub const PASSIVE_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    #[serde(with = "millis")]
    pub timeout: Duration,
    #[serde(with = "millis")]
    pub polling_interval: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self { timeout: INTERACTIVE_TIMEOUT, polling_interval: icrc_rpc::retry::DEFAULT_POLLING_INTERVAL }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WatchdogOptions {
    #[serde(with = "millis")]
    pub interval: Duration,
    /// How long each liveness probe waits for `ready`.
    #[serde(with = "millis")]
    pub timeout: Duration,
}

impl Default for WatchdogOptions {
    fn default() -> Self {
        Self { interval: Duration::from_millis(1_000), timeout: PASSIVE_TIMEOUT }
    }
}

/// Per-operation deadlines used when a call does not pass its own.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RequestTimeouts {
    #[serde(with = "millis")]
    pub supported_standards: Duration,
    #[serde(with = "millis")]
    pub permissions: Duration,
    #[serde(with = "millis")]
    pub request_permissions: Duration,
    #[serde(with = "millis")]
    pub accounts: Duration,
    #[serde(with = "millis")]
    pub call: Duration,
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            supported_standards: PASSIVE_TIMEOUT,
            permissions: PASSIVE_TIMEOUT,
            request_permissions: INTERACTIVE_TIMEOUT,
            accounts: INTERACTIVE_TIMEOUT,
            call: INTERACTIVE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelyingPartyConfig {
    /// Signer page opened in the popup.
    pub url: String,
    #[serde(default = "default_window_name")]
    pub window_name: String,
    #[serde(default)]
    pub window: WindowOptions,
    #[serde(default)]
    pub connection: ConnectionOptions,
    #[serde(default)]
    pub watchdog: WatchdogOptions,
    #[serde(default)]
    pub timeouts: RequestTimeouts,
}

fn default_window_name() -> String {
    DEFAULT_WINDOW_NAME.to_string()
}

impl RelyingPartyConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            window_name: default_window_name(),
            window: WindowOptions::default(),
            connection: ConnectionOptions::default(),
            watchdog: WatchdogOptions::default(),
            timeouts: RequestTimeouts::default(),
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }

    /// Checks the options and returns the origin of the signer url.
    pub fn validate(&self) -> Result<String, RelyingPartyError> {
        let origin = parse_origin(&self.url).ok_or_else(|| {
            RelyingPartyError::invalid_options(format!(
                "url {} is not an absolute http(s) url",
                self.url
            ))
        })?;
        self.window.validate()?;
        if self.connection.timeout.is_zero() || self.connection.polling_interval.is_zero() {
            return Err(RelyingPartyError::invalid_options(
                "connection timeout and polling interval must be positive",
            ));
        }
        if self.watchdog.interval.is_zero() || self.watchdog.timeout.is_zero() {
            return Err(RelyingPartyError::invalid_options(
                "watchdog interval and timeout must be positive",
            ));
        }
        Ok(origin)
    }
}
