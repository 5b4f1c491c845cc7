/// Configuration for the tracking device
///
/// Network identity has no sensible default and must be supplied. Pins and
/// timings default to the reference board wiring.
use core::fmt;
use core::str::FromStr;

use crate::gps::DEFAULT_GPS_INTERVAL_MS;
use crate::rfid::{DEFAULT_RFID_INTERVAL_MS, MAX_RFID_CODES};
use crate::sensors::Pin;

pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_RFID_CODES: [&str; 3] = ["XX01X", "YY02Y", "ZZ03Z"];

/// WiFi credentials, endpoints and device identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_password: String,
    /// POST target for GPS records
    pub tracking_endpoint: String,
    /// POST target for RFID scans
    pub rfid_endpoint: String,
    /// Sent as `device_id` in every GPS record
    pub device_id: String,
}

/// GPIO assignments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    pub gps_rx: Pin,
    pub gps_tx: Pin,
    pub rfid: Pin,
    pub led: Pin,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            gps_rx: 16,
            gps_tx: 17,
            rfid: 5,
            led: 2,
        }
    }
}

/// Polling intervals and WiFi connect budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Gate for the whole device update tick
    pub update_interval_ms: u64,
    /// Minimum spacing between accepted GPS fixes
    pub gps_interval_ms: u64,
    /// Spacing between simulated RFID scans
    pub rfid_interval_ms: u64,
    pub wifi_connect_attempts: u32,
    pub wifi_retry_delay_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            gps_interval_ms: DEFAULT_GPS_INTERVAL_MS,
            rfid_interval_ms: DEFAULT_RFID_INTERVAL_MS,
            wifi_connect_attempts: 20,
            wifi_retry_delay_ms: 500,
        }
    }
}

/// Master device configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub network: NetworkConfig,
    pub pins: PinConfig,
    pub timing: TimingConfig,
    /// Codes registered with the RFID simulation at initialization
    pub rfid_codes: Vec<String>,
}

impl TrackerConfig {
    /// Configuration with default pins, timings and seed codes
    pub fn new(network: NetworkConfig) -> Self {
        Self {
            network,
            pins: PinConfig::default(),
            timing: TimingConfig::default(),
            rfid_codes: DEFAULT_RFID_CODES.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Build from a key lookup, then validate
    ///
    /// Required: `WIFI_SSID`, `WIFI_PASSWORD`, `TRACKING_URL`, `RFID_URL`,
    /// `DEVICE_ID`. Optional: `UPDATE_INTERVAL_MS`, `GPS_INTERVAL_MS`,
    /// `RFID_INTERVAL_MS`, `GPS_RX_PIN`, `GPS_TX_PIN`, `RFID_PIN`, `LED_PIN`,
    /// and `RFID_CODES` as a comma separated list.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let mut config = Self::new(NetworkConfig {
            wifi_ssid: required("WIFI_SSID")?,
            wifi_password: required("WIFI_PASSWORD")?,
            tracking_endpoint: required("TRACKING_URL")?,
            rfid_endpoint: required("RFID_URL")?,
            device_id: required("DEVICE_ID")?,
        });

        override_with(&lookup, "UPDATE_INTERVAL_MS", &mut config.timing.update_interval_ms)?;
        override_with(&lookup, "GPS_INTERVAL_MS", &mut config.timing.gps_interval_ms)?;
        override_with(&lookup, "RFID_INTERVAL_MS", &mut config.timing.rfid_interval_ms)?;
        override_with(&lookup, "GPS_RX_PIN", &mut config.pins.gps_rx)?;
        override_with(&lookup, "GPS_TX_PIN", &mut config.pins.gps_tx)?;
        override_with(&lookup, "RFID_PIN", &mut config.pins.rfid)?;
        override_with(&lookup, "LED_PIN", &mut config.pins.led)?;

        if let Some(codes) = lookup("RFID_CODES") {
            config.rfid_codes = codes
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from compile-time environment variables
    ///
    /// ```bash
    /// export WIFI_SSID="Wokwi-GUEST"
    /// export WIFI_PASSWORD=""
    /// export TRACKING_URL="https://example.com/api/v1/tracking"
    /// export RFID_URL="https://example.com/api/v1/rfid"
    /// export DEVICE_ID="tracker-001"
    /// cargo build --release
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| {
            let value = match key {
                "WIFI_SSID" => option_env!("WIFI_SSID"),
                "WIFI_PASSWORD" => option_env!("WIFI_PASSWORD"),
                "TRACKING_URL" => option_env!("TRACKING_URL"),
                "RFID_URL" => option_env!("RFID_URL"),
                "DEVICE_ID" => option_env!("DEVICE_ID"),
                "UPDATE_INTERVAL_MS" => option_env!("UPDATE_INTERVAL_MS"),
                "GPS_INTERVAL_MS" => option_env!("GPS_INTERVAL_MS"),
                "RFID_INTERVAL_MS" => option_env!("RFID_INTERVAL_MS"),
                "GPS_RX_PIN" => option_env!("GPS_RX_PIN"),
                "GPS_TX_PIN" => option_env!("GPS_TX_PIN"),
                "RFID_PIN" => option_env!("RFID_PIN"),
                "LED_PIN" => option_env!("LED_PIN"),
                "RFID_CODES" => option_env!("RFID_CODES"),
                _ => None,
            };
            value.map(str::to_string)
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let net = &self.network;
        if net.wifi_ssid.is_empty() {
            return Err(ConfigError::InvalidValue("WIFI_SSID"));
        }
        if net.device_id.is_empty() {
            return Err(ConfigError::InvalidValue("DEVICE_ID"));
        }
        if !is_http_url(&net.tracking_endpoint) {
            return Err(ConfigError::InvalidValue("TRACKING_URL"));
        }
        if !is_http_url(&net.rfid_endpoint) {
            return Err(ConfigError::InvalidValue("RFID_URL"));
        }

        let timing = &self.timing;
        if timing.update_interval_ms == 0 {
            return Err(ConfigError::InvalidValue("UPDATE_INTERVAL_MS"));
        }
        if timing.rfid_interval_ms == 0 {
            return Err(ConfigError::InvalidValue("RFID_INTERVAL_MS"));
        }
        if timing.wifi_connect_attempts == 0 {
            return Err(ConfigError::InvalidValue("wifi_connect_attempts"));
        }
        if self.rfid_codes.len() > MAX_RFID_CODES {
            return Err(ConfigError::InvalidValue("RFID_CODES"));
        }
        Ok(())
    }
}

fn override_with<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key))?;
    }
    Ok(())
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    matches!(rest, Some(host) if !host.is_empty())
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required key not provided
    Missing(&'static str),
    /// Key present but unusable
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing required setting {}", key),
            ConfigError::InvalidValue(key) => write!(f, "invalid value for {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(extra: &[(&str, &str)]) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = [
            ("WIFI_SSID", "Wokwi-GUEST"),
            ("WIFI_PASSWORD", ""),
            ("TRACKING_URL", "https://example.com/api/v1/tracking"),
            ("RFID_URL", "http://example.com/api/v1/rfid"),
            ("DEVICE_ID", "tracker-001"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            map.insert(k.to_string(), v.to_string());
        }
        map
    }

    fn load(map: &HashMap<String, String>) -> Result<TrackerConfig, ConfigError> {
        TrackerConfig::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&vars(&[])).unwrap();
        assert_eq!(config.network.device_id, "tracker-001");
        assert_eq!(config.pins, PinConfig::default());
        assert_eq!(config.timing.update_interval_ms, 1000);
        assert_eq!(config.timing.gps_interval_ms, 10_000);
        assert_eq!(config.timing.rfid_interval_ms, 5000);
        assert_eq!(config.timing.wifi_connect_attempts, 20);
        assert_eq!(config.timing.wifi_retry_delay_ms, 500);
        assert_eq!(config.rfid_codes, vec!["XX01X", "YY02Y", "ZZ03Z"]);
    }

    #[test]
    fn test_missing_required_key() {
        let mut map = vars(&[]);
        map.remove("RFID_URL");
        assert_eq!(load(&map), Err(ConfigError::Missing("RFID_URL")));
    }

    #[test]
    fn test_overrides() {
        let map = vars(&[
            ("UPDATE_INTERVAL_MS", "250"),
            ("LED_PIN", " 8 "),
            ("RFID_CODES", "AA01A, BB02B,,"),
        ]);
        let config = load(&map).unwrap();
        assert_eq!(config.timing.update_interval_ms, 250);
        assert_eq!(config.pins.led, 8);
        assert_eq!(config.rfid_codes, vec!["AA01A", "BB02B"]);
    }

    #[test]
    fn test_rejects_bad_values() {
        let map = vars(&[("LED_PIN", "led")]);
        assert_eq!(load(&map), Err(ConfigError::InvalidValue("LED_PIN")));

        let map = vars(&[("TRACKING_URL", "ftp://example.com")]);
        assert_eq!(load(&map), Err(ConfigError::InvalidValue("TRACKING_URL")));

        let map = vars(&[("RFID_URL", "https://")]);
        assert_eq!(load(&map), Err(ConfigError::InvalidValue("RFID_URL")));

        let map = vars(&[("DEVICE_ID", "")]);
        assert_eq!(load(&map), Err(ConfigError::InvalidValue("DEVICE_ID")));

        let map = vars(&[("UPDATE_INTERVAL_MS", "0")]);
        assert_eq!(load(&map), Err(ConfigError::InvalidValue("UPDATE_INTERVAL_MS")));
    }

    #[test]
    fn test_too_many_seed_codes() {
        let codes = (0..11).map(|i| format!("C{}", i)).collect::<Vec<_>>().join(",");
        let map = vars(&[("RFID_CODES", codes.as_str())]);
        assert_eq!(load(&map), Err(ConfigError::InvalidValue("RFID_CODES")));
    }
}
