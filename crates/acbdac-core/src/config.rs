//! Board configuration
//!
//! Everything about the deployment that is not the pin map: where the
//! multiplexer lives, which buses and addresses may be populated, and the
//! I2C timing. Loaded from the `[board]` table of a TOML file:
//!
//! ```toml
//! [board]
//! mux_address = "0x70"
//! buses = [0, 1, 2]
//! addresses = [0x60, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67]
//! frequency_hz = 100000
//! read_timeout_ms = 100
//! poll_interval_us = 100
//! select_policy = "always"
//! verify_select = false
//! ```
//!
//! Every field is optional and defaults to the ACB values shown above.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::i2c::EngineSettings;
use crate::mux::{SelectPolicy, Tca9548a, TCA9548A_DEFAULT_ADDRESS};
use crate::types::{deserialize_hex_u8, DeviceAddress, LogicalBusId};

/// Lowest accepted SCL frequency
pub const MIN_FREQUENCY_HZ: u32 = 10_000;

/// Highest accepted SCL frequency (Fast-mode Plus)
pub const MAX_FREQUENCY_HZ: u32 = 1_000_000;

/// Board configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Multiplexer address outside 0x70-0x77
    #[error("invalid multiplexer address 0x{0:02X}: must be 0x70-0x77")]
    InvalidMuxAddress(u8),

    /// Bus list has an out-of-range port
    #[error("invalid bus {0}: multiplexer has ports 0-7")]
    InvalidBus(u8),

    /// Address list has an address outside 0x60-0x67
    #[error("invalid DAC address 0x{0:02X}: must be 0x60-0x67")]
    InvalidAddress(u8),

    /// No bus or no address to probe
    #[error("board declares no {0} to probe")]
    Empty(&'static str),

    /// SCL frequency outside the supported range
    #[error("SCL frequency {0} Hz out of range 10000..=1000000")]
    InvalidFrequency(u32),

    /// Read timeout of zero
    #[error("read timeout must be non-zero")]
    ZeroTimeout,

    /// The file is not valid TOML or has unknown keys
    #[error("failed to parse board config: {0}")]
    Parse(String),

    /// The file could not be read
    #[error("failed to read board config: {0}")]
    Io(#[from] std::io::Error),
}

type ConfigResult<T> = core::result::Result<T, ConfigError>;

/// Deployment description for one ACB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoardConfig {
    /// TCA9548A address
    #[serde(deserialize_with = "deserialize_hex_u8")]
    pub mux_address: u8,
    /// Multiplexer ports with DACs behind them
    pub buses: Vec<LogicalBusId>,
    /// DAC addresses that may be populated on each bus
    pub addresses: Vec<DeviceAddress>,
    /// SCL frequency
    pub frequency_hz: u32,
    /// Deadline for one read from the bridge
    pub read_timeout_ms: u64,
    /// Sleep between empty polls of the bridge
    pub poll_interval_us: u64,
    /// Multiplexer re-selection policy
    pub select_policy: SelectPolicy,
    /// Read the multiplexer control register back after each select
    pub verify_select: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        // Three populated I2C networks, eight DACs each
        let buses = (0..3).filter_map(|port| LogicalBusId::new(port).ok()).collect();
        let settings = EngineSettings::default();
        Self {
            mux_address: TCA9548A_DEFAULT_ADDRESS,
            buses,
            addresses: DeviceAddress::all().collect(),
            frequency_hz: settings.frequency_hz,
            read_timeout_ms: settings.read_timeout.as_millis() as u64,
            poll_interval_us: settings.poll_interval.as_micros() as u64,
            select_policy: SelectPolicy::Always,
            verify_select: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct TomlConfigFile {
    #[serde(default)]
    board: BoardConfig,
}

impl BoardConfig {
    /// Load the `[board]` table from a TOML file
    ///
    /// A file without a `[board]` table yields the defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse the `[board]` table from a TOML string
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let file: TomlConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        file.board.validate()?;
        Ok(file.board)
    }

    /// Check the values that serde cannot
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0x70..=0x77).contains(&self.mux_address) {
            return Err(ConfigError::InvalidMuxAddress(self.mux_address));
        }
        if self.buses.is_empty() {
            return Err(ConfigError::Empty("buses"));
        }
        if self.addresses.is_empty() {
            return Err(ConfigError::Empty("addresses"));
        }
        if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&self.frequency_hz) {
            return Err(ConfigError::InvalidFrequency(self.frequency_hz));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Set the multiplexer address
    pub fn with_mux_address(mut self, address: u8) -> ConfigResult<Self> {
        if !(0x70..=0x77).contains(&address) {
            return Err(ConfigError::InvalidMuxAddress(address));
        }
        self.mux_address = address;
        Ok(self)
    }

    /// Set the populated multiplexer ports
    pub fn with_buses(mut self, ports: impl IntoIterator<Item = u8>) -> ConfigResult<Self> {
        let buses = ports
            .into_iter()
            .map(|p| LogicalBusId::new(p).map_err(|_| ConfigError::InvalidBus(p)))
            .collect::<ConfigResult<Vec<_>>>()?;
        if buses.is_empty() {
            return Err(ConfigError::Empty("buses"));
        }
        self.buses = buses;
        Ok(self)
    }

    /// Set the DAC addresses probed on each bus
    pub fn with_addresses(mut self, addresses: impl IntoIterator<Item = u8>) -> ConfigResult<Self> {
        let addresses = addresses
            .into_iter()
            .map(|a| DeviceAddress::new(a).map_err(|_| ConfigError::InvalidAddress(a)))
            .collect::<ConfigResult<Vec<_>>>()?;
        if addresses.is_empty() {
            return Err(ConfigError::Empty("addresses"));
        }
        self.addresses = addresses;
        Ok(self)
    }

    /// Set the SCL frequency
    pub fn with_frequency(mut self, frequency_hz: u32) -> ConfigResult<Self> {
        if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&frequency_hz) {
            return Err(ConfigError::InvalidFrequency(frequency_hz));
        }
        self.frequency_hz = frequency_hz;
        Ok(self)
    }

    /// Set the read deadline
    pub fn with_read_timeout(mut self, timeout: Duration) -> ConfigResult<Self> {
        let ms = timeout.as_millis() as u64;
        if ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        self.read_timeout_ms = ms;
        Ok(self)
    }

    /// Set the multiplexer re-selection policy
    pub fn with_select_policy(mut self, policy: SelectPolicy) -> Self {
        self.select_policy = policy;
        self
    }

    /// Enable or disable multiplexer read-back
    pub fn with_verify_select(mut self, verify: bool) -> Self {
        self.verify_select = verify;
        self
    }

    /// Engine timing derived from this configuration
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            frequency_hz: self.frequency_hz,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            poll_interval: Duration::from_micros(self.poll_interval_us),
        }
    }

    /// Multiplexer handle for this configuration
    pub fn mux(&self) -> Tca9548a {
        Tca9548a::new(self.mux_address)
            .with_policy(self.select_policy)
            .with_verify(self.verify_select)
    }

    /// Every (bus, address) slot the board may have populated
    pub fn slots(&self) -> impl Iterator<Item = (LogicalBusId, DeviceAddress)> + '_ {
        self.buses
            .iter()
            .flat_map(move |&bus| self.addresses.iter().map(move |&addr| (bus, addr)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BoardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.slots().count(), 24);
        assert_eq!(config.mux().address(), 0x70);
        assert_eq!(
            config.engine_settings().read_timeout,
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_parse_board_table() {
        let toml = r#"
[board]
mux_address = "0x71"
buses = [0, 2]
addresses = [0x60, 0x61]
frequency_hz = 400000
select_policy = "cached"

[[channel]]
name = "IGNORED_HERE"
bus = 0
address = "0x60"
output = "A"
"#;
        let config = BoardConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.mux_address, 0x71);
        assert_eq!(config.buses.len(), 2);
        assert_eq!(config.slots().count(), 4);
        assert_eq!(config.frequency_hz, 400_000);
        assert_eq!(config.select_policy, SelectPolicy::Cached);
        // Untouched fields keep their defaults
        assert_eq!(config.read_timeout_ms, 100);
    }

    #[test]
    fn test_missing_board_table_is_default() {
        let config = BoardConfig::from_toml_str("").unwrap();
        assert_eq!(config, BoardConfig::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            BoardConfig::from_toml_str("[board]\nbuses = [8]\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            BoardConfig::from_toml_str("[board]\nmux_address = 0x20\n"),
            Err(ConfigError::InvalidMuxAddress(0x20))
        ));
        assert!(matches!(
            BoardConfig::from_toml_str("[board]\nspeed = 1\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            BoardConfig::from_toml_str("[board]\nbuses = []\n"),
            Err(ConfigError::Empty("buses"))
        ));
    }

    #[test]
    fn test_builder() {
        let config = BoardConfig::default()
            .with_buses([1])
            .unwrap()
            .with_frequency(400_000)
            .unwrap()
            .with_verify_select(true);
        assert_eq!(config.slots().count(), 8);
        assert!(config.verify_select);

        assert!(matches!(
            BoardConfig::default().with_buses([9]),
            Err(ConfigError::InvalidBus(9))
        ));
        assert!(BoardConfig::default().with_addresses([0x01]).is_err());
        assert!(BoardConfig::default().with_frequency(5_000_000).is_err());
        assert!(BoardConfig::default()
            .with_read_timeout(Duration::ZERO)
            .is_err());
    }
}
