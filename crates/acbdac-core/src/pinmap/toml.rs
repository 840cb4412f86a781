//! TOML pin map parsing
//!
//! ```toml
//! [[channel]]
//! name = "HEATER_TEMP1"
//! bus = 0
//! address = "0x61"
//! output = "A"
//! ```
//!
//! Other top-level tables (such as `[board]`) are ignored, so one file can
//! carry both the board configuration and its pin map.

use std::fs;
use std::path::Path;

use super::{PinMap, PinMapError};
use crate::types::{deserialize_hex_u8, ChannelAddress, DeviceAddress, LogicalBusId, SubChannel};

#[derive(Debug, serde::Deserialize)]
struct TomlPinMapFile {
    #[serde(default)]
    channel: Vec<TomlChannel>,
}

#[derive(Debug, serde::Deserialize)]
struct TomlChannel {
    name: String,
    bus: u8,
    #[serde(deserialize_with = "deserialize_hex_u8")]
    address: u8,
    output: String,
}

#[derive(Debug, serde::Serialize)]
struct TomlPinMapOut<'a> {
    channel: Vec<TomlChannelOut<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct TomlChannelOut<'a> {
    name: &'a str,
    bus: u8,
    address: String,
    output: String,
}

impl TomlChannel {
    fn into_entry(self) -> Result<(String, ChannelAddress), PinMapError> {
        let invalid = |name: &str, e: crate::Error| PinMapError::InvalidEntry {
            name: name.to_string(),
            reason: e.to_string(),
        };
        let bus = LogicalBusId::new(self.bus).map_err(|e| invalid(&self.name, e))?;
        let address = DeviceAddress::new(self.address).map_err(|e| invalid(&self.name, e))?;
        let output: SubChannel = self.output.parse().map_err(|e| invalid(&self.name, e))?;
        Ok((self.name, ChannelAddress::new(bus, address, output)))
    }
}

impl PinMap {
    /// Load a pin map from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, PinMapError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a pin map from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, PinMapError> {
        let file: TomlPinMapFile =
            toml::from_str(content).map_err(|e| PinMapError::Parse(e.to_string()))?;

        let entries = file
            .channel
            .into_iter()
            .map(TomlChannel::into_entry)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(entries)
    }

    /// Render the table as TOML
    pub fn to_toml_string(&self) -> Result<String, PinMapError> {
        let file = TomlPinMapOut {
            channel: self
                .iter()
                .map(|(name, addr)| TomlChannelOut {
                    name,
                    bus: addr.bus.port(),
                    address: format!("0x{:02X}", addr.address.get()),
                    output: addr.output.to_string(),
                })
                .collect(),
        };
        toml::to_string(&file).map_err(|e| PinMapError::Render(e.to_string()))
    }
}
