//! Addressing types
//!
//! A DAC output is identified by the logical I2C bus it sits on (one
//! multiplexer port), the 7-bit address of the MCP4728 on that bus, and the
//! output letter within the chip.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of ports on the TCA9548A multiplexer
pub const MUX_PORT_COUNT: u8 = 8;

/// First MCP4728 bus address (A2..A0 = 000)
pub const DAC_ADDRESS_MIN: u8 = 0x60;

/// Last MCP4728 bus address (A2..A0 = 111)
pub const DAC_ADDRESS_MAX: u8 = 0x67;

/// Logical I2C bus, i.e. one multiplexer output port
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct LogicalBusId(u8);

impl LogicalBusId {
    /// Create a bus id, rejecting ports the multiplexer does not have
    pub fn new(port: u8) -> Result<Self> {
        if port >= MUX_PORT_COUNT {
            return Err(Error::InvalidBus(port));
        }
        Ok(Self(port))
    }

    /// Multiplexer port index (0-7)
    pub fn port(&self) -> u8 {
        self.0
    }

    /// Control byte that connects this port and no other
    pub fn select_mask(&self) -> u8 {
        1 << self.0
    }
}

impl TryFrom<u8> for LogicalBusId {
    type Error = Error;

    fn try_from(port: u8) -> Result<Self> {
        Self::new(port)
    }
}

impl From<LogicalBusId> for u8 {
    fn from(bus: LogicalBusId) -> u8 {
        bus.0
    }
}

impl fmt::Display for LogicalBusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I2C{}", self.0)
    }
}

/// Bus address of an MCP4728 (0x60-0x67)
///
/// Always the real 7-bit address on the wire, never the 0-7 pin index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DeviceAddress(u8);

impl DeviceAddress {
    /// Create a device address, rejecting anything outside 0x60-0x67
    pub fn new(address: u8) -> Result<Self> {
        if !(DAC_ADDRESS_MIN..=DAC_ADDRESS_MAX).contains(&address) {
            return Err(Error::InvalidAddress(address));
        }
        Ok(Self(address))
    }

    /// Iterate over all eight DAC addresses
    pub fn all() -> impl Iterator<Item = DeviceAddress> {
        (DAC_ADDRESS_MIN..=DAC_ADDRESS_MAX).map(DeviceAddress)
    }

    /// Raw 7-bit address
    pub fn get(&self) -> u8 {
        self.0
    }

    /// Value of the A2..A0 address pins
    pub fn pins(&self) -> u8 {
        self.0 & 0x07
    }
}

impl TryFrom<u8> for DeviceAddress {
    type Error = Error;

    fn try_from(address: u8) -> Result<Self> {
        Self::new(address)
    }
}

impl From<DeviceAddress> for u8 {
    fn from(address: DeviceAddress) -> u8 {
        address.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Output of an MCP4728 (VOUTA-VOUTD)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SubChannel {
    /// VOUTA
    A,
    /// VOUTB
    B,
    /// VOUTC
    C,
    /// VOUTD
    D,
}

impl SubChannel {
    /// All outputs in register order
    pub const ALL: [SubChannel; 4] = [SubChannel::A, SubChannel::B, SubChannel::C, SubChannel::D];

    /// Parse an output from its letter
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(SubChannel::A),
            'B' => Some(SubChannel::B),
            'C' => Some(SubChannel::C),
            'D' => Some(SubChannel::D),
            _ => None,
        }
    }

    /// Output from its register index (0-3)
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Register index (0-3)
    pub fn index(&self) -> u8 {
        match self {
            SubChannel::A => 0,
            SubChannel::B => 1,
            SubChannel::C => 2,
            SubChannel::D => 3,
        }
    }

    /// Output letter
    pub fn letter(&self) -> char {
        match self {
            SubChannel::A => 'A',
            SubChannel::B => 'B',
            SubChannel::C => 'C',
            SubChannel::D => 'D',
        }
    }
}

impl TryFrom<String> for SubChannel {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SubChannel> for String {
    fn from(channel: SubChannel) -> String {
        channel.letter().to_string()
    }
}

impl core::str::FromStr for SubChannel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s
            .strip_prefix("VOUT")
            .or_else(|| s.strip_prefix("vout"))
            .unwrap_or(s);
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                Self::from_char(c).ok_or_else(|| Error::InvalidSubChannel(s.to_string()))
            }
            _ => Err(Error::InvalidSubChannel(s.to_string())),
        }
    }
}

impl fmt::Display for SubChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Full address of one DAC output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelAddress {
    /// Multiplexer port the DAC is behind
    pub bus: LogicalBusId,
    /// DAC bus address
    pub address: DeviceAddress,
    /// Output within the DAC
    pub output: SubChannel,
}

impl ChannelAddress {
    /// Create a channel address
    pub fn new(bus: LogicalBusId, address: DeviceAddress, output: SubChannel) -> Self {
        Self {
            bus,
            address,
            output,
        }
    }

    /// The (bus, address) slot this output belongs to
    pub fn slot(&self) -> (LogicalBusId, DeviceAddress) {
        (self.bus, self.address)
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.bus, self.address, self.output)
    }
}

/// Parse a byte that can be hex (0x...) or decimal
pub fn parse_u8(s: &str) -> core::result::Result<u8, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

/// Deserialize a u8 written either as an integer or as a hex string
pub(crate) fn deserialize_hex_u8<'de, D>(deserializer: D) -> core::result::Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u8),
        Str(String),
    }

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Str(s) => parse_u8(&s).map_err(serde::de::Error::custom),
    }
}
