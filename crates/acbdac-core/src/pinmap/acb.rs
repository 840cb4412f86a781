//! Built-in ACB pin map

use super::{PinMap, PinMapError};
use crate::types::{ChannelAddress, DeviceAddress, LogicalBusId, SubChannel};

/// (name, bus, address, output)
type TableEntry = (&'static str, u8, u8, SubChannel);

/// ADC inputs wired so far
const ACB_CHANNELS: &[TableEntry] = &[
    ("SPI0_CS0_IN4", 0, 0x61, SubChannel::A),
    ("SPI0_CS0_IN5", 0, 0x61, SubChannel::B),
    ("SPI0_CS0_IN6", 0, 0x61, SubChannel::C),
    ("SPI0_CS0_IN7", 0, 0x61, SubChannel::D),
];

impl PinMap {
    /// The ACB's ADC input pins
    pub fn acb() -> Result<Self, PinMapError> {
        Self::from_table(ACB_CHANNELS)
    }

    fn from_table(table: &[TableEntry]) -> Result<Self, PinMapError> {
        let entries = table
            .iter()
            .map(|&(name, bus, address, output)| {
                let invalid = |e: crate::Error| PinMapError::InvalidEntry {
                    name: name.to_string(),
                    reason: e.to_string(),
                };
                let bus = LogicalBusId::new(bus).map_err(invalid)?;
                let address = DeviceAddress::new(address).map_err(invalid)?;
                Ok((name, ChannelAddress::new(bus, address, output)))
            })
            .collect::<Result<Vec<_>, PinMapError>>()?;
        Self::new(entries)
    }
}
