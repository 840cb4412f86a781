//! Channel names to DAC outputs
//!
//! A [`PinMap`] is the table that turns a board-level name such as
//! `SPI0_CS0_IN4` into the (bus, address, output) triple that drives it.
//! It is built once and never changes afterwards. Construction rejects
//! duplicate names and two names pointing at the same output, so a bad
//! table fails at load time rather than shadowing an entry at lookup time.
//!
//! Tables come from three places:
//!
//! - [`PinMap::acb`], the built-in ACB table
//! - [`PinMap::from_toml_file`] / [`PinMap::from_toml_str`]
//! - [`PinMap::new`] with entries built in code

mod acb;
mod toml;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::error::{Error, Result};
use crate::types::{ChannelAddress, DeviceAddress, LogicalBusId};

/// Pin map construction and loading errors
#[derive(Debug, Error)]
pub enum PinMapError {
    /// The same name appears twice
    #[error("duplicate channel name '{0}'")]
    DuplicateName(String),

    /// Two names resolve to the same output
    #[error("channels '{first}' and '{second}' both map to {address}")]
    AddressCollision {
        /// Name that claimed the output first
        first: String,
        /// Name that collided with it
        second: String,
        /// The shared output
        address: ChannelAddress,
    },

    /// An entry has an invalid bus, address or output
    #[error("invalid channel '{name}': {reason}")]
    InvalidEntry {
        /// Entry name
        name: String,
        /// What was wrong with it
        reason: String,
    },

    /// The file is not valid TOML or does not match the expected layout
    #[error("failed to parse pin map: {0}")]
    Parse(String),

    /// The table could not be rendered as TOML
    #[error("failed to render pin map: {0}")]
    Render(String),

    /// The file could not be read
    #[error("failed to read pin map: {0}")]
    Io(#[from] std::io::Error),
}

/// Immutable channel name table
#[derive(Debug, Clone, Default)]
pub struct PinMap {
    by_name: BTreeMap<String, ChannelAddress>,
    by_address: BTreeMap<ChannelAddress, String>,
}

impl PinMap {
    /// Build a table, rejecting duplicate names and shared outputs
    pub fn new<I, S>(entries: I) -> core::result::Result<Self, PinMapError>
    where
        I: IntoIterator<Item = (S, ChannelAddress)>,
        S: Into<String>,
    {
        let mut map = Self::default();
        for (name, address) in entries {
            let name = name.into();
            if map.by_name.contains_key(&name) {
                return Err(PinMapError::DuplicateName(name));
            }
            if let Some(first) = map.by_address.get(&address) {
                return Err(PinMapError::AddressCollision {
                    first: first.clone(),
                    second: name,
                    address,
                });
            }
            map.by_address.insert(address, name.clone());
            map.by_name.insert(name, address);
        }
        Ok(map)
    }

    /// Look up a channel by exact name
    pub fn resolve(&self, name: &str) -> Result<ChannelAddress> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownChannel(name.to_string()))
    }

    /// Name mapped to an output, if any
    pub fn name_of(&self, address: &ChannelAddress) -> Option<&str> {
        self.by_address.get(address).map(String::as_str)
    }

    /// Whether `name` is in the table
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Entries in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, ChannelAddress)> {
        self.by_name.iter().map(|(name, addr)| (name.as_str(), *addr))
    }

    /// (bus, address) slots referenced by at least one entry
    pub fn slots(&self) -> Vec<(LogicalBusId, DeviceAddress)> {
        let mut slots: Vec<_> = self.by_address.keys().map(|a| a.slot()).collect();
        slots.dedup();
        slots
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubChannel;

    fn out(bus: u8, addr: u8, output: SubChannel) -> ChannelAddress {
        ChannelAddress::new(
            LogicalBusId::new(bus).unwrap(),
            DeviceAddress::new(addr).unwrap(),
            output,
        )
    }

    #[test]
    fn test_resolve() {
        let map = PinMap::new([("HEATER_TEMP1", out(0, 0x61, SubChannel::A))]).unwrap();
        assert_eq!(
            map.resolve("HEATER_TEMP1").unwrap(),
            out(0, 0x61, SubChannel::A)
        );
        assert!(matches!(
            map.resolve("heater_temp1"),
            Err(Error::UnknownChannel(_))
        ));
        assert_eq!(
            map.name_of(&out(0, 0x61, SubChannel::A)),
            Some("HEATER_TEMP1")
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = PinMap::new([
            ("X", out(0, 0x60, SubChannel::A)),
            ("X", out(0, 0x60, SubChannel::B)),
        ])
        .unwrap_err();
        assert!(matches!(err, PinMapError::DuplicateName(name) if name == "X"));
    }

    #[test]
    fn test_collision_rejected() {
        let err = PinMap::new([
            ("FIRST", out(1, 0x63, SubChannel::C)),
            ("SECOND", out(1, 0x63, SubChannel::C)),
        ])
        .unwrap_err();
        match err {
            PinMapError::AddressCollision {
                first,
                second,
                address,
            } => {
                assert_eq!(first, "FIRST");
                assert_eq!(second, "SECOND");
                assert_eq!(address, out(1, 0x63, SubChannel::C));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_same_address_on_other_bus_is_fine() {
        let map = PinMap::new([
            ("BUS0", out(0, 0x60, SubChannel::A)),
            ("BUS1", out(1, 0x60, SubChannel::A)),
        ])
        .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.slots().len(), 2);
    }

    #[test]
    fn test_iter_in_name_order() {
        let map = PinMap::new([
            ("B", out(0, 0x60, SubChannel::A)),
            ("A", out(0, 0x60, SubChannel::B)),
        ])
        .unwrap();
        let names: Vec<_> = map.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["A", "B"]);
        assert_eq!(map.slots().len(), 1);
    }
}
