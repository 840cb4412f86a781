//! Populated DAC slots
//!
//! The board has room for eight DACs on each bus but is rarely fully
//! populated. The registry probes each declared (bus, address) slot once and
//! remembers the answer. A slot moves from `Unprobed` to `Present` or
//! `Absent` exactly once and never changes afterwards.

use std::collections::BTreeMap;
use std::fmt;

use crate::dac::Mcp4728;
use crate::error::{Error, Result};
use crate::i2c::I2cEngine;
use crate::link::MpsseLink;
use crate::mux::Tca9548a;
use crate::types::{DeviceAddress, LogicalBusId};

/// Slot key
pub type SlotId = (LogicalBusId, DeviceAddress);

/// A DAC that answered its probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Bus the chip is on
    pub bus: LogicalBusId,
    /// Chip driver
    pub chip: Mcp4728,
}

/// Probe state of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSlot {
    /// Not probed yet
    Unprobed,
    /// Chip answered; all four outputs are usable
    Present(DeviceRecord),
    /// Nothing answered at this address
    Absent,
}

/// Outcome of [`DeviceRegistry::initialize`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryReport {
    /// Slots with a DAC
    pub present: Vec<SlotId>,
    /// Slots without one
    pub absent: Vec<SlotId>,
}

impl fmt::Display for RegistryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} DAC(s) present, {} slot(s) empty",
            self.present.len(),
            self.absent.len()
        )?;
        for (bus, addr) in &self.present {
            write!(f, "\n  {} {}: MCP4728", bus, addr)?;
        }
        Ok(())
    }
}

/// Flat table of slots keyed by (bus, address)
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    slots: BTreeMap<SlotId, DeviceSlot>,
}

impl DeviceRegistry {
    /// Registry with every given slot unprobed
    pub fn new(slots: impl IntoIterator<Item = SlotId>) -> Self {
        Self {
            slots: slots
                .into_iter()
                .map(|slot| (slot, DeviceSlot::Unprobed))
                .collect(),
        }
    }

    /// Probe every unprobed slot
    ///
    /// A slot whose address is not acknowledged is recorded as absent and
    /// probing carries on. Any other failure stops initialization and is
    /// returned, leaving the remaining slots unprobed.
    pub fn initialize<L: MpsseLink>(
        &mut self,
        engine: &I2cEngine<L>,
        mux: &Tca9548a,
    ) -> Result<RegistryReport> {
        for (&(bus, address), slot) in self.slots.iter_mut() {
            if *slot != DeviceSlot::Unprobed {
                continue;
            }

            let chip = Mcp4728::new(address);
            let found = {
                let mut guard = engine.try_acquire()?;
                mux.select(&mut guard, bus)?;
                chip.probe(&mut guard).map_err(|e| e.on_bus(bus))?
            };

            *slot = if found {
                log::debug!("MCP4728 found on {} at {}", bus, address);
                DeviceSlot::Present(DeviceRecord { bus, chip })
            } else {
                log::debug!("No MCP4728 on {} at {}", bus, address);
                DeviceSlot::Absent
            };
        }

        let report = self.report();
        log::info!("DAC registry: {}", report);
        Ok(report)
    }

    /// Present and absent slots so far
    pub fn report(&self) -> RegistryReport {
        let mut report = RegistryReport::default();
        for (&id, slot) in &self.slots {
            match slot {
                DeviceSlot::Present(_) => report.present.push(id),
                DeviceSlot::Absent => report.absent.push(id),
                DeviceSlot::Unprobed => {}
            }
        }
        report
    }

    /// The chip in a slot, if one answered its probe
    pub fn get(&self, bus: LogicalBusId, address: DeviceAddress) -> Option<&DeviceRecord> {
        match self.slots.get(&(bus, address)) {
            Some(DeviceSlot::Present(record)) => Some(record),
            _ => None,
        }
    }

    /// Like [`get`](Self::get), but failing with [`Error::DeviceNotPresent`]
    pub fn require(&self, bus: LogicalBusId, address: DeviceAddress) -> Result<&DeviceRecord> {
        self.get(bus, address)
            .ok_or(Error::DeviceNotPresent { bus, address })
    }

    /// State of one slot, or `None` if the board does not declare it
    pub fn slot(&self, bus: LogicalBusId, address: DeviceAddress) -> Option<DeviceSlot> {
        self.slots.get(&(bus, address)).copied()
    }

    /// Every declared slot in (bus, address) order
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, DeviceSlot)> + '_ {
        self.slots.iter().map(|(&id, &slot)| (id, slot))
    }

    /// Number of declared slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot is declared
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(bus: u8, addr: u8) -> SlotId {
        (
            LogicalBusId::new(bus).unwrap(),
            DeviceAddress::new(addr).unwrap(),
        )
    }

    #[test]
    fn test_unprobed_slots_are_not_present() {
        let registry = DeviceRegistry::new([slot(0, 0x60), slot(0, 0x61)]);
        let (bus, addr) = slot(0, 0x60);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.slot(bus, addr), Some(DeviceSlot::Unprobed));
        assert!(registry.get(bus, addr).is_none());
        assert!(matches!(
            registry.require(bus, addr),
            Err(Error::DeviceNotPresent { .. })
        ));
        assert_eq!(registry.report(), RegistryReport::default());
    }

    #[test]
    fn test_undeclared_slot() {
        let registry = DeviceRegistry::new([slot(0, 0x60)]);
        let (bus, addr) = slot(2, 0x67);
        assert_eq!(registry.slot(bus, addr), None);
        assert!(registry.get(bus, addr).is_none());
    }

    #[test]
    fn test_report_display() {
        let report = RegistryReport {
            present: vec![slot(0, 0x61)],
            absent: vec![slot(0, 0x60), slot(1, 0x60)],
        };
        assert_eq!(
            report.to_string(),
            "1 DAC(s) present, 2 slot(s) empty\n  I2C0 0x61: MCP4728"
        );
    }
}
