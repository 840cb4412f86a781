//! TCA9548A I2C multiplexer
//!
//! The MCP4728 only has eight addresses, so the board puts eight DACs on
//! each of several downstream buses and connects one bus at a time to the
//! bridge through a TCA9548A. The multiplexer has a single control register:
//! bit N set connects port N.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::i2c::BusGuard;
use crate::link::MpsseLink;
use crate::types::LogicalBusId;

/// Default TCA9548A address (A2..A0 = 000)
pub const TCA9548A_DEFAULT_ADDRESS: u8 = 0x70;

/// When to write the control register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectPolicy {
    /// Write the control register before every transaction
    #[default]
    Always,
    /// Skip the write when the requested port is already connected
    Cached,
}

/// TCA9548A bus multiplexer
#[derive(Debug, Clone)]
pub struct Tca9548a {
    address: u8,
    policy: SelectPolicy,
    verify: bool,
}

impl Tca9548a {
    /// Create a multiplexer handle at `address`
    pub fn new(address: u8) -> Self {
        Self {
            address,
            policy: SelectPolicy::default(),
            verify: false,
        }
    }

    /// Set the re-selection policy
    pub fn with_policy(mut self, policy: SelectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Read the control register back after every select
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Multiplexer bus address
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Connect `bus` to the bridge and disconnect every other port
    ///
    /// Must run on the same guard as the transaction that follows it. A
    /// failed control write is reported as [`Error::BusSelectFailed`] and
    /// leaves the selection unknown.
    pub fn select<L: MpsseLink>(&self, guard: &mut BusGuard<'_, L>, bus: LogicalBusId) -> Result<()> {
        if self.policy == SelectPolicy::Cached && guard.selected_port() == Some(bus.port()) {
            log::trace!("{} already selected", bus);
            return Ok(());
        }

        log::debug!("Selecting {} (control 0x{:02X})", bus, bus.select_mask());
        match self.write_control(guard, bus.select_mask()) {
            Ok(()) => {
                guard.set_selected_port(Some(bus.port()));
                Ok(())
            }
            Err(e) => {
                guard.set_selected_port(None);
                Err(Error::BusSelectFailed {
                    bus,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Disconnect every port
    pub fn deselect<L: MpsseLink>(&self, guard: &mut BusGuard<'_, L>) -> Result<()> {
        guard.set_selected_port(None);
        self.write_control(guard, 0x00)
    }

    /// Read the control register
    pub fn read_control<L: MpsseLink>(&self, guard: &mut BusGuard<'_, L>) -> Result<u8> {
        let mut control = [0u8; 1];
        guard.read_into(self.address, &mut control)?;
        Ok(control[0])
    }

    fn write_control<L: MpsseLink>(&self, guard: &mut BusGuard<'_, L>, control: u8) -> Result<()> {
        guard.write(self.address, &[control])?;
        if self.verify {
            let actual = self.read_control(guard)?;
            if actual != control {
                return Err(Error::MuxReadbackMismatch {
                    expected: control,
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl Default for Tca9548a {
    fn default() -> Self {
        Self::new(TCA9548A_DEFAULT_ADDRESS)
    }
}
