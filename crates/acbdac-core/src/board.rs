//! Board context
//!
//! [`Board`] is the single owner of the bridge link. It holds the I2C
//! engine, the multiplexer, the device registry and the pin map, and hands
//! out short-lived handles that borrow it. There is no global state: open a
//! board at startup, pass it by reference, and [`close`](Board::close) it
//! to get the link back.
//!
//! Every wire operation on a handle takes the transaction lock once, selects
//! the handle's bus on the multiplexer and runs its transaction before the
//! lock is released. Wire errors from that transaction come back as
//! [`Error::OnBus`](crate::Error::OnBus) naming the bus.

use crate::config::BoardConfig;
use crate::dac::{
    code_from_normalized, mcp4728, normalized_from_code, ChannelConfig, ChannelRegisters,
    ChannelState,
};
use crate::error::Result;
use crate::i2c::{BusGuard, I2cEngine};
use crate::link::MpsseLink;
use crate::mux::Tca9548a;
use crate::pinmap::PinMap;
use crate::registry::{DeviceRecord, DeviceRegistry, DeviceSlot, RegistryReport};
use crate::types::{ChannelAddress, DeviceAddress, LogicalBusId, SubChannel};

/// An ACB reached through one MPSSE bridge
pub struct Board<L: MpsseLink> {
    engine: I2cEngine<L>,
    mux: Tca9548a,
    registry: DeviceRegistry,
    pinmap: PinMap,
    config: BoardConfig,
}

impl<L: MpsseLink> Board<L> {
    /// Bring up the bridge and build an unprobed registry
    ///
    /// No DAC is touched until [`initialize`](Self::initialize).
    pub fn open(link: L, config: BoardConfig, pinmap: PinMap) -> Result<Self> {
        config.validate()?;

        let registry = DeviceRegistry::new(config.slots());
        for (name, addr) in pinmap.iter() {
            if registry.slot(addr.bus, addr.address).is_none() {
                log::warn!(
                    "Channel '{}' maps to {}, which the board config does not declare",
                    name,
                    addr
                );
            }
        }

        let engine = I2cEngine::new(link, config.engine_settings())?;
        log::info!(
            "Opened board: {} channel(s), {} slot(s), multiplexer at 0x{:02X}",
            pinmap.len(),
            registry.len(),
            config.mux_address
        );

        Ok(Self {
            engine,
            mux: config.mux(),
            registry,
            pinmap,
            config,
        })
    }

    /// Probe every declared slot
    pub fn initialize(&mut self) -> Result<RegistryReport> {
        self.registry.initialize(&self.engine, &self.mux)
    }

    /// Handle for a named channel
    ///
    /// Pure lookup: fails with `UnknownChannel` or `DeviceNotPresent`
    /// without touching the link.
    pub fn output(&self, name: &str) -> Result<OutputHandle<'_, L>> {
        let addr = self.pinmap.resolve(name)?;
        let record = *self.registry.require(addr.bus, addr.address)?;
        Ok(OutputHandle {
            board: self,
            record,
            output: addr.output,
            config: ChannelConfig::default(),
        })
    }

    /// Handle for a DAC that answered its probe
    pub fn device(&self, bus: LogicalBusId, address: DeviceAddress) -> Option<DeviceHandle<'_, L>> {
        self.registry.get(bus, address).map(|&record| DeviceHandle {
            board: self,
            record,
        })
    }

    /// Addresses answering on one bus, excluding the multiplexer itself
    pub fn scan_bus(&self, bus: LogicalBusId) -> Result<Vec<u8>> {
        let mut found = self.with_bus(bus, |guard| guard.scan())?;
        found.retain(|&addr| addr != self.mux.address());
        log::info!("{}: {} target(s) answered", bus, found.len());
        Ok(found)
    }

    /// Pin map entries with the state of the slot each one lands on
    pub fn channels(&self) -> impl Iterator<Item = (&str, ChannelAddress, Option<DeviceSlot>)> + '_ {
        self.pinmap
            .iter()
            .map(|(name, addr)| (name, addr, self.registry.slot(addr.bus, addr.address)))
    }

    /// The I2C engine
    pub fn engine(&self) -> &I2cEngine<L> {
        &self.engine
    }

    /// The device registry
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// The pin map
    pub fn pinmap(&self) -> &PinMap {
        &self.pinmap
    }

    /// The configuration the board was opened with
    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// Disconnect every multiplexer port and hand the link back
    pub fn close(self) -> L {
        match self.engine.try_acquire() {
            Ok(mut guard) => {
                if let Err(e) = self.mux.deselect(&mut guard) {
                    log::warn!("Failed to deselect multiplexer on close: {}", e);
                }
            }
            Err(e) => log::warn!("Could not take the bus to deselect on close: {}", e),
        }
        log::debug!(
            "Closing board after {} transaction(s)",
            self.engine.transactions()
        );
        self.engine.into_link()
    }

    /// Take the lock, select `bus` and run `f`
    fn with_bus<T>(
        &self,
        bus: LogicalBusId,
        f: impl FnOnce(&mut BusGuard<'_, L>) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.engine.try_acquire()?;
        self.mux.select(&mut guard, bus)?;
        f(&mut guard).map_err(|e| e.on_bus(bus))
    }
}

/// A DAC that answered its probe
pub struct DeviceHandle<'a, L: MpsseLink> {
    board: &'a Board<L>,
    record: DeviceRecord,
}

impl<'a, L: MpsseLink> DeviceHandle<'a, L> {
    /// One of the four outputs
    pub fn output(&self, output: SubChannel) -> OutputHandle<'a, L> {
        OutputHandle {
            board: self.board,
            record: self.record,
            output,
            config: ChannelConfig::default(),
        }
    }

    /// All four outputs in A-D order
    pub fn outputs(&self) -> [OutputHandle<'a, L>; 4] {
        SubChannel::ALL.map(|output| self.output(output))
    }

    /// Bus the DAC is on
    pub fn bus(&self) -> LogicalBusId {
        self.record.bus
    }

    /// DAC address
    pub fn address(&self) -> DeviceAddress {
        self.record.chip.address()
    }

    /// Read every register of the chip
    pub fn read_registers(&self) -> Result<[ChannelRegisters; 4]> {
        let chip = self.record.chip;
        self.board
            .with_bus(self.record.bus, |guard| chip.read_registers(guard))
    }
}

/// One DAC output
///
/// Writes use the handle's [`ChannelConfig`], which starts as the chip's
/// power-on configuration (VDD reference, gain x1, output enabled).
pub struct OutputHandle<'a, L: MpsseLink> {
    board: &'a Board<L>,
    record: DeviceRecord,
    output: SubChannel,
    config: ChannelConfig,
}

impl<L: MpsseLink> OutputHandle<'_, L> {
    /// Use `config` for writes made through this handle
    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Full address of this output
    pub fn address(&self) -> ChannelAddress {
        ChannelAddress::new(self.record.bus, self.record.chip.address(), self.output)
    }

    /// Set the output to `value` of full scale (0.0-1.0)
    ///
    /// Out-of-range values fail with `ValueOutOfRange` and nothing is
    /// written.
    pub fn set_normalized(&self, value: f64) -> Result<()> {
        let code = code_from_normalized(value)?;
        self.set_raw(code)
    }

    /// Read the output back as a fraction of full scale
    pub fn read_normalized(&self) -> Result<f64> {
        Ok(normalized_from_code(self.read_raw()?))
    }

    /// Set the raw 12-bit code
    pub fn set_raw(&self, code: u16) -> Result<()> {
        let code = mcp4728::check_code(code)?;
        let (chip, output, config) = (self.record.chip, self.output, self.config);
        log::debug!("{} <- {:#05X}", self.address(), code);
        self.board.with_bus(self.record.bus, |guard| {
            chip.write_channel(guard, output, code, config)
        })
    }

    /// Read the raw 12-bit code
    pub fn read_raw(&self) -> Result<u16> {
        Ok(self.read_state()?.code)
    }

    /// Read the live input register
    pub fn read_state(&self) -> Result<ChannelState> {
        let (chip, output) = (self.record.chip, self.output);
        self.board
            .with_bus(self.record.bus, |guard| chip.read_channel(guard, output))
    }

    /// Change the output configuration, keeping the current code
    ///
    /// Read-modify-write: the read and the write run back to back under one
    /// hold of the transaction lock. This is the only operation that holds
    /// the lock across two transactions.
    pub fn set_config(&self, config: ChannelConfig) -> Result<()> {
        let (chip, output) = (self.record.chip, self.output);
        self.board.with_bus(self.record.bus, |guard| {
            let current = chip.read_channel(guard, output)?;
            chip.write_channel(guard, output, current.code, config)
        })
    }
}
