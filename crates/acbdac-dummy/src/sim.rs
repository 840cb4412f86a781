//! Simulated MPSSE bridge
//!
//! [`SimLink`] accepts the same MPSSE byte stream a real FT232H would and
//! turns it back into I2C bus events. SCL and SDA are reconstructed from
//! `SET_BITS_LOW` writes: SDA falling while SCL is high is a START, SDA
//! rising while SCL is high is a STOP. Byte and bit shift commands become
//! address, data and ACK phases on the addressed target.
//!
//! The bus and its targets live behind an `Arc<Mutex<_>>` so a test can keep
//! a [`SimControl`] after handing the link to a board.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use acbdac_core::error::{Error, Result};
use acbdac_core::i2c::mpsse;
use acbdac_core::link::{BitMode, MpsseLink};
use acbdac_core::types::{DeviceAddress, LogicalBusId, SubChannel};

use crate::target::{I2cTarget, SimMcp4728, SimRegister, SimTca9548a};

/// Traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    /// `write` calls on the link
    pub link_writes: usize,
    /// `read` calls on the link
    pub link_reads: usize,
    /// START conditions, repeated starts included
    pub starts: usize,
    /// STOP conditions
    pub stops: usize,
    /// Address bytes nobody acknowledged
    pub nacks: usize,
}

/// Where a device is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attach {
    /// Directly on the bridge's bus
    Upstream,
    /// Behind a multiplexer port
    Port(u8),
}

enum SimDevice {
    Mux(SimTca9548a),
    Dac(SimMcp4728),
    Other(Box<dyn I2cTarget>),
}

impl SimDevice {
    fn target(&mut self) -> &mut dyn I2cTarget {
        match self {
            SimDevice::Mux(mux) => mux,
            SimDevice::Dac(dac) => dac,
            SimDevice::Other(target) => target.as_mut(),
        }
    }

    fn address(&self) -> u8 {
        match self {
            SimDevice::Mux(mux) => mux.address(),
            SimDevice::Dac(dac) => dac.address(),
            SimDevice::Other(target) => target.address(),
        }
    }
}

struct Attached {
    attach: Attach,
    device: SimDevice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Waiting for the address byte
    Address,
    /// Addressed for writing, by device index
    Write(usize),
    /// Addressed for reading, by device index
    Read(usize),
    /// Address not acknowledged; ignore until STOP
    Ignored,
}

struct SimBus {
    devices: Vec<Attached>,
    phase: Phase,
    scl: bool,
    sda: bool,
    mpsse: bool,
    pending_ack: VecDeque<bool>,
    rx: VecDeque<u8>,
    max_transfer: usize,
    read_chunk: usize,
    stalled: bool,
    /// Read data bytes still delivered before the rest is withheld
    data_budget: Option<usize>,
    fail_writes: bool,
    stats: SimStats,
}

impl SimBus {
    fn mux_control(&self) -> Option<u8> {
        self.devices.iter().find_map(|d| match (&d.attach, &d.device) {
            (Attach::Upstream, SimDevice::Mux(mux)) => Some(mux.control()),
            _ => None,
        })
    }

    fn reachable(&self, attach: Attach) -> bool {
        match attach {
            Attach::Upstream => true,
            Attach::Port(port) => self
                .mux_control()
                .is_some_and(|control| control & (1 << port) != 0),
        }
    }

    fn find(&self, address: u8) -> Option<usize> {
        self.devices
            .iter()
            .position(|d| d.device.address() == address && self.reachable(d.attach))
    }

    fn dac(&self, port: u8, address: u8) -> Option<&SimMcp4728> {
        self.devices.iter().find_map(|d| match (&d.attach, &d.device) {
            (Attach::Port(p), SimDevice::Dac(dac)) if *p == port && dac.address() == address => {
                Some(dac)
            }
            _ => None,
        })
    }

    fn end_message(&mut self) {
        if let Phase::Write(index) | Phase::Read(index) = self.phase {
            self.devices[index].device.target().stop();
        }
        if matches!(self.phase, Phase::Read(_)) && self.data_budget == Some(0) {
            self.data_budget = None;
        }
    }

    /// Whether the next read data byte is lost on the way to the host
    fn withhold_data(&mut self) -> bool {
        match &mut self.data_budget {
            Some(0) => true,
            Some(left) => {
                *left -= 1;
                false
            }
            None => false,
        }
    }

    fn set_pins(&mut self, value: u8, direction: u8) {
        // Undriven lines float high
        let scl = value & mpsse::PIN_SCL != 0 || direction & mpsse::PIN_SCL == 0;
        let sda = value & mpsse::PIN_SDA_OUT != 0 || direction & mpsse::PIN_SDA_OUT == 0;

        if self.scl && scl && self.sda != sda {
            if sda {
                self.end_message();
                self.phase = Phase::Idle;
                self.stats.stops += 1;
            } else {
                self.end_message();
                self.phase = Phase::Address;
                self.pending_ack.clear();
                self.stats.starts += 1;
            }
        }

        self.scl = scl;
        self.sda = sda;
    }

    fn shift_out(&mut self, byte: u8) {
        let ack = match self.phase {
            Phase::Address => {
                let address = byte >> 1;
                let read = byte & 0x01 != 0;
                match self.find(address) {
                    Some(index) => {
                        self.devices[index].device.target().start(read);
                        self.phase = if read {
                            Phase::Read(index)
                        } else {
                            Phase::Write(index)
                        };
                        true
                    }
                    None => {
                        self.stats.nacks += 1;
                        self.phase = Phase::Ignored;
                        false
                    }
                }
            }
            Phase::Write(index) => self.devices[index].device.target().write(byte),
            Phase::Read(_) | Phase::Idle | Phase::Ignored => false,
        };
        self.pending_ack.push_back(ack);
    }

    fn shift_in(&mut self) -> u8 {
        match self.phase {
            Phase::Read(index) => self.devices[index].device.target().read(),
            _ => 0xFF,
        }
    }

    fn process(&mut self, data: &[u8]) -> Result<()> {
        let truncated = |op: u8| Error::Link(format!("truncated MPSSE command 0x{:02X}", op));
        let mut i = 0;
        while i < data.len() {
            let op = data[i];
            match op {
                mpsse::SET_BITS_LOW => {
                    let args = data.get(i + 1..i + 3).ok_or_else(|| truncated(op))?;
                    self.set_pins(args[0], args[1]);
                    i += 3;
                }
                mpsse::WRITE_BYTES_NVE_MSB => {
                    let args = data.get(i + 1..i + 3).ok_or_else(|| truncated(op))?;
                    let len = u16::from_le_bytes([args[0], args[1]]) as usize + 1;
                    let payload = data.get(i + 3..i + 3 + len).ok_or_else(|| truncated(op))?;
                    for &byte in payload {
                        self.shift_out(byte);
                    }
                    i += 3 + len;
                }
                mpsse::READ_BYTES_PVE_MSB => {
                    let args = data.get(i + 1..i + 3).ok_or_else(|| truncated(op))?;
                    let len = u16::from_le_bytes([args[0], args[1]]) as usize + 1;
                    for _ in 0..len {
                        let byte = self.shift_in();
                        if !self.withhold_data() {
                            self.rx.push_back(byte);
                        }
                    }
                    i += 3;
                }
                mpsse::READ_BITS_PVE_MSB => {
                    data.get(i + 1).ok_or_else(|| truncated(op))?;
                    let ack = self.pending_ack.pop_front().unwrap_or(false);
                    self.rx.push_back(if ack { 0x00 } else { 0x01 });
                    i += 2;
                }
                // Master ACK/NACK after a read byte
                mpsse::WRITE_BITS_NVE_MSB | mpsse::TCK_DIVISOR | mpsse::DRIVE_ZERO => {
                    data.get(i + 1..i + 3).ok_or_else(|| truncated(op))?;
                    i += 3;
                }
                mpsse::SEND_IMMEDIATE
                | mpsse::DIS_DIV_5
                | mpsse::CLK_NO_ADAPTIVE
                | mpsse::EN_3_PHASE
                | mpsse::LOOPBACK_END => i += 1,
                _ => {
                    self.rx.push_back(mpsse::BAD_COMMAND);
                    self.rx.push_back(op);
                    i += 1;
                }
            }
        }
        Ok(())
    }
}

/// MPSSE bridge with an emulated I2C tree behind it
pub struct SimLink {
    bus: Arc<Mutex<SimBus>>,
}

impl SimLink {
    /// Bridge with nothing attached
    pub fn new() -> Self {
        Self {
            bus: Arc::new(Mutex::new(SimBus {
                devices: Vec::new(),
                phase: Phase::Idle,
                scl: true,
                sda: true,
                mpsse: false,
                pending_ack: VecDeque::new(),
                rx: VecDeque::new(),
                max_transfer: 64,
                read_chunk: 64,
                stalled: false,
                data_budget: None,
                fail_writes: false,
                stats: SimStats::default(),
            })),
        }
    }

    /// Limit the engine's chunk size and the bytes returned per read call
    pub fn with_transfer_limits(self, max_transfer: usize, read_chunk: usize) -> Self {
        {
            let mut bus = lock(&self.bus);
            bus.max_transfer = max_transfer.max(1);
            bus.read_chunk = read_chunk.max(1);
        }
        self
    }

    /// Attach a TCA9548A directly to the bridge
    pub fn with_mux(self, address: u8) -> Self {
        self.attach(Attach::Upstream, SimDevice::Mux(SimTca9548a::new(address)))
    }

    /// Attach an MCP4728 behind multiplexer `port`
    pub fn with_dac(self, port: u8, address: u8) -> Self {
        self.attach(Attach::Port(port), SimDevice::Dac(SimMcp4728::new(address)))
    }

    /// Attach any target directly to the bridge
    pub fn with_target(self, target: impl I2cTarget + 'static) -> Self {
        self.attach(Attach::Upstream, SimDevice::Other(Box::new(target)))
    }

    /// Attach any target behind multiplexer `port`
    pub fn with_port_target(self, port: u8, target: impl I2cTarget + 'static) -> Self {
        self.attach(Attach::Port(port), SimDevice::Other(Box::new(target)))
    }

    /// Handle for inspecting the bus after the link has been moved
    pub fn control(&self) -> SimControl {
        SimControl {
            bus: Arc::clone(&self.bus),
        }
    }

    fn attach(self, attach: Attach, device: SimDevice) -> Self {
        lock(&self.bus).devices.push(Attached { attach, device });
        self
    }
}

impl Default for SimLink {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(bus: &Mutex<SimBus>) -> MutexGuard<'_, SimBus> {
    bus.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MpsseLink for SimLink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut bus = lock(&self.bus);
        bus.stats.link_writes += 1;
        if bus.fail_writes {
            return Err(Error::Link("simulated USB write failure".into()));
        }
        if !bus.mpsse {
            return Err(Error::Link("bridge is not in MPSSE mode".into()));
        }
        log::trace!("sim rx {:02X?}", data);
        bus.process(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut bus = lock(&self.bus);
        bus.stats.link_reads += 1;
        if bus.stalled {
            return Ok(0);
        }
        let n = buf.len().min(bus.read_chunk).min(bus.rx.len());
        for (slot, byte) in buf.iter_mut().zip(bus.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn set_bitmode(&mut self, _mask: u8, mode: BitMode) -> Result<()> {
        lock(&self.bus).mpsse = mode == BitMode::Mpsse;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        let mut bus = lock(&self.bus);
        bus.rx.clear();
        bus.pending_ack.clear();
        bus.mpsse = false;
        Ok(())
    }

    fn max_transfer(&self) -> usize {
        lock(&self.bus).max_transfer
    }
}

/// Inspection and fault injection for a [`SimLink`]
#[derive(Clone)]
pub struct SimControl {
    bus: Arc<Mutex<SimBus>>,
}

impl SimControl {
    /// Traffic counters
    pub fn stats(&self) -> SimStats {
        lock(&self.bus).stats
    }

    /// Make every read return zero bytes
    pub fn set_stalled(&self, stalled: bool) {
        lock(&self.bus).stalled = stalled;
    }

    /// Deliver `bytes` more read data bytes, then drop the rest of that read
    ///
    /// ACK samples and sync echoes still arrive. The switch disarms once the
    /// read that ran out of data ends.
    pub fn stall_read_after(&self, bytes: usize) {
        lock(&self.bus).data_budget = Some(bytes);
    }

    /// Make every write fail at the USB level
    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.bus).fail_writes = fail;
    }

    /// Multiplexer control register, if a multiplexer is attached
    pub fn mux_control(&self) -> Option<u8> {
        lock(&self.bus).mux_control()
    }

    /// Live input register of a DAC output
    pub fn dac_input(
        &self,
        bus: LogicalBusId,
        address: DeviceAddress,
        output: SubChannel,
    ) -> Option<SimRegister> {
        lock(&self.bus)
            .dac(bus.port(), address.get())
            .map(|dac| dac.input(output))
    }

    /// Channel updates a DAC has applied
    pub fn dac_writes(&self, bus: LogicalBusId, address: DeviceAddress) -> Option<usize> {
        lock(&self.bus)
            .dac(bus.port(), address.get())
            .map(|dac| dac.writes())
    }

    /// Whether the bus is between START and STOP
    pub fn in_transaction(&self) -> bool {
        lock(&self.bus).phase != Phase::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mpsse_link() -> SimLink {
        let mut link = SimLink::new().with_target(crate::target::AckTarget::new(0x20));
        link.set_bitmode(0, BitMode::Mpsse).unwrap();
        link
    }

    #[test]
    fn test_sync_probe_echo() {
        let mut link = mpsse_link();
        link.write(&[mpsse::SYNC_PROBE]).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(link.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[0xFA, 0xAB]);
    }

    #[test]
    fn test_start_address_stop() {
        let mut link = mpsse_link();
        let control = link.control();

        let mut cmd = Vec::new();
        mpsse::push_start(&mut cmd);
        mpsse::push_write_byte(&mut cmd, 0x20 << 1);
        link.write(&cmd).unwrap();
        assert!(control.in_transaction());

        cmd.clear();
        mpsse::push_stop(&mut cmd);
        link.write(&cmd).unwrap();
        assert!(!control.in_transaction());

        let mut reply = [0xFFu8; 1];
        assert_eq!(link.read(&mut reply).unwrap(), 1);
        assert!(!mpsse::is_nack(reply[0]));

        let stats = control.stats();
        assert_eq!((stats.starts, stats.stops, stats.nacks), (1, 1, 0));
    }

    #[test]
    fn test_missing_target_nacks() {
        let mut link = mpsse_link();
        let mut cmd = Vec::new();
        mpsse::push_start(&mut cmd);
        mpsse::push_write_byte(&mut cmd, 0x21 << 1);
        link.write(&cmd).unwrap();

        let mut reply = [0u8; 1];
        link.read(&mut reply).unwrap();
        assert!(mpsse::is_nack(reply[0]));
        assert_eq!(link.control().stats().nacks, 1);
    }

    #[test]
    fn test_short_reads() {
        let mut link = mpsse_link().with_transfer_limits(64, 2);
        link.write(&[0xAA, 0xAB]).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(link.read(&mut buf).unwrap(), 2);
        assert_eq!(link.read(&mut buf[2..]).unwrap(), 2);
        assert_eq!(buf, [0xFA, 0xAA, 0xFA, 0xAB]);
    }

    #[test]
    fn test_port_targets_need_selection() {
        let mut link = SimLink::new().with_mux(0x70).with_dac(1, 0x60);
        link.set_bitmode(0, BitMode::Mpsse).unwrap();

        let probe = |link: &mut SimLink| {
            let mut cmd = Vec::new();
            mpsse::push_start(&mut cmd);
            mpsse::push_write_byte(&mut cmd, 0x60 << 1);
            mpsse::push_stop(&mut cmd);
            link.write(&cmd).unwrap();
            let mut reply = [0u8; 1];
            link.read(&mut reply).unwrap();
            !mpsse::is_nack(reply[0])
        };

        assert!(!probe(&mut link));

        let mut cmd = Vec::new();
        mpsse::push_start(&mut cmd);
        mpsse::push_write_byte(&mut cmd, 0x70 << 1);
        mpsse::push_write_byte(&mut cmd, 0x02);
        mpsse::push_stop(&mut cmd);
        link.write(&cmd).unwrap();
        let mut acks = [0u8; 2];
        link.read(&mut acks).unwrap();
        assert_eq!(link.control().mux_control(), Some(0x02));

        assert!(probe(&mut link));
    }
}
