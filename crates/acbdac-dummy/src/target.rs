//! Emulated I2C targets

use acbdac_core::types::SubChannel;

/// A device on the simulated bus
///
/// The bus calls [`start`](Self::start) once the target's address byte has
/// been acknowledged, then `write` or `read` per byte, then `stop` on STOP
/// or repeated START.
pub trait I2cTarget: Send {
    /// 7-bit bus address
    fn address(&self) -> u8;

    /// Addressed for a write (`read == false`) or a read
    fn start(&mut self, read: bool);

    /// Byte from the master; returns whether to ACK it
    fn write(&mut self, byte: u8) -> bool;

    /// Next byte for the master
    fn read(&mut self) -> u8;

    /// End of the message
    fn stop(&mut self);
}

/// Acknowledges its address and reads back 0xFF
///
/// Data bytes are acknowledged too, unless a limit is set with
/// [`with_nack_after`](Self::with_nack_after).
#[derive(Debug, Clone)]
pub struct AckTarget {
    address: u8,
    accept: Option<usize>,
    written: usize,
}

impl AckTarget {
    /// Target at `address`
    pub fn new(address: u8) -> Self {
        Self {
            address,
            accept: None,
            written: 0,
        }
    }

    /// ACK only the first `bytes` data bytes of each write
    pub fn with_nack_after(mut self, bytes: usize) -> Self {
        self.accept = Some(bytes);
        self
    }
}

impl I2cTarget for AckTarget {
    fn address(&self) -> u8 {
        self.address
    }

    fn start(&mut self, _read: bool) {
        self.written = 0;
    }

    fn write(&mut self, _byte: u8) -> bool {
        self.written += 1;
        self.accept.map_or(true, |accept| self.written <= accept)
    }

    fn read(&mut self) -> u8 {
        0xFF
    }

    fn stop(&mut self) {}
}

/// TCA9548A control register
#[derive(Debug, Clone)]
pub struct SimTca9548a {
    address: u8,
    control: u8,
}

impl SimTca9548a {
    /// Multiplexer at `address` with every port disconnected
    pub fn new(address: u8) -> Self {
        Self {
            address,
            control: 0,
        }
    }

    /// Current control register
    pub fn control(&self) -> u8 {
        self.control
    }

    /// Whether `port` is connected
    pub fn is_connected(&self, port: u8) -> bool {
        port < 8 && self.control & (1 << port) != 0
    }
}

impl I2cTarget for SimTca9548a {
    fn address(&self) -> u8 {
        self.address
    }

    fn start(&mut self, _read: bool) {}

    fn write(&mut self, byte: u8) -> bool {
        // Takes effect immediately; the last byte of a message wins
        self.control = byte;
        true
    }

    fn read(&mut self) -> u8 {
        self.control
    }

    fn stop(&mut self) {}
}

/// One MCP4728 register: upper config nibble and 12-bit code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimRegister {
    /// VREF, PD1, PD0, GX in bits 7-4
    pub config: u8,
    /// DAC code
    pub code: u16,
}

/// MCP4728 with Multi-Write, Single Write and register read-back
#[derive(Debug, Clone)]
pub struct SimMcp4728 {
    address: u8,
    input: [SimRegister; 4],
    eeprom: [SimRegister; 4],
    rx: Vec<u8>,
    read_pos: usize,
    writes: usize,
}

impl SimMcp4728 {
    /// Chip at `address` with every register cleared
    pub fn new(address: u8) -> Self {
        Self {
            address,
            input: [SimRegister::default(); 4],
            eeprom: [SimRegister::default(); 4],
            rx: Vec::new(),
            read_pos: 0,
            writes: 0,
        }
    }

    /// Live input register of one output
    pub fn input(&self, output: SubChannel) -> SimRegister {
        self.input[output.index() as usize]
    }

    /// EEPROM copy of one output
    pub fn eeprom(&self, output: SubChannel) -> SimRegister {
        self.eeprom[output.index() as usize]
    }

    /// Channel updates applied so far
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn status(&self, channel: usize) -> u8 {
        // RDY and POR set, channel id, address pins
        0xC0 | ((channel as u8) << 4) | (self.address & 0x07)
    }

    fn register_bytes(&self, index: usize) -> u8 {
        let channel = index / 6;
        let reg = if index % 6 < 3 {
            self.input[channel]
        } else {
            self.eeprom[channel]
        };
        match index % 3 {
            0 => self.status(channel),
            1 => reg.config | (reg.code >> 8) as u8,
            _ => (reg.code & 0xFF) as u8,
        }
    }

    /// Apply a complete 3-byte write frame
    fn apply(&mut self, frame: [u8; 3]) {
        let channel = ((frame[0] >> 1) & 0x03) as usize;
        let reg = SimRegister {
            config: frame[1] & 0xF0,
            code: (((frame[1] & 0x0F) as u16) << 8) | frame[2] as u16,
        };
        match frame[0] & 0xF8 {
            // Multi-Write
            0x40 => self.input[channel] = reg,
            // Single Write also programs EEPROM
            0x58 => {
                self.input[channel] = reg;
                self.eeprom[channel] = reg;
            }
            other => {
                log::debug!("SimMcp4728 0x{:02X}: ignoring command 0x{:02X}", self.address, other);
                return;
            }
        }
        self.writes += 1;
    }
}

impl I2cTarget for SimMcp4728 {
    fn address(&self) -> u8 {
        self.address
    }

    fn start(&mut self, read: bool) {
        self.rx.clear();
        if read {
            self.read_pos = 0;
        }
    }

    fn write(&mut self, byte: u8) -> bool {
        self.rx.push(byte);
        if self.rx.len() == 3 {
            let frame = [self.rx[0], self.rx[1], self.rx[2]];
            self.rx.clear();
            self.apply(frame);
        }
        true
    }

    fn read(&mut self) -> u8 {
        let byte = self.register_bytes(self.read_pos % 24);
        self.read_pos += 1;
        byte
    }

    fn stop(&mut self) {
        if !self.rx.is_empty() {
            log::debug!(
                "SimMcp4728 0x{:02X}: dropping {} trailing byte(s)",
                self.address,
                self.rx.len()
            );
            self.rx.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mcp4728_multi_write() {
        let mut dac = SimMcp4728::new(0x61);
        dac.start(false);
        for b in [0x42, 0x98, 0x00] {
            assert!(dac.write(b));
        }
        dac.stop();
        let reg = dac.input(SubChannel::B);
        assert_eq!(reg.code, 0x800);
        assert_eq!(reg.config, 0x90);
        assert_eq!(dac.eeprom(SubChannel::B), SimRegister::default());
        assert_eq!(dac.writes(), 1);
    }

    #[test]
    fn test_mcp4728_readback_layout() {
        let mut dac = SimMcp4728::new(0x63);
        dac.start(false);
        for b in [0x58, 0x01, 0x23] {
            dac.write(b);
        }
        dac.stop();

        dac.start(true);
        let bytes: Vec<u8> = (0..24).map(|_| dac.read()).collect();
        assert_eq!(&bytes[..6], &[0xC3, 0x01, 0x23, 0xC3, 0x01, 0x23]);
        assert_eq!(bytes[6], 0xD3);
        assert_eq!(bytes[18], 0xF3);
    }

    #[test]
    fn test_mux_control() {
        let mut mux = SimTca9548a::new(0x70);
        mux.start(false);
        mux.write(0x04);
        mux.stop();
        assert!(mux.is_connected(2));
        assert!(!mux.is_connected(0));
        assert_eq!(mux.read(), 0x04);
    }
}
