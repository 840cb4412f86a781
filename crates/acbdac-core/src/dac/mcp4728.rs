//! MCP4728 quad 12-bit DAC
//!
//! Only the commands needed to drive one output at a time are implemented:
//! Multi-Write to set a channel's input register, and the 24-byte register
//! read-back.
//!
//! Multi-Write frame (one channel):
//!
//! ```text
//! byte 0: 0 1 0 0 0 DAC1 DAC0 /UDAC
//! byte 1: VREF PD1 PD0 GX D11 D10 D9 D8
//! byte 2: D7 D6 D5 D4 D3 D2 D1 D0
//! ```
//!
//! Read-back is six bytes per channel in A-D order: the input register
//! `[status, hi, lo]` followed by its EEPROM copy in the same layout.

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::i2c::BusGuard;
use crate::link::MpsseLink;
use crate::types::{DeviceAddress, SubChannel};

/// Largest DAC code
pub const RESOLUTION_MAX: u16 = 0x0FFF;

/// Multi-Write command prefix
pub const CMD_MULTI_WRITE: u8 = 0x40;

/// Bytes returned by a full register read
pub const READBACK_LEN: usize = 24;

/// Bytes per channel in a register read
const CHANNEL_STRIDE: usize = 6;

bitflags! {
    /// Status bits in the first byte of each read-back record
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        /// EEPROM write finished (RDY/BSY high)
        const READY = 1 << 7;
        /// Power-on reset seen since the last write
        const POR   = 1 << 6;
    }
}

/// Voltage reference selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Vref {
    /// Full scale is VDD
    #[default]
    Vdd,
    /// Internal 2.048 V reference
    Internal,
}

/// Output gain (only applies with the internal reference)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    /// x1
    #[default]
    X1,
    /// x2
    X2,
}

/// Power-down mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerDown {
    /// Output enabled
    #[default]
    Normal,
    /// Output pulled down through 1 kOhm
    Pulldown1k,
    /// Output pulled down through 100 kOhm
    Pulldown100k,
    /// Output pulled down through 500 kOhm
    Pulldown500k,
}

impl PowerDown {
    fn bits(&self) -> u8 {
        match self {
            PowerDown::Normal => 0b00,
            PowerDown::Pulldown1k => 0b01,
            PowerDown::Pulldown100k => 0b10,
            PowerDown::Pulldown500k => 0b11,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => PowerDown::Normal,
            0b01 => PowerDown::Pulldown1k,
            0b10 => PowerDown::Pulldown100k,
            _ => PowerDown::Pulldown500k,
        }
    }
}

/// Per-channel output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelConfig {
    /// Reference
    pub vref: Vref,
    /// Gain
    pub gain: Gain,
    /// Power-down mode
    pub power_down: PowerDown,
}

impl ChannelConfig {
    /// Upper nibble of the second Multi-Write / read-back byte
    fn config_bits(&self) -> u8 {
        let vref = match self.vref {
            Vref::Vdd => 0,
            Vref::Internal => 1,
        };
        let gain = match self.gain {
            Gain::X1 => 0,
            Gain::X2 => 1,
        };
        (vref << 7) | (self.power_down.bits() << 5) | (gain << 4)
    }

    fn from_config_bits(byte: u8) -> Self {
        Self {
            vref: if byte & 0x80 != 0 {
                Vref::Internal
            } else {
                Vref::Vdd
            },
            gain: if byte & 0x10 != 0 { Gain::X2 } else { Gain::X1 },
            power_down: PowerDown::from_bits(byte >> 5),
        }
    }
}

/// One register as reported by a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelState {
    /// DAC code (0-4095)
    pub code: u16,
    /// Output configuration
    pub config: ChannelConfig,
    /// Status bits
    pub status: Status,
}

/// Input register and EEPROM copy of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRegisters {
    /// Live input register
    pub input: ChannelState,
    /// Power-on defaults stored in EEPROM
    pub eeprom: ChannelState,
}

/// Convert a normalized value (0.0-1.0) to a DAC code
///
/// Out-of-range and non-finite values are rejected, never clamped.
pub fn code_from_normalized(value: f64) -> Result<u16> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::ValueOutOfRange {
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok((value * RESOLUTION_MAX as f64).round() as u16)
}

/// Convert a DAC code to a normalized value
pub fn normalized_from_code(code: u16) -> f64 {
    (code & RESOLUTION_MAX) as f64 / RESOLUTION_MAX as f64
}

/// Check a raw code fits the 12-bit range
pub fn check_code(code: u16) -> Result<u16> {
    if code > RESOLUTION_MAX {
        return Err(Error::ValueOutOfRange {
            value: code as f64,
            min: 0.0,
            max: RESOLUTION_MAX as f64,
        });
    }
    Ok(code)
}

/// Multi-Write frame updating one channel's output immediately
pub fn encode_multi_write(channel: SubChannel, code: u16, config: ChannelConfig) -> [u8; 3] {
    let code = code & RESOLUTION_MAX;
    [
        // /UDAC low: update the output without LDAC
        CMD_MULTI_WRITE | (channel.index() << 1),
        config.config_bits() | (code >> 8) as u8,
        (code & 0xFF) as u8,
    ]
}

fn decode_record(record: &[u8]) -> ChannelState {
    ChannelState {
        code: (((record[1] & 0x0F) as u16) << 8) | record[2] as u16,
        config: ChannelConfig::from_config_bits(record[1]),
        status: Status::from_bits_truncate(record[0]),
    }
}

/// Parse a full register read
///
/// Records must appear in A-D order with address bits matching `address`.
pub fn decode_readback(
    address: DeviceAddress,
    data: &[u8; READBACK_LEN],
) -> Result<[ChannelRegisters; 4]> {
    let mut registers = [ChannelRegisters {
        input: decode_record(&[0, 0, 0]),
        eeprom: decode_record(&[0, 0, 0]),
    }; 4];

    for (i, chunk) in data.chunks_exact(CHANNEL_STRIDE).enumerate() {
        let status = chunk[0];
        if ((status >> 4) & 0x03) as usize != i {
            return Err(Error::UnexpectedResponse {
                address: address.get(),
                reason: "channel records out of order",
            });
        }
        if status & 0x07 != address.pins() {
            return Err(Error::UnexpectedResponse {
                address: address.get(),
                reason: "address bits do not match",
            });
        }
        registers[i] = ChannelRegisters {
            input: decode_record(&chunk[..3]),
            eeprom: decode_record(&chunk[3..]),
        };
    }

    Ok(registers)
}

/// One MCP4728 on the currently selected bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mcp4728 {
    address: DeviceAddress,
}

impl Mcp4728 {
    /// Driver for the chip at `address`
    pub fn new(address: DeviceAddress) -> Self {
        Self { address }
    }

    /// Bus address
    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Whether the chip acknowledges its address
    pub fn probe<L: MpsseLink>(&self, guard: &mut BusGuard<'_, L>) -> Result<bool> {
        guard.probe(self.address.get())
    }

    /// Set one channel's input register and output
    pub fn write_channel<L: MpsseLink>(
        &self,
        guard: &mut BusGuard<'_, L>,
        channel: SubChannel,
        code: u16,
        config: ChannelConfig,
    ) -> Result<()> {
        let code = check_code(code)?;
        let frame = encode_multi_write(channel, code, config);
        log::trace!(
            "MCP4728 {} {} <- {:#05X} ({:?})",
            self.address,
            channel,
            code,
            config
        );
        guard.write(self.address.get(), &frame)
    }

    /// Read every channel's registers
    pub fn read_registers<L: MpsseLink>(
        &self,
        guard: &mut BusGuard<'_, L>,
    ) -> Result<[ChannelRegisters; 4]> {
        let mut data = [0u8; READBACK_LEN];
        guard.read_into(self.address.get(), &mut data)?;
        decode_readback(self.address, &data)
    }

    /// Read one channel's live input register
    pub fn read_channel<L: MpsseLink>(
        &self,
        guard: &mut BusGuard<'_, L>,
        channel: SubChannel,
    ) -> Result<ChannelState> {
        let registers = self.read_registers(guard)?;
        Ok(registers[channel.index() as usize].input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(a: u8) -> DeviceAddress {
        DeviceAddress::new(a).unwrap()
    }

    #[test]
    fn test_normalized_conversion() {
        assert_eq!(code_from_normalized(0.0).unwrap(), 0);
        assert_eq!(code_from_normalized(1.0).unwrap(), 4095);
        assert_eq!(code_from_normalized(0.5).unwrap(), 2048);
        assert!(code_from_normalized(1.0001).is_err());
        assert!(code_from_normalized(-0.01).is_err());
        assert!(code_from_normalized(f64::NAN).is_err());
        assert!((normalized_from_code(2048) - 0.5).abs() <= 1.0 / 4095.0);
    }

    #[test]
    fn test_raw_code_range() {
        assert_eq!(check_code(4095).unwrap(), 4095);
        assert!(matches!(
            check_code(4096),
            Err(Error::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_multi_write_frame() {
        assert_eq!(
            encode_multi_write(SubChannel::A, 0x800, ChannelConfig::default()),
            [0x40, 0x08, 0x00]
        );

        let config = ChannelConfig {
            vref: Vref::Internal,
            gain: Gain::X2,
            power_down: PowerDown::Pulldown100k,
        };
        assert_eq!(
            encode_multi_write(SubChannel::D, 0xABC, config),
            [0x46, 0xDA, 0xBC]
        );
    }

    #[test]
    fn test_decode_readback() {
        let mut data = [0u8; READBACK_LEN];
        for i in 0..4 {
            let status = 0x80 | ((i as u8) << 4) | 0x01;
            data[i * 6..i * 6 + 6].copy_from_slice(&[status, 0x00, 0x00, status, 0x00, 0x00]);
        }
        // Channel B: internal ref, gain x2, code 0x123
        data[7] = 0x91;
        data[8] = 0x23;

        let regs = decode_readback(addr(0x61), &data).unwrap();
        assert_eq!(regs[1].input.code, 0x123);
        assert_eq!(regs[1].input.config.vref, Vref::Internal);
        assert_eq!(regs[1].input.config.gain, Gain::X2);
        assert!(regs[1].input.status.contains(Status::READY));
        assert_eq!(regs[0].input.code, 0);
    }

    #[test]
    fn test_decode_rejects_foreign_chip() {
        let mut data = [0u8; READBACK_LEN];
        for i in 0..4 {
            let status = 0x80 | ((i as u8) << 4);
            data[i * 6] = status;
            data[i * 6 + 3] = status;
        }
        // Address bits say 0x60, we asked 0x62
        assert!(matches!(
            decode_readback(addr(0x62), &data),
            Err(Error::UnexpectedResponse { address: 0x62, .. })
        ));

        // Records swapped
        data.swap(0, 6);
        assert!(decode_readback(addr(0x60), &data).is_err());
    }
}
