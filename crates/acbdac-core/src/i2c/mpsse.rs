//! MPSSE command encoding for an I2C master
//!
//! Based on the FTDI application note AN_255 and the MPSSE command set.
//! The FT232H has no I2C peripheral; SCL and SDA are driven by pin writes
//! and byte/bit shift commands, with AD1 (SDA out) and AD2 (SDA in) tied
//! together on the board.
//!
//! Every sequence the engine emits is built here so the wire format can be
//! audited in one place:
//!
//! | Sequence             | Bytes                                          |
//! |----------------------|------------------------------------------------|
//! | idle                 | `80 03 03`                                     |
//! | start                | `80 01 03` x4, `80 00 03` x4                   |
//! | repeated start       | `80 02 03` x4, `80 03 03` x4, start            |
//! | stop                 | `80 00 03` x4, `80 01 03` x4, `80 03 03` x4    |
//! | write byte + ACK     | `80 00 03`, `11 00 00 bb`, `80 00 01`, `22 00`, `87` |
//! | release SDA          | `80 00 01`                                     |
//! | read byte (not last) | `20 00 00`, `80 00 03`, `13 00 00`, `80 00 01` |
//! | read byte (last)     | `20 00 00`, `80 00 03`, `13 00 FF`, `80 02 03` |
//! | flush                | `87`                                           |

// ============================================================================
// MPSSE Commands
// ============================================================================

/// Write bytes (clock data out)
pub const MPSSE_DO_WRITE: u8 = 0x10;

/// Read bytes (clock data in on the rising edge)
pub const MPSSE_DO_READ: u8 = 0x20;

/// Write on negative clock edge
pub const MPSSE_WRITE_NEG: u8 = 0x01;

/// Bit mode (transfer bits instead of bytes)
pub const MPSSE_BITMODE: u8 = 0x02;

/// Clock bytes out on the falling edge, MSB first
pub const WRITE_BYTES_NVE_MSB: u8 = MPSSE_DO_WRITE | MPSSE_WRITE_NEG;

/// Clock bits out on the falling edge, MSB first
pub const WRITE_BITS_NVE_MSB: u8 = MPSSE_DO_WRITE | MPSSE_WRITE_NEG | MPSSE_BITMODE;

/// Clock bytes in on the rising edge, MSB first
pub const READ_BYTES_PVE_MSB: u8 = MPSSE_DO_READ;

/// Clock bits in on the rising edge, MSB first
pub const READ_BITS_PVE_MSB: u8 = MPSSE_DO_READ | MPSSE_BITMODE;

/// Set data bits low byte
pub const SET_BITS_LOW: u8 = 0x80;

/// Disable loopback mode
pub const LOOPBACK_END: u8 = 0x85;

/// Set clock divisor
pub const TCK_DIVISOR: u8 = 0x86;

/// Send immediate (flush buffers)
pub const SEND_IMMEDIATE: u8 = 0x87;

/// Disable divide-by-5 prescaler (60 MHz clock)
pub const DIS_DIV_5: u8 = 0x8A;

/// Enable 3-phase clocking (for I2C)
pub const EN_3_PHASE: u8 = 0x8C;

/// Disable adaptive clocking
pub const CLK_NO_ADAPTIVE: u8 = 0x97;

/// Drive-zero mode: listed pins only ever pull low (open drain)
pub const DRIVE_ZERO: u8 = 0x9E;

/// Deliberately invalid opcode used to synchronise with the engine
pub const SYNC_PROBE: u8 = 0xAB;

/// Prefix of the engine's reply to an unknown opcode
pub const BAD_COMMAND: u8 = 0xFA;

// ============================================================================
// Pin assignments (low byte)
//
// SCL is bit 0 (TCK/SK).
// SDA out is bit 1 (TDI/DO).
// SDA in is bit 2 (TDO/DI).
// ============================================================================

/// SCL pin
pub const PIN_SCL: u8 = 1 << 0;

/// SDA output pin
pub const PIN_SDA_OUT: u8 = 1 << 1;

/// SDA input pin
pub const PIN_SDA_IN: u8 = 1 << 2;

/// Direction with SCL and SDA both driven
pub const DIR_DRIVE: u8 = PIN_SCL | PIN_SDA_OUT;

/// Direction with SDA released to the target
pub const DIR_RELEASE_SDA: u8 = PIN_SCL;

/// Number of times each line state is repeated to meet hold times
pub const HOLD_REPEAT: usize = 4;

/// Clock the 3-phase divisor is derived from (60 MHz x 2/3)
const THREE_PHASE_BASE_HZ: u32 = 40_000_000;

const IDLE: [u8; 3] = [SET_BITS_LOW, PIN_SCL | PIN_SDA_OUT, DIR_DRIVE];
const DATA_LOW: [u8; 3] = [SET_BITS_LOW, PIN_SCL, DIR_DRIVE];
const CLK_LOW_DATA_LOW: [u8; 3] = [SET_BITS_LOW, 0x00, DIR_DRIVE];
const CLK_LOW_DATA_HIGH: [u8; 3] = [SET_BITS_LOW, PIN_SDA_OUT, DIR_DRIVE];
const CLK_LOW_DATA_INPUT: [u8; 3] = [SET_BITS_LOW, 0x00, DIR_RELEASE_SDA];

/// ACK bit value as clocked out by the master
const ACK: u8 = 0x00;

/// NACK bit value as clocked out by the master
const NACK: u8 = 0xFF;

/// Clock divisor for a target SCL frequency with 3-phase clocking enabled
pub fn divisor_for(frequency_hz: u32) -> u16 {
    let frequency_hz = frequency_hz.max(1);
    let div = (THREE_PHASE_BASE_HZ / (2 * frequency_hz)).saturating_sub(1);
    div.min(u16::MAX as u32) as u16
}

fn repeat(buf: &mut Vec<u8>, seq: &[u8; 3], count: usize) {
    for _ in 0..count {
        buf.extend_from_slice(seq);
    }
}

/// One-time I2C master configuration after entering MPSSE mode
pub fn push_init(buf: &mut Vec<u8>, divisor: u16) {
    buf.push(DIS_DIV_5);
    buf.push(CLK_NO_ADAPTIVE);
    buf.push(EN_3_PHASE);
    // Open drain on SCL, SDA out and SDA in
    buf.extend_from_slice(&[DRIVE_ZERO, PIN_SCL | PIN_SDA_OUT | PIN_SDA_IN, 0x00]);
    buf.push(TCK_DIVISOR);
    buf.push((divisor & 0xFF) as u8);
    buf.push(((divisor >> 8) & 0xFF) as u8);
    buf.push(LOOPBACK_END);
    buf.extend_from_slice(&IDLE);
}

/// Both lines released high
pub fn push_idle(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&IDLE);
}

/// START: SDA falls while SCL is high, then SCL goes low
pub fn push_start(buf: &mut Vec<u8>) {
    repeat(buf, &DATA_LOW, HOLD_REPEAT);
    repeat(buf, &CLK_LOW_DATA_LOW, HOLD_REPEAT);
}

/// Repeated START from a held bus
pub fn push_repeated_start(buf: &mut Vec<u8>) {
    repeat(buf, &CLK_LOW_DATA_HIGH, HOLD_REPEAT);
    repeat(buf, &IDLE, HOLD_REPEAT);
    push_start(buf);
}

/// STOP: SCL rises with SDA low, then SDA rises
pub fn push_stop(buf: &mut Vec<u8>) {
    repeat(buf, &CLK_LOW_DATA_LOW, HOLD_REPEAT);
    repeat(buf, &DATA_LOW, HOLD_REPEAT);
    repeat(buf, &IDLE, HOLD_REPEAT);
}

/// Shift one byte out and clock in the target's ACK bit
///
/// The bridge answers with one byte whose bit 0 is set on NACK.
pub fn push_write_byte(buf: &mut Vec<u8>, byte: u8) {
    buf.extend_from_slice(&CLK_LOW_DATA_LOW);
    buf.extend_from_slice(&[WRITE_BYTES_NVE_MSB, 0x00, 0x00, byte]);
    buf.extend_from_slice(&CLK_LOW_DATA_INPUT);
    buf.extend_from_slice(&[READ_BITS_PVE_MSB, 0x00]);
    buf.push(SEND_IMMEDIATE);
}

/// Hand SDA to the target ahead of a read
pub fn push_release_sda(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&CLK_LOW_DATA_INPUT);
}

/// Clock one byte in, then ACK it (or NACK it if it is the last one)
pub fn push_read_byte(buf: &mut Vec<u8>, last: bool) {
    buf.extend_from_slice(&[READ_BYTES_PVE_MSB, 0x00, 0x00]);
    buf.extend_from_slice(&CLK_LOW_DATA_LOW);
    buf.extend_from_slice(&[WRITE_BITS_NVE_MSB, 0x00, if last { NACK } else { ACK }]);
    if last {
        buf.extend_from_slice(&CLK_LOW_DATA_HIGH);
    } else {
        buf.extend_from_slice(&CLK_LOW_DATA_INPUT);
    }
}

/// Flush the bridge's reply buffer back to the host
pub fn push_flush(buf: &mut Vec<u8>) {
    buf.push(SEND_IMMEDIATE);
}

/// Whether an ACK reply byte reports a NACK
pub fn is_nack(reply: u8) -> bool {
    reply & 0x01 != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divisor() {
        assert_eq!(divisor_for(100_000), 199);
        assert_eq!(divisor_for(400_000), 49);
        assert_eq!(divisor_for(0), u16::MAX);
    }

    #[test]
    fn test_init_sequence() {
        let mut buf = Vec::new();
        push_init(&mut buf, 199);
        assert_eq!(
            buf,
            [0x8A, 0x97, 0x8C, 0x9E, 0x07, 0x00, 0x86, 0xC7, 0x00, 0x85, 0x80, 0x03, 0x03]
        );
    }

    #[test]
    fn test_start_stop_framing() {
        let mut buf = Vec::new();
        push_start(&mut buf);
        assert_eq!(buf.len(), 2 * HOLD_REPEAT * 3);
        assert_eq!(&buf[..3], &[0x80, 0x01, 0x03]);
        assert_eq!(&buf[buf.len() - 3..], &[0x80, 0x00, 0x03]);

        buf.clear();
        push_stop(&mut buf);
        assert_eq!(&buf[buf.len() - 3..], &[0x80, 0x03, 0x03]);
    }

    #[test]
    fn test_write_byte_layout() {
        let mut buf = Vec::new();
        push_write_byte(&mut buf, 0xC2);
        assert_eq!(
            buf,
            [0x80, 0x00, 0x03, 0x11, 0x00, 0x00, 0xC2, 0x80, 0x00, 0x01, 0x22, 0x00, 0x87]
        );
    }

    #[test]
    fn test_read_byte_ack_nack() {
        let mut buf = Vec::new();
        push_read_byte(&mut buf, false);
        assert_eq!(&buf[6..9], &[0x13, 0x00, 0x00]);

        buf.clear();
        push_read_byte(&mut buf, true);
        assert_eq!(&buf[6..9], &[0x13, 0x00, 0xFF]);
        assert_eq!(&buf[9..], &[0x80, 0x02, 0x03]);
    }

    #[test]
    fn test_nack_bit() {
        assert!(!is_nack(0x00));
        assert!(is_nack(0x01));
        assert!(!is_nack(0xFE));
    }
}
