//! Raw byte channel to the MPSSE bridge
//!
//! The I2C engine never talks USB itself. It writes MPSSE command bytes to a
//! link and reads back whatever the bridge clocked in. Real hardware is
//! provided by `acbdac-ftdi`, the simulator by `acbdac-dummy`.

use crate::error::Result;

/// FTDI bit modes used during bridge bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitMode {
    /// Return all pins to their reset configuration
    Reset,
    /// Hand the pins to the MPSSE engine
    Mpsse,
}

/// Bidirectional byte channel to a bridge in MPSSE mode
///
/// The channel is stateless: it moves bytes and nothing else. Framing and
/// bus state live in [`crate::i2c::I2cEngine`].
pub trait MpsseLink {
    /// Write all of `data` to the bridge
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read up to `buf.len()` bytes
    ///
    /// Returns the number of bytes read, which may be zero when the bridge
    /// has nothing queued yet.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Switch the bridge's bit mode
    fn set_bitmode(&mut self, mask: u8, mode: BitMode) -> Result<()>;

    /// Reset the bridge
    fn reset(&mut self) -> Result<()>;

    /// Largest number of bytes a single [`read`](Self::read) can return
    fn max_transfer(&self) -> usize {
        64
    }

    /// Drop anything the bridge has queued for the host
    fn purge_rx(&mut self) -> Result<()> {
        let mut scratch = [0u8; 64];
        while self.read(&mut scratch)? > 0 {}
        Ok(())
    }
}

impl<T: MpsseLink + ?Sized> MpsseLink for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn set_bitmode(&mut self, mask: u8, mode: BitMode) -> Result<()> {
        (**self).set_bitmode(mask, mode)
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn max_transfer(&self) -> usize {
        (**self).max_transfer()
    }

    fn purge_rx(&mut self) -> Result<()> {
        (**self).purge_rx()
    }
}
