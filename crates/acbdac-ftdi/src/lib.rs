//! acbdac-ftdi - FTDI bridge link for the ACB
//!
//! Opens an FTDI high-speed bridge through libftdi1 and exposes it as an
//! [`MpsseLink`](acbdac_core::link::MpsseLink). Bit mode, clock setup and
//! the I2C framing are handled by `acbdac-core`; this crate only moves bytes.
//!
//! # Supported Devices
//!
//! - FTDI FT232H (single channel, the ACB's own bridge)
//! - FTDI FT2232H (dual channel)
//! - FTDI FT4232H (quad channel)
//!
//! # Example
//!
//! ```no_run
//! use acbdac_core::board::Board;
//! use acbdac_core::config::BoardConfig;
//! use acbdac_core::pinmap::PinMap;
//! use acbdac_ftdi::{FtdiConfig, FtdiLink};
//!
//! let link = FtdiLink::open(&FtdiConfig::default())?;
//! let mut board = Board::open(link, BoardConfig::default(), PinMap::acb()?)?;
//! println!("{}", board.initialize()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Link Options
//!
//! - `type=<device>` - Bridge type (232h, 2232h, 4232h; default: 232h)
//! - `port=<A|B|C|D>` - Channel to use (default: A)
//! - `latency=<ms>` - USB latency timer, 1-255 (default: 2)

mod device;
mod error;
mod protocol;

pub use device::{list_devices, parse_options, FtdiConfig, FtdiDeviceInfo, FtdiLink};
pub use error::{FtdiError, Result};
pub use protocol::{FtdiDeviceType, FtdiInterface, SUPPORTED_DEVICES};
