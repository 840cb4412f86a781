//! acbdac-core - Channel addressing and I2C transactions for the ACB DAC array
//!
//! The analog control board (ACB) exposes up to 96 test points. Each test
//! point is driven by one output of an MCP4728 quad DAC. The DACs sit on
//! three I2C networks fanned out by a TCA9548A multiplexer, and the whole
//! tree hangs off a single FTDI bridge running its MPSSE engine as an I2C
//! master.
//!
//! The crate is layered from the wire up:
//!
//! - [`link`] - the raw byte channel to the bridge (`MpsseLink`)
//! - [`i2c`] - the I2C master state machine encoded as MPSSE commands
//! - [`mux`] - TCA9548A logical bus selection
//! - [`dac`] - the MCP4728 register codec
//! - [`registry`] - which (bus, address) slots are populated
//! - [`pinmap`] - channel names to (bus, address, output) triples
//! - [`board`] - the context object that owns all of the above
//!
//! # Example
//!
//! ```ignore
//! use acbdac_core::board::Board;
//! use acbdac_core::config::BoardConfig;
//! use acbdac_core::pinmap::PinMap;
//!
//! fn drive<L: acbdac_core::link::MpsseLink>(link: L) -> acbdac_core::Result<()> {
//!     let mut board = Board::open(link, BoardConfig::default(), PinMap::acb()?)?;
//!     let report = board.initialize()?;
//!     println!("{}", report);
//!
//!     let out = board.output("SPI0_CS0_IN4")?;
//!     out.set_normalized(0.5)?;
//!     println!("readback: {:.4}", out.read_normalized()?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod board;
pub mod config;
pub mod dac;
pub mod error;
pub mod i2c;
pub mod link;
pub mod mux;
pub mod pinmap;
pub mod registry;
pub mod types;

pub use error::{Error, Result};
