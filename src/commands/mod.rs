//! CLI command implementations
//!
//! Listing commands work without a board. Everything else runs against a
//! [`Board`](acbdac_core::board::Board) opened over the selected link.

mod board;
mod list;

pub use board::{run_channels, run_get, run_probe, run_regs, run_scan, run_set, SetValue};
pub use list::{list_devices, list_links};
