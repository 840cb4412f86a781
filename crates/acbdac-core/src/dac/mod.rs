//! DAC register layer
//!
//! Every test point on the board is driven by an MCP4728. The board layer
//! only needs a handful of operations from it: presence probe, single
//! channel write and register read-back.

pub mod mcp4728;

pub use mcp4728::{
    code_from_normalized, normalized_from_code, ChannelConfig, ChannelRegisters, ChannelState,
    Gain, Mcp4728, PowerDown, Status, Vref, RESOLUTION_MAX,
};
