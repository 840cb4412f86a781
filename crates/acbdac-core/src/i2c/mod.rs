//! I2C master protocol
//!
//! [`mpsse`] holds the fixed command-byte table; [`engine`] drives it as a
//! state machine over an [`MpsseLink`](crate::link::MpsseLink).

mod engine;
pub mod mpsse;

pub use engine::{
    BusGuard, BusState, Direction, EngineSettings, I2cEngine, StopCondition, SCAN_FIRST,
    SCAN_LAST,
};
