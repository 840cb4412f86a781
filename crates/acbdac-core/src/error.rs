//! Error types for acbdac-core

use thiserror::Error;

use crate::config::ConfigError;
use crate::i2c::Direction;
use crate::pinmap::PinMapError;
use crate::types::{DeviceAddress, LogicalBusId};

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    // Addressing errors
    /// Channel name is not in the pin map
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    /// Registry slot is absent or was never probed
    #[error("no DAC present on {bus} at address {address}")]
    DeviceNotPresent {
        /// Logical bus of the slot
        bus: LogicalBusId,
        /// Device address of the slot
        address: DeviceAddress,
    },

    /// Multiplexer port does not exist
    #[error("invalid logical bus {0}: multiplexer has ports 0-7")]
    InvalidBus(u8),

    /// Address outside the MCP4728 range
    #[error("invalid DAC address 0x{0:02X}: must be 0x60-0x67")]
    InvalidAddress(u8),

    /// Output label is not A-D
    #[error("invalid DAC output '{0}': must be A, B, C or D")]
    InvalidSubChannel(String),

    // Wire errors
    /// Control write to the multiplexer failed
    #[error("failed to select {bus} on the multiplexer: {source}")]
    BusSelectFailed {
        /// Bus that was being selected
        bus: LogicalBusId,
        /// Underlying wire error
        #[source]
        source: Box<Error>,
    },

    /// Multiplexer read-back did not match the control byte just written
    #[error("multiplexer read back 0x{actual:02X}, expected 0x{expected:02X}")]
    MuxReadbackMismatch {
        /// Control byte written
        expected: u8,
        /// Control byte read back
        actual: u8,
    },

    /// No target acknowledged the address byte
    #[error("no ACK from address 0x{address:02X}")]
    NoAck {
        /// 7-bit address that was not acknowledged
        address: u8,
    },

    /// Target stopped acknowledging part way through a write
    #[error("NACK from 0x{address:02X} after {written} data byte(s)")]
    DataNack {
        /// 7-bit target address
        address: u8,
        /// Data bytes acknowledged before the NACK
        written: usize,
    },

    /// Bridge did not return the expected byte count before the deadline
    #[error("{op} at 0x{address:02X} timed out: {received} of {requested} byte(s) received")]
    ReadTimeout {
        /// 7-bit target address
        address: u8,
        /// Transfer that stalled
        op: Direction,
        /// Bytes the caller asked to read (0 for writes)
        requested: usize,
        /// Bytes that arrived before the deadline
        received: usize,
    },

    /// Wire error from a transaction on a multiplexed bus
    #[error("{bus}: {source}")]
    OnBus {
        /// Bus that was selected
        bus: LogicalBusId,
        /// Underlying wire error
        #[source]
        source: Box<Error>,
    },

    /// Bridge rejected an MPSSE command
    #[error("bridge rejected MPSSE command 0x{0:02X}")]
    BadCommand(u8),

    /// Transaction lock is already held
    #[error("I2C transaction lock is held by another operation")]
    LockContention,

    /// Transport-level failure on the bridge link
    #[error("link error: {0}")]
    Link(String),

    // Device errors
    /// Value outside the accepted range (nothing was written)
    #[error("value {value} out of range {min}..={max}")]
    ValueOutOfRange {
        /// Rejected value
        value: f64,
        /// Inclusive lower bound
        min: f64,
        /// Inclusive upper bound
        max: f64,
    },

    /// Register read-back does not look like an MCP4728
    #[error("unexpected response from 0x{address:02X}: {reason}")]
    UnexpectedResponse {
        /// 7-bit device address
        address: u8,
        /// What did not match
        reason: &'static str,
    },

    // Configuration errors
    /// Pin map construction or loading failed
    #[error(transparent)]
    PinMap(#[from] PinMapError),

    /// Board configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether a caller may reasonably retry the failed operation
    ///
    /// Selection failures, timeouts, link hiccups and lock contention can be
    /// transient. Missing devices and caller errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            Error::BusSelectFailed { .. }
                | Error::ReadTimeout { .. }
                | Error::Link(_)
                | Error::LockContention
        )
    }

    /// Whether this error means a target did not answer its address
    pub fn is_no_ack(&self) -> bool {
        matches!(self.kind(), Error::NoAck { .. })
    }

    /// The error with any bus context stripped
    pub fn kind(&self) -> &Error {
        match self {
            Error::OnBus { source, .. } => source.kind(),
            other => other,
        }
    }

    /// Bus the error happened on, if known
    pub fn bus(&self) -> Option<LogicalBusId> {
        match self {
            Error::OnBus { bus, .. } | Error::BusSelectFailed { bus, .. } => Some(*bus),
            _ => None,
        }
    }

    /// Attach `bus` to a wire error; other errors pass through unchanged
    pub(crate) fn on_bus(self, bus: LogicalBusId) -> Self {
        match self {
            Error::NoAck { .. }
            | Error::DataNack { .. }
            | Error::ReadTimeout { .. }
            | Error::BadCommand(_)
            | Error::Link(_)
            | Error::UnexpectedResponse { .. } => Error::OnBus {
                bus,
                source: Box::new(self),
            },
            other => other,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Link(e.to_string())
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
