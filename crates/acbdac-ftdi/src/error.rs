//! Error types for the FTDI link

use thiserror::Error;

/// Result type for FTDI operations
pub type Result<T> = std::result::Result<T, FtdiError>;

/// Errors that can occur while opening or driving the bridge
#[derive(Debug, Error)]
pub enum FtdiError {
    /// Failed to open device
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// USB transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// Failed to configure device
    #[error("failed to configure device: {0}")]
    ConfigFailed(String),

    /// Unknown bridge type
    #[error("invalid device type: {0}")]
    InvalidDeviceType(String),

    /// Invalid channel/port selection
    #[error("invalid channel: {0}")]
    InvalidChannel(String),

    /// Invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// USB enumeration error
    #[error("USB error: {0}")]
    UsbError(#[from] nusb::Error),
}

impl From<FtdiError> for acbdac_core::Error {
    fn from(e: FtdiError) -> Self {
        acbdac_core::Error::Link(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_keeps_message() {
        let err: acbdac_core::Error = FtdiError::OpenFailed("device busy".into()).into();
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "link error: failed to open device: device busy"
        );
    }
}
