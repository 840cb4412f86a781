//! FTDI bridge link
//!
//! [`FtdiLink`] wraps a libftdi1 device context. Opening it only claims the
//! interface and tunes USB latency; switching to MPSSE and programming the
//! I2C clock is done by the engine through the [`MpsseLink`] calls.

use std::fmt;
use std::io::{Read, Write};

use acbdac_core::error::Result as CoreResult;
use acbdac_core::link::{BitMode, MpsseLink};
use ftdi::{find_by_vid_pid, BitMode as FtdiBitMode, Device};

use crate::error::{FtdiError, Result};
use crate::protocol::*;

/// Configuration for opening a bridge
#[derive(Debug, Clone)]
pub struct FtdiConfig {
    /// Device type (determines VID/PID and channel count)
    pub device_type: FtdiDeviceType,
    /// Interface/channel to use (A, B, C, D)
    pub interface: FtdiInterface,
    /// USB latency timer in milliseconds
    pub latency_ms: u8,
}

impl Default for FtdiConfig {
    fn default() -> Self {
        Self::for_device(FtdiDeviceType::default())
    }
}

impl FtdiConfig {
    /// Config for a specific device type on channel A
    pub fn for_device(device_type: FtdiDeviceType) -> Self {
        FtdiConfig {
            device_type,
            interface: FtdiInterface::default(),
            latency_ms: DEFAULT_LATENCY_MS,
        }
    }

    /// Set the interface/channel
    pub fn interface(mut self, interface: FtdiInterface) -> Result<Self> {
        self.interface = interface;
        self.validate()?;
        Ok(self)
    }

    /// Set the USB latency timer
    pub fn latency(mut self, latency_ms: u8) -> Result<Self> {
        if latency_ms == 0 {
            return Err(FtdiError::InvalidParameter(
                "latency must be between 1 and 255 ms".to_string(),
            ));
        }
        self.latency_ms = latency_ms;
        Ok(self)
    }

    /// Check that the channel has an MPSSE engine on this part
    pub fn validate(&self) -> Result<()> {
        let channels = self.device_type.mpsse_channels();
        if self.interface.index() >= channels {
            return Err(FtdiError::InvalidChannel(format!(
                "channel {} has no MPSSE engine on {} (max: {})",
                self.interface.letter(),
                self.device_type.name(),
                (b'A' + channels - 1) as char
            )));
        }
        Ok(())
    }
}

/// MPSSE byte channel over libftdi1
pub struct FtdiLink {
    device: Device,
    device_type: FtdiDeviceType,
}

impl FtdiLink {
    /// Open a bridge with the given configuration
    pub fn open(config: &FtdiConfig) -> Result<Self> {
        config.validate()?;
        log::info!(
            "Opening FTDI {} channel {}",
            config.device_type.name(),
            config.interface.letter()
        );

        let vid = config.device_type.vendor_id();
        let pid = config.device_type.product_id();
        log::debug!("Looking for FTDI device VID={:04X} PID={:04X}", vid, pid);

        let mut device = find_by_vid_pid(vid, pid)
            .interface(config.interface.into())
            .open()
            .map_err(|e| FtdiError::OpenFailed(e.to_string()))?;

        device
            .set_latency_timer(config.latency_ms)
            .map_err(|e| FtdiError::ConfigFailed(format!("Set latency timer failed: {}", e)))?;

        log::debug!(
            "Opened FTDI device VID={:04X} PID={:04X}, latency {} ms",
            vid,
            pid,
            config.latency_ms
        );

        Ok(FtdiLink {
            device,
            device_type: config.device_type,
        })
    }

    /// Open the first FT232H on channel A
    pub fn open_first() -> Result<Self> {
        Self::open(&FtdiConfig::default())
    }

    /// Bridge type this link was opened as
    pub fn device_type(&self) -> FtdiDeviceType {
        self.device_type
    }

    /// Release I/O pins (set all as inputs)
    fn release_pins(&mut self) -> Result<()> {
        self.device
            .write_all(&[0x80, 0x00, 0x00])
            .map_err(|e| FtdiError::TransferFailed(format!("Write failed: {}", e)))
    }
}

impl Drop for FtdiLink {
    fn drop(&mut self) {
        if let Err(e) = self.release_pins() {
            log::warn!("Failed to release pins on close: {}", e);
        }
    }
}

impl MpsseLink for FtdiLink {
    fn write(&mut self, data: &[u8]) -> CoreResult<()> {
        self.device
            .write_all(data)
            .map_err(|e| FtdiError::TransferFailed(format!("Write failed: {}", e)))?;
        log::trace!("Sent {} bytes", data.len());
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        let len = buf.len().min(READ_CHUNK_SIZE);
        let n = self
            .device
            .read(&mut buf[..len])
            .map_err(|e| FtdiError::TransferFailed(format!("Read failed: {}", e)))?;
        if n > 0 {
            log::trace!("Received {} bytes", n);
        }
        Ok(n)
    }

    fn set_bitmode(&mut self, mask: u8, mode: BitMode) -> CoreResult<()> {
        let ftdi_mode = match mode {
            BitMode::Reset => FtdiBitMode::Reset,
            BitMode::Mpsse => FtdiBitMode::Mpsse,
        };
        self.device
            .set_bitmode(mask, ftdi_mode)
            .map_err(|e| FtdiError::ConfigFailed(format!("Set {:?} mode failed: {}", mode, e)))?;
        Ok(())
    }

    fn reset(&mut self) -> CoreResult<()> {
        self.device
            .usb_reset()
            .map_err(|e| FtdiError::ConfigFailed(format!("USB reset failed: {}", e)))?;
        Ok(())
    }

    fn max_transfer(&self) -> usize {
        READ_CHUNK_SIZE
    }

    fn purge_rx(&mut self) -> CoreResult<()> {
        self.device
            .usb_purge_rx_buffer()
            .map_err(|e| FtdiError::TransferFailed(format!("RX purge failed: {}", e)))?;
        Ok(())
    }
}

/// Information about a connected bridge
#[derive(Debug, Clone)]
pub struct FtdiDeviceInfo {
    /// USB bus number
    pub bus: u8,
    /// USB device address
    pub address: u8,
    /// Bridge type
    pub device_type: FtdiDeviceType,
    /// Vendor ID
    pub vendor_id: u16,
    /// Product ID
    pub product_id: u16,
    /// Serial number, if the descriptor carries one
    pub serial: Option<String>,
}

impl fmt::Display for FtdiDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FTDI {} at bus {} address {} ({:04X}:{:04X})",
            self.device_type.name(),
            self.bus,
            self.address,
            self.vendor_id,
            self.product_id
        )?;
        if let Some(serial) = &self.serial {
            write!(f, " serial {}", serial)?;
        }
        Ok(())
    }
}

/// List connected bridges the link can drive
pub fn list_devices() -> Result<Vec<FtdiDeviceInfo>> {
    let mut devices = Vec::new();

    for dev in nusb::list_devices()? {
        let vid = dev.vendor_id();
        let pid = dev.product_id();

        if let Some(info) = get_device_info(vid, pid) {
            devices.push(FtdiDeviceInfo {
                bus: dev.bus_number(),
                address: dev.device_address(),
                device_type: info.device_type,
                vendor_id: vid,
                product_id: pid,
                serial: dev.serial_number().map(str::to_string),
            });
        }
    }

    Ok(devices)
}

/// Parse link options
///
/// Format: "type=<type>,port=<A|B|C|D>,latency=<ms>"
pub fn parse_options(options: &[(&str, &str)]) -> Result<FtdiConfig> {
    let mut config = FtdiConfig::default();

    for (key, value) in options {
        match *key {
            "type" => {
                config.device_type = FtdiDeviceType::parse(value).ok_or_else(|| {
                    FtdiError::InvalidDeviceType(format!(
                        "Unknown device type '{}'. Valid types: 232h, 2232h, 4232h",
                        value
                    ))
                })?;
            }
            "port" | "channel" => {
                config.interface = FtdiInterface::parse(value).ok_or_else(|| {
                    FtdiError::InvalidChannel(format!(
                        "Invalid channel '{}': must be A, B, C, or D",
                        value
                    ))
                })?;
            }
            "latency" => {
                let latency: u8 = value.parse().map_err(|_| {
                    FtdiError::InvalidParameter(format!("Invalid latency '{}'", value))
                })?;
                config = config.latency(latency)?;
            }
            _ => {
                log::warn!("Unknown FTDI option: {}={}", key, value);
            }
        }
    }

    // Channel is checked once the device type is known
    config.validate()?;
    Ok(config)
}
