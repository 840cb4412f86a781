//! FTDI bridge identification
//!
//! USB IDs and channel layout of the high-speed FTDI parts that can run the
//! MPSSE engine as an I2C master.

/// FTDI vendor ID
pub const FTDI_VID: u16 = 0x0403;

/// FT2232H product ID (dual channel)
pub const FTDI_FT2232H_PID: u16 = 0x6010;

/// FT4232H product ID (quad channel)
pub const FTDI_FT4232H_PID: u16 = 0x6011;

/// FT232H product ID (single channel)
pub const FTDI_FT232H_PID: u16 = 0x6014;

/// Default USB latency timer in milliseconds
pub const DEFAULT_LATENCY_MS: u8 = 2;

/// Largest reply chunk requested from the bridge in one read
pub const READ_CHUNK_SIZE: usize = 64;

/// Supported bridge types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtdiDeviceType {
    /// FT232H (single channel)
    #[default]
    Ft232H,
    /// FT2232H (dual channel)
    Ft2232H,
    /// FT4232H (quad channel)
    Ft4232H,
}

impl FtdiDeviceType {
    /// Vendor ID for this device type
    pub fn vendor_id(&self) -> u16 {
        FTDI_VID
    }

    /// Product ID for this device type
    pub fn product_id(&self) -> u16 {
        match self {
            FtdiDeviceType::Ft232H => FTDI_FT232H_PID,
            FtdiDeviceType::Ft2232H => FTDI_FT2232H_PID,
            FtdiDeviceType::Ft4232H => FTDI_FT4232H_PID,
        }
    }

    /// Number of MPSSE-capable channels
    ///
    /// Only channels A and B of the FT4232H have an MPSSE engine.
    pub fn mpsse_channels(&self) -> u8 {
        match self {
            FtdiDeviceType::Ft232H => 1,
            FtdiDeviceType::Ft2232H | FtdiDeviceType::Ft4232H => 2,
        }
    }

    /// Parse device type from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "232h" | "ft232h" => Some(FtdiDeviceType::Ft232H),
            "2232h" | "ft2232h" => Some(FtdiDeviceType::Ft2232H),
            "4232h" | "ft4232h" => Some(FtdiDeviceType::Ft4232H),
            _ => None,
        }
    }

    /// Marketing name of the part
    pub fn name(&self) -> &'static str {
        match self {
            FtdiDeviceType::Ft232H => "FT232H",
            FtdiDeviceType::Ft2232H => "FT2232H",
            FtdiDeviceType::Ft4232H => "FT4232H",
        }
    }
}

/// FTDI interface/channel selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtdiInterface {
    /// Channel A (default)
    #[default]
    A,
    /// Channel B
    B,
    /// Channel C
    C,
    /// Channel D
    D,
}

impl FtdiInterface {
    /// Parse interface from a one-letter string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Some(FtdiInterface::A),
            "B" => Some(FtdiInterface::B),
            "C" => Some(FtdiInterface::C),
            "D" => Some(FtdiInterface::D),
            _ => None,
        }
    }

    /// Interface index (0-3)
    pub fn index(&self) -> u8 {
        *self as u8
    }

    /// Channel letter
    pub fn letter(&self) -> char {
        (b'A' + self.index()) as char
    }
}

impl From<FtdiInterface> for ftdi::Interface {
    fn from(interface: FtdiInterface) -> Self {
        match interface {
            FtdiInterface::A => ftdi::Interface::A,
            FtdiInterface::B => ftdi::Interface::B,
            FtdiInterface::C => ftdi::Interface::C,
            FtdiInterface::D => ftdi::Interface::D,
        }
    }
}

/// A bridge recognised during enumeration
pub struct SupportedDevice {
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// Bridge type
    pub device_type: FtdiDeviceType,
}

/// Every bridge the link can drive
pub const SUPPORTED_DEVICES: &[SupportedDevice] = &[
    SupportedDevice {
        vendor_id: FTDI_VID,
        product_id: FTDI_FT232H_PID,
        device_type: FtdiDeviceType::Ft232H,
    },
    SupportedDevice {
        vendor_id: FTDI_VID,
        product_id: FTDI_FT2232H_PID,
        device_type: FtdiDeviceType::Ft2232H,
    },
    SupportedDevice {
        vendor_id: FTDI_VID,
        product_id: FTDI_FT4232H_PID,
        device_type: FtdiDeviceType::Ft4232H,
    },
];

/// Device info for a VID/PID pair
pub fn get_device_info(vid: u16, pid: u16) -> Option<&'static SupportedDevice> {
    SUPPORTED_DEVICES
        .iter()
        .find(|d| d.vendor_id == vid && d.product_id == pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_type() {
        assert_eq!(FtdiDeviceType::parse("232h"), Some(FtdiDeviceType::Ft232H));
        assert_eq!(FtdiDeviceType::parse("FT2232H"), Some(FtdiDeviceType::Ft2232H));
        assert_eq!(FtdiDeviceType::parse("jtagkey"), None);
    }

    #[test]
    fn test_interface_letters() {
        assert_eq!(FtdiInterface::parse("b"), Some(FtdiInterface::B));
        assert_eq!(FtdiInterface::D.letter(), 'D');
        assert_eq!(FtdiInterface::C.index(), 2);
        assert_eq!(FtdiInterface::parse("AB"), None);
    }

    #[test]
    fn test_device_lookup() {
        let info = get_device_info(FTDI_VID, FTDI_FT232H_PID).unwrap();
        assert_eq!(info.device_type, FtdiDeviceType::Ft232H);
        assert!(get_device_info(0x1a86, 0x5512).is_none());
    }
}
