//! Board commands

use acbdac_core::board::Board;
use acbdac_core::dac::{ChannelConfig, ChannelState, RESOLUTION_MAX};
use acbdac_core::link::MpsseLink;
use acbdac_core::registry::DeviceSlot;
use acbdac_core::types::{DeviceAddress, LogicalBusId};
use acbdac_core::Result;

/// Value given to `set`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetValue {
    /// Fraction of full scale
    Normalized(f64),
    /// 12-bit code
    Raw(u16),
}

impl SetValue {
    /// Parse the command-line value
    pub fn parse(s: &str, raw: bool) -> std::result::Result<Self, String> {
        if raw {
            let code = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u16::from_str_radix(hex, 16),
                None => s.parse::<u16>(),
            }
            .map_err(|e| format!("Invalid code '{}': {}", s, e))?;
            Ok(SetValue::Raw(code))
        } else {
            s.parse::<f64>()
                .map(SetValue::Normalized)
                .map_err(|e| format!("Invalid value '{}': {}", s, e))
        }
    }
}

/// Print the pin map, optionally with probe results
pub fn run_channels<L: MpsseLink>(board: &Board<L>) {
    println!("{:<24} {:<6} {:<8} {:<6} {}", "Channel", "Bus", "Address", "Output", "DAC");
    println!("{}", "-".repeat(56));
    for (name, addr, slot) in board.channels() {
        let state = match slot {
            Some(DeviceSlot::Present(_)) => "present",
            Some(DeviceSlot::Absent) => "absent",
            Some(DeviceSlot::Unprobed) => "-",
            None => "not configured",
        };
        println!(
            "{:<24} {:<6} {:<8} {:<6} {}",
            name,
            addr.bus.to_string(),
            addr.address.to_string(),
            addr.output.to_string(),
            state
        );
    }
}

/// Probe every slot and print the registry
pub fn run_probe<L: MpsseLink>(board: &mut Board<L>) -> Result<()> {
    let report = board.initialize()?;
    println!("{}", report);
    Ok(())
}

/// Print every address answering on `bus`
pub fn run_scan<L: MpsseLink>(board: &Board<L>, bus: LogicalBusId) -> Result<()> {
    let found = board.scan_bus(bus)?;
    if found.is_empty() {
        println!("{}: no targets", bus);
    }
    for addr in found {
        let kind = if DeviceAddress::new(addr).is_ok() {
            "MCP4728 range"
        } else {
            "unknown"
        };
        println!("{} 0x{:02X} ({})", bus, addr, kind);
    }
    Ok(())
}

/// Dump the input and EEPROM registers of one DAC
pub fn run_regs<L: MpsseLink>(
    board: &mut Board<L>,
    bus: LogicalBusId,
    address: DeviceAddress,
) -> Result<()> {
    board.initialize()?;
    let device = board
        .device(bus, address)
        .ok_or(acbdac_core::Error::DeviceNotPresent { bus, address })?;

    let regs = device.read_registers()?;
    println!("{} {}:", device.bus(), device.address());
    for (output, reg) in device.outputs().iter().zip(regs.iter()) {
        println!(
            "  {}  input  {}",
            output.address().output,
            format_state(&reg.input)
        );
        println!("     eeprom {}", format_state(&reg.eeprom));
    }
    Ok(())
}

/// Write one channel
pub fn run_set<L: MpsseLink>(
    board: &mut Board<L>,
    channel: &str,
    value: SetValue,
    config: ChannelConfig,
) -> Result<()> {
    board.initialize()?;
    let out = board.output(channel)?.with_config(config);
    match value {
        SetValue::Normalized(v) => out.set_normalized(v)?,
        SetValue::Raw(code) => out.set_raw(code)?,
    }
    let code = out.read_raw()?;
    println!("{} ({}) = {:#05X}", channel, out.address(), code);
    Ok(())
}

/// Read one channel back
pub fn run_get<L: MpsseLink>(board: &mut Board<L>, channel: &str, raw: bool) -> Result<()> {
    board.initialize()?;
    let out = board.output(channel)?;
    if raw {
        println!("{:#05X}", out.read_raw()?);
    } else {
        println!("{:.4}", out.read_normalized()?);
    }
    Ok(())
}

fn format_state(state: &ChannelState) -> String {
    format!(
        "code {:#05X} ({:5.1}%) {:?} {:?} {:?} status {:?}",
        state.code,
        state.code as f64 * 100.0 / RESOLUTION_MAX as f64,
        state.config.vref,
        state.config.gain,
        state.config.power_down,
        state.status
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_value_parse() {
        assert_eq!(SetValue::parse("0.5", false), Ok(SetValue::Normalized(0.5)));
        assert_eq!(SetValue::parse("2048", true), Ok(SetValue::Raw(2048)));
        assert_eq!(SetValue::parse("0x800", true), Ok(SetValue::Raw(0x800)));
        assert!(SetValue::parse("half", false).is_err());
        assert!(SetValue::parse("0.5", true).is_err());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_set_then_get_on_simulated_board() {
        use acbdac_core::config::BoardConfig;
        use acbdac_core::pinmap::PinMap;

        let mut board = Board::open(acbdac_dummy::acb_link(), BoardConfig::default(), PinMap::acb().unwrap())
            .unwrap();
        run_set(
            &mut board,
            "SPI0_CS0_IN4",
            SetValue::Normalized(0.25),
            ChannelConfig::default(),
        )
        .unwrap();
        let code = board.output("SPI0_CS0_IN4").unwrap().read_raw().unwrap();
        assert_eq!(code, 1024);
    }
}
