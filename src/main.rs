//! acbdac - Command-line control for the ACB DAC array
//!
//! Opens the board over a bridge link, probes the DACs behind the I2C
//! multiplexer and reads or writes channels by name.
//!
//! The board configuration and pin map come from one TOML file given with
//! `--config`. Without it the defaults are used: multiplexer at 0x70, buses
//! I2C0-I2C2, all eight MCP4728 addresses, 100 kHz, and the built-in ACB
//! pin map.

mod cli;
mod commands;
mod links;

use std::path::Path;

use acbdac_core::board::Board;
use acbdac_core::config::BoardConfig;
use acbdac_core::dac::{ChannelConfig, Gain, Vref};
use acbdac_core::link::MpsseLink;
use acbdac_core::pinmap::PinMap;
use acbdac_core::types::{DeviceAddress, LogicalBusId};
use clap::Parser;
use cli::{Cli, Commands, GainArg, VrefArg};

type BoxedBoard = Board<Box<dyn MpsseLink>>;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::ListLinks => {
            commands::list_links();
            Ok(())
        }
        Commands::ListDevices => commands::list_devices(),
        Commands::Channels { probe, link } => with_board(&link.link, config_path, |board| {
            if probe {
                board.initialize()?;
            }
            commands::run_channels(board);
            Ok(())
        }),
        Commands::Probe { link } => with_board(&link.link, config_path, commands::run_probe),
        Commands::Scan { bus, link } => {
            let bus = LogicalBusId::new(bus)?;
            with_board(&link.link, config_path, |board| {
                commands::run_scan(board, bus)
            })
        }
        Commands::Regs { bus, address, link } => {
            let bus = LogicalBusId::new(bus)?;
            let address = DeviceAddress::new(address)?;
            with_board(&link.link, config_path, |board| {
                commands::run_regs(board, bus, address)
            })
        }
        Commands::Set {
            channel,
            value,
            raw,
            vref,
            gain,
            link,
        } => {
            let value = commands::SetValue::parse(&value, raw)?;
            let config = ChannelConfig {
                vref: match vref {
                    VrefArg::Vdd => Vref::Vdd,
                    VrefArg::Internal => Vref::Internal,
                },
                gain: match gain {
                    GainArg::X1 => Gain::X1,
                    GainArg::X2 => Gain::X2,
                },
                ..ChannelConfig::default()
            };
            with_board(&link.link, config_path, |board| {
                commands::run_set(board, &channel, value, config)
            })
        }
        Commands::Get { channel, raw, link } => with_board(&link.link, config_path, |board| {
            commands::run_get(board, &channel, raw)
        }),
    }
}

/// Load the board configuration and pin map
///
/// A config file without `[[channel]]` entries falls back to the built-in
/// ACB pin map.
fn load_config(path: Option<&Path>) -> Result<(BoardConfig, PinMap), Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok((BoardConfig::default(), PinMap::acb()?));
    };

    let config = BoardConfig::from_toml_file(path)
        .map_err(|e| format!("Failed to load {}: {}", path.display(), e))?;
    let pinmap = PinMap::from_toml_file(path)
        .map_err(|e| format!("Failed to load channels from {}: {}", path.display(), e))?;

    if pinmap.is_empty() {
        log::info!("No channels in {}, using the built-in ACB map", path.display());
        return Ok((config, PinMap::acb()?));
    }
    log::info!("Loaded {} channel(s) from {}", pinmap.len(), path.display());
    Ok((config, pinmap))
}

/// Open the board, run `f`, and close the board whatever `f` returned
fn with_board<F>(
    link: &str,
    config_path: Option<&Path>,
    f: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut BoxedBoard) -> acbdac_core::Result<()>,
{
    let (config, pinmap) = load_config(config_path)?;
    let link = links::open_link(link)?;
    let mut board = Board::open(link, config, pinmap)?;

    let result = f(&mut board);
    drop(board.close());
    result.map_err(Into::into)
}
