//! CLI argument parsing

use crate::links;
use acbdac_core::types::parse_u8;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Generate dynamic help text for the link argument
fn link_help() -> String {
    format!(
        "Bridge link to use, as name[:key=value,...] [available: {}]",
        links::link_names_short()
    )
}

#[derive(Parser)]
#[command(name = "acbdac")]
#[command(author, version, about = "ACB DAC array control", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Board configuration file (TOML, may also hold [[channel]] entries)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Link selection shared by every command that touches the board
#[derive(clap::Args, Debug, Clone)]
pub struct LinkArgs {
    #[arg(short, long, default_value = "dummy", help = link_help())]
    pub link: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List link backends compiled into this binary
    ListLinks,

    /// List connected FTDI bridges
    ListDevices,

    /// Print the pin map
    Channels {
        /// Probe the board and show which channels have a DAC behind them
        #[arg(long)]
        probe: bool,

        #[command(flatten)]
        link: LinkArgs,
    },

    /// Probe every configured slot and print the registry
    Probe {
        #[command(flatten)]
        link: LinkArgs,
    },

    /// List addresses answering on one logical bus
    Scan {
        /// Multiplexer port (0-7)
        #[arg(short, long)]
        bus: u8,

        #[command(flatten)]
        link: LinkArgs,
    },

    /// Dump every register of one DAC
    Regs {
        /// Multiplexer port (0-7)
        #[arg(short, long)]
        bus: u8,

        /// DAC address (0x60-0x67)
        #[arg(short, long, value_parser = parse_u8)]
        address: u8,

        #[command(flatten)]
        link: LinkArgs,
    },

    /// Set a channel
    Set {
        /// Channel name from the pin map
        channel: String,

        /// Fraction of full scale (0.0-1.0), or a code with --raw
        value: String,

        /// Treat VALUE as a raw 12-bit code
        #[arg(long)]
        raw: bool,

        /// Voltage reference
        #[arg(long, value_enum, default_value_t = VrefArg::Vdd)]
        vref: VrefArg,

        /// Output gain (internal reference only)
        #[arg(long, value_enum, default_value_t = GainArg::X1)]
        gain: GainArg,

        #[command(flatten)]
        link: LinkArgs,
    },

    /// Read a channel back
    Get {
        /// Channel name from the pin map
        channel: String,

        /// Print the raw 12-bit code
        #[arg(long)]
        raw: bool,

        #[command(flatten)]
        link: LinkArgs,
    },
}

/// Voltage reference on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VrefArg {
    /// Full scale is VDD
    Vdd,
    /// Internal 2.048 V reference
    Internal,
}

/// Gain on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GainArg {
    /// x1
    #[value(name = "1")]
    X1,
    /// x2
    #[value(name = "2")]
    X2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_shape() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_set() {
        let cli = Cli::try_parse_from([
            "acbdac", "-v", "set", "HEATER", "0.5", "--vref", "internal", "--gain", "2",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Set {
                channel,
                value,
                raw,
                vref,
                gain,
                link,
            } => {
                assert_eq!(channel, "HEATER");
                assert_eq!(value, "0.5");
                assert!(!raw);
                assert_eq!(vref, VrefArg::Internal);
                assert_eq!(gain, GainArg::X2);
                assert_eq!(link.link, "dummy");
            }
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn test_parse_regs_hex_address() {
        let cli = Cli::try_parse_from(["acbdac", "regs", "--bus", "1", "--address", "0x64"]).unwrap();
        match cli.command {
            Commands::Regs { bus, address, .. } => {
                assert_eq!(bus, 1);
                assert_eq!(address, 0x64);
            }
            _ => panic!("expected regs"),
        }
    }
}
