//! Link registration and dispatch
//!
//! Central list of the bridge backends compiled into the binary, with
//! feature-gated inclusion and help text generated from the same table.

use acbdac_core::link::MpsseLink;

/// Information about a link backend
pub struct LinkInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// All link backends enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_links() -> Vec<LinkInfo> {
    let mut links = Vec::new();

    #[cfg(feature = "dummy")]
    links.push(LinkInfo {
        name: "dummy",
        aliases: &["sim"],
        description: "Simulated ACB (multiplexer at 0x70, DACs on I2C0 0x60/0x61 and I2C1 0x64)",
    });

    #[cfg(feature = "ftdi")]
    links.push(LinkInfo {
        name: "ftdi",
        aliases: &["ft232h"],
        description: "FTDI MPSSE bridge (FT232H/FT2232H/FT4232H) (type=<dev>,port=<A-D>,latency=<ms>)",
    });

    links
}

/// Help text listing all available links
pub fn link_help() -> String {
    let links = available_links();

    if links.is_empty() {
        return "No links available (recompile with link features enabled)".to_string();
    }

    let mut help = String::from("Available links:\n");
    for l in &links {
        help.push_str(&format!("  {:8} - {}\n", l.name, l.description));
        if !l.aliases.is_empty() {
            help.push_str(&format!("  {:8}   aliases: {}\n", "", l.aliases.join(", ")));
        }
    }
    help
}

/// Short list of link names for CLI help
pub fn link_names_short() -> String {
    let names: Vec<&str> = available_links().iter().map(|l| l.name).collect();
    names.join(", ")
}

/// Canonical name for `name`, if the backend is compiled in
pub fn find_link(name: &str) -> Option<&'static str> {
    available_links()
        .into_iter()
        .find(|l| l.name == name || l.aliases.contains(&name))
        .map(|l| l.name)
}

/// Parse a link string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_link_string(s: &str) -> Result<(&str, Vec<(&str, &str)>), Box<dyn std::error::Error>> {
    let Some((name, opts)) = s.split_once(':') else {
        return Ok((s, Vec::new()));
    };

    let mut options = Vec::new();
    for opt in opts.split(',').filter(|o| !o.is_empty()) {
        match opt.split_once('=') {
            Some(kv) => options.push(kv),
            None => {
                return Err(
                    format!("Invalid link option: '{}' (expected key=value)", opt).into(),
                )
            }
        }
    }
    Ok((name, options))
}

/// Open the link described by `link_string`
#[allow(unused_variables)]
pub fn open_link(link_string: &str) -> Result<Box<dyn MpsseLink>, Box<dyn std::error::Error>> {
    let (name, options) = parse_link_string(link_string)?;

    match find_link(name) {
        #[cfg(feature = "dummy")]
        Some("dummy") => {
            for (key, value) in &options {
                log::warn!("Unknown dummy option: {}={}", key, value);
            }
            log::info!("Using simulated ACB");
            Ok(Box::new(acbdac_dummy::acb_link()))
        }

        #[cfg(feature = "ftdi")]
        Some("ftdi") => {
            use acbdac_ftdi::{parse_options, FtdiLink};

            let config =
                parse_options(&options).map_err(|e| format!("Invalid FTDI parameters: {}", e))?;
            let link = FtdiLink::open(&config).map_err(|e| {
                format!(
                    "Failed to open FTDI device: {}\n\
                     Make sure the device is connected and you have permissions.\n\
                     You may need to unbind the kernel ftdi_sio driver:\n\
                     echo -n '<bus>-<port>' | sudo tee /sys/bus/usb/drivers/ftdi_sio/unbind",
                    e
                )
            })?;
            Ok(Box::new(link))
        }

        _ => Err(unknown_link_error(name)),
    }
}

fn unknown_link_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown link: {}\n\n", name);
    msg.push_str(&link_help());
    msg.push_str("\nUse 'acbdac list-links' for more details");
    msg.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_link_string() {
        let (name, opts) = parse_link_string("ftdi:type=232h,port=A").unwrap();
        assert_eq!(name, "ftdi");
        assert_eq!(opts, vec![("type", "232h"), ("port", "A")]);

        let (name, opts) = parse_link_string("dummy").unwrap();
        assert_eq!(name, "dummy");
        assert!(opts.is_empty());

        assert!(parse_link_string("ftdi:type").is_err());
    }

    #[test]
    fn test_unknown_link() {
        assert!(find_link("ch341a").is_none());
        assert!(open_link("ch341a").is_err());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_alias() {
        assert_eq!(find_link("sim"), Some("dummy"));
        assert!(open_link("dummy").is_ok());
    }
}
