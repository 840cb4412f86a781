//! List commands implementation

use crate::links;

/// List all compiled-in link backends
pub fn list_links() {
    print!("{}", links::link_help());
}

/// List connected FTDI bridges
#[cfg(feature = "ftdi")]
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let devices = acbdac_ftdi::list_devices()?;
    if devices.is_empty() {
        println!("No FTDI bridges found");
        return Ok(());
    }
    for dev in &devices {
        println!("{}", dev);
    }
    Ok(())
}

/// List connected FTDI bridges
#[cfg(not(feature = "ftdi"))]
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    Err("FTDI support not compiled in (rebuild with --features ftdi)".into())
}
