//! Board profile definitions
//!
//! A profile bundles the defaults needed to find and read a particular board:
//! how its USB serial interface identifies itself, the line rate, and where
//! the build leaves the firmware ELF.

/// Defaults for one kind of board
#[derive(Debug, Clone)]
pub struct BoardProfile {
    /// Short identifier (e.g., "teensy41")
    pub id: String,
    /// Board name
    pub name: String,
    /// Board description
    pub description: String,
    /// Substring searched for in the port's hardware descriptor
    /// (e.g. `USB VID:PID=16C0:0483 SER=123`)
    pub device_id: String,
    /// Default baud rate
    pub baud_rate: u32,
    /// Firmware ELF produced by the build, relative to the project root
    pub elf: String,
    /// Architecture-specific addr2line
    pub addr2line: String,
}

impl BoardProfile {
    /// Create a profile with common defaults
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            device_id: String::new(),
            baud_rate: 9600,
            elf: format!(".pio/build/{}/firmware.elf", id),
            addr2line: "arm-none-eabi-addr2line".to_string(),
        }
    }
}
