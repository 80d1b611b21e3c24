//! Board profiles
//!
//! Built-in profiles give the device identifier, baud rate and firmware
//! location for the boards this monitor is normally pointed at.

pub mod profile;
pub mod stm32;
pub mod teensy;

pub use profile::BoardProfile;
pub use stm32::STM32_PROFILE;
pub use teensy::{TEENSY40_PROFILE, TEENSY41_PROFILE};

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Profile used when none is named
pub const DEFAULT_PROFILE: &str = "teensy41";

/// Registry of built-in board profiles
pub static BOARD_PROFILES: Lazy<HashMap<&'static str, &'static BoardProfile>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("teensy41", &*TEENSY41_PROFILE);
    m.insert("teensy4.1", &*TEENSY41_PROFILE);
    m.insert("teensy40", &*TEENSY40_PROFILE);
    m.insert("teensy4.0", &*TEENSY40_PROFILE);
    m.insert("stm32", &*STM32_PROFILE);
    m
});

/// Get a board profile by name
pub fn get_profile(name: &str) -> Option<&'static BoardProfile> {
    BOARD_PROFILES.get(name.to_lowercase().as_str()).copied()
}

/// Get profile names only (deduplicated)
pub fn profile_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = vec!["teensy41", "teensy40", "stm32"];
    names.sort();
    names
}
