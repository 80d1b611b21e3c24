//! Teensy device profiles
//!
//! PJRC boards enumerate as USB CDC serial with VID 16C0 and PID 0483.
//! The identifier carries the vendor too: 0483 on its own is ST's vendor ID.
//! The baud rate is ignored by USB CDC but still has to be set on open.

use super::profile::BoardProfile;
use once_cell::sync::Lazy;

/// Teensy 4.1 device profile
pub static TEENSY41_PROFILE: Lazy<BoardProfile> = Lazy::new(|| BoardProfile {
    description: "Teensy 4.1 (i.MX RT1062, Cortex-M7)".to_string(),
    device_id: "16C0:0483".to_string(),
    ..BoardProfile::new("teensy41", "Teensy 4.1")
});

/// Teensy 4.0 device profile
pub static TEENSY40_PROFILE: Lazy<BoardProfile> = Lazy::new(|| BoardProfile {
    description: "Teensy 4.0 (i.MX RT1062, Cortex-M7)".to_string(),
    device_id: "16C0:0483".to_string(),
    ..BoardProfile::new("teensy40", "Teensy 4.0")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teensy_profiles() {
        assert_eq!(TEENSY41_PROFILE.id, "teensy41");
        assert_eq!(TEENSY41_PROFILE.device_id, "16C0:0483");
        assert_eq!(TEENSY40_PROFILE.elf, ".pio/build/teensy40/firmware.elf");
    }
}
