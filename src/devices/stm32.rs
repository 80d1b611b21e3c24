//! STM32 device profile
//!
//! STM32 parts exposing the ST Virtual COM Port, or an ST-Link VCP.

use super::profile::BoardProfile;
use once_cell::sync::Lazy;

/// STM32 device profile
pub static STM32_PROFILE: Lazy<BoardProfile> = Lazy::new(|| BoardProfile {
    description: "STM32 ARM Cortex-M microcontrollers".to_string(),
    device_id: "0483:5740".to_string(),
    baud_rate: 115200,
    ..BoardProfile::new("stm32", "STM32")
});
