//! Serial port communication
//!
//! This module provides functionality for:
//! - Listing available serial ports and selecting the target board
//! - Framing the byte stream into lines
//! - Monitoring the stream across disconnects

pub mod monitor;
pub mod port;

pub use monitor::{MonitorError, SerialMonitor};
pub use port::{SerialBackend, SystemSerial};
