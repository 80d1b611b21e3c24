//! Serial port discovery and line-oriented reading
//!
//! Handles USB serial port enumeration, device selection by hardware
//! identifier, and newline framing over a port opened with a read timeout.

use colored::Colorize;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read};
use std::time::Duration;
use thiserror::Error;

/// Default line rate used by the firmware's USB serial console
pub const DEFAULT_BAUD: u32 = 9600;

/// Longest run of bytes buffered without a newline before it is handed on as a line
pub const MAX_LINE_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(#[source] serialport::Error),

    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("failed to read from serial port: {0}")]
    Read(#[source] io::Error),
}

/// Configuration for serial port connection
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyACM0, COM3)
    pub port_path: String,
    /// Baud rate (default: 9600)
    pub baud_rate: u32,
    /// Data bits (default: 8)
    pub data_bits: DataBits,
    /// Parity (default: None)
    pub parity: Parity,
    /// Stop bits (default: 1)
    pub stop_bits: StopBits,
    /// Flow control (default: None)
    pub flow_control: FlowControl,
    /// Read timeout
    pub timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_path: String::from("/dev/ttyACM0"),
            baud_rate: DEFAULT_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: Duration::from_millis(100),
        }
    }
}

impl PortConfig {
    /// Create a new configuration with default settings
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            ..Default::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An open serial port
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
}

impl SerialConnection {
    /// Open a serial connection with the given configuration
    pub fn open(config: &PortConfig) -> Result<Self, SerialError> {
        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(config.timeout)
            .open()
            .map_err(|source| SerialError::Open {
                port: config.port_path.clone(),
                source,
            })?;

        Ok(Self { port })
    }
}

impl Read for SerialConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

/// Information about a detected serial port
#[derive(Debug, Clone, PartialEq)]
pub struct PortInfo {
    pub path: String,
    pub port_type: PortType,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PortType {
    UsbSerial,
    PciSerial,
    Bluetooth,
    Unknown,
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortType::UsbSerial => write!(f, "USB Serial"),
            PortType::PciSerial => write!(f, "PCI Serial"),
            PortType::Bluetooth => write!(f, "Bluetooth"),
            PortType::Unknown => write!(f, "Unknown"),
        }
    }
}

impl PortInfo {
    /// Hardware descriptor in the `USB VID:PID=16C0:0483 SER=12345` form
    pub fn descriptor(&self) -> String {
        match self.port_type {
            PortType::UsbSerial => {
                let mut descriptor = format!(
                    "USB VID:PID={:04X}:{:04X}",
                    self.vid.unwrap_or(0),
                    self.pid.unwrap_or(0)
                );
                if let Some(ref serial) = self.serial_number {
                    descriptor.push_str(&format!(" SER={}", serial));
                }
                descriptor
            }
            PortType::PciSerial => "PCI".to_string(),
            PortType::Bluetooth => "BLUETOOTH".to_string(),
            PortType::Unknown => "n/a".to_string(),
        }
    }
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(p: serialport::SerialPortInfo) -> Self {
        let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
            serialport::SerialPortType::UsbPort(info) => (
                PortType::UsbSerial,
                info.manufacturer,
                info.product,
                info.serial_number,
                Some(info.vid),
                Some(info.pid),
            ),
            serialport::SerialPortType::PciPort => {
                (PortType::PciSerial, None, None, None, None, None)
            }
            serialport::SerialPortType::BluetoothPort => {
                (PortType::Bluetooth, None, None, None, None, None)
            }
            serialport::SerialPortType::Unknown => {
                (PortType::Unknown, None, None, None, None, None)
            }
        };

        PortInfo {
            path: p.port_name,
            port_type,
            manufacturer,
            product,
            serial_number,
            vid,
            pid,
        }
    }
}

/// Pick the first port whose descriptor contains `device_id` (case-insensitive)
pub fn select_device<'a>(ports: &'a [PortInfo], device_id: &str) -> Option<&'a PortInfo> {
    let needle = device_id.to_uppercase();
    ports
        .iter()
        .find(|p| p.descriptor().to_uppercase().contains(&needle))
}

/// Where ports come from. The monitor only talks to serial hardware through this.
pub trait SerialBackend {
    type Connection: Read;

    fn available_ports(&self) -> Result<Vec<PortInfo>, SerialError>;

    fn open(&self, config: &PortConfig) -> Result<Self::Connection, SerialError>;
}

/// Locate the device: enumerate and select by hardware identifier
pub fn find_device<B: SerialBackend>(
    backend: &B,
    device_id: &str,
) -> Result<Option<PortInfo>, SerialError> {
    let ports = backend.available_ports()?;
    log::debug!("enumerated {} serial port(s)", ports.len());
    Ok(select_device(&ports, device_id).cloned())
}

/// Ports attached to this machine, via `serialport`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSerial;

impl SerialBackend for SystemSerial {
    type Connection = SerialConnection;

    fn available_ports(&self) -> Result<Vec<PortInfo>, SerialError> {
        let ports = serialport::available_ports().map_err(SerialError::Enumerate)?;
        Ok(ports.into_iter().map(PortInfo::from).collect())
    }

    fn open(&self, config: &PortConfig) -> Result<SerialConnection, SerialError> {
        SerialConnection::open(config)
    }
}

/// Result of one attempt to read a line
#[derive(Debug, PartialEq, Eq)]
pub enum ReadEvent {
    /// A complete line, terminator included
    Line(Vec<u8>),
    /// The read timed out with no complete line
    Idle,
    /// End of stream: the device has gone away
    Closed,
}

/// Newline framing over a byte stream that times out
///
/// Bytes of a partial line are kept across timeouts and completed by later reads.
/// A run longer than [`MAX_LINE_LEN`] without a newline (wrong baud rate, binary
/// noise) is cut and returned as a line of its own.
pub struct LineReader<R> {
    inner: R,
    pending: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
        }
    }

    pub fn read_line(&mut self) -> Result<ReadEvent, SerialError> {
        let mut chunk = [0u8; 256];
        loop {
            if let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=end).collect();
                return Ok(ReadEvent::Line(line));
            }
            if self.pending.len() >= MAX_LINE_LEN {
                log::warn!("no newline in {} bytes, splitting line", MAX_LINE_LEN);
                let line: Vec<u8> = self.pending.drain(..MAX_LINE_LEN).collect();
                return Ok(ReadEvent::Line(line));
            }

            match self.inner.read(&mut chunk) {
                Ok(0) => return Ok(ReadEvent::Closed),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    return Ok(ReadEvent::Idle)
                }
                Err(e) => return Err(SerialError::Read(e)),
            }
        }
    }

    /// Bytes received since the last complete line
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}

/// Print formatted list of available serial ports, marking the one `device_id` selects
pub fn print_ports(ports: &[PortInfo], device_id: &str) {
    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        println!("\n{}", "Troubleshooting tips:".cyan().bold());
        println!("  1. Connect the board with a data-capable USB cable");
        println!("  2. Check if the device is recognized: ls -la /dev/ttyACM* /dev/ttyUSB*");
        println!("  3. Add your user to the 'dialout' group: sudo usermod -aG dialout $USER");
        return;
    }

    let selected = select_device(ports, device_id).map(|p| p.path.clone());

    println!("{}", "Available Serial Ports:".green().bold());
    println!("{}", "=".repeat(60));

    for port in ports {
        let marker = if selected.as_deref() == Some(port.path.as_str()) {
            " <- selected".green().bold().to_string()
        } else {
            String::new()
        };
        println!("\n{}: {}{}", "Port".cyan(), port.path.white().bold(), marker);
        println!("  Type: {}", port.port_type);
        println!("  Descriptor: {}", port.descriptor());

        if let Some(ref mfg) = port.manufacturer {
            println!("  Manufacturer: {}", mfg);
        }
        if let Some(ref prod) = port.product {
            println!("  Product: {}", prod);
        }
    }

    println!("\n{}", "=".repeat(60));
    if selected.is_none() {
        println!(
            "{}",
            format!("No port matches device id '{}'", device_id).yellow()
        );
    }
}
