//! Serial port configuration and connection management
//!
//! Handles opening the UART link to the device under test and enumerating
//! candidate USB-to-serial adapters.

use anyhow::{Context, Result};
use colored::Colorize;
use log::debug;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

/// Device path the classroom boards enumerate as
pub const DEFAULT_PORT: &str = "/dev/cu.usbmodem14301";

/// Baud rate the board firmware is flashed with
pub const DEFAULT_BAUD: u32 = 9600;

/// Maximum wait for a response line before giving up on the read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a serial port connection
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/cu.usbmodem14301, /dev/ttyACM0)
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
            port_path: String::from(DEFAULT_PORT),
            baud_rate: DEFAULT_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl PortConfig {
    /// Create a new configuration for the given path with default settings
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

/// An open serial link to the device under test.
///
/// The underlying handle is released when the connection is dropped, so a
/// caller that opens one connection per exchange gets a guaranteed close at
/// the end of each scope.
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
}

impl SerialConnection {
    /// Open a serial connection with the given configuration
    pub fn open(config: PortConfig) -> Result<Self> {
        debug!(
            "opening {} at {} baud (timeout {:?})",
            config.port_path, config.baud_rate, config.timeout
        );
        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(config.timeout)
            .open()
            .with_context(|| format!("Failed to open serial port: {}", config.port_path))?;

        Ok(Self { port })
    }

    /// Write raw bytes to the serial port.
    ///
    /// Blocks until every byte has been handed to the driver; a short write
    /// is continued, not silently dropped. The bytes go out exactly as
    /// given; no terminator, length prefix, or other framing is added.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        debug!("tx {} byte(s)", data.len());
        write_all_to(&mut self.port, data)
    }

    /// Flush the output buffer
    pub fn flush(&mut self) -> Result<()> {
        self.port
            .flush()
            .with_context(|| "Failed to flush serial port")
    }

    /// Read one line of response, waiting up to the configured timeout.
    ///
    /// Returns `Ok(None)` when the device sends nothing before the timeout;
    /// an empty response is not an error.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        read_line_from(&mut self.port)
    }
}

/// Write the whole payload to `writer`, continuing across short writes.
///
/// A sink that stops accepting bytes before the payload is delivered is an
/// error; the transmitted bytes must equal the payload exactly.
pub fn write_all_to<W: Write + ?Sized>(writer: &mut W, data: &[u8]) -> Result<()> {
    writer
        .write_all(data)
        .with_context(|| "Failed to write to serial port")
}

/// Read bytes from `reader` until a newline, end-of-stream, or timeout.
///
/// A timeout or clean end with nothing buffered yields `None`; otherwise the
/// accumulated bytes (minus the line terminator) are returned lossily decoded.
pub fn read_line_from<R: Read + ?Sized>(reader: &mut R) -> Result<Option<String>> {
    let mut buffer = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match reader.read(&mut byte) {
            Ok(1) => {
                if byte[0] == b'\n' {
                    break;
                }
                buffer.push(byte[0]);
            }
            Ok(0) => {
                if buffer.is_empty() {
                    return Ok(None);
                }
                break;
            }
            Ok(_) => unreachable!(),
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                if buffer.is_empty() {
                    return Ok(None);
                }
                break;
            }
            Err(e) => return Err(e).with_context(|| "Failed to read from serial port"),
        }
    }

    // Handle carriage returns
    if buffer.last() == Some(&b'\r') {
        buffer.pop();
    }

    Ok(Some(String::from_utf8_lossy(&buffer).to_string()))
}

/// Information about a detected serial port
#[derive(Debug, Clone)]
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

/// List all available serial ports
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().with_context(|| "Failed to enumerate serial ports")?;

    let port_infos: Vec<PortInfo> = ports
        .into_iter()
        .map(|p| {
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
        })
        .collect();

    Ok(port_infos)
}

/// Print formatted list of available serial ports
pub fn print_ports() -> Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        println!("\n{}", "Troubleshooting tips:".cyan().bold());
        println!("  1. Connect the board or USB-to-serial adapter");
        println!(
            "  2. Check if the device is recognized: ls -la /dev/ttyUSB* /dev/ttyACM* /dev/cu.*"
        );
        println!("  3. Add your user to the 'dialout' group: sudo usermod -aG dialout $USER");
        println!("  4. Check dmesg for connection events: dmesg | tail -20");
        return Ok(());
    }

    println!("{}", "Available Serial Ports:".green().bold());
    println!("{}", "=".repeat(60));

    for port in ports {
        println!("\n{}: {}", "Port".cyan(), port.path.white().bold());
        println!("  Type: {}", port.port_type);

        if let Some(ref mfg) = port.manufacturer {
            println!("  Manufacturer: {}", mfg);
        }
        if let Some(ref prod) = port.product {
            println!("  Product: {}", prod);
        }
        if let Some(ref sn) = port.serial_number {
            println!("  Serial: {}", sn);
        }
        if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            println!("  VID:PID: {:04x}:{:04x}", vid, pid);
        }
    }

    println!("\n{}", "=".repeat(60));
    println!(
        "{}",
        "Use: serial-echo session -p <PORT> to start an echo session".yellow()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    #[test]
    fn test_default_config() {
        let config = PortConfig::default();
        assert_eq!(config.port_path, "/dev/cu.usbmodem14301");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_config_builder() {
        let config = PortConfig::new("/dev/ttyACM0")
            .with_baud_rate(115200)
            .with_timeout(Duration::from_millis(100));

        assert_eq!(config.port_path, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_read_line_strips_terminator() {
        let mut reader = Cursor::new(b"echo: 5\r\n".to_vec());
        let line = read_line_from(&mut reader).unwrap();
        assert_eq!(line.as_deref(), Some("echo: 5"));
    }

    #[test]
    fn test_read_line_without_newline() {
        // Stream ends before a newline arrives; partial data still counts
        let mut reader = Cursor::new(b"partial".to_vec());
        let line = read_line_from(&mut reader).unwrap();
        assert_eq!(line.as_deref(), Some("partial"));
    }

    #[test]
    fn test_read_line_empty_stream_is_none() {
        let mut reader = Cursor::new(Vec::new());
        let line = read_line_from(&mut reader).unwrap();
        assert_eq!(line, None);
    }

    struct TimedOutReader;

    impl io::Read for TimedOutReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"))
        }
    }

    #[test]
    fn test_read_line_timeout_is_none_not_error() {
        let mut reader = TimedOutReader;
        let line = read_line_from(&mut reader).unwrap();
        assert_eq!(line, None);
    }

    /// Accepts at most one byte per write call
    struct TrickleWriter {
        written: Vec<u8>,
    }

    impl io::Write for TrickleWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            self.written.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_delivers_full_payload_across_short_writes() {
        let mut writer = TrickleWriter { written: Vec::new() };
        write_all_to(&mut writer, b"255").unwrap();
        assert_eq!(writer.written, b"255");
    }

    /// Stops accepting bytes after the first write call
    struct StalledWriter {
        calls: usize,
    }

    impl io::Write for StalledWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.calls == 1 {
                Ok(buf.len().min(1))
            } else {
                Ok(0)
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_errors_instead_of_dropping_bytes() {
        let mut writer = StalledWriter { calls: 0 };
        assert!(write_all_to(&mut writer, b"255").is_err());
    }
}
