//! Interactive echo session against the device under test
//!
//! Drives the prompt/transmit/settle/read loop used to verify a basic
//! microcontroller serial link:
//! - Operator input is sent exactly as typed (line terminator stripped)
//! - A short settling delay before the response read
//! - TX bytes and the raw echoed line printed per exchange
//! - Optional timestamped logging to a file

use crate::serial::{PortConfig, SerialConnection};
use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::thread;
use std::time::Duration;

/// Prompt shown before each exchange
pub const PROMPT: &str = "Enter a number (0 - 255): ";

/// Settling delay between the write and the response read
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Configuration for an echo session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Port configuration
    pub port_config: PortConfig,
    /// Delay between transmit and the response read
    pub settle_delay: Duration,
    /// Enable timestamp prefixes on session output
    pub show_timestamps: bool,
    /// Log file path (optional)
    pub log_file: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port_config: PortConfig::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            show_timestamps: true,
            log_file: None,
        }
    }
}

/// Interactive echo session state
pub struct EchoSession {
    config: SessionConfig,
    log_writer: Option<BufWriter<File>>,
    exchange_count: usize,
    response_count: usize,
}

impl EchoSession {
    /// Create a new session with the given configuration
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            log_writer: None,
            exchange_count: 0,
            response_count: 0,
        }
    }

    /// Run the session until the operator ends input (EOF)
    pub fn run(&mut self) -> Result<()> {
        if let Some(ref log_path) = self.config.log_file {
            self.log_writer = Some(open_log(log_path)?);
            println!("{} Logging to: {}", "[LOG]".cyan().bold(), log_path.white());
        }

        self.print_header();

        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut line = String::new();

        loop {
            print!("{}", PROMPT);
            io::stdout().flush().with_context(|| "Failed to flush stdout")?;

            line.clear();
            let n = input
                .read_line(&mut line)
                .with_context(|| "Failed to read operator input")?;
            if n == 0 {
                // EOF: operator ended the session
                break;
            }

            let payload = encode_input(&line).to_vec();
            self.print_tx(&payload);
            let response = self.exchange(&payload)?;
            self.print_rx(response.as_deref());

            self.log_exchange(&payload, response.as_deref())?;

            self.exchange_count += 1;
            if response.is_some() {
                self.response_count += 1;
            }
            println!();
        }

        self.print_summary();
        Ok(())
    }

    /// Perform one transmit/settle/read exchange.
    ///
    /// The port is opened fresh for the exchange and released when the scope
    /// ends; no connection is reused across exchanges.
    fn exchange(&self, payload: &[u8]) -> Result<Option<String>> {
        let mut conn = SerialConnection::open(self.config.port_config.clone())?;
        conn.write(payload)?;
        conn.flush()?;
        thread::sleep(self.config.settle_delay);
        conn.read_line()
    }

    /// Print the transmit line, stamped at print time
    fn print_tx(&self, payload: &[u8]) {
        println!("{}", render_tx(&self.stamp_prefix(), payload));
    }

    /// Print the response line, stamped after the read completes
    fn print_rx(&self, response: Option<&str>) {
        println!("{}", render_rx(&self.stamp_prefix(), response));
    }

    fn stamp_prefix(&self) -> String {
        if self.config.show_timestamps {
            format!("{} ", timestamp().dimmed())
        } else {
            String::new()
        }
    }

    /// Append one TX/RX pair to the log file, if logging is enabled
    fn log_exchange(&mut self, payload: &[u8], response: Option<&str>) -> Result<()> {
        if let Some(ref mut writer) = self.log_writer {
            writeln!(writer, "{}", log_line(payload, response))
                .with_context(|| "Failed to write log record")?;
            writer.flush().with_context(|| "Failed to flush log file")?;
        }
        Ok(())
    }

    /// Print session header
    fn print_header(&self) {
        println!("{}", "=".repeat(60).dimmed());
        println!(
            "{}: {}",
            "Port".cyan(),
            self.config.port_config.port_path.white()
        );
        println!(
            "{}: {}",
            "Baud".cyan(),
            self.config.port_config.baud_rate.to_string().white()
        );
        println!(
            "{}: {:?}",
            "Read timeout".cyan(),
            self.config.port_config.timeout
        );
        println!("{}: {:?}", "Settle delay".cyan(), self.config.settle_delay);
        println!("{}", "=".repeat(60).dimmed());
        println!();
    }

    /// Print summary statistics
    fn print_summary(&self) {
        println!("\n{}", "=".repeat(60).dimmed());
        println!("{}", "--- Session Summary ---".cyan().bold());
        println!("Exchanges: {}", self.exchange_count);
        println!(
            "Responses received: {}",
            if self.response_count < self.exchange_count {
                self.response_count.to_string().yellow().to_string()
            } else {
                self.response_count.to_string().green().to_string()
            }
        );
        if let Some(ref log) = self.config.log_file {
            println!("Log saved to: {}", log.white());
        }
        println!("{}", "=".repeat(60).dimmed());
    }
}

/// Run an interactive echo session with the given configuration
pub fn run_session(config: SessionConfig) -> Result<()> {
    let mut session = EchoSession::new(config);
    session.run()
}

/// One-shot exchange: transmit `text` and read a single response line.
pub fn send_once(
    port_config: PortConfig,
    text: &str,
    settle_delay: Duration,
) -> Result<Option<String>> {
    let payload = encode_input(text);
    let mut conn = SerialConnection::open(port_config)?;
    conn.write(payload)?;
    conn.flush()?;
    thread::sleep(settle_delay);
    conn.read_line()
}

/// Bytes to put on the wire for one line of operator input.
///
/// Only the trailing line terminator is removed; the rest of the input is
/// transmitted as-is. No range check, framing, or terminator is applied, so
/// "999", "-3", or "hello" all go out unmodified.
pub fn encode_input(line: &str) -> &[u8] {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.as_bytes()
}

/// Render the transmit line for one exchange
fn render_tx(prefix: &str, payload: &[u8]) -> String {
    format!(
        "{}{} {} byte(s): {}",
        prefix,
        "[TX]".cyan().bold(),
        payload.len(),
        format_bytes(payload).white()
    )
}

/// Render the response line; an absent response prints empty
fn render_rx(prefix: &str, response: Option<&str>) -> String {
    match response {
        Some(line) => format!("{}{} {}", prefix, "[RX]".green().bold(), line),
        None => format!("{}{}", prefix, "[RX]".yellow().bold()),
    }
}

/// Report for a completed one-shot exchange
pub fn render_send_report(port: &str, baud: u32, payload: &[u8], response: Option<&str>) -> String {
    format!(
        "{} Sent {} byte(s) to {} at {} baud: {}\n{}",
        "[TX]".cyan().bold(),
        payload.len(),
        port,
        baud,
        format_bytes(payload).white(),
        render_rx("", response)
    )
}

/// Hex rendering of transmitted bytes, e.g. `32 35 35`
pub fn format_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One timestamped log record for a TX/RX pair
fn log_line(payload: &[u8], response: Option<&str>) -> String {
    let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    format!(
        "[{}] TX {} | RX {}",
        stamp,
        format_bytes(payload),
        response.unwrap_or("")
    )
}

fn open_log(path: &str) -> Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("Failed to create log file: {}", path))?;
    Ok(BufWriter::new(file))
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_encode_single_digit() {
        assert_eq!(encode_input("5\n"), &[0x35]);
    }

    #[test]
    fn test_encode_three_digits() {
        assert_eq!(encode_input("255\n"), &[0x32, 0x35, 0x35]);
    }

    #[test]
    fn test_encode_strips_crlf_only() {
        assert_eq!(encode_input("7\r\n"), &[0x37]);
        assert_eq!(encode_input("7"), &[0x37]);
    }

    #[test]
    fn test_encode_applies_no_validation() {
        // Out-of-range and non-numeric input passes through untouched
        assert_eq!(encode_input("999\n"), b"999");
        assert_eq!(encode_input("-3\n"), b"-3");
        assert_eq!(encode_input("hello\n"), b"hello");
    }

    #[test]
    fn test_encode_adds_no_framing() {
        let inputs = ["5\n", "255\n", "hello\n", "\n"];
        for input in inputs {
            let payload = encode_input(input);
            assert!(payload.len() <= input.len());
            assert!(!payload.ends_with(b"\n"));
        }
    }

    #[test]
    fn test_encode_empty_input() {
        assert_eq!(encode_input("\n"), b"");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(&[0x32, 0x35, 0x35]), "32 35 35");
        assert_eq!(format_bytes(&[0x35]), "35");
        assert_eq!(format_bytes(&[]), "");
    }

    #[test]
    fn test_log_record_shape() {
        let record = log_line(b"255", Some("echo: 255"));
        assert!(record.contains("TX 32 35 35"));
        assert!(record.contains("RX echo: 255"));

        let empty = log_line(b"5", None);
        assert!(empty.ends_with("RX "));
    }

    #[test]
    fn test_log_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        let path_str = path.to_str().unwrap();

        let mut writer = open_log(path_str).unwrap();
        writeln!(writer, "{}", log_line(b"42", Some("echo: 42"))).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert!(contents.contains("TX 34 32"));
        assert!(contents.contains("RX echo: 42"));
    }

    #[test]
    fn test_tx_and_rx_lines_stamped_independently() {
        // Each line carries the stamp it was rendered with, so the response
        // line reflects the time of the read, not of the transmit
        let tx = render_tx("12:04:31.512 ", b"255");
        let rx = render_rx("12:04:31.618 ", Some("echo: 255"));
        assert!(tx.starts_with("12:04:31.512"));
        assert!(rx.starts_with("12:04:31.618"));
    }

    #[test]
    fn test_render_tx_reports_payload() {
        let line = render_tx("", &[0x32, 0x35, 0x35]);
        assert!(line.contains("[TX]"));
        assert!(line.contains("3 byte(s)"));
        assert!(line.contains("32 35 35"));
    }

    #[test]
    fn test_render_rx_empty_response() {
        let line = render_rx("", None);
        assert!(line.contains("[RX]"));
        assert!(!line.contains("error"));
    }

    #[test]
    fn test_send_report_reflects_completed_exchange() {
        let report = render_send_report("/dev/ttyACM0", 9600, b"255", Some("echo: 255"));
        assert!(report.contains("Sent 3 byte(s)"));
        assert!(report.contains("/dev/ttyACM0"));
        assert!(report.contains("9600"));
        assert!(report.contains("32 35 35"));
        assert!(report.contains("echo: 255"));

        let silent = render_send_report("/dev/ttyACM0", 9600, b"5", None);
        assert!(silent.contains("Sent 1 byte(s)"));
        assert!(silent.contains("[RX]"));
    }

    #[test]
    fn test_default_session_config() {
        let config = SessionConfig::default();
        assert_eq!(config.settle_delay, Duration::from_millis(50));
        assert!(config.show_timestamps);
        assert!(config.log_file.is_none());
    }
}
