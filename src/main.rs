//! Serial Echo
//!
//! An interactive command-line tool for verifying a basic microcontroller
//! serial link. Each exchange sends one line of operator input over the UART
//! exactly as typed, waits briefly for the firmware to respond, and prints
//! both the transmitted bytes and the echoed line.
//!
//! # Usage
//!
//! ```bash
//! # List available serial ports
//! serial-echo list
//!
//! # Run the interactive echo loop with the classroom defaults
//! serial-echo session
//!
//! # Override the port and baud rate
//! serial-echo session -p /dev/ttyACM0 -b 115200
//!
//! # One-shot exchange
//! serial-echo send -p /dev/ttyACM0 255
//! ```

mod serial;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;

use serial::session;
use serial::{port, PortConfig, SessionConfig};

/// Serial Echo
///
/// Interactive serial link checker
#[derive(Parser)]
#[command(name = "serial-echo")]
#[command(version = "0.1.0")]
#[command(about = "Send operator input over a serial link and print the device echo")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the interactive echo loop
    Session {
        /// Serial port path
        #[arg(short, long, default_value = port::DEFAULT_PORT)]
        port: String,

        /// Baud rate
        #[arg(short, long, default_value_t = port::DEFAULT_BAUD)]
        baud: u32,

        /// Read timeout in milliseconds
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,

        /// Settling delay between transmit and read, in milliseconds
        #[arg(long, default_value_t = 50)]
        delay_ms: u64,

        /// Log exchanges to file
        #[arg(short, long)]
        log: Option<String>,

        /// Disable timestamps
        #[arg(long)]
        no_timestamps: bool,
    },

    /// Send a single value and print the response
    Send {
        /// Text to transmit (sent as-is, no framing added)
        text: String,

        /// Serial port path
        #[arg(short, long, default_value = port::DEFAULT_PORT)]
        port: String,

        /// Baud rate
        #[arg(short, long, default_value_t = port::DEFAULT_BAUD)]
        baud: u32,

        /// Read timeout in milliseconds
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,

        /// Settling delay between transmit and read, in milliseconds
        #[arg(long, default_value_t = 50)]
        delay_ms: u64,
    },

    /// List available serial ports
    List,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Session {
            port,
            baud,
            timeout_ms,
            delay_ms,
            log,
            no_timestamps,
        } => {
            let port_config = PortConfig::new(&port)
                .with_baud_rate(baud)
                .with_timeout(Duration::from_millis(timeout_ms));

            let config = SessionConfig {
                port_config,
                settle_delay: Duration::from_millis(delay_ms),
                show_timestamps: !no_timestamps,
                log_file: log,
            };

            session::run_session(config)
        }

        Commands::Send {
            text,
            port,
            baud,
            timeout_ms,
            delay_ms,
        } => {
            let port_config = PortConfig::new(&port)
                .with_baud_rate(baud)
                .with_timeout(Duration::from_millis(timeout_ms));

            // Report only after the exchange completes; a failed open must
            // not claim a transmit happened
            let response =
                session::send_once(port_config, &text, Duration::from_millis(delay_ms))?;
            println!(
                "{}",
                session::render_send_report(
                    &port,
                    baud,
                    session::encode_input(&text),
                    response.as_deref()
                )
            );

            Ok(())
        }

        Commands::List => port::print_ports(),
    }
}
