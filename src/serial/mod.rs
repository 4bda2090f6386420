//! Serial link verification module
//!
//! This module provides functionality for:
//! - Opening and configuring the UART connection to the device under test
//! - Listing available serial ports (USB-to-serial adapters)
//! - Running the interactive prompt/transmit/read echo loop

pub mod port;
pub mod session;

pub use port::{PortConfig, SerialConnection};
pub use session::{EchoSession, SessionConfig};
