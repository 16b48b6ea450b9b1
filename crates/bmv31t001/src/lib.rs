//! BMV31T001 audio-content update driver
//!
//! Lets a host board reprogram the voice module's audio flash from a PC. The
//! PC streams CRC-checked frames over a serial link; the board answers each
//! with a one-byte ACK/NACK and drives the module's header lines.
//!
//! # Layers
//!
//! ```text
//! UpdateSession (update)      frame loop, session state, flash cursor
//!     ↓                ↓
//! IcpSession (icp)   SpiFlash (flash)
//!     ↓                ↓
//! IcpTransport       SpiPort (platform)
//!     ↓
//! Lines (lines) → FlexPin (platform)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use bmv31t001::config::UpdateConfig;
//! use bmv31t001::lines::Lines;
//! use bmv31t001::update::{UpdateResult, UpdateSession};
//! # fn run<S, P, D, SPI>(serial: S, lines: Lines<P>, delay: D, spi: SPI) -> Result<(), bmv31t001::Error>
//! # where S: platform::ByteStream, P: platform::FlexPin, D: embedded_hal::delay::DelayNs, SPI: platform::SpiPort {
//! let mut session = UpdateSession::new(serial, lines, delay, spi, UpdateConfig::default());
//! session.begin_update_session()?;
//! if session.is_update_requested()? {
//!     match session.execute_update()? {
//!         UpdateResult::Completed => { /* new audio is live */ }
//!         UpdateResult::TimedOut => { /* host went away */ }
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `defmt`: log through defmt and derive `defmt::Format`
//! - `tracing`: log through `tracing` (host builds)

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

#[macro_use]
mod log;

pub mod config;
pub mod crc8;
pub mod error;
pub mod flash;
pub mod frame;
pub mod icp;
pub mod lines;
pub mod update;

pub use error::{Error, FrameError};
pub use update::{FrameOutcome, UpdateResult, UpdateSession};
