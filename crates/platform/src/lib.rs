//! Hardware Abstraction Layer (HAL) for the BMV31T001 update header
//!
//! This crate provides the trait seams the update driver is written
//! against, so it can be developed and tested without a module attached.
//!
//! # Architecture Layers
//!
//! ```text
//! Update driver (bmv31t001 crate)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Board HAL (embedded-hal / embedded-io implementations)
//! ```
//!
//! # Abstractions
//!
//! - [`gpio`] - Direction-switchable lines ([`FlexPin`])
//! - [`peripheral`] - Shared-pin SPI port ([`SpiPort`]) and the host
//!   serial link ([`ByteStream`])
//! - [`mocks`] - Recorded bench with a NOR flash model (`std` only)
//!
//! # Features
//!
//! - `std`: Enable standard library support and the mocks
//! - `defmt`: Enable defmt logging

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)] // hardware accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

#[cfg(all(feature = "std", not(test)))]
extern crate std;

pub mod config;
pub mod gpio;
pub mod mocks;
pub mod peripheral;

// Re-export GPIO types
pub use gpio::{FlexPin, InputPin, LineMode, OutputPin, PinState, Pull};

// Re-export peripheral types
pub use peripheral::{ByteStream, Parity, SpiPort, StopBits, UartConfig};
