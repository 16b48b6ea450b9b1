//! Driver error types

use embedded_hal::{digital, spi};
use thiserror_no_std::Error;

/// Errors surfaced by the update driver.
///
/// Collaborator failures are reduced to their `embedded-hal` / `embedded-io`
/// kind so the driver does not carry one error type parameter per line.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A GPIO line could not be driven, sampled or reconfigured
    #[error("GPIO line error: {0:?}")]
    Pin(digital::ErrorKind),

    /// The SPI bus reported a failure
    #[error("SPI bus error: {0:?}")]
    Spi(spi::ErrorKind),

    /// The host byte stream reported a failure
    #[error("serial stream error: {0:?}")]
    Serial(embedded_io::ErrorKind),

    /// The module never acknowledged the requested ICP mode
    #[error("ICP handshake failed after {attempts} attempts")]
    HandshakeExhausted {
        /// Attempts made before giving up
        attempts: u8,
    },

    /// The module entered ICP mode but the flash did not answer with a valid
    /// SFDP signature
    #[error("flash SFDP signature mismatch")]
    SfdpMismatch,

    /// The flash reported write-in-progress for the whole polling budget
    #[error("flash still busy after {polls} status polls")]
    FlashBusyForever {
        /// Status polls issued
        polls: u32,
    },

    /// A single page program was asked to write more than one page
    #[error("page program of {len} bytes exceeds the page size")]
    PageOverflow {
        /// Requested length
        len: usize,
    },
}

impl Error {
    /// Short static label, for log backends that cannot format the enum.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pin(_) => "pin",
            Self::Spi(_) => "spi",
            Self::Serial(_) => "serial",
            Self::HandshakeExhausted { .. } => "handshake exhausted",
            Self::SfdpMismatch => "sfdp mismatch",
            Self::FlashBusyForever { .. } => "flash busy",
            Self::PageOverflow { .. } => "page overflow",
        }
    }
}

pub(crate) fn pin_err<E: digital::Error>(e: E) -> Error {
    Error::Pin(e.kind())
}

pub(crate) fn spi_err<E: spi::Error>(e: E) -> Error {
    Error::Spi(e.kind())
}

pub(crate) fn serial_err<E: embedded_io::Error>(e: E) -> Error {
    Error::Serial(e.kind())
}

/// Reasons a received byte sequence is not a valid frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Fewer bytes than the header and the declared length require
    #[error("frame truncated")]
    TooShort,

    /// The first two bytes are not a known sync pair
    #[error("unknown sync pair")]
    BadSync,

    /// Trailing CRC does not match the computed one
    #[error("CRC mismatch: computed {expected:#04x}, received {actual:#04x}")]
    CrcMismatch {
        /// CRC computed over the length byte and payload
        expected: u8,
        /// CRC carried by the frame
        actual: u8,
    },

    /// Payload does not fit the encoder's frame buffer
    #[error("payload too long for one frame")]
    PayloadTooLong,
}

impl FrameError {
    /// Short static label, for log output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TooShort => "too short",
            Self::BadSync => "bad sync",
            Self::CrcMismatch { .. } => "crc mismatch",
            Self::PayloadTooLong => "payload too long",
        }
    }
}
