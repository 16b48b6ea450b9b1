//! In-circuit programming (ICP)
//!
//! The module's MCU exposes a two-wire programming port on the clock and data
//! header lines. [`IcpTransport`] clocks individual words over it and
//! [`IcpSession`] runs the reset-and-match handshake that puts the MCU into a
//! given programming mode.

mod session;
mod transport;

pub use session::{IcpSession, IcpState};
pub use transport::{BitTiming, IcpTransport};

/// Two-bit ICP mode requested during the pattern match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mode(u8);

impl Mode {
    /// Pin-function programming; used to route the flash to the header.
    pub const SPI: Self = Self(0x02);

    /// Build a mode from its two-bit code.
    pub const fn new(bits: u8) -> Option<Self> {
        if bits <= 0b11 {
            Some(Self(bits))
        } else {
            None
        }
    }

    /// Two-bit mode code.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether a 3-bit acknowledgement confirms this mode.
    ///
    /// The MCU answers with a framing bit above the echoed mode; only the
    /// mode bits are compared.
    pub const fn accepts(self, ack: u8) -> bool {
        ack & 0b11 == self.0
    }
}
