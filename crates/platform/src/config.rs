//! Board configuration and constants
//!
//! Central values describing how the BMV31T001 audio module is wired to the
//! host board. Drivers and tests reference these rather than hardcoding them.

/// Baud rate the host update tool opens the serial port with.
pub const HOST_BAUD_RATE: u32 = 256_000;

/// Labels of the update header lines.
///
/// Used as line names on the mock bench and in log output.
pub mod line {
    /// Module supply enable
    pub const POWER: &str = "power";
    /// Single-wire status line (module busy indicator)
    pub const STATUS: &str = "status";
    /// Single-wire command line
    pub const COMMAND: &str = "command";
    /// ICP clock, shared with SPI SCK
    pub const CLOCK: &str = "clock";
    /// ICP data, shared with SPI MOSI
    pub const DATA: &str = "data";
    /// Flash chip select
    pub const CHIP_SELECT: &str = "chip_select";
}
