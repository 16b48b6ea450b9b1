//! Protocol constants and driver configuration
//!
//! The timing, retry and idle values below are dictated by the module's
//! silicon and the host update tool. They are not tunables; changing them
//! breaks programming on real parts. The few knobs that are board policy live
//! in [`UpdateConfig`].

use platform::UartConfig;

// ─── Serial update protocol ──────────────────────────────────────────────────

/// Sync pair opening a control frame
pub const SYNC_CONTROL: [u8; 2] = [0xAA, 0x23];
/// Sync pair opening a data frame
pub const SYNC_DATA: [u8; 2] = [0x55, 0x23];
/// Sync, sync, length
pub const HEADER_LEN: usize = 3;
/// Reserved byte plus CRC following the payload
pub const TRAILER_LEN: usize = 2;
/// Positive reply byte
pub const ACK: u8 = 0x3E;
/// Negative reply byte
pub const NACK: u8 = 0xE3;
/// Receive buffer for one frame tail (payload, reserved, CRC)
pub const FRAME_BUFFER_LEN: usize = 260;

/// Idle polls before `poll_update_frame` reports no activity
pub const IDLE_POLLS: u32 = 2_000;
/// Spacing of idle polls
pub const IDLE_POLL_INTERVAL_US: u32 = 50;

// ─── ICP bit timing ──────────────────────────────────────────────────────────

/// Data setup and clock-low hold for program-profile bits
pub const EDGE_US: u32 = 1;
/// Clock-high hold after an address-profile bit
pub const ADDRESS_HIGH_US: u32 = 4;
/// Spacing between acknowledgement samples
pub const ACK_SAMPLE_US: u32 = 5;
/// Spacing between data-word samples
pub const READ_SAMPLE_US: u32 = 2;
/// Internal write/read cycle after a data word
pub const WORD_SETTLE_US: u32 = 2_000;
/// Final hold after a written data word
pub const WORD_TAIL_US: u32 = 5;

/// Fixed part of the pattern-match word; the mode goes in the low two bits
pub const PATTERN: u16 = 0x4A8;
/// Bits emitted from the pattern word
pub const PATTERN_BITS: u8 = 12;
/// Bits in an ICP address
pub const ADDRESS_BITS: u8 = 12;
/// Bits in an ICP data word
pub const DATA_BITS: u8 = 14;
/// Bits in the acknowledgement
pub const ACK_BITS: u8 = 3;

// ─── ICP session ─────────────────────────────────────────────────────────────

/// Handshake attempts before giving up
pub const HANDSHAKE_ATTEMPTS: u8 = 5;
/// READY pulse: clock held low
pub const READY_LOW_US: u32 = 160;
/// MATCH pulse: clock held high before the pattern word
pub const MATCH_HIGH_US: u32 = 84;
/// Settling clocks after a matched handshake
pub const DUMMY_CLOCKS: u16 = 512;

/// All lines low, module unpowered
pub const RESET_HOLD_MS: u32 = 10;
/// Additional discharge time before the entry sequence proper
pub const RESET_SETTLE_MS: u32 = 5;
/// Clock parked low before power is applied
pub const CLOCK_PARK_MS: u32 = 1;
/// Power-up time before the data line is raised
pub const POWER_UP_MS: u32 = 2;

// ─── SPI hand-over ───────────────────────────────────────────────────────────

/// ICP address of the pin-function register
pub const SPI_MODE_ADDRESS: u16 = 0x0020;
/// Words written at [`SPI_MODE_ADDRESS`] to route the flash to the header
pub const SPI_MODE_WORDS: [u16; 4] = [0x0000, 0x0000, 0x0007, 0x0000];
/// Settle time after the SPI port takes the shared lines
pub const SPI_ATTACH_SETTLE_MS: u32 = 10;
/// Expected first bytes of the SFDP region
pub const SFDP_SIGNATURE: [u8; 4] = *b"SFDP";
/// SFDP reads before the hand-over is declared failed
pub const SFDP_ATTEMPTS: u8 = 3;

// ─── Power sequencing ────────────────────────────────────────────────────────

/// Power-off time of a full module power cycle
pub const POWER_CYCLE_OFF_MS: u32 = 500;
/// Wait after returning the lines to single-wire mode on session exit
pub const SESSION_EXIT_SETTLE_MS: u32 = 10;

// ─── Flash geometry ──────────────────────────────────────────────────────────

/// Program page size
pub const PAGE_SIZE: usize = 256;
/// Session-wide sub-block granularity used to split data frames
pub const SUB_BLOCK: u32 = 64;
/// Largest sub-block remainder that still triggers a split
pub const SPLIT_THRESHOLD: u32 = 59;
/// Default status-poll budget for one program or erase
pub const DEFAULT_MAX_STATUS_POLLS: u32 = 100_000_000;

/// SPI flash driver settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashConfig {
    /// Status polls issued by `wait_for_write_end` before reporting
    /// `FlashBusyForever`
    pub max_status_polls: u32,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            max_status_polls: DEFAULT_MAX_STATUS_POLLS,
        }
    }
}

/// Update session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateConfig {
    /// Baud rate the host tool uses; the board applies it when opening the
    /// serial port
    pub baud_rate: u32,
    /// Flash driver settings
    pub flash: FlashConfig,
}

impl UpdateConfig {
    /// Serial settings matching the host update tool.
    pub fn uart(&self) -> UartConfig {
        UartConfig {
            baud_rate: self.baud_rate,
            ..UartConfig::default()
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            baud_rate: platform::config::HOST_BAUD_RATE,
            flash: FlashConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::{Parity, StopBits};

    #[test]
    fn default_uart_is_host_tool_setting() {
        let uart = UpdateConfig::default().uart();
        assert_eq!(uart.baud_rate, 256_000);
        assert_eq!(uart.data_bits, 8);
        assert_eq!(uart.parity, Parity::None);
        assert_eq!(uart.stop_bits, StopBits::One);
    }

    #[test]
    fn frame_buffer_holds_largest_tail() {
        assert!(FRAME_BUFFER_LEN >= usize::from(u8::MAX) + TRAILER_LEN);
    }

    #[test]
    fn split_threshold_is_inside_sub_block() {
        assert!(SPLIT_THRESHOLD < SUB_BLOCK);
        assert_eq!(PAGE_SIZE.checked_rem(SUB_BLOCK as usize), Some(0));
    }
}
