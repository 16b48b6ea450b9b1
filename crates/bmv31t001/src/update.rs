//! Update session orchestrator
//!
//! Listens on the host byte stream, validates frames and drives the ICP and
//! flash layers. A session runs:
//!
//! 1. `COMSPI`: ICP handshake, route the flash to the header, check SFDP.
//! 2. `COMCE`: erase the flash.
//! 3. Data frames: program each chunk at the running flash cursor.
//! 4. `COMORD`: power-cycle the module back into play mode.
//!
//! Every frame gets a one-byte reply except unrecognised control frames and
//! unknown sync pairs, which are dropped silently.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::PinState;
use embedded_io::ReadExactError;
use heapless::Vec;
use platform::gpio::FlexPin;
use platform::peripheral::{ByteStream, SpiPort};

use crate::config::{
    UpdateConfig, ACK, FRAME_BUFFER_LEN, HEADER_LEN, IDLE_POLLS, IDLE_POLL_INTERVAL_US, NACK,
    SESSION_EXIT_SETTLE_MS, SFDP_ATTEMPTS, SFDP_SIGNATURE, SPI_ATTACH_SETTLE_MS, SPI_MODE_ADDRESS,
    SPI_MODE_WORDS, SPLIT_THRESHOLD, SUB_BLOCK, TRAILER_LEN,
};
use crate::error::{pin_err, serial_err, spi_err, Error};
use crate::flash::SpiFlash;
use crate::frame::{self, Command, FrameKind};
use crate::icp::{IcpSession, IcpState, IcpTransport, Mode};
use crate::lines::Lines;

/// Result of one [`UpdateSession::poll_update_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameOutcome {
    /// Frame processed, ACK sent
    Ack,
    /// Frame rejected, NACK sent
    Nack,
    /// `COMORD` processed; the module is back in play mode
    SessionComplete,
    /// Nothing arrived within the idle budget
    Idle,
    /// Bytes consumed without a reply (unknown sync pair or command)
    Ignored,
}

/// Result of [`UpdateSession::execute_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateResult {
    /// The host finished the session with `COMORD`
    Completed,
    /// The host went quiet before finishing
    TimedOut,
}

/// One page program issued for a data chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWrite {
    /// Offset into the chunk (and from the flash cursor)
    pub offset: u8,
    /// Bytes to program
    pub len: u8,
}

/// Split a data chunk of `length` bytes into page programs.
///
/// `running_total` is the session byte count including this chunk. When the
/// total's remainder modulo [`SUB_BLOCK`] is at most [`SPLIT_THRESHOLD`], the
/// last `remainder` bytes are programmed separately so the first write ends
/// on a sub-block boundary. Zero-length writes are omitted.
pub fn plan_page_writes(length: u8, running_total: u32) -> Vec<PageWrite, 2> {
    #[allow(clippy::arithmetic_side_effects)] // SUB_BLOCK is non-zero
    let remainder = running_total % SUB_BLOCK;
    let head = if remainder <= SPLIT_THRESHOLD {
        // remainder < 64, always fits
        length.saturating_sub(u8::try_from(remainder).unwrap_or(u8::MAX))
    } else {
        length
    };
    let tail = length.saturating_sub(head);

    let mut writes = Vec::new();
    if head > 0 {
        writes.push(PageWrite { offset: 0, len: head }).ok();
    }
    if tail > 0 {
        writes.push(PageWrite { offset: head, len: tail }).ok();
    }
    writes
}

/// Fill `buf` from the stream. `Ok(false)` if the stream ended first.
fn read_frame_bytes<S: ByteStream>(stream: &mut S, buf: &mut [u8]) -> Result<bool, Error> {
    match stream.read_bytes(buf) {
        Ok(()) => Ok(true),
        Err(ReadExactError::UnexpectedEof) => Ok(false),
        Err(ReadExactError::Other(e)) => Err(serial_err(e)),
    }
}

/// Host-driven update session.
///
/// Owns the byte stream, the header lines, the delay source and the SPI
/// port for the duration of the update. Use [`into_parts`](Self::into_parts)
/// to take them back.
pub struct UpdateSession<S, P, D, SPI> {
    stream: S,
    lines: Lines<P>,
    delay: D,
    spi: SPI,
    config: UpdateConfig,
    icp: IcpSession,
    spi_mode: bool,
    spi_attached: bool,
    flash_cursor: u32,
    byte_counter: u32,
    buffer: [u8; FRAME_BUFFER_LEN],
}

impl<S, P, D, SPI> UpdateSession<S, P, D, SPI>
where
    S: ByteStream,
    P: FlexPin,
    D: DelayNs,
    SPI: SpiPort,
{
    /// Create a session over the given collaborators.
    pub fn new(stream: S, lines: Lines<P>, delay: D, spi: SPI, config: UpdateConfig) -> Self {
        Self {
            stream,
            lines,
            delay,
            spi,
            config,
            icp: IcpSession::new(),
            spi_mode: false,
            spi_attached: false,
            flash_cursor: 0,
            byte_counter: 0,
            buffer: [0; FRAME_BUFFER_LEN],
        }
    }

    /// Take the collaborators back.
    pub fn into_parts(self) -> (S, Lines<P>, D, SPI) {
        (self.stream, self.lines, self.delay, self.spi)
    }

    /// Next flash address a data chunk is written to.
    pub fn flash_cursor(&self) -> u32 {
        self.flash_cursor
    }

    /// Audio bytes received since the session started.
    pub fn byte_counter(&self) -> u32 {
        self.byte_counter
    }

    /// Whether the flash is currently routed to the header.
    pub fn in_spi_mode(&self) -> bool {
        self.spi_mode
    }

    /// State of the last ICP handshake.
    pub fn icp_state(&self) -> IcpState {
        self.icp.state()
    }

    /// Active configuration.
    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Prepare the header for an update. Call once before polling.
    pub fn begin_update_session(&mut self) -> Result<(), Error> {
        self.lines.prepare_update()?;
        log!(info, "update: listening at {} baud", self.config.baud_rate);
        Ok(())
    }

    /// `true` when the host has started sending.
    pub fn is_update_requested(&mut self) -> Result<bool, Error> {
        self.stream.available().map_err(serial_err)
    }

    /// Run frames until the host ends the session or goes quiet.
    pub fn execute_update(&mut self) -> Result<UpdateResult, Error> {
        loop {
            match self.poll_update_frame()? {
                FrameOutcome::SessionComplete => return Ok(UpdateResult::Completed),
                FrameOutcome::Idle => return Ok(UpdateResult::TimedOut),
                FrameOutcome::Ack | FrameOutcome::Nack | FrameOutcome::Ignored => {}
            }
        }
    }

    /// Wait for and process one frame.
    ///
    /// Polls the stream every [`IDLE_POLL_INTERVAL_US`] for at most
    /// [`IDLE_POLLS`] polls before reporting [`FrameOutcome::Idle`].
    pub fn poll_update_frame(&mut self) -> Result<FrameOutcome, Error> {
        for _ in 0..IDLE_POLLS {
            if self.stream.available().map_err(serial_err)? {
                return self.receive_frame();
            }
            self.delay.delay_us(IDLE_POLL_INTERVAL_US);
        }
        Ok(FrameOutcome::Idle)
    }

    fn reply(&mut self, byte: u8) -> Result<(), Error> {
        self.stream.write_byte(byte).map_err(serial_err)
    }

    fn ack(&mut self) -> Result<FrameOutcome, Error> {
        self.reply(ACK)?;
        Ok(FrameOutcome::Ack)
    }

    fn nack(&mut self) -> Result<FrameOutcome, Error> {
        self.reply(NACK)?;
        Ok(FrameOutcome::Nack)
    }

    fn receive_frame(&mut self) -> Result<FrameOutcome, Error> {
        let mut header = [0u8; HEADER_LEN];
        if !read_frame_bytes(&mut self.stream, &mut header)? {
            log!(debug, "update: stream ended inside a header");
            return Ok(FrameOutcome::Ignored);
        }
        let [sync0, sync1, length] = header;
        let Some(kind) = FrameKind::from_sync([sync0, sync1]) else {
            log!(debug, "update: dropped unknown sync {} {}", sync0, sync1);
            return Ok(FrameOutcome::Ignored);
        };

        let tail_len = usize::from(length).saturating_add(TRAILER_LEN);
        let Some(tail) = self.buffer.get_mut(..tail_len) else {
            return self.nack();
        };
        if !read_frame_bytes(&mut self.stream, tail)? {
            log!(warn, "update: frame truncated, {} bytes expected", tail_len);
            return self.nack();
        }

        let command = match frame::verify_tail(length, tail) {
            Ok(payload) => Command::from_payload(payload),
            Err(e) => {
                log!(warn, "update: frame rejected ({})", e.label());
                return self.nack();
            }
        };

        match kind {
            FrameKind::Control => self.handle_command(command),
            FrameKind::Data => self.handle_data(length),
        }
    }

    fn handle_command(&mut self, command: Option<Command>) -> Result<FrameOutcome, Error> {
        let Some(command) = command else {
            log!(debug, "update: ignored unrecognised command");
            return Ok(FrameOutcome::Ignored);
        };
        log!(info, "update: {}", command.label());
        match command {
            Command::SwitchToSpi => self.start_session(),
            Command::ChipErase => self.erase(),
            Command::Finish => self.finish(),
        }
    }

    fn start_session(&mut self) -> Result<FrameOutcome, Error> {
        self.flash_cursor = 0;
        self.byte_counter = 0;
        self.spi_mode = false;
        self.release_spi()?;
        match self.switch_to_spi() {
            Ok(()) => {
                self.spi_mode = true;
                self.ack()
            }
            Err(e @ (Error::HandshakeExhausted { .. } | Error::SfdpMismatch)) => {
                log!(warn, "update: SPI hand-over failed ({})", e.label());
                self.abort()
            }
            Err(e) => Err(e),
        }
    }

    /// Put the module's flash on the header SPI lines.
    fn switch_to_spi(&mut self) -> Result<(), Error> {
        self.icp.enter(&mut self.lines, &mut self.delay, Mode::SPI)?;

        let mut icp = IcpTransport::new(&mut self.lines.clock, &mut self.lines.data, &mut self.delay);
        icp.send_address(SPI_MODE_ADDRESS)?;
        for word in SPI_MODE_WORDS {
            icp.send_data(word)?;
        }

        self.spi.begin().map_err(spi_err)?;
        self.spi_attached = true;
        self.lines
            .chip_select
            .set_as_output(PinState::High)
            .map_err(pin_err)?;
        self.delay.delay_ms(SPI_ATTACH_SETTLE_MS);

        let mut flash = SpiFlash::new(&mut self.spi, &mut self.lines.chip_select, self.config.flash);
        for attempt in 1..=SFDP_ATTEMPTS {
            let mut signature = [0u8; 4];
            flash.read_sfdp(0, &mut signature)?;
            if signature == SFDP_SIGNATURE {
                log!(info, "update: flash attached");
                return Ok(());
            }
            log!(debug, "update: SFDP read {} returned no signature", attempt);
        }
        Err(Error::SfdpMismatch)
    }

    fn release_spi(&mut self) -> Result<(), Error> {
        if self.spi_attached {
            self.spi.end().map_err(spi_err)?;
            self.spi_attached = false;
        }
        Ok(())
    }

    /// Failed `COMSPI`: NACK and put the module back into play mode.
    fn abort(&mut self) -> Result<FrameOutcome, Error> {
        let outcome = self.nack()?;
        self.lines.power_cycle(&mut self.delay)?;
        self.flash_cursor = 0;
        self.byte_counter = 0;
        self.spi_mode = false;
        self.release_spi()?;
        self.lines.restore_single_wire()?;
        Ok(outcome)
    }

    fn erase(&mut self) -> Result<FrameOutcome, Error> {
        if !self.spi_mode {
            log!(warn, "update: erase refused outside SPI mode");
            return self.nack();
        }
        SpiFlash::new(&mut self.spi, &mut self.lines.chip_select, self.config.flash).chip_erase()?;
        self.ack()
    }

    fn finish(&mut self) -> Result<FrameOutcome, Error> {
        self.reply(ACK)?;
        self.lines.power_cycle(&mut self.delay)?;
        self.flash_cursor = 0;
        self.byte_counter = 0;
        self.spi_mode = false;
        self.release_spi()?;
        self.lines.restore_single_wire()?;
        self.delay.delay_ms(SESSION_EXIT_SETTLE_MS);
        self.icp.reset();
        log!(info, "update: session complete");
        Ok(FrameOutcome::SessionComplete)
    }

    /// Program the verified chunk held at the start of the receive buffer.
    fn handle_data(&mut self, length: u8) -> Result<FrameOutcome, Error> {
        if !self.spi_mode {
            log!(warn, "update: data frame outside SPI mode");
            return self.nack();
        }
        let total = self.byte_counter.wrapping_add(u32::from(length));

        let mut flash = SpiFlash::new(&mut self.spi, &mut self.lines.chip_select, self.config.flash);
        for write in plan_page_writes(length, total) {
            let start = usize::from(write.offset);
            let end = start.saturating_add(usize::from(write.len));
            let Some(chunk) = self.buffer.get(start..end) else {
                continue;
            };
            let addr = self.flash_cursor.wrapping_add(u32::from(write.offset));
            flash.page_write(addr, chunk)?;
        }

        // Counter and cursor only move once the whole chunk is programmed.
        self.byte_counter = total;
        self.flash_cursor = self.flash_cursor.wrapping_add(u32::from(length));
        log!(
            debug,
            "update: {} bytes written, cursor {}",
            length,
            self.flash_cursor
        );
        self.ack()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn plan(length: u8, total: u32) -> std::vec::Vec<(u8, u8)> {
        plan_page_writes(length, total)
            .iter()
            .map(|w| (w.offset, w.len))
            .collect()
    }

    #[test]
    fn chunk_ending_on_sub_block_is_one_write() {
        assert_eq!(plan(64, 64), vec![(0, 64)]);
        assert_eq!(plan(64, 128), vec![(0, 64)]);
    }

    #[test]
    fn chunk_crossing_sub_block_is_split_at_boundary() {
        // 60 + 64 = 124, remainder 60 > 59
        assert_eq!(plan(64, 124), vec![(0, 64)]);
        // 10 + 64 = 74, remainder 10
        assert_eq!(plan(64, 74), vec![(0, 54), (54, 10)]);
    }

    #[test]
    fn remainder_larger_than_chunk_is_one_write() {
        // 50 + 5 = 55, remainder 55 > 5
        assert_eq!(plan(5, 55), vec![(0, 5)]);
    }

    #[test]
    fn remainder_above_threshold_is_one_write() {
        // 252 % 64 == 60
        assert_eq!(plan(200, 252), vec![(0, 200)]);
    }

    #[test]
    fn empty_chunk_writes_nothing() {
        assert!(plan(0, 0).is_empty());
        assert!(plan(0, 10).is_empty());
    }
}
