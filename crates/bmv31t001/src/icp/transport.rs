//! Bit-level ICP transport
//!
//! Clocks fixed-width words over the two ICP wires. Every edge and hold time
//! here is a device contract; the module latches data on the rising clock
//! edge and samples its own output after the falling edge.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{OutputPin, PinState};
use platform::gpio::{FlexPin, Pull};

use crate::config::{
    ACK_BITS, ACK_SAMPLE_US, ADDRESS_BITS, ADDRESS_HIGH_US, DATA_BITS, DUMMY_CLOCKS, EDGE_US,
    PATTERN, PATTERN_BITS, READ_SAMPLE_US, WORD_SETTLE_US, WORD_TAIL_US,
};
use crate::error::{pin_err, Error};

use super::Mode;

/// Edge timing used for one transmitted bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitTiming {
    /// Pattern and data words: data setup 1 µs, clock low 1 µs, then high.
    Program,
    /// Address words: clock low 1 µs, clock high held 4 µs.
    Address,
}

fn bit(value: u16, index: u8) -> bool {
    value
        .checked_shr(u32::from(index))
        .is_some_and(|shifted| shifted & 1 != 0)
}

/// Two-wire ICP link.
///
/// Borrows the clock and data lines for the duration of a programming
/// exchange. The data line changes direction for acknowledgement and
/// data-word reads.
pub struct IcpTransport<CK, DA, D> {
    clock: CK,
    data: DA,
    delay: D,
}

impl<CK, DA, D> IcpTransport<CK, DA, D>
where
    CK: OutputPin,
    DA: FlexPin,
    D: DelayNs,
{
    /// Create a transport over the given lines.
    pub fn new(clock: CK, data: DA, delay: D) -> Self {
        Self { clock, data, delay }
    }

    /// Give the lines back.
    pub fn release(self) -> (CK, DA, D) {
        (self.clock, self.data, self.delay)
    }

    fn clock(&mut self, level: PinState) -> Result<(), Error> {
        self.clock.set_state(level).map_err(pin_err)
    }

    fn data(&mut self, level: PinState) -> Result<(), Error> {
        self.data.set_state(level).map_err(pin_err)
    }

    fn sample(&mut self) -> Result<bool, Error> {
        self.data.is_high().map_err(pin_err)
    }

    /// Drive the clock to `level` and hold it for `us` microseconds.
    pub fn hold_clock(&mut self, level: PinState, us: u32) -> Result<(), Error> {
        self.clock(level)?;
        self.delay.delay_us(us);
        Ok(())
    }

    /// Put one bit on the data line and clock it in.
    pub fn send_bit(&mut self, value: bool, timing: BitTiming) -> Result<(), Error> {
        self.data(PinState::from(value))?;
        match timing {
            BitTiming::Program => {
                self.delay.delay_us(EDGE_US);
                self.hold_clock(PinState::Low, EDGE_US)?;
                self.clock(PinState::High)
            }
            BitTiming::Address => {
                self.hold_clock(PinState::Low, EDGE_US)?;
                self.hold_clock(PinState::High, ADDRESS_HIGH_US)
            }
        }
    }

    /// Send the 12-bit pattern-match word for `mode`, MSB first, and leave
    /// the data line high.
    pub fn send_pattern_word(&mut self, mode: Mode) -> Result<(), Error> {
        let word = PATTERN | u16::from(mode.bits());
        for index in (0..PATTERN_BITS).rev() {
            self.send_bit(bit(word, index), BitTiming::Program)?;
        }
        self.data(PinState::High)
    }

    /// Send a 12-bit address, LSB first.
    pub fn send_address(&mut self, addr: u16) -> Result<(), Error> {
        self.data.set_as_output(PinState::High).map_err(pin_err)?;
        for index in 0..ADDRESS_BITS {
            self.send_bit(bit(addr, index), BitTiming::Address)?;
        }
        Ok(())
    }

    /// Send a 14-bit data word, LSB first, followed by the write cycle.
    pub fn send_data(&mut self, word: u16) -> Result<(), Error> {
        self.data.set_as_output(PinState::High).map_err(pin_err)?;
        for index in 0..DATA_BITS {
            self.send_bit(bit(word, index), BitTiming::Program)?;
        }
        self.delay.delay_us(EDGE_US);
        self.hold_clock(PinState::Low, EDGE_US)?;
        self.hold_clock(PinState::High, WORD_SETTLE_US)?;
        self.hold_clock(PinState::Low, EDGE_US)?;
        self.hold_clock(PinState::High, WORD_TAIL_US)
    }

    /// Read the 3-bit acknowledgement, MSB first.
    ///
    /// The data line is released for the read and driven high again after.
    pub fn read_ack(&mut self) -> Result<u8, Error> {
        self.data.set_as_input(Pull::Floating).map_err(pin_err)?;
        self.clock(PinState::Low)?;
        let mut ack = 0u8;
        for _ in 0..ACK_BITS {
            self.clock(PinState::High)?;
            self.clock(PinState::Low)?;
            ack = ack.wrapping_shl(1) | u8::from(self.sample()?);
            self.delay.delay_us(ACK_SAMPLE_US);
        }
        self.clock(PinState::High)?;
        self.data.set_as_output(PinState::High).map_err(pin_err)?;
        Ok(ack)
    }

    /// Read a 14-bit data word, LSB first, followed by the read cycle.
    ///
    /// The data line is left released.
    pub fn read_data(&mut self) -> Result<u16, Error> {
        self.data.set_as_input(Pull::Floating).map_err(pin_err)?;
        self.clock(PinState::Low)?;
        let mut word = 0u16;
        for index in 0..DATA_BITS {
            self.clock(PinState::Low)?;
            if self.sample()? {
                word |= 1u16.wrapping_shl(u32::from(index));
            }
            self.hold_clock(PinState::High, READ_SAMPLE_US)?;
        }
        self.hold_clock(PinState::High, READ_SAMPLE_US)?;
        self.hold_clock(PinState::Low, EDGE_US)?;
        self.hold_clock(PinState::High, WORD_SETTLE_US)?;
        self.hold_clock(PinState::Low, EDGE_US)?;
        self.clock(PinState::High)?;
        Ok(word)
    }

    /// Settling clock train issued after a matched handshake.
    pub fn dummy_clocks(&mut self) -> Result<(), Error> {
        for _ in 0..DUMMY_CLOCKS {
            self.hold_clock(PinState::Low, EDGE_US)?;
            self.hold_clock(PinState::High, EDGE_US)?;
        }
        Ok(())
    }
}
