//! Update header lines
//!
//! The module is wired to the host through six lines. In normal operation
//! `command` carries single-wire playback commands and `status` reports the
//! busy state; `clock` and `data` are idle. During an update the same
//! `clock` and `data` lines become the ICP port and then SPI SCK/MOSI.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::PinState;
use platform::gpio::{FlexPin, Pull};

use crate::config::POWER_CYCLE_OFF_MS;
use crate::error::{pin_err, Error};

/// The six header lines, all of one direction-switchable pin type.
pub struct Lines<P> {
    /// Module supply enable (high = powered)
    pub power: P,
    /// Busy indicator from the module
    pub status: P,
    /// Single-wire command line
    pub command: P,
    /// ICP clock / SPI SCK
    pub clock: P,
    /// ICP data / SPI MOSI
    pub data: P,
    /// Flash chip select
    pub chip_select: P,
}

impl<P: FlexPin> Lines<P> {
    /// Group the header lines.
    pub fn new(power: P, status: P, command: P, clock: P, data: P, chip_select: P) -> Self {
        Self {
            power,
            status,
            command,
            clock,
            data,
            chip_select,
        }
    }

    /// Switch the module supply.
    pub fn set_power(&mut self, on: bool) -> Result<(), Error> {
        self.power.set_state(PinState::from(on)).map_err(pin_err)
    }

    /// Remove power for [`POWER_CYCLE_OFF_MS`] and restore it.
    pub fn power_cycle<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error> {
        self.power.set_low().map_err(pin_err)?;
        delay.delay_ms(POWER_CYCLE_OFF_MS);
        self.power.set_high().map_err(pin_err)
    }

    /// Hand the header back to single-wire playback control.
    pub fn restore_single_wire(&mut self) -> Result<(), Error> {
        self.command.set_as_output(PinState::High).map_err(pin_err)?;
        self.status.set_as_input(Pull::Floating).map_err(pin_err)?;
        self.data.set_as_output(PinState::High).map_err(pin_err)?;
        self.clock.set_as_input(Pull::Floating).map_err(pin_err)
    }

    /// Idle the command line high so the module does not see a start bit
    /// while the host listens for an update.
    pub fn prepare_update(&mut self) -> Result<(), Error> {
        self.command.set_as_output(PinState::High).map_err(pin_err)
    }

    /// Ungroup the lines.
    pub fn release(self) -> (P, P, P, P, P, P) {
        (
            self.power,
            self.status,
            self.command,
            self.clock,
            self.data,
            self.chip_select,
        )
    }
}
