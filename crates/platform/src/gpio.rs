//! GPIO line abstraction layer
//!
//! Builds on the `embedded-hal` 1.0 digital traits. The module's update
//! header multiplexes several lines between two roles (single-wire playback
//! control and in-circuit programming), so every line used by the driver must
//! be able to change direction at run time.

pub use embedded_hal::digital::{ErrorType, InputPin, OutputPin, PinState};

/// Input bias applied when a line is released to input mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    /// No bias resistor
    #[default]
    Floating,
    /// Internal pull-up enabled
    Up,
    /// Internal pull-down enabled
    Down,
}

/// Current direction of a [`FlexPin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineMode {
    /// Released, sampled by the host
    Input(Pull),
    /// Driven by the host
    Output,
}

/// A line that can be switched between input and output at run time.
///
/// Implementations are expected to be the HAL's "flex" pin type. Switching to
/// output must apply `level` before the driver is enabled so no glitch of the
/// opposite level reaches the module.
pub trait FlexPin: InputPin + OutputPin {
    /// Release the line and sample it from now on.
    fn set_as_input(&mut self, pull: Pull) -> Result<(), Self::Error>;

    /// Drive the line, starting at `level`.
    fn set_as_output(&mut self, level: PinState) -> Result<(), Self::Error>;
}

impl<T: FlexPin + ?Sized> FlexPin for &mut T {
    #[inline]
    fn set_as_input(&mut self, pull: Pull) -> Result<(), Self::Error> {
        T::set_as_input(self, pull)
    }

    #[inline]
    fn set_as_output(&mut self, level: PinState) -> Result<(), Self::Error> {
        T::set_as_output(self, level)
    }
}
