//! ICP entry handshake

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::PinState;
use platform::gpio::{FlexPin, Pull};

use crate::config::{
    CLOCK_PARK_MS, HANDSHAKE_ATTEMPTS, MATCH_HIGH_US, POWER_UP_MS, READY_LOW_US, RESET_HOLD_MS,
    RESET_SETTLE_MS,
};
use crate::error::{pin_err, Error};
use crate::lines::Lines;

use super::{IcpTransport, Mode};

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IcpState {
    /// No handshake attempted since creation or the last reset
    #[default]
    Idle,
    /// Module held in reset, lines being sequenced
    Resetting,
    /// Pattern words being sent, waiting for a matching acknowledgement
    AwaitingAck,
    /// Mode acknowledged; ICP words may be exchanged
    Matched,
    /// Attempt budget exhausted
    Failed,
}

impl IcpState {
    /// Short static label, for log output.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resetting => "resetting",
            Self::AwaitingAck => "awaiting ack",
            Self::Matched => "matched",
            Self::Failed => "failed",
        }
    }
}

/// ICP entry state machine.
#[derive(Debug, Default)]
pub struct IcpSession {
    state: IcpState,
    attempts: u8,
}

impl IcpSession {
    /// New session in [`IcpState::Idle`].
    pub const fn new() -> Self {
        Self {
            state: IcpState::Idle,
            attempts: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> IcpState {
        self.state
    }

    /// Handshake attempts made by the last [`enter`](Self::enter).
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// Forget the last handshake.
    pub fn reset(&mut self) {
        self.state = IcpState::Idle;
        self.attempts = 0;
    }

    /// Reset the module into ICP and match `mode`.
    ///
    /// Power-cycles the module with every header line held low, then repeats
    /// READY / MATCH / pattern word / acknowledgement up to
    /// [`HANDSHAKE_ATTEMPTS`] times. On a match the settling clock train is
    /// sent and the session is [`IcpState::Matched`]. Otherwise it ends in
    /// [`IcpState::Failed`] and the module is left powered in reset
    /// sequencing; callers must restore the lines.
    pub fn enter<P, D>(&mut self, lines: &mut Lines<P>, delay: &mut D, mode: Mode) -> Result<(), Error>
    where
        P: FlexPin,
        D: DelayNs,
    {
        self.state = IcpState::Resetting;
        self.attempts = 0;
        log!(debug, "icp: entering mode {}", mode.bits());

        lines.power.set_low().map_err(pin_err)?;
        for held in [
            &mut lines.status,
            &mut lines.command,
            &mut lines.chip_select,
            &mut lines.clock,
            &mut lines.data,
        ] {
            held.set_as_output(PinState::Low).map_err(pin_err)?;
        }
        delay.delay_ms(RESET_HOLD_MS);
        delay.delay_ms(RESET_SETTLE_MS);
        lines.clock.set_low().map_err(pin_err)?;
        lines.status.set_as_input(Pull::Floating).map_err(pin_err)?;
        delay.delay_ms(CLOCK_PARK_MS);
        lines.power.set_high().map_err(pin_err)?;
        lines.clock.set_high().map_err(pin_err)?;
        delay.delay_ms(POWER_UP_MS);
        lines.data.set_high().map_err(pin_err)?;

        self.state = IcpState::AwaitingAck;
        let mut icp = IcpTransport::new(&mut lines.clock, &mut lines.data, &mut *delay);
        while self.attempts < HANDSHAKE_ATTEMPTS {
            self.attempts = self.attempts.saturating_add(1);
            icp.hold_clock(PinState::Low, READY_LOW_US)?;
            icp.hold_clock(PinState::High, MATCH_HIGH_US)?;
            icp.send_pattern_word(mode)?;
            let ack = icp.read_ack()?;
            if mode.accepts(ack) {
                icp.dummy_clocks()?;
                self.state = IcpState::Matched;
                log!(info, "icp: mode {} matched after {} attempts", mode.bits(), self.attempts);
                return Ok(());
            }
            log!(debug, "icp: attempt {} got ack {}", self.attempts, ack);
        }

        self.state = IcpState::Failed;
        log!(warn, "icp: no acknowledgement after {} attempts", self.attempts);
        Err(Error::HandshakeExhausted {
            attempts: self.attempts,
        })
    }
}
