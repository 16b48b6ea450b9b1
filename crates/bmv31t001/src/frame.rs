//! Update frame codec
//!
//! On-wire layout, one frame per host transfer:
//!
//! ```text
//! | sync0 | sync1 | len | payload[len] | reserved | crc |
//! ```
//!
//! `sync0` is `0xAA` for control frames and `0x55` for data frames, `sync1`
//! is always `0x23`. The CRC covers the length byte and the payload. The
//! reserved byte is sent as zero and ignored on receive.

use heapless::Vec;

use crate::config::{HEADER_LEN, SYNC_CONTROL, SYNC_DATA, TRAILER_LEN};
use crate::crc8::{crc8, crc8_update};
use crate::error::FrameError;

/// Largest encoded frame: header, 255 payload bytes, trailer.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + u8::MAX as usize + TRAILER_LEN;

/// Buffer holding one encoded frame.
pub type FrameBuf = Vec<u8, MAX_FRAME_LEN>;

/// Frame class, selected by the sync pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameKind {
    /// Session command (`0xAA 0x23`)
    Control,
    /// Audio payload chunk (`0x55 0x23`)
    Data,
}

impl FrameKind {
    /// Classify a sync pair.
    pub fn from_sync(sync: [u8; 2]) -> Option<Self> {
        match sync {
            SYNC_CONTROL => Some(Self::Control),
            SYNC_DATA => Some(Self::Data),
            _ => None,
        }
    }

    /// Sync pair opening frames of this kind.
    pub const fn sync(self) -> [u8; 2] {
        match self {
            Self::Control => SYNC_CONTROL,
            Self::Data => SYNC_DATA,
        }
    }
}

/// Commands carried by control frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// `COMSPI`: start a session, hand the flash to the SPI port
    SwitchToSpi,
    /// `COMORD`: end the session, reboot the module into play mode
    Finish,
    /// `COMCE`: erase the whole flash
    ChipErase,
}

impl Command {
    /// ASCII tag identifying the command.
    pub const fn tag(self) -> &'static [u8] {
        match self {
            Self::SwitchToSpi => b"COMSPI",
            Self::Finish => b"COMORD",
            Self::ChipErase => b"COMCE",
        }
    }

    /// Recognise a control payload. The payload must be exactly the tag.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        [Self::SwitchToSpi, Self::Finish, Self::ChipErase]
            .into_iter()
            .find(|command| command.tag() == payload)
    }

    /// Short static label, for log output.
    pub fn label(self) -> &'static str {
        match self {
            Self::SwitchToSpi => "COMSPI",
            Self::Finish => "COMORD",
            Self::ChipErase => "COMCE",
        }
    }
}

/// A validated frame borrowing its payload from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Frame class
    pub kind: FrameKind,
    /// Payload bytes (length byte, reserved byte and CRC stripped)
    pub payload: &'a [u8],
}

impl Frame<'_> {
    /// The command carried by a control frame, if recognised.
    pub fn command(&self) -> Option<Command> {
        match self.kind {
            FrameKind::Control => Command::from_payload(self.payload),
            FrameKind::Data => None,
        }
    }
}

/// Validate the part of a frame following the header.
///
/// `tail` holds `length` payload bytes, the reserved byte and the CRC. Extra
/// bytes past the CRC are ignored. Returns the payload.
pub fn verify_tail(length: u8, tail: &[u8]) -> Result<&[u8], FrameError> {
    let len = usize::from(length);
    let payload = tail.get(..len).ok_or(FrameError::TooShort)?;
    let actual = *tail
        .get(len.saturating_add(1))
        .ok_or(FrameError::TooShort)?;
    let expected = crc8_update(crc8(&[length]), payload);
    if expected == actual {
        Ok(payload)
    } else {
        Err(FrameError::CrcMismatch { expected, actual })
    }
}

/// Decode one complete frame from the start of `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Frame<'_>, FrameError> {
    let (sync0, sync1, length) = match bytes {
        [sync0, sync1, length, ..] => (*sync0, *sync1, *length),
        _ => return Err(FrameError::TooShort),
    };
    let kind = FrameKind::from_sync([sync0, sync1]).ok_or(FrameError::BadSync)?;
    let tail = bytes.get(HEADER_LEN..).ok_or(FrameError::TooShort)?;
    let payload = verify_tail(length, tail)?;
    Ok(Frame { kind, payload })
}

/// Encode a frame of `kind` around `payload`.
pub fn encode(kind: FrameKind, payload: &[u8]) -> Result<FrameBuf, FrameError> {
    let length = u8::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLong)?;
    let crc = crc8_update(crc8(&[length]), payload);

    let mut out = FrameBuf::new();
    out.extend_from_slice(&kind.sync())
        .map_err(|_| FrameError::PayloadTooLong)?;
    out.push(length).map_err(|_| FrameError::PayloadTooLong)?;
    out.extend_from_slice(payload)
        .map_err(|_| FrameError::PayloadTooLong)?;
    out.push(0x00).map_err(|_| FrameError::PayloadTooLong)?; // reserved
    out.push(crc).map_err(|_| FrameError::PayloadTooLong)?;
    Ok(out)
}

/// Encode a control frame carrying `command`.
pub fn encode_control(command: Command) -> Result<FrameBuf, FrameError> {
    encode(FrameKind::Control, command.tag())
}

/// Encode a data frame carrying one audio chunk (at most 255 bytes).
pub fn encode_data(chunk: &[u8]) -> Result<FrameBuf, FrameError> {
    encode(FrameKind::Data, chunk)
}
