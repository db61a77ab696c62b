//! NEC frame validation and decoding.
//!
//! The receive program shifts bits in right-first, so the earliest received byte ends
//! up in bits 0..8 of the raw word:
//!
//! | bits   | field             |
//! |--------|-------------------|
//! | 0..8   | address           |
//! | 8..16  | `!address`        |
//! | 16..24 | data (command)    |
//! | 24..32 | `!data`           |
//!
//! The frame carries no repeat field. Repeats are counted by [`RepeatTracker`] from
//! consecutive identical frames.

use crate::error::{Error, Result};

/// One word exactly as popped from the decoder's receive queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawFrame(pub u32);

impl RawFrame {
    /// Byte `index` (0 = earliest received).
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "masked to one byte")]
    pub const fn byte(self, index: u32) -> u8 {
        ((self.0 >> (index * 8)) & 0xFF) as u8
    }
}

/// A frame that passed both inversion checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NecFrame {
    /// Device address.
    pub address: u8,
    /// Command byte.
    pub data: u8,
    /// How many identical frames immediately preceded this one.
    ///
    /// The receive program does not report the protocol's repeat codes, so this is
    /// inferred from consecutive identical frames by [`RepeatTracker`]. A held button
    /// and the same button pressed twice in quick succession look alike. Always zero
    /// from [`decode`], which sees one frame at a time.
    pub repeat: u8,
}

/// Builds the raw word a transmitter would produce for `address`/`data`.
#[must_use]
pub fn encode(address: u8, data: u8) -> RawFrame {
    RawFrame(u32::from_le_bytes([address, !address, data, !data]))
}

/// Validates `raw` and extracts address and data.
///
/// # Errors
/// Returns [`Error::MalformedFrame`] with the raw value if either byte pair fails
/// `inverted == original ^ 0xFF`.
pub fn decode(raw: RawFrame) -> Result<NecFrame> {
    let [address, address_inv, data, data_inv] = raw.0.to_le_bytes();
    if address ^ address_inv != 0xFF || data ^ data_inv != 0xFF {
        return Err(Error::MalformedFrame { raw: raw.0 });
    }
    Ok(NecFrame {
        address,
        data,
        repeat: 0,
    })
}

/// What the notification path reports for each popped word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NecEvent {
    /// A valid frame, with its repeat count filled in.
    Decoded(NecFrame),
    /// A word that failed validation, kept for diagnostics.
    Malformed(RawFrame),
}

/// Counts back-to-back identical frames.
///
/// A malformed word breaks the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RepeatTracker {
    last: Option<(u8, u8)>,
    repeat: u8,
}

impl RepeatTracker {
    /// An empty tracker.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: None,
            repeat: 0,
        }
    }

    /// Decodes `raw` and stamps the repeat count.
    pub fn observe(&mut self, raw: RawFrame) -> NecEvent {
        match decode(raw) {
            Ok(mut frame) => {
                let key = (frame.address, frame.data);
                self.repeat = if self.last == Some(key) {
                    self.repeat.saturating_add(1)
                } else {
                    0
                };
                self.last = Some(key);
                frame.repeat = self.repeat;
                NecEvent::Decoded(frame)
            }
            Err(_) => {
                self.reset();
                NecEvent::Malformed(raw)
            }
        }
    }

    /// Forgets the previous frame.
    pub const fn reset(&mut self) {
        self.last = None;
        self.repeat = 0;
    }
}
