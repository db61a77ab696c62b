//! De-interleaves multi-pin capture words into per-pin sample sequences.
//!
//! The capture unit shifts `pin_count` pin levels in per sample, right-shifting, so a
//! full word holds `32 / pin_count` samples with the earliest in the low bits. Within a
//! sample, pin `p` sits at offset `p`. Sample `s` of pin `p` is therefore bit
//! `p + (s % samples_per_word) × pin_count` of word `s / samples_per_word`.

use core::fmt;

use crate::constants::WORD_BITS;
use crate::error::{ConfigError, Result};
use crate::sampler::PinCount;

/// Per-pin views over a filled capture buffer.
#[derive(Clone, Copy, Debug)]
pub struct BitPlanes<'a> {
    words: &'a [u32],
    pin_count: PinCount,
}

/// Splits `words` into `pin_count` bit sequences. Lazy; nothing is copied.
#[must_use]
pub const fn reconstruct(words: &[u32], pin_count: PinCount) -> BitPlanes<'_> {
    BitPlanes { words, pin_count }
}

impl<'a> BitPlanes<'a> {
    /// Number of pins, i.e. sequences.
    #[must_use]
    pub const fn pin_count(&self) -> PinCount {
        self.pin_count
    }

    /// Length of every sequence: `words × 32 / pin_count`.
    #[must_use]
    pub const fn bits_per_pin(&self) -> usize {
        self.words.len() * self.pin_count.samples_per_word() as usize
    }

    /// The sample sequence of pin `pin`, relative to the capture's pin base.
    ///
    /// # Errors
    /// Returns [`ConfigError::PinIndex`] if `pin` is not below the pin count.
    pub fn pin(&self, pin: u8) -> Result<PinBits<'a>> {
        if pin >= self.pin_count.get() {
            return Err(ConfigError::PinIndex(pin).into());
        }
        Ok(PinBits {
            words: self.words,
            pin,
            stride: self.pin_count.get(),
            position: 0,
            end: self.bits_per_pin(),
        })
    }

    /// Every sequence, pin 0 first.
    pub fn iter(&self) -> impl Iterator<Item = PinBits<'a>> + use<'a> {
        let planes = *self;
        (0..self.pin_count.get()).filter_map(move |pin| planes.pin(pin).ok())
    }
}

/// One pin's samples in capture order.
///
/// `Display` prints them as a line of `0`/`1` characters.
#[derive(Clone, Debug)]
pub struct PinBits<'a> {
    words: &'a [u32],
    pin: u8,
    stride: u8,
    position: usize,
    end: usize,
}

impl PinBits<'_> {
    /// Pin index within the capture.
    #[must_use]
    pub const fn pin(&self) -> u8 {
        self.pin
    }

    fn bit_at(&self, sample: usize) -> Option<bool> {
        let stride = usize::from(self.stride);
        let per_word = usize::try_from(WORD_BITS).ok()? / stride;
        let word = self.words.get(sample / per_word)?;
        let offset = u32::try_from(usize::from(self.pin) + (sample % per_word) * stride).ok()?;
        Some(word.checked_shr(offset)? & 1 == 1)
    }
}

impl Iterator for PinBits<'_> {
    type Item = bool;

    fn next(&mut self) -> Option<bool> {
        if self.position >= self.end {
            return None;
        }
        let bit = self.bit_at(self.position)?;
        self.position += 1;
        Some(bit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PinBits<'_> {}

impl fmt::Display for PinBits<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.clone() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Inverse of [`reconstruct`]: merges per-pin sequences back into capture words.
///
/// `planes[p]` supplies pin `p`. Planes past the pin count are ignored and missing
/// bits are zero. `out` is cleared first.
pub fn interleave<I>(pin_count: PinCount, planes: &mut [I], out: &mut [u32])
where
    I: Iterator<Item = bool>,
{
    let stride = u32::from(pin_count.get());
    for word in out.iter_mut() {
        *word = 0;
        for sample in 0..pin_count.samples_per_word() {
            let lanes = planes.iter_mut().take(usize::from(pin_count.get()));
            for (pin, plane) in (0_u32..).zip(lanes) {
                if plane.next() == Some(true) {
                    *word |= 1 << (pin + sample * stride);
                }
            }
        }
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn four_pins_read_their_own_bit_of_each_nibble() {
        let words = [0b0001_1011_u32];
        let planes = reconstruct(&words, PinCount::Four);
        for pin in 0..4 {
            let first = planes.pin(pin).expect("pin in range").next();
            assert_eq!(first, Some((words[0] >> pin) & 1 == 1), "pin {pin}");
        }
        // second sample of pin 0 is bit 4
        let mut pin0 = planes.pin(0).expect("pin in range");
        pin0.next();
        assert_eq!(pin0.next(), Some(true));
    }

    #[test]
    fn single_pin_is_the_word_lsb_first() {
        let words = [0x8000_0001_u32, 0x0000_0002];
        let line = reconstruct(&words, PinCount::One)
            .pin(0)
            .expect("pin 0")
            .to_string();
        assert_eq!(line.len(), 64);
        assert!(line.starts_with("10000"));
        assert_eq!(&line[31..34], "101");
    }

    #[test]
    fn sequences_have_the_documented_length() {
        let words = [0_u32; 7];
        for pin_count in PinCount::ALL {
            let planes = reconstruct(&words, pin_count);
            assert_eq!(planes.iter().count(), usize::from(pin_count.get()));
            for plane in planes.iter() {
                assert_eq!(plane.len(), 7 * 32 / usize::from(pin_count.get()));
            }
        }
    }

    #[test]
    fn out_of_range_pin_is_rejected() {
        let words = [0_u32];
        assert!(matches!(
            reconstruct(&words, PinCount::Two).pin(2),
            Err(Error::InvalidConfiguration(ConfigError::PinIndex(2)))
        ));
    }

    #[test]
    fn interleave_restores_the_buffer() {
        let words = [0xDEAD_BEEF_u32, 0x0123_4567, 0xFFFF_0000, 0x5555_AAAA];
        for pin_count in PinCount::ALL {
            let planes = reconstruct(&words, pin_count);
            let mut iters: heapless::Vec<PinBits<'_>, 32> = planes.iter().collect();
            let mut restored = [0_u32; 4];
            interleave(pin_count, &mut iters, &mut restored);
            assert_eq!(restored, words, "pin count {}", pin_count.get());
        }
    }

    #[test]
    fn interleave_ignores_planes_past_the_pin_count() {
        let mut planes: [_; 8] = core::array::from_fn(|_| core::iter::repeat_n(true, 8));
        let mut out = [0_u32; 1];
        interleave(PinCount::Four, &mut planes, &mut out);
        assert_eq!(out, [u32::MAX]);
        let remaining = planes.each_ref().map(|plane| plane.len());
        assert_eq!(remaining, [0, 0, 0, 0, 8, 8, 8, 8]);
    }

    #[test]
    fn last_pin_of_a_full_width_capture_is_the_top_bit() {
        let words = [0x8000_0000_u32, 0x0000_0001];
        let planes = reconstruct(&words, PinCount::ThirtyTwo);
        assert_eq!(planes.pin(31).expect("pin 31").to_string(), "10");
        assert_eq!(planes.pin(0).expect("pin 0").to_string(), "01");
    }

    #[test]
    fn empty_buffer_yields_empty_sequences() {
        let planes = reconstruct(&[], PinCount::Eight);
        assert_eq!(planes.bits_per_pin(), 0);
        assert_eq!(planes.pin(7).expect("pin 7").to_string(), "");
    }
}
