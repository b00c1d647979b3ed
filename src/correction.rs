//! Framing repair for received packets.
//!
//! The bus carries no length field, so a receiver infers where a frame ends
//! from the silence after its last bit and then checks the parity bit. A
//! glitch or a late start usually loses one or two bits at the front of the
//! frame. The header then absorbs payload bits and the payload length comes out
//! odd, or even with the wrong parity.
//!
//! [`Packet::error_check`] assumes the missing bits belong at the front. It
//! slides the tail of the header into the payload and guesses the missing
//! header bits so that parity balances:
//!
//! | Condition                         | Shift | New header low bits |
//! |-----------------------------------|-------|---------------------|
//! | even length, parity mismatch      | 2     | `01`                |
//! | even length, header is zero       | 2     | `11`                |
//! | odd length, parity mismatch       | 1     | `1`                 |
//! | odd length, parity matches        | 1     | `0`, then re-check  |
//!
//! The repair is best effort. A header that is legitimately zero is
//! indistinguishable from a broken frame and always gets rewritten.

use crate::consts::MAX_CORRECTION_PASSES;
use crate::packet::Packet;

/// A single repair step applied by [`Packet::error_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Repair {
    /// Even length with bad parity: shifted by two, `01` guessed.
    ParityShift,
    /// Even length with an all-zero header: shifted by two, `11` guessed.
    ZeroHeaderShift,
    /// Odd length: shifted by one. `true` if a `1` was guessed.
    OddShift(bool),
}

/// What [`Packet::error_check`] did to a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Correction {
    /// Number of repair passes applied.
    pub passes: u8,
    /// The last repair applied, if any.
    pub last: Option<Repair>,
}

impl Correction {
    /// Whether the frame was accepted as received.
    pub fn is_clean(&self) -> bool {
        self.passes == 0
    }
}

impl Packet {
    /// Validates the framing of a received packet and repairs it if needed.
    ///
    /// Runs at most [`MAX_CORRECTION_PASSES`] passes. Any repair marks the
    /// packet [`incomplete`](Packet::incomplete). After this returns,
    /// [`calc_parity`](Packet::calc_parity) agrees with the stored parity bit,
    /// `bit_count` is even and at most 32, and no payload bit has been lost.
    pub fn error_check(&mut self) -> Correction {
        let mut correction = Correction::default();
        while correction.passes < MAX_CORRECTION_PASSES {
            let parity_ok = self.calc_parity() == self.parity;
            let repair = if self.bit_count % 2 == 0 {
                if !parity_ok {
                    self.shift_pair(0b01);
                    Repair::ParityShift
                } else if self.header == 0 {
                    self.shift_pair(0b11);
                    Repair::ZeroHeaderShift
                } else {
                    break;
                }
            } else {
                self.data = self.data << 1 | u32::from(self.header >> 7);
                self.header <<= 1;
                self.bit_count += 1;
                if !parity_ok {
                    self.header += 1;
                }
                Repair::OddShift(!parity_ok)
            };
            correction.passes += 1;
            correction.last = Some(repair);
            self.incomplete = true;
            // Only a balanced odd shift earns another look.
            if repair != Repair::OddShift(false) {
                break;
            }
        }
        correction
    }

    fn shift_pair(&mut self, low_bits: u8) {
        self.data = self.data << 2 | u32::from(self.header >> 6);
        self.header = self.header << 2 | low_bits;
        self.bit_count += 2;
    }
}
