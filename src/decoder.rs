//! Frame assembly for received bits.
//!
//! [`FrameDecoder`] collects the bits of one frame in arrival order and turns
//! them into a [`Packet`]. It knows nothing about pins or timing: the codec
//! measures pulses and feeds the results in, and tests can drive it directly.
//!
//! ```text
//!            start()             end_of_frame() / capacity reached
//! AwaitingStart ──────▶ ReadingBits ──────────────────────────────▶ Done
//! ```
//!
//! The frame length is not known up front. Bits 0–7 fill the header, the rest
//! fill the payload, and once the bus goes quiet the last bit received is taken
//! as the parity bit.

use crate::consts::{FRAME_CAPACITY_BITS, HEADER_BITS};
use crate::correction::Correction;
use crate::packet::Packet;
use crate::timer::BusTiming;

/// Where a [`FrameDecoder`] is in its frame.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum DecoderState {
    /// Waiting for the start pulse.
    #[default]
    AwaitingStart,
    /// Start pulse seen; accumulating bits.
    ReadingBits,
    /// The frame has ended; call [`FrameDecoder::finish`].
    Done,
}

/// Accumulates one frame of bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct FrameDecoder {
    state: DecoderState,
    header: u8,
    data: u32,
    /// Bits received so far, parity included.
    counter: u8,
    /// The frame was cut short by capacity or a stuck line.
    truncated: bool,
}

impl FrameDecoder {
    /// Creates a decoder waiting for a start pulse.
    pub const fn new() -> Self {
        Self {
            state: DecoderState::AwaitingStart,
            header: 0,
            data: 0,
            counter: 0,
            truncated: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Number of bits received so far, parity included.
    pub fn bits_received(&self) -> u8 {
        self.counter
    }

    /// Registers the start pulse.
    pub fn start(&mut self) {
        if self.state == DecoderState::AwaitingStart {
            self.state = DecoderState::ReadingBits;
        }
    }

    /// Appends one bit. Ignored unless reading.
    ///
    /// Filling the decoder ends the frame.
    pub fn push_bit(&mut self, bit: bool) -> DecoderState {
        if self.state != DecoderState::ReadingBits {
            return self.state;
        }
        if self.counter < HEADER_BITS {
            self.header |= u8::from(bit) << self.counter;
        } else {
            self.data |= u32::from(bit) << (self.counter - HEADER_BITS);
        }
        self.counter += 1;
        if self.counter >= FRAME_CAPACITY_BITS {
            self.truncated = true;
            self.state = DecoderState::Done;
        }
        self.state
    }

    /// Classifies a pulse measured in polling loops and appends it.
    pub fn push_pulse(&mut self, loops: u32, timing: &BusTiming) -> DecoderState {
        self.push_bit(timing.bit_for_pulse(loops))
    }

    /// Ends the frame after the bus went quiet.
    pub fn end_of_frame(&mut self) {
        if self.state == DecoderState::ReadingBits {
            self.state = DecoderState::Done;
        }
    }

    /// Ends the frame because the line got stuck mid-frame.
    pub fn abort(&mut self) {
        if self.state == DecoderState::ReadingBits {
            self.truncated = true;
            self.state = DecoderState::Done;
        }
    }

    /// Turns a finished frame into a packet.
    ///
    /// Splits off the parity bit, runs [`Packet::error_check`] and marks the
    /// packet sent. A frame that was cut short is marked incomplete. Returns
    /// `None` unless the decoder is [`DecoderState::Done`].
    pub fn finish(&self) -> Option<(Packet, Correction)> {
        if self.state != DecoderState::Done {
            return None;
        }
        let bit_count = self.counter.saturating_sub(HEADER_BITS + 1);
        let parity_mask = 1u32 << bit_count;
        let parity = self.data & parity_mask != 0;
        let mut packet =
            Packet::from_raw(self.header, self.data & !parity_mask, bit_count, parity);
        let correction = packet.error_check();
        if self.truncated {
            packet.incomplete = true;
        }
        packet.mark_sent();
        Some((packet, correction))
    }
}
