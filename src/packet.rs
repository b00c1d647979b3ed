//! The E&C bus packet.
//!
//! A [`Packet`] holds one frame as it appears on the wire: an 8-bit header
//! (priority and address), a variable-length payload, and the trailing parity
//! bit. It also carries the two outcome flags of the bus event that produced
//! it: whether it was actually on the bus, and whether decoding had to repair
//! its framing.
//!
//! ## Wire layout
//!
//! ```text
//! | start | header (8, LSB first) | payload (bit_count, LSB first) | parity |
//! |   1   | pp aaaaaa             | d0 d1 ...                      |   p    |
//! ```
//!
//! `bit_count` is never sent explicitly. The receiver infers it from the
//! silence after the parity bit, which is why framing errors are common and
//! [`Packet::error_check`] exists.
//!
//! ## Text form
//!
//! Packets parse from and print to `"priority address byte0 byte1 byte2"`,
//! the format used on serial consoles.

use core::fmt;
use core::iter;
use core::str::FromStr;

use crate::consts::{
    ADDRESS_SHIFT, HEADER_BITS, MAX_RAW_PAYLOAD_BITS, MIN_PAYLOAD_BITS, PAYLOAD_MASK,
    PRIORITY_MASK,
};
use crate::error::Error;

/// One frame on the E&C bus, plus the flags of the event that produced it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Packet {
    /// Two bits of priority, six bits of address.
    pub(crate) header: u8,
    /// Payload bits, LSB first on the wire.
    pub(crate) data: u32,
    pub(crate) parity: bool,
    /// Number of valid payload bits. Even once a frame is settled.
    pub(crate) bit_count: u8,
    pub(crate) sent: bool,
    pub(crate) incomplete: bool,
}

impl Packet {
    /// Creates an empty packet: zero header, no payload, both flags clear.
    pub const fn new() -> Self {
        Self {
            header: 0,
            data: 0,
            parity: false,
            bit_count: 0,
            sent: false,
            incomplete: false,
        }
    }

    /// Builds a packet from raw frame fields, exactly as a receiver saw them.
    ///
    /// `bit_count` may be odd and `parity` may be wrong; run
    /// [`Packet::error_check`] to settle the framing. `bit_count` is capped at
    /// [`MAX_RAW_PAYLOAD_BITS`] so a repaired payload still fits 32 bits.
    pub const fn from_raw(header: u8, data: u32, bit_count: u8, parity: bool) -> Self {
        let bit_count = if bit_count > MAX_RAW_PAYLOAD_BITS {
            MAX_RAW_PAYLOAD_BITS
        } else {
            bit_count
        };
        Self {
            header,
            data,
            parity,
            bit_count,
            sent: false,
            incomplete: false,
        }
    }

    /// Sets the packet from a priority, an address and three payload bytes.
    ///
    /// `byte0` is the least significant payload byte. Priority is masked to 2
    /// bits and address to 6 bits.
    pub fn set(&mut self, priority: u8, address: u8, byte0: u8, byte1: u8, byte2: u8) {
        let data = u32::from(byte2) << 16 | u32::from(byte1) << 8 | u32::from(byte0);
        self.set_data(priority, address, data);
    }

    /// Sets the packet from a priority, an address and a payload of up to 24 bits.
    ///
    /// Bits of `data` above bit 23 are dropped.
    pub fn set_data(&mut self, priority: u8, address: u8, data: u32) {
        self.header = (address << ADDRESS_SHIFT) | (priority & PRIORITY_MASK);
        self.data = data & PAYLOAD_MASK;
        self.bit_count = MIN_PAYLOAD_BITS;
        while self.data.checked_shr(u32::from(self.bit_count)).unwrap_or(0) != 0 {
            self.bit_count += 2;
        }
        self.parity = self.calc_parity();
    }

    /// Sets the packet from the 32-bit value returned by [`Packet::unique`].
    pub fn set_unique(&mut self, unique: u32) {
        let header = unique as u8;
        self.set_data(header & PRIORITY_MASK, header >> ADDRESS_SHIFT, unique >> 8);
    }

    /// XOR of the 8 header bits and the `bit_count` payload bits.
    pub fn calc_parity(&self) -> bool {
        let header = self.header.count_ones();
        let payload = (0..self.bit_count).filter(|&i| self.data_bit(i)).count() as u32;
        (header + payload) % 2 == 1
    }

    /// Priority, 0 to 3.
    pub fn priority(&self) -> u8 {
        self.header & PRIORITY_MASK
    }

    /// Address, 0 to 63.
    pub fn address(&self) -> u8 {
        self.header >> ADDRESS_SHIFT
    }

    /// Payload byte `index`, where 0 is the least significant.
    ///
    /// Indices past the payload read as 0.
    pub fn byte(&self, index: u8) -> u8 {
        self.data.checked_shr(u32::from(index) * 8).unwrap_or(0) as u8
    }

    /// Payload bits `first..=last`, right aligned. At most 8 bits are returned.
    ///
    /// The width wraps when `last < first`: `last == first - 1` yields 0 and
    /// anything lower yields the full byte starting at `first`.
    pub fn bit_range(&self, first: u8, last: u8) -> u8 {
        let value = self.data.checked_shr(u32::from(first)).unwrap_or(0) as u8;
        let width = last.wrapping_sub(first).wrapping_add(1);
        if width < 8 {
            value & ((1u8 << width) - 1)
        } else {
            value
        }
    }

    /// Header and payload packed into one value: `header + (payload << 8)`.
    pub fn unique(&self) -> u32 {
        u32::from(self.header) | self.data << 8
    }

    /// Whether the packet was actually sent on, or read off, the bus.
    pub fn sent(&self) -> bool {
        self.sent
    }

    /// Whether the framing had to be repaired while decoding.
    pub fn incomplete(&self) -> bool {
        self.incomplete
    }

    /// Raw header byte.
    pub fn header(&self) -> u8 {
        self.header
    }

    /// Raw payload bits.
    pub fn data(&self) -> u32 {
        self.data
    }

    /// Number of payload bits on the wire.
    pub fn bit_count(&self) -> u8 {
        self.bit_count
    }

    /// The stored parity bit.
    pub fn parity(&self) -> bool {
        self.parity
    }

    /// The exact bit sequence `send` puts on the wire: start bit, header,
    /// payload and parity.
    pub fn wire_bits(&self) -> impl Iterator<Item = bool> + use<> {
        let packet = *self;
        iter::once(true)
            .chain((0..HEADER_BITS).map(move |i| (packet.header >> i) & 1 == 1))
            .chain((0..packet.bit_count).map(move |i| packet.data_bit(i)))
            .chain(iter::once(packet.parity))
    }

    pub(crate) fn data_bit(&self, index: u8) -> bool {
        self.data.checked_shr(u32::from(index)).unwrap_or(0) & 1 == 1
    }

    pub(crate) fn mark_sent(&mut self) {
        self.sent = true;
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.priority(),
            self.address(),
            self.byte(0),
            self.byte(1),
            self.byte(2)
        )
    }
}

impl FromStr for Packet {
    type Err = Error;

    /// Parses `"priority address byte0 byte1 byte2"`. Trailing fields may be
    /// left out and read as 0.
    ///
    /// Parsing is strict. A field that is not a decimal number in `0..=255`
    /// is rejected with [`Error::InvalidField`]; it is not read as 0 or
    /// truncated to its low byte the way lenient console parsers do.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = [0u8; 5];
        for (index, token) in s.split_whitespace().enumerate() {
            let slot = fields.get_mut(index).ok_or(Error::TooManyFields)?;
            *slot = token
                .parse()
                .map_err(|_| Error::InvalidField(index as u8))?;
        }
        let [priority, address, byte0, byte1, byte2] = fields;
        let mut packet = Packet::new();
        packet.set(priority, address, byte0, byte1, byte2);
        Ok(packet)
    }
}
