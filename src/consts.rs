//! Constants used across the E&C bus codec.
//!
//! This module defines the frame layout, pulse widths and the reference
//! spin-loop budgets the rest of the crate is built on.
//!
//! ## Key Concepts
//!
//! - **Header**: one byte, priority in the low 2 bits, address in the high 6.
//! - **Payload**: 2 to 24 data bits on transmit, always an even count.
//! - **Pulse widths**: every bit occupies a fixed slot; the length of the active
//!   part of the slot carries the value.
//! - **Loop budgets**: timeouts are counted in polling iterations, not wall time.
//!   The values here are calibrated for a 16 MHz part and are rescaled by
//!   [`crate::timer`] for other clocks.

/// Number of bits in the packet header.
pub const HEADER_BITS: u8 = 8;

/// Mask selecting the priority bits of the header.
pub const PRIORITY_MASK: u8 = 0x03;

/// Left shift applied to the address when packing the header.
pub const ADDRESS_SHIFT: u8 = 2;

/// Largest payload `set` accepts, in bits.
pub const MAX_PAYLOAD_BITS: u8 = 24;

/// Mask applied to payload values passed to `set`.
pub const PAYLOAD_MASK: u32 = 0x00ff_ffff;

/// Smallest payload length ever transmitted, in bits.
pub const MIN_PAYLOAD_BITS: u8 = 2;

/// Longest payload a received frame may claim, in bits.
///
/// Framing repair can add up to three bits (one odd shift, then a two-bit
/// shift), and the result must still fit the `u32` payload.
pub const MAX_RAW_PAYLOAD_BITS: u8 = 29;

/// Number of bits the frame decoder can hold: the header, the longest raw
/// payload and the trailing parity bit.
pub const FRAME_CAPACITY_BITS: u8 = HEADER_BITS + MAX_RAW_PAYLOAD_BITS + 1;

/// Upper bound on passes of the framing repair loop.
///
/// The deepest chain observed is an odd-length pass followed by one even pass.
pub const MAX_CORRECTION_PASSES: u8 = 4;

/// Active time of a `0` bit, in microseconds.
pub const ZERO_PULSE_US: u32 = 111;

/// Active time of a `1` bit, in microseconds.
pub const ONE_PULSE_US: u32 = 667;

/// Total length of one bit slot, in microseconds.
pub const BIT_SLOT_US: u32 = 1000;

/// Clock rate the reference loop budgets were measured at.
pub const REFERENCE_CLOCK_HZ: u32 = 16_000_000;

/// Pulses at least this many polling loops long decode as `1` at the reference clock.
pub const ONE_THRESHOLD_LOOPS: u32 = 500;

/// Inter-bit gap (and stuck-line) budget at the reference clock.
pub const MAX_LOOPS: u32 = 2000;

/// Idle samples required before a scan tool may transmit, at the reference clock.
pub const WAIT_LOOPS_SCAN_TOOL: u32 = 15_000;

/// Idle samples required before an in-car module may transmit, at the reference clock.
pub const WAIT_LOOPS_IN_CAR: u32 = 10_000;
