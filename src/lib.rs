//! # ecbus
//!
//! A portable, no_std Rust codec for the single-wire Entertainment & Comfort
//! (E&C) serial bus found in automotive comfort and infotainment systems.
//!
//! The bus is half duplex and self clocking: every bit takes a fixed slot and
//! the length of its active pulse carries the value. Frames have no length
//! field, so receivers find the end of a frame by silence and check it against
//! a trailing parity bit. This crate implements:
//!
//! - `embedded-hal` traits for the bus pins and microsecond delays
//! - pulse-width bit encoding and loop-counted decoding
//! - frame assembly as an explicit, timing-free state machine
//! - parity and a deterministic framing repair for frames that lost bits
//! - timing budgets resolved once from the CPU clock or a polling period
//!
//! ## Crate features
//! | Feature            | Description |
//! |--------------------|-------------|
//! | `std`              | Links `std` instead of `#![no_std]` |
//! | `critical-section` | Runs timed loops inside `critical_section::with` |
//! | `defmt-0-3`        | Uses `defmt` logging and derives `defmt::Format` |
//! | `log`              | Uses `log` logging |
//!
//! ## Frame
//!
//! ```text
//! | start | priority (2) | address (6) | payload (2..=24, even) | parity |
//! ```
//!
//! All fields are sent least significant bit first. Parity is the XOR of the
//! header and payload bits.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ecbus::codec::PacketCodec;
//! use ecbus::config::BusConfig;
//! use ecbus::timer::IdleProfile;
//!
//! let config = BusConfig::for_clock(16_000_000, IdleProfile::InCarModule);
//!
//! let mut codec = PacketCodec::new(rx_pin, Some(tx_pin), delay, config);
//! codec.send_fields(1, 5, 0xAA, 0, 0)?;
//!
//! let mut codec = PacketCodec::new(rx_pin, None::<TxPin>, delay, config);
//! codec.read()?;
//! if codec.sent() {
//!     let packet = codec.packet();
//!     handle(packet.address(), packet.byte(0), packet.incomplete());
//! }
//! ```
//!
//! ## Integration Notes
//!
//! - Receive budgets are counted in polling loops; recalibrate them with
//!   [`timer::compute_bus_timing`] or [`timer::sampled_bus_timing`]
//! - A header of zero is always treated as a framing error and rewritten
//! - Each codec represents one bus event; build a new one per packet
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "critical-section")]
pub use critical_section;

// Must come first so the other modules see its macros.
mod fmt;

pub mod codec;
pub mod config;
pub mod consts;
pub mod correction;
pub mod decoder;
pub mod error;
pub mod packet;
pub mod timer;

pub use codec::PacketCodec;
pub use error::{Error, Result};
pub use packet::Packet;
