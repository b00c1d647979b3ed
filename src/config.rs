//! Per-bus settings.
//!
//! A [`BusConfig`] is built once at startup and handed to every
//! [`crate::codec::PacketCodec`] on that bus.

use crate::timer::{BusTiming, IdleProfile, compute_bus_timing};

/// Timing and line polarity for one bus.
///
/// By default a high input means the bus is active and driving the output
/// high makes it active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct BusConfig {
    /// Pulse widths and polling budgets.
    pub timing: BusTiming,
    /// The input reads low while the bus is active.
    pub rx_inverted: bool,
    /// The output must be driven low to make the bus active.
    pub tx_inverted: bool,
}

impl BusConfig {
    /// Configuration for a CPU clocked at `f_cpu` Hz with non-inverted lines.
    pub fn for_clock(f_cpu: u32, idle: IdleProfile) -> Self {
        Self::from_timing(compute_bus_timing(f_cpu, idle))
    }

    /// Configuration using the given timing with non-inverted lines.
    pub const fn from_timing(timing: BusTiming) -> Self {
        Self {
            timing,
            rx_inverted: false,
            tx_inverted: false,
        }
    }

    /// Sets the polarity of both lines.
    pub const fn with_inversion(mut self, rx_inverted: bool, tx_inverted: bool) -> Self {
        self.rx_inverted = rx_inverted;
        self.tx_inverted = tx_inverted;
        self
    }
}
