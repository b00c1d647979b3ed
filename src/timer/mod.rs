//! Bus timing configuration.
//!
//! Pulse widths are fixed in microseconds and emitted with
//! `embedded_hal::delay::DelayNs`. Everything the receiver measures is counted
//! in polling loops instead, so those budgets depend on how fast the target
//! can poll a pin. [`BusTiming`] holds both, resolved once at startup:
//!
//! - [`compute_bus_timing`]: runtime scaling from the CPU clock (rounded)
//! - [`const_bus_timing`]: compile-time scaling from the CPU clock (truncated)
//! - [`sampled_bus_timing`]: fixed polling period, clock independent
//!
//! Reference budgets at 16 MHz:
//!
//! | Budget          | Loops  | Meaning                                   |
//! |-----------------|--------|-------------------------------------------|
//! | `one_threshold` |    500 | pulses this long or longer are `1`        |
//! | `max_loops`     |   2000 | longest gap inside a frame / longest busy |
//! | `wait_loops`    | 15000  | idle samples before a scan tool transmits |
//! | `wait_loops`    | 10000  | idle samples before an in-car module does |

use libm::round;

use crate::consts::{
    BIT_SLOT_US, MAX_LOOPS, ONE_PULSE_US, ONE_THRESHOLD_LOOPS, REFERENCE_CLOCK_HZ,
    WAIT_LOOPS_IN_CAR, WAIT_LOOPS_SCAN_TOOL, ZERO_PULSE_US,
};

mod idle;
pub use idle::*;

/// How long a transmitter waits for silence before it starts a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum IdleProfile {
    /// Diagnostic scan tool on the bus connector.
    #[default]
    ScanTool,
    /// Module installed in the car; yields sooner.
    InCarModule,
}

impl IdleProfile {
    /// Idle samples required at the reference clock.
    pub const fn reference_loops(self) -> u32 {
        match self {
            IdleProfile::ScanTool => WAIT_LOOPS_SCAN_TOOL,
            IdleProfile::InCarModule => WAIT_LOOPS_IN_CAR,
        }
    }
}

/// Pulse widths and polling budgets for one bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct BusTiming {
    /// Active time of a `0` bit, in microseconds.
    pub zero_us: u32,
    /// Active time of a `1` bit, in microseconds.
    pub one_us: u32,
    /// Length of a whole bit slot, in microseconds.
    pub bit_us: u32,
    /// Pulses of at least this many loops decode as `1`.
    pub one_threshold: u32,
    /// Longest gap between bits of one frame, and longest legal active pulse.
    pub max_loops: u32,
    /// Consecutive idle samples required before transmitting.
    pub wait_loops: u32,
    /// Budget for the first pulse of a frame to appear. `None` waits forever.
    pub start_loops: Option<u32>,
    /// Delay after each poll, in nanoseconds. Zero polls back to back.
    pub poll_ns: u32,
}

impl Default for BusTiming {
    /// Reference timing: 16 MHz, scan tool profile.
    fn default() -> Self {
        const_bus_timing(REFERENCE_CLOCK_HZ, IdleProfile::ScanTool)
    }
}

impl BusTiming {
    const fn with_budgets(
        one_threshold: u32,
        max_loops: u32,
        wait_loops: u32,
        poll_ns: u32,
    ) -> Self {
        Self {
            zero_us: ZERO_PULSE_US,
            one_us: ONE_PULSE_US,
            bit_us: BIT_SLOT_US,
            one_threshold,
            max_loops,
            wait_loops,
            start_loops: Some(max_loops),
            poll_ns,
        }
    }

    /// Returns a copy with a different start budget.
    pub const fn with_start_loops(mut self, start_loops: Option<u32>) -> Self {
        self.start_loops = start_loops;
        self
    }

    /// Decodes a pulse measured in polling loops.
    pub const fn bit_for_pulse(&self, loops: u32) -> bool {
        loops >= self.one_threshold
    }

    /// Active and inactive time of one bit slot, in microseconds.
    pub const fn slot_us(&self, bit: bool) -> (u32, u32) {
        let active = if bit { self.one_us } else { self.zero_us };
        (active, self.bit_us.saturating_sub(active))
    }
}

/// Scales the reference budgets to `f_cpu` at runtime.
///
/// # Arguments
/// - `f_cpu`: CPU frequency in Hz
/// - `idle`: transmitter idle profile
///
/// # Returns
/// - A [`BusTiming`] with every loop budget rounded to the nearest integer
pub fn compute_bus_timing(f_cpu: u32, idle: IdleProfile) -> BusTiming {
    let scale = f_cpu as f64 / REFERENCE_CLOCK_HZ as f64;
    let scaled = |loops: u32| (round(loops as f64 * scale) as u32).max(1);
    BusTiming::with_budgets(
        scaled(ONE_THRESHOLD_LOOPS),
        scaled(MAX_LOOPS),
        scaled(idle.reference_loops()),
        0,
    )
}

/// Compile-time variant of [`compute_bus_timing`].
///
/// Uses integer math, so budgets are truncated rather than rounded.
pub const fn const_bus_timing(f_cpu: u32, idle: IdleProfile) -> BusTiming {
    BusTiming::with_budgets(
        const_scale(ONE_THRESHOLD_LOOPS, f_cpu),
        const_scale(MAX_LOOPS, f_cpu),
        const_scale(idle.reference_loops(), f_cpu),
        0,
    )
}

/// Timing for a receiver that waits `poll_ns` after every pin sample.
///
/// The reference budgets are read as microseconds and divided by the polling
/// period, so the result does not depend on the CPU clock.
pub const fn sampled_bus_timing(poll_ns: u32, idle: IdleProfile) -> BusTiming {
    let poll_ns = if poll_ns == 0 { 1 } else { poll_ns };
    BusTiming::with_budgets(
        per_poll(ONE_THRESHOLD_LOOPS, poll_ns),
        per_poll(MAX_LOOPS, poll_ns),
        per_poll(idle.reference_loops(), poll_ns),
        poll_ns,
    )
}

const fn const_scale(loops: u32, f_cpu: u32) -> u32 {
    let scaled = (loops as u64 * f_cpu as u64 / REFERENCE_CLOCK_HZ as u64) as u32;
    if scaled == 0 { 1 } else { scaled }
}

const fn per_poll(micros: u32, poll_ns: u32) -> u32 {
    let loops = (micros as u64 * 1000 / poll_ns as u64) as u32;
    if loops == 0 { 1 } else { loops }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_reference() {
        let timing = BusTiming::default();
        assert_eq!(timing.zero_us, 111);
        assert_eq!(timing.one_us, 667);
        assert_eq!(timing.bit_us, 1000);
        assert_eq!(timing.one_threshold, 500);
        assert_eq!(timing.max_loops, 2000);
        assert_eq!(timing.wait_loops, 15_000);
        assert_eq!(timing.start_loops, Some(2000));
        assert_eq!(timing.poll_ns, 0);
    }

    #[test]
    fn test_compute_scales_with_clock() {
        let slow = compute_bus_timing(8_000_000, IdleProfile::ScanTool);
        assert_eq!(slow.one_threshold, 250);
        assert_eq!(slow.max_loops, 1000);
        assert_eq!(slow.wait_loops, 7500);

        let fast = compute_bus_timing(32_000_000, IdleProfile::InCarModule);
        assert_eq!(fast.one_threshold, 1000);
        assert_eq!(fast.max_loops, 4000);
        assert_eq!(fast.wait_loops, 20_000);
        assert_eq!(fast.start_loops, Some(4000));
    }

    #[test]
    fn test_compute_rounds_and_const_truncates() {
        // 1 MHz: 500 / 16 = 31.25, 2000 / 16 = 125, 15000 / 16 = 937.5
        let rounded = compute_bus_timing(1_000_000, IdleProfile::ScanTool);
        assert_eq!(rounded.one_threshold, 31);
        assert_eq!(rounded.wait_loops, 938);

        let truncated = const_bus_timing(1_000_000, IdleProfile::ScanTool);
        assert_eq!(truncated.one_threshold, 31);
        assert_eq!(truncated.max_loops, 125);
        assert_eq!(truncated.wait_loops, 937);
    }

    #[test]
    fn test_budgets_never_reach_zero() {
        let timing = compute_bus_timing(1, IdleProfile::ScanTool);
        assert_eq!(timing.one_threshold, 1);
        assert_eq!(const_bus_timing(1, IdleProfile::ScanTool).max_loops, 1);
    }

    #[test]
    fn test_sampled_timing() {
        let timing = sampled_bus_timing(10_000, IdleProfile::InCarModule);
        assert_eq!(timing.one_threshold, 50);
        assert_eq!(timing.max_loops, 200);
        assert_eq!(timing.wait_loops, 1000);
        assert_eq!(timing.poll_ns, 10_000);
    }

    #[test]
    fn test_bit_for_pulse() {
        let timing = BusTiming::default();
        assert!(!timing.bit_for_pulse(0));
        assert!(!timing.bit_for_pulse(499));
        assert!(timing.bit_for_pulse(500));
        assert!(timing.bit_for_pulse(1500));
    }

    #[test]
    fn test_slot_us() {
        let timing = BusTiming::default();
        assert_eq!(timing.slot_us(false), (111, 889));
        assert_eq!(timing.slot_us(true), (667, 333));
    }

    #[test]
    fn test_start_loops_override() {
        let timing = BusTiming::default().with_start_loops(None);
        assert_eq!(timing.start_loops, None);
    }
}
