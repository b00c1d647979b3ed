use crate::error::Error;
use crate::timer::BusTiming;

/// Tracks line samples until the bus has been quiet long enough to transmit.
///
/// Feed one sample per poll to [`IdleWatch::poll`]. It returns
/// `nb::Error::WouldBlock` while waiting, `Ok(())` once `wait_loops`
/// consecutive idle samples were seen, and [`Error::BusBusy`] after more than
/// `max_loops` consecutive busy samples. Any idle sample resets the busy run and
/// any busy sample resets the idle run.
///
/// # Example
/// ```rust
/// use ecbus::timer::{BusTiming, IdleWatch};
///
/// let mut watch = IdleWatch::new(&BusTiming::default());
/// assert!(watch.poll(false).is_err()); // WouldBlock
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct IdleWatch {
    wait_loops: u32,
    max_busy: u32,
    idle: u32,
    busy: u32,
}

impl IdleWatch {
    /// Starts a fresh watch using the budgets in `timing`.
    pub const fn new(timing: &BusTiming) -> Self {
        Self {
            wait_loops: timing.wait_loops,
            max_busy: timing.max_loops,
            idle: 0,
            busy: 0,
        }
    }

    /// Records one sample of the line.
    pub fn poll(&mut self, line_active: bool) -> nb::Result<(), Error> {
        if line_active {
            self.idle = 0;
            self.busy += 1;
            if self.busy > self.max_busy {
                return Err(nb::Error::Other(Error::BusBusy));
            }
        } else {
            self.busy = 0;
            self.idle += 1;
            if self.idle >= self.wait_loops {
                return Ok(());
            }
        }
        Err(nb::Error::WouldBlock)
    }
}
