//! Error type for the E&C bus codec.
//!
//! Protocol outcomes such as a silent bus are normally reported through the
//! packet's `sent`/`incomplete` flags. [`Error`] still names them so the
//! lower-level pieces ([`crate::timer::IdleWatch`], the read path) can report
//! why a transfer stopped; the codec only lets [`Error::Line`] escape `read`
//! and `send`.

use embedded_hal::digital::ErrorKind;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised by the codec.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Error {
    /// A digital line reported a fault.
    #[error("digital line fault: {0:?}")]
    Line(ErrorKind),

    /// No start condition appeared within the start budget.
    #[error("no start condition on the bus")]
    NoStart,

    /// The bus stayed active longer than any legal pulse.
    #[error("bus held active")]
    BusStuck,

    /// The bus never went idle long enough to transmit.
    #[error("bus never went idle")]
    BusBusy,

    /// A field of a textual packet was not a number in `0..=255`.
    #[error("field {0} is not a number in 0..=255")]
    InvalidField(u8),

    /// A textual packet had more than five fields.
    #[error("expected at most five fields")]
    TooManyFields,
}

impl Error {
    /// Whether this error only means the bus was silent, stuck or busy.
    ///
    /// These outcomes are reported through [`crate::packet::Packet::sent`] rather than
    /// as failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::NoStart | Error::BusStuck | Error::BusBusy)
    }

    pub(crate) fn line<E: embedded_hal::digital::Error>(err: E) -> Self {
        Error::Line(err.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_flag_outcomes() {
        assert!(Error::NoStart.is_timeout());
        assert!(Error::BusStuck.is_timeout());
        assert!(Error::BusBusy.is_timeout());
        assert!(!Error::Line(ErrorKind::Other).is_timeout());
        assert!(!Error::InvalidField(2).is_timeout());
    }

    #[test]
    fn test_line_error_keeps_kind() {
        assert_eq!(Error::line(ErrorKind::Other), Error::Line(ErrorKind::Other));
    }
}
