//! The latency algebra. Hardware latency is non-negative and monotonic:
//! the only operators are sequential composition and parallel join, there
//! is no subtraction and no negative delay.

use raceme_utils::{Error, RacemeResult};
use std::fmt;

/// Number of clock cycles a value needs before it is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// No information yet.
    Invalid,
    /// Exactly this many cycles.
    Known(u64),
    /// Data dependent, with a proven lower bound.
    Unknown(u64),
}

impl Delay {
    /// Sequential composition: the delay of `self` followed by `other`.
    /// Any `Unknown` operand makes the result `Unknown` with summed
    /// minimums; `Invalid` is absorbing.
    pub fn concat(self, other: Delay) -> Delay {
        use Delay::*;
        match (self, other) {
            (Invalid, _) | (_, Invalid) => Invalid,
            (Known(a), Known(b)) => Known(a + b),
            (Known(a), Unknown(b))
            | (Unknown(a), Known(b))
            | (Unknown(a), Unknown(b)) => Unknown(a + b),
        }
    }

    /// Parallel join: the delay of waiting for both `self` and `other`.
    /// `Invalid` acts as the identity; any `Unknown` operand makes the
    /// result `Unknown` with the max of the available minimums.
    pub fn merge(self, other: Delay) -> Delay {
        use Delay::*;
        match (self, other) {
            (Invalid, d) | (d, Invalid) => d,
            (Known(a), Known(b)) => Known(a.max(b)),
            (Known(a), Unknown(b))
            | (Unknown(a), Known(b))
            | (Unknown(a), Unknown(b)) => Unknown(a.max(b)),
        }
    }

    /// The exact cycle count, if one is proven.
    pub fn exact(self) -> Option<u64> {
        match self {
            Delay::Known(n) => Some(n),
            _ => None,
        }
    }

    /// The exact cycle count, or an unsupported-delay error naming the
    /// operation that needed it.
    pub fn require_exact(self, what: &str) -> RacemeResult<u64> {
        self.exact().ok_or_else(|| {
            Error::unsupported_delay(format!(
                "{} requires an exact delay, got {}",
                what, self
            ))
        })
    }

    pub fn is_exact(self) -> bool {
        matches!(self, Delay::Known(_))
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delay::Invalid => write!(f, "invalid"),
            Delay::Known(n) => write!(f, "{}", n),
            Delay::Unknown(min) => write!(f, ">={}", min),
        }
    }
}
