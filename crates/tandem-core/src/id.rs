//! Strongly-typed identifiers.

use std::fmt;

/// Monotonically increasing tick counter.
///
/// Incremented by exactly one for each completed tick handshake, and by
/// the engine-reported reset cost on reset. Only a fresh environment
/// starts again at zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickId(pub u64);

impl TickId {
    /// The tick following this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Advance by `n` ticks.
    pub fn advance(self, n: u64) -> Self {
        Self(self.0 + n)
    }
}

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TickId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_and_advance() {
        assert_eq!(TickId(0).next(), TickId(1));
        assert_eq!(TickId(5).advance(3), TickId(8));
        assert!(TickId(2) > TickId(1));
    }
}
