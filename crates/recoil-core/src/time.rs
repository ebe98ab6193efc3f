//! Sequence numbers for ticks and input packets
//!
//! Provides the two independent counters every role keeps per entity:
//! - `TickNumber` - Identifies the state produced by one simulation step
//! - `PacketNumber` - Identifies one unit of produced input
//! - `SeqCounter` - Hands out monotonically increasing sequence numbers
//!
//! Input packets get their own numbering because under latency they are not
//! consumed in lockstep with the ticks that produced them.
//!
//! Both types reserve `u32::MAX` as an "invalid" sentinel. Incrementing into
//! the sentinel yields the sentinel; sequence numbers never wrap around.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw value reserved for "no sequence number"
pub const INVALID_SEQ: u32 = u32::MAX;

/// Common operations over sequence number newtypes
pub trait Sequence: Copy + Eq + Ord + fmt::Debug {
    /// Build from a raw wire value
    fn from_raw(raw: u32) -> Self;

    /// Get the raw wire value
    fn raw(self) -> u32;

    /// The sentinel value
    fn invalid() -> Self {
        Self::from_raw(INVALID_SEQ)
    }

    /// Whether this is a real sequence number
    fn is_valid(self) -> bool {
        self.raw() != INVALID_SEQ
    }

    /// The following sequence number, or the sentinel once the space is exhausted
    fn next(self) -> Self {
        if !self.is_valid() {
            return self;
        }
        match self.raw().checked_add(1) {
            Some(n) if n != INVALID_SEQ => Self::from_raw(n),
            _ => Self::invalid(),
        }
    }
}

macro_rules! sequence_number {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// The sentinel value
            pub const INVALID: Self = Self(INVALID_SEQ);

            /// The first sequence number handed out
            pub const ZERO: Self = Self(0);

            /// Create from a raw value
            pub fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Whether this is a real sequence number
            pub fn is_valid(self) -> bool {
                self.0 != INVALID_SEQ
            }

            /// The following sequence number, or the sentinel once exhausted
            pub fn next(self) -> Self {
                Sequence::next(self)
            }

            /// Number of steps from `self` to `later`, if both are valid and ordered
            pub fn steps_to(self, later: Self) -> Option<u32> {
                if self.is_valid() && later.is_valid() {
                    later.0.checked_sub(self.0)
                } else {
                    None
                }
            }
        }

        impl Sequence for $name {
            fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            fn raw(self) -> u32 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, concat!($label, ":{}"), self.0)
                } else {
                    write!(f, concat!($label, ":invalid"))
                }
            }
        }
    };
}

sequence_number!(
    /// Identifies the output state of one simulation step
    TickNumber,
    "tick"
);

sequence_number!(
    /// Identifies one produced unit of input
    PacketNumber,
    "packet"
);

/// Monotonic sequence number generator
#[derive(Debug, Clone)]
pub struct SeqCounter<T: Sequence> {
    next: T,
}

impl<T: Sequence> SeqCounter<T> {
    /// Create a counter starting at zero
    pub fn new() -> Self {
        Self {
            next: T::from_raw(0),
        }
    }

    /// The value the next call to `advance` will return
    pub fn peek(&self) -> T {
        self.next
    }

    /// Hand out the next sequence number
    ///
    /// Once the space is exhausted every call returns the sentinel.
    pub fn advance(&mut self) -> T {
        let current = self.next;
        self.next = current.next();
        current
    }

    /// Continue counting from `next`
    pub fn reset_to(&mut self, next: T) {
        self.next = next;
    }

    /// Whether the counter can no longer produce valid numbers
    pub fn is_exhausted(&self) -> bool {
        !self.next.is_valid()
    }
}

impl<T: Sequence> Default for SeqCounter<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel() {
        assert!(!TickNumber::INVALID.is_valid());
        assert!(TickNumber::ZERO.is_valid());
        assert_eq!(TickNumber::default(), TickNumber::INVALID);
        assert_eq!(PacketNumber::INVALID.next(), PacketNumber::INVALID);
    }

    #[test]
    fn test_next_never_wraps() {
        assert_eq!(TickNumber(5).next(), TickNumber(6));
        assert_eq!(TickNumber(INVALID_SEQ - 1).next(), TickNumber::INVALID);
    }

    #[test]
    fn test_steps_to() {
        assert_eq!(PacketNumber(3).steps_to(PacketNumber(7)), Some(4));
        assert_eq!(PacketNumber(7).steps_to(PacketNumber(3)), None);
        assert_eq!(PacketNumber::INVALID.steps_to(PacketNumber(3)), None);
    }

    #[test]
    fn test_counter() {
        let mut counter: SeqCounter<TickNumber> = SeqCounter::new();
        assert_eq!(counter.advance(), TickNumber(0));
        assert_eq!(counter.advance(), TickNumber(1));
        assert_eq!(counter.peek(), TickNumber(2));

        counter.reset_to(TickNumber(101));
        assert_eq!(counter.advance(), TickNumber(101));
    }

    #[test]
    fn test_counter_exhaustion() {
        let mut counter: SeqCounter<PacketNumber> = SeqCounter::new();
        counter.reset_to(PacketNumber(INVALID_SEQ - 1));
        assert_eq!(counter.advance(), PacketNumber(INVALID_SEQ - 1));
        assert!(counter.is_exhausted());
        assert_eq!(counter.advance(), PacketNumber::INVALID);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", TickNumber(12)), "tick:12");
        assert_eq!(format!("{}", PacketNumber::INVALID), "packet:invalid");
    }
}
