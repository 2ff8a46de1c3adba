//! Modular 16-bit sequence number arithmetic (§3).
//!
//! The sequence space wraps at 2^16. Ordering is defined modularly:
//! `a < b` iff `(b - a) mod 2^16` is in `(0, 2^15)`. A plain `u16 < u16`
//! comparison is wrong near the wraparound point, so every comparison in
//! the sender/receiver goes through `SeqNum` instead.

use std::cmp::Ordering;
use std::fmt;

/// A 16-bit sequence number compared with modular (wraparound-aware)
/// ordering rather than plain integer ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeqNum(pub u16);

impl From<u16> for SeqNum {
    fn from(value: u16) -> Self {
        SeqNum(value)
    }
}

impl From<SeqNum> for u16 {
    fn from(value: SeqNum) -> Self {
        value.0
    }
}

impl SeqNum {
    pub fn wrapping_add(self, n: u16) -> Self {
        SeqNum(self.0.wrapping_add(n))
    }

    pub fn next(self) -> Self {
        self.wrapping_add(1)
    }

    /// Signed forward distance from `self` to `other`, in `(-2^15, 2^15]`.
    /// Positive means `other` is ahead of `self` in modular order.
    pub fn distance_to(self, other: Self) -> i32 {
        let diff = other.0.wrapping_sub(self.0) as i16;
        diff as i32
    }

    /// True iff `self` precedes `other` in modular sequence order.
    pub fn precedes(self, other: Self) -> bool {
        self.distance_to(other) > 0
    }

    /// True iff `self` is at or before `other` in modular sequence order.
    pub fn precedes_or_eq(self, other: Self) -> bool {
        self == other || self.precedes(other)
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordering used by the timer heap and any container that must not rely on
/// the derived lexicographic `Ord` (which is plain integer order and wrong
/// across a wrap). Exposed as a function rather than a trait impl so that
/// `SeqNum`'s derived `Ord` (needed for `BTreeMap` keys, which only ever
/// hold a bounded `WINDOW`-sized contiguous range and never wrap within a
/// single map) is left untouched.
pub fn modular_cmp(a: SeqNum, b: SeqNum) -> Ordering {
    match a.distance_to(b) {
        0 => Ordering::Equal,
        d if d > 0 => Ordering::Less,
        _ => Ordering::Greater,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedes_simple() {
        assert!(SeqNum(0).precedes(SeqNum(1)));
        assert!(!SeqNum(1).precedes(SeqNum(0)));
    }

    #[test]
    fn precedes_across_wrap() {
        let near_max = SeqNum(65535);
        let wrapped = SeqNum(0);
        assert!(near_max.precedes(wrapped));
        assert!(!wrapped.precedes(near_max));
    }

    #[test]
    fn window_of_64_is_safely_ordered() {
        // A window of 64 is far inside the safe half of the 16-bit space.
        let base = SeqNum(65500);
        for i in 0..64u16 {
            let a = base.wrapping_add(i);
            let b = base.wrapping_add(i + 1);
            assert!(a.precedes(b), "{a} should precede {b}");
        }
    }

    #[test]
    fn modular_cmp_matches_precedes() {
        assert_eq!(modular_cmp(SeqNum(5), SeqNum(10)), Ordering::Less);
        assert_eq!(modular_cmp(SeqNum(10), SeqNum(5)), Ordering::Greater);
        assert_eq!(modular_cmp(SeqNum(7), SeqNum(7)), Ordering::Equal);
    }
}
