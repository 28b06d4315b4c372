//! Inline size tracking policies.
//!
//! A list anchor is generic over a [`SizePolicy`] choosing between an
//! inline element counter ([`Counted`], O(1) `len`) and no counter at all
//! ([`Uncounted`], a ZST; `len` is recomputed by traversal). The policy is
//! fixed at the type level and changes nothing but the cost of `len`.

use core::fmt;

/// Controls whether a list anchor carries an inline element count.
pub trait SizePolicy: Copy + Default + fmt::Debug {
    /// `true` if the count is stored inline, `false` if it must be
    /// recomputed by traversal.
    const TRACKED: bool;

    /// The stored count. Only meaningful when [`Self::TRACKED`] is `true`;
    /// the untracked policy panics here, and no list operation consults it
    /// without checking `TRACKED` first.
    fn get(&self) -> usize;

    /// Overwrite the stored count.
    fn set(&mut self, len: usize);

    /// Record `n` insertions.
    fn add(&mut self, n: usize);

    /// Record `n` removals.
    fn sub(&mut self, n: usize);

    /// Record a single insertion.
    fn incr(&mut self) {
        self.add(1);
    }

    /// Record a single removal.
    fn decr(&mut self) {
        self.sub(1);
    }
}

/// An inline `usize` element counter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Counted(usize);

/// No inline counter; `len` is O(n).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Uncounted;

// === impl Counted ===

impl SizePolicy for Counted {
    const TRACKED: bool = true;

    #[inline]
    fn get(&self) -> usize {
        self.0
    }

    #[inline]
    fn set(&mut self, len: usize) {
        self.0 = len;
    }

    #[inline]
    fn add(&mut self, n: usize) {
        self.0 += n;
    }

    #[inline]
    fn sub(&mut self, n: usize) {
        debug_assert!(self.0 >= n, "removed more elements than were tracked");
        self.0 -= n;
    }
}

// === impl Uncounted ===

impl SizePolicy for Uncounted {
    const TRACKED: bool = false;

    fn get(&self) -> usize {
        unreachable!("inline count queried on an untracked list")
    }

    #[inline]
    fn set(&mut self, _: usize) {}

    #[inline]
    fn add(&mut self, _: usize) {}

    #[inline]
    fn sub(&mut self, _: usize) {}
}
