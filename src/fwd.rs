//! Machinery shared by the two singly-linked topologies.
//!
//! [`slist`](crate::slist) and [`stailq`](crate::stailq) have distinct
//! link record types but identical forward linkage, so the algorithms that
//! only touch `next` references are written once here, generic over
//! [`ForwardEntry`]. The big one is [`merge_sort`]: an in-place merge sort
//! over *open* ranges, shaped around `insert_after`-only splicing.

use crate::{EntryRef, Extract};

pub(crate) type Link<T, L> = Option<EntryRef<T, L>>;

/// A link record holding a single forward reference.
pub(crate) trait ForwardEntry<T>: Sized {
    fn next(&self) -> Link<T, Self>;

    /// Replace the forward reference, returning the old one.
    fn set_next(&self, next: Link<T, Self>) -> Link<T, Self>;
}

/// Read the successor of the record `link` denotes.
///
/// # Safety
///
/// `link` must denote a live link record.
#[inline]
pub(crate) unsafe fn next_of<T, L, E>(extract: &E, link: EntryRef<T, L>) -> Link<T, L>
where
    L: ForwardEntry<T>,
    E: Extract<T, L>,
{
    unsafe { extract.entry_of(link).as_ref().next() }
}

/// Replace the successor of the record `link` denotes, returning the old
/// successor.
///
/// # Safety
///
/// `link` must denote a live link record.
#[inline]
pub(crate) unsafe fn set_next<T, L, E>(
    extract: &E,
    link: EntryRef<T, L>,
    next: Link<T, L>,
) -> Link<T, L>
where
    L: ForwardEntry<T>,
    E: Extract<T, L>,
{
    unsafe { extract.entry_of(link).as_ref().set_next(next) }
}

/// In-place merge sort over the open range `(p1, e2)` of `n` elements,
/// returning the link to the range's new *last* element (or its first
/// successor when `n == 0`).
///
/// Forward lists can only relink "after a position", so the recursion
/// carries predecessors: the input range excludes `p1` itself, and the
/// returned last element is exactly the predecessor the caller needs to
/// sort a following range. The range is split at `pivot = n / 2`; sorting
/// the left half returns its last element, which is the predecessor `p2`
/// of the right half; after both halves are sorted they are merged by
/// splicing maximal runs of the right half in front of the left-half
/// cursor. Ties never move: a right-half element is relocated only when
/// it is strictly ordered before the left-half element it crosses.
///
/// # Safety
///
/// `(p1, e2)` must be a well-formed open range of exactly `n` live
/// elements, all linked through records resolvable by `extract`.
pub(crate) unsafe fn merge_sort<T, L, E, F>(
    extract: &E,
    p1: EntryRef<T, L>,
    e2: Link<T, L>,
    less: &mut F,
    n: usize,
) -> Link<T, L>
where
    L: ForwardEntry<T>,
    E: Extract<T, L>,
    F: FnMut(&T, &T) -> bool,
{
    match n {
        0 | 1 => return unsafe { next_of(extract, p1) },
        2 => {
            let Some(f1) = (unsafe { next_of(extract, p1) }) else {
                debug_unreachable!("two-element range shorter than promised")
            };
            let Some(f2) = (unsafe { next_of(extract, f1) }) else {
                debug_unreachable!("two-element range shorter than promised")
            };
            let swap = {
                let (a, b) = unsafe { (E::value_of(f1).as_ref(), E::value_of(f2).as_ref()) };
                less(b, a)
            };
            return if swap {
                unsafe {
                    set_next(extract, p1, Some(f2));
                    set_next(extract, f2, Some(f1));
                    set_next(extract, f1, e2);
                }
                Some(f1)
            } else {
                Some(f2)
            };
        }
        _ => {}
    }

    let pivot = n / 2;

    // The pivot element is the last of the left half, so its successor
    // link is the left half's open end.
    let mut p2 = p1;
    for _ in 0..pivot {
        let Some(next) = (unsafe { next_of(extract, p2) }) else {
            debug_unreachable!("range shorter than promised")
        };
        p2 = next;
    }
    let e1 = unsafe { next_of(extract, p2) };

    let Some(p2) = (unsafe { merge_sort(extract, p1, e1, less, pivot) }) else {
        debug_unreachable!("sorted half lost its elements")
    };
    let p_end = unsafe { merge_sort(extract, p2, e2, less, n - pivot) };

    let mut p1 = p1;
    let mut f1 = unsafe { next_of(extract, p1) };
    let mut f2 = unsafe { next_of(extract, p2) };

    while f1 != f2 && f2 != e2 {
        let (Some(cur1), Some(cur2)) = (f1, f2) else {
            debug_unreachable!("merge cursor ran off the range")
        };
        let advance = {
            let (a, b) = unsafe { (E::value_of(cur1).as_ref(), E::value_of(cur2).as_ref()) };
            !less(b, a)
        };
        if advance {
            p1 = cur1;
            f1 = unsafe { next_of(extract, cur1) };
            continue;
        }

        // Scan the maximal run [cur2, run_end] ordered strictly before
        // *cur1, then splice the whole run in front of cur1.
        let mut run_end = cur2;
        let mut scan = unsafe { next_of(extract, run_end) };
        while scan != e2 {
            let Some(s) = scan else {
                debug_unreachable!("merge scan ran off the range")
            };
            let before = {
                let (a, v) = unsafe { (E::value_of(cur1).as_ref(), E::value_of(s).as_ref()) };
                less(v, a)
            };
            if !before {
                break;
            }
            run_end = s;
            scan = unsafe { next_of(extract, s) };
        }

        unsafe {
            set_next(extract, p2, scan);
            set_next(extract, run_end, f1);
            set_next(extract, p1, Some(cur2));
        }
        f2 = scan;

        // The scan stopped because !less(*scan, *cur1), so cur1 is merged
        // next; advance past it.
        p1 = cur1;
        f1 = unsafe { next_of(extract, cur1) };
    }

    let Some(last_right) = p_end else {
        debug_unreachable!("sorted half lost its elements")
    };
    if unsafe { next_of(extract, last_right) } == e2 {
        return p_end;
    }

    // Runs were spliced past the right half's old last element; the new
    // last is somewhere at or after p2.
    let mut last = p2;
    loop {
        let next = unsafe { next_of(extract, last) };
        if next == e2 {
            return Some(last);
        }
        let Some(next) = next else {
            debug_unreachable!("open range not terminated by its end link")
        };
        last = next;
    }
}
