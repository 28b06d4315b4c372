//! An intrusive doubly-linked tail queue.
//!
//! Every element carries a forward and a backward reference, which buys
//! O(1) insertion and removal at *any* known position, O(1) access to
//! both ends, and constant-time splicing of closed ranges: a range move
//! is four boundary relinks no matter how many elements it carries.
//!
//! The anchor stores the head and tail references itself; boundary
//! elements hold null links rather than pointing back at the anchor, so
//! moving an anchor (or swapping two of them) never leaves a stale
//! self-reference behind.

use crate::{
    size::{SizePolicy, Uncounted},
    util::FmtOption,
    EntryRef, EraseIf, Extract,
};
use core::{
    cell::UnsafeCell,
    fmt,
    marker::{PhantomData, PhantomPinned},
    mem,
    ptr::{self, NonNull},
};

type Link<T> = Option<EntryRef<T, Entry<T>>>;

/// The link record embedded in (or reachable from) every element of a
/// doubly-linked tail queue.
#[repr(transparent)]
pub struct Entry<T> {
    inner: UnsafeCell<EntryInner<T>>,
}

struct EntryInner<T> {
    next: Link<T>,
    prev: Link<T>,
    /// Linked elements may not move while they are on a list.
    _unpin: PhantomPinned,
}

/// The anchor of a doubly-linked tail queue: the head and tail references
/// plus the inline size policy value.
///
/// As with the forward topologies, the anchor is independent of the
/// extraction strategy; [`Proxy`] binds one later and [`Head`] owns both.
pub struct FwdHead<T, S = Uncounted> {
    /// Head in `next`, tail in `prev`. Elements never point back here.
    anchor: Entry<T>,
    len: S,
}

/// A tail queue that owns its anchor and extraction strategy.
pub struct Head<T, E, S = Uncounted> {
    fwd: FwdHead<T, S>,
    extract: E,
}

/// A tail queue facade borrowing an anchor declared elsewhere.
pub struct Proxy<'a, T, E, S = Uncounted> {
    fwd: &'a mut FwdHead<T, S>,
    extract: E,
}

/// A position in a doubly-linked tail queue: a live element or the end.
///
/// Unlike the forward topologies there is no `before_begin` sentinel
/// position; the backward links make "insert before" the primitive, and
/// inserting before the end position appends.
pub struct Pos<T> {
    link: Link<T>,
}

/// Iterates over a tail queue's elements by reference, from either end.
pub struct Iter<'a, T, E> {
    curr: Link<T>,
    curr_back: Link<T>,
    extract: &'a E,
    _list: PhantomData<&'a T>,
}

/// Read the successor of the record `link` denotes.
///
/// # Safety
///
/// `link` must denote a live link record.
#[inline]
unsafe fn next_of<T, E>(extract: &E, link: EntryRef<T, Entry<T>>) -> Link<T>
where
    E: Extract<T, Entry<T>>,
{
    unsafe { extract.entry_of(link).as_ref().next() }
}

/// Read the predecessor of the record `link` denotes.
///
/// # Safety
///
/// `link` must denote a live link record.
#[inline]
unsafe fn prev_of<T, E>(extract: &E, link: EntryRef<T, Entry<T>>) -> Link<T>
where
    E: Extract<T, Entry<T>>,
{
    unsafe { extract.entry_of(link).as_ref().prev() }
}

/// # Safety
///
/// `link` must denote a live link record.
#[inline]
unsafe fn set_next<T, E>(extract: &E, link: EntryRef<T, Entry<T>>, next: Link<T>) -> Link<T>
where
    E: Extract<T, Entry<T>>,
{
    unsafe { extract.entry_of(link).as_ref().set_next(next) }
}

/// # Safety
///
/// `link` must denote a live link record.
#[inline]
unsafe fn set_prev<T, E>(extract: &E, link: EntryRef<T, Entry<T>>, prev: Link<T>) -> Link<T>
where
    E: Extract<T, Entry<T>>,
{
    unsafe { extract.entry_of(link).as_ref().set_prev(prev) }
}

/// Unlink the closed range `[first, last]` from the chain anchored at
/// `fwd`, rewriting the two boundary links (or the anchor where a
/// boundary is an end of the list). The range keeps its internal links;
/// its own boundary links are left stale for [`insert_range`] to
/// overwrite.
///
/// Does not touch the inline count.
///
/// # Safety
///
/// `[first, last]` must be a non-empty closed range of the list anchored
/// at `fwd`, and every element must be resolvable by `extract`.
unsafe fn remove_range<T, E, S>(
    fwd: &FwdHead<T, S>,
    extract: &E,
    first: EntryRef<T, Entry<T>>,
    last: EntryRef<T, Entry<T>>,
) where
    E: Extract<T, Entry<T>>,
    S: SizePolicy,
{
    let before = unsafe { prev_of(extract, first) };
    let after = unsafe { next_of(extract, last) };
    match before {
        Some(b) => {
            unsafe { set_next(extract, b, after) };
        }
        None => {
            fwd.anchor.set_next(after);
        }
    }
    match after {
        Some(a) => {
            unsafe { set_prev(extract, a, before) };
        }
        None => {
            fwd.anchor.set_prev(before);
        }
    }
}

/// Link the closed range `[first, last]` immediately before `pos` in the
/// chain anchored at `fwd`; `None` appends at the tail. Four boundary
/// relinks, independent of the range length.
///
/// Does not touch the inline count.
///
/// # Safety
///
/// `[first, last]` must be a detached, internally linked, non-empty
/// closed range; `pos` must be a position of the list anchored at `fwd`;
/// every element must be resolvable by `extract`.
unsafe fn insert_range<T, E, S>(
    fwd: &FwdHead<T, S>,
    extract: &E,
    pos: Link<T>,
    first: EntryRef<T, Entry<T>>,
    last: EntryRef<T, Entry<T>>,
) where
    E: Extract<T, Entry<T>>,
    S: SizePolicy,
{
    let before = match pos {
        Some(p) => unsafe { prev_of(extract, p) },
        None => fwd.anchor.prev(),
    };
    unsafe {
        set_prev(extract, first, before);
        set_next(extract, last, pos);
    }
    match before {
        Some(b) => {
            unsafe { set_next(extract, b, Some(first)) };
        }
        None => {
            fwd.anchor.set_next(Some(first));
        }
    }
    match pos {
        Some(p) => {
            unsafe { set_prev(extract, p, Some(last)) };
        }
        None => {
            fwd.anchor.set_prev(Some(last));
        }
    }
}

/// In-place merge sort over the half-open range `[f1, e2)` of `n`
/// elements, returning the link to the range's new first element.
///
/// The backward links let the sort work on element positions directly
/// instead of carrying predecessors the way the forward sort does: the
/// range is split at `pivot = n / 2`, both halves are sorted, and maximal
/// runs of the right half are spliced in front of the left-half cursor
/// with [`remove_range`]/[`insert_range`] pairs. Ties never move.
///
/// # Safety
///
/// `[f1, e2)` must be a well-formed range of exactly `n` live elements of
/// the list anchored at `fwd`, all resolvable by `extract`.
unsafe fn sort_range<T, E, S, F>(
    fwd: &FwdHead<T, S>,
    extract: &E,
    f1: Link<T>,
    e2: Link<T>,
    less: &mut F,
    n: usize,
) -> Link<T>
where
    E: Extract<T, Entry<T>>,
    S: SizePolicy,
    F: FnMut(&T, &T) -> bool,
{
    match n {
        0 | 1 => return f1,
        2 => {
            let Some(a) = f1 else {
                debug_unreachable!("two-element range shorter than promised")
            };
            let Some(b) = (unsafe { next_of(extract, a) }) else {
                debug_unreachable!("two-element range shorter than promised")
            };
            let swap = {
                let (va, vb) = unsafe { (E::value_of(a).as_ref(), E::value_of(b).as_ref()) };
                less(vb, va)
            };
            return if swap {
                unsafe {
                    remove_range(fwd, extract, b, b);
                    insert_range(fwd, extract, Some(a), b, b);
                }
                Some(b)
            } else {
                f1
            };
        }
        _ => {}
    }

    let pivot = n / 2;

    // The element at index `pivot` opens the right half; it is never
    // relocated by sorting either half, so it stays a valid boundary.
    let mut e1 = f1;
    for _ in 0..pivot {
        let Some(link) = e1 else {
            debug_unreachable!("range shorter than promised")
        };
        e1 = unsafe { next_of(extract, link) };
    }

    let f1 = unsafe { sort_range(fwd, extract, f1, e1, less, pivot) };
    let f2 = unsafe { sort_range(fwd, extract, e1, e2, less, n - pivot) };

    let merged_min = {
        let (Some(a), Some(b)) = (f1, f2) else {
            debug_unreachable!("sorted half lost its elements")
        };
        let right_first = {
            let (va, vb) = unsafe { (E::value_of(a).as_ref(), E::value_of(b).as_ref()) };
            less(vb, va)
        };
        if right_first {
            f2
        } else {
            f1
        }
    };

    let mut f1 = f1;
    let mut f2 = f2;
    while f1 != f2 && f2 != e2 {
        let (Some(cur1), Some(cur2)) = (f1, f2) else {
            debug_unreachable!("merge cursor ran off the range")
        };
        let advance = {
            let (a, b) = unsafe { (E::value_of(cur1).as_ref(), E::value_of(cur2).as_ref()) };
            !less(b, a)
        };
        if advance {
            f1 = unsafe { next_of(extract, cur1) };
            continue;
        }

        // Scan the maximal run [cur2, run_end] ordered strictly before
        // *cur1, then move the whole run in front of cur1.
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
            remove_range(fwd, extract, cur2, run_end);
            insert_range(fwd, extract, Some(cur1), cur2, run_end);
        }
        f2 = scan;
        f1 = unsafe { next_of(extract, cur1) };
    }

    merged_min
}

/// Operations on a doubly-linked tail queue.
///
/// The same pointer contract as the forward topologies applies: methods
/// that link or unlink elements are `unsafe`, the caller keeps linked
/// elements alive and pinned, and positions must belong to this list.
/// Cross-list operations require interchangeable extraction strategies.
///
/// # Safety
///
/// Implementors must return the same anchor from `fwd_head` and
/// `fwd_head_mut` for as long as the value exists, and `extractor` must
/// resolve the entry of every element linked into that anchor.
pub unsafe trait TailqOps<T, E, S = Uncounted>
where
    E: Extract<T, Entry<T>>,
    S: SizePolicy,
{
    /// Borrows the list's anchor.
    fn fwd_head(&self) -> &FwdHead<T, S>;

    /// Mutably borrows the list's anchor.
    fn fwd_head_mut(&mut self) -> &mut FwdHead<T, S>;

    /// Borrows the extraction strategy.
    fn extractor(&self) -> &E;

    /// Returns the position of the first element, or the end position if
    /// the list is empty.
    fn begin(&self) -> Pos<T> {
        Pos {
            link: self.fwd_head().anchor.next(),
        }
    }

    /// Returns the end position. Inserting before it appends.
    fn end(&self) -> Pos<T> {
        Pos { link: None }
    }

    /// Returns the position of the last element, or the end position if
    /// the list is empty.
    fn before_end(&self) -> Pos<T> {
        Pos {
            link: self.fwd_head().anchor.prev(),
        }
    }

    /// Returns the position denoting `item`.
    fn pos_of(&self, item: NonNull<T>) -> Pos<T> {
        Pos {
            link: Some(E::item_ref(item)),
        }
    }

    /// Advances `pos` to its successor.
    ///
    /// # Safety
    ///
    /// `pos` must denote a live element of this list, not the end
    /// position.
    unsafe fn next_pos(&self, pos: Pos<T>) -> Pos<T> {
        let Some(link) = pos.link else {
            debug_unreachable!("`next_pos` called with the end position")
        };
        Pos {
            link: unsafe { next_of(self.extractor(), link) },
        }
    }

    /// Steps `pos` back to its predecessor; stepping back from the end
    /// position yields the last element.
    ///
    /// # Safety
    ///
    /// `pos` must be a position of this list other than the first
    /// element's.
    unsafe fn prev_pos(&self, pos: Pos<T>) -> Pos<T> {
        match pos.link {
            Some(link) => Pos {
                link: unsafe { prev_of(self.extractor(), link) },
            },
            None => self.before_end(),
        }
    }

    /// Returns a pointer to the element at `pos`.
    ///
    /// # Safety
    ///
    /// `pos` must denote a live element of this list, not the end
    /// position.
    unsafe fn value_at(&self, pos: Pos<T>) -> NonNull<T> {
        let Some(link) = pos.link else {
            debug_unreachable!("`value_at` called with the end position")
        };
        unsafe { E::value_of(link) }
    }

    /// `true` if the list has no elements.
    fn is_empty(&self) -> bool {
        self.fwd_head().anchor.next().is_none()
    }

    /// The number of elements: O(1) when the size policy is
    /// [`Counted`](crate::Counted), otherwise a full traversal.
    fn len(&self) -> usize {
        if S::TRACKED {
            self.fwd_head().len.get()
        } else {
            self.iter().count()
        }
    }

    /// Borrows the first element.
    fn front(&self) -> Option<&T> {
        self.fwd_head()
            .anchor
            .next()
            // Links reachable from the anchor always denote live elements.
            .map(|link| unsafe { E::value_of(link).as_ref() })
    }

    /// Borrows the last element.
    fn back(&self) -> Option<&T> {
        self.fwd_head()
            .anchor
            .prev()
            .map(|link| unsafe { E::value_of(link).as_ref() })
    }

    /// Iterates over the elements; the iterator is double-ended.
    fn iter(&self) -> Iter<'_, T, E> {
        Iter {
            curr: self.fwd_head().anchor.next(),
            curr_back: self.fwd_head().anchor.prev(),
            extract: self.extractor(),
            _list: PhantomData,
        }
    }

    /// Unlinks every element. The elements themselves are not touched.
    fn clear(&mut self) {
        self.fwd_head().anchor.set_next(None);
        self.fwd_head().anchor.set_prev(None);
        self.fwd_head_mut().len.set(0);
    }

    /// Links `item` immediately before `pos`, returning its new position.
    /// Inserting before the end position appends.
    ///
    /// # Safety
    ///
    /// `pos` must be a position of this list, and `item` must be live,
    /// unlinked, and stay at its address while linked.
    unsafe fn insert_before(&mut self, pos: Pos<T>, item: NonNull<T>) -> Pos<T> {
        let item_link = E::item_ref(item);
        unsafe {
            insert_range(
                self.fwd_head(),
                self.extractor(),
                pos.link,
                item_link,
                item_link,
            )
        };
        self.fwd_head_mut().len.incr();
        Pos {
            link: Some(item_link),
        }
    }

    /// Links `item` at the front of the list.
    ///
    /// # Safety
    ///
    /// As for [`TailqOps::insert_before`].
    unsafe fn push_front(&mut self, item: NonNull<T>) {
        unsafe { self.insert_before(self.begin(), item) };
    }

    /// Links `item` at the back of the list.
    ///
    /// # Safety
    ///
    /// As for [`TailqOps::insert_before`].
    unsafe fn push_back(&mut self, item: NonNull<T>) {
        unsafe { self.insert_before(self.end(), item) };
    }

    /// Links every element yielded by `items` before `pos`, in order.
    ///
    /// # Safety
    ///
    /// As for [`TailqOps::insert_before`], for every element.
    unsafe fn extend_before(&mut self, pos: Pos<T>, items: impl IntoIterator<Item = NonNull<T>>) {
        for item in items {
            unsafe { self.insert_before(pos, item) };
        }
    }

    /// Appends every element yielded by `items`, in order.
    ///
    /// # Safety
    ///
    /// As for [`TailqOps::insert_before`], for every element.
    unsafe fn extend_back(&mut self, items: impl IntoIterator<Item = NonNull<T>>) {
        unsafe { self.extend_before(self.end(), items) };
    }

    /// Unlinks the element at `pos`, returning the position after it. The
    /// removed element's links are nulled.
    ///
    /// # Safety
    ///
    /// `pos` must denote a live element of this list, not the end
    /// position.
    unsafe fn erase(&mut self, pos: Pos<T>) -> Pos<T> {
        let Some(link) = pos.link else {
            debug_unreachable!("`erase` called with the end position")
        };
        let next = unsafe { next_of(self.extractor(), link) };
        unsafe {
            remove_range(self.fwd_head(), self.extractor(), link, link);
            set_next(self.extractor(), link, None);
            set_prev(self.extractor(), link, None);
        }
        self.fwd_head_mut().len.decr();
        Pos { link: next }
    }

    /// Unlinks and returns the first element.
    ///
    /// # Safety
    ///
    /// As for [`TailqOps::erase`].
    unsafe fn pop_front(&mut self) -> Option<NonNull<T>> {
        let first = self.fwd_head().anchor.next()?;
        unsafe { self.erase(Pos { link: Some(first) }) };
        Some(unsafe { E::value_of(first) })
    }

    /// Unlinks and returns the last element.
    ///
    /// # Safety
    ///
    /// As for [`TailqOps::erase`].
    unsafe fn pop_back(&mut self) -> Option<NonNull<T>> {
        let last = self.fwd_head().anchor.prev()?;
        unsafe { self.erase(Pos { link: Some(last) }) };
        Some(unsafe { E::value_of(last) })
    }

    /// Unlinks every element in `[first, last)`, returning `last`. The
    /// relink cost is constant; a tracked size policy adds one traversal
    /// of the range to count it.
    ///
    /// # Safety
    ///
    /// `[first, last)` must be a well-formed range of this list.
    unsafe fn erase_range(&mut self, first: Pos<T>, last: Pos<T>) -> Pos<T> {
        if first == last {
            return last;
        }
        let Some(first_link) = first.link else {
            debug_unreachable!("`first` is the end position but `last` is not")
        };
        let last_link = match last.link {
            Some(p) => unsafe { prev_of(self.extractor(), p) },
            None => self.fwd_head().anchor.prev(),
        };
        let Some(last_link) = last_link else {
            debug_unreachable!("`last` precedes `first`")
        };
        if S::TRACKED {
            let mut n = 1;
            let mut scan = first_link;
            while scan != last_link {
                let Some(next) = (unsafe { next_of(self.extractor(), scan) }) else {
                    debug_unreachable!("`last` not reachable from `first`")
                };
                n += 1;
                scan = next;
            }
            self.fwd_head_mut().len.sub(n);
        }
        unsafe { remove_range(self.fwd_head(), self.extractor(), first_link, last_link) };
        last
    }

    /// Moves every element of `other` to immediately before `pos`,
    /// leaving `other` empty. O(1).
    ///
    /// # Safety
    ///
    /// `pos` must be a position of this list, and the two lists'
    /// extraction strategies must be interchangeable.
    unsafe fn splice<S2, O>(&mut self, pos: Pos<T>, other: &mut O)
    where
        S2: SizePolicy,
        O: TailqOps<T, E, S2>,
    {
        let Some(first) = other.fwd_head().anchor.next() else {
            return;
        };
        let Some(last) = other.fwd_head().anchor.prev() else {
            debug_unreachable!("non-empty list with no tail")
        };
        if S::TRACKED {
            let n = other.len();
            self.fwd_head_mut().len.add(n);
        }
        other.fwd_head().anchor.set_next(None);
        other.fwd_head().anchor.set_prev(None);
        other.fwd_head_mut().len.set(0);

        unsafe { insert_range(self.fwd_head(), self.extractor(), pos.link, first, last) };
    }

    /// Moves the elements in `other`'s range `[first, last)` to
    /// immediately before `pos`. The relink cost is constant; counting
    /// the range for a tracked size policy on either side adds one
    /// traversal.
    ///
    /// # Safety
    ///
    /// `pos` must be a position of this list; `[first, last)` must be a
    /// well-formed range of `other` not containing `pos`; and the two
    /// lists' extraction strategies must be interchangeable.
    unsafe fn splice_range<S2, O>(&mut self, pos: Pos<T>, other: &mut O, first: Pos<T>, last: Pos<T>)
    where
        S2: SizePolicy,
        O: TailqOps<T, E, S2>,
    {
        if first == last {
            return;
        }
        let Some(first_link) = first.link else {
            debug_unreachable!("`first` is the end position but `last` is not")
        };
        let last_link = match last.link {
            Some(p) => unsafe { prev_of(self.extractor(), p) },
            None => other.fwd_head().anchor.prev(),
        };
        let Some(last_link) = last_link else {
            debug_unreachable!("`last` precedes `first`")
        };

        if S::TRACKED || S2::TRACKED {
            let mut n = 1;
            let mut scan = first_link;
            while scan != last_link {
                let Some(next) = (unsafe { next_of(self.extractor(), scan) }) else {
                    debug_unreachable!("`last` not reachable from `first`")
                };
                n += 1;
                scan = next;
            }
            self.fwd_head_mut().len.add(n);
            other.fwd_head_mut().len.sub(n);
        }

        unsafe {
            remove_range(other.fwd_head(), self.extractor(), first_link, last_link);
            insert_range(
                self.fwd_head(),
                self.extractor(),
                pos.link,
                first_link,
                last_link,
            );
        }
    }

    /// Merges sorted `other` into sorted `self`, leaving `other` empty.
    ///
    /// Both lists must already be ordered under `less`. Maximal runs of
    /// donor elements are moved with one range relink per run, and ties
    /// keep the receiver's elements first.
    ///
    /// # Safety
    ///
    /// The two lists' extraction strategies must be interchangeable.
    unsafe fn merge<S2, O, F>(&mut self, other: &mut O, mut less: F)
    where
        S2: SizePolicy,
        O: TailqOps<T, E, S2>,
        F: FnMut(&T, &T) -> bool,
    {
        if ptr::addr_eq(self.fwd_head(), other.fwd_head()) {
            return;
        }
        if S::TRACKED {
            let n = other.len();
            self.fwd_head_mut().len.add(n);
        }
        other.fwd_head_mut().len.set(0);

        let mut f1 = self.fwd_head().anchor.next();
        let mut f2 = other.fwd_head().anchor.next();

        while let (Some(cur1), Some(cur2)) = (f1, f2) {
            let advance = {
                let (a, b) = unsafe { (E::value_of(cur1).as_ref(), E::value_of(cur2).as_ref()) };
                !less(b, a)
            };
            if advance {
                f1 = unsafe { next_of(self.extractor(), cur1) };
                continue;
            }

            // Scan the maximal donor run ordered strictly before *cur1,
            // then move the whole run in front of it.
            let mut run_end = cur2;
            let mut scan = unsafe { next_of(self.extractor(), run_end) };
            while let Some(s) = scan {
                let before = {
                    let (a, v) = unsafe { (E::value_of(cur1).as_ref(), E::value_of(s).as_ref()) };
                    less(v, a)
                };
                if !before {
                    break;
                }
                run_end = s;
                scan = unsafe { next_of(self.extractor(), s) };
            }
            unsafe {
                remove_range(other.fwd_head(), self.extractor(), cur2, run_end);
                insert_range(
                    self.fwd_head(),
                    self.extractor(),
                    Some(cur1),
                    cur2,
                    run_end,
                );
            }
            test_trace!("merge: spliced donor run");
            f2 = scan;
            f1 = unsafe { next_of(self.extractor(), cur1) };
        }

        if let Some(rest) = f2 {
            // The donor remainder is ordered after our last element.
            let Some(last) = other.fwd_head().anchor.prev() else {
                debug_unreachable!("non-empty list with no tail")
            };
            unsafe {
                remove_range(other.fwd_head(), self.extractor(), rest, last);
                insert_range(self.fwd_head(), self.extractor(), None, rest, last);
            }
        }
    }

    /// Sorts the list with an in-place merge sort: O(n log n)
    /// comparisons, no allocation, stable.
    fn sort<F>(&mut self, mut less: F)
    where
        F: FnMut(&T, &T) -> bool,
    {
        let n = self.len();
        let head = self.fwd_head().anchor.next();
        // Links reachable from the anchor always denote live records; the
        // anchor itself is maintained by the range relinks.
        unsafe { sort_range(self.fwd_head(), self.extractor(), head, None, &mut less, n) };
    }

    /// Reverses the element order in one pass.
    fn reverse(&mut self) {
        let mut cur = self.fwd_head().anchor.next();
        while let Some(link) = cur {
            // Links reachable from the anchor always denote live records.
            let next = unsafe { set_next(self.extractor(), link, prev_of(self.extractor(), link)) };
            unsafe { set_prev(self.extractor(), link, next) };
            cur = next;
        }
        let head = self.fwd_head().anchor.set_next(None);
        let tail = self.fwd_head().anchor.set_prev(head);
        self.fwd_head().anchor.set_next(tail);
    }

    /// Unlinks adjacent elements equivalent under `eq`, keeping the first
    /// of each run. Each run is unlinked with a single range erase.
    fn unique<F>(&mut self, mut eq: F)
    where
        F: FnMut(&T, &T) -> bool,
    {
        let Some(mut kept) = self.fwd_head().anchor.next() else {
            return;
        };
        let mut cur = unsafe { next_of(self.extractor(), kept) };
        while let Some(link) = cur {
            let dup = {
                let (a, b) = unsafe { (E::value_of(kept).as_ref(), E::value_of(link).as_ref()) };
                eq(a, b)
            };
            if !dup {
                kept = link;
                cur = unsafe { next_of(self.extractor(), link) };
                continue;
            }

            let mut after = unsafe { next_of(self.extractor(), link) };
            while let Some(s) = after {
                let dup = {
                    let (a, b) = unsafe { (E::value_of(kept).as_ref(), E::value_of(s).as_ref()) };
                    eq(a, b)
                };
                if !dup {
                    break;
                }
                after = unsafe { next_of(self.extractor(), s) };
            }
            unsafe { self.erase_range(Pos { link: Some(link) }, Pos { link: after }) };
            cur = after;
        }
    }

    /// Unlinks every element satisfying `pred`, returning how many were
    /// removed. Contiguous matches are unlinked with one range erase.
    fn remove_if<P>(&mut self, mut pred: P) -> usize
    where
        P: FnMut(&T) -> bool,
    {
        let mut removed = 0;
        let mut cur = self.fwd_head().anchor.next();
        while let Some(link) = cur {
            if !pred(unsafe { E::value_of(link).as_ref() }) {
                cur = unsafe { next_of(self.extractor(), link) };
                continue;
            }
            removed += 1;
            let mut after = unsafe { next_of(self.extractor(), link) };
            while let Some(s) = after {
                if !pred(unsafe { E::value_of(s).as_ref() }) {
                    break;
                }
                removed += 1;
                after = unsafe { next_of(self.extractor(), s) };
            }
            unsafe { self.erase_range(Pos { link: Some(link) }, Pos { link: after }) };
            cur = after;
        }
        test_trace!(removed, "remove_if");
        removed
    }

    /// Unlinks every element equal to `value`, returning how many were
    /// removed.
    fn remove(&mut self, value: &T) -> usize
    where
        T: PartialEq,
    {
        self.remove_if(|item| *item == *value)
    }

    /// Exchanges the contents of two lists in O(1), plus a traversal for
    /// any untracked side whose new counter must be computed.
    ///
    /// # Safety
    ///
    /// The two lists' extraction strategies must be interchangeable.
    unsafe fn swap<S2, O>(&mut self, other: &mut O)
    where
        S2: SizePolicy,
        O: TailqOps<T, E, S2>,
    {
        let self_len = if S2::TRACKED { Some(self.len()) } else { None };
        let other_len = if S::TRACKED { Some(other.len()) } else { None };

        let my_head = self.fwd_head().anchor.set_next(None);
        let their_head = other.fwd_head().anchor.set_next(my_head);
        self.fwd_head().anchor.set_next(their_head);

        let my_tail = self.fwd_head().anchor.set_prev(None);
        let their_tail = other.fwd_head().anchor.set_prev(my_tail);
        self.fwd_head().anchor.set_prev(their_tail);

        if let Some(n) = other_len {
            self.fwd_head_mut().len.set(n);
        }
        if let Some(n) = self_len {
            other.fwd_head_mut().len.set(n);
        }
    }

    /// Asserts the structural invariants: each backward link matches the
    /// forward chain, the anchor's tail is the last element, and a
    /// tracked inline count agrees with traversal.
    #[track_caller]
    fn assert_valid(&self) {
        let mut n = 0;
        let mut prev: Link<T> = None;
        let mut cur = self.fwd_head().anchor.next();
        while let Some(link) = cur {
            assert_eq!(
                unsafe { prev_of(self.extractor(), link) },
                prev,
                "backward link must match the forward chain"
            );
            n += 1;
            prev = Some(link);
            cur = unsafe { next_of(self.extractor(), link) };
        }
        assert_eq!(
            self.fwd_head().anchor.prev(),
            prev,
            "anchor tail must be the last element reached by traversal"
        );
        if S::TRACKED {
            assert_eq!(
                self.fwd_head().len.get(),
                n,
                "inline count must agree with traversal"
            );
        }
    }
}

// === impl Entry ===

impl<T> Entry<T> {
    /// Returns a new, unlinked `Entry`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(EntryInner {
                next: None,
                prev: None,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    fn next(&self) -> Link<T> {
        unsafe { (*self.inner.get()).next }
    }

    #[inline]
    fn prev(&self) -> Link<T> {
        unsafe { (*self.inner.get()).prev }
    }

    #[inline]
    fn set_next(&self, next: Link<T>) -> Link<T> {
        unsafe { mem::replace(&mut (*self.inner.get()).next, next) }
    }

    #[inline]
    fn set_prev(&self, prev: Link<T>) -> Link<T> {
        unsafe { mem::replace(&mut (*self.inner.get()).prev, prev) }
    }
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Entry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let next = self.next();
        let prev = self.prev();
        f.debug_struct("tailq::Entry")
            .field("next", &FmtOption::new(&next))
            .field("prev", &FmtOption::new(&prev))
            .finish()
    }
}

/// # Safety
///
/// The pointers an `Entry` stores are only dereferenced by the list its
/// element is linked into, never by the entry on its own, so sending an
/// entry to another thread is sending the element.
unsafe impl<T: Send> Send for Entry<T> {}

/// # Safety
///
/// An `Entry` never hands out references to the pointed-to elements
/// through `&self`, so sharing it cannot race on `T`.
unsafe impl<T: Sync> Sync for Entry<T> {}

// === impl FwdHead ===

impl<T, S: SizePolicy> FwdHead<T, S> {
    /// Returns a new anchor for an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            anchor: Entry::new(),
            len: S::default(),
        }
    }
}

impl<T, S: SizePolicy> Default for FwdHead<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S: SizePolicy> fmt::Debug for FwdHead<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = self.anchor.next();
        let tail = self.anchor.prev();
        f.debug_struct("tailq::FwdHead")
            .field("head", &FmtOption::new(&head))
            .field("tail", &FmtOption::new(&tail))
            .field("len", &self.len)
            .finish()
    }
}

// === impl Head ===

impl<T, E, S> Head<T, E, S>
where
    E: Extract<T, Entry<T>>,
    S: SizePolicy,
{
    /// Returns a new, empty list using the strategy `extract`.
    #[must_use]
    pub fn new(extract: E) -> Self {
        Self {
            fwd: FwdHead::new(),
            extract,
        }
    }
}

unsafe impl<T, E, S> TailqOps<T, E, S> for Head<T, E, S>
where
    E: Extract<T, Entry<T>>,
    S: SizePolicy,
{
    #[inline]
    fn fwd_head(&self) -> &FwdHead<T, S> {
        &self.fwd
    }

    #[inline]
    fn fwd_head_mut(&mut self) -> &mut FwdHead<T, S> {
        &mut self.fwd
    }

    #[inline]
    fn extractor(&self) -> &E {
        &self.extract
    }
}

impl<T, E, S> Default for Head<T, E, S>
where
    E: Extract<T, Entry<T>> + Default,
    S: SizePolicy,
{
    fn default() -> Self {
        Self::new(E::default())
    }
}

impl<T, E, S: SizePolicy> fmt::Debug for Head<T, E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("tailq::Head")
            .field("fwd", &self.fwd)
            .finish_non_exhaustive()
    }
}

impl<T, E, S> EraseIf<T> for Head<T, E, S>
where
    E: Extract<T, Entry<T>>,
    S: SizePolicy,
{
    fn erase_if(&mut self, pred: impl FnMut(&T) -> bool) -> usize {
        self.remove_if(pred)
    }
}

// === impl Proxy ===

impl<'a, T, E, S> Proxy<'a, T, E, S>
where
    E: Extract<T, Entry<T>>,
    S: SizePolicy,
{
    /// Binds the anchor `fwd` to the strategy `extract`.
    pub fn new(fwd: &'a mut FwdHead<T, S>, extract: E) -> Self {
        Self { fwd, extract }
    }
}

unsafe impl<T, E, S> TailqOps<T, E, S> for Proxy<'_, T, E, S>
where
    E: Extract<T, Entry<T>>,
    S: SizePolicy,
{
    #[inline]
    fn fwd_head(&self) -> &FwdHead<T, S> {
        self.fwd
    }

    #[inline]
    fn fwd_head_mut(&mut self) -> &mut FwdHead<T, S> {
        self.fwd
    }

    #[inline]
    fn extractor(&self) -> &E {
        &self.extract
    }
}

impl<T, E, S: SizePolicy> fmt::Debug for Proxy<'_, T, E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("tailq::Proxy")
            .field("fwd", &self.fwd)
            .finish_non_exhaustive()
    }
}

impl<T, E, S> EraseIf<T> for Proxy<'_, T, E, S>
where
    E: Extract<T, Entry<T>>,
    S: SizePolicy,
{
    fn erase_if(&mut self, pred: impl FnMut(&T) -> bool) -> usize {
        self.remove_if(pred)
    }
}

// === impl Pos ===

impl<T> Pos<T> {
    /// `true` if this is the end position.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.link.is_none()
    }
}

impl<T> Clone for Pos<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Pos<T> {}

impl<T> PartialEq for Pos<T> {
    fn eq(&self, other: &Self) -> bool {
        self.link == other.link
    }
}

impl<T> Eq for Pos<T> {}

impl<T> fmt::Debug for Pos<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("tailq::Pos")
            .field(&FmtOption::new(&self.link))
            .finish()
    }
}

// === impl Iter ===

impl<'a, T, E> Iterator for Iter<'a, T, E>
where
    E: Extract<T, Entry<T>>,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let link = self.curr?;
        // Links reachable from the anchor always denote live elements.
        let value = unsafe { E::value_of(link).as_ref() };
        if self.curr == self.curr_back {
            self.curr = None;
            self.curr_back = None;
        } else {
            self.curr = unsafe { next_of(self.extract, link) };
        }
        Some(value)
    }
}

impl<'a, T, E> DoubleEndedIterator for Iter<'a, T, E>
where
    E: Extract<T, Entry<T>>,
{
    fn next_back(&mut self) -> Option<&'a T> {
        let link = self.curr_back?;
        let value = unsafe { E::value_of(link).as_ref() };
        if self.curr == self.curr_back {
            self.curr = None;
            self.curr_back = None;
        } else {
            self.curr_back = unsafe { prev_of(self.extract, link) };
        }
        Some(value)
    }
}

impl<'a, T, E> Clone for Iter<'a, T, E> {
    fn clone(&self) -> Self {
        Self {
            curr: self.curr,
            curr_back: self.curr_back,
            extract: self.extract,
            _list: PhantomData,
        }
    }
}

impl<'a, T, E> fmt::Debug for Iter<'a, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("tailq::Iter")
            .field("curr", &FmtOption::new(&self.curr))
            .field("curr_back", &FmtOption::new(&self.curr_back))
            .finish()
    }
}
