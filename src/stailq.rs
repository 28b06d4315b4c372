//! An intrusive singly-linked tail queue.
//!
//! Identical forward linkage to [`slist`](crate::slist), plus a cached
//! reference to the last element in the anchor. The cache buys O(1)
//! [`push_back`](StailqOps::push_back) and [`back`](StailqOps::back), and
//! turns whole-list splices into constant-time relinks, at the price of a
//! tail fixup in every operation that can change which element is last.
//!
//! The cache is `None` exactly when the list is empty, so moving the
//! anchor never leaves a dangling self-reference behind.

use crate::{
    fwd::{self, ForwardEntry},
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
/// singly-linked tail queue.
#[repr(transparent)]
pub struct Entry<T> {
    inner: UnsafeCell<EntryInner<T>>,
}

struct EntryInner<T> {
    next: Link<T>,
    /// Linked elements may not move while they are on a list.
    _unpin: PhantomPinned,
}

/// The anchor of a tail queue: the sentinel link record, the cached tail
/// reference, and the inline size policy value.
///
/// As with [`slist::FwdHead`](crate::slist::FwdHead), the anchor is
/// independent of the extraction strategy; [`Proxy`] binds one later and
/// [`Head`] owns both.
pub struct FwdHead<T, S = Uncounted> {
    head: Entry<T>,
    tail: Link<T>,
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

/// A position in a tail queue: a live element, the
/// [`before_begin`](StailqOps::before_begin) sentinel, or the end.
pub struct Pos<T> {
    link: Link<T>,
}

/// Iterates over a tail queue's elements by reference.
pub struct Iter<'a, T, E> {
    curr: Link<T>,
    extract: &'a E,
    _list: PhantomData<&'a T>,
}

/// Operations on a singly-linked tail queue.
///
/// The surface is [`SlistOps`](crate::SlistOps) plus the back-of-list
/// operations the cached tail makes O(1). The same pointer contract
/// applies: methods that link or unlink elements are `unsafe`, the caller
/// keeps linked elements alive and pinned, and positions must belong to
/// this list. Cross-list operations require interchangeable extraction
/// strategies.
///
/// # Safety
///
/// Implementors must return the same anchor from `fwd_head` and
/// `fwd_head_mut` for as long as the value exists, and `extractor` must
/// resolve the entry of every element linked into that anchor.
pub unsafe trait StailqOps<T, E, S = Uncounted>
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

    /// Returns the sentinel position before the first element.
    fn before_begin(&self) -> Pos<T> {
        Pos {
            link: Some(EntryRef::Entry(NonNull::from(&self.fwd_head().head))),
        }
    }

    /// Returns the position of the last element, or
    /// [`before_begin`](StailqOps::before_begin) if the list is empty.
    /// Inserting after it appends.
    fn before_end(&self) -> Pos<T> {
        match self.fwd_head().tail {
            Some(tail) => Pos { link: Some(tail) },
            None => self.before_begin(),
        }
    }

    /// Returns the position of the first element, or the end position if
    /// the list is empty.
    fn begin(&self) -> Pos<T> {
        Pos {
            link: self.fwd_head().head.next(),
        }
    }

    /// Returns the end position.
    fn end(&self) -> Pos<T> {
        Pos { link: None }
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
    /// `pos` must denote the sentinel or a live element of this list, not
    /// the end position.
    unsafe fn next_pos(&self, pos: Pos<T>) -> Pos<T> {
        let Some(link) = pos.link else {
            debug_unreachable!("`next_pos` called with the end position")
        };
        Pos {
            link: unsafe { fwd::next_of(self.extractor(), link) },
        }
    }

    /// Returns a pointer to the element at `pos`.
    ///
    /// # Safety
    ///
    /// `pos` must denote a live element of this list: neither the end
    /// position nor [`before_begin`](StailqOps::before_begin).
    unsafe fn value_at(&self, pos: Pos<T>) -> NonNull<T> {
        let Some(link) = pos.link else {
            debug_unreachable!("`value_at` called with the end position")
        };
        unsafe { E::value_of(link) }
    }

    /// `true` if the list has no elements.
    fn is_empty(&self) -> bool {
        self.fwd_head().tail.is_none()
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
            .head
            .next()
            // Links reachable from the anchor always denote live elements.
            .map(|link| unsafe { E::value_of(link).as_ref() })
    }

    /// Borrows the last element.
    fn back(&self) -> Option<&T> {
        self.fwd_head()
            .tail
            .map(|link| unsafe { E::value_of(link).as_ref() })
    }

    /// Iterates over the elements.
    fn iter(&self) -> Iter<'_, T, E> {
        Iter {
            curr: self.fwd_head().head.next(),
            extract: self.extractor(),
            _list: PhantomData,
        }
    }

    /// Unlinks every element. The elements themselves are not touched.
    fn clear(&mut self) {
        self.fwd_head().head.set_next(None);
        let fwd = self.fwd_head_mut();
        fwd.tail = None;
        fwd.len.set(0);
    }

    /// Links `item` immediately after `pos`, returning its new position.
    ///
    /// # Safety
    ///
    /// `pos` must denote the sentinel or a live element of this list, and
    /// `item` must be live, unlinked, and stay at its address while
    /// linked.
    unsafe fn insert_after(&mut self, pos: Pos<T>, item: NonNull<T>) -> Pos<T> {
        let Some(pos_link) = pos.link else {
            debug_unreachable!("`insert_after` called with the end position")
        };
        let item_link = E::item_ref(item);
        let old = unsafe {
            let old = fwd::set_next(self.extractor(), pos_link, Some(item_link));
            fwd::set_next(self.extractor(), item_link, old);
            old
        };
        let fwd = self.fwd_head_mut();
        if old.is_none() {
            fwd.tail = Some(item_link);
        }
        fwd.len.incr();
        Pos {
            link: Some(item_link),
        }
    }

    /// Links `item` at the front of the list.
    ///
    /// # Safety
    ///
    /// As for [`StailqOps::insert_after`].
    unsafe fn push_front(&mut self, item: NonNull<T>) {
        unsafe { self.insert_after(self.before_begin(), item) };
    }

    /// Links `item` at the back of the list in O(1).
    ///
    /// # Safety
    ///
    /// As for [`StailqOps::insert_after`].
    unsafe fn push_back(&mut self, item: NonNull<T>) {
        unsafe { self.insert_after(self.before_end(), item) };
    }

    /// Links every element yielded by `items` after `pos`, in order,
    /// returning the position of the last one linked.
    ///
    /// # Safety
    ///
    /// As for [`StailqOps::insert_after`], for every element.
    unsafe fn extend_after(
        &mut self,
        mut pos: Pos<T>,
        items: impl IntoIterator<Item = NonNull<T>>,
    ) -> Pos<T> {
        for item in items {
            pos = unsafe { self.insert_after(pos, item) };
        }
        pos
    }

    /// Appends every element yielded by `items`, in order.
    ///
    /// # Safety
    ///
    /// As for [`StailqOps::insert_after`], for every element.
    unsafe fn extend_back(&mut self, items: impl IntoIterator<Item = NonNull<T>>) {
        unsafe { self.extend_after(self.before_end(), items) };
    }

    /// Unlinks and returns the element after `pos`, or `None` if nothing
    /// follows `pos`.
    ///
    /// # Safety
    ///
    /// `pos` must denote the sentinel or a live element of this list.
    unsafe fn erase_after(&mut self, pos: Pos<T>) -> Option<NonNull<T>> {
        let Some(pos_link) = pos.link else {
            debug_unreachable!("`erase_after` called with the end position")
        };
        let removed = unsafe { fwd::next_of(self.extractor(), pos_link) }?;
        let after = unsafe {
            let after = fwd::set_next(self.extractor(), removed, None);
            fwd::set_next(self.extractor(), pos_link, after);
            after
        };
        if after.is_none() {
            // `pos` is the new last element, unless it is the sentinel of
            // a now-empty list.
            let tail = if self.fwd_head().head.next().is_none() {
                None
            } else {
                Some(pos_link)
            };
            self.fwd_head_mut().tail = tail;
        }
        self.fwd_head_mut().len.decr();
        Some(unsafe { E::value_of(removed) })
    }

    /// Unlinks and returns the first element.
    ///
    /// # Safety
    ///
    /// As for [`StailqOps::erase_after`].
    unsafe fn pop_front(&mut self) -> Option<NonNull<T>> {
        unsafe { self.erase_after(self.before_begin()) }
    }

    /// Unlinks every element in the open range `(first, last)` by
    /// rewriting the single boundary link (plus the tail cache when the
    /// range reaches the end).
    ///
    /// # Safety
    ///
    /// `first` must denote the sentinel or a live element of this list,
    /// and `last` must be a position reachable from `first`.
    unsafe fn erase_range_after(&mut self, first: Pos<T>, last: Pos<T>) {
        let Some(first_link) = first.link else {
            debug_unreachable!("`erase_range_after` called with the end position")
        };
        if S::TRACKED {
            let mut n = 0;
            let mut scan = unsafe { fwd::next_of(self.extractor(), first_link) };
            while scan != last.link {
                let Some(s) = scan else {
                    debug_unreachable!("`last` not reachable from `first`")
                };
                n += 1;
                scan = unsafe { fwd::next_of(self.extractor(), s) };
            }
            self.fwd_head_mut().len.sub(n);
        }
        unsafe { fwd::set_next(self.extractor(), first_link, last.link) };
        if last.link.is_none() {
            let tail = if self.fwd_head().head.next().is_none() {
                None
            } else {
                Some(first_link)
            };
            self.fwd_head_mut().tail = tail;
        }
    }

    /// Finds the position whose successor is `pos`, scanning from the
    /// front; the end position if `pos` is not found.
    fn find_predecessor(&self, pos: Pos<T>) -> Pos<T> {
        let mut prev = self.before_begin();
        loop {
            let Some(link) = prev.link else {
                return Pos { link: None };
            };
            // Links reachable from the anchor always denote live records.
            let next = unsafe { fwd::next_of(self.extractor(), link) };
            if next == pos.link {
                return prev;
            }
            prev = Pos { link: next };
        }
    }

    /// Finds the predecessor of the first element satisfying `pred`,
    /// returning it with `true`; with no match, returns the last position
    /// in the list with `false`.
    fn find_predecessor_if<P>(&self, mut pred: P) -> (Pos<T>, bool)
    where
        P: FnMut(&T) -> bool,
    {
        let mut prev = self.before_begin();
        let mut scan = self.fwd_head().head.next();
        while let Some(link) = scan {
            if pred(unsafe { E::value_of(link).as_ref() }) {
                return (prev, true);
            }
            prev = Pos { link: Some(link) };
            scan = unsafe { fwd::next_of(self.extractor(), link) };
        }
        (prev, false)
    }

    /// Moves every element of `other` to immediately after `pos`, leaving
    /// `other` empty. The receiver's elements that followed `pos` follow
    /// the spliced-in ones.
    ///
    /// O(1): the donor's tail cache replaces the scan a plain
    /// singly-linked list would need.
    ///
    /// # Safety
    ///
    /// `pos` must denote the sentinel or a live element of this list, and
    /// the two lists' extraction strategies must be interchangeable.
    unsafe fn splice_after<S2, O>(&mut self, pos: Pos<T>, other: &mut O)
    where
        S2: SizePolicy,
        O: StailqOps<T, E, S2>,
    {
        let Some(first) = other.fwd_head().head.next() else {
            return;
        };
        let Some(donor_tail) = other.fwd_head().tail else {
            debug_unreachable!("non-empty donor with no cached tail")
        };
        let Some(pos_link) = pos.link else {
            debug_unreachable!("`splice_after` called with the end position")
        };
        if S::TRACKED {
            let n = other.len();
            self.fwd_head_mut().len.add(n);
        }

        let suffix = unsafe {
            let suffix = fwd::set_next(self.extractor(), pos_link, Some(first));
            fwd::set_next(self.extractor(), donor_tail, suffix);
            suffix
        };
        if suffix.is_none() {
            self.fwd_head_mut().tail = Some(donor_tail);
        }
        other.clear();
    }

    /// Moves the elements in `other`'s open range `(first, last)` to
    /// immediately after `pos`.
    ///
    /// # Safety
    ///
    /// `pos` must denote the sentinel or a live element of this list;
    /// `(first, last)` must be a well-formed open range of `other`; the
    /// range must not contain `pos`; and the two lists' extraction
    /// strategies must be interchangeable.
    unsafe fn splice_range_after<S2, O>(
        &mut self,
        pos: Pos<T>,
        other: &mut O,
        first: Pos<T>,
        last: Pos<T>,
    ) where
        S2: SizePolicy,
        O: StailqOps<T, E, S2>,
    {
        if first == last {
            return;
        }
        let Some(first_link) = first.link else {
            debug_unreachable!("`first` is the end position but `last` is not")
        };
        let Some(pos_link) = pos.link else {
            debug_unreachable!("`splice_range_after` called with the end position")
        };

        // Detach the open range from the donor and fix its tail if the
        // range reached the donor's end.
        let moved = unsafe { fwd::set_next(self.extractor(), first_link, last.link) };
        if moved == last.link {
            return;
        }
        let Some(moved_first) = moved else {
            debug_unreachable!("`last` not reachable from `first`")
        };
        if last.link.is_none() {
            let tail = if other.fwd_head().head.next().is_none() {
                None
            } else {
                Some(first_link)
            };
            other.fwd_head_mut().tail = tail;
        }

        // Find the last element of the detached run, counting as we go.
        let mut n = 1;
        let mut last_insert = moved_first;
        loop {
            let next = unsafe { fwd::next_of(self.extractor(), last_insert) };
            if next == last.link {
                break;
            }
            let Some(next) = next else {
                debug_unreachable!("`last` not reachable from `first`")
            };
            n += 1;
            last_insert = next;
        }

        self.fwd_head_mut().len.add(n);
        other.fwd_head_mut().len.sub(n);

        let suffix = unsafe {
            let suffix = fwd::set_next(self.extractor(), pos_link, Some(moved_first));
            fwd::set_next(self.extractor(), last_insert, suffix);
            suffix
        };
        if suffix.is_none() {
            self.fwd_head_mut().tail = Some(last_insert);
        }
    }

    /// Merges sorted `other` into sorted `self`, leaving `other` empty.
    ///
    /// Both lists must already be ordered under `less`. Maximal runs of
    /// donor elements are spliced in one relink per run, and ties keep
    /// the receiver's elements first.
    ///
    /// # Safety
    ///
    /// The two lists' extraction strategies must be interchangeable.
    unsafe fn merge<S2, O, F>(&mut self, other: &mut O, mut less: F)
    where
        S2: SizePolicy,
        O: StailqOps<T, E, S2>,
        F: FnMut(&T, &T) -> bool,
    {
        if ptr::addr_eq(self.fwd_head(), other.fwd_head()) {
            return;
        }
        if S::TRACKED {
            let n = other.len();
            self.fwd_head_mut().len.add(n);
        }
        let donor_tail = other.fwd_head().tail;

        let mut p1 = EntryRef::Entry(NonNull::from(&self.fwd_head().head));
        let mut f1 = self.fwd_head().head.next();
        let mut f2 = other.fwd_head().head.next();

        while let (Some(cur1), Some(cur2)) = (f1, f2) {
            let advance = {
                let (a, b) = unsafe { (E::value_of(cur1).as_ref(), E::value_of(cur2).as_ref()) };
                !less(b, a)
            };
            if advance {
                p1 = cur1;
                f1 = unsafe { fwd::next_of(self.extractor(), cur1) };
                continue;
            }

            // Scan the maximal donor run ordered strictly before *cur1,
            // then splice the whole run in front of it.
            let mut run_end = cur2;
            let mut scan = unsafe { fwd::next_of(self.extractor(), run_end) };
            while let Some(s) = scan {
                let before = {
                    let (a, v) = unsafe { (E::value_of(cur1).as_ref(), E::value_of(s).as_ref()) };
                    less(v, a)
                };
                if !before {
                    break;
                }
                run_end = s;
                scan = unsafe { fwd::next_of(self.extractor(), s) };
            }
            unsafe {
                fwd::set_next(self.extractor(), run_end, f1);
                fwd::set_next(self.extractor(), p1, Some(cur2));
            }
            test_trace!("merge: spliced donor run");
            f2 = scan;
            p1 = run_end;
        }

        if let Some(rest) = f2 {
            // The donor remainder becomes the new suffix, so the donor's
            // last element becomes ours.
            unsafe { fwd::set_next(self.extractor(), p1, Some(rest)) };
            self.fwd_head_mut().tail = donor_tail;
        }
        other.clear();
    }

    /// Sorts the list with an in-place merge sort: O(n log n)
    /// comparisons, no allocation, stable.
    fn sort<F>(&mut self, mut less: F)
    where
        F: FnMut(&T, &T) -> bool,
    {
        let n = self.len();
        let p1 = EntryRef::Entry(NonNull::from(&self.fwd_head().head));
        // Links reachable from the anchor always denote live records, and
        // the sort hands back the new last element for the tail cache.
        let last = unsafe { fwd::merge_sort(self.extractor(), p1, None, &mut less, n) };
        self.fwd_head_mut().tail = last;
    }

    /// Reverses the element order in one pass.
    fn reverse(&mut self) {
        let old_first = self.fwd_head().head.next();
        let mut prev: Link<T> = None;
        let mut cur = old_first;
        while let Some(link) = cur {
            // Links reachable from the anchor always denote live records.
            cur = unsafe { fwd::set_next(self.extractor(), link, prev) };
            prev = Some(link);
        }
        self.fwd_head().head.set_next(prev);
        self.fwd_head_mut().tail = old_first;
    }

    /// Unlinks adjacent elements equivalent under `eq`, keeping the first
    /// of each run. Each run is unlinked with a single range erase.
    fn unique<F>(&mut self, mut eq: F)
    where
        F: FnMut(&T, &T) -> bool,
    {
        let Some(mut kept) = self.fwd_head().head.next() else {
            return;
        };
        let mut cur = unsafe { fwd::next_of(self.extractor(), kept) };
        while let Some(link) = cur {
            let dup = {
                let (a, b) = unsafe { (E::value_of(kept).as_ref(), E::value_of(link).as_ref()) };
                eq(a, b)
            };
            if !dup {
                kept = link;
                cur = unsafe { fwd::next_of(self.extractor(), link) };
                continue;
            }

            let mut after = unsafe { fwd::next_of(self.extractor(), link) };
            while let Some(s) = after {
                let dup = {
                    let (a, b) = unsafe { (E::value_of(kept).as_ref(), E::value_of(s).as_ref()) };
                    eq(a, b)
                };
                if !dup {
                    break;
                }
                after = unsafe { fwd::next_of(self.extractor(), s) };
            }
            unsafe { self.erase_range_after(Pos { link: Some(kept) }, Pos { link: after }) };
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
        let mut prev = self.before_begin();
        let mut cur = self.fwd_head().head.next();
        while let Some(link) = cur {
            if !pred(unsafe { E::value_of(link).as_ref() }) {
                prev = Pos { link: Some(link) };
                cur = unsafe { fwd::next_of(self.extractor(), link) };
                continue;
            }
            removed += 1;
            let mut after = unsafe { fwd::next_of(self.extractor(), link) };
            while let Some(s) = after {
                if !pred(unsafe { E::value_of(s).as_ref() }) {
                    break;
                }
                removed += 1;
                after = unsafe { fwd::next_of(self.extractor(), s) };
            }
            unsafe { self.erase_range_after(prev, Pos { link: after }) };
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
        O: StailqOps<T, E, S2>,
    {
        let self_len = if S2::TRACKED { Some(self.len()) } else { None };
        let other_len = if S::TRACKED { Some(other.len()) } else { None };

        let mine = self.fwd_head().head.set_next(None);
        let theirs = other.fwd_head().head.set_next(mine);
        self.fwd_head().head.set_next(theirs);

        let my_tail = self.fwd_head().tail;
        let their_tail = other.fwd_head().tail;
        self.fwd_head_mut().tail = their_tail;
        other.fwd_head_mut().tail = my_tail;

        if let Some(n) = other_len {
            self.fwd_head_mut().len.set(n);
        }
        if let Some(n) = self_len {
            other.fwd_head_mut().len.set(n);
        }
    }

    /// Asserts the structural invariants: the chain terminates at the
    /// null link, the cached tail is the last element (`None` exactly
    /// when empty), and a tracked inline count agrees with traversal.
    #[track_caller]
    fn assert_valid(&self) {
        let mut n = 0;
        let mut last = None;
        let mut cur = self.fwd_head().head.next();
        while let Some(link) = cur {
            n += 1;
            last = Some(link);
            cur = unsafe { fwd::next_of(self.extractor(), link) };
        }
        assert_eq!(
            self.fwd_head().tail,
            last,
            "cached tail must be the last element reached by traversal"
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
                _unpin: PhantomPinned,
            }),
        }
    }
}

impl<T> ForwardEntry<T> for Entry<T> {
    #[inline]
    fn next(&self) -> Link<T> {
        unsafe { (*self.inner.get()).next }
    }

    #[inline]
    fn set_next(&self, next: Link<T>) -> Link<T> {
        unsafe { mem::replace(&mut (*self.inner.get()).next, next) }
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
        f.debug_struct("stailq::Entry")
            .field("next", &FmtOption::new(&next))
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
            head: Entry::new(),
            tail: None,
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
        f.debug_struct("stailq::FwdHead")
            .field("head", &self.head)
            .field("tail", &FmtOption::new(&self.tail))
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

unsafe impl<T, E, S> StailqOps<T, E, S> for Head<T, E, S>
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
        f.debug_struct("stailq::Head")
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

unsafe impl<T, E, S> StailqOps<T, E, S> for Proxy<'_, T, E, S>
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
        f.debug_struct("stailq::Proxy")
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
        f.debug_tuple("stailq::Pos")
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
        self.curr = unsafe { fwd::next_of(self.extract, link) };
        Some(value)
    }
}

impl<'a, T, E> Clone for Iter<'a, T, E> {
    fn clone(&self) -> Self {
        Self {
            curr: self.curr,
            extract: self.extract,
            _list: PhantomData,
        }
    }
}

impl<'a, T, E> fmt::Debug for Iter<'a, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("stailq::Iter")
            .field(&FmtOption::new(&self.curr))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{util::trace_init, ByExtractor, ByOffset, Counted};
    use proptest::prelude::*;
    use std::{boxed::Box, collections::VecDeque, vec::Vec};

    struct Node {
        val: i32,
        link: Entry<Node>,
    }

    type Offset = ByOffset<{ core::mem::offset_of!(Node, link) }>;
    type List = Head<Node, Offset, Counted>;
    type Loose = Head<Node, Offset, Uncounted>;
    type Mapped = ByExtractor<fn(NonNull<Node>) -> NonNull<Entry<Node>>>;
    type MappedList = Head<Node, Mapped, Uncounted>;

    fn links_of(p: NonNull<Node>) -> NonNull<Entry<Node>> {
        unsafe { NonNull::from(&p.as_ref().link) }
    }

    fn mapped_list() -> MappedList {
        MappedList::new(ByExtractor(links_of))
    }

    fn nodes(vals: &[i32]) -> Vec<Box<Node>> {
        vals.iter()
            .map(|&val| {
                Box::new(Node {
                    val,
                    link: Entry::new(),
                })
            })
            .collect()
    }

    fn ptr(node: &Node) -> NonNull<Node> {
        NonNull::from(node)
    }

    fn push_all<E, S>(list: &mut impl StailqOps<Node, E, S>, nodes: &[Box<Node>])
    where
        E: Extract<Node, Entry<Node>>,
        S: SizePolicy,
    {
        for node in nodes.iter() {
            unsafe { list.push_back(ptr(node)) };
        }
    }

    fn collect<E, S>(list: &impl StailqOps<Node, E, S>) -> Vec<i32>
    where
        E: Extract<Node, Entry<Node>>,
        S: SizePolicy,
    {
        list.iter().map(|n| n.val).collect()
    }

    #[test]
    fn push_back_appends() {
        let _trace = trace_init();
        let ns = nodes(&[1, 2, 3]);
        let mut list = List::default();

        assert!(list.is_empty());
        assert_eq!(list.back().map(|n| n.val), None);

        push_all(&mut list, &ns);
        list.assert_valid();
        assert_eq!(collect(&list), &[1, 2, 3]);
        assert_eq!(list.front().map(|n| n.val), Some(1));
        assert_eq!(list.back().map(|n| n.val), Some(3));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn push_front_then_back() {
        let ns = nodes(&[1, 2]);
        let mut list = mapped_list();

        unsafe { list.push_front(ptr(&ns[0])) };
        list.assert_valid();
        assert_eq!(list.back().map(|n| n.val), Some(1));

        unsafe { list.push_back(ptr(&ns[1])) };
        list.assert_valid();
        assert_eq!(collect(&list), &[1, 2]);
        assert_eq!(list.back().map(|n| n.val), Some(2));
    }

    #[test]
    fn erase_after_updates_tail() {
        let _trace = trace_init();
        let ns = nodes(&[1, 2, 3]);
        let mut list = List::default();
        push_all(&mut list, &ns);

        // Remove the last element; its predecessor becomes the tail.
        let pos = list.pos_of(ptr(&ns[1]));
        assert_eq!(unsafe { list.erase_after(pos) }, Some(ptr(&ns[2])));
        list.assert_valid();
        assert_eq!(list.back().map(|n| n.val), Some(2));

        // Drain to empty; the tail cache must clear.
        assert_eq!(unsafe { list.pop_front() }, Some(ptr(&ns[0])));
        assert_eq!(unsafe { list.pop_front() }, Some(ptr(&ns[1])));
        list.assert_valid();
        assert!(list.is_empty());
        assert_eq!(unsafe { list.pop_front() }, None);
    }

    #[test]
    fn erase_range_after_to_end_updates_tail() {
        let ns = nodes(&[1, 2, 3, 4]);
        let mut list = List::default();
        push_all(&mut list, &ns);

        unsafe { list.erase_range_after(list.pos_of(ptr(&ns[1])), list.end()) };
        list.assert_valid();
        assert_eq!(collect(&list), &[1, 2]);
        assert_eq!(list.back().map(|n| n.val), Some(2));

        unsafe { list.erase_range_after(list.before_begin(), list.end()) };
        list.assert_valid();
        assert!(list.is_empty());
    }

    #[test]
    fn splice_after_is_tail_to_tail() {
        let _trace = trace_init();
        let a = nodes(&[1, 2, 5, 6]);
        let b = nodes(&[3, 4]);
        let mut recv = List::default();
        let mut donor = List::default();
        push_all(&mut recv, &a);
        push_all(&mut donor, &b);

        // Splicing into the middle keeps the receiver's suffix and tail.
        let pos = recv.pos_of(ptr(&a[1]));
        unsafe { recv.splice_after(pos, &mut donor) };
        recv.assert_valid();
        donor.assert_valid();
        assert_eq!(collect(&recv), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(recv.back().map(|n| n.val), Some(6));
        assert!(donor.is_empty());

        // Splicing at the end adopts the donor's tail.
        let c = nodes(&[7, 8]);
        push_all(&mut donor, &c);
        unsafe { recv.splice_after(recv.before_end(), &mut donor) };
        recv.assert_valid();
        donor.assert_valid();
        assert_eq!(collect(&recv), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(recv.back().map(|n| n.val), Some(8));
    }

    #[test]
    fn splice_range_after_fixes_both_tails() {
        let a = nodes(&[1]);
        let b = nodes(&[2, 3, 4]);
        let mut recv = List::default();
        let mut donor = Loose::default();
        push_all(&mut recv, &a);
        push_all(&mut donor, &b);

        // Move (2, end), i.e. elements 3 and 4, to the end of recv.
        let first = donor.begin();
        let last = donor.end();
        unsafe { recv.splice_range_after(recv.before_end(), &mut donor, first, last) };
        recv.assert_valid();
        donor.assert_valid();
        assert_eq!(collect(&recv), &[1, 3, 4]);
        assert_eq!(recv.back().map(|n| n.val), Some(4));
        assert_eq!(collect(&donor), &[2]);
        assert_eq!(donor.back().map(|n| n.val), Some(2));
    }

    #[test]
    fn merge_adopts_donor_tail() {
        let _trace = trace_init();
        let a = nodes(&[1, 4]);
        let b = nodes(&[2, 3, 5, 6]);
        let mut recv = List::default();
        let mut donor = List::default();
        push_all(&mut recv, &a);
        push_all(&mut donor, &b);

        unsafe { recv.merge(&mut donor, |x, y| x.val < y.val) };
        recv.assert_valid();
        donor.assert_valid();
        assert_eq!(collect(&recv), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(recv.back().map(|n| n.val), Some(6));
        assert_eq!(recv.len(), 6);
        assert!(donor.is_empty());
    }

    #[test]
    fn sort_reverse_unique_maintain_tail() {
        let _trace = trace_init();
        let ns = nodes(&[3, 1, 4, 1, 5]);
        let mut list = List::default();
        for node in ns.iter() {
            unsafe { list.push_front(ptr(node)) };
        }
        assert_eq!(collect(&list), &[5, 1, 4, 1, 3]);
        assert_eq!(list.back().map(|n| n.val), Some(3));

        list.sort(|a, b| a.val < b.val);
        list.assert_valid();
        assert_eq!(collect(&list), &[1, 1, 3, 4, 5]);
        assert_eq!(list.back().map(|n| n.val), Some(5));

        list.unique(|a, b| a.val == b.val);
        list.assert_valid();
        assert_eq!(collect(&list), &[1, 3, 4, 5]);

        list.reverse();
        list.assert_valid();
        assert_eq!(collect(&list), &[5, 4, 3, 1]);
        assert_eq!(list.back().map(|n| n.val), Some(1));
    }

    #[test]
    fn reverse_is_involutive() {
        let ns = nodes(&[1, 2, 3]);
        let mut list = List::default();
        push_all(&mut list, &ns);

        list.reverse();
        list.assert_valid();
        assert_eq!(collect(&list), &[3, 2, 1]);
        assert_eq!(list.back().map(|n| n.val), Some(1));

        list.reverse();
        list.assert_valid();
        assert_eq!(collect(&list), &[1, 2, 3]);
        assert_eq!(list.back().map(|n| n.val), Some(3));
    }

    #[test]
    fn remove_if_can_empty_the_list() {
        let ns = nodes(&[2, 2, 2]);
        let mut list = List::default();
        push_all(&mut list, &ns);

        assert_eq!(list.remove_if(|n| n.val == 2), 3);
        list.assert_valid();
        assert!(list.is_empty());
        assert_eq!(list.back().map(|n| n.val), None);
    }

    #[test]
    fn swap_exchanges_tails() {
        let a = nodes(&[1, 2]);
        let b = nodes(&[7, 8, 9]);
        let mut counted = List::default();
        let mut uncounted = Loose::default();
        push_all(&mut counted, &a);
        push_all(&mut uncounted, &b);

        unsafe { counted.swap(&mut uncounted) };
        counted.assert_valid();
        uncounted.assert_valid();
        assert_eq!(collect(&counted), &[7, 8, 9]);
        assert_eq!(counted.len(), 3);
        assert_eq!(counted.back().map(|n| n.val), Some(9));
        assert_eq!(collect(&uncounted), &[1, 2]);
        assert_eq!(uncounted.back().map(|n| n.val), Some(2));
    }

    #[test]
    fn proxy_binds_a_detached_anchor() {
        let ns = nodes(&[1, 2]);
        let mut fwd = FwdHead::<Node, Counted>::new();

        {
            let mut list = Proxy::new(&mut fwd, Offset::default());
            push_all(&mut list, &ns);
            list.assert_valid();
        }

        let list = Proxy::new(&mut fwd, Offset::default());
        assert_eq!(collect(&list), &[1, 2]);
        assert_eq!(list.back().map(|n| n.val), Some(2));
    }

    #[derive(Debug, Clone)]
    enum Op {
        PushFront(i32),
        PushBack(i32),
        PopFront,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-50i32..50).prop_map(Op::PushFront),
            (-50i32..50).prop_map(Op::PushBack),
            Just(Op::PopFront),
        ]
    }

    proptest! {
        #[test]
        fn ops_match_vecdeque(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let _trace = trace_init();
            let mut arena = Vec::new();
            let mut list = List::default();
            let mut model = VecDeque::new();

            for op in ops {
                test_trace!(?op);
                match op {
                    Op::PushFront(v) => {
                        arena.push(Box::new(Node { val: v, link: Entry::new() }));
                        let p = ptr(arena.last().unwrap());
                        unsafe { list.push_front(p) };
                        model.push_front(v);
                    }
                    Op::PushBack(v) => {
                        arena.push(Box::new(Node { val: v, link: Entry::new() }));
                        let p = ptr(arena.last().unwrap());
                        unsafe { list.push_back(p) };
                        model.push_back(v);
                    }
                    Op::PopFront => {
                        let got = unsafe { list.pop_front() }
                            .map(|p| unsafe { p.as_ref().val });
                        prop_assert_eq!(got, model.pop_front());
                    }
                }
                list.assert_valid();
                prop_assert_eq!(list.len(), model.len());
            }
            prop_assert_eq!(collect(&list), Vec::from(model));
        }

        #[test]
        fn sort_matches_std(vals in proptest::collection::vec(-50i32..50, 0..64)) {
            let ns = nodes(&vals);
            let mut list = List::default();
            push_all(&mut list, &ns);

            list.sort(|a, b| a.val < b.val);
            list.assert_valid();

            let mut expect = vals.clone();
            expect.sort();
            prop_assert_eq!(collect(&list), expect);
        }
    }
}
