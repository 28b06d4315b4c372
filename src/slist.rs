//! An intrusive singly-linked list.
//!
//! The cheapest topology: one forward reference per element and one in
//! the anchor. Insertion and removal are O(1) only *after* a known
//! position, so the mutating methods come in `_after` forms, and a
//! [`before_begin`](SlistOps::before_begin) sentinel position stands in
//! for the missing O(1) predecessor of the first element.
//!
//! See the [crate-level documentation](crate) for an example.

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
/// singly-linked list.
#[repr(transparent)]
pub struct Entry<T> {
    inner: UnsafeCell<EntryInner<T>>,
}

struct EntryInner<T> {
    next: Link<T>,
    /// Linked elements may not move while they are on a list.
    _unpin: PhantomPinned,
}

/// The anchor of a singly-linked list: the sentinel link record plus the
/// inline size policy value.
///
/// A `FwdHead` is independent of the extraction strategy, so it can be
/// declared before the strategy type exists (for instance inside a type
/// that is itself an element of the list); a [`Proxy`] binds it to a
/// strategy later. [`Head`] owns its own `FwdHead`.
pub struct FwdHead<T, S = Uncounted> {
    head: Entry<T>,
    len: S,
}

/// A list that owns its anchor and extraction strategy.
pub struct Head<T, E, S = Uncounted> {
    fwd: FwdHead<T, S>,
    extract: E,
}

/// A list facade borrowing an anchor declared elsewhere.
pub struct Proxy<'a, T, E, S = Uncounted> {
    fwd: &'a mut FwdHead<T, S>,
    extract: E,
}

/// A position in a singly-linked list: a live element, the
/// [`before_begin`](SlistOps::before_begin) sentinel, or the end.
///
/// Positions are tokens for the mutation methods, not iterators; element
/// traversal is [`SlistOps::iter`]. A position stays valid until the
/// element it denotes is unlinked.
pub struct Pos<T> {
    link: Link<T>,
}

/// Iterates over a list's elements by reference.
pub struct Iter<'a, T, E> {
    curr: Link<T>,
    extract: &'a E,
    _list: PhantomData<&'a T>,
}

/// Operations on a singly-linked list.
///
/// Every operation is a provided method over the three anchor/strategy
/// accessors; [`Head`] and [`Proxy`] implement only those, sharing the
/// whole engine.
///
/// The list stores element pointers without owning the elements, so the
/// methods that link or unlink elements are `unsafe`: the caller keeps
/// every linked element alive and at a stable address, and passes only
/// positions belonging to this list. Operations that move elements
/// between two lists additionally require the two lists' extraction
/// strategies to be interchangeable (always true for zero-sized
/// strategies such as [`ByOffset`](crate::ByOffset)).
///
/// # Safety
///
/// Implementors must return the same anchor from `fwd_head` and
/// `fwd_head_mut` for as long as the value exists, and `extractor` must
/// resolve the entry of every element linked into that anchor.
pub unsafe trait SlistOps<T, E, S = Uncounted>
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
    ///
    /// It may be passed to the `_after` methods but does not denote an
    /// element.
    fn before_begin(&self) -> Pos<T> {
        Pos {
            link: Some(EntryRef::Entry(NonNull::from(&self.fwd_head().head))),
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
    /// position nor [`before_begin`](SlistOps::before_begin).
    unsafe fn value_at(&self, pos: Pos<T>) -> NonNull<T> {
        let Some(link) = pos.link else {
            debug_unreachable!("`value_at` called with the end position")
        };
        unsafe { E::value_of(link) }
    }

    /// `true` if the list has no elements.
    fn is_empty(&self) -> bool {
        self.fwd_head().head.next().is_none()
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
        self.fwd_head_mut().len.set(0);
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
        unsafe {
            let old = fwd::set_next(self.extractor(), pos_link, Some(item_link));
            fwd::set_next(self.extractor(), item_link, old);
        }
        self.fwd_head_mut().len.incr();
        Pos {
            link: Some(item_link),
        }
    }

    /// Links `item` at the front of the list.
    ///
    /// # Safety
    ///
    /// As for [`SlistOps::insert_after`].
    unsafe fn push_front(&mut self, item: NonNull<T>) {
        unsafe { self.insert_after(self.before_begin(), item) };
    }

    /// Links every element yielded by `items` after `pos`, in order,
    /// returning the position of the last one linked.
    ///
    /// # Safety
    ///
    /// As for [`SlistOps::insert_after`], for every element.
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
        unsafe {
            let after = fwd::set_next(self.extractor(), removed, None);
            fwd::set_next(self.extractor(), pos_link, after);
        }
        self.fwd_head_mut().len.decr();
        Some(unsafe { E::value_of(removed) })
    }

    /// Unlinks and returns the first element.
    ///
    /// # Safety
    ///
    /// As for [`SlistOps::erase_after`].
    unsafe fn pop_front(&mut self) -> Option<NonNull<T>> {
        unsafe { self.erase_after(self.before_begin()) }
    }

    /// Unlinks every element in the open range `(first, last)` by
    /// rewriting the single boundary link. The removed elements keep
    /// their internal links.
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
    /// # Safety
    ///
    /// `pos` must denote the sentinel or a live element of this list, and
    /// the two lists' extraction strategies must be interchangeable.
    unsafe fn splice_after<S2, O>(&mut self, pos: Pos<T>, other: &mut O)
    where
        S2: SizePolicy,
        O: SlistOps<T, E, S2>,
    {
        let Some(first) = other.fwd_head().head.next() else {
            return;
        };
        let Some(pos_link) = pos.link else {
            debug_unreachable!("`splice_after` called with the end position")
        };
        if S::TRACKED {
            let n = other.len();
            self.fwd_head_mut().len.add(n);
        }

        // The donor's last element picks up the receiver's suffix.
        let mut last = first;
        while let Some(next) = unsafe { fwd::next_of(self.extractor(), last) } {
            last = next;
        }
        unsafe {
            let suffix = fwd::set_next(self.extractor(), pos_link, Some(first));
            fwd::set_next(self.extractor(), last, suffix);
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
        O: SlistOps<T, E, S2>,
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

        // Detach the open range from the donor.
        let moved = unsafe { fwd::set_next(self.extractor(), first_link, last.link) };
        if moved == last.link {
            return;
        }
        let Some(moved_first) = moved else {
            debug_unreachable!("`last` not reachable from `first`")
        };

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

        unsafe {
            let suffix = fwd::set_next(self.extractor(), pos_link, Some(moved_first));
            fwd::set_next(self.extractor(), last_insert, suffix);
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
        O: SlistOps<T, E, S2>,
        F: FnMut(&T, &T) -> bool,
    {
        if ptr::addr_eq(self.fwd_head(), other.fwd_head()) {
            return;
        }
        if S::TRACKED {
            let n = other.len();
            self.fwd_head_mut().len.add(n);
        }

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
            // Everything left in the donor is ordered after our last
            // element; append it in one relink.
            unsafe { fwd::set_next(self.extractor(), p1, Some(rest)) };
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
        // Links reachable from the anchor always denote live records.
        unsafe { fwd::merge_sort(self.extractor(), p1, None, &mut less, n) };
    }

    /// Reverses the element order in one pass.
    fn reverse(&mut self) {
        let mut prev: Link<T> = None;
        let mut cur = self.fwd_head().head.next();
        while let Some(link) = cur {
            // Links reachable from the anchor always denote live records.
            cur = unsafe { fwd::set_next(self.extractor(), link, prev) };
            prev = Some(link);
        }
        self.fwd_head().head.set_next(prev);
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
        O: SlistOps<T, E, S2>,
    {
        let self_len = if S2::TRACKED { Some(self.len()) } else { None };
        let other_len = if S::TRACKED { Some(other.len()) } else { None };
        let mine = self.fwd_head().head.set_next(None);
        let theirs = other.fwd_head().head.set_next(mine);
        self.fwd_head().head.set_next(theirs);
        if let Some(n) = other_len {
            self.fwd_head_mut().len.set(n);
        }
        if let Some(n) = self_len {
            other.fwd_head_mut().len.set(n);
        }
    }

    /// Asserts the structural invariants: the chain terminates at the
    /// null link, and a tracked inline count agrees with traversal.
    #[track_caller]
    fn assert_valid(&self) {
        let mut n = 0;
        let mut cur = self.fwd_head().head.next();
        while let Some(link) = cur {
            n += 1;
            cur = unsafe { fwd::next_of(self.extractor(), link) };
        }
        assert_eq!(
            self.is_empty(),
            n == 0,
            "emptiness must agree with traversal"
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
        f.debug_struct("slist::Entry")
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
        f.debug_struct("slist::FwdHead")
            .field("head", &self.head)
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

unsafe impl<T, E, S> SlistOps<T, E, S> for Head<T, E, S>
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
        f.debug_struct("slist::Head")
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

unsafe impl<T, E, S> SlistOps<T, E, S> for Proxy<'_, T, E, S>
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
        f.debug_struct("slist::Proxy")
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
        f.debug_tuple("slist::Pos")
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
        f.debug_tuple("slist::Iter")
            .field(&FmtOption::new(&self.curr))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        util::{assert_send_sync, trace_init},
        ByExtractor, ByOffset, Counted,
    };
    use proptest::prelude::*;
    use std::{boxed::Box, vec::Vec};

    #[repr(C)]
    struct Node {
        link: Entry<Node>,
        val: i32,
        seq: usize,
    }

    impl PartialEq for Node {
        fn eq(&self, other: &Self) -> bool {
            self.val == other.val
        }
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
            .enumerate()
            .map(|(seq, &val)| {
                Box::new(Node {
                    link: Entry::new(),
                    val,
                    seq,
                })
            })
            .collect()
    }

    fn ptr(node: &Node) -> NonNull<Node> {
        NonNull::from(node)
    }

    fn push_all<E, S>(list: &mut impl SlistOps<Node, E, S>, nodes: &[Box<Node>])
    where
        E: Extract<Node, Entry<Node>>,
        S: SizePolicy,
    {
        // push_front reverses, so feed the slice back to front.
        for node in nodes.iter().rev() {
            unsafe { list.push_front(ptr(node)) };
        }
    }

    fn collect<E, S>(list: &impl SlistOps<Node, E, S>) -> Vec<i32>
    where
        E: Extract<Node, Entry<Node>>,
        S: SizePolicy,
    {
        list.iter().map(|n| n.val).collect()
    }

    fn collect_seq<E, S>(list: &impl SlistOps<Node, E, S>) -> Vec<(i32, usize)>
    where
        E: Extract<Node, Entry<Node>>,
        S: SizePolicy,
    {
        list.iter().map(|n| (n.val, n.seq)).collect()
    }

    #[test]
    fn push_and_pop_front() {
        let _trace = trace_init();
        let ns = nodes(&[1, 2, 3]);
        let mut list = List::default();

        assert!(list.is_empty());
        push_all(&mut list, &ns);
        list.assert_valid();

        assert_eq!(list.len(), 3);
        assert_eq!(list.front().map(|n| n.val), Some(1));
        assert_eq!(collect(&list), &[1, 2, 3]);

        assert_eq!(unsafe { list.pop_front() }, Some(ptr(&ns[0])));
        assert_eq!(unsafe { list.pop_front() }, Some(ptr(&ns[1])));
        list.assert_valid();
        assert_eq!(collect(&list), &[3]);
        assert_eq!(unsafe { list.pop_front() }, Some(ptr(&ns[2])));
        assert!(list.is_empty());
        assert_eq!(unsafe { list.pop_front() }, None);
    }

    #[test]
    fn mapped_extractor_basics() {
        let _trace = trace_init();
        let ns = nodes(&[4, 5, 6]);
        let mut list = mapped_list();

        push_all(&mut list, &ns);
        list.assert_valid();
        assert_eq!(list.len(), 3);
        assert_eq!(collect(&list), &[4, 5, 6]);

        list.reverse();
        assert_eq!(collect(&list), &[6, 5, 4]);
        list.assert_valid();
    }

    #[test]
    fn insert_and_erase_after() {
        let _trace = trace_init();
        let ns = nodes(&[1, 2, 4]);
        let extra = nodes(&[3]);
        let mut list = List::default();
        push_all(&mut list, &ns);

        let (pos, found) = list.find_predecessor_if(|n| n.val == 4);
        assert!(found);
        unsafe { list.insert_after(pos, ptr(&extra[0])) };
        list.assert_valid();
        assert_eq!(collect(&list), &[1, 2, 3, 4]);

        let erased = unsafe { list.erase_after(pos) };
        assert_eq!(erased, Some(ptr(&extra[0])));
        list.assert_valid();
        assert_eq!(collect(&list), &[1, 2, 4]);
    }

    #[test]
    fn erase_range_after_drops_interior() {
        let _trace = trace_init();
        let ns = nodes(&[1, 2, 3, 4, 5]);
        let mut list = List::default();
        push_all(&mut list, &ns);

        // Remove the open range between 1 and 5.
        let first = list.begin();
        let last = list.pos_of(ptr(&ns[4]));
        unsafe { list.erase_range_after(first, last) };
        list.assert_valid();
        assert_eq!(collect(&list), &[1, 5]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn find_predecessor_of_position() {
        let ns = nodes(&[1, 2, 3]);
        let mut list = List::default();
        push_all(&mut list, &ns);

        let pos = list.pos_of(ptr(&ns[1]));
        assert_eq!(list.find_predecessor(pos), list.begin());
        assert_eq!(list.find_predecessor(list.begin()), list.before_begin());

        let absent = nodes(&[9]);
        let absent_pos = list.pos_of(ptr(&absent[0]));
        assert!(list.find_predecessor(absent_pos).is_end());
    }

    #[test]
    fn scenario_sort_unique_reverse() {
        let _trace = trace_init();
        let ns = nodes(&[3, 1, 4, 1, 5]);
        let mut list = List::default();
        for node in ns.iter() {
            unsafe { list.push_front(ptr(node)) };
        }
        assert_eq!(collect(&list), &[5, 1, 4, 1, 3]);

        list.sort(|a, b| a.val < b.val);
        list.assert_valid();
        assert_eq!(collect(&list), &[1, 1, 3, 4, 5]);

        list.unique(|a, b| a.val == b.val);
        list.assert_valid();
        assert_eq!(collect(&list), &[1, 3, 4, 5]);
        assert_eq!(list.len(), 4);

        list.reverse();
        list.assert_valid();
        assert_eq!(collect(&list), &[5, 4, 3, 1]);
    }

    #[test]
    fn sort_is_stable_and_idempotent() {
        let ns = nodes(&[2, 1, 2, 1, 2]);
        let mut list = List::default();
        push_all(&mut list, &ns);

        list.sort(|a, b| a.val < b.val);
        assert_eq!(
            collect_seq(&list),
            &[(1, 1), (1, 3), (2, 0), (2, 2), (2, 4)]
        );

        list.sort(|a, b| a.val < b.val);
        assert_eq!(
            collect_seq(&list),
            &[(1, 1), (1, 3), (2, 0), (2, 2), (2, 4)]
        );
        list.assert_valid();
    }

    #[test]
    fn merge_is_stable_and_empties_donor() {
        let _trace = trace_init();
        let a = nodes(&[1, 3, 5, 7]);
        let b = nodes(&[2, 3, 6]);
        let mut recv = List::default();
        let mut donor = Loose::default();
        push_all(&mut recv, &a);
        push_all(&mut donor, &b);

        unsafe { recv.merge(&mut donor, |x, y| x.val < y.val) };
        recv.assert_valid();
        donor.assert_valid();

        assert_eq!(collect(&recv), &[1, 2, 3, 3, 5, 6, 7]);
        assert!(donor.is_empty());
        assert_eq!(recv.len(), 7);

        // The receiver's 3 (seq 1) precedes the donor's 3 (seq 1 of b).
        let seqs: Vec<(i32, usize)> = collect_seq(&recv);
        assert_eq!(seqs[2], (3, 1));
        assert_eq!(seqs[3], (3, 1));
        assert_eq!(
            recv.iter()
                .filter(|n| n.val == 3)
                .map(|n| ptr(n))
                .collect::<Vec<_>>(),
            &[ptr(&a[1]), ptr(&b[1])]
        );
    }

    #[test]
    fn merge_with_empty_is_noop() {
        let a = nodes(&[1, 2]);
        let mut recv = List::default();
        let mut donor = List::default();
        push_all(&mut recv, &a);

        unsafe { recv.merge(&mut donor, |x, y| x.val < y.val) };
        assert_eq!(collect(&recv), &[1, 2]);
        assert_eq!(recv.len(), 2);

        let mut empty = List::default();
        unsafe { empty.merge(&mut recv, |x, y| x.val < y.val) };
        assert_eq!(collect(&empty), &[1, 2]);
        assert!(recv.is_empty());
        empty.assert_valid();
    }

    #[test]
    fn splice_after_keeps_receiver_suffix() {
        let _trace = trace_init();
        let a = nodes(&[1, 2, 5, 6]);
        let b = nodes(&[3, 4]);
        let mut recv = List::default();
        let mut donor = List::default();
        push_all(&mut recv, &a);
        push_all(&mut donor, &b);

        let pos = list_pos(&recv, &a[1]);
        unsafe { recv.splice_after(pos, &mut donor) };
        recv.assert_valid();
        donor.assert_valid();

        assert_eq!(collect(&recv), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(recv.len(), 6);
        assert!(donor.is_empty());
    }

    #[test]
    fn splice_range_after_conserves_elements() {
        let _trace = trace_init();
        let a = nodes(&[1, 6]);
        let b = nodes(&[2, 3, 4, 5]);
        let mut recv = List::default();
        let mut donor = List::default();
        push_all(&mut recv, &a);
        push_all(&mut donor, &b);

        // Move the open range (2, 5), i.e. elements 3 and 4.
        let first = donor.begin();
        let last = donor.pos_of(ptr(&b[3]));
        unsafe { recv.splice_range_after(recv.begin(), &mut donor, first, last) };
        recv.assert_valid();
        donor.assert_valid();

        assert_eq!(collect(&recv), &[1, 3, 4, 6]);
        assert_eq!(collect(&donor), &[2, 5]);
        assert_eq!(recv.len() + donor.len(), 6);
    }

    #[test]
    fn remove_if_batches_runs() {
        let ns = nodes(&[1, 2, 2, 3, 2, 2, 2, 4]);
        let mut list = List::default();
        push_all(&mut list, &ns);

        let removed = list.remove_if(|n| n.val == 2);
        assert_eq!(removed, 5);
        list.assert_valid();
        assert_eq!(collect(&list), &[1, 3, 4]);
    }

    #[test]
    fn erase_free_functions() {
        let ns = nodes(&[1, 2, 1, 3, 1]);
        let mut list = List::default();
        push_all(&mut list, &ns);

        assert_eq!(crate::erase_if(&mut list, |n: &Node| n.val > 2), 1);
        assert_eq!(collect(&list), &[1, 2, 1, 1]);

        let needle = nodes(&[1]);
        assert_eq!(crate::erase(&mut list, &needle[0]), 3);
        assert_eq!(collect(&list), &[2]);
        list.assert_valid();
    }

    #[test]
    fn swap_across_size_policies() {
        let a = nodes(&[1, 2, 3]);
        let b = nodes(&[9]);
        let mut counted = List::default();
        let mut uncounted = Loose::default();
        push_all(&mut counted, &a);
        push_all(&mut uncounted, &b);

        unsafe { counted.swap(&mut uncounted) };
        counted.assert_valid();
        uncounted.assert_valid();
        assert_eq!(collect(&counted), &[9]);
        assert_eq!(counted.len(), 1);
        assert_eq!(collect(&uncounted), &[1, 2, 3]);
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

        // Rebinding the same anchor sees the same elements.
        let list = Proxy::new(&mut fwd, Offset::default());
        assert_eq!(collect(&list), &[1, 2]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn head_is_send_and_sync() {
        assert_send_sync::<Entry<usize>>();
        assert_send_sync::<Head<usize, ByOffset<0>, Counted>>();
    }

    fn list_pos<E, S>(list: &impl SlistOps<Node, E, S>, node: &Node) -> Pos<Node>
    where
        E: Extract<Node, Entry<Node>>,
        S: SizePolicy,
    {
        list.pos_of(ptr(node))
    }

    #[derive(Debug, Clone)]
    enum Op {
        PushFront(i32),
        PopFront,
        Remove(i32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-10i32..10).prop_map(Op::PushFront),
            Just(Op::PopFront),
            (-10i32..10).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn ops_match_vecdeque(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let _trace = trace_init();
            let mut arena = Vec::new();
            let mut list = List::default();
            let mut model = std::collections::VecDeque::new();

            for op in ops {
                test_trace!(?op);
                match op {
                    Op::PushFront(v) => {
                        arena.push(Box::new(Node { link: Entry::new(), val: v, seq: 0 }));
                        let p = ptr(arena.last().unwrap());
                        unsafe { list.push_front(p) };
                        model.push_front(v);
                    }
                    Op::PopFront => {
                        let got = unsafe { list.pop_front() }
                            .map(|p| unsafe { p.as_ref().val });
                        prop_assert_eq!(got, model.pop_front());
                    }
                    Op::Remove(v) => {
                        let removed = list.remove_if(|n| n.val == v);
                        let before = model.len();
                        model.retain(|&x| x != v);
                        prop_assert_eq!(removed, before - model.len());
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

        #[test]
        fn merge_matches_std(
            a in proptest::collection::vec(-50i32..50, 0..32),
            b in proptest::collection::vec(-50i32..50, 0..32),
        ) {
            let mut a = a;
            let mut b = b;
            a.sort();
            b.sort();

            let an = nodes(&a);
            let bn = nodes(&b);
            let mut recv = List::default();
            let mut donor = List::default();
            push_all(&mut recv, &an);
            push_all(&mut donor, &bn);

            unsafe { recv.merge(&mut donor, |x, y| x.val < y.val) };
            recv.assert_valid();
            prop_assert!(donor.is_empty());

            let mut expect = a.clone();
            expect.extend_from_slice(&b);
            expect.sort();
            prop_assert_eq!(collect(&recv), expect);
        }
    }
}
