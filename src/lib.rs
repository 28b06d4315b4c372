//! Intrusive linked-list engines.
//!
//! The lists in this crate are _intrusive_: the link records that thread
//! elements together live inside (or are reachable from) the elements
//! themselves, so a list never allocates and never owns its elements.
//! Three topologies are provided, each in its own module:
//!
//! - [`slist`]: singly-linked, the minimal one-word-per-element list;
//! - [`stailq`]: singly-linked with a cached tail reference, giving O(1)
//!   insertion at the back;
//! - [`tailq`]: doubly-linked with head and tail references, giving O(1)
//!   insertion and removal at both ends and at any known element.
//!
//! All three share one entry-reference codec ([`EntryRef`] plus the
//! [`Extract`] strategy trait) and one family of in-place link-surgery
//! algorithms: closed-range splicing, stable merge and merge sort,
//! reverse, `unique`, and `remove_if`, all O(1) in auxiliary space.
//!
//! # Linking elements
//!
//! An element type embeds the topology's `Entry` record and an extraction
//! strategy tells the list where to find it. The common case is a fixed
//! field offset, selected with [`ByOffset`] and [`core::mem::offset_of!`]:
//!
//! ```
//! use core::{mem, ptr::NonNull};
//! use entwine::{slist, ByOffset, SlistOps};
//!
//! #[repr(C)]
//! struct Request {
//!     link: slist::Entry<Request>,
//!     serial: u64,
//! }
//!
//! type RequestList =
//!     slist::Head<Request, ByOffset<{ mem::offset_of!(Request, link) }>>;
//!
//! let mut req = Request { link: slist::Entry::new(), serial: 7 };
//! let mut list = RequestList::default();
//! unsafe { list.push_front(NonNull::from(&mut req)) };
//! assert_eq!(list.iter().next().map(|r| r.serial), Some(7));
//! let popped = unsafe { list.pop_front() };
//! assert_eq!(popped, Some(NonNull::from(&mut req)));
//! ```
//!
//! When the link record is not at a fixed offset (for example, reached
//! through another field), [`ByExtractor`] wraps an arbitrary mapping
//! function instead.
//!
//! # Ownership and safety
//!
//! A list only stores pointers; the caller keeps ownership of every
//! element and must keep each element alive and pinned at its address for
//! as long as it is linked. The mutating operations that take raw element
//! pointers are `unsafe fn`s whose contracts spell this out. Dropping a
//! list never touches the elements.
//!
//! The structures are not thread-safe: a list and its elements must be
//! mutated from one thread at a time.

#![cfg_attr(docsrs, deny(missing_docs))]
#![cfg_attr(not(any(feature = "std", test)), no_std)]

#[cfg(test)]
extern crate std;

#[macro_use]
pub(crate) mod util;

pub(crate) mod fwd;
pub mod size;
pub mod slist;
pub mod stailq;
pub mod tailq;

#[doc(inline)]
pub use self::size::{Counted, SizePolicy, Uncounted};
#[doc(inline)]
pub use self::slist::SlistOps;
#[doc(inline)]
pub use self::stailq::StailqOps;
#[doc(inline)]
pub use self::tailq::TailqOps;

use core::{fmt, ptr::NonNull};

/// A reference to a link record of type `L`, threaded through elements of
/// type `T`.
///
/// A link field in an intrusive list must be able to denote two different
/// things: a live element (whose link record is found by applying the
/// extraction strategy) and a bare link record with no element behind it
/// (the anchor's sentinel). `EntryRef` is that one-bit discrimination.
///
/// Which variant an element reference uses depends on the strategy:
/// [`ByOffset`] resolves elements to their records eagerly, so every
/// reference it creates is [`EntryRef::Entry`] and decoding never looks at
/// the tag; [`ByExtractor`] must defer the mapping function to resolve
/// time, so its element references are [`EntryRef::Item`].
pub enum EntryRef<T, L> {
    /// A live element; resolve through [`Extract::entry_of`].
    Item(NonNull<T>),
    /// A link record address, used directly.
    Entry(NonNull<L>),
}

/// An extraction strategy: the mapping from an element to the link record
/// that threads it into a list.
///
/// # Safety
///
/// Implementations must be injective and stable: for a given live element
/// `p`, [`entry_of`] must resolve every reference produced by
/// [`item_ref`]`(p)` to the same link record each time, and
/// [`value_of`]`(item_ref(p))` must return `p`. A strategy that maps two
/// elements to one record, or moves a record between calls, corrupts any
/// list built with it.
///
/// [`entry_of`]: Extract::entry_of
/// [`item_ref`]: Extract::item_ref
/// [`value_of`]: Extract::value_of
pub unsafe trait Extract<T, L> {
    /// Encode a reference to a live element.
    fn item_ref(item: NonNull<T>) -> EntryRef<T, L>;

    /// Resolve a reference to the link record it denotes.
    ///
    /// This is the only codec operation that may consult strategy state,
    /// which is why it takes `&self` while the others do not.
    fn entry_of(&self, link: EntryRef<T, L>) -> NonNull<L>;

    /// Recover the element a reference was created from.
    ///
    /// # Safety
    ///
    /// `link` must have been produced by [`Extract::item_ref`] for a live
    /// element. Passing a sentinel reference is a precondition violation:
    /// it panics in debug builds and is undefined behavior in release
    /// builds.
    unsafe fn value_of(link: EntryRef<T, L>) -> NonNull<T>;
}

/// Extraction by fixed byte offset: the link record is embedded in the
/// element `OFFSET` bytes from its start.
///
/// Construct the offset with [`core::mem::offset_of!`]; see the
/// [crate-level example](crate). This strategy is a ZST and resolving a
/// reference is pure pointer arithmetic in both directions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ByOffset<const OFFSET: usize>;

/// Extraction through an arbitrary mapping function.
///
/// The wrapped function is applied when a reference is resolved, so an
/// element reference must remember the element address rather than the
/// record address; this is the strategy that actually uses both
/// [`EntryRef`] variants. A captureless `F` makes the whole strategy
/// zero-sized.
#[derive(Copy, Clone, Debug, Default)]
pub struct ByExtractor<F>(pub F);

/// Bulk removal by predicate, implemented by every list facade in this
/// crate. Usually called through the free functions [`erase`] and
/// [`erase_if`].
pub trait EraseIf<T> {
    /// Unlink every element for which `pred` holds, returning how many
    /// were removed.
    fn erase_if(&mut self, pred: impl FnMut(&T) -> bool) -> usize;
}

/// Unlink every element of `list` for which `pred` holds, regardless of
/// the list's topology. Returns the number of elements removed.
pub fn erase_if<T, L: EraseIf<T>>(list: &mut L, pred: impl FnMut(&T) -> bool) -> usize {
    list.erase_if(pred)
}

/// Unlink every element of `list` equal to `value`, regardless of the
/// list's topology. Returns the number of elements removed.
pub fn erase<T: PartialEq, L: EraseIf<T>>(list: &mut L, value: &T) -> usize {
    list.erase_if(|item| *item == *value)
}

// === impl EntryRef ===

impl<T, L> Clone for EntryRef<T, L> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, L> Copy for EntryRef<T, L> {}

impl<T, L> PartialEq for EntryRef<T, L> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Item(a), Self::Item(b)) => a == b,
            (Self::Entry(a), Self::Entry(b)) => a == b,
            _ => false,
        }
    }
}

impl<T, L> Eq for EntryRef<T, L> {}

impl<T, L> fmt::Debug for EntryRef<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item(p) => f.debug_tuple("Item").field(p).finish(),
            Self::Entry(p) => f.debug_tuple("Entry").field(p).finish(),
        }
    }
}

// === impl ByOffset ===

impl<const OFFSET: usize> ByOffset<OFFSET> {
    #[inline]
    fn entry_at<T, L>(item: NonNull<T>) -> NonNull<L> {
        let p = item.as_ptr().cast::<u8>();
        // The element is live, so the record `OFFSET` bytes in is in
        // bounds and non-null.
        unsafe { NonNull::new_unchecked(p.add(OFFSET).cast::<L>()) }
    }
}

unsafe impl<T, L, const OFFSET: usize> Extract<T, L> for ByOffset<OFFSET> {
    #[inline]
    fn item_ref(item: NonNull<T>) -> EntryRef<T, L> {
        EntryRef::Entry(Self::entry_at(item))
    }

    #[inline]
    fn entry_of(&self, link: EntryRef<T, L>) -> NonNull<L> {
        match link {
            EntryRef::Entry(entry) => entry,
            // Never created by this strategy, but the arithmetic is the
            // same either way.
            EntryRef::Item(item) => Self::entry_at(item),
        }
    }

    #[inline]
    unsafe fn value_of(link: EntryRef<T, L>) -> NonNull<T> {
        let entry = match link {
            EntryRef::Entry(entry) => entry,
            EntryRef::Item(item) => return item,
        };
        let p = entry.as_ptr().cast::<u8>();
        unsafe { NonNull::new_unchecked(p.sub(OFFSET).cast::<T>()) }
    }
}

// === impl ByExtractor ===

unsafe impl<T, L, F> Extract<T, L> for ByExtractor<F>
where
    F: Fn(NonNull<T>) -> NonNull<L>,
{
    #[inline]
    fn item_ref(item: NonNull<T>) -> EntryRef<T, L> {
        EntryRef::Item(item)
    }

    #[inline]
    fn entry_of(&self, link: EntryRef<T, L>) -> NonNull<L> {
        match link {
            EntryRef::Item(item) => (self.0)(item),
            EntryRef::Entry(entry) => entry,
        }
    }

    #[inline]
    unsafe fn value_of(link: EntryRef<T, L>) -> NonNull<T> {
        match link {
            EntryRef::Item(item) => item,
            EntryRef::Entry(_) => {
                debug_unreachable!("sentinel reference passed where an element was required")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem;

    #[repr(C)]
    struct Node {
        pad: u64,
        link: slist::Entry<Node>,
        val: i32,
    }

    type Offset = ByOffset<{ mem::offset_of!(Node, link) }>;

    fn links_of(p: NonNull<Node>) -> NonNull<slist::Entry<Node>> {
        unsafe { NonNull::from(&p.as_ref().link) }
    }

    fn node(val: i32) -> Node {
        Node {
            pad: 0,
            link: slist::Entry::new(),
            val,
        }
    }

    #[test]
    fn offset_roundtrip() {
        let n = node(17);
        let p = NonNull::from(&n);

        let strategy = Offset::default();
        let r = <Offset as Extract<Node, slist::Entry<Node>>>::item_ref(p);
        assert!(matches!(r, EntryRef::Entry(_)));
        assert_eq!(strategy.entry_of(r), NonNull::from(&n.link));
        assert_eq!(unsafe { Offset::value_of(r) }, p);
        assert_eq!(unsafe { Offset::value_of(r).as_ref() }.val, 17);
    }

    type Mapped = ByExtractor<fn(NonNull<Node>) -> NonNull<slist::Entry<Node>>>;

    #[test]
    fn extractor_roundtrip() {
        let n = node(3);
        let p = NonNull::from(&n);
        let strategy: Mapped = ByExtractor(links_of);

        let r = Mapped::item_ref(p);
        assert!(matches!(r, EntryRef::Item(_)));
        assert_eq!(strategy.entry_of(r), NonNull::from(&n.link));
        assert_eq!(unsafe { Mapped::value_of(r) }, p);
    }

    #[test]
    fn extractor_resolves_sentinel_directly() {
        let entry = slist::Entry::<Node>::new();
        let strategy = ByExtractor(links_of);
        let r = EntryRef::<Node, _>::Entry(NonNull::from(&entry));
        assert_eq!(strategy.entry_of(r), NonNull::from(&entry));
    }

    #[test]
    fn entry_ref_equality_is_tag_and_address() {
        let a = node(1);
        let pa = NonNull::from(&a);
        let item = EntryRef::<Node, slist::Entry<Node>>::Item(pa);
        let entry = EntryRef::<Node, slist::Entry<Node>>::Entry(NonNull::from(&a.link));

        assert_eq!(item, EntryRef::Item(pa));
        assert_eq!(entry, EntryRef::Entry(NonNull::from(&a.link)));
        assert_ne!(item, entry);
    }

    #[test]
    fn strategies_are_zero_sized() {
        assert_eq!(mem::size_of::<Offset>(), 0);
        assert_eq!(mem::size_of::<ByExtractor<fn(NonNull<Node>) -> NonNull<slist::Entry<Node>>>>(),
            mem::size_of::<usize>());

        fn captureless(p: NonNull<Node>) -> NonNull<slist::Entry<Node>> {
            links_of(p)
        }
        let by_closure = ByExtractor(move |p| captureless(p));
        assert_eq!(mem::size_of_val(&by_closure), 0);
    }
}
