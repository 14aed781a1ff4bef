//! Locked atomic reference cell for reference-counted heaps.
//!
//! [`AtomicCell`] is a shared mutable slot holding a strong reference to a heap object.
//! It supports `get`, `set`, `compare_and_swap` and `compare_and_set` from any number of threads
//! without ever incrementing the count of an object that another thread is destroying.
//!
//! Only frozen or permanent objects may be published through the cell,
//! so a reader can use what it got without synchronizing on the object's fields.
//! The policy is checked by a [`SharabilityGuard`] before the cell is touched.
//!
//! The heap is abstracted by [`RefCounted`]. [`Managed`] is a ready-made implementation.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use atomicref::{AtomicCell, Managed, Strong};
//!
//! let first = Managed::frozen("first");
//! let cell = Arc::new(AtomicCell::new(Some(&first)).unwrap());
//!
//! let writer = {
//!     let cell = cell.clone();
//!     std::thread::spawn(move || {
//!         let second = Managed::frozen("second");
//!         cell.compare_and_set(Some(&first), Some(&second)).unwrap()
//!     })
//! };
//!
//! assert!(writer.join().unwrap());
//! assert_eq!(**cell.get().unwrap(), "second");
//! ```

mod cell;
mod error;
mod freezable;
mod guard;
mod lock;
mod managed;
mod slot;
mod strong;

pub use self::{
    cell::AtomicCell,
    error::InvalidMutabilityError,
    freezable::FreezableAtomicCell,
    guard::{check_shareable, ensure_shareable, FrozenOrPermanent, SharabilityGuard},
    managed::Managed,
    slot::LockedSlot,
    strong::{RefCounted, Strong},
};
