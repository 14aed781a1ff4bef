use core::fmt::{self, Debug};

use crate::{
    error::InvalidMutabilityError,
    guard::{FrozenOrPermanent, SharabilityGuard},
    slot::LockedSlot,
    strong::{raw, RefCounted, Strong},
};

/// A shared mutable location holding a strong reference to a heap object.
///
/// All operations are linearizable and safe to call from any number of threads.
/// Only values accepted by the guard `G` can be stored,
/// by default only frozen or permanent objects,
/// so that a reader can use the object it got without further synchronization.
///
/// The cell owns one strong unit on its current value
/// and releases it when the value is replaced or the cell is dropped.
/// Units are never released while the internal lock is held.
pub struct AtomicCell<T: RefCounted + ?Sized, G = FrozenOrPermanent> {
    slot: LockedSlot<T>,
    guard: G,
}

impl<T> AtomicCell<T>
where
    T: RefCounted + ?Sized,
{
    /// Creates a new [`AtomicCell`] holding a unit on `value`.
    ///
    /// Fails if `value` is neither frozen nor permanent.
    ///
    /// # Examples
    ///
    /// ```
    /// use atomicref::{AtomicCell, Managed};
    ///
    /// let value = Managed::frozen(5);
    /// let cell = AtomicCell::new(Some(&value)).unwrap();
    ///
    /// assert!(AtomicCell::new(Some(&Managed::new(6))).is_err());
    /// ```
    #[inline]
    pub fn new(value: Option<&Strong<T>>) -> Result<Self, InvalidMutabilityError> {
        AtomicCell::with_guard(value, FrozenOrPermanent)
    }

    /// Creates a new empty [`AtomicCell`].
    #[inline]
    pub fn empty() -> Self {
        AtomicCell {
            slot: LockedSlot::new(None),
            guard: FrozenOrPermanent,
        }
    }
}

impl<T, G> AtomicCell<T, G>
where
    T: RefCounted + ?Sized,
    G: SharabilityGuard<T>,
{
    /// Creates a new [`AtomicCell`] that admits values accepted by `guard`.
    #[inline]
    pub fn with_guard(value: Option<&Strong<T>>, guard: G) -> Result<Self, InvalidMutabilityError> {
        guard.enforce(value.map(|value| &**value))?;
        Ok(AtomicCell {
            slot: LockedSlot::new(value.cloned()),
            guard,
        })
    }

    /// Returns a new strong unit on the current value.
    ///
    /// The returned object stays alive for as long as the unit does,
    /// regardless of concurrent mutations of the cell.
    ///
    /// # Examples
    ///
    /// ```
    /// use atomicref::{AtomicCell, Managed, Strong};
    ///
    /// let value = Managed::frozen(5);
    /// let cell = AtomicCell::new(Some(&value)).unwrap();
    ///
    /// let got = cell.get().unwrap();
    /// assert!(Strong::ptr_eq(&got, &value));
    /// assert_eq!(value.strong_count(), 3);
    /// ```
    #[inline]
    pub fn get(&self) -> Option<Strong<T>> {
        self.slot.read()
    }

    /// Stores `new` in the cell, releasing the unit on the previous value.
    ///
    /// On error the cell is unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use atomicref::{AtomicCell, Managed};
    ///
    /// let cell = AtomicCell::empty();
    /// cell.set(Some(&Managed::frozen(1))).unwrap();
    /// assert_eq!(**cell.get().unwrap(), 1);
    ///
    /// assert!(cell.set(Some(&Managed::new(2))).is_err());
    /// assert_eq!(**cell.get().unwrap(), 1);
    /// ```
    #[inline]
    pub fn set(&self, new: Option<&Strong<T>>) -> Result<(), InvalidMutabilityError> {
        self.enforce(new)?;
        drop(self.slot.assign(new));
        Ok(())
    }

    /// Stores `new` in the cell, returning the unit it held on the previous value.
    #[inline]
    pub fn replace(
        &self,
        new: Option<&Strong<T>>,
    ) -> Result<Option<Strong<T>>, InvalidMutabilityError> {
        self.enforce(new)?;
        Ok(self.slot.assign(new))
    }

    /// Empties the cell, returning the unit it held on the previous value.
    #[inline]
    pub fn take(&self) -> Option<Strong<T>> {
        self.slot.assign(None)
    }

    /// Replaces the value with `new` if the current value is the same object as `expected`.
    ///
    /// Returns the previous value if it was replaced, or the current value if not.
    /// Either way the caller owns the returned unit.
    /// The guard runs first, so a rejected `new` fails even if the comparison would fail.
    ///
    /// # Examples
    ///
    /// ```
    /// use atomicref::{AtomicCell, Managed, Strong};
    ///
    /// let a = Managed::frozen('a');
    /// let b = Managed::frozen('b');
    /// let cell = AtomicCell::new(Some(&a)).unwrap();
    ///
    /// let old = cell.compare_and_swap(Some(&a), Some(&b)).unwrap().unwrap();
    /// assert!(Strong::ptr_eq(&old, &a));
    ///
    /// let current = cell.compare_and_swap(Some(&a), None).unwrap().unwrap();
    /// assert!(Strong::ptr_eq(&current, &b));
    /// ```
    #[inline]
    pub fn compare_and_swap(
        &self,
        expected: Option<&Strong<T>>,
        new: Option<&Strong<T>>,
    ) -> Result<Option<Strong<T>>, InvalidMutabilityError> {
        self.enforce(new)?;
        match self.slot.swap(raw(expected), new) {
            Ok(previous) | Err(previous) => Ok(previous),
        }
    }

    /// Replaces the value with `new` if the current value is the same object as `expected`.
    ///
    /// Returns true if the value was replaced.
    /// The unit on the displaced value is released by the cell.
    ///
    /// # Examples
    ///
    /// ```
    /// use atomicref::{AtomicCell, Managed};
    ///
    /// let cell = AtomicCell::empty();
    /// let one = Managed::frozen(1);
    ///
    /// assert!(cell.compare_and_set(None, Some(&one)).unwrap());
    /// assert!(!cell.compare_and_set(None, Some(&Managed::frozen(2))).unwrap());
    /// ```
    #[inline]
    pub fn compare_and_set(
        &self,
        expected: Option<&Strong<T>>,
        new: Option<&Strong<T>>,
    ) -> Result<bool, InvalidMutabilityError> {
        self.enforce(new)?;
        Ok(self.slot.swap_if(raw(expected), new).is_some())
    }

    #[inline]
    fn enforce(&self, value: Option<&Strong<T>>) -> Result<(), InvalidMutabilityError> {
        self.guard.enforce(value.map(|value| &**value))
    }
}

impl<T, G> AtomicCell<T, G>
where
    T: RefCounted + ?Sized,
{
    /// Returns the number of successful mutations of this cell.
    #[inline]
    pub fn version(&self) -> u64 {
        self.slot.version()
    }

    /// Returns the guard of this cell.
    #[inline(always)]
    pub fn guard(&self) -> &G {
        &self.guard
    }

    /// Consumes the [`AtomicCell`], returning the unit it held.
    ///
    /// # Examples
    ///
    /// ```
    /// use atomicref::{AtomicCell, Managed};
    ///
    /// let value = Managed::frozen(5);
    /// let cell = AtomicCell::new(Some(&value)).unwrap();
    /// let inner = cell.into_inner();
    /// assert_eq!(value.strong_count(), 2);
    /// ```
    #[inline]
    pub fn into_inner(self) -> Option<Strong<T>> {
        self.slot.into_inner()
    }

    pub(crate) fn from_parts(slot: LockedSlot<T>, guard: G) -> Self {
        AtomicCell { slot, guard }
    }
}

impl<T, G> Default for AtomicCell<T, G>
where
    T: RefCounted + ?Sized,
    G: Default,
{
    #[inline]
    fn default() -> Self {
        AtomicCell {
            slot: LockedSlot::new(None),
            guard: G::default(),
        }
    }
}

impl<T, G> Clone for AtomicCell<T, G>
where
    T: RefCounted + ?Sized,
    G: Clone,
{
    /// Creates a new cell holding the current value of this one.
    #[inline]
    fn clone(&self) -> Self {
        AtomicCell {
            slot: LockedSlot::new(self.slot.read()),
            guard: self.guard.clone(),
        }
    }
}

impl<T, G> Debug for AtomicCell<T, G>
where
    T: RefCounted + Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (value, version) = self.slot.snapshot();
        f.debug_struct("AtomicCell")
            .field("value", &value)
            .field("version", &version)
            .finish()
    }
}
