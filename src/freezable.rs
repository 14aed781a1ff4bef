use core::fmt::{self, Debug};

use crate::{
    cell::AtomicCell,
    error::InvalidMutabilityError,
    guard::{FrozenOrPermanent, SharabilityGuard},
    slot::LockedSlot,
    strong::{raw, RefCounted, Strong},
};

/// Reference cell owned by one thread that can later be frozen into an [`AtomicCell`].
///
/// While unfrozen it is mutated through `&mut self` and accepts any value, mutable ones included.
/// [`FreezableAtomicCell::freeze`] turns it into a shared [`AtomicCell`]
/// once the held value satisfies the guard.
///
/// # Examples
///
/// ```
/// use atomicref::{FreezableAtomicCell, Managed};
///
/// let head = Managed::new(vec![1, 2, 3]);
/// let cell = FreezableAtomicCell::new(Some(&head));
///
/// let cell = cell.freeze().unwrap_err().0;
/// head.freeze();
/// let shared = cell.freeze().unwrap();
/// assert_eq!(**shared.get().unwrap(), [1, 2, 3]);
/// ```
pub struct FreezableAtomicCell<T: RefCounted + ?Sized, G = FrozenOrPermanent> {
    slot: LockedSlot<T>,
    guard: G,
}

impl<T> FreezableAtomicCell<T>
where
    T: RefCounted + ?Sized,
{
    /// Creates a new unfrozen cell holding a unit on `value`.
    #[inline]
    pub fn new(value: Option<&Strong<T>>) -> Self {
        FreezableAtomicCell::with_guard(value, FrozenOrPermanent)
    }
}

impl<T, G> FreezableAtomicCell<T, G>
where
    T: RefCounted + ?Sized,
    G: SharabilityGuard<T>,
{
    /// Creates a new unfrozen cell that will admit values accepted by `guard` once frozen.
    #[inline]
    pub fn with_guard(value: Option<&Strong<T>>, guard: G) -> Self {
        FreezableAtomicCell {
            slot: LockedSlot::new(value.cloned()),
            guard,
        }
    }

    /// Returns a new strong unit on the current value.
    #[inline]
    pub fn get(&self) -> Option<Strong<T>> {
        self.slot.read()
    }

    /// Stores `new`, releasing the unit on the previous value.
    #[inline]
    pub fn set(&mut self, new: Option<&Strong<T>>) {
        drop(self.slot.assign(new));
    }

    /// Replaces the value with `new` if the current value is the same object as `expected`.
    ///
    /// Returns the previous value if it was replaced, or the current value if not.
    #[inline]
    pub fn compare_and_swap(
        &mut self,
        expected: Option<&Strong<T>>,
        new: Option<&Strong<T>>,
    ) -> Option<Strong<T>> {
        match self.slot.swap(raw(expected), new) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// Replaces the value with `new` if the current value is the same object as `expected`.
    ///
    /// Returns true if the value was replaced.
    #[inline]
    pub fn compare_and_set(
        &mut self,
        expected: Option<&Strong<T>>,
        new: Option<&Strong<T>>,
    ) -> bool {
        self.slot.swap_if(raw(expected), new).is_some()
    }

    /// Converts this cell into a shared [`AtomicCell`].
    ///
    /// Fails if the held value is not accepted by the guard,
    /// giving the cell back unchanged together with the error.
    pub fn freeze(self) -> Result<AtomicCell<T, G>, (Self, InvalidMutabilityError)> {
        let current = self.slot.read();
        match self.guard.enforce(current.as_deref()) {
            Ok(()) => Ok(AtomicCell::from_parts(self.slot, self.guard)),
            Err(error) => {
                drop(current);
                Err((self, error))
            }
        }
    }
}

impl<T, G> Default for FreezableAtomicCell<T, G>
where
    T: RefCounted + ?Sized,
    G: Default,
{
    #[inline]
    fn default() -> Self {
        FreezableAtomicCell {
            slot: LockedSlot::new(None),
            guard: G::default(),
        }
    }
}

impl<T, G> Debug for FreezableAtomicCell<T, G>
where
    T: RefCounted + Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreezableAtomicCell")
            .field("value", &self.slot.read())
            .finish()
    }
}
