use core::{cell::UnsafeCell, ptr::NonNull};

use tracing::trace;

use crate::{
    lock::{LockGuard, ReadPins, SlotLock},
    strong::{same_object, RefCounted, Strong},
};

/// State guarded by the slot lock.
struct SlotState<T: ?Sized> {
    /// The slot owns one strong unit on this object.
    value: Option<NonNull<T>>,
    /// Incremented once per mutation of `value`.
    version: u64,
}

/// Memory location that holds one strong unit and hands out units on it
/// without ever touching an object that a concurrent mutation is destroying.
///
/// The lock is held only to copy or exchange the pointer and the version.
/// Units on the slot's own value are acquired outside of the lock under a read pin
/// and revalidated against the version afterwards.
/// Units given up by the slot leave it outside of the lock,
/// once pins on the displaced version are drained.
pub struct LockedSlot<T: RefCounted + ?Sized> {
    lock: SlotLock,
    pins: ReadPins,
    state: UnsafeCell<SlotState<T>>,
}

/// The slot hands out and releases units on any thread.
unsafe impl<T> Send for LockedSlot<T> where T: RefCounted + Send + Sync + ?Sized {}

/// All access to the state goes through the slot lock.
unsafe impl<T> Sync for LockedSlot<T> where T: RefCounted + Send + Sync + ?Sized {}

impl<T> LockedSlot<T>
where
    T: RefCounted + ?Sized,
{
    /// Creates a slot that takes over the unit of `value`.
    #[inline]
    pub fn new(value: Option<Strong<T>>) -> Self {
        LockedSlot {
            lock: SlotLock::new(),
            pins: ReadPins::new(),
            state: UnsafeCell::new(SlotState {
                value: value.map(Strong::into_raw),
                version: 0,
            }),
        }
    }

    /// Returns a fresh unit on the current value.
    pub fn read(&self) -> Option<Strong<T>> {
        let mut attempt = 0u32;
        loop {
            let (unit, version) = self.snapshot();
            let unit = unit?;

            let current = self.version();
            if current == version {
                return Some(unit);
            }

            attempt += 1;
            trace!(
                observed = version,
                current,
                attempt,
                "slot changed while acquiring, retrying read"
            );
            drop(unit);
        }
    }

    /// Returns a fresh unit on the value together with the version it was stored at.
    ///
    /// Both are copied under one lock, the unit is acquired after it is released.
    pub fn snapshot(&self) -> (Option<Strong<T>>, u64) {
        let guard = self.lock.lock();
        let (value, version) = {
            let state = unsafe {
                // Lock is held.
                &*self.state.get()
            };
            (state.value, state.version)
        };

        match value {
            Some(ptr) => (Some(self.acquire_pinned(guard, ptr, version)), version),
            None => (None, version),
        }
    }

    /// Replaces the value with `new` if the current one is `expected`.
    ///
    /// Returns `Ok` with the unit the slot held on the previous value,
    /// or `Err` with a fresh unit on the current value which is left in place.
    #[inline]
    pub fn swap(
        &self,
        expected: Option<NonNull<T>>,
        new: Option<&Strong<T>>,
    ) -> Result<Option<Strong<T>>, Option<Strong<T>>> {
        self.exchange(Some(expected), new, true)
    }

    /// Same as [`LockedSlot::swap`], but does not hand out a unit on mismatch.
    ///
    /// Returns `None` if the value was left in place.
    #[inline]
    pub fn swap_if(
        &self,
        expected: Option<NonNull<T>>,
        new: Option<&Strong<T>>,
    ) -> Option<Option<Strong<T>>> {
        self.exchange(Some(expected), new, false).ok()
    }

    /// Unconditionally stores `new`, returning the unit the slot held on the previous value.
    #[inline]
    pub fn assign(&self, new: Option<&Strong<T>>) -> Option<Strong<T>> {
        match self.exchange(None, new, false) {
            Ok(old) => old,
            Err(_) => unreachable!("unconditional exchange always replaces the value"),
        }
    }

    /// Returns the number of mutations made so far.
    #[inline]
    pub fn version(&self) -> u64 {
        let _guard = self.lock.lock();
        unsafe {
            // Lock is held.
            (*self.state.get()).version
        }
    }

    /// Consumes the slot, returning its unit.
    #[inline]
    pub fn into_inner(mut self) -> Option<Strong<T>> {
        // Dropped slot sees an empty value and releases nothing.
        let value = self.state.get_mut().value.take();
        value.map(|ptr| unsafe {
            // The slot owned this unit.
            Strong::from_raw(ptr)
        })
    }

    fn exchange(
        &self,
        expected: Option<Option<NonNull<T>>>,
        new: Option<&Strong<T>>,
        observe: bool,
    ) -> Result<Option<Strong<T>>, Option<Strong<T>>> {
        let guard = self.lock.lock();
        let state = unsafe {
            // Lock is held.
            &mut *self.state.get()
        };

        if let Some(expected) = expected {
            if !same_object(state.value, expected) {
                let current = match state.value {
                    Some(ptr) if observe => {
                        let version = state.version;
                        Some(self.acquire_pinned(guard, ptr, version))
                    }
                    _ => None,
                };
                return Err(current);
            }
        }

        // Caller's own unit keeps `new` alive, so it can be acquired right here.
        let new = new.map(|new| Strong::into_raw(Strong::retain(&**new)));
        let old = core::mem::replace(&mut state.value, new);
        let version = state.version;
        state.version = version + 1;
        drop(guard);

        Ok(self.retire(old, version))
    }

    /// Acquires a unit on the value copied under `guard` with the lock released.
    fn acquire_pinned(&self, guard: LockGuard<'_>, ptr: NonNull<T>, version: u64) -> Strong<T> {
        let pin = self.pins.pin(version, &guard);
        drop(guard);

        let unit = Strong::retain(unsafe {
            // Pinned value is not released by the slot until the pin is dropped.
            ptr.as_ref()
        });
        drop(pin);
        unit
    }

    /// Takes the slot's unit on a value displaced from `version`
    /// once no reader can still be acquiring it.
    fn retire(&self, old: Option<NonNull<T>>, version: u64) -> Option<Strong<T>> {
        let old = old?;
        let rounds = self.pins.drain(version);
        if rounds > 0 {
            trace!(version, rounds, "waited for readers of displaced value");
        }

        Some(unsafe {
            // Unit was owned by the slot and nobody else can reach it through the slot anymore.
            Strong::from_raw(old)
        })
    }
}

impl<T> Drop for LockedSlot<T>
where
    T: RefCounted + ?Sized,
{
    fn drop(&mut self) {
        if let Some(ptr) = self.state.get_mut().value.take() {
            unsafe {
                // No reader can exist while the slot is exclusively borrowed.
                T::release(ptr)
            }
        }
    }
}
