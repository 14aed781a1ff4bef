//! This module contains the synchronization state of a [`LockedSlot`].
//!
//! [`SlotLock`] is a spin lock.\
//! [`LockGuard`] is proof that the lock is held and frees it on drop.
//!
//! [`ReadPins`] counts readers that copied the slot pointer under the lock
//! and are about to acquire a strong unit on it outside of the lock.\
//! Pins are split in two counters by parity of the slot version they were taken at.
//! A mutator that displaced the value of version `v` waits until the pins of parity `v`
//! drain before the displaced unit leaves the slot.
//! Readers that arrive after the mutation pin the other counter.
//! Once the version advanced by two more, new readers share the counter a slow mutator
//! is still draining. They can prolong its wait, but they never pinned the displaced value.
//!
//! [`LockedSlot`]: crate::slot::LockedSlot

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Cap for the exponential backoff mask. Pause bursts go 1, 2, 4, ... up to `BACKOFF_CAP + 1`.
const BACKOFF_CAP: u32 = 63;

/// Number of backoff rounds after which a waiting thread yields to the scheduler.
const YIELD_AFTER: u32 = 16;

/// Exponential backoff for spin loops.
pub(crate) struct Backoff {
    mask: u32,
    rounds: u32,
}

impl Backoff {
    #[inline(always)]
    pub const fn new() -> Self {
        Backoff { mask: 0, rounds: 0 }
    }

    /// Spins for a growing number of pause instructions,
    /// or yields the thread once spinning stops paying off.
    #[inline]
    pub fn spin(&mut self) {
        if self.rounds >= YIELD_AFTER {
            std::thread::yield_now();
        } else {
            for _ in 0..=self.mask {
                core::hint::spin_loop();
            }
            self.mask = ((self.mask << 1) | 1) & BACKOFF_CAP;
        }
        self.rounds = self.rounds.saturating_add(1);
    }

    /// Number of times [`Backoff::spin`] was called.
    #[inline(always)]
    pub fn rounds(&self) -> u32 {
        self.rounds
    }
}

/// Binary mutual-exclusion flag.
pub(crate) struct SlotLock {
    locked: AtomicBool,
}

impl SlotLock {
    #[inline(always)]
    pub const fn new() -> Self {
        SlotLock {
            locked: AtomicBool::new(false),
        }
    }

    /// Spins until the lock is acquired.
    #[inline]
    pub fn lock(&self) -> LockGuard<'_> {
        let mut backoff = Backoff::new();
        loop {
            // `Acquire` semantics syncs this operation with `Release` in `LockGuard::drop`.
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return LockGuard { lock: self };
            }

            // Wait on a plain load to keep the cache line shared while the holder works.
            while self.locked.load(Ordering::Relaxed) {
                backoff.spin();
            }
        }
    }

    #[cfg(test)]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// Encapsulates exclusive ownership of a [`SlotLock`].
/// Only one instance may exist for a lock at any time.
pub(crate) struct LockGuard<'a> {
    lock: &'a SlotLock,
}

impl Drop for LockGuard<'_> {
    #[inline(always)]
    fn drop(&mut self) {
        debug_assert!(self.lock.locked.load(Ordering::Relaxed));

        // `Release` semantics publishes every write made under the lock.
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Pair of read pin counters, indexed by version parity.
pub(crate) struct ReadPins {
    counts: [AtomicUsize; 2],
}

impl ReadPins {
    #[inline(always)]
    pub const fn new() -> Self {
        ReadPins {
            counts: [AtomicUsize::new(0), AtomicUsize::new(0)],
        }
    }

    /// Pins the value of `version`.
    ///
    /// The guard proves the slot lock is held, so the pin is ordered
    /// before any mutation of that version.
    #[inline]
    pub fn pin<'a>(&'a self, version: u64, _guard: &LockGuard<'_>) -> ReadPin<'a> {
        let count = &self.counts[parity(version)];

        // Ordered by the slot lock, `Relaxed` is enough here.
        count.fetch_add(1, Ordering::Relaxed);
        ReadPin { count }
    }

    /// Waits until every pin taken at a version with the parity of `version` is gone.
    ///
    /// Must be called with the lock released, after the version was incremented past `version`.
    /// Returns the number of backoff rounds spent waiting.
    #[inline]
    pub fn drain(&self, version: u64) -> u32 {
        let count = &self.counts[parity(version)];
        let mut backoff = Backoff::new();

        // `Acquire` syncs with `Release` in `ReadPin::drop`,
        // so each reader's unit acquisition happens before the displaced unit is given away.
        while count.load(Ordering::Acquire) != 0 {
            backoff.spin();
        }
        backoff.rounds()
    }

    #[cfg(test)]
    pub fn pinned(&self, version: u64) -> usize {
        self.counts[parity(version)].load(Ordering::Relaxed)
    }
}

#[inline(always)]
fn parity(version: u64) -> usize {
    (version & 1) as usize
}

/// Encapsulates a reader's pin on the slot value.
/// While it exists the pinned value is not released by the slot.
pub(crate) struct ReadPin<'a> {
    count: &'a AtomicUsize,
}

impl Drop for ReadPin<'_> {
    #[inline(always)]
    fn drop(&mut self) {
        debug_assert!(self.count.load(Ordering::Relaxed) > 0);

        // `Release` semantics is required
        // to sync with `Acquire` semantics within `ReadPins::drain`.
        self.count.fetch_sub(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_released_on_drop() {
        let lock = SlotLock::new();
        let guard = lock.lock();
        assert!(lock.is_locked());
        drop(guard);
        assert!(!lock.is_locked());
        let _again = lock.lock();
    }

    #[test]
    fn test_pins_split_by_parity() {
        let lock = SlotLock::new();
        let pins = ReadPins::new();

        let guard = lock.lock();
        let even = pins.pin(4, &guard);
        let odd = pins.pin(7, &guard);
        drop(guard);

        assert_eq!(pins.pinned(0), 1);
        assert_eq!(pins.pinned(1), 1);

        drop(even);
        assert_eq!(pins.drain(2), 0);
        assert_eq!(pins.pinned(1), 1);
        drop(odd);
        assert_eq!(pins.drain(3), 0);
    }

    #[test]
    fn test_drain_waits_for_pin() {
        let lock = SlotLock::new();
        let pins = ReadPins::new();

        std::thread::scope(|scope| {
            let guard = lock.lock();
            let pin = pins.pin(0, &guard);
            drop(guard);

            scope.spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                drop(pin);
            });

            assert!(pins.drain(0) > 0);
            assert_eq!(pins.pinned(0), 0);
        });
    }
}
