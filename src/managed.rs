use core::{
    fmt::{self, Debug},
    ops::Deref,
    ptr::NonNull,
    sync::atomic::{fence, AtomicU8, AtomicUsize, Ordering},
};

use crate::strong::{RefCounted, Strong};

const MUTABLE: u8 = 0;
const FROZEN: u8 = 1;
const PERMANENT: u8 = 2;

/// Boxed heap object with an atomic strong count and freeze bookkeeping.
///
/// Objects start mutable and can be frozen once, which is irreversible.
/// Permanent objects are leaked statics: they are never counted nor destroyed.
///
/// # Examples
///
/// ```
/// use atomicref::{AtomicCell, Managed};
///
/// let config = Managed::new(String::from("v1"));
/// config.freeze();
///
/// let cell = AtomicCell::new(Some(&config)).unwrap();
/// assert_eq!(**cell.get().unwrap(), "v1");
/// ```
pub struct Managed<V: ?Sized> {
    count: AtomicUsize,
    state: AtomicU8,
    value: V,
}

impl<V> Managed<V> {
    /// Allocates a mutable object and returns the only unit on it.
    pub fn new(value: V) -> Strong<Self> {
        let object = Box::new(Managed {
            count: AtomicUsize::new(1),
            state: AtomicU8::new(MUTABLE),
            value,
        });

        unsafe {
            // Fresh allocation with count 1 owned by the returned unit.
            Strong::from_raw(NonNull::from(Box::leak(object)))
        }
    }

    /// Allocates an object that is frozen from the start.
    pub fn frozen(value: V) -> Strong<Self> {
        let object = Managed::new(value);
        object.freeze();
        object
    }

    /// Allocates a permanent object that lives until the process exits.
    ///
    /// Use [`Strong::retain`] to get units on it.
    pub fn permanent(value: V) -> &'static Self
    where
        V: 'static,
    {
        Box::leak(Box::new(Managed {
            count: AtomicUsize::new(0),
            state: AtomicU8::new(PERMANENT),
            value,
        }))
    }
}

impl<V> Managed<V>
where
    V: ?Sized,
{
    /// Marks the object immutable. Freezing twice is a no-op.
    pub fn freeze(&self) {
        // Permanent state is left as is.
        let _ = self
            .state
            .compare_exchange(MUTABLE, FROZEN, Ordering::Release, Ordering::Relaxed);
    }

    /// Returns the number of outstanding strong units.
    ///
    /// Always `0` for permanent objects.
    pub fn strong_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Returns mutable access to the value
    /// if the object is still mutable and `this` is the only unit on it.
    pub fn get_mut(this: &mut Strong<Self>) -> Option<&mut V> {
        if this.state.load(Ordering::Acquire) != MUTABLE || this.strong_count() != 1 {
            return None;
        }

        Some(unsafe {
            // Unique unit on a mutable object, no other reference can exist.
            &mut (*Strong::as_ptr(this).as_ptr()).value
        })
    }
}

unsafe impl<V> RefCounted for Managed<V>
where
    V: ?Sized,
{
    #[inline]
    fn acquire(&self) {
        if self.is_permanent() {
            return;
        }

        // Caller already holds a unit, `Relaxed` is enough for the increment.
        let old = self.count.fetch_add(1, Ordering::Relaxed);
        debug_assert!(old > 0, "acquired a unit on a destroyed object");
    }

    #[inline]
    unsafe fn release(this: NonNull<Self>) {
        let object = this.as_ref();
        if object.is_permanent() {
            return;
        }

        if object.count.fetch_sub(1, Ordering::Release) == 1 {
            // Syncs with every `Release` decrement made by other owners.
            fence(Ordering::Acquire);
            drop(Box::from_raw(this.as_ptr()));
        }
    }

    #[inline]
    fn is_frozen(&self) -> bool {
        self.state.load(Ordering::Acquire) == FROZEN
    }

    #[inline]
    fn is_permanent(&self) -> bool {
        self.state.load(Ordering::Relaxed) == PERMANENT
    }
}

impl<V> Deref for Managed<V>
where
    V: ?Sized,
{
    type Target = V;

    #[inline(always)]
    fn deref(&self) -> &V {
        &self.value
    }
}

impl<V> Debug for Managed<V>
where
    V: Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.load(Ordering::Relaxed) {
            MUTABLE => "mutable",
            FROZEN => "frozen",
            _ => "permanent",
        };

        f.debug_struct("Managed")
            .field("state", &state)
            .field("value", &&self.value)
            .finish()
    }
}
