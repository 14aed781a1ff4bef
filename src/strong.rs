use core::{
    borrow::Borrow,
    cmp::Ordering,
    fmt::{self, Debug, Display, Pointer},
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::Deref,
    ptr::NonNull,
};

/// Object that lives in a reference-counted heap.
///
/// This is the interface the cells consume from the embedding runtime:
/// strong count manipulation and the freeze bookkeeping.
/// Identity of objects is their address.
///
/// # Safety
///
/// Implementors must guarantee that an object stays alive
/// for as long as at least one strong unit on it is outstanding,
/// and that [`release`] of the last unit destroys it synchronously.
/// [`acquire`] must not block and must not call back into a cell.
/// Once [`is_frozen`] or [`is_permanent`] returned `true` for an object
/// it must keep returning `true`, and the object must not be mutated through
/// shared references afterwards without its own synchronization.
///
/// [`acquire`]: RefCounted::acquire
/// [`release`]: RefCounted::release
/// [`is_frozen`]: RefCounted::is_frozen
/// [`is_permanent`]: RefCounted::is_permanent
pub unsafe trait RefCounted {
    /// Adds one strong unit.
    fn acquire(&self);

    /// Removes one strong unit, destroying the object if it was the last one.
    ///
    /// # Safety
    ///
    /// `this` must point to a live object and the caller must own the unit it gives up.
    unsafe fn release(this: NonNull<Self>);

    /// Returns true if the object was frozen and can no longer be mutated.
    fn is_frozen(&self) -> bool;

    /// Returns true if the object is statically allocated and immutable.
    #[inline]
    fn is_permanent(&self) -> bool {
        false
    }
}

/// Owned strong unit on a [`RefCounted`] object.
///
/// Cloning acquires one more unit, dropping releases it.
/// `Option<Strong<T>>` is used wherever a reference may be empty.
///
/// Implements [`Debug`], [`Display`], [`PartialEq`], [`PartialOrd`] and [`Hash`]
/// by delegating to `T`.
/// Use [`Strong::ptr_eq`] for identity.
pub struct Strong<T: RefCounted + ?Sized> {
    ptr: NonNull<T>,
    marker: PhantomData<T>,
}

/// A strong unit may be released on any thread, so the pointee must be `Send` and `Sync`.
unsafe impl<T> Send for Strong<T> where T: RefCounted + Send + Sync + ?Sized {}

/// Shared access to a strong unit only gives `&T` and the ability to clone it.
unsafe impl<T> Sync for Strong<T> where T: RefCounted + Send + Sync + ?Sized {}

impl<T> Strong<T>
where
    T: RefCounted + ?Sized,
{
    /// Adopts a strong unit that the caller owns.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live object and the caller must transfer
    /// ownership of one strong unit on it to the returned value.
    #[inline]
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Strong {
            ptr,
            marker: PhantomData,
        }
    }

    /// Acquires a new unit on an object the caller can already see.
    #[inline]
    pub fn retain(value: &T) -> Self {
        value.acquire();
        Strong {
            ptr: NonNull::from(value),
            marker: PhantomData,
        }
    }

    /// Gives up ownership of the unit without releasing it.
    ///
    /// Use [`Strong::from_raw`] to take it back.
    #[inline]
    pub fn into_raw(this: Self) -> NonNull<T> {
        let ptr = this.ptr;
        core::mem::forget(this);
        ptr
    }

    /// Returns the address of the object without affecting its count.
    #[inline(always)]
    pub fn as_ptr(this: &Self) -> NonNull<T> {
        this.ptr
    }

    /// Returns true if both units refer to the same object.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        same_object(Some(this.ptr), Some(other.ptr))
    }
}

/// Address identity of two possibly empty references.
#[inline]
pub(crate) fn same_object<T: ?Sized>(a: Option<NonNull<T>>, b: Option<NonNull<T>>) -> bool {
    let thin = |p: Option<NonNull<T>>| p.map(|p| p.as_ptr() as *const ());
    thin(a) == thin(b)
}

/// Borrowed address of a possibly empty reference.
#[inline]
pub(crate) fn raw<T: RefCounted + ?Sized>(value: Option<&Strong<T>>) -> Option<NonNull<T>> {
    value.map(|value| value.ptr)
}

impl<T> Clone for Strong<T>
where
    T: RefCounted + ?Sized,
{
    #[inline]
    fn clone(&self) -> Self {
        Strong::retain(&**self)
    }
}

impl<T> Drop for Strong<T>
where
    T: RefCounted + ?Sized,
{
    #[inline]
    fn drop(&mut self) {
        unsafe {
            // This value owns exactly one unit.
            T::release(self.ptr)
        }
    }
}

impl<T> Deref for Strong<T>
where
    T: RefCounted + ?Sized,
{
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        unsafe {
            // Owned unit keeps the object alive.
            self.ptr.as_ref()
        }
    }
}

impl<T> Debug for Strong<T>
where
    T: RefCounted + Debug + ?Sized,
{
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Debug::fmt(&**self, f)
    }
}

impl<T> Display for Strong<T>
where
    T: RefCounted + Display + ?Sized,
{
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&**self, f)
    }
}

impl<T> Pointer for Strong<T>
where
    T: RefCounted + ?Sized,
{
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Pointer::fmt(&self.ptr, f)
    }
}

impl<T> PartialEq for Strong<T>
where
    T: RefCounted + PartialEq + ?Sized,
{
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        PartialEq::eq(&**self, &**other)
    }
}

impl<T> Eq for Strong<T> where T: RefCounted + Eq + ?Sized {}

impl<T> PartialOrd for Strong<T>
where
    T: RefCounted + PartialOrd + ?Sized,
{
    #[inline(always)]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        PartialOrd::partial_cmp(&**self, &**other)
    }
}

impl<T> Hash for Strong<T>
where
    T: RefCounted + Hash + ?Sized,
{
    #[inline(always)]
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        Hash::hash(&**self, state)
    }
}

impl<T> Borrow<T> for Strong<T>
where
    T: RefCounted + ?Sized,
{
    #[inline(always)]
    fn borrow(&self) -> &T {
        self
    }
}

impl<T> AsRef<T> for Strong<T>
where
    T: RefCounted + ?Sized,
{
    #[inline(always)]
    fn as_ref(&self) -> &T {
        self
    }
}
