//! Sharability policy applied to every value published through an [`AtomicCell`].
//!
//! [`AtomicCell`]: crate::AtomicCell

use tracing::debug;

use crate::{
    error::InvalidMutabilityError,
    strong::{RefCounted, Strong},
};

/// Decides whether a value may be published to other threads.
///
/// Guards are pure predicates with no state of their own.
/// Empty references are always shareable.
pub trait SharabilityGuard<T: ?Sized> {
    /// Returns true if `value` can be seen by other threads without synchronization.
    fn is_shareable(&self, value: &T) -> bool;

    /// Returns true if `value` is empty or shareable.
    #[inline]
    fn check(&self, value: Option<&T>) -> bool {
        value.map_or(true, |value| self.is_shareable(value))
    }

    /// Fails with [`InvalidMutabilityError`] naming `value` if [`check`] fails.
    ///
    /// [`check`]: SharabilityGuard::check
    #[inline]
    fn enforce(&self, value: Option<&T>) -> Result<(), InvalidMutabilityError> {
        match value {
            Some(value) if !self.is_shareable(value) => {
                let error = InvalidMutabilityError::new(value);
                debug!(
                    type_name = error.type_name(),
                    address = error.address(),
                    "rejected publication of a mutable object"
                );
                Err(error)
            }
            _ => Ok(()),
        }
    }
}

/// Default policy: only frozen or permanent objects are shareable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FrozenOrPermanent;

impl<T> SharabilityGuard<T> for FrozenOrPermanent
where
    T: RefCounted + ?Sized,
{
    #[inline]
    fn is_shareable(&self, value: &T) -> bool {
        value.is_permanent() || value.is_frozen()
    }
}

/// Returns true if `value` is empty, frozen or permanent.
///
/// # Examples
///
/// ```
/// use atomicref::{check_shareable, Managed};
///
/// let value = Managed::new(1);
/// assert!(!check_shareable(Some(&value)));
/// value.freeze();
/// assert!(check_shareable(Some(&value)));
/// assert!(check_shareable::<Managed<i32>>(None));
/// ```
#[inline]
pub fn check_shareable<T>(value: Option<&Strong<T>>) -> bool
where
    T: RefCounted + ?Sized,
{
    FrozenOrPermanent.check(value.map(|value| &**value))
}

/// Fails with [`InvalidMutabilityError`] unless `value` is empty, frozen or permanent.
#[inline]
pub fn ensure_shareable<T>(value: Option<&Strong<T>>) -> Result<(), InvalidMutabilityError>
where
    T: RefCounted + ?Sized,
{
    FrozenOrPermanent.enforce(value.map(|value| &**value))
}
