use thiserror::Error;

/// Error returned when a mutable, thread-local object is about to be published
/// through a cell that is shared between threads.
///
/// The cell is left untouched and the caller keeps its reference.
/// Seeing this error is a programming error on the caller's side:
/// the value must be frozen (or be permanent) before it can be shared.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("cannot share `{type_name}` object at {address:#x}: it is neither frozen nor permanent")]
pub struct InvalidMutabilityError {
    type_name: &'static str,
    address: usize,
}

impl InvalidMutabilityError {
    pub(crate) fn new<T: ?Sized>(value: &T) -> Self {
        InvalidMutabilityError {
            type_name: core::any::type_name::<T>(),
            address: value as *const T as *const () as usize,
        }
    }

    /// Name of the offending object's type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Address of the offending object.
    ///
    /// Only meaningful for identity comparisons while the caller still owns the object.
    pub fn address(&self) -> usize {
        self.address
    }
}
