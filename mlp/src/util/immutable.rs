use std::ops::Deref;

/// Read-only wrapper. Hands out shared access to a value that must not
/// change after construction (e.g. a fully parsed parameter set).
pub struct Immutable<T>(T);

impl<T> Immutable<T> {
    pub fn new(value: T) -> Self { Immutable(value) }
}

impl<T> Deref for Immutable<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target { &self.0 }
}
