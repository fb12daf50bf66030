//! Internal extension-boundary marker.
//!
//! Public traits that should not be implemented outside this crate (or only
//! by the runtime adapters we ship) take `: Sealed` as a supertrait. Callers
//! can still use the trait's methods; they simply cannot provide their own
//! `impl` for it, which keeps the door open for adding default methods later
//! without it being a breaking change.

pub trait Sealed {}

impl<T: ?Sized> Sealed for T {}
