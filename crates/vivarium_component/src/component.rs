//! Core [`Component`] trait and the component type registry.
//!
//! Every piece of data stored in the kernel must implement [`Component`].
//! Components are opaque payloads: the kernel never inspects their fields,
//! it only partitions them by [`ComponentTypeId`] and hands out references.
//!
//! ## Type identity
//!
//! [`ComponentTypeId`] is derived from the component's **string name** using
//! the FNV-1a 64-bit hash algorithm. Derivation is the whole registry: the
//! same name always yields the same ID for the life of the process, distinct
//! names yield distinct IDs, and there is no unregister operation.

use std::any::Any;

use serde::{Deserialize, Serialize};

/// A unique identifier for a component type, derived from its string name
/// using the FNV-1a 64-bit hash algorithm.
///
/// The ID is deterministic: any call site that applies FNV-1a to the same
/// UTF-8 name bytes produces the same `ComponentTypeId`, so IDs are stable
/// across runs as well as within one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the [`ComponentTypeId`] from a component's string name using
    /// the FNV-1a 64-bit hash algorithm.
    ///
    /// This is the **canonical** way to derive a `ComponentTypeId`.
    ///
    /// # Algorithm (FNV-1a 64-bit)
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325          (offset basis)
    /// for each byte in name.as_bytes():
    ///     hash = hash XOR byte
    ///     hash = hash * 0x00000100000001b3  (prime)
    /// return hash
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Compute the [`ComponentTypeId`] for a Rust component type `C`.
    ///
    /// This calls `C::type_name()` and hashes it with FNV-1a, producing the
    /// same result as [`ComponentTypeId::from_name`] with the same string.
    #[must_use]
    pub fn of<C: Component>() -> Self {
        Self::from_name(C::type_name())
    }
}

/// The core component trait.
///
/// All data stored in the kernel must implement this trait. A component is
/// any `'static` value with a stable name; the kernel imposes no structural
/// requirements beyond that. The execution model is single-threaded, so no
/// `Send`/`Sync` bound is required.
///
/// # Examples
///
/// ```rust
/// use vivarium_component::Component;
///
/// #[derive(Debug, Clone)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "Health" }
/// }
/// ```
pub trait Component: Any {
    /// A human-readable name for this component type.
    ///
    /// Two distinct component types must not share a name: the name is the
    /// sole input to [`ComponentTypeId`] derivation.
    fn type_name() -> &'static str;

    /// Returns the [`ComponentTypeId`] for this component type.
    fn component_type_id() -> ComponentTypeId
    where
        Self: Sized,
    {
        ComponentTypeId::from_name(Self::type_name())
    }
}
