//! Filter schemas — declarative component-kind requirements.
//!
//! A [`FilterSchema`] declares which component kinds an entity filter matches
//! and which of them are optional. Filters evaluate the schema generically at
//! refresh time; there is no compile-time type-list expansion. Slot order is
//! significant: result groups carry one slot per declared kind, in declared
//! order.

use thiserror::Error;

use crate::component::{Component, ComponentTypeId};

/// Whether a declared slot gates membership or merely reports presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// The entity must possess this component kind to appear in the result.
    Required,
    /// Presence is reported per entity but does not affect membership.
    Optional,
}

/// One declared slot of a filter schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSpec {
    /// The component kind this slot refers to.
    pub type_id: ComponentTypeId,
    /// Required or optional.
    pub kind: SlotKind,
    /// The component's name, kept for diagnostics.
    pub name: &'static str,
}

/// Errors produced by schema validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// The same component kind was declared in more than one slot.
    #[error("component kind '{name}' declared more than once in filter schema")]
    DuplicateSlot {
        /// Name of the offending component kind.
        name: &'static str,
    },
}

/// An ordered, fixed list of required and optional component kinds.
///
/// Built with a consuming builder:
///
/// ```rust
/// use vivarium_component::{Component, FilterSchema};
///
/// struct Position;
/// impl Component for Position {
///     fn type_name() -> &'static str { "Position" }
/// }
/// struct Velocity;
/// impl Component for Velocity {
///     fn type_name() -> &'static str { "Velocity" }
/// }
///
/// let schema = FilterSchema::new()
///     .require::<Position>()
///     .optional::<Velocity>();
/// assert_eq!(schema.len(), 2);
/// ```
///
/// A schema with no required slots matches every entity known to storage;
/// an empty schema matches the same set with zero-arity groups.
#[derive(Debug, Clone, Default)]
pub struct FilterSchema {
    slots: Vec<SlotSpec>,
}

impl FilterSchema {
    /// Create a new empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Declare a required component kind as the next slot.
    #[must_use]
    pub fn require<C: Component>(mut self) -> Self {
        self.slots.push(SlotSpec {
            type_id: ComponentTypeId::of::<C>(),
            kind: SlotKind::Required,
            name: C::type_name(),
        });
        self
    }

    /// Declare an optional component kind as the next slot.
    #[must_use]
    pub fn optional<C: Component>(mut self) -> Self {
        self.slots.push(SlotSpec {
            type_id: ComponentTypeId::of::<C>(),
            kind: SlotKind::Optional,
            name: C::type_name(),
        });
        self
    }

    /// Returns the declared slots in declaration order.
    #[must_use]
    pub fn slots(&self) -> &[SlotSpec] {
        &self.slots
    }

    /// Returns the number of declared slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no slots are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns `true` if at least one slot is required.
    #[must_use]
    pub fn has_required(&self) -> bool {
        self.slots.iter().any(|s| s.kind == SlotKind::Required)
    }

    /// Iterates over the type IDs of all required slots.
    pub fn required_ids(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.slots
            .iter()
            .filter(|s| s.kind == SlotKind::Required)
            .map(|s| s.type_id)
    }

    /// Returns the slot index declared for the given component kind.
    #[must_use]
    pub fn slot_index(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.slots.iter().position(|s| s.type_id == type_id)
    }

    /// Checks that no component kind is declared twice.
    ///
    /// Duplicate kinds would make slot lookup by type ambiguous, so filters
    /// reject such schemas at construction.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (i, slot) in self.slots.iter().enumerate() {
            if self.slots[..i].iter().any(|s| s.type_id == slot.type_id) {
                return Err(SchemaError::DuplicateSlot { name: slot.name });
            }
        }
        Ok(())
    }
}
