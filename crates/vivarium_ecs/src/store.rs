//! Component storage — the authoritative store for one simulation run.
//!
//! The [`EntityStore`] owns every component instance, partitioned by
//! [`ComponentTypeId`], each partition mapping entity to the single instance
//! of that kind. Mutations take effect on the store immediately; filters only
//! observe them at the next update cycle (see [`crate::Engine`]).
//!
//! Instances are held behind [`ComponentRef`] shared handles so that filter
//! result sets can capture a consistent snapshot of a synchronization point:
//! replacing or removing a component releases the store's handle, while any
//! result set captured earlier keeps the old instance alive until it is
//! rebuilt.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};

use vivarium_component::{Component, ComponentTypeId, Entity, EntityAllocator};

/// A shared, non-owning view of one component instance.
///
/// Cloning is cheap (reference count bump). Typed access goes through
/// [`ComponentRef::downcast_ref`]; asking for the wrong type yields `None`,
/// never undefined behaviour.
#[derive(Clone)]
pub struct ComponentRef(Rc<dyn Any>);

impl ComponentRef {
    fn new<C: Component>(component: C) -> Self {
        Self(Rc::new(component))
    }

    /// Returns a typed reference to the instance, if it is of type `C`.
    #[must_use]
    pub fn downcast_ref<C: Component>(&self) -> Option<&C> {
        self.0.downcast_ref::<C>()
    }

    /// Returns `true` if the instance is of type `C`.
    #[must_use]
    pub fn is<C: Component>(&self) -> bool {
        self.0.is::<C>()
    }
}

impl std::fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ComponentRef").finish()
    }
}

/// The authoritative component store for a run.
///
/// One partition per component kind, one instance per (kind, entity) pair.
/// All operations are total: asking about an unknown entity or kind yields an
/// empty answer, never an error. An entity is *known* to the store while it
/// has at least one component; identities with zero components are invisible
/// here.
#[derive(Debug, Default)]
pub struct EntityStore {
    /// Per-kind partitions: entity → owned instance of that kind.
    partitions: HashMap<ComponentTypeId, HashMap<Entity, ComponentRef>>,
    /// How many kinds are currently present per entity. An entry exists iff
    /// the entity is known.
    known: HashMap<Entity, usize>,
    /// Identity generator for this run. Survives [`EntityStore::clear`].
    allocator: EntityAllocator,
}

impl EntityStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            partitions: HashMap::new(),
            known: HashMap::new(),
            allocator: EntityAllocator::new(),
        }
    }

    /// Generate a fresh entity ID, distinct from every ID this store has
    /// handed out — including IDs from before a [`clear`](Self::clear).
    pub fn generate_id(&mut self) -> Entity {
        self.allocator.allocate()
    }

    /// Associate `component` with `entity`, replacing any prior instance of
    /// the same kind.
    ///
    /// Unseen entities are registered automatically. The replaced instance,
    /// if any, is released; result sets captured before this call keep it
    /// alive until their next refresh.
    pub fn add_component<C: Component>(&mut self, entity: Entity, component: C) {
        let type_id = ComponentTypeId::of::<C>();
        let replaced = self
            .partitions
            .entry(type_id)
            .or_default()
            .insert(entity, ComponentRef::new(component))
            .is_some();
        if !replaced {
            *self.known.entry(entity).or_insert(0) += 1;
        }
        trace!(entity = %entity, kind = C::type_name(), replaced, "component added");
    }

    /// Remove the instance of `type_id` for `entity`.
    ///
    /// No-op if absent. Returns `true` if something was removed.
    pub fn remove_component(&mut self, entity: Entity, type_id: ComponentTypeId) -> bool {
        let Some(partition) = self.partitions.get_mut(&type_id) else {
            return false;
        };
        if partition.remove(&entity).is_none() {
            return false;
        }
        if partition.is_empty() {
            self.partitions.remove(&type_id);
        }
        self.unregister_kind(entity);
        trace!(entity = %entity, kind = ?type_id, "component removed");
        true
    }

    /// Remove every component of `entity`, forgetting the entity entirely.
    ///
    /// Returns the number of components removed.
    pub fn remove_entity(&mut self, entity: Entity) -> usize {
        let mut removed = 0;
        self.partitions.retain(|_, partition| {
            if partition.remove(&entity).is_some() {
                removed += 1;
            }
            !partition.is_empty()
        });
        self.known.remove(&entity);
        if removed > 0 {
            trace!(entity = %entity, removed, "entity removed");
        }
        removed
    }

    /// Returns a typed reference to the instance of `C` for `entity`.
    #[must_use]
    pub fn get<C: Component>(&self, entity: Entity) -> Option<&C> {
        self.get_raw(entity, ComponentTypeId::of::<C>())?
            .downcast_ref::<C>()
    }

    /// Returns the shared handle for the instance of `type_id` for `entity`.
    #[must_use]
    pub fn get_raw(&self, entity: Entity, type_id: ComponentTypeId) -> Option<&ComponentRef> {
        self.partitions.get(&type_id)?.get(&entity)
    }

    /// Returns `true` if `entity` currently has a component of `type_id`.
    #[must_use]
    pub fn has_component(&self, entity: Entity, type_id: ComponentTypeId) -> bool {
        self.partitions
            .get(&type_id)
            .is_some_and(|p| p.contains_key(&entity))
    }

    /// Returns `true` if the entity has at least one component.
    #[must_use]
    pub fn is_known(&self, entity: Entity) -> bool {
        self.known.contains_key(&entity)
    }

    /// Iterates over all entities with at least one component. No ordering
    /// guarantee.
    pub fn known_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.known.keys().copied()
    }

    /// Returns the number of known entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.known.len()
    }

    /// Returns how many entities currently have a component of `type_id`.
    #[must_use]
    pub fn partition_len(&self, type_id: ComponentTypeId) -> usize {
        self.partitions.get(&type_id).map_or(0, HashMap::len)
    }

    /// Drop every partition and forget every entity.
    ///
    /// The identity generator is deliberately left untouched: IDs are never
    /// reused within a run, even across clears.
    pub fn clear(&mut self) {
        let entities = self.known.len();
        self.partitions.clear();
        self.known.clear();
        debug!(entities, "store cleared");
    }

    pub(crate) fn partition(
        &self,
        type_id: ComponentTypeId,
    ) -> Option<&HashMap<Entity, ComponentRef>> {
        self.partitions.get(&type_id)
    }

    fn unregister_kind(&mut self, entity: Entity) {
        if let Some(count) = self.known.get_mut(&entity) {
            *count -= 1;
            if *count == 0 {
                self.known.remove(&entity);
            }
        }
    }
}
