//! Entity filters — standing queries with update-cycle-synchronized results.
//!
//! An [`EntityFilter`] declares a [`FilterSchema`] of required and optional
//! component kinds, attaches to an [`Engine`](crate::Engine), and maintains a
//! cached result set: entity → [`ComponentGroup`]. The cache is rebuilt at
//! attachment and at every engine update; between updates it is immutable, so
//! readers always see one synchronization point, never a half-applied batch
//! of mutations.
//!
//! Membership rule: an entity is in the result iff every *required* kind is
//! present for it in storage at the synchronization point. Optional kinds
//! only control slot nullability. A schema with no required kinds matches
//! every entity known to storage (an entity is known once it has at least one
//! component of any kind).

use std::cell::{Ref, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::trace;

use vivarium_component::{Component, Entity, FilterSchema, SchemaError, SlotKind};

use crate::engine::Engine;
use crate::store::{ComponentRef, EntityStore};

/// A fixed-arity group of component handles, one slot per declared schema
/// slot, in declaration order.
///
/// Slots for required kinds are always populated; an optional slot is `None`
/// iff the kind was absent at the synchronization point that produced the
/// group. Handles are snapshots: they stay valid even if storage replaces or
/// removes the instance afterwards.
#[derive(Debug, Clone)]
pub struct ComponentGroup {
    slots: Box<[Option<ComponentRef>]>,
}

impl ComponentGroup {
    /// Returns the number of declared slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the group has no slots (empty schema).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the handle in slot `index`, or `None` if the slot is empty or
    /// out of range.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&ComponentRef> {
        self.slots.get(index)?.as_ref()
    }

    /// Returns a typed reference to the component in slot `index`.
    ///
    /// `None` if the slot is empty, out of range, or holds a different type
    /// than `C`.
    #[must_use]
    pub fn get<C: Component>(&self, index: usize) -> Option<&C> {
        self.slot(index)?.downcast_ref::<C>()
    }
}

/// Cached result set: entity → component group.
pub type EntityMap = HashMap<Entity, ComponentGroup>;

/// Shared filter state. The user-facing [`EntityFilter`] handle and the
/// engine's registration list both point here.
#[derive(Debug)]
pub(crate) struct FilterCore {
    schema: FilterSchema,
    entities: EntityMap,
    attached: bool,
    refreshed_at: Option<u64>,
    record_changes: bool,
    added: HashSet<Entity>,
    removed: HashSet<Entity>,
}

impl FilterCore {
    fn new(schema: FilterSchema) -> Self {
        Self {
            schema,
            entities: EntityMap::new(),
            attached: false,
            refreshed_at: None,
            record_changes: false,
            added: HashSet::new(),
            removed: HashSet::new(),
        }
    }

    /// Rebuild the result set from current store contents.
    ///
    /// Candidates are drawn from the smallest required partition when the
    /// schema has required kinds (every match must appear there), otherwise
    /// from all known entities.
    pub(crate) fn refresh(&mut self, store: &EntityStore, epoch: u64) {
        let mut next = EntityMap::with_capacity(self.entities.len());

        if self.schema.has_required() {
            let seed = self
                .schema
                .required_ids()
                .min_by_key(|&id| store.partition_len(id));
            if let Some(seed) = seed
                && let Some(partition) = store.partition(seed)
            {
                for &entity in partition.keys() {
                    if let Some(group) = self.build_group(store, entity) {
                        next.insert(entity, group);
                    }
                }
            }
        } else {
            for entity in store.known_entities() {
                if let Some(group) = self.build_group(store, entity) {
                    next.insert(entity, group);
                }
            }
        }

        if self.record_changes {
            for &entity in next.keys() {
                if !self.entities.contains_key(&entity) {
                    self.added.insert(entity);
                }
            }
            for &entity in self.entities.keys() {
                if !next.contains_key(&entity) {
                    self.removed.insert(entity);
                }
            }
        }

        trace!(epoch, matched = next.len(), "filter refreshed");
        self.entities = next;
        self.refreshed_at = Some(epoch);
    }

    /// Reset to the unrefreshed-empty state. Attachment survives.
    pub(crate) fn reset(&mut self) {
        self.entities.clear();
        self.added.clear();
        self.removed.clear();
        self.refreshed_at = None;
    }

    fn build_group(&self, store: &EntityStore, entity: Entity) -> Option<ComponentGroup> {
        let mut slots = Vec::with_capacity(self.schema.len());
        for spec in self.schema.slots() {
            let handle = store.get_raw(entity, spec.type_id).cloned();
            if handle.is_none() && spec.kind == SlotKind::Required {
                return None;
            }
            slots.push(handle);
        }
        Some(ComponentGroup {
            slots: slots.into_boxed_slice(),
        })
    }
}

/// A standing query over a fixed required/optional component-kind schema.
///
/// Lifecycle: construct with a schema, attach to an engine with
/// [`set_engine`](Self::set_engine), read results with
/// [`entities`](Self::entities). The result set reflects exactly the storage
/// state as of the last refresh; it changes only at attachment and at engine
/// updates. Dropping the filter detaches it from its engine.
///
/// ```rust
/// use vivarium_component::{Component, FilterSchema};
/// use vivarium_ecs::{Engine, EntityFilter};
///
/// struct Position;
/// impl Component for Position {
///     fn type_name() -> &'static str { "Position" }
/// }
///
/// let mut engine = Engine::new();
/// engine.init();
/// let filter = EntityFilter::new(FilterSchema::new().require::<Position>()).unwrap();
/// filter.set_engine(&mut engine);
///
/// let entity = engine.store_mut().generate_id();
/// engine.store_mut().add_component(entity, Position);
/// engine.update();
/// assert!(filter.contains(entity));
/// ```
#[derive(Debug)]
pub struct EntityFilter {
    core: Rc<RefCell<FilterCore>>,
}

impl EntityFilter {
    /// Create an unattached filter over `schema`.
    ///
    /// Fails if the schema declares the same component kind twice.
    pub fn new(schema: FilterSchema) -> Result<Self, SchemaError> {
        schema.validate()?;
        Ok(Self {
            core: Rc::new(RefCell::new(FilterCore::new(schema))),
        })
    }

    /// Enable change recording: subsequent refreshes accumulate the entities
    /// that entered or left the result set until
    /// [`clear_changes`](Self::clear_changes) is called.
    #[must_use]
    pub fn with_change_recording(self) -> Self {
        self.core.borrow_mut().record_changes = true;
        self
    }

    /// Attach this filter to `engine`.
    ///
    /// Registers the filter for every subsequent [`Engine::update`] and
    /// performs an immediate first refresh against current store state, so a
    /// filter attached after mutations have already been synchronized sees
    /// them without waiting for another update.
    ///
    /// A filter attaches to at most one engine; attaching twice is a caller
    /// contract violation.
    pub fn set_engine(&self, engine: &mut Engine) {
        {
            let mut core = self.core.borrow_mut();
            debug_assert!(!core.attached, "filter is already attached to an engine");
            core.attached = true;
        }
        engine.attach(&self.core);
    }

    /// The cached result set as of the last refresh.
    ///
    /// Pure read: never triggers recomputation, and repeated calls between
    /// two updates return equal maps. The returned guard must not be held
    /// across an [`Engine::update`] or [`Engine::init`] call; doing so is a
    /// contract violation and fails fast on the interior borrow.
    #[must_use]
    pub fn entities(&self) -> Ref<'_, EntityMap> {
        Ref::map(self.core.borrow(), |core| &core.entities)
    }

    /// Returns `true` if `entity` was in the result set at the last refresh.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.core.borrow().entities.contains_key(&entity)
    }

    /// Returns the number of entities in the cached result set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.borrow().entities.len()
    }

    /// Returns `true` if the cached result set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.borrow().entities.is_empty()
    }

    /// Returns the declared schema.
    #[must_use]
    pub fn schema(&self) -> Ref<'_, FilterSchema> {
        Ref::map(self.core.borrow(), |core| &core.schema)
    }

    /// Returns `true` once the filter has been attached to an engine.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.core.borrow().attached
    }

    /// The engine epoch of the most recent refresh, or `None` if the filter
    /// has never refreshed (unattached, or reset by [`Engine::init`]).
    #[must_use]
    pub fn last_refresh_epoch(&self) -> Option<u64> {
        self.core.borrow().refreshed_at
    }

    /// Entities that entered the result set since the last
    /// [`clear_changes`](Self::clear_changes). Empty unless change recording
    /// is enabled.
    #[must_use]
    pub fn added_entities(&self) -> Ref<'_, HashSet<Entity>> {
        Ref::map(self.core.borrow(), |core| &core.added)
    }

    /// Entities that left the result set since the last
    /// [`clear_changes`](Self::clear_changes). Empty unless change recording
    /// is enabled.
    #[must_use]
    pub fn removed_entities(&self) -> Ref<'_, HashSet<Entity>> {
        Ref::map(self.core.borrow(), |core| &core.removed)
    }

    /// Empty both change accumulators.
    pub fn clear_changes(&self) {
        let mut core = self.core.borrow_mut();
        core.added.clear();
        core.removed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vivarium_component::ComponentTypeId;

    struct Position {
        x: f32,
    }
    impl Component for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }

    struct Velocity {
        dx: f32,
    }
    impl Component for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    struct Mass;
    impl Component for Mass {
        fn type_name() -> &'static str {
            "Mass"
        }
    }

    fn engine_with_filter(schema: FilterSchema) -> (Engine, EntityFilter) {
        let mut engine = Engine::new();
        engine.init();
        let filter = EntityFilter::new(schema).unwrap();
        filter.set_engine(&mut engine);
        (engine, filter)
    }

    #[test]
    fn test_rejects_duplicate_schema() {
        let schema = FilterSchema::new().require::<Position>().optional::<Position>();
        assert!(EntityFilter::new(schema).is_err());
    }

    #[test]
    fn test_required_kinds_gate_membership() {
        let (mut engine, filter) =
            engine_with_filter(FilterSchema::new().require::<Position>().require::<Velocity>());

        let e = engine.store_mut().generate_id();
        engine.store_mut().add_component(e, Position { x: 0.0 });
        engine.update();
        assert!(!filter.contains(e));

        engine.store_mut().add_component(e, Velocity { dx: 0.0 });
        engine.update();
        assert!(filter.contains(e));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn test_group_slots_follow_declaration_order() {
        let (mut engine, filter) =
            engine_with_filter(FilterSchema::new().require::<Position>().optional::<Velocity>());

        let e = engine.store_mut().generate_id();
        engine.store_mut().add_component(e, Position { x: 7.0 });
        engine.store_mut().add_component(e, Velocity { dx: 3.0 });
        engine.update();

        let entities = filter.entities();
        let group = &entities[&e];
        assert_eq!(group.len(), 2);
        assert_eq!(group.get::<Position>(0).unwrap().x, 7.0);
        assert_eq!(group.get::<Velocity>(1).unwrap().dx, 3.0);
        // Wrong type for a slot yields None, not a panic.
        assert!(group.get::<Velocity>(0).is_none());
    }

    #[test]
    fn test_optional_slot_nullability() {
        let (mut engine, filter) =
            engine_with_filter(FilterSchema::new().require::<Position>().optional::<Velocity>());

        let e = engine.store_mut().generate_id();
        engine.store_mut().add_component(e, Position { x: 0.0 });
        engine.update();

        {
            let entities = filter.entities();
            let group = &entities[&e];
            assert!(group.slot(0).is_some());
            assert!(group.slot(1).is_none());
        }

        engine.store_mut().add_component(e, Velocity { dx: 1.0 });
        engine.update();
        assert!(filter.entities()[&e].slot(1).is_some());
    }

    #[test]
    fn test_optional_only_matches_all_known_entities() {
        let (mut engine, filter) = engine_with_filter(FilterSchema::new().optional::<Velocity>());

        // Known through an unrelated kind: matched, slot empty.
        let e = engine.store_mut().generate_id();
        engine.store_mut().add_component(e, Mass);
        // Generated but never given a component: not known, not matched.
        let ghost = engine.store_mut().generate_id();
        engine.update();

        assert!(filter.contains(e));
        assert!(!filter.contains(ghost));
        assert_eq!(filter.len(), 1);
        assert!(filter.entities()[&e].slot(0).is_none());
    }

    #[test]
    fn test_results_frozen_between_updates() {
        let (mut engine, filter) = engine_with_filter(FilterSchema::new().require::<Position>());

        let e = engine.store_mut().generate_id();
        engine.store_mut().add_component(e, Position { x: 0.0 });
        engine.update();
        assert!(filter.contains(e));

        // Mutation is live in the store but invisible to the filter until the
        // next update.
        engine
            .store_mut()
            .remove_component(e, ComponentTypeId::of::<Position>());
        assert!(!engine.store().is_known(e));
        assert!(filter.contains(e));

        engine.update();
        assert!(!filter.contains(e));
    }

    #[test]
    fn test_snapshot_group_survives_replacement() {
        let (mut engine, filter) = engine_with_filter(FilterSchema::new().require::<Position>());

        let e = engine.store_mut().generate_id();
        engine.store_mut().add_component(e, Position { x: 1.0 });
        engine.update();

        // Replace the instance without updating; the cached group still
        // holds the value captured at the synchronization point.
        engine.store_mut().add_component(e, Position { x: 2.0 });
        assert_eq!(filter.entities()[&e].get::<Position>(0).unwrap().x, 1.0);

        engine.update();
        assert_eq!(filter.entities()[&e].get::<Position>(0).unwrap().x, 2.0);
    }

    #[test]
    fn test_attach_refreshes_immediately() {
        let mut engine = Engine::new();
        engine.init();
        let e = engine.store_mut().generate_id();
        engine.store_mut().add_component(e, Position { x: 0.0 });
        engine.update();

        let filter = EntityFilter::new(FilterSchema::new().require::<Position>()).unwrap();
        assert!(!filter.is_attached());
        filter.set_engine(&mut engine);
        assert!(filter.is_attached());
        assert!(filter.contains(e));
        assert_eq!(filter.last_refresh_epoch(), Some(engine.epoch()));
    }

    #[test]
    fn test_change_recording_accumulates_until_cleared() {
        let mut engine = Engine::new();
        engine.init();
        let filter = EntityFilter::new(FilterSchema::new().require::<Position>())
            .unwrap()
            .with_change_recording();
        filter.set_engine(&mut engine);

        let e1 = engine.store_mut().generate_id();
        let e2 = engine.store_mut().generate_id();
        engine.store_mut().add_component(e1, Position { x: 0.0 });
        engine.update();
        engine.store_mut().add_component(e2, Position { x: 0.0 });
        engine.update();

        assert_eq!(filter.added_entities().len(), 2);
        assert!(filter.removed_entities().is_empty());

        engine
            .store_mut()
            .remove_component(e1, ComponentTypeId::of::<Position>());
        engine.update();
        assert!(filter.removed_entities().contains(&e1));

        filter.clear_changes();
        assert!(filter.added_entities().is_empty());
        assert!(filter.removed_entities().is_empty());
        // The result set itself is untouched by clearing changes.
        assert!(filter.contains(e2));
    }

    #[test]
    fn test_change_recording_off_by_default() {
        let (mut engine, filter) = engine_with_filter(FilterSchema::new().require::<Position>());
        let e = engine.store_mut().generate_id();
        engine.store_mut().add_component(e, Position { x: 0.0 });
        engine.update();

        assert!(filter.contains(e));
        assert!(filter.added_entities().is_empty());
    }

    #[test]
    fn test_empty_schema_matches_known_entities_with_empty_groups() {
        let (mut engine, filter) = engine_with_filter(FilterSchema::new());
        let e = engine.store_mut().generate_id();
        engine.store_mut().add_component(e, Mass);
        engine.update();

        assert!(filter.contains(e));
        assert!(filter.entities()[&e].is_empty());
    }
}
