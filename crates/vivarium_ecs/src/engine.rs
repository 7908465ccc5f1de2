//! Update-cycle engine — the synchronization point for filters.
//!
//! The [`Engine`] owns the [`EntityStore`] for a run and the list of attached
//! filters. Collaborators mutate storage at any time through
//! [`store_mut`](Engine::store_mut); those mutations become visible to
//! filters only when [`update`](Engine::update) runs. One `update` refreshes
//! every attached filter against current store contents before returning, so
//! each filter observes mutation batches atomically, never partially.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::filter::FilterCore;
use crate::store::EntityStore;

/// Drives the update cycle over one [`EntityStore`].
///
/// Filters register themselves via
/// [`EntityFilter::set_engine`](crate::EntityFilter::set_engine); the engine
/// holds them weakly, so dropping a filter detaches it. Each `update`
/// advances the engine's epoch — the counter filters report via
/// [`last_refresh_epoch`](crate::EntityFilter::last_refresh_epoch).
#[derive(Debug, Default)]
pub struct Engine {
    store: EntityStore,
    filters: Vec<Weak<RefCell<FilterCore>>>,
    epoch: u64,
}

impl Engine {
    /// Create an engine with an empty store and no attached filters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: EntityStore::new(),
            filters: Vec::new(),
            epoch: 0,
        }
    }

    /// Reset the run: clear the store and reset every attached filter to the
    /// empty, unrefreshed state.
    ///
    /// Attachment survives, as does the store's identity generator — a new
    /// run never reuses entity IDs from the previous one.
    pub fn init(&mut self) {
        self.store.clear();
        self.filters.retain(|weak| {
            let Some(core) = weak.upgrade() else {
                return false;
            };
            core.borrow_mut().reset();
            true
        });
        debug!(filters = self.filters.len(), "engine initialised");
    }

    /// Run one synchronization point.
    ///
    /// Storage already reflects every mutation issued since the previous
    /// update (mutations apply immediately); this call makes them visible by
    /// refreshing every attached filter, in attachment order, before
    /// returning.
    pub fn update(&mut self) {
        self.epoch += 1;
        self.filters.retain(|weak| {
            let Some(core) = weak.upgrade() else {
                return false;
            };
            core.borrow_mut().refresh(&self.store, self.epoch);
            true
        });
        debug!(
            epoch = self.epoch,
            filters = self.filters.len(),
            entities = self.store.entity_count(),
            "update cycle complete"
        );
    }

    /// Returns a reference to the store.
    #[must_use]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Returns a mutable reference to the store. Mutations made here are
    /// deferred from the filters' perspective until the next
    /// [`update`](Self::update).
    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    /// The number of completed update cycles.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The number of currently attached (live) filters.
    #[must_use]
    pub fn filter_count(&self) -> usize {
        self.filters.iter().filter(|w| w.strong_count() > 0).count()
    }

    /// Register a filter and give it an immediate first refresh against
    /// current store state.
    pub(crate) fn attach(&mut self, core: &Rc<RefCell<FilterCore>>) {
        core.borrow_mut().refresh(&self.store, self.epoch);
        self.filters.push(Rc::downgrade(core));
        debug!(filters = self.filters.len(), "filter attached");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::EntityFilter;
    use vivarium_component::{Component, FilterSchema};

    struct Marker;
    impl Component for Marker {
        fn type_name() -> &'static str {
            "Marker"
        }
    }

    #[test]
    fn test_update_advances_epoch() {
        let mut engine = Engine::new();
        assert_eq!(engine.epoch(), 0);
        engine.update();
        engine.update();
        assert_eq!(engine.epoch(), 2);
    }

    #[test]
    fn test_init_resets_store_and_filters() {
        let mut engine = Engine::new();
        engine.init();
        let filter = EntityFilter::new(FilterSchema::new().require::<Marker>()).unwrap();
        filter.set_engine(&mut engine);

        let e = engine.store_mut().generate_id();
        engine.store_mut().add_component(e, Marker);
        engine.update();
        assert!(filter.contains(e));

        engine.init();
        assert_eq!(engine.store().entity_count(), 0);
        assert!(filter.is_empty());
        assert_eq!(filter.last_refresh_epoch(), None);
        // Still attached: the next update repopulates it.
        assert!(filter.is_attached());
    }

    #[test]
    fn test_ids_not_reused_across_init() {
        let mut engine = Engine::new();
        engine.init();
        let e1 = engine.store_mut().generate_id();
        engine.init();
        let e2 = engine.store_mut().generate_id();
        assert!(e2.id() > e1.id());
    }

    #[test]
    fn test_dropped_filter_detaches() {
        let mut engine = Engine::new();
        engine.init();
        let filter = EntityFilter::new(FilterSchema::new().require::<Marker>()).unwrap();
        filter.set_engine(&mut engine);
        assert_eq!(engine.filter_count(), 1);

        drop(filter);
        assert_eq!(engine.filter_count(), 0);
        // The dead registration is pruned by the next update.
        engine.update();
        assert_eq!(engine.filter_count(), 0);
    }

    #[test]
    fn test_all_filters_refresh_in_one_update() {
        let mut engine = Engine::new();
        engine.init();
        let a = EntityFilter::new(FilterSchema::new().require::<Marker>()).unwrap();
        let b = EntityFilter::new(FilterSchema::new().optional::<Marker>()).unwrap();
        a.set_engine(&mut engine);
        b.set_engine(&mut engine);

        let e = engine.store_mut().generate_id();
        engine.store_mut().add_component(e, Marker);
        engine.update();

        assert!(a.contains(e));
        assert!(b.contains(e));
        assert_eq!(a.last_refresh_epoch(), b.last_refresh_epoch());
    }
}
