//! Signature-keyed registries with atomic drain.
//!
//! Each registry is guarded by one lock. Every mutation of an item held in
//! the registry, including metric merges, runs under that lock, so all
//! metrics of one entity serialize while different entities never contend.

use crate::core::uid::Uid;
use crate::metrics::entity::Entity;
use crate::metrics::types::{Metric, Sample};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Concurrent map from signature to item.
#[derive(Debug)]
pub struct Registry<T> {
    items: Mutex<AHashMap<Uid, T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(AHashMap::new()),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert synchronously, replacing any item with the same signature.
    pub fn put(&self, id: Uid, item: T) {
        self.items.lock().insert(id, item);
    }

    pub fn has(&self, id: &Uid) -> bool {
        self.items.lock().contains_key(id)
    }

    /// Run `f` against the item under the registry lock.
    pub fn with<R>(&self, id: &Uid, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.items.lock().get_mut(id).map(f)
    }

    /// Swap the live map for an empty one and return the prior contents.
    pub fn drain(&self) -> Vec<T> {
        let drained = std::mem::take(&mut *self.items.lock());
        drained.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T: Clone> Registry<T> {
    pub fn get(&self, id: &Uid) -> Option<T> {
        self.items.lock().get(id).cloned()
    }
}

/// Metrics owned by one entity.
pub type MetricRegistry = Registry<Metric>;

/// Entities owned by one accumulator.
pub type EntityRegistry = Registry<Arc<Entity>>;

impl Registry<Metric> {
    /// Merge `sample` into the matching metric, creating it when unseen.
    ///
    /// Lookup, merge and insert happen under a single lock acquisition.
    pub fn record(&self, entity: &Uid, sample: Sample) -> Uid {
        let id = Metric::signature_for(entity, &sample.name, sample.metric_type, &sample.unit);
        let mut items = self.items.lock();
        match items.get_mut(&id) {
            Some(metric) => metric.merge(&sample),
            None => {
                items.insert(id.clone(), Metric::from_sample(sample));
            },
        }
        id
    }
}

impl Registry<Arc<Entity>> {
    /// Existing entity for `id` or the one built by `make`.
    pub fn get_or_insert_with(&self, id: &Uid, make: impl FnOnce() -> Entity) -> Arc<Entity> {
        let mut items = self.items.lock();
        if let Some(entity) = items.get(id) {
            return Arc::clone(entity);
        }
        let entity = Arc::new(make());
        items.insert(id.clone(), Arc::clone(&entity));
        entity
    }
}
