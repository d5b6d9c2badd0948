use crate::domain::HighlightError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

type LoadFuture<V> = Shared<BoxFuture<'static, Result<Arc<V>, HighlightError>>>;

/// Observable state of one cached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Unloaded,
    Loading,
    Loaded,
}

enum Slot<V> {
    Loading(LoadFuture<V>),
    Ready(Arc<V>),
}

/// Keyed slots where concurrent callers for one key share a single load.
///
/// The lock is never held across an await: callers clone the shared future
/// out of the map and await it unlocked.
pub struct SingleFlight<V> {
    slots: Mutex<HashMap<String, Slot<V>>>,
}

impl<V> Default for SingleFlight<V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Send + Sync + 'static> SingleFlight<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, joining or starting its load.
    ///
    /// `load` runs only when no slot exists. A failed load clears the slot so
    /// the next caller retries. A load that finishes after [`clear`] still
    /// answers its waiters but is not stored.
    ///
    /// [`clear`]: SingleFlight::clear
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> Result<Arc<V>, HighlightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, HighlightError>> + Send + 'static,
    {
        let future = {
            let mut slots = self.slots.lock();
            match slots.get(key) {
                Some(Slot::Ready(value)) => return Ok(value.clone()),
                Some(Slot::Loading(future)) => future.clone(),
                None => {
                    log::debug!(target: "patchlens::highlight", "Loading {}", key);
                    let future = load().map(|result| result.map(Arc::new)).boxed().shared();
                    slots.insert(key.to_string(), Slot::Loading(future.clone()));
                    future
                }
            }
        };

        let result = future.clone().await;

        let mut slots = self.slots.lock();
        let owns_slot = matches!(
            slots.get(key),
            Some(Slot::Loading(current)) if current.ptr_eq(&future)
        );
        if owns_slot {
            match &result {
                Ok(value) => {
                    slots.insert(key.to_string(), Slot::Ready(value.clone()));
                }
                Err(err) => {
                    log::warn!(target: "patchlens::highlight", "Failed to load {}: {}", key, err);
                    slots.remove(key);
                }
            }
        }
        result
    }

    pub fn state(&self, key: &str) -> ResourceState {
        match self.slots.lock().get(key) {
            None => ResourceState::Unloaded,
            Some(Slot::Loading(_)) => ResourceState::Loading,
            Some(Slot::Ready(_)) => ResourceState::Loaded,
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        match self.slots.lock().get(key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Keys whose load has completed.
    pub fn loaded_keys(&self) -> Vec<String> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}
