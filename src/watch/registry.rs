use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use tracing::trace;
use tracing::warn;

use super::Watch;

/// Identifier of a watch, unique among live watches of a registry and never
/// zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(NonZeroU64);

impl WatcherId {
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(WatcherId)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for WatcherId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<WatchRegistry> = Arc::new(WatchRegistry::new());
}

/// Table of active watches.
///
/// The mutex guards id assignment and the map only. It is never held while
/// a callback runs or an RPC is issued; entries are handed back to the
/// caller so the last reference is dropped outside the lock.
pub(crate) struct WatchRegistry {
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    next_id: u64,
    watches: HashMap<WatcherId, Arc<Watch>>,
}

impl WatchRegistry {
    pub(crate) fn new() -> Self {
        Self::starting_at(1)
    }

    /// The process-wide registry.
    pub(crate) fn global() -> Arc<WatchRegistry> {
        GLOBAL_REGISTRY.clone()
    }

    pub(crate) fn starting_at(next_id: u64) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next_id,
                watches: HashMap::new(),
            }),
        }
    }

    /// Assigns the next free id, builds the watch with it and inserts it.
    pub(crate) fn register<F>(
        &self,
        create: F,
    ) -> Arc<Watch>
    where
        F: FnOnce(WatcherId) -> Arc<Watch>,
    {
        let mut inner = self.inner.lock();
        let id = inner.allocate_id();
        let watch = create(id);
        inner.watches.insert(id, watch.clone());
        trace!(watcher_id = %id, name = %watch.name(), "Watch registered");
        watch
    }

    pub(crate) fn lookup(
        &self,
        id: WatcherId,
    ) -> Option<Arc<Watch>> {
        self.inner.lock().watches.get(&id).cloned()
    }

    /// Removes the entry and marks it cancelled.
    pub(crate) fn unregister(
        &self,
        id: WatcherId,
    ) -> Option<Arc<Watch>> {
        let mut inner = self.inner.lock();
        let watch = inner.watches.remove(&id)?;
        watch.cancel();
        Some(watch)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().watches.len()
    }

    #[cfg(test)]
    pub(crate) fn rewind_to(
        &self,
        next_id: u64,
    ) {
        self.inner.lock().next_id = next_id;
    }
}

impl RegistryInner {
    /// Ids grow monotonically; after exhausting `u64` the counter wraps to 1
    /// and skips ids that are still registered.
    fn allocate_id(&mut self) -> WatcherId {
        loop {
            let candidate = self.next_id;
            self.next_id = match candidate.checked_add(1) {
                Some(next) => next,
                None => {
                    warn!("Watcher id space exhausted, wrapping around to 1");
                    1
                }
            };

            if let Some(id) = WatcherId::new(candidate) {
                if !self.watches.contains_key(&id) {
                    return id;
                }
            }
        }
    }
}

impl fmt::Debug for WatchRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("WatchRegistry")
            .field("next_id", &inner.next_id)
            .field("watches", &inner.watches.len())
            .finish()
    }
}
