//! Entry point for starting and stopping watches.

use std::fmt;
use std::sync::Arc;

use tracing::trace;
use tracing::warn;

use crate::context;
use crate::watch;
use crate::watch::Watch;
use crate::watch::WatchRegistry;
use crate::BusConnection;
use crate::BusName;
use crate::BusProvider;
use crate::BusType;
use crate::LoopContext;
use crate::Result;
use crate::SchedulingContext;
use crate::WatchFlags;
use crate::WatchHandlers;
use crate::WatcherConfig;
use crate::WatcherId;

/// Starts and stops bus name watches.
///
/// Watches started through any `NameWatcher` share the process-wide registry,
/// so their ids are unique across the process.
///
/// Callbacks are delivered on the context given by
/// [`WatchHandlers::deliver_on`], else on the thread default context of the
/// caller, else on a dedicated event loop spawned for the watch.
///
/// # Example
/// ```ignore
/// let watcher = NameWatcher::new(provider, WatcherConfig::new()?.validate()?);
/// let id = watcher.watch_name(
///     BusType::Session,
///     "org.example.Player",
///     WatchFlags::NONE,
///     WatchHandlers::new()
///         .on_appeared(|_conn, name, owner| info!("{name} appeared at {owner}"))
///         .on_vanished(|_conn, name| info!("{name} vanished")),
/// )?;
/// // ...
/// watcher.unwatch_name(id);
/// ```
pub struct NameWatcher {
    provider: Arc<dyn BusProvider>,
    registry: Arc<WatchRegistry>,
    config: WatcherConfig,
}

impl NameWatcher {
    pub fn new(
        provider: Arc<dyn BusProvider>,
        config: WatcherConfig,
    ) -> Self {
        Self::with_registry(provider, config, WatchRegistry::global())
    }

    pub(crate) fn with_registry(
        provider: Arc<dyn BusProvider>,
        config: WatcherConfig,
        registry: Arc<WatchRegistry>,
    ) -> Self {
        Self {
            provider,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Starts watching `name` on the shared connection for `bus_type`.
    ///
    /// Returns immediately; the connection is acquired and the name resolved
    /// in the background.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidBusName`] if `name` is not a valid bus name.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn watch_name(
        &self,
        bus_type: BusType,
        name: &str,
        flags: WatchFlags,
        handlers: WatchHandlers,
    ) -> Result<WatcherId> {
        let watch = self.register(name, flags, handlers)?;
        let id = watch.id();
        watch::acquire(watch, self.provider.clone(), bus_type);
        Ok(id)
    }

    /// Like [`NameWatcher::watch_name`], on a connection the caller already
    /// holds. Callbacks never run before this returns, even when `connection`
    /// is already closed.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidBusName`] if `name` is not a valid bus name.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn watch_name_on_connection(
        &self,
        connection: Arc<dyn BusConnection>,
        name: &str,
        flags: WatchFlags,
        handlers: WatchHandlers,
    ) -> Result<WatcherId> {
        let watch = self.register(name, flags, handlers)?;
        watch::bind(&watch, connection);
        Ok(watch.id())
    }

    /// Like [`NameWatcher::watch_name`], stopping the watch when the returned
    /// guard is dropped.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidBusName`] if `name` is not a valid bus name.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn watch_name_scoped(
        &self,
        bus_type: BusType,
        name: &str,
        flags: WatchFlags,
        handlers: WatchHandlers,
    ) -> Result<WatchGuard> {
        let id = self.watch_name(bus_type, name, flags, handlers)?;
        Ok(WatchGuard {
            id,
            registry: self.registry.clone(),
        })
    }

    /// Stops a watch. No callback for it runs after this returns, apart from
    /// one already executing on another thread.
    ///
    /// Unknown ids (never issued, or already stopped) are logged and ignored.
    pub fn unwatch_name(
        &self,
        id: WatcherId,
    ) {
        unwatch(&self.registry, id);
    }

    pub fn is_watching(
        &self,
        id: WatcherId,
    ) -> bool {
        self.registry.lookup(id).is_some()
    }

    /// Number of watches currently registered.
    pub fn active_watches(&self) -> usize {
        self.registry.len()
    }

    fn register(
        &self,
        name: &str,
        flags: WatchFlags,
        mut handlers: WatchHandlers,
    ) -> Result<Arc<Watch>> {
        let name = BusName::new(name)?;
        let context: Arc<dyn SchedulingContext> = match handlers.context.take().or_else(context::thread_default) {
            Some(context) => context,
            None => LoopContext::spawn() as Arc<dyn SchedulingContext>,
        };
        let call_timeout = self.config.call_timeout();

        Ok(self
            .registry
            .register(|id| Watch::new(id, name, flags, handlers, context, call_timeout)))
    }
}

fn unwatch(
    registry: &WatchRegistry,
    id: WatcherId,
) {
    match registry.unregister(id) {
        // Dropped outside the registry lock; teardown runs here if nothing
        // else holds the watch
        Some(watch) => {
            trace!(watcher_id = %id, name = %watch.name(), "Watch stopped");
            drop(watch);
        }
        None => warn!("Invalid id {} passed to unwatch_name()", id),
    }
}

impl fmt::Debug for NameWatcher {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("NameWatcher")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Stops its watch when dropped
#[must_use = "the watch stops when the guard is dropped"]
pub struct WatchGuard {
    id: WatcherId,
    registry: Arc<WatchRegistry>,
}

impl WatchGuard {
    pub fn id(&self) -> WatcherId {
        self.id
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        unwatch(&self.registry, self.id);
    }
}

impl fmt::Debug for WatchGuard {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WatchGuard").field("id", &self.id).finish()
    }
}
