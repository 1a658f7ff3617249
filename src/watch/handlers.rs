use std::fmt;
use std::sync::Arc;

use crate::BusConnection;
use crate::SchedulingContext;

/// Invoked with the connection, the watched name and its current owner
pub type NameAppearedHandler = Box<dyn Fn(&Arc<dyn BusConnection>, &str, &str) + Send + Sync>;

/// Invoked with the connection (absent once it was lost) and the watched name
pub type NameVanishedHandler = Box<dyn Fn(Option<&Arc<dyn BusConnection>>, &str) + Send + Sync>;

/// Options for a watch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchFlags {
    /// Ask the bus to activate a provider for the name before resolving it
    pub auto_start: bool,
}

impl WatchFlags {
    pub const NONE: WatchFlags = WatchFlags { auto_start: false };
    pub const AUTO_START: WatchFlags = WatchFlags { auto_start: true };
}

/// Callbacks of a watch and the context they are delivered on.
///
/// Everything the closures capture lives exactly as long as the watch and
/// is dropped when its last reference goes away.
///
/// # Example
/// ```ignore
/// let handlers = WatchHandlers::new()
///     .on_appeared(|_conn, name, owner| println!("{name} is owned by {owner}"))
///     .on_vanished(|_conn, name| println!("{name} has no owner"));
/// ```
#[derive(Default)]
pub struct WatchHandlers {
    pub(crate) on_appeared: Option<NameAppearedHandler>,
    pub(crate) on_vanished: Option<NameVanishedHandler>,
    pub(crate) context: Option<Arc<dyn SchedulingContext>>,
}

impl WatchHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_appeared<F>(
        mut self,
        handler: F,
    ) -> Self
    where
        F: Fn(&Arc<dyn BusConnection>, &str, &str) + Send + Sync + 'static,
    {
        self.on_appeared = Some(Box::new(handler));
        self
    }

    pub fn on_vanished<F>(
        mut self,
        handler: F,
    ) -> Self
    where
        F: Fn(Option<&Arc<dyn BusConnection>>, &str) + Send + Sync + 'static,
    {
        self.on_vanished = Some(Box::new(handler));
        self
    }

    /// Delivers callbacks on `context` instead of the thread default.
    pub fn deliver_on(
        mut self,
        context: Arc<dyn SchedulingContext>,
    ) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Debug for WatchHandlers {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WatchHandlers")
            .field("on_appeared", &self.on_appeared.is_some())
            .field("on_vanished", &self.on_vanished.is_some())
            .field("context", &self.context.is_some())
            .finish()
    }
}
