//! Connection acquisition and wiring.
//!
//! A watch either asks a [`BusProvider`] for a shared connection or is handed
//! one by the caller. Binding registers the closed notification, subscribes
//! to owner changes and starts the initial resolution, in that order.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use tracing::trace;

use super::OwnerChangeListener;
use super::OwnerResolver;
use super::Watch;
use crate::BusConnection;
use crate::BusProvider;
use crate::BusType;
use crate::ClosedHandlerId;
use crate::SubscriptionId;

/// Everything a watch holds on a connection.
pub(crate) struct Binding {
    connection: Arc<dyn BusConnection>,
    subscription: SubscriptionId,
    closed_handler: ClosedHandlerId,
}

impl Binding {
    pub(crate) fn connection(&self) -> &Arc<dyn BusConnection> {
        &self.connection
    }

    /// Unsubscribes from owner changes and closed notifications, then drops
    /// the connection.
    pub(crate) fn release(self) {
        self.connection.unsubscribe_signal(self.subscription);
        self.connection.disconnect_closed(self.closed_handler);
        trace!(subscription = ?self.subscription, "Binding released");
    }
}

impl fmt::Debug for Binding {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Binding")
            .field("subscription", &self.subscription)
            .field("closed_handler", &self.closed_handler)
            .finish_non_exhaustive()
    }
}

/// Requests the shared connection for `bus_type` and binds `watch` to it.
///
/// The spawned task keeps the watch alive until the provider answers.
pub(crate) fn acquire(
    watch: Arc<Watch>,
    provider: Arc<dyn BusProvider>,
    bus_type: BusType,
) {
    tokio::spawn(async move {
        match provider.get(bus_type).await {
            Ok(connection) => {
                if watch.is_cancelled() {
                    trace!(watcher_id = %watch.id(), "Watch cancelled before connection was acquired");
                    return;
                }
                bind(&watch, connection);
            }
            Err(e) => {
                debug!(
                    watcher_id = %watch.id(),
                    bus_type = %bus_type,
                    error = %e,
                    "Failed to acquire bus connection"
                );
                watch.handle_connect_failed();
            }
        }
    });
}

/// Wires `watch` to `connection` and starts the initial resolution.
///
/// The resolution reply is dispatched by the connection in arrival order
/// with owner-change signals, so no signal sent after the reply is lost.
///
/// # Panics
/// Panics when called outside a Tokio runtime.
pub(crate) fn bind(
    watch: &Arc<Watch>,
    connection: Arc<dyn BusConnection>,
) {
    let weak = Arc::downgrade(watch);
    let closed_handler = connection.connect_closed(Arc::new(move || {
        if let Some(watch) = weak.upgrade() {
            watch.handle_connection_closed();
        }
    }));

    // Subscribe before resolving so no owner change falls between the
    // snapshot and live updates
    let listener = OwnerChangeListener::new(watch.name().clone());
    let subscription = listener.subscribe(&connection, Arc::downgrade(watch));

    watch.attach(Binding {
        connection: connection.clone(),
        subscription,
        closed_handler,
    });

    // Deferred so no callback runs before the caller holds the id
    let watch = Arc::clone(watch);
    tokio::spawn(async move {
        if watch.is_cancelled() {
            trace!(watcher_id = %watch.id(), "Watch cancelled before resolution started");
            return;
        }
        if connection.is_closed() {
            watch.handle_connection_closed();
            return;
        }

        let resolver = OwnerResolver::new(connection, watch.name().clone(), watch.call_timeout());
        let auto_start = watch.flags().auto_start;
        resolver.resolve(auto_start, move |resolution| watch.complete_resolution(resolution));
    });
}
