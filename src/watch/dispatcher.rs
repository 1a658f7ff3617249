//! Delivery of appeared/vanished callbacks on a watch's scheduling context.
//!
//! A notification carries a snapshot of the connection and owner taken when
//! it was committed; the watch may have moved on by the time a deferred
//! notification runs.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::WatchHandlers;
use crate::BusConnection;
use crate::BusName;
use crate::Priority;
use crate::SchedulingContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallType {
    Appeared,
    Vanished,
}

/// A committed transition waiting to be handed to the caller
pub(crate) struct Notification {
    pub(crate) call_type: CallType,
    pub(crate) connection: Option<Arc<dyn BusConnection>>,
    pub(crate) owner: Option<String>,
}

impl fmt::Debug for Notification {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Notification")
            .field("call_type", &self.call_type)
            .field("connected", &self.connection.is_some())
            .field("owner", &self.owner)
            .finish()
    }
}

pub(crate) struct Dispatcher {
    context: Arc<dyn SchedulingContext>,
}

impl Dispatcher {
    pub(crate) fn new(context: Arc<dyn SchedulingContext>) -> Self {
        Self { context }
    }

    /// Hands `notification` back when the caller is already on the context
    /// and must invoke it inline; otherwise queues `deferred` at high
    /// priority and returns `None`.
    pub(crate) fn route<F>(
        &self,
        notification: Notification,
        deferred: F,
    ) -> Option<Notification>
    where
        F: FnOnce(Notification) + Send + 'static,
    {
        if self.context.is_current() {
            return Some(notification);
        }
        self.context
            .schedule(Priority::High, Box::new(move || deferred(notification)));
        None
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

/// Calls the handler matching `notification`.
pub(crate) fn invoke(
    handlers: &WatchHandlers,
    name: &BusName,
    notification: &Notification,
) {
    match notification.call_type {
        CallType::Appeared => {
            let Some(handler) = &handlers.on_appeared else {
                return;
            };
            match (&notification.connection, &notification.owner) {
                (Some(connection), Some(owner)) => handler(connection, name.as_str(), owner),
                _ => warn!(name = %name, "Appeared notification without connection or owner"),
            }
        }
        CallType::Vanished => {
            if let Some(handler) = &handlers.on_vanished {
                handler(notification.connection.as_ref(), name.as_str());
            }
        }
    }
}
