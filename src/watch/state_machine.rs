//! Per-registration watch state machine
//!
//! ```text
//! Unbound ──connection──▶ Resolving ──owner──▶ Present(owner) ◀─┐
//!    │                        │                     │            │ owner
//!    │ connect failed         └──no owner──▶ Absent ◀┘ vanished  │ changes
//!    └──────────────────────────────────────▶ Absent ────────────┘
//! ```
//!
//! Every transition into Present or Absent commits a notification. The
//! committed value always advances, but a callback only fires when it differs
//! from the previous commit, so the delivered stream strictly alternates.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;
use tracing::warn;

use super::dispatcher;
use super::Binding;
use super::CallType;
use super::Dispatcher;
use super::Notification;
use super::OwnerChange;
use super::Resolution;
use super::WatchFlags;
use super::WatchHandlers;
use super::WatcherId;
use crate::BusName;
use crate::SchedulingContext;

/// Last notification committed to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum PreviousCall {
    #[default]
    None,
    Appeared,
    Vanished,
}

impl From<CallType> for PreviousCall {
    fn from(call_type: CallType) -> Self {
        match call_type {
            CallType::Appeared => PreviousCall::Appeared,
            CallType::Vanished => PreviousCall::Vanished,
        }
    }
}

#[derive(Debug, Default)]
struct WatchState {
    owner: Option<String>,
    previous_call: PreviousCall,
    initialized: bool,
    binding: Option<Binding>,
}

/// A single watch registration.
///
/// Shared by the registry entry and by every in-flight operation; owner
/// change and closed handlers only hold weak references. Teardown happens in
/// `Drop`, once the last strong reference is gone.
pub(crate) struct Watch {
    id: WatcherId,
    name: BusName,
    flags: WatchFlags,
    call_timeout: Duration,
    handlers: WatchHandlers,
    dispatcher: Dispatcher,
    cancelled: AtomicBool,
    state: Mutex<WatchState>,
}

impl Watch {
    pub(crate) fn new(
        id: WatcherId,
        name: BusName,
        flags: WatchFlags,
        handlers: WatchHandlers,
        context: Arc<dyn SchedulingContext>,
        call_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            name,
            flags,
            call_timeout,
            handlers,
            dispatcher: Dispatcher::new(context),
            cancelled: AtomicBool::new(false),
            state: Mutex::new(WatchState::default()),
        })
    }

    pub(crate) fn id(&self) -> WatcherId {
        self.id
    }

    pub(crate) fn name(&self) -> &BusName {
        &self.name
    }

    pub(crate) fn flags(&self) -> WatchFlags {
        self.flags
    }

    pub(crate) fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn owner(&self) -> Option<String> {
        self.state.lock().owner.clone()
    }

    #[cfg(test)]
    pub(crate) fn previous_call(&self) -> PreviousCall {
        self.state.lock().previous_call
    }

    #[cfg(test)]
    pub(crate) fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    #[cfg(test)]
    pub(crate) fn is_bound(&self) -> bool {
        self.state.lock().binding.is_some()
    }

    /// Stores the connection binding; resolution starts right after.
    pub(crate) fn attach(
        &self,
        binding: Binding,
    ) {
        let previous = self.state.lock().binding.replace(binding);
        if let Some(previous) = previous {
            warn!(watcher_id = %self.id, "Watch was already bound to a connection");
            previous.release();
        }
    }

    /// The initial resolution finished.
    pub(crate) fn complete_resolution(
        self: &Arc<Self>,
        resolution: Resolution,
    ) {
        let mut inline = Vec::new();
        {
            let mut state = self.state.lock();
            // The connection went away while the query was in flight
            let resolution = if state.binding.is_none() {
                Resolution::Unowned
            } else {
                resolution
            };

            match resolution {
                Resolution::Owned(owner) => {
                    if let Some(recorded) = &state.owner {
                        warn!(
                            watcher_id = %self.id,
                            name = %self.name,
                            recorded = %recorded,
                            owner = %owner,
                            "Owner already recorded when resolution completed"
                        );
                    }
                    state.owner = Some(owner);
                    inline.extend(self.commit(&mut state, CallType::Appeared));
                }
                Resolution::Unowned => {
                    inline.extend(self.commit(&mut state, CallType::Vanished));
                }
            }
            state.initialized = true;
        }
        self.invoke_inline(inline);
    }

    /// A `NameOwnerChanged` broadcast for the watched name arrived.
    pub(crate) fn handle_owner_change(
        self: &Arc<Self>,
        change: OwnerChange,
    ) {
        let mut inline = Vec::new();
        {
            let mut state = self.state.lock();
            // Superseded by the resolution result
            if !state.initialized {
                trace!(watcher_id = %self.id, ?change, "Discarding owner change received before initialization");
                return;
            }
            if state.binding.is_none() {
                trace!(watcher_id = %self.id, ?change, "Discarding owner change after connection loss");
                return;
            }

            if !change.old_owner.is_empty() && state.owner.is_some() {
                state.owner = None;
                inline.extend(self.commit(&mut state, CallType::Vanished));
            }

            if !change.new_owner.is_empty() {
                if let Some(recorded) = &state.owner {
                    warn!(
                        watcher_id = %self.id,
                        name = %change.name,
                        recorded = %recorded,
                        new_owner = %change.new_owner,
                        "Owner already recorded when a new owner was announced"
                    );
                }
                state.owner = Some(change.new_owner);
                inline.extend(self.commit(&mut state, CallType::Appeared));
            }
        }
        self.invoke_inline(inline);
    }

    /// The bound connection closed: release it and report the name gone.
    pub(crate) fn handle_connection_closed(self: &Arc<Self>) {
        let (binding, inline) = {
            let mut state = self.state.lock();
            let binding = state.binding.take();
            state.owner = None;
            let inline = self.commit(&mut state, CallType::Vanished);
            (binding, inline)
        };

        if let Some(binding) = binding {
            tracing::debug!(watcher_id = %self.id, name = %self.name, "Bus connection closed");
            binding.release();
        }
        self.invoke_inline(inline);
    }

    /// No connection could be acquired; the name is unreachable.
    pub(crate) fn handle_connect_failed(self: &Arc<Self>) {
        let inline = {
            let mut state = self.state.lock();
            self.commit(&mut state, CallType::Vanished)
        };
        self.invoke_inline(inline);
    }

    /// Records `call_type` and decides whether and where to deliver it.
    ///
    /// Deferred deliveries are queued while the state lock is held, so queue
    /// order matches commit order. Inline ones are returned to the caller,
    /// which invokes them after releasing the lock.
    fn commit(
        self: &Arc<Self>,
        state: &mut WatchState,
        call_type: CallType,
    ) -> Option<Notification> {
        let next = PreviousCall::from(call_type);
        if state.previous_call == next {
            return None;
        }
        state.previous_call = next;

        let has_handler = match call_type {
            CallType::Appeared => self.handlers.on_appeared.is_some(),
            CallType::Vanished => self.handlers.on_vanished.is_some(),
        };
        if self.is_cancelled() || !has_handler {
            trace!(watcher_id = %self.id, ?call_type, "Committed without delivery");
            return None;
        }

        trace!(watcher_id = %self.id, name = %self.name, ?call_type, owner = ?state.owner, "Committed");
        let notification = Notification {
            call_type,
            connection: state.binding.as_ref().map(|b| b.connection().clone()),
            owner: state.owner.clone(),
        };
        let watch = Arc::clone(self);
        self.dispatcher
            .route(notification, move |notification| watch.deliver(notification))
    }

    /// Hands one notification to the user, unless the watch was cancelled
    /// after the commit.
    fn deliver(
        &self,
        notification: Notification,
    ) {
        if self.is_cancelled() {
            trace!(watcher_id = %self.id, ?notification, "Dropping notification of cancelled watch");
            return;
        }
        dispatcher::invoke(&self.handlers, &self.name, &notification);
    }

    fn invoke_inline<I>(
        &self,
        notifications: I,
    ) where
        I: IntoIterator<Item = Notification>,
    {
        // An earlier callback of the same batch may have unwatched
        for notification in notifications {
            self.deliver(notification);
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        // Unsubscribe before the connection reference goes
        if let Some(binding) = self.state.get_mut().binding.take() {
            binding.release();
        }
        trace!(watcher_id = %self.id, name = %self.name, "Watch finalized");
    }
}

impl fmt::Debug for Watch {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Watch")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
