use std::sync::Arc;
use std::sync::Weak;

use tracing::trace;

use super::Watch;
use crate::constants::DBUS_INTERFACE;
use crate::constants::DBUS_PATH;
use crate::constants::DBUS_SERVICE;
use crate::constants::NAME_OWNER_CHANGED;
use crate::BusConnection;
use crate::BusName;
use crate::Signal;
use crate::SignalRule;
use crate::SubscriptionId;
use crate::Value;

/// One `NameOwnerChanged` broadcast; empty strings mean "no owner"
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OwnerChange {
    pub(crate) name: String,
    pub(crate) old_owner: String,
    pub(crate) new_owner: String,
}

/// Turns owner-change broadcasts for one name into [`OwnerChange`] facts.
#[derive(Debug, Clone)]
pub(crate) struct OwnerChangeListener {
    name: BusName,
}

impl OwnerChangeListener {
    pub(crate) fn new(name: BusName) -> Self {
        Self { name }
    }

    pub(crate) fn rule(&self) -> SignalRule {
        SignalRule {
            sender: Some(DBUS_SERVICE.to_string()),
            interface: Some(DBUS_INTERFACE.to_string()),
            member: Some(NAME_OWNER_CHANGED.to_string()),
            path: Some(DBUS_PATH.to_string()),
            arg0: Some(self.name.as_str().to_string()),
        }
    }

    /// Extracts the owner change from `signal`.
    ///
    /// The subscription rule should already exclude everything rejected
    /// here; the checks hold even if the connection filters loosely.
    pub(crate) fn parse(
        &self,
        signal: &Signal,
    ) -> Option<OwnerChange> {
        if signal.sender.as_deref() != Some(DBUS_SERVICE)
            || signal.path != DBUS_PATH
            || signal.interface != DBUS_INTERFACE
            || signal.member != NAME_OWNER_CHANGED
        {
            trace!(?signal, "Ignoring signal not emitted by the directory service");
            return None;
        }

        let [Value::Str(name), Value::Str(old_owner), Value::Str(new_owner)] = signal.args.as_slice() else {
            trace!(args = ?signal.args, "Ignoring NameOwnerChanged with unexpected arguments");
            return None;
        };

        if *name != self.name.as_str() {
            trace!(expected = %self.name, got = %name, "Ignoring NameOwnerChanged for another name");
            return None;
        }

        Some(OwnerChange {
            name: name.clone(),
            old_owner: old_owner.clone(),
            new_owner: new_owner.clone(),
        })
    }

    /// Subscribes on `connection`, forwarding changes to `watch` for as long
    /// as it is alive.
    pub(crate) fn subscribe(
        &self,
        connection: &Arc<dyn BusConnection>,
        watch: Weak<Watch>,
    ) -> SubscriptionId {
        let listener = self.clone();
        connection.subscribe_signal(
            self.rule(),
            Arc::new(move |signal: &Signal| {
                let Some(change) = listener.parse(signal) else {
                    return;
                };
                if let Some(watch) = watch.upgrade() {
                    watch.handle_owner_change(change);
                }
            }),
        )
    }
}
