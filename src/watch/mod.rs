//! Watching the owner of a bus name
//!
//! # Architecture
//!
//! ```text
//! NameWatcher::watch_name()
//!   └─> WatchRegistry::register()       id assignment + map insert
//!   └─> binder::acquire() / bind()      connection, closed handler
//!         ├─> OwnerChangeListener       NameOwnerChanged subscription
//!         └─> OwnerResolver             StartServiceByName? + GetNameOwner
//!               └─> Watch               state machine, previous-call tracking
//!                     └─> Dispatcher    inline or queued on the caller's context
//! ```
//!
//! # Guarantees
//!
//! - After a successful registration exactly one of appeared/vanished
//!   eventually fires, unless the watch is stopped first
//! - Appeared and vanished strictly alternate for a single watch
//! - Nothing is delivered once the watch has been stopped
//!
//! # Lifetime
//!
//! A watch is shared (`Arc`) by its registry entry and every in-flight
//! operation. Stopping it drops the registry's reference; in-flight
//! operations run to completion without delivering, and the last one to
//! finish tears the watch down: unsubscribe, then release the connection.
mod binder;
mod dispatcher;
mod handlers;
mod listener;
mod registry;
mod resolver;
mod state_machine;

pub(crate) use binder::*;
pub(crate) use dispatcher::CallType;
pub(crate) use dispatcher::Dispatcher;
pub(crate) use dispatcher::Notification;
pub use handlers::*;
pub(crate) use listener::*;
pub use registry::WatcherId;
pub(crate) use registry::WatchRegistry;
pub(crate) use resolver::*;
pub(crate) use state_machine::*;

#[cfg(test)]
mod registry_test;
#[cfg(test)]
mod state_machine_test;
