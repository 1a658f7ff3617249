//! Boundary to the bus transport.
//!
//! Name watching never speaks the wire protocol itself. Everything it needs
//! from a connection is captured by [`BusConnection`]: method calls
//! answered through reply handlers, filtered signal subscriptions and a
//! notification when the connection closes. [`BusProvider`] hands out shared connections for a
//! [`BusType`]. Transport crates implement both traits.
mod message;
mod name;

pub use message::*;
pub use name::*;


use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Which shared bus a connection is requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    /// The per-login-session bus
    Session,
    /// The system-wide bus
    System,
    /// The bus that activated this process
    Starter,
}

impl fmt::Display for BusType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let kind = match self {
            BusType::Session => "session",
            BusType::System => "system",
            BusType::Starter => "starter",
        };
        f.write_str(kind)
    }
}

/// Identifies a signal subscription on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Identifies a closed-notification handler on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClosedHandlerId(pub u64);

/// Invoked by the connection for every signal matching a subscription rule
pub type SignalHandler = Arc<dyn Fn(&Signal) + Send + Sync>;

/// Invoked by the connection once, when it closes
pub type ClosedHandler = Arc<dyn Fn() + Send + Sync>;

/// Invoked by the connection once, with the reply body or the failure
pub type ReplyHandler = Box<dyn FnOnce(Result<Vec<Value>>) + Send>;

/// A connection to a message bus.
///
/// Reply handlers and signal handlers of one connection are dispatched one
/// at a time, in the order the messages arrived: a signal received after a
/// method reply is never handed out before that reply's handler returned.
/// Handlers may run on any thread, and must be free to issue further calls
/// or to invoke `unsubscribe_signal`/`disconnect_closed`.
#[cfg_attr(test, automock)]
pub trait BusConnection: Send + Sync + 'static {
    /// Sends a method call; `on_reply` runs exactly once with the reply body.
    ///
    /// # Errors
    /// `on_reply` receives
    /// - [`crate::BusError::MethodError`] when the peer answers with an error reply
    /// - [`crate::BusError::Closed`] when the connection is gone
    /// - [`crate::BusError::Timeout`] when `call.timeout` elapses first
    fn call(
        &self,
        call: MethodCall,
        on_reply: ReplyHandler,
    );

    /// Routes every signal matching `rule` to `handler` until unsubscribed.
    fn subscribe_signal(
        &self,
        rule: SignalRule,
        handler: SignalHandler,
    ) -> SubscriptionId;

    fn unsubscribe_signal(
        &self,
        id: SubscriptionId,
    );

    /// Registers `handler` to run when the connection closes.
    fn connect_closed(
        &self,
        handler: ClosedHandler,
    ) -> ClosedHandlerId;

    fn disconnect_closed(
        &self,
        id: ClosedHandlerId,
    );

    fn is_closed(&self) -> bool;
}

/// Source of shared bus connections.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BusProvider: Send + Sync + 'static {
    /// Resolves with the shared connection for `bus_type`, connecting first
    /// if necessary.
    async fn get(
        &self,
        bus_type: BusType,
    ) -> Result<Arc<dyn BusConnection>>;
}
