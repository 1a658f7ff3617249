//! # bus-watch
//!
//! Track whether a name on a message bus currently has an owner.
//!
//! A caller registers interest in a bus name and receives alternating
//! *appeared* / *vanished* callbacks, without managing the bus connection,
//! the asynchronous resolution protocol or cross-thread delivery:
//!
//! - the connection is acquired from a [`BusProvider`] (or supplied by the caller)
//! - the current owner is resolved with `GetNameOwner`, optionally preceded by
//!   `StartServiceByName`
//! - `NameOwnerChanged` broadcasts keep the watch current
//! - callbacks run on the [`SchedulingContext`] captured when the watch started
//!
//! The bus transport itself is not part of this crate; it plugs in through
//! the [`BusConnection`] and [`BusProvider`] traits.
//!
//! ## Key Types
//!
//! - [`NameWatcher`] - start and stop watches
//! - [`WatchHandlers`] - appeared/vanished callbacks
//! - [`WatcherConfig`] - layered configuration
//! - [`LoopContext`] / [`EventLoop`] - serial delivery context

mod bus;
pub mod config;
pub mod constants;
mod context;
mod errors;
mod watch;
mod watcher;

pub use bus::*;
pub use self::config::*;
pub use context::*;
pub use errors::*;
pub use watch::NameAppearedHandler;
pub use watch::NameVanishedHandler;
pub use watch::WatchFlags;
pub use watch::WatchHandlers;
pub use watch::WatcherId;
pub use watcher::*;


#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
