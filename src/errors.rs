//! Error hierarchy for bus name watching
//!
//! Watching is callback driven: once a watch is registered no error ever
//! reaches the caller again. The types here describe the synchronous
//! precondition failure (an invalid bus name), configuration failures and the
//! outcomes reported by the bus collaborator, which the watch turns into
//! vanished notifications or log records.

use std::time::Duration;

use config::ConfigError;

use crate::constants::ERROR_NAME_HAS_NO_OWNER;
use crate::BusType;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The name handed to a watch call is not a syntactically valid bus name
    #[error("'{name}' is not a valid bus name: {reason}")]
    InvalidBusName { name: String, reason: &'static str },

    /// Failures reported by the bus connection or provider
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The remote side answered a method call with an error reply
    #[error("{name}: {message}")]
    MethodError { name: String, message: String },

    /// The connection was closed before or while the operation ran
    #[error("Connection closed")]
    Closed,

    /// No connection to the requested bus could be established
    #[error("Failed to connect to the {bus_type} bus: {reason}")]
    ConnectFailed { bus_type: BusType, reason: String },

    /// A method call did not complete within its timeout
    #[error("Call to {member} timed out after {timeout:?}")]
    Timeout { member: String, timeout: Duration },

    /// The reply body did not have the expected signature
    #[error("Malformed reply to {member}")]
    MalformedReply { member: String },
}

impl BusError {
    /// Builds an error reply with the given D-Bus error name.
    pub fn method_error(
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        BusError::MethodError {
            name: name.into(),
            message: message.into(),
        }
    }

    /// The directory service answered that nobody owns the name.
    ///
    /// This is an expected outcome of an ownership query, not a failure.
    pub fn is_name_has_no_owner(&self) -> bool {
        matches!(self, BusError::MethodError { name, .. } if name == ERROR_NAME_HAS_NO_OWNER)
    }
}

impl Error {
    pub(crate) fn invalid_bus_name(
        name: &str,
        reason: &'static str,
    ) -> Self {
        Error::InvalidBusName {
            name: name.to_string(),
            reason,
        }
    }
}
