use std::time::Duration;

use crate::constants::DBUS_INTERFACE;
use crate::constants::DBUS_PATH;
use crate::constants::DBUS_SERVICE;

/// A single argument of a method call, reply or signal body.
///
/// Only the types the directory service protocol needs are modelled; the
/// transport maps them onto its own marshalling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    U32(u32),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::U32(_) => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            Value::Str(_) => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

/// An outgoing method call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub destination: String,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
    pub timeout: Duration,
}

impl MethodCall {
    /// Call a member of the bus directory service.
    pub fn directory(
        member: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Self {
        MethodCall {
            destination: DBUS_SERVICE.to_string(),
            path: DBUS_PATH.to_string(),
            interface: DBUS_INTERFACE.to_string(),
            member: member.to_string(),
            args,
            timeout,
        }
    }
}

/// An incoming signal as delivered by the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub sender: Option<String>,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
}

impl Signal {
    /// Signal emitted by the bus directory service.
    pub fn directory(
        member: &str,
        args: Vec<Value>,
    ) -> Self {
        Signal {
            sender: Some(DBUS_SERVICE.to_string()),
            path: DBUS_PATH.to_string(),
            interface: DBUS_INTERFACE.to_string(),
            member: member.to_string(),
            args,
        }
    }

    /// First argument, if it is a string.
    pub fn arg0(&self) -> Option<&str> {
        self.args.first().and_then(Value::as_str)
    }
}

/// Subscription filter; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalRule {
    pub sender: Option<String>,
    pub interface: Option<String>,
    pub member: Option<String>,
    pub path: Option<String>,
    pub arg0: Option<String>,
}

impl SignalRule {
    pub fn matches(
        &self,
        signal: &Signal,
    ) -> bool {
        fn field_matches(
            expected: &Option<String>,
            actual: Option<&str>,
        ) -> bool {
            expected.as_deref().map_or(true, |e| actual == Some(e))
        }

        field_matches(&self.sender, signal.sender.as_deref())
            && field_matches(&self.interface, Some(&signal.interface))
            && field_matches(&self.member, Some(&signal.member))
            && field_matches(&self.path, Some(&signal.path))
            && field_matches(&self.arg0, signal.arg0())
    }
}
