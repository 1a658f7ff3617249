use std::fmt;
use std::str::FromStr;

use crate::constants::MAX_NAME_LEN;
use crate::Error;
use crate::Result;

/// A syntactically valid bus name, either well-known (`org.example.App`) or
/// unique (`:1.42`).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BusName(String);

impl BusName {
    /// Validates `name` and wraps it.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBusName`] describing the first rule `name` breaks.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate(&name).map_err(|reason| Error::invalid_bus_name(&name, reason))?;
        Ok(BusName(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unique names are assigned by the bus and start with `:`.
    pub fn is_unique(&self) -> bool {
        self.0.starts_with(':')
    }
}

/// Whether `name` is a valid well-known or unique bus name.
pub fn is_valid_bus_name(name: &str) -> bool {
    validate(name).is_ok()
}

fn validate(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("name is empty");
    }
    if name.len() > MAX_NAME_LEN {
        return Err("name is longer than 255 bytes");
    }

    let (unique, body) = match name.strip_prefix(':') {
        Some(rest) => (true, rest),
        None => (false, name),
    };

    let mut elements = 0;
    for element in body.split('.') {
        if element.is_empty() {
            return Err("name contains an empty element");
        }
        if !element.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
            return Err("name contains a character outside [A-Za-z0-9_-]");
        }
        // Unique name elements may start with a digit
        if !unique && element.as_bytes()[0].is_ascii_digit() {
            return Err("element of a well-known name starts with a digit");
        }
        elements += 1;
    }

    if elements < 2 {
        return Err("name must contain at least two elements");
    }
    Ok(())
}

impl FromStr for BusName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        BusName::new(s)
    }
}

impl TryFrom<&str> for BusName {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        BusName::new(s)
    }
}

impl AsRef<str> for BusName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for BusName {
    fn eq(
        &self,
        other: &str,
    ) -> bool {
        self.0 == other
    }
}

impl fmt::Display for BusName {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for BusName {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "BusName({:?})", self.0)
    }
}
