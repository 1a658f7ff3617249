// -
// Directory service coordinates

/// Well-known name of the bus directory service
pub const DBUS_SERVICE: &str = "org.freedesktop.DBus";
/// Object path the directory service lives at
pub const DBUS_PATH: &str = "/org/freedesktop/DBus";
/// Interface implemented by the directory service
pub const DBUS_INTERFACE: &str = "org.freedesktop.DBus";

// -
// Directory service members

pub const GET_NAME_OWNER: &str = "GetNameOwner";
pub const START_SERVICE_BY_NAME: &str = "StartServiceByName";
pub const NAME_OWNER_CHANGED: &str = "NameOwnerChanged";

/// Error name returned by `GetNameOwner` for a name nobody owns
pub const ERROR_NAME_HAS_NO_OWNER: &str = "org.freedesktop.DBus.Error.NameHasNoOwner";
/// Error name returned by `StartServiceByName` when no service file provides the name
pub const ERROR_SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";

/// `StartServiceByName` reply: the service was started
pub const START_REPLY_SUCCESS: u32 = 1;
/// `StartServiceByName` reply: the name already had an owner
pub const START_REPLY_ALREADY_RUNNING: u32 = 2;
/// Flags passed to `StartServiceByName`; the bus defines none
pub(crate) const START_SERVICE_FLAGS: u32 = 0;

/// Maximum length of any bus name
pub(crate) const MAX_NAME_LEN: usize = 255;
