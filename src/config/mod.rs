//! Configuration for name watching.
//!
//! Values are layered, later sources overriding earlier ones:
//! 1. Default values (hardcoded)
//! 2. Configuration file named by `CONFIG_PATH`
//! 3. Environment variables prefixed with `BUSWATCH__` (highest priority)

use std::env;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Tunables shared by every watch a [`crate::NameWatcher`] starts
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Timeout applied to `GetNameOwner` and `StartServiceByName` calls
    /// (unit: milliseconds)
    ///
    /// **Default**: 25000, the bus's default method call timeout
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl WatcherConfig {
    /// Loads configuration from defaults, `CONFIG_PATH` and the environment.
    ///
    /// # Note
    /// This method does NOT validate the configuration; call `validate()`
    /// once all overrides are applied.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("BUSWATCH__CALL_TIMEOUT_MS", "5000");
    /// let cfg = WatcherConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(environment());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Merges the file at `path` over the current values, then re-applies the
    /// environment so it keeps the highest priority.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path).required(true))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Checks value ranges, returning the configuration on success.
    pub fn validate(self) -> Result<Self> {
        if self.call_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "call_timeout_ms must be greater than 0".into(),
            )));
        }
        Ok(self)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

fn environment() -> Environment {
    Environment::with_prefix("BUSWATCH")
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

fn default_call_timeout_ms() -> u64 {
    25_000
}
