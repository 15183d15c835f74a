//! Service configuration.

use std::time::Duration;

/// Configuration for a [`Service`](crate::Service).
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether sessions may be opened at all.
    /// Default: true.
    pub auth_enabled: bool,

    /// Name of the reserved system database. It is always present and is
    /// not looked up in the backend catalog when opening a session.
    /// Default: `systemdb`.
    pub system_database: String,

    /// Database created at start-up for ordinary use.
    /// Default: `defaultdb`.
    pub default_database: String,

    /// Login name that is always treated as a sysadmin.
    /// Default: `immudb`.
    pub sysadmin_username: String,

    /// Close sessions that have been idle for longer than this.
    /// Default: `None` (sessions never expire).
    pub session_idle_timeout: Option<Duration>,

    /// How often the idle reaper looks for expired sessions.
    /// Default: 1 second.
    pub reaper_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_enabled: true,
            system_database: "systemdb".to_string(),
            default_database: "defaultdb".to_string(),
            sysadmin_username: "immudb".to_string(),
            session_idle_timeout: None,
            reaper_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable authentication.
    #[must_use]
    pub const fn auth_enabled(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    /// Set the system database name.
    #[must_use]
    pub fn system_database(mut self, name: impl Into<String>) -> Self {
        self.system_database = name.into();
        self
    }

    /// Set the default database name.
    #[must_use]
    pub fn default_database(mut self, name: impl Into<String>) -> Self {
        self.default_database = name.into();
        self
    }

    /// Set the built-in sysadmin login name.
    #[must_use]
    pub fn sysadmin_username(mut self, name: impl Into<String>) -> Self {
        self.sysadmin_username = name.into();
        self
    }

    /// Set the idle timeout after which sessions are closed.
    #[must_use]
    pub const fn session_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.session_idle_timeout = timeout;
        self
    }

    /// Set how often the idle reaper runs.
    #[must_use]
    pub const fn reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }
}
