//! Resolved principals and their per-database grants.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Access level granted to a user on one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// May read keys.
    Read,
    /// May read and write keys.
    ReadWrite,
    /// May read, write and administer the database.
    Admin,
}

impl Permission {
    /// Returns `true` if this level allows writes.
    #[must_use]
    pub const fn allows_write(self) -> bool {
        matches!(self, Self::ReadWrite | Self::Admin)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::ReadWrite => "read_write",
            Self::Admin => "admin",
        };
        f.write_str(name)
    }
}

impl FromStr for Permission {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "r" | "read" => Ok(Self::Read),
            "rw" | "read_write" | "readwrite" => Ok(Self::ReadWrite),
            "admin" => Ok(Self::Admin),
            _ => Err(CoreError::UnknownPermission(s.to_string())),
        }
    }
}

/// A principal as resolved by the identity store.
///
/// Sessions hold an immutable copy taken at open time; later changes to the
/// user record do not affect sessions that are already open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Login name.
    pub username: String,
    /// Whether the account may log in.
    pub active: bool,
    /// Sysadmins have implicit full access to every database.
    pub is_sysadmin: bool,
    /// Explicit grants, keyed by database name.
    grants: BTreeMap<String, Permission>,
}

impl Identity {
    /// Create an active, non-admin identity with no grants.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into(), active: true, is_sysadmin: false, grants: BTreeMap::new() }
    }

    /// Mark this identity as a sysadmin.
    #[must_use]
    pub fn sysadmin(mut self) -> Self {
        self.is_sysadmin = true;
        self
    }

    /// Set the active flag.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Add a grant on a database, replacing any existing one.
    #[must_use]
    pub fn with_grant(mut self, database: impl Into<String>, permission: Permission) -> Self {
        self.grant(database, permission);
        self
    }

    /// Add a grant on a database, replacing any existing one.
    pub fn grant(&mut self, database: impl Into<String>, permission: Permission) {
        self.grants.insert(database.into(), permission);
    }

    /// Remove any grant on a database.
    pub fn revoke(&mut self, database: &str) {
        self.grants.remove(database);
    }

    /// The explicit grant on a database, if any.
    #[must_use]
    pub fn permission(&self, database: &str) -> Option<Permission> {
        self.grants.get(database).copied()
    }

    /// Returns `true` if the identity holds exactly this grant on the database.
    #[must_use]
    pub fn has_permission(&self, database: &str, permission: Permission) -> bool {
        self.permission(database) == Some(permission)
    }

    /// Returns `true` if the identity may open a session on the database.
    #[must_use]
    pub fn can_access(&self, database: &str) -> bool {
        self.is_sysadmin || self.permission(database).is_some()
    }

    /// Returns `true` if the identity may write to the database.
    #[must_use]
    pub fn can_write(&self, database: &str) -> bool {
        self.is_sysadmin || self.permission(database).is_some_and(Permission::allows_write)
    }

    /// Iterate over explicit grants.
    pub fn grants(&self) -> impl Iterator<Item = (&str, Permission)> {
        self.grants.iter().map(|(db, p)| (db.as_str(), *p))
    }
}
