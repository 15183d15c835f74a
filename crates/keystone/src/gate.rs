//! Identity gate: credential checks and database permissions.
//!
//! The gate turns `(username, password, database)` into an [`Identity`] the
//! session can hold, or into the precise reason the login is refused. The
//! checks run in a fixed order so that a caller never learns more than the
//! previous check allows: credentials first, then the active flag, then the
//! database, then the grant.

use std::collections::HashMap;
use std::sync::Arc;

use keystone_core::{Identity, Permission};
use keystone_storage::DatabaseCatalog;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};

/// Source of truth for user accounts.
pub trait IdentityStore: Send + Sync {
    /// Check a username and password.
    ///
    /// Returns `Ok(None)` when the user is unknown or the password is wrong;
    /// the two cases must be indistinguishable to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityStore`] if the store itself fails.
    fn validate(&self, username: &str, password: &str) -> Result<Option<Identity>>;
}

struct UserRecord {
    password_hash: String,
    identity: Identity,
}

/// An identity store that keeps bcrypt hashes in memory.
pub struct MemoryIdentityStore {
    users: RwLock<HashMap<String, UserRecord>>,
    cost: u32,
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityStore {
    /// Create an empty store hashing with bcrypt's default cost.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cost(bcrypt::DEFAULT_COST)
    }

    /// Create an empty store with an explicit bcrypt cost.
    ///
    /// Tests use the minimum cost (4) to keep hashing fast.
    #[must_use]
    pub fn with_cost(cost: u32) -> Self {
        Self { users: RwLock::new(HashMap::new()), cost }
    }

    /// Add or replace a user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityStore`] if the password cannot be hashed.
    pub fn create_user(&self, identity: Identity, password: &str) -> Result<()> {
        let password_hash =
            bcrypt::hash(password, self.cost).map_err(|e| Error::IdentityStore(e.to_string()))?;
        let username = identity.username.clone();
        self.users.write().insert(username, UserRecord { password_hash, identity });
        Ok(())
    }

    /// Add or replace a sysadmin account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityStore`] if the password cannot be hashed.
    pub fn create_sysadmin(&self, username: &str, password: &str) -> Result<()> {
        self.create_user(Identity::new(username).sysadmin(), password)
    }

    /// Grant a permission on a database to an existing user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityStore`] if the user does not exist.
    pub fn grant(&self, username: &str, database: &str, permission: Permission) -> Result<()> {
        self.update(username, |identity| identity.grant(database, permission))
    }

    /// Remove a user's grant on a database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityStore`] if the user does not exist.
    pub fn revoke(&self, username: &str, database: &str) -> Result<()> {
        self.update(username, |identity| identity.revoke(database))
    }

    /// Activate or deactivate an account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityStore`] if the user does not exist.
    pub fn set_active(&self, username: &str, active: bool) -> Result<()> {
        self.update(username, |identity| identity.active = active)
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    /// Returns `true` if there are no accounts.
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    fn update(&self, username: &str, f: impl FnOnce(&mut Identity)) -> Result<()> {
        let mut users = self.users.write();
        let record = users
            .get_mut(username)
            .ok_or_else(|| Error::IdentityStore(format!("user {username} does not exist")))?;
        f(&mut record.identity);
        Ok(())
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn validate(&self, username: &str, password: &str) -> Result<Option<Identity>> {
        let (hash, identity) = {
            let users = self.users.read();
            match users.get(username) {
                Some(record) => (record.password_hash.clone(), record.identity.clone()),
                None => return Ok(None),
            }
        };

        let ok = bcrypt::verify(password, &hash).map_err(|e| Error::IdentityStore(e.to_string()))?;
        Ok(ok.then_some(identity))
    }
}

/// Decides whether a login may open a session on a database.
#[derive(Clone)]
pub struct IdentityGate {
    store: Arc<dyn IdentityStore>,
    catalog: Arc<dyn DatabaseCatalog>,
    auth_enabled: bool,
    system_database: String,
    sysadmin_username: String,
}

impl IdentityGate {
    /// Create a gate over a credential store and a database catalog.
    pub fn new(
        store: Arc<dyn IdentityStore>,
        catalog: Arc<dyn DatabaseCatalog>,
        auth_enabled: bool,
        system_database: impl Into<String>,
    ) -> Self {
        Self {
            store,
            catalog,
            auth_enabled,
            system_database: system_database.into(),
            sysadmin_username: String::new(),
        }
    }

    /// Treat this login name as a sysadmin regardless of its stored flags.
    #[must_use]
    pub fn with_sysadmin_username(mut self, username: impl Into<String>) -> Self {
        self.sysadmin_username = username.into();
        self
    }

    /// Returns `true` if logins are accepted at all.
    pub const fn auth_enabled(&self) -> bool {
        self.auth_enabled
    }

    /// Authenticate and authorize a login for one database.
    ///
    /// Password hashing is CPU-bound, so the store and catalog are consulted
    /// on the blocking pool.
    ///
    /// # Errors
    ///
    /// In order of precedence: [`Error::AuthDisabled`],
    /// [`Error::InvalidCredentials`], [`Error::UserInactive`],
    /// [`Error::UnknownDatabase`], [`Error::PermissionDenied`]. Store or
    /// catalog failures are reported as [`Error::IdentityStore`] and
    /// [`Error::Internal`].
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        database: &str,
    ) -> Result<Identity> {
        if !self.auth_enabled {
            return Err(Error::AuthDisabled);
        }

        let gate = self.clone();
        let (username, password, database) =
            (username.to_string(), password.to_string(), database.to_string());
        tokio::task::spawn_blocking(move || gate.authenticate_blocking(&username, &password, &database))
            .await
            .map_err(|e| Error::internal(format!("authentication task failed: {e}")))?
    }

    fn authenticate_blocking(&self, username: &str, password: &str, database: &str) -> Result<Identity> {
        let Some(mut identity) = self.store.validate(username, password)? else {
            debug!(username, "invalid credentials");
            return Err(Error::InvalidCredentials);
        };

        if !self.sysadmin_username.is_empty() && identity.username == self.sysadmin_username {
            identity.is_sysadmin = true;
        }

        if !identity.active {
            debug!(username, "inactive user refused");
            return Err(Error::UserInactive);
        }

        if database != self.system_database {
            let exists = self
                .catalog
                .database_exists(database)
                .map_err(|e| Error::internal(format!("database catalog: {e}")))?;
            if !exists {
                return Err(Error::UnknownDatabase { database: database.to_string() });
            }
        }

        if !identity.can_access(database) {
            debug!(username, database, "no grant on database");
            return Err(Error::PermissionDenied { database: database.to_string() });
        }

        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use keystone_storage::backends::MemoryBackend;

    use super::*;

    const TEST_COST: u32 = 4;

    fn create_test_gate(auth_enabled: bool) -> (Arc<MemoryIdentityStore>, IdentityGate) {
        let store = Arc::new(MemoryIdentityStore::with_cost(TEST_COST));
        store.create_sysadmin("admin", "admin-pw").expect("create admin");
        store
            .create_user(Identity::new("alice").with_grant("sales", Permission::Read), "alice-pw")
            .expect("create alice");

        let catalog = Arc::new(MemoryBackend::with_databases(["sales", "hr"]).expect("backend"));
        let gate = IdentityGate::new(store.clone(), catalog, auth_enabled, "systemdb")
            .with_sysadmin_username("immudb");
        (store, gate)
    }

    #[tokio::test]
    async fn test_auth_disabled_regardless_of_credentials() {
        let (_, gate) = create_test_gate(false);

        for (user, pw) in [("admin", "admin-pw"), ("nobody", "x"), ("", "")] {
            let err = gate.authenticate(user, pw, "sales").await.unwrap_err();
            assert!(matches!(err, Error::AuthDisabled));
        }
    }

    #[tokio::test]
    async fn test_unknown_user_and_wrong_password_look_alike() {
        let (_, gate) = create_test_gate(true);

        let unknown = gate.authenticate("mallory", "pw", "sales").await.unwrap_err();
        let wrong = gate.authenticate("alice", "nope", "sales").await.unwrap_err();
        assert!(matches!(unknown, Error::InvalidCredentials));
        assert!(matches!(wrong, Error::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn test_inactive_user() {
        let (store, gate) = create_test_gate(true);
        store.set_active("alice", false).expect("deactivate");

        let err = gate.authenticate("alice", "alice-pw", "sales").await.unwrap_err();
        assert!(matches!(err, Error::UserInactive));
    }

    #[tokio::test]
    async fn test_database_checks() {
        let (store, gate) = create_test_gate(true);

        let err = gate.authenticate("alice", "alice-pw", "missing").await.unwrap_err();
        assert!(matches!(err, Error::UnknownDatabase { ref database } if database == "missing"));

        let err = gate.authenticate("alice", "alice-pw", "hr").await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { ref database } if database == "hr"));

        let identity = gate.authenticate("alice", "alice-pw", "sales").await.expect("granted");
        assert_eq!(identity.permission("sales"), Some(Permission::Read));
        // Any grant opens the database.
        store.grant("alice", "hr", Permission::Admin).expect("grant");
        gate.authenticate("alice", "alice-pw", "hr").await.expect("admin grant");
    }

    #[tokio::test]
    async fn test_sysadmin_reaches_every_database() {
        let (_, gate) = create_test_gate(true);

        for db in ["sales", "hr", "systemdb"] {
            let identity = gate.authenticate("admin", "admin-pw", db).await.expect("sysadmin");
            assert!(identity.is_sysadmin);
        }
    }

    #[tokio::test]
    async fn test_builtin_sysadmin_name() {
        let (store, gate) = create_test_gate(true);
        store.create_user(Identity::new("immudb"), "immudb").expect("create");

        let identity = gate.authenticate("immudb", "immudb", "hr").await.expect("sysadmin by name");
        assert!(identity.is_sysadmin);
    }

    #[tokio::test]
    async fn test_system_database_needs_grant() {
        let (_, gate) = create_test_gate(true);

        let err = gate.authenticate("alice", "alice-pw", "systemdb").await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
    }
}
