//! Redb table definitions and key encoding utilities.
//!
//! Redb requires static table names, so every logical database shares one
//! physical data table and keys are prefixed with the database name.

use redb::TableDefinition;

/// The physical table that stores all key-value pairs.
pub const DATA_TABLE: TableDefinition<'static, &[u8], &[u8]> =
    TableDefinition::new("keystone_data");

/// Database catalog: name to the commit sequence at which it was created.
pub const DATABASES_TABLE: TableDefinition<'static, &str, u64> =
    TableDefinition::new("keystone_databases");

/// Backend-wide counters.
pub const META_TABLE: TableDefinition<'static, &str, u64> = TableDefinition::new("keystone_meta");

/// Key in [`META_TABLE`] holding the last commit sequence.
pub const LAST_COMMIT_KEY: &str = "last_commit";

/// Separator byte between database name and key in the encoded key.
pub const KEY_SEPARATOR: u8 = 0x00;

/// Encode a database name and key into a physical key.
///
/// The format is `<database><separator><key>`. Database names never contain
/// the separator, so the prefix is unambiguous.
pub fn encode_key(database: &str, key: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(database.len() + 1 + key.len());
    encoded.extend_from_slice(database.as_bytes());
    encoded.push(KEY_SEPARATOR);
    encoded.extend_from_slice(key);
    encoded
}
