//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the keyed `RecordStore` contract shared by every record kind.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Write paths call `EntityRecord::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Constraint violations surface as `RepoError::Constraint` so callers can
//!   tell a lost create race from transport failures.

use crate::db::migrations::latest_version;
use crate::db::{DbError, Propagation, Schema};
use crate::model::field::FieldError;
use crate::model::key_hash::KeyHash;
use crate::model::{EntityKind, EntityRecord};
use rusqlite::{Connection, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod address_repo;
pub mod session_repo;
pub mod user_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for record persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Record failed validation before write or after read.
    Validation(FieldError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Uniqueness, foreign-key or check constraint rejected a write.
    Constraint {
        entity: EntityKind,
        message: String,
    },
    /// Update targeted a key with no stored row.
    NotFound { entity: EntityKind, key: KeyHash },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        schema: Schema,
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Constraint { entity, message } => {
                write!(f, "{entity} write rejected by constraint: {message}")
            }
            Self::NotFound { entity, key } => write!(f, "{entity} not found: {key}"),
            Self::UninitializedConnection {
                schema,
                expected_version,
                actual_version,
            } => write!(
                f,
                "{schema} repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Constraint { .. } => None,
            Self::NotFound { .. } => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<FieldError> for RepoError {
    fn from(value: FieldError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl RepoError {
    /// True for constraint rejections (duplicate key, unique column, FK).
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint { .. })
    }
}

/// Durable keyed storage for one record kind.
pub trait RecordStore {
    type Record: EntityRecord;

    /// Looks up one record. Absence is `Ok(None)`.
    fn find(&self, key: &KeyHash) -> RepoResult<Option<Self::Record>>;

    fn exists(&self, key: &KeyHash) -> RepoResult<bool>;

    /// Inserts a new row. Duplicate keys surface as `RepoError::Constraint`.
    fn insert(&self, record: &Self::Record) -> RepoResult<()>;

    /// Overwrites the mutable columns of an existing row.
    fn update(&self, record: &Self::Record) -> RepoResult<()>;

    /// Runs `op` in the ambient transaction of this store's connection.
    fn transactional<T, E, F>(&self, propagation: Propagation, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<DbError>;
}

/// Maps a write failure, keeping constraint violations distinguishable.
pub(crate) fn map_write_error(entity: EntityKind, err: rusqlite::Error) -> RepoError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            RepoError::Constraint {
                entity,
                message: message.clone().unwrap_or_else(|| failure.to_string()),
            }
        }
        _ => RepoError::from(err),
    }
}

/// Checks that `conn` holds a fully migrated `schema` with `tables`.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    schema: Schema,
    tables: &[&'static str],
) -> RepoResult<()> {
    let expected_version = latest_version(schema);
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            schema,
            expected_version,
            actual_version,
        });
    }

    for table in tables {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(*table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Rejects rows whose key column decoded to the null sentinel.
pub(crate) fn non_null_key(column: &str, key: KeyHash) -> RepoResult<KeyHash> {
    if key.is_null() {
        return Err(RepoError::InvalidData(format!(
            "null key sentinel stored in {column}"
        )));
    }
    Ok(key)
}
