//! SQLite storage bootstrap, schema migration and transaction entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the secdb and appdb schemas.
//! - Apply each schema's migrations in deterministic order.
//! - Provide the ambient-transaction helper used by repositories and services.
//!
//! # Invariants
//! - Migration version is tracked per database via `PRAGMA user_version`.
//! - Each database file holds exactly one schema.
//! - Core code must not read/write records before migrations succeed.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
mod tx;

pub use open::{open_db, open_db_in_memory};
pub use tx::{run_in_transaction, Propagation};

pub type DbResult<T> = Result<T, DbError>;

/// Logical schema held by one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schema {
    /// Identity schema: users, managers, sessions.
    Sec,
    /// Application schema: addresses.
    App,
}

impl Schema {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sec => "secdb",
            Self::App => "appdb",
        }
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        schema: Schema,
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                schema,
                db_version,
                latest_supported,
            } => write!(
                f,
                "{schema} schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
