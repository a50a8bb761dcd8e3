//! Core of the dbtest harness: keyed records, idempotent persistence and
//! startup seeding over the secdb and appdb schemas.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{load_config, write_default_config, ConfigError, ConfigOverrides, HarnessConfig};
pub use db::{open_db, open_db_in_memory, DbError, Propagation, Schema};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::address::{AddressLines, AddressRecord};
pub use model::key_hash::KeyHash;
pub use model::session::{SessionRecord, SessionState};
pub use model::user::{ManagerProfile, UserKind, UserRecord};
pub use model::{AuditStamp, EntityKind, EntityRecord};
pub use repo::{RepoError, RepoResult};
pub use service::seed::{run_startup_seeding, SeedEvent, SeedReport, SeedRun};
pub use service::{ServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
