//! Persisted record kinds for the secdb and appdb schemas.
//!
//! # Responsibility
//! - Define canonical record structures and their bounded-field setters.
//! - Define the ordering/equality/digest contract every record honors.
//!
//! # Invariants
//! - Every record is identified by a `KeyHash`; `KeyHash::NULL` means unset.
//! - Ordering, equality and digest walk the same canonical field sequence
//!   (key first, audit stamps excluded).
//! - A rejected setter leaves the record unchanged.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub mod address;
pub mod field;
pub mod key_hash;
pub mod session;
pub mod user;

use field::FieldError;
use key_hash::KeyHash;

/// Record kind tag used in diagnostics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Manager,
    Address,
    Session,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Manager => "manager",
            Self::Address => "address",
            Self::Session => "session",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creation/update provenance carried by users, managers and addresses.
///
/// `created_at`/`updated_at` are server-stamped epoch milliseconds; callers
/// may supply `created_by`/`updated_by`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub created_at: i64,
    pub created_by: Option<KeyHash>,
    pub updated_at: i64,
    pub updated_by: Option<KeyHash>,
}

impl AuditStamp {
    /// Stamps both timestamps for a new record.
    pub fn stamp_created(&mut self, now_ms: i64) {
        self.created_at = now_ms;
        self.updated_at = now_ms;
    }

    pub fn stamp_updated(&mut self, now_ms: i64) {
        self.updated_at = now_ms;
    }

    /// Copies the caller-controlled part of an update. Creation fields stay.
    pub fn absorb_update(&mut self, candidate: &AuditStamp) {
        self.updated_by = candidate.updated_by;
    }

    pub(crate) fn validate(&self, entity: EntityKind) -> Result<(), FieldError> {
        field::optional_key(
            field::ArgRef::new(entity, "validate", 1, "createdBy"),
            self.created_by,
        )?;
        field::optional_key(
            field::ArgRef::new(entity, "validate", 1, "updatedBy"),
            self.updated_by,
        )?;
        Ok(())
    }
}

/// Contract shared by every persisted record kind.
pub trait EntityRecord: Clone + Ord {
    /// Kind used for diagnostics.
    fn kind(&self) -> EntityKind;

    /// Current key; `KeyHash::NULL` when not assigned yet.
    fn key(&self) -> KeyHash;

    /// Raw key assignment used by the create protocol, including restoring
    /// the unset state after a failed create.
    fn assign_key(&mut self, key: KeyHash);

    /// Stamps creation timestamps.
    fn stamp_created(&mut self, now_ms: i64);

    /// Stamps the update timestamp.
    fn stamp_updated(&mut self, now_ms: i64);

    /// Checks every field bound and required value.
    fn validate(&self) -> Result<(), FieldError>;

    /// Multiplicative fold over the canonical field sequence.
    fn digest(&self) -> i32;
}
