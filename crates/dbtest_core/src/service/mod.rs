//! Core use-case services.
//!
//! # Responsibility
//! - Implement the keyed create/update/find protocol for every record kind.
//! - Validate referenced records before any write commits.
//! - Drive the session lifecycle and the seeding workflow.
//!
//! # Invariants
//! - Every service write runs in exactly one ambient transaction.
//! - Plain lookups report absence as `None`; every other failure is a
//!   `ServiceError` naming entity kind and operation.

use crate::db::DbError;
use crate::model::field::{ArgRef, FieldError};
use crate::model::key_hash::KeyHash;
use crate::model::EntityKind;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod address_service;
pub mod manager_service;
mod protocol;
pub mod seed;
pub mod session_service;
pub mod user_service;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// How a referenced record relates to the record being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationRole {
    /// Containing record, e.g. the user owning an address.
    Parent,
    /// Record that owns a session.
    Owner,
    /// Plain lookup reference, e.g. a manager's parent department.
    Lookup,
}

impl RelationRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parent => "Parent",
            Self::Owner => "Owner",
            Self::Lookup => "Lookup",
        }
    }
}

impl Display for RelationRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from service operations.
#[derive(Debug)]
pub enum ServiceError {
    /// Required input absent or empty.
    MissingArgument(ArgRef),
    /// Text over its maximum length.
    ArgumentOverflow {
        arg: ArgRef,
        length: usize,
        max: usize,
    },
    /// Key operand absent where mandatory, or wrong record variant.
    InvalidArgument { arg: ArgRef, reason: String },
    /// Referenced record does not resolve.
    UnresolvedRelation {
        entity: EntityKind,
        operation: &'static str,
        role: RelationRole,
        field: &'static str,
        target: EntityKind,
        key: KeyHash,
    },
    /// Update of a key with no stored record.
    NotFound {
        entity: EntityKind,
        operation: &'static str,
        key: KeyHash,
    },
    /// Store rejected the operation.
    PersistenceFailure {
        entity: EntityKind,
        operation: &'static str,
        source: RepoError,
    },
    /// Ambient transaction could not begin or commit.
    Transaction {
        entity: EntityKind,
        operation: &'static str,
        source: DbError,
    },
    /// Parent department chain would loop back to `manager`.
    HierarchyCycle {
        entity: EntityKind,
        operation: &'static str,
        manager: KeyHash,
        parent: KeyHash,
    },
    /// Session state machine violation.
    InvalidTransition {
        entity: EntityKind,
        operation: &'static str,
        key: KeyHash,
        reason: String,
    },
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingArgument(arg) => write!(f, "{arg} is required"),
            Self::ArgumentOverflow { arg, length, max } => {
                write!(f, "{arg} length {length} exceeds maximum {max}")
            }
            Self::InvalidArgument { arg, reason } => write!(f, "{arg} is invalid: {reason}"),
            Self::UnresolvedRelation {
                entity,
                operation,
                role,
                field,
                target,
                key,
            } => write!(
                f,
                "{entity}.{operation}: {role} relation `{field}` to {target} {key} does not resolve"
            ),
            Self::NotFound {
                entity,
                operation,
                key,
            } => write!(f, "{entity}.{operation}: no record under key {key}"),
            Self::PersistenceFailure {
                entity,
                operation,
                source,
            } => write!(f, "{entity}.{operation}: persistence failed: {source}"),
            Self::Transaction {
                entity,
                operation,
                source,
            } => write!(f, "{entity}.{operation}: transaction failed: {source}"),
            Self::HierarchyCycle {
                entity,
                operation,
                manager,
                parent,
            } => write!(
                f,
                "{entity}.{operation}: manager {manager} under parent department {parent} would create a cycle"
            ),
            Self::InvalidTransition {
                entity,
                operation,
                key,
                reason,
            } => write!(f, "{entity}.{operation}: invalid transition for {key}: {reason}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::PersistenceFailure { source, .. } => Some(source),
            Self::Transaction { source, .. } => Some(source),
            Self::MissingArgument(_)
            | Self::ArgumentOverflow { .. }
            | Self::InvalidArgument { .. }
            | Self::UnresolvedRelation { .. }
            | Self::NotFound { .. }
            | Self::HierarchyCycle { .. }
            | Self::InvalidTransition { .. } => None,
        }
    }
}

impl From<FieldError> for ServiceError {
    fn from(value: FieldError) -> Self {
        match value {
            FieldError::MissingArgument(arg) => Self::MissingArgument(arg),
            FieldError::ArgumentOverflow { arg, length, max } => {
                Self::ArgumentOverflow { arg, length, max }
            }
            FieldError::InvalidArgument { arg, reason } => Self::InvalidArgument { arg, reason },
        }
    }
}

/// Failure of a transaction scope run on behalf of a service operation.
///
/// The scope itself only knows about `DbError`; `scoped` attaches the entity
/// kind and operation once the scope has returned.
#[derive(Debug)]
pub(crate) enum ScopeError {
    Db(DbError),
    Service(ServiceError),
}

impl ScopeError {
    pub(crate) fn scoped(self, entity: EntityKind, operation: &'static str) -> ServiceError {
        match self {
            Self::Db(source) => ServiceError::Transaction {
                entity,
                operation,
                source,
            },
            Self::Service(err) => err,
        }
    }
}

impl From<DbError> for ScopeError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<ServiceError> for ScopeError {
    fn from(value: ServiceError) -> Self {
        Self::Service(value)
    }
}

impl ServiceError {
    /// True when the store or the ambient transaction failed.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            Self::PersistenceFailure { .. } | Self::Transaction { .. }
        )
    }
}

/// Wraps a repository error, surfacing validation failures as field errors.
pub(crate) fn persistence(
    entity: EntityKind,
    operation: &'static str,
) -> impl FnOnce(RepoError) -> ServiceError {
    move |err| match err {
        RepoError::Validation(field) => field.into(),
        source => ServiceError::PersistenceFailure {
            entity,
            operation,
            source,
        },
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}
