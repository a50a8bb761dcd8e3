//! Session use-case service and lifecycle transitions.
//!
//! # Responsibility
//! - Create sessions for stored users through the keyed protocol.
//! - Apply the `Active -> Terminated` transition.
//!
//! # Invariants
//! - Creation always stores an `Active` session.
//! - Update only moves termination fields; owner and creation info are
//!   kept from the stored record.
//! - A terminated session is never modified again.

use crate::db::Propagation;
use crate::model::key_hash::KeyHash;
use crate::model::session::{SessionRecord, SessionTransitionError};
use crate::model::{EntityKind, EntityRecord};
use crate::repo::session_repo::SessionStore;
use crate::repo::user_repo::UserStore;
use crate::service::protocol::{create_idempotent, update_existing};
use crate::service::user_service::UserService;
use crate::service::{persistence, RelationRole, ScopeError, ServiceError, ServiceResult};

/// Use-case service for sessions; resolves owners through `users`.
pub struct SessionService<S: SessionStore, U: UserStore> {
    repo: S,
    users: UserService<U>,
}

impl<S: SessionStore, U: UserStore> SessionService<S, U> {
    pub fn new(repo: S, users: UserService<U>) -> Self {
        Self { repo, users }
    }

    pub fn find(&self, key: &KeyHash) -> ServiceResult<Option<SessionRecord>> {
        if key.is_null() {
            return Ok(None);
        }
        self.repo
            .find(key)
            .map_err(persistence(EntityKind::Session, "find"))
    }

    /// Sessions of `owner` in creation order.
    pub fn find_by_user(&self, owner: &KeyHash) -> ServiceResult<Vec<SessionRecord>> {
        if owner.is_null() {
            return Ok(Vec::new());
        }
        self.repo
            .find_by_user(owner)
            .map_err(persistence(EntityKind::Session, "findByUser"))
    }

    /// Idempotent create; the stored session starts `Active`.
    ///
    /// # Errors
    /// - `InvalidTransition` when the candidate carries termination fields.
    /// - `UnresolvedRelation` when the owner is not a stored user.
    pub fn create(&self, candidate: &mut SessionRecord) -> ServiceResult<SessionRecord> {
        create_idempotent(&self.repo, candidate, |record| {
            require_active(record)?;
            self.resolve_owner(record, "create")
        })
    }

    /// Applies the candidate's termination fields to the stored session.
    ///
    /// # Errors
    /// - `InvalidTransition` when the stored session is already terminated
    ///   and the candidate differs.
    /// - `MissingArgument` when only one of the termination fields is set.
    pub fn update(&self, candidate: &SessionRecord) -> ServiceResult<SessionRecord> {
        update_existing(
            &self.repo,
            candidate,
            |record| self.resolve_owner(record, "update"),
            |existing, candidate| {
                existing
                    .absorb_update(candidate)
                    .map_err(|err| transition_error(err, "update"))
            },
        )
    }

    /// Terminates the active session under `key`.
    pub fn terminate(
        &self,
        key: &KeyHash,
        reason: impl Into<String>,
        when: i64,
    ) -> ServiceResult<SessionRecord> {
        let reason = reason.into();
        self.repo
            .transactional(Propagation::Required, || -> Result<_, ScopeError> {
                let mut session = self.find(key)?.ok_or(ServiceError::NotFound {
                    entity: EntityKind::Session,
                    operation: "terminate",
                    key: *key,
                })?;
                session
                    .terminate(reason, when)
                    .map_err(|err| transition_error(err, "terminate"))?;
                Ok(self.update(&session)?)
            })
            .map_err(|err| err.scoped(EntityKind::Session, "terminate"))
    }

    fn resolve_owner(&self, record: &SessionRecord, operation: &'static str) -> ServiceResult<()> {
        let owner = record.owner();
        match self.users.find(&owner)? {
            Some(_) => Ok(()),
            None => Err(ServiceError::UnresolvedRelation {
                entity: EntityKind::Session,
                operation,
                role: RelationRole::Owner,
                field: "secUser",
                target: EntityKind::User,
                key: owner,
            }),
        }
    }
}

fn require_active(record: &SessionRecord) -> ServiceResult<()> {
    if record.terminated_at().is_none() && record.termination_info().is_none() {
        return Ok(());
    }
    Err(ServiceError::InvalidTransition {
        entity: EntityKind::Session,
        operation: "create",
        key: record.key(),
        reason: "a new session must start active".to_string(),
    })
}

fn transition_error(err: SessionTransitionError, operation: &'static str) -> ServiceError {
    match err {
        SessionTransitionError::Field(field) => field.into(),
        SessionTransitionError::AlreadyTerminated { key, terminated_at } => {
            ServiceError::InvalidTransition {
                entity: EntityKind::Session,
                operation,
                key,
                reason: format!("session already terminated at {terminated_at}"),
            }
        }
    }
}
