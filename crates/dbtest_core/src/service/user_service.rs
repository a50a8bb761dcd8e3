//! User use-case service.
//!
//! # Invariants
//! - `update` copies base user fields only; a stored record's kind and
//!   manager profile are untouched here.
//! - Blank finder inputs return empty results without touching storage.

use crate::model::key_hash::KeyHash;
use crate::model::user::UserRecord;
use crate::model::EntityKind;
use crate::repo::user_repo::UserStore;
use crate::service::manager_service::validate_manager_relations;
use crate::service::protocol::{create_idempotent, update_existing};
use crate::service::{persistence, ServiceResult};

/// Use-case service wrapper for users.
pub struct UserService<R: UserStore> {
    repo: R,
}

impl<R: UserStore> UserService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Looks up a user or manager. The null key reads as absent.
    pub fn find(&self, key: &KeyHash) -> ServiceResult<Option<UserRecord>> {
        if key.is_null() {
            return Ok(None);
        }
        self.repo
            .find(key)
            .map_err(persistence(EntityKind::User, "find"))
    }

    pub fn find_by_username(&self, username: &str) -> ServiceResult<Option<UserRecord>> {
        if username.trim().is_empty() {
            return Ok(None);
        }
        self.repo
            .find_by_username(username)
            .map_err(persistence(EntityKind::User, "findByUsername"))
    }

    pub fn find_by_email(&self, email: &str) -> ServiceResult<Vec<UserRecord>> {
        if email.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.repo
            .find_by_email(email)
            .map_err(persistence(EntityKind::User, "findByEmail"))
    }

    pub fn find_by_member_department_code(&self, code: &str) -> ServiceResult<Vec<UserRecord>> {
        if code.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.repo
            .find_by_member_department_code(code)
            .map_err(persistence(EntityKind::User, "findByMemberDepartmentCode"))
    }

    /// Idempotent create. Manager candidates get their parent department
    /// validated as in `ManagerService::create`.
    pub fn create(&self, candidate: &mut UserRecord) -> ServiceResult<UserRecord> {
        create_idempotent(&self.repo, candidate, |record| {
            validate_manager_relations(&self.repo, record, "create")
        })
    }

    /// Copies username, email, member department code and `updated_by`.
    pub fn update(&self, candidate: &UserRecord) -> ServiceResult<UserRecord> {
        update_existing(
            &self.repo,
            candidate,
            |_| Ok(()),
            |existing, candidate| {
                existing.absorb_base_fields(candidate);
                Ok(())
            },
        )
    }
}
