//! Manager use-case service.
//!
//! # Responsibility
//! - Create/update managers through the keyed protocol.
//! - Resolve and validate the parent-department hierarchy.
//!
//! # Invariants
//! - Only `UserKind::Manager` records are accepted or returned.
//! - `parent_department`, when set, resolves to a stored manager.
//! - The parent-department chain never loops.

use crate::model::field::ArgRef;
use crate::model::key_hash::KeyHash;
use crate::model::user::UserRecord;
use crate::model::{EntityKind, EntityRecord};
use crate::repo::user_repo::UserStore;
use crate::service::protocol::{create_idempotent, update_existing};
use crate::service::{persistence, RelationRole, ServiceError, ServiceResult};
use std::collections::HashSet;

/// Use-case service for managers over user storage.
pub struct ManagerService<R: UserStore> {
    repo: R,
}

impl<R: UserStore> ManagerService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Looks up a manager. Base users under `key` read as absent.
    pub fn find(&self, key: &KeyHash) -> ServiceResult<Option<UserRecord>> {
        if key.is_null() {
            return Ok(None);
        }
        let found = self
            .repo
            .find(key)
            .map_err(persistence(EntityKind::Manager, "find"))?;
        Ok(found.filter(UserRecord::is_manager))
    }

    pub fn find_by_username(&self, username: &str) -> ServiceResult<Option<UserRecord>> {
        if username.trim().is_empty() {
            return Ok(None);
        }
        let found = self
            .repo
            .find_by_username(username)
            .map_err(persistence(EntityKind::Manager, "findByUsername"))?;
        Ok(found.filter(UserRecord::is_manager))
    }

    pub fn find_by_email(&self, email: &str) -> ServiceResult<Vec<UserRecord>> {
        if email.trim().is_empty() {
            return Ok(Vec::new());
        }
        let found = self
            .repo
            .find_by_email(email)
            .map_err(persistence(EntityKind::Manager, "findByEmail"))?;
        Ok(only_managers(found))
    }

    pub fn find_by_member_department_code(&self, code: &str) -> ServiceResult<Vec<UserRecord>> {
        if code.trim().is_empty() {
            return Ok(Vec::new());
        }
        let found = self
            .repo
            .find_by_member_department_code(code)
            .map_err(persistence(EntityKind::Manager, "findByMemberDepartmentCode"))?;
        Ok(only_managers(found))
    }

    pub fn find_by_department_code(&self, code: &str) -> ServiceResult<Option<UserRecord>> {
        if code.trim().is_empty() {
            return Ok(None);
        }
        self.repo
            .find_by_department_code(code)
            .map_err(persistence(EntityKind::Manager, "findByDepartmentCode"))
    }

    /// Managers whose parent department is `parent`.
    pub fn find_child_departments(&self, parent: &KeyHash) -> ServiceResult<Vec<UserRecord>> {
        if parent.is_null() {
            return Ok(Vec::new());
        }
        self.repo
            .find_child_departments(parent)
            .map_err(persistence(EntityKind::Manager, "findChildDepartments"))
    }

    /// Idempotent manager create.
    ///
    /// # Errors
    /// - `InvalidArgument` when `candidate` is not a manager.
    /// - `UnresolvedRelation` when the parent department is unknown.
    /// - `HierarchyCycle` when the parent chain would loop.
    pub fn create(&self, candidate: &mut UserRecord) -> ServiceResult<UserRecord> {
        require_manager(candidate, "create")?;
        let stored = create_idempotent(&self.repo, candidate, |record| {
            validate_manager_relations(&self.repo, record, "create")
        })?;
        // The key may already hold a base user.
        require_manager(&stored, "create")?;
        Ok(stored)
    }

    /// Copies user and manager profile fields onto the stored manager.
    pub fn update(&self, candidate: &UserRecord) -> ServiceResult<UserRecord> {
        require_manager(candidate, "update")?;
        update_existing(
            &self.repo,
            candidate,
            |record| validate_manager_relations(&self.repo, record, "update"),
            |existing, candidate| {
                require_manager(existing, "update")?;
                existing.absorb_manager_fields(candidate);
                Ok(())
            },
        )
    }
}

fn only_managers(records: Vec<UserRecord>) -> Vec<UserRecord> {
    records.into_iter().filter(UserRecord::is_manager).collect()
}

fn require_manager(record: &UserRecord, operation: &'static str) -> ServiceResult<()> {
    if record.is_manager() {
        return Ok(());
    }
    Err(ServiceError::InvalidArgument {
        arg: ArgRef::new(EntityKind::Manager, operation, 1, "data"),
        reason: format!("user {} is not a manager", record.key()),
    })
}

/// Checks the parent department of a manager record; base users pass.
pub(crate) fn validate_manager_relations<R: UserStore>(
    repo: &R,
    record: &UserRecord,
    operation: &'static str,
) -> ServiceResult<()> {
    let Some(parent) = record.manager().and_then(|profile| profile.parent_department()) else {
        return Ok(());
    };

    let unresolved = || ServiceError::UnresolvedRelation {
        entity: EntityKind::Manager,
        operation,
        role: RelationRole::Lookup,
        field: "parentDepartment",
        target: EntityKind::Manager,
        key: parent,
    };
    let resolved = repo
        .find(&parent)
        .map_err(persistence(EntityKind::Manager, operation))?;
    if !resolved.as_ref().is_some_and(UserRecord::is_manager) {
        return Err(unresolved());
    }

    if would_create_cycle(repo, record.key(), parent, operation)? {
        return Err(ServiceError::HierarchyCycle {
            entity: EntityKind::Manager,
            operation,
            manager: record.key(),
            parent,
        });
    }
    Ok(())
}

fn would_create_cycle<R: UserStore>(
    repo: &R,
    manager: KeyHash,
    candidate_parent: KeyHash,
    operation: &'static str,
) -> ServiceResult<bool> {
    let mut visited = HashSet::new();
    let mut cursor = Some(candidate_parent);
    while let Some(current) = cursor {
        if current == manager {
            return Ok(true);
        }
        if !visited.insert(current) {
            return Ok(true);
        }

        cursor = repo
            .find(&current)
            .map_err(persistence(EntityKind::Manager, operation))?
            .and_then(|record| record.manager().and_then(|profile| profile.parent_department()));
    }
    Ok(false)
}
