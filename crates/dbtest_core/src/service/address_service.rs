//! Address use-case service.
//!
//! # Invariants
//! - An address's `refUID` resolves to a stored user before any write.
//! - Owner lookup goes through `UserService`, so the address store never
//!   reads secdb tables directly.

use crate::model::address::AddressRecord;
use crate::model::key_hash::KeyHash;
use crate::model::user::UserRecord;
use crate::model::{EntityKind, EntityRecord};
use crate::repo::address_repo::AddressStore;
use crate::repo::user_repo::UserStore;
use crate::service::protocol::{create_idempotent, update_existing};
use crate::service::user_service::UserService;
use crate::service::{persistence, RelationRole, ServiceError, ServiceResult};

/// Use-case service for addresses; resolves owners through `users`.
pub struct AddressService<A: AddressStore, U: UserStore> {
    repo: A,
    users: UserService<U>,
}

impl<A: AddressStore, U: UserStore> AddressService<A, U> {
    pub fn new(repo: A, users: UserService<U>) -> Self {
        Self { repo, users }
    }

    pub fn find(&self, key: &KeyHash) -> ServiceResult<Option<AddressRecord>> {
        if key.is_null() {
            return Ok(None);
        }
        self.repo
            .find(key)
            .map_err(persistence(EntityKind::Address, "find"))
    }

    /// Addresses owned by `owner`, ordered by name.
    pub fn find_by_owner(&self, owner: &KeyHash) -> ServiceResult<Vec<AddressRecord>> {
        if owner.is_null() {
            return Ok(Vec::new());
        }
        self.repo
            .find_by_owner(owner)
            .map_err(persistence(EntityKind::Address, "findByRefUID"))
    }

    pub fn find_by_user(&self, user: &UserRecord) -> ServiceResult<Vec<AddressRecord>> {
        self.find_by_owner(&user.key())
    }

    pub fn find_by_owner_and_name(
        &self,
        owner: &KeyHash,
        name: &str,
    ) -> ServiceResult<Option<AddressRecord>> {
        if owner.is_null() || name.is_empty() {
            return Ok(None);
        }
        self.repo
            .find_by_owner_and_name(owner, name)
            .map_err(persistence(EntityKind::Address, "findByRefUIDName"))
    }

    pub fn find_by_user_and_name(
        &self,
        user: &UserRecord,
        name: &str,
    ) -> ServiceResult<Option<AddressRecord>> {
        self.find_by_owner_and_name(&user.key(), name)
    }

    /// Idempotent create.
    ///
    /// # Errors
    /// - `UnresolvedRelation` (role `Parent`, field `refUID`) when the owner
    ///   is not a stored user; nothing is written.
    pub fn create(&self, candidate: &mut AddressRecord) -> ServiceResult<AddressRecord> {
        create_idempotent(&self.repo, candidate, |record| {
            self.resolve_owner(record, "create")
        })
    }

    /// Copies owner, name, every address line and `updated_by`.
    pub fn update(&self, candidate: &AddressRecord) -> ServiceResult<AddressRecord> {
        update_existing(
            &self.repo,
            candidate,
            |record| self.resolve_owner(record, "update"),
            |existing, candidate| {
                existing.absorb_update(candidate);
                Ok(())
            },
        )
    }

    fn resolve_owner(&self, record: &AddressRecord, operation: &'static str) -> ServiceResult<()> {
        let owner = record.owner();
        match self.users.find(&owner)? {
            Some(_) => Ok(()),
            None => Err(ServiceError::UnresolvedRelation {
                entity: EntityKind::Address,
                operation,
                role: RelationRole::Parent,
                field: "refUID",
                target: EntityKind::User,
                key: owner,
            }),
        }
    }
}
