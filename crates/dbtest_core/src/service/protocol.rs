//! Keyed create/update protocol shared by every record service.
//!
//! # Invariants
//! - Relation checks run inside the same ambient transaction as the write.
//! - A create never duplicates: an existing key returns the stored record.
//! - A key generated by a failed create is reset to `KeyHash::NULL`.
//! - Update never touches key or creation provenance.

use crate::db::Propagation;
use crate::model::field::ArgRef;
use crate::model::key_hash::KeyHash;
use crate::model::{EntityKind, EntityRecord};
use crate::repo::{RecordStore, RepoError};
use crate::service::{now_epoch_ms, persistence, ScopeError, ServiceError, ServiceResult};
use log::{debug, warn};

/// Idempotent create.
///
/// On success `candidate` carries the assigned key and creation stamps; the
/// returned record is the stored one, which differs from `candidate` when
/// the key already existed.
pub(crate) fn create_idempotent<S, V>(
    store: &S,
    candidate: &mut S::Record,
    validate_relations: V,
) -> ServiceResult<S::Record>
where
    S: RecordStore,
    V: FnOnce(&S::Record) -> ServiceResult<()>,
{
    let entity = candidate.kind();
    let generated = candidate.key().is_null();

    let create = || -> ServiceResult<S::Record> {
        validate_relations(candidate)?;
        if generated {
            candidate.assign_key(KeyHash::generate());
        }
        candidate.stamp_created(now_epoch_ms());
        candidate.validate()?;

        let key = candidate.key();
        if store.exists(&key).map_err(persistence(entity, "create"))? {
            debug!("event=record_create module=service status=ok entity={entity} key={key} outcome=existing");
            return read_back(store, entity, &key, "create");
        }

        match store.insert(candidate) {
            Ok(()) => {}
            Err(err) if err.is_constraint() => {
                if let Some(existing) = store.find(&key).map_err(persistence(entity, "create"))? {
                    warn!("event=record_create module=service status=ok entity={entity} key={key} outcome=lost_race");
                    return Ok(existing);
                }
                return Err(persistence(entity, "create")(err));
            }
            Err(err) => return Err(persistence(entity, "create")(err)),
        }

        debug!("event=record_create module=service status=ok entity={entity} key={key} outcome=inserted");
        read_back(store, entity, &key, "create")
    };
    let result = store
        .transactional(Propagation::Required, || {
            create().map_err(ScopeError::Service)
        })
        .map_err(|err| err.scoped(entity, "create"));

    if result.is_err() && generated {
        candidate.assign_key(KeyHash::NULL);
    }
    result
}

/// Update of an existing record.
///
/// `merge` copies the kind-specific mutable fields of the candidate onto the
/// stored record.
pub(crate) fn update_existing<S, V, M>(
    store: &S,
    candidate: &S::Record,
    validate_relations: V,
    merge: M,
) -> ServiceResult<S::Record>
where
    S: RecordStore,
    V: FnOnce(&S::Record) -> ServiceResult<()>,
    M: FnOnce(&mut S::Record, &S::Record) -> ServiceResult<()>,
{
    let entity = candidate.kind();
    let key = candidate.key();
    if key.is_null() {
        return Err(ServiceError::MissingArgument(ArgRef::new(
            entity, "update", 1, "key",
        )));
    }

    let update = || -> ServiceResult<S::Record> {
        validate_relations(candidate)?;
        let mut existing = store
            .find(&key)
            .map_err(persistence(entity, "update"))?
            .ok_or(ServiceError::NotFound {
                entity,
                operation: "update",
                key,
            })?;

        merge(&mut existing, candidate)?;
        existing.stamp_updated(now_epoch_ms());
        existing.validate()?;
        store
            .update(&existing)
            .map_err(persistence(entity, "update"))?;
        debug!("event=record_update module=service status=ok entity={entity} key={key}");
        Ok(existing)
    };
    store
        .transactional(Propagation::Required, || {
            update().map_err(ScopeError::Service)
        })
        .map_err(|err| err.scoped(entity, "update"))
}

fn read_back<S: RecordStore>(
    store: &S,
    entity: EntityKind,
    key: &KeyHash,
    operation: &'static str,
) -> ServiceResult<S::Record> {
    match store.find(key) {
        Ok(Some(record)) => Ok(record),
        Ok(None) => Err(ServiceError::PersistenceFailure {
            entity,
            operation,
            source: RepoError::InvalidData(format!("record {key} missing after write")),
        }),
        Err(err) => Err(persistence(entity, operation)(err)),
    }
}
