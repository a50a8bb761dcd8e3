use dbtest_core::db::{DbError, Propagation};
use dbtest_core::repo::user_repo::UserStore;
use dbtest_core::repo::{RecordStore, RepoError, RepoResult};
use dbtest_core::service::user_service::UserService;
use dbtest_core::{EntityKind, EntityRecord, KeyHash, ServiceError, UserRecord};

/// In-memory store whose insert always loses a uniqueness race.
struct RacingStore {
    winner: Option<UserRecord>,
    begin_fails: bool,
}

impl RacingStore {
    fn new(winner: Option<UserRecord>) -> Self {
        Self {
            winner,
            begin_fails: false,
        }
    }
}

impl RecordStore for RacingStore {
    type Record = UserRecord;

    fn find(&self, _key: &KeyHash) -> RepoResult<Option<UserRecord>> {
        Ok(self.winner.clone())
    }

    fn exists(&self, _key: &KeyHash) -> RepoResult<bool> {
        Ok(false)
    }

    fn insert(&self, _record: &UserRecord) -> RepoResult<()> {
        Err(RepoError::Constraint {
            entity: EntityKind::User,
            message: "UNIQUE constraint failed: sec_user.pid".to_string(),
        })
    }

    fn update(&self, _record: &UserRecord) -> RepoResult<()> {
        Ok(())
    }

    fn transactional<T, E, F>(&self, _propagation: Propagation, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<DbError>,
    {
        if self.begin_fails {
            return Err(E::from(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows)));
        }
        op()
    }
}

impl UserStore for RacingStore {
    fn find_by_username(&self, _username: &str) -> RepoResult<Option<UserRecord>> {
        Ok(None)
    }

    fn find_by_email(&self, _email: &str) -> RepoResult<Vec<UserRecord>> {
        Ok(Vec::new())
    }

    fn find_by_member_department_code(&self, _code: &str) -> RepoResult<Vec<UserRecord>> {
        Ok(Vec::new())
    }

    fn find_by_department_code(&self, _code: &str) -> RepoResult<Option<UserRecord>> {
        Ok(None)
    }

    fn find_child_departments(&self, _parent: &KeyHash) -> RepoResult<Vec<UserRecord>> {
        Ok(Vec::new())
    }
}

#[test]
fn constraint_on_insert_returns_row_stored_by_the_winner() {
    let key = KeyHash::from_seed("k1");
    let mut winner = UserRecord::new(key, "admin", "root").unwrap();
    winner.audit.created_at = 7;
    let users = UserService::new(RacingStore::new(Some(winner.clone())));

    let mut candidate = UserRecord::new(key, "admin", "other@example.com").unwrap();
    let stored = users.create(&mut candidate).unwrap();

    assert_eq!(stored, winner);
    assert_eq!(stored.email(), "root");
    assert_eq!(stored.audit.created_at, 7);
}

#[test]
fn constraint_without_stored_row_is_persistence_failure() {
    let users = UserService::new(RacingStore::new(None));

    let mut candidate = UserRecord::new(KeyHash::NULL, "admin", "root").unwrap();
    let err = users.create(&mut candidate).unwrap_err();

    match &err {
        ServiceError::PersistenceFailure {
            entity,
            operation,
            source,
        } => {
            assert_eq!(*entity, EntityKind::User);
            assert_eq!(*operation, "create");
            assert!(source.is_constraint());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_persistence_failure());
    assert!(candidate.key().is_null());
}

#[test]
fn failed_transaction_begin_names_entity_and_operation() {
    let store = RacingStore {
        begin_fails: true,
        ..RacingStore::new(None)
    };
    let users = UserService::new(store);

    let mut candidate = UserRecord::new(KeyHash::NULL, "admin", "root").unwrap();
    let err = users.create(&mut candidate).unwrap_err();

    match &err {
        ServiceError::Transaction {
            entity, operation, ..
        } => {
            assert_eq!(*entity, EntityKind::User);
            assert_eq!(*operation, "create");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("user.create: transaction failed"));
    assert!(err.is_persistence_failure());
    assert!(candidate.key().is_null());
}
