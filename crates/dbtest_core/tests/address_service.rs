use dbtest_core::db::{open_db_in_memory, Schema};
use dbtest_core::repo::address_repo::SqliteAddressRepository;
use dbtest_core::repo::user_repo::SqliteUserRepository;
use dbtest_core::service::address_service::AddressService;
use dbtest_core::service::user_service::UserService;
use dbtest_core::service::RelationRole;
use dbtest_core::{
    AddressLines, AddressRecord, EntityKind, EntityRecord, KeyHash, ServiceError, UserRecord,
};
use rusqlite::Connection;

struct Fixture {
    sec: Connection,
    app: Connection,
}

impl Fixture {
    fn new() -> Self {
        Self {
            sec: open_db_in_memory(Schema::Sec).unwrap(),
            app: open_db_in_memory(Schema::App).unwrap(),
        }
    }

    fn users(&self) -> UserService<SqliteUserRepository<'_>> {
        UserService::new(SqliteUserRepository::try_new(&self.sec).unwrap())
    }

    fn addresses(
        &self,
    ) -> AddressService<SqliteAddressRepository<'_>, SqliteUserRepository<'_>> {
        AddressService::new(
            SqliteAddressRepository::try_new(&self.app).unwrap(),
            self.users(),
        )
    }

    fn owner(&self) -> UserRecord {
        self.users()
            .create(&mut UserRecord::new(KeyHash::from_seed("k1"), "admin", "root").unwrap())
            .unwrap()
    }

    fn address_count(&self) -> i64 {
        self.app
            .query_row("SELECT COUNT(*) FROM app_addr;", [], |row| row.get(0))
            .unwrap()
    }
}

#[test]
fn unknown_owner_is_unresolved_parent_and_store_is_unchanged() {
    let fixture = Fixture::new();
    let addresses = fixture.addresses();
    let unknown = KeyHash::from_seed("k1");

    let mut candidate = AddressRecord::new(KeyHash::NULL, unknown, "Home").unwrap();
    match addresses.create(&mut candidate).unwrap_err() {
        ServiceError::UnresolvedRelation {
            entity,
            role,
            field,
            target,
            key,
            ..
        } => {
            assert_eq!(entity, EntityKind::Address);
            assert_eq!(role, RelationRole::Parent);
            assert_eq!(role.as_str(), "Parent");
            assert_eq!(field, "refUID");
            assert_eq!(target, EntityKind::User);
            assert_eq!(key, unknown);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(candidate.key().is_null());
    assert_eq!(fixture.address_count(), 0);
}

#[test]
fn create_and_find_by_owner() {
    let fixture = Fixture::new();
    let owner = fixture.owner();
    let addresses = fixture.addresses();

    let mut work = AddressRecord::new(KeyHash::NULL, owner.key(), "Work")
        .unwrap()
        .with_lines(AddressLines {
            city: Some("Regina".to_string()),
            ..AddressLines::default()
        })
        .unwrap();
    let mut home = AddressRecord::new(KeyHash::NULL, owner.key(), "Home").unwrap();
    addresses.create(&mut work).unwrap();
    addresses.create(&mut home).unwrap();

    let names: Vec<String> = addresses
        .find_by_user(&owner)
        .unwrap()
        .iter()
        .map(|address| address.name().to_string())
        .collect();
    assert_eq!(names, vec!["Home".to_string(), "Work".to_string()]);

    let found = addresses
        .find_by_owner_and_name(&owner.key(), "Work")
        .unwrap()
        .unwrap();
    assert_eq!(found.lines().city.as_deref(), Some("Regina"));
    assert_eq!(found, addresses.find(&found.key()).unwrap().unwrap());
    assert!(addresses
        .find_by_user_and_name(&owner, "Cottage")
        .unwrap()
        .is_none());
}

#[test]
fn create_is_idempotent_by_key() {
    let fixture = Fixture::new();
    let owner = fixture.owner();
    let addresses = fixture.addresses();
    let key = KeyHash::from_seed("addr");

    let first = addresses
        .create(&mut AddressRecord::new(key, owner.key(), "Home").unwrap())
        .unwrap();
    let second = addresses
        .create(&mut AddressRecord::new(key, owner.key(), "Home").unwrap())
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(fixture.address_count(), 1);
}

#[test]
fn duplicate_owner_and_name_is_rejected() {
    let fixture = Fixture::new();
    let owner = fixture.owner();
    let addresses = fixture.addresses();

    addresses
        .create(&mut AddressRecord::new(KeyHash::NULL, owner.key(), "Home").unwrap())
        .unwrap();
    let mut duplicate = AddressRecord::new(KeyHash::NULL, owner.key(), "Home").unwrap();
    let err = addresses.create(&mut duplicate).unwrap_err();

    assert!(err.is_persistence_failure(), "unexpected error: {err}");
    assert!(duplicate.key().is_null());
    assert_eq!(fixture.address_count(), 1);
}

#[test]
fn update_replaces_lines_and_keeps_creation_stamp() {
    let fixture = Fixture::new();
    let owner = fixture.owner();
    let addresses = fixture.addresses();

    let mut candidate = AddressRecord::new(KeyHash::NULL, owner.key(), "Home")
        .unwrap()
        .with_lines(AddressLines {
            street: Some("1 First Street".to_string()),
            ..AddressLines::default()
        })
        .unwrap();
    candidate.audit.created_by = Some(owner.key());
    let created = addresses.create(&mut candidate).unwrap();

    let mut change = created.clone();
    change.set_street(None).unwrap();
    change.set_postal_code(Some("S4P 3Y2".to_string())).unwrap();
    change.audit.created_by = None;

    let updated = addresses.update(&change).unwrap();
    assert_eq!(updated.lines().street, None);
    assert_eq!(updated.lines().postal_code.as_deref(), Some("S4P 3Y2"));
    assert_eq!(updated.audit.created_at, created.audit.created_at);
    assert_eq!(updated.audit.created_by, Some(owner.key()));
    assert_eq!(addresses.find(&created.key()).unwrap().unwrap(), updated);
}

#[test]
fn over_length_setter_keeps_previous_value() {
    let fixture = Fixture::new();
    let owner = fixture.owner();

    let mut address = AddressRecord::new(KeyHash::NULL, owner.key(), "Home").unwrap();
    address.set_postal_code(Some("S4P 3Y2".to_string())).unwrap();

    let err = address
        .set_postal_code(Some("X".repeat(17)))
        .unwrap_err();
    assert!(err.to_string().contains("exceeds maximum 16"));
    assert_eq!(address.lines().postal_code.as_deref(), Some("S4P 3Y2"));
    assert!(address.set_name("N".repeat(25)).is_err());
    assert_eq!(address.name(), "Home");
}

#[test]
fn update_to_unknown_owner_is_unresolved_parent() {
    let fixture = Fixture::new();
    let owner = fixture.owner();
    let addresses = fixture.addresses();
    let created = addresses
        .create(&mut AddressRecord::new(KeyHash::NULL, owner.key(), "Home").unwrap())
        .unwrap();
    let unknown = KeyHash::from_seed("nobody");

    let moved = AddressRecord::new(created.key(), unknown, "Home").unwrap();
    match addresses.update(&moved).unwrap_err() {
        ServiceError::UnresolvedRelation {
            operation,
            role,
            field,
            key,
            ..
        } => {
            assert_eq!(operation, "update");
            assert_eq!(role, RelationRole::Parent);
            assert_eq!(field, "refUID");
            assert_eq!(key, unknown);
        }
        other => panic!("unexpected error: {other}"),
    }

    let stored = addresses.find(&created.key()).unwrap().unwrap();
    assert_eq!(stored.owner(), owner.key());
    assert_eq!(stored, created);
}
