use dbtest_core::db::{open_db_in_memory, Schema};
use dbtest_core::repo::user_repo::SqliteUserRepository;
use dbtest_core::service::manager_service::ManagerService;
use dbtest_core::service::user_service::UserService;
use dbtest_core::service::RelationRole;
use dbtest_core::{EntityKind, EntityRecord, KeyHash, ManagerProfile, ServiceError, UserRecord};
use rusqlite::Connection;

fn managers(conn: &Connection) -> ManagerService<SqliteUserRepository<'_>> {
    ManagerService::new(SqliteUserRepository::try_new(conn).unwrap())
}

fn manager(seed: &str, dept: &str, parent: Option<KeyHash>) -> UserRecord {
    let mut profile = ManagerProfile::new(format!("Head of {dept}"), dept).unwrap();
    profile.set_parent_department(parent).unwrap();
    UserRecord::new_manager(
        KeyHash::from_seed(seed),
        seed,
        format!("{seed}@example.com"),
        profile,
    )
    .unwrap()
}

#[test]
fn create_manager_round_trips_profile() {
    let conn = open_db_in_memory(Schema::Sec).unwrap();
    let service = managers(&conn);

    let stored = service.create(&mut manager("root", "1", None)).unwrap();
    let profile = stored.manager().unwrap();
    assert_eq!(profile.title(), "Head of 1");
    assert_eq!(profile.department_code(), "1");
    assert_eq!(profile.parent_department(), None);

    let by_dept = service.find_by_department_code("1").unwrap().unwrap();
    assert_eq!(by_dept, stored);
}

#[test]
fn child_departments_are_derived_from_parent_links() {
    let conn = open_db_in_memory(Schema::Sec).unwrap();
    let service = managers(&conn);
    let root = service.create(&mut manager("root", "1", None)).unwrap();

    service
        .create(&mut manager("sales", "2", Some(root.key())))
        .unwrap();
    service
        .create(&mut manager("ops", "3", Some(root.key())))
        .unwrap();

    let mut children: Vec<String> = service
        .find_child_departments(&root.key())
        .unwrap()
        .iter()
        .map(|child| child.username().to_string())
        .collect();
    children.sort();
    assert_eq!(children, vec!["ops".to_string(), "sales".to_string()]);
}

#[test]
fn unknown_parent_department_is_unresolved_and_nothing_is_written() {
    let conn = open_db_in_memory(Schema::Sec).unwrap();
    let service = managers(&conn);
    let ghost = KeyHash::from_seed("ghost");

    let err = service
        .create(&mut manager("orphan", "9", Some(ghost)))
        .unwrap_err();
    match err {
        ServiceError::UnresolvedRelation {
            role,
            field,
            target,
            key,
            ..
        } => {
            assert_eq!(role, RelationRole::Lookup);
            assert_eq!(field, "parentDepartment");
            assert_eq!(target, EntityKind::Manager);
            assert_eq!(key, ghost);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(service.find(&KeyHash::from_seed("orphan")).unwrap().is_none());
}

#[test]
fn parent_department_must_be_a_manager() {
    let conn = open_db_in_memory(Schema::Sec).unwrap();
    let users = UserService::new(SqliteUserRepository::try_new(&conn).unwrap());
    let service = managers(&conn);
    let plain = users
        .create(&mut UserRecord::new(KeyHash::from_seed("plain"), "plain", "p@example.com").unwrap())
        .unwrap();

    let err = service
        .create(&mut manager("boss", "5", Some(plain.key())))
        .unwrap_err();
    assert!(matches!(err, ServiceError::UnresolvedRelation { .. }));
}

#[test]
fn update_rejects_parent_chain_cycle() {
    let conn = open_db_in_memory(Schema::Sec).unwrap();
    let service = managers(&conn);
    let root = service.create(&mut manager("root", "1", None)).unwrap();
    let child = service
        .create(&mut manager("child", "2", Some(root.key())))
        .unwrap();

    let mut change = root.clone();
    change
        .manager_mut()
        .unwrap()
        .set_parent_department(Some(child.key()))
        .unwrap();

    match service.update(&change).unwrap_err() {
        ServiceError::HierarchyCycle {
            entity,
            operation,
            manager,
            parent,
        } => {
            assert_eq!(entity, EntityKind::Manager);
            assert_eq!(operation, "update");
            assert_eq!(manager, root.key());
            assert_eq!(parent, child.key());
        }
        other => panic!("unexpected error: {other}"),
    }
    let reloaded = service.find(&root.key()).unwrap().unwrap();
    assert_eq!(reloaded.manager().unwrap().parent_department(), None);
}

#[test]
fn update_changes_profile_fields() {
    let conn = open_db_in_memory(Schema::Sec).unwrap();
    let service = managers(&conn);
    let stored = service.create(&mut manager("root", "1", None)).unwrap();

    let mut change = stored.clone();
    change
        .manager_mut()
        .unwrap()
        .set_title("System Administration")
        .unwrap();

    let updated = service.update(&change).unwrap();
    assert_eq!(updated.manager().unwrap().title(), "System Administration");
    assert_eq!(updated.audit.created_at, stored.audit.created_at);
}

#[test]
fn manager_service_rejects_and_hides_base_users() {
    let conn = open_db_in_memory(Schema::Sec).unwrap();
    let users = UserService::new(SqliteUserRepository::try_new(&conn).unwrap());
    let service = managers(&conn);
    let key = KeyHash::from_seed("plain");

    let mut plain = UserRecord::new(key, "plain", "p@example.com").unwrap();
    let err = service.create(&mut plain).unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument { .. }));

    users.create(&mut plain).unwrap();
    assert!(service.find(&key).unwrap().is_none());
    assert!(service.find_by_username("plain").unwrap().is_none());
    assert!(service.find_by_email("p@example.com").unwrap().is_empty());
    assert!(users.find(&key).unwrap().is_some());
}

#[test]
fn user_service_update_keeps_manager_profile() {
    let conn = open_db_in_memory(Schema::Sec).unwrap();
    let users = UserService::new(SqliteUserRepository::try_new(&conn).unwrap());
    let service = managers(&conn);
    let stored = service.create(&mut manager("root", "1", None)).unwrap();

    let mut change = stored.clone();
    change.set_email("root@corp.example.com").unwrap();
    change
        .manager_mut()
        .unwrap()
        .set_title("Ignored Title")
        .unwrap();

    let updated = users.update(&change).unwrap();
    assert_eq!(updated.email(), "root@corp.example.com");
    assert_eq!(updated.manager().unwrap().title(), "Head of 1");
}

#[test]
fn duplicate_department_code_is_a_persistence_failure() {
    let conn = open_db_in_memory(Schema::Sec).unwrap();
    let service = managers(&conn);
    service.create(&mut manager("first", "1", None)).unwrap();

    let err = service
        .create(&mut manager("second", "1", None))
        .unwrap_err();
    assert!(err.is_persistence_failure(), "unexpected error: {err}");
    assert!(service.find(&KeyHash::from_seed("second")).unwrap().is_none());
}
