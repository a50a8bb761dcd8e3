use dbtest_core::{
    AddressLines, AddressRecord, EntityRecord, KeyHash, ManagerProfile, SessionRecord, UserRecord,
};
use std::cmp::Ordering;
use std::collections::HashSet;

fn user(seed: &str) -> UserRecord {
    UserRecord::new(KeyHash::from_seed(seed), "admin", "root").unwrap()
}

#[test]
fn every_record_equals_itself() {
    let user = user("k1");
    let address = AddressRecord::new(KeyHash::from_seed("a"), user.key(), "Home").unwrap();
    let session = SessionRecord::new(KeyHash::from_seed("s"), user.key(), "login").unwrap();

    assert_eq!(user.cmp(&user), Ordering::Equal);
    assert_eq!(address.cmp(&address), Ordering::Equal);
    assert_eq!(session.cmp(&session), Ordering::Equal);
    assert_eq!(user.clone(), user);
    assert_eq!(address.digest(), address.clone().digest());
}

#[test]
fn absent_optional_field_sorts_first() {
    let without = user("k1");
    let mut with = without.clone();
    with.set_member_department_code(Some("1".to_string()))
        .unwrap();

    assert!(without < with);
    assert_ne!(without, with);

    let owner = KeyHash::from_seed("owner");
    let bare = AddressRecord::new(KeyHash::from_seed("a"), owner, "Home").unwrap();
    let with_city = bare
        .clone()
        .with_lines(AddressLines {
            city: Some("Regina".to_string()),
            ..AddressLines::default()
        })
        .unwrap();
    assert!(bare < with_city);
}

#[test]
fn audit_stamps_do_not_affect_equality_or_digest() {
    let first = user("k1");
    let mut second = first.clone();
    second.audit.created_at = 1;
    second.audit.updated_by = Some(KeyHash::from_seed("editor"));

    assert_eq!(first, second);
    assert_eq!(first.digest(), second.digest());

    let mut set = HashSet::new();
    set.insert(first);
    set.insert(second);
    assert_eq!(set.len(), 1);
}

#[test]
fn key_orders_before_other_fields() {
    let mut low = [0_u8; 32];
    low[31] = 1;
    let mut high = [0_u8; 32];
    high[0] = 1;

    let a = UserRecord::new(KeyHash::from_bytes(low), "zzz", "zzz").unwrap();
    let b = UserRecord::new(KeyHash::from_bytes(high), "aaa", "aaa").unwrap();
    assert!(a < b);
}

#[test]
fn base_user_and_manager_with_same_fields_compare_unequal() {
    let base = user("k1");
    let manager = UserRecord::new_manager(
        base.key(),
        base.username(),
        base.email(),
        ManagerProfile::new("Title", "1").unwrap(),
    )
    .unwrap();

    assert_ne!(base, manager);
    assert_eq!(base.cmp(&manager), Ordering::Less);
    assert_eq!(manager.cmp(&base), Ordering::Greater);
}

#[test]
fn session_termination_changes_ordering() {
    let mut session = SessionRecord::new(
        KeyHash::from_seed("s"),
        KeyHash::from_seed("owner"),
        "login",
    )
    .unwrap();
    let active = session.clone();
    session.terminate("logout", 5).unwrap();

    assert!(active < session);
    assert_ne!(active.digest(), session.digest());
}

#[test]
fn rejected_setter_leaves_prior_value() {
    let mut record = user("k1");
    let err = record.set_username("u".repeat(65)).unwrap_err();
    assert!(err.to_string().contains("exceeds maximum 64"));
    assert_eq!(record.username(), "admin");

    assert!(record.set_email("").is_err());
    assert_eq!(record.email(), "root");

    assert!(record.set_key(KeyHash::NULL).is_err());
    assert_eq!(record.key(), KeyHash::from_seed("k1"));
}
