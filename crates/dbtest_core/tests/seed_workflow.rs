use dbtest_core::db::{open_db, open_db_in_memory, Schema};
use dbtest_core::repo::session_repo::SqliteSessionRepository;
use dbtest_core::repo::user_repo::SqliteUserRepository;
use dbtest_core::service::seed::{admin_key, system_manager_key, RERUN_TERMINATION_INFO};
use dbtest_core::service::session_service::SessionService;
use dbtest_core::service::user_service::UserService;
use dbtest_core::{run_startup_seeding, SeedEvent, SessionState};
use rusqlite::Connection;

fn row_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
        .unwrap()
}

#[test]
fn first_run_creates_manager_admin_session_and_address() {
    let sec = open_db_in_memory(Schema::Sec).unwrap();
    let app = open_db_in_memory(Schema::App).unwrap();

    let run = run_startup_seeding(&sec, &app);
    assert!(run.is_ok(), "{run:?}");
    assert_eq!(run.reports.len(), 2);
    assert_eq!(run.reports[0].schema, Schema::Sec);
    assert_eq!(run.reports[1].schema, Schema::App);

    let sec_events = &run.reports[0].events;
    assert!(matches!(sec_events[0], SeedEvent::ManagerCreated { key, .. } if key == system_manager_key()));
    assert_eq!(sec_events[1], SeedEvent::UserCreated { key: admin_key() });
    assert_eq!(
        sec_events[2],
        SeedEvent::SessionCreated {
            key: system_manager_key()
        }
    );
    assert!(matches!(
        run.reports[1].events[0],
        SeedEvent::AddressCreated { owner, .. } if owner == system_manager_key()
    ));

    assert_eq!(row_count(&sec, "sec_user"), 2);
    assert_eq!(row_count(&sec, "sec_mgr"), 1);
    assert_eq!(row_count(&sec, "sec_sess"), 1);
    assert_eq!(row_count(&app, "app_addr"), 1);

    let users = UserService::new(SqliteUserRepository::try_new(&sec).unwrap());
    let manager = users.find(&system_manager_key()).unwrap().unwrap();
    assert_eq!(manager.username(), "system");
    assert_eq!(manager.email(), "admin");
    assert_eq!(manager.manager().unwrap().department_code(), "1");
    let admin = users.find(&admin_key()).unwrap().unwrap();
    assert_eq!(admin.username(), "admin");
    assert_eq!(admin.email(), "root");
    assert_eq!(admin.audit.created_by, Some(system_manager_key()));
}

#[test]
fn rerun_updates_and_terminates_the_initialization_session() {
    let sec = open_db_in_memory(Schema::Sec).unwrap();
    let app = open_db_in_memory(Schema::App).unwrap();
    assert!(run_startup_seeding(&sec, &app).is_ok());

    let rerun = run_startup_seeding(&sec, &app);
    assert!(rerun.is_ok(), "{rerun:?}");
    let sec_events = &rerun.reports[0].events;
    assert!(matches!(sec_events[0], SeedEvent::ManagerUpdated { .. }));
    assert!(matches!(sec_events[1], SeedEvent::UserUpdated { .. }));
    assert_eq!(
        sec_events[2],
        SeedEvent::SessionTerminated {
            key: system_manager_key()
        }
    );
    assert_eq!(
        rerun.reports[1].events,
        vec![SeedEvent::AddressesPresent {
            owner: system_manager_key(),
            count: 1
        }]
    );

    let users = UserService::new(SqliteUserRepository::try_new(&sec).unwrap());
    let sessions = SessionService::new(
        SqliteSessionRepository::try_new(&sec).unwrap(),
        UserService::new(SqliteUserRepository::try_new(&sec).unwrap()),
    );
    let session = sessions.find(&system_manager_key()).unwrap().unwrap();
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(session.termination_info(), Some(RERUN_TERMINATION_INFO));

    let manager = users.find(&system_manager_key()).unwrap().unwrap();
    assert_eq!(manager.audit.created_by, Some(system_manager_key()));
    assert_eq!(manager.audit.updated_by, Some(admin_key()));

    let third = run_startup_seeding(&sec, &app);
    assert!(third.is_ok());
    assert!(matches!(
        third.reports[0].events[2],
        SeedEvent::SessionAlreadyTerminated { .. }
    ));
    assert_eq!(row_count(&sec, "sec_user"), 2);
    assert_eq!(row_count(&sec, "sec_sess"), 1);
    assert_eq!(row_count(&app, "app_addr"), 1);
}

#[test]
fn failing_secdb_run_is_reported_and_appdb_still_runs() {
    let sec = open_db_in_memory(Schema::Sec).unwrap();
    let app = open_db_in_memory(Schema::App).unwrap();
    // Occupy the system manager's department code with another manager.
    sec.execute_batch(
        "INSERT INTO sec_user (pid, user_type, username, email, created_at, updated_at)
         VALUES (x'0101010101010101010101010101010101010101010101010101010101010101', 1, 'squatter', 's', 0, 0);
         INSERT INTO sec_mgr (pid, title, deptcode)
         VALUES (x'0101010101010101010101010101010101010101010101010101010101010101', 'Squatter', '1');",
    )
    .unwrap();

    let run = run_startup_seeding(&sec, &app);
    assert!(!run.is_ok());
    assert!(run.reports[0].error.is_some());
    assert!(run.reports[0].events.is_empty());
    assert_eq!(row_count(&sec, "sec_user"), 1);
    assert_eq!(row_count(&sec, "sec_sess"), 0);

    // The manager is missing, so the address owner does not resolve either.
    let app_report = &run.reports[1];
    assert_eq!(app_report.schema, Schema::App);
    assert!(app_report.error.as_deref().unwrap().contains("refUID"));
    assert_eq!(row_count(&app, "app_addr"), 0);
}

#[test]
fn report_serializes_to_tagged_json() {
    let sec = open_db_in_memory(Schema::Sec).unwrap();
    let app = open_db_in_memory(Schema::App).unwrap();
    let run = run_startup_seeding(&sec, &app);

    let json = serde_json::to_value(&run).unwrap();
    let reports = json["reports"].as_array().unwrap();
    assert_eq!(reports[0]["schema"], "sec");
    assert_eq!(reports[0]["events"][0]["event"], "manager_created");
    assert_eq!(
        reports[0]["events"][0]["key"],
        system_manager_key().to_hex()
    );
    assert_eq!(reports[1]["events"][0]["event"], "address_created");
    assert!(reports[1]["error"].is_null());
}

#[test]
fn seeding_persists_across_reopened_files() {
    let dir = tempfile::tempdir().unwrap();
    let sec_path = dir.path().join("secdb.sqlite3");
    let app_path = dir.path().join("appdb.sqlite3");

    {
        let sec = open_db(&sec_path, Schema::Sec).unwrap();
        let app = open_db(&app_path, Schema::App).unwrap();
        assert!(run_startup_seeding(&sec, &app).is_ok());
    }

    let sec = open_db(&sec_path, Schema::Sec).unwrap();
    let app = open_db(&app_path, Schema::App).unwrap();
    let rerun = run_startup_seeding(&sec, &app);
    assert!(matches!(
        rerun.reports[0].events[2],
        SeedEvent::SessionTerminated { .. }
    ));
}
