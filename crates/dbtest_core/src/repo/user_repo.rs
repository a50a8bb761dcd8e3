//! User/manager repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist `UserRecord` in `sec_user`, with the manager profile joined
//!   from `sec_mgr` by key.
//! - Provide the user and manager finder queries.
//!
//! # Invariants
//! - `sec_user.user_type` mirrors `UserKind` (0 base, 1 manager) and never
//!   changes on update.
//! - A manager row exists in `sec_mgr` iff `user_type = 1`; the two rows
//!   are written in one savepoint so a failed write leaves neither.
//! - List queries are ordered by key for deterministic results.

use crate::db::{run_in_transaction, DbError, Propagation, Schema};
use crate::model::key_hash::KeyHash;
use crate::model::user::{ManagerProfile, UserKind, UserRecord};
use crate::model::{AuditStamp, EntityKind, EntityRecord};
use crate::repo::{
    ensure_connection_ready, map_write_error, non_null_key, RecordStore, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const USER_TYPE_BASE: i64 = 0;
const USER_TYPE_MANAGER: i64 = 1;

const USER_SELECT_SQL: &str = "SELECT
    u.pid,
    u.user_type,
    u.username,
    u.email,
    u.member_deptcode,
    u.created_at,
    u.created_by,
    u.updated_at,
    u.updated_by,
    m.title,
    m.deptcode,
    m.subdeptof
FROM sec_user u
LEFT JOIN sec_mgr m ON m.pid = u.pid";

/// Query contract for users and managers on top of keyed storage.
pub trait UserStore: RecordStore<Record = UserRecord> {
    /// Unique username lookup.
    fn find_by_username(&self, username: &str) -> RepoResult<Option<UserRecord>>;

    fn find_by_email(&self, email: &str) -> RepoResult<Vec<UserRecord>>;

    fn find_by_member_department_code(&self, code: &str) -> RepoResult<Vec<UserRecord>>;

    /// Unique manager department code lookup.
    fn find_by_department_code(&self, code: &str) -> RepoResult<Option<UserRecord>>;

    /// Managers whose `parent_department` is `parent`.
    fn find_child_departments(&self, parent: &KeyHash) -> RepoResult<Vec<UserRecord>>;
}

/// SQLite-backed user/manager repository over a secdb connection.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    /// Creates repository from a migrated secdb connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, Schema::Sec, &["sec_user", "sec_mgr"])?;
        Ok(Self { conn })
    }

    fn query_one(&self, filter: &str, arg: &dyn rusqlite::ToSql) -> RepoResult<Option<UserRecord>> {
        let sql = format!("{USER_SELECT_SQL} WHERE {filter};");
        let mut stmt = self.conn.prepare(&sql)?;
        let row = stmt.query_row(params![arg], parse_user_row).optional()?;
        row.map(finish_user).transpose()
    }

    fn query_many(&self, filter: &str, arg: &dyn rusqlite::ToSql) -> RepoResult<Vec<UserRecord>> {
        let sql = format!("{USER_SELECT_SQL} WHERE {filter} ORDER BY u.pid ASC;");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![arg])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(finish_user(parse_user_row(row)?)?);
        }
        Ok(result)
    }
}

impl RecordStore for SqliteUserRepository<'_> {
    type Record = UserRecord;

    fn find(&self, key: &KeyHash) -> RepoResult<Option<UserRecord>> {
        self.query_one("u.pid = ?1", key)
    }

    fn exists(&self, key: &KeyHash) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sec_user WHERE pid = ?1);",
            [key],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn insert(&self, record: &UserRecord) -> RepoResult<()> {
        record.validate()?;
        let entity = record.kind();
        run_in_transaction(self.conn, Propagation::RequiresNew, || {
            self.conn
                .execute(
                    "INSERT INTO sec_user (
                        pid,
                        user_type,
                        username,
                        email,
                        member_deptcode,
                        created_at,
                        created_by,
                        updated_at,
                        updated_by
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
                    params![
                        record.key(),
                        user_type_of(record),
                        record.username(),
                        record.email(),
                        record.member_department_code(),
                        record.audit.created_at,
                        record.audit.created_by,
                        record.audit.updated_at,
                        record.audit.updated_by,
                    ],
                )
                .map_err(|err| map_write_error(entity, err))?;

            if let Some(profile) = record.manager() {
                self.conn
                    .execute(
                        "INSERT INTO sec_mgr (pid, title, deptcode, subdeptof)
                         VALUES (?1, ?2, ?3, ?4);",
                        params![
                            record.key(),
                            profile.title(),
                            profile.department_code(),
                            profile.parent_department(),
                        ],
                    )
                    .map_err(|err| map_write_error(entity, err))?;
            }
            Ok(())
        })
    }

    fn update(&self, record: &UserRecord) -> RepoResult<()> {
        record.validate()?;
        let entity = record.kind();
        run_in_transaction(self.conn, Propagation::RequiresNew, || {
            let changed = self
                .conn
                .execute(
                    "UPDATE sec_user
                     SET username = ?2,
                         email = ?3,
                         member_deptcode = ?4,
                         updated_at = ?5,
                         updated_by = ?6
                     WHERE pid = ?1
                       AND user_type = ?7;",
                    params![
                        record.key(),
                        record.username(),
                        record.email(),
                        record.member_department_code(),
                        record.audit.updated_at,
                        record.audit.updated_by,
                        user_type_of(record),
                    ],
                )
                .map_err(|err| map_write_error(entity, err))?;
            if changed == 0 {
                return Err(RepoError::NotFound {
                    entity,
                    key: record.key(),
                });
            }

            if let Some(profile) = record.manager() {
                self.conn
                    .execute(
                        "UPDATE sec_mgr
                         SET title = ?2,
                             deptcode = ?3,
                             subdeptof = ?4
                         WHERE pid = ?1;",
                        params![
                            record.key(),
                            profile.title(),
                            profile.department_code(),
                            profile.parent_department(),
                        ],
                    )
                    .map_err(|err| map_write_error(entity, err))?;
            }
            Ok(())
        })
    }

    fn transactional<T, E, F>(&self, propagation: Propagation, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<DbError>,
    {
        run_in_transaction(self.conn, propagation, op)
    }
}

impl UserStore for SqliteUserRepository<'_> {
    fn find_by_username(&self, username: &str) -> RepoResult<Option<UserRecord>> {
        self.query_one("u.username = ?1", &username)
    }

    fn find_by_email(&self, email: &str) -> RepoResult<Vec<UserRecord>> {
        self.query_many("u.email = ?1", &email)
    }

    fn find_by_member_department_code(&self, code: &str) -> RepoResult<Vec<UserRecord>> {
        self.query_many("u.member_deptcode = ?1", &code)
    }

    fn find_by_department_code(&self, code: &str) -> RepoResult<Option<UserRecord>> {
        self.query_one("m.deptcode = ?1", &code)
    }

    fn find_child_departments(&self, parent: &KeyHash) -> RepoResult<Vec<UserRecord>> {
        self.query_many("m.subdeptof = ?1", parent)
    }
}

fn user_type_of(record: &UserRecord) -> i64 {
    if record.is_manager() {
        USER_TYPE_MANAGER
    } else {
        USER_TYPE_BASE
    }
}

struct UserRow {
    key: KeyHash,
    user_type: i64,
    username: String,
    email: String,
    member_department_code: Option<String>,
    audit: AuditStamp,
    title: Option<String>,
    department_code: Option<String>,
    parent_department: Option<KeyHash>,
}

fn parse_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        key: row.get(0)?,
        user_type: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        member_department_code: row.get(4)?,
        audit: AuditStamp {
            created_at: row.get(5)?,
            created_by: row.get(6)?,
            updated_at: row.get(7)?,
            updated_by: row.get(8)?,
        },
        title: row.get(9)?,
        department_code: row.get(10)?,
        parent_department: row.get(11)?,
    })
}

fn finish_user(row: UserRow) -> RepoResult<UserRecord> {
    let key = non_null_key("sec_user.pid", row.key)?;
    let kind = match (row.user_type, row.title, row.department_code) {
        (USER_TYPE_BASE, _, _) => UserKind::Base,
        (USER_TYPE_MANAGER, Some(title), Some(department_code)) => UserKind::Manager(
            ManagerProfile::from_parts(title, department_code, row.parent_department),
        ),
        (USER_TYPE_MANAGER, _, _) => {
            return Err(RepoError::InvalidData(format!(
                "manager {key} has no sec_mgr row"
            )))
        }
        (other, _, _) => {
            return Err(RepoError::InvalidData(format!(
                "invalid user_type `{other}` in sec_user.user_type"
            )))
        }
    };

    let record = UserRecord::from_parts(
        key,
        row.username,
        row.email,
        row.member_department_code,
        kind,
        row.audit,
    );
    record.validate().map_err(|err| {
        RepoError::InvalidData(format!(
            "{} row {key} failed validation: {err}",
            EntityKind::User
        ))
    })?;
    Ok(record)
}
