//! Session repository contracts and SQLite implementation.
//!
//! # Invariants
//! - `secuser`, `sess_cr_info` and `created_at` are written once on insert
//!   and never updated.
//! - Per-user listing is ordered by creation time, then key.

use crate::db::{run_in_transaction, DbError, Propagation, Schema};
use crate::model::key_hash::KeyHash;
use crate::model::session::SessionRecord;
use crate::model::{EntityKind, EntityRecord};
use crate::repo::{
    ensure_connection_ready, map_write_error, non_null_key, RecordStore, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const SESSION_SELECT_SQL: &str = "SELECT
    pid,
    secuser,
    sess_cr_info,
    created_at,
    sess_term_info,
    terminated_at
FROM sec_sess";

/// Query contract for sessions on top of keyed storage.
pub trait SessionStore: RecordStore<Record = SessionRecord> {
    fn find_by_user(&self, owner: &KeyHash) -> RepoResult<Vec<SessionRecord>>;
}

/// SQLite-backed session repository over a secdb connection.
pub struct SqliteSessionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSessionRepository<'conn> {
    /// Creates repository from a migrated secdb connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, Schema::Sec, &["sec_user", "sec_sess"])?;
        Ok(Self { conn })
    }
}

impl RecordStore for SqliteSessionRepository<'_> {
    type Record = SessionRecord;

    fn find(&self, key: &KeyHash) -> RepoResult<Option<SessionRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SESSION_SELECT_SQL} WHERE pid = ?1;"))?;
        let row = stmt.query_row([key], parse_session_row).optional()?;
        row.map(finish_session).transpose()
    }

    fn exists(&self, key: &KeyHash) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sec_sess WHERE pid = ?1);",
            [key],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn insert(&self, record: &SessionRecord) -> RepoResult<()> {
        record.validate()?;
        self.conn
            .execute(
                "INSERT INTO sec_sess (
                    pid,
                    secuser,
                    sess_cr_info,
                    created_at,
                    sess_term_info,
                    terminated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    record.key(),
                    record.owner(),
                    record.creation_info(),
                    record.created_at(),
                    record.termination_info(),
                    record.terminated_at(),
                ],
            )
            .map_err(|err| map_write_error(EntityKind::Session, err))?;
        Ok(())
    }

    fn update(&self, record: &SessionRecord) -> RepoResult<()> {
        record.validate()?;
        let changed = self
            .conn
            .execute(
                "UPDATE sec_sess
                 SET sess_term_info = ?2,
                     terminated_at = ?3
                 WHERE pid = ?1;",
                params![
                    record.key(),
                    record.termination_info(),
                    record.terminated_at(),
                ],
            )
            .map_err(|err| map_write_error(EntityKind::Session, err))?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Session,
                key: record.key(),
            });
        }
        Ok(())
    }

    fn transactional<T, E, F>(&self, propagation: Propagation, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<DbError>,
    {
        run_in_transaction(self.conn, propagation, op)
    }
}

impl SessionStore for SqliteSessionRepository<'_> {
    fn find_by_user(&self, owner: &KeyHash) -> RepoResult<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SESSION_SELECT_SQL} WHERE secuser = ?1 ORDER BY created_at ASC, pid ASC;"
        ))?;
        let mut rows = stmt.query([owner])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(finish_session(parse_session_row(row)?)?);
        }
        Ok(result)
    }
}

fn parse_session_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord::from_parts(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn finish_session(record: SessionRecord) -> RepoResult<SessionRecord> {
    let key = non_null_key("sec_sess.pid", record.key())?;
    non_null_key("sec_sess.secuser", record.owner())?;
    record.validate().map_err(|err| {
        RepoError::InvalidData(format!("session row {key} failed validation: {err}"))
    })?;
    Ok(record)
}
