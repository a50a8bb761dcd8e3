//! Address repository contracts and SQLite implementation.
//!
//! # Invariants
//! - `(refuid, addrname)` is unique; a clash is a constraint rejection.
//! - `refuid` is not a foreign key here: owners live in secdb.

use crate::db::{run_in_transaction, DbError, Propagation, Schema};
use crate::model::address::{AddressLines, AddressRecord};
use crate::model::key_hash::KeyHash;
use crate::model::{AuditStamp, EntityKind, EntityRecord};
use crate::repo::{
    ensure_connection_ready, map_write_error, non_null_key, RecordStore, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ADDRESS_SELECT_SQL: &str = "SELECT
    pid,
    refuid,
    addrname,
    addr_contact,
    addr_apartment,
    addr_street,
    addr_street2,
    addr_city,
    addr_province,
    addr_country,
    addr_postal_code,
    created_at,
    created_by,
    updated_at,
    updated_by
FROM app_addr";

/// Query contract for addresses on top of keyed storage.
pub trait AddressStore: RecordStore<Record = AddressRecord> {
    /// All addresses owned by `owner`, ordered by name.
    fn find_by_owner(&self, owner: &KeyHash) -> RepoResult<Vec<AddressRecord>>;

    fn find_by_owner_and_name(
        &self,
        owner: &KeyHash,
        name: &str,
    ) -> RepoResult<Option<AddressRecord>>;
}

/// SQLite-backed address repository over an appdb connection.
pub struct SqliteAddressRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAddressRepository<'conn> {
    /// Creates repository from a migrated appdb connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, Schema::App, &["app_addr"])?;
        Ok(Self { conn })
    }
}

impl RecordStore for SqliteAddressRepository<'_> {
    type Record = AddressRecord;

    fn find(&self, key: &KeyHash) -> RepoResult<Option<AddressRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ADDRESS_SELECT_SQL} WHERE pid = ?1;"))?;
        let row = stmt.query_row([key], parse_address_row).optional()?;
        row.map(finish_address).transpose()
    }

    fn exists(&self, key: &KeyHash) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM app_addr WHERE pid = ?1);",
            [key],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn insert(&self, record: &AddressRecord) -> RepoResult<()> {
        record.validate()?;
        let lines = record.lines();
        self.conn
            .execute(
                "INSERT INTO app_addr (
                    pid,
                    refuid,
                    addrname,
                    addr_contact,
                    addr_apartment,
                    addr_street,
                    addr_street2,
                    addr_city,
                    addr_province,
                    addr_country,
                    addr_postal_code,
                    created_at,
                    created_by,
                    updated_at,
                    updated_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15);",
                params![
                    record.key(),
                    record.owner(),
                    record.name(),
                    lines.contact,
                    lines.apartment,
                    lines.street,
                    lines.street2,
                    lines.city,
                    lines.province,
                    lines.country,
                    lines.postal_code,
                    record.audit.created_at,
                    record.audit.created_by,
                    record.audit.updated_at,
                    record.audit.updated_by,
                ],
            )
            .map_err(|err| map_write_error(EntityKind::Address, err))?;
        Ok(())
    }

    fn update(&self, record: &AddressRecord) -> RepoResult<()> {
        record.validate()?;
        let lines = record.lines();
        let changed = self
            .conn
            .execute(
                "UPDATE app_addr
                 SET refuid = ?2,
                     addrname = ?3,
                     addr_contact = ?4,
                     addr_apartment = ?5,
                     addr_street = ?6,
                     addr_street2 = ?7,
                     addr_city = ?8,
                     addr_province = ?9,
                     addr_country = ?10,
                     addr_postal_code = ?11,
                     updated_at = ?12,
                     updated_by = ?13
                 WHERE pid = ?1;",
                params![
                    record.key(),
                    record.owner(),
                    record.name(),
                    lines.contact,
                    lines.apartment,
                    lines.street,
                    lines.street2,
                    lines.city,
                    lines.province,
                    lines.country,
                    lines.postal_code,
                    record.audit.updated_at,
                    record.audit.updated_by,
                ],
            )
            .map_err(|err| map_write_error(EntityKind::Address, err))?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Address,
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

impl AddressStore for SqliteAddressRepository<'_> {
    fn find_by_owner(&self, owner: &KeyHash) -> RepoResult<Vec<AddressRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ADDRESS_SELECT_SQL} WHERE refuid = ?1 ORDER BY addrname ASC, pid ASC;"
        ))?;
        let mut rows = stmt.query([owner])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(finish_address(parse_address_row(row)?)?);
        }
        Ok(result)
    }

    fn find_by_owner_and_name(
        &self,
        owner: &KeyHash,
        name: &str,
    ) -> RepoResult<Option<AddressRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ADDRESS_SELECT_SQL} WHERE refuid = ?1 AND addrname = ?2;"
        ))?;
        let row = stmt
            .query_row(params![owner, name], parse_address_row)
            .optional()?;
        row.map(finish_address).transpose()
    }
}

fn parse_address_row(row: &Row<'_>) -> rusqlite::Result<AddressRecord> {
    let lines = AddressLines {
        contact: row.get(3)?,
        apartment: row.get(4)?,
        street: row.get(5)?,
        street2: row.get(6)?,
        city: row.get(7)?,
        province: row.get(8)?,
        country: row.get(9)?,
        postal_code: row.get(10)?,
    };
    let audit = AuditStamp {
        created_at: row.get(11)?,
        created_by: row.get(12)?,
        updated_at: row.get(13)?,
        updated_by: row.get(14)?,
    };
    Ok(AddressRecord::from_parts(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        lines,
        audit,
    ))
}

fn finish_address(record: AddressRecord) -> RepoResult<AddressRecord> {
    let key = non_null_key("app_addr.pid", record.key())?;
    non_null_key("app_addr.refuid", record.owner())?;
    record.validate().map_err(|err| {
        RepoError::InvalidData(format!("address row {key} failed validation: {err}"))
    })?;
    Ok(record)
}
