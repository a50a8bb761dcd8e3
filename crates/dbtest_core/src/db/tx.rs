//! Ambient transaction propagation over one SQLite connection.
//!
//! # Invariants
//! - `Required` joins an open transaction, else begins an IMMEDIATE one.
//! - `RequiresNew` always opens a fresh unit: a top-level IMMEDIATE
//!   transaction, or a named SAVEPOINT when a transaction is already open.
//! - A unit opened here commits iff `op` returns `Ok`; otherwise it is rolled
//!   back. A joined unit is left to its owner.

use super::DbError;
use log::warn;
use rusqlite::{Connection, Transaction, TransactionBehavior};

const NESTED_SAVEPOINT: &str = "dbtest_requires_new";

/// How an operation participates in the caller's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    #[default]
    Required,
    RequiresNew,
}

/// Runs `op` inside a transaction chosen by `propagation`.
///
/// # Errors
/// - Begin/commit failures are surfaced through `E: From<DbError>`.
/// - Errors returned by `op` are propagated unchanged after rollback.
pub fn run_in_transaction<T, E, F>(conn: &Connection, propagation: Propagation, op: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<DbError>,
{
    let in_transaction = !conn.is_autocommit();
    match (propagation, in_transaction) {
        (Propagation::Required, true) => op(),
        (Propagation::RequiresNew, true) => run_in_savepoint(conn, op),
        (_, false) => {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
                .map_err(DbError::from)?;
            let value = op()?;
            tx.commit().map_err(DbError::from)?;
            Ok(value)
        }
    }
}

fn run_in_savepoint<T, E, F>(conn: &Connection, op: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<DbError>,
{
    conn.execute_batch(&format!("SAVEPOINT {NESTED_SAVEPOINT};"))
        .map_err(DbError::from)?;
    match op() {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE SAVEPOINT {NESTED_SAVEPOINT};"))
                .map_err(DbError::from)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.execute_batch(&format!(
                "ROLLBACK TO SAVEPOINT {NESTED_SAVEPOINT}; RELEASE SAVEPOINT {NESTED_SAVEPOINT};"
            )) {
                warn!(
                    "event=tx_rollback module=db status=error scope=savepoint error={rollback_err}"
                );
            }
            Err(err)
        }
    }
}
