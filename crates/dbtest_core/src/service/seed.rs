//! Startup seeding of the secdb and appdb schemas.
//!
//! # Responsibility
//! - Ensure the well-known system manager and admin user exist.
//! - Reconcile the initialization session of the system manager.
//! - Ensure the system manager has a sample address.
//! - Report every action as a `SeedEvent`.
//!
//! # Invariants
//! - Each schema's seeding runs in its own fresh transaction
//!   (`Propagation::RequiresNew`); a failure rolls back that schema only.
//! - Reruns never duplicate records.

use crate::db::{run_in_transaction, Propagation, Schema};
use crate::model::address::{AddressLines, AddressRecord};
use crate::model::key_hash::KeyHash;
use crate::model::session::SessionRecord;
use crate::model::user::{ManagerProfile, UserRecord};
use crate::model::{EntityKind, EntityRecord};
use crate::repo::address_repo::SqliteAddressRepository;
use crate::repo::session_repo::{SessionStore, SqliteSessionRepository};
use crate::repo::user_repo::{SqliteUserRepository, UserStore};
use crate::service::address_service::AddressService;
use crate::service::manager_service::ManagerService;
use crate::service::session_service::SessionService;
use crate::service::user_service::UserService;
use crate::service::{now_epoch_ms, persistence, ScopeError, ServiceResult};
use log::{error, info};
use rusqlite::Connection;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Seed text of the admin user key.
pub const ADMIN_KEY_SEED: &str = "0123456789abcdef";
/// Seed text of the system manager key.
pub const SYSTEM_MANAGER_KEY_SEED: &str = "fedcba9876543210";
/// Creation info of the initialization session.
pub const INITIALIZATION_SESSION_INFO: &str = "System initialization";
/// Termination info applied on the first rerun.
pub const RERUN_TERMINATION_INFO: &str = "First rerun auto-terminates the initialization session";

pub fn admin_key() -> KeyHash {
    KeyHash::from_seed(ADMIN_KEY_SEED)
}

pub fn system_manager_key() -> KeyHash {
    KeyHash::from_seed(SYSTEM_MANAGER_KEY_SEED)
}

/// One action taken (or observed) by a seeding run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SeedEvent {
    ManagerCreated { key: KeyHash, updated_at: i64 },
    ManagerUpdated { key: KeyHash, updated_at: i64 },
    UserCreated { key: KeyHash },
    UserUpdated { key: KeyHash, updated_at: i64 },
    SessionCreated { key: KeyHash },
    SessionTerminated { key: KeyHash },
    SessionAlreadyTerminated { key: KeyHash, terminated_at: i64 },
    SessionsAmbiguous { owner: KeyHash, count: usize },
    AddressCreated { key: KeyHash, owner: KeyHash },
    AddressesPresent { owner: KeyHash, count: usize },
}

impl Display for SeedEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ManagerCreated { key, updated_at } => write!(
                f,
                "manager 'system' {key} created, update stamp is {updated_at}"
            ),
            Self::ManagerUpdated { key, updated_at } => write!(
                f,
                "manager 'system' {key} updated, update stamp is {updated_at}"
            ),
            Self::UserCreated { key } => write!(f, "user 'admin' {key} created"),
            Self::UserUpdated { key, updated_at } => write!(
                f,
                "user 'admin' {key} updated, update stamp is {updated_at}"
            ),
            Self::SessionCreated { key } => {
                write!(f, "session {key} for system initialization created")
            }
            Self::SessionTerminated { key } => {
                write!(f, "terminated last run session {key} from system initialization")
            }
            Self::SessionAlreadyTerminated { key, terminated_at } => write!(
                f,
                "session {key} from system initialization was terminated at {terminated_at}"
            ),
            Self::SessionsAmbiguous { owner, count } => write!(
                f,
                "{count} sessions for {owner} indicate initialization happened some time ago"
            ),
            Self::AddressCreated { key, owner } => {
                write!(f, "sample address {key} for manager {owner} created")
            }
            Self::AddressesPresent { owner, count } => write!(
                f,
                "{count} address(es) already exist for manager {owner}"
            ),
        }
    }
}

/// Result of one schema's seeding run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub schema: Schema,
    pub events: Vec<SeedEvent>,
    /// Failure message when the run was rolled back.
    pub error: Option<String>,
}

impl SeedReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Reports of a full startup run, secdb first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedRun {
    pub reports: Vec<SeedReport>,
}

impl SeedRun {
    pub fn is_ok(&self) -> bool {
        self.reports.iter().all(SeedReport::is_ok)
    }
}

/// Outcome of the initialization-session policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionReconciliation {
    /// No session existed; one was created.
    Created(SessionRecord),
    /// The single active session was terminated.
    TerminatedPrevious(SessionRecord),
    /// The single session was already terminated; nothing changed.
    AlreadyTerminated(SessionRecord),
    /// More than one session exists; nothing changed.
    Ambiguous { count: usize },
}

impl SessionReconciliation {
    fn event(&self, owner: KeyHash) -> SeedEvent {
        match self {
            Self::Created(session) => SeedEvent::SessionCreated { key: session.key() },
            Self::TerminatedPrevious(session) => SeedEvent::SessionTerminated { key: session.key() },
            Self::AlreadyTerminated(session) => SeedEvent::SessionAlreadyTerminated {
                key: session.key(),
                terminated_at: session.terminated_at().unwrap_or_default(),
            },
            Self::Ambiguous { count } => SeedEvent::SessionsAmbiguous {
                owner,
                count: *count,
            },
        }
    }
}

/// Applies the initialization-session policy for `owner`.
///
/// Zero sessions: create one under `session_key`. Exactly one and active:
/// terminate it. Exactly one and terminated: report it. More: report only.
pub fn reconcile_initialization_session<S, U>(
    sessions: &SessionService<S, U>,
    owner: KeyHash,
    session_key: KeyHash,
    now_ms: i64,
) -> ServiceResult<SessionReconciliation>
where
    S: SessionStore,
    U: UserStore,
{
    let mut existing = sessions.find_by_user(&owner)?;
    match existing.len() {
        0 => {
            let mut candidate =
                SessionRecord::new(session_key, owner, INITIALIZATION_SESSION_INFO)?;
            let created = sessions.create(&mut candidate)?;
            Ok(SessionReconciliation::Created(created))
        }
        1 => {
            let session = existing.remove(0);
            if session.is_active() {
                let terminated =
                    sessions.terminate(&session.key(), RERUN_TERMINATION_INFO, now_ms)?;
                Ok(SessionReconciliation::TerminatedPrevious(terminated))
            } else {
                Ok(SessionReconciliation::AlreadyTerminated(session))
            }
        }
        count => Ok(SessionReconciliation::Ambiguous { count }),
    }
}

/// Seeds secdb: system manager, admin user, initialization session.
pub struct SecDbSeeder<'conn> {
    conn: &'conn Connection,
    users: UserService<SqliteUserRepository<'conn>>,
    managers: ManagerService<SqliteUserRepository<'conn>>,
    sessions: SessionService<SqliteSessionRepository<'conn>, SqliteUserRepository<'conn>>,
}

impl<'conn> SecDbSeeder<'conn> {
    pub fn try_new(conn: &'conn Connection) -> ServiceResult<Self> {
        let user_repo = || {
            SqliteUserRepository::try_new(conn).map_err(persistence(EntityKind::User, "seed"))
        };
        let session_repo = SqliteSessionRepository::try_new(conn)
            .map_err(persistence(EntityKind::Session, "seed"))?;
        Ok(Self {
            conn,
            users: UserService::new(user_repo()?),
            managers: ManagerService::new(user_repo()?),
            sessions: SessionService::new(session_repo, UserService::new(user_repo()?)),
        })
    }

    /// Runs the secdb seeding in a fresh transaction.
    pub fn perform(&self) -> ServiceResult<Vec<SeedEvent>> {
        run_in_transaction(self.conn, Propagation::RequiresNew, || {
            self.perform_in_tx().map_err(ScopeError::Service)
        })
        .map_err(|err| err.scoped(EntityKind::User, "seed"))
    }

    fn perform_in_tx(&self) -> ServiceResult<Vec<SeedEvent>> {
        let now = now_epoch_ms();
        let admin_key = admin_key();
        let manager_key = system_manager_key();
        let mut events = Vec::new();

        match self.managers.find(&manager_key)? {
            None => {
                let mut candidate = UserRecord::new_manager(
                    manager_key,
                    "system",
                    "admin",
                    ManagerProfile::new("System Administration", "1")?,
                )?;
                candidate.set_member_department_code(Some("1".to_string()))?;
                candidate.audit.created_by = Some(manager_key);
                candidate.audit.updated_by = Some(manager_key);
                let manager = self.managers.create(&mut candidate)?;
                events.push(SeedEvent::ManagerCreated {
                    key: manager.key(),
                    updated_at: manager.audit.updated_at,
                });
            }
            Some(mut manager) => {
                manager.audit.updated_by = Some(admin_key);
                let manager = self.managers.update(&manager)?;
                events.push(SeedEvent::ManagerUpdated {
                    key: manager.key(),
                    updated_at: manager.audit.updated_at,
                });
            }
        }

        match self.users.find(&admin_key)? {
            None => {
                let mut candidate = UserRecord::new(admin_key, "admin", "root")?;
                candidate.set_member_department_code(Some("1".to_string()))?;
                candidate.audit.created_by = Some(manager_key);
                candidate.audit.updated_by = Some(manager_key);
                let user = self.users.create(&mut candidate)?;
                events.push(SeedEvent::UserCreated { key: user.key() });
            }
            Some(mut user) => {
                user.audit.updated_by = Some(admin_key);
                let user = self.users.update(&user)?;
                events.push(SeedEvent::UserUpdated {
                    key: user.key(),
                    updated_at: user.audit.updated_at,
                });
            }
        }

        let outcome =
            reconcile_initialization_session(&self.sessions, manager_key, manager_key, now)?;
        events.push(outcome.event(manager_key));
        Ok(events)
    }
}

/// Seeds appdb: the system manager's sample address.
pub struct AppDbSeeder<'conn> {
    conn: &'conn Connection,
    addresses: AddressService<SqliteAddressRepository<'conn>, SqliteUserRepository<'conn>>,
}

impl<'conn> AppDbSeeder<'conn> {
    /// `sec_conn` resolves address owners; `app_conn` stores addresses.
    pub fn try_new(sec_conn: &'conn Connection, app_conn: &'conn Connection) -> ServiceResult<Self> {
        let users = SqliteUserRepository::try_new(sec_conn)
            .map_err(persistence(EntityKind::User, "seed"))?;
        let addresses = SqliteAddressRepository::try_new(app_conn)
            .map_err(persistence(EntityKind::Address, "seed"))?;
        Ok(Self {
            conn: app_conn,
            addresses: AddressService::new(addresses, UserService::new(users)),
        })
    }

    /// Runs the appdb seeding in a fresh transaction.
    pub fn perform(&self) -> ServiceResult<Vec<SeedEvent>> {
        run_in_transaction(self.conn, Propagation::RequiresNew, || {
            self.perform_in_tx().map_err(ScopeError::Service)
        })
        .map_err(|err| err.scoped(EntityKind::Address, "seed"))
    }

    fn perform_in_tx(&self) -> ServiceResult<Vec<SeedEvent>> {
        let manager_key = system_manager_key();
        let existing = self.addresses.find_by_owner(&manager_key)?;
        if !existing.is_empty() {
            return Ok(vec![SeedEvent::AddressesPresent {
                owner: manager_key,
                count: existing.len(),
            }]);
        }

        let mut candidate = AddressRecord::new(KeyHash::NULL, manager_key, "Home")?
            .with_lines(sample_address_lines())?;
        candidate.audit.created_by = Some(manager_key);
        candidate.audit.updated_by = Some(manager_key);
        let address = self.addresses.create(&mut candidate)?;
        Ok(vec![SeedEvent::AddressCreated {
            key: address.key(),
            owner: manager_key,
        }])
    }
}

fn sample_address_lines() -> AddressLines {
    AddressLines {
        contact: Some("System Administrator".to_string()),
        apartment: Some("1".to_string()),
        street: Some("100 Main Street".to_string()),
        street2: None,
        city: Some("Springfield".to_string()),
        province: Some("ON".to_string()),
        country: Some("Canada".to_string()),
        postal_code: Some("A1A 1A1".to_string()),
    }
}

/// Runs secdb then appdb seeding. A failing schema is reported and does not
/// stop the next one.
pub fn run_startup_seeding(sec_conn: &Connection, app_conn: &Connection) -> SeedRun {
    let sec = run_reported(Schema::Sec, || SecDbSeeder::try_new(sec_conn)?.perform());
    let app = run_reported(Schema::App, || {
        AppDbSeeder::try_new(sec_conn, app_conn)?.perform()
    });
    SeedRun {
        reports: vec![sec, app],
    }
}

fn run_reported<F>(schema: Schema, run: F) -> SeedReport
where
    F: FnOnce() -> ServiceResult<Vec<SeedEvent>>,
{
    let started_at = Instant::now();
    info!("event=seed_run module=seed status=start schema={schema}");
    match run() {
        Ok(events) => {
            for event in &events {
                info!("event=seed_step module=seed status=ok schema={schema} detail=\"{event}\"");
            }
            info!(
                "event=seed_run module=seed status=ok schema={schema} duration_ms={} steps={}",
                started_at.elapsed().as_millis(),
                events.len()
            );
            SeedReport {
                schema,
                events,
                error: None,
            }
        }
        Err(err) => {
            error!(
                "event=seed_run module=seed status=error schema={schema} duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            SeedReport {
                schema,
                events: Vec::new(),
                error: Some(err.to_string()),
            }
        }
    }
}
