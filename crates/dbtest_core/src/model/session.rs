//! Login/initialization session (secdb `sec_sess`).
//!
//! # Responsibility
//! - Model the session record and its two-state lifecycle.
//!
//! # Invariants
//! - `Active` iff `terminated_at` is `None`.
//! - `Terminated` is terminal; `terminate` is only legal from `Active`.
//! - `owner`, `creation_info` and `created_at` never change after creation.
//! - Canonical order: key, owner, creation info, termination info,
//!   termination time.

use crate::model::field::{
    check_optional_text, check_required_text, required_key, required_text, ArgRef,
    DigestBuilder, FieldError,
};
use crate::model::key_hash::KeyHash;
use crate::model::{EntityKind, EntityRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

pub const SESSION_CREATE_INFO_MAX: usize = 1024;
pub const SESSION_TERMINATION_INFO_MAX: usize = 1024;

/// Lifecycle state derived from `terminated_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Terminated,
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransitionError {
    /// Termination reason failed validation.
    Field(FieldError),
    /// Session was already terminated at the given time.
    AlreadyTerminated { key: KeyHash, terminated_at: i64 },
}

impl Display for SessionTransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field(err) => write!(f, "{err}"),
            Self::AlreadyTerminated { key, terminated_at } => {
                write!(f, "session {key} already terminated at {terminated_at}")
            }
        }
    }
}

impl Error for SessionTransitionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Field(err) => Some(err),
            Self::AlreadyTerminated { .. } => None,
        }
    }
}

impl From<FieldError> for SessionTransitionError {
    fn from(value: FieldError) -> Self {
        Self::Field(value)
    }
}

/// Canonical session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    key: KeyHash,
    owner: KeyHash,
    creation_info: String,
    created_at: i64,
    termination_info: Option<String>,
    terminated_at: Option<i64>,
}

impl SessionRecord {
    /// Builds an active session for `owner`. `key` may be `KeyHash::NULL`.
    pub fn new(
        key: KeyHash,
        owner: KeyHash,
        creation_info: impl Into<String>,
    ) -> Result<Self, FieldError> {
        Ok(Self {
            key,
            owner: required_key(session_arg("new", 2, "secUser"), owner)?,
            creation_info: required_text(
                session_arg("new", 3, "sessCreateInfo"),
                SESSION_CREATE_INFO_MAX,
                creation_info.into(),
            )?,
            created_at: 0,
            termination_info: None,
            terminated_at: None,
        })
    }

    pub(crate) fn from_parts(
        key: KeyHash,
        owner: KeyHash,
        creation_info: String,
        created_at: i64,
        termination_info: Option<String>,
        terminated_at: Option<i64>,
    ) -> Self {
        Self {
            key,
            owner,
            creation_info,
            created_at,
            termination_info,
            terminated_at,
        }
    }

    pub fn owner(&self) -> KeyHash {
        self.owner
    }

    pub fn creation_info(&self) -> &str {
        &self.creation_info
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn termination_info(&self) -> Option<&str> {
        self.termination_info.as_deref()
    }

    pub fn terminated_at(&self) -> Option<i64> {
        self.terminated_at
    }

    pub fn state(&self) -> SessionState {
        if self.terminated_at.is_some() {
            SessionState::Terminated
        } else {
            SessionState::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn set_key(&mut self, key: KeyHash) -> Result<(), FieldError> {
        self.key = required_key(session_arg("setKey", 1, "key"), key)?;
        Ok(())
    }

    /// Moves `Active -> Terminated`.
    ///
    /// # Errors
    /// - `AlreadyTerminated` when the session is terminal.
    /// - `Field` when `reason` is empty or too long; the record is unchanged.
    pub fn terminate(
        &mut self,
        reason: impl Into<String>,
        when: i64,
    ) -> Result<(), SessionTransitionError> {
        if let Some(terminated_at) = self.terminated_at {
            return Err(SessionTransitionError::AlreadyTerminated {
                key: self.key,
                terminated_at,
            });
        }
        let reason = required_text(
            session_arg("terminate", 1, "sessTerminationInfo"),
            SESSION_TERMINATION_INFO_MAX,
            reason.into(),
        )?;
        self.termination_info = Some(reason);
        self.terminated_at = Some(when);
        Ok(())
    }

    /// Applies the termination fields of an update candidate.
    ///
    /// Only the mutable termination pair is copied; it must arrive complete.
    pub(crate) fn absorb_update(
        &mut self,
        candidate: &SessionRecord,
    ) -> Result<(), SessionTransitionError> {
        match (self.terminated_at, candidate.terminated_at) {
            (Some(terminated_at), _) => {
                if candidate.terminated_at != self.terminated_at
                    || candidate.termination_info != self.termination_info
                {
                    return Err(SessionTransitionError::AlreadyTerminated {
                        key: self.key,
                        terminated_at,
                    });
                }
                Ok(())
            }
            (None, Some(when)) => match candidate.termination_info.as_deref() {
                Some(reason) => self.terminate(reason, when),
                None => Err(SessionTransitionError::Field(FieldError::MissingArgument(
                    session_arg("update", 1, "sessTerminationInfo"),
                ))),
            },
            (None, None) => {
                if candidate.termination_info.is_some() {
                    return Err(SessionTransitionError::Field(FieldError::MissingArgument(
                        session_arg("update", 1, "terminatedAt"),
                    )));
                }
                Ok(())
            }
        }
    }

    fn canonical(&self) -> (&KeyHash, &KeyHash, &str, Option<&str>, Option<i64>) {
        (
            &self.key,
            &self.owner,
            self.creation_info.as_str(),
            self.termination_info.as_deref(),
            self.terminated_at,
        )
    }
}

impl EntityRecord for SessionRecord {
    fn kind(&self) -> EntityKind {
        EntityKind::Session
    }

    fn key(&self) -> KeyHash {
        self.key
    }

    fn assign_key(&mut self, key: KeyHash) {
        self.key = key;
    }

    fn stamp_created(&mut self, now_ms: i64) {
        self.created_at = now_ms;
    }

    // Sessions carry no update stamp.
    fn stamp_updated(&mut self, _now_ms: i64) {}

    fn validate(&self) -> Result<(), FieldError> {
        required_key(session_arg("validate", 1, "secUser"), self.owner)?;
        check_required_text(
            session_arg("validate", 1, "sessCreateInfo"),
            SESSION_CREATE_INFO_MAX,
            &self.creation_info,
        )?;
        check_optional_text(
            session_arg("validate", 1, "sessTerminationInfo"),
            SESSION_TERMINATION_INFO_MAX,
            self.termination_info.as_deref(),
        )?;
        if self.terminated_at.is_some() != self.termination_info.is_some() {
            return Err(FieldError::InvalidArgument {
                arg: session_arg("validate", 1, "terminatedAt"),
                reason: "termination time and info must be set together".to_string(),
            });
        }
        Ok(())
    }

    fn digest(&self) -> i32 {
        DigestBuilder::new()
            .key(&self.key)
            .key(&self.owner)
            .text(&self.creation_info)
            .opt_text(self.termination_info.as_deref())
            .opt_i64(self.terminated_at)
            .finish()
    }
}

impl PartialEq for SessionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for SessionRecord {}

impl PartialOrd for SessionRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SessionRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical().cmp(&other.canonical())
    }
}

impl Hash for SessionRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.digest());
    }
}

fn session_arg(operation: &'static str, index: u32, name: &'static str) -> ArgRef {
    ArgRef::new(EntityKind::Session, operation, index, name)
}

#[cfg(test)]
mod tests {
    use super::{SessionRecord, SessionState, SessionTransitionError};
    use crate::model::key_hash::KeyHash;

    fn active() -> SessionRecord {
        SessionRecord::new(KeyHash::from_seed("s"), KeyHash::from_seed("u"), "init").unwrap()
    }

    #[test]
    fn terminate_moves_active_to_terminated_once() {
        let mut session = active();
        assert_eq!(session.state(), SessionState::Active);

        session.terminate("done", 42).unwrap();
        assert_eq!(session.state(), SessionState::Terminated);
        assert_eq!(session.terminated_at(), Some(42));

        let err = session.terminate("again", 43).unwrap_err();
        assert!(matches!(
            err,
            SessionTransitionError::AlreadyTerminated { terminated_at: 42, .. }
        ));
        assert_eq!(session.termination_info(), Some("done"));
    }

    #[test]
    fn terminate_with_overlong_reason_leaves_session_active() {
        let mut session = active();
        assert!(session.terminate("x".repeat(1025), 1).is_err());
        assert!(session.is_active());
        assert_eq!(session.termination_info(), None);
    }

    #[test]
    fn absent_termination_sorts_first() {
        let open = active();
        let mut closed = active();
        closed.terminate("bye", 5).unwrap();
        assert!(open < closed);
    }
}
