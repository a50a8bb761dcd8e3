//! User and manager records (secdb `sec_user` / `sec_mgr`).
//!
//! # Responsibility
//! - Model a user with an optional manager specialization as a tagged variant.
//! - Validate bounded fields on every assignment.
//!
//! # Invariants
//! - `username` and `email` are never empty.
//! - A manager's `title` and `department_code` are never empty.
//! - A manager never names itself as parent department.
//! - Canonical order: key, username, email, member department code, kind
//!   (base before manager, then title, department code, parent department).

use crate::model::field::{
    check_optional_text, check_required_text, optional_key, optional_text, required_key,
    required_text, ArgRef, DigestBuilder, FieldError,
};
use crate::model::key_hash::KeyHash;
use crate::model::{AuditStamp, EntityKind, EntityRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

pub const USERNAME_MAX: usize = 64;
pub const EMAIL_MAX: usize = 1023;
pub const DEPARTMENT_CODE_MAX: usize = 32;
pub const TITLE_MAX: usize = 64;

/// Variant payload of a user record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "user_type", rename_all = "snake_case")]
pub enum UserKind {
    /// Plain user (`user_type = 0`).
    Base,
    /// Department manager (`user_type = 1`).
    Manager(ManagerProfile),
}

/// Manager-only fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManagerProfile {
    title: String,
    department_code: String,
    /// Key of the manager heading the parent department.
    parent_department: Option<KeyHash>,
}

impl ManagerProfile {
    pub fn new(
        title: impl Into<String>,
        department_code: impl Into<String>,
    ) -> Result<Self, FieldError> {
        Ok(Self {
            title: required_text(manager_arg("new", 1, "title"), TITLE_MAX, title.into())?,
            department_code: required_text(
                manager_arg("new", 2, "departmentCode"),
                DEPARTMENT_CODE_MAX,
                department_code.into(),
            )?,
            parent_department: None,
        })
    }

    pub(crate) fn from_parts(
        title: String,
        department_code: String,
        parent_department: Option<KeyHash>,
    ) -> Self {
        Self {
            title,
            department_code,
            parent_department,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn department_code(&self) -> &str {
        &self.department_code
    }

    pub fn parent_department(&self) -> Option<KeyHash> {
        self.parent_department
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> Result<(), FieldError> {
        self.title = required_text(manager_arg("setTitle", 1, "title"), TITLE_MAX, title.into())?;
        Ok(())
    }

    pub fn set_department_code(
        &mut self,
        department_code: impl Into<String>,
    ) -> Result<(), FieldError> {
        self.department_code = required_text(
            manager_arg("setDepartmentCode", 1, "departmentCode"),
            DEPARTMENT_CODE_MAX,
            department_code.into(),
        )?;
        Ok(())
    }

    pub fn set_parent_department(&mut self, parent: Option<KeyHash>) -> Result<(), FieldError> {
        self.parent_department = optional_key(
            manager_arg("setParentDepartment", 1, "parentDepartment"),
            parent,
        )?;
        Ok(())
    }

    fn validate(&self, key: KeyHash) -> Result<(), FieldError> {
        check_required_text(manager_arg("validate", 1, "title"), TITLE_MAX, &self.title)?;
        check_required_text(
            manager_arg("validate", 1, "departmentCode"),
            DEPARTMENT_CODE_MAX,
            &self.department_code,
        )?;
        if let Some(parent) = self.parent_department {
            let arg = manager_arg("validate", 1, "parentDepartment");
            required_key(arg, parent)?;
            if !key.is_null() && parent == key {
                return Err(FieldError::InvalidArgument {
                    arg,
                    reason: "a department cannot be its own parent".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Canonical user record. Managers carry `UserKind::Manager`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    key: KeyHash,
    username: String,
    email: String,
    member_department_code: Option<String>,
    #[serde(flatten)]
    kind: UserKind,
    /// Provenance; timestamps are overwritten by the services.
    pub audit: AuditStamp,
}

impl UserRecord {
    /// Builds a plain user. `key` may be `KeyHash::NULL` to request generation.
    pub fn new(
        key: KeyHash,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, FieldError> {
        Ok(Self {
            key,
            username: required_text(user_arg("new", 2, "username"), USERNAME_MAX, username.into())?,
            email: required_text(user_arg("new", 3, "email"), EMAIL_MAX, email.into())?,
            member_department_code: None,
            kind: UserKind::Base,
            audit: AuditStamp::default(),
        })
    }

    /// Builds a manager.
    pub fn new_manager(
        key: KeyHash,
        username: impl Into<String>,
        email: impl Into<String>,
        profile: ManagerProfile,
    ) -> Result<Self, FieldError> {
        let mut record = Self::new(key, username, email)?;
        record.kind = UserKind::Manager(profile);
        Ok(record)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn member_department_code(&self) -> Option<&str> {
        self.member_department_code.as_deref()
    }

    pub fn user_kind(&self) -> &UserKind {
        &self.kind
    }

    pub fn is_manager(&self) -> bool {
        matches!(self.kind, UserKind::Manager(_))
    }

    pub fn manager(&self) -> Option<&ManagerProfile> {
        match &self.kind {
            UserKind::Manager(profile) => Some(profile),
            UserKind::Base => None,
        }
    }

    pub fn manager_mut(&mut self) -> Option<&mut ManagerProfile> {
        match &mut self.kind {
            UserKind::Manager(profile) => Some(profile),
            UserKind::Base => None,
        }
    }

    /// Assigns a caller-chosen key. Rejects the null sentinel.
    pub fn set_key(&mut self, key: KeyHash) -> Result<(), FieldError> {
        self.key = required_key(user_arg("setKey", 1, "key"), key)?;
        Ok(())
    }

    pub fn set_username(&mut self, username: impl Into<String>) -> Result<(), FieldError> {
        self.username = required_text(
            user_arg("setUsername", 1, "username"),
            USERNAME_MAX,
            username.into(),
        )?;
        Ok(())
    }

    pub fn set_email(&mut self, email: impl Into<String>) -> Result<(), FieldError> {
        self.email = required_text(user_arg("setEmail", 1, "email"), EMAIL_MAX, email.into())?;
        Ok(())
    }

    pub fn set_member_department_code(&mut self, code: Option<String>) -> Result<(), FieldError> {
        self.member_department_code = optional_text(
            user_arg("setMemberDepartmentCode", 1, "memberDepartmentCode"),
            DEPARTMENT_CODE_MAX,
            code,
        )?;
        Ok(())
    }

    /// Copies base user fields and `updated_by` from `candidate`.
    pub(crate) fn absorb_base_fields(&mut self, candidate: &UserRecord) {
        self.username = candidate.username.clone();
        self.email = candidate.email.clone();
        self.member_department_code = candidate.member_department_code.clone();
        self.audit.absorb_update(&candidate.audit);
    }

    /// Copies base fields plus the manager profile.
    pub(crate) fn absorb_manager_fields(&mut self, candidate: &UserRecord) {
        self.absorb_base_fields(candidate);
        if let (UserKind::Manager(target), UserKind::Manager(source)) =
            (&mut self.kind, &candidate.kind)
        {
            *target = source.clone();
        }
    }

    /// Reassembles a stored row. Callers must run `validate()` afterwards.
    pub(crate) fn from_parts(
        key: KeyHash,
        username: String,
        email: String,
        member_department_code: Option<String>,
        kind: UserKind,
        audit: AuditStamp,
    ) -> Self {
        Self {
            key,
            username,
            email,
            member_department_code,
            kind,
            audit,
        }
    }

    fn canonical(&self) -> (&KeyHash, &str, &str, Option<&str>, &UserKind) {
        (
            &self.key,
            self.username.as_str(),
            self.email.as_str(),
            self.member_department_code.as_deref(),
            &self.kind,
        )
    }
}

impl EntityRecord for UserRecord {
    fn kind(&self) -> EntityKind {
        if self.is_manager() {
            EntityKind::Manager
        } else {
            EntityKind::User
        }
    }

    fn key(&self) -> KeyHash {
        self.key
    }

    fn assign_key(&mut self, key: KeyHash) {
        self.key = key;
    }

    fn stamp_created(&mut self, now_ms: i64) {
        self.audit.stamp_created(now_ms);
    }

    fn stamp_updated(&mut self, now_ms: i64) {
        self.audit.stamp_updated(now_ms);
    }

    fn validate(&self) -> Result<(), FieldError> {
        let entity = EntityRecord::kind(self);
        check_required_text(
            ArgRef::new(entity, "validate", 1, "username"),
            USERNAME_MAX,
            &self.username,
        )?;
        check_required_text(
            ArgRef::new(entity, "validate", 1, "email"),
            EMAIL_MAX,
            &self.email,
        )?;
        check_optional_text(
            ArgRef::new(entity, "validate", 1, "memberDepartmentCode"),
            DEPARTMENT_CODE_MAX,
            self.member_department_code.as_deref(),
        )?;
        if let UserKind::Manager(profile) = &self.kind {
            profile.validate(self.key)?;
        }
        self.audit.validate(entity)
    }

    fn digest(&self) -> i32 {
        let builder = DigestBuilder::new()
            .key(&self.key)
            .text(&self.username)
            .text(&self.email)
            .opt_text(self.member_department_code.as_deref());
        match &self.kind {
            UserKind::Base => builder.finish(),
            UserKind::Manager(profile) => builder
                .text(&profile.title)
                .text(&profile.department_code)
                .opt_key(profile.parent_department.as_ref())
                .finish(),
        }
    }
}

impl PartialEq for UserRecord {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for UserRecord {}

impl PartialOrd for UserRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UserRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical().cmp(&other.canonical())
    }
}

impl Hash for UserRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.digest());
    }
}

fn user_arg(operation: &'static str, index: u32, name: &'static str) -> ArgRef {
    ArgRef::new(EntityKind::User, operation, index, name)
}

fn manager_arg(operation: &'static str, index: u32, name: &'static str) -> ArgRef {
    ArgRef::new(EntityKind::Manager, operation, index, name)
}
