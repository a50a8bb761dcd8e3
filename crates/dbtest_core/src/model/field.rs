//! Field validation and digest helpers shared by every record kind.
//!
//! # Invariants
//! - Validation never mutates: helpers return the accepted value and callers
//!   assign only on success.
//! - Text length is measured in Unicode scalar values, matching SQLite
//!   `length()` on TEXT columns.

use crate::model::key_hash::KeyHash;
use crate::model::EntityKind;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Multiplier for record digests.
pub const DIGEST_MULTIPLIER: i32 = 31;

/// Identifies one argument of one operation for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgRef {
    pub entity: EntityKind,
    pub operation: &'static str,
    pub index: u32,
    pub name: &'static str,
}

impl ArgRef {
    pub const fn new(
        entity: EntityKind,
        operation: &'static str,
        index: u32,
        name: &'static str,
    ) -> Self {
        Self {
            entity,
            operation,
            index,
            name,
        }
    }
}

impl Display for ArgRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} argument {} `{}`",
            self.entity, self.operation, self.index, self.name
        )
    }
}

/// Rejected field assignment or record validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// Required value absent or empty.
    MissingArgument(ArgRef),
    /// Text longer than the column bound.
    ArgumentOverflow {
        arg: ArgRef,
        length: usize,
        max: usize,
    },
    /// Value present but unusable (null key, wrong record variant).
    InvalidArgument { arg: ArgRef, reason: String },
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingArgument(arg) => write!(f, "{arg} is required"),
            Self::ArgumentOverflow { arg, length, max } => {
                write!(f, "{arg} length {length} exceeds maximum {max}")
            }
            Self::InvalidArgument { arg, reason } => write!(f, "{arg} is invalid: {reason}"),
        }
    }
}

impl Error for FieldError {}

/// Accepts a required, bounded text value.
pub(crate) fn required_text(arg: ArgRef, max: usize, value: String) -> Result<String, FieldError> {
    check_required_text(arg, max, &value)?;
    Ok(value)
}

/// Checks an already-assigned required text value.
pub(crate) fn check_required_text(arg: ArgRef, max: usize, value: &str) -> Result<(), FieldError> {
    if value.is_empty() {
        return Err(FieldError::MissingArgument(arg));
    }
    check_length(arg, max, value)
}

/// Checks an already-assigned optional text value.
pub(crate) fn check_optional_text(
    arg: ArgRef,
    max: usize,
    value: Option<&str>,
) -> Result<(), FieldError> {
    match value {
        Some(text) => check_required_text(arg, max, text),
        None => Ok(()),
    }
}

/// Accepts an optional, bounded text value. `Some("")` is rejected; clear with
/// `None`.
pub(crate) fn optional_text(
    arg: ArgRef,
    max: usize,
    value: Option<String>,
) -> Result<Option<String>, FieldError> {
    match value {
        Some(text) => required_text(arg, max, text).map(Some),
        None => Ok(None),
    }
}

/// Accepts a mandatory, non-null key.
pub(crate) fn required_key(arg: ArgRef, key: KeyHash) -> Result<KeyHash, FieldError> {
    if key.is_null() {
        return Err(FieldError::MissingArgument(arg));
    }
    Ok(key)
}

/// Accepts an optional key; `Some(NULL)` is rejected.
pub(crate) fn optional_key(arg: ArgRef, key: Option<KeyHash>) -> Result<Option<KeyHash>, FieldError> {
    match key {
        Some(value) => required_key(arg, value).map(Some),
        None => Ok(None),
    }
}

fn check_length(arg: ArgRef, max: usize, value: &str) -> Result<(), FieldError> {
    let length = value.chars().count();
    if length > max {
        return Err(FieldError::ArgumentOverflow { arg, length, max });
    }
    Ok(())
}

/// Accumulates a record digest field by field.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestBuilder {
    acc: i32,
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, part: i32) -> Self {
        self.acc = self.acc.wrapping_mul(DIGEST_MULTIPLIER).wrapping_add(part);
        self
    }

    pub fn key(self, key: &KeyHash) -> Self {
        self.push(key.digest())
    }

    pub fn opt_key(self, key: Option<&KeyHash>) -> Self {
        self.push(key.map_or(0, KeyHash::digest))
    }

    pub fn text(self, value: &str) -> Self {
        self.push(text_digest(value))
    }

    pub fn opt_text(self, value: Option<&str>) -> Self {
        self.push(value.map_or(0, text_digest))
    }

    pub fn opt_i64(self, value: Option<i64>) -> Self {
        self.push(value.map_or(0, |v| (v ^ (v >> 32)) as i32))
    }

    pub fn finish(self) -> i32 {
        self.acc
    }
}

fn text_digest(value: &str) -> i32 {
    value.encode_utf16().fold(0_i32, |acc, unit| {
        acc.wrapping_mul(DIGEST_MULTIPLIER)
            .wrapping_add(i32::from(unit))
    })
}
