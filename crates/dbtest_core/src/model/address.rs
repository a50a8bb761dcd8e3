//! Postal address owned by a user (appdb `app_addr`).
//!
//! # Invariants
//! - `owner` (`refUID`) is a non-null user key; it is a lookup reference,
//!   resolved against secdb at write time.
//! - `(owner, name)` is unique in storage.
//! - Canonical order: key, owner, name, contact, apartment, street, street2,
//!   city, province, country, postal code.

use crate::model::field::{
    check_optional_text, check_required_text, optional_text, required_key, required_text, ArgRef,
    DigestBuilder, FieldError,
};
use crate::model::key_hash::KeyHash;
use crate::model::{AuditStamp, EntityKind, EntityRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

pub const ADDR_NAME_MAX: usize = 24;
pub const ADDR_CONTACT_MAX: usize = 64;
pub const ADDR_APARTMENT_MAX: usize = 16;
pub const ADDR_STREET_MAX: usize = 64;
pub const ADDR_STREET2_MAX: usize = 64;
pub const ADDR_CITY_MAX: usize = 64;
pub const ADDR_PROVINCE_MAX: usize = 32;
pub const ADDR_COUNTRY_MAX: usize = 32;
pub const ADDR_POSTAL_CODE_MAX: usize = 16;

/// Optional address lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressLines {
    pub contact: Option<String>,
    pub apartment: Option<String>,
    pub street: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

impl AddressLines {
    fn check(&self, operation: &'static str) -> Result<(), FieldError> {
        for (name, max, value) in self.bounded_fields() {
            check_optional_text(addr_arg(operation, 1, name), max, value)?;
        }
        Ok(())
    }

    fn bounded_fields(&self) -> [(&'static str, usize, Option<&str>); 8] {
        [
            ("addressContact", ADDR_CONTACT_MAX, self.contact.as_deref()),
            ("addressApartment", ADDR_APARTMENT_MAX, self.apartment.as_deref()),
            ("addressStreet", ADDR_STREET_MAX, self.street.as_deref()),
            ("addressStreet2", ADDR_STREET2_MAX, self.street2.as_deref()),
            ("addressCity", ADDR_CITY_MAX, self.city.as_deref()),
            ("addressProvince", ADDR_PROVINCE_MAX, self.province.as_deref()),
            ("addressCountry", ADDR_COUNTRY_MAX, self.country.as_deref()),
            ("addressPostalCode", ADDR_POSTAL_CODE_MAX, self.postal_code.as_deref()),
        ]
    }
}

/// Canonical address record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressRecord {
    key: KeyHash,
    owner: KeyHash,
    name: String,
    lines: AddressLines,
    pub audit: AuditStamp,
}

impl AddressRecord {
    /// Builds an address for `owner`. `key` may be `KeyHash::NULL`.
    pub fn new(key: KeyHash, owner: KeyHash, name: impl Into<String>) -> Result<Self, FieldError> {
        Ok(Self {
            key,
            owner: required_key(addr_arg("new", 2, "refUID"), owner)?,
            name: required_text(addr_arg("new", 3, "addressName"), ADDR_NAME_MAX, name.into())?,
            lines: AddressLines::default(),
            audit: AuditStamp::default(),
        })
    }

    /// Replaces every optional line at once; all-or-nothing.
    pub fn with_lines(mut self, lines: AddressLines) -> Result<Self, FieldError> {
        lines.check("withLines")?;
        self.lines = lines;
        Ok(self)
    }

    pub(crate) fn from_parts(
        key: KeyHash,
        owner: KeyHash,
        name: String,
        lines: AddressLines,
        audit: AuditStamp,
    ) -> Self {
        Self {
            key,
            owner,
            name,
            lines,
            audit,
        }
    }

    pub fn owner(&self) -> KeyHash {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lines(&self) -> &AddressLines {
        &self.lines
    }

    pub fn set_key(&mut self, key: KeyHash) -> Result<(), FieldError> {
        self.key = required_key(addr_arg("setKey", 1, "key"), key)?;
        Ok(())
    }

    pub fn set_owner(&mut self, owner: KeyHash) -> Result<(), FieldError> {
        self.owner = required_key(addr_arg("setRefUID", 1, "refUID"), owner)?;
        Ok(())
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), FieldError> {
        self.name = required_text(
            addr_arg("setAddressName", 1, "addressName"),
            ADDR_NAME_MAX,
            name.into(),
        )?;
        Ok(())
    }

    pub fn set_contact(&mut self, value: Option<String>) -> Result<(), FieldError> {
        self.lines.contact = line("setAddressContact", "addressContact", ADDR_CONTACT_MAX, value)?;
        Ok(())
    }

    pub fn set_apartment(&mut self, value: Option<String>) -> Result<(), FieldError> {
        self.lines.apartment = line(
            "setAddressApartment",
            "addressApartment",
            ADDR_APARTMENT_MAX,
            value,
        )?;
        Ok(())
    }

    pub fn set_street(&mut self, value: Option<String>) -> Result<(), FieldError> {
        self.lines.street = line("setAddressStreet", "addressStreet", ADDR_STREET_MAX, value)?;
        Ok(())
    }

    pub fn set_street2(&mut self, value: Option<String>) -> Result<(), FieldError> {
        self.lines.street2 = line("setAddressStreet2", "addressStreet2", ADDR_STREET2_MAX, value)?;
        Ok(())
    }

    pub fn set_city(&mut self, value: Option<String>) -> Result<(), FieldError> {
        self.lines.city = line("setAddressCity", "addressCity", ADDR_CITY_MAX, value)?;
        Ok(())
    }

    pub fn set_province(&mut self, value: Option<String>) -> Result<(), FieldError> {
        self.lines.province = line(
            "setAddressProvince",
            "addressProvince",
            ADDR_PROVINCE_MAX,
            value,
        )?;
        Ok(())
    }

    pub fn set_country(&mut self, value: Option<String>) -> Result<(), FieldError> {
        self.lines.country = line("setAddressCountry", "addressCountry", ADDR_COUNTRY_MAX, value)?;
        Ok(())
    }

    pub fn set_postal_code(&mut self, value: Option<String>) -> Result<(), FieldError> {
        self.lines.postal_code = line(
            "setAddressPostalCode",
            "addressPostalCode",
            ADDR_POSTAL_CODE_MAX,
            value,
        )?;
        Ok(())
    }

    /// Copies every mutable field except key and creation provenance.
    pub(crate) fn absorb_update(&mut self, candidate: &AddressRecord) {
        self.owner = candidate.owner;
        self.name = candidate.name.clone();
        self.lines = candidate.lines.clone();
        self.audit.absorb_update(&candidate.audit);
    }

    fn canonical(&self) -> (&KeyHash, &KeyHash, &str, &AddressLines) {
        (&self.key, &self.owner, self.name.as_str(), &self.lines)
    }
}

impl EntityRecord for AddressRecord {
    fn kind(&self) -> EntityKind {
        EntityKind::Address
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
        required_key(addr_arg("validate", 1, "refUID"), self.owner)?;
        check_required_text(addr_arg("validate", 1, "addressName"), ADDR_NAME_MAX, &self.name)?;
        self.lines.check("validate")?;
        self.audit.validate(EntityKind::Address)
    }

    fn digest(&self) -> i32 {
        self.lines
            .bounded_fields()
            .iter()
            .fold(
                DigestBuilder::new()
                    .key(&self.key)
                    .key(&self.owner)
                    .text(&self.name),
                |builder, (_, _, value)| builder.opt_text(*value),
            )
            .finish()
    }
}

impl PartialEq for AddressRecord {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for AddressRecord {}

impl PartialOrd for AddressRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AddressRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical().cmp(&other.canonical())
    }
}

impl Hash for AddressRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.digest());
    }
}

fn addr_arg(operation: &'static str, index: u32, name: &'static str) -> ArgRef {
    ArgRef::new(EntityKind::Address, operation, index, name)
}

fn line(
    operation: &'static str,
    name: &'static str,
    max: usize,
    value: Option<String>,
) -> Result<Option<String>, FieldError> {
    optional_text(addr_arg(operation, 1, name), max, value)
}

#[cfg(test)]
mod tests {
    use super::{AddressLines, AddressRecord};
    use crate::model::field::FieldError;
    use crate::model::key_hash::KeyHash;

    #[test]
    fn new_rejects_null_owner() {
        let err = AddressRecord::new(KeyHash::NULL, KeyHash::NULL, "Home").unwrap_err();
        assert!(matches!(err, FieldError::MissingArgument(arg) if arg.name == "refUID"));
    }

    #[test]
    fn with_lines_is_all_or_nothing() {
        let address = AddressRecord::new(KeyHash::NULL, KeyHash::from_seed("u"), "Home").unwrap();
        let lines = AddressLines {
            city: Some("Yorkton".to_string()),
            apartment: Some("x".repeat(17)),
            ..AddressLines::default()
        };
        assert!(address.clone().with_lines(lines).is_err());
        assert_eq!(address.lines(), &AddressLines::default());
    }
}
