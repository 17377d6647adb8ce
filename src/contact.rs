// ✉️ Contact Normalizer - email, mobile and secondary phones for one row
//
// Degraded fields are nulled and reported as `FieldIssue`s; they never fail
// the row. Whether the surviving contacts are usable against the store is the
// Reconciler's call.

use crate::entities::PhoneEntry;
use crate::error::Result;
use crate::parser::{ImportField, ImportRow};
use crate::phone::PhoneNormalizer;
use crate::rules::RuleSet;
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A contact field that was dropped during normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: ImportField,
    pub value: String,
    pub reason: String,
}

impl FieldIssue {
    fn new(field: ImportField, value: &str, reason: impl Into<String>) -> Self {
        FieldIssue {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedContacts {
    pub email: Option<String>,
    pub mobile_number: Option<String>,
    pub phone: Vec<PhoneEntry>,
    pub issues: Vec<FieldIssue>,
}

/// Trim ordinary whitespace plus the invisible characters spreadsheets leave
/// around pasted addresses (NBSP, zero-width space, BOM)
pub fn trim_contact(raw: &str) -> &str {
    raw.trim_matches(|c: char| c.is_whitespace() || c == '\u{200B}' || c == '\u{FEFF}')
}

pub struct ContactNormalizer {
    phones: PhoneNormalizer,
}

impl ContactNormalizer {
    pub fn new(rules: RuleSet) -> Self {
        ContactNormalizer {
            phones: PhoneNormalizer::new(rules),
        }
    }

    pub fn with_phone_normalizer(phones: PhoneNormalizer) -> Self {
        ContactNormalizer { phones }
    }

    pub fn rules(&self) -> &RuleSet {
        self.phones.rules()
    }

    pub fn phones(&self) -> &PhoneNormalizer {
        &self.phones
    }

    /// Ok(None) for blank input, Err(reason) for an unusable address
    fn check_email(&self, raw: Option<&str>) -> std::result::Result<Option<String>, String> {
        let email = match raw.map(trim_contact) {
            None | Some("") => return Ok(None),
            Some(email) => email,
        };

        if self.rules().is_valid_email(email) {
            Ok(Some(email.to_string()))
        } else {
            Err("invalid email address".to_string())
        }
    }

    /// Trimmed, pattern-checked email; case is preserved
    pub fn normalize_email(&self, raw: Option<&str>) -> Option<String> {
        match self.check_email(raw) {
            Ok(email) => email,
            Err(reason) => {
                warn!(value = raw.unwrap_or_default(), %reason, "email dropped");
                None
            }
        }
    }

    /// `normalize_email`, then None when a record other than `exclude` owns it
    pub fn normalize_email_unique<S: RecordStore + ?Sized>(
        &self,
        raw: Option<&str>,
        store: &S,
        exclude: Option<i64>,
    ) -> Result<Option<String>> {
        let Some(email) = self.normalize_email(raw) else {
            return Ok(None);
        };

        if store.record_exists_by_email(&email, exclude)? {
            warn!(%email, "email already belongs to another record");
            return Ok(None);
        }

        Ok(Some(email))
    }

    pub fn normalize_phone_like(&self, raw: Option<&str>) -> Option<String> {
        raw.and_then(|value| self.phones.normalize_phone_like(value))
    }

    /// Normalize every contact field of a row
    pub fn normalize(&self, row: &ImportRow) -> NormalizedContacts {
        let mut contacts = NormalizedContacts::default();

        match self.check_email(row.get(ImportField::Email)) {
            Ok(email) => contacts.email = email,
            Err(reason) => contacts.issues.push(FieldIssue::new(
                ImportField::Email,
                row.get(ImportField::Email).unwrap_or_default(),
                reason,
            )),
        }

        if let Some(raw) = row.text(ImportField::MobileNumber) {
            match self.phones.normalize(&raw) {
                Ok(mobile) => contacts.mobile_number = Some(mobile),
                Err(reason) => contacts.issues.push(FieldIssue::new(
                    ImportField::MobileNumber,
                    &raw,
                    reason.to_string(),
                )),
            }
        }

        if let Some(raw) = row.text(ImportField::Phone) {
            let list = self.phones.normalize_list(&raw);

            for (value, reason) in list.rejected {
                contacts
                    .issues
                    .push(FieldIssue::new(ImportField::Phone, &value, reason.to_string()));
            }

            let mut secondary: Vec<String> = list
                .accepted
                .into_iter()
                .filter(|number| contacts.mobile_number.as_ref() != Some(number))
                .collect();

            // A lone secondary number stands in for a missing mobile
            if contacts.mobile_number.is_none() && secondary.len() == 1 {
                contacts.mobile_number = secondary.pop();
            }

            contacts.phone = secondary.into_iter().map(PhoneEntry::new).collect();
        }

        for issue in &contacts.issues {
            warn!(
                line = row.line_number,
                field = issue.field.name(),
                value = %issue.value,
                reason = %issue.reason,
                "field degraded"
            );
        }

        contacts
    }
}

impl Default for ContactNormalizer {
    fn default() -> Self {
        ContactNormalizer::with_phone_normalizer(PhoneNormalizer::default())
    }
}
