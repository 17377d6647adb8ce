// 📇 Record Entity - a contact entry collected at an exhibition
//
// Email is the merge key: re-importing a row with the same email updates the
// existing record. A record must keep at least one of email / mobile_number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Secondary phone number, stored as `[{"number": "+9665..."}]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneEntry {
    pub number: String,
}

impl PhoneEntry {
    pub fn new(number: impl Into<String>) -> Self {
        PhoneEntry {
            number: number.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// None until the record has been saved
    pub id: Option<i64>,

    // ========================================================================
    // ASSOCIATIONS
    // ========================================================================
    pub exhibition_id: Option<i64>,
    pub resource_id: Option<i64>,
    pub sector_id: Option<i64>,

    // ========================================================================
    // PERSON
    // ========================================================================
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,

    // ========================================================================
    // CONTACT (normalized)
    // ========================================================================
    pub email: Option<String>,
    pub mobile_number: Option<String>,
    #[serde(default)]
    pub phone: Vec<PhoneEntry>,

    // ========================================================================
    // LOCATION (country id, state id)
    // ========================================================================
    pub country: Option<i64>,
    pub city: Option<i64>,

    // ========================================================================
    // ORGANIZATION
    // ========================================================================
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub website: Option<String>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// At least one usable contact channel
    pub fn has_contact(&self) -> bool {
        self.email.is_some() || self.mobile_number.is_some()
    }

    /// "title first last", skipping blank parts
    pub fn full_name(&self) -> String {
        [&self.title, &self.first_name, &self.last_name]
            .iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Secondary numbers joined for display / export
    pub fn phone_list(&self) -> String {
        self.phone
            .iter()
            .map(|entry| entry.number.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
