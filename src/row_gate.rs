// 🚧 Row Gate - skip rows that carry no usable data
//
// Uploaded sheets routinely end with blank (or whitespace-only) rows. They
// are skipped before any lookup creation or store access, and they are not
// failures.

use crate::parser::{ImportField, ImportRow};

/// Fields that make a row worth processing
pub const SIGNAL_FIELDS: [ImportField; 10] = [
    ImportField::Sector,
    ImportField::Resource,
    ImportField::Exhibition,
    ImportField::Title,
    ImportField::FirstName,
    ImportField::LastName,
    ImportField::Email,
    ImportField::MobileNumber,
    ImportField::Country,
    ImportField::Phone,
];

pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// True when every signal field is blank
pub fn should_skip(row: &ImportRow) -> bool {
    SIGNAL_FIELDS.iter().all(|field| is_blank(row.get(*field)))
}
