// 🏷️ Association Entity - named lookup values tagged with a category type
//
// (name, type) is the natural key used for deduplication during import.
// The store does not enforce it; the lookup resolver re-checks before creating.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ASSOCIATION TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationType {
    /// Exhibition the contact was collected at
    Exhibition,

    /// Lead source (e.g. "Website", "Walk-in")
    Resource,

    /// Industry sector (e.g. "Cardiology")
    Sector,
}

impl AssociationType {
    /// Resolution order used by the importer
    pub const ALL: [AssociationType; 3] = [
        AssociationType::Sector,
        AssociationType::Resource,
        AssociationType::Exhibition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationType::Exhibition => "exhibition",
            AssociationType::Resource => "resource",
            AssociationType::Sector => "sector",
        }
    }

    /// Column on the records table that references this type
    pub fn record_column(&self) -> &'static str {
        match self {
            AssociationType::Exhibition => "exhibition_id",
            AssociationType::Resource => "resource_id",
            AssociationType::Sector => "sector_id",
        }
    }
}

impl fmt::Display for AssociationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssociationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exhibition" => Ok(AssociationType::Exhibition),
            "resource" => Ok(AssociationType::Resource),
            "sector" => Ok(AssociationType::Sector),
            other => Err(format!("unknown association type: {}", other)),
        }
    }
}

// ============================================================================
// ASSOCIATION ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub id: i64,

    /// Free text as it appeared in the upload (e.g. "Cardiology")
    pub name: String,

    #[serde(rename = "type")]
    pub association_type: AssociationType,

    pub other_info: Option<String>,

    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_association_type_round_trips_through_str() {
        for kind in AssociationType::ALL {
            assert_eq!(kind.as_str().parse::<AssociationType>().unwrap(), kind);
        }
        assert_eq!(" Sector ".parse::<AssociationType>().unwrap(), AssociationType::Sector);
        assert!("classification".parse::<AssociationType>().is_err());
    }

    #[test]
    fn test_association_type_serializes_lowercase() {
        let json = serde_json::to_string(&AssociationType::Exhibition).unwrap();
        assert_eq!(json, "\"exhibition\"");
    }
}
