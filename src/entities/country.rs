// 🌍 Country / State reference data
//
// Read-only from the import pipeline's point of view. Countries resolve by
// exact code first, then exact name; states resolve by name within a country.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub id: i64,

    /// ISO 3166-1 alpha-2 code (e.g. "SA")
    pub code: String,

    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub id: i64,
    pub country_id: i64,
    pub name: String,
}
