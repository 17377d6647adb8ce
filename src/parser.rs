// 🏗️ Row Parser - CSV upload → ImportRow
//
// Headers in the uploaded sheets drift ("Mobile ", "Mobile Number",
// "mobile_number"), so columns are matched through an alias list per field.
// Everything stays a raw string here; normalization happens later.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

// ============================================================================
// LOGICAL FIELDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportField {
    Sector,
    Resource,
    Exhibition,
    Title,
    FirstName,
    LastName,
    Gender,
    Company,
    Email,
    MobileNumber,
    Country,
    City,
    JobTitle,
    Website,
    Phone,
}

impl ImportField {
    pub const ALL: [ImportField; 15] = [
        ImportField::Sector,
        ImportField::Resource,
        ImportField::Exhibition,
        ImportField::Title,
        ImportField::FirstName,
        ImportField::LastName,
        ImportField::Gender,
        ImportField::Company,
        ImportField::Email,
        ImportField::MobileNumber,
        ImportField::Country,
        ImportField::City,
        ImportField::JobTitle,
        ImportField::Website,
        ImportField::Phone,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ImportField::Sector => "sector",
            ImportField::Resource => "resource",
            ImportField::Exhibition => "exhibition",
            ImportField::Title => "title",
            ImportField::FirstName => "first_name",
            ImportField::LastName => "last_name",
            ImportField::Gender => "gender",
            ImportField::Company => "company",
            ImportField::Email => "email",
            ImportField::MobileNumber => "mobile_number",
            ImportField::Country => "country",
            ImportField::City => "city",
            ImportField::JobTitle => "job_title",
            ImportField::Website => "website",
            ImportField::Phone => "phone",
        }
    }

    /// Header spellings seen in uploaded sheets (compared trimmed, lowercase)
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            ImportField::Sector => &["sector"],
            ImportField::Resource => &["resource", "source"],
            ImportField::Exhibition => &["exhibition", "exhibition name"],
            ImportField::Title => &["title"],
            ImportField::FirstName => &["first_name", "f name", "first name"],
            ImportField::LastName => &["last_name", "l name", "last name"],
            ImportField::Gender => &["gender", "sex"],
            ImportField::Company => &["company", "company name"],
            ImportField::Email => &["email", "e-mail", "email address"],
            ImportField::MobileNumber => &["mobile_number", "mobile", "mobile number"],
            ImportField::Country => &["country"],
            ImportField::City => &["city"],
            ImportField::JobTitle => &["job_title", "job title"],
            ImportField::Website => &["website", "web site"],
            ImportField::Phone => &["phone", "phone 1", "phones"],
        }
    }

    /// Match one header cell against the alias table
    pub fn guess(header: &str) -> Option<ImportField> {
        let header = header.trim().to_lowercase();
        ImportField::ALL
            .iter()
            .copied()
            .find(|field| field.aliases().iter().any(|alias| *alias == header))
    }
}

// ============================================================================
// COLUMN MAP
// ============================================================================

/// Header position → logical field, guessed from the header row
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    columns: HashMap<ImportField, usize>,
}

impl ColumnMap {
    /// First matching column wins; unknown headers are ignored
    pub fn guess<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut columns = HashMap::new();
        for (idx, header) in headers.into_iter().enumerate() {
            match ImportField::guess(header) {
                Some(field) => {
                    columns.entry(field).or_insert(idx);
                }
                None => debug!(header, "ignoring unmapped column"),
            }
        }
        ColumnMap { columns }
    }

    pub fn position(&self, field: ImportField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn is_mapped(&self, field: ImportField) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ============================================================================
// IMPORT ROW (the working row)
// ============================================================================

/// One uploaded row, raw strings per logical column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportRow {
    /// 1-based line in the uploaded file (header is line 1)
    pub line_number: usize,

    pub sector: Option<String>,
    pub resource: Option<String>,
    pub exhibition: Option<String>,
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub mobile_number: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub job_title: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
}

impl ImportRow {
    pub fn new(line_number: usize) -> Self {
        ImportRow {
            line_number,
            ..ImportRow::default()
        }
    }

    pub fn get(&self, field: ImportField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    /// Builder pattern: set one field
    pub fn with(mut self, field: ImportField, value: impl Into<String>) -> Self {
        self.set(field, Some(value.into()));
        self
    }

    pub fn set(&mut self, field: ImportField, value: Option<String>) {
        *self.slot_mut(field) = value;
    }

    fn slot(&self, field: ImportField) -> &Option<String> {
        match field {
            ImportField::Sector => &self.sector,
            ImportField::Resource => &self.resource,
            ImportField::Exhibition => &self.exhibition,
            ImportField::Title => &self.title,
            ImportField::FirstName => &self.first_name,
            ImportField::LastName => &self.last_name,
            ImportField::Gender => &self.gender,
            ImportField::Company => &self.company,
            ImportField::Email => &self.email,
            ImportField::MobileNumber => &self.mobile_number,
            ImportField::Country => &self.country,
            ImportField::City => &self.city,
            ImportField::JobTitle => &self.job_title,
            ImportField::Website => &self.website,
            ImportField::Phone => &self.phone,
        }
    }

    fn slot_mut(&mut self, field: ImportField) -> &mut Option<String> {
        match field {
            ImportField::Sector => &mut self.sector,
            ImportField::Resource => &mut self.resource,
            ImportField::Exhibition => &mut self.exhibition,
            ImportField::Title => &mut self.title,
            ImportField::FirstName => &mut self.first_name,
            ImportField::LastName => &mut self.last_name,
            ImportField::Gender => &mut self.gender,
            ImportField::Company => &mut self.company,
            ImportField::Email => &mut self.email,
            ImportField::MobileNumber => &mut self.mobile_number,
            ImportField::Country => &mut self.country,
            ImportField::City => &mut self.city,
            ImportField::JobTitle => &mut self.job_title,
            ImportField::Website => &mut self.website,
            ImportField::Phone => &mut self.phone,
        }
    }

    /// Trimmed value, None when blank
    pub fn text(&self, field: ImportField) -> Option<String> {
        self.get(field)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// Raw row as JSON, keyed by logical field name (stored with failed rows)
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for field in ImportField::ALL {
            if let Some(value) = self.get(field) {
                map.insert(field.name().to_string(), serde_json::json!(value));
            }
        }
        serde_json::Value::Object(map)
    }
}

// ============================================================================
// CSV READING
// ============================================================================

/// Read every data row of an upload
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<ImportRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.byte_headers().context("Failed to read CSV header row")?.clone();
    let headers: Vec<String> = headers
        .iter()
        .map(|h| String::from_utf8_lossy(h).into_owned())
        .collect();
    let columns = ColumnMap::guess(headers.iter().map(String::as_str));

    if columns.is_empty() {
        warn!("no recognizable columns in upload");
    } else if !columns.is_mapped(ImportField::Email) && !columns.is_mapped(ImportField::MobileNumber) {
        warn!("upload has neither an email nor a mobile column; every row will be rejected");
    }

    let mut rows = Vec::new();
    // Non-UTF-8 cells (Windows-1252 exports) degrade to U+FFFD
    for (idx, result) in rdr.byte_records().enumerate() {
        let record = result.with_context(|| format!("Failed to read CSV line {}", idx + 2))?;
        let mut row = ImportRow::new(idx + 2);

        for field in ImportField::ALL {
            if let Some(value) = columns.position(field).and_then(|pos| record.get(pos)) {
                row.set(field, Some(String::from_utf8_lossy(value).into_owned()));
            }
        }

        rows.push(row);
    }

    debug!(rows = rows.len(), mapped_columns = columns.len(), "upload parsed");
    Ok(rows)
}

pub fn load_csv(csv_path: &Path) -> Result<Vec<ImportRow>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file: {:?}", csv_path))?;
    read_rows(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_matches_sheet_headers() {
        assert_eq!(ImportField::guess("Mobile "), Some(ImportField::MobileNumber));
        assert_eq!(ImportField::guess("Mobile Number"), Some(ImportField::MobileNumber));
        assert_eq!(ImportField::guess("F Name "), Some(ImportField::FirstName));
        assert_eq!(ImportField::guess("Phone 1 "), Some(ImportField::Phone));
        assert_eq!(ImportField::guess("WebSite "), Some(ImportField::Website));
        assert_eq!(ImportField::guess("Sex "), Some(ImportField::Gender));
        assert_eq!(ImportField::guess("Exhibition Name"), Some(ImportField::Exhibition));
        assert_eq!(ImportField::guess("Notes"), None);
    }

    #[test]
    fn test_column_map_keeps_first_match() {
        let columns = ColumnMap::guess(vec!["Email", "Notes", "email"]);
        assert_eq!(columns.position(ImportField::Email), Some(0));
        assert!(!columns.is_mapped(ImportField::Phone));
        assert_eq!(columns.len(), 1);
    }

    #[test]
    fn test_read_rows_maps_columns_and_lines() {
        let csv = "Sector,F Name ,Email ,Mobile ,Ignored\n\
                   Cardiology,Sara,sara@example.com,0512345678,x\n\
                   ,,,,\n";

        let rows = read_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].line_number, 2);
        assert_eq!(rows[0].get(ImportField::Sector), Some("Cardiology"));
        assert_eq!(rows[0].get(ImportField::FirstName), Some("Sara"));
        assert_eq!(rows[0].get(ImportField::MobileNumber), Some("0512345678"));
        assert_eq!(rows[0].get(ImportField::Phone), None);

        assert_eq!(rows[1].line_number, 3);
        assert_eq!(rows[1].text(ImportField::Email), None);
    }

    #[test]
    fn test_read_rows_keeps_quoted_multiline_cells() {
        let csv = "Email,Phone\nsara@example.com,\"0512345678\n0598765432\"\n";
        let rows = read_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].get(ImportField::Phone), Some("0512345678\n0598765432"));
    }

    #[test]
    fn test_read_rows_survives_non_utf8_cell() {
        let mut csv = b"F Name,Email\n".to_vec();
        csv.extend_from_slice(b"Jos\xe9,jose@example.com\n");
        csv.extend_from_slice(b"Sara,sara@example.com\n");

        let rows = read_rows(csv.as_slice()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(ImportField::FirstName), Some("Jos\u{FFFD}"));
        assert_eq!(rows[0].get(ImportField::Email), Some("jose@example.com"));
        assert_eq!(rows[1].get(ImportField::FirstName), Some("Sara"));
    }

    #[test]
    fn test_to_json_uses_field_names() {
        let row = ImportRow::new(4)
            .with(ImportField::Email, "sara@example.com")
            .with(ImportField::MobileNumber, "0512345678");

        let json = row.to_json();
        assert_eq!(json["email"], "sara@example.com");
        assert_eq!(json["mobile_number"], "0512345678");
        assert!(json.get("phone").is_none());
    }
}
