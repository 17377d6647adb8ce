// 📤 Export - records back out as CSV, ids rendered as names

use crate::db::SqliteStore;
use crate::error::Result;
use std::collections::HashMap;
use std::io::Write;
use tracing::info;

pub const EXPORT_COLUMNS: [&str; 14] = [
    "id",
    "exhibition",
    "resource",
    "sector",
    "full_name",
    "email",
    "mobile_number",
    "gender",
    "country",
    "city",
    "phone",
    "company",
    "job_title",
    "website",
];

fn name_of(names: &HashMap<i64, String>, id: Option<i64>) -> String {
    id.and_then(|id| names.get(&id).cloned()).unwrap_or_default()
}

/// Write every record; returns how many were written
pub fn export_records<W: Write>(store: &SqliteStore, writer: W) -> Result<usize> {
    let associations = store.association_names()?;
    let countries = store.country_names()?;
    let states = store.state_names()?;

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(EXPORT_COLUMNS)?;

    let records = store.all_records()?;
    for record in &records {
        wtr.write_record([
            record.id.map(|id| id.to_string()).unwrap_or_default(),
            name_of(&associations, record.exhibition_id),
            name_of(&associations, record.resource_id),
            name_of(&associations, record.sector_id),
            record.full_name(),
            record.email.clone().unwrap_or_default(),
            record.mobile_number.clone().unwrap_or_default(),
            record.gender.clone().unwrap_or_default(),
            name_of(&countries, record.country),
            name_of(&states, record.city),
            record.phone_list(),
            record.company.clone().unwrap_or_default(),
            record.job_title.clone().unwrap_or_default(),
            record.website.clone().unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    info!(records = records.len(), "records exported");
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{AssociationType, PhoneEntry, Record};
    use crate::store::RecordStore;

    #[test]
    fn test_export_renders_names() {
        let store = SqliteStore::open_in_memory().unwrap();
        let sector = store.create_association("Cardiology", AssociationType::Sector).unwrap();
        let saudi = store.insert_country("SA", "Saudi Arabia").unwrap();
        let riyadh = store.insert_state(saudi.id, "Riyadh").unwrap();

        let mut record = Record {
            sector_id: Some(sector.id),
            title: Some("Dr.".to_string()),
            first_name: Some("Sara".to_string()),
            email: Some("sara@example.com".to_string()),
            country: Some(saudi.id),
            city: Some(riyadh.id),
            phone: vec![PhoneEntry::new("+966112345678"), PhoneEntry::new("+97142223333")],
            ..Record::default()
        };
        store.save_record(&mut record).unwrap();

        let mut out = Vec::new();
        assert_eq!(export_records(&store, &mut out).unwrap(), 1);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), EXPORT_COLUMNS.join(","));

        let row = lines.next().unwrap();
        assert!(row.contains(",,Cardiology,Dr. Sara,sara@example.com,,,Saudi Arabia,Riyadh,"));
        assert!(row.contains("\"+966112345678, +97142223333\""));
    }
}
