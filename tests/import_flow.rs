// End-to-end: CSV file on disk → SQLite file → export → deletion

use record_import::{
    export_records, DeletionImporter, ImportLog, RecordImporter, RecordStore, SqliteStore,
    CONTACTS_UNUSABLE,
};
use std::fs;

const UPLOAD: &str = "\
Sector ,Source,Exhibition Name,Title,F Name ,L Name,Sex ,Company Name,Email ,Mobile ,Country,City,Job Title,WebSite ,Phone 1
Cardiology,Walk-in,Arab Health,Dr.,Sara,Al-Qahtani,F,Riyadh Medical,sara@example.com,0512345678,SA,Riyadh,Consultant,riyadhmed.example,\"+966 11 234 5678, +971 4 222 3333\"
,,,,,,,,,,,,,,
Dental,Select,Arab Health,Select,Omar,Haddad,M,Smile Co,omar@example.com,+1 415 555 2671,AE,,Dentist,,
Dental,Referral,Arab Health,,Lina,,F,,lina@example.com,0512345678,,,,,
Dental,Referral,Arab Health,,Noor,,F,,sara@example.com,+1 415 555 2671,,,,,
";

fn seeded_store(dir: &tempfile::TempDir) -> SqliteStore {
    let store = SqliteStore::open(&dir.path().join("records.db")).unwrap();
    store
        .load_countries("code,name,state\nSA,Saudi Arabia,Riyadh\nAE,United Arab Emirates,Dubai\n".as_bytes())
        .unwrap();
    store
}

#[test]
fn test_upload_import_export_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("contacts.csv");
    fs::write(&csv_path, UPLOAD).unwrap();

    let store = seeded_store(&dir);
    let importer = RecordImporter::default();
    let bytes = fs::read(&csv_path).unwrap();

    let summary = importer.run(&store, "contacts.csv", &bytes).unwrap();
    assert_eq!(summary.total_rows, 5);
    assert_eq!(summary.skipped, 1);
    // Sara, Omar, Lina (mobile cleared); Noor clashes on both contacts
    assert_eq!(summary.successful, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].line_number, 6);
    assert_eq!(summary.failures[0].reason, CONTACTS_UNUSABLE);
    assert_eq!(
        summary.notification_body(),
        "Your record import has completed and 3 rows imported. 1 row failed to import."
    );

    let lina = store.find_record_by_email("lina@example.com").unwrap().unwrap();
    assert_eq!(lina.mobile_number, None);

    let sara = store.find_record_by_email("sara@example.com").unwrap().unwrap();
    assert_eq!(sara.mobile_number.as_deref(), Some("+966512345678"));
    assert_eq!(sara.phone_list(), "+966112345678, +97142223333");
    assert_eq!(sara.full_name(), "Dr. Sara Al-Qahtani");

    // "Select" never becomes an association
    assert_eq!(store.association_count().unwrap(), 5);

    // Same bytes again: every accepted row updates its record, Noor still clashes
    let again = importer.run(&store, "contacts.csv", &bytes).unwrap();
    assert_eq!(again.previous_import.as_deref(), Some(summary.import_id.as_str()));
    assert_eq!(again.created, 0);
    assert_eq!(again.updated, 3);
    assert_eq!(again.failed, 1);
    assert_eq!(again.failures[0].line_number, 6);
    let lina_again = store.find_record_by_email("lina@example.com").unwrap().unwrap();
    assert_eq!(lina_again.id, lina.id);
    assert_eq!(lina_again.mobile_number, None);
    assert_eq!(store.record_count().unwrap(), 3);
    assert_eq!(store.association_count().unwrap(), 5);
    assert_eq!(store.find_import_by_digest(&summary.file_sha256).unwrap(), Some(again.import_id.clone()));

    let export_path = dir.path().join("export.csv");
    let written = export_records(&store, fs::File::create(&export_path).unwrap()).unwrap();
    assert_eq!(written, 3);
    let exported = fs::read_to_string(&export_path).unwrap();
    assert!(exported.contains("Arab Health,Walk-in,Cardiology,Dr. Sara Al-Qahtani"));
    assert!(exported.contains("Saudi Arabia,Riyadh"));

    let deletions = DeletionImporter
        .run(&store, "Email\nsara@example.com\nlina@example.com\n".as_bytes())
        .unwrap();
    assert_eq!(deletions.emails_cleared, 1);
    assert_eq!(deletions.deleted, 1);
    assert_eq!(store.record_count().unwrap(), 2);
}
