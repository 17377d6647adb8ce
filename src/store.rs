// 🗃️ Store traits - the persistence seams the pipeline talks to
//
// `RecordStore` is everything a single row needs: association lookups,
// contact ownership checks, reference data and the final save.
// `ImportLog` is run bookkeeping (one entry per upload, one per failed row).

use crate::entities::{Association, AssociationType, Country, Record, State};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Whether `save_record` inserted or updated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveOutcome {
    Created,
    Updated,
}

pub trait RecordStore {
    /// Exact (case-sensitive) name + type match
    fn find_association(
        &self,
        name: &str,
        association_type: AssociationType,
    ) -> Result<Option<Association>>;

    fn create_association(
        &self,
        name: &str,
        association_type: AssociationType,
    ) -> Result<Association>;

    fn find_record(&self, id: i64) -> Result<Option<Record>>;

    /// First record owning this exact email
    fn find_record_by_email(&self, email: &str) -> Result<Option<Record>>;

    /// Id of the first record owning this exact email
    fn find_record_owner_by_email(&self, email: &str) -> Result<Option<i64>>;

    /// Id of the first record owning this exact mobile number
    fn find_record_owner_by_mobile(&self, mobile: &str) -> Result<Option<i64>>;

    /// Any record other than `exclude` owns this exact email
    fn record_exists_by_email(&self, email: &str, exclude: Option<i64>) -> Result<bool>;

    /// Any record other than `exclude` owns this exact mobile number
    fn record_exists_by_mobile(&self, mobile: &str, exclude: Option<i64>) -> Result<bool>;

    fn find_country_by_code_or_name(&self, value: &str) -> Result<Option<Country>>;

    fn find_state_by_name(&self, name: &str, country_id: i64) -> Result<Option<State>>;

    /// Insert when `record.id` is None (and assign it), update otherwise
    fn save_record(&self, record: &mut Record) -> Result<SaveOutcome>;
}

/// Per-run bookkeeping
pub trait ImportLog {
    /// Most recent run for a file digest, if the same bytes were uploaded before
    fn find_import_by_digest(&self, file_sha256: &str) -> Result<Option<String>>;

    /// Open a run and return its id
    fn begin_import(&self, file_name: &str, file_sha256: &str, total_rows: usize) -> Result<String>;

    fn record_failure(
        &self,
        import_id: &str,
        line_number: usize,
        data: &serde_json::Value,
        reason: &str,
    ) -> Result<()>;

    fn finish_import(&self, import_id: &str, counts: &ImportCounts) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCounts {
    pub processed_rows: usize,
    pub successful_rows: usize,
    pub skipped_rows: usize,
    pub failed_rows: usize,
}
