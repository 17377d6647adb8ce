// 📥 Record Importer - one upload, row by row
//
// Row Gate → Lookup Resolver → Contact Normalizer → Reconciler → save.
//
// Rows run strictly in file order, one at a time. A rejected row is recorded
// and the run moves on; associations it created before the rejection stay.
// Store failures abort the run.

use crate::contact::{trim_contact, ContactNormalizer};
use crate::db::SqliteStore;
use crate::entities::{Record, State};
use crate::error::{ImportError, Result};
use crate::lookup::{LookupResolver, ResolvedAssociations};
use crate::parser::{self, ImportField, ImportRow};
use crate::reconciliation::{ReconcileContext, Reconciler};
use crate::row_gate;
use crate::rules::RuleSet;
use crate::store::{ImportCounts, ImportLog, RecordStore, SaveOutcome};
use anyhow::Context;
use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowOutcome {
    Skipped,
    Created(i64),
    Updated(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFailure {
    pub line_number: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub import_id: String,
    pub file_name: String,
    pub file_sha256: String,
    pub total_rows: usize,
    pub successful: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub skipped: usize,
    pub associations_created: usize,
    pub failures: Vec<RowFailure>,

    /// Earlier run that imported the same bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_import: Option<String>,
}

impl ImportSummary {
    pub fn counts(&self) -> ImportCounts {
        ImportCounts {
            processed_rows: self.successful + self.failed + self.skipped,
            successful_rows: self.successful,
            skipped_rows: self.skipped,
            failed_rows: self.failed,
        }
    }

    /// Text of the completion notification sent to the uploader
    pub fn notification_body(&self) -> String {
        let mut body = format!(
            "Your record import has completed and {} imported.",
            rows(self.successful)
        );
        if self.failed > 0 {
            body.push_str(&format!(" {} failed to import.", rows(self.failed)));
        }
        body
    }
}

/// "1 row", "1,234 rows"
fn rows(count: usize) -> String {
    let noun = if count == 1 { "row" } else { "rows" };
    format!("{} {}", count.to_formatted_string(&Locale::en), noun)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// RECORD IMPORTER
// ============================================================================

pub struct RecordImporter {
    contacts: ContactNormalizer,
    reconciler: Reconciler,
}

impl RecordImporter {
    pub fn new(rules: RuleSet) -> Self {
        RecordImporter {
            contacts: ContactNormalizer::new(rules),
            reconciler: Reconciler::new(),
        }
    }

    pub fn with_contacts(contacts: ContactNormalizer) -> Self {
        RecordImporter {
            contacts,
            reconciler: Reconciler::new(),
        }
    }

    pub fn contacts(&self) -> &ContactNormalizer {
        &self.contacts
    }

    pub fn rules(&self) -> &RuleSet {
        self.contacts.rules()
    }

    /// Process one row; `RowRejected` means nothing was saved for it
    pub fn import_row<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        lookups: &LookupResolver,
        row: &ImportRow,
    ) -> Result<RowOutcome> {
        if row_gate::should_skip(row) {
            debug!(line = row.line_number, "blank row skipped");
            return Ok(RowOutcome::Skipped);
        }

        let associations = lookups.resolve_all(
            store,
            row.get(ImportField::Sector),
            row.get(ImportField::Resource),
            row.get(ImportField::Exhibition),
        )?;

        let (country, city) = self.resolve_location(store, row)?;
        let contacts = self.contacts.normalize(row);

        let reconciliation = self.reconciler.reconcile(
            store,
            contacts.email,
            contacts.mobile_number,
            ReconcileContext::Import,
        )?;

        let mut record = reconciliation.target;
        self.populate(&mut record, lookups, row, associations);
        record.country = country;
        record.city = city;
        merge_contacts(
            &mut record,
            reconciliation.email,
            reconciliation.mobile_number,
            contacts.phone,
        );
        debug_assert!(record.has_contact(), "reconciled record without a contact");

        let outcome = store.save_record(&mut record)?;
        let id = record
            .id
            .ok_or_else(|| ImportError::NotFound("saved record id".to_string()))?;

        Ok(match outcome {
            SaveOutcome::Created => RowOutcome::Created(id),
            SaveOutcome::Updated => RowOutcome::Updated(id),
        })
    }

    /// Save an admin edit of an existing record through the same rules
    pub fn apply_edit<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        record_id: i64,
        row: &ImportRow,
    ) -> Result<Record> {
        let lookups = LookupResolver::new(self.rules());
        let associations = lookups.resolve_all(
            store,
            row.get(ImportField::Sector),
            row.get(ImportField::Resource),
            row.get(ImportField::Exhibition),
        )?;
        let (country, city) = self.resolve_location(store, row)?;
        let contacts = self.contacts.normalize(row);

        let reconciliation = self.reconciler.reconcile(
            store,
            contacts.email,
            contacts.mobile_number,
            ReconcileContext::Edit(record_id),
        )?;

        let mut record = reconciliation.target;
        self.populate(&mut record, &lookups, row, associations);
        record.country = country;
        record.city = city;

        // The edit form replaces contacts outright
        record.email = reconciliation.email;
        record.mobile_number = reconciliation.mobile_number;
        record.phone = contacts.phone;

        store.save_record(&mut record)?;
        info!(record_id, "record edited");
        Ok(record)
    }

    /// Pass-through fields and association ids
    fn populate(
        &self,
        record: &mut Record,
        lookups: &LookupResolver,
        row: &ImportRow,
        associations: ResolvedAssociations,
    ) {
        record.sector_id = associations.sector_id;
        record.resource_id = associations.resource_id;
        record.exhibition_id = associations.exhibition_id;

        record.title = lookups.sanitize_title(row.get(ImportField::Title));
        record.first_name = row.text(ImportField::FirstName);
        record.last_name = row.text(ImportField::LastName);
        record.gender = row.text(ImportField::Gender);
        record.company = row.text(ImportField::Company);
        record.job_title = row.text(ImportField::JobTitle);
        record.website = row.text(ImportField::Website);
    }

    /// Country by code or name, city as a state of that country
    fn resolve_location<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        row: &ImportRow,
    ) -> Result<(Option<i64>, Option<i64>)> {
        let Some(country_value) = row.text(ImportField::Country) else {
            return Ok((None, None));
        };

        let Some(country) = store.find_country_by_code_or_name(&country_value)? else {
            warn!(
                line = row.line_number,
                field = ImportField::Country.name(),
                value = %country_value,
                "unknown country, field degraded"
            );
            return Ok((None, None));
        };

        let city = match row.text(ImportField::City) {
            Some(name) => store
                .find_state_by_name(&name, country.id)?
                .map(|State { id, .. }| id),
            None => None,
        };

        Ok((Some(country.id), city))
    }

    /// Run parsed rows against the store, recording failures under `import_id`
    pub fn import_rows<S: RecordStore + ImportLog + ?Sized>(
        &self,
        store: &S,
        import_id: &str,
        rows: &[ImportRow],
    ) -> Result<ImportSummary> {
        let lookups = LookupResolver::new(self.rules());
        let mut summary = ImportSummary {
            import_id: import_id.to_string(),
            total_rows: rows.len(),
            ..ImportSummary::default()
        };

        for row in rows {
            match self.import_row(store, &lookups, row) {
                Ok(RowOutcome::Skipped) => summary.skipped += 1,
                Ok(RowOutcome::Created(_)) => {
                    summary.successful += 1;
                    summary.created += 1;
                }
                Ok(RowOutcome::Updated(_)) => {
                    summary.successful += 1;
                    summary.updated += 1;
                }
                Err(ImportError::RowRejected(reason)) => {
                    warn!(line = row.line_number, %reason, "row rejected");
                    store.record_failure(import_id, row.line_number, &row.to_json(), &reason)?;
                    summary.failed += 1;
                    summary.failures.push(RowFailure {
                        line_number: row.line_number,
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        summary.associations_created = lookups.created();
        Ok(summary)
    }

    /// Import one uploaded CSV file end to end
    pub fn run<S: RecordStore + ImportLog + ?Sized>(
        &self,
        store: &S,
        file_name: &str,
        bytes: &[u8],
    ) -> anyhow::Result<ImportSummary> {
        let file_sha256 = sha256_hex(bytes);
        let rows = parser::read_rows(bytes)
            .with_context(|| format!("Failed to parse upload {}", file_name))?;

        let previous_import = store.find_import_by_digest(&file_sha256)?;
        if let Some(previous) = &previous_import {
            info!(%previous, file_name, "same file was imported before");
        }

        let import_id = store.begin_import(file_name, &file_sha256, rows.len())?;
        info!(%import_id, file_name, rows = rows.len(), "import started");

        let mut summary = self.import_rows(store, &import_id, &rows)?;
        summary.file_name = file_name.to_string();
        summary.file_sha256 = file_sha256;
        summary.previous_import = previous_import;

        store.finish_import(&import_id, &summary.counts())?;
        info!(
            %import_id,
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped,
            "import finished"
        );

        Ok(summary)
    }
}

impl Default for RecordImporter {
    fn default() -> Self {
        RecordImporter::with_contacts(ContactNormalizer::default())
    }
}

/// A null contact never erases one already stored
fn merge_contacts(
    record: &mut Record,
    email: Option<String>,
    mobile_number: Option<String>,
    phone: Vec<crate::entities::PhoneEntry>,
) {
    if email.is_some() {
        record.email = email;
    }
    if mobile_number.is_some() {
        record.mobile_number = mobile_number;
    }
    if !phone.is_empty() {
        record.phone = phone;
    }
}

// ============================================================================
// DELETION IMPORT
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionSummary {
    pub rows: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub emails_cleared: usize,
}

/// Removes records listed by email: records that still have a mobile number
/// only lose the email, the rest are deleted
#[derive(Debug, Clone, Copy, Default)]
pub struct DeletionImporter;

impl DeletionImporter {
    pub fn run(&self, store: &SqliteStore, bytes: &[u8]) -> anyhow::Result<DeletionSummary> {
        let rows = parser::read_rows(bytes).context("Failed to parse deletion upload")?;
        let mut summary = DeletionSummary {
            rows: rows.len(),
            ..DeletionSummary::default()
        };

        for row in &rows {
            let email = row.get(ImportField::Email).map(trim_contact).unwrap_or_default();
            if email.is_empty() {
                summary.skipped += 1;
                continue;
            }

            for record in store.find_records_by_email(email)? {
                let Some(id) = record.id else { continue };
                if record.mobile_number.is_some() {
                    store.clear_record_email(id)?;
                    summary.emails_cleared += 1;
                } else {
                    store.delete_record(id)?;
                    summary.deleted += 1;
                }
            }
        }

        info!(
            deleted = summary.deleted,
            emails_cleared = summary.emails_cleared,
            "deletion import finished"
        );
        Ok(summary)
    }
}

// ============================================================================
// TESTS
// ============================================================================
