// Record Import - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod contact;        // Contact Normalizer - email + phones
pub mod db;
pub mod entities;
pub mod error;
pub mod export;
pub mod importer;       // Row pipeline + deletion import
pub mod lookup;         // Lookup Resolver - find-or-create associations
pub mod parser;
pub mod phone;          // Phone Normalizer - Saudi ranges + calling codes
pub mod reconciliation; // Reconciler - create / update / reject
pub mod row_gate;
pub mod rules;          // Validation rules as data
pub mod store;

// Re-export commonly used types
pub use db::{
    Event, FailedRow, ImportRun, SqliteStore,
    setup_database, insert_event, get_events_for_entity,
};
pub use entities::{
    Association, AssociationType, Country, PhoneEntry, Record, State,
};
pub use error::{ImportError, Result, CONTACTS_UNUSABLE};
pub use parser::{ColumnMap, ImportField, ImportRow, load_csv, read_rows};
pub use rules::{RuleSet, ValidationRules};
pub use phone::{PhoneNumberValidator, PhoneNormalizer, PhoneRejection, PhoneValidator};
pub use contact::{ContactNormalizer, FieldIssue, NormalizedContacts};
pub use lookup::LookupResolver;
pub use reconciliation::{ContactDecision, Reconciler, ReconcileContext, Reconciliation};
pub use importer::{
    DeletionImporter, DeletionSummary, ImportSummary, RecordImporter, RowFailure, RowOutcome,
};
pub use export::export_records;
pub use store::{ImportCounts, ImportLog, RecordStore, SaveOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
