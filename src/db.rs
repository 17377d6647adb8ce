use crate::entities::{Association, AssociationType, Country, PhoneEntry, Record, State};
use crate::error::{ImportError, Result};
use crate::store::{ImportCounts, ImportLog, RecordStore, SaveOutcome};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Event for audit trail (every association / record change is an event)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// One uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: String,
    pub file_name: String,
    pub file_sha256: String,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub successful_rows: usize,
    pub skipped_rows: usize,
    pub failed_rows: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A row that was rejected, with the raw data as uploaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRow {
    pub import_id: String,
    pub line_number: usize,
    pub data: serde_json::Value,
    pub reason: String,
}

const ACTOR: &str = "record_importer";

const RECORD_COLUMNS: &str = "id, exhibition_id, resource_id, sector_id, title, first_name, \
     last_name, gender, email, mobile_number, phone, country, city, company, job_title, \
     website, created_at, updated_at";

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Reference data
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS countries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS states (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            country_id INTEGER NOT NULL REFERENCES countries(id) ON DELETE CASCADE,
            name TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Associations ((name, type) is deduplicated by the importer, not here)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS associations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            type TEXT NOT NULL CHECK (type IN ('exhibition', 'resource', 'sector')),
            other_info TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Records
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exhibition_id INTEGER REFERENCES associations(id) ON DELETE SET NULL,
            resource_id INTEGER REFERENCES associations(id) ON DELETE SET NULL,
            sector_id INTEGER REFERENCES associations(id) ON DELETE SET NULL,
            title TEXT,
            first_name TEXT,
            last_name TEXT,
            gender TEXT,
            email TEXT,
            mobile_number TEXT,
            phone TEXT,
            country INTEGER REFERENCES countries(id) ON DELETE SET NULL,
            city INTEGER REFERENCES states(id) ON DELETE SET NULL,
            company TEXT,
            job_title TEXT,
            website TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Import bookkeeping
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS imports (
            id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            file_sha256 TEXT NOT NULL,
            total_rows INTEGER NOT NULL,
            processed_rows INTEGER NOT NULL DEFAULT 0,
            successful_rows INTEGER NOT NULL DEFAULT 0,
            skipped_rows INTEGER NOT NULL DEFAULT 0,
            failed_rows INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            completed_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS failed_import_rows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            import_id TEXT NOT NULL REFERENCES imports(id) ON DELETE CASCADE,
            line_number INTEGER NOT NULL,
            data TEXT NOT NULL,
            reason TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_associations_name_type ON associations(name, type)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_email ON records(email)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_mobile ON records(mobile_number)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_states_country ON states(country_id, name)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (event_id, timestamp, event_type, entity_type, entity_id, data, actor)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// All events for one entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id ASC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data: String = row.get(5)?;
            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_time(1, &row.get::<_, String>(1)?)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}

fn parse_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_type(idx: usize, value: &str) -> rusqlite::Result<AssociationType> {
    value.parse::<AssociationType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}

fn row_to_association(row: &Row) -> rusqlite::Result<Association> {
    Ok(Association {
        id: row.get(0)?,
        name: row.get(1)?,
        association_type: parse_type(2, &row.get::<_, String>(2)?)?,
        other_info: row.get(3)?,
        created_at: parse_time(4, &row.get::<_, String>(4)?)?,
    })
}

fn row_to_record(row: &Row) -> rusqlite::Result<Record> {
    let phone: Option<String> = row.get(10)?;
    let phone: Vec<PhoneEntry> = match phone {
        Some(json) if !json.is_empty() => serde_json::from_str(&json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?,
        _ => Vec::new(),
    };

    Ok(Record {
        id: Some(row.get(0)?),
        exhibition_id: row.get(1)?,
        resource_id: row.get(2)?,
        sector_id: row.get(3)?,
        title: row.get(4)?,
        first_name: row.get(5)?,
        last_name: row.get(6)?,
        gender: row.get(7)?,
        email: row.get(8)?,
        mobile_number: row.get(9)?,
        phone,
        country: row.get(11)?,
        city: row.get(12)?,
        company: row.get(13)?,
        job_title: row.get(14)?,
        website: row.get(15)?,
        created_at: Some(parse_time(16, &row.get::<_, String>(16)?)?),
        updated_at: Some(parse_time(17, &row.get::<_, String>(17)?)?),
    })
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// SQLite-backed store; one connection, used by one worker at a time
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        info!(path = %path.display(), "database opened");
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn log_event(
        &self,
        event_type: &str,
        entity_type: &str,
        entity_id: i64,
        data: serde_json::Value,
    ) -> Result<()> {
        let event = Event::new(event_type, entity_type, &entity_id.to_string(), data, ACTOR);
        insert_event(&self.conn, &event)
    }

    // ========================================================================
    // REFERENCE DATA
    // ========================================================================

    pub fn insert_country(&self, code: &str, name: &str) -> Result<Country> {
        self.conn.execute(
            "INSERT INTO countries (code, name) VALUES (?1, ?2)",
            params![code, name],
        )?;
        Ok(Country {
            id: self.conn.last_insert_rowid(),
            code: code.to_string(),
            name: name.to_string(),
        })
    }

    pub fn insert_state(&self, country_id: i64, name: &str) -> Result<State> {
        self.conn.execute(
            "INSERT INTO states (country_id, name) VALUES (?1, ?2)",
            params![country_id, name],
        )?;
        Ok(State {
            id: self.conn.last_insert_rowid(),
            country_id,
            name: name.to_string(),
        })
    }

    /// Seed countries and states from CSV with columns `code,name[,state]`.
    ///
    /// Repeated country codes reuse the first country; rows with a state add
    /// it under that country. Returns (countries, states) inserted.
    pub fn load_countries<R: Read>(&self, reader: R) -> Result<(usize, usize)> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut by_code: HashMap<String, i64> = HashMap::new();
        let mut countries = 0;
        let mut states = 0;

        for result in rdr.records() {
            let row = result?;
            let code = row.get(0).unwrap_or_default();
            let name = row.get(1).unwrap_or_default();
            if code.is_empty() || name.is_empty() {
                continue;
            }

            let country_id = match by_code.get(code) {
                Some(id) => *id,
                None => {
                    let id = match self.find_country_by_code_or_name(code)? {
                        Some(existing) => existing.id,
                        None => {
                            countries += 1;
                            self.insert_country(code, name)?.id
                        }
                    };
                    by_code.insert(code.to_string(), id);
                    id
                }
            };

            if let Some(state) = row.get(2).filter(|s| !s.is_empty()) {
                if self.find_state_by_name(state, country_id)?.is_none() {
                    self.insert_state(country_id, state)?;
                    states += 1;
                }
            }
        }

        info!(countries, states, "reference data loaded");
        Ok((countries, states))
    }

    pub fn country_names(&self) -> Result<HashMap<i64, String>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM countries")?;
        let names = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(names)
    }

    pub fn state_names(&self) -> Result<HashMap<i64, String>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM states")?;
        let names = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(names)
    }

    // ========================================================================
    // ASSOCIATIONS
    // ========================================================================

    pub fn list_associations(
        &self,
        association_type: Option<AssociationType>,
    ) -> Result<Vec<Association>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, type, other_info, created_at
             FROM associations
             WHERE ?1 IS NULL OR type = ?1
             ORDER BY type, name",
        )?;

        let associations = stmt
            .query_map(params![association_type.map(|t| t.as_str())], row_to_association)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(associations)
    }

    pub fn association_names(&self) -> Result<HashMap<i64, String>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM associations")?;
        let names = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(names)
    }

    // ========================================================================
    // RECORDS
    // ========================================================================

    pub fn all_records(&self) -> Result<Vec<Record>> {
        let sql = format!("SELECT {} FROM records ORDER BY id", RECORD_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Every record owning this email (the column is not unique at the SQL level)
    pub fn find_records_by_email(&self, email: &str) -> Result<Vec<Record>> {
        let sql = format!("SELECT {} FROM records WHERE email = ?1 ORDER BY id", RECORD_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![email], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn delete_record(&self, id: i64) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM records WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(ImportError::NotFound(format!("record {}", id)));
        }
        self.log_event("record_deleted", "record", id, serde_json::json!({}))?;
        Ok(())
    }

    /// Clear the email of a record that still has a mobile number
    pub fn clear_record_email(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE records SET email = NULL, updated_at = ?2 WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )?;
        self.log_event("record_email_cleared", "record", id, serde_json::json!({}))?;
        Ok(())
    }

    pub fn record_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn association_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM associations", [], |row| row.get(0))?;
        Ok(count)
    }

    // ========================================================================
    // DASHBOARD COUNTS
    // ========================================================================

    /// (association name, record count) for one type, largest first
    pub fn record_counts_by_association(
        &self,
        association_type: AssociationType,
    ) -> Result<Vec<(String, i64)>> {
        let sql = format!(
            "SELECT a.name, COUNT(r.id) AS total
             FROM associations a
             LEFT JOIN records r ON r.{} = a.id
             WHERE a.type = ?1
             GROUP BY a.id, a.name
             ORDER BY total DESC, a.name ASC",
            association_type.record_column()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let counts = stmt
            .query_map(params![association_type.as_str()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    /// ("YYYY-MM", records created that month), oldest first
    pub fn records_per_month(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT substr(created_at, 1, 7) AS month, COUNT(*)
             FROM records
             GROUP BY month
             ORDER BY month ASC",
        )?;

        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    // ========================================================================
    // IMPORT RUNS
    // ========================================================================

    pub fn import_run(&self, import_id: &str) -> Result<Option<ImportRun>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, file_name, file_sha256, total_rows, processed_rows, successful_rows,
                        skipped_rows, failed_rows, started_at, completed_at
                 FROM imports WHERE id = ?1",
                params![import_id],
                |row| {
                    let completed_at: Option<String> = row.get(9)?;
                    Ok(ImportRun {
                        id: row.get(0)?,
                        file_name: row.get(1)?,
                        file_sha256: row.get(2)?,
                        total_rows: row.get::<_, i64>(3)? as usize,
                        processed_rows: row.get::<_, i64>(4)? as usize,
                        successful_rows: row.get::<_, i64>(5)? as usize,
                        skipped_rows: row.get::<_, i64>(6)? as usize,
                        failed_rows: row.get::<_, i64>(7)? as usize,
                        started_at: parse_time(8, &row.get::<_, String>(8)?)?,
                        completed_at: completed_at.map(|s| parse_time(9, &s)).transpose()?,
                    })
                },
            )
            .optional()?;

        Ok(run)
    }

    pub fn failed_rows(&self, import_id: &str) -> Result<Vec<FailedRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT import_id, line_number, data, reason
             FROM failed_import_rows
             WHERE import_id = ?1
             ORDER BY line_number ASC",
        )?;

        let rows = stmt
            .query_map(params![import_id], |row| {
                let data: String = row.get(2)?;
                Ok(FailedRow {
                    import_id: row.get(0)?,
                    line_number: row.get::<_, i64>(1)? as usize,
                    data: serde_json::from_str(&data).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                    })?,
                    reason: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

impl RecordStore for SqliteStore {
    fn find_association(
        &self,
        name: &str,
        association_type: AssociationType,
    ) -> Result<Option<Association>> {
        let association = self
            .conn
            .query_row(
                "SELECT id, name, type, other_info, created_at
                 FROM associations
                 WHERE name = ?1 AND type = ?2
                 ORDER BY id ASC LIMIT 1",
                params![name, association_type.as_str()],
                row_to_association,
            )
            .optional()?;

        Ok(association)
    }

    fn create_association(
        &self,
        name: &str,
        association_type: AssociationType,
    ) -> Result<Association> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO associations (name, type, other_info, created_at) VALUES (?1, ?2, NULL, ?3)",
            params![name, association_type.as_str(), now.to_rfc3339()],
        )?;

        let association = Association {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            association_type,
            other_info: None,
            created_at: now,
        };

        self.log_event(
            "association_created",
            "association",
            association.id,
            serde_json::json!({ "name": name, "type": association_type.as_str() }),
        )?;

        Ok(association)
    }

    fn find_record(&self, id: i64) -> Result<Option<Record>> {
        let sql = format!("SELECT {} FROM records WHERE id = ?1", RECORD_COLUMNS);
        let record = self
            .conn
            .query_row(&sql, params![id], row_to_record)
            .optional()?;
        Ok(record)
    }

    fn find_record_by_email(&self, email: &str) -> Result<Option<Record>> {
        let sql = format!(
            "SELECT {} FROM records WHERE email = ?1 ORDER BY id ASC LIMIT 1",
            RECORD_COLUMNS
        );
        let record = self
            .conn
            .query_row(&sql, params![email], row_to_record)
            .optional()?;
        Ok(record)
    }

    fn find_record_owner_by_email(&self, email: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM records WHERE email = ?1 ORDER BY id ASC LIMIT 1",
                params![email],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn find_record_owner_by_mobile(&self, mobile: &str) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM records WHERE mobile_number = ?1 ORDER BY id ASC LIMIT 1",
                params![mobile],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn record_exists_by_email(&self, email: &str, exclude: Option<i64>) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM records WHERE email = ?1 AND (?2 IS NULL OR id != ?2))",
            params![email, exclude],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn record_exists_by_mobile(&self, mobile: &str, exclude: Option<i64>) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM records WHERE mobile_number = ?1 AND (?2 IS NULL OR id != ?2))",
            params![mobile, exclude],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn find_country_by_code_or_name(&self, value: &str) -> Result<Option<Country>> {
        let lookup = |sql: &str| {
            self.conn
                .query_row(sql, params![value], |row| {
                    Ok(Country {
                        id: row.get(0)?,
                        code: row.get(1)?,
                        name: row.get(2)?,
                    })
                })
                .optional()
        };

        if let Some(country) =
            lookup("SELECT id, code, name FROM countries WHERE code = ?1 ORDER BY id LIMIT 1")?
        {
            return Ok(Some(country));
        }

        Ok(lookup("SELECT id, code, name FROM countries WHERE name = ?1 ORDER BY id LIMIT 1")?)
    }

    fn find_state_by_name(&self, name: &str, country_id: i64) -> Result<Option<State>> {
        let state = self
            .conn
            .query_row(
                "SELECT id, country_id, name FROM states
                 WHERE name = ?1 AND country_id = ?2
                 ORDER BY id LIMIT 1",
                params![name, country_id],
                |row| {
                    Ok(State {
                        id: row.get(0)?,
                        country_id: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    fn save_record(&self, record: &mut Record) -> Result<SaveOutcome> {
        let now = Utc::now();
        let phone_json = if record.phone.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&record.phone)?)
        };

        match record.id {
            Some(id) => {
                self.conn.execute(
                    "UPDATE records SET
                        exhibition_id = ?2, resource_id = ?3, sector_id = ?4,
                        title = ?5, first_name = ?6, last_name = ?7, gender = ?8,
                        email = ?9, mobile_number = ?10, phone = ?11,
                        country = ?12, city = ?13, company = ?14, job_title = ?15,
                        website = ?16, updated_at = ?17
                     WHERE id = ?1",
                    params![
                        id,
                        record.exhibition_id,
                        record.resource_id,
                        record.sector_id,
                        record.title,
                        record.first_name,
                        record.last_name,
                        record.gender,
                        record.email,
                        record.mobile_number,
                        phone_json,
                        record.country,
                        record.city,
                        record.company,
                        record.job_title,
                        record.website,
                        now.to_rfc3339(),
                    ],
                )?;
                record.updated_at = Some(now);

                self.log_event(
                    "record_updated",
                    "record",
                    id,
                    serde_json::json!({
                        "email": record.email,
                        "mobile_number": record.mobile_number,
                    }),
                )?;
                debug!(record_id = id, "record updated");

                Ok(SaveOutcome::Updated)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO records (
                        exhibition_id, resource_id, sector_id, title, first_name, last_name,
                        gender, email, mobile_number, phone, country, city, company,
                        job_title, website, created_at, updated_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
                    params![
                        record.exhibition_id,
                        record.resource_id,
                        record.sector_id,
                        record.title,
                        record.first_name,
                        record.last_name,
                        record.gender,
                        record.email,
                        record.mobile_number,
                        phone_json,
                        record.country,
                        record.city,
                        record.company,
                        record.job_title,
                        record.website,
                        now.to_rfc3339(),
                    ],
                )?;

                let id = self.conn.last_insert_rowid();
                record.id = Some(id);
                record.created_at = Some(now);
                record.updated_at = Some(now);

                self.log_event(
                    "record_created",
                    "record",
                    id,
                    serde_json::json!({
                        "email": record.email,
                        "mobile_number": record.mobile_number,
                    }),
                )?;
                debug!(record_id = id, "record created");

                Ok(SaveOutcome::Created)
            }
        }
    }
}

impl ImportLog for SqliteStore {
    fn find_import_by_digest(&self, file_sha256: &str) -> Result<Option<String>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM imports WHERE file_sha256 = ?1 ORDER BY rowid DESC LIMIT 1",
                params![file_sha256],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn begin_import(&self, file_name: &str, file_sha256: &str, total_rows: usize) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO imports (id, file_name, file_sha256, total_rows, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, file_name, file_sha256, total_rows as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(id)
    }

    fn record_failure(
        &self,
        import_id: &str,
        line_number: usize,
        data: &serde_json::Value,
        reason: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO failed_import_rows (import_id, line_number, data, reason)
             VALUES (?1, ?2, ?3, ?4)",
            params![import_id, line_number as i64, serde_json::to_string(data)?, reason],
        )?;

        let event = Event::new(
            "row_rejected",
            "import",
            import_id,
            serde_json::json!({ "line_number": line_number, "reason": reason }),
            ACTOR,
        );
        insert_event(&self.conn, &event)
    }

    fn finish_import(&self, import_id: &str, counts: &ImportCounts) -> Result<()> {
        self.conn.execute(
            "UPDATE imports SET
                processed_rows = ?2, successful_rows = ?3, skipped_rows = ?4,
                failed_rows = ?5, completed_at = ?6
             WHERE id = ?1",
            params![
                import_id,
                counts.processed_rows as i64,
                counts.successful_rows as i64,
                counts.skipped_rows as i64,
                counts.failed_rows as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_record(email: Option<&str>, mobile: Option<&str>) -> Record {
        Record {
            first_name: Some("Sara".to_string()),
            last_name: Some("Al-Qahtani".to_string()),
            email: email.map(str::to_string),
            mobile_number: mobile.map(str::to_string),
            phone: vec![PhoneEntry::new("+966112345678")],
            ..Record::default()
        }
    }

    #[test]
    fn test_setup_database_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();
    }

    #[test]
    fn test_save_record_insert_then_update() {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut record = create_test_record(Some("sara@example.com"), Some("+966512345678"));
        assert_eq!(store.save_record(&mut record).unwrap(), SaveOutcome::Created);
        let id = record.id.unwrap();

        record.company = Some("Riyadh Medical".to_string());
        assert_eq!(store.save_record(&mut record).unwrap(), SaveOutcome::Updated);
        assert_eq!(record.id, Some(id));

        let stored = store.find_record(id).unwrap().unwrap();
        assert_eq!(stored.company.as_deref(), Some("Riyadh Medical"));
        assert_eq!(stored.phone, vec![PhoneEntry::new("+966112345678")]);
        assert_eq!(store.record_count().unwrap(), 1);

        let events = get_events_for_entity(store.connection(), "record", &id.to_string()).unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["record_created", "record_updated"]);
    }

    #[test]
    fn test_exists_checks_honor_exclusion() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut record = create_test_record(Some("sara@example.com"), Some("+966512345678"));
        store.save_record(&mut record).unwrap();
        let id = record.id;

        assert!(store.record_exists_by_email("sara@example.com", None).unwrap());
        assert!(!store.record_exists_by_email("sara@example.com", id).unwrap());
        assert!(!store.record_exists_by_email("SARA@example.com", None).unwrap());

        assert!(store.record_exists_by_mobile("+966512345678", None).unwrap());
        assert!(!store.record_exists_by_mobile("+966512345678", id).unwrap());
        assert!(!store.record_exists_by_mobile("+966500000001", None).unwrap());

        assert_eq!(store.find_record_owner_by_email("sara@example.com").unwrap(), id);
        assert_eq!(store.find_record_owner_by_mobile("+966512345678").unwrap(), id);
        assert_eq!(store.find_record_owner_by_mobile("+966500000001").unwrap(), None);
    }

    #[test]
    fn test_association_lookup_is_exact() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store
            .create_association("Cardiology", AssociationType::Sector)
            .unwrap();

        let found = store
            .find_association("Cardiology", AssociationType::Sector)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);

        assert!(store
            .find_association("cardiology", AssociationType::Sector)
            .unwrap()
            .is_none());
        assert!(store
            .find_association("Cardiology", AssociationType::Resource)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_country_lookup_prefers_code_then_name() {
        let store = SqliteStore::open_in_memory().unwrap();
        let saudi = store.insert_country("SA", "Saudi Arabia").unwrap();
        let uae = store.insert_country("AE", "United Arab Emirates").unwrap();
        let riyadh = store.insert_state(saudi.id, "Riyadh").unwrap();
        store.insert_state(uae.id, "Dubai").unwrap();

        assert_eq!(store.find_country_by_code_or_name("SA").unwrap().unwrap().id, saudi.id);
        assert_eq!(
            store.find_country_by_code_or_name("United Arab Emirates").unwrap().unwrap().id,
            uae.id
        );
        assert!(store.find_country_by_code_or_name("Atlantis").unwrap().is_none());

        assert_eq!(store.find_state_by_name("Riyadh", saudi.id).unwrap().unwrap().id, riyadh.id);
        assert!(store.find_state_by_name("Dubai", saudi.id).unwrap().is_none());
    }

    #[test]
    fn test_load_countries_reuses_codes() {
        let store = SqliteStore::open_in_memory().unwrap();
        let csv = "code,name,state\nSA,Saudi Arabia,Riyadh\nSA,Saudi Arabia,Jeddah\nAE,United Arab Emirates,\n";

        let (countries, states) = store.load_countries(csv.as_bytes()).unwrap();
        assert_eq!((countries, states), (2, 2));

        // Loading the same file again adds nothing
        let (countries, states) = store.load_countries(csv.as_bytes()).unwrap();
        assert_eq!((countries, states), (0, 0));
    }

    #[test]
    fn test_record_counts_by_association() {
        let store = SqliteStore::open_in_memory().unwrap();
        let cardiology = store.create_association("Cardiology", AssociationType::Sector).unwrap();
        store.create_association("Dental", AssociationType::Sector).unwrap();

        for email in ["a@example.com", "b@example.com"] {
            let mut record = create_test_record(Some(email), None);
            record.sector_id = Some(cardiology.id);
            store.save_record(&mut record).unwrap();
        }

        let counts = store.record_counts_by_association(AssociationType::Sector).unwrap();
        assert_eq!(
            counts,
            vec![("Cardiology".to_string(), 2), ("Dental".to_string(), 0)]
        );

        let months = store.records_per_month().unwrap();
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].1, 2);
    }

    #[test]
    fn test_import_bookkeeping() {
        let store = SqliteStore::open_in_memory().unwrap();
        let import_id = store.begin_import("contacts.csv", "abc123", 3).unwrap();

        store
            .record_failure(&import_id, 3, &serde_json::json!({"email": "x"}), "bad row")
            .unwrap();
        store
            .finish_import(
                &import_id,
                &ImportCounts {
                    processed_rows: 3,
                    successful_rows: 1,
                    skipped_rows: 1,
                    failed_rows: 1,
                },
            )
            .unwrap();

        let run = store.import_run(&import_id).unwrap().unwrap();
        assert_eq!(run.successful_rows, 1);
        assert_eq!(run.failed_rows, 1);
        assert!(run.completed_at.is_some());
        assert_eq!(store.find_import_by_digest("abc123").unwrap(), Some(import_id.clone()));

        let failures = store.failed_rows(&import_id).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].line_number, 3);
        assert_eq!(failures[0].reason, "bad row");
    }

    #[test]
    fn test_delete_and_clear_email() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut keep = create_test_record(Some("dup@example.com"), Some("+966512345678"));
        let mut orphan = create_test_record(Some("dup@example.com"), None);
        store.save_record(&mut keep).unwrap();
        store.save_record(&mut orphan).unwrap();

        assert_eq!(store.find_records_by_email("dup@example.com").unwrap().len(), 2);

        store.clear_record_email(keep.id.unwrap()).unwrap();
        store.delete_record(orphan.id.unwrap()).unwrap();

        assert_eq!(store.record_count().unwrap(), 1);
        assert!(store.find_record(keep.id.unwrap()).unwrap().unwrap().email.is_none());
        assert!(matches!(
            store.delete_record(orphan.id.unwrap()),
            Err(ImportError::NotFound(_))
        ));
    }
}
