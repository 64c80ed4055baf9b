//! SQLite store for harvested records.
//!
//! Each course offering gets one `courses` row; its ISQ, grade and schedule
//! data hang off it in their own tables. Saving is idempotent: rows that
//! already exist are skipped, so the same harvest can be stored any number
//! of times.

use crate::course_key::CourseIdentity;
use crate::error::Result;
use crate::reconcile::{Feature, JoinedRecord};
use log::{debug, info, warn};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;

const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS courses (
        id INTEGER PRIMARY KEY,
        course TEXT NOT NULL,
        term TEXT NOT NULL,
        crn TEXT NOT NULL,
        instructor TEXT
    );
    CREATE UNIQUE INDEX IF NOT EXISTS courses_key
        ON courses (course, term, crn, IFNULL(instructor, ''));

    CREATE TABLE IF NOT EXISTS isq (
        course_id INTEGER NOT NULL UNIQUE REFERENCES courses (id),
        enrolled INTEGER NOT NULL,
        responded INTEGER NOT NULL,
        response_rate REAL NOT NULL,
        percent_5 REAL NOT NULL,
        percent_4 REAL NOT NULL,
        percent_3 REAL NOT NULL,
        percent_2 REAL NOT NULL,
        percent_1 REAL NOT NULL,
        rating REAL NOT NULL
    );

    CREATE TABLE IF NOT EXISTS grades (
        course_id INTEGER NOT NULL UNIQUE REFERENCES courses (id),
        percent_a REAL NOT NULL,
        percent_b REAL NOT NULL,
        percent_c REAL NOT NULL,
        percent_d REAL NOT NULL,
        percent_f REAL NOT NULL,
        average_gpa REAL NOT NULL
    );

    CREATE TABLE IF NOT EXISTS schedules (
        course_id INTEGER NOT NULL UNIQUE REFERENCES courses (id),
        start_time TEXT,
        duration INTEGER,
        days TEXT NOT NULL,
        building TEXT NOT NULL,
        room TEXT NOT NULL,
        credits INTEGER,
        title TEXT NOT NULL
    );
";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Table {
    Courses,
    Isq,
    Grades,
    Schedules,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Courses => "courses",
            Table::Isq => "isq",
            Table::Grades => "grades",
            Table::Schedules => "schedules",
        }
    }
}

/// What one `save` did, counted in table rows.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SaveSummary {
    pub inserted: usize,
    pub duplicates: usize,
    /// Records rolled back because of a non-duplicate error.
    pub failed: usize,
}

pub struct Store {
    conn: Connection,
}

fn is_duplicate(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => {
            err.code == ErrorCode::ConstraintViolation
                && (err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

/// Runs an insert, turning a unique violation into `Ok(false)`.
fn insert_unless_present(result: rusqlite::Result<usize>) -> Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if is_duplicate(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Store> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Store::new(conn)
    }

    pub fn open_in_memory() -> Result<Store> {
        Store::new(Connection::open_in_memory()?)
    }

    fn new(conn: Connection) -> Result<Store> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let mut store = Store { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i32> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    fn migrate(&mut self) -> Result<()> {
        let version = self.schema_version()?;
        if version >= SCHEMA_VERSION {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        tx.execute_batch(SCHEMA)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
        tx.commit()?;

        info!("Migrated database from version {} to {}", version, SCHEMA_VERSION);
        Ok(())
    }

    /// Stores every record in one transaction. A record that fails for any
    /// reason other than already being stored is rolled back on its own and
    /// counted; the rest still commit.
    pub fn save(&mut self, records: &[JoinedRecord]) -> Result<SaveSummary> {
        let mut summary = SaveSummary::default();
        let mut tx = self.conn.transaction()?;

        for record in records {
            let savepoint = tx.savepoint()?;
            let mut counts = SaveSummary::default();

            match save_record(&savepoint, record, &mut counts) {
                Ok(()) => {
                    savepoint.commit()?;
                    summary.inserted += counts.inserted;
                    summary.duplicates += counts.duplicates;
                }
                Err(e) => {
                    warn!("Could not store {}: {}", record.identity, e);
                    summary.failed += 1;
                    // Dropping the savepoint rolls it back
                }
            }
        }

        tx.commit()?;

        info!(
            "Stored {} rows ({} already present, {} records failed)",
            summary.inserted, summary.duplicates, summary.failed
        );
        Ok(summary)
    }

    pub fn count_rows(&self, table: Table) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn find_course_id(&self, identity: &CourseIdentity) -> Result<Option<i64>> {
        find_course_id(&self.conn, identity)
    }
}

fn find_course_id(conn: &Connection, identity: &CourseIdentity) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM courses
             WHERE course = ?1 AND term = ?2 AND crn = ?3
               AND IFNULL(instructor, '') = IFNULL(?4, '')",
            params![
                identity.get_course_code(),
                identity.get_term(),
                identity.get_section_id(),
                identity.get_instructor(),
            ],
            |row| row.get(0),
        )
        .optional()?)
}

fn count(summary: &mut SaveSummary, inserted: bool) {
    if inserted {
        summary.inserted += 1;
    } else {
        summary.duplicates += 1;
    }
}

fn save_record(conn: &Connection, record: &JoinedRecord, summary: &mut SaveSummary) -> Result<()> {
    let identity = &record.identity;

    let inserted = insert_unless_present(conn.execute(
        "INSERT INTO courses (course, term, crn, instructor) VALUES (?1, ?2, ?3, ?4)",
        params![
            identity.get_course_code(),
            identity.get_term(),
            identity.get_section_id(),
            identity.get_instructor(),
        ],
    ))?;
    count(summary, inserted);

    let course_id = if inserted {
        conn.last_insert_rowid()
    } else {
        debug!("{} is already stored", identity);
        match find_course_id(conn, identity)? {
            Some(id) => id,
            None => return Err(rusqlite::Error::QueryReturnedNoRows.into()),
        }
    };

    for feature in record.features() {
        let result = match feature {
            Feature::Satisfaction(isq) => conn.execute(
                "INSERT INTO isq (course_id, enrolled, responded, response_rate,
                     percent_5, percent_4, percent_3, percent_2, percent_1, rating)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    course_id,
                    isq.enrolled,
                    isq.responded,
                    isq.response_rate,
                    isq.percent_5,
                    isq.percent_4,
                    isq.percent_3,
                    isq.percent_2,
                    isq.percent_1,
                    isq.rating,
                ],
            ),
            Feature::Grades(grades) => conn.execute(
                "INSERT INTO grades (course_id, percent_a, percent_b, percent_c,
                     percent_d, percent_f, average_gpa)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    course_id,
                    grades.percent_a,
                    grades.percent_b,
                    grades.percent_c,
                    grades.percent_d,
                    grades.percent_f,
                    grades.average_gpa,
                ],
            ),
            Feature::Schedule(schedule) => conn.execute(
                "INSERT INTO schedules (course_id, start_time, duration, days,
                     building, room, credits, title)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    course_id,
                    schedule.start_time.map(|t| t.format("%H%M").to_string()),
                    schedule.duration,
                    schedule.get_days_code(),
                    schedule.location.get_building(),
                    schedule.location.get_room(),
                    schedule.credits,
                    schedule.title,
                ],
            ),
        };

        count(summary, insert_unless_present(result)?);
    }

    Ok(())
}
