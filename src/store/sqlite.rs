use super::{LoadOutcome, RecordStore, SaveReceipt, SaveRequest};
use crate::calc::GradeComputer;
use crate::config::{EngineConfig, ScorePolicy};
use crate::db;
use crate::error::{StoreError, ValidationError};
use crate::history::{self, HistoryAction, HistoryEntry};
use crate::model::{
    validate_hps, validate_weights, Category, HpsTable, RecordKey, ScoreSheet, WeightConfig,
};
use crate::record::{check_score, ClassRecord, StudentGradeRow};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// One entry of the section roster feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStudent {
    pub id: String,
    pub last_name: String,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

struct RecordHead {
    section_id: String,
    subject_id: String,
    quarter: String,
    school_year: String,
    weights: (i64, i64, i64),
    hps_json: String,
    version: i64,
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    computer: GradeComputer,
    policy: ScorePolicy,
    default_weights: WeightConfig,
    default_hps: HpsTable,
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn corrupt(e: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(e.to_string())
}

impl SqliteStore {
    pub fn new(conn: Connection, config: &EngineConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            conn: Mutex::new(conn),
            computer: config.computer()?,
            policy: config.grading.score_policy,
            default_weights: config.default_weights()?,
            default_hps: config.default_hps()?,
        })
    }

    pub fn open(workspace: &Path, config: &EngineConfig) -> anyhow::Result<Self> {
        let conn = db::open_db(workspace)?;
        Ok(Self::new(conn, config)?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn computer(&self) -> &GradeComputer {
        &self.computer
    }

    /// Upserts roster entries for a section. Existing class records pick up
    /// newly active students on their next load.
    pub fn import_roster(
        &self,
        section_id: &str,
        students: &[RosterStudent],
    ) -> Result<usize, StoreError> {
        let section_id = section_id.trim();
        if section_id.is_empty() {
            return Err(ValidationError::Identity("sectionId must not be empty".into()).into());
        }
        if let Some(bad) = students.iter().find(|s| s.id.trim().is_empty()) {
            return Err(ValidationError::Identity(format!(
                "student id must not be empty (last name {:?})",
                bad.last_name
            ))
            .into());
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        for s in students {
            tx.execute(
                "INSERT INTO section_students(section_id, student_id, last_name, first_name, middle_name, gender, active)
                 VALUES(?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(section_id, student_id) DO UPDATE SET
                   last_name = excluded.last_name,
                   first_name = excluded.first_name,
                   middle_name = excluded.middle_name,
                   gender = excluded.gender,
                   active = excluded.active",
                params![
                    section_id,
                    s.id.trim(),
                    s.last_name.trim(),
                    s.first_name.trim(),
                    s.middle_name.as_deref().map(str::trim),
                    s.gender,
                    i64::from(s.active),
                ],
            )?;
        }
        tx.commit()?;
        info!(section_id, count = students.len(), "roster imported");
        Ok(students.len())
    }

    fn get_or_create(&self, key: &RecordKey) -> Result<LoadOutcome, StoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let stamp = now_stamp();
        let hps_json = serde_json::to_string(&self.default_hps).map_err(corrupt)?;
        let inserted = tx.execute(
            "INSERT INTO class_records(id, section_id, subject_id, quarter, school_year,
               ww_weight, pt_weight, qa_weight, hps_json, version, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
             ON CONFLICT(section_id, subject_id, quarter, school_year) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                key.section_id,
                key.subject_id,
                key.quarter.as_str(),
                key.school_year,
                i64::from(self.default_weights.ww()),
                i64::from(self.default_weights.pt()),
                i64::from(self.default_weights.qa()),
                hps_json,
                stamp,
                stamp,
            ],
        )?;
        let id = find_record_id(&tx, key)?.ok_or_else(|| StoreError::NotFound {
            entity: "class record",
            id: format!("{}/{}/{}/{}", key.section_id, key.subject_id, key.quarter, key.school_year),
        })?;
        let enrolled = enroll_roster(&tx, &id, &key.section_id, &stamp)?;
        let record = self.read_record(&tx, &id)?;
        tx.commit()?;

        let created = inserted == 1;
        info!(
            class_record_id = %record.id,
            created,
            enrolled,
            students = record.rows.len(),
            "class record loaded"
        );
        Ok(LoadOutcome { record, created })
    }

    /// Loads an existing record without creating it.
    pub fn find_record(&self, key: &RecordKey) -> Result<Option<ClassRecord>, StoreError> {
        let conn = self.conn()?;
        match find_record_id(&conn, key)? {
            Some(id) => Ok(Some(self.read_record(&conn, &id)?)),
            None => Ok(None),
        }
    }

    fn read_record(&self, conn: &Connection, id: &str) -> Result<ClassRecord, StoreError> {
        let head = conn
            .query_row(
                "SELECT section_id, subject_id, quarter, school_year,
                        ww_weight, pt_weight, qa_weight, hps_json, version
                 FROM class_records WHERE id = ?",
                [id],
                |r| {
                    Ok(RecordHead {
                        section_id: r.get(0)?,
                        subject_id: r.get(1)?,
                        quarter: r.get(2)?,
                        school_year: r.get(3)?,
                        weights: (r.get(4)?, r.get(5)?, r.get(6)?),
                        hps_json: r.get(7)?,
                        version: r.get(8)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                entity: "class record",
                id: id.to_string(),
            })?;

        let key = RecordKey {
            quarter: head.quarter.parse().map_err(corrupt)?,
            section_id: head.section_id,
            subject_id: head.subject_id,
            school_year: head.school_year,
        };
        let (ww, pt, qa) = head.weights;
        let weights = validate_weights(ww, pt, qa).map_err(corrupt)?;
        let hps: HpsTable = serde_json::from_str(&head.hps_json).map_err(corrupt)?;

        let mut rows = {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.student_id, s.last_name, s.first_name, s.middle_name, s.gender
                 FROM student_grades g
                 LEFT JOIN section_students s
                   ON s.section_id = ? AND s.student_id = g.student_id
                 WHERE g.class_record_id = ?
                 ORDER BY s.last_name IS NULL, s.last_name COLLATE NOCASE,
                          s.first_name COLLATE NOCASE, g.student_id",
            )?;
            let mapped = stmt.query_map((&key.section_id, id), |r| {
                let student_id: String = r.get(1)?;
                let last: Option<String> = r.get(2)?;
                let first: Option<String> = r.get(3)?;
                let middle: Option<String> = r.get(4)?;
                let name = display_name(last.as_deref(), first.as_deref(), middle.as_deref())
                    .unwrap_or_else(|| student_id.clone());
                Ok(StudentGradeRow {
                    grade_id: r.get(0)?,
                    student_id,
                    name,
                    gender: r.get(5)?,
                    scores: ScoreSheet::blank(&hps),
                    computed: self.computer.compute(&ScoreSheet::default(), &hps, &weights),
                })
            })?;
            mapped.collect::<Result<Vec<_>, _>>()?
        };

        let by_grade: HashMap<String, usize> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.grade_id.clone(), i))
            .collect();
        let mut stmt = conn.prepare(
            "SELECT c.grade_id, c.category, c.item_idx, c.raw_value
             FROM scores c
             JOIN student_grades g ON g.id = c.grade_id
             WHERE g.class_record_id = ?",
        )?;
        let cells = stmt
            .query_map([id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, f64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (grade_id, category, item_idx, value) in cells {
            let Some(&row_idx) = by_grade.get(&grade_id) else {
                continue;
            };
            let category: Category = category.parse().map_err(corrupt)?;
            let slot = usize::try_from(item_idx)
                .ok()
                .and_then(|i| rows[row_idx].scores.get_mut(category).get_mut(i));
            match slot {
                Some(cell) => *cell = value,
                None if value == 0.0 => {}
                None => {
                    return Err(StoreError::Corrupt(format!(
                        "score {category:?}[{item_idx}] of grade {grade_id} has no matching HPS item"
                    )))
                }
            }
        }

        let mut record = ClassRecord {
            id: id.to_string(),
            key,
            weights,
            hps,
            rows,
            version: head.version,
        };
        record.recompute_all(&self.computer);
        Ok(record)
    }

    fn save_snapshot(&self, actor_id: &str, request: &SaveRequest) -> Result<SaveReceipt, StoreError> {
        let weights = validate_weights(request.weights.ww, request.weights.pt, request.weights.qa)?;

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut record = self.read_record(&tx, &request.class_record_id)?;

        let mut incoming: HashMap<&str, &ScoreSheet> = HashMap::new();
        for student in &request.students {
            if !record.rows.iter().any(|r| r.grade_id == student.grade_id) {
                return Err(ValidationError::UnknownStudent(student.grade_id.clone()).into());
            }
            incoming.insert(student.grade_id.as_str(), &student.scores);
        }
        let sheet_for = |row: &StudentGradeRow| -> ScoreSheet {
            incoming
                .get(row.grade_id.as_str())
                .map(|s| (*s).clone())
                .unwrap_or_else(|| row.scores.clone())
        };

        // The table must cover every scored column, submitted or kept.
        let mut hps = HpsTable::default();
        for category in Category::ALL {
            let scored = record
                .rows
                .iter()
                .map(|r| sheet_for(r).scored_items(category))
                .max()
                .unwrap_or(0);
            hps.set(
                category,
                validate_hps(category, request.hps.get(category), scored)?,
            );
        }

        let mut sheets = Vec::with_capacity(record.rows.len());
        for row in &record.rows {
            let mut sheet = sheet_for(row);
            sheet.fit_to(&hps);
            for category in Category::ALL {
                for (i, v) in sheet.get_mut(category).iter_mut().enumerate() {
                    *v = check_score(&hps, self.policy, category, i, *v)?;
                }
            }
            sheets.push(sheet);
        }
        for (row, sheet) in record.rows.iter_mut().zip(sheets) {
            row.scores = sheet;
        }
        record.weights = weights;
        record.hps = hps;
        record.recompute_all(&self.computer);
        record.version += 1;

        let now = Utc::now();
        let stamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
        tx.execute(
            "UPDATE class_records
             SET ww_weight = ?, pt_weight = ?, qa_weight = ?, hps_json = ?, version = ?, updated_at = ?
             WHERE id = ?",
            params![
                i64::from(record.weights.ww()),
                i64::from(record.weights.pt()),
                i64::from(record.weights.qa()),
                serde_json::to_string(&record.hps).map_err(corrupt)?,
                record.version,
                stamp,
                record.id,
            ],
        )?;
        for row in &record.rows {
            write_row(&tx, row, &stamp)?;
        }

        let snapshot = serde_json::to_vec(&SaveRequest::snapshot(&record)).map_err(corrupt)?;
        let content_hash = history::fingerprint(&snapshot);
        let history_id = history::append(
            &tx,
            &record.id,
            actor_id,
            HistoryAction::Updated,
            now,
            Some(&content_hash),
        )?;
        tx.commit()?;

        info!(
            class_record_id = %record.id,
            version = record.version,
            history_id,
            actor_id,
            "class record saved"
        );
        Ok(SaveReceipt {
            version: record.version,
            saved_at: stamp,
            history_id,
            content_hash,
        })
    }

    /// Hands the finalized aggregate to an export consumer and records the
    /// export in the history log.
    pub fn export_record(
        &self,
        class_record_id: &str,
        actor_id: &str,
        action: HistoryAction,
    ) -> Result<(ClassRecord, HistoryEntry), StoreError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let record = self.read_record(&tx, class_record_id)?;
        let snapshot = serde_json::to_vec(&SaveRequest::snapshot(&record)).map_err(corrupt)?;
        let hash = history::fingerprint(&snapshot);
        history::append(&tx, &record.id, actor_id, action, Utc::now(), Some(&hash))?;
        let entry = history::latest(&tx, &record.id)?.ok_or_else(|| StoreError::NotFound {
            entity: "history entry",
            id: record.id.clone(),
        })?;
        tx.commit()?;
        debug!(class_record_id, action = action.as_str(), "export recorded");
        Ok((record, entry))
    }

    fn history_for(&self, class_record_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let conn = self.conn()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM class_records WHERE id = ?",
                [class_record_id],
                |r| r.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(StoreError::NotFound {
                entity: "class record",
                id: class_record_id.to_string(),
            });
        }
        Ok(history::query(&conn, class_record_id)?)
    }

    pub fn history_by_actor(
        &self,
        actor_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let conn = self.conn()?;
        Ok(history::query_by_actor(&conn, actor_id, limit)?)
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn load(&self, key: &RecordKey) -> Result<LoadOutcome, StoreError> {
        self.get_or_create(key)
    }

    async fn save(&self, actor_id: &str, request: &SaveRequest) -> Result<SaveReceipt, StoreError> {
        self.save_snapshot(actor_id, request)
    }

    async fn history(&self, class_record_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        self.history_for(class_record_id)
    }
}

fn find_record_id(conn: &Connection, key: &RecordKey) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT id FROM class_records
         WHERE section_id = ? AND subject_id = ? AND quarter = ? AND school_year = ?",
        (
            &key.section_id,
            &key.subject_id,
            key.quarter.as_str(),
            &key.school_year,
        ),
        |r| r.get(0),
    )
    .optional()
}

/// Gives every active roster student without a row in this record one.
fn enroll_roster(
    conn: &Connection,
    class_record_id: &str,
    section_id: &str,
    stamp: &str,
) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT s.student_id FROM section_students s
         WHERE s.section_id = ? AND s.active = 1
           AND NOT EXISTS (
             SELECT 1 FROM student_grades g
             WHERE g.class_record_id = ? AND g.student_id = s.student_id
           )",
    )?;
    let missing = stmt
        .query_map((section_id, class_record_id), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for student_id in &missing {
        conn.execute(
            "INSERT INTO student_grades(id, class_record_id, student_id, updated_at)
             VALUES(?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                class_record_id,
                student_id,
                stamp,
            ),
        )?;
    }
    Ok(missing.len())
}

fn write_row(conn: &Connection, row: &StudentGradeRow, stamp: &str) -> rusqlite::Result<()> {
    let c = &row.computed;
    conn.execute(
        "UPDATE student_grades SET
           ww_total = ?, ww_percentage = ?, ww_weighted_score = ?,
           pt_total = ?, pt_percentage = ?, pt_weighted_score = ?,
           qa_total = ?, qa_percentage = ?, qa_weighted_score = ?,
           initial_grade = ?, quarterly_grade = ?, updated_at = ?
         WHERE id = ?",
        params![
            c.ww.total,
            c.ww.percentage,
            c.ww.weighted_score,
            c.pt.total,
            c.pt.percentage,
            c.pt.weighted_score,
            c.qa.total,
            c.qa.percentage,
            c.qa.weighted_score,
            c.initial_grade,
            i64::from(c.quarterly_grade),
            stamp,
            row.grade_id,
        ],
    )?;
    conn.execute("DELETE FROM scores WHERE grade_id = ?", [&row.grade_id])?;
    let mut insert = conn.prepare_cached(
        "INSERT INTO scores(grade_id, category, item_idx, raw_value) VALUES(?, ?, ?, ?)",
    )?;
    for category in Category::ALL {
        for (i, value) in row.scores.get(category).iter().enumerate() {
            insert.execute(params![row.grade_id, category.as_str(), i as i64, value])?;
        }
    }
    Ok(())
}

/// "Last, First Middle" as the class record lists students.
fn display_name(last: Option<&str>, first: Option<&str>, middle: Option<&str>) -> Option<String> {
    let last = last?;
    let mut name = format!("{}, {}", last, first.unwrap_or_default());
    if let Some(m) = middle.filter(|m| !m.is_empty()) {
        name.push(' ');
        name.push_str(m);
    }
    Some(name.trim_end().to_string())
}
