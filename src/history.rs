use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::str::FromStr;

const ACTOR_HISTORY_DEFAULT_LIMIT: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Updated,
    ExportedPdf,
    ExportedExcel,
    Printed,
}

impl HistoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryAction::Updated => "updated",
            HistoryAction::ExportedPdf => "exported_pdf",
            HistoryAction::ExportedExcel => "exported_excel",
            HistoryAction::Printed => "printed",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            HistoryAction::Updated => "Updated class record",
            HistoryAction::ExportedPdf => "Exported class record to PDF",
            HistoryAction::ExportedExcel => "Exported class record to Excel",
            HistoryAction::Printed => "Printed class record",
        }
    }
}

impl FromStr for HistoryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "updated" => Ok(HistoryAction::Updated),
            "exported_pdf" => Ok(HistoryAction::ExportedPdf),
            "exported_excel" => Ok(HistoryAction::ExportedExcel),
            "printed" => Ok(HistoryAction::Printed),
            other => Err(format!("unknown history action {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub class_record_id: String,
    pub actor_id: String,
    pub action: HistoryAction,
    pub message: String,
    pub date: String,
    pub time: String,
    pub timestamp: String,
    pub content_hash: Option<String>,
}

pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Appends one entry. The log has no update or delete counterpart.
pub fn append(
    conn: &Connection,
    class_record_id: &str,
    actor_id: &str,
    action: HistoryAction,
    at: DateTime<Utc>,
    content_hash: Option<&str>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO history_entries(class_record_id, actor_id, action, created_at, content_hash)
         VALUES(?, ?, ?, ?, ?)",
        (
            class_record_id,
            actor_id,
            action.as_str(),
            at.to_rfc3339_opts(SecondsFormat::Micros, true),
            content_hash,
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

fn map_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let action_raw: String = row.get(3)?;
    let action = action_raw.parse::<HistoryAction>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    let timestamp: String = row.get(4)?;
    let (date, time) = match DateTime::parse_from_rfc3339(&timestamp) {
        Ok(t) => (t.format("%Y-%m-%d").to_string(), t.format("%H:%M:%S").to_string()),
        Err(_) => (String::new(), String::new()),
    };
    Ok(HistoryEntry {
        id: row.get(0)?,
        class_record_id: row.get(1)?,
        actor_id: row.get(2)?,
        action,
        message: action.message().to_string(),
        date,
        time,
        timestamp,
        content_hash: row.get(5)?,
    })
}

/// Entries for one class record, newest first.
pub fn query(conn: &Connection, class_record_id: &str) -> rusqlite::Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT seq, class_record_id, actor_id, action, created_at, content_hash
         FROM history_entries
         WHERE class_record_id = ?
         ORDER BY seq DESC",
    )?;
    let rows = stmt
        .query_map([class_record_id], map_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Recent entries by one actor across class records, newest first.
pub fn query_by_actor(
    conn: &Connection,
    actor_id: &str,
    limit: Option<i64>,
) -> rusqlite::Result<Vec<HistoryEntry>> {
    let limit = limit
        .filter(|l| *l > 0)
        .unwrap_or(ACTOR_HISTORY_DEFAULT_LIMIT);
    let mut stmt = conn.prepare(
        "SELECT seq, class_record_id, actor_id, action, created_at, content_hash
         FROM history_entries
         WHERE actor_id = ?
         ORDER BY seq DESC
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map((actor_id, limit), map_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn latest(conn: &Connection, class_record_id: &str) -> rusqlite::Result<Option<HistoryEntry>> {
    conn.query_row(
        "SELECT seq, class_record_id, actor_id, action, created_at, content_hash
         FROM history_entries
         WHERE class_record_id = ?
         ORDER BY seq DESC
         LIMIT 1",
        [class_record_id],
        map_entry,
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn insert_record(conn: &Connection, id: &str) {
        conn.execute(
            "INSERT INTO class_records(id, section_id, subject_id, quarter, school_year,
               ww_weight, pt_weight, qa_weight, hps_json, created_at, updated_at)
             VALUES(?, 's1', ?, 'Q1', '2025-2026', 30, 50, 20, '{}', '', '')",
            (id, id),
        )
        .expect("insert class record");
    }

    #[test]
    fn entries_come_back_newest_first_and_duplicates_are_kept() {
        let conn = db::open_in_memory().expect("db");
        insert_record(&conn, "cr1");
        insert_record(&conn, "cr2");
        let t0 = Utc::now();
        let hash = fingerprint(b"same content");
        append(&conn, "cr1", "t1", HistoryAction::Updated, t0, Some(&hash)).expect("append");
        append(&conn, "cr1", "t1", HistoryAction::Updated, t0, Some(&hash)).expect("append");
        append(&conn, "cr2", "t1", HistoryAction::ExportedPdf, t0, None).expect("append");
        append(&conn, "cr1", "t2", HistoryAction::Printed, t0, None).expect("append");

        let entries = query(&conn, "cr1").expect("query");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].action, HistoryAction::Printed);
        assert_eq!(entries[1].content_hash, entries[2].content_hash);
        assert!(entries[0].id > entries[1].id);
        assert_eq!(entries[1].message, "Updated class record");
        assert_eq!(entries[1].date.len(), 10);
        assert_eq!(entries[1].time.len(), 8);

        let by_actor = query_by_actor(&conn, "t1", Some(2)).expect("query");
        assert_eq!(by_actor.len(), 2);
        assert_eq!(by_actor[0].class_record_id, "cr2");

        let last = latest(&conn, "cr1").expect("latest").expect("some");
        assert_eq!(last.actor_id, "t2");
        assert!(latest(&conn, "nope").expect("latest").is_none());
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        let h = fingerprint(b"");
        assert_eq!(
            h,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
