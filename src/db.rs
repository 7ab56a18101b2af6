use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "classrecord.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE_NAME))?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Section roster as fed by the enrollment side; the class record copies
    // active students from here on load.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS section_students(
            section_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            middle_name TEXT,
            gender TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY(section_id, student_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_records(
            id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            quarter TEXT NOT NULL,
            school_year TEXT NOT NULL,
            ww_weight INTEGER NOT NULL,
            pt_weight INTEGER NOT NULL,
            qa_weight INTEGER NOT NULL,
            hps_json TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(section_id, subject_id, quarter, school_year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_records_section ON class_records(section_id, school_year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_grades(
            id TEXT PRIMARY KEY,
            class_record_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            ww_total REAL NOT NULL DEFAULT 0,
            ww_percentage REAL NOT NULL DEFAULT 0,
            ww_weighted_score REAL NOT NULL DEFAULT 0,
            pt_total REAL NOT NULL DEFAULT 0,
            pt_percentage REAL NOT NULL DEFAULT 0,
            pt_weighted_score REAL NOT NULL DEFAULT 0,
            qa_total REAL NOT NULL DEFAULT 0,
            qa_percentage REAL NOT NULL DEFAULT 0,
            qa_weighted_score REAL NOT NULL DEFAULT 0,
            initial_grade REAL NOT NULL DEFAULT 0,
            quarterly_grade INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            FOREIGN KEY(class_record_id) REFERENCES class_records(id),
            UNIQUE(class_record_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_grades_record ON student_grades(class_record_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_grades_student ON student_grades(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scores(
            grade_id TEXT NOT NULL,
            category TEXT NOT NULL,
            item_idx INTEGER NOT NULL,
            raw_value REAL NOT NULL,
            PRIMARY KEY(grade_id, category, item_idx),
            FOREIGN KEY(grade_id) REFERENCES student_grades(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS history_entries(
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            class_record_id TEXT NOT NULL,
            actor_id TEXT NOT NULL,
            action TEXT NOT NULL,
            created_at TEXT NOT NULL,
            content_hash TEXT,
            FOREIGN KEY(class_record_id) REFERENCES class_records(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_history_record ON history_entries(class_record_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_history_actor ON history_entries(actor_id)",
        [],
    )?;

    Ok(())
}
