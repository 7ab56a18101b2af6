pub mod classrecord;
pub mod core;
pub mod roster;
pub mod session;
pub mod summary;

use super::error::HandlerErr;
use super::types::AppState;
use crate::record::{ClassRecord, StudentGradeRow};
use crate::store::SqliteStore;
use crate::summary::{is_passing, RequiredPerformance, Standing};
use crate::transmute::TransmutationTable;
use serde_json::json;
use std::sync::Arc;

pub(crate) fn require_store(state: &AppState) -> Result<Arc<SqliteStore>, HandlerErr> {
    state.store.clone().ok_or_else(|| HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".to_string(),
        details: None,
    })
}

/// Student rows as the grid shows them, with the early-warning fields. Rows
/// that are at risk or failing also say how far they are from passing.
pub(crate) fn row_json(
    row: &StudentGradeRow,
    table: &TransmutationTable,
    passing_grade: u32,
) -> serde_json::Value {
    let mut value = json!(row);
    value["standing"] = json!(Standing::classify(&row.computed, table, passing_grade));
    value["isPassing"] = json!(is_passing(row.computed.quarterly_grade, passing_grade));
    value["requiredPerformance"] =
        json!(RequiredPerformance::assess(&row.computed, table, passing_grade));
    value
}

pub(crate) fn rows_json(
    rows: &[StudentGradeRow],
    table: &TransmutationTable,
    passing_grade: u32,
) -> Vec<serde_json::Value> {
    rows.iter()
        .map(|r| row_json(r, table, passing_grade))
        .collect()
}

/// The load payload: `{classRecord, students}`.
pub(crate) fn record_json(
    record: &ClassRecord,
    table: &TransmutationTable,
    passing_grade: u32,
) -> serde_json::Value {
    json!({
        "classRecord": record,
        "students": rows_json(&record.rows, table, passing_grade),
    })
}
