use super::require_store;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::params::get_required_str;
use crate::ipc::types::{AppState, Request};
use crate::model::{Quarter, RecordKey};
use crate::summary::GradeSummary;
use serde_json::json;

/// Final grade across the four quarters for one student. Quarters without a
/// class record, or where the student has no scores yet, do not count.
fn summary_student(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = require_store(state)?;
    let section_id = get_required_str(params, "sectionId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let school_year = get_required_str(params, "schoolYear")?;
    let student_id = get_required_str(params, "studentId")?;

    let mut grades = [None; 4];
    for (slot, quarter) in grades.iter_mut().zip(Quarter::ALL) {
        let key = RecordKey::new(&section_id, &subject_id, quarter.as_str(), &school_year)?;
        let Some(record) = store.find_record(&key)? else {
            continue;
        };
        *slot = record
            .row(&student_id)
            .filter(|r| r.computed.initial_grade > 0.0)
            .map(|r| r.computed.quarterly_grade);
    }

    let summary = GradeSummary::from_quarters(grades, state.config.grading.passing_grade);
    let mut result = json!(summary);
    result["studentId"] = json!(student_id);
    Ok(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "summary.student" => Some(respond(&req.id, summary_student(state, &req.params))),
        _ => None,
    }
}
