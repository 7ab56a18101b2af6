use super::require_store;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::params::{get_required_str, parse};
use crate::ipc::types::{AppState, Request};
use crate::store::RosterStudent;
use serde_json::json;

fn roster_import(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let store = require_store(state)?;
    let section_id = get_required_str(params, "sectionId")?;
    let students: Vec<RosterStudent> = match params.get("students") {
        Some(v) => parse(v)?,
        None => return Err(HandlerErr::bad_params("missing students")),
    };
    let imported = store.import_roster(&section_id, &students)?;
    Ok(json!({ "sectionId": section_id.trim(), "imported": imported }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.import" => Some(respond(&req.id, roster_import(state, &req.params))),
        _ => None,
    }
}
