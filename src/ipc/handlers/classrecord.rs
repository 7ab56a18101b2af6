use super::{record_json, require_store, row_json};
use crate::history::HistoryAction;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::params::{
    actor_id, get_optional_i64, get_optional_str, get_required_str, parse, record_key,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{RecordStore, SaveRequest};
use serde_json::json;

async fn classrecord_load(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = require_store(state)?;
    let key = record_key(params)?;
    let outcome = store.load(&key).await?;
    let mut result = record_json(
        &outcome.record,
        store.computer().transmutation(),
        state.config.grading.passing_grade,
    );
    result["created"] = json!(outcome.created);
    Ok(result)
}

async fn classrecord_save(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = require_store(state)?;
    let request: SaveRequest = parse(params)?;
    let actor = actor_id(params)?;
    let receipt = store.save(&actor, &request).await?;
    Ok(json!({
        "success": true,
        "version": receipt.version,
        "savedAt": receipt.saved_at,
        "historyId": receipt.history_id,
        "contentHash": receipt.content_hash,
    }))
}

async fn classrecord_history(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = require_store(state)?;
    let history = if let Some(id) = get_optional_str(params, "classRecordId")? {
        store.history(&id).await?
    } else if let Some(actor) = get_optional_str(params, "actorId")? {
        store.history_by_actor(&actor, get_optional_i64(params, "limit")?)?
    } else {
        return Err(HandlerErr::bad_params("missing classRecordId or actorId"));
    };
    Ok(json!({ "history": history }))
}

fn export_action(format: &str) -> Result<HistoryAction, HandlerErr> {
    match format.trim().to_ascii_lowercase().as_str() {
        "pdf" => Ok(HistoryAction::ExportedPdf),
        "xlsx" | "excel" => Ok(HistoryAction::ExportedExcel),
        "print" => Ok(HistoryAction::Printed),
        other => Err(HandlerErr::bad_params(format!(
            "format must be pdf, xlsx or print, got {other:?}"
        ))),
    }
}

/// Export boundary: hands back the finalized aggregate for a renderer and
/// records the export. No file is produced here.
fn classrecord_export(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = require_store(state)?;
    let class_record_id = get_required_str(params, "classRecordId")?;
    let format = get_required_str(params, "format")?;
    let action = export_action(&format)?;
    let actor = actor_id(params)?;
    let (record, entry) = store.export_record(&class_record_id, &actor, action)?;
    let table = store.computer().transmutation();
    let passing = state.config.grading.passing_grade;
    Ok(json!({
        "format": format.trim().to_ascii_lowercase(),
        "classRecord": record,
        "students": record
            .rows
            .iter()
            .map(|r| row_json(r, table, passing))
            .collect::<Vec<_>>(),
        "historyEntry": entry,
    }))
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classrecord.load" => classrecord_load(state, &req.params).await,
        "classrecord.save" => classrecord_save(state, &req.params).await,
        "classrecord.history" => classrecord_history(state, &req.params).await,
        "classrecord.export" => classrecord_export(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
