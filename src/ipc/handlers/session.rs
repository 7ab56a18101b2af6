use super::{record_json, require_store, row_json, rows_json};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::params::{
    actor_id, get_optional_bool, get_optional_i64, get_required_i64, get_required_str, record_key,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Category;
use crate::store::RecordStore;
use crate::sync::{SessionOptions, SyncController};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

fn session<'a>(
    state: &'a AppState,
    params: &serde_json::Value,
) -> Result<(String, &'a SyncController), HandlerErr> {
    let id = get_required_str(params, "sessionId")?;
    match state.sessions.get(&id) {
        Some(c) => Ok((id, c)),
        None => Err(HandlerErr::not_found(format!("session not found: {id}"))),
    }
}

fn category(params: &serde_json::Value) -> Result<Category, HandlerErr> {
    Ok(get_required_str(params, "category")?.parse::<Category>()?)
}

async fn session_open(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = require_store(state)?;
    let key = record_key(params)?;
    let debounce = match get_optional_i64(params, "debounceMs")? {
        Some(ms) if ms < 0 => return Err(HandlerErr::bad_params("debounceMs must be >= 0")),
        Some(ms) => Duration::from_millis(ms as u64),
        None => state.config.debounce(),
    };
    let options = SessionOptions {
        actor_id: actor_id(params)?,
        debounce,
        computer: store.computer().clone(),
        policy: state.config.grading.score_policy,
    };
    let dyn_store: Arc<dyn RecordStore> = store.clone();
    let (controller, created) = SyncController::load(dyn_store, &key, options).await?;
    let record = controller.record()?;
    let status = controller.status()?;

    let session_id = Uuid::new_v4().to_string();
    info!(session_id = %session_id, class_record_id = %record.id, "session opened");
    state.sessions.insert(session_id.clone(), controller);

    let mut result = record_json(
        &record,
        store.computer().transmutation(),
        state.config.grading.passing_grade,
    );
    result["sessionId"] = json!(session_id);
    result["created"] = json!(created);
    result["sync"] = json!(status);
    Ok(result)
}

fn session_edit_score(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = require_store(state)?;
    let (_, c) = session(state, params)?;
    let student_id = get_required_str(params, "studentId")?;
    let category = category(params)?;
    let item_index = get_required_i64(params, "itemIndex")?;
    let item_index =
        usize::try_from(item_index).map_err(|_| HandlerErr::bad_params("itemIndex must be >= 0"))?;
    // A cleared cell arrives as null and counts as 0.
    let value = match params.get("value") {
        None | Some(serde_json::Value::Null) => 0.0,
        Some(v) => v
            .as_f64()
            .ok_or_else(|| HandlerErr::bad_params("value must be a number or null"))?,
    };
    let row = c.apply_score_edit(&student_id, category, item_index, value)?;
    Ok(json!({
        "student": row_json(&row, store.computer().transmutation(), state.config.grading.passing_grade),
        "sync": c.status()?,
    }))
}

fn session_set_weights(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = require_store(state)?;
    let (_, c) = session(state, params)?;
    let ww = get_required_i64(params, "ww")?;
    let pt = get_required_i64(params, "pt")?;
    let qa = get_required_i64(params, "qa")?;
    let rows = c.apply_weight_change(ww, pt, qa)?;
    Ok(json!({
        "weights": c.record()?.weights,
        "students": rows_json(&rows, store.computer().transmutation(), state.config.grading.passing_grade),
        "sync": c.status()?,
    }))
}

fn session_set_hps(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = require_store(state)?;
    let (_, c) = session(state, params)?;
    let category = category(params)?;
    let values: Vec<i64> = params
        .get("values")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing values"))?
        .iter()
        .map(|v| {
            v.as_i64()
                .ok_or_else(|| HandlerErr::bad_params("values must be integers"))
        })
        .collect::<Result<_, _>>()?;
    let rows = c.apply_hps_change(category, &values)?;
    Ok(json!({
        "hps": c.record()?.hps,
        "students": rows_json(&rows, store.computer().transmutation(), state.config.grading.passing_grade),
        "sync": c.status()?,
    }))
}

async fn session_save(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (_, c) = session(state, params)?;
    let c = c.clone();
    let receipt = c.save().await?;
    let mut result = json!({
        "success": true,
        "coalesced": receipt.is_none(),
        "sync": c.status()?,
    });
    if let Some(r) = receipt {
        result["version"] = json!(r.version);
        result["savedAt"] = json!(r.saved_at);
        result["historyId"] = json!(r.history_id);
        result["contentHash"] = json!(r.content_hash);
    }
    Ok(result)
}

fn session_state(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (id, c) = session(state, params)?;
    Ok(json!({ "sessionId": id, "sync": c.status()? }))
}

fn session_close(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let force = get_optional_bool(params, "force")?.unwrap_or(false);
    let (id, c) = session(state, params)?;
    let status = c.close(force)?;
    state.sessions.remove(&id);
    info!(session_id = %id, "session closed");
    Ok(json!({ "closed": true, "sync": status }))
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "session.open" => session_open(state, &req.params).await,
        "session.editScore" => session_edit_score(state, &req.params),
        "session.setWeights" => session_set_weights(state, &req.params),
        "session.setHps" => session_set_hps(state, &req.params),
        "session.save" => session_save(state, &req.params).await,
        "session.state" => session_state(state, &req.params),
        "session.close" => session_close(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
