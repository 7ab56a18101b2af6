use super::error::HandlerErr;
use crate::model::RecordKey;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn get_required_i64(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing integer {}", key)))
}

pub fn get_optional_i64(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn get_optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

/// Deserialises the whole params object into a typed request.
pub fn parse<T: DeserializeOwned>(params: &Value) -> Result<T, HandlerErr> {
    serde_json::from_value(params.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid params: {}", e)))
}

/// Quarter may arrive as "Q1" or as a bare number.
fn quarter_param(params: &Value) -> Result<String, HandlerErr> {
    match params.get("quarter") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(HandlerErr::bad_params("missing quarter")),
    }
}

pub fn record_key(params: &Value) -> Result<RecordKey, HandlerErr> {
    let section_id = get_required_str(params, "sectionId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let quarter = quarter_param(params)?;
    let school_year = get_required_str(params, "schoolYear")?;
    Ok(RecordKey::new(&section_id, &subject_id, &quarter, &school_year)?)
}

pub fn actor_id(params: &Value) -> Result<String, HandlerErr> {
    Ok(get_optional_str(params, "actorId")?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "system".to_string()))
}
