use crate::ipc::error::{err, ok};
use crate::ipc::params::get_optional_bool;
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "openSessions": state.sessions.len(),
            "debounceMs": state.config.sync.debounce_ms,
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };
    let force = match get_optional_bool(&req.params, "force") {
        Ok(v) => v.unwrap_or(false),
        Err(e) => return e.response(&req.id),
    };

    // Switching workspaces ends every open session.
    let dirty: Vec<String> = state
        .sessions
        .iter()
        .filter(|(_, c)| c.status().map(|s| s.dirty).unwrap_or(true))
        .map(|(id, _)| id.clone())
        .collect();
    if !dirty.is_empty() && !force {
        return err(
            &req.id,
            "unsaved_changes",
            "open sessions have unsaved changes",
            Some(json!({ "sessionIds": dirty })),
        );
    }

    match SqliteStore::open(&path, &state.config) {
        Ok(store) => {
            if !dirty.is_empty() {
                warn!(sessions = dirty.len(), "discarding sessions with unsaved changes");
            }
            state.sessions.clear();
            state.workspace = Some(path.clone());
            state.store = Some(Arc::new(store));
            info!(workspace = %path.display(), "workspace opened");
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "store_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
