use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;
use tracing::{debug, warn};

pub async fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    debug!(id = %req.id, method = %req.method, "request");
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::roster::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::classrecord::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::session::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::summary::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

/// Input closed: give sessions with pending edits one last save.
pub async fn shutdown(state: &mut AppState) {
    for (id, controller) in state.sessions.drain() {
        let dirty = controller.status().map(|s| s.dirty).unwrap_or(false);
        if !dirty {
            continue;
        }
        if let Err(e) = controller.save().await {
            warn!(session_id = %id, error = %e, "final save failed");
        }
    }
}
