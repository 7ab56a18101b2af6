use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::config::EngineConfig;
use crate::store::SqliteStore;
use crate::sync::SyncController;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: EngineConfig,
    pub workspace: Option<PathBuf>,
    pub store: Option<Arc<SqliteStore>>,
    /// Open editing sessions by session id.
    pub sessions: HashMap<String, SyncController>,
}

impl AppState {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            workspace: None,
            store: None,
            sessions: HashMap::new(),
        }
    }
}
