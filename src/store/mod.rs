mod sqlite;

pub use sqlite::{RosterStudent, SqliteStore};

use crate::error::StoreError;
use crate::history::HistoryEntry;
use crate::model::{Category, RecordKey, ScoreSheet};
use crate::record::ClassRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub record: ClassRecord,
    pub created: bool,
}

/// Weights as submitted; validated by the store before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawWeights {
    pub ww: i64,
    pub pt: i64,
    pub qa: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawHps {
    #[serde(default)]
    pub ww: Vec<i64>,
    #[serde(default)]
    pub pt: Vec<i64>,
    #[serde(default)]
    pub qa: Vec<i64>,
}

impl RawHps {
    pub fn get(&self, category: Category) -> &[i64] {
        match category {
            Category::Ww => &self.ww,
            Category::Pt => &self.pt,
            Category::Qa => &self.qa,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentScores {
    pub grade_id: String,
    #[serde(default)]
    pub scores: ScoreSheet,
}

/// Whole-aggregate save payload; there is no partial-row save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub class_record_id: String,
    pub weights: RawWeights,
    pub hps: RawHps,
    #[serde(default)]
    pub students: Vec<StudentScores>,
}

impl SaveRequest {
    pub fn snapshot(record: &ClassRecord) -> Self {
        let widen = |v: &[u32]| v.iter().map(|&x| i64::from(x)).collect::<Vec<_>>();
        Self {
            class_record_id: record.id.clone(),
            weights: RawWeights {
                ww: i64::from(record.weights.ww()),
                pt: i64::from(record.weights.pt()),
                qa: i64::from(record.weights.qa()),
            },
            hps: RawHps {
                ww: widen(&record.hps.ww),
                pt: widen(&record.hps.pt),
                qa: widen(&record.hps.qa),
            },
            students: record
                .rows
                .iter()
                .map(|r| StudentScores {
                    grade_id: r.grade_id.clone(),
                    scores: r.scores.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReceipt {
    pub version: i64,
    pub saved_at: String,
    pub history_id: i64,
    pub content_hash: String,
}

/// Persistence contract the sync layer needs. Implementations must make
/// `load` get-or-create and `save` atomic, appending exactly one history
/// entry per successful save.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load(&self, key: &RecordKey) -> Result<LoadOutcome, StoreError>;

    async fn save(&self, actor_id: &str, request: &SaveRequest) -> Result<SaveReceipt, StoreError>;

    async fn history(&self, class_record_id: &str) -> Result<Vec<HistoryEntry>, StoreError>;
}
