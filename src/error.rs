use thiserror::Error;

/// Rejected input. Raised before any mutation or save; never coerced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("weights must sum to 100 (ww={ww}, pt={pt}, qa={qa}, sum={sum})")]
    WeightSum { ww: i64, pt: i64, qa: i64, sum: i64 },

    #[error("weight {field} must be between 0 and 100, got {value}")]
    WeightRange { field: &'static str, value: i64 },

    #[error("highest possible score for {category} item {index} must be > 0, got {value}")]
    HpsNonPositive {
        category: &'static str,
        index: usize,
        value: i64,
    },

    #[error("highest possible score for {category} item {index} is too large, got {value}")]
    HpsOutOfRange {
        category: &'static str,
        index: usize,
        value: i64,
    },

    #[error("{category} has {scored} scored items but only {hps_len} highest possible scores")]
    HpsTooShort {
        category: &'static str,
        scored: usize,
        hps_len: usize,
    },

    #[error("{category} item {index} does not exist")]
    UnknownItem { category: &'static str, index: usize },

    #[error("score {value} for {category} item {index} exceeds highest possible score {hps}")]
    ScoreAboveHps {
        category: &'static str,
        index: usize,
        value: f64,
        hps: u32,
    },

    #[error("score for {category} item {index} must be a finite number >= 0, got {value}")]
    ScoreInvalid {
        category: &'static str,
        index: usize,
        value: f64,
    },

    #[error("student {0} is not part of this class record")]
    UnknownStudent(String),

    #[error("malformed identity: {0}")]
    Identity(String),

    #[error("transmutation table is invalid: {0}")]
    Transmutation(String),
}

impl ValidationError {
    /// Field the inline error belongs to, as the presentation layer names it.
    pub fn field(&self) -> String {
        match self {
            ValidationError::WeightSum { .. } => "weights".to_string(),
            ValidationError::WeightRange { field, .. } => format!("weights.{field}"),
            ValidationError::HpsNonPositive {
                category, index, ..
            }
            | ValidationError::HpsOutOfRange {
                category, index, ..
            } => format!("hps.{category}[{index}]"),
            ValidationError::HpsTooShort { category, .. } => format!("hps.{category}"),
            ValidationError::UnknownItem { category, index }
            | ValidationError::ScoreAboveHps {
                category, index, ..
            }
            | ValidationError::ScoreInvalid {
                category, index, ..
            } => format!("scores.{category}[{index}]"),
            ValidationError::UnknownStudent(_) => "studentId".to_string(),
            ValidationError::Identity(_) => "identity".to_string(),
            ValidationError::Transmutation(_) => "transmutation".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::Validation(_) => "validation_failed",
            StoreError::Database(_)
            | StoreError::Corrupt(_)
            | StoreError::LockPoisoned
            | StoreError::Unavailable(_) => "store_failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Transient; local edits stay dirty and the save can be retried.
    #[error("save failed: {0}")]
    Store(#[from] StoreError),

    #[error("class record has unsaved changes")]
    UnsavedChanges,
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Validation(_) => "validation_failed",
            SyncError::Store(e) => e.code(),
            SyncError::UnsavedChanges => "unsaved_changes",
        }
    }
}
