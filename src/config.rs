use crate::calc::GradeComputer;
use crate::error::ValidationError;
use crate::model::{validate_hps, validate_weights, Category, HpsTable, WeightConfig};
use crate::transmute::{TransmutationStep, TransmutationTable};
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// What an edit above the item's HPS does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorePolicy {
    #[default]
    Reject,
    Clamp,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeightDefaults {
    pub ww: i64,
    pub pt: i64,
    pub qa: i64,
}

impl Default for WeightDefaults {
    fn default() -> Self {
        Self {
            ww: 30,
            pt: 50,
            qa: 20,
        }
    }
}

/// Shape of a freshly created class record.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordDefaults {
    pub weights: WeightDefaults,
    pub ww_items: usize,
    pub pt_items: usize,
    pub qa_items: usize,
    pub item_hps: i64,
    pub qa_hps: i64,
}

impl Default for RecordDefaults {
    fn default() -> Self {
        Self {
            weights: WeightDefaults::default(),
            ww_items: 10,
            pt_items: 10,
            qa_items: 1,
            item_hps: 10,
            qa_hps: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { debounce_ms: 3000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    pub decimals: u32,
    pub score_policy: ScorePolicy,
    pub passing_grade: u32,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            decimals: 2,
            score_policy: ScorePolicy::Reject,
            passing_grade: 75,
        }
    }
}

/// Either a named preset or an explicit table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransmutationConfig {
    pub preset: Option<String>,
    pub floor: Option<u32>,
    pub steps: Vec<TransmutationStep>,
}

impl Default for TransmutationConfig {
    fn default() -> Self {
        Self {
            preset: Some("deped-k12".to_string()),
            floor: None,
            steps: Vec::new(),
        }
    }
}

impl TransmutationConfig {
    pub fn build(&self) -> Result<TransmutationTable, ValidationError> {
        if !self.steps.is_empty() || self.floor.is_some() {
            return TransmutationTable::new(self.floor.unwrap_or(0), self.steps.clone());
        }
        let name = self.preset.as_deref().unwrap_or("deped-k12");
        TransmutationTable::preset(name)
            .ok_or_else(|| ValidationError::Transmutation(format!("unknown preset {name:?}")))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub defaults: RecordDefaults,
    pub sync: SyncConfig,
    pub grading: GradingConfig,
    pub transmutation: TransmutationConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: EngineConfig =
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        cfg.check()
            .with_context(|| format!("validating config {}", path.display()))?;
        Ok(cfg)
    }

    /// Fails fast on defaults that could never produce a valid class record.
    pub fn check(&self) -> Result<(), ValidationError> {
        self.default_weights()?;
        self.default_hps()?;
        self.transmutation.build()?;
        Ok(())
    }

    pub fn default_weights(&self) -> Result<WeightConfig, ValidationError> {
        let w = &self.defaults.weights;
        validate_weights(w.ww, w.pt, w.qa)
    }

    pub fn default_hps(&self) -> Result<HpsTable, ValidationError> {
        let d = &self.defaults;
        Ok(HpsTable {
            ww: validate_hps(Category::Ww, &vec![d.item_hps; d.ww_items], 0)?,
            pt: validate_hps(Category::Pt, &vec![d.item_hps; d.pt_items], 0)?,
            qa: validate_hps(Category::Qa, &vec![d.qa_hps; d.qa_items], 0)?,
        })
    }

    pub fn computer(&self) -> Result<GradeComputer, ValidationError> {
        let table = self.transmutation.build()?;
        Ok(GradeComputer::new(Arc::new(table), self.grading.decimals))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.sync.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_fresh_class_record() {
        let cfg = EngineConfig::default();
        let w = cfg.default_weights().expect("weights");
        assert_eq!((w.ww(), w.pt(), w.qa()), (30, 50, 20));
        let hps = cfg.default_hps().expect("hps");
        assert_eq!(hps.ww, vec![10; 10]);
        assert_eq!(hps.pt, vec![10; 10]);
        assert_eq!(hps.qa, vec![50]);
        assert_eq!(cfg.debounce(), Duration::from_secs(3));
        assert_eq!(cfg.computer().expect("computer").transmutation().floor(), 60);
    }

    #[test]
    fn toml_overrides_and_custom_table() {
        let cfg: EngineConfig = toml::from_str(
            r#"
            [defaults]
            ww_items = 4
            item_hps = 20

            [defaults.weights]
            ww = 25
            pt = 45
            qa = 30

            [sync]
            debounce_ms = 250

            [grading]
            score_policy = "clamp"

            [transmutation]
            floor = 1
            steps = [ { min = 50.0, grade = 2 }, { min = 80.0, grade = 3 } ]
            "#,
        )
        .expect("parse");
        cfg.check().expect("valid");
        assert_eq!(cfg.default_hps().expect("hps").ww, vec![20; 4]);
        assert_eq!(cfg.default_weights().expect("weights").qa(), 30);
        assert_eq!(cfg.grading.score_policy, ScorePolicy::Clamp);
        assert_eq!(cfg.debounce(), Duration::from_millis(250));
        let table = cfg.transmutation.build().expect("table");
        assert_eq!(table.transmute(0.0), 1);
        assert_eq!(table.transmute(85.0), 3);
    }

    #[test]
    fn bad_defaults_are_rejected() {
        let cfg: EngineConfig = toml::from_str(
            r#"
            [defaults.weights]
            ww = 40
            pt = 40
            qa = 40
            "#,
        )
        .expect("parse");
        assert!(matches!(cfg.check(), Err(ValidationError::WeightSum { .. })));

        let cfg: EngineConfig = toml::from_str(
            r#"
            [transmutation]
            preset = "unknown"
            "#,
        )
        .expect("parse");
        assert!(matches!(cfg.check(), Err(ValidationError::Transmutation(_))));
    }
}
