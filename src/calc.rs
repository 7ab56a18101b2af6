use crate::model::{Category, HpsTable, ScoreSheet, WeightConfig};
use crate::transmute::TransmutationTable;
use serde::Serialize;
use std::sync::Arc;

/// Half-up rounding to `decimals` places: `Int(10^d * x + 0.5) / 10^d`.
pub fn round_off(x: f64, decimals: u32) -> f64 {
    let scale = 10_f64.powi(decimals as i32);
    ((scale * x) + 0.5).floor() / scale
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResult {
    pub total: f64,
    pub hps_total: u64,
    pub percentage: f64,
    pub weighted_score: f64,
}

/// Derived fields of one student row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBreakdown {
    pub ww: CategoryResult,
    pub pt: CategoryResult,
    pub qa: CategoryResult,
    pub initial_grade: f64,
    pub quarterly_grade: u32,
}

impl GradeBreakdown {
    pub fn category(&self, category: Category) -> &CategoryResult {
        match category {
            Category::Ww => &self.ww,
            Category::Pt => &self.pt,
            Category::Qa => &self.qa,
        }
    }
}

/// Pure grade pipeline: raw scores + HPS + weights -> quarterly grade.
///
/// Bounds on raw scores are enforced at the edit boundary; the computer only
/// clamps the resulting percentage into [0, 100].
#[derive(Debug, Clone)]
pub struct GradeComputer {
    transmutation: Arc<TransmutationTable>,
    decimals: u32,
}

impl GradeComputer {
    pub fn new(transmutation: Arc<TransmutationTable>, decimals: u32) -> Self {
        Self {
            transmutation,
            decimals,
        }
    }

    pub fn transmutation(&self) -> &TransmutationTable {
        &self.transmutation
    }

    pub fn percentage(raw: &[f64], hps: &[u32]) -> f64 {
        let hps_total: u64 = hps.iter().map(|&v| u64::from(v)).sum();
        if hps_total == 0 {
            return 0.0;
        }
        let raw_total: f64 = raw.iter().sum();
        (raw_total / hps_total as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn weighted_score(percentage: f64, weight: u32) -> f64 {
        percentage * f64::from(weight) / 100.0
    }

    fn category(scores: &ScoreSheet, hps: &HpsTable, weights: &WeightConfig, c: Category) -> CategoryResult {
        let raw = scores.get(c);
        let table = hps.get(c);
        let percentage = Self::percentage(raw, table);
        CategoryResult {
            total: raw.iter().sum(),
            hps_total: hps.total(c),
            percentage,
            weighted_score: Self::weighted_score(percentage, weights.weight(c)),
        }
    }

    pub fn compute(&self, scores: &ScoreSheet, hps: &HpsTable, weights: &WeightConfig) -> GradeBreakdown {
        let ww = Self::category(scores, hps, weights, Category::Ww);
        let pt = Self::category(scores, hps, weights, Category::Pt);
        let qa = Self::category(scores, hps, weights, Category::Qa);
        let initial_grade = round_off(
            ww.weighted_score + pt.weighted_score + qa.weighted_score,
            self.decimals,
        );
        GradeBreakdown {
            ww,
            pt,
            qa,
            initial_grade,
            quarterly_grade: self.transmutation.transmute(initial_grade),
        }
    }
}
