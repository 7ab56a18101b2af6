use crate::calc::{GradeBreakdown, GradeComputer};
use crate::config::ScorePolicy;
use crate::error::ValidationError;
use crate::model::{validate_hps, validate_weights, Category, HpsTable, RecordKey, ScoreSheet, WeightConfig};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGradeRow {
    #[serde(rename = "id")]
    pub student_id: String,
    pub grade_id: String,
    pub name: String,
    pub gender: Option<String>,
    pub scores: ScoreSheet,
    pub computed: GradeBreakdown,
}

/// One (section, subject, quarter, school year) gradebook: the unit of load
/// and save. Rows are only mutated through the edit operations below, each of
/// which recomputes what it touched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: String,
    #[serde(flatten)]
    pub key: RecordKey,
    pub weights: WeightConfig,
    pub hps: HpsTable,
    #[serde(skip)]
    pub rows: Vec<StudentGradeRow>,
    pub version: i64,
}

impl ClassRecord {
    pub fn row(&self, student_id: &str) -> Option<&StudentGradeRow> {
        self.rows.iter().find(|r| r.student_id == student_id)
    }

    fn row_index(&self, student_id: &str) -> Result<usize, ValidationError> {
        self.rows
            .iter()
            .position(|r| r.student_id == student_id)
            .ok_or_else(|| ValidationError::UnknownStudent(student_id.to_string()))
    }

    pub fn apply_score_edit(
        &mut self,
        computer: &GradeComputer,
        policy: ScorePolicy,
        student_id: &str,
        category: Category,
        item_index: usize,
        value: f64,
    ) -> Result<&StudentGradeRow, ValidationError> {
        let idx = self.row_index(student_id)?;
        let value = check_score(&self.hps, policy, category, item_index, value)?;

        let row = &mut self.rows[idx];
        row.scores.fit_to(&self.hps);
        row.scores.get_mut(category)[item_index] = value;
        self.recompute_row(computer, idx);
        Ok(&self.rows[idx])
    }

    pub fn apply_weight_change(
        &mut self,
        computer: &GradeComputer,
        ww: i64,
        pt: i64,
        qa: i64,
    ) -> Result<(), ValidationError> {
        self.weights = validate_weights(ww, pt, qa)?;
        self.recompute_all(computer);
        Ok(())
    }

    /// Replaces one category's HPS table. Existing scores must still fit the
    /// new table unless the policy clamps them.
    pub fn apply_hps_change(
        &mut self,
        computer: &GradeComputer,
        policy: ScorePolicy,
        category: Category,
        values: &[i64],
    ) -> Result<(), ValidationError> {
        let scored = self
            .rows
            .iter()
            .map(|r| r.scores.scored_items(category))
            .max()
            .unwrap_or(0);
        let table = validate_hps(category, values, scored)?;

        let mut next = self.hps.clone();
        next.set(category, table);
        let mut sheets = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let mut sheet = row.scores.clone();
            sheet.fit_to(&next);
            for (i, v) in sheet.get_mut(category).iter_mut().enumerate() {
                *v = check_score(&next, policy, category, i, *v)?;
            }
            sheets.push(sheet);
        }

        self.hps = next;
        for (row, sheet) in self.rows.iter_mut().zip(sheets) {
            row.scores = sheet;
        }
        self.recompute_all(computer);
        Ok(())
    }

    pub fn recompute_row(&mut self, computer: &GradeComputer, idx: usize) {
        let row = &mut self.rows[idx];
        row.computed = computer.compute(&row.scores, &self.hps, &self.weights);
    }

    pub fn recompute_all(&mut self, computer: &GradeComputer) {
        for idx in 0..self.rows.len() {
            self.recompute_row(computer, idx);
        }
    }
}

/// Bounds check for one raw score against the item's HPS.
pub fn check_score(
    hps: &HpsTable,
    policy: ScorePolicy,
    category: Category,
    item_index: usize,
    value: f64,
) -> Result<f64, ValidationError> {
    let Some(&max) = hps.get(category).get(item_index) else {
        return Err(ValidationError::UnknownItem {
            category: category.as_str(),
            index: item_index,
        });
    };
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::ScoreInvalid {
            category: category.as_str(),
            index: item_index,
            value,
        });
    }
    if value > f64::from(max) {
        return match policy {
            ScorePolicy::Reject => Err(ValidationError::ScoreAboveHps {
                category: category.as_str(),
                index: item_index,
                value,
                hps: max,
            }),
            ScorePolicy::Clamp => Ok(f64::from(max)),
        };
    }
    Ok(value)
}
