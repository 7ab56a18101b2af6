use crate::calc::{round_off, GradeBreakdown};
use crate::model::Quarter;
use crate::transmute::TransmutationTable;
use serde::Serialize;

pub fn is_passing(quarterly_grade: u32, passing_grade: u32) -> bool {
    quarterly_grade >= passing_grade
}

/// Early-warning classification of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Standing {
    NoScores,
    Failed,
    AtRisk,
    OnTrack,
}

impl Standing {
    /// A row is judged in initial-grade terms against the lowest initial grade
    /// that still transmutes to the passing grade. Until the quarterly
    /// assessment has a score the row can only be at risk, not failed.
    pub fn classify(
        computed: &GradeBreakdown,
        table: &TransmutationTable,
        passing_grade: u32,
    ) -> Standing {
        if computed.initial_grade <= 0.0 {
            return Standing::NoScores;
        }
        let threshold = table.min_initial_for(passing_grade).unwrap_or(f64::INFINITY);
        if computed.initial_grade >= threshold {
            return Standing::OnTrack;
        }
        if computed.qa.total > 0.0 {
            Standing::Failed
        } else {
            Standing::AtRisk
        }
    }
}

/// How far a warned row is from passing, in initial-grade points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredPerformance {
    pub current_grade: u32,
    pub initial_grade: f64,
    pub target_grade: u32,
    pub target_initial_grade: f64,
    pub points_needed: f64,
    pub qa_completed: bool,
}

impl RequiredPerformance {
    /// Only rows classified at risk or failed carry a requirement.
    pub fn assess(
        computed: &GradeBreakdown,
        table: &TransmutationTable,
        passing_grade: u32,
    ) -> Option<RequiredPerformance> {
        match Standing::classify(computed, table, passing_grade) {
            Standing::AtRisk | Standing::Failed => {}
            Standing::NoScores | Standing::OnTrack => return None,
        }
        let target_initial_grade = table.min_initial_for(passing_grade)?;
        Some(RequiredPerformance {
            current_grade: computed.quarterly_grade,
            initial_grade: computed.initial_grade,
            target_grade: passing_grade,
            target_initial_grade,
            points_needed: round_off((target_initial_grade - computed.initial_grade).max(0.0), 2),
            qa_completed: computed.qa.total > 0.0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Remarks {
    #[serde(rename = "PASSED")]
    Passed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "---")]
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterGrade {
    pub quarter: Quarter,
    pub quarterly_grade: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub quarters: Vec<QuarterGrade>,
    pub final_grade: Option<u32>,
    pub remarks: Remarks,
}

impl GradeSummary {
    /// Final grade is the mean of the quarters that have a grade, with halves
    /// rounded to even.
    pub fn from_quarters(quarters: [Option<u32>; 4], passing_grade: u32) -> Self {
        let graded: Vec<u32> = quarters.iter().flatten().copied().filter(|&g| g > 0).collect();
        let final_grade = if graded.is_empty() {
            None
        } else {
            let sum: u32 = graded.iter().sum();
            Some((f64::from(sum) / graded.len() as f64).round_ties_even() as u32)
        };
        let remarks = match final_grade {
            Some(g) if is_passing(g, passing_grade) => Remarks::Passed,
            Some(_) => Remarks::Failed,
            None => Remarks::None,
        };
        Self {
            quarters: Quarter::ALL
                .iter()
                .zip(quarters)
                .map(|(&quarter, quarterly_grade)| QuarterGrade {
                    quarter,
                    quarterly_grade,
                })
                .collect(),
            final_grade,
            remarks,
        }
    }
}
