use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// One breakpoint: initial grades at or above `min` report as `grade`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransmutationStep {
    pub min: f64,
    pub grade: u32,
}

/// Step function from initial grade (0-100) to the reported quarterly grade.
///
/// Steps are kept in ascending `min` order with non-decreasing grades, so
/// `transmute` is monotonic. Values below the first step report `floor`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransmutationTable {
    floor: u32,
    steps: Vec<TransmutationStep>,
}

// DepEd K-12 transmutation table; 0 to 3.99 reports the floor of 60.
const DEPED_K12_STEPS: &[(f64, u32)] = &[
    (4.00, 61),
    (8.00, 62),
    (12.00, 63),
    (16.00, 64),
    (20.00, 65),
    (24.00, 66),
    (28.00, 67),
    (32.00, 68),
    (36.00, 69),
    (40.00, 70),
    (44.00, 71),
    (48.00, 72),
    (52.00, 73),
    (56.00, 74),
    (60.00, 75),
    (61.60, 76),
    (63.20, 77),
    (64.80, 78),
    (66.40, 79),
    (68.00, 80),
    (69.60, 81),
    (71.20, 82),
    (72.80, 83),
    (74.40, 84),
    (76.00, 85),
    (77.60, 86),
    (79.20, 87),
    (80.80, 88),
    (82.40, 89),
    (84.00, 90),
    (85.60, 91),
    (87.20, 92),
    (88.80, 93),
    (90.40, 94),
    (92.00, 95),
    (93.60, 96),
    (95.20, 97),
    (96.80, 98),
    (98.40, 99),
    (100.00, 100),
];

impl TransmutationTable {
    pub fn new(floor: u32, mut steps: Vec<TransmutationStep>) -> Result<Self, ValidationError> {
        steps.sort_by(|a, b| a.min.total_cmp(&b.min));
        let mut prev: Option<TransmutationStep> = None;
        for step in &steps {
            if !step.min.is_finite() {
                return Err(ValidationError::Transmutation(format!(
                    "breakpoint {} is not a finite number",
                    step.min
                )));
            }
            if step.grade < floor {
                return Err(ValidationError::Transmutation(format!(
                    "grade {} at {} is below the floor {}",
                    step.grade, step.min, floor
                )));
            }
            if let Some(p) = prev {
                if p.min == step.min {
                    return Err(ValidationError::Transmutation(format!(
                        "duplicate breakpoint {}",
                        step.min
                    )));
                }
                if step.grade < p.grade {
                    return Err(ValidationError::Transmutation(format!(
                        "grade drops from {} to {} at {}",
                        p.grade, step.grade, step.min
                    )));
                }
            }
            prev = Some(*step);
        }
        Ok(Self { floor, steps })
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "deped-k12" | "deped_k12" => Some(Self {
                floor: 60,
                steps: DEPED_K12_STEPS
                    .iter()
                    .map(|&(min, grade)| TransmutationStep { min, grade })
                    .collect(),
            }),
            _ => None,
        }
    }

    pub fn floor(&self) -> u32 {
        self.floor
    }

    pub fn transmute(&self, initial_grade: f64) -> u32 {
        self.steps
            .iter()
            .rev()
            .find(|s| initial_grade >= s.min)
            .map(|s| s.grade)
            .unwrap_or(self.floor)
    }

    /// Lowest initial grade that reports at least `grade`, if any step does.
    pub fn min_initial_for(&self, grade: u32) -> Option<f64> {
        if self.floor >= grade {
            return Some(0.0);
        }
        self.steps.iter().find(|s| s.grade >= grade).map(|s| s.min)
    }
}
