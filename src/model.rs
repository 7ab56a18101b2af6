use crate::error::ValidationError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    pub fn as_str(self) -> &'static str {
        match self {
            Quarter::Q1 => "Q1",
            Quarter::Q2 => "Q2",
            Quarter::Q3 => "Q3",
            Quarter::Q4 => "Q4",
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quarter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "Q1" | "1" => Ok(Quarter::Q1),
            "Q2" | "2" => Ok(Quarter::Q2),
            "Q3" | "3" => Ok(Quarter::Q3),
            "Q4" | "4" => Ok(Quarter::Q4),
            _ => Err(ValidationError::Identity(format!(
                "quarter must be one of Q1..Q4, got {s:?}"
            ))),
        }
    }
}

/// Graded component of a quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Written Work
    Ww,
    /// Performance Task
    Pt,
    /// Quarterly Assessment
    Qa,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Ww, Category::Pt, Category::Qa];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Ww => "ww",
            Category::Pt => "pt",
            Category::Qa => "qa",
        }
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ww" => Ok(Category::Ww),
            "pt" => Ok(Category::Pt),
            "qa" => Ok(Category::Qa),
            other => Err(ValidationError::Identity(format!(
                "category must be one of ww, pt, qa, got {other:?}"
            ))),
        }
    }
}

/// Unique identity of a class record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    pub section_id: String,
    pub subject_id: String,
    pub quarter: Quarter,
    pub school_year: String,
}

impl RecordKey {
    pub fn new(
        section_id: &str,
        subject_id: &str,
        quarter: &str,
        school_year: &str,
    ) -> Result<Self, ValidationError> {
        let section_id = section_id.trim();
        let subject_id = subject_id.trim();
        if section_id.is_empty() {
            return Err(ValidationError::Identity("sectionId must not be empty".into()));
        }
        if subject_id.is_empty() {
            return Err(ValidationError::Identity("subjectId must not be empty".into()));
        }
        let quarter = quarter.parse::<Quarter>()?;
        let school_year = school_year.trim();
        validate_school_year(school_year)?;
        Ok(Self {
            section_id: section_id.to_string(),
            subject_id: subject_id.to_string(),
            quarter,
            school_year: school_year.to_string(),
        })
    }
}

/// School years are written `YYYY-YYYY` with consecutive years.
fn validate_school_year(s: &str) -> Result<(), ValidationError> {
    let bad = || ValidationError::Identity(format!("schoolYear must look like 2025-2026, got {s:?}"));
    let (start, end) = s.split_once('-').ok_or_else(bad)?;
    if start.len() != 4 || end.len() != 4 {
        return Err(bad());
    }
    let start: i32 = start.parse().map_err(|_| bad())?;
    let end: i32 = end.parse().map_err(|_| bad())?;
    if end != start + 1 {
        return Err(bad());
    }
    Ok(())
}

/// Category weights in percent; always sums to 100 once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeightConfig {
    ww: u32,
    pt: u32,
    qa: u32,
}

impl WeightConfig {
    pub fn ww(&self) -> u32 {
        self.ww
    }

    pub fn pt(&self) -> u32 {
        self.pt
    }

    pub fn qa(&self) -> u32 {
        self.qa
    }

    pub fn weight(&self, category: Category) -> u32 {
        match category {
            Category::Ww => self.ww,
            Category::Pt => self.pt,
            Category::Qa => self.qa,
        }
    }
}

pub fn validate_weights(ww: i64, pt: i64, qa: i64) -> Result<WeightConfig, ValidationError> {
    for (field, value) in [("ww", ww), ("pt", pt), ("qa", qa)] {
        if !(0..=100).contains(&value) {
            return Err(ValidationError::WeightRange { field, value });
        }
    }
    let sum = ww + pt + qa;
    if sum != 100 {
        return Err(ValidationError::WeightSum { ww, pt, qa, sum });
    }
    Ok(WeightConfig {
        ww: ww as u32,
        pt: pt as u32,
        qa: qa as u32,
    })
}

/// Validates one category's highest-possible-score table.
///
/// `scored_items` is the number of score columns that exist for the category;
/// the table must cover all of them.
pub fn validate_hps(
    category: Category,
    values: &[i64],
    scored_items: usize,
) -> Result<Vec<u32>, ValidationError> {
    if values.len() < scored_items {
        return Err(ValidationError::HpsTooShort {
            category: category.as_str(),
            scored: scored_items,
            hps_len: values.len(),
        });
    }
    values
        .iter()
        .enumerate()
        .map(|(index, &value)| {
            if value <= 0 {
                return Err(ValidationError::HpsNonPositive {
                    category: category.as_str(),
                    index,
                    value,
                });
            }
            u32::try_from(value).map_err(|_| ValidationError::HpsOutOfRange {
                category: category.as_str(),
                index,
                value,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HpsTable {
    pub ww: Vec<u32>,
    pub pt: Vec<u32>,
    pub qa: Vec<u32>,
}

impl HpsTable {
    pub fn get(&self, category: Category) -> &[u32] {
        match category {
            Category::Ww => &self.ww,
            Category::Pt => &self.pt,
            Category::Qa => &self.qa,
        }
    }

    pub fn set(&mut self, category: Category, values: Vec<u32>) {
        match category {
            Category::Ww => self.ww = values,
            Category::Pt => self.pt = values,
            Category::Qa => self.qa = values,
        }
    }

    pub fn total(&self, category: Category) -> u64 {
        self.get(category).iter().map(|&v| u64::from(v)).sum()
    }

    pub fn uniform(ww_items: usize, pt_items: usize, qa_items: usize, item: u32, qa: u32) -> Self {
        Self {
            ww: vec![item; ww_items],
            pt: vec![item; pt_items],
            qa: vec![qa; qa_items],
        }
    }
}

/// Raw scores for one student; item `i` of a category pairs with HPS item `i`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreSheet {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub ww: Vec<f64>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub pt: Vec<f64>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub qa: Vec<f64>,
}

/// Blank cells arrive as `null` and count as 0.
fn null_as_zero<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|v| v.unwrap_or(0.0)).collect())
}

impl ScoreSheet {
    pub fn blank(hps: &HpsTable) -> Self {
        Self {
            ww: vec![0.0; hps.ww.len()],
            pt: vec![0.0; hps.pt.len()],
            qa: vec![0.0; hps.qa.len()],
        }
    }

    pub fn get(&self, category: Category) -> &[f64] {
        match category {
            Category::Ww => &self.ww,
            Category::Pt => &self.pt,
            Category::Qa => &self.qa,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut Vec<f64> {
        match category {
            Category::Ww => &mut self.ww,
            Category::Pt => &mut self.pt,
            Category::Qa => &mut self.qa,
        }
    }

    /// Pads or truncates each category to the table's length. Truncation only
    /// drops zero entries; callers validate before shrinking a table.
    pub fn fit_to(&mut self, hps: &HpsTable) {
        for category in Category::ALL {
            let len = hps.get(category).len();
            self.get_mut(category).resize(len, 0.0);
        }
    }

    /// Number of score columns that carry a non-zero value, per category.
    pub fn scored_items(&self, category: Category) -> usize {
        self.get(category)
            .iter()
            .rposition(|&v| v != 0.0)
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}
