use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Counts from the assay validation study.
///
/// Known-positive samples inform sensitivity, known-negative samples
/// inform specificity. Counts are checked on every construction path,
/// deserialization included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CalibrationCounts")]
pub struct CalibrationData {
    n_known_positive: u64,
    n_known_positive_tested_positive: u64,
    n_known_negative: u64,
    n_known_negative_tested_negative: u64,
}

/// Unchecked calibration counts as they appear in a serialized record.
#[derive(Debug, Clone, Copy, Deserialize)]
struct CalibrationCounts {
    n_known_positive: u64,
    n_known_positive_tested_positive: u64,
    n_known_negative: u64,
    n_known_negative_tested_negative: u64,
}

impl TryFrom<CalibrationCounts> for CalibrationData {
    type Error = anyhow::Error;

    fn try_from(counts: CalibrationCounts) -> Result<Self> {
        CalibrationData::new(
            counts.n_known_positive,
            counts.n_known_positive_tested_positive,
            counts.n_known_negative,
            counts.n_known_negative_tested_negative,
        )
    }
}

impl CalibrationData {
    pub fn new(
        n_known_positive: u64,
        n_known_positive_tested_positive: u64,
        n_known_negative: u64,
        n_known_negative_tested_negative: u64,
    ) -> Result<Self> {
        if n_known_positive == 0 {
            bail!("Calibration requires at least one known-positive sample");
        }
        if n_known_negative == 0 {
            bail!("Calibration requires at least one known-negative sample");
        }
        if n_known_positive_tested_positive > n_known_positive {
            bail!(
                "Known-positive samples testing positive ({}) exceeds known-positive sample count ({})",
                n_known_positive_tested_positive,
                n_known_positive
            );
        }
        if n_known_negative_tested_negative > n_known_negative {
            bail!(
                "Known-negative samples testing negative ({}) exceeds known-negative sample count ({})",
                n_known_negative_tested_negative,
                n_known_negative
            );
        }
        Ok(Self {
            n_known_positive,
            n_known_positive_tested_positive,
            n_known_negative,
            n_known_negative_tested_negative,
        })
    }

    /// Validation counts of the reference serosurvey.
    pub fn reference_study() -> Self {
        Self {
            n_known_positive: 122,
            n_known_positive_tested_positive: 103,
            n_known_negative: 401,
            n_known_negative_tested_negative: 399,
        }
    }

    pub fn n_known_positive(&self) -> u64 {
        self.n_known_positive
    }

    pub fn n_known_positive_tested_positive(&self) -> u64 {
        self.n_known_positive_tested_positive
    }

    pub fn n_known_negative(&self) -> u64 {
        self.n_known_negative
    }

    pub fn n_known_negative_tested_negative(&self) -> u64 {
        self.n_known_negative_tested_negative
    }

    pub fn n_known_positive_tested_negative(&self) -> u64 {
        self.n_known_positive
            .saturating_sub(self.n_known_positive_tested_positive)
    }

    pub fn n_known_negative_tested_positive(&self) -> u64 {
        self.n_known_negative
            .saturating_sub(self.n_known_negative_tested_negative)
    }

    pub fn observed_sensitivity(&self) -> f64 {
        self.n_known_positive_tested_positive as f64 / self.n_known_positive as f64
    }

    pub fn observed_specificity(&self) -> f64 {
        self.n_known_negative_tested_negative as f64 / self.n_known_negative as f64
    }
}

/// Test outcomes of the surveyed population.
///
/// Individuals are exchangeable under the model, so only the number tested
/// and the number testing positive are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSample {
    n_total: u64,
    n_positive: u64,
}

impl FieldSample {
    /// Collapse individual outcomes, `true` meaning a positive test.
    pub fn new(outcomes: Vec<bool>) -> Result<Self> {
        let n_positive = outcomes.iter().filter(|&&o| o).count() as u64;
        Self::from_counts(outcomes.len() as u64, n_positive)
    }

    pub fn from_counts(n_total: u64, n_positive: u64) -> Result<Self> {
        if n_total == 0 {
            bail!("Field sample contains no outcomes");
        }
        if n_positive > n_total {
            bail!(
                "Positive field count ({}) exceeds field sample size ({})",
                n_positive,
                n_total
            );
        }
        Ok(Self {
            n_total,
            n_positive,
        })
    }

    pub fn reference_study() -> Self {
        Self {
            n_total: 3330,
            n_positive: 50,
        }
    }

    /// Individual outcomes, positives first.
    pub fn outcomes(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.n_total).map(move |i| i < self.n_positive)
    }

    pub fn len(&self) -> u64 {
        self.n_total
    }

    pub fn is_empty(&self) -> bool {
        self.n_total == 0
    }

    pub fn n_positive(&self) -> u64 {
        self.n_positive
    }

    pub fn n_negative(&self) -> u64 {
        self.n_total - self.n_positive
    }
}
