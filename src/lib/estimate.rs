use crate::data::{CalibrationData, FieldSample};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Closed-form prevalence estimates, for comparison with the posterior.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassicalEstimates {
    pub naive_prevalence: f64,
    pub observed_sensitivity: f64,
    pub observed_specificity: f64,
    pub rogan_gladen_prevalence: f64,
}

/// Fraction of positive tests, ignoring test error.
pub fn naive_prevalence(field: &FieldSample) -> f64 {
    field.n_positive() as f64 / field.len() as f64
}

/// Rogan-Gladen correction `(p + sp - 1) / (se + sp - 1)`, clamped to [0, 1].
pub fn rogan_gladen(apparent_prevalence: f64, sensitivity: f64, specificity: f64) -> Result<f64> {
    let youden = sensitivity + specificity - 1.0;
    if youden <= 0.0 {
        bail!(
            "Rogan-Gladen estimate undefined when sensitivity + specificity <= 1 (got {} + {})",
            sensitivity,
            specificity
        );
    }
    Ok(((apparent_prevalence + specificity - 1.0) / youden).clamp(0.0, 1.0))
}

pub fn classical_estimates(calibration: &CalibrationData, field: &FieldSample) -> Result<ClassicalEstimates> {
    let naive = naive_prevalence(field);
    let sensitivity = calibration.observed_sensitivity();
    let specificity = calibration.observed_specificity();
    Ok(ClassicalEstimates {
        naive_prevalence: naive,
        observed_sensitivity: sensitivity,
        observed_specificity: specificity,
        rogan_gladen_prevalence: rogan_gladen(naive, sensitivity, specificity)?,
    })
}
