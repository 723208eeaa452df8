use crate::data::{CalibrationData, FieldSample};
use crate::parameter::ModelParameters;
use anyhow::{bail, Result};
use statrs::function::factorial::ln_binomial;

/// Probabilities are kept this far away from 0 and 1 before taking logs.
pub const EPSILON: f64 = 1e-10;

fn clamp_probability(p: f64) -> f64 {
    p.max(EPSILON).min(1.0 - EPSILON)
}

/// ln Binomial(k | n, p). Fails when `k > n`.
pub fn binomial_log_pmf(k: u64, n: u64, p: f64) -> Result<f64> {
    let Some(failures) = n.checked_sub(k) else {
        bail!("Binomial successes ({}) exceed trials ({})", k, n);
    };
    let p = clamp_probability(p);
    Ok(ln_binomial(n, k) + k as f64 * p.ln() + failures as f64 * (1.0 - p).ln())
}

/// Probability that a random member of the population tests positive.
///
/// The unobserved true status is summed out: a true positive is detected
/// with probability `sensitivity`, a true negative is misread with
/// probability `1 - specificity`.
pub fn positive_test_probability(params: &ModelParameters) -> f64 {
    params.sensitivity * params.prevalence
        + (1.0 - params.specificity) * (1.0 - params.prevalence)
}

/// Binomial terms of the validation study.
pub fn calibration_log_likelihood(calibration: &CalibrationData, params: &ModelParameters) -> Result<f64> {
    let sensitivity_term = binomial_log_pmf(
        calibration.n_known_positive_tested_positive(),
        calibration.n_known_positive(),
        params.sensitivity,
    )?;
    let specificity_term = binomial_log_pmf(
        calibration.n_known_negative_tested_negative(),
        calibration.n_known_negative(),
        params.specificity,
    )?;
    Ok(sensitivity_term + specificity_term)
}

/// Sum of the Bernoulli terms of every field outcome, evaluated from the counts.
pub fn field_log_likelihood(field: &FieldSample, params: &ModelParameters) -> f64 {
    let p = clamp_probability(positive_test_probability(params));
    field.n_positive() as f64 * p.ln() + field.n_negative() as f64 * (1.0 - p).ln()
}

/// Same as [`field_log_likelihood`] but visits each outcome.
pub fn field_log_likelihood_per_observation(field: &FieldSample, params: &ModelParameters) -> f64 {
    let p = clamp_probability(positive_test_probability(params));
    let (ln_pos, ln_neg) = (p.ln(), (1.0 - p).ln());
    field
        .outcomes()
        .map(|positive| if positive { ln_pos } else { ln_neg })
        .sum()
}

/// Joint log-likelihood of the validation counts and the field outcomes.
pub fn log_likelihood(
    calibration: &CalibrationData,
    field: &FieldSample,
    params: &ModelParameters,
) -> Result<f64> {
    params.validate()?;
    let log_lik = calibration_log_likelihood(calibration, params)? + field_log_likelihood(field, params);
    if !log_lik.is_finite() {
        bail!(
            "Log-likelihood is not finite ({}) at prevalence = {}, sensitivity = {}, specificity = {}",
            log_lik,
            params.prevalence,
            params.sensitivity,
            params.specificity
        );
    }
    Ok(log_lik)
}
