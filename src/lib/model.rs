use crate::data::{CalibrationData, FieldSample};
use crate::likelihood;
use crate::parameter::{ModelParameters, Parameter};
use crate::prior::{Beta, Priors};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// Prevalence model with imperfect test sensitivity and specificity.
#[derive(Clone, Copy, Debug)]
pub struct PrevalenceModel {
    pub calibration: CalibrationData,
    pub field: FieldSample,
    pub priors: Priors,
}

impl PrevalenceModel {
    pub fn new(calibration: CalibrationData, field: FieldSample, priors: Priors) -> Self {
        Self {
            calibration,
            field,
            priors,
        }
    }

    pub fn log_prior(&self, params: &ModelParameters) -> f64 {
        params
            .iter()
            .map(|(parameter, value)| self.priors.get(parameter).log_pdf(value))
            .sum()
    }

    pub fn log_likelihood(&self, params: &ModelParameters) -> Result<f64> {
        likelihood::log_likelihood(&self.calibration, &self.field, params)
    }

    /// Unnormalized log posterior. Returns `-inf` outside the prior support.
    pub fn log_posterior(&self, params: &ModelParameters) -> Result<f64> {
        let log_prior = self.log_prior(params);
        if log_prior == f64::NEG_INFINITY {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(log_prior + self.log_likelihood(params)?)
    }

    /// Conjugate posteriors of sensitivity and specificity from the validation study alone.
    pub fn calibration_posteriors(&self) -> (Beta, Beta) {
        let c = &self.calibration;
        (
            self.priors.sensitivity.update(
                c.n_known_positive_tested_positive(),
                c.n_known_positive_tested_negative(),
            ),
            self.priors.specificity.update(
                c.n_known_negative_tested_negative(),
                c.n_known_negative_tested_positive(),
            ),
        )
    }

    pub fn spec(&self) -> ModelSpec {
        ModelSpec {
            parameters: Parameter::iter()
                .map(|parameter| PriorSpec {
                    parameter,
                    family: "beta".to_string(),
                    alpha: self.priors.get(parameter).alpha,
                    beta: self.priors.get(parameter).beta,
                })
                .collect(),
            likelihood: vec![
                "n_known_positive_tested_positive ~ Binomial(n_known_positive, sensitivity)".to_string(),
                "n_known_negative_tested_negative ~ Binomial(n_known_negative, specificity)".to_string(),
                "outcome[i] ~ Bernoulli(sensitivity * prevalence + (1 - specificity) * (1 - prevalence))"
                    .to_string(),
            ],
            calibration: self.calibration,
            n_field: self.field.len(),
            n_field_positive: self.field.n_positive(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriorSpec {
    pub parameter: Parameter,
    pub family: String,
    pub alpha: f64,
    pub beta: f64,
}

/// Description of the model handed to a sampler and stored alongside its output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub parameters: Vec<PriorSpec>,
    pub likelihood: Vec<String>,
    pub calibration: CalibrationData,
    pub n_field: u64,
    pub n_field_positive: u64,
}
