use crate::parameter::Parameter;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use statrs::function::beta::ln_beta;
use std::str::FromStr;

/// Beta(α, β) prior on a probability.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Beta {
    pub alpha: f64,
    pub beta: f64,
}

impl Beta {
    pub fn new(alpha: f64, beta: f64) -> Result<Self> {
        if !(alpha.is_finite() && alpha > 0.0) || !(beta.is_finite() && beta > 0.0) {
            bail!("Beta shape parameters must be positive, got α = {}, β = {}", alpha, beta);
        }
        Ok(Self { alpha, beta })
    }

    /// Beta(1, 1), flat over [0, 1].
    pub fn uniform() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }

    /// Posterior after observing `successes` and `failures` under this prior.
    pub fn update(&self, successes: u64, failures: u64) -> Self {
        Self {
            alpha: self.alpha + successes as f64,
            beta: self.beta + failures as f64,
        }
    }

    /// Prior mean, α / (α + β). With a conjugate [`Beta::update`] this is
    /// the posterior mean of a validation-study accuracy.
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Written through the mean as m (1 - m) / (α + β + 1).
    pub fn variance(&self) -> f64 {
        let m = self.mean();
        m * (1.0 - m) / (self.alpha + self.beta + 1.0)
    }

    /// Spread of an accuracy posterior, logged next to the observed rates.
    pub fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    /// ln B(α, β), the normalizing constant of [`Beta::log_pdf`].
    pub fn log_beta(&self) -> f64 {
        ln_beta(self.alpha, self.beta)
    }

    pub fn log_pdf(&self, x: f64) -> f64 {
        if !(0.0..=1.0).contains(&x) {
            return f64::NEG_INFINITY;
        }
        // Avoid 0 * ln(0) at the boundary of a flat side
        let a_term = if self.alpha == 1.0 { 0.0 } else { (self.alpha - 1.0) * x.ln() };
        let b_term = if self.beta == 1.0 { 0.0 } else { (self.beta - 1.0) * (1.0 - x).ln() };
        a_term + b_term - self.log_beta()
    }
}

/// Parses `alpha,beta`.
impl FromStr for Beta {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(|p| p.trim()).collect();
        if parts.len() != 2 {
            bail!("Expected prior as 'alpha,beta', got: {}", s);
        }
        let alpha = parts[0]
            .parse::<f64>()
            .map_err(|e| anyhow::anyhow!("Invalid alpha '{}': {}", parts[0], e))?;
        let beta = parts[1]
            .parse::<f64>()
            .map_err(|e| anyhow::anyhow!("Invalid beta '{}': {}", parts[1], e))?;
        Beta::new(alpha, beta)
    }
}

/// Independent priors on the three parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Priors {
    pub prevalence: Beta,
    pub sensitivity: Beta,
    pub specificity: Beta,
}

impl Priors {
    pub fn uniform() -> Self {
        Self {
            prevalence: Beta::uniform(),
            sensitivity: Beta::uniform(),
            specificity: Beta::uniform(),
        }
    }

    pub fn get(&self, parameter: Parameter) -> &Beta {
        match parameter {
            Parameter::Prevalence => &self.prevalence,
            Parameter::Sensitivity => &self.sensitivity,
            Parameter::Specificity => &self.specificity,
        }
    }

    pub fn with(mut self, parameter: Parameter, prior: Beta) -> Self {
        match parameter {
            Parameter::Prevalence => self.prevalence = prior,
            Parameter::Sensitivity => self.sensitivity = prior,
            Parameter::Specificity => self.specificity = prior,
        }
        self
    }
}

impl Default for Priors {
    fn default() -> Self {
        Self::uniform()
    }
}
