//! Convergence diagnostics and model fit statistics for multi-chain output.

use crate::model::PrevalenceModel;
use crate::parameter::{ModelParameters, Parameter};
use crate::sampler::Posterior;
use anyhow::Result;
use mini_mcmc::stats::split_rhat_mean_ess;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Chains shorter than this get no convergence statistics.
pub const MIN_DRAWS_PER_CHAIN: usize = 10;

/// Pack chains into the `[chain, draw, coordinate]` layout used by `mini_mcmc::stats`.
///
/// Chains are cut to the length of the shortest one.
fn chain_array(chains: &[Vec<f64>]) -> Option<Array3<f32>> {
    let n_keep = chains.iter().map(|c| c.len()).min()?;
    if n_keep < MIN_DRAWS_PER_CHAIN {
        return None;
    }
    // No within-chain variance to compare against
    if chains.iter().any(|c| c[..n_keep].iter().all(|&v| v == c[0])) {
        return None;
    }
    Some(Array3::from_shape_fn((chains.len(), n_keep, 1), |(c, i, _)| {
        chains[c][i] as f32
    }))
}

fn finite(value: f32) -> Option<f64> {
    let value = value as f64;
    value.is_finite().then_some(value)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Convergence {
    pub r_hat: Option<f64>,
    pub ess: Option<f64>,
}

impl Convergence {
    /// Split R-hat and effective sample size of one quantity, given per chain.
    ///
    /// Both are `None` when the chains are too short or the statistic is not
    /// finite, as happens for a chain that never moves.
    pub fn from_chains(chains: &[Vec<f64>]) -> Self {
        let Some(sample) = chain_array(chains) else {
            return Self { r_hat: None, ess: None };
        };
        let (r_hat, ess) = split_rhat_mean_ess(sample.view());
        Self {
            r_hat: finite(r_hat[0]),
            ess: finite(ess[0]),
        }
    }

    pub fn is_converged(&self, r_hat_threshold: f64, min_ess: f64) -> bool {
        match (self.r_hat, self.ess) {
            (Some(r_hat), Some(ess)) => r_hat < r_hat_threshold && ess >= min_ess,
            _ => false,
        }
    }
}

/// Deviance information criterion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dic {
    /// Posterior mean of the deviance.
    pub mean_deviance: f64,
    /// Deviance at the posterior mean of the parameters.
    pub deviance_at_mean: f64,
    /// Effective number of parameters.
    pub p_d: f64,
    pub dic: f64,
}

pub fn deviance(log_likelihood: f64) -> f64 {
    -2.0 * log_likelihood
}

pub fn dic(model: &PrevalenceModel, posterior: &Posterior) -> Result<Dic> {
    let n = posterior.n_draws();
    if n == 0 {
        anyhow::bail!("Cannot compute DIC without posterior draws");
    }
    let mean_deviance = posterior.draws().map(|d| deviance(d.log_likelihood)).sum::<f64>() / n as f64;
    let posterior_mean = ModelParameters::new(
        mean(&posterior.values(Parameter::Prevalence)),
        mean(&posterior.values(Parameter::Sensitivity)),
        mean(&posterior.values(Parameter::Specificity)),
    )?;
    let deviance_at_mean = deviance(model.log_likelihood(&posterior_mean)?);
    let p_d = mean_deviance - deviance_at_mean;
    Ok(Dic {
        mean_deviance,
        deviance_at_mean,
        p_d,
        dic: mean_deviance + p_d,
    })
}
