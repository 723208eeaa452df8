use crate::diagnostics::{deviance, Convergence, Dic};
use crate::parameter::Parameter;
use crate::sampler::Posterior;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::IntoEnumIterator;

pub const QUANTILES: [f64; 5] = [0.025, 0.25, 0.5, 0.75, 0.975];

/// Quantile of `values` by linear interpolation between order statistics.
///
/// `values` need not be sorted. Returns `None` for an empty slice or `q`
/// outside [0, 1].
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let sorted: Vec<f64> = values
        .iter()
        .copied()
        .sorted_by_key(|&v| OrderedFloat(v))
        .collect();
    Some(sorted_quantile(&sorted, q))
}

fn sorted_quantile(sorted: &[f64], q: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    /// Values at [`QUANTILES`].
    pub quantiles: [f64; 5],
    pub convergence: Convergence,
}

impl ParameterSummary {
    /// Reduce the draws of one quantity, given per chain.
    pub fn from_chains(name: &str, chains: &[Vec<f64>]) -> Option<Self> {
        let sorted: Vec<f64> = chains
            .iter()
            .flatten()
            .copied()
            .sorted_by_key(|&v| OrderedFloat(v))
            .collect();
        if sorted.is_empty() {
            return None;
        }
        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let sd = if sorted.len() > 1 {
            (sorted.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        Some(Self {
            name: name.to_string(),
            mean,
            sd,
            quantiles: QUANTILES.map(|q| sorted_quantile(&sorted, q)),
            convergence: Convergence::from_chains(chains),
        })
    }

    /// Lower and upper bound of the central 95% credible interval.
    pub fn credible_interval_95(&self) -> (f64, f64) {
        (self.quantiles[0], self.quantiles[4])
    }

    pub fn median(&self) -> f64 {
        self.quantiles[2]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSummary {
    pub parameters: Vec<ParameterSummary>,
    pub deviance: Option<ParameterSummary>,
    pub dic: Option<Dic>,
    pub n_chains: usize,
    pub n_draws: usize,
}

impl PosteriorSummary {
    pub fn get(&self, parameter: Parameter) -> Option<&ParameterSummary> {
        self.parameters
            .iter()
            .find(|s| s.name == parameter.as_str())
    }

    pub fn with_dic(mut self, dic: Dic) -> Self {
        self.dic = Some(dic);
        self
    }

    /// Parameters whose R-hat or ESS indicate the chains have not mixed.
    pub fn unconverged(&self, r_hat_threshold: f64, min_ess: f64) -> Vec<&ParameterSummary> {
        self.parameters
            .iter()
            .filter(|s| !s.convergence.is_converged(r_hat_threshold, min_ess))
            .collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = &ParameterSummary> {
        self.parameters.iter().chain(self.deviance.iter())
    }
}

/// Reduce posterior draws to per-parameter summaries plus a deviance row.
pub fn summarize(posterior: &Posterior) -> PosteriorSummary {
    let parameters = Parameter::iter()
        .filter_map(|p| ParameterSummary::from_chains(p.as_str(), &posterior.chain_values(p)))
        .collect();
    let deviance_chains: Vec<Vec<f64>> = posterior
        .chain_log_likelihoods()
        .into_iter()
        .map(|chain| chain.into_iter().map(deviance).collect())
        .collect();
    PosteriorSummary {
        parameters,
        deviance: ParameterSummary::from_chains("deviance", &deviance_chains),
        dic: None,
        n_chains: posterior.n_chains(),
        n_draws: posterior.n_draws(),
    }
}

fn format_optional(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "NA".to_string(),
    }
}

impl fmt::Display for PosteriorSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "{} chains, {} saved draws in total",
            self.n_chains, self.n_draws
        )?;
        writeln!(
            f,
            "{:<12} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>7} {:>7}",
            "", "mean", "sd", "2.5%", "25%", "50%", "75%", "97.5%", "Rhat", "n.eff"
        )?;
        for row in self.rows() {
            let precision = if row.name == "deviance" { 2 } else { 4 };
            writeln!(
                f,
                "{:<12} {:>9} {:>9} {} {:>7} {:>7}",
                row.name,
                format!("{:.*}", precision, row.mean),
                format!("{:.*}", precision, row.sd),
                row.quantiles
                    .iter()
                    .map(|q| format!("{:>9}", format!("{:.*}", precision, q)))
                    .join(" "),
                format_optional(row.convergence.r_hat, 3),
                format_optional(row.convergence.ess.map(|e| e.round()), 0),
            )?;
        }
        if let Some(dic) = &self.dic {
            writeln!(f)?;
            writeln!(f, "pD = {:.1} and DIC = {:.1}", dic.p_d, dic.dic)?;
        }
        Ok(())
    }
}
