use crate::model::PrevalenceModel;
use crate::parameter::{ModelParameters, Parameter};
use anyhow::{anyhow, bail, Result};
use log::{debug, info};
use mini_mcmc::core::ChainRunner;
use mini_mcmc::distributions::{Proposal, Target};
use mini_mcmc::metropolis_hastings::MetropolisHastings;
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

const N_PARAMS: usize = 3;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub chains: usize,
    /// Iterations per chain, burn-in included.
    pub iterations: usize,
    pub burn_in: usize,
    pub thin: usize,
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            chains: 3,
            iterations: 10_000,
            burn_in: 5_000,
            thin: 1,
            seed: None,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chains == 0 {
            bail!("At least one chain is required");
        }
        if self.thin == 0 {
            bail!("Thinning interval must be at least 1");
        }
        if self.burn_in >= self.iterations {
            bail!(
                "Burn-in ({}) must be smaller than the number of iterations ({})",
                self.burn_in,
                self.iterations
            );
        }
        Ok(())
    }

    pub fn draws_per_chain(&self) -> usize {
        (self.iterations - self.burn_in).div_ceil(self.thin)
    }
}

/// One retained state of a chain.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSample {
    pub chain: usize,
    pub iteration: usize,
    pub params: ModelParameters,
    pub log_likelihood: f64,
}

#[derive(Clone, Debug)]
pub struct Posterior {
    pub chains: Vec<Vec<PosteriorSample>>,
    /// Post burn-in acceptance rate per chain.
    pub acceptance: Vec<f64>,
}

impl Posterior {
    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    pub fn n_draws(&self) -> usize {
        self.chains.iter().map(|c| c.len()).sum()
    }

    pub fn draws(&self) -> impl Iterator<Item = &PosteriorSample> {
        self.chains.iter().flatten()
    }

    /// All draws of one parameter, chains concatenated.
    pub fn values(&self, parameter: Parameter) -> Vec<f64> {
        self.draws().map(|d| d.params.get(parameter)).collect()
    }

    pub fn chain_values(&self, parameter: Parameter) -> Vec<Vec<f64>> {
        self.chains
            .iter()
            .map(|chain| chain.iter().map(|d| d.params.get(parameter)).collect())
            .collect()
    }

    pub fn chain_log_likelihoods(&self) -> Vec<Vec<f64>> {
        self.chains
            .iter()
            .map(|chain| chain.iter().map(|d| d.log_likelihood).collect())
            .collect()
    }
}

/// Anything that can turn a model into posterior draws.
pub trait PosteriorSampler {
    fn sample(&self, model: &PrevalenceModel, config: &SamplerConfig) -> Result<Posterior>;
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn from_logit(position: &[f64]) -> ModelParameters {
    ModelParameters {
        prevalence: sigmoid(position[Parameter::Prevalence.index()]),
        sensitivity: sigmoid(position[Parameter::Sensitivity.index()]),
        specificity: sigmoid(position[Parameter::Specificity.index()]),
    }
}

/// ln |dθ/dz| for θ = sigmoid(z), summed over parameters.
fn log_jacobian(params: &ModelParameters) -> f64 {
    params
        .iter()
        .map(|(_, value)| value.ln() + (1.0 - value).ln())
        .sum()
}

/// Posterior density of a [`PrevalenceModel`] over `logit(θ)`.
///
/// Positions that map onto the edge of [0, 1] in floating point, or where the
/// likelihood cannot be evaluated, get zero density.
#[derive(Clone, Copy, Debug)]
pub struct LogitPosterior {
    model: PrevalenceModel,
}

impl LogitPosterior {
    pub fn new(model: PrevalenceModel) -> Self {
        Self { model }
    }
}

impl Target<f64, f64> for LogitPosterior {
    fn unnorm_logp(&self, position: &[f64]) -> f64 {
        let params = from_logit(position);
        let log_jac = log_jacobian(&params);
        if !log_jac.is_finite() {
            return f64::NEG_INFINITY;
        }
        match self.model.log_posterior(&params) {
            Ok(log_post) => log_post + log_jac,
            Err(_) => f64::NEG_INFINITY,
        }
    }
}

/// Gaussian random walk with one step size per coordinate.
#[derive(Clone, Debug)]
pub struct LogitRandomWalk {
    scales: Vec<f64>,
    rng: StdRng,
}

impl LogitRandomWalk {
    pub fn new(scales: Vec<f64>) -> Self {
        Self {
            scales,
            rng: StdRng::seed_from_u64(0),
        }
    }
}

impl Proposal<f64, f64> for LogitRandomWalk {
    fn sample(&mut self, current: &[f64]) -> Vec<f64> {
        current
            .iter()
            .zip(self.scales.iter())
            .map(|(&z, &scale)| z + scale * self.rng.sample::<f64, _>(StandardNormal))
            .collect()
    }

    // Symmetric, so the Hastings correction cancels.
    fn logp(&self, _from: &[f64], _to: &[f64]) -> f64 {
        0.0
    }

    fn set_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

/// Draws of one run, indexed `[chain][draw][coordinate]`.
type ChainPositions = Vec<Vec<Vec<f64>>>;

fn chain_positions(sample: &Array3<f64>) -> ChainPositions {
    sample
        .outer_iter()
        .map(|chain| chain.outer_iter().map(|row| row.to_vec()).collect())
        .collect()
}

/// Fraction of transitions in which the chain moved.
fn acceptance_rate(chain: &[Vec<f64>]) -> f64 {
    if chain.len() < 2 {
        return 0.0;
    }
    let moves = chain.windows(2).filter(|pair| pair[0] != pair[1]).count();
    moves as f64 / (chain.len() - 1) as f64
}

fn chain_sd(chain: &[Vec<f64>], coordinate: usize) -> f64 {
    let n = chain.len() as f64;
    let mean = chain.iter().map(|row| row[coordinate]).sum::<f64>() / n;
    (chain.iter().map(|row| (row[coordinate] - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
}

/// Random-walk Metropolis on the logit scale, driven by `mini_mcmc`.
///
/// Burn-in is spent in rounds. After each round the step size of every
/// coordinate is reset to `2.38 / sqrt(3)` times its within-chain standard
/// deviation, or shrunk when almost nothing was accepted. The scales are
/// frozen for the retained draws.
#[derive(Clone, Debug)]
pub struct MetropolisSampler {
    pub initial_scale: f64,
    pub adapt_rounds: usize,
    /// Rounds shorter than this are not used for tuning.
    pub min_round_length: usize,
    /// Below this acceptance rate the draws say nothing about the spread.
    pub min_acceptance: f64,
}

impl Default for MetropolisSampler {
    fn default() -> Self {
        Self {
            initial_scale: 0.5,
            adapt_rounds: 5,
            min_round_length: 20,
            min_acceptance: 0.05,
        }
    }
}

impl MetropolisSampler {
    fn run(
        &self,
        target: LogitPosterior,
        scales: &[f64],
        states: Vec<Vec<f64>>,
        n_collect: usize,
        n_discard: usize,
        seed: u64,
    ) -> Result<ChainPositions> {
        let mut mh = MetropolisHastings::new(target, LogitRandomWalk::new(scales.to_vec()), states).seed(seed);
        let sample = mh
            .run(n_collect, n_discard)
            .map_err(|e| anyhow!("Metropolis-Hastings run failed: {}", e))?;
        Ok(chain_positions(&sample))
    }

    fn tune(&self, scales: &mut [f64], round: &ChainPositions) -> f64 {
        let acceptance = round.iter().map(|c| acceptance_rate(c)).sum::<f64>() / round.len() as f64;
        for (i, scale) in scales.iter_mut().enumerate() {
            let sd = round.iter().map(|c| chain_sd(c, i)).sum::<f64>() / round.len() as f64;
            if acceptance < self.min_acceptance || !sd.is_finite() || sd <= 0.0 {
                *scale *= 0.25;
            } else {
                *scale = 2.38 / (N_PARAMS as f64).sqrt() * sd;
            }
        }
        acceptance
    }
}

impl PosteriorSampler for MetropolisSampler {
    fn sample(&self, model: &PrevalenceModel, config: &SamplerConfig) -> Result<Posterior> {
        config.validate()?;
        if !(self.initial_scale.is_finite() && self.initial_scale > 0.0) {
            bail!("Initial proposal scale must be positive, got {}", self.initial_scale);
        }
        let base_seed = config.seed.unwrap_or_else(|| rand::rng().random());
        info!(
            "Sampling {} chains of {} iterations ({} burn-in, thin {}), seed {}",
            config.chains, config.iterations, config.burn_in, config.thin, base_seed
        );

        let mut rng = StdRng::seed_from_u64(base_seed);
        let mut states: Vec<Vec<f64>> = (0..config.chains)
            .map(|_| (0..N_PARAMS).map(|_| logit(rng.random_range(0.05..0.95))).collect())
            .collect();
        for (chain, state) in states.iter().enumerate() {
            debug!("Chain {}: initial state {:.3?}", chain, from_logit(state));
        }

        let target = LogitPosterior::new(*model);
        let mut scales = vec![self.initial_scale; N_PARAMS];
        let mut run_seed = base_seed;
        let mut next_seed = || {
            run_seed = run_seed.wrapping_add(config.chains as u64);
            run_seed
        };

        let round_length = config.burn_in / self.adapt_rounds.max(1);
        let mut n_discard = config.burn_in;
        if self.adapt_rounds > 0 && round_length >= self.min_round_length {
            for round in 0..self.adapt_rounds {
                let length = if round + 1 == self.adapt_rounds {
                    config.burn_in - round_length * round
                } else {
                    round_length
                };
                let draws = self.run(target, &scales, states, length, 0, next_seed())?;
                states = draws
                    .iter()
                    .map(|chain| chain.last().cloned().unwrap_or_default())
                    .collect();
                let acceptance = self.tune(&mut scales, &draws);
                debug!(
                    "Adaptation round {}: acceptance = {:.3}, proposal scales = {:.3?}",
                    round, acceptance, scales
                );
            }
            n_discard = 0;
        }

        let kept = self.run(
            target,
            &scales,
            states,
            config.iterations - config.burn_in,
            n_discard,
            next_seed(),
        )?;

        let mut chains = Vec::with_capacity(config.chains);
        let mut acceptance = Vec::with_capacity(config.chains);
        for (chain, positions) in kept.iter().enumerate() {
            acceptance.push(acceptance_rate(positions));
            let draws = positions
                .iter()
                .enumerate()
                .step_by(config.thin)
                .map(|(i, position)| -> Result<PosteriorSample> {
                    let params = from_logit(position);
                    Ok(PosteriorSample {
                        chain,
                        iteration: config.burn_in + i,
                        params,
                        log_likelihood: model.log_likelihood(&params)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            chains.push(draws);
        }
        Ok(Posterior { chains, acceptance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CalibrationData, FieldSample};
    use crate::prior::{Beta, Priors};

    fn small_config(seed: u64) -> SamplerConfig {
        SamplerConfig {
            chains: 2,
            iterations: 3_000,
            burn_in: 1_000,
            thin: 1,
            seed: Some(seed),
        }
    }

    fn mean(values: &[f64]) -> f64 {
        values.iter().sum::<f64>() / values.len() as f64
    }

    fn reference_model() -> PrevalenceModel {
        PrevalenceModel::new(
            CalibrationData::reference_study(),
            FieldSample::reference_study(),
            Priors::uniform(),
        )
    }

    #[test]
    fn test_config_validation() {
        assert!(SamplerConfig::default().validate().is_ok());
        let mut config = SamplerConfig::default();
        config.chains = 0;
        assert!(config.validate().is_err());
        let mut config = SamplerConfig::default();
        config.thin = 0;
        assert!(config.validate().is_err());
        let mut config = SamplerConfig::default();
        config.burn_in = config.iterations;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_draws_per_chain() {
        let config = SamplerConfig {
            chains: 1,
            iterations: 105,
            burn_in: 5,
            thin: 3,
            seed: None,
        };
        assert_eq!(config.draws_per_chain(), 34);
    }

    #[test]
    fn test_logit_sigmoid_inverse() {
        for p in [1e-6, 0.01, 0.5, 0.9, 0.999] {
            assert!((sigmoid(logit(p)) - p).abs() < 1e-12);
        }
    }

    #[test]
    fn test_shape_of_output() {
        let model = reference_model();
        let config = SamplerConfig {
            chains: 3,
            iterations: 200,
            burn_in: 100,
            thin: 2,
            seed: Some(7),
        };
        let posterior = MetropolisSampler::default().sample(&model, &config).unwrap();
        assert_eq!(posterior.n_chains(), 3);
        assert_eq!(posterior.n_draws(), 3 * 50);
        for (c, chain) in posterior.chains.iter().enumerate() {
            assert!(chain.iter().all(|d| d.chain == c));
            assert_eq!(chain[0].iteration, 100);
            assert_eq!(chain[1].iteration, 102);
            assert!(chain.iter().all(|d| d.log_likelihood.is_finite()));
        }
        assert_eq!(posterior.acceptance.len(), 3);
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let model = reference_model();
        let config = SamplerConfig {
            chains: 2,
            iterations: 300,
            burn_in: 100,
            thin: 1,
            seed: Some(11),
        };
        let a = MetropolisSampler::default().sample(&model, &config).unwrap();
        let b = MetropolisSampler::default().sample(&model, &config).unwrap();
        assert_eq!(a.chains, b.chains);
    }

    #[test]
    fn test_draws_stay_in_unit_interval() {
        let posterior = MetropolisSampler::default()
            .sample(&reference_model(), &small_config(3))
            .unwrap();
        for draw in posterior.draws() {
            assert!(draw.params.validate().is_ok());
        }
    }

    #[test]
    fn test_recovers_conjugate_posterior() {
        // With a single field observation the calibration study dominates
        // sensitivity and specificity, whose posteriors are then close to Beta(tp+1, fn+1).
        let model = PrevalenceModel::new(
            CalibrationData::new(200, 150, 200, 180).unwrap(),
            FieldSample::new(vec![false]).unwrap(),
            Priors::uniform(),
        );
        let posterior = MetropolisSampler::default().sample(&model, &small_config(5)).unwrap();
        let sensitivity = mean(&posterior.values(Parameter::Sensitivity));
        let specificity = mean(&posterior.values(Parameter::Specificity));
        assert!((sensitivity - 151.0 / 202.0).abs() < 0.02, "sensitivity {}", sensitivity);
        assert!((specificity - 181.0 / 202.0).abs() < 0.02, "specificity {}", specificity);
    }

    #[test]
    fn test_perfect_calibration_concentrates_near_one() {
        let model = PrevalenceModel::new(
            CalibrationData::new(400, 400, 400, 400).unwrap(),
            FieldSample::reference_study(),
            Priors::uniform(),
        );
        let posterior = MetropolisSampler::default().sample(&model, &small_config(13)).unwrap();
        let sensitivity = mean(&posterior.values(Parameter::Sensitivity));
        let specificity = mean(&posterior.values(Parameter::Specificity));
        assert!(sensitivity > 0.98, "sensitivity {}", sensitivity);
        assert!(specificity > 0.99, "specificity {}", specificity);
    }

    #[test]
    fn test_all_negative_field_lowers_prevalence() {
        let calibration = CalibrationData::reference_study();
        let mixed = PrevalenceModel::new(calibration, FieldSample::reference_study(), Priors::uniform());
        let negative = PrevalenceModel::new(
            calibration,
            FieldSample::from_counts(3330, 0).unwrap(),
            Priors::uniform(),
        );
        let sampler = MetropolisSampler::default();
        let mixed_mean = mean(&sampler.sample(&mixed, &small_config(17)).unwrap().values(Parameter::Prevalence));
        let negative_mean =
            mean(&sampler.sample(&negative, &small_config(17)).unwrap().values(Parameter::Prevalence));
        assert!(negative_mean < mixed_mean, "{} vs {}", negative_mean, mixed_mean);
        assert!(negative_mean < 0.005, "negative-only prevalence {}", negative_mean);
    }

    #[test]
    fn test_reference_study_corrects_naive_prevalence() {
        let config = SamplerConfig {
            chains: 3,
            iterations: 8_000,
            burn_in: 2_000,
            thin: 1,
            seed: Some(2020),
        };
        let posterior = MetropolisSampler::default().sample(&reference_model(), &config).unwrap();
        let prevalence = mean(&posterior.values(Parameter::Prevalence));
        let naive = 50.0 / 3330.0;
        assert!(prevalence < naive, "posterior mean {} not below naive {}", prevalence, naive);
        assert!((prevalence - 0.01).abs() < 0.005, "posterior mean {}", prevalence);
    }

    #[test]
    fn test_logit_target_includes_jacobian() {
        let model = reference_model();
        let params = ModelParameters::new(0.02, 0.8, 0.99).unwrap();
        let position: Vec<f64> = params.iter().map(|(_, value)| logit(value)).collect();
        let expected = model.log_posterior(&params).unwrap() + log_jacobian(&params);
        let density = LogitPosterior::new(model).unnorm_logp(&position);
        assert!((density - expected).abs() < 1e-9, "{} vs {}", density, expected);
        assert_eq!(
            LogitPosterior::new(model).unnorm_logp(&[800.0, 0.0, 0.0]),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_random_walk_is_seeded() {
        let current = [0.0, 1.0, -1.0];
        let mut a = LogitRandomWalk::new(vec![0.5; 3]).set_seed(9);
        let mut b = LogitRandomWalk::new(vec![0.5; 3]).set_seed(9);
        let step = a.sample(&current);
        assert_eq!(step, b.sample(&current));
        assert_eq!(step.len(), 3);
        assert_eq!(a.logp(&current, &step), a.logp(&step, &current));
    }

    #[test]
    fn test_acceptance_rate_counts_moves() {
        let chain = vec![vec![0.0], vec![0.0], vec![1.0], vec![2.0], vec![2.0]];
        assert_eq!(acceptance_rate(&chain), 0.5);
        assert_eq!(acceptance_rate(&chain[..1]), 0.0);
    }

    #[test]
    fn test_all_negative_field_lowers_prevalence_at_fixed_accuracy() {
        // Priors this tight pin sensitivity and specificity to the validation study estimates.
        let calibration = CalibrationData::reference_study();
        let sensitivity = calibration.observed_sensitivity();
        let specificity = calibration.observed_specificity();
        let strength = 1e4;
        let priors = Priors::uniform()
            .with(
                Parameter::Sensitivity,
                Beta::new(strength * sensitivity, strength * (1.0 - sensitivity)).unwrap(),
            )
            .with(
                Parameter::Specificity,
                Beta::new(strength * specificity, strength * (1.0 - specificity)).unwrap(),
            );
        let mixed = PrevalenceModel::new(calibration, FieldSample::reference_study(), priors);
        let negative = PrevalenceModel::new(calibration, FieldSample::from_counts(3330, 0).unwrap(), priors);
        let config = SamplerConfig {
            chains: 2,
            iterations: 5_000,
            burn_in: 2_000,
            thin: 1,
            seed: Some(23),
        };
        let sampler = MetropolisSampler::default();
        let mixed = sampler.sample(&mixed, &config).unwrap();
        let negative = sampler.sample(&negative, &config).unwrap();
        for posterior in [&mixed, &negative] {
            let se = mean(&posterior.values(Parameter::Sensitivity));
            let sp = mean(&posterior.values(Parameter::Specificity));
            assert!((se - sensitivity).abs() < 0.01, "sensitivity {}", se);
            assert!((sp - specificity).abs() < 0.005, "specificity {}", sp);
        }
        let mixed_mean = mean(&mixed.values(Parameter::Prevalence));
        let negative_mean = mean(&negative.values(Parameter::Prevalence));
        assert!(mixed_mean > 0.008, "mixed prevalence {}", mixed_mean);
        assert!(negative_mean < 0.002, "negative-only prevalence {}", negative_mean);
    }
}
