use crate::cli::Cli;
use anyhow::Result;
use log::{info, warn};
use seroprev_utils::{
    data::{CalibrationData, FieldSample},
    diagnostics,
    estimate::{classical_estimates, ClassicalEstimates},
    io,
    model::PrevalenceModel,
    prior::Priors,
    sampler::{MetropolisSampler, PosteriorSampler, SamplerConfig},
    summary::{summarize, PosteriorSummary},
};
use std::path::Path;
use std::time::Instant;

const R_HAT_THRESHOLD: f64 = 1.1;
const MIN_ESS: f64 = 100.0;

pub fn build_model(args: &Cli) -> Result<PrevalenceModel> {
    let calibration = CalibrationData::new(
        args.n_known_positive,
        args.n_known_positive_tested_positive,
        args.n_known_negative,
        args.n_known_negative_tested_negative,
    )?;
    let field = match &args.field_file {
        Some(path) => io::load_field_sample(Path::new(path))?,
        None => FieldSample::from_counts(args.n_field, args.n_field_positive)?,
    };
    let priors = Priors {
        prevalence: args.prior_prevalence,
        sensitivity: args.prior_sensitivity,
        specificity: args.prior_specificity,
    };
    Ok(PrevalenceModel::new(calibration, field, priors))
}

pub fn sampler_config(args: &Cli) -> SamplerConfig {
    SamplerConfig {
        chains: args.chains,
        iterations: args.iterations,
        burn_in: args.burn_in,
        thin: args.thin,
        seed: args.seed,
    }
}

fn print_classical(estimates: &ClassicalEstimates) {
    println!(
        "Observed sensitivity {:.4}, specificity {:.4}",
        estimates.observed_sensitivity, estimates.observed_specificity
    );
    println!(
        "Naive prevalence {:.4}, Rogan-Gladen corrected {:.4}",
        estimates.naive_prevalence, estimates.rogan_gladen_prevalence
    );
    println!();
}

fn report_convergence(summary: &PosteriorSummary) {
    for row in summary.unconverged(R_HAT_THRESHOLD, MIN_ESS) {
        warn!(
            "{} may not have converged (Rhat = {:?}, n.eff = {:?}). Consider more iterations",
            row.name, row.convergence.r_hat, row.convergence.ess
        );
    }
}

pub fn seroprev(args: &Cli) -> Result<()> {
    let global_timer = Instant::now();
    let model = build_model(args)?;
    let config = sampler_config(args);
    config.validate()?;
    info!(
        "Field sample: {} tested, {} positive",
        model.field.len(),
        model.field.n_positive()
    );

    let (sensitivity, specificity) = model.calibration_posteriors();
    info!(
        "Validation study alone: sensitivity {:.4} ± {:.4}, specificity {:.4} ± {:.4}",
        sensitivity.mean(),
        sensitivity.standard_deviation(),
        specificity.mean(),
        specificity.standard_deviation()
    );

    match classical_estimates(&model.calibration, &model.field) {
        Ok(estimates) => print_classical(&estimates),
        Err(e) => warn!("Skipping classical estimates: {}", e),
    }

    let posterior = MetropolisSampler::default().sample(&model, &config)?;
    info!("Sampled {} draws in {:?}", posterior.n_draws(), global_timer.elapsed());
    for (chain, acceptance) in posterior.acceptance.iter().enumerate() {
        info!("Chain {} acceptance rate: {:.3}", chain, acceptance);
    }

    let summary = summarize(&posterior).with_dic(diagnostics::dic(&model, &posterior)?);
    print!("{}", summary);
    report_convergence(&summary);

    if let Some(out) = &args.out {
        let outdir = Path::new(out);
        std::fs::create_dir_all(outdir)?;
        info!("Created output directory {}", outdir.display());
        io::write_draws(&outdir.join("draws.tsv"), &posterior)?;
        io::write_summary(&outdir.join("summary.tsv"), &summary)?;
        io::write_run_metadata(&outdir.join("model.json"), &model.spec(), &config, &summary)?;
        info!("Wrote results to {}", outdir.display());
    }
    info!("Finished in {:?}", global_timer.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use seroprev_utils::parameter::Parameter;

    #[test]
    fn test_build_model_from_defaults() {
        let args = Cli::parse_from(["seroprev"]);
        let model = build_model(&args).unwrap();
        assert_eq!(model.calibration, CalibrationData::reference_study());
        assert_eq!(model.field, FieldSample::reference_study());
        assert_eq!(model.priors, Priors::uniform());
    }

    #[test]
    fn test_build_model_rejects_invalid_calibration() {
        let args = Cli::parse_from(["seroprev", "--n-known-positive-tested-positive", "200"]);
        assert!(build_model(&args).is_err());
    }

    #[test]
    fn test_run_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("result");
        let args = Cli::parse_from([
            "seroprev",
            "--iterations",
            "600",
            "--burn-in",
            "200",
            "--seed",
            "1",
            "--verbosity",
            "silent",
            "--out",
            out.to_str().unwrap(),
        ]);
        seroprev(&args).unwrap();
        for file in ["draws.tsv", "summary.tsv", "model.json"] {
            assert!(out.join(file).exists(), "missing {}", file);
        }
        let draws = std::fs::read_to_string(out.join("draws.tsv")).unwrap();
        assert_eq!(draws.lines().count(), 1 + 3 * 400);
        let summary = std::fs::read_to_string(out.join("summary.tsv")).unwrap();
        assert!(summary.lines().any(|l| l.starts_with(Parameter::Prevalence.as_str())));
    }

    #[test]
    fn test_failed_run_leaves_no_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("result");
        let args = Cli::parse_from([
            "seroprev",
            "--iterations",
            "100",
            "--burn-in",
            "100",
            "--out",
            out.to_str().unwrap(),
        ]);
        assert!(seroprev(&args).is_err());
        assert!(!out.exists());
    }
}
