// src/cli.rs
use clap::{Parser, ValueEnum};
use seroprev_utils::prior::Beta;

/// Test-error adjusted prevalence estimation.
#[derive(Parser, Debug)]
#[command(
    name = "seroprev",
    version,
    about = "Bayesian prevalence estimation corrected for test sensitivity and specificity"
)]
pub struct Cli {
    #[arg(long, default_value = "3330", help = "Number of tested individuals in the field sample")]
    pub n_field: u64,

    #[arg(long, default_value = "50", help = "Number of positive tests in the field sample")]
    pub n_field_positive: u64,

    #[arg(
        long,
        value_name = "FIELD_FILE",
        help = "File with one field test outcome per line (1/0, positive/negative). Overrides the field counts"
    )]
    pub field_file: Option<String>,

    #[arg(long, default_value = "122", help = "Number of known-positive calibration samples")]
    pub n_known_positive: u64,

    #[arg(
        long,
        default_value = "103",
        help = "Number of known-positive calibration samples testing positive"
    )]
    pub n_known_positive_tested_positive: u64,

    #[arg(long, default_value = "401", help = "Number of known-negative calibration samples")]
    pub n_known_negative: u64,

    #[arg(
        long,
        default_value = "399",
        help = "Number of known-negative calibration samples testing negative"
    )]
    pub n_known_negative_tested_negative: u64,

    #[arg(long, default_value = "3", help = "Number of chains")]
    pub chains: usize,

    #[arg(long, default_value = "10000", help = "Iterations per chain, burn-in included")]
    pub iterations: usize,

    #[arg(long, default_value = "5000", help = "Iterations discarded at the start of each chain")]
    pub burn_in: usize,

    #[arg(long, default_value = "1", help = "Keep every n-th iteration after burn-in")]
    pub thin: usize,

    #[arg(long, help = "Random seed. Chains are seeded with seed, seed + 1, ...")]
    pub seed: Option<u64>,

    #[arg(long, value_name = "ALPHA,BETA", default_value = "1,1", help = "Beta prior on prevalence")]
    pub prior_prevalence: Beta,

    #[arg(long, value_name = "ALPHA,BETA", default_value = "1,1", help = "Beta prior on sensitivity")]
    pub prior_sensitivity: Beta,

    #[arg(long, value_name = "ALPHA,BETA", default_value = "1,1", help = "Beta prior on specificity")]
    pub prior_specificity: Beta,

    #[arg(
        long,
        short,
        value_name = "OUT",
        help = "Output directory for draws, summary and model description. Must not exist"
    )]
    pub out: Option<String>,

    #[arg(long, short, default_value = "0", help = "Number of threads to use (0 = all cores)")]
    pub threads: usize,

    #[arg(
        value_enum,
        long,
        default_value = "normal",
        value_name = "VERBOSITY",
        help = "Verbosity level"
    )]
    pub verbosity: LogLevel,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Verbose,
    Normal,
    Silent,
}

impl LogLevel {
    pub fn default_filter(&self) -> &'static str {
        match self {
            LogLevel::Verbose => "debug",
            LogLevel::Normal => "info",
            LogLevel::Silent => "off",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_match_reference_study() {
        let cli = Cli::parse_from(["seroprev"]);
        assert_eq!(cli.n_field, 3330);
        assert_eq!(cli.n_field_positive, 50);
        assert_eq!(cli.n_known_positive, 122);
        assert_eq!(cli.n_known_positive_tested_positive, 103);
        assert_eq!(cli.n_known_negative, 401);
        assert_eq!(cli.n_known_negative_tested_negative, 399);
        assert_eq!(cli.chains, 3);
        assert_eq!(cli.prior_prevalence, Beta::uniform());
        assert_eq!(cli.verbosity, LogLevel::Normal);
        assert!(cli.out.is_none());
    }

    #[test]
    fn test_parse_priors_and_verbosity() {
        let cli = Cli::parse_from([
            "seroprev",
            "--prior-sensitivity",
            "5,1",
            "--verbosity",
            "silent",
            "--seed",
            "42",
        ]);
        assert_eq!(cli.prior_sensitivity, Beta::new(5.0, 1.0).unwrap());
        assert_eq!(cli.verbosity.default_filter(), "off");
        assert_eq!(cli.seed, Some(42));
    }

    #[test]
    fn test_rejects_invalid_prior() {
        assert!(Cli::try_parse_from(["seroprev", "--prior-prevalence", "0,1"]).is_err());
    }
}
