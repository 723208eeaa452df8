use anyhow::{bail, Result};
use clap::Parser;
use env_logger::Env;
use log::info;
use std::path::Path;

mod cli;
mod run;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    // Set up logging level
    env_logger::Builder::from_env(Env::default().default_filter_or(args.verbosity.default_filter())).init();

    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()?;
    }

    // The directory itself is created once sampling has succeeded
    if let Some(out) = &args.out {
        if Path::new(out).exists() {
            bail!("Output directory already exists: {}", out);
        }
    }

    run::seroprev(&args)?;
    info!("Finished prevalence estimation");
    Ok(())
}
