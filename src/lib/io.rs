use crate::data::FieldSample;
use crate::model::ModelSpec;
use crate::sampler::{Posterior, SamplerConfig};
use crate::summary::PosteriorSummary;
use anyhow::{anyhow, bail, Result};
use csv::WriterBuilder;
use log::{debug, info};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

/// Parse one line of a field outcome file. Blank lines and `#` comments yield `None`.
pub fn parse_outcome(line: &str) -> Result<Option<bool>> {
    let token = line.split('#').next().unwrap_or("").trim();
    if token.is_empty() {
        return Ok(None);
    }
    match token.to_ascii_lowercase().as_str() {
        "1" | "positive" | "pos" | "true" | "+" => Ok(Some(true)),
        "0" | "negative" | "neg" | "false" | "-" => Ok(Some(false)),
        other => bail!("Unrecognised test outcome: {}", other),
    }
}

/// Read a field sample with one outcome per line.
pub fn load_field_sample(path: &Path) -> Result<FieldSample> {
    let file = File::open(path)
        .map_err(|e| anyhow!("Could not open field sample file: {} ({})", path.display(), e))?;
    let reader = BufReader::new(file);
    let mut outcomes = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        match parse_outcome(&line) {
            Ok(Some(outcome)) => outcomes.push(outcome),
            Ok(None) => continue,
            Err(e) => bail!("{}:{}: {}", path.display(), line_number + 1, e),
        }
    }
    let sample = FieldSample::new(outcomes)?;
    info!(
        "Loaded {} field outcomes ({} positive) from {}",
        sample.len(),
        sample.n_positive(),
        path.display()
    );
    Ok(sample)
}

pub fn write_draws(path: &Path, posterior: &Posterior) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)?;
    writer.write_record([
        "chain",
        "iteration",
        "prevalence",
        "sensitivity",
        "specificity",
        "log_likelihood",
    ])?;
    for draw in posterior.draws() {
        writer.write_record(&[
            draw.chain.to_string(),
            draw.iteration.to_string(),
            draw.params.prevalence.to_string(),
            draw.params.sensitivity.to_string(),
            draw.params.specificity.to_string(),
            draw.log_likelihood.to_string(),
        ])?;
    }
    writer.flush()?;
    debug!("Wrote {} draws to {}", posterior.n_draws(), path.display());
    Ok(())
}

fn optional_to_string(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "NA".to_string())
}

pub fn write_summary(path: &Path, summary: &PosteriorSummary) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)?;
    writer.write_record([
        "parameter", "mean", "sd", "q2.5", "q25", "q50", "q75", "q97.5", "r_hat", "n_eff",
    ])?;
    for row in summary.rows() {
        let mut record = vec![row.name.clone(), row.mean.to_string(), row.sd.to_string()];
        record.extend(row.quantiles.iter().map(|q| q.to_string()));
        record.push(optional_to_string(row.convergence.r_hat));
        record.push(optional_to_string(row.convergence.ess));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    debug!("Wrote summary to {}", path.display());
    Ok(())
}

#[derive(Serialize)]
struct RunMetadata<'a> {
    model: &'a ModelSpec,
    sampler: &'a SamplerConfig,
    summary: &'a PosteriorSummary,
}

/// Store the model description, sampler settings and summary as JSON.
pub fn write_run_metadata(
    path: &Path,
    model: &ModelSpec,
    sampler: &SamplerConfig,
    summary: &PosteriorSummary,
) -> Result<()> {
    let file = File::create(path)?;
    let metadata = RunMetadata {
        model,
        sampler,
        summary,
    };
    serde_json::to_writer_pretty(BufWriter::new(file), &metadata)?;
    debug!("Wrote run metadata to {}", path.display());
    Ok(())
}
