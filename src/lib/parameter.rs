use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum_macros::EnumIter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum Parameter {
    Prevalence,
    Sensitivity,
    Specificity,
}

impl Parameter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Parameter::Prevalence => "prevalence",
            Parameter::Sensitivity => "sensitivity",
            Parameter::Specificity => "specificity",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Parameter::Prevalence => 0,
            Parameter::Sensitivity => 1,
            Parameter::Specificity => 2,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prevalence" | "prev" => Ok(Parameter::Prevalence),
            "sensitivity" | "sens" => Ok(Parameter::Sensitivity),
            "specificity" | "spec" => Ok(Parameter::Specificity),
            _ => bail!("Invalid Parameter: {}", s),
        }
    }
}

/// Values of the three latent quantities. Each lies in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub prevalence: f64,
    pub sensitivity: f64,
    pub specificity: f64,
}

impl ModelParameters {
    pub fn new(prevalence: f64, sensitivity: f64, specificity: f64) -> Result<Self> {
        let params = Self {
            prevalence,
            sensitivity,
            specificity,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        for (parameter, value) in self.iter() {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                bail!("{} must be a probability in [0, 1], got {}", parameter, value);
            }
        }
        Ok(())
    }

    pub fn get(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::Prevalence => self.prevalence,
            Parameter::Sensitivity => self.sensitivity,
            Parameter::Specificity => self.specificity,
        }
    }

    pub fn set(&mut self, parameter: Parameter, value: f64) {
        match parameter {
            Parameter::Prevalence => self.prevalence = value,
            Parameter::Sensitivity => self.sensitivity = value,
            Parameter::Specificity => self.specificity = value,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Parameter, f64)> + '_ {
        use strum::IntoEnumIterator;
        Parameter::iter().map(move |p| (p, self.get(p)))
    }
}
