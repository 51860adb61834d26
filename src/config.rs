//! Language model configuration.
//!
//! Parameters arrive either as a string-keyed map (`vocab`, `train`,
//! `bos`, `eos`, `unk`, `n`, `delta`, `count_file`) or as a TOML file
//! with the same keys.  Either way they are resolved once into an
//! [`LmConfig`] with defaults filled in and checked up front.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{ModelError, Smoothing};

fn default_bos() -> String {
    "<s>".to_owned()
}

fn default_eos() -> String {
    "</s>".to_owned()
}

fn default_unk() -> String {
    "<UNK>".to_owned()
}

fn default_order() -> usize {
    3
}

fn default_delta() -> f64 {
    -1.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LmConfig {
    /// Vocabulary, one symbol per line
    pub vocab: PathBuf,
    /// Training corpus, one sentence per line
    pub train: PathBuf,
    /// Beginning-of-sentence token
    #[serde(default = "default_bos")]
    pub bos: String,
    /// End-of-sentence token
    #[serde(default = "default_eos")]
    pub eos: String,
    /// Token that out-of-vocabulary words map to
    #[serde(default = "default_unk")]
    pub unk: String,
    /// Model order
    #[serde(rename = "n", default = "default_order")]
    pub order: usize,
    /// Plus-delta constant; negative selects Witten-Bell
    #[serde(default = "default_delta")]
    pub delta: f64,
    /// Where to dump counts after training, if anywhere
    #[serde(default)]
    pub count_file: Option<PathBuf>,
}

impl LmConfig {
    /// Default configuration (trigram, Witten-Bell) for the given files
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(vocab: P, train: Q) -> Self {
        Self {
            vocab: vocab.into(),
            train: train.into(),
            bos: default_bos(),
            eos: default_eos(),
            unk: default_unk(),
            order: default_order(),
            delta: default_delta(),
            count_file: None,
        }
    }

    /// Build from string parameters.  `vocab` and `train` are required.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ModelError> {
        let required = |name: &str| {
            params
                .get(name)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ModelError::MissingParam(name.to_owned()))
        };
        let string_or = |name: &str, default: String| params.get(name).cloned().unwrap_or(default);

        let config = Self {
            vocab: PathBuf::from(required("vocab")?),
            train: PathBuf::from(required("train")?),
            bos: string_or("bos", default_bos()),
            eos: string_or("eos", default_eos()),
            unk: string_or("unk", default_unk()),
            order: parse_param(params, "n", default_order())?,
            delta: parse_param(params, "delta", default_delta())?,
            count_file: params
                .get("count_file")
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Invalid language model configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("In config {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.order == 0 {
            return Err(ModelError::InvalidParam {
                name: "n".to_owned(),
                value: self.order.to_string(),
            });
        }
        if self.delta.is_nan() {
            return Err(ModelError::InvalidParam {
                name: "delta".to_owned(),
                value: self.delta.to_string(),
            });
        }
        Ok(())
    }

    pub fn smoothing(&self) -> Smoothing {
        Smoothing::from_delta(self.delta)
    }
}

fn parse_param<T: FromStr>(params: &HashMap<String, String>, name: &str, default: T) -> Result<T, ModelError> {
    match params.get(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ModelError::InvalidParam {
            name: name.to_owned(),
            value: value.clone(),
        }),
    }
}
