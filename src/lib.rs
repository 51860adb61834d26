use anyhow::{bail, Context, Result};
use rustfst::SymbolTable;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::Path;

/// Sparse N-Gram counting
pub mod count;

/// Typed configuration for building a language model
pub mod config;

/// Errors reported to callers of the models
pub mod error;

/// Diagonal-covariance Gaussian mixtures
pub mod gmm;

/// Log-domain arithmetic
pub mod logmath;

/// N-Gram language model
pub mod model;

/// Smoothed estimators over N-Gram counts
pub mod smooth;

pub use config::LmConfig;
pub use count::{NGramCounter, NGramCounts};
pub use error::ModelError;
pub use gmm::GmmSet;
pub use logmath::{log_sum_exp, ZERO_LOG_PROB};
pub use model::{Markers, NGramModel};
pub use smooth::Smoothing;

/// Read a vocabulary, one symbol per line.  Labels are assigned in
/// line order starting from 0, and the first occurrence of a
/// duplicated symbol wins.  Blank lines would leave a hole in the
/// labels and are an error, except at the end of the file.
pub fn read_symbols<P: AsRef<Path>>(input: P) -> Result<SymbolTable> {
    let input = input.as_ref();
    let fh = File::open(input)
        .with_context(|| format!("Failed to open vocabulary {}", input.display()))?;
    let mut syms = SymbolTable::empty();
    let mut blank = None;
    for (idx, line) in BufReader::new(fh).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read vocabulary {}", input.display()))?;
        let sym = line.trim();
        if sym.is_empty() {
            blank.get_or_insert(idx + 1);
            continue;
        }
        if let Some(lineno) = blank {
            bail!("Blank line {} in vocabulary {}", lineno, input.display());
        }
        syms.add_symbol(sym);
    }
    Ok(syms)
}

/// Build a symbol table from symbols given in label order
pub fn symbols_from<I, S>(symbols: I) -> SymbolTable
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut syms = SymbolTable::empty();
    for sym in symbols {
        syms.add_symbol(sym.as_ref());
    }
    syms
}

/// Read input sentences as whitespace-separated lines
pub fn read_sentences<P: AsRef<Path>>(input: P) -> Result<Vec<String>> {
    let input = input.as_ref();
    let fh = File::open(input)
        .with_context(|| format!("Failed to open corpus {}", input.display()))?;
    let sentences = BufReader::new(fh)
        .lines()
        .collect::<std::io::Result<Vec<String>>>()
        .with_context(|| format!("Failed to read corpus {}", input.display()))?;
    Ok(sentences)
}
