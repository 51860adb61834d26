use anyhow::{Context, Result};
use rustfst::{Label, SymbolTable};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::count::NGramCounts;
use crate::logmath::prob_to_log;
use crate::{read_sentences, read_symbols, LmConfig, ModelError, Smoothing};

/// Labels of the sentence boundary and unknown-word symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Markers {
    pub bos: Label,
    pub eos: Label,
    pub unk: Label,
}

impl Markers {
    /// Look up the marker symbols, all of which must be in `syms`.
    pub fn resolve(syms: &SymbolTable, bos: &str, eos: &str, unk: &str) -> Result<Self, ModelError> {
        let label = |sym: &str| {
            syms.get_label(sym)
                .ok_or_else(|| ModelError::MissingMarker(sym.to_owned()))
        };
        Ok(Self {
            bos: label(bos)?,
            eos: label(eos)?,
            unk: label(unk)?,
        })
    }

    /// Convert a whitespace-separated sentence to labels, with unknown
    /// words mapped to `unk`, preceded by `order - 1` copies of `bos`
    /// and followed by `eos`.
    pub fn pad(&self, sentence: &str, syms: &SymbolTable, order: usize) -> Vec<Label> {
        let mut labels = vec![self.bos; order.saturating_sub(1)];
        labels.extend(
            sentence
                .split_whitespace()
                .map(|word| syms.get_label(word).unwrap_or(self.unk)),
        );
        labels.push(self.eos);
        labels
    }
}

/// N-Gram language model trained once from a corpus and immutable
/// afterwards.
pub struct NGramModel {
    /// Vocabulary, possibly shared with other components
    syms: Arc<SymbolTable>,
    /// Boundary and unknown-word labels
    markers: Markers,
    /// Statistics collected from the training corpus
    counts: NGramCounts,
    /// Estimator used by `prob`
    smoothing: Smoothing,
}

impl NGramModel {
    /// Read the vocabulary and training corpus named in `config`,
    /// count N-Grams, and write the counts out if asked to.
    pub fn new(config: &LmConfig) -> Result<Self> {
        config.validate()?;
        let syms = Arc::new(read_symbols(&config.vocab)?);
        let markers = Markers::resolve(&syms, &config.bos, &config.eos, &config.unk)?;
        let sentences = read_sentences(&config.train)?;
        let model = Self::train(syms, markers, sentences, config.order, config.smoothing())?;
        if let Some(count_file) = &config.count_file {
            model.write_counts(count_file)?;
        }
        Ok(model)
    }

    /// Count N-Grams of up to `order` words in `sentences`.
    pub fn train<I, S>(
        syms: Arc<SymbolTable>,
        markers: Markers,
        sentences: I,
        order: usize,
        smoothing: Smoothing,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if order == 0 {
            return Err(ModelError::InvalidParam {
                name: "n".to_owned(),
                value: order.to_string(),
            }
            .into());
        }
        if syms.len() < 2 {
            return Err(ModelError::InvalidParam {
                name: "vocab".to_owned(),
                value: format!("{} symbols", syms.len()),
            }
            .into());
        }
        let mut counts = NGramCounts::new(order);
        let mut n_sentences = 0usize;
        for sentence in sentences {
            counts.count_sentence(&markers.pad(sentence.as_ref(), &syms, order));
            n_sentences += 1;
        }
        info!(
            sentences = n_sentences,
            order,
            ngrams = counts.pred().len(),
            ?smoothing,
            "trained n-gram model"
        );
        Ok(Self {
            syms,
            markers,
            counts,
            smoothing,
        })
    }

    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.syms
    }

    pub fn markers(&self) -> Markers {
        self.markers
    }

    pub fn counts(&self) -> &NGramCounts {
        &self.counts
    }

    pub fn order(&self) -> usize {
        self.counts.order()
    }

    pub fn smoothing(&self) -> Smoothing {
        self.smoothing
    }

    /// Number of words that can be predicted (epsilon is not counted)
    pub fn vocab_size(&self) -> usize {
        self.syms.len() - 1
    }

    /// Map words to labels, unknown words to the unknown-word label
    pub fn labels<S: AsRef<str>>(&self, words: &[S]) -> Vec<Label> {
        words
            .iter()
            .map(|word| self.syms.get_label(word.as_ref()).unwrap_or(self.markers.unk))
            .collect()
    }

    fn check_size(&self, ngram: &[Label]) -> Result<(), ModelError> {
        if ngram.is_empty() || ngram.len() > self.order() {
            return Err(ModelError::InvalidNGramSize {
                len: ngram.len(),
                order: self.order(),
            });
        }
        Ok(())
    }

    /// Probability of the last word of `ngram` given the others, with
    /// plus-delta smoothing.
    pub fn prob_plus_delta(&self, ngram: &[Label], delta: f64) -> Result<f64, ModelError> {
        self.check_size(ngram)?;
        Ok(self.counts.prob_plus_delta(ngram, delta, self.vocab_size()))
    }

    /// Probability of the last word of `ngram` given the others, with
    /// Witten-Bell smoothing.
    pub fn prob_witten_bell(&self, ngram: &[Label]) -> Result<f64, ModelError> {
        self.check_size(ngram)?;
        Ok(self.counts.prob_witten_bell(ngram, self.vocab_size()))
    }

    /// Probability of the last word of `ngram` given the others, using
    /// the model's smoothing.  `ngram` must have between 1 and `order`
    /// labels.
    pub fn prob(&self, ngram: &[Label]) -> Result<f64, ModelError> {
        match self.smoothing {
            Smoothing::PlusDelta(delta) => self.prob_plus_delta(ngram, delta),
            Smoothing::WittenBell => self.prob_witten_bell(ngram),
        }
    }

    /// Natural log probability of a sentence, end marker included.
    /// Zero probabilities contribute `ZERO_LOG_PROB`.
    pub fn sentence_log_prob(&self, sentence: &str) -> Result<f64, ModelError> {
        let order = self.order();
        let labels = self.markers.pad(sentence, &self.syms, order);
        labels
            .windows(order)
            .map(|ngram| self.prob(ngram).map(prob_to_log))
            .sum()
    }

    /// Per-word perplexity over `sentences`, end markers included.
    pub fn perplexity<I, S>(&self, sentences: I) -> Result<f64, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut log_prob = 0.0;
        let mut n_words = 0usize;
        for sentence in sentences {
            let sentence = sentence.as_ref();
            log_prob += self.sentence_log_prob(sentence)?;
            n_words += sentence.split_whitespace().count() + 1;
        }
        debug!(log_prob, n_words, "scored sentences");
        Ok((-log_prob / n_words.max(1) as f64).exp())
    }

    /// Write predictive, history and history 1+ counts to `path`
    pub fn write_counts<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let fh = File::create(path)
            .with_context(|| format!("Failed to create count file {}", path.display()))?;
        let mut out = BufWriter::new(fh);
        self.counts.write(&mut out, &self.syms)?;
        out.flush()?;
        debug!(path = %path.display(), "wrote counts");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols_from;
    use std::path::PathBuf;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    fn cat_model(smoothing: Smoothing) -> NGramModel {
        let syms = Arc::new(symbols_from(["<s>", "</s>", "<UNK>", "the", "cat"]));
        let markers = Markers::resolve(&syms, "<s>", "</s>", "<UNK>").unwrap();
        NGramModel::train(syms, markers, ["the cat"], 2, smoothing).unwrap()
    }

    fn lab_model(order: usize, delta: f64) -> NGramModel {
        let mut config = LmConfig::new("testdata/lab.syms", "testdata/lab.txt");
        config.order = order;
        config.delta = delta;
        NGramModel::new(&config).unwrap()
    }

    #[test]
    fn it_pads_sentences() {
        let syms = symbols_from(["<s>", "</s>", "<UNK>", "the", "cat"]);
        let markers = Markers::resolve(&syms, "<s>", "</s>", "<UNK>").unwrap();
        assert_eq!(markers.pad("the cat", &syms, 2), vec![0, 3, 4, 1]);
        assert_eq!(markers.pad("  the  dog ", &syms, 3), vec![0, 0, 3, 2, 1]);
        assert_eq!(markers.pad("", &syms, 1), vec![1]);
    }

    #[test]
    fn it_needs_markers() {
        let syms = symbols_from(["<s>", "</s>", "the"]);
        let err = Markers::resolve(&syms, "<s>", "</s>", "<UNK>").unwrap_err();
        assert_eq!(err, ModelError::MissingMarker("<UNK>".to_owned()));
    }

    #[test]
    fn it_scores_the_cat_with_plus_delta() {
        let model = cat_model(Smoothing::PlusDelta(1.0));
        assert_eq!(model.vocab_size(), 4);
        let ngram = model.labels(&["the", "cat"]);
        assert_eq!(ngram, vec![3, 4]);
        assert!(approx_eq(model.prob_plus_delta(&ngram, 1.0).unwrap(), 0.4));
        assert!(approx_eq(model.prob(&ngram).unwrap(), 0.4));
        assert_eq!(model.labels(&["dog"]), vec![2]);
    }

    #[test]
    fn it_scores_the_cat_with_witten_bell() {
        let model = cat_model(Smoothing::WittenBell);
        let p_cat = 0.5 * (1.0 / 3.0) + 0.5 * 0.25;
        assert!(approx_eq(model.prob(&[3, 4]).unwrap(), 0.5 + 0.5 * p_cat));
        assert!(approx_eq(model.prob(&[4]).unwrap(), p_cat));
    }

    #[test]
    fn it_rejects_bad_ngram_sizes() {
        let model = cat_model(Smoothing::WittenBell);
        let too_long = ModelError::InvalidNGramSize { len: 3, order: 2 };
        assert_eq!(model.prob(&[0, 3, 4]).unwrap_err(), too_long);
        assert_eq!(model.prob_plus_delta(&[0, 3, 4], 1.0).unwrap_err(), too_long);
        assert_eq!(
            model.prob_witten_bell(&[]).unwrap_err(),
            ModelError::InvalidNGramSize { len: 0, order: 2 }
        );
        // Still usable afterwards
        assert!(model.prob(&[3, 4]).is_ok());
    }

    #[test]
    fn it_rejects_bad_models() {
        let syms = Arc::new(symbols_from(["<s>"]));
        let markers = Markers { bos: 0, eos: 0, unk: 0 };
        assert!(NGramModel::train(syms.clone(), markers, ["x"], 2, Smoothing::WittenBell).is_err());
        let syms = Arc::new(symbols_from(["<s>", "</s>", "<UNK>"]));
        assert!(NGramModel::train(syms, markers, ["x"], 0, Smoothing::WittenBell).is_err());
    }

    #[test]
    fn it_builds_from_config() {
        let model = lab_model(3, -1.0);
        assert_eq!(model.order(), 3);
        assert_eq!(model.smoothing(), Smoothing::WittenBell);
        assert_eq!(model.vocab_size(), 9);
        assert_eq!(model.markers(), Markers { bos: 0, eos: 1, unk: 2 });
        assert_eq!(model.symbols().len(), 10);
    }

    #[test]
    fn it_reports_missing_markers_in_config() {
        let mut config = LmConfig::new("testdata/lab.syms", "testdata/lab.txt");
        config.unk = "<unk>".to_owned();
        let err = NGramModel::new(&config).err().unwrap();
        assert_eq!(
            err.downcast_ref::<ModelError>(),
            Some(&ModelError::MissingMarker("<unk>".to_owned()))
        );
    }

    #[test]
    fn probabilities_are_probabilities() {
        for (order, delta) in [(1, -1.0), (2, -1.0), (3, -1.0), (3, 0.1), (2, 1.0), (3, 0.0)] {
            let model = lab_model(order, delta);
            let labels: Vec<Label> = (0..10).collect();
            for &a in &labels {
                for &b in &labels {
                    for &c in &labels {
                        let ngram = [a, b, c];
                        let ngram = &ngram[3 - order..];
                        let p = model.prob(ngram).unwrap();
                        assert!((0.0..=1.0).contains(&p), "p{:?} = {}", ngram, p);
                    }
                }
            }
        }
    }

    #[test]
    fn witten_bell_sums_to_one_over_predictable_words() {
        // <s> is never predicted, so the other nine words share all the mass
        let model = lab_model(3, -1.0);
        for history in [[0, 0], [0, 3], [6, 7], [2, 2], [8, 1]] {
            let sum: f64 = (1..10).map(|w| model.prob(&[history[0], history[1], w]).unwrap()).sum();
            assert!((sum - 1.0).abs() < 1e-9, "history {:?} sums to {}", history, sum);
        }
    }

    #[test]
    fn it_trains_deterministically() {
        let a = lab_model(3, -1.0);
        let b = lab_model(3, -1.0);
        assert_eq!(a.counts(), b.counts());
        for ngram in [[0, 0, 3], [3, 4, 6], [6, 7, 3], [2, 2, 2]] {
            assert_eq!(a.prob(&ngram).unwrap(), b.prob(&ngram).unwrap());
        }
    }

    #[test]
    fn it_scores_sentences() {
        let model = cat_model(Smoothing::PlusDelta(1.0));
        let log_prob = model.sentence_log_prob("the cat").unwrap();
        assert!(approx_eq(log_prob, 3.0 * 0.4_f64.ln()));
        let ppl = model.perplexity(["the cat"]).unwrap();
        assert!((ppl - 2.5).abs() < 1e-9);
    }

    #[test]
    fn it_writes_count_files() {
        let dir = tempfile::tempdir().unwrap();
        let count_file = dir.path().join("cat.counts");
        let mut config = LmConfig::new("testdata/cat.syms", "testdata/cat.txt");
        config.order = 2;
        config.delta = 1.0;
        config.count_file = Some(count_file.clone());
        let model = NGramModel::new(&config).unwrap();
        assert!(approx_eq(model.prob(&model.labels(&["the", "cat"])).unwrap(), 0.4));
        let text = std::fs::read_to_string(&count_file).unwrap();
        assert!(text.starts_with("# Pred counts.\n"));
        assert!(text.contains("1 the cat : 2\n"));
        assert!(text.contains("# Hist counts.\n3 <eps> : 0\n"));
        assert!(text.contains("# Hist 1+ counts.\n"));
    }

    #[test]
    fn it_reports_missing_corpus() {
        let config = LmConfig::new("testdata/lab.syms", PathBuf::from("testdata/nothing.txt"));
        assert!(NGramModel::new(&config).is_err());
    }

    #[test]
    fn it_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NGramModel>();
    }
}
