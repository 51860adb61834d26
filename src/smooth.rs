use rustfst::Label;
use tracing::debug;

use crate::count::{NGramCounts, EPSILON};

/// How counts are turned into conditional probabilities
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Smoothing {
    /// Add delta (>= 0) to every count before normalizing
    PlusDelta(f64),
    /// Interpolate each order with the smoothed lower order, weighted
    /// by the number of distinct words seen after the history
    #[default]
    WittenBell,
}

impl Smoothing {
    /// Plus-delta for a non-negative delta, Witten-Bell otherwise
    pub fn from_delta(delta: f64) -> Self {
        if delta >= 0.0 {
            Smoothing::PlusDelta(delta)
        } else {
            Smoothing::WittenBell
        }
    }
}

impl NGramCounts {
    /// Plus-delta estimate of the last word of `ngram` given the rest,
    /// where `vocab_size` excludes epsilon.  When the denominator
    /// vanishes (delta of zero and an unseen history) the uniform
    /// probability is returned.
    ///
    /// `ngram` must not be empty.
    pub fn prob_plus_delta(&self, ngram: &[Label], delta: f64, vocab_size: usize) -> f64 {
        let history = &ngram[..ngram.len() - 1];
        let pred = f64::from(self.pred_count(ngram));
        let hist = f64::from(self.hist_count(history));
        let denom = hist + delta * vocab_size as f64;
        if denom > 0.0 {
            (pred + delta) / denom
        } else {
            debug!(?ngram, "unseen history with zero delta, using uniform probability");
            1.0 / vocab_size as f64
        }
    }

    /// Witten-Bell estimate of the last word of `ngram` given the rest,
    /// built up from the unigram estimate one order at a time.
    ///
    /// The unigram estimate interpolates with the uniform distribution
    /// over `vocab_size` words; if nothing at all was counted it is the
    /// uniform distribution.  A history that was never seen passes the
    /// lower-order estimate through unchanged.
    ///
    /// `ngram` must not be empty.
    pub fn prob_witten_bell(&self, ngram: &[Label], vocab_size: usize) -> f64 {
        let uniform = 1.0 / vocab_size as f64;
        let len = ngram.len();

        let eps_hist = f64::from(self.hist_count(EPSILON));
        let eps_plus = f64::from(self.hist_one_plus_count(EPSILON));
        let mut prob = if eps_hist + eps_plus > 0.0 {
            let word = &ngram[len - 1..];
            let mle = f64::from(self.pred_count(word)) / eps_hist;
            (eps_hist / (eps_hist + eps_plus)) * mle + (eps_plus / (eps_hist + eps_plus)) * uniform
        } else {
            debug!("no unigram counts, using uniform probability");
            uniform
        };

        for i in 2..=len {
            let ngram_i = &ngram[len - i..];
            let history = &ngram_i[..i - 1];
            let hist = f64::from(self.hist_count(history));
            if hist == 0.0 {
                continue;
            }
            let plus = f64::from(self.hist_one_plus_count(history));
            let mle = f64::from(self.pred_count(ngram_i)) / hist;
            prob = (hist / (hist + plus)) * mle + (plus / (hist + plus)) * prob;
        }
        prob
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // <s> the cat </s> over {<s>, </s>, <UNK>, the, cat}
    fn cat_counts() -> NGramCounts {
        let mut counts = NGramCounts::new(2);
        counts.count_sentence(&[0, 3, 4, 1]);
        counts
    }

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn it_selects_smoothing() {
        assert_eq!(Smoothing::from_delta(-1.0), Smoothing::WittenBell);
        assert_eq!(Smoothing::from_delta(0.0), Smoothing::PlusDelta(0.0));
        assert_eq!(Smoothing::from_delta(0.5), Smoothing::PlusDelta(0.5));
        assert_eq!(Smoothing::from_delta(f64::NAN), Smoothing::WittenBell);
    }

    #[test]
    fn it_adds_delta() {
        let counts = cat_counts();
        assert!(approx_eq(counts.prob_plus_delta(&[3, 4], 1.0, 4), 0.4));
        assert!(approx_eq(counts.prob_plus_delta(&[3, 3], 1.0, 4), 0.2));
        assert!(approx_eq(counts.prob_plus_delta(&[3, 4], 0.0, 4), 1.0));
        // Unigram, epsilon history of count 3
        assert!(approx_eq(counts.prob_plus_delta(&[4], 1.0, 4), 2.0 / 7.0));
        // Unseen history
        assert!(approx_eq(counts.prob_plus_delta(&[2, 4], 0.5, 4), 0.25));
    }

    #[test]
    fn it_floors_zero_denominators() {
        let counts = cat_counts();
        assert_eq!(counts.prob_plus_delta(&[2, 4], 0.0, 4), 0.25);
        let empty = NGramCounts::new(2);
        assert_eq!(empty.prob_plus_delta(&[4], 0.0, 4), 0.25);
    }

    #[test]
    fn it_interpolates_witten_bell() {
        let counts = cat_counts();
        // 3 tokens, 3 types under epsilon
        let p_cat = 0.5 * (1.0 / 3.0) + 0.5 * 0.25;
        assert!(approx_eq(counts.prob_witten_bell(&[4], 4), p_cat));
        assert!(approx_eq(counts.prob_witten_bell(&[3, 4], 4), 0.5 + 0.5 * p_cat));
        // Seen history, unseen continuation
        assert!(approx_eq(counts.prob_witten_bell(&[4, 3], 4), 0.5 * p_cat));
        // Unseen history backs off completely
        assert!(approx_eq(counts.prob_witten_bell(&[2, 4], 4), p_cat));
    }

    #[test]
    fn unigram_witten_bell_is_the_base_case() {
        let mut counts = NGramCounts::new(1);
        counts.count_sentence(&[3, 3, 4, 3, 1]);
        let (c_h, c_d) = (5.0, 3.0);
        for (word, pred) in [(3, 3.0), (4, 1.0), (1, 1.0), (2, 0.0)] {
            let expected = (c_h / (c_h + c_d)) * (pred / c_h) + (c_d / (c_h + c_d)) * (1.0 / 4.0);
            assert_eq!(counts.prob_witten_bell(&[word], 4), expected);
        }
    }

    #[test]
    fn it_handles_empty_counts() {
        let empty = NGramCounts::new(3);
        assert_eq!(empty.prob_witten_bell(&[3], 4), 0.25);
        assert_eq!(empty.prob_witten_bell(&[0, 0, 3], 4), 0.25);
        assert!(!empty.prob_witten_bell(&[0, 0, 3], 4).is_nan());
    }
}
