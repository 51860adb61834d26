use anyhow::Result;
use rustfst::{Label, SymbolTable, EPS_SYMBOL};
use std::collections::HashMap;
use std::io::Write;

use crate::ModelError;

/// Type for counts
pub type Count = u32;

/// The empty history, under which unigrams are counted
pub const EPSILON: &[Label] = &[];

/// Sparse map from N-Grams of any order to their counts.  Keys are
/// compared by value, and N-Grams of different orders never collide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NGramCounter {
    counts: HashMap<Vec<Label>, Count>,
}

impl NGramCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the count of `ngram` and return the new count.
    pub fn incr_count(&mut self, ngram: &[Label]) -> Count {
        if let Some(count) = self.counts.get_mut(ngram) {
            *count += 1;
            return *count;
        }
        self.counts.insert(ngram.to_vec(), 1);
        1
    }

    /// Count of `ngram`, zero if it was never seen.
    pub fn get_count(&self, ngram: &[Label]) -> Count {
        self.counts.get(ngram).copied().unwrap_or(0)
    }

    /// Number of distinct N-Grams with a non-zero count
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.counts.values().map(|&c| u64::from(c)).sum()
    }

    /// Length of the longest N-Gram stored
    pub fn max_order(&self) -> usize {
        self.counts.keys().map(Vec::len).max().unwrap_or(0)
    }

    /// Iterate over (N-Gram, count) pairs in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&[Label], Count)> + '_ {
        self.counts.iter().map(|(ngram, &count)| (ngram.as_slice(), count))
    }

    /// Entries sorted by order, then by label sequence
    fn sorted(&self) -> Vec<(&[Label], Count)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_unstable_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        entries
    }

    /// Write one line per N-Gram as `<count> <word> ... : <order>`,
    /// with the empty history written as `<eps>`.
    pub fn write<W: Write>(&self, out: &mut W, syms: &SymbolTable) -> Result<()> {
        for (ngram, count) in self.sorted() {
            let words = if ngram.is_empty() {
                vec![EPS_SYMBOL]
            } else {
                ngram
                    .iter()
                    .map(|&label| syms.get_symbol(label).ok_or(ModelError::UnknownLabel(label)))
                    .collect::<Result<Vec<&str>, _>>()?
            };
            writeln!(out, "{} {} : {}", count, words.join(" "), ngram.len())?;
        }
        Ok(())
    }
}

/// All the counts needed for Witten-Bell and plus-delta smoothing of
/// a model of a given order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NGramCounts {
    /// Maximum order of N-Grams to count
    order: usize,
    /// Occurrences of each N-Gram (history plus predicted word)
    pred: NGramCounter,
    /// Occurrences of each history as the context of a prediction
    hist: NGramCounter,
    /// Number of distinct words seen following each history
    hist_one_plus: NGramCounter,
}

impl NGramCounts {
    pub fn new(order: usize) -> Self {
        Self {
            order,
            pred: NGramCounter::new(),
            hist: NGramCounter::new(),
            hist_one_plus: NGramCounter::new(),
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Collect counts for one sentence.  The first `order - 1` labels
    /// are expected to be beginning-of-sentence padding and the last
    /// one the end-of-sentence marker; predictions are counted at
    /// every position after the padding.
    pub fn count_sentence(&mut self, labels: &[Label]) {
        let first = self.order.saturating_sub(1);
        for k in 1..=self.order {
            for end in first..labels.len() {
                let ngram = &labels[end + 1 - k..=end];
                let history = &ngram[..k - 1];
                self.hist.incr_count(history);
                if self.pred.incr_count(ngram) == 1 {
                    self.hist_one_plus.incr_count(history);
                }
            }
        }
    }

    pub fn pred_count(&self, ngram: &[Label]) -> Count {
        self.pred.get_count(ngram)
    }

    pub fn hist_count(&self, history: &[Label]) -> Count {
        self.hist.get_count(history)
    }

    pub fn hist_one_plus_count(&self, history: &[Label]) -> Count {
        self.hist_one_plus.get_count(history)
    }

    pub fn pred(&self) -> &NGramCounter {
        &self.pred
    }

    pub fn hist(&self) -> &NGramCounter {
        &self.hist
    }

    pub fn hist_one_plus(&self) -> &NGramCounter {
        &self.hist_one_plus
    }

    /// Dump all three tables in readable form
    pub fn write<W: Write>(&self, out: &mut W, syms: &SymbolTable) -> Result<()> {
        writeln!(out, "# Pred counts.")?;
        self.pred.write(out, syms)?;
        writeln!(out, "# Hist counts.")?;
        self.hist.write(out, syms)?;
        writeln!(out, "# Hist 1+ counts.")?;
        self.hist_one_plus.write(out, syms)?;
        Ok(())
    }
}
