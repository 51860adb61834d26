use rustfst::Label;
use thiserror::Error;

/// Errors from building or querying the language model and GMM set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Invalid n-gram size: {len} (model order is {order})")]
    InvalidNGramSize { len: usize, order: usize },

    #[error("Vocabulary missing BOS/EOS/UNK token: {0}")]
    MissingMarker(String),

    #[error("Label {0} is not in the symbol table")]
    UnknownLabel(Label),

    #[error("Missing required parameter: {0}")]
    MissingParam(String),

    #[error("Invalid value for parameter {name}: {value}")]
    InvalidParam { name: String, value: String },

    #[error("Feature dimension {got} does not match model dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("{what} index {index} out of range (have {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Inconsistent GMM parameters: {0}")]
    InconsistentGmm(String),
}
