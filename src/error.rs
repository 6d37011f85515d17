//! Error types shared across the crate.
//!
//! Numeric code inside the forward and backward passes works on tensors whose
//! shapes are fixed by [`LstmConfig`](crate::LstmConfig), so a mismatch there
//! is a bug and panics. Everything that depends on outside input (the corpus,
//! index sequences handed to the model, files on disk) returns an
//! [`LstmError`] instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LstmError {
    #[error("Vocabulary is empty: the corpus contains no characters")]
    EmptyVocabulary,
    #[error("Corpus too short: {len} characters, need at least {required} for one chunk")]
    CorpusTooShort { len: usize, required: usize },
    #[error("Character {0:?} is not in the vocabulary")]
    UnknownChar(char),
    #[error("Index {index} out of range for vocabulary of size {vocab_size}")]
    IndexOutOfRange { index: usize, vocab_size: usize },
    #[error("Input and target sequences differ in length: {inputs} vs {targets}")]
    LengthMismatch { inputs: usize, targets: usize },
    #[error("Dimensions don't match between weight and gradient {name}: {weight:?} and {grad:?}")]
    ShapeMismatch {
        name: &'static str,
        weight: Vec<usize>,
        grad: Vec<usize>,
    },
    #[error("Vocabulary has {vocab} characters but the model expects {config}")]
    VocabSizeMismatch { vocab: usize, config: usize },
    #[error("Empty sequence: the forward pass needs at least one timestep")]
    EmptySequence,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LstmError>;
