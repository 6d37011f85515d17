//! char-lstm: Character-Level LSTM Trained by Hand
//!
//! A single-layer LSTM that learns to predict the next character of a text
//! corpus. Every gradient is derived and coded by hand: there is no automatic
//! differentiation anywhere in the crate, and a finite-difference checker is
//! included to prove the derivation right.
//!
//! # Modules
//!
//! - [`tensor`] - Dense `f64` matrices and the handful of operations the model needs
//! - [`layers`] - Activations and the LSTM cell (one timestep, forward and backward)
//! - [`model`] - Configuration and the named parameter store
//! - [`vocab`] - Character to index mapping
//! - [`lstm`] - Forward pass over a chunk, BPTT, sampling, checkpoints
//! - [`gradients`] - Element-wise clipping and the gradient norm
//! - [`optimizer`] - Adagrad
//! - [`train`] - The corpus sweep that ties it all together
//! - [`gradcheck`] - Numerical validation of the backward pass
//! - [`training_logger`] - Console and CSV progress output
//!
//! # Example
//!
//! ```rust,no_run
//! use char_lstm::{
//!     train_lstm, AdagradOptimizer, CharVocab, LstmConfig, TrainableLstm, TrainingConfig,
//!     TrainingLogger,
//! };
//!
//! let text = std::fs::read_to_string("input.txt")?;
//! let vocab = CharVocab::from_text(&text)?;
//! let tokens = vocab.encode(&text)?;
//!
//! let mut model = TrainableLstm::new(LstmConfig::new(vocab.len()), 42);
//! let config = TrainingConfig::default();
//! let mut optimizer = AdagradOptimizer::new(&model, config.learning_rate);
//! let mut logger = TrainingLogger::console();
//!
//! let summary = train_lstm(&mut model, &mut optimizer, &tokens, &vocab, &config, &mut logger)?;
//! println!("smooth loss {:.3}", summary.final_smooth_loss);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod gradcheck;
pub mod gradients;
pub mod layers;
pub mod lstm;
pub mod model;
pub mod optimizer;
pub mod tensor;
pub mod train;
pub mod training_logger;
pub mod vocab;

// Re-export main types for convenience
pub use error::{LstmError, Result};
pub use gradcheck::{gradient_check, GradCheckReport, DEFAULT_DELTA};
pub use gradients::{clip_gradients, compute_grad_norm, GRAD_CLIP};
pub use layers::RecurrentState;
pub use lstm::{Checkpoint, ForwardOutput, Sampler, TrainableLstm};
pub use model::{LstmConfig, ParamName, ParamSet};
pub use optimizer::{adagrad_update, AdagradOptimizer};
pub use tensor::Tensor;
pub use train::{train_lstm, ChunkCursor, TrainingConfig, TrainingSummary};
pub use training_logger::TrainingLogger;
pub use vocab::CharVocab;
