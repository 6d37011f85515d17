//! Training Loop
//!
//! This module sweeps the corpus left to right in fixed-length chunks, runs
//! forward and backward on each, and applies an Adagrad update.
//!
//! ## How Chunks Are Generated
//!
//! ```text
//! Tokens: [1, 2, 3, 4, 5, 6, 7, 8, 9, 10]
//! Seq length: 3
//!
//! Iteration 0:  Input [1, 2, 3]  Target [2, 3, 4]   (state reset)
//! Iteration 1:  Input [4, 5, 6]  Target [5, 6, 7]   (state carried)
//! Iteration 2:  Input [1, 2, 3]  Target [2, 3, 4]   (7 + 3 + 1 >= 10: reset)
//! ```
//!
//! The target is the input shifted by one position. Chunks don't overlap.
//!
//! ## Recurrent State
//!
//! The `(hidden, cell)` state at the end of one chunk is the starting state
//! of the next, so the model sees the corpus as one continuous stream even
//! though gradients are truncated at chunk boundaries. The state is zeroed on
//! the first iteration and every time the cursor wraps back to the start of
//! the corpus, and nowhere else.
//!
//! ## Smoothed Loss
//!
//! ```text
//! smooth_loss_0 = -ln(1 / vocab_size) · seq_length
//! smooth_loss   = 0.999 · smooth_loss + 0.001 · loss
//! ```
//!
//! The starting value is the loss of a model that predicts uniformly.

use crate::error::{LstmError, Result};
use crate::gradients::{clip_gradients, compute_grad_norm, GRAD_CLIP};
use crate::layers::RecurrentState;
use crate::lstm::TrainableLstm;
use crate::optimizer::{adagrad_update, AdagradOptimizer};
use crate::training_logger::TrainingLogger;
use crate::vocab::CharVocab;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Decay of the loss moving average
const SMOOTHING: f64 = 0.999;

/// One chunk of the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub inputs: &'a [usize],
    pub targets: &'a [usize],
    /// Corpus position of `inputs[0]`
    pub start: usize,
    /// The recurrent state must be zeroed before this chunk
    pub reset: bool,
}

/// Position of the training sweep over the corpus
///
/// Each call to [`ChunkCursor::next_chunk`] prepares one chunk and then
/// advances by `seq_length`.
pub struct ChunkCursor<'a> {
    tokens: &'a [usize],
    seq_length: usize,
    position: usize,
    iteration: usize,
}

impl<'a> ChunkCursor<'a> {
    /// # Errors
    ///
    /// [`LstmError::CorpusTooShort`] unless there are at least
    /// `seq_length + 1` tokens (one chunk plus its shifted target), or if
    /// `seq_length` is zero
    pub fn new(tokens: &'a [usize], seq_length: usize) -> Result<Self> {
        if seq_length == 0 || tokens.len() < seq_length + 1 {
            return Err(LstmError::CorpusTooShort {
                len: tokens.len(),
                required: seq_length + 1,
            });
        }
        Ok(Self {
            tokens,
            seq_length,
            position: 0,
            iteration: 0,
        })
    }

    /// Prepare the next chunk
    pub fn next_chunk(&mut self) -> Chunk<'a> {
        let reset =
            self.iteration == 0 || self.position + self.seq_length + 1 >= self.tokens.len();
        if reset {
            self.position = 0;
        }

        let start = self.position;
        let chunk = Chunk {
            inputs: &self.tokens[start..start + self.seq_length],
            targets: &self.tokens[start + 1..start + self.seq_length + 1],
            start,
            reset,
        };

        self.position += self.seq_length;
        self.iteration += 1;
        chunk
    }

    /// Number of chunks handed out so far
    pub fn iteration(&self) -> usize {
        self.iteration
    }
}

/// Training hyperparameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Characters per chunk (BPTT unroll length)
    pub seq_length: usize,
    /// Adagrad base learning rate
    pub learning_rate: f64,
    /// Stop after this many updates
    pub max_updates: usize,
    /// Print progress every N updates (0 disables)
    pub print_every: usize,
    /// Generate a sample every N updates (0 disables)
    pub sample_every: usize,
    /// Characters per generated sample
    pub sample_length: usize,
    /// Seed for the sampling RNG
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seq_length: 64,
            learning_rate: 5e-2,
            max_updates: 500_000,
            print_every: 100,
            sample_every: 100,
            sample_length: 200,
            seed: 0,
        }
    }
}

impl TrainingConfig {
    /// Short chunks and few updates, for tests and quick experiments
    pub fn tiny() -> Self {
        Self {
            seq_length: 8,
            learning_rate: 1e-1,
            max_updates: 500,
            print_every: 0,
            sample_every: 0,
            sample_length: 50,
            seed: 0,
        }
    }
}

/// What a training run ended with
#[derive(Clone, Debug)]
pub struct TrainingSummary {
    pub updates: usize,
    pub initial_smooth_loss: f64,
    pub final_smooth_loss: f64,
    /// Loss of the last chunk
    pub last_loss: f64,
    /// State after the last chunk
    pub state: RecurrentState,
}

/// Train `model` on `tokens`
///
/// Runs `config.max_updates` iterations of: prepare chunk, forward, backward,
/// clip, Adagrad update. Progress goes to `logger` every `print_every`
/// updates.
///
/// # Errors
///
/// - [`LstmError::CorpusTooShort`] if `tokens` can't fill one chunk
/// - [`LstmError::IndexOutOfRange`] if a token isn't a valid index
pub fn train_lstm(
    model: &mut TrainableLstm,
    optimizer: &mut AdagradOptimizer,
    tokens: &[usize],
    vocab: &CharVocab,
    config: &TrainingConfig,
    logger: &mut TrainingLogger,
) -> Result<TrainingSummary> {
    let mut cursor = ChunkCursor::new(tokens, config.seq_length)?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let vocab_size = model.config().vocab_size as f64;
    let initial_smooth_loss = -(1.0 / vocab_size).ln() * config.seq_length as f64;
    let mut smooth_loss = initial_smooth_loss;
    let mut last_loss = initial_smooth_loss;
    let mut state = model.zero_state();

    for n in 0..config.max_updates {
        let chunk = cursor.next_chunk();
        if chunk.reset {
            state = model.zero_state();
        }

        let sample = if config.sample_every > 0 && n % config.sample_every == 0 {
            let seed_index = chunk.inputs[0];
            Some(model.sample_text(vocab, &state, seed_index, config.sample_length, &mut rng)?)
        } else {
            None
        };

        let out = model.forward(chunk.inputs, chunk.targets, &state)?;
        let mut grads = model.backward(&out.cache, false);
        let grad_norm = compute_grad_norm(&grads);
        clip_gradients(&mut grads, GRAD_CLIP);

        state = out.state;
        last_loss = out.loss;
        smooth_loss = smooth_loss * SMOOTHING + out.loss * (1.0 - SMOOTHING);

        if config.print_every > 0 && n % config.print_every == 0 {
            logger.log(
                n,
                optimizer.learning_rate,
                out.loss,
                smooth_loss,
                config.seq_length,
                grad_norm,
                sample.as_deref(),
            )?;
        } else if let Some(text) = &sample {
            println!("----\n {} \n----", text);
        }

        adagrad_update(model, &grads, optimizer);
    }

    Ok(TrainingSummary {
        updates: cursor.iteration(),
        initial_smooth_loss,
        final_smooth_loss: smooth_loss,
        last_loss,
        state,
    })
}
