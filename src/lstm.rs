//! Trainable Character-Level LSTM
//!
//! This module puts the pieces together: a single LSTM layer reading one
//! character per timestep, an output projection to vocabulary logits, and a
//! softmax cross-entropy loss against the next character.
//!
//! ## Overview
//!
//! Training needs three things, all implemented by hand here:
//! 1. **Forward pass** ([`TrainableLstm::forward`]): run the recurrence over
//!    a chunk, cache every activation, sum the loss
//! 2. **Backward pass** ([`TrainableLstm::backward`]): backpropagation through
//!    time over the cached chunk
//! 3. **Optimization**: see [`crate::optimizer`]
//!
//! Generation ([`TrainableLstm::sample`]) reuses the forward recurrence
//! without keeping any history.
//!
//! ## Output layer
//!
//! ```text
//! y = W_proj · h + b_proj
//! p = softmax(y)
//! loss_t = -log p[target_t]
//! ```
//!
//! Softmax and cross-entropy together have the gradient `p - onehot(target)`
//! with respect to `y`, which is where backpropagation starts at every
//! timestep.
//!
//! ## Truncated BPTT
//!
//! The gradient is cut at chunk boundaries, but the recurrent state is not:
//! [`ForwardOutput::state`] is handed to the next chunk's forward pass. The
//! backward pass starts each chunk with zero gradient flowing in from the
//! future.
//!
//! ## Checkpointing
//!
//! [`Checkpoint`] bundles the configuration, vocabulary and weights into one
//! JSON file so a trained model can be reloaded for generation.

use crate::error::{LstmError, Result};
use crate::gradients::{clip_gradients, GRAD_CLIP};
use crate::layers::{cell_backward, cell_forward, softmax, CellCache, RecurrentState};
use crate::model::{LstmConfig, ParamName, ParamSet};
use crate::tensor::Tensor;
use crate::vocab::CharVocab;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Everything recorded at one timestep of the forward pass
#[derive(Clone, Debug)]
pub struct StepCache {
    /// Gate activations, embedded input, new hidden and cell state
    pub cell: CellCache,
    /// Unnormalised log-probabilities `[vocab, 1]`
    pub logits: Tensor,
    /// Softmax of `logits`
    pub probs: Tensor,
    /// One-hot target column
    pub target: Tensor,
}

/// Activation record for a whole chunk
///
/// `initial` is the state carried in from the previous chunk, `steps[t]`
/// holds timestep `t` for `t` in `0..T`.
#[derive(Clone, Debug)]
pub struct LstmCache {
    pub initial: RecurrentState,
    pub steps: Vec<StepCache>,
}

impl LstmCache {
    /// Cell state that timestep `t` started from
    pub fn cell_before(&self, t: usize) -> &Tensor {
        if t == 0 {
            &self.initial.cell
        } else {
            &self.steps[t - 1].cell.cell
        }
    }

    /// Hidden state that timestep `t` started from
    pub fn hidden_before(&self, t: usize) -> &Tensor {
        if t == 0 {
            &self.initial.hidden
        } else {
            &self.steps[t - 1].cell.hidden
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Result of a forward pass over one chunk
#[derive(Clone, Debug)]
pub struct ForwardOutput {
    /// Cross-entropy summed over all timesteps
    pub loss: f64,
    pub cache: LstmCache,
    /// State after the last timestep; seeds the next chunk
    pub state: RecurrentState,
}

/// Single-layer LSTM language model
#[derive(Clone, Debug)]
pub struct TrainableLstm {
    pub(crate) params: ParamSet,
    pub(crate) config: LstmConfig,
}

impl TrainableLstm {
    /// Create a model with freshly initialised weights
    ///
    /// # Arguments
    ///
    /// * `config` - Model dimensions
    /// * `seed` - Seed for weight initialisation
    pub fn new(config: LstmConfig, seed: u64) -> Self {
        let params = ParamSet::init(&config, seed);
        Self { params, config }
    }

    /// Wrap existing parameters
    ///
    /// # Errors
    ///
    /// [`LstmError::ShapeMismatch`] if any tensor doesn't have the shape
    /// `config` implies
    pub fn from_params(config: LstmConfig, params: ParamSet) -> Result<Self> {
        let expected = ParamSet::zeros(&config);
        for name in ParamName::ALL {
            let (want, got) = (expected.get(name), params.get(name));
            if want.shape != got.shape {
                return Err(LstmError::ShapeMismatch {
                    name: name.as_str(),
                    weight: want.shape.clone(),
                    grad: got.shape.clone(),
                });
            }
        }
        Ok(Self { params, config })
    }

    pub fn config(&self) -> &LstmConfig {
        &self.config
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    /// Zero `(hidden, cell)` state sized for this model
    pub fn zero_state(&self) -> RecurrentState {
        RecurrentState::zeros(self.config.hidden_size)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.config.vocab_size {
            return Err(LstmError::IndexOutOfRange {
                index,
                vocab_size: self.config.vocab_size,
            });
        }
        Ok(())
    }

    /// Output layer: logits and their softmax for a hidden state
    fn project(&self, hidden: &Tensor) -> (Tensor, Tensor) {
        let logits = self.params.w_proj.matmul(hidden).add(&self.params.b_proj);
        let probs = softmax(&logits);
        (logits, probs)
    }

    /// Forward pass over one chunk
    ///
    /// Runs the LSTM over `inputs` starting from `state`, scoring each step's
    /// prediction against the matching entry of `targets`. Parameters are
    /// not modified.
    ///
    /// # Errors
    ///
    /// - [`LstmError::LengthMismatch`] if the sequences differ in length
    /// - [`LstmError::EmptySequence`] if they are empty
    /// - [`LstmError::IndexOutOfRange`] for an index outside the vocabulary
    pub fn forward(
        &self,
        inputs: &[usize],
        targets: &[usize],
        state: &RecurrentState,
    ) -> Result<ForwardOutput> {
        if inputs.len() != targets.len() {
            return Err(LstmError::LengthMismatch {
                inputs: inputs.len(),
                targets: targets.len(),
            });
        }
        if inputs.is_empty() {
            return Err(LstmError::EmptySequence);
        }
        for &index in inputs.iter().chain(targets) {
            self.check_index(index)?;
        }

        let vocab_size = self.config.vocab_size;
        let mut steps = Vec::with_capacity(inputs.len());
        let mut loss = 0.0;

        for (&input, &target) in inputs.iter().zip(targets) {
            let prev = match steps.last() {
                Some(StepCache { cell, .. }) => RecurrentState {
                    hidden: cell.hidden.clone(),
                    cell: cell.cell.clone(),
                },
                None => state.clone(),
            };

            let cell = cell_forward(&self.params, &Tensor::one_hot(input, vocab_size), &prev);
            let (logits, probs) = self.project(&cell.hidden);
            loss -= probs.data[target].ln();

            steps.push(StepCache {
                cell,
                logits,
                probs,
                target: Tensor::one_hot(target, vocab_size),
            });
        }

        let last = &steps[steps.len() - 1].cell;
        let final_state = RecurrentState {
            hidden: last.hidden.clone(),
            cell: last.cell.clone(),
        };

        Ok(ForwardOutput {
            loss,
            cache: LstmCache {
                initial: state.clone(),
                steps,
            },
            state: final_state,
        })
    }

    /// Loss of one chunk, without keeping the cache
    pub fn loss(&self, inputs: &[usize], targets: &[usize], state: &RecurrentState) -> Result<f64> {
        Ok(self.forward(inputs, targets, state)?.loss)
    }

    /// Backpropagation through time over a cached chunk
    ///
    /// Walks the timesteps in reverse, carrying the hidden and cell gradients
    /// from each step to the one before it. Gradients for every parameter are
    /// summed over the chunk.
    ///
    /// # Arguments
    ///
    /// * `cache` - Activation record from [`TrainableLstm::forward`]
    /// * `clip` - Clamp every gradient element to `[-5, 5]` before returning
    ///
    /// # Returns
    ///
    /// A [`ParamSet`] of gradients, same shapes as the parameters
    pub fn backward(&self, cache: &LstmCache, clip: bool) -> ParamSet {
        let mut grads = self.params.zeros_like();
        let w_proj_t = self.params.w_proj.transpose();

        let mut dhidden_next = Tensor::zeros(self.config.hidden_size, 1);
        let mut dcell_next = Tensor::zeros(self.config.hidden_size, 1);

        for t in (0..cache.len()).rev() {
            let step = &cache.steps[t];

            // Softmax + cross-entropy
            let d_logits = step.probs.sub(&step.target);
            grads.w_proj.add_outer(&d_logits, &step.cell.hidden);
            grads.b_proj.add_assign(&d_logits);

            // h feeds both the output layer and the next timestep
            let dhidden = w_proj_t.matmul(&d_logits).add(&dhidden_next);

            let back = cell_backward(
                &self.params,
                &step.cell,
                cache.cell_before(t),
                &dhidden,
                &dcell_next,
                &mut grads,
            );
            dhidden_next = back.hidden_prev;
            dcell_next = back.cell_prev;
        }

        if clip {
            clip_gradients(&mut grads, GRAD_CLIP);
        }

        grads
    }

    /// Generate `n` character indices
    ///
    /// Starts from `state` with `seed_index` as the first input and feeds
    /// each drawn index back in as the next input. The returned iterator is
    /// lazy and yields exactly `n` items; it owns its own copy of the state,
    /// so the model and `state` are left untouched.
    ///
    /// # Errors
    ///
    /// [`LstmError::IndexOutOfRange`] if `seed_index` is not a vocabulary index
    pub fn sample<'a, R: Rng>(
        &'a self,
        state: &RecurrentState,
        seed_index: usize,
        n: usize,
        rng: &'a mut R,
    ) -> Result<Sampler<'a, R>> {
        self.check_index(seed_index)?;
        Ok(Sampler {
            model: self,
            state: state.clone(),
            input: seed_index,
            remaining: n,
            rng,
        })
    }

    /// Convenience wrapper: sample `n` characters and decode them
    pub fn sample_text<R: Rng>(
        &self,
        vocab: &CharVocab,
        state: &RecurrentState,
        seed_index: usize,
        n: usize,
        rng: &mut R,
    ) -> Result<String> {
        let ids: Vec<usize> = self.sample(state, seed_index, n, rng)?.collect();
        Ok(vocab.decode(&ids))
    }
}

/// Lazy autoregressive generator returned by [`TrainableLstm::sample`]
pub struct Sampler<'a, R: Rng> {
    model: &'a TrainableLstm,
    state: RecurrentState,
    input: usize,
    remaining: usize,
    rng: &'a mut R,
}

impl<R: Rng> Iterator for Sampler<'_, R> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let model = self.model;
        let x = Tensor::one_hot(self.input, model.config.vocab_size);
        let cell = cell_forward(&model.params, &x, &self.state);
        let (_, probs) = model.project(&cell.hidden);

        self.state = RecurrentState {
            hidden: cell.hidden,
            cell: cell.cell,
        };
        self.input = sample_from_probs(&probs.data, &mut *self.rng);
        Some(self.input)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<R: Rng> ExactSizeIterator for Sampler<'_, R> {}

/// Draw one index from a categorical distribution
///
/// Inverse-CDF sampling: draw `u` uniform in `[0, 1)` and return the first
/// index whose cumulative probability exceeds it. Rounding can leave the
/// total just below 1, in which case the last index is returned.
pub fn sample_from_probs<R: Rng + ?Sized>(probs: &[f64], rng: &mut R) -> usize {
    let u: f64 = rng.random();
    let mut cumsum = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumsum += p;
        if u < cumsum {
            return i;
        }
    }
    probs.len() - 1
}

/// A trained model with everything needed to use it again
#[derive(Serialize, Deserialize)]
pub struct Checkpoint {
    pub config: LstmConfig,
    pub vocab: CharVocab,
    pub params: ParamSet,
    /// Number of updates the weights have seen
    pub step: usize,
    /// Smoothed training loss at save time
    pub smooth_loss: f64,
}

impl Checkpoint {
    pub fn new(model: &TrainableLstm, vocab: &CharVocab, step: usize, smooth_loss: f64) -> Self {
        Self {
            config: model.config.clone(),
            vocab: vocab.clone(),
            params: model.params.clone(),
            step,
            smooth_loss,
        }
    }

    /// Write the checkpoint as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Read a checkpoint and rebuild the model and vocabulary
    ///
    /// # Errors
    ///
    /// I/O and JSON errors, [`LstmError::ShapeMismatch`] if the stored
    /// weights don't match the stored configuration, and
    /// [`LstmError::VocabSizeMismatch`] if the vocabulary disagrees with it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<(TrainableLstm, CharVocab, Self)> {
        let json = fs::read_to_string(path)?;
        let checkpoint: Checkpoint = serde_json::from_str(&json)?;
        let vocab = CharVocab::from_chars(
            (0..checkpoint.vocab.len())
                .filter_map(|i| checkpoint.vocab.index_to_char(i))
                .collect(),
        )?;
        if vocab.len() != checkpoint.config.vocab_size {
            return Err(LstmError::VocabSizeMismatch {
                vocab: vocab.len(),
                config: checkpoint.config.vocab_size,
            });
        }
        let model =
            TrainableLstm::from_params(checkpoint.config.clone(), checkpoint.params.clone())?;
        Ok((model, vocab, checkpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny_model() -> TrainableLstm {
        TrainableLstm::new(
            LstmConfig {
                vocab_size: 5,
                emb_size: 3,
                hidden_size: 6,
            },
            2024,
        )
    }

    #[test]
    fn test_probabilities_sum_to_one_every_step() {
        let model = tiny_model();
        let out = model
            .forward(&[0, 1, 2, 3, 4, 0], &[1, 2, 3, 4, 0, 1], &model.zero_state())
            .unwrap();
        assert_eq!(out.cache.len(), 6);
        for step in &out.cache.steps {
            assert_relative_eq!(step.probs.sum(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_untrained_loss_is_near_uniform() {
        let model = tiny_model();
        let inputs = [0, 1, 2, 3, 4, 0, 1, 2];
        let targets = [1, 2, 3, 4, 0, 1, 2, 3];
        let loss = model.loss(&inputs, &targets, &model.zero_state()).unwrap();

        let uniform = -(1.0f64 / 5.0).ln() * inputs.len() as f64;
        assert!(loss >= 0.0);
        assert_relative_eq!(loss, uniform, max_relative = 0.01);
    }

    #[test]
    fn test_forward_is_deterministic() {
        let model = tiny_model();
        let state = model.zero_state();
        let a = model.forward(&[3, 1, 4, 1], &[1, 4, 1, 0], &state).unwrap();
        let b = model.forward(&[3, 1, 4, 1], &[1, 4, 1, 0], &state).unwrap();

        assert_eq!(a.loss.to_bits(), b.loss.to_bits());
        assert_eq!(a.state, b.state);
        for (x, y) in a.cache.steps.iter().zip(&b.cache.steps) {
            assert_eq!(x.probs, y.probs);
            assert_eq!(x.cell.cell, y.cell.cell);
        }
    }

    #[test]
    fn test_state_carry_matches_single_long_chunk() {
        let model = tiny_model();
        let inputs = [0, 2, 4, 1, 3, 0, 2];
        let targets = [2, 4, 1, 3, 0, 2, 4];

        let whole = model.forward(&inputs, &targets, &model.zero_state()).unwrap();
        let first = model
            .forward(&inputs[..3], &targets[..3], &model.zero_state())
            .unwrap();
        let second = model.forward(&inputs[3..], &targets[3..], &first.state).unwrap();

        assert_relative_eq!(first.loss + second.loss, whole.loss, epsilon = 1e-12);
        assert_eq!(second.state, whole.state);
    }

    #[test]
    fn test_cache_exposes_carried_in_state() {
        let model = tiny_model();
        let start = RecurrentState {
            hidden: Tensor::from_fn(6, 1, || 0.1),
            cell: Tensor::from_fn(6, 1, || -0.2),
        };
        let out = model.forward(&[1, 2], &[2, 3], &start).unwrap();
        assert_eq!(out.cache.hidden_before(0), &start.hidden);
        assert_eq!(out.cache.cell_before(0), &start.cell);
        assert_eq!(out.cache.cell_before(1), &out.cache.steps[0].cell.cell);
    }

    #[test]
    fn test_forward_rejects_bad_input() {
        let model = tiny_model();
        let state = model.zero_state();
        assert!(matches!(
            model.forward(&[0, 1], &[1], &state),
            Err(LstmError::LengthMismatch { inputs: 2, targets: 1 })
        ));
        assert!(matches!(
            model.forward(&[], &[], &state),
            Err(LstmError::EmptySequence)
        ));
        assert!(matches!(
            model.forward(&[0, 9], &[1, 2], &state),
            Err(LstmError::IndexOutOfRange { index: 9, .. })
        ));
    }

    #[test]
    fn test_backward_gradient_shapes_and_clipping() {
        let model = tiny_model();
        let out = model
            .forward(&[0, 1, 2, 3], &[1, 2, 3, 4], &model.zero_state())
            .unwrap();
        let grads = model.backward(&out.cache, true);
        for (name, grad) in grads.iter() {
            assert_eq!(grad.shape, model.params().get(name).shape, "{}", name);
            assert!(grad.data.iter().all(|v| (-5.0..=5.0).contains(v)), "{}", name);
        }
    }

    #[test]
    fn test_output_bias_gradient_is_probs_minus_targets() {
        let model = tiny_model();
        let out = model
            .forward(&[4, 3, 2], &[3, 2, 1], &model.zero_state())
            .unwrap();
        let grads = model.backward(&out.cache, false);

        let mut expected = Tensor::zeros(5, 1);
        for step in &out.cache.steps {
            expected.add_assign(&step.probs.sub(&step.target));
        }
        for (g, e) in grads.b_proj.data.iter().zip(&expected.data) {
            assert_abs_diff_eq!(*g, *e, epsilon = 1e-14);
        }
        // The bias gradient of a softmax output sums to zero
        assert_abs_diff_eq!(grads.b_proj.sum(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unused_embedding_columns_get_no_gradient() {
        let model = tiny_model();
        let out = model
            .forward(&[0, 1, 0], &[1, 0, 1], &model.zero_state())
            .unwrap();
        let grads = model.backward(&out.cache, false);
        for r in 0..3 {
            for c in 2..5 {
                assert_eq!(grads.w_embed.get(r, c), 0.0);
            }
        }
    }

    #[test]
    fn test_sample_lengths() {
        let model = tiny_model();
        let mut rng = StdRng::seed_from_u64(1);
        let state = model.zero_state();

        let none: Vec<usize> = model.sample(&state, 2, 0, &mut rng).unwrap().collect();
        assert!(none.is_empty());

        let one: Vec<usize> = model.sample(&state, 2, 1, &mut rng).unwrap().collect();
        assert_eq!(one.len(), 1);
        assert!(one[0] < 5);

        let many = model.sample(&state, 0, 50, &mut rng).unwrap();
        assert_eq!(many.len(), 50);
        assert!(many.into_iter().all(|ix| ix < 5));
    }

    #[test]
    fn test_sample_is_reproducible_with_same_seed() {
        let model = tiny_model();
        let state = model.zero_state();
        let a: Vec<usize> = model
            .sample(&state, 1, 30, &mut StdRng::seed_from_u64(7))
            .unwrap()
            .collect();
        let b: Vec<usize> = model
            .sample(&state, 1, 30, &mut StdRng::seed_from_u64(7))
            .unwrap()
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sample_rejects_bad_seed_index() {
        let model = tiny_model();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(model.sample(&model.zero_state(), 5, 3, &mut rng).is_err());
    }

    #[test]
    fn test_sample_from_probs_degenerate_distribution() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            assert_eq!(sample_from_probs(&[0.0, 0.0, 1.0, 0.0], &mut rng), 2);
        }
    }

    #[test]
    fn test_sample_from_probs_frequencies() {
        let mut rng = StdRng::seed_from_u64(11);
        let probs = [0.2, 0.5, 0.3];
        let mut counts = [0usize; 3];
        for _ in 0..20_000 {
            counts[sample_from_probs(&probs, &mut rng)] += 1;
        }
        for (count, p) in counts.iter().zip(probs) {
            assert_abs_diff_eq!(*count as f64 / 20_000.0, p, epsilon = 0.02);
        }
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let model = tiny_model();
        let vocab = CharVocab::from_text("abcde").unwrap();
        let path = std::env::temp_dir().join(format!("char_lstm_ckpt_{}.json", std::process::id()));

        Checkpoint::new(&model, &vocab, 12, 3.5).save(&path).unwrap();
        let (loaded, loaded_vocab, meta) = Checkpoint::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.params(), model.params());
        assert_eq!(loaded_vocab, vocab);
        assert_eq!(meta.step, 12);
        assert_eq!(meta.smooth_loss, 3.5);
    }

    #[test]
    fn test_from_params_rejects_wrong_shapes() {
        let config = LstmConfig::tiny(4);
        let params = ParamSet::zeros(&LstmConfig::tiny(5));
        assert!(matches!(
            TrainableLstm::from_params(config, params),
            Err(LstmError::ShapeMismatch { name: "w_embed", .. })
        ));
    }
}
