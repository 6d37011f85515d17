//! Adagrad Optimizer Implementation
//!
//! This module implements Adagrad, the per-parameter adaptive learning rate
//! method used to train the character LSTM.
//!
//! ## Algorithm
//!
//! For each parameter θ with gradient g:
//!
//! ```text
//! mem += g²
//! θ   -= lr · g / √(mem + ε)
//! ```
//!
//! where:
//! - lr = learning rate (0.05 by default)
//! - ε (epsilon) = 1e-8, keeps the denominator away from zero
//! - mem = running sum of squared gradients, one slot per parameter element
//!
//! ## Properties
//!
//! - **Never reset**: `mem` only grows over the whole run, so every element's
//!   effective step size shrinks monotonically
//! - **Scale-free first step**: on the first update `g / √(g²) = ±1`, so each
//!   touched element moves by `lr` (up to ε)
//! - **Rare features keep large steps**: an embedding column for a rare
//!   character accumulates little memory and keeps learning quickly
//!
//! ## Implementation Notes
//!
//! The memory is a [`ParamSet`], the same structure that holds the weights
//! and the gradients. The update walks [`ParamName::ALL`] and looks up the
//! weight, gradient and memory for each name, so the three can never drift
//! out of step.
//!
//! ## Example
//!
//! ```rust
//! use char_lstm::{adagrad_update, AdagradOptimizer, LstmConfig, TrainableLstm};
//!
//! let mut model = TrainableLstm::new(LstmConfig::tiny(3), 0);
//! let mut optimizer = AdagradOptimizer::new(&model, 0.05);
//!
//! let out = model.forward(&[0, 1], &[1, 2], &model.zero_state()).unwrap();
//! let grads = model.backward(&out.cache, true);
//! adagrad_update(&mut model, &grads, &mut optimizer);
//! assert_eq!(optimizer.step, 1);
//! ```
//!
//! ## References
//!
//! - Duchi, Hazan & Singer (2011): "Adaptive Subgradient Methods for Online
//!   Learning and Stochastic Optimization"

use crate::lstm::TrainableLstm;
use crate::model::{ParamName, ParamSet};
use rayon::prelude::*;

/// Tensors with more elements than this are updated in parallel
const PARALLEL_UPDATE_THRESHOLD: usize = 1000;

/// Adagrad optimizer state
///
/// # Fields
///
/// - **memory**: Sum of squared gradients, one tensor per parameter
/// - **learning_rate**: Base step size
/// - **epsilon**: Numerical stability constant (default: 1e-8)
/// - **step**: Number of updates applied
pub struct AdagradOptimizer {
    pub memory: ParamSet,
    pub learning_rate: f64,
    pub epsilon: f64,
    pub step: usize,
}

impl AdagradOptimizer {
    /// Create optimizer state for `model` with all memory at zero
    pub fn new(model: &TrainableLstm, learning_rate: f64) -> Self {
        Self {
            memory: model.params().zeros_like(),
            learning_rate,
            epsilon: 1e-8,
            step: 0,
        }
    }
}

/// Apply one Adagrad step to every parameter of `model`
///
/// # Arguments
///
/// * `model` - Model to update (modified in place)
/// * `grads` - Gradients from [`TrainableLstm::backward`]
/// * `optimizer` - Optimizer state (memory updated in place)
///
/// # Performance
///
/// Tensors with more than 1000 elements are updated with Rayon; smaller ones
/// sequentially.
pub fn adagrad_update(
    model: &mut TrainableLstm,
    grads: &ParamSet,
    optimizer: &mut AdagradOptimizer,
) {
    optimizer.step += 1;
    let lr = optimizer.learning_rate;
    let epsilon = optimizer.epsilon;

    let update = |param: &mut f64, grad: f64, mem: &mut f64| {
        *mem += grad * grad;
        *param -= lr * grad / (*mem + epsilon).sqrt();
    };

    for name in ParamName::ALL {
        let param = model.params_mut().get_mut(name);
        let grad = grads.get(name);
        let mem = optimizer.memory.get_mut(name);
        debug_assert_eq!(param.shape, grad.shape, "{}", name);
        debug_assert_eq!(param.shape, mem.shape, "{}", name);

        if param.data.len() > PARALLEL_UPDATE_THRESHOLD {
            param
                .data
                .par_iter_mut()
                .zip(grad.data.par_iter())
                .zip(mem.data.par_iter_mut())
                .for_each(|((p, &g), m)| update(p, g, m));
        } else {
            param
                .data
                .iter_mut()
                .zip(&grad.data)
                .zip(mem.data.iter_mut())
                .for_each(|((p, &g), m)| update(p, g, m));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LstmConfig;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_step_moves_each_element_by_lr() {
        let mut model = TrainableLstm::new(LstmConfig::tiny(3), 1);
        let before = model.params().clone();
        let mut optimizer = AdagradOptimizer::new(&model, 0.1);

        let mut grads = before.zeros_like();
        grads.w_forget.data[0] = 2.0;
        grads.b_proj.data[2] = -0.003;

        adagrad_update(&mut model, &grads, &mut optimizer);

        assert_relative_eq!(
            model.params().w_forget.data[0],
            before.w_forget.data[0] - 0.1,
            epsilon = 1e-9
        );
        // Tiny gradients are still scaled up to a step of (almost) lr
        let expected = before.b_proj.data[2] + 0.1 * 0.003 / (0.003f64 * 0.003 + 1e-8).sqrt();
        assert_relative_eq!(model.params().b_proj.data[2], expected, epsilon = 1e-12);
        assert!(model.params().b_proj.data[2] - before.b_proj.data[2] > 0.099);
        // Untouched elements stay put
        assert_eq!(model.params().w_forget.data[1], before.w_forget.data[1]);
        assert_eq!(model.params().w_embed, before.w_embed);
    }

    #[test]
    fn test_memory_accumulates_squared_gradients() {
        let mut model = TrainableLstm::new(LstmConfig::tiny(3), 1);
        let mut optimizer = AdagradOptimizer::new(&model, 0.05);

        let mut grads = model.params().zeros_like();
        grads.w_cand.data[4] = 3.0;
        adagrad_update(&mut model, &grads, &mut optimizer);
        grads.w_cand.data[4] = -1.0;
        adagrad_update(&mut model, &grads, &mut optimizer);

        assert_eq!(optimizer.memory.w_cand.data[4], 10.0);
        assert_eq!(optimizer.step, 2);
    }

    #[test]
    fn test_memory_is_monotone() {
        let mut model = TrainableLstm::new(LstmConfig::tiny(4), 8);
        let mut optimizer = AdagradOptimizer::new(&model, 0.05);
        let inputs = [0, 1, 2, 3];
        let targets = [1, 2, 3, 0];

        let mut previous = optimizer.memory.clone();
        for _ in 0..5 {
            let out = model.forward(&inputs, &targets, &model.zero_state()).unwrap();
            let grads = model.backward(&out.cache, true);
            adagrad_update(&mut model, &grads, &mut optimizer);
            for (name, mem) in optimizer.memory.iter() {
                for (now, before) in mem.data.iter().zip(&previous.get(name).data) {
                    assert!(now >= before, "{} memory shrank", name);
                }
            }
            previous = optimizer.memory.clone();
        }
    }

    #[test]
    fn test_large_tensors_take_parallel_path_with_same_result() {
        let config = LstmConfig {
            vocab_size: 40,
            emb_size: 8,
            hidden_size: 32,
        };
        let mut model = TrainableLstm::new(config, 3);
        assert!(model.params().w_forget.len() > PARALLEL_UPDATE_THRESHOLD);

        let mut grads = model.params().zeros_like();
        for (i, v) in grads.w_forget.data.iter_mut().enumerate() {
            *v = ((i % 7) as f64 - 3.0) * 0.1;
        }
        let mut expected = model.params().w_forget.clone();
        for (p, &g) in expected.data.iter_mut().zip(&grads.w_forget.data) {
            *p -= 0.05 * g / (g * g + 1e-8).sqrt();
        }

        let mut optimizer = AdagradOptimizer::new(&model, 0.05);
        adagrad_update(&mut model, &grads, &mut optimizer);
        for (a, b) in model.params().w_forget.data.iter().zip(&expected.data) {
            assert_relative_eq!(*a, *b, epsilon = 1e-15);
        }
    }
}
