//! Gradient Utilities
//!
//! Operations on a full set of gradients between the backward pass and the
//! optimizer step.
//!
//! ## Components
//!
//! - **Gradient Clipping**: Clamp each gradient element into a fixed range
//! - **Gradient Norm Computation**: Measure the overall gradient magnitude
//!
//! ## Why Element-wise Clipping?
//!
//! Recurrent networks multiply by the same weights at every timestep, so a
//! long chunk can occasionally produce a gradient that is orders of magnitude
//! larger than usual. Clamping every element to `[-5, 5]` caps the damage of
//! one such chunk:
//!
//! ```text
//! g = clamp(g, -5, 5)   for every element of every gradient tensor
//! ```
//!
//! Unlike norm-based clipping this can change the gradient's direction, but
//! it is cheap, local to each element, and idempotent.
//!
//! The gradient checker runs the backward pass *without* clipping: a clamped
//! gradient is no longer the derivative of the loss.
//!
//! ## Example
//!
//! ```rust
//! use char_lstm::{clip_gradients, compute_grad_norm, LstmConfig, ParamSet};
//!
//! let mut grads = ParamSet::zeros(&LstmConfig::tiny(3));
//! grads.b_proj.data[0] = 12.0;
//! clip_gradients(&mut grads, 5.0);
//! assert_eq!(grads.b_proj.data[0], 5.0);
//! assert_eq!(compute_grad_norm(&grads), 5.0);
//! ```

use crate::model::{ParamName, ParamSet};
use rayon::prelude::*;

/// Element bound used by the training loop
pub const GRAD_CLIP: f64 = 5.0;

/// Compute the L2 norm of all gradients
///
/// `√(Σ g²)` over every element of every tensor. Logged during training to
/// spot exploding gradients before clipping hides them.
pub fn compute_grad_norm(grads: &ParamSet) -> f64 {
    grads
        .iter()
        .map(|(_, tensor)| tensor.data.par_iter().map(|&val| val * val).sum::<f64>())
        .sum::<f64>()
        .sqrt()
}

/// Clamp every gradient element to `[-limit, limit]`
///
/// # Arguments
///
/// * `grads` - Gradients to clip (modified in place)
/// * `limit` - Largest allowed absolute value
pub fn clip_gradients(grads: &mut ParamSet, limit: f64) {
    for name in ParamName::ALL {
        grads
            .get_mut(name)
            .data
            .par_iter_mut()
            .for_each(|val| *val = val.clamp(-limit, limit));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LstmConfig;
    use crate::tensor::Tensor;
    use approx::assert_relative_eq;

    fn spread_grads() -> ParamSet {
        let mut grads = ParamSet::zeros(&LstmConfig::tiny(4));
        let mut v = -40.0;
        for name in ParamName::ALL {
            let t = grads.get_mut(name);
            *t = Tensor::from_fn(t.rows(), t.cols(), || {
                v += 1.7;
                v
            });
        }
        grads
    }

    #[test]
    fn test_clipped_values_are_in_bounds() {
        let mut grads = spread_grads();
        clip_gradients(&mut grads, GRAD_CLIP);
        for (name, t) in grads.iter() {
            assert!(
                t.data.iter().all(|&v| (-GRAD_CLIP..=GRAD_CLIP).contains(&v)),
                "{} out of range",
                name
            );
        }
    }

    #[test]
    fn test_clipping_is_idempotent() {
        let mut once = spread_grads();
        clip_gradients(&mut once, GRAD_CLIP);
        let mut twice = once.clone();
        clip_gradients(&mut twice, GRAD_CLIP);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_values_inside_range_untouched() {
        let mut grads = ParamSet::zeros(&LstmConfig::tiny(2));
        grads.w_cand.data[3] = -4.99;
        grads.b_input.data[0] = 0.25;
        let before = grads.clone();
        clip_gradients(&mut grads, GRAD_CLIP);
        assert_eq!(grads, before);
    }

    #[test]
    fn test_grad_norm() {
        let mut grads = ParamSet::zeros(&LstmConfig::tiny(2));
        grads.w_embed.data[0] = 3.0;
        grads.b_proj.data[1] = 4.0;
        assert_relative_eq!(compute_grad_norm(&grads), 5.0);
    }
}
