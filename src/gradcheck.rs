//! Numerical Gradient Check
//!
//! Validates the hand-derived backward pass against finite differences.
//!
//! ## Method
//!
//! For every scalar θ in every parameter tensor:
//!
//! ```text
//! numeric  = (L(θ + δ) - L(θ - δ)) / 2δ        δ = 0.001
//! analytic = backward(forward(chunk))[θ]       (unclipped)
//! rel_err  = |analytic - numeric| / |analytic + numeric|
//! ```
//!
//! Any element with `rel_err > 0.01` is reported as a warning. Warnings are
//! not fatal: the check always visits every element so one run shows every
//! problem at once.
//!
//! ## Cost
//!
//! Two full forward passes per scalar parameter. Use a small model and a
//! short chunk; this is a diagnostic, never part of training.
//!
//! ## Mutation
//!
//! Each element is perturbed in place and restored before the next one is
//! touched. The model is borrowed mutably for the whole check, so nothing
//! else can observe a perturbed weight.

use crate::error::{LstmError, Result};
use crate::layers::RecurrentState;
use crate::lstm::TrainableLstm;
use crate::model::ParamName;
use std::fmt;

/// Perturbation size for central differences
pub const DEFAULT_DELTA: f64 = 1e-3;
/// Relative error above which an element is reported
pub const REL_ERROR_THRESHOLD: f64 = 0.01;

/// Outcome for one parameter tensor
#[derive(Clone, Debug)]
pub struct ParamCheck {
    pub name: ParamName,
    /// Elements compared
    pub checked: usize,
    /// Elements whose relative error exceeded the threshold
    pub failed: usize,
    /// Largest relative error seen (ignoring NaN)
    pub max_rel_error: f64,
}

/// Outcome of a full check, in [`ParamName::ALL`] order
#[derive(Clone, Debug, Default)]
pub struct GradCheckReport {
    pub params: Vec<ParamCheck>,
}

impl GradCheckReport {
    pub fn total_checked(&self) -> usize {
        self.params.iter().map(|p| p.checked).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.params.iter().map(|p| p.failed).sum()
    }

    /// Fraction of elements within the threshold
    pub fn pass_rate(&self) -> f64 {
        let checked = self.total_checked();
        if checked == 0 {
            return 1.0;
        }
        1.0 - self.total_failed() as f64 / checked as f64
    }
}

impl fmt::Display for GradCheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in &self.params {
            writeln!(
                f,
                "{:<9} checked {:>6}  failed {:>4}  max rel error {:.3e}",
                p.name.as_str(),
                p.checked,
                p.failed,
                p.max_rel_error
            )?;
        }
        write!(
            f,
            "total: {} of {} elements within {} ({:.2}%)",
            self.total_checked() - self.total_failed(),
            self.total_checked(),
            REL_ERROR_THRESHOLD,
            self.pass_rate() * 100.0
        )
    }
}

/// `|a - n| / |a + n|`, with two exact zeros counting as agreement
pub fn relative_error(analytic: f64, numeric: f64) -> f64 {
    if analytic == 0.0 && numeric == 0.0 {
        return 0.0;
    }
    (analytic - numeric).abs() / (analytic + numeric).abs()
}

/// Compare analytic and numerical gradients for every parameter element
///
/// # Arguments
///
/// * `model` - Model to check; every weight is restored before returning
/// * `inputs`, `targets` - The chunk to differentiate the loss over
/// * `state` - Initial `(hidden, cell)` state, held fixed for every evaluation
/// * `delta` - Perturbation size (see [`DEFAULT_DELTA`])
///
/// # Errors
///
/// - Anything [`TrainableLstm::forward`] rejects
/// - [`LstmError::ShapeMismatch`] if a gradient doesn't match its weight,
///   detected before any element is perturbed
pub fn gradient_check(
    model: &mut TrainableLstm,
    inputs: &[usize],
    targets: &[usize],
    state: &RecurrentState,
    delta: f64,
) -> Result<GradCheckReport> {
    let out = model.forward(inputs, targets, state)?;
    let grads = model.backward(&out.cache, false);

    for name in ParamName::ALL {
        let (weight, grad) = (model.params().get(name), grads.get(name));
        if weight.shape != grad.shape {
            return Err(LstmError::ShapeMismatch {
                name: name.as_str(),
                weight: weight.shape.clone(),
                grad: grad.shape.clone(),
            });
        }
    }

    let mut report = GradCheckReport::default();

    for name in ParamName::ALL {
        println!("{}", name);
        let size = model.params().get(name).len();
        let mut check = ParamCheck {
            name,
            checked: 0,
            failed: 0,
            max_rel_error: 0.0,
        };

        for i in 0..size {
            let original = model.params().get(name).data[i];

            model.params_mut().get_mut(name).data[i] = original + delta;
            let loss_positive = model.loss(inputs, targets, state);
            model.params_mut().get_mut(name).data[i] = original - delta;
            let loss_negative = model.loss(inputs, targets, state);
            model.params_mut().get_mut(name).data[i] = original;

            let grad_numerical = (loss_positive? - loss_negative?) / (2.0 * delta);
            let grad_analytic = grads.get(name).data[i];
            let rel_error = relative_error(grad_analytic, grad_numerical);

            check.checked += 1;
            if rel_error > check.max_rel_error {
                check.max_rel_error = rel_error;
            }
            if rel_error > REL_ERROR_THRESHOLD {
                check.failed += 1;
                println!(
                    "WARNING {:.6}, {:.6} => {:e}",
                    grad_numerical, grad_analytic, rel_error
                );
            }
        }

        report.params.push(check);
    }

    Ok(report)
}
