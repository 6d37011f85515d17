//! LSTM Cell
//!
//! One timestep of the recurrence, forward and backward. The sequence-level
//! forward pass, backpropagation through time and the sampler all call into
//! this module, so the gate equations exist in exactly one place.
//!
//! ## Forward
//!
//! ```text
//! e = W_embed · x                       (x is the one-hot input)
//! z = [h_prev; e]
//! f = σ(W_forget · z + b_forget)
//! i = σ(W_input  · z + b_input)
//! ĉ = tanh(W_cand · z + b_cand)
//! c = f ⊙ c_prev + i ⊙ ĉ
//! o = σ(W_output · z + b_output)
//! h = o ⊙ tanh(c)
//! ```
//!
//! ## Backward
//!
//! Given `dh` (from the output layer plus the future timestep) and `dc_next`
//! (from the future timestep), with σ' and tanh' evaluated on cached outputs:
//!
//! ```text
//! do = σ'(o) ⊙ dh ⊙ tanh(c)
//! dc = o ⊙ dh ⊙ tanh'(tanh(c)) + dc_next
//! df = σ'(f) ⊙ c_prev ⊙ dc
//! di = σ'(i) ⊙ ĉ ⊙ dc
//! dĉ = tanh'(ĉ) ⊙ i ⊙ dc
//!
//! dz = W_output^T·do + W_input^T·di + W_forget^T·df + W_cand^T·dĉ
//! dh_prev = dz[..hidden]        de = dz[hidden..]
//! dc_prev = f ⊙ dc
//! ```
//!
//! The cell state is cached before the tanh, so the backward pass re-applies
//! tanh to it before taking the tanh derivative.

use super::activation::{dsigmoid, dtanh, sigmoid, tanh};
use crate::model::ParamSet;
use crate::tensor::Tensor;

/// The `(hidden, cell)` pair carried between timesteps and between chunks
#[derive(Clone, Debug, PartialEq)]
pub struct RecurrentState {
    pub hidden: Tensor,
    pub cell: Tensor,
}

impl RecurrentState {
    /// All-zero state: what every pass over the corpus starts from
    pub fn zeros(hidden_size: usize) -> Self {
        Self {
            hidden: Tensor::zeros(hidden_size, 1),
            cell: Tensor::zeros(hidden_size, 1),
        }
    }
}

/// Everything one cell step computes, kept for the backward pass
#[derive(Clone, Debug)]
pub struct CellCache {
    /// One-hot input column `[vocab, 1]`
    pub x: Tensor,
    /// Embedded input `[emb, 1]`
    pub embedded: Tensor,
    /// `[h_prev; embedded]`, `[hidden + emb, 1]`
    pub concat: Tensor,
    pub forget: Tensor,
    pub input: Tensor,
    pub output: Tensor,
    pub cand: Tensor,
    /// New cell state (before tanh)
    pub cell: Tensor,
    /// New hidden state
    pub hidden: Tensor,
}

/// Gradients leaving a cell step towards the previous timestep
pub struct CellGradients {
    pub hidden_prev: Tensor,
    pub cell_prev: Tensor,
}

/// Run one step of the recurrence
///
/// `x` is the one-hot column for the current character.
pub fn cell_forward(params: &ParamSet, x: &Tensor, prev: &RecurrentState) -> CellCache {
    let embedded = params.w_embed.matmul(x);
    let concat = prev.hidden.concat_rows(&embedded);

    let forget = sigmoid(&params.w_forget.matmul(&concat).add(&params.b_forget));
    let input = sigmoid(&params.w_input.matmul(&concat).add(&params.b_input));
    let cand = tanh(&params.w_cand.matmul(&concat).add(&params.b_cand));
    let cell = forget.mul(&prev.cell).add(&input.mul(&cand));
    let output = sigmoid(&params.w_output.matmul(&concat).add(&params.b_output));
    let hidden = output.mul(&tanh(&cell));

    CellCache {
        x: x.clone(),
        embedded,
        concat,
        forget,
        input,
        output,
        cand,
        cell,
        hidden,
    }
}

/// Backpropagate one step and accumulate gate and embedding gradients
///
/// # Arguments
///
/// * `params` - Current parameters (for the transposed gate matrices)
/// * `cache` - This step's forward cache
/// * `cell_prev` - Cell state the step started from
/// * `dhidden` - Total gradient on this step's hidden state
/// * `dcell_next` - Gradient on this step's cell state from the future
/// * `grads` - Accumulators, summed into
pub fn cell_backward(
    params: &ParamSet,
    cache: &CellCache,
    cell_prev: &Tensor,
    dhidden: &Tensor,
    dcell_next: &Tensor,
    grads: &mut ParamSet,
) -> CellGradients {
    let tanh_cell = tanh(&cache.cell);

    // Pre-activation gradients of the four gates
    let d_output = dsigmoid(&cache.output).mul(dhidden).mul(&tanh_cell);
    let dcell = cache
        .output
        .mul(dhidden)
        .mul(&dtanh(&tanh_cell))
        .add(dcell_next);
    let d_forget = dsigmoid(&cache.forget).mul(cell_prev).mul(&dcell);
    let d_input = dsigmoid(&cache.input).mul(&cache.cand).mul(&dcell);
    let d_cand = dtanh(&cache.cand).mul(&cache.input).mul(&dcell);

    grads.w_output.add_outer(&d_output, &cache.concat);
    grads.w_forget.add_outer(&d_forget, &cache.concat);
    grads.w_input.add_outer(&d_input, &cache.concat);
    grads.w_cand.add_outer(&d_cand, &cache.concat);

    grads.b_output.add_assign(&d_output);
    grads.b_forget.add_assign(&d_forget);
    grads.b_input.add_assign(&d_input);
    grads.b_cand.add_assign(&d_cand);

    // Back into [h_prev; embedded] space
    let mut dconcat = params.w_output.transpose().matmul(&d_output);
    dconcat.add_assign(&params.w_input.transpose().matmul(&d_input));
    dconcat.add_assign(&params.w_forget.transpose().matmul(&d_forget));
    dconcat.add_assign(&params.w_cand.transpose().matmul(&d_cand));

    let hidden_size = cache.hidden.rows();
    let hidden_prev = dconcat.slice_rows(0, hidden_size);
    let dembedded = dconcat.slice_rows(hidden_size, dconcat.rows());
    grads.w_embed.add_outer(&dembedded, &cache.x);

    CellGradients {
        hidden_prev,
        cell_prev: cache.forget.mul(&dcell),
    }
}
