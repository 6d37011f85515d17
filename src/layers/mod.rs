//! Building Blocks of the LSTM
//!
//! - **activation**: sigmoid, tanh, softmax and the derivatives used in BPTT
//! - **cell**: one LSTM timestep, forward and backward
//!
//! ## Design Pattern
//!
//! Every trainable piece follows the same shape:
//!
//! ```rust,ignore
//! pub fn cell_forward(params, x, prev) -> CellCache { }
//! pub fn cell_backward(params, cache, ..., grads: &mut ParamSet) -> CellGradients { }
//! ```
//!
//! The forward pass returns a cache holding whatever the backward pass needs;
//! the backward pass reads the cache and adds into gradient accumulators that
//! have the same layout as the parameters.

pub mod activation;
pub mod cell;

pub use activation::{dsigmoid, dtanh, sigmoid, softmax, tanh};
pub use cell::{cell_backward, cell_forward, CellCache, CellGradients, RecurrentState};
