//! Activation Functions
//!
//! Element-wise non-linearities used by the LSTM gates and the output layer,
//! together with the derivatives the backward pass needs.
//!
//! ## Derivatives in terms of the output
//!
//! Both gate non-linearities have derivatives that can be written using only
//! their own output, which is what the forward pass caches:
//!
//! ```text
//! y = σ(x)     =>  dy/dx = y · (1 - y)
//! y = tanh(x)  =>  dy/dx = 1 - y²
//! ```
//!
//! So [`dsigmoid`] and [`dtanh`] take the *activated* value, never the
//! pre-activation.
//!
//! ## Softmax
//!
//! [`softmax`] subtracts the maximum logit before exponentiating:
//!
//! ```text
//! softmax(x)[i] = exp(x[i] - max(x)) / Σ exp(x[j] - max(x))
//! ```
//!
//! The shift cancels in the ratio but keeps `exp` from overflowing.

use crate::tensor::Tensor;

/// Logistic sigmoid, element-wise
pub fn sigmoid(x: &Tensor) -> Tensor {
    x.map(|v| 1.0 / (1.0 + (-v).exp()))
}

/// Sigmoid derivative given the sigmoid's output `y`
pub fn dsigmoid(y: &Tensor) -> Tensor {
    y.map(|v| v * (1.0 - v))
}

/// Hyperbolic tangent, element-wise
pub fn tanh(x: &Tensor) -> Tensor {
    x.map(f64::tanh)
}

/// Tanh derivative given the tanh's output `y`
pub fn dtanh(y: &Tensor) -> Tensor {
    y.map(|v| 1.0 - v * v)
}

/// Numerically stable softmax over all elements of `x`
pub fn softmax(x: &Tensor) -> Tensor {
    let max = x.data.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let exp_values = x.map(|v| (v - max).exp());
    let sum = exp_values.sum();
    exp_values.map(|v| v / sum)
}
