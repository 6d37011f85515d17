//! LSTM Parameter Store
//!
//! This module owns every trainable number in the model and the configuration
//! that fixes their shapes.
//!
//! ## Parameters
//!
//! ```text
//! w_embed   [emb_size, vocab_size]       character embedding
//! w_forget  [hidden, hidden + emb_size]  forget gate
//! w_input   [hidden, hidden + emb_size]  input gate
//! w_output  [hidden, hidden + emb_size]  output gate
//! w_cand    [hidden, hidden + emb_size]  candidate memory
//! b_forget, b_input, b_output, b_cand   [hidden, 1]
//! w_proj    [vocab_size, hidden]         hidden -> logits
//! b_proj    [vocab_size, 1]
//! ```
//!
//! Every gate reads the concatenated column `z = [h_prev; embedding]`, so the
//! first `hidden` columns of a gate matrix act on the previous hidden state
//! and the remaining `emb_size` columns act on the embedded character.
//!
//! ## One structure, three roles
//!
//! [`ParamSet`] is used for the parameter values, for their gradients and for
//! the optimizer's squared-gradient memory. All three are addressed through
//! the same [`ParamName`] key and iterated in [`ParamName::ALL`] order, which
//! is what keeps a weight, its gradient and its memory slot aligned.

use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Standard deviation for embedding and gate weight initialisation
const WEIGHT_INIT_STD: f64 = 0.1;
/// Standard deviation for the output projection
const PROJ_INIT_STD: f64 = 0.01;

/// Model dimensions
///
/// - `vocab_size`: Number of distinct characters
/// - `emb_size`: Width of the learned character embedding
/// - `hidden_size`: Width of the hidden and cell state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LstmConfig {
    pub vocab_size: usize,
    pub emb_size: usize,
    pub hidden_size: usize,
}

impl LstmConfig {
    /// The reference configuration: 4-wide embeddings, 32 hidden units
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            emb_size: 4,
            hidden_size: 32,
        }
    }

    /// A very small model for tests and gradient checks
    pub fn tiny(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            emb_size: 3,
            hidden_size: 4,
        }
    }

    /// Rows of the concatenated `[h_prev; embedding]` column
    pub fn concat_size(&self) -> usize {
        self.hidden_size + self.emb_size
    }

    /// Total number of trainable scalars
    pub fn num_parameters(&self) -> usize {
        let gates = 4 * (self.hidden_size * self.concat_size() + self.hidden_size);
        let embed = self.emb_size * self.vocab_size;
        let proj = self.vocab_size * self.hidden_size + self.vocab_size;
        gates + embed + proj
    }
}

/// Key for one trainable tensor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamName {
    WForget,
    WInput,
    WOutput,
    WCand,
    BForget,
    BInput,
    BOutput,
    BCand,
    WEmbed,
    WProj,
    BProj,
}

impl ParamName {
    /// Every parameter, in the order the optimizer and the checker visit them
    pub const ALL: [ParamName; 11] = [
        ParamName::WForget,
        ParamName::WInput,
        ParamName::WOutput,
        ParamName::WCand,
        ParamName::BForget,
        ParamName::BInput,
        ParamName::BOutput,
        ParamName::BCand,
        ParamName::WEmbed,
        ParamName::WProj,
        ParamName::BProj,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamName::WForget => "w_forget",
            ParamName::WInput => "w_input",
            ParamName::WOutput => "w_output",
            ParamName::WCand => "w_cand",
            ParamName::BForget => "b_forget",
            ParamName::BInput => "b_input",
            ParamName::BOutput => "b_output",
            ParamName::BCand => "b_cand",
            ParamName::WEmbed => "w_embed",
            ParamName::WProj => "w_proj",
            ParamName::BProj => "b_proj",
        }
    }
}

impl std::fmt::Display for ParamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tensor per [`ParamName`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    pub w_forget: Tensor,
    pub w_input: Tensor,
    pub w_output: Tensor,
    pub w_cand: Tensor,
    pub b_forget: Tensor,
    pub b_input: Tensor,
    pub b_output: Tensor,
    pub b_cand: Tensor,
    pub w_embed: Tensor,
    pub w_proj: Tensor,
    pub b_proj: Tensor,
}

impl ParamSet {
    /// All-zero tensors shaped for `config`
    pub fn zeros(config: &LstmConfig) -> Self {
        let h = config.hidden_size;
        let z = config.concat_size();
        let v = config.vocab_size;
        Self {
            w_forget: Tensor::zeros(h, z),
            w_input: Tensor::zeros(h, z),
            w_output: Tensor::zeros(h, z),
            w_cand: Tensor::zeros(h, z),
            b_forget: Tensor::zeros(h, 1),
            b_input: Tensor::zeros(h, 1),
            b_output: Tensor::zeros(h, 1),
            b_cand: Tensor::zeros(h, 1),
            w_embed: Tensor::zeros(config.emb_size, v),
            w_proj: Tensor::zeros(v, h),
            b_proj: Tensor::zeros(v, 1),
        }
    }

    /// Random initialisation from a seeded generator
    ///
    /// Embedding and gate weights are drawn from N(0, 0.1²), the output
    /// projection from N(0, 0.01²) so the initial prediction is close to
    /// uniform. Biases start at zero. The same seed always produces the same
    /// parameters.
    pub fn init(config: &LstmConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let weight = Normal::new(0.0, WEIGHT_INIT_STD).unwrap();
        let proj = Normal::new(0.0, PROJ_INIT_STD).unwrap();

        let h = config.hidden_size;
        let z = config.concat_size();
        let v = config.vocab_size;

        let w_embed = Tensor::from_fn(config.emb_size, v, || weight.sample(&mut rng));
        let w_forget = Tensor::from_fn(h, z, || weight.sample(&mut rng));
        let w_input = Tensor::from_fn(h, z, || weight.sample(&mut rng));
        let w_output = Tensor::from_fn(h, z, || weight.sample(&mut rng));
        let w_cand = Tensor::from_fn(h, z, || weight.sample(&mut rng));
        let w_proj = Tensor::from_fn(v, h, || proj.sample(&mut rng));

        Self {
            w_forget,
            w_input,
            w_output,
            w_cand,
            b_forget: Tensor::zeros(h, 1),
            b_input: Tensor::zeros(h, 1),
            b_output: Tensor::zeros(h, 1),
            b_cand: Tensor::zeros(h, 1),
            w_embed,
            w_proj,
            b_proj: Tensor::zeros(v, 1),
        }
    }

    /// Zero tensors with the same shapes as `self`
    pub fn zeros_like(&self) -> Self {
        Self {
            w_forget: self.w_forget.zeros_like(),
            w_input: self.w_input.zeros_like(),
            w_output: self.w_output.zeros_like(),
            w_cand: self.w_cand.zeros_like(),
            b_forget: self.b_forget.zeros_like(),
            b_input: self.b_input.zeros_like(),
            b_output: self.b_output.zeros_like(),
            b_cand: self.b_cand.zeros_like(),
            w_embed: self.w_embed.zeros_like(),
            w_proj: self.w_proj.zeros_like(),
            b_proj: self.b_proj.zeros_like(),
        }
    }

    pub fn get(&self, name: ParamName) -> &Tensor {
        match name {
            ParamName::WForget => &self.w_forget,
            ParamName::WInput => &self.w_input,
            ParamName::WOutput => &self.w_output,
            ParamName::WCand => &self.w_cand,
            ParamName::BForget => &self.b_forget,
            ParamName::BInput => &self.b_input,
            ParamName::BOutput => &self.b_output,
            ParamName::BCand => &self.b_cand,
            ParamName::WEmbed => &self.w_embed,
            ParamName::WProj => &self.w_proj,
            ParamName::BProj => &self.b_proj,
        }
    }

    pub fn get_mut(&mut self, name: ParamName) -> &mut Tensor {
        match name {
            ParamName::WForget => &mut self.w_forget,
            ParamName::WInput => &mut self.w_input,
            ParamName::WOutput => &mut self.w_output,
            ParamName::WCand => &mut self.w_cand,
            ParamName::BForget => &mut self.b_forget,
            ParamName::BInput => &mut self.b_input,
            ParamName::BOutput => &mut self.b_output,
            ParamName::BCand => &mut self.b_cand,
            ParamName::WEmbed => &mut self.w_embed,
            ParamName::WProj => &mut self.w_proj,
            ParamName::BProj => &mut self.b_proj,
        }
    }

    /// `(name, tensor)` pairs in [`ParamName::ALL`] order
    pub fn iter(&self) -> impl Iterator<Item = (ParamName, &Tensor)> {
        ParamName::ALL.into_iter().map(move |name| (name, self.get(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes_follow_config() {
        let config = LstmConfig {
            vocab_size: 7,
            emb_size: 3,
            hidden_size: 5,
        };
        let params = ParamSet::init(&config, 1);

        assert_eq!(params.w_embed.shape, vec![3, 7]);
        for name in [
            ParamName::WForget,
            ParamName::WInput,
            ParamName::WOutput,
            ParamName::WCand,
        ] {
            assert_eq!(params.get(name).shape, vec![5, 8]);
        }
        assert_eq!(params.b_cand.shape, vec![5, 1]);
        assert_eq!(params.w_proj.shape, vec![7, 5]);
        assert_eq!(params.b_proj.shape, vec![7, 1]);

        let total: usize = params.iter().map(|(_, t)| t.len()).sum();
        assert_eq!(total, config.num_parameters());
    }

    #[test]
    fn test_init_is_reproducible() {
        let config = LstmConfig::tiny(5);
        assert_eq!(ParamSet::init(&config, 42), ParamSet::init(&config, 42));
        assert_ne!(ParamSet::init(&config, 42), ParamSet::init(&config, 43));
    }

    #[test]
    fn test_biases_start_at_zero() {
        let params = ParamSet::init(&LstmConfig::tiny(4), 3);
        for name in [
            ParamName::BForget,
            ParamName::BInput,
            ParamName::BOutput,
            ParamName::BCand,
            ParamName::BProj,
        ] {
            assert!(params.get(name).data.iter().all(|&v| v == 0.0), "{}", name);
        }
    }

    #[test]
    fn test_get_mut_addresses_same_slot_as_get() {
        let mut params = ParamSet::zeros(&LstmConfig::tiny(3));
        for (i, name) in ParamName::ALL.into_iter().enumerate() {
            params.get_mut(name).data[0] = i as f64 + 1.0;
        }
        for (i, (name, tensor)) in params.iter().enumerate() {
            assert_eq!(tensor.data[0], i as f64 + 1.0, "{}", name);
        }
    }
}
