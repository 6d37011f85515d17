//! Train, check, or sample from a character-level LSTM
//!
//! ## Usage
//!
//! ```bash
//! # Train on input.txt with the reference hyperparameters
//! cargo run --release -- train --data input.txt
//!
//! # Shorter run, CSV log and a checkpoint at the end
//! cargo run --release -- train --max-updates 20000 --log training_log.csv --save model.json
//!
//! # Continue training a saved model
//! cargo run --release -- train --checkpoint model.json --save model.json
//!
//! # Validate the hand-derived gradients on the first chunk of the corpus
//! cargo run --release -- gradcheck --hidden 8 --seq-length 10
//!
//! # Generate text from a checkpoint
//! cargo run --release -- generate --checkpoint model.json --length 500
//! ```

use char_lstm::{
    gradient_check, train_lstm, AdagradOptimizer, ChunkCursor, Checkpoint, CharVocab, LstmConfig,
    TrainableLstm, TrainingConfig, TrainingLogger, DEFAULT_DELTA,
};
use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Sweep the corpus with Adagrad
    Train,
    /// Compare analytic and numerical gradients
    Gradcheck,
    /// Sample text from a checkpoint
    Generate,
}

#[derive(Parser)]
#[command(
    name = "char-lstm",
    about = "Character-level LSTM with hand-derived backpropagation through time"
)]
struct Args {
    /// What to do
    #[arg(value_enum)]
    mode: Mode,

    /// Path to the training text
    #[arg(long, default_value = "input.txt")]
    data: String,

    // Model architecture (a checkpoint brings its own)
    /// Character embedding width
    #[arg(long, conflicts_with = "checkpoint")]
    emb: Option<usize>,

    /// Hidden and cell state width
    #[arg(long, conflicts_with = "checkpoint")]
    hidden: Option<usize>,

    // Training parameters
    /// Characters per chunk
    #[arg(long)]
    seq_length: Option<usize>,

    /// Adagrad learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Number of updates before stopping
    #[arg(long)]
    max_updates: Option<usize>,

    /// Seed for weight initialisation and sampling
    #[arg(long, default_value = "0")]
    seed: u64,

    // Outputs and checkpoints
    /// Write a CSV training log here
    #[arg(long)]
    log: Option<String>,

    /// Save a checkpoint here when training finishes
    #[arg(long)]
    save: Option<String>,

    /// Load model and vocabulary from a checkpoint
    #[arg(long)]
    checkpoint: Option<String>,

    /// Characters to generate
    #[arg(long, default_value = "200")]
    length: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let defaults = TrainingConfig::default();
    let config = TrainingConfig {
        seq_length: args.seq_length.unwrap_or(defaults.seq_length),
        learning_rate: args.lr.unwrap_or(defaults.learning_rate),
        max_updates: args.max_updates.unwrap_or(defaults.max_updates),
        seed: args.seed,
        ..defaults
    };

    match args.mode {
        Mode::Train => run_train(&args, &config),
        Mode::Gradcheck => run_gradcheck(&args, &config),
        Mode::Generate => run_generate(&args),
    }
}

fn read_corpus(path: &str) -> Result<String, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path).map_err(|e| format!("Cannot read {}: {}", path, e))?;
    println!("Loaded: {} ({} characters)", path, text.chars().count());
    Ok(text)
}

/// A fresh model sized for `vocab`, or the one stored in `--checkpoint`
fn build_model(
    args: &Args,
    text: &str,
) -> Result<(TrainableLstm, CharVocab), Box<dyn std::error::Error>> {
    if let Some(path) = &args.checkpoint {
        let (model, vocab, checkpoint) = Checkpoint::load(path)?;
        println!(
            "Resumed from {} (step {}, smooth loss {:.4})",
            path, checkpoint.step, checkpoint.smooth_loss
        );
        return Ok((model, vocab));
    }

    let vocab = CharVocab::from_text(text)?;
    let reference = LstmConfig::new(vocab.len());
    let model_config = LstmConfig {
        emb_size: args.emb.unwrap_or(reference.emb_size),
        hidden_size: args.hidden.unwrap_or(reference.hidden_size),
        ..reference
    };
    Ok((TrainableLstm::new(model_config, args.seed), vocab))
}

fn run_train(args: &Args, config: &TrainingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let text = read_corpus(&args.data)?;
    let (mut model, vocab) = build_model(args, &text)?;
    let tokens = vocab.encode(&text)?;

    let model_config = model.config();
    println!(
        "Vocabulary: {} characters | emb {} | hidden {} | {} parameters",
        vocab.len(),
        model_config.emb_size,
        model_config.hidden_size,
        model_config.num_parameters()
    );
    println!(
        "Training: seq_length {} | lr {} | {} updates\n",
        config.seq_length, config.learning_rate, config.max_updates
    );

    let mut optimizer = AdagradOptimizer::new(&model, config.learning_rate);
    let mut logger = match &args.log {
        Some(path) => TrainingLogger::new(path)?,
        None => TrainingLogger::console(),
    };

    let summary = train_lstm(&mut model, &mut optimizer, &tokens, &vocab, config, &mut logger)?;

    println!(
        "\nDone: {} updates, smooth loss {:.4} -> {:.4}",
        summary.updates, summary.initial_smooth_loss, summary.final_smooth_loss
    );

    if let Some(path) = &args.save {
        Checkpoint::new(&model, &vocab, summary.updates, summary.final_smooth_loss).save(path)?;
        println!("Saved checkpoint: {}", path);
    }

    Ok(())
}

fn run_gradcheck(args: &Args, config: &TrainingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let text = read_corpus(&args.data)?;
    let (mut model, vocab) = build_model(args, &text)?;
    let tokens = vocab.encode(&text)?;

    let chunk = ChunkCursor::new(&tokens, config.seq_length)?.next_chunk();
    let state = model.zero_state();
    println!(
        "Checking {} parameters on a {}-character chunk\n",
        model.config().num_parameters(),
        chunk.inputs.len()
    );

    let report = gradient_check(&mut model, chunk.inputs, chunk.targets, &state, DEFAULT_DELTA)?;
    println!("\n{}", report);
    Ok(())
}

fn run_generate(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let path = args
        .checkpoint
        .as_deref()
        .ok_or("generate needs --checkpoint <PATH>")?;
    let (model, vocab, _) = Checkpoint::load(path)?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let seed_index = rng.random_range(0..vocab.len());
    let text = model.sample_text(&vocab, &model.zero_state(), seed_index, args.length, &mut rng)?;

    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_dimensions_conflict_with_checkpoint() {
        for flag in ["--emb", "--hidden"] {
            let argv = ["char-lstm", "train", "--checkpoint", "model.json", flag, "8"];
            let result = Args::try_parse_from(argv);
            match result {
                Err(e) => assert_eq!(e.kind(), ErrorKind::ArgumentConflict, "{}", flag),
                Ok(_) => panic!("{} accepted together with --checkpoint", flag),
            }
        }
    }

    #[test]
    fn test_dimensions_accepted_without_checkpoint() {
        let args =
            Args::try_parse_from(["char-lstm", "train", "--emb", "8", "--hidden", "16"]).unwrap();
        assert_eq!(args.emb, Some(8));
        assert_eq!(args.hidden, Some(16));
        assert!(args.checkpoint.is_none());
        assert!(matches!(args.mode, Mode::Train));
    }

    #[test]
    fn test_checkpoint_alone_parses() {
        let args =
            Args::try_parse_from(["char-lstm", "generate", "--checkpoint", "model.json"]).unwrap();
        assert_eq!(args.checkpoint.as_deref(), Some("model.json"));
        assert_eq!(args.length, 200);
    }
}
