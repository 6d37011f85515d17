//! Training Logger
//!
//! Tracks training metrics on the console and, optionally, in a CSV file for
//! later plotting.
//!
//! ## Example
//!
//! ```rust,no_run
//! use char_lstm::TrainingLogger;
//!
//! let mut logger = TrainingLogger::new("training_log.csv")?;
//! logger.log(100, 0.05, 180.2, 201.7, 64, 3.1, Some("to be or not"))?;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! ## CSV Format
//!
//! - `step`: Update number
//! - `elapsed_seconds`: Time since the logger was created
//! - `learning_rate`: Base learning rate
//! - `loss`: Loss of the most recent chunk (summed over its characters)
//! - `smooth_loss`: Exponential moving average of the chunk loss
//! - `perplexity`: `exp(smooth_loss / seq_length)`, per character
//! - `grad_norm`: L2 norm of the gradient before clipping
//! - `sample`: Generated text, if any
//!
//! ## Perplexity
//!
//! Per-character perplexity is how many characters the model is effectively
//! choosing between. An untrained model sits at the vocabulary size; a model
//! that has memorised a deterministic sequence approaches 1.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// Console and CSV logger for training progress
pub struct TrainingLogger {
    log_file: Option<File>,
    start_time: Instant,
    last_log_time: Instant,
}

impl TrainingLogger {
    /// Create a logger that also writes a CSV file at `log_path`
    pub fn new<P: AsRef<Path>>(log_path: P) -> std::io::Result<Self> {
        let mut log_file = File::create(log_path)?;

        writeln!(
            log_file,
            "step,elapsed_seconds,learning_rate,loss,smooth_loss,perplexity,grad_norm,sample"
        )?;

        let now = Instant::now();
        Ok(Self {
            log_file: Some(log_file),
            start_time: now,
            last_log_time: now,
        })
    }

    /// Create a logger that only prints to the console
    pub fn console() -> Self {
        let now = Instant::now();
        Self {
            log_file: None,
            start_time: now,
            last_log_time: now,
        }
    }

    /// Record one training step
    ///
    /// # Arguments
    ///
    /// * `step` - Update number
    /// * `learning_rate` - Base learning rate
    /// * `loss` - Loss of the current chunk
    /// * `smooth_loss` - Smoothed loss
    /// * `seq_length` - Characters per chunk, for per-character perplexity
    /// * `grad_norm` - Gradient norm before clipping
    /// * `sample` - Optional generated text
    #[allow(clippy::too_many_arguments)]
    pub fn log(
        &mut self,
        step: usize,
        learning_rate: f64,
        loss: f64,
        smooth_loss: f64,
        seq_length: usize,
        grad_norm: f64,
        sample: Option<&str>,
    ) -> std::io::Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let perplexity = (smooth_loss / seq_length.max(1) as f64).exp();

        if let Some(file) = self.log_file.as_mut() {
            let sample_escaped = sample.map(|s| s.replace('"', "\"\"")).unwrap_or_default();
            writeln!(
                file,
                "{},{:.2},{:.6},{:.4},{:.4},{:.4},{:.4},\"{}\"",
                step,
                elapsed,
                learning_rate,
                loss,
                smooth_loss,
                perplexity,
                grad_norm,
                sample_escaped
            )?;
            // Keep the file complete if training is interrupted
            file.flush()?;
        }

        let step_time = self.last_log_time.elapsed().as_secs_f64();
        println!(
            "iter {:6} | Time: {:7.1}s (+{:.1}s) | loss: {:.6} | ppl: {:.3} | Grad norm: {:.3}",
            step, elapsed, step_time, smooth_loss, perplexity, grad_norm
        );

        if let Some(text) = sample {
            println!("----\n {} \n----", text);
        }

        self.last_log_time = Instant::now();
        Ok(())
    }
}
