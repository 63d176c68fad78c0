// External imports
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal imports
use crate::constants::{
    DEFAULT_INPUT_SIZE, DEFAULT_KEEP_PROB, DEFAULT_LOGS_DIR, DEFAULT_LSTM_SIZE,
    DEFAULT_NUM_LAYERS, DEFAULT_NUM_STEPS, DEFAULT_PLOTS_DIR, EMBED_DISABLED,
};

/// Errors raised while building or validating a model configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("stock count must be a positive integer, got {0}")]
    InvalidStockCount(usize),
    #[error("{0} must be a positive integer")]
    ZeroField(&'static str),
    #[error("keep probability must be in (0.0, 1.0], got {0}")]
    InvalidKeepProb(f64),
}

/// Hyperparameters for one training run, fixed at construction.
///
/// Holds everything the network constructor needs: how many symbols are
/// trained jointly, the temporal window shape, the cell-stack geometry, the
/// optional per-stock embedding width, and where run artifacts land on disk.
///
/// Embedding is active iff a width greater than zero was supplied; when
/// inactive the stored width is the `EMBED_DISABLED` sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RnnConfig {
    pub stock_count: usize,
    pub lstm_size: usize,
    pub num_layers: usize,
    pub num_steps: usize,
    pub input_size: usize,
    pub keep_prob: f64,
    embed_size: i64,
    pub logs_dir: PathBuf,
    pub plots_dir: PathBuf,
}

impl Default for RnnConfig {
    fn default() -> Self {
        Self {
            stock_count: 1,
            lstm_size: DEFAULT_LSTM_SIZE,
            num_layers: DEFAULT_NUM_LAYERS,
            num_steps: DEFAULT_NUM_STEPS,
            input_size: DEFAULT_INPUT_SIZE,
            keep_prob: DEFAULT_KEEP_PROB,
            embed_size: EMBED_DISABLED,
            logs_dir: PathBuf::from(DEFAULT_LOGS_DIR),
            plots_dir: PathBuf::from(DEFAULT_PLOTS_DIR),
        }
    }
}

impl RnnConfig {
    /// Create a configuration for `stock_count` jointly trained symbols.
    ///
    /// Rejects a non-positive count; every other field starts at its default
    /// and can be adjusted with the `with_*` setters before the network is
    /// built.
    pub fn new(stock_count: usize) -> Result<Self, ConfigError> {
        if stock_count == 0 {
            return Err(ConfigError::InvalidStockCount(stock_count));
        }
        Ok(Self {
            stock_count,
            ..Self::default()
        })
    }

    pub fn with_lstm_size(mut self, lstm_size: usize) -> Self {
        self.lstm_size = lstm_size;
        self
    }

    pub fn with_num_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    pub fn with_num_steps(mut self, num_steps: usize) -> Self {
        self.num_steps = num_steps;
        self
    }

    pub fn with_input_size(mut self, input_size: usize) -> Self {
        self.input_size = input_size;
        self
    }

    pub fn with_keep_prob(mut self, keep_prob: f64) -> Self {
        self.keep_prob = keep_prob;
        self
    }

    /// Set the per-stock embedding width.
    ///
    /// `None` or `Some(0)` disables embeddings and stores the sentinel.
    pub fn with_embed_size(mut self, embed_size: Option<usize>) -> Self {
        self.embed_size = match embed_size {
            Some(e) if e > 0 => e as i64,
            _ => EMBED_DISABLED,
        };
        self
    }

    pub fn with_logs_dir(mut self, logs_dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = logs_dir.into();
        self
    }

    pub fn with_plots_dir(mut self, plots_dir: impl Into<PathBuf>) -> Self {
        self.plots_dir = plots_dir.into();
        self
    }

    /// Whether the per-stock embedding path is active.
    pub fn use_embed(&self) -> bool {
        self.embed_size > 0
    }

    /// Stored embedding width: the supplied value when active, the
    /// `EMBED_DISABLED` sentinel otherwise.
    pub fn embed_size(&self) -> i64 {
        self.embed_size
    }

    /// Active embedding width, if any.
    pub fn embed_dim(&self) -> Option<usize> {
        if self.embed_size > 0 {
            Some(self.embed_size as usize)
        } else {
            None
        }
    }

    /// Width of the features each time step feeds into the cell stack.
    pub fn feature_size(&self) -> usize {
        self.input_size + self.embed_dim().unwrap_or(0)
    }

    /// Check every field the network constructor depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stock_count == 0 {
            return Err(ConfigError::InvalidStockCount(self.stock_count));
        }
        if self.lstm_size == 0 {
            return Err(ConfigError::ZeroField("lstm_size"));
        }
        if self.num_layers == 0 {
            return Err(ConfigError::ZeroField("num_layers"));
        }
        if self.num_steps == 0 {
            return Err(ConfigError::ZeroField("num_steps"));
        }
        if self.input_size == 0 {
            return Err(ConfigError::ZeroField("input_size"));
        }
        if !(self.keep_prob > 0.0 && self.keep_prob <= 1.0) {
            return Err(ConfigError::InvalidKeepProb(self.keep_prob));
        }
        Ok(())
    }

    /// Create the log and snapshot directories if they are missing.
    pub fn ensure_output_dirs(&self) -> std::io::Result<()> {
        create_dir_if_missing(&self.logs_dir)?;
        create_dir_if_missing(&self.plots_dir)
    }
}

fn create_dir_if_missing(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn embed_disabled_without_size() {
        let config = RnnConfig::new(3).unwrap();
        assert!(!config.use_embed());
        assert_eq!(config.embed_size(), EMBED_DISABLED);

        let config = config.with_embed_size(None);
        assert!(!config.use_embed());
        assert_eq!(config.embed_size(), EMBED_DISABLED);

        let config = config.with_embed_size(Some(0));
        assert!(!config.use_embed());
        assert_eq!(config.embed_size(), EMBED_DISABLED);
    }

    #[test]
    fn embed_enabled_for_positive_size() {
        let config = RnnConfig::new(3).unwrap().with_embed_size(Some(8));
        assert!(config.use_embed());
        assert_eq!(config.embed_size(), 8);
        assert_eq!(config.embed_dim(), Some(8));
        assert_eq!(config.feature_size(), DEFAULT_INPUT_SIZE + 8);
    }

    #[test]
    fn fields_stored_unchanged() {
        let config = RnnConfig::new(7)
            .unwrap()
            .with_num_steps(12)
            .with_input_size(4)
            .with_lstm_size(64)
            .with_num_layers(2);
        assert_eq!(config.stock_count, 7);
        assert_eq!(config.num_steps, 12);
        assert_eq!(config.input_size, 4);
        assert_eq!(config.lstm_size, 64);
        assert_eq!(config.num_layers, 2);
    }

    #[test]
    fn zero_stock_count_rejected() {
        assert!(matches!(
            RnnConfig::new(0),
            Err(ConfigError::InvalidStockCount(0))
        ));
    }

    #[test]
    fn validate_catches_bad_fields() {
        let config = RnnConfig::new(1).unwrap().with_lstm_size(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroField("lstm_size"))
        ));

        let config = RnnConfig::new(1).unwrap().with_keep_prob(0.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidKeepProb(_))
        ));

        let config = RnnConfig::new(1).unwrap().with_keep_prob(1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn output_dirs_created_on_demand() {
        let temp = tempdir().unwrap();
        let logs = temp.path().join("logs");
        let plots = temp.path().join("imgs");
        let config = RnnConfig::new(1)
            .unwrap()
            .with_logs_dir(&logs)
            .with_plots_dir(&plots);
        assert!(!logs.exists());
        config.ensure_output_dirs().unwrap();
        assert!(logs.is_dir());
        assert!(plots.is_dir());
    }
}
