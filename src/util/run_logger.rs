use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RnnConfig;
use crate::lstm::step_3_model_arch::StockLstm;
use crate::lstm::step_4_train_model::TrainingConfig;

/// Record of one training run, written as JSON into the logs directory.
#[derive(Serialize, Deserialize)]
pub struct TrainingRun {
    pub timestamp: String,
    pub run_name: String,
    pub symbols: Vec<String>,
    pub stock_count: usize,
    pub lstm_size: usize,
    pub num_layers: usize,
    pub num_steps: usize,
    pub input_size: usize,
    pub embed_size: i64,
    pub keep_prob: f64,
    pub init_learning_rate: f64,
    pub learning_rate_decay: f64,
    pub init_epoch: usize,
    pub max_epoch: usize,
    pub batch_size: usize,
    pub train_losses: Vec<f64>,
    pub test_losses: Vec<f64>,
    pub final_test_rmse: Option<f64>,
    pub training_time_seconds: Option<f64>,
    pub notes: String,
}

impl TrainingRun {
    pub fn new(
        run_name: &str,
        symbols: Vec<String>,
        model_config: &RnnConfig,
        train_config: &TrainingConfig,
    ) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            run_name: run_name.to_string(),
            symbols,
            stock_count: model_config.stock_count,
            lstm_size: model_config.lstm_size,
            num_layers: model_config.num_layers,
            num_steps: model_config.num_steps,
            input_size: model_config.input_size,
            embed_size: model_config.embed_size(),
            keep_prob: model_config.keep_prob,
            init_learning_rate: train_config.init_learning_rate,
            learning_rate_decay: train_config.learning_rate_decay,
            init_epoch: train_config.init_epoch,
            max_epoch: train_config.max_epoch,
            batch_size: train_config.batch_size,
            train_losses: Vec::new(),
            test_losses: Vec::new(),
            final_test_rmse: None,
            training_time_seconds: None,
            notes: String::new(),
        }
    }

    /// Record one epoch's losses; the test loss is absent when no symbol
    /// had a held-out tail.
    pub fn push_epoch(&mut self, train_loss: f64, test_loss: Option<f64>) {
        self.train_losses.push(train_loss);
        if let Some(test_loss) = test_loss {
            self.test_losses.push(test_loss);
        }
    }

    pub fn set_final_rmse(&mut self, rmse: f64) {
        self.final_test_rmse = Some(rmse);
    }

    pub fn set_training_time(&mut self, seconds: f64) {
        self.training_time_seconds = Some(seconds);
    }

    pub fn add_note(&mut self, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(note);
    }

    /// Serialize into `<logs_dir>/<run_name>_<stamp>_run.json`.
    pub fn save(&self, logs_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(logs_dir).context("Failed to create logs directory")?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let file_path = logs_dir.join(format!("{}_{}_run.json", self.run_name, stamp));
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run record")?;
        fs::write(&file_path, json).context("Failed to write run record")?;
        Ok(file_path)
    }
}

/// Export the learned per-stock embedding table as TSV files.
///
/// Writes `embeddings.tsv` (one tab-separated vector per row) and
/// `metadata.tsv` (the symbol behind each row) into the logs directory.
/// Returns `None` when the model was built without embeddings.
pub fn export_embeddings<B: Backend>(
    model: &StockLstm<B>,
    symbols: &[String],
    logs_dir: &Path,
) -> Result<Option<(PathBuf, PathBuf)>> {
    let weights = match model.embedding_weights() {
        Some(weights) => weights,
        None => return Ok(None),
    };

    fs::create_dir_all(logs_dir).context("Failed to create logs directory")?;
    let [rows, cols] = weights.dims();
    let data = weights.to_data().convert::<f32>();
    let values = data
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read embedding data: {:?}", e))?;

    let mut vectors = String::new();
    for r in 0..rows {
        let row: Vec<String> = (0..cols)
            .map(|c| format!("{}", values[r * cols + c]))
            .collect();
        vectors.push_str(&row.join("\t"));
        vectors.push('\n');
    }
    let vectors_path = logs_dir.join("embeddings.tsv");
    fs::write(&vectors_path, vectors).context("Failed to write embeddings.tsv")?;

    let mut labels = String::new();
    for r in 0..rows {
        let label = symbols.get(r).map(String::as_str).unwrap_or("?");
        labels.push_str(label);
        labels.push('\n');
    }
    let labels_path = logs_dir.join("metadata.tsv");
    fs::write(&labels_path, labels).context("Failed to write metadata.tsv")?;

    Ok(Some((vectors_path, labels_path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use tempfile::tempdir;

    #[test]
    fn run_record_round_trips_through_json() -> Result<()> {
        let temp = tempdir()?;
        let model_config = RnnConfig::new(2).unwrap().with_embed_size(Some(4));
        let train_config = TrainingConfig::default();
        let mut run = TrainingRun::new(
            "unit",
            vec!["AAPL".into(), "MSFT".into()],
            &model_config,
            &train_config,
        );
        run.push_epoch(0.5, Some(0.6));
        run.push_epoch(0.4, Some(0.55));
        run.set_final_rmse(0.74);
        run.add_note("smoke run");

        let path = run.save(temp.path())?;
        let parsed: TrainingRun = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(parsed.symbols.len(), 2);
        assert_eq!(parsed.train_losses, vec![0.5, 0.4]);
        assert_eq!(parsed.embed_size, 4);
        assert_eq!(parsed.final_test_rmse, Some(0.74));
        Ok(())
    }

    #[test]
    fn embeddings_exported_with_symbol_labels() -> Result<()> {
        let temp = tempdir()?;
        let device = NdArrayDevice::Cpu;
        let config = RnnConfig::new(3)
            .unwrap()
            .with_lstm_size(4)
            .with_embed_size(Some(2));
        let model = StockLstm::<NdArray>::new(&config, &device).unwrap();
        let symbols = vec!["A".to_string(), "B".to_string(), "C".to_string()];

        let paths = export_embeddings(&model, &symbols, temp.path())?;
        let (vectors_path, labels_path) = paths.expect("embedding table expected");

        let vectors = fs::read_to_string(vectors_path)?;
        assert_eq!(vectors.lines().count(), 3);
        assert_eq!(vectors.lines().next().unwrap().split('\t').count(), 2);

        let labels = fs::read_to_string(labels_path)?;
        assert_eq!(labels.lines().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        Ok(())
    }

    #[test]
    fn no_export_without_embeddings() -> Result<()> {
        let temp = tempdir()?;
        let device = NdArrayDevice::Cpu;
        let config = RnnConfig::new(1).unwrap().with_lstm_size(4);
        let model = StockLstm::<NdArray>::new(&config, &device).unwrap();
        assert!(export_embeddings(&model, &[], temp.path())?.is_none());
        Ok(())
    }
}
