// External imports
use anyhow::{Context, Result};
use burn::optim::{GradientsParams, Optimizer, RmsPropConfig};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;

// Internal imports
use crate::config::RnnConfig;
use crate::constants::{
    CHECKPOINT_EVERY_EPOCHS, DEFAULT_BATCH_SIZE, DEFAULT_INIT_EPOCH,
    DEFAULT_INIT_LEARNING_RATE, DEFAULT_LEARNING_RATE_DECAY, DEFAULT_MAX_EPOCH,
    MODEL_FILE_NAME, SNAPSHOT_EVERY_EPOCHS,
};
use crate::lstm::step_1_dataset::{batch_to_tensors, epoch_batches, test_tensors, StockDataSet};
use crate::lstm::step_3_model_arch::StockLstm;
use crate::lstm::step_5_prediction::write_prediction_snapshot;
use crate::lstm::step_6_model_serialization::{save_model_with_metadata, ModelMetadata};
use crate::util::run_logger::TrainingRun;

/// Configuration for one training run.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub init_learning_rate: f64,
    pub learning_rate_decay: f64,
    pub init_epoch: usize,
    pub max_epoch: usize,
    pub batch_size: usize,
    pub checkpoint_every: usize,
    pub snapshot_every: usize,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            init_learning_rate: DEFAULT_INIT_LEARNING_RATE,
            learning_rate_decay: DEFAULT_LEARNING_RATE_DECAY,
            init_epoch: DEFAULT_INIT_EPOCH, // Epochs trained at the initial rate
            max_epoch: DEFAULT_MAX_EPOCH,
            batch_size: DEFAULT_BATCH_SIZE,
            checkpoint_every: CHECKPOINT_EVERY_EPOCHS,
            snapshot_every: SNAPSHOT_EVERY_EPOCHS,
            seed: 42,
        }
    }
}

/// Exponential decay with a grace period:
/// `init_lr * decay^max(0, epoch + 1 - init_epoch)` for a zero-based epoch.
pub fn learning_rate_for_epoch(config: &TrainingConfig, epoch: usize) -> f64 {
    let exponent = (epoch + 1).saturating_sub(config.init_epoch);
    config.init_learning_rate * config.learning_rate_decay.powi(exponent as i32)
}

/// Train the network over every prepared symbol jointly.
///
/// Runs `max_epoch` epochs of shuffled single-symbol batches through
/// RMSProp, tracking the epoch-mean training loss and the loss over the
/// concatenated held-out tails. Checkpoints land under
/// `<logs_dir>/checkpoints/` on the configured cadence, truth-vs-prediction
/// snapshots under `plots_dir`, and the final weights at
/// `<logs_dir>/<run_name>_stock_rnn`. Returns the trained model together
/// with the run record; saving the record is left to the caller.
pub fn train_model<B: AutodiffBackend>(
    datasets: &[StockDataSet],
    symbols: Vec<String>,
    model_config: &RnnConfig,
    train_config: &TrainingConfig,
    device: &B::Device,
    run_name: &str,
) -> Result<(StockLstm<B>, TrainingRun)> {
    model_config
        .ensure_output_dirs()
        .context("Failed to create output directories")?;

    let mut model = StockLstm::<B>::new(model_config, device)?;
    let mut optimizer = RmsPropConfig::new().init();
    let mut rng = StdRng::seed_from_u64(train_config.seed);
    let mut run = TrainingRun::new(run_name, symbols, model_config, train_config);
    let started = Instant::now();

    let total_train: usize = datasets.iter().map(|d| d.num_train_sequences()).sum();
    anyhow::ensure!(
        total_train >= train_config.batch_size,
        "Not enough training sequences ({}) for a single batch of {}",
        total_train,
        train_config.batch_size
    );
    log::info!(
        "training on {} sequences across {} symbols",
        total_train,
        datasets.len()
    );

    for epoch in 0..train_config.max_epoch {
        let learning_rate = learning_rate_for_epoch(train_config, epoch);
        let batches = epoch_batches(datasets, train_config.batch_size, &mut rng);

        let mut epoch_loss = 0.0;
        for batch in &batches {
            let (inputs, targets, batch_symbols) = batch_to_tensors::<B>(
                batch,
                model_config.num_steps,
                model_config.input_size,
                device,
            );
            let predictions = model.forward(inputs, batch_symbols);
            let loss = model.mse_loss(predictions, targets);
            epoch_loss += loss.clone().into_scalar().elem::<f64>();

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(learning_rate, model, grads);
        }
        let train_loss = epoch_loss / batches.len() as f64;

        let test_loss = test_tensors::<B>(
            datasets,
            model_config.num_steps,
            model_config.input_size,
            device,
        )
        .map(|(inputs, targets, test_symbols)| {
            let predictions = model.forward(inputs, test_symbols);
            model
                .mse_loss(predictions, targets)
                .into_scalar()
                .elem::<f64>()
        });

        run.push_epoch(train_loss, test_loss);
        log::info!(
            "epoch {}/{}: lr {:.6}, train loss {:.6}, test loss {:?}",
            epoch + 1,
            train_config.max_epoch,
            learning_rate,
            train_loss,
            test_loss
        );

        if (epoch + 1) % train_config.checkpoint_every == 0 {
            let checkpoint = model_config
                .logs_dir
                .join("checkpoints")
                .join(format!("{}_epoch_{}", run_name, epoch + 1));
            if let Err(e) = save_model_with_metadata(
                &model,
                ModelMetadata::from_config(model_config),
                &checkpoint,
            ) {
                log::warn!("checkpoint at epoch {} failed: {}", epoch + 1, e);
            }
        }

        if (epoch + 1) % train_config.snapshot_every == 0 {
            for dataset in datasets.iter().take(3) {
                if let Err(e) = write_prediction_snapshot::<B>(
                    &model,
                    dataset,
                    model_config.num_steps,
                    model_config.input_size,
                    device,
                    &model_config.plots_dir,
                    &format!("epoch_{}", epoch + 1),
                ) {
                    log::warn!("snapshot for {} failed: {}", dataset.symbol, e);
                }
            }
        }
    }

    run.set_training_time(started.elapsed().as_secs_f64());

    let final_path = model_config
        .logs_dir
        .join(format!("{}{}", run_name, MODEL_FILE_NAME));
    save_model_with_metadata(&model, ModelMetadata::from_config(model_config), &final_path)
        .context("Failed to save trained model")?;
    log::info!("model saved to {}", final_path.display());

    Ok((model, run))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lstm::step_1_dataset::SymbolSeries;
    use burn_autodiff::Autodiff;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use tempfile::tempdir;

    type TrainBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn decay_starts_after_grace_period() {
        let config = TrainingConfig {
            init_learning_rate: 0.1,
            learning_rate_decay: 0.5,
            init_epoch: 3,
            ..Default::default()
        };
        assert_eq!(learning_rate_for_epoch(&config, 0), 0.1);
        assert_eq!(learning_rate_for_epoch(&config, 2), 0.1);
        // first decayed epoch: exponent 1
        assert!((learning_rate_for_epoch(&config, 3) - 0.05).abs() < 1e-12);
        assert!((learning_rate_for_epoch(&config, 5) - 0.0125).abs() < 1e-12);
    }

    #[test]
    fn two_epoch_smoke_run() -> Result<()> {
        let temp = tempdir()?;
        let device = NdArrayDevice::Cpu;

        let series = SymbolSeries {
            symbol: "SMOKE".to_string(),
            closes: (1..=40).map(|i| 10.0 + (i as f64) * 0.1).collect(),
        };
        let dataset = StockDataSet::prepare(&series, 0, 1, 4, 0.1, true);
        assert!(dataset.num_train_sequences() >= 8);

        let model_config = RnnConfig::new(1)
            .unwrap()
            .with_num_steps(4)
            .with_input_size(1)
            .with_lstm_size(4)
            .with_logs_dir(temp.path().join("logs"))
            .with_plots_dir(temp.path().join("imgs"));
        let train_config = TrainingConfig {
            max_epoch: 2,
            batch_size: 8,
            checkpoint_every: 100,
            snapshot_every: 100,
            ..Default::default()
        };

        let (model, run) = train_model::<TrainBackend>(
            std::slice::from_ref(&dataset),
            vec!["SMOKE".to_string()],
            &model_config,
            &train_config,
            &device,
            "smoke",
        )?;

        assert_eq!(run.train_losses.len(), 2);
        assert_eq!(run.test_losses.len(), 2);
        assert!(run.train_losses.iter().all(|l| l.is_finite()));
        assert!(!model.use_embed());

        let final_path = temp.path().join("logs").join("smoke_stock_rnn");
        assert!(final_path.with_extension("bin").exists());
        assert!(final_path.with_extension("meta.json").exists());
        Ok(())
    }
}
