// External imports
use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Shape, Tensor, TensorData};
use std::path::{Path, PathBuf};

// Internal imports
use crate::constants::SNAPSHOT_MAX_POINTS;
use crate::lstm::step_1_dataset::{test_tensors, StockDataSet};
use crate::lstm::step_3_model_arch::StockLstm;

fn tensor_values<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<f32>> {
    let data = tensor.to_data().convert::<f32>();
    let values = data
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read prediction data: {:?}", e))?;
    Ok(values.to_vec())
}

/// Run the model over a prepared input batch and return the flattened
/// predictions, row-major.
pub fn predict_batch<B: Backend>(
    model: &StockLstm<B>,
    inputs: Tensor<B, 3>,
    symbols: Tensor<B, 1, Int>,
) -> Result<Vec<f32>> {
    tensor_values(model.forward(inputs, symbols))
}

/// RMSE over every symbol's held-out tail; `None` when nothing is held out.
pub fn evaluate<B: Backend>(
    model: &StockLstm<B>,
    datasets: &[StockDataSet],
    num_steps: usize,
    input_size: usize,
    device: &B::Device,
) -> Result<Option<f64>> {
    let (inputs, targets, symbols) =
        match test_tensors::<B>(datasets, num_steps, input_size, device) {
            Some(tensors) => tensors,
            None => return Ok(None),
        };
    let predictions = model.forward(inputs, symbols);
    let diff = predictions - targets;
    let mse = (diff.clone() * diff).mean();
    let data = mse.to_data().convert::<f32>();
    let mse = data
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read loss data: {:?}", e))?[0]
        as f64;
    Ok(Some(mse.sqrt()))
}

/// Recursive multi-step forecast from the tail of a series.
///
/// `recent` must hold at least `num_steps` groups; each predicted group is
/// fed back as the newest step for the next round. Returns
/// `horizon * input_size` flattened values.
pub fn forecast_recursive<B: Backend>(
    model: &StockLstm<B>,
    recent: &[Vec<f32>],
    symbol_id: usize,
    horizon: usize,
    device: &B::Device,
) -> Result<Vec<f32>> {
    let num_steps = recent.len();
    anyhow::ensure!(num_steps > 0, "Forecast needs at least one input group");
    let input_size = recent[0].len();

    let mut window: Vec<Vec<f32>> = recent.to_vec();
    let mut forecast = Vec::with_capacity(horizon * input_size);
    let symbols = Tensor::<B, 1, Int>::from_data(
        TensorData::new(vec![symbol_id as i64], Shape::new([1])),
        device,
    );

    for _ in 0..horizon {
        let mut flat = Vec::with_capacity(num_steps * input_size);
        for group in &window {
            flat.extend_from_slice(group);
        }
        let inputs = Tensor::<B, 1>::from_floats(flat.as_slice(), device)
            .reshape(Shape::new([1, num_steps, input_size]));
        let predicted = tensor_values(model.forward(inputs, symbols.clone()))?;
        forecast.extend_from_slice(&predicted);
        window.remove(0);
        window.push(predicted);
    }

    Ok(forecast)
}

/// Write a truth-vs-prediction snapshot for one symbol's held-out tail.
///
/// The file lands in `plots_dir` as `<symbol>_<label>_predictions.csv` with
/// `step,truth,prediction` rows, capped at `SNAPSHOT_MAX_POINTS` points.
pub fn write_prediction_snapshot<B: Backend>(
    model: &StockLstm<B>,
    dataset: &StockDataSet,
    num_steps: usize,
    input_size: usize,
    device: &B::Device,
    plots_dir: &Path,
    label: &str,
) -> Result<Option<PathBuf>> {
    let max_sequences = SNAPSHOT_MAX_POINTS / input_size.max(1);
    let count = dataset.test_x.len().min(max_sequences);
    if count == 0 {
        return Ok(None);
    }

    let mut flat = Vec::with_capacity(count * num_steps * input_size);
    for x in dataset.test_x.iter().take(count) {
        flat.extend_from_slice(x);
    }
    let inputs = Tensor::<B, 1>::from_floats(flat.as_slice(), device)
        .reshape(Shape::new([count, num_steps, input_size]));
    let symbols = Tensor::<B, 1, Int>::from_data(
        TensorData::new(vec![dataset.symbol_id as i64; count], Shape::new([count])),
        device,
    );
    let predictions = predict_batch(model, inputs, symbols)?;

    let mut csv = String::from("step,truth,prediction\n");
    let mut step = 0usize;
    for (row, y) in dataset.test_y.iter().take(count).enumerate() {
        for (col, truth) in y.iter().enumerate() {
            let prediction = predictions[row * input_size + col];
            csv.push_str(&format!("{},{},{}\n", step, truth, prediction));
            step += 1;
        }
    }

    std::fs::create_dir_all(plots_dir).context("Failed to create plots directory")?;
    let file_path = plots_dir.join(format!("{}_{}_predictions.csv", dataset.symbol, label));
    std::fs::write(&file_path, csv).context("Failed to write prediction snapshot")?;
    Ok(Some(file_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RnnConfig;
    use crate::lstm::step_1_dataset::SymbolSeries;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use tempfile::tempdir;

    fn small_model_and_data() -> (StockLstm<NdArray>, StockDataSet, RnnConfig) {
        let device = NdArrayDevice::Cpu;
        let config = RnnConfig::new(2)
            .unwrap()
            .with_num_steps(3)
            .with_input_size(1)
            .with_lstm_size(4)
            .with_embed_size(Some(2));
        let model = StockLstm::new(&config, &device).unwrap();
        let series = SymbolSeries {
            symbol: "TEST".to_string(),
            closes: (1..=30).map(|i| i as f64).collect(),
        };
        let dataset = StockDataSet::prepare(&series, 1, 1, 3, 0.3, true);
        (model, dataset, config)
    }

    #[test]
    fn evaluate_returns_finite_rmse() {
        let device = NdArrayDevice::Cpu;
        let (model, dataset, config) = small_model_and_data();
        let rmse = evaluate(
            &model,
            std::slice::from_ref(&dataset),
            config.num_steps,
            config.input_size,
            &device,
        )
        .unwrap()
        .expect("test tail expected");
        assert!(rmse.is_finite());
        assert!(rmse >= 0.0);
    }

    #[test]
    fn evaluate_is_none_without_test_data() {
        let device = NdArrayDevice::Cpu;
        let (model, _, config) = small_model_and_data();
        let series = SymbolSeries {
            symbol: "SHORT".to_string(),
            closes: vec![1.0, 2.0],
        };
        let empty = StockDataSet::prepare(&series, 0, 1, 3, 0.3, true);
        let rmse = evaluate(
            &model,
            std::slice::from_ref(&empty),
            config.num_steps,
            config.input_size,
            &device,
        )
        .unwrap();
        assert!(rmse.is_none());
    }

    #[test]
    fn recursive_forecast_has_horizon_length() {
        let device = NdArrayDevice::Cpu;
        let (model, dataset, _) = small_model_and_data();
        let recent: Vec<Vec<f32>> = dataset.test_x[0]
            .iter()
            .map(|&v| vec![v])
            .collect();
        let forecast = forecast_recursive(&model, &recent, 1, 5, &device).unwrap();
        assert_eq!(forecast.len(), 5);
        assert!(forecast.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn snapshot_written_with_header_and_rows() {
        let temp = tempdir().unwrap();
        let device = NdArrayDevice::Cpu;
        let (model, dataset, config) = small_model_and_data();
        let path = write_prediction_snapshot(
            &model,
            &dataset,
            config.num_steps,
            config.input_size,
            &device,
            temp.path(),
            "final",
        )
        .unwrap()
        .expect("snapshot expected");

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("step,truth,prediction"));
        assert_eq!(lines.count(), dataset.num_test_sequences());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("TEST_final"));
    }
}
