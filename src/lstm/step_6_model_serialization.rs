use anyhow::{Context, Result};
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::SystemTime;

use crate::config::RnnConfig;
use crate::lstm::step_3_model_arch::StockLstm;

/// Everything needed to rebuild a module skeleton before restoring weights.
#[derive(Serialize, Deserialize, Clone)]
pub struct ModelMetadata {
    pub version: String,
    pub timestamp: u64,
    pub stock_count: usize,
    pub lstm_size: usize,
    pub num_layers: usize,
    pub num_steps: usize,
    pub input_size: usize,
    pub embed_size: i64,
    pub keep_prob: f64,
}

impl ModelMetadata {
    pub fn from_config(config: &RnnConfig) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            stock_count: config.stock_count,
            lstm_size: config.lstm_size,
            num_layers: config.num_layers,
            num_steps: config.num_steps,
            input_size: config.input_size,
            embed_size: config.embed_size(),
            keep_prob: config.keep_prob,
        }
    }

    /// Rebuild the configuration this metadata was captured from.
    pub fn to_config(&self) -> Result<RnnConfig> {
        let embed = if self.embed_size > 0 {
            Some(self.embed_size as usize)
        } else {
            None
        };
        let config = RnnConfig::new(self.stock_count)
            .context("Invalid stock count in model metadata")?
            .with_lstm_size(self.lstm_size)
            .with_num_layers(self.num_layers)
            .with_num_steps(self.num_steps)
            .with_input_size(self.input_size)
            .with_keep_prob(self.keep_prob)
            .with_embed_size(embed);
        config
            .validate()
            .context("Invalid hyperparameters in model metadata")?;
        Ok(config)
    }
}

/// Save the model weights plus a metadata sidecar next to them.
pub fn save_model_with_metadata<B: Backend>(
    model: &StockLstm<B>,
    metadata: ModelMetadata,
    path: impl AsRef<Path>,
) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent).context("Failed to create model parent directory")?;
    }
    let model_path = path.as_ref().with_extension("bin");
    model
        .clone()
        .save_file::<BinFileRecorder<FullPrecisionSettings>, _>(&model_path, &Default::default())
        .context("Failed to save model")?;
    let metadata_path = path.as_ref().with_extension("meta.json");
    let metadata_json =
        serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?;
    std::fs::write(&metadata_path, metadata_json).context("Failed to write metadata file")?;
    Ok(())
}

/// Load the model and its metadata from a file pair.
///
/// The skeleton is rebuilt from the metadata sidecar first, then the
/// recorded weights are restored into it.
pub fn load_model_with_metadata<B: Backend>(
    path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(StockLstm<B>, ModelMetadata)> {
    let metadata_path = path.as_ref().with_extension("meta.json");
    let metadata_json =
        std::fs::read_to_string(&metadata_path).context("Failed to read metadata file")?;
    let metadata: ModelMetadata =
        serde_json::from_str(&metadata_json).context("Failed to parse metadata")?;

    let config = metadata.to_config()?;
    let skeleton = StockLstm::new(&config, device)
        .context("Failed to rebuild model skeleton from metadata")?;

    let model_path = path.as_ref().with_extension("bin");
    let model = skeleton
        .load_file::<BinFileRecorder<FullPrecisionSettings>, _>(
            &model_path,
            &Default::default(),
            device,
        )
        .context("Failed to load model")?;
    Ok((model, metadata))
}

/// Check whether a path holds a loadable weights/metadata pair.
pub fn verify_model(path: impl AsRef<Path>) -> Result<bool> {
    let model_path = path.as_ref().with_extension("bin");
    let metadata_path = path.as_ref().with_extension("meta.json");

    if !model_path.exists() || !metadata_path.exists() {
        return Ok(false);
    }

    let metadata_json =
        std::fs::read_to_string(&metadata_path).context("Failed to read metadata file")?;
    let _: ModelMetadata =
        serde_json::from_str(&metadata_json).context("Failed to parse metadata")?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use tempfile::tempdir;

    fn embed_config() -> RnnConfig {
        RnnConfig::new(3)
            .unwrap()
            .with_lstm_size(8)
            .with_num_layers(2)
            .with_num_steps(4)
            .with_input_size(2)
            .with_embed_size(Some(5))
    }

    #[test]
    fn save_load_round_trip() -> Result<()> {
        let temp = tempdir()?;
        let device = NdArrayDevice::Cpu;
        let config = embed_config();
        let model = StockLstm::<NdArray>::new(&config, &device).unwrap();

        let path = temp.path().join("model");
        save_model_with_metadata(&model, ModelMetadata::from_config(&config), &path)?;
        assert!(path.with_extension("bin").exists());
        assert!(path.with_extension("meta.json").exists());

        let (loaded, metadata) = load_model_with_metadata::<NdArray>(&path, &device)?;
        assert_eq!(metadata.stock_count, 3);
        assert_eq!(metadata.lstm_size, 8);
        assert_eq!(metadata.num_layers, 2);
        assert_eq!(metadata.num_steps, 4);
        assert_eq!(metadata.input_size, 2);
        assert_eq!(metadata.embed_size, 5);
        assert!(loaded.use_embed());
        assert_eq!(loaded.embedding_weights().unwrap().dims(), [3, 5]);
        Ok(())
    }

    #[test]
    fn metadata_round_trips_disabled_embedding() -> Result<()> {
        let config = RnnConfig::new(2).unwrap();
        let metadata = ModelMetadata::from_config(&config);
        assert_eq!(metadata.embed_size, crate::constants::EMBED_DISABLED);
        let rebuilt = metadata.to_config()?;
        assert!(!rebuilt.use_embed());
        assert_eq!(rebuilt.embed_size(), crate::constants::EMBED_DISABLED);
        Ok(())
    }

    #[test]
    fn verify_reports_missing_files() -> Result<()> {
        let temp = tempdir()?;
        let path = temp.path().join("absent");
        assert!(!verify_model(&path)?);
        Ok(())
    }
}
