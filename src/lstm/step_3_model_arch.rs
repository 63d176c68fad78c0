// External imports
use burn::module::Module;
use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::tensor::{backend::Backend, Int, Tensor};

// Internal imports
use crate::config::{ConfigError, RnnConfig};
use crate::lstm::step_2_lstm_cell::StackedLstm;

/// Recurrent price-prediction network over one or many stocks.
///
/// Construction is eager: validating the configuration and building every
/// layer (the optional per-stock embedding table, the LSTM stack and the
/// output projection) happens inside `new`, before the value is returned.
/// The device is borrowed from the caller and never owned by the model.
#[derive(Module, Debug)]
pub struct StockLstm<B: Backend> {
    input_size: usize,
    lstm_size: usize,
    embedding: Option<Embedding<B>>,
    lstm: StackedLstm<B>,
    output: Linear<B>,
}

impl<B: Backend> StockLstm<B> {
    /// Build the full network described by `config`.
    ///
    /// Fails only on an invalid configuration; the embedding table exists
    /// iff the configuration's embedding path is active.
    pub fn new(config: &RnnConfig, device: &B::Device) -> Result<Self, ConfigError> {
        config.validate()?;

        let embedding = config
            .embed_dim()
            .map(|dim| EmbeddingConfig::new(config.stock_count, dim).init(device));
        let lstm = StackedLstm::new(
            config.feature_size(),
            config.lstm_size,
            config.num_layers,
            config.keep_prob,
            device,
        );
        let output = LinearConfig::new(config.lstm_size, config.input_size).init(device);

        Ok(Self {
            input_size: config.input_size,
            lstm_size: config.lstm_size,
            embedding,
            lstm,
            output,
        })
    }

    /// Predict the next price group for each sequence in the batch.
    ///
    /// `inputs` is `[batch, num_steps, input_size]`; `symbols` is the
    /// `[batch]` id tensor, consulted only when embeddings are active: each
    /// id's learned vector is concatenated onto the features of every time
    /// step. Returns `[batch, input_size]`.
    pub fn forward(&self, inputs: Tensor<B, 3>, symbols: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let [batch_size, num_steps, _] = inputs.dims();

        let features = match &self.embedding {
            Some(embedding) => {
                let ids = symbols.unsqueeze_dim::<2>(1);
                let vectors = embedding.forward(ids);
                let tiled = vectors.repeat_dim(1, num_steps);
                Tensor::cat(vec![inputs, tiled], 2)
            }
            None => inputs,
        };

        let hidden = self.lstm.forward(features);
        let last = hidden
            .narrow(1, num_steps - 1, 1)
            .reshape([batch_size, self.lstm_size]);
        self.output.forward(last)
    }

    /// Mean squared error between a prediction and its target batch.
    pub fn mse_loss(&self, pred: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
        let diff = pred - target;
        (diff.clone() * diff).mean()
    }

    /// The learned `[stock_count, embed_size]` table, when embeddings are
    /// active.
    pub fn embedding_weights(&self) -> Option<Tensor<B, 2>> {
        self.embedding
            .as_ref()
            .map(|embedding| embedding.weight.val())
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn lstm_size(&self) -> usize {
        self.lstm_size
    }

    pub fn use_embed(&self) -> bool {
        self.embedding.is_some()
    }
}
