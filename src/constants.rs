// Network defaults
pub const DEFAULT_LSTM_SIZE: usize = 128; // Hidden width of each LSTM layer
pub const DEFAULT_NUM_LAYERS: usize = 1; // Number of stacked LSTM cells
pub const DEFAULT_NUM_STEPS: usize = 30; // Time steps per input sequence
pub const DEFAULT_INPUT_SIZE: usize = 1; // Prices grouped per step
pub const DEFAULT_KEEP_PROB: f64 = 0.8; // 1.0 - dropout rate inside the cell stack

/// Sentinel stored in the configuration when per-stock embeddings are disabled.
pub const EMBED_DISABLED: i64 = -1;

// Training defaults
pub const DEFAULT_INIT_LEARNING_RATE: f64 = 0.001;
pub const DEFAULT_LEARNING_RATE_DECAY: f64 = 0.99;
pub const DEFAULT_INIT_EPOCH: usize = 5; // Epochs trained at the initial rate
pub const DEFAULT_MAX_EPOCH: usize = 50;
pub const DEFAULT_BATCH_SIZE: usize = 64;
pub const DEFAULT_TEST_RATIO: f64 = 0.05; // Chronological tail held out per symbol
pub const CHECKPOINT_EVERY_EPOCHS: usize = 5;
pub const SNAPSHOT_EVERY_EPOCHS: usize = 10;

// Output locations
pub const DEFAULT_LOGS_DIR: &str = "logs";
pub const DEFAULT_PLOTS_DIR: &str = "imgs";
pub const MODEL_FILE_NAME: &str = "_stock_rnn";

/// Cap on points written into a truth-vs-prediction snapshot file.
pub const SNAPSHOT_MAX_POINTS: usize = 200;
