pub mod config;
pub mod constants;

pub mod lstm {
    pub mod step_1_dataset;
    pub mod step_2_lstm_cell;
    pub mod step_3_model_arch;
    pub mod step_4_train_model;
    pub mod step_5_prediction;
    pub mod step_6_model_serialization;
}

pub mod util {
    pub mod file_utils;
    pub mod run_logger;
}
