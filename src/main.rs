// External crates
use anyhow::Result;
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use std::env;
use std::path::PathBuf;

// Local modules
use stock_rnn::config::RnnConfig;
use stock_rnn::constants::DEFAULT_TEST_RATIO;
use stock_rnn::lstm::step_1_dataset::StockDataSet;
use stock_rnn::lstm::step_4_train_model::{train_model, TrainingConfig};
use stock_rnn::lstm::step_5_prediction;
use stock_rnn::util::{file_utils, run_logger};

type TrainBackend = Autodiff<NdArray<f32>>;

fn main() -> Result<()> {
    // Positional arguments: data dir, symbol ("all" trains every file),
    // max symbol count, embedding size (0 disables embeddings).
    let args: Vec<String> = env::args().collect();
    let data_dir = PathBuf::from(args.get(1).map(|s| s.as_str()).unwrap_or("data"));
    let symbol = args.get(2).map(|s| s.as_str()).unwrap_or("all");
    let max_stocks: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(10);
    let embed_size: usize = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0);

    let symbol_filter = if symbol.eq_ignore_ascii_case("all") {
        None
    } else {
        Some(symbol)
    };
    println!(
        "Using data dir: {} | symbol: {} | max stocks: {} | embed size: {}",
        data_dir.display(),
        symbol,
        max_stocks,
        embed_size
    );

    let series = file_utils::load_symbols(&data_dir, symbol_filter, Some(max_stocks))?;
    let symbols: Vec<String> = series.iter().map(|s| s.symbol.clone()).collect();
    println!("Loaded {} symbols: {:?}", symbols.len(), symbols);

    let model_config = RnnConfig::new(series.len())?.with_embed_size(if embed_size > 0 {
        Some(embed_size)
    } else {
        None
    });
    model_config.ensure_output_dirs()?;

    let datasets: Vec<StockDataSet> = series
        .iter()
        .enumerate()
        .map(|(id, s)| {
            StockDataSet::prepare(
                s,
                id,
                model_config.input_size,
                model_config.num_steps,
                DEFAULT_TEST_RATIO,
                true,
            )
        })
        .collect();
    for dataset in &datasets {
        println!(
            "{}: {} train / {} test sequences",
            dataset.symbol,
            dataset.num_train_sequences(),
            dataset.num_test_sequences()
        );
    }

    let device = NdArrayDevice::Cpu;
    let train_config = TrainingConfig::default();
    let run_name = if symbols.len() == 1 {
        symbols[0].to_lowercase()
    } else {
        format!("joint_{}", symbols.len())
    };

    println!("Starting model training...");
    let (model, mut run) = train_model::<TrainBackend>(
        &datasets,
        symbols.clone(),
        &model_config,
        &train_config,
        &device,
        &run_name,
    )?;
    println!("Training completed and model saved.");

    match step_5_prediction::evaluate(
        &model,
        &datasets,
        model_config.num_steps,
        model_config.input_size,
        &device,
    )? {
        Some(rmse) => {
            println!("Final test RMSE: {:.6}", rmse);
            run.set_final_rmse(rmse);
        }
        None => println!("No held-out data to evaluate."),
    }

    for dataset in datasets.iter().take(3) {
        if let Some(path) = step_5_prediction::write_prediction_snapshot::<TrainBackend>(
            &model,
            dataset,
            model_config.num_steps,
            model_config.input_size,
            &device,
            &model_config.plots_dir,
            "final",
        )? {
            println!("Wrote prediction snapshot: {}", path.display());
        }
    }

    if let Some((vectors, _labels)) =
        run_logger::export_embeddings(&model, &symbols, &model_config.logs_dir)?
    {
        println!("Exported stock embeddings to {}", vectors.display());
    }

    let record = run.save(&model_config.logs_dir)?;
    println!("Run record saved to {}", record.display());
    Ok(())
}
