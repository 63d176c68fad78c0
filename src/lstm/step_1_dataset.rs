// External crates
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Shape, Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Raw close-price series for one symbol, as loaded from disk.
#[derive(Debug, Clone)]
pub struct SymbolSeries {
    pub symbol: String,
    pub closes: Vec<f64>,
}

/// Windowed, normalized and chronologically split sequences for one symbol.
///
/// Inputs are flattened `num_steps * input_size` windows; targets are the
/// `input_size` group that immediately follows each window.
#[derive(Debug, Clone)]
pub struct StockDataSet {
    pub symbol: String,
    pub symbol_id: usize,
    pub train_x: Vec<Vec<f32>>,
    pub train_y: Vec<Vec<f32>>,
    pub test_x: Vec<Vec<f32>>,
    pub test_y: Vec<Vec<f32>>,
}

/// One training batch drawn from a single symbol.
///
/// Every sequence in a batch shares its symbol id so the embedding path can
/// label the whole batch with one lookup index per row.
#[derive(Debug, Clone)]
pub struct Batch {
    pub symbol_id: usize,
    pub len: usize,
    pub inputs: Vec<f32>,
    pub targets: Vec<f32>,
}

/// Group a close-price series into consecutive `input_size` vectors,
/// optionally normalizing each group relative to the closing price of the
/// group before it.
///
/// With `normalized` set, the first group is divided by its own first price
/// and every later group by the last raw price of its predecessor, minus one
/// in both cases. Each value is then a relative price change, not an
/// absolute level. A ragged final group is discarded.
pub fn window_series(closes: &[f64], input_size: usize, normalized: bool) -> Vec<Vec<f32>> {
    let group_count = closes.len() / input_size;
    let raw: Vec<&[f64]> = (0..group_count)
        .map(|k| &closes[k * input_size..(k + 1) * input_size])
        .collect();

    raw.iter()
        .enumerate()
        .map(|(k, group)| {
            let divisor = if !normalized {
                1.0
            } else if k == 0 {
                group[0]
            } else {
                raw[k - 1][input_size - 1]
            };
            group
                .iter()
                .map(|&p| {
                    if normalized {
                        (p / divisor - 1.0) as f32
                    } else {
                        p as f32
                    }
                })
                .collect()
        })
        .collect()
}

/// Slide a `num_steps` window over the groups to build input sequences and
/// their next-group targets.
///
/// Returns `(inputs, targets)` where each input is flattened to
/// `num_steps * input_size` values. A series with fewer than
/// `num_steps + 1` groups yields no sequences.
pub fn build_sequences(
    groups: &[Vec<f32>],
    num_steps: usize,
) -> (Vec<Vec<f32>>, Vec<Vec<f32>>) {
    let count = groups.len().saturating_sub(num_steps);
    let mut inputs = Vec::with_capacity(count);
    let mut targets = Vec::with_capacity(count);
    for i in 0..count {
        let mut seq = Vec::with_capacity(num_steps * groups[i].len());
        for group in &groups[i..i + num_steps] {
            seq.extend_from_slice(group);
        }
        inputs.push(seq);
        targets.push(groups[i + num_steps].clone());
    }
    (inputs, targets)
}

impl StockDataSet {
    /// Window, normalize and split one symbol's series.
    ///
    /// The split is chronological: the leading `1 - test_ratio` share of the
    /// sequences trains, the tail tests. No shuffling crosses the boundary.
    pub fn prepare(
        series: &SymbolSeries,
        symbol_id: usize,
        input_size: usize,
        num_steps: usize,
        test_ratio: f64,
        normalized: bool,
    ) -> Self {
        let groups = window_series(&series.closes, input_size, normalized);
        let (inputs, targets) = build_sequences(&groups, num_steps);

        let train_size = (inputs.len() as f64 * (1.0 - test_ratio)) as usize;
        let (train_x, test_x) = {
            let (a, b) = inputs.split_at(train_size);
            (a.to_vec(), b.to_vec())
        };
        let (train_y, test_y) = {
            let (a, b) = targets.split_at(train_size);
            (a.to_vec(), b.to_vec())
        };

        Self {
            symbol: series.symbol.clone(),
            symbol_id,
            train_x,
            train_y,
            test_x,
            test_y,
        }
    }

    pub fn num_train_sequences(&self) -> usize {
        self.train_x.len()
    }

    pub fn num_test_sequences(&self) -> usize {
        self.test_x.len()
    }
}

/// Build one epoch's worth of batches across every symbol, shuffled.
///
/// Each batch holds `batch_size` sequences from a single symbol; a trailing
/// partial batch is discarded. The batch order is shuffled with the caller's
/// generator so epochs are reproducible under a fixed seed.
pub fn epoch_batches(
    datasets: &[StockDataSet],
    batch_size: usize,
    rng: &mut StdRng,
) -> Vec<Batch> {
    let mut batches = Vec::new();
    for dataset in datasets {
        let num_batches = dataset.train_x.len() / batch_size;
        for b in 0..num_batches {
            let rows = b * batch_size..(b + 1) * batch_size;
            let mut inputs = Vec::with_capacity(batch_size * dataset.train_x[0].len());
            let mut targets = Vec::with_capacity(batch_size * dataset.train_y[0].len());
            for row in rows {
                inputs.extend_from_slice(&dataset.train_x[row]);
                targets.extend_from_slice(&dataset.train_y[row]);
            }
            batches.push(Batch {
                symbol_id: dataset.symbol_id,
                len: batch_size,
                inputs,
                targets,
            });
        }
    }
    batches.shuffle(rng);
    batches
}

/// Convert one batch into the `[batch, num_steps, input_size]` input tensor,
/// the `[batch, input_size]` target tensor, and the `[batch]` symbol-id
/// tensor the network consumes.
pub fn batch_to_tensors<B: Backend>(
    batch: &Batch,
    num_steps: usize,
    input_size: usize,
    device: &B::Device,
) -> (Tensor<B, 3>, Tensor<B, 2>, Tensor<B, 1, Int>) {
    let inputs = Tensor::<B, 1>::from_floats(batch.inputs.as_slice(), device)
        .reshape(Shape::new([batch.len, num_steps, input_size]));
    let targets = Tensor::<B, 1>::from_floats(batch.targets.as_slice(), device)
        .reshape(Shape::new([batch.len, input_size]));
    let ids = vec![batch.symbol_id as i64; batch.len];
    let symbols = Tensor::<B, 1, Int>::from_data(
        TensorData::new(ids, Shape::new([batch.len])),
        device,
    );
    (inputs, targets, symbols)
}

/// Concatenate every symbol's held-out tail into a single evaluation batch.
///
/// Returns `None` when no symbol has any test sequences.
pub fn test_tensors<B: Backend>(
    datasets: &[StockDataSet],
    num_steps: usize,
    input_size: usize,
    device: &B::Device,
) -> Option<(Tensor<B, 3>, Tensor<B, 2>, Tensor<B, 1, Int>)> {
    let total: usize = datasets.iter().map(|d| d.test_x.len()).sum();
    if total == 0 {
        return None;
    }

    let mut inputs = Vec::with_capacity(total * num_steps * input_size);
    let mut targets = Vec::with_capacity(total * input_size);
    let mut ids = Vec::with_capacity(total);
    for dataset in datasets {
        for (x, y) in dataset.test_x.iter().zip(dataset.test_y.iter()) {
            inputs.extend_from_slice(x);
            targets.extend_from_slice(y);
            ids.push(dataset.symbol_id as i64);
        }
    }

    let inputs = Tensor::<B, 1>::from_floats(inputs.as_slice(), device)
        .reshape(Shape::new([total, num_steps, input_size]));
    let targets = Tensor::<B, 1>::from_floats(targets.as_slice(), device)
        .reshape(Shape::new([total, input_size]));
    let symbols =
        Tensor::<B, 1, Int>::from_data(TensorData::new(ids, Shape::new([total])), device);
    Some((inputs, targets, symbols))
}
