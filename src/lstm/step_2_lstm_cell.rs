// External imports
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::tensor::{activation, backend::Backend, Tensor};

/// One LSTM layer with the four gate projections fused into a single pair of
/// linear maps (input-to-gates and hidden-to-gates).
#[derive(Module, Debug)]
pub struct LstmLayer<B: Backend> {
    hidden_size: usize,
    input_weights: Linear<B>,
    hidden_weights: Linear<B>,
}

impl<B: Backend> LstmLayer<B> {
    pub fn new(input_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        // input, forget, cell and output gates combined
        let gate_size = 4 * hidden_size;
        Self {
            hidden_size,
            input_weights: LinearConfig::new(input_size, gate_size).init(device),
            hidden_weights: LinearConfig::new(hidden_size, gate_size).init(device),
        }
    }

    /// Run the recurrence over a `[batch, seq, input]` tensor and return the
    /// hidden state at every step, `[batch, seq, hidden]`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let device = x.device();
        let [batch_size, seq_len, input_size] = x.dims();

        let mut h = Tensor::zeros([batch_size, self.hidden_size], &device);
        let mut c = Tensor::zeros([batch_size, self.hidden_size], &device);
        let mut output_sequence =
            Tensor::zeros([batch_size, seq_len, self.hidden_size], &device);

        for t in 0..seq_len {
            let x_t = x
                .clone()
                .narrow(1, t, 1)
                .reshape([batch_size, input_size]);

            let gates = self.input_weights.forward(x_t) + self.hidden_weights.forward(h);
            let gates = gates.reshape([batch_size, 4, self.hidden_size]);
            let i_gate = gates
                .clone()
                .narrow(1, 0, 1)
                .reshape([batch_size, self.hidden_size]);
            let f_gate = gates
                .clone()
                .narrow(1, 1, 1)
                .reshape([batch_size, self.hidden_size]);
            let g_gate = gates
                .clone()
                .narrow(1, 2, 1)
                .reshape([batch_size, self.hidden_size]);
            let o_gate = gates
                .narrow(1, 3, 1)
                .reshape([batch_size, self.hidden_size]);

            let i = activation::sigmoid(i_gate);
            let f = activation::sigmoid(f_gate);
            let g = activation::tanh(g_gate);
            let o = activation::sigmoid(o_gate);

            c = f * c + i * g;
            h = o * activation::tanh(c.clone());

            output_sequence = output_sequence.slice_assign(
                [0..batch_size, t..t + 1, 0..self.hidden_size],
                h.clone().reshape([batch_size, 1, self.hidden_size]),
            );
        }

        output_sequence
    }
}

/// A stack of LSTM layers with dropout on each layer's output, the
/// complement of the configured keep probability.
#[derive(Module, Debug)]
pub struct StackedLstm<B: Backend> {
    layers: Vec<LstmLayer<B>>,
    dropout: Dropout,
}

impl<B: Backend> StackedLstm<B> {
    pub fn new(
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        keep_prob: f64,
        device: &B::Device,
    ) -> Self {
        let layers = (0..num_layers)
            .map(|l| {
                let in_size = if l == 0 { input_size } else { hidden_size };
                LstmLayer::new(in_size, hidden_size, device)
            })
            .collect();
        let dropout = DropoutConfig::new(1.0 - keep_prob).init();
        Self { layers, dropout }
    }

    /// Hidden-state sequence of the top layer, `[batch, seq, hidden]`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut seq = x;
        for layer in &self.layers {
            seq = self.dropout.forward(layer.forward(seq));
        }
        seq
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    #[test]
    fn layer_preserves_batch_and_seq_dims() {
        let device = NdArrayDevice::Cpu;
        let layer = LstmLayer::<NdArray>::new(3, 8, &device);
        let x = Tensor::<NdArray, 3>::zeros([4, 5, 3], &device);
        let out = layer.forward(x);
        assert_eq!(out.dims(), [4, 5, 8]);
    }

    #[test]
    fn stack_projects_to_hidden_size() {
        let device = NdArrayDevice::Cpu;
        let stack = StackedLstm::<NdArray>::new(2, 6, 3, 0.8, &device);
        assert_eq!(stack.num_layers(), 3);
        let x = Tensor::<NdArray, 3>::ones([1, 4, 2], &device);
        let out = stack.forward(x);
        assert_eq!(out.dims(), [1, 4, 6]);
    }

    #[test]
    fn zero_input_gives_finite_states() {
        let device = NdArrayDevice::Cpu;
        let layer = LstmLayer::<NdArray>::new(1, 4, &device);
        let x = Tensor::<NdArray, 3>::zeros([2, 3, 1], &device);
        let out = layer.forward(x);
        let data = out.to_data().convert::<f32>();
        let values = data.as_slice::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }
}
