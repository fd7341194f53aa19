//! # Recurrent Layers
//!
//! Multi-layer Elman / LSTM / GRU stacks stepped over a `(batch, seq, in)`
//! input. Gate layout follows the usual `i, f, g, o` (LSTM) and `r, z, n`
//! (GRU) ordering.

use std::fmt;
use std::str::FromStr;

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Dropout, Linear, Module};
use serde::{Deserialize, Serialize};

use crate::error::{LexError, Result};
use crate::model::params::ParamStore;

/// Kind of recurrent cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    RnnTanh,
    RnnRelu,
    #[default]
    Lstm,
    Gru,
}

impl CellKind {
    fn gates(self) -> usize {
        match self {
            CellKind::RnnTanh | CellKind::RnnRelu => 1,
            CellKind::Lstm => 4,
            CellKind::Gru => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CellKind::RnnTanh => "RNN_TANH",
            CellKind::RnnRelu => "RNN_RELU",
            CellKind::Lstm => "LSTM",
            CellKind::Gru => "GRU",
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CellKind {
    type Err = LexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "RNN_TANH" => Ok(CellKind::RnnTanh),
            "RNN_RELU" => Ok(CellKind::RnnRelu),
            "LSTM" => Ok(CellKind::Lstm),
            "GRU" => Ok(CellKind::Gru),
            other => Err(LexError::InvalidConfig(format!("unknown cell type {other:?}"))),
        }
    }
}

/// State of one layer.
#[derive(Debug, Clone)]
pub enum LayerState {
    /// Elman and GRU layers.
    Hidden(Tensor),
    /// LSTM layers.
    Cell { h: Tensor, c: Tensor },
}

impl LayerState {
    /// The output-facing hidden vector.
    pub fn h(&self) -> &Tensor {
        match self {
            LayerState::Hidden(h) => h,
            LayerState::Cell { h, .. } => h,
        }
    }

    fn detach(&self) -> Self {
        match self {
            LayerState::Hidden(h) => LayerState::Hidden(h.detach()),
            LayerState::Cell { h, c } => LayerState::Cell {
                h: h.detach(),
                c: c.detach(),
            },
        }
    }
}

/// Recurrent state of a whole stack, one entry per layer.
#[derive(Debug, Clone)]
pub struct HiddenState {
    layers: Vec<LayerState>,
}

impl HiddenState {
    pub fn layers(&self) -> &[LayerState] {
        &self.layers
    }

    /// Copy that no longer carries autograd history, bounding backprop to
    /// the current window.
    pub fn detach(&self) -> Self {
        Self {
            layers: self.layers.iter().map(LayerState::detach).collect(),
        }
    }

    /// Batch dimension the state was built for.
    pub fn batch_size(&self) -> Result<usize> {
        match self.layers.first() {
            Some(layer) => Ok(layer.h().dim(0)?),
            None => Err(LexError::InvalidConfig("hidden state has no layers".into())),
        }
    }
}

fn sigmoid(xs: &Tensor) -> candle_core::Result<Tensor> {
    xs.neg()?.exp()?.affine(1.0, 1.0)?.recip()
}

struct RecurrentLayer {
    kind: CellKind,
    input_proj: Linear,
    hidden_proj: Linear,
}

impl RecurrentLayer {
    fn new(
        kind: CellKind,
        input: usize,
        hidden: usize,
        prefix: &str,
        params: &mut ParamStore,
    ) -> Result<Self> {
        let rows = kind.gates() * hidden;
        let bound = 1.0 / (hidden as f64).sqrt();
        let w_ih = params.uniform(&format!("{prefix}.weight_ih"), (rows, input), bound)?;
        let w_hh = params.uniform(&format!("{prefix}.weight_hh"), (rows, hidden), bound)?;
        let b_ih = params.uniform(&format!("{prefix}.bias_ih"), rows, bound)?;
        let b_hh = params.uniform(&format!("{prefix}.bias_hh"), rows, bound)?;
        Ok(Self {
            kind,
            input_proj: Linear::new(w_ih, Some(b_ih)),
            hidden_proj: Linear::new(w_hh, Some(b_hh)),
        })
    }

    fn step(&self, xs: &Tensor, state: &LayerState) -> Result<LayerState> {
        let gi = self.input_proj.forward(xs)?;
        let gh = self.hidden_proj.forward(state.h())?;

        let next = match (self.kind, state) {
            (CellKind::RnnTanh, LayerState::Hidden(_)) => LayerState::Hidden(gi.add(&gh)?.tanh()?),
            (CellKind::RnnRelu, LayerState::Hidden(_)) => LayerState::Hidden(gi.add(&gh)?.relu()?),
            (CellKind::Lstm, LayerState::Cell { c, .. }) => {
                let gates = gi.add(&gh)?.chunk(4, D::Minus1)?;
                let i = sigmoid(&gates[0])?;
                let f = sigmoid(&gates[1])?;
                let g = gates[2].tanh()?;
                let o = sigmoid(&gates[3])?;
                let c = f.mul(c)?.add(&i.mul(&g)?)?;
                let h = o.mul(&c.tanh()?)?;
                LayerState::Cell { h, c }
            }
            (CellKind::Gru, LayerState::Hidden(h)) => {
                let gi = gi.chunk(3, D::Minus1)?;
                let gh = gh.chunk(3, D::Minus1)?;
                let r = sigmoid(&gi[0].add(&gh[0])?)?;
                let z = sigmoid(&gi[1].add(&gh[1])?)?;
                let n = gi[2].add(&r.mul(&gh[2])?)?.tanh()?;
                // (1 - z) * n + z * h
                LayerState::Hidden(n.add(&z.mul(&h.sub(&n)?)?)?)
            }
            (kind, _) => {
                return Err(LexError::InvalidConfig(format!(
                    "hidden state does not match {kind} cell"
                )));
            }
        };
        Ok(next)
    }
}

/// Stack of recurrent layers with dropout between them.
pub struct RecurrentStack {
    kind: CellKind,
    hidden: usize,
    layers: Vec<RecurrentLayer>,
    dropout: Dropout,
}

impl RecurrentStack {
    pub fn new(
        kind: CellKind,
        input: usize,
        hidden: usize,
        num_layers: usize,
        dropout: f32,
        params: &mut ParamStore,
    ) -> Result<Self> {
        if num_layers == 0 {
            return Err(LexError::InvalidConfig("a recurrent stack needs at least one layer".into()));
        }
        let layers = (0..num_layers)
            .map(|l| {
                let in_dim = if l == 0 { input } else { hidden };
                RecurrentLayer::new(kind, in_dim, hidden, &format!("rnn.l{l}"), params)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            kind,
            hidden,
            layers,
            dropout: Dropout::new(dropout),
        })
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden
    }

    /// All-zero state for `batch_size` rows.
    pub fn zero_state(&self, batch_size: usize, device: &Device) -> Result<HiddenState> {
        let zeros = || Tensor::zeros((batch_size, self.hidden), DType::F32, device);
        let layers = self
            .layers
            .iter()
            .map(|_| -> Result<LayerState> {
                Ok(match self.kind {
                    CellKind::Lstm => LayerState::Cell {
                        h: zeros()?,
                        c: zeros()?,
                    },
                    _ => LayerState::Hidden(zeros()?),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(HiddenState { layers })
    }

    /// Runs the stack over `xs` of shape `(batch, seq, input)`.
    ///
    /// Returns the top layer's outputs `(batch, seq, hidden)` and the final state.
    pub fn forward(&self, xs: &Tensor, state: &HiddenState, train: bool) -> Result<(Tensor, HiddenState)> {
        if state.layers.len() != self.layers.len() {
            return Err(LexError::InvalidConfig(format!(
                "hidden state has {} layers, stack has {}",
                state.layers.len(),
                self.layers.len()
            )));
        }

        let seq_len = xs.dim(1)?;
        let last = self.layers.len() - 1;
        let mut states = state.layers.clone();
        let mut outputs = Vec::with_capacity(seq_len);

        for t in 0..seq_len {
            let mut input = xs.narrow(1, t, 1)?.squeeze(1)?;
            for (l, layer) in self.layers.iter().enumerate() {
                let next = layer.step(&input, &states[l])?;
                input = next.h().clone();
                if l < last {
                    input = self.dropout.forward(&input, train)?;
                }
                states[l] = next;
            }
            outputs.push(input);
        }

        let output = Tensor::stack(&outputs, 1)?;
        Ok((output, HiddenState { layers: states }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(batch: usize, seq: usize, dim: usize) -> Tensor {
        let data: Vec<f32> = (0..batch * seq * dim).map(|i| (i as f32 * 0.37).sin()).collect();
        Tensor::from_vec(data, (batch, seq, dim), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_output_shapes_for_every_cell() {
        for kind in [CellKind::RnnTanh, CellKind::RnnRelu, CellKind::Lstm, CellKind::Gru] {
            let mut params = ParamStore::new(7, Device::Cpu);
            let stack = RecurrentStack::new(kind, 5, 6, 2, 0.0, &mut params).unwrap();
            let state = stack.zero_state(3, &Device::Cpu).unwrap();

            let (out, next) = stack.forward(&input(3, 4, 5), &state, false).unwrap();
            assert_eq!(out.dims(), &[3, 4, 6], "{kind}");
            assert_eq!(next.layers().len(), 2);
            assert_eq!(next.batch_size().unwrap(), 3);
            assert_eq!(matches!(next.layers()[0], LayerState::Cell { .. }), kind == CellKind::Lstm);
        }
    }

    #[test]
    fn test_state_carries_between_windows() {
        let mut params = ParamStore::new(7, Device::Cpu);
        let stack = RecurrentStack::new(CellKind::Gru, 2, 3, 1, 0.0, &mut params).unwrap();
        let zero = stack.zero_state(1, &Device::Cpu).unwrap();
        let xs = input(1, 2, 2);

        let (a, carried) = stack.forward(&xs, &zero, false).unwrap();
        let (b, _) = stack.forward(&xs, &carried, false).unwrap();
        assert_ne!(
            a.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            b.flatten_all().unwrap().to_vec1::<f32>().unwrap()
        );
    }

    #[test]
    fn test_detach_preserves_values() {
        let mut params = ParamStore::new(3, Device::Cpu);
        let stack = RecurrentStack::new(CellKind::Lstm, 2, 2, 1, 0.0, &mut params).unwrap();
        let zero = stack.zero_state(1, &Device::Cpu).unwrap();
        let (_, state) = stack.forward(&input(1, 3, 2), &zero, true).unwrap();

        let detached = state.detach();
        let LayerState::Cell { h, c } = &detached.layers()[0] else {
            panic!("expected LSTM state");
        };
        assert_eq!(
            h.to_vec2::<f32>().unwrap(),
            state.layers()[0].h().to_vec2::<f32>().unwrap()
        );
        assert!(state.layers()[0].h().track_op());
        assert!(!h.track_op());
        assert!(!c.track_op());
    }

    #[test]
    fn test_mismatched_state_rejected() {
        let mut params = ParamStore::new(3, Device::Cpu);
        let lstm = RecurrentStack::new(CellKind::Lstm, 2, 2, 1, 0.0, &mut params).unwrap();
        let mut params = ParamStore::new(3, Device::Cpu);
        let gru = RecurrentStack::new(CellKind::Gru, 2, 2, 1, 0.0, &mut params).unwrap();

        let gru_state = gru.zero_state(1, &Device::Cpu).unwrap();
        assert!(lstm.forward(&input(1, 1, 2), &gru_state, false).is_err());
    }

    #[test]
    fn test_parse_cell_kind() {
        assert_eq!("lstm".parse::<CellKind>().unwrap(), CellKind::Lstm);
        assert_eq!("rnn-tanh".parse::<CellKind>().unwrap(), CellKind::RnnTanh);
        assert!("transformer".parse::<CellKind>().is_err());
    }
}
