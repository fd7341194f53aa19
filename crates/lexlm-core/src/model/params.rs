//! Seeded parameter creation on top of a candle `VarMap`.
//!
//! candle's CPU initializers draw from an unseeded RNG, so every trainable
//! tensor is generated here from one `oorandom` stream and registered under
//! a stable name. The same names are used when checkpoints are reloaded.

use candle_core::{DType, Device, Shape, Tensor, Var};
use candle_nn::VarMap;

use crate::error::{LexError, Result};

/// Owner of all trainable tensors of a model.
pub struct ParamStore {
    varmap: VarMap,
    rng: oorandom::Rand32,
    device: Device,
}

impl ParamStore {
    pub fn new(seed: u64, device: Device) -> Self {
        Self {
            varmap: VarMap::new(),
            rng: oorandom::Rand32::new(seed),
            device,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn varmap_mut(&mut self) -> &mut VarMap {
        &mut self.varmap
    }

    /// Every trainable tensor, for the optimizer.
    pub fn all_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Draws `shape` values uniformly from `[-bound, bound)` without
    /// registering them. Used for frozen random matrices.
    pub fn uniform_constant<S: Into<Shape>>(&mut self, shape: S, bound: f64) -> Result<Tensor> {
        let shape = shape.into();
        let data: Vec<f32> = (0..shape.elem_count())
            .map(|_| ((2.0 * self.rng.rand_float() as f64 - 1.0) * bound) as f32)
            .collect();
        Ok(Tensor::from_vec(data, shape, &self.device)?)
    }

    /// Trainable tensor initialized uniformly in `[-bound, bound)`.
    pub fn uniform<S: Into<Shape>>(&mut self, name: &str, shape: S, bound: f64) -> Result<Tensor> {
        let init = self.uniform_constant(shape, bound)?;
        self.register(name, &init)
    }

    /// Trainable tensor initialized to zero.
    pub fn zeros<S: Into<Shape>>(&mut self, name: &str, shape: S) -> Result<Tensor> {
        let init = Tensor::zeros(shape, DType::F32, &self.device)?;
        self.register(name, &init)
    }

    /// Trainable tensor initialized from an existing value.
    pub fn register(&mut self, name: &str, init: &Tensor) -> Result<Tensor> {
        let var = Var::from_tensor(&init.to_device(&self.device)?.to_dtype(DType::F32)?)?;
        let mut data = self
            .varmap
            .data()
            .lock()
            .map_err(|_| LexError::ParameterStore("variable map lock poisoned".into()))?;
        if data.contains_key(name) {
            return Err(LexError::ParameterStore(format!("parameter {name:?} registered twice")));
        }
        let tensor = var.as_tensor().clone();
        data.insert(name.to_string(), var);
        Ok(tensor)
    }

    /// Number of registered tensors.
    pub fn len(&self) -> usize {
        self.varmap.all_vars().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
