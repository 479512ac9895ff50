// src/module.rs
use crate::error::{Error, Result};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};

#[derive(Serialize, Deserialize)]
pub struct ModelCheckpoint {
    pub params: Vec<(Vec<usize>, Vec<f32>)>,
}

/// Training state carried inside a saved container.
///
/// Restored by `load_model` when its `compile` flag is set. This library does
/// not step optimizers itself; the spec only travels with the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrainingSpec {
    pub optimizer: String,
    pub loss: String,
    pub learning_rate: f32,
}

pub trait Module {
    fn forward(&self, input: Tensor) -> Tensor;
    fn parameters(&self) -> Vec<Tensor>;

    /// Parameter-only checkpoint (binary). Architecture is not stored;
    /// use `save_model` for a self-describing container.
    fn save(&self, path: &str) -> Result<()> {
        let params = self.parameters();
        let mut data_list = Vec::new();
        for p in params {
            data_list.push(p.get_raw_data());
        }
        let checkpoint = ModelCheckpoint { params: data_list };
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, &checkpoint)?;
        tracing::debug!(path, "checkpoint saved");
        Ok(())
    }

    fn load(&self, path: &str) -> Result<()> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let checkpoint: ModelCheckpoint = bincode::deserialize_from(reader)?;

        let my_params = self.parameters();
        if checkpoint.params.len() != my_params.len() {
            return Err(Error::ParamCountMismatch {
                expected: my_params.len(),
                found: checkpoint.params.len(),
            });
        }

        for (param, (shape, data)) in my_params.iter().zip(checkpoint.params.into_iter()) {
            param.set_raw_data(shape, data)?;
        }
        tracing::debug!(path, "checkpoint loaded");
        Ok(())
    }
}

impl fmt::Debug for dyn Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Module({} params)", self.parameters().len())
    }
}

pub struct Sequential {
    layers: Vec<Box<dyn Module>>,
    training: Option<TrainingSpec>,
}

impl fmt::Debug for Sequential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequential")
            .field("layers", &self.layers.len())
            .field("training", &self.training)
            .finish()
    }
}

impl Sequential {
    pub fn new(layers: Vec<Box<dyn Module>>) -> Self {
        Sequential {
            layers,
            training: None,
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn set_training(&mut self, training: Option<TrainingSpec>) {
        self.training = training;
    }

    /// Training state restored from a container, if any.
    pub fn training(&self) -> Option<&TrainingSpec> {
        self.training.as_ref()
    }
}

impl Module for Sequential {
    fn forward(&self, mut input: Tensor) -> Tensor {
        for layer in &self.layers {
            input = layer.forward(input);
        }
        input
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }
}

#[macro_export]
macro_rules! sequential {
    ($($layer:expr),* $(,)?) => {
        $crate::module::Sequential::new(vec![
            $(Box::new($layer)),*
        ])
    };
}
