// src/registry.rs
use crate::error::{Error, Result};
use crate::layers::{Dense, GroupSort, ReLU, SpectralDense};
use crate::module::{Module, Sequential};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Architecture description: an ordered list of layer specs.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ModelSpec {
    pub layers: Vec<LayerSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LayerSpec {
    pub kind: String,
    #[serde(default)]
    pub config: LayerConfig,
}

/// Bag of optional layer hyper-parameters; each builder picks the fields it
/// needs and errors on missing required ones.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LayerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_dim: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_bias: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k_coef: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_iterations: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_size: Option<usize>,
}

pub type LayerBuilder = fn(&LayerConfig) -> Result<Box<dyn Module>>;

/// Explicit registry mapping layer kind names to builders.
///
/// Construct once (usually via [`Registry::builtin`]) and pass by reference
/// to the loaders. Deserialization never reads the registry directly: it
/// works on a [`Registry::merged`] snapshot, so entries registered while a
/// load is in flight are not observed by it.
pub struct Registry {
    builders: HashMap<String, LayerBuilder>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            builders: HashMap::new(),
        }
    }

    /// Registry pre-loaded with this crate's layer vocabulary, so the loaders
    /// resolve built-in layers without any caller setup.
    pub fn builtin() -> Self {
        let mut reg = Registry::new();
        reg.register("Dense", build_dense);
        reg.register("SpectralDense", build_spectral_dense);
        reg.register("ReLU", build_relu);
        reg.register("GroupSort", build_group_sort);
        reg
    }

    /// Insert `builder` under `name` and hand it back, so a builder can be
    /// defined and registered in one expression. Re-registering a name
    /// silently replaces the previous entry.
    pub fn register(&mut self, name: impl Into<String>, builder: LayerBuilder) -> LayerBuilder {
        let name = name.into();
        tracing::trace!(%name, "layer builder registered");
        self.builders.insert(name, builder);
        builder
    }

    pub fn get(&self, name: &str) -> Option<LayerBuilder> {
        self.builders.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Snapshot of this registry overlaid with caller-supplied entries;
    /// caller entries win on name collision.
    pub fn merged(&self, custom_objects: Option<&HashMap<String, LayerBuilder>>) -> Registry {
        let mut builders = self.builders.clone();
        if let Some(extra) = custom_objects {
            for (name, builder) in extra {
                builders.insert(name.clone(), *builder);
            }
        }
        Registry { builders }
    }

    pub fn build(&self, spec: &LayerSpec) -> Result<Box<dyn Module>> {
        let builder = self
            .get(&spec.kind)
            .ok_or_else(|| Error::UnknownLayer(spec.kind.clone()))?;
        builder(&spec.config)
    }

    pub fn build_model(&self, spec: &ModelSpec) -> Result<Sequential> {
        let mut layers = Vec::with_capacity(spec.layers.len());
        for layer in &spec.layers {
            layers.push(self.build(layer)?);
        }
        tracing::debug!(layers = spec.layers.len(), "model built from spec");
        Ok(Sequential::new(layers))
    }
}

fn build_dense(config: &LayerConfig) -> Result<Box<dyn Module>> {
    let units = config.units.ok_or(Error::MissingField {
        layer: "Dense",
        field: "units",
    })?;
    let input_dim = config.input_dim.ok_or(Error::MissingField {
        layer: "Dense",
        field: "input_dim",
    })?;
    let layer = if config.use_bias.unwrap_or(true) {
        Dense::new(input_dim, units)
    } else {
        Dense::new_no_bias(input_dim, units)
    };
    Ok(Box::new(layer))
}

fn build_spectral_dense(config: &LayerConfig) -> Result<Box<dyn Module>> {
    let units = config.units.ok_or(Error::MissingField {
        layer: "SpectralDense",
        field: "units",
    })?;
    let input_dim = config.input_dim.ok_or(Error::MissingField {
        layer: "SpectralDense",
        field: "input_dim",
    })?;
    let k_coef = config.k_coef.unwrap_or(1.0);
    let power_iterations = config
        .power_iterations
        .unwrap_or(crate::layers::lipschitz::DEFAULT_POWER_ITERATIONS);
    let mut layer = SpectralDense::with_coef(input_dim, units, k_coef, power_iterations);
    if !config.use_bias.unwrap_or(true) {
        layer.bias = None;
    }
    Ok(Box::new(layer))
}

fn build_relu(_config: &LayerConfig) -> Result<Box<dyn Module>> {
    Ok(Box::new(ReLU::new()))
}

fn build_group_sort(config: &LayerConfig) -> Result<Box<dyn Module>> {
    let group_size = config.group_size.ok_or(Error::MissingField {
        layer: "GroupSort",
        field: "group_size",
    })?;
    if group_size < 2 {
        return Err(Error::InvalidConfig {
            layer: "GroupSort",
            reason: format!("group_size must be at least 2, got {group_size}"),
        });
    }
    Ok(Box::new(GroupSort::new(group_size)))
}
