// src/lib.rs

pub mod error;
pub mod init;
pub mod layers;
pub mod loader;
#[macro_use]
pub mod module;
pub mod normalizers;
pub mod registry;
pub mod tensor;
pub mod utils;

pub use error::{Error, Result};
pub use loader::{load_model, model_from_json, model_from_yaml, save_model};
pub use module::{Module, Sequential, TrainingSpec};
pub use registry::{LayerBuilder, LayerConfig, LayerSpec, ModelSpec, Registry};
pub use tensor::Tensor;
pub use utils::{evaluate_lip_const, evaluate_lip_const_gen, DEFAULT_EPS};
