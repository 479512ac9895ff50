// src/loader.rs
use crate::error::{Error, Result};
use crate::module::{Module, Sequential, TrainingSpec};
use crate::registry::{LayerBuilder, ModelSpec, Registry};
use half::bf16;
use memmap2::MmapOptions;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

const MODEL_CONFIG_KEY: &str = "model_config";
const TRAINING_KEY: &str = "training";

/// Build a model from a JSON architecture string.
///
/// Layer kinds are resolved against `registry` merged with `custom_objects`;
/// caller entries win on name collision. The returned model carries freshly
/// initialized weights (uncompiled).
pub fn model_from_json(
    json_string: &str,
    registry: &Registry,
    custom_objects: Option<&HashMap<String, LayerBuilder>>,
) -> Result<Sequential> {
    let spec: ModelSpec = serde_json::from_str(json_string)?;
    registry.merged(custom_objects).build_model(&spec)
}

/// YAML twin of [`model_from_json`].
pub fn model_from_yaml(
    yaml_string: &str,
    registry: &Registry,
    custom_objects: Option<&HashMap<String, LayerBuilder>>,
) -> Result<Sequential> {
    let spec: ModelSpec = serde_yaml::from_str(yaml_string)?;
    registry.merged(custom_objects).build_model(&spec)
}

/// Write a self-describing model container: parameters as F32 tensors named
/// `param.{i}`, the architecture JSON and optional training state in the
/// header metadata.
pub fn save_model(
    model: &Sequential,
    spec: &ModelSpec,
    training: Option<&TrainingSpec>,
    path: impl AsRef<Path>,
) -> Result<()> {
    let params = model.parameters();

    let mut payloads = Vec::with_capacity(params.len());
    for p in &params {
        let (shape, data) = p.get_raw_data();
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        payloads.push((shape, bytes));
    }
    let mut tensors = Vec::with_capacity(payloads.len());
    for (i, (shape, bytes)) in payloads.iter().enumerate() {
        tensors.push((
            format!("param.{i}"),
            TensorView::new(Dtype::F32, shape.clone(), bytes)?,
        ));
    }

    let mut metadata = HashMap::new();
    metadata.insert(MODEL_CONFIG_KEY.to_string(), serde_json::to_string(spec)?);
    if let Some(training) = training {
        metadata.insert(TRAINING_KEY.to_string(), serde_json::to_string(training)?);
    }

    safetensors::serialize_to_file(tensors, &Some(metadata), path.as_ref())?;
    tracing::debug!(
        path = %path.as_ref().display(),
        params = params.len(),
        "model container saved"
    );
    Ok(())
}

/// Load a model container written by [`save_model`].
///
/// The architecture is rebuilt through `registry` merged with
/// `custom_objects` (caller entries win), then the stored parameters are
/// copied into the fresh model in declaration order. With `compile` set, the
/// serialized training state, if present, is restored onto the model.
pub fn load_model(
    path: impl AsRef<Path>,
    registry: &Registry,
    custom_objects: Option<&HashMap<String, LayerBuilder>>,
    compile: bool,
) -> Result<Sequential> {
    let file = File::open(path.as_ref())?;
    let mmap = unsafe { MmapOptions::new().map(&file)? };
    let tensors = SafeTensors::deserialize(&mmap)?;
    let (_, header) = SafeTensors::read_metadata(&mmap)?;
    let metadata = header.metadata().clone().unwrap_or_default();

    let config_json = metadata
        .get(MODEL_CONFIG_KEY)
        .ok_or(Error::MissingMetadata(MODEL_CONFIG_KEY))?;
    let spec: ModelSpec = serde_json::from_str(config_json)?;
    let mut model = registry.merged(custom_objects).build_model(&spec)?;

    let params = model.parameters();
    if tensors.len() != params.len() {
        return Err(Error::ParamCountMismatch {
            expected: params.len(),
            found: tensors.len(),
        });
    }
    for (i, param) in params.iter().enumerate() {
        let view = tensors.tensor(&format!("param.{i}"))?;
        let data = decode_f32(view.dtype(), view.data())?;
        param.set_raw_data(view.shape().to_vec(), data)?;
    }

    if compile {
        if let Some(raw) = metadata.get(TRAINING_KEY) {
            model.set_training(Some(serde_json::from_str(raw)?));
        }
    }

    tracing::debug!(
        path = %path.as_ref().display(),
        layers = spec.layers.len(),
        compile,
        "model container loaded"
    );
    Ok(model)
}

/// Decode a tensor payload to f32. Byte-wise reads keep this safe for the
/// unaligned buffers a safetensors mmap hands out.
fn decode_f32(dtype: Dtype, bytes: &[u8]) -> Result<Vec<f32>> {
    match dtype {
        Dtype::F32 => Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()),
        Dtype::BF16 => Ok(bytes
            .chunks_exact(2)
            .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect()),
        other => Err(Error::UnsupportedDtype(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LayerConfig;
    use crate::tensor::Tensor;
    use ndarray::prelude::*;
    use std::path::PathBuf;

    const ARCH_JSON: &str = r#"{
        "layers": [
            { "kind": "Dense", "config": { "input_dim": 4, "units": 6 } },
            { "kind": "ReLU" },
            { "kind": "SpectralDense", "config": { "input_dim": 6, "units": 2, "k_coef": 1.0 } }
        ]
    }"#;

    const ARCH_YAML: &str = "
layers:
  - kind: Dense
    config:
      input_dim: 4
      units: 6
  - kind: ReLU
  - kind: SpectralDense
    config:
      input_dim: 6
      units: 2
      k_coef: 1.0
";

    fn container_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lipnet-{}-{}.safetensors", name, std::process::id()))
    }

    fn param_shapes(model: &Sequential) -> Vec<Vec<usize>> {
        model.parameters().iter().map(|p| p.shape()).collect()
    }

    #[test]
    fn json_builds_the_described_model() {
        let reg = Registry::builtin();
        let model = model_from_json(ARCH_JSON, &reg, None).unwrap();
        assert_eq!(model.len(), 3);
        let y = model.forward(Tensor::new(ArrayD::ones(IxDyn(&[5, 4]))));
        assert_eq!(y.shape(), vec![5, 2]);
    }

    #[test]
    fn yaml_and_json_agree() {
        let reg = Registry::builtin();
        let from_json = model_from_json(ARCH_JSON, &reg, None).unwrap();
        let from_yaml = model_from_yaml(ARCH_YAML, &reg, None).unwrap();
        assert_eq!(param_shapes(&from_json), param_shapes(&from_yaml));
    }

    #[test]
    fn malformed_json_propagates_parse_error() {
        let reg = Registry::builtin();
        let err = model_from_json("{ not json", &reg, None).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn registered_builder_used_without_override() {
        // register(n, f) then deserialize with no override for n: f is used
        fn build_wide_dense(_config: &LayerConfig) -> Result<Box<dyn Module>> {
            Ok(Box::new(crate::layers::Dense::new_no_bias(4, 9)))
        }
        let mut reg = Registry::builtin();
        reg.register("WideDense", build_wide_dense);

        let json = r#"{ "layers": [ { "kind": "WideDense" } ] }"#;
        let model = model_from_json(json, &reg, None).unwrap();
        assert_eq!(model.parameters()[0].shape(), vec![9, 4]);
    }

    #[test]
    fn caller_override_wins_over_registry() {
        fn build_negate(_config: &LayerConfig) -> Result<Box<dyn Module>> {
            struct Negate;
            impl Module for Negate {
                fn forward(&self, input: Tensor) -> Tensor {
                    Tensor::new(input.data().mapv(|v| -v))
                }
                fn parameters(&self) -> Vec<Tensor> {
                    vec![]
                }
            }
            Ok(Box::new(Negate))
        }

        let reg = Registry::builtin();
        let mut overrides: HashMap<String, LayerBuilder> = HashMap::new();
        overrides.insert("ReLU".into(), build_negate);

        let json = r#"{ "layers": [ { "kind": "ReLU" } ] }"#;
        let model = model_from_json(json, &reg, Some(&overrides)).unwrap();
        let y = model.forward(Tensor::new(array![[2.0f32]].into_dyn())).data();
        assert_eq!(y[[0, 0]], -2.0);
    }

    #[test]
    fn container_round_trip_restores_weights_and_training() {
        let path = container_path("round-trip");
        let reg = Registry::builtin();
        let spec: ModelSpec = serde_json::from_str(ARCH_JSON).unwrap();
        let model = reg.build_model(&spec).unwrap();
        let saved: Vec<_> = model.parameters().iter().map(|p| p.get_raw_data()).collect();
        let training = TrainingSpec {
            optimizer: "adam".into(),
            loss: "mse".into(),
            learning_rate: 1e-3,
        };
        save_model(&model, &spec, Some(&training), &path).unwrap();

        let loaded = load_model(&path, &reg, None, true).unwrap();
        let restored: Vec<_> = loaded.parameters().iter().map(|p| p.get_raw_data()).collect();
        assert_eq!(saved, restored);
        assert_eq!(loaded.training(), Some(&training));

        let uncompiled = load_model(&path, &reg, None, false).unwrap();
        assert!(uncompiled.training().is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn container_load_honors_custom_objects() {
        fn build_double(_config: &LayerConfig) -> Result<Box<dyn Module>> {
            struct Double;
            impl Module for Double {
                fn forward(&self, input: Tensor) -> Tensor {
                    Tensor::new(input.data().mapv(|v| v * 2.0))
                }
                fn parameters(&self) -> Vec<Tensor> {
                    vec![]
                }
            }
            Ok(Box::new(Double))
        }

        let path = container_path("custom-objects");
        let reg = Registry::builtin();
        let spec: ModelSpec = serde_json::from_str(r#"{ "layers": [ { "kind": "ReLU" } ] }"#).unwrap();
        let model = reg.build_model(&spec).unwrap();
        save_model(&model, &spec, None, &path).unwrap();

        let mut overrides: HashMap<String, LayerBuilder> = HashMap::new();
        overrides.insert("ReLU".into(), build_double);
        let loaded = load_model(&path, &reg, Some(&overrides), false).unwrap();
        let y = loaded
            .forward(Tensor::new(array![[3.0f32]].into_dyn()))
            .data();
        assert_eq!(y[[0, 0]], 6.0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn container_without_config_metadata_is_rejected() {
        let path = container_path("no-metadata");
        let bytes = vec![0u8; 4];
        let view = TensorView::new(Dtype::F32, vec![1], &bytes).unwrap();
        safetensors::serialize_to_file(vec![("param.0".to_string(), view)], &None, &path).unwrap();

        let err = load_model(&path, &Registry::builtin(), None, true).unwrap_err();
        assert!(matches!(err, Error::MissingMetadata("model_config")));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn decode_handles_f32_and_bf16() {
        let f = decode_f32(Dtype::F32, &1.5f32.to_le_bytes()).unwrap();
        assert_eq!(f, vec![1.5]);

        let b = bf16::from_f32(0.25);
        let decoded = decode_f32(Dtype::BF16, &b.to_le_bytes()).unwrap();
        assert_eq!(decoded, vec![0.25]);

        assert!(matches!(
            decode_f32(Dtype::I64, &[0u8; 8]).unwrap_err(),
            Error::UnsupportedDtype(Dtype::I64)
        ));
    }
}
