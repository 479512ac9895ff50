// src/init.rs
use crate::error::{Error, Result};
use crate::normalizers::{bjorck_normalize, spectral_norm};
use crate::tensor::Tensor;
use ndarray::{Array, ArrayD, Ix2, IxDyn};
use ndarray_rand::rand_distr::{Normal, Uniform};
use ndarray_rand::RandomExt;

/// Fan-in and fan-out of a weight tensor shape under the given data layout.
///
/// Rank 2 is the dense convention (`fan_in = shape[0]`, `fan_out = shape[1]`).
/// Ranks 3, 4 and 5 treat the remaining axes as a receptive field:
/// `channels_first` multiplies the trailing spatial dims, `channels_last` the
/// leading ones. Any other layout string is rejected.
///
/// Any other rank falls back to the square root of the total element count
/// for both fans. The fallback is an approximation without a clear
/// theoretical grounding; it is kept as-is for parity with the initializer
/// conventions this crate follows.
pub fn compute_fans(shape: &[usize], data_format: &str) -> Result<(f64, f64)> {
    let fans = match shape.len() {
        2 => (shape[0] as f64, shape[1] as f64),
        3 | 4 | 5 => match data_format {
            "channels_first" => {
                let receptive_field_size: usize = shape[2..].iter().product();
                (
                    (shape[1] * receptive_field_size) as f64,
                    (shape[0] * receptive_field_size) as f64,
                )
            }
            "channels_last" => {
                let receptive_field_size: usize = shape[..shape.len() - 2].iter().product();
                (
                    (shape[shape.len() - 2] * receptive_field_size) as f64,
                    (shape[shape.len() - 1] * receptive_field_size) as f64,
                )
            }
            other => return Err(Error::InvalidDataFormat(other.to_string())),
        },
        _ => {
            let n = shape.iter().product::<usize>() as f64;
            (n.sqrt(), n.sqrt())
        }
    };
    Ok(fans)
}

pub enum InitType {
    Zeros,                 // For Bias
    Ones,                  // For normalization weights
    XavierUniform,         // For Tanh/Sigmoid (Glorot)
    KaimingNormal,         // For ReLU/GELU (He)
    /// Gaussian draw rescaled so its largest singular value is 1.
    Spectral { power_iterations: usize },
    /// Spectral rescale followed by Björck orthonormalization; all singular
    /// values end up close to 1.
    Bjorck {
        power_iterations: usize,
        bjorck_iterations: usize,
    },
}

pub fn tensor_init(shape: Vec<usize>, init_type: InitType) -> Tensor {
    let shape_dyn = IxDyn(shape.as_slice());

    let data = match init_type {
        InitType::Zeros => ArrayD::zeros(shape_dyn),

        InitType::Ones => ArrayD::ones(shape_dyn),

        InitType::XavierUniform => {
            let (fan_in, fan_out) = compute_fans(&shape, "channels_last")
                .expect("channels_last is a valid layout");
            let limit = (6.0 / (fan_in + fan_out)).sqrt() as f32;
            Array::random(shape_dyn, Uniform::new(-limit, limit)).into_dyn()
        }

        InitType::KaimingNormal => {
            let (fan_in, _) = compute_fans(&shape, "channels_last")
                .expect("channels_last is a valid layout");
            let std = (2.0 / fan_in).sqrt() as f32;
            Array::random(shape_dyn, Normal::new(0.0, std).unwrap()).into_dyn()
        }

        InitType::Spectral { power_iterations } => {
            orthogonal_base(&shape, power_iterations, None)
        }

        InitType::Bjorck {
            power_iterations,
            bjorck_iterations,
        } => orthogonal_base(&shape, power_iterations, Some(bjorck_iterations)),
    };

    Tensor::new(data)
}

/// Gaussian matrix normalized to unit spectral norm, optionally Björck
/// orthonormalized. Higher-rank shapes are flattened to
/// `[product / last, last]` for the normalization and reshaped back.
fn orthogonal_base(
    shape: &[usize],
    power_iterations: usize,
    bjorck_iterations: Option<usize>,
) -> ArrayD<f32> {
    let cols = *shape.last().expect("init shape must be non-empty");
    let rows: usize = shape.iter().product::<usize>() / cols;

    let w: Array<f32, Ix2> = Array::random((rows, cols), Normal::new(0.0, 1.0).unwrap());
    let sigma = spectral_norm(w.view(), power_iterations);
    let mut w = w / sigma.max(f32::EPSILON);
    if let Some(iterations) = bjorck_iterations {
        w = bjorck_normalize(w, iterations);
    }
    w.into_shape_with_order(IxDyn(shape))
        .expect("flattened matrix matches the requested shape")
}
