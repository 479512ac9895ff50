// src/layers/lipschitz.rs
use crate::init::{tensor_init, InitType};
use crate::layers::dense::affine_forward;
use crate::module::Module;
use crate::normalizers::spectral_norm;
use crate::tensor::Tensor;
use ndarray::prelude::*;

pub const DEFAULT_POWER_ITERATIONS: usize = 3;

/// Dense layer whose weight is divided by its largest singular value at
/// forward time and scaled by `k_coef`, so the layer is `k_coef`-Lipschitz.
pub struct SpectralDense {
    pub weight: Tensor,       // shape: [out_features, in_features]
    pub bias: Option<Tensor>, // shape: [out_features]
    pub k_coef: f32,
    pub power_iterations: usize,
}

impl SpectralDense {
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self::with_coef(in_features, out_features, 1.0, DEFAULT_POWER_ITERATIONS)
    }

    pub fn with_coef(
        in_features: usize,
        out_features: usize,
        k_coef: f32,
        power_iterations: usize,
    ) -> Self {
        // Spectral init keeps the very first forward pass 1-Lipschitz even
        // before the runtime renormalization has anything to correct.
        let weight = tensor_init(
            vec![out_features, in_features],
            InitType::Spectral {
                power_iterations: 10,
            },
        );
        let bias = tensor_init(vec![out_features], InitType::Zeros);

        SpectralDense {
            weight,
            bias: Some(bias),
            k_coef,
            power_iterations,
        }
    }
}

impl Module for SpectralDense {
    fn forward(&self, input: Tensor) -> Tensor {
        let x = input.data_ref();
        let w = self.weight.data_ref();
        let w2 = w
            .view()
            .into_dimensionality::<Ix2>()
            .expect("spectral dense weight must be 2-D");

        let sigma = spectral_norm(w2, self.power_iterations);
        let w_bar = w2.to_owned() * (self.k_coef / sigma.max(f32::EPSILON));
        Tensor::new(affine_forward(&x, w_bar.view(), self.bias.as_ref()))
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = vec![self.weight.clone()];
        if let Some(b) = &self.bias {
            params.push(b.clone());
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renormalizes_arbitrary_weights() {
        let layer = SpectralDense::with_coef(2, 2, 1.0, 50);
        layer
            .weight
            .set_raw_data(vec![2, 2], vec![5.0, 0.0, 0.0, 5.0])
            .unwrap();

        let x = Tensor::new(array![[1.0f32, 0.0]].into_dyn());
        let y = layer.forward(x).data();
        // weight 5·I renormalized back to I
        assert!((y[[0, 0]] - 1.0).abs() < 1e-4, "y = {}", y[[0, 0]]);
        assert!(y[[0, 1]].abs() < 1e-6);
    }

    #[test]
    fn difference_weight_stays_one_lipschitz() {
        // weight [[1, -1]] has sigma = sqrt(2); renormalization must not
        // blow up on a top singular direction orthogonal to all-ones
        let layer = SpectralDense::with_coef(2, 1, 1.0, 50);
        layer
            .weight
            .set_raw_data(vec![1, 2], vec![1.0, -1.0])
            .unwrap();

        let x = Tensor::new(array![[1.0f32, 0.0]].into_dyn());
        let y = layer.forward(x).data();
        assert!(
            (y[[0, 0]] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-4,
            "y = {}",
            y[[0, 0]]
        );
    }

    #[test]
    fn k_coef_scales_output() {
        let layer = SpectralDense::with_coef(2, 2, 3.0, 50);
        layer
            .weight
            .set_raw_data(vec![2, 2], vec![1.0, 0.0, 0.0, 1.0])
            .unwrap();

        let x = Tensor::new(array![[0.0f32, 2.0]].into_dyn());
        let y = layer.forward(x).data();
        assert!((y[[0, 1]] - 6.0).abs() < 1e-4);
    }
}
