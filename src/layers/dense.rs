// src/layers/dense.rs
use crate::init::{tensor_init, InitType};
use crate::module::Module;
use crate::tensor::Tensor;
use ndarray::prelude::*;

pub struct Dense {
    pub weight: Tensor,       // shape: [out_features, in_features]
    pub bias: Option<Tensor>, // shape: [out_features]
}

impl Dense {
    pub fn new(in_features: usize, out_features: usize) -> Self {
        // Weight stored [out, in] to match the usual checkpoint layout.
        let weight = tensor_init(vec![out_features, in_features], InitType::KaimingNormal);
        let bias = tensor_init(vec![out_features], InitType::Zeros);

        Dense {
            weight,
            bias: Some(bias),
        }
    }

    pub fn new_no_bias(in_features: usize, out_features: usize) -> Self {
        let weight = tensor_init(vec![out_features, in_features], InitType::KaimingNormal);

        Dense { weight, bias: None }
    }
}

impl Module for Dense {
    fn forward(&self, input: Tensor) -> Tensor {
        let x = input.data_ref();
        let w = self.weight.data_ref();
        let w2 = w
            .view()
            .into_dimensionality::<Ix2>()
            .expect("dense weight must be 2-D");
        Tensor::new(affine_forward(&x, w2, self.bias.as_ref()))
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = vec![self.weight.clone()];
        if let Some(b) = &self.bias {
            params.push(b.clone());
        }
        params
    }
}

/// `y = x · Wt + b`, flattening any trailing input axes into features.
pub(crate) fn affine_forward(
    x: &ArrayD<f32>,
    w: ArrayView2<'_, f32>,
    bias: Option<&Tensor>,
) -> ArrayD<f32> {
    let batch = x.shape()[0];
    let features = x.len() / batch;
    let x2 = x
        .view()
        .into_shape_with_order((batch, features))
        .expect("dense input must be contiguous");

    let mut y = x2.dot(&w.t());
    if let Some(b) = bias {
        let b_ref = b.data_ref();
        let b1 = b_ref
            .view()
            .into_dimensionality::<Ix1>()
            .expect("dense bias must be 1-D");
        y += &b1;
    }
    y.into_dyn()
}
