// src/layers/activation.rs
use crate::module::Module;
use crate::tensor::Tensor;
use ndarray::Zip;
use rayon::prelude::*;

// --- ReLU ---
pub struct ReLU;
impl ReLU {
    pub fn new() -> Self {
        ReLU
    }
}

impl Module for ReLU {
    fn forward(&self, input: Tensor) -> Tensor {
        let input_ref = input.data_ref();
        let data = Zip::from(&*input_ref).par_map_collect(|&x| x.max(0.0));
        Tensor::new(data)
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }
}

// --- GroupSort ---

/// Sorts each contiguous group of `group_size` activations along the last
/// axis ascending. Gradient-norm preserving, which makes it the standard
/// activation in Lipschitz-constrained networks; `group_size = 2` is MaxMin.
pub struct GroupSort {
    pub group_size: usize,
}

impl GroupSort {
    pub fn new(group_size: usize) -> Self {
        assert!(group_size >= 2, "GroupSort needs groups of at least 2");
        GroupSort { group_size }
    }
}

impl Module for GroupSort {
    fn forward(&self, input: Tensor) -> Tensor {
        let mut data = input.data();
        let k = self.group_size;
        let features = *data
            .shape()
            .last()
            .expect("GroupSort input must have at least one axis");
        assert!(
            features % k == 0,
            "GroupSort: feature dim {features} not divisible by group size {k}"
        );

        // Last axis is contiguous and divisible by k, so flat chunks never
        // straddle a sample boundary.
        let flat = data
            .as_slice_mut()
            .expect("GroupSort input must be contiguous");
        flat.par_chunks_mut(k).for_each(|group| {
            group.sort_by(|a, b| a.partial_cmp(b).expect("non-finite activation"));
        });

        Tensor::new(data)
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }
}
