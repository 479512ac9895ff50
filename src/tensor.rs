// src/tensor.rs
use crate::error::Result;
use ndarray::prelude::*;
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

/// Shared handle over an n-dimensional f32 array.
///
/// Layers hand out clones of their parameter tensors from `parameters()`;
/// the loaders fill those same buffers in place, so every holder of a clone
/// observes the loaded weights.
#[derive(Clone)]
pub struct Tensor(pub(crate) Rc<RefCell<ArrayD<f32>>>);

impl Tensor {
    pub fn new(data: ArrayD<f32>) -> Self {
        Tensor(Rc::new(RefCell::new(data)))
    }

    /// Read-only reference to the data (zero copy).
    pub fn data_ref(&self) -> Ref<'_, ArrayD<f32>> {
        self.0.borrow()
    }

    /// Mutable reference to the data.
    pub fn data_mut(&self) -> RefMut<'_, ArrayD<f32>> {
        self.0.borrow_mut()
    }

    pub fn data(&self) -> ArrayD<f32> {
        self.0.borrow().clone()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.0.borrow().shape().to_vec()
    }

    pub fn get_raw_data(&self) -> (Vec<usize>, Vec<f32>) {
        let inner = self.0.borrow();
        (inner.shape().to_vec(), inner.iter().cloned().collect())
    }

    pub fn set_raw_data(&self, shape: Vec<usize>, raw_data: Vec<f32>) -> Result<()> {
        let new_data = Array::from_shape_vec(shape, raw_data)?.into_dyn();
        *self.0.borrow_mut() = new_data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_storage() {
        let a = Tensor::new(ArrayD::zeros(IxDyn(&[2, 2])));
        let b = a.clone();
        b.set_raw_data(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(a.data_ref()[[1, 1]], 4.0);
    }

    #[test]
    fn raw_round_trip() {
        let t = Tensor::new(ArrayD::zeros(IxDyn(&[3])));
        t.set_raw_data(vec![3], vec![1.0, 2.0, 3.0]).unwrap();
        let (shape, data) = t.get_raw_data();
        assert_eq!(shape, vec![3]);
        assert_eq!(data, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn set_raw_data_rejects_bad_shape() {
        let t = Tensor::new(ArrayD::zeros(IxDyn(&[3])));
        assert!(t.set_raw_data(vec![2, 2], vec![1.0, 2.0, 3.0]).is_err());
    }
}
