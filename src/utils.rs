// src/utils.rs
use crate::module::Module;
use crate::tensor::Tensor;
use ndarray::prelude::*;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Default perturbation magnitude for the Lipschitz estimators.
pub const DEFAULT_EPS: f32 = 1e-4;

/// Empirically estimate the Lipschitz constant of `model` around the samples
/// in `x`, with the naive finite-difference method.
///
/// Every input element is offset by a uniform draw from `[0.25·eps, eps)`
/// (seeded when `seed` is given) and the squared output displacement over
/// squared input displacement is maximized across the batch.
///
/// The estimate is local to the sampled neighborhood of each input point,
/// not a global bound, and can be inaccurate in high-dimensional input
/// spaces. The ratio `ndfx / ndx` is deliberately unguarded: a pathological
/// all-zero perturbation, vanishingly unlikely under the uniform draw,
/// yields a non-finite result. `eps` must be positive.
///
/// Prints one `lip cst:` progress line to stdout and returns the estimate.
pub fn evaluate_lip_const<M: Module + ?Sized>(
    model: &M,
    x: &ArrayD<f32>,
    eps: f32,
    seed: Option<u64>,
) -> f32 {
    let y_pred = model.forward(Tensor::new(x.clone())).data();

    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let noise = Array::random_using(x.raw_dim(), Uniform::new(0.25 * eps, eps), &mut rng);
    let x_var = x + &noise;
    let y_pred_var = model.forward(Tensor::new(x_var.clone())).data();

    let dx = x - &x_var;
    let dfx = &y_pred - &y_pred_var;
    let ndx = batch_sq_norms(&dx);
    let ndfx = batch_sq_norms(&dfx);

    let lip_cst = ndfx
        .iter()
        .zip(ndx.iter())
        .map(|(&fx, &dx)| fx / dx)
        .fold(f32::NEG_INFINITY, f32::max)
        .sqrt();
    println!("lip cst: {lip_cst:.3}");
    lip_cst
}

/// Generator-driven variant of [`evaluate_lip_const`]: pulls exactly one
/// `(x, y, sample_weight)` batch from `batches` and estimates on its inputs.
/// Labels and sample weights are ignored.
///
/// Panics if the producer is already exhausted.
pub fn evaluate_lip_const_gen<M, I>(
    model: &M,
    batches: &mut I,
    eps: f32,
    seed: Option<u64>,
) -> f32
where
    M: Module + ?Sized,
    I: Iterator<Item = (ArrayD<f32>, ArrayD<f32>, ArrayD<f32>)>,
{
    let (x, _y, _sample_weight) = batches
        .next()
        .expect("batch producer must yield at least one batch");
    evaluate_lip_const(model, &x, eps, seed)
}

/// Squared L2 distance per sample, summed over all non-batch axes.
fn batch_sq_norms(d: &ArrayD<f32>) -> Array1<f32> {
    let batch = d.shape()[0];
    let per_sample = d.len() / batch;
    let flat = d
        .view()
        .into_shape_with_order((batch, per_sample))
        .expect("batch tensors must be contiguous");
    flat.map_axis(Axis(1), |row| row.iter().map(|v| v * v).sum())
}
