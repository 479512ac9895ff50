// src/layers/mod.rs
pub mod activation;
pub mod dense;
pub mod lipschitz;

pub use activation::{GroupSort, ReLU};
pub use dense::Dense;
pub use lipschitz::SpectralDense;
