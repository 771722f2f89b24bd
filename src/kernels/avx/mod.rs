/// AVX2 kernel implementations, dispatched from `kernels::requantize`.
pub mod requantize;
pub use requantize::*;
