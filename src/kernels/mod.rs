#[cfg(target_arch = "x86_64")]
pub mod avx;
#[cfg(target_arch = "aarch64")]
pub mod neon;
pub mod requantize;
pub mod utils;
pub use requantize::{dequantize_f32_ref, requantize_u8, requantize_u8_ref, RequantizeArgs};
