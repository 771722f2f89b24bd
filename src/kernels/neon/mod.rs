pub mod requantize;
pub use requantize::*;
