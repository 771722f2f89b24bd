//! Output processing for quantized GEMM.
//!
//! A matrix-multiply microkernel leaves raw `i32` accumulators behind. The
//! stages in [`pipeline`] turn a block of those accumulators into final `u8`
//! or `f32` output, applying zero-point correction, requantization, bias,
//! fused ReLU and optional sparse-operand accumulation on the way.
//!
//! ```
//! use qgemm_output::{AnyArch, BlockType, DoNothing, Granularity, OutputProcess, ReQuantizeOutput, RequantizationParams, Source};
//!
//! # fn main() -> qgemm_output::Result<()> {
//! let zps = [0];
//! let mults = [0.5f32];
//! let params = RequantizationParams::new(0, &zps, &mults, 128, 8);
//! let done = DoNothing::<u8>::new();
//! let stage = ReQuantizeOutput::new(&done, params, Granularity::Tensor, false)?;
//!
//! let mut acc = vec![10i32; 32];
//! let mut out = vec![0u8; 32];
//! stage.apply::<AnyArch>(&mut out, Source::buffer(&mut acc, 8), &BlockType::new(0, 4, 0, 8), 8)?;
//! assert!(out.iter().all(|&v| v == 133));
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod error;
pub mod isa;
pub mod kernels;
pub mod params;
pub mod pipeline;
pub mod sparse;

pub use block::BlockType;
pub use error::{OutputError, Result};
pub use isa::{AnyArch, Avx2, InstructionSet, IsaKind, Neon};
pub use params::{DequantizationParams, Granularity, RequantVariant, RequantizationParams};
pub use pipeline::copy::MemCopy;
pub use pipeline::dequantize::ReQuantizeForFloat;
pub use pipeline::requantize::ReQuantizeOutput;
pub use pipeline::sparse::{DoSConvOnInpBuffer, DoSpmdmOnInpBuffer};
pub use pipeline::{DoNothing, OutputProcess, Source};
pub use sparse::{CompressedSparseColumn, ConvParams};
