//! Sparse weight operand and the accumulation routines the sparse-fusion stages call.
pub mod conv;
pub mod csc;
pub use conv::ConvParams;
pub use csc::CompressedSparseColumn;
