use crate::isa::IsaKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OutputError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OutputError {
    #[error("{name} has {actual} entries, expected {expected}")]
    ParamLength {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Group count {groups} does not divide column count {columns}")]
    GroupsDoNotDivide { columns: usize, groups: usize },
    #[error("Group count must be at least 1")]
    ZeroGroups,
    #[error("Column offsets are required when the input zero point is non-zero")]
    MissingColOffsets,
    #[error("Output zero point {0} outside 0..=255")]
    OutputZeroPoint(i32),
    #[error("{name} contains a non-finite value")]
    NonFiniteScale { name: &'static str },
    #[error("Invalid sparse operand: {0}")]
    InvalidSparse(String),
    #[error("Invalid convolution parameters: {0}")]
    InvalidConv(String),
    #[error("Instruction set {0:?} is not available on this machine")]
    UnsupportedInstructionSet(IsaKind),
}
