//! Composable output-processing stages.
//!
//! A chain is built bottom-up, each stage borrowing the next one, and applied
//! once per output block. Stages keep no per-call state, so one chain can
//! serve several threads working on disjoint blocks.
pub mod copy;
pub mod dequantize;
pub mod requantize;
pub mod sparse;

use crate::block::BlockType;
use crate::error::Result;
use crate::isa::InstructionSet;
use std::marker::PhantomData;

/// Where a stage finds its input block.
#[derive(Debug)]
pub enum Source<'a, T> {
    /// A separate buffer holding the block block-relative with leading dimension `ld`.
    Buffer { data: &'a mut [T], ld: usize },
    /// The block already sits in the destination buffer at its absolute position.
    Resident,
}

impl<'a, T> Source<'a, T> {
    pub fn buffer(data: &'a mut [T], ld: usize) -> Self {
        Source::Buffer { data, ld }
    }
}

/// One stage of the output pipeline.
pub trait OutputProcess {
    type Out;
    type In;

    /// Transforms `block` and hands it to the next stage. `I` picks the kernel family.
    fn apply<I: InstructionSet>(
        &self,
        out: &mut [Self::Out],
        inp: Source<'_, Self::In>,
        block: &BlockType,
        ld_out: usize,
    ) -> Result<()>;
}

/// Terminal stage.
#[derive(Debug)]
pub struct DoNothing<Out, In = Out> {
    _marker: PhantomData<fn() -> (Out, In)>,
}

impl<Out, In> DoNothing<Out, In> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<Out, In> Default for DoNothing<Out, In> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Out, In> OutputProcess for DoNothing<Out, In> {
    type Out = Out;
    type In = In;

    #[inline]
    fn apply<I: InstructionSet>(
        &self,
        _out: &mut [Out],
        _inp: Source<'_, In>,
        _block: &BlockType,
        _ld_out: usize,
    ) -> Result<()> {
        Ok(())
    }
}
