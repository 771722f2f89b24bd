use crate::block::BlockType;
use crate::error::Result;
use crate::isa::InstructionSet;
use crate::pipeline::{OutputProcess, Source};
use std::marker::PhantomData;

/// Moves a block from a separate buffer into the destination, then forwards it
/// as resident. A resident block is already in place and is not copied.
pub struct MemCopy<'a, T, N> {
    next: &'a N,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T, N> MemCopy<'a, T, N>
where
    N: OutputProcess<Out = T, In = T>,
{
    pub fn new(next: &'a N) -> Self {
        Self {
            next,
            _marker: PhantomData,
        }
    }
}

impl<'a, T, N> OutputProcess for MemCopy<'a, T, N>
where
    T: Copy,
    N: OutputProcess<Out = T, In = T>,
{
    type Out = T;
    type In = T;

    fn apply<I: InstructionSet>(
        &self,
        out: &mut [T],
        inp: Source<'_, T>,
        block: &BlockType,
        ld_out: usize,
    ) -> Result<()> {
        if let Source::Buffer { data, ld } = inp {
            block.assert_output_fits(out.len(), ld_out);
            block.assert_input_fits(data.len(), ld);
            for i in 0..block.row_size {
                let dst = (block.row_start + i) * ld_out + block.col_start;
                out[dst..dst + block.col_size].copy_from_slice(&data[i * ld..i * ld + block.col_size]);
            }
        }
        self.next.apply::<I>(out, Source::Resident, block, ld_out)
    }
}
