use crate::block::BlockType;
use crate::error::{OutputError, Result};
use crate::isa::InstructionSet;
use crate::pipeline::{OutputProcess, Source};
use crate::sparse::{CompressedSparseColumn, ConvParams};
use std::marker::PhantomData;
use tracing::{debug, trace};

fn take_buffer<'b>(inp: Source<'b, i32>, stage: &str) -> (&'b mut [i32], usize) {
    match inp {
        Source::Buffer { data, ld } => (data, ld),
        Source::Resident => panic!("{} accumulates into a separate int32 buffer", stage),
    }
}

/// Adds `A_g * B_sparse` for the group owning the block into the accumulator
/// block before passing it on.
pub struct DoSpmdmOnInpBuffer<'a, Out, N> {
    next: &'a N,
    a: &'a [u8],
    lda: usize,
    b_csc: &'a CompressedSparseColumn,
    groups: usize,
    _marker: PhantomData<fn() -> Out>,
}

impl<'a, Out, N> DoSpmdmOnInpBuffer<'a, Out, N>
where
    N: OutputProcess<Out = Out, In = i32>,
{
    /// `a` is the dense `u8` operand with `groups * b_csc.num_rows()` columns.
    pub fn new(
        next: &'a N,
        a: &'a [u8],
        lda: usize,
        b_csc: &'a CompressedSparseColumn,
        groups: usize,
    ) -> Result<Self> {
        if groups == 0 {
            return Err(OutputError::ZeroGroups);
        }
        if b_csc.num_cols() % groups != 0 {
            return Err(OutputError::GroupsDoNotDivide {
                columns: b_csc.num_cols(),
                groups,
            });
        }
        debug!(
            rows = b_csc.num_rows(),
            cols = b_csc.num_cols(),
            nnz = b_csc.nnz(),
            density = b_csc.density(),
            groups,
            "spmdm fusion stage configured"
        );
        Ok(Self {
            next,
            a,
            lda,
            b_csc,
            groups,
            _marker: PhantomData,
        })
    }
}

impl<'a, Out, N> OutputProcess for DoSpmdmOnInpBuffer<'a, Out, N>
where
    N: OutputProcess<Out = Out, In = i32>,
{
    type Out = Out;
    type In = i32;

    fn apply<I: InstructionSet>(
        &self,
        out: &mut [Out],
        inp: Source<'_, i32>,
        block: &BlockType,
        ld_out: usize,
    ) -> Result<()> {
        let (data, ld_in) = take_buffer(inp, "DoSpmdmOnInpBuffer");
        let n_per_group = self.b_csc.num_cols() / self.groups;
        let g = block.assert_single_group(self.b_csc.num_cols(), n_per_group);
        trace!(?block, group = g, "spmdm accumulate");
        let a_offset = g * self.b_csc.num_rows();
        self.b_csc.spmdm(block, &self.a[a_offset..], self.lda, true, data, ld_in);
        self.next.apply::<I>(out, Source::Buffer { data, ld: ld_in }, block, ld_out)
    }
}

/// Adds a sparse 2-D convolution's contribution into the accumulator block
/// before passing it on.
pub struct DoSConvOnInpBuffer<'a, Out, N> {
    next: &'a N,
    a: &'a [u8],
    a_zero_point: i32,
    b_csc: &'a CompressedSparseColumn,
    conv: ConvParams,
    _marker: PhantomData<fn() -> Out>,
}

impl<'a, Out, N> DoSConvOnInpBuffer<'a, Out, N>
where
    N: OutputProcess<Out = Out, In = i32>,
{
    pub fn new(
        next: &'a N,
        a: &'a [u8],
        a_zero_point: i32,
        b_csc: &'a CompressedSparseColumn,
        conv: ConvParams,
    ) -> Result<Self> {
        conv.validate()?;
        if b_csc.num_cols() % conv.groups != 0 {
            return Err(OutputError::GroupsDoNotDivide {
                columns: b_csc.num_cols(),
                groups: conv.groups,
            });
        }
        if b_csc.num_cols() != conv.out_channels || b_csc.num_rows() != conv.kernel_rows() {
            return Err(OutputError::InvalidSparse(format!(
                "operand is {}x{}, convolution expects {}x{}",
                b_csc.num_rows(),
                b_csc.num_cols(),
                conv.kernel_rows(),
                conv.out_channels
            )));
        }
        if a.len() < conv.input_len() {
            return Err(OutputError::InvalidConv(format!(
                "input has {} activations, expected {}",
                a.len(),
                conv.input_len()
            )));
        }
        debug!(
            out_dim = ?conv.out_dim(),
            groups = conv.groups,
            nnz = b_csc.nnz(),
            density = b_csc.density(),
            "sparse conv fusion stage configured"
        );
        Ok(Self {
            next,
            a,
            a_zero_point,
            b_csc,
            conv,
            _marker: PhantomData,
        })
    }
}

impl<'a, Out, N> OutputProcess for DoSConvOnInpBuffer<'a, Out, N>
where
    N: OutputProcess<Out = Out, In = i32>,
{
    type Out = Out;
    type In = i32;

    fn apply<I: InstructionSet>(
        &self,
        out: &mut [Out],
        inp: Source<'_, i32>,
        block: &BlockType,
        ld_out: usize,
    ) -> Result<()> {
        let (data, ld_in) = take_buffer(inp, "DoSConvOnInpBuffer");
        block.assert_single_group(self.conv.out_channels, self.conv.out_channels / self.conv.groups);
        trace!(?block, "sparse conv accumulate");
        self.b_csc
            .sparse_conv(&self.conv, block, self.a, self.a_zero_point, true, data, ld_in);
        self.next.apply::<I>(out, Source::Buffer { data, ld: ld_in }, block, ld_out)
    }
}
