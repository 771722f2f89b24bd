use crate::block::BlockType;
use crate::error::Result;
use crate::isa::InstructionSet;
use crate::kernels::requantize::dequantize_f32_ref;
use crate::params::{DequantizationParams, Granularity};
use crate::pipeline::{OutputProcess, Source};
use tracing::debug;

/// Dequantizes an int32 accumulator block into `f32`:
/// `(acc - a_zp * col_offsets[j] - row_offsets[i] * b_zp) * a_scale * b_scale + bias[j]`,
/// optionally clamped below at zero.
pub struct ReQuantizeForFloat<'a, N> {
    next: &'a N,
    params: DequantizationParams<'a>,
    granularity: Granularity,
    fuse_relu: bool,
}

impl<'a, N> ReQuantizeForFloat<'a, N>
where
    N: OutputProcess<Out = f32, In = f32>,
{
    pub fn new(
        next: &'a N,
        params: DequantizationParams<'a>,
        granularity: Granularity,
        fuse_relu: bool,
    ) -> Result<Self> {
        params.validate(granularity)?;
        debug!(
            ?granularity,
            a_zero_point = params.a_zero_point,
            has_bias = params.bias.is_some(),
            fuse_relu,
            "float dequantize stage configured"
        );
        Ok(Self {
            next,
            params,
            granularity,
            fuse_relu,
        })
    }
}

impl<'a, N> OutputProcess for ReQuantizeForFloat<'a, N>
where
    N: OutputProcess<Out = f32, In = f32>,
{
    type Out = f32;
    type In = i32;

    fn apply<I: InstructionSet>(
        &self,
        out: &mut [f32],
        inp: Source<'_, i32>,
        block: &BlockType,
        ld_out: usize,
    ) -> Result<()> {
        let Source::Buffer { data, ld: ld_in } = inp else {
            panic!("ReQuantizeForFloat reads int32 accumulators from a separate buffer");
        };
        let group = block.assert_single_group(self.params.num_columns, self.params.cols_per_group());
        block.assert_output_fits(out.len(), ld_out);
        block.assert_input_fits(data.len(), ld_in);
        assert!(
            self.params.row_offsets.len() >= block.row_size,
            "{} row offsets for a block of {} rows",
            self.params.row_offsets.len(),
            block.row_size
        );
        // Same code for every instruction set.
        dequantize_f32_ref(
            &self.params,
            self.granularity,
            group,
            self.fuse_relu,
            out,
            data,
            block,
            ld_out,
            ld_in,
        );
        self.next.apply::<I>(out, Source::Resident, block, ld_out)
    }
}
