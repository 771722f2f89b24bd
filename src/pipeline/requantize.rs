use crate::block::BlockType;
use crate::error::Result;
use crate::isa::InstructionSet;
use crate::kernels::requantize::{requantize_u8, RequantizeArgs};
use crate::params::{Granularity, RequantVariant, RequantizationParams};
use crate::pipeline::{OutputProcess, Source};
use tracing::debug;

/// Requantizes an int32 accumulator block into saturated `u8` output.
///
/// Per element: remove the input zero point's contribution
/// (`a_zero_point * col_offsets[j]`), remove the weight zero point's
/// (`row_offsets[i] * b_zero_points[bucket]`), add the bias, multiply by the
/// bucket's multiplier, round half to even, add the output zero point and clamp
/// to `[0, 255]` (`[output_zero_point, 255]` with fused ReLU).
///
/// Each call must stay inside one quantization group.
pub struct ReQuantizeOutput<'a, N> {
    next: &'a N,
    params: RequantizationParams<'a>,
    granularity: Granularity,
    fuse_relu: bool,
    variant: RequantVariant,
}

impl<'a, N> ReQuantizeOutput<'a, N>
where
    N: OutputProcess<Out = u8, In = u8>,
{
    pub fn new(
        next: &'a N,
        params: RequantizationParams<'a>,
        granularity: Granularity,
        fuse_relu: bool,
    ) -> Result<Self> {
        params.validate(granularity)?;
        let variant = params.variant(granularity);
        debug!(
            ?granularity,
            a_symmetric = variant.a_symmetric,
            b_symmetric = variant.b_symmetric,
            has_bias = variant.has_bias,
            fuse_relu,
            num_columns = params.num_columns,
            num_groups = params.num_groups,
            "requantize stage configured"
        );
        Ok(Self {
            next,
            params,
            granularity,
            fuse_relu,
            variant,
        })
    }

    pub fn variant(&self) -> RequantVariant {
        self.variant
    }

    pub fn params(&self) -> &RequantizationParams<'a> {
        &self.params
    }
}

impl<'a, N> OutputProcess for ReQuantizeOutput<'a, N>
where
    N: OutputProcess<Out = u8, In = u8>,
{
    type Out = u8;
    type In = i32;

    fn apply<I: InstructionSet>(
        &self,
        out: &mut [u8],
        inp: Source<'_, i32>,
        block: &BlockType,
        ld_out: usize,
    ) -> Result<()> {
        let Source::Buffer { data, ld: ld_in } = inp else {
            panic!("ReQuantizeOutput reads int32 accumulators from a separate buffer");
        };
        let group = block.assert_single_group(self.params.num_columns, self.params.cols_per_group());
        block.assert_output_fits(out.len(), ld_out);
        block.assert_input_fits(data.len(), ld_in);
        if let Some(rows) = self.params.row_offsets {
            assert!(
                rows.len() >= block.row_size,
                "{} row offsets for a block of {} rows",
                rows.len(),
                block.row_size
            );
        }

        let args = RequantizeArgs {
            a_zero_point: self.params.a_zero_point,
            b_zero_points: self.params.b_zero_points,
            multipliers: self.params.multipliers,
            row_offsets: self.params.row_offsets,
            col_offsets: self.params.col_offsets,
            bias: self.params.bias,
            output_zero_point: self.params.output_zero_point,
            clamp_min: if self.fuse_relu { self.params.output_zero_point } else { 0 },
            granularity: self.granularity,
            group,
        };
        requantize_u8(I::KIND, self.variant, &args, out, data, block, ld_out, ld_in)?;
        self.next.apply::<I>(out, Source::Resident, block, ld_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OutputError;
    use crate::isa::AnyArch;
    use crate::pipeline::DoNothing;

    #[test]
    fn test_end_to_end_4x8() {
        let zps = [0];
        let mults = [0.5f32];
        let params = RequantizationParams::new(0, &zps, &mults, 128, 8);
        let done = DoNothing::<u8>::new();
        let stage = ReQuantizeOutput::new(&done, params, Granularity::Tensor, false).unwrap();
        let mut acc: Vec<i32> = (0..32).map(|x| if x % 2 == 0 { 10 } else { 1000 }).collect();
        let mut out = vec![0u8; 32];
        stage
            .apply::<AnyArch>(&mut out, Source::buffer(&mut acc, 8), &BlockType::new(0, 4, 0, 8), 8)
            .unwrap();
        for (k, &v) in out.iter().enumerate() {
            assert_eq!(v, if k % 2 == 0 { 133 } else { 255 });
        }
    }

    #[test]
    fn test_construction_rejects_bad_config() {
        let zps = [0, 0];
        let mults = [0.5f32, 0.5];
        let params = RequantizationParams::new(0, &zps, &mults, 0, 9).with_groups(2);
        let done = DoNothing::<u8>::new();
        assert_eq!(
            ReQuantizeOutput::new(&done, params, Granularity::Group, false).err(),
            Some(OutputError::GroupsDoNotDivide { columns: 9, groups: 2 })
        );
    }

    #[test]
    #[should_panic(expected = "more than one group")]
    fn test_block_spanning_groups_panics() {
        let zps = [0, 0];
        let mults = [0.5f32, 0.5];
        let params = RequantizationParams::new(0, &zps, &mults, 0, 16).with_groups(2);
        let done = DoNothing::<u8>::new();
        let stage = ReQuantizeOutput::new(&done, params, Granularity::Group, false).unwrap();
        let mut acc = vec![0i32; 16];
        let mut out = vec![0u8; 16];
        let _ = stage.apply::<AnyArch>(&mut out, Source::buffer(&mut acc, 16), &BlockType::new(0, 1, 0, 16), 16);
    }

    #[test]
    #[should_panic(expected = "separate buffer")]
    fn test_resident_input_panics() {
        let zps = [0];
        let mults = [0.5f32];
        let params = RequantizationParams::new(0, &zps, &mults, 0, 4);
        let done = DoNothing::<u8>::new();
        let stage = ReQuantizeOutput::new(&done, params, Granularity::Tensor, false).unwrap();
        let mut out = vec![0u8; 4];
        let _ = stage.apply::<AnyArch>(&mut out, Source::Resident, &BlockType::new(0, 1, 0, 4), 4);
    }
}
