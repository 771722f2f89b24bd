use crate::block::BlockType;
use crate::error::{OutputError, Result};
use crate::isa::IsaKind;
use crate::kernels::utils;
use crate::params::{DequantizationParams, Granularity, RequantVariant};
use std::ops::Range;
use tracing::warn;

/// Everything a requantization kernel needs for one block.
#[derive(Debug, Clone, Copy)]
pub struct RequantizeArgs<'a> {
    pub a_zero_point: i32,
    pub b_zero_points: &'a [i32],
    pub multipliers: &'a [f32],
    pub row_offsets: Option<&'a [i32]>,
    pub col_offsets: Option<&'a [i32]>,
    pub bias: Option<&'a [i32]>,
    pub output_zero_point: i32,
    /// 0, or the output zero point when ReLU is fused.
    pub clamp_min: i32,
    pub granularity: Granularity,
    /// Group owning the block's columns.
    pub group: usize,
}

/// Scalar reference requantization. Every other path must match it bit for bit.
pub fn requantize_u8_ref(
    args: &RequantizeArgs<'_>,
    out: &mut [u8],
    inp: &[i32],
    block: &BlockType,
    ld_out: usize,
    ld_in: usize,
) {
    for i in block.row_start..block.row_end() {
        let i_rel = i - block.row_start;
        for j in block.col_start..block.col_end() {
            let mut raw = inp[i_rel * ld_in + (j - block.col_start)];
            if let Some(col_offsets) = args.col_offsets {
                raw = raw.wrapping_sub(args.a_zero_point.wrapping_mul(col_offsets[j]));
            }
            let idx = args.granularity.bucket(args.group, j);
            if let Some(row_offsets) = args.row_offsets {
                raw = raw.wrapping_sub(row_offsets[i_rel].wrapping_mul(args.b_zero_points[idx]));
            }
            if let Some(bias) = args.bias {
                raw = raw.wrapping_add(bias[j]);
            }
            let scaled = raw as f32 * args.multipliers[idx];
            out[i * ld_out + j] = utils::saturate_u8(scaled, args.output_zero_point, args.clamp_min);
        }
    }
}

/// Weight zero-point correction for one row under `Tensor`/`Group` granularity.
/// `OutChannel` recomputes it per column instead.
#[inline(always)]
pub fn row_correction<const B_SYMMETRIC: bool>(args: &RequantizeArgs<'_>, i_rel: usize) -> i32 {
    if B_SYMMETRIC || args.granularity == Granularity::OutChannel {
        return 0;
    }
    let idx = utils::block_param_idx(args.granularity, args.group);
    match args.row_offsets {
        Some(rows) => rows[i_rel].wrapping_mul(args.b_zero_points[idx]),
        None => 0,
    }
}

/// Scalar tail of the vector kernels: columns `cols` of row `i` that did not fill a vector.
#[inline(always)]
pub fn requantize_u8_tail<const A_SYMMETRIC: bool, const B_SYMMETRIC: bool, const HAS_BIAS: bool>(
    args: &RequantizeArgs<'_>,
    out: &mut [u8],
    inp: &[i32],
    block: &BlockType,
    ld_out: usize,
    ld_in: usize,
    i: usize,
    row_offset: i32,
    cols: Range<usize>,
) {
    let i_rel = i - block.row_start;
    let out_channel = args.granularity == Granularity::OutChannel;
    let param_idx = utils::block_param_idx(args.granularity, args.group);
    let col_offsets = args.col_offsets.unwrap_or(&[]);
    let row_offsets = args.row_offsets.unwrap_or(&[]);
    let bias = args.bias.unwrap_or(&[]);
    let mut row_offset = row_offset;
    for j in cols {
        let mut raw = inp[i_rel * ld_in + (j - block.col_start)];
        if !A_SYMMETRIC {
            raw = raw.wrapping_sub(args.a_zero_point.wrapping_mul(col_offsets[j]));
        }
        if !B_SYMMETRIC {
            if out_channel {
                row_offset = row_offsets[i_rel].wrapping_mul(args.b_zero_points[j]);
            }
            raw = raw.wrapping_sub(row_offset);
        }
        if HAS_BIAS {
            raw = raw.wrapping_add(bias[j]);
        }
        let multiplier = if out_channel {
            args.multipliers[j]
        } else {
            args.multipliers[param_idx]
        };
        out[i * ld_out + j] = utils::saturate_u8(raw as f32 * multiplier, args.output_zero_point, args.clamp_min);
    }
}

/// Panics unless the buffers and arrays cover `block` and every correction
/// `variant` performs has its data. The vector kernels read unchecked after this.
fn assert_kernel_args(
    variant: RequantVariant,
    args: &RequantizeArgs<'_>,
    out: &[u8],
    inp: &[i32],
    block: &BlockType,
    ld_out: usize,
    ld_in: usize,
) {
    block.assert_output_fits(out.len(), ld_out);
    block.assert_input_fits(inp.len(), ld_in);
    let col_end = block.col_end();
    let buckets = match args.granularity {
        Granularity::OutChannel => col_end,
        _ => utils::block_param_idx(args.granularity, args.group) + 1,
    };
    assert!(
        args.multipliers.len() >= buckets && args.b_zero_points.len() >= buckets,
        "{} multipliers and {} zero points for {} buckets",
        args.multipliers.len(),
        args.b_zero_points.len(),
        buckets
    );
    if !variant.a_symmetric {
        let cols = args.col_offsets.map_or(0, <[i32]>::len);
        assert!(cols >= col_end, "{} column offsets for columns up to {}", cols, col_end);
    }
    if !variant.b_symmetric {
        let rows = args.row_offsets.map_or(0, <[i32]>::len);
        assert!(rows >= block.row_size, "{} row offsets for a block of {} rows", rows, block.row_size);
    }
    if variant.has_bias {
        let bias = args.bias.map_or(0, <[i32]>::len);
        assert!(bias >= col_end, "{} bias entries for columns up to {}", bias, col_end);
    }
}

/// Runs the requantization kernel for `isa`, picking the specialization matching `variant`.
///
/// Panics when the buffers do not cover `block` or when `variant` asks for a
/// correction whose data `args` lacks.
pub fn requantize_u8(
    isa: IsaKind,
    variant: RequantVariant,
    args: &RequantizeArgs<'_>,
    out: &mut [u8],
    inp: &[i32],
    block: &BlockType,
    ld_out: usize,
    ld_in: usize,
) -> Result<()> {
    assert_kernel_args(variant, args, out, inp, block, ld_out, ld_in);
    match isa {
        IsaKind::AnyArch => {
            requantize_u8_ref(args, out, inp, block, ld_out, ld_in);
            Ok(())
        }
        IsaKind::Avx2 => {
            #[cfg(target_arch = "x86_64")]
            if is_x86_feature_detected!("avx2") {
                unsafe {
                    crate::kernels::avx::requantize_u8_avx2(variant, args, out, inp, block, ld_out, ld_in);
                }
                return Ok(());
            }
            warn!(?isa, "requantization requested for an unavailable instruction set");
            Err(OutputError::UnsupportedInstructionSet(isa))
        }
        IsaKind::Neon => {
            #[cfg(target_arch = "aarch64")]
            {
                unsafe {
                    crate::kernels::neon::requantize_u8_neon(variant, args, out, inp, block, ld_out, ld_in);
                }
                Ok(())
            }
            #[cfg(not(target_arch = "aarch64"))]
            {
                let _ = variant;
                warn!(?isa, "requantization requested for an unavailable instruction set");
                Err(OutputError::UnsupportedInstructionSet(isa))
            }
        }
    }
}

/// Int32 -> f32 dequantization. Row offsets are always applied and the float
/// bias is added after scaling.
pub fn dequantize_f32_ref(
    params: &DequantizationParams<'_>,
    granularity: Granularity,
    group: usize,
    fuse_relu: bool,
    out: &mut [f32],
    inp: &[i32],
    block: &BlockType,
    ld_out: usize,
    ld_in: usize,
) {
    for i in block.row_start..block.row_end() {
        let i_rel = i - block.row_start;
        for j in block.col_start..block.col_end() {
            let mut raw = inp[i_rel * ld_in + (j - block.col_start)];
            if let Some(col_offsets) = params.col_offsets {
                raw = raw.wrapping_sub(params.a_zero_point.wrapping_mul(col_offsets[j]));
            }
            let idx = granularity.bucket(group, j);
            raw = raw.wrapping_sub(params.row_offsets[i_rel].wrapping_mul(params.b_zero_points[idx]));
            let mut res = raw as f32 * params.a_scale * params.b_scales[idx];
            if let Some(bias) = params.bias {
                res += bias[j];
            }
            if fuse_relu {
                res = res.max(0.0);
            }
            out[i * ld_out + j] = res;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args<'a>(multipliers: &'a [f32], zps: &'a [i32], out_zp: i32) -> RequantizeArgs<'a> {
        RequantizeArgs {
            a_zero_point: 0,
            b_zero_points: zps,
            multipliers,
            row_offsets: None,
            col_offsets: None,
            bias: None,
            output_zero_point: out_zp,
            clamp_min: 0,
            granularity: Granularity::Tensor,
            group: 0,
        }
    }

    #[test]
    fn test_ref_scenario() {
        let mults = [0.5f32];
        let zps = [0];
        let a = args(&mults, &zps, 128);
        let inp = [10, 1000, -1000, 11];
        let mut out = vec![0u8; 4];
        requantize_u8_ref(&a, &mut out, &inp, &BlockType::new(0, 1, 0, 4), 4, 4);
        assert_eq!(out, vec![133, 255, 0, 134]);
    }

    #[test]
    fn test_ref_corrections() {
        // raw - a_zp * col_off - row_off * b_zp + bias
        let mults = [1.0f32];
        let zps = [2];
        let rows = [3, 4];
        let cols = [1, 1];
        let bias = [5, 6];
        let a = RequantizeArgs {
            a_zero_point: 7,
            row_offsets: Some(&rows),
            col_offsets: Some(&cols),
            bias: Some(&bias),
            ..args(&mults, &zps, 0)
        };
        let inp = [100, 100, 100, 100];
        let mut out = vec![0u8; 4];
        requantize_u8_ref(&a, &mut out, &inp, &BlockType::new(0, 2, 0, 2), 2, 2);
        assert_eq!(out, vec![100 - 7 - 6 + 5, 100 - 7 - 6 + 6, 100 - 7 - 8 + 5, 100 - 7 - 8 + 6]);
    }

    #[test]
    fn test_tail_matches_ref() {
        let mults = [0.25f32, 0.5, 0.75];
        let zps = [1, 2, 3];
        let rows = [10, -20];
        let cols = [4, 5, 6];
        let a = RequantizeArgs {
            a_zero_point: 3,
            row_offsets: Some(&rows),
            col_offsets: Some(&cols),
            granularity: Granularity::OutChannel,
            ..args(&mults, &zps, 17)
        };
        let block = BlockType::new(0, 2, 0, 3);
        let inp = [90, -13, 400, 7, 66, -250];
        let mut expected = vec![0u8; 6];
        requantize_u8_ref(&a, &mut expected, &inp, &block, 3, 3);
        let mut got = vec![0u8; 6];
        for i in 0..2 {
            let ro = row_correction::<false>(&a, i);
            requantize_u8_tail::<false, false, false>(&a, &mut got, &inp, &block, 3, 3, i, ro, 0..3);
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn test_dequantize_ref() {
        let zps = [1];
        let scales = [0.5f32];
        let rows = [2];
        let cols = [3, 3];
        let bias = [0.25f32, -100.0];
        let params = DequantizationParams::new(2, 0.5, &zps, &scales, &rows, 2)
            .with_col_offsets(&cols)
            .with_bias(&bias);
        let inp = [20, 20];
        let mut out = vec![0.0f32; 2];
        dequantize_f32_ref(&params, Granularity::Tensor, 0, false, &mut out, &inp, &BlockType::new(0, 1, 0, 2), 2, 2);
        // (20 - 6 - 2) * 0.25 = 3.0
        assert_eq!(out, vec![3.25, -97.0]);
        dequantize_f32_ref(&params, Granularity::Tensor, 0, true, &mut out, &inp, &BlockType::new(0, 1, 0, 2), 2, 2);
        assert_eq!(out, vec![3.25, 0.0]);
    }

    #[test]
    #[should_panic(expected = "Output buffer too small")]
    fn test_dispatch_rejects_short_buffers() {
        let mults = [0.5f32];
        let zps = [0];
        let a = args(&mults, &zps, 0);
        let variant = RequantVariant {
            a_symmetric: true,
            b_symmetric: true,
            has_bias: false,
        };
        let mut out = vec![0u8; 1];
        let inp = vec![7i32; 1];
        let _ = requantize_u8(IsaKind::Avx2, variant, &a, &mut out, &inp, &BlockType::new(0, 1, 0, 64), 64, 64);
    }

    #[test]
    #[should_panic(expected = "bias entries")]
    fn test_dispatch_rejects_variant_without_bias() {
        let mults = [0.5f32];
        let zps = [0];
        let a = args(&mults, &zps, 0);
        let variant = RequantVariant {
            a_symmetric: true,
            b_symmetric: true,
            has_bias: true,
        };
        let mut out = vec![0u8; 16];
        let inp = vec![7i32; 16];
        let _ = requantize_u8(IsaKind::Avx2, variant, &a, &mut out, &inp, &BlockType::new(0, 1, 0, 16), 16, 16);
    }

    #[test]
    #[should_panic(expected = "multipliers")]
    fn test_dispatch_rejects_short_channel_params() {
        let mults = [0.5f32; 4];
        let zps = [0; 4];
        let a = RequantizeArgs {
            granularity: Granularity::OutChannel,
            ..args(&mults, &zps, 0)
        };
        let variant = RequantVariant {
            a_symmetric: true,
            b_symmetric: true,
            has_bias: false,
        };
        let mut out = vec![0u8; 16];
        let inp = vec![7i32; 16];
        let _ = requantize_u8(IsaKind::AnyArch, variant, &a, &mut out, &inp, &BlockType::new(0, 1, 0, 16), 16, 16);
    }

    #[cfg(not(target_arch = "aarch64"))]
    #[test]
    fn test_neon_unavailable() {
        let mults = [0.5f32];
        let zps = [0];
        let a = args(&mults, &zps, 0);
        let variant = RequantVariant {
            a_symmetric: true,
            b_symmetric: true,
            has_bias: false,
        };
        let mut out = vec![0u8; 1];
        let res = requantize_u8(IsaKind::Neon, variant, &a, &mut out, &[1], &BlockType::new(0, 1, 0, 1), 1, 1);
        assert_eq!(res, Err(OutputError::UnsupportedInstructionSet(IsaKind::Neon)));
    }
}
