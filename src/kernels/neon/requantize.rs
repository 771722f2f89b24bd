// Allow unsafe operations in unsafe functions without explicit unsafe blocks
#![allow(unsafe_op_in_unsafe_fn)]

use crate::block::BlockType;
use crate::kernels::requantize::{row_correction, requantize_u8_tail, RequantizeArgs};
use crate::kernels::utils;
use crate::params::{Granularity, RequantVariant};
use core::arch::aarch64::*;

const VLEN: usize = 4;

/// Picks the NEON instantiation for `variant`.
///
/// # Safety
/// The block must lie inside `out`, `inp` and every per-column parameter
/// array (the pipeline stage asserts this).
pub unsafe fn requantize_u8_neon(
    variant: RequantVariant,
    args: &RequantizeArgs<'_>,
    out: &mut [u8],
    inp: &[i32],
    block: &BlockType,
    ld_out: usize,
    ld_in: usize,
) {
    match (variant.a_symmetric, variant.b_symmetric, variant.has_bias) {
        (true, true, false) => requantize_u8_neon_impl::<true, true, false>(args, out, inp, block, ld_out, ld_in),
        (true, true, true) => requantize_u8_neon_impl::<true, true, true>(args, out, inp, block, ld_out, ld_in),
        (true, false, false) => requantize_u8_neon_impl::<true, false, false>(args, out, inp, block, ld_out, ld_in),
        (true, false, true) => requantize_u8_neon_impl::<true, false, true>(args, out, inp, block, ld_out, ld_in),
        (false, true, false) => requantize_u8_neon_impl::<false, true, false>(args, out, inp, block, ld_out, ld_in),
        (false, true, true) => requantize_u8_neon_impl::<false, true, true>(args, out, inp, block, ld_out, ld_in),
        (false, false, false) => requantize_u8_neon_impl::<false, false, false>(args, out, inp, block, ld_out, ld_in),
        (false, false, true) => requantize_u8_neon_impl::<false, false, true>(args, out, inp, block, ld_out, ld_in),
    }
}

/// Per-row constants shared by every vector of the row.
struct RowState {
    a_zero_point_v: int32x4_t,
    row_offset_v: int32x4_t,
    raw_row_offset_v: int32x4_t,
    multiplier_v: float32x4_t,
    out_channel: bool,
}

/// Corrects, scales and rounds 4 columns starting at absolute column `j`.
#[inline(always)]
unsafe fn process_x4<const A_SYMMETRIC: bool, const B_SYMMETRIC: bool, const HAS_BIAS: bool>(
    src: *const i32,
    j: usize,
    state: &RowState,
    args: &RequantizeArgs<'_>,
) -> int32x4_t {
    let mut x = vld1q_s32(src);
    if !A_SYMMETRIC {
        let col_offsets = args.col_offsets.unwrap_or(&[]).as_ptr();
        x = vsubq_s32(x, vmulq_s32(state.a_zero_point_v, vld1q_s32(col_offsets.add(j))));
    }
    if !B_SYMMETRIC {
        let row_off_v = if state.out_channel {
            vmulq_s32(state.raw_row_offset_v, vld1q_s32(args.b_zero_points.as_ptr().add(j)))
        } else {
            state.row_offset_v
        };
        x = vsubq_s32(x, row_off_v);
    }
    if HAS_BIAS {
        let bias = args.bias.unwrap_or(&[]).as_ptr();
        x = vaddq_s32(x, vld1q_s32(bias.add(j)));
    }
    let m = if state.out_channel {
        vld1q_f32(args.multipliers.as_ptr().add(j))
    } else {
        state.multiplier_v
    };
    // vcvtnq rounds to nearest with ties to even
    vcvtnq_s32_f32(vmulq_f32(vcvtq_f32_s32(x), m))
}

unsafe fn requantize_u8_neon_impl<const A_SYMMETRIC: bool, const B_SYMMETRIC: bool, const HAS_BIAS: bool>(
    args: &RequantizeArgs<'_>,
    out: &mut [u8],
    inp: &[i32],
    block: &BlockType,
    ld_out: usize,
    ld_in: usize,
) {
    let out_channel = args.granularity == Granularity::OutChannel;
    let param_idx = utils::block_param_idx(args.granularity, args.group);
    let row_offsets = args.row_offsets.unwrap_or(&[]);
    let c_zero_point_v = vdupq_n_s16(args.output_zero_point as i16);
    let clamp_min_v = vdupq_n_u8(args.clamp_min as u8);
    let clamp_min_half_v = vdup_n_u8(args.clamp_min as u8);

    let col_end = block.col_end();
    let unrolled_end = block.col_start + block.col_size / (VLEN * 4) * (VLEN * 4);
    let half_end = block.col_start + block.col_size / (VLEN * 2) * (VLEN * 2);

    for i in block.row_start..block.row_end() {
        let i_rel = i - block.row_start;
        let row_offset = row_correction::<B_SYMMETRIC>(args, i_rel);
        let state = RowState {
            a_zero_point_v: vdupq_n_s32(args.a_zero_point),
            row_offset_v: vdupq_n_s32(row_offset),
            raw_row_offset_v: if !B_SYMMETRIC && out_channel {
                vdupq_n_s32(row_offsets[i_rel])
            } else {
                vdupq_n_s32(0)
            },
            multiplier_v: vdupq_n_f32(args.multipliers[param_idx]),
            out_channel,
        };
        let in_row = inp.as_ptr().add(i_rel * ld_in);
        let out_row = out.as_mut_ptr().add(i * ld_out);

        let mut j = block.col_start;
        while j < unrolled_end {
            let src = in_row.add(j - block.col_start);
            let x = process_x4::<A_SYMMETRIC, B_SYMMETRIC, HAS_BIAS>(src, j, &state, args);
            let y = process_x4::<A_SYMMETRIC, B_SYMMETRIC, HAS_BIAS>(src.add(VLEN), j + VLEN, &state, args);
            let z = process_x4::<A_SYMMETRIC, B_SYMMETRIC, HAS_BIAS>(src.add(2 * VLEN), j + 2 * VLEN, &state, args);
            let w = process_x4::<A_SYMMETRIC, B_SYMMETRIC, HAS_BIAS>(src.add(3 * VLEN), j + 3 * VLEN, &state, args);

            // i32 -> i16 (saturating), + zero point (saturating), i16 -> u8 (saturating)
            let xy = vqaddq_s16(vcombine_s16(vqmovn_s32(x), vqmovn_s32(y)), c_zero_point_v);
            let zw = vqaddq_s16(vcombine_s16(vqmovn_s32(z), vqmovn_s32(w)), c_zero_point_v);
            let packed = vcombine_u8(vqmovun_s16(xy), vqmovun_s16(zw));
            vst1q_u8(out_row.add(j), vmaxq_u8(packed, clamp_min_v));
            j += VLEN * 4;
        }

        while j < half_end {
            let src = in_row.add(j - block.col_start);
            let x = process_x4::<A_SYMMETRIC, B_SYMMETRIC, HAS_BIAS>(src, j, &state, args);
            let y = process_x4::<A_SYMMETRIC, B_SYMMETRIC, HAS_BIAS>(src.add(VLEN), j + VLEN, &state, args);
            let xy = vqaddq_s16(vcombine_s16(vqmovn_s32(x), vqmovn_s32(y)), c_zero_point_v);
            vst1_u8(out_row.add(j), vmax_u8(vqmovun_s16(xy), clamp_min_half_v));
            j += VLEN * 2;
        }

        if j < col_end {
            requantize_u8_tail::<A_SYMMETRIC, B_SYMMETRIC, HAS_BIAS>(
                args, out, inp, block, ld_out, ld_in, i, row_offset, j..col_end,
            );
        }
    }
}
