#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use crate::block::BlockType;
use crate::kernels::requantize::{row_correction, requantize_u8_tail, RequantizeArgs};
use crate::kernels::utils;
use crate::params::{Granularity, RequantVariant};

const VLEN: usize = 8;
const I32_F32_LIMIT: f32 = 2147483520.0;

/// Picks the AVX2 instantiation for `variant`.
///
/// # Safety
/// The CPU must support AVX2 and the block must lie inside `out`, `inp` and
/// every per-column parameter array (the pipeline stage asserts this).
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
pub unsafe fn requantize_u8_avx2(
    variant: RequantVariant,
    args: &RequantizeArgs<'_>,
    out: &mut [u8],
    inp: &[i32],
    block: &BlockType,
    ld_out: usize,
    ld_in: usize,
) {
    unsafe {
        match (variant.a_symmetric, variant.b_symmetric, variant.has_bias) {
            (true, true, false) => requantize_u8_avx2_impl::<true, true, false>(args, out, inp, block, ld_out, ld_in),
            (true, true, true) => requantize_u8_avx2_impl::<true, true, true>(args, out, inp, block, ld_out, ld_in),
            (true, false, false) => requantize_u8_avx2_impl::<true, false, false>(args, out, inp, block, ld_out, ld_in),
            (true, false, true) => requantize_u8_avx2_impl::<true, false, true>(args, out, inp, block, ld_out, ld_in),
            (false, true, false) => requantize_u8_avx2_impl::<false, true, false>(args, out, inp, block, ld_out, ld_in),
            (false, true, true) => requantize_u8_avx2_impl::<false, true, true>(args, out, inp, block, ld_out, ld_in),
            (false, false, false) => requantize_u8_avx2_impl::<false, false, false>(args, out, inp, block, ld_out, ld_in),
            (false, false, true) => requantize_u8_avx2_impl::<false, false, true>(args, out, inp, block, ld_out, ld_in),
        }
    }
}

/// Applies the int32 corrections to 8 columns starting at absolute column `j`.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
unsafe fn correct_epi32<const A_SYMMETRIC: bool, const B_SYMMETRIC: bool, const HAS_BIAS: bool>(
    mut x: __m256i,
    j: usize,
    out_channel: bool,
    a_zero_point_v: __m256i,
    row_offset_v: __m256i,
    raw_row_offset_v: __m256i,
    col_offsets: *const i32,
    b_zero_points: *const i32,
    bias: *const i32,
) -> __m256i {
    unsafe {
        if !A_SYMMETRIC {
            let col_off_v = _mm256_mullo_epi32(
                a_zero_point_v,
                _mm256_loadu_si256(col_offsets.add(j) as *const __m256i),
            );
            x = _mm256_sub_epi32(x, col_off_v);
        }
        if !B_SYMMETRIC {
            let row_off_v = if out_channel {
                _mm256_mullo_epi32(
                    raw_row_offset_v,
                    _mm256_loadu_si256(b_zero_points.add(j) as *const __m256i),
                )
            } else {
                row_offset_v
            };
            x = _mm256_sub_epi32(x, row_off_v);
        }
        if HAS_BIAS {
            x = _mm256_add_epi32(x, _mm256_loadu_si256(bias.add(j) as *const __m256i));
        }
        x
    }
}

/// int32 -> f32, scale, round half to even back to int32.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
unsafe fn scale_round(x: __m256i, j: usize, out_channel: bool, multipliers: *const f32, multiplier_v: __m256) -> __m256i {
    unsafe {
        let m = if out_channel {
            _mm256_loadu_ps(multipliers.add(j))
        } else {
            multiplier_v
        };
        // cvtps_epi32 yields INT_MIN past i32 range; clamp to the largest f32 inside it.
        let scaled = _mm256_mul_ps(_mm256_cvtepi32_ps(x), m);
        let scaled = _mm256_min_ps(_mm256_max_ps(scaled, _mm256_set1_ps(-I32_F32_LIMIT)), _mm256_set1_ps(I32_F32_LIMIT));
        // default MXCSR mode: nearest, ties to even
        _mm256_cvtps_epi32(scaled)
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn requantize_u8_avx2_impl<const A_SYMMETRIC: bool, const B_SYMMETRIC: bool, const HAS_BIAS: bool>(
    args: &RequantizeArgs<'_>,
    out: &mut [u8],
    inp: &[i32],
    block: &BlockType,
    ld_out: usize,
    ld_in: usize,
) {
    unsafe {
        let out_channel = args.granularity == Granularity::OutChannel;
        let param_idx = utils::block_param_idx(args.granularity, args.group);
        let multiplier_v = _mm256_set1_ps(args.multipliers[param_idx]);
        let multipliers = args.multipliers.as_ptr();
        let col_offsets = args.col_offsets.unwrap_or(&[]).as_ptr();
        let row_offsets = args.row_offsets.unwrap_or(&[]);
        let b_zero_points = args.b_zero_points.as_ptr();
        let bias = args.bias.unwrap_or(&[]).as_ptr();

        let a_zero_point_v = _mm256_set1_epi32(args.a_zero_point);
        let c_zero_point_epi16_v = _mm256_set1_epi16(args.output_zero_point as i16);
        let clamp_min_v = _mm256_set1_epi8(args.clamp_min as u8 as i8);
        let permute_mask_v = _mm256_setr_epi32(0, 4, 1, 5, 2, 6, 3, 7);

        let col_end = block.col_end();
        let unrolled_end = block.col_start + block.col_size / (VLEN * 4) * (VLEN * 4);
        let vector_end = block.col_start + block.col_size / VLEN * VLEN;

        for i in block.row_start..block.row_end() {
            let i_rel = i - block.row_start;
            let row_offset = row_correction::<B_SYMMETRIC>(args, i_rel);
            let row_offset_v = _mm256_set1_epi32(row_offset);
            let raw_row_offset_v = if !B_SYMMETRIC && out_channel {
                _mm256_set1_epi32(row_offsets[i_rel])
            } else {
                _mm256_setzero_si256()
            };
            let in_row = inp.as_ptr().add(i_rel * ld_in);
            let out_row = out.as_mut_ptr().add(i * ld_out);

            let mut j = block.col_start;
            while j < unrolled_end {
                let src = in_row.add(j - block.col_start);
                let mut v = [_mm256_setzero_si256(); 4];
                for (u, lane) in v.iter_mut().enumerate() {
                    let x = _mm256_loadu_si256(src.add(u * VLEN) as *const __m256i);
                    let x = correct_epi32::<A_SYMMETRIC, B_SYMMETRIC, HAS_BIAS>(
                        x,
                        j + u * VLEN,
                        out_channel,
                        a_zero_point_v,
                        row_offset_v,
                        raw_row_offset_v,
                        col_offsets,
                        b_zero_points,
                        bias,
                    );
                    *lane = scale_round(x, j + u * VLEN, out_channel, multipliers, multiplier_v);
                }

                // i32 -> i16 (saturating), + zero point (saturating), i16 -> u8 (saturating)
                let xy = _mm256_adds_epi16(_mm256_packs_epi32(v[0], v[1]), c_zero_point_epi16_v);
                let zw = _mm256_adds_epi16(_mm256_packs_epi32(v[2], v[3]), c_zero_point_epi16_v);
                let packed = _mm256_packus_epi16(xy, zw);
                let clamped = _mm256_max_epu8(clamp_min_v, packed);
                // lanes come out as x0-3 y0-3 z0-3 w0-3 x4-7 y4-7 z4-7 w4-7
                let ordered = _mm256_permutevar8x32_epi32(clamped, permute_mask_v);
                _mm256_storeu_si256(out_row.add(j) as *mut __m256i, ordered);
                j += VLEN * 4;
            }

            while j < vector_end {
                let x = _mm256_loadu_si256(in_row.add(j - block.col_start) as *const __m256i);
                let x = correct_epi32::<A_SYMMETRIC, B_SYMMETRIC, HAS_BIAS>(
                    x,
                    j,
                    out_channel,
                    a_zero_point_v,
                    row_offset_v,
                    raw_row_offset_v,
                    col_offsets,
                    b_zero_points,
                    bias,
                );
                let x = scale_round(x, j, out_channel, multipliers, multiplier_v);
                let packed = _mm256_adds_epi16(
                    _mm256_packs_epi32(x, _mm256_setzero_si256()),
                    c_zero_point_epi16_v,
                );
                let packed = _mm256_packus_epi16(packed, _mm256_setzero_si256());
                let clamped = _mm256_max_epu8(clamp_min_v, packed);
                // x0-3 garbage x4-7 garbage
                let ordered = _mm256_permutevar8x32_epi32(clamped, permute_mask_v);
                _mm_storel_epi64(out_row.add(j) as *mut __m128i, _mm256_castsi256_si128(ordered));
                j += VLEN;
            }

            if j < col_end {
                requantize_u8_tail::<A_SYMMETRIC, B_SYMMETRIC, HAS_BIAS>(
                    args, out, inp, block, ld_out, ld_in, i, row_offset, j..col_end,
                );
            }
        }
    }
}
