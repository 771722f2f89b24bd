use crate::params::Granularity;

/// Rounds a scaled accumulator half-to-even, adds the output zero point and
/// clamps to `[clamp_min, 255]`.
#[inline(always)]
pub fn saturate_u8(scaled: f32, output_zero_point: i32, clamp_min: i32) -> u8 {
    let rounded = (scaled.round_ties_even() as i64).saturating_add(output_zero_point as i64);
    rounded.min(255).max(clamp_min as i64) as u8
}

/// Bucket used for every column of a block under `Tensor` or `Group` granularity.
#[inline]
pub fn block_param_idx(granularity: Granularity, group: usize) -> usize {
    match granularity {
        Granularity::Group => group,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturate_u8() {
        assert_eq!(saturate_u8(5.0, 128, 0), 133);
        assert_eq!(saturate_u8(255.4, 0, 0), 255);
        assert_eq!(saturate_u8(-0.4, 0, 0), 0);
        assert_eq!(saturate_u8(1e9, 0, 0), 255);
        assert_eq!(saturate_u8(-1e9, 200, 0), 0);
        assert_eq!(saturate_u8(f32::INFINITY, 100, 0), 255);
        assert_eq!(saturate_u8(f32::NEG_INFINITY, 100, 0), 0);
        // ties go to even
        assert_eq!(saturate_u8(2.5, 0, 0), 2);
        assert_eq!(saturate_u8(3.5, 0, 0), 4);
        assert_eq!(saturate_u8(-2.5, 10, 0), 8);
        // fused relu floor
        assert_eq!(saturate_u8(-3.0, 10, 10), 10);
    }

    #[test]
    fn test_block_param_idx() {
        assert_eq!(block_param_idx(Granularity::Tensor, 3), 0);
        assert_eq!(block_param_idx(Granularity::Group, 3), 3);
        assert_eq!(block_param_idx(Granularity::OutChannel, 3), 0);
    }
}
