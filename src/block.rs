/// A rectangle of the logical output matrix.
///
/// Accumulator buffers hold a block block-relative (`(i - row_start) * ld + (j - col_start)`),
/// destination buffers hold the whole matrix (`i * ld + j`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockType {
    pub row_start: usize,
    pub row_size: usize,
    pub col_start: usize,
    pub col_size: usize,
}

impl BlockType {
    pub fn new(row_start: usize, row_size: usize, col_start: usize, col_size: usize) -> Self {
        assert!(row_size > 0, "Block row_size must be positive");
        assert!(col_size > 0, "Block col_size must be positive");
        Self {
            row_start,
            row_size,
            col_start,
            col_size,
        }
    }

    pub fn row_end(&self) -> usize {
        self.row_start + self.row_size
    }

    pub fn col_end(&self) -> usize {
        self.col_start + self.col_size
    }

    /// Minimum length of a destination buffer holding this block at its absolute position.
    pub fn output_extent(&self, ld_out: usize) -> usize {
        (self.row_end() - 1) * ld_out + self.col_end()
    }

    /// Minimum length of a block-relative input buffer.
    pub fn input_extent(&self, ld_in: usize) -> usize {
        (self.row_size - 1) * ld_in + self.col_size
    }

    pub fn assert_output_fits(&self, len: usize, ld_out: usize) {
        assert!(
            ld_out >= self.col_end(),
            "Output leading dimension {} smaller than block column end {}",
            ld_out,
            self.col_end()
        );
        assert!(
            len >= self.output_extent(ld_out),
            "Output buffer too small for block {:?}: {} < {}",
            self,
            len,
            self.output_extent(ld_out)
        );
    }

    pub fn assert_input_fits(&self, len: usize, ld_in: usize) {
        assert!(
            ld_in >= self.col_size,
            "Input leading dimension {} smaller than block width {}",
            ld_in,
            self.col_size
        );
        assert!(
            len >= self.input_extent(ld_in),
            "Input buffer too small for block {:?}: {} < {}",
            self,
            len,
            self.input_extent(ld_in)
        );
    }

    /// Asserts the block's columns stay inside `[0, num_columns)` and inside a single group.
    /// Returns the group index.
    pub fn assert_single_group(&self, num_columns: usize, cols_per_group: usize) -> usize {
        assert!(
            self.col_end() <= num_columns,
            "Block columns {}..{} exceed matrix width {}",
            self.col_start,
            self.col_end(),
            num_columns
        );
        assert!(
            self.col_size <= cols_per_group && self.col_start / cols_per_group == (self.col_end() - 1) / cols_per_group,
            "Block columns {}..{} span more than one group of {} columns",
            self.col_start,
            self.col_end(),
            cols_per_group
        );
        self.col_start / cols_per_group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extents() {
        let block = BlockType::new(2, 3, 4, 5);
        assert_eq!(block.row_end(), 5);
        assert_eq!(block.col_end(), 9);
        // last element (4, 8) with ld 16
        assert_eq!(block.output_extent(16), 4 * 16 + 9);
        assert_eq!(block.input_extent(5), 2 * 5 + 5);
    }

    #[test]
    fn test_single_group() {
        let block = BlockType::new(0, 1, 8, 8);
        assert_eq!(block.assert_single_group(32, 8), 1);
    }

    #[test]
    #[should_panic(expected = "more than one group")]
    fn test_group_straddle_panics() {
        BlockType::new(0, 1, 4, 8).assert_single_group(32, 8);
    }

    #[test]
    #[should_panic(expected = "Output buffer too small")]
    fn test_output_bounds_panics() {
        BlockType::new(1, 2, 0, 4).assert_output_fits(8, 4);
    }

    #[test]
    #[should_panic(expected = "row_size must be positive")]
    fn test_empty_block_panics() {
        BlockType::new(0, 0, 0, 4);
    }
}
