use crate::block::BlockType;
use crate::error::{OutputError, Result};
use crate::sparse::conv::ConvParams;

/// Sparse `i8` weight matrix in compressed sparse column form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedSparseColumn {
    num_rows: usize,
    num_cols: usize,
    colptr: Vec<usize>,
    rowidx: Vec<usize>,
    values: Vec<i8>,
}

impl CompressedSparseColumn {
    pub fn new(
        num_rows: usize,
        num_cols: usize,
        colptr: Vec<usize>,
        rowidx: Vec<usize>,
        values: Vec<i8>,
    ) -> Result<Self> {
        if colptr.len() != num_cols + 1 {
            return Err(OutputError::InvalidSparse(format!(
                "colptr has {} entries, expected {}",
                colptr.len(),
                num_cols + 1
            )));
        }
        if colptr[0] != 0 || colptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(OutputError::InvalidSparse("colptr must start at 0 and be non-decreasing".into()));
        }
        let nnz = colptr[num_cols];
        if rowidx.len() != nnz || values.len() != nnz {
            return Err(OutputError::InvalidSparse(format!(
                "{} row indices and {} values for {} non-zeros",
                rowidx.len(),
                values.len(),
                nnz
            )));
        }
        if let Some(&r) = rowidx.iter().find(|&&r| r >= num_rows) {
            return Err(OutputError::InvalidSparse(format!("row index {} out of {} rows", r, num_rows)));
        }
        Ok(Self {
            num_rows,
            num_cols,
            colptr,
            rowidx,
            values,
        })
    }

    /// Compresses a row-major dense `num_rows x num_cols` matrix, dropping zeros.
    pub fn from_dense(num_rows: usize, num_cols: usize, dense: &[i8]) -> Self {
        assert_eq!(dense.len(), num_rows * num_cols, "Dense matrix length mismatch");
        let mut colptr = Vec::with_capacity(num_cols + 1);
        let mut rowidx = Vec::new();
        let mut values = Vec::new();
        colptr.push(0);
        for j in 0..num_cols {
            for r in 0..num_rows {
                let v = dense[r * num_cols + j];
                if v != 0 {
                    rowidx.push(r);
                    values.push(v);
                }
            }
            colptr.push(values.len());
        }
        Self {
            num_rows,
            num_cols,
            colptr,
            rowidx,
            values,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn density(&self) -> f64 {
        if self.num_rows == 0 || self.num_cols == 0 {
            return 0.0;
        }
        self.nnz() as f64 / (self.num_rows * self.num_cols) as f64
    }

    /// Non-zeros of column `j` as `(row, value)`.
    pub fn column(&self, j: usize) -> impl Iterator<Item = (usize, i8)> + '_ {
        let range = self.colptr[j]..self.colptr[j + 1];
        self.rowidx[range.clone()].iter().copied().zip(self.values[range].iter().copied())
    }

    fn zero_block(block: &BlockType, c: &mut [i32], ldc: usize) {
        for i in 0..block.row_size {
            c[i * ldc..i * ldc + block.col_size].fill(0);
        }
    }

    /// Sparse-times-dense product into a block-relative accumulator block:
    /// `c[i - row_start][j - col_start] += sum_r a[i * lda + r] * B[r][j]`.
    ///
    /// `a` starts at this operand's first row (callers offset it by group).
    pub fn spmdm(&self, block: &BlockType, a: &[u8], lda: usize, accumulate: bool, c: &mut [i32], ldc: usize) {
        assert!(
            block.col_end() <= self.num_cols,
            "Block columns {}..{} exceed sparse operand width {}",
            block.col_start,
            block.col_end(),
            self.num_cols
        );
        block.assert_input_fits(c.len(), ldc);
        assert!(lda >= self.num_rows, "lda {} smaller than sparse operand rows {}", lda, self.num_rows);
        if self.num_rows > 0 {
            assert!(
                a.len() >= (block.row_end() - 1) * lda + self.num_rows,
                "Dense operand too small for rows {}..{}",
                block.row_start,
                block.row_end()
            );
        }
        if !accumulate {
            Self::zero_block(block, c, ldc);
        }
        for j in block.col_start..block.col_end() {
            let j_rel = j - block.col_start;
            for (r, v) in self.column(j) {
                let v = v as i32;
                for i in block.row_start..block.row_end() {
                    let dst = &mut c[(i - block.row_start) * ldc + j_rel];
                    *dst = dst.wrapping_add((a[i * lda + r] as i32).wrapping_mul(v));
                }
            }
        }
    }

    /// Sparse 2-D convolution into a block-relative accumulator block.
    ///
    /// Row `r` of this operand encodes `(kh * KW + kw) * IC_per_group + ic`; columns
    /// are output channels. Taps landing in padding read `a_zero_point`.
    pub fn sparse_conv(
        &self,
        conv: &ConvParams,
        block: &BlockType,
        a: &[u8],
        a_zero_point: i32,
        accumulate: bool,
        c: &mut [i32],
        ldc: usize,
    ) {
        assert_eq!(self.num_cols, conv.out_channels, "Sparse operand columns must equal output channels");
        assert_eq!(self.num_rows, conv.kernel_rows(), "Sparse operand rows must equal KH * KW * IC / G");
        assert!(
            block.col_end() <= self.num_cols,
            "Block columns {}..{} exceed output channels {}",
            block.col_start,
            block.col_end(),
            self.num_cols
        );
        assert!(
            block.row_end() <= conv.output_rows(),
            "Block rows {}..{} exceed output pixels {}",
            block.row_start,
            block.row_end(),
            conv.output_rows()
        );
        assert!(a.len() >= conv.input_len(), "Input activations too small: {} < {}", a.len(), conv.input_len());
        block.assert_input_fits(c.len(), ldc);
        if !accumulate {
            Self::zero_block(block, c, ldc);
        }

        let [out_h, out_w] = conv.out_dim();
        let [in_h, in_w] = conv.in_dim;
        let ic_per_group = conv.in_channels / conv.groups;
        let oc_per_group = conv.out_channels / conv.groups;
        let kernel_w = conv.kernel[1];

        for j in block.col_start..block.col_end() {
            let j_rel = j - block.col_start;
            let g = j / oc_per_group;
            for (r, v) in self.column(j) {
                let v = v as i32;
                let ic = g * ic_per_group + r % ic_per_group;
                let kw = (r / ic_per_group) % kernel_w;
                let kh = r / ic_per_group / kernel_w;
                for i in block.row_start..block.row_end() {
                    let ow = i % out_w;
                    let oh = (i / out_w) % out_h;
                    let n = i / out_w / out_h;
                    let ih = (oh * conv.stride[0] + kh * conv.dilation[0]) as isize - conv.pad[0] as isize;
                    let iw = (ow * conv.stride[1] + kw * conv.dilation[1]) as isize - conv.pad[1] as isize;
                    let a_val = if ih >= 0 && (ih as usize) < in_h && iw >= 0 && (iw as usize) < in_w {
                        a[((n * in_h + ih as usize) * in_w + iw as usize) * conv.in_channels + ic] as i32
                    } else {
                        a_zero_point
                    };
                    let dst = &mut c[(i - block.row_start) * ldc + j_rel];
                    *dst = dst.wrapping_add(a_val.wrapping_mul(v));
                }
            }
        }
    }
}
