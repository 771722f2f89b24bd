use crate::error::{OutputError, Result};

/// 2-D convolution geometry for sparse-convolution accumulation.
///
/// Input activations are NHWC; output rows are pixels `(n * OH + oh) * OW + ow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvParams {
    pub batch: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub groups: usize,
    pub in_dim: [usize; 2],
    pub kernel: [usize; 2],
    pub stride: [usize; 2],
    pub dilation: [usize; 2],
    /// top, left, bottom, right
    pub pad: [usize; 4],
}

impl ConvParams {
    pub fn new(batch: usize, in_channels: usize, out_channels: usize, in_dim: [usize; 2], kernel: [usize; 2]) -> Self {
        Self {
            batch,
            in_channels,
            out_channels,
            groups: 1,
            in_dim,
            kernel,
            stride: [1, 1],
            dilation: [1, 1],
            pad: [0; 4],
        }
    }

    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_stride(mut self, stride: [usize; 2]) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_dilation(mut self, dilation: [usize; 2]) -> Self {
        self.dilation = dilation;
        self
    }

    pub fn with_pad(mut self, pad: [usize; 4]) -> Self {
        self.pad = pad;
        self
    }

    fn effective_kernel(&self, axis: usize) -> usize {
        self.dilation[axis] * (self.kernel[axis] - 1) + 1
    }

    fn padded_input(&self, axis: usize) -> usize {
        self.in_dim[axis] + self.pad[axis] + self.pad[axis + 2]
    }

    pub fn out_dim(&self) -> [usize; 2] {
        [0, 1].map(|axis| (self.padded_input(axis) - self.effective_kernel(axis)) / self.stride[axis] + 1)
    }

    /// Number of output pixels, i.e. rows of the accumulator matrix.
    pub fn output_rows(&self) -> usize {
        let [oh, ow] = self.out_dim();
        self.batch * oh * ow
    }

    /// Rows of the per-group weight matrix: `KH * KW * IC / G`.
    pub fn kernel_rows(&self) -> usize {
        self.kernel[0] * self.kernel[1] * (self.in_channels / self.groups)
    }

    pub fn input_len(&self) -> usize {
        self.batch * self.in_dim[0] * self.in_dim[1] * self.in_channels
    }

    pub fn validate(&self) -> Result<()> {
        if self.groups == 0 {
            return Err(OutputError::ZeroGroups);
        }
        if self.in_channels % self.groups != 0 || self.out_channels % self.groups != 0 {
            return Err(OutputError::InvalidConv(format!(
                "channels {}->{} not divisible by {} groups",
                self.in_channels, self.out_channels, self.groups
            )));
        }
        if self.stride.contains(&0) || self.dilation.contains(&0) || self.kernel.contains(&0) {
            return Err(OutputError::InvalidConv(format!(
                "zero stride {:?}, dilation {:?} or kernel {:?}",
                self.stride, self.dilation, self.kernel
            )));
        }
        for axis in 0..2 {
            if self.effective_kernel(axis) > self.padded_input(axis) {
                return Err(OutputError::InvalidConv(format!(
                    "kernel extent {} larger than padded input {} on axis {}",
                    self.effective_kernel(axis),
                    self.padded_input(axis),
                    axis
                )));
            }
        }
        Ok(())
    }
}
