use crate::error::{OutputError, Result};

/// How output columns share weight zero points and scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// One pair for the whole matrix.
    Tensor,
    /// One pair per group of `num_columns / num_groups` columns.
    Group,
    /// One pair per output column.
    OutChannel,
}

impl Granularity {
    /// Number of zero points / scales this granularity expects.
    pub fn param_count(self, num_groups: usize, num_columns: usize) -> usize {
        match self {
            Granularity::Tensor => 1,
            Granularity::Group => num_groups,
            Granularity::OutChannel => num_columns,
        }
    }

    /// Index of the zero point / scale applying to column `col` of group `group`.
    #[inline]
    pub fn bucket(self, group: usize, col: usize) -> usize {
        match self {
            Granularity::Tensor => 0,
            Granularity::Group => group,
            Granularity::OutChannel => col,
        }
    }
}

/// Which corrections a requantization kernel must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequantVariant {
    pub a_symmetric: bool,
    pub b_symmetric: bool,
    pub has_bias: bool,
}

fn check_groups(num_groups: usize, num_columns: usize) -> Result<()> {
    if num_groups == 0 {
        return Err(OutputError::ZeroGroups);
    }
    if num_columns % num_groups != 0 {
        return Err(OutputError::GroupsDoNotDivide {
            columns: num_columns,
            groups: num_groups,
        });
    }
    Ok(())
}

fn check_len(name: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(OutputError::ParamLength {
            name,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_finite(name: &'static str, values: &[f32]) -> Result<()> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(OutputError::NonFiniteScale { name });
    }
    Ok(())
}

/// Quantization parameters for the int32 -> u8 path.
///
/// `row_offsets` is indexed relative to the block being processed, every
/// per-column array by absolute column.
#[derive(Debug, Clone, Copy)]
pub struct RequantizationParams<'a> {
    pub a_zero_point: i32,
    pub b_zero_points: &'a [i32],
    /// `scale_A * scale_B` per granularity bucket.
    pub multipliers: &'a [f32],
    pub output_zero_point: i32,
    pub row_offsets: Option<&'a [i32]>,
    pub col_offsets: Option<&'a [i32]>,
    pub bias: Option<&'a [i32]>,
    pub num_columns: usize,
    pub num_groups: usize,
}

impl<'a> RequantizationParams<'a> {
    pub fn new(
        a_zero_point: i32,
        b_zero_points: &'a [i32],
        multipliers: &'a [f32],
        output_zero_point: i32,
        num_columns: usize,
    ) -> Self {
        Self {
            a_zero_point,
            b_zero_points,
            multipliers,
            output_zero_point,
            row_offsets: None,
            col_offsets: None,
            bias: None,
            num_columns,
            num_groups: 1,
        }
    }

    pub fn with_groups(mut self, num_groups: usize) -> Self {
        self.num_groups = num_groups;
        self
    }

    pub fn with_row_offsets(mut self, row_offsets: &'a [i32]) -> Self {
        self.row_offsets = Some(row_offsets);
        self
    }

    pub fn with_col_offsets(mut self, col_offsets: &'a [i32]) -> Self {
        self.col_offsets = Some(col_offsets);
        self
    }

    pub fn with_bias(mut self, bias: &'a [i32]) -> Self {
        self.bias = Some(bias);
        self
    }

    pub fn cols_per_group(&self) -> usize {
        self.num_columns / self.num_groups
    }

    pub fn validate(&self, granularity: Granularity) -> Result<()> {
        check_groups(self.num_groups, self.num_columns)?;
        let count = granularity.param_count(self.num_groups, self.num_columns);
        check_len("b_zero_points", self.b_zero_points.len(), count)?;
        check_len("multipliers", self.multipliers.len(), count)?;
        check_finite("multipliers", self.multipliers)?;
        if !(0..=255).contains(&self.output_zero_point) {
            return Err(OutputError::OutputZeroPoint(self.output_zero_point));
        }
        match self.col_offsets {
            Some(c) => check_len("col_offsets", c.len(), self.num_columns)?,
            None if self.a_zero_point != 0 => return Err(OutputError::MissingColOffsets),
            None => {}
        }
        if let Some(b) = self.bias {
            check_len("bias", b.len(), self.num_columns)?;
        }
        Ok(())
    }

    /// Resolves the symmetric/bias flags once so kernels never test them per element.
    pub fn variant(&self, granularity: Granularity) -> RequantVariant {
        RequantVariant {
            a_symmetric: self.a_zero_point == 0,
            b_symmetric: (granularity == Granularity::Tensor && self.b_zero_points[0] == 0)
                || self.row_offsets.is_none(),
            has_bias: self.bias.is_some(),
        }
    }
}

/// Quantization parameters for the int32 -> f32 path.
#[derive(Debug, Clone, Copy)]
pub struct DequantizationParams<'a> {
    pub a_zero_point: i32,
    pub a_scale: f32,
    pub b_zero_points: &'a [i32],
    pub b_scales: &'a [f32],
    /// Always applied, indexed relative to the block.
    pub row_offsets: &'a [i32],
    pub col_offsets: Option<&'a [i32]>,
    /// Real-valued, added after scaling.
    pub bias: Option<&'a [f32]>,
    pub num_columns: usize,
    pub num_groups: usize,
}

impl<'a> DequantizationParams<'a> {
    pub fn new(
        a_zero_point: i32,
        a_scale: f32,
        b_zero_points: &'a [i32],
        b_scales: &'a [f32],
        row_offsets: &'a [i32],
        num_columns: usize,
    ) -> Self {
        Self {
            a_zero_point,
            a_scale,
            b_zero_points,
            b_scales,
            row_offsets,
            col_offsets: None,
            bias: None,
            num_columns,
            num_groups: 1,
        }
    }

    pub fn with_groups(mut self, num_groups: usize) -> Self {
        self.num_groups = num_groups;
        self
    }

    pub fn with_col_offsets(mut self, col_offsets: &'a [i32]) -> Self {
        self.col_offsets = Some(col_offsets);
        self
    }

    pub fn with_bias(mut self, bias: &'a [f32]) -> Self {
        self.bias = Some(bias);
        self
    }

    pub fn cols_per_group(&self) -> usize {
        self.num_columns / self.num_groups
    }

    pub fn validate(&self, granularity: Granularity) -> Result<()> {
        check_groups(self.num_groups, self.num_columns)?;
        let count = granularity.param_count(self.num_groups, self.num_columns);
        check_len("b_zero_points", self.b_zero_points.len(), count)?;
        check_len("b_scales", self.b_scales.len(), count)?;
        check_finite("b_scales", self.b_scales)?;
        check_finite("a_scale", &[self.a_scale])?;
        match self.col_offsets {
            Some(c) => check_len("col_offsets", c.len(), self.num_columns)?,
            None if self.a_zero_point != 0 => return Err(OutputError::MissingColOffsets),
            None => {}
        }
        if let Some(b) = self.bias {
            check_len("bias", b.len(), self.num_columns)?;
        }
        Ok(())
    }
}
