use std::ops::Range;

use crate::error::ContractViolation;

/// Geometry of one im2col unrolling: a single image of a single channel group.
///
/// The column matrix has `channels * filter_height * filter_width` rows (the GEMM reduction
/// dimension) and `output_height * output_width` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Im2ColGeometry {
    /// Channels in the group.
    pub channels: usize,
    /// Input height.
    pub height: usize,
    /// Input width.
    pub width: usize,
    /// Filter height.
    pub filter_height: usize,
    /// Filter width.
    pub filter_width: usize,
    /// Vertical stride.
    pub stride_height: usize,
    /// Horizontal stride.
    pub stride_width: usize,
    /// Zero padding above and below.
    pub padding_height: usize,
    /// Zero padding left and right.
    pub padding_width: usize,
    /// Output height.
    pub output_height: usize,
    /// Output width.
    pub output_width: usize,
}

impl Im2ColGeometry {
    /// Rows of the column matrix, `channels * filter_height * filter_width`.
    #[inline]
    pub fn col_rows(&self) -> usize {
        self.channels * self.filter_height * self.filter_width
    }

    /// Columns of the column matrix, `output_height * output_width`.
    #[inline]
    pub fn col_cols(&self) -> usize {
        self.output_height * self.output_width
    }

    /// Elements of the column matrix.
    #[inline]
    pub fn col_len(&self) -> usize {
        self.col_rows() * self.col_cols()
    }

    /// Elements of the source image.
    #[inline]
    pub fn image_len(&self) -> usize {
        self.channels * self.height * self.width
    }
}

/// Unrolls image patches into a column matrix.
///
/// Row `r = c * FH * FW + fh * FW + fw`, column `h * OW + w` of the output holds the input
/// pixel at `(h * stride_h + fh - pad_h, w * stride_w + fw - pad_w)` of channel `c`, or zero
/// when that position falls in the padding.
pub trait Im2Col {
    /// Fills the first `geometry.col_len()` elements of `col` from `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if `image` or `col` are shorter than the geometry requires.
    fn im2col(
        &self,
        image: &[f32],
        geometry: &Im2ColGeometry,
        col: &mut [f32],
    ) -> Result<(), ContractViolation>;
}

/// Output positions `o` in `[0, out_len)` whose source `o * stride + offset - pad` lies in
/// `[0, in_len)`. Positions outside the range read padding.
fn valid_range(out_len: usize, stride: usize, offset: usize, pad: usize, in_len: usize) -> Range<usize> {
    let start = pad.saturating_sub(offset).div_ceil(stride);
    let end = (in_len + pad).saturating_sub(offset).div_ceil(stride);
    let end = end.min(out_len);
    start.min(end)..end
}

/// CPU implementation of [`Im2Col`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuIm2Col;

impl Im2Col for CpuIm2Col {
    fn im2col(
        &self,
        image: &[f32],
        geometry: &Im2ColGeometry,
        col: &mut [f32],
    ) -> Result<(), ContractViolation> {
        if image.len() < geometry.image_len() {
            return Err(ContractViolation::BufferTooSmall {
                name: "image",
                required: geometry.image_len(),
                actual: image.len(),
            });
        }
        if col.len() < geometry.col_len() {
            return Err(ContractViolation::BufferTooSmall {
                name: "column",
                required: geometry.col_len(),
                actual: col.len(),
            });
        }
        im2col_cpu(image, geometry, &mut col[..geometry.col_len()]);
        Ok(())
    }
}

/// Unrolls one image into `col`.
///
/// PRECONDITION: `image` holds `geometry.image_len()` elements and `col` exactly
/// `geometry.col_len()` elements.
fn im2col_cpu(image: &[f32], geometry: &Im2ColGeometry, col: &mut [f32]) {
    let g = geometry;
    let plane = g.height * g.width;
    let out_cols = g.col_cols();
    if out_cols == 0 {
        return;
    }

    for (row, col_row) in col.chunks_exact_mut(out_cols).enumerate() {
        let fw = row % g.filter_width;
        let fh = (row / g.filter_width) % g.filter_height;
        let c = row / (g.filter_width * g.filter_height);
        let channel = &image[c * plane..(c + 1) * plane];

        let rows = valid_range(g.output_height, g.stride_height, fh, g.padding_height, g.height);
        let cols = valid_range(g.output_width, g.stride_width, fw, g.padding_width, g.width);

        for (h, out_row) in col_row.chunks_exact_mut(g.output_width).enumerate() {
            if !rows.contains(&h) {
                out_row.fill(0.0);
                continue;
            }
            let ih = h * g.stride_height + fh - g.padding_height;
            let src = &channel[ih * g.width..(ih + 1) * g.width];

            out_row[..cols.start].fill(0.0);
            out_row[cols.end..].fill(0.0);
            for (w, dst) in cols.clone().zip(out_row[cols.clone()].iter_mut()) {
                *dst = src[w * g.stride_width + fw - g.padding_width];
            }
        }
    }
}
