//! Fixed-size block windows over a raster

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Block dimensions used to stream a raster through memory.
///
/// Both dimensions are always positive, including when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BlockDims", into = "BlockDims")]
pub struct BlockSize {
    cols: usize,
    rows: usize,
}

/// Unchecked serialized form of [`BlockSize`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct BlockDims {
    cols: usize,
    rows: usize,
}

impl TryFrom<BlockDims> for BlockSize {
    type Error = Error;

    fn try_from(dims: BlockDims) -> Result<Self> {
        BlockSize::new(dims.cols, dims.rows)
    }
}

impl From<BlockSize> for BlockDims {
    fn from(size: BlockSize) -> Self {
        Self {
            cols: size.cols,
            rows: size.rows,
        }
    }
}

impl BlockSize {
    pub fn new(cols: usize, rows: usize) -> Result<Self> {
        if cols == 0 || rows == 0 {
            return Err(Error::InvalidParameter {
                name: "block_size",
                value: format!("{}x{}", cols, rows),
                reason: "block dimensions must be positive".into(),
            });
        }
        Ok(Self { cols, rows })
    }

    /// Square block
    pub fn square(size: usize) -> Result<Self> {
        Self::new(size, size)
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        Self { cols: 600, rows: 600 }
    }
}

/// A rectangular window of a raster, in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    /// Column offset in the source raster
    pub col_offset: usize,
    /// Row offset in the source raster
    pub row_offset: usize,
    /// Number of columns in this block
    pub cols: usize,
    /// Number of rows in this block
    pub rows: usize,
}

impl BlockWindow {
    pub fn new(col_offset: usize, row_offset: usize, cols: usize, rows: usize) -> Self {
        Self {
            col_offset,
            row_offset,
            cols,
            rows,
        }
    }

    /// Window covering a whole raster
    pub fn full(cols: usize, rows: usize) -> Self {
        Self::new(0, 0, cols, rows)
    }

    /// Offset as the `(isize, isize)` pair GDAL's read/write calls take
    pub fn offset(&self) -> (isize, isize) {
        (self.col_offset as isize, self.row_offset as isize)
    }

    /// Size as `(cols, rows)`
    pub fn size(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Row-major iterator over the blocks that exactly partition a raster.
///
/// Edge blocks are clipped to the remainder, never padded.
#[derive(Debug, Clone)]
pub struct BlockTiling {
    raster_cols: usize,
    raster_rows: usize,
    block: BlockSize,
    current_col: usize,
    current_row: usize,
}

impl BlockTiling {
    pub fn new(raster_cols: usize, raster_rows: usize, block: BlockSize) -> Self {
        Self {
            raster_cols,
            raster_rows,
            block,
            current_col: 0,
            current_row: 0,
        }
    }

    /// Number of blocks in the tiling
    pub fn block_count(&self) -> usize {
        if self.raster_cols == 0 || self.raster_rows == 0 {
            return 0;
        }
        self.raster_cols.div_ceil(self.block.cols) * self.raster_rows.div_ceil(self.block.rows)
    }
}

impl Iterator for BlockTiling {
    type Item = BlockWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.raster_cols == 0 || self.current_row >= self.raster_rows {
            return None;
        }

        let rows = self.block.rows.min(self.raster_rows - self.current_row);
        let cols = self.block.cols.min(self.raster_cols - self.current_col);
        let window = BlockWindow::new(self.current_col, self.current_row, cols, rows);

        self.current_col += self.block.cols;
        if self.current_col >= self.raster_cols {
            self.current_col = 0;
            self.current_row += self.block.rows;
        }

        Some(window)
    }
}
