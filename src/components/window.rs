use itertools::Itertools;

use crate::errors::{RastroError, Result};

/// Rectangular pixel region of a band.
///
/// Offsets are given from the top left pixel of the raster, shape is
/// (width, height). A window may span any number of blocks and touch
/// the last column/row, but never extend past them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub x_off: usize,
    pub y_off: usize,
    pub width: usize,
    pub height: usize,
}

/// Overlap of a [Window] with one block: where the shared rectangle
/// sits inside the block and inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOverlap {
    pub col: usize,
    pub row: usize,
    /// Top left of the overlap within the block.
    pub block_x: usize,
    pub block_y: usize,
    /// Top left of the overlap within the window.
    pub win_x: usize,
    pub win_y: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    pub fn new(x_off: usize, y_off: usize, width: usize, height: usize) -> Self {
        Self {
            x_off,
            y_off,
            width,
            height,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Fails unless the window is non-empty and fully contained in a
    /// raster of the given size.
    pub fn validate(&self, raster_size: (usize, usize)) -> Result<()> {
        let (raster_w, raster_h) = raster_size;
        let fits = self.width > 0
            && self.height > 0
            && self.x_off.checked_add(self.width).is_some_and(|x| x <= raster_w)
            && self.y_off.checked_add(self.height).is_some_and(|y| y <= raster_h);
        if fits {
            Ok(())
        } else {
            Err(RastroError::WindowOutOfBounds {
                window: *self,
                width: raster_w,
                height: raster_h,
            })
        }
    }

    /// Iterates the (col, row) overlaps of every block this window
    /// touches, in row-major block order.
    pub fn block_overlaps(
        &self,
        block_size: (usize, usize),
    ) -> impl Iterator<Item = BlockOverlap> + '_ {
        let (block_w, block_h) = block_size;
        let col_range = self.x_off / block_w..=(self.x_off + self.width - 1) / block_w;
        let row_range = self.y_off / block_h..=(self.y_off + self.height - 1) / block_h;
        row_range
            .cartesian_product(col_range)
            .map(move |(row, col)| self.overlap(block_size, col, row))
    }

    fn overlap(&self, block_size: (usize, usize), col: usize, row: usize) -> BlockOverlap {
        let (block_w, block_h) = block_size;
        let block_x0 = col * block_w;
        let block_y0 = row * block_h;
        let x0 = self.x_off.max(block_x0);
        let y0 = self.y_off.max(block_y0);
        let x1 = (self.x_off + self.width).min(block_x0 + block_w);
        let y1 = (self.y_off + self.height).min(block_y0 + block_h);
        BlockOverlap {
            col,
            row,
            block_x: x0 - block_x0,
            block_y: y0 - block_y0,
            win_x: x0 - self.x_off,
            win_y: y0 - self.y_off,
            width: x1 - x0,
            height: y1 - y0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Window::new(0, 0, 10, 10), true)]
    #[case(Window::new(90, 40, 10, 10), true)] // touches last column/row
    #[case(Window::new(91, 40, 10, 10), false)] // one past the last column
    #[case(Window::new(0, 41, 10, 10), false)]
    #[case(Window::new(0, 0, 0, 10), false)]
    fn bounds_validation(#[case] window: Window, #[case] ok: bool) {
        assert_eq!(window.validate((100, 50)).is_ok(), ok);
    }

    #[test]
    fn single_block_overlap() {
        let window = Window::new(3, 4, 5, 6);
        let overlaps: Vec<_> = window.block_overlaps((16, 16)).collect();
        assert_eq!(
            overlaps,
            vec![BlockOverlap {
                col: 0,
                row: 0,
                block_x: 3,
                block_y: 4,
                win_x: 0,
                win_y: 0,
                width: 5,
                height: 6,
            }]
        );
    }

    #[test]
    fn window_spanning_four_blocks() {
        let window = Window::new(10, 10, 12, 12);
        let overlaps: Vec<_> = window.block_overlaps((16, 16)).collect();
        assert_eq!(overlaps.len(), 4);
        // Row-major block order, widths/heights partition the window.
        assert_eq!(
            overlaps.iter().map(|o| (o.col, o.row)).collect::<Vec<_>>(),
            vec![(0, 0), (1, 0), (0, 1), (1, 1)]
        );
        let covered: usize = overlaps.iter().map(|o| o.width * o.height).sum();
        assert_eq!(covered, window.area());
        assert_eq!(overlaps[1].block_x, 0);
        assert_eq!(overlaps[1].win_x, 6);
    }

    #[test]
    fn block_aligned_window() {
        let window = Window::new(16, 32, 16, 16);
        let overlaps: Vec<_> = window.block_overlaps((16, 16)).collect();
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].col, 1);
        assert_eq!(overlaps[0].row, 2);
        assert_eq!(overlaps[0].block_x, 0);
        assert_eq!((overlaps[0].width, overlaps[0].height), (16, 16));
    }
}
