// Workspace grid geometry - maps camera coordinates onto projector cells

use serde::{Deserialize, Serialize};
use std::fmt;

/// A discrete location on the projected workspace grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub row: u32,
    pub col: u32,
}

impl GridCell {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Projector label: column letter followed by the 1-based row number ("E3")
    pub fn label(&self) -> String {
        format!("{}{}", column_letters(self.col), self.row + 1)
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

fn column_letters(col: u32) -> String {
    // Spreadsheet style: A..Z, AA..AZ, ...
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Maps pixel coordinates inside a camera frame to grid cells
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMapper {
    rows: u32,
    cols: u32,
    image_width: f64,
    image_height: f64,
}

impl GridMapper {
    pub fn new(rows: u32, cols: u32, image_width: f64, image_height: f64) -> Self {
        Self {
            rows: rows.max(1),
            cols: cols.max(1),
            image_width,
            image_height,
        }
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn image_width(&self) -> f64 {
        self.image_width
    }

    pub fn image_height(&self) -> f64 {
        self.image_height
    }

    /// Cell containing the pixel point (x, y).
    ///
    /// Points on or beyond the frame edge are clamped into the outermost cell, so the
    /// result is always a valid cell. Returns `None` when the frame has no area or a
    /// coordinate is not finite.
    pub fn cell_for_pixel(&self, x: f64, y: f64) -> Option<GridCell> {
        if !x.is_finite() || !y.is_finite() || self.image_width <= 0.0 || self.image_height <= 0.0 {
            return None;
        }
        let row = scale(y / self.image_height, self.rows);
        let col = scale(x / self.image_width, self.cols);
        Some(GridCell::new(row, col))
    }

    /// Cell for a point given in normalized [0, 1] frame coordinates
    pub fn cell_for_normalized(&self, x: f64, y: f64) -> Option<GridCell> {
        self.cell_for_pixel(x * self.image_width, y * self.image_height)
    }

    /// Cell `row_offset` rows above and `col_offset` columns left of the bottom-right cell
    pub fn offset_from_bottom_right(&self, row_offset: u32, col_offset: u32) -> GridCell {
        GridCell::new(
            self.rows.saturating_sub(1).saturating_sub(row_offset),
            self.cols.saturating_sub(1).saturating_sub(col_offset),
        )
    }
}

fn scale(fraction: f64, divisions: u32) -> u32 {
    let index = (fraction * divisions as f64).floor();
    if index < 0.0 {
        0
    } else {
        (index as u32).min(divisions - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_for_pixel_maps_into_grid() {
        let mapper = GridMapper::new(5, 5, 640.0, 480.0);

        assert_eq!(mapper.cell_for_pixel(0.0, 0.0), Some(GridCell::new(0, 0)));
        assert_eq!(mapper.cell_for_pixel(639.0, 479.0), Some(GridCell::new(4, 4)));
        // x picks the column, y picks the row
        assert_eq!(mapper.cell_for_pixel(600.0, 200.0), Some(GridCell::new(2, 4)));
    }

    #[test]
    fn test_cell_for_pixel_clamps_edges() {
        let mapper = GridMapper::new(3, 3, 300.0, 300.0);

        assert_eq!(mapper.cell_for_pixel(300.0, 300.0), Some(GridCell::new(2, 2)));
        assert_eq!(mapper.cell_for_pixel(-5.0, 1000.0), Some(GridCell::new(2, 0)));
        assert_eq!(mapper.cell_for_pixel(f64::NAN, 10.0), None);
    }

    #[test]
    fn test_cell_for_normalized() {
        let mapper = GridMapper::new(5, 5, 640.0, 480.0);
        assert_eq!(mapper.cell_for_normalized(0.9, 0.5), Some(GridCell::new(2, 4)));
        assert_eq!(mapper.cell_for_normalized(0.7, 0.5), Some(GridCell::new(2, 3)));
    }

    #[test]
    fn test_offset_from_bottom_right() {
        let mapper = GridMapper::new(5, 5, 640.0, 480.0);
        assert_eq!(mapper.offset_from_bottom_right(0, 0), GridCell::new(4, 4));
        assert_eq!(mapper.offset_from_bottom_right(2, 0), GridCell::new(2, 4));
        assert_eq!(mapper.offset_from_bottom_right(9, 9), GridCell::new(0, 0));
    }

    #[test]
    fn test_labels() {
        assert_eq!(GridCell::new(2, 4).label(), "E3");
        assert_eq!(GridCell::new(0, 0).label(), "A1");
        assert_eq!(GridCell::new(9, 26).label(), "AA10");
    }
}
