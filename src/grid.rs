//! Dither grid generation.
//!
//! A dither grid is `size x size` stage positions centred on the pinhole
//! location. Rows are visited in ascending `y`; within a row `x` runs in a
//! serpentine order (left to right, then right to left) so the X stage never
//! travels back across the whole grid between rows.

use serde::Serialize;

/// One stage position in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridPoint {
    /// X stage position
    pub x: f64,
    /// Y stage position
    pub y: f64,
}

/// `count` evenly spaced values centred on `center`.
///
/// The values span exactly `(count - 1) * spacing`. A single value is the
/// centre itself and zero values give an empty vector.
pub fn centered_steps(center: f64, spacing: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![center],
        _ => {
            let extent = (count - 1) as f64 * spacing / 2.0;
            let start = center - extent;
            let mut steps: Vec<f64> = (0..count).map(|i| start + i as f64 * spacing).collect();
            // pin the far end so the span is exact
            steps[count - 1] = center + extent;
            steps
        }
    }
}

/// Square dither grid around a centre position
#[derive(Debug, Clone, PartialEq)]
pub struct DitherGrid {
    /// Grid centre
    pub center: GridPoint,
    /// Distance between neighbouring points, mm
    pub spacing: f64,
    /// Column positions, ascending
    pub xs: Vec<f64>,
    /// Row positions, ascending
    pub ys: Vec<f64>,
}

/// Position of one grid visit in serpentine order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridVisit {
    /// Row index, ascending `y`
    pub row: usize,
    /// Column index into `xs` (not the visit order within the row)
    pub col: usize,
    /// Stage position of the visit
    pub point: GridPoint,
}

impl DitherGrid {
    /// `size x size` grid with `spacing` between points
    pub fn new(center: GridPoint, spacing: f64, size: usize) -> Self {
        Self {
            center,
            spacing,
            xs: centered_steps(center.x, spacing, size),
            ys: centered_steps(center.y, spacing, size),
        }
    }

    /// Number of grid points
    pub fn len(&self) -> usize {
        self.xs.len() * self.ys.len()
    }

    /// True for a zero-sized grid
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full cross product of `xs` and `ys`
    pub fn points(&self) -> impl Iterator<Item = GridPoint> + '_ {
        self.xs
            .iter()
            .flat_map(move |&x| self.ys.iter().map(move |&y| GridPoint { x, y }))
    }

    /// Column indices of `row` in visiting order
    pub fn row_order(&self, row: usize) -> Vec<usize> {
        let cols = 0..self.xs.len();
        if row % 2 == 0 {
            cols.collect()
        } else {
            cols.rev().collect()
        }
    }

    /// Every grid point in serpentine visiting order
    pub fn serpentine(&self) -> Vec<GridVisit> {
        let mut visits = Vec::with_capacity(self.len());
        for (row, &y) in self.ys.iter().enumerate() {
            for col in self.row_order(row) {
                visits.push(GridVisit {
                    row,
                    col,
                    point: GridPoint { x: self.xs[col], y },
                });
            }
        }
        visits
    }
}

/// Distinct values in ascending order.
///
/// Used for the dark pass: one dark per integration time regardless of how
/// often or in which order the time appears in the configuration.
pub fn distinct_sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out.dedup();
    out
}
