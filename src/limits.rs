//! PCU travel envelope.
//!
//! The stage may only be commanded within a fixed radius of the pinhole
//! position. The whole grid is checked before the first move so a bad
//! configuration never reaches the hardware.

use crate::error::PcuError;
use crate::grid::{DitherGrid, GridPoint};

/// Maximum distance of any grid point from the centre, in millimetres.
///
/// With a square grid this limits the grid extent to about 16.8 mm.
pub const DEFAULT_SAFETY_RADIUS_MM: f64 = 12.0;

/// Check every point of `grid` against the safety radius around `center`.
///
/// A point exactly on the radius passes. The first point outside it is
/// returned as `PcuError::OutsideEnvelope`.
pub fn check_limits(grid: &DitherGrid, center: GridPoint, radius: f64) -> Result<(), PcuError> {
    for point in grid.points() {
        let distance = (point.x - center.x).hypot(point.y - center.y);
        if distance > radius {
            return Err(PcuError::OutsideEnvelope {
                x: point.x,
                y: point.y,
                center_x: center.x,
                center_y: center.y,
                distance,
                radius,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CENTER: GridPoint = GridPoint { x: 90.0, y: 185.0 };

    fn grid_of(xs: Vec<f64>, ys: Vec<f64>) -> DitherGrid {
        DitherGrid {
            center: CENTER,
            spacing: 0.0,
            xs,
            ys,
        }
    }

    #[test]
    fn test_point_beyond_radius_aborts() {
        let grid = grid_of(vec![105.0], vec![185.0]);
        let err = check_limits(&grid, CENTER, DEFAULT_SAFETY_RADIUS_MM).unwrap_err();
        match err {
            PcuError::OutsideEnvelope { x, y, distance, .. } => {
                assert_eq!(x, 105.0);
                assert_eq!(y, 185.0);
                assert!((distance - 15.0).abs() < 1e-9);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_point_within_radius_passes() {
        let grid = grid_of(vec![98.0], vec![190.0]);
        assert!(check_limits(&grid, CENTER, DEFAULT_SAFETY_RADIUS_MM).is_ok());
    }

    #[test]
    fn test_point_on_radius_passes() {
        let grid = grid_of(vec![102.0], vec![185.0]);
        assert!(check_limits(&grid, CENTER, DEFAULT_SAFETY_RADIUS_MM).is_ok());
    }

    #[test]
    fn test_corner_of_grid_is_checked() {
        // 5x5 at 4.5mm: edges at +/-9mm pass alone, the corners are 12.73mm out
        let grid = DitherGrid::new(CENTER, 4.5, 5);
        let err = check_limits(&grid, CENTER, DEFAULT_SAFETY_RADIUS_MM).unwrap_err();
        assert!(matches!(err, PcuError::OutsideEnvelope { .. }));
    }

    #[test]
    fn test_standard_grids_pass() {
        for (spacing, size) in [(6.16, 3), (3.1, 5), (6.6, 3), (6.16, 1)] {
            let grid = DitherGrid::new(CENTER, spacing, size);
            assert!(
                check_limits(&grid, CENTER, DEFAULT_SAFETY_RADIUS_MM).is_ok(),
                "{}x{} at {}mm",
                size,
                size,
                spacing
            );
        }
    }
}
