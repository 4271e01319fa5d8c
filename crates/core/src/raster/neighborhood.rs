//! Neighborhood definitions for raster analysis

use serde::{Deserialize, Serialize};

/// Tolerance applied when a continuous radius is snapped to whole cells,
/// so that `3.0 / 1.0` and `0.3 / 0.1` reach the same number of cells.
const RADIUS_EPSILON: f64 = 1e-9;

/// Cell adjacency used when growing regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Connectivity {
    /// Edge-sharing neighbours only (N, E, S, W)
    Four,
    /// Edge- and corner-sharing neighbours
    #[default]
    Eight,
}

impl Connectivity {
    /// Neighbour offsets as (row_offset, col_offset), in raster scan order
    pub fn offsets(&self) -> &'static [(isize, isize)] {
        const ROOK: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
        const QUEEN: [(isize, isize); 8] = [
            (-1, -1), (-1, 0), (-1, 1),
            (0, -1),           (0, 1),
            (1, -1),  (1, 0),  (1, 1),
        ];
        match self {
            Connectivity::Four => &ROOK,
            Connectivity::Eight => &QUEEN,
        }
    }
}

/// Shape of a search window derived from a continuous radius
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowShape {
    /// Cells whose centre lies within the radius of the centre cell
    #[default]
    Circular,
    /// Square of half-width `floor(radius)`; cheaper, slightly larger
    Square,
}

impl WindowShape {
    /// Largest row/column offset reached by a window of `radius` cells
    pub fn reach(radius: f64) -> isize {
        if radius.is_finite() && radius > 0.0 {
            (radius + RADIUS_EPSILON).floor() as isize
        } else {
            0
        }
    }

    /// Width in cells of the window's bounding square, saturating at `usize::MAX`
    pub fn diameter(radius: f64) -> usize {
        Self::reach(radius).unsigned_abs().saturating_mul(2).saturating_add(1)
    }

    /// Half-width of the window on row offset `dr`, or `None` if the row is outside it
    #[inline]
    pub fn row_half_width(&self, radius: f64, dr: isize) -> Option<isize> {
        let reach = Self::reach(radius);
        if dr.abs() > reach {
            return None;
        }
        match self {
            WindowShape::Square => Some(reach),
            WindowShape::Circular => {
                let rem = radius * radius - (dr * dr) as f64;
                Some((rem.max(0.0).sqrt() + RADIUS_EPSILON).floor() as isize)
            }
        }
    }

    /// Check if a relative position is within a window of `radius` cells
    pub fn contains(&self, radius: f64, dr: isize, dc: isize) -> bool {
        self.row_half_width(radius, dr).is_some_and(|hw| dc.abs() <= hw)
    }

    /// All relative positions in a window of `radius` cells, centre included
    pub fn offsets(&self, radius: f64) -> Vec<(isize, isize)> {
        let reach = Self::reach(radius);
        let mut offsets = Vec::new();
        for dr in -reach..=reach {
            if let Some(hw) = self.row_half_width(radius, dr) {
                offsets.extend((-hw..=hw).map(|dc| (dr, dc)));
            }
        }
        offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_offsets() {
        assert_eq!(Connectivity::Four.offsets().len(), 4);
        assert_eq!(Connectivity::Eight.offsets().len(), 8);
        assert!(!Connectivity::Eight.offsets().contains(&(0, 0)));
    }

    #[test]
    fn test_zero_radius_is_centre_only() {
        assert_eq!(WindowShape::Circular.offsets(0.0), vec![(0, 0)]);
        assert_eq!(WindowShape::Square.offsets(0.4), vec![(0, 0)]);
        assert_eq!(WindowShape::diameter(0.0), 1);
    }

    #[test]
    fn test_circular_window() {
        // radius 1: plus-shaped
        assert_eq!(WindowShape::Circular.offsets(1.0).len(), 5);
        // radius sqrt(2) reaches the diagonals
        assert_eq!(WindowShape::Circular.offsets(2f64.sqrt()).len(), 9);
        // radius 2: 13 cells
        assert_eq!(WindowShape::Circular.offsets(2.0).len(), 13);
        assert!(WindowShape::Circular.contains(2.0, 0, 2));
        assert!(!WindowShape::Circular.contains(2.0, 2, 1));
    }

    #[test]
    fn test_square_window() {
        assert_eq!(WindowShape::Square.offsets(1.0).len(), 9);
        assert_eq!(WindowShape::Square.offsets(2.7).len(), 25);
        assert_eq!(WindowShape::diameter(2.7), 5);
    }

    #[test]
    fn test_radius_snapping_tolerance() {
        assert_eq!(WindowShape::reach(0.3 / 0.1), 3);
        assert_eq!(WindowShape::reach(f64::NAN), 0);
    }

    #[test]
    fn test_diameter_saturates() {
        assert_eq!(WindowShape::reach(1e300), isize::MAX);
        assert_eq!(WindowShape::diameter(1e300), usize::MAX);
        assert_eq!(WindowShape::diameter(f64::INFINITY), 1);
    }
}
