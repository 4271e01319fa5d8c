//! Variable window filter (VWF) treetop detection
//!
//! A cell is a treetop when no valid cell inside its own search window is
//! higher. The window radius is derived per cell from its height through a
//! [`WindowFunction`], so the neighbourhood is recomputed for every candidate
//! instead of using one fixed kernel.
//!
//! Reference:
//! Popescu, S. C., & Wynne, R. H. (2004). Seeing the trees in the forest:
//! using lidar and multispectral data fusion with local filtering and
//! variable window size for estimating tree height. *Photogrammetric
//! Engineering & Remote Sensing*, 70(5), 589–604.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use crate::maybe_rayon::*;
use crate::treetops::{Treetop, Treetops, WindowFunction};
use crowntrace_core::raster::{Raster, WindowShape};
use crowntrace_core::{Algorithm, Error, Result};

/// Parameters for variable window filtering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VwfParams {
    /// Height → search radius mapping (ground units)
    pub window: WindowFunction,
    /// Cells lower than this are never treetops
    pub min_height: f64,
    /// Discrete shape of the search window
    pub shape: WindowShape,
    /// Largest window width in cells that a radius may produce
    pub max_window_diameter: usize,
}

impl Default for VwfParams {
    fn default() -> Self {
        Self {
            window: WindowFunction::default(),
            min_height: 2.0,
            shape: WindowShape::Circular,
            max_window_diameter: 99,
        }
    }
}

/// Variable window filter algorithm
#[derive(Debug, Clone, Default)]
pub struct VariableWindowFilter;

impl Algorithm for VariableWindowFilter {
    type Input = Raster<f64>;
    type Output = Treetops;
    type Params = VwfParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "VariableWindowFilter"
    }

    fn description(&self) -> &'static str {
        "Detect treetops as local maxima within height-dependent search windows"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        detect_treetops(&input, params)
    }
}

/// Detect treetops in a canopy height model.
///
/// # Algorithm
/// 1. Every valid cell with `height >= min_height` gets a radius from the
///    window function; negative/undefined radii or windows wider than
///    `max_window_diameter` cells abort the call before any scanning.
/// 2. A cell is a candidate when it is `>=` every valid in-bounds cell of its
///    window. Windows are clipped at the grid edge, no padding; no-data
///    cells are skipped.
/// 3. Candidates are confirmed in raster scan order; a candidate whose window
///    already holds a confirmed treetop of the same height is dropped, so the
///    first-scanned of equal maxima wins.
///
/// # Returns
/// Treetops located at cell centres, numbered from 1 in scan order.
pub fn detect_treetops(chm: &Raster<f64>, params: VwfParams) -> Result<Treetops> {
    chm.validate_grid()?;
    if !params.min_height.is_finite() {
        return Err(Error::invalid_parameter(
            "min_height",
            params.min_height,
            "must be finite",
        ));
    }
    if params.max_window_diameter == 0 {
        return Err(Error::invalid_parameter(
            "max_window_diameter",
            params.max_window_diameter,
            "must be >= 1",
        ));
    }

    let (rows, cols) = chm.shape();
    let cell_size = chm.cell_size();
    debug!(
        rows,
        cols,
        cell_size,
        min_height = params.min_height,
        window = ?params.window,
        shape = ?params.shape,
        "variable window filter"
    );

    // Radii in cells; NaN marks cells that cannot be treetops.
    let radii = window_radii(chm, &params)?;

    let candidates: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let radius = radii[(row, col)];
                    !radius.is_nan() && is_window_maximum(chm, row, col, radius, params.shape)
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let mut kept = Array2::<bool>::from_elem((rows, cols), false);
    let mut tops = Vec::new();

    for (idx, _) in candidates.iter().enumerate().filter(|(_, c)| **c) {
        let (row, col) = (idx / cols, idx % cols);
        let height = unsafe { chm.get_unchecked(row, col) };
        let radius = radii[(row, col)];

        if holds_equal_treetop(chm, &kept, row, col, height, radius, params.shape) {
            continue;
        }

        kept[(row, col)] = true;
        let (x, y) = chm.pixel_to_geo(col, row);
        tops.push(Treetop {
            id: tops.len() as u32 + 1,
            x,
            y,
            height,
            win_radius: radius * cell_size,
        });
    }

    info!(treetops = tops.len(), "variable window filter finished");
    Ok(Treetops::new(tops, chm.crs().cloned()))
}

/// Per-cell search radius in cells, validated before any window is scanned
fn window_radii(chm: &Raster<f64>, params: &VwfParams) -> Result<Array2<f64>> {
    let (rows, cols) = chm.shape();
    let cell_size = chm.cell_size();
    let mut radii = Array2::<f64>::from_elem((rows, cols), f64::NAN);

    for row in 0..rows {
        for col in 0..cols {
            let Some(height) = chm.valid_value(row, col) else {
                continue;
            };
            if height < params.min_height {
                continue;
            }

            let radius = params.window.checked_radius(height)? / cell_size;
            let diameter = WindowShape::diameter(radius);
            if diameter > params.max_window_diameter {
                return Err(Error::invalid_parameter(
                    "max_window_diameter",
                    params.max_window_diameter,
                    format!(
                        "height {} gives a window {} cells wide",
                        height, diameter
                    ),
                ));
            }
            radii[(row, col)] = radius;
        }
    }

    Ok(radii)
}

/// Calls `f` with every in-bounds cell of the window centred on (row, col);
/// stops early when `f` returns false.
#[inline]
fn for_each_window_cell<F>(
    rows: usize,
    cols: usize,
    row: usize,
    col: usize,
    radius: f64,
    shape: WindowShape,
    mut f: F,
) -> bool
where
    F: FnMut(usize, usize) -> bool,
{
    let reach = WindowShape::reach(radius);
    for dr in -reach..=reach {
        let nr = row as isize + dr;
        if nr < 0 || nr >= rows as isize {
            continue;
        }
        let Some(hw) = shape.row_half_width(radius, dr) else {
            continue;
        };
        let c0 = (col as isize - hw).max(0) as usize;
        let c1 = (col as isize + hw).min(cols as isize - 1) as usize;
        for nc in c0..=c1 {
            if !f(nr as usize, nc) {
                return false;
            }
        }
    }
    true
}

/// No valid cell of the window is higher; equal cells are left to the tie pass
fn is_window_maximum(chm: &Raster<f64>, row: usize, col: usize, radius: f64, shape: WindowShape) -> bool {
    let (rows, cols) = chm.shape();
    let height = unsafe { chm.get_unchecked(row, col) };
    for_each_window_cell(rows, cols, row, col, radius, shape, |nr, nc| {
        chm.valid_value(nr, nc).is_none_or(|v| v <= height)
    })
}

fn holds_equal_treetop(
    chm: &Raster<f64>,
    kept: &Array2<bool>,
    row: usize,
    col: usize,
    height: f64,
    radius: f64,
    shape: WindowShape,
) -> bool {
    let (rows, cols) = chm.shape();
    !for_each_window_cell(rows, cols, row, col, radius, shape, |nr, nc| {
        !(kept[(nr, nc)] && unsafe { chm.get_unchecked(nr, nc) } == height)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crowntrace_core::{GeoTransform, CRS};

    fn peak_chm() -> Raster<f64> {
        let mut chm = Raster::filled(10, 10, 1.0)
            .with_transform(GeoTransform::from_origin(0.0, 10.0, 1.0));
        chm.set(5, 5, 10.0).unwrap();
        chm
    }

    fn constant(radius: f64, min_height: f64) -> VwfParams {
        VwfParams {
            window: WindowFunction::Constant { radius },
            min_height,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_central_peak() {
        let tops = detect_treetops(&peak_chm(), constant(1.0, 2.0)).unwrap();

        assert_eq!(tops.len(), 1);
        let peak = &tops.as_slice()[0];
        assert_eq!(peak.id, 1);
        assert_relative_eq!(peak.height, 10.0);
        assert_relative_eq!(peak.x, 5.5);
        assert_relative_eq!(peak.y, 4.5);
        assert_relative_eq!(peak.win_radius, 1.0);
    }

    #[test]
    fn test_flat_canopy_resolved_in_scan_order() {
        // Radius 1 is a plus-shaped window: each kept cell suppresses its
        // later-scanned edge neighbours, leaving a checkerboard.
        let chm = Raster::filled(10, 10, 5.0).with_transform(GeoTransform::from_origin(0.0, 10.0, 1.0));
        let tops = detect_treetops(&chm, constant(1.0, 2.0)).unwrap();
        assert_eq!(tops.len(), 50);
        let first = &tops.as_slice()[0];
        assert_eq!(first.id, 1);
        assert_eq!(chm.cell_at(first.x, first.y), Some((0, 0)));
        for t in tops.iter() {
            let (row, col) = chm.cell_at(t.x, t.y).unwrap();
            assert_eq!((row + col) % 2, 0);
        }

        let pair = Raster::from_vec(vec![8.0, 8.0], 1, 2).unwrap();
        let tops = detect_treetops(&pair, constant(1.0, 2.0)).unwrap();
        assert_eq!(tops.len(), 1);
        assert_eq!(pair.cell_at(tops.as_slice()[0].x, tops.as_slice()[0].y), Some((0, 0)));
    }

    #[test]
    fn test_flat_canopy_fully_segmented() {
        let chm = Raster::filled(10, 10, 5.0).with_transform(GeoTransform::from_origin(0.0, 10.0, 1.0));
        let tops = detect_treetops(&chm, constant(1.0, 2.0)).unwrap();
        let crowns = crate::segmentation::mcws(&chm, &tops, Default::default()).unwrap();
        assert_eq!(crowns.labeled_cells(), 100);
        assert_eq!(crowns.region_sizes().len(), 50);
    }

    #[test]
    fn test_single_peak_with_wide_window() {
        // A window covering the whole grid leaves only the peak.
        let tops = detect_treetops(&peak_chm(), constant(15.0, 2.0)).unwrap();
        assert_eq!(tops.len(), 1);
        let t = &tops.as_slice()[0];
        assert_eq!(t.id, 1);
        assert_relative_eq!(t.height, 10.0);
    }

    #[test]
    fn test_background_above_min_height_yields_treetops() {
        let mut chm = Raster::filled(10, 10, 5.0).with_transform(GeoTransform::from_origin(0.0, 10.0, 1.0));
        chm.set(5, 5, 10.0).unwrap();

        // Background below min_height: only the peak qualifies.
        let tops = detect_treetops(&chm, constant(1.0, 6.0)).unwrap();
        assert_eq!(tops.len(), 1);
        assert_relative_eq!(tops.as_slice()[0].height, 10.0);

        // Background above it: flat cells away from the peak are kept too.
        let tops = detect_treetops(&chm, constant(1.0, 2.0)).unwrap();
        assert!(tops.len() > 1);
        assert_eq!(tops.iter().filter(|t| t.height == 10.0).count(), 1);
        for t in tops.iter().filter(|t| t.height == 5.0) {
            let (row, col) = chm.cell_at(t.x, t.y).unwrap();
            assert!(row.abs_diff(5) + col.abs_diff(5) > 1);
        }
    }

    #[test]
    fn test_huge_radius_rejected() {
        let params = VwfParams {
            window: WindowFunction::Constant { radius: 1e300 },
            ..Default::default()
        };
        assert!(matches!(
            detect_treetops(&peak_chm(), params),
            Err(Error::InvalidParameter { name: "max_window_diameter", .. })
        ));
    }

    #[test]
    fn test_equal_peaks_first_scanned_wins() {
        let mut chm = Raster::filled(5, 5, 1.0);
        chm.set(2, 1, 8.0).unwrap();
        chm.set(2, 2, 8.0).unwrap();

        let tops = detect_treetops(&chm, constant(1.5, 2.0)).unwrap();
        assert_eq!(tops.len(), 1);
        let (x, y) = chm.pixel_to_geo(1, 2);
        assert_relative_eq!(tops.as_slice()[0].x, x);
        assert_relative_eq!(tops.as_slice()[0].y, y);
    }

    #[test]
    fn test_equal_peaks_outside_each_other_window_both_kept() {
        let mut chm = Raster::filled(5, 7, 1.0);
        chm.set(2, 1, 8.0).unwrap();
        chm.set(2, 5, 8.0).unwrap();

        let tops = detect_treetops(&chm, constant(1.5, 2.0)).unwrap();
        assert_eq!(tops.len(), 2);
    }

    #[test]
    fn test_zero_radius_every_cell_is_treetop() {
        let mut chm = Raster::filled(3, 3, 4.0);
        chm.set(0, 0, 1.0).unwrap();
        let tops = detect_treetops(&chm, constant(0.0, 2.0)).unwrap();
        assert_eq!(tops.len(), 8);
        assert!(tops.iter().all(|t| t.win_radius == 0.0));
    }

    #[test]
    fn test_nodata_ignored() {
        let mut chm = Raster::filled(3, 3, 3.0).with_nodata(-9999.0);
        chm.set(1, 1, 6.0).unwrap();
        chm.set(0, 0, -9999.0).unwrap();
        chm.set(0, 1, f64::NAN).unwrap();

        let tops = detect_treetops(&chm, constant(2.0, 2.0)).unwrap();
        assert_eq!(tops.len(), 1);
        assert_relative_eq!(tops.as_slice()[0].height, 6.0);
    }

    #[test]
    fn test_variable_window_separates_small_tree() {
        // The tall tree's wide window reaches the short one, but the short
        // tree's own narrow window does not reach the tall one.
        let mut chm = Raster::filled(1, 9, 0.5);
        chm.set(0, 2, 20.0).unwrap();
        chm.set(0, 5, 6.0).unwrap();

        let params = VwfParams {
            window: WindowFunction::Linear { slope: 0.2, intercept: 0.0 },
            min_height: 2.0,
            ..Default::default()
        };
        let tops = detect_treetops(&chm, params.clone()).unwrap();
        assert_eq!(tops.len(), 2);

        // Adjacent to the tall tree the short one is inside its own window's reach.
        let mut chm = Raster::filled(1, 9, 0.5);
        chm.set(0, 2, 20.0).unwrap();
        chm.set(0, 3, 6.0).unwrap();
        let tops = detect_treetops(&chm, params).unwrap();
        assert_eq!(tops.len(), 1);
        assert_relative_eq!(tops.as_slice()[0].height, 20.0);
    }

    #[test]
    fn test_negative_radius_rejected() {
        let params = VwfParams {
            window: WindowFunction::custom(|h| 5.0 - h),
            min_height: 2.0,
            ..Default::default()
        };
        let err = detect_treetops(&peak_chm(), params).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_window_too_wide_rejected() {
        let params = VwfParams {
            window: WindowFunction::Constant { radius: 60.0 },
            ..Default::default()
        };
        assert!(matches!(
            detect_treetops(&peak_chm(), params),
            Err(Error::InvalidParameter { name: "max_window_diameter", .. })
        ));
    }

    #[test]
    fn test_idempotent_and_carries_crs() {
        let chm = peak_chm().with_crs(CRS::from_epsg(2154));
        let a = detect_treetops(&chm, constant(2.0, 2.0)).unwrap();
        let b = detect_treetops(&chm, constant(2.0, 2.0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.crs(), Some(&CRS::from_epsg(2154)));
    }

    #[test]
    fn test_params_from_json() {
        let params: VwfParams = serde_json::from_str(
            r#"{"window":{"type":"linear","slope":0.05,"intercept":0.6},"min_height":3.0}"#,
        )
        .unwrap();
        assert_eq!(params.min_height, 3.0);
        assert_eq!(params.shape, WindowShape::Circular);
        assert_eq!(params.max_window_diameter, 99);
    }
}
