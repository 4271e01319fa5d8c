//! Treetop detection
//!
//! - **window**: height → search radius functions
//! - **vwf**: variable window filter local-maximum detection

mod vwf;
mod window;

pub use vwf::{detect_treetops, VariableWindowFilter, VwfParams};
pub use window::WindowFunction;

use geo::Point;
use serde::{Deserialize, Serialize};
use crowntrace_core::vector::{Feature, FeatureCollection};
use crowntrace_core::{Error, Result, CRS};

/// A detected tree apex
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Treetop {
    /// Identifier, 1-based; also the crown label this treetop seeds
    pub id: u32,
    /// X coordinate of the apex cell centre
    pub x: f64,
    /// Y coordinate of the apex cell centre
    pub y: f64,
    /// CHM value at the apex
    pub height: f64,
    /// Search radius (ground units) that confirmed the apex
    pub win_radius: f64,
}

impl Treetop {
    pub fn point(&self) -> Point<f64> {
        Point::new(self.x, self.y)
    }
}

/// Immutable set of treetops with the coordinate reference they are expressed in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Treetops {
    tops: Vec<Treetop>,
    crs: Option<CRS>,
}

impl Treetops {
    pub fn new(tops: Vec<Treetop>, crs: Option<CRS>) -> Self {
        Self { tops, crs }
    }

    pub fn len(&self) -> usize {
        self.tops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Treetop> {
        self.tops.iter()
    }

    pub fn as_slice(&self) -> &[Treetop] {
        &self.tops
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Look up a treetop by identifier
    pub fn get(&self, id: u32) -> Option<&Treetop> {
        // Detector output is numbered 1..=n in order; fall back to a scan otherwise.
        match self.tops.get((id as usize).wrapping_sub(1)) {
            Some(t) if t.id == id => Some(t),
            _ => self.tops.iter().find(|t| t.id == id),
        }
    }

    /// Point features with `treeID`, `height` and `winRadius` attributes
    pub fn to_features(&self) -> FeatureCollection {
        self.tops
            .iter()
            .map(|t| {
                Feature::new(t.point())
                    .with_property("treeID", t.id as i64)
                    .with_property("height", t.height)
                    .with_property("winRadius", t.win_radius)
            })
            .collect::<FeatureCollection>()
            .with_crs(self.crs.clone())
    }

    /// Build treetops from externally supplied point features.
    ///
    /// Requires point geometries and a numeric `height` attribute. `treeID`
    /// is used when present and unique, otherwise features are numbered from 1.
    /// A missing `winRadius` becomes 0.
    pub fn from_features(features: &FeatureCollection) -> Result<Self> {
        let mut tops = Vec::with_capacity(features.len());
        for (idx, feature) in features.iter().enumerate() {
            let Some(geo::Geometry::Point(p)) = &feature.geometry else {
                return Err(Error::UnsupportedGeometry(format!(
                    "treetop feature {} is not a point",
                    idx
                )));
            };
            let height = feature.get_f64("height").ok_or_else(|| {
                Error::invalid_parameter("height", "missing", format!("treetop feature {} has no height", idx))
            })?;
            tops.push(Treetop {
                id: feature
                    .get_f64("treeID")
                    .filter(|v| *v >= 1.0 && v.fract() == 0.0)
                    .map_or(idx as u32 + 1, |v| v as u32),
                x: p.x(),
                y: p.y(),
                height,
                win_radius: feature.get_f64("winRadius").unwrap_or(0.0),
            });
        }

        let mut ids: Vec<u32> = tops.iter().map(|t| t.id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != tops.len() {
            for (idx, t) in tops.iter_mut().enumerate() {
                t.id = idx as u32 + 1;
            }
        }

        Ok(Self::new(tops, features.crs.clone()))
    }
}
