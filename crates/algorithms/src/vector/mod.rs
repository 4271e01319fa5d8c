//! Vector geometry helpers
//!
//! - Measurements: crown area, perimeter, equivalent diameter
//! - Simplify: Douglas-Peucker smoothing of traced outlines
//! - Spatial: bounding boxes and representative points

mod measurements;
mod simplify;
mod spatial;

pub use measurements::{area, equivalent_diameter, multipolygon_perimeter, perimeter};
pub use simplify::{simplify_multipolygon, simplify_polygon};
pub use spatial::{bounding_box, centroid, BoundingBox};
