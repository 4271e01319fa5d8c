//! Crown segmentation
//!
//! - **mcws**: marker-controlled watershed over the canopy height model
//! - **polygonize**: crown outlines and per-crown measurements

mod mcws;
mod polygonize;

pub use mcws::{mcws, segment_crowns, CrownFormat, Crowns, MarkerWatershed, McwsParams};
pub use polygonize::{crown_polygons, crowns_to_features, CrownPolygon};
