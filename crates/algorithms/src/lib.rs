//! # Crowntrace Algorithms
//!
//! Individual tree analysis on canopy height models.
//!
//! ## Algorithm Categories
//!
//! - **treetops**: variable window filter treetop detection
//! - **segmentation**: marker-controlled watershed crowns and crown polygons
//! - **statistics**: zonal and grid summaries of tree attributes
//! - **vector**: crown measurements, simplification, extents
//!
//! ```
//! use crowntrace_algorithms::prelude::*;
//!
//! let mut chm = Raster::filled(9, 9, 1.0_f64).with_transform(GeoTransform::from_origin(0.0, 9.0, 1.0));
//! chm.set(4, 4, 12.0).unwrap();
//! chm.set(4, 5, 1.5).unwrap();
//!
//! let treetops = detect_treetops(&chm, VwfParams::default()).unwrap();
//! assert_eq!(treetops.len(), 1);
//!
//! let crowns = mcws(&chm, &treetops, McwsParams::default()).unwrap();
//! assert_eq!(crowns.labels.get(4, 5).unwrap(), 1);
//!
//! let summary = summarise(&treetops.to_features(), &SummaryParams::default()).unwrap();
//! assert_eq!(summary.as_table().unwrap().records[0].count, 1);
//! ```

pub(crate) mod maybe_rayon;

pub mod segmentation;
pub mod statistics;
pub mod treetops;
pub mod vector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::segmentation::{
        crown_polygons, crowns_to_features, mcws, segment_crowns, CrownFormat, CrownPolygon, Crowns,
        MarkerWatershed, McwsParams,
    };
    pub use crate::statistics::{
        summarise, GridDefinition, RegionAssignment, StatisticTable, Summary, SummaryParams, ZonalSummary,
        ZoneSpec, ZoneStatus,
    };
    pub use crate::treetops::{
        detect_treetops, Treetop, Treetops, VariableWindowFilter, VwfParams, WindowFunction,
    };
    pub use crowntrace_core::prelude::*;
}
