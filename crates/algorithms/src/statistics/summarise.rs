//! Zonal and grid summaries of tree attributes
//!
//! Inputs are point or polygon features (treetops, crowns). Each input is
//! matched to zones by its representative location, or by area overlap for
//! polygons, and the requested statistics are computed per zone over the
//! matched inputs' attribute values.

use std::collections::BTreeMap;
use geo::{Area, BooleanOps, Geometry, Intersects, MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::maybe_rayon::*;
use crate::statistics::functions::{composite_name, StatisticTable};
use crate::statistics::zones::{validate_zone, GridDefinition, RegionAssignment, ZoneSpec};
use crate::vector::{bounding_box, centroid, BoundingBox};
use crowntrace_core::crs::ensure_compatible;
use crowntrace_core::raster::Raster;
use crowntrace_core::vector::{AttributeValue, Feature, FeatureCollection};
use crowntrace_core::{Algorithm, Error, Result, CRS};

/// Name of the per-zone count field and grid layer
pub const COUNT_FIELD: &str = "TreeCount";

/// Parameters for [`summarise`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryParams {
    pub zones: ZoneSpec,
    /// Numeric input attributes to summarize
    pub attributes: Vec<String>,
    pub statistics: StatisticTable,
    pub assignment: RegionAssignment,
    /// Extent tiled by [`ZoneSpec::GridCellSize`]; defaults to the inputs' extent
    pub extent: Option<BoundingBox>,
}

impl Default for SummaryParams {
    fn default() -> Self {
        Self {
            zones: ZoneSpec::Global,
            attributes: vec!["height".to_string()],
            statistics: StatisticTable::default(),
            assignment: RegionAssignment::Centroid,
            extent: None,
        }
    }
}

/// Outcome of one zone
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneStatus {
    Ok,
    /// Invalid zone geometry or statistic; values are missing
    Failed(String),
}

impl ZoneStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ZoneStatus::Ok)
    }
}

/// Summary of one zone
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    /// Zone geometry (`None` for the global record)
    pub geometry: Option<Geometry<f64>>,
    /// Attributes of the zone feature, carried through
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Inputs assigned to the zone
    pub count: usize,
    /// `<attribute><Statistic>` values in request order; `None` is missing
    pub values: Vec<(String, Option<f64>)>,
    pub status: ZoneStatus,
}

impl SummaryRecord {
    /// Value of a composite statistic, `None` if missing or unknown
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| *v)
    }
}

/// Per-zone summary records
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    pub records: Vec<SummaryRecord>,
    pub crs: Option<CRS>,
}

impl SummaryTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of all zone counts
    pub fn total_count(&self) -> usize {
        self.records.iter().map(|r| r.count).sum()
    }

    /// Attributed features: zone attributes, `TreeCount`, every statistic
    /// (null when missing) and a `status` text for failed zones.
    pub fn to_features(&self) -> FeatureCollection {
        self.records
            .iter()
            .map(|record| {
                let mut feature = Feature::empty();
                feature.geometry = record.geometry.clone();
                feature.properties = record.attributes.clone();
                feature.set_property(COUNT_FIELD, record.count as i64);
                for (name, value) in &record.values {
                    feature.set_property(name.clone(), *value);
                }
                if let ZoneStatus::Failed(reason) = &record.status {
                    feature.set_property("status", reason.as_str());
                }
                feature
            })
            .collect::<FeatureCollection>()
            .with_crs(self.crs.clone())
    }
}

/// Aligned summary layers over a grid
#[derive(Debug, Clone)]
pub struct SummaryGrid {
    pub grid: GridDefinition,
    /// `TreeCount` first, then `<attribute><Statistic>` layers
    pub layers: Vec<(String, Raster<f64>)>,
}

impl SummaryGrid {
    pub fn layer(&self, name: &str) -> Option<&Raster<f64>> {
        self.layers.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn count(&self) -> Option<&Raster<f64>> {
        self.layer(COUNT_FIELD)
    }

    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|(n, _)| n.as_str()).collect()
    }
}

/// Result of [`summarise`]
#[derive(Debug, Clone)]
pub enum Summary {
    /// Global or polygon zones
    Table(SummaryTable),
    /// Generated or template grid
    Grid(SummaryGrid),
}

impl Summary {
    pub fn as_table(&self) -> Option<&SummaryTable> {
        match self {
            Summary::Table(t) => Some(t),
            Summary::Grid(_) => None,
        }
    }

    pub fn as_grid(&self) -> Option<&SummaryGrid> {
        match self {
            Summary::Grid(g) => Some(g),
            Summary::Table(_) => None,
        }
    }
}

/// Zonal summary algorithm
#[derive(Debug, Clone, Default)]
pub struct ZonalSummary;

impl Algorithm for ZonalSummary {
    type Input = FeatureCollection;
    type Output = Summary;
    type Params = SummaryParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "ZonalSummary"
    }

    fn description(&self) -> &'static str {
        "Count trees and summarize their attributes per zone or grid cell"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        summarise(&input, &params)
    }
}

/// An input prepared for zone matching
struct Member {
    location: Option<Point<f64>>,
    /// Polygon and its area, kept only for overlap assignment
    region: Option<(MultiPolygon<f64>, f64)>,
    extent: Option<BoundingBox>,
    /// One value per requested attribute, NaN when missing
    values: Vec<f64>,
}

impl Member {
    fn belongs_to(&self, zone: &MultiPolygon<f64>, zone_extent: &BoundingBox, assignment: RegionAssignment) -> bool {
        if let Some(extent) = &self.extent
            && !extent.intersects(zone_extent)
        {
            return false;
        }
        match (assignment, &self.region) {
            (RegionAssignment::Overlap { min_fraction }, Some((region, area))) => {
                zone.intersection(region).unsigned_area() / area >= min_fraction
            }
            _ => self.location.is_some_and(|p| zone.intersects(&p)),
        }
    }
}

fn prepare(inputs: &FeatureCollection, attributes: &[String], assignment: RegionAssignment) -> Vec<Member> {
    let overlap = matches!(assignment, RegionAssignment::Overlap { .. });
    inputs
        .iter()
        .map(|feature| {
            let geometry = feature.geometry.as_ref();
            let region = match geometry {
                Some(Geometry::Polygon(p)) if overlap => Some(MultiPolygon::new(vec![p.clone()])),
                Some(Geometry::MultiPolygon(mp)) if overlap => Some(mp.clone()),
                _ => None,
            }
            .map(|mp| {
                let area = mp.unsigned_area();
                (mp, area)
            })
            .filter(|(_, area)| *area > 0.0);

            let location = geometry.and_then(centroid);
            let extent = match &region {
                Some((mp, _)) => bounding_box(&Geometry::MultiPolygon(mp.clone())),
                None => location.map(|p| BoundingBox::new(p.x(), p.y(), p.x(), p.y())),
            };

            Member {
                location,
                region,
                extent,
                values: attributes
                    .iter()
                    .map(|a| feature.get_f64(a).unwrap_or(f64::NAN))
                    .collect(),
            }
        })
        .collect()
}

/// Statistics over the members at `indices`
fn aggregate(
    members: &[Member],
    indices: &[usize],
    attributes: &[String],
    statistics: &StatisticTable,
) -> (Vec<(String, Option<f64>)>, ZoneStatus) {
    let mut values = Vec::with_capacity(attributes.len() * statistics.len());
    let mut status = ZoneStatus::Ok;

    for (ai, attribute) in attributes.iter().enumerate() {
        let sample: Vec<f64> = indices
            .iter()
            .map(|&i| members[i].values[ai])
            .filter(|v| !v.is_nan())
            .collect();

        for stat in statistics.iter() {
            let name = composite_name(attribute, stat.name());
            match stat.evaluate(&sample) {
                Ok(v) => values.push((name, v)),
                Err(e) => {
                    if status.is_ok() {
                        status = ZoneStatus::Failed(e.to_string());
                    }
                    values.push((name, None));
                }
            }
        }
    }

    (values, status)
}

fn missing_values(attributes: &[String], statistics: &StatisticTable) -> Vec<(String, Option<f64>)> {
    attributes
        .iter()
        .flat_map(|a| statistics.iter().map(move |s| (composite_name(a, s.name()), None)))
        .collect()
}

fn validate(params: &SummaryParams) -> Result<()> {
    if let Some(bad) = params.attributes.iter().find(|a| a.trim().is_empty()) {
        return Err(Error::invalid_parameter("attributes", format!("{:?}", bad), "attribute names must not be empty"));
    }
    params.assignment.validate()?;

    match &params.zones {
        ZoneSpec::GridCellSize(size) if !size.is_finite() || *size <= 0.0 => {
            return Err(Error::invalid_parameter("cell_size", size, "cell size must be > 0"));
        }
        ZoneSpec::GridTemplate(grid) => grid.validate()?,
        _ => {}
    }

    if let Some(extent) = &params.extent
        && (!extent.is_finite() || extent.width() < 0.0 || extent.height() < 0.0)
    {
        return Err(Error::invalid_parameter(
            "extent",
            format!("{:?}", extent),
            "extent must be finite with min <= max",
        ));
    }
    Ok(())
}

/// Summarize input features over zones.
///
/// # Modes
/// - [`ZoneSpec::Global`]: one record over all inputs
/// - [`ZoneSpec::Polygons`]: one record per zone feature, in input order;
///   invalid zones are kept with [`ZoneStatus::Failed`]
/// - [`ZoneSpec::GridCellSize`] / [`ZoneSpec::GridTemplate`]: aligned raster
///   layers, `TreeCount` plus one layer per attribute and statistic
///
/// An empty zone has count 0 and missing statistics.
///
/// # Errors
/// Configuration errors (`InvalidParameter`) and CRS mismatches are checked
/// before any zone is processed.
pub fn summarise(inputs: &FeatureCollection, params: &SummaryParams) -> Result<Summary> {
    validate(params)?;

    debug!(
        inputs = inputs.len(),
        attributes = ?params.attributes,
        statistics = ?params.statistics.names(),
        assignment = ?params.assignment,
        "summarising"
    );

    match &params.zones {
        ZoneSpec::Global => {
            let members = prepare(inputs, &params.attributes, params.assignment);
            let indices: Vec<usize> = (0..members.len()).collect();
            let (values, status) = aggregate(&members, &indices, &params.attributes, &params.statistics);
            Ok(Summary::Table(SummaryTable {
                records: vec![SummaryRecord {
                    geometry: None,
                    attributes: BTreeMap::new(),
                    count: members.len(),
                    values,
                    status,
                }],
                crs: inputs.crs.clone(),
            }))
        }
        ZoneSpec::Polygons(zones) => {
            ensure_compatible(zones.crs.as_ref(), inputs.crs.as_ref())?;
            let members = prepare(inputs, &params.attributes, params.assignment);
            let crs = zones.crs.clone().or_else(|| inputs.crs.clone());
            summarise_polygons(&members, zones, crs, params).map(Summary::Table)
        }
        ZoneSpec::GridCellSize(size) => {
            let members = prepare(inputs, &params.attributes, params.assignment);
            let extent = match params.extent {
                Some(extent) => extent,
                None => members
                    .iter()
                    .filter_map(|m| m.extent)
                    .reduce(|a, b| a.union(&b))
                    .ok_or_else(|| {
                        Error::invalid_parameter("extent", "none", "no extent given and no located inputs to derive one")
                    })?,
            };
            let grid = GridDefinition::from_extent(&extent, *size, inputs.crs.clone())?;
            summarise_grid(&members, grid, params).map(Summary::Grid)
        }
        ZoneSpec::GridTemplate(grid) => {
            ensure_compatible(grid.crs.as_ref(), inputs.crs.as_ref())?;
            let members = prepare(inputs, &params.attributes, params.assignment);
            let mut grid = grid.clone();
            if grid.crs.is_none() {
                grid.crs = inputs.crs.clone();
            }
            summarise_grid(&members, grid, params).map(Summary::Grid)
        }
    }
}

fn summarise_polygons(
    members: &[Member],
    zones: &FeatureCollection,
    crs: Option<CRS>,
    params: &SummaryParams,
) -> Result<SummaryTable> {
    let records: Vec<SummaryRecord> = zones
        .features
        .par_iter()
        .enumerate()
        .map(|(idx, zone)| {
            let base = SummaryRecord {
                geometry: zone.geometry.clone(),
                attributes: zone.properties.clone(),
                count: 0,
                values: Vec::new(),
                status: ZoneStatus::Ok,
            };

            let polygon = match validate_zone(zone.geometry.as_ref()) {
                Ok(mp) => mp,
                Err(e) => {
                    warn!(zone = idx, error = %e, "invalid zone skipped");
                    return SummaryRecord {
                        values: missing_values(&params.attributes, &params.statistics),
                        status: ZoneStatus::Failed(e.to_string()),
                        ..base
                    };
                }
            };
            let Some(zone_extent) = bounding_box(&Geometry::MultiPolygon(polygon.clone())) else {
                return SummaryRecord {
                    values: missing_values(&params.attributes, &params.statistics),
                    status: ZoneStatus::Failed("zone has no extent".into()),
                    ..base
                };
            };

            let indices: Vec<usize> = members
                .iter()
                .enumerate()
                .filter(|(_, m)| m.belongs_to(&polygon, &zone_extent, params.assignment))
                .map(|(i, _)| i)
                .collect();
            let (values, status) = aggregate(members, &indices, &params.attributes, &params.statistics);

            SummaryRecord {
                count: indices.len(),
                values,
                status,
                ..base
            }
        })
        .collect();

    let failed = records.iter().filter(|r| !r.status.is_ok()).count();
    info!(zones = records.len(), failed, "zonal summary finished");

    Ok(SummaryTable { records, crs })
}

/// Cells of `grid` that a member is assigned to
fn grid_cells(member: &Member, grid: &GridDefinition, assignment: RegionAssignment) -> Vec<usize> {
    match (assignment, &member.region, &member.extent) {
        (RegionAssignment::Overlap { min_fraction }, Some((region, area)), Some(extent)) => {
            let (c0, r0) = grid.transform.geo_to_pixel(extent.min_x, extent.max_y);
            let (c1, r1) = grid.transform.geo_to_pixel(extent.max_x, extent.min_y);
            let clamp = |v: f64, n: usize| (v.max(0.0).floor() as usize).min(n - 1);
            let (col_lo, col_hi) = (clamp(c0.min(c1), grid.cols), clamp(c0.max(c1), grid.cols));
            let (row_lo, row_hi) = (clamp(r0.min(r1), grid.rows), clamp(r0.max(r1), grid.rows));

            let mut cells = Vec::new();
            for row in row_lo..=row_hi {
                for col in col_lo..=col_hi {
                    let cell = MultiPolygon::new(vec![grid.cell_bounds(row, col).to_polygon()]);
                    if cell.intersection(region).unsigned_area() / area >= min_fraction {
                        cells.push(row * grid.cols + col);
                    }
                }
            }
            cells
        }
        _ => member
            .location
            .and_then(|p| grid.locate(p.x(), p.y()))
            .map(|(row, col)| vec![row * grid.cols + col])
            .unwrap_or_default(),
    }
}

fn summarise_grid(members: &[Member], grid: GridDefinition, params: &SummaryParams) -> Result<SummaryGrid> {
    let mut cell_members: Vec<Vec<usize>> = vec![Vec::new(); grid.len()];
    let mut outside = 0usize;
    for (i, member) in members.iter().enumerate() {
        let cells = grid_cells(member, &grid, params.assignment);
        if cells.is_empty() {
            outside += 1;
        }
        for cell in cells {
            cell_members[cell].push(i);
        }
    }
    debug!(rows = grid.rows, cols = grid.cols, outside, "inputs assigned to grid");

    let summaries: Vec<(Vec<(String, Option<f64>)>, ZoneStatus)> = cell_members
        .par_iter()
        .map(|indices| aggregate(members, indices, &params.attributes, &params.statistics))
        .collect();

    let mut count = grid.empty_layer();
    let names: Vec<String> = params
        .attributes
        .iter()
        .flat_map(|a| params.statistics.iter().map(move |s| composite_name(a, s.name())))
        .collect();
    let mut stat_layers: Vec<Raster<f64>> = names.iter().map(|_| grid.empty_layer()).collect();

    let mut failed = 0usize;
    for (cell, (indices, (values, status))) in cell_members.iter().zip(summaries).enumerate() {
        let (row, col) = (cell / grid.cols, cell % grid.cols);
        count.set(row, col, indices.len() as f64)?;
        for (layer, (_, value)) in stat_layers.iter_mut().zip(values) {
            layer.set(row, col, value.unwrap_or(f64::NAN))?;
        }
        if !status.is_ok() {
            failed += 1;
        }
    }
    if failed > 0 {
        warn!(failed, "grid cells with failed statistics");
    }
    info!(cells = grid.len(), assigned = members.len() - outside, "grid summary finished");

    let mut layers = Vec::with_capacity(names.len() + 1);
    layers.push((COUNT_FIELD.to_string(), count));
    layers.extend(names.into_iter().zip(stat_layers));

    Ok(SummaryGrid { grid, layers })
}
