//! Tree summaries over zones
//!
//! - **functions**: named statistic functions and custom registration
//! - **zones**: global, polygon and grid zone definitions
//! - **summarise**: per-zone counts and attribute statistics

pub mod functions;
pub mod summarise;
pub mod zones;

pub use functions::{composite_name, Statistic, StatisticFn, StatisticTable, DEFAULT_STATISTICS};
pub use summarise::{
    summarise, Summary, SummaryGrid, SummaryParams, SummaryRecord, SummaryTable, ZonalSummary, ZoneStatus,
    COUNT_FIELD,
};
pub use zones::{validate_zone, GridDefinition, RegionAssignment, ZoneSpec, MAX_GRID_CELLS};
