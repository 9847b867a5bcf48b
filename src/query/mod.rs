//! Logical query algebra.
//!
//! - [`cut`] - point, set and range cuts and their string form
//! - [`cell`] - cells: conjunctions of cuts
//! - [`drilldown`] - drilldown resolution to level lists
//! - [`statutils`] - window calculators over result records
//! - [`result`] - aggregation results

pub mod cell;
pub mod cut;
pub mod drilldown;
pub mod result;
pub mod statutils;

pub use cell::Cell;
pub use cut::{
    cut_from_dict, cut_from_string, cuts_from_string, path, path_from_string, string_from_cuts,
    string_from_path, string_to_dimension_level, Cut, CutKind, NULL_PATH_VALUE,
};
pub use drilldown::{Drilldown, DrilldownItem, DrilldownRequest};
pub use result::{AggregationResult, TableRow};
pub use statutils::{calculators_for_aggregates, WindowCalculator, WindowFunction};

/// Name of the virtual dimension that flags whether a record falls within
/// the split cell.
pub const SPLIT_DIMENSION_NAME: &str = "__within_split__";

/// One result row: attribute and aggregate values by label.
pub type Record = serde_json::Map<String, serde_json::Value>;
