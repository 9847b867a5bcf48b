//! # starql
//!
//! OLAP aggregation queries over relational star and snowflake schemas.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Cell / Cut / Drilldown (logical query)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [model: cube, dimensions, aggregates]
//! ┌─────────────────────────────────────────────────────────┐
//! │       StarSchema (mappings, joins, required tables)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [query context]
//! ┌─────────────────────────────────────────────────────────┐
//! │          SQL statement (multi-dialect builder)           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [store]
//! ┌─────────────────────────────────────────────────────────┐
//! │   AggregationResult (summary, cells, window calculators) │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod sql;
pub mod star;
pub mod store;

pub use error::{QueryError, QueryResult};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::model::{
        Attribute, Cardinality, Cube, Dimension, Hierarchy, Level, Measure, MeasureAggregate,
    };
    pub use crate::query::{
        AggregationResult, Cell, Cut, Drilldown, DrilldownRequest, Record, TableRow,
    };
    pub use crate::sql::{Dialect, Query};
    pub use crate::star::{
        AggregateRequest, Browser, ColumnReference, Join, JoinMethod, PhysicalCatalog, StarSchema,
    };
    pub use crate::store::{SqliteStore, Store};
}
