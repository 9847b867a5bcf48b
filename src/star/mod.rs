//! Star schema backend.
//!
//! - [`mapping`] - logical to physical column mapping and join descriptors
//! - [`schema`] - star/snowflake join resolution
//! - [`context`] - per-query columns, labels and cell conditions
//! - [`browser`] - aggregation statements and their execution

pub mod browser;
pub mod context;
pub mod mapping;
pub mod schema;

pub use browser::{
    is_builtin_function, AggregateFunction, AggregateRequest, AggregateStatements, Browser,
    AGGREGATE_FUNCTIONS,
};
pub use context::{hierarchies_for_cube, HierarchyKeys, QueryContext};
pub use mapping::{
    ColumnReference, Join, JoinKey, JoinMethod, Mapper, PhysicalCatalog, FACT_KEY_LABEL,
};
pub use schema::{StarSchema, StarSchemaBuilder, StarTable, TableKey};
