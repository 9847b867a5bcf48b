//! Physical mapping of logical attributes: column references, join
//! descriptors, naming conventions and the table catalog.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SchemaSettings;
use crate::error::{QueryError, QueryResult};
use crate::model::{Cube, LogicalAttribute};

/// Label of the fact key pseudo-attribute.
pub const FACT_KEY_LABEL: &str = "__fact_key__";

/// Split `schema.table.column` into its 1 to 3 parts, last part first filled.
fn split_reference(text: &str) -> QueryResult<(Option<String>, Option<String>, String)> {
    let parts: Vec<&str> = text.split('.').collect();
    match parts.as_slice() {
        [column] => Ok((None, None, column.to_string())),
        [table, column] => Ok((None, Some(table.to_string()), column.to_string())),
        [schema, table, column] => Ok((
            Some(schema.to_string()),
            Some(table.to_string()),
            column.to_string(),
        )),
        _ => Err(QueryError::argument(format!(
            "Join key can have 1 to 3 items, got '{}'",
            text
        ))),
    }
}

// =============================================================================
// Column reference
// =============================================================================

/// Physical column of a logical attribute. `table: None` is the fact table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ColumnSpec")]
pub struct ColumnReference {
    pub schema: Option<String>,
    pub table: Option<String>,
    pub column: String,
    /// Date/time part to extract, such as `year`.
    pub extract: Option<String>,
    /// Unary SQL function wrapped around the column.
    pub function: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnSpec {
    Text(String),
    Full {
        #[serde(default)]
        schema: Option<String>,
        #[serde(default)]
        table: Option<String>,
        column: String,
        #[serde(default)]
        extract: Option<String>,
        #[serde(default)]
        function: Option<String>,
    },
}

impl TryFrom<ColumnSpec> for ColumnReference {
    type Error = QueryError;

    fn try_from(spec: ColumnSpec) -> QueryResult<Self> {
        match spec {
            ColumnSpec::Text(text) => ColumnReference::parse(&text),
            ColumnSpec::Full {
                schema,
                table,
                column,
                extract,
                function,
            } => Ok(ColumnReference {
                schema,
                table,
                column,
                extract,
                function,
            }),
        }
    }
}

impl ColumnReference {
    pub fn new(table: Option<&str>, column: &str) -> Self {
        Self {
            table: table.map(str::to_string),
            column: column.into(),
            ..Default::default()
        }
    }

    /// Parse `column`, `table.column` or `schema.table.column`.
    pub fn parse(text: &str) -> QueryResult<Self> {
        let (schema, table, column) = split_reference(text)?;
        Ok(Self {
            schema,
            table,
            column,
            ..Default::default()
        })
    }

    pub fn with_schema(mut self, schema: Option<&str>) -> Self {
        self.schema = schema.map(str::to_string);
        self
    }

    pub fn with_extract(mut self, part: &str) -> Self {
        self.extract = Some(part.into());
        self
    }

    pub fn with_function(mut self, function: &str) -> Self {
        self.function = Some(function.into());
        self
    }
}

impl fmt::Display for ColumnReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{}.", schema)?;
        }
        if let Some(table) = &self.table {
            write!(f, "{}.", table)?;
        }
        f.write_str(&self.column)
    }
}

// =============================================================================
// Joins
// =============================================================================

/// One side of a join: a table and its (possibly compound) key columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JoinKeySpec")]
pub struct JoinKey {
    pub schema: Option<String>,
    pub table: Option<String>,
    pub columns: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JoinKeySpec {
    Text(String),
    Full {
        #[serde(default)]
        schema: Option<String>,
        #[serde(default)]
        table: Option<String>,
        #[serde(default)]
        column: Option<String>,
        #[serde(default)]
        columns: Vec<String>,
    },
}

impl TryFrom<JoinKeySpec> for JoinKey {
    type Error = QueryError;

    fn try_from(spec: JoinKeySpec) -> QueryResult<Self> {
        match spec {
            JoinKeySpec::Text(text) => JoinKey::parse(&text),
            JoinKeySpec::Full {
                schema,
                table,
                column,
                mut columns,
            } => {
                if let Some(column) = column {
                    columns.insert(0, column);
                }
                Ok(JoinKey {
                    schema,
                    table,
                    columns,
                })
            }
        }
    }
}

impl JoinKey {
    pub fn new(table: Option<&str>, columns: &[&str]) -> Self {
        Self {
            schema: None,
            table: table.map(str::to_string),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Parse a single-column key written as `schema.table.column`.
    pub fn parse(text: &str) -> QueryResult<Self> {
        let (schema, table, column) = split_reference(text)?;
        Ok(Self {
            schema,
            table,
            columns: vec![column],
        })
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{}.", schema)?;
        }
        write!(
            f,
            "{}.{}",
            self.table.as_deref().unwrap_or("(FACT)"),
            self.columns.join(",")
        )
    }
}

/// How the rows of the two sides of a join are kept.
///
/// | method   | join                                  |
/// |----------|---------------------------------------|
/// | `match`  | `star INNER JOIN detail`              |
/// | `master` | `star LEFT OUTER JOIN detail`         |
/// | `detail` | `detail LEFT OUTER JOIN (star)`       |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMethod {
    #[default]
    Match,
    Master,
    Detail,
}

/// Join of a detail table onto the star through its master.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub master: JoinKey,
    pub detail: JoinKey,
    /// Name the detail table is joined under.
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub method: JoinMethod,
}

impl Join {
    pub fn new(master: JoinKey, detail: JoinKey) -> Self {
        Self {
            master,
            detail,
            alias: None,
            method: JoinMethod::Match,
        }
    }

    /// Single-column join written as `table.column` pairs.
    pub fn parse(master: &str, detail: &str) -> QueryResult<Self> {
        Ok(Self::new(JoinKey::parse(master)?, JoinKey::parse(detail)?))
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_method(mut self, method: JoinMethod) -> Self {
        self.method = method;
        self
    }
}

// =============================================================================
// Physical catalog
// =============================================================================

/// Ordered column lists of the physical tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhysicalCatalog {
    tables: BTreeMap<(Option<String>, String), Vec<String>>,
}

impl PhysicalCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, schema: Option<&str>, table: &str, columns: &[&str]) -> Self {
        self.add_table(
            schema,
            table,
            columns.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    pub fn add_table(&mut self, schema: Option<&str>, table: &str, columns: Vec<String>) {
        self.tables
            .insert((schema.map(str::to_string), table.to_string()), columns);
    }

    /// Columns of a table. A schema-qualified lookup falls back to the
    /// unqualified table.
    pub fn columns(&self, schema: Option<&str>, table: &str) -> Option<&[String]> {
        let key = (schema.map(str::to_string), table.to_string());
        self.tables
            .get(&key)
            .or_else(|| {
                schema.and_then(|_| self.tables.get(&(None, table.to_string())))
            })
            .map(Vec::as_slice)
    }

    pub fn has_table(&self, schema: Option<&str>, table: &str) -> bool {
        self.columns(schema, table).is_some()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables
            .keys()
            .map(|(schema, table)| match schema {
                Some(schema) => format!("{}.{}", schema, table),
                None => table.clone(),
            })
            .collect()
    }
}

// =============================================================================
// Mapper
// =============================================================================

/// Maps the logical attributes of a cube to physical columns.
///
/// Explicit cube mappings win. Otherwise dimension attributes live in
/// `<dimension_prefix><dimension><dimension_suffix>.<attribute>`, flat
/// dimensions referenced by their own name live in the fact table, and
/// measures and details are fact columns.
#[derive(Debug)]
pub struct Mapper<'a> {
    cube: &'a Cube,
    naming: &'a SchemaSettings,
}

impl<'a> Mapper<'a> {
    pub fn new(cube: &'a Cube, naming: &'a SchemaSettings) -> Self {
        Self { cube, naming }
    }

    pub fn fact_name(&self) -> String {
        self.cube
            .fact
            .clone()
            .unwrap_or_else(|| self.naming.fact_table_name(&self.cube.name))
    }

    pub fn schema(&self) -> Option<&str> {
        self.naming.schema.as_deref()
    }

    /// Column references of every base attribute of the cube.
    pub fn mappings(&self) -> BTreeMap<String, ColumnReference> {
        let mut mappings = BTreeMap::new();

        for dimension in &self.cube.dimensions {
            for attribute in dimension.all_attributes() {
                if !attribute.is_base() {
                    continue;
                }
                let reference = if attribute.reference == dimension.name {
                    ColumnReference::new(None, &attribute.name)
                } else {
                    let schema = self
                        .naming
                        .dimension_schema
                        .as_deref()
                        .or(self.schema());
                    ColumnReference::new(
                        Some(&self.naming.dimension_table_name(&dimension.name)),
                        &attribute.name,
                    )
                    .with_schema(schema)
                };
                mappings.insert(attribute.reference.clone(), reference);
            }
        }

        let fact_attributes = self
            .cube
            .details
            .iter()
            .map(|a| a as &dyn LogicalAttribute)
            .chain(self.cube.measures.iter().map(|m| m as &dyn LogicalAttribute));
        for attribute in fact_attributes {
            if attribute.is_base() {
                mappings.insert(
                    attribute.reference().to_string(),
                    ColumnReference::new(None, attribute.name()),
                );
            }
        }

        for (reference, column) in &self.cube.mappings {
            mappings.insert(reference.clone(), column.clone());
        }

        mappings
    }
}
