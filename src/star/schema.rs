//! Star and snowflake schemas: the physical tables of a cube and the joins
//! that connect them to the fact table.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::mapping::{ColumnReference, Join, JoinMethod, PhysicalCatalog, FACT_KEY_LABEL};
use crate::error::{QueryError, QueryResult};
use crate::sql::{and_all, extract, func, qualified_col, table_col, Expr, ExprExt, FromItem, JoinType, Query, TableRef};

/// `(schema, table name or alias)`
pub type TableKey = (Option<String>, String);

fn format_key(key: &TableKey) -> String {
    match &key.0 {
        Some(schema) => format!("{}.{}", schema, key.1),
        None => key.1.clone(),
    }
}

#[derive(Debug, Clone)]
enum TableSource {
    Table,
    /// Named table expression, selected as `(query) AS name`.
    Expression(Query),
}

/// A table of the star: the fact table or a joined detail table.
#[derive(Debug, Clone)]
pub struct StarTable {
    pub key: TableKey,
    pub schema: Option<String>,
    /// Physical table name.
    pub name: String,
    /// Name the table is referenced by in the statement.
    pub alias: String,
    pub columns: Vec<String>,
    /// Join that brings the table into the star, `None` for the fact table.
    pub join: Option<Join>,
    source: TableSource,
}

impl StarTable {
    fn is_aliased(&self) -> bool {
        self.alias != self.name || matches!(self.source, TableSource::Expression(_))
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Qualified column expression, `None` when the table has no such column.
    pub fn column(&self, column: &str) -> Option<Expr> {
        if !self.has_column(column) {
            return None;
        }
        Some(if self.is_aliased() {
            table_col(&self.alias, column)
        } else {
            qualified_col(self.schema.as_deref(), &self.name, column)
        })
    }

    pub fn from_item(&self) -> FromItem {
        match &self.source {
            TableSource::Expression(query) => FromItem::subquery(query.clone(), &self.alias),
            TableSource::Table => {
                let mut table = TableRef::new(&self.name);
                if let Some(schema) = &self.schema {
                    table = table.with_schema(schema);
                }
                if self.is_aliased() {
                    table = table.with_alias(&self.alias);
                }
                FromItem::table(table)
            }
        }
    }
}

/// Builder for [`StarSchema`].
#[derive(Debug)]
pub struct StarSchemaBuilder<'a> {
    label: String,
    fact: String,
    catalog: &'a PhysicalCatalog,
    schema: Option<String>,
    mappings: BTreeMap<String, ColumnReference>,
    joins: Vec<Join>,
    fact_key: Option<String>,
    table_expressions: BTreeMap<String, Query>,
}

impl<'a> StarSchemaBuilder<'a> {
    pub fn with_schema(mut self, schema: Option<&str>) -> Self {
        self.schema = schema.map(str::to_string);
        self
    }

    pub fn with_mappings(mut self, mappings: BTreeMap<String, ColumnReference>) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn with_joins(mut self, joins: Vec<Join>) -> Self {
        self.joins = joins;
        self
    }

    pub fn with_fact_key(mut self, fact_key: Option<&str>) -> Self {
        self.fact_key = fact_key.map(str::to_string);
        self
    }

    /// Use `query` wherever an unqualified table `name` is referenced.
    pub fn with_table_expression(mut self, name: &str, query: Query) -> Self {
        self.table_expressions.insert(name.into(), query);
        self
    }

    pub fn build(self) -> QueryResult<StarSchema> {
        let fact = self.physical_table(&self.fact, None, None)?;
        let fact_key_column = match &self.fact_key {
            Some(key) if fact.has_column(key) => key.clone(),
            Some(key) => {
                return Err(QueryError::model(format!(
                    "Fact key column '{}' not found in fact table '{}'",
                    key, self.fact
                )))
            }
            None if fact.has_column("id") => "id".to_string(),
            None => fact.columns.first().cloned().ok_or_else(|| {
                QueryError::model(format!("Fact table '{}' has no columns", self.fact))
            })?,
        };
        let fact_key_column = fact.column(&fact_key_column).ok_or_else(|| {
            QueryError::Internal(format!("Fact key column '{}' vanished", fact_key_column))
        })?;

        let mut tables = BTreeMap::new();
        tables.insert(fact.key.clone(), fact);

        for join in &self.joins {
            let Some(detail_table) = join.detail.table.as_deref() else {
                let master = (
                    join.master.schema.clone().or_else(|| self.schema.clone()),
                    join.master.table.clone().unwrap_or_else(|| self.fact.clone()),
                );
                return Err(QueryError::model(format!(
                    "No detail table specified for a join in schema '{}'. Master of the join is '{}'",
                    self.label,
                    format_key(&master)
                )));
            };

            let table = self.physical_table(
                detail_table,
                join.detail.schema.as_deref(),
                Some(join.clone()),
            )?;
            if tables.contains_key(&table.key) {
                return Err(QueryError::model(format!(
                    "Detail table '{}' joined twice in star schema {}. Join alias is required.",
                    format_key(&table.key),
                    self.label
                )));
            }
            tables.insert(table.key.clone(), table);
        }

        debug!(
            star = %self.label,
            fact = %self.fact,
            tables = tables.len(),
            "collected star tables"
        );

        Ok(StarSchema {
            label: self.label,
            schema: self.schema,
            fact_name: self.fact,
            mappings: self.mappings,
            tables,
            fact_key_column,
            columns: Mutex::new(HashMap::new()),
        })
    }

    /// Table expression named `name`, or the physical table from the catalog.
    fn physical_table(&self, name: &str, schema: Option<&str>, join: Option<Join>) -> QueryResult<StarTable> {
        let alias = join
            .as_ref()
            .and_then(|j| j.alias.clone())
            .unwrap_or_else(|| name.to_string());
        let schema = schema.map(str::to_string).or_else(|| self.schema.clone());
        let key = (schema.clone(), alias.clone());

        if join.as_ref().map_or(true, |j| j.detail.schema.is_none()) {
            if let Some(query) = self.table_expressions.get(name) {
                let columns = query
                    .select
                    .iter()
                    .filter_map(|s| {
                        s.alias
                            .clone()
                            .or_else(|| s.expr.column_name().map(str::to_string))
                    })
                    .collect();
                return Ok(StarTable {
                    key,
                    schema: None,
                    name: name.to_string(),
                    alias,
                    columns,
                    join,
                    source: TableSource::Expression(query.clone()),
                });
            }
        }

        let columns = self
            .catalog
            .columns(schema.as_deref(), name)
            .ok_or_else(|| QueryError::NoSuchTable(format_key(&(schema.clone(), name.to_string()))))?;
        Ok(StarTable {
            key,
            schema,
            name: name.to_string(),
            alias,
            columns: columns.to_vec(),
            join,
            source: TableSource::Table,
        })
    }
}

/// Resolves logical attributes to physical columns and builds the join
/// expression of the tables they live in.
///
/// A schema is built once per cube mapping and reused by every query.
#[derive(Debug)]
pub struct StarSchema {
    label: String,
    schema: Option<String>,
    fact_name: String,
    mappings: BTreeMap<String, ColumnReference>,
    tables: BTreeMap<TableKey, StarTable>,
    fact_key_column: Expr,
    columns: Mutex<HashMap<String, Expr>>,
}

impl StarSchema {
    pub fn builder<'a>(label: &str, fact: &str, catalog: &'a PhysicalCatalog) -> StarSchemaBuilder<'a> {
        StarSchemaBuilder {
            label: label.into(),
            fact: fact.into(),
            catalog,
            schema: None,
            mappings: BTreeMap::new(),
            joins: Vec::new(),
            fact_key: None,
            table_expressions: BTreeMap::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn fact_name(&self) -> &str {
        &self.fact_name
    }

    pub fn fact_key_column(&self) -> &Expr {
        &self.fact_key_column
    }

    pub fn mappings(&self) -> &BTreeMap<String, ColumnReference> {
        &self.mappings
    }

    fn fact_key(&self) -> TableKey {
        (self.schema.clone(), self.fact_name.clone())
    }

    fn master_key(&self, join: &Join) -> TableKey {
        (
            join.master.schema.clone().or_else(|| self.schema.clone()),
            join.master.table.clone().unwrap_or_else(|| self.fact_name.clone()),
        )
    }

    fn mapping_key(&self, mapping: &ColumnReference) -> TableKey {
        (
            mapping.schema.clone().or_else(|| self.schema.clone()),
            mapping.table.clone().unwrap_or_else(|| self.fact_name.clone()),
        )
    }

    /// Table registered under `key`. A missing schema is the default schema.
    pub fn table(&self, key: &TableKey) -> QueryResult<&StarTable> {
        let key = (key.0.clone().or_else(|| self.schema.clone()), key.1.clone());
        self.tables.get(&key).ok_or_else(|| {
            let schema = key.0.as_deref().map(|s| format!("\"{}\".", s)).unwrap_or_default();
            QueryError::Schema(format!(
                "Unknown star table {}\"{}\". Missing join?",
                schema, key.1
            ))
        })
    }

    fn mapping(&self, logical: &str) -> QueryResult<&ColumnReference> {
        self.mappings
            .get(logical)
            .ok_or_else(|| QueryError::NoSuchAttribute {
                name: logical.to_string(),
                available: self.mappings.keys().cloned().collect(),
            })
    }

    /// Physical column expression of the logical attribute `logical`.
    pub fn column(&self, logical: &str) -> QueryResult<Expr> {
        if logical == FACT_KEY_LABEL {
            return Ok(self.fact_key_column.clone());
        }
        let mut cache = self.columns.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(column) = cache.get(logical) {
            return Ok(column.clone());
        }

        let mapping = self.mapping(logical)?;
        let table = self.table(&self.mapping_key(mapping))?;
        let mut column = table.column(&mapping.column).ok_or_else(|| {
            QueryError::Schema(format!(
                "Unknown column '{}' in table '{}' possible: {}",
                mapping.column,
                table.alias,
                table.columns.join(", ")
            ))
        })?;
        if let Some(part) = &mapping.extract {
            column = extract(part, column);
        }
        if let Some(function) = &mapping.function {
            column = func(function, vec![column]);
        }

        cache.insert(logical.to_string(), column.clone());
        Ok(column)
    }

    /// Tables needed to select `attributes`, masters before their details,
    /// starting with the fact table.
    pub fn required_tables(&self, attributes: &[&str]) -> QueryResult<Vec<&StarTable>> {
        let fact_key = self.fact_key();
        let mut relevant: Vec<&StarTable> = Vec::new();
        for attribute in attributes {
            if *attribute == FACT_KEY_LABEL {
                relevant.push(self.table(&fact_key)?);
            } else {
                let mapping = self.mapping(attribute)?;
                relevant.push(self.table(&self.mapping_key(mapping))?);
            }
        }

        let mut required: BTreeMap<TableKey, &StarTable> = BTreeMap::new();
        while let Some(table) = relevant.pop() {
            if required.contains_key(&table.key) {
                continue;
            }
            required.insert(table.key.clone(), table);

            if let Some(join) = &table.join {
                let master_key = self.master_key(join);
                let master = self.tables.get(&master_key).ok_or_else(|| {
                    QueryError::model(format!(
                        "Master table '{}' of detail table '{}' is not joined to the star {}",
                        format_key(&master_key),
                        format_key(&table.key),
                        self.label
                    ))
                })?;
                relevant.push(master);
            }
        }

        let fact = self.table(&fact_key)?;
        required.remove(&fact.key);
        let mut placed: BTreeSet<TableKey> = BTreeSet::from([fact.key.clone()]);
        let mut sorted = vec![fact];

        loop {
            let details: Vec<TableKey> = required
                .values()
                .filter(|t| {
                    t.join
                        .as_ref()
                        .is_some_and(|j| placed.contains(&self.master_key(j)))
                })
                .map(|t| t.key.clone())
                .collect();
            if details.is_empty() {
                break;
            }
            for key in details {
                if let Some(table) = required.remove(&key) {
                    placed.insert(key);
                    sorted.push(table);
                }
            }
        }

        if !required.is_empty() {
            let keys: Vec<String> = required.keys().map(format_key).collect();
            return Err(QueryError::model(format!(
                "Some tables are not joined: {}",
                keys.join(", ")
            )));
        }

        Ok(sorted)
    }

    /// Join expression of every table needed to select `attributes`.
    ///
    /// | method   | join                          |
    /// |----------|-------------------------------|
    /// | `match`  | `star INNER JOIN detail`      |
    /// | `master` | `star LEFT OUTER JOIN detail` |
    /// | `detail` | `detail LEFT OUTER JOIN star` |
    pub fn get_star(&self, attributes: &[&str]) -> QueryResult<FromItem> {
        let tables = self.required_tables(attributes)?;
        let Some((fact, details)) = tables.split_first() else {
            return Err(QueryError::Internal("Empty star".into()));
        };

        let mut star = fact.from_item();
        for table in details {
            let Some(join) = &table.join else {
                return Err(QueryError::Internal(format!(
                    "Detail table '{}' has no join",
                    format_key(&table.key)
                )));
            };
            let master = self.table(&self.master_key(join))?;
            let on = self.join_condition(join, master, table)?;

            star = match join.method {
                JoinMethod::Match => star.join(table.from_item(), JoinType::Inner, on),
                JoinMethod::Master => star.join(table.from_item(), JoinType::LeftOuter, on),
                JoinMethod::Detail => table.from_item().join(star, JoinType::LeftOuter, on),
            };
        }

        debug!(
            star = %self.label,
            tables = tables.len(),
            "built star join"
        );
        Ok(star)
    }

    fn join_condition(&self, join: &Join, master: &StarTable, detail: &StarTable) -> QueryResult<Expr> {
        if join.master.columns.len() != join.detail.columns.len() {
            return Err(QueryError::model(format!(
                "Compound join key lengths differ: master {} has {} columns, detail {} has {}",
                join.master,
                join.master.columns.len(),
                join.detail,
                join.detail.columns.len()
            )));
        }

        let mut conditions = Vec::with_capacity(join.master.columns.len());
        for (master_column, detail_column) in join.master.columns.iter().zip(&join.detail.columns) {
            let left = master.column(master_column).ok_or_else(|| {
                QueryError::model(format!(
                    "Unable to find master key (star {}) \"{}\".\"{}\"",
                    self.label,
                    format_key(&master.key),
                    master_column
                ))
            })?;
            let right = detail.column(detail_column).ok_or_else(|| {
                QueryError::model(format!(
                    "Unable to find detail key (star {}) \"{}\".\"{}\"",
                    self.label,
                    format_key(&detail.key),
                    detail_column
                ))
            })?;
            conditions.push(left.eq(right));
        }

        and_all(conditions).ok_or_else(|| {
            QueryError::model(format!(
                "Join of detail table '{}' has no key columns",
                format_key(&detail.key)
            ))
        })
    }
}
