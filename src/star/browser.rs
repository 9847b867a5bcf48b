//! Aggregation browser.
//!
//! Compiles aggregation requests into statements over a star schema, runs
//! them on a [`Store`] and wraps the records into an
//! [`AggregationResult`]. One request costs up to three statements: the
//! summary, the drilldown and the total count of drilled cells.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::context::{hierarchies_for_cube, HierarchyKeys, QueryContext};
use super::mapping::{Mapper, FACT_KEY_LABEL};
use super::schema::StarSchema;
use crate::config::{QuerySettings, Settings};
use crate::error::{QueryError, QueryResult};
use crate::model::{Cube, LogicalAttribute, MeasureAggregate};
use crate::query::{
    calculators_for_aggregates, AggregationResult, Cell, Drilldown, DrilldownRequest, Record,
    WindowFunction, SPLIT_DIMENSION_NAME,
};
use crate::sql::{
    avg, coalesce, col, count, count_distinct, count_star, func, lit_int, max, min, sum, Expr,
    Dialect, FromItem, OrderByExpr, Query,
};
use crate::store::Store;

// =============================================================================
// Aggregate functions
// =============================================================================

/// Aggregate functions computed by the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Sum,
    CountNonempty,
    Count,
    CountDistinct,
    Min,
    Max,
    Avg,
    Stddev,
    Variance,
}

/// Names of the aggregate functions computed in SQL.
pub const AGGREGATE_FUNCTIONS: &[&str] = &[
    "sum",
    "count_nonempty",
    "count",
    "count_distinct",
    "min",
    "max",
    "avg",
    "stddev",
    "variance",
];

pub fn is_builtin_function(name: &str) -> bool {
    AggregateFunction::from_name(name).is_some()
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "sum" => Some(Self::Sum),
            "count_nonempty" => Some(Self::CountNonempty),
            "count" => Some(Self::Count),
            "count_distinct" => Some(Self::CountDistinct),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "avg" => Some(Self::Avg),
            "stddev" => Some(Self::Stddev),
            "variance" => Some(Self::Variance),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::CountNonempty => "count_nonempty",
            Self::Count => "count",
            Self::CountDistinct => "count_distinct",
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
            Self::Stddev => "stddev",
            Self::Variance => "variance",
        }
    }

    /// `count` counts records and does not need a measure.
    pub fn requires_measure(self) -> bool {
        self != Self::Count
    }

    /// Aggregate expression over `argument`.
    ///
    /// With `coalesce_values`, sums and non-empty counts of no records are 0, and
    /// the value functions treat NULL inputs as 0. A coalescing `count`
    /// counts fact keys.
    pub fn compile(
        self,
        aggregate: &str,
        argument: Option<Expr>,
        fact_key: Expr,
        coalesce_values: bool,
    ) -> QueryResult<Expr> {
        let measure = |argument: Option<Expr>| {
            argument.ok_or_else(|| {
                QueryError::model(format!(
                    "No measure specified for aggregate {}, required for aggregate function {}",
                    aggregate,
                    self.name()
                ))
            })
        };
        let or_zero = |expr: Expr| {
            if coalesce_values {
                coalesce(vec![expr, lit_int(0)])
            } else {
                expr
            }
        };

        Ok(match self {
            Self::Count if coalesce_values => count(fact_key),
            Self::Count => count(lit_int(1)),
            Self::Sum => or_zero(sum(measure(argument)?)),
            Self::CountNonempty => or_zero(count(measure(argument)?)),
            Self::CountDistinct => count_distinct(measure(argument)?),
            Self::Min => min(or_zero(measure(argument)?)),
            Self::Max => max(or_zero(measure(argument)?)),
            Self::Avg => avg(or_zero(measure(argument)?)),
            Self::Stddev => func("STDDEV", vec![or_zero(measure(argument)?)]),
            Self::Variance => func("VARIANCE", vec![or_zero(measure(argument)?)]),
        })
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Order direction of an explicitly ordered attribute.
fn order_column(column: Expr, direction: Option<&str>) -> QueryResult<OrderByExpr> {
    let Some(direction) = direction else {
        return Ok(OrderByExpr::new(column));
    };
    let lower = direction.to_lowercase();
    if lower.starts_with("asc") {
        Ok(OrderByExpr::asc(column))
    } else if lower.starts_with("desc") {
        Ok(OrderByExpr::desc(column))
    } else {
        Err(QueryError::argument(format!(
            "Unknown order direction '{}'",
            direction
        )))
    }
}

/// One aggregation query.
#[derive(Debug, Clone, Default)]
pub struct AggregateRequest {
    pub cell: Cell,
    /// Aggregate names, all aggregates of the cube when empty.
    pub aggregates: Vec<String>,
    pub drilldown: Vec<DrilldownRequest>,
    /// Cell that segments the drilled records into those within it and the
    /// rest.
    pub split: Option<Cell>,
    /// `(attribute or aggregate, direction)`.
    pub order: Vec<(String, Option<String>)>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl AggregateRequest {
    pub fn new(cell: Cell) -> Self {
        Self {
            cell,
            ..Default::default()
        }
    }

    pub fn with_aggregates(mut self, aggregates: &[&str]) -> Self {
        self.aggregates = aggregates.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_drilldown(mut self, request: DrilldownRequest) -> Self {
        self.drilldown.push(request);
        self
    }

    /// Add drilldown items in their string form, `dim@hier:level`.
    pub fn parse_drilldown(mut self, items: &[&str]) -> QueryResult<Self> {
        for item in items {
            self.drilldown.push(DrilldownRequest::parse(item)?);
        }
        Ok(self)
    }

    pub fn with_split(mut self, split: Cell) -> Self {
        self.split = Some(split);
        self
    }

    pub fn with_order(mut self, attribute: &str, direction: Option<&str>) -> Self {
        self.order
            .push((attribute.to_string(), direction.map(str::to_string)));
        self
    }

    pub fn with_page(mut self, page: u64, page_size: u64) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }
}

// =============================================================================
// Browser
// =============================================================================

/// Overrides of the query settings from the cube's `browser_options`.
fn apply_browser_options(settings: &QuerySettings, options: &Map<String, Value>) -> QuerySettings {
    let mut settings = settings.clone();
    let flag = |name: &str| options.get(name).and_then(Value::as_bool);
    if let Some(value) = flag("safe_labels") {
        settings.safe_labels = value;
    }
    if let Some(value) = flag("include_summary") {
        settings.include_summary = value;
    }
    if let Some(value) = flag("include_cell_count") {
        settings.include_cell_count = value;
    }
    if let Some(value) = flag("coalesce_measures") {
        settings.coalesce_measures = value;
    }
    settings
}

/// Aggregation browser of one cube.
pub struct Browser<'a> {
    cube: &'a Cube,
    star: StarSchema,
    hierarchies: HierarchyKeys,
    settings: QuerySettings,
    store: &'a dyn Store,
}

impl std::fmt::Debug for Browser<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("cube", &self.cube.name)
            .field("star", &self.star.label())
            .field("settings", &self.settings)
            .finish()
    }
}

impl<'a> Browser<'a> {
    /// Browser over the tables of `store`, mapped by the naming conventions
    /// of `settings`.
    pub fn new(cube: &'a Cube, store: &'a dyn Store, settings: &Settings) -> QueryResult<Self> {
        let catalog = store.catalog()?;
        let mapper = Mapper::new(cube, &settings.schema);
        let fact = mapper.fact_name();
        let fact_key = cube.key.clone().or_else(|| {
            catalog
                .columns(mapper.schema(), &fact)
                .filter(|columns| columns.contains(&settings.schema.fact_key))
                .map(|_| settings.schema.fact_key.clone())
        });

        let star = StarSchema::builder(&cube.name, &fact, &catalog)
            .with_schema(mapper.schema())
            .with_mappings(mapper.mappings())
            .with_joins(cube.joins.clone())
            .with_fact_key(fact_key.as_deref())
            .build()?;
        Ok(Self::with_star(cube, star, store, &settings.query))
    }

    pub fn with_star(
        cube: &'a Cube,
        star: StarSchema,
        store: &'a dyn Store,
        settings: &QuerySettings,
    ) -> Self {
        Self {
            cube,
            hierarchies: hierarchies_for_cube(cube),
            settings: apply_browser_options(settings, &cube.browser_options),
            star,
            store,
        }
    }

    pub fn cube(&self) -> &Cube {
        self.cube
    }

    pub fn star_schema(&self) -> &StarSchema {
        &self.star
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Aggregates by name, all aggregates of the cube for an empty list.
    /// Window function aggregates bring the aggregate they are computed
    /// from.
    pub fn prepare_aggregates(&self, names: &[&str]) -> QueryResult<Vec<&'a MeasureAggregate>> {
        let mut prepared = self.cube.get_aggregates(names)?;
        let mut seen: HashSet<String> = prepared.iter().map(|a| a.name.clone()).collect();

        let mut sources = Vec::new();
        for aggregate in &prepared {
            let Some(measure) = aggregate.measure.as_deref() else {
                continue;
            };
            if aggregate.is_post_aggregate() && seen.insert(measure.to_string()) {
                sources.push(self.cube.aggregate(measure)?);
            }
        }
        prepared.extend(sources);
        Ok(prepared)
    }

    /// Explicit order with window function aggregates replaced by the
    /// aggregate they are computed from.
    fn prepare_order(
        &self,
        order: &[(String, Option<String>)],
    ) -> QueryResult<Vec<(String, Option<String>)>> {
        let mut prepared = Vec::with_capacity(order.len());
        for (name, direction) in order {
            let name = match self.cube.aggregate(name) {
                Ok(aggregate) if aggregate.is_post_aggregate() => {
                    aggregate.measure.clone().unwrap_or_else(|| name.clone())
                }
                Ok(_) => name.clone(),
                Err(_) => self.cube.attribute(name)?.reference().to_string(),
            };
            prepared.push((name, direction.clone()));
        }
        Ok(prepared)
    }

    /// Fail when the drilldown goes through high cardinality levels that
    /// the cell does not pin.
    pub fn assert_low_cardinality(&self, cell: &Cell, drilldown: &Drilldown) -> QueryResult<()> {
        let levels = drilldown.high_cardinality_levels(self.cube, cell)?;
        if levels.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = levels.iter().map(|l| l.name.as_str()).collect();
        Err(QueryError::argument(format!(
            "Can not drilldown on high-cardinality levels({}) without including both \
             page_size and page arguments, or else a point/set cut on the level",
            names.join(", ")
        )))
    }

    /// Attribute references `aggregate` is computed from.
    fn aggregate_dependencies(
        &self,
        aggregate: &MeasureAggregate,
        refs: &mut Vec<String>,
        visiting: &mut Vec<String>,
    ) -> QueryResult<()> {
        if visiting.contains(&aggregate.name) {
            return Err(QueryError::model(format!(
                "Circular aggregate reference (remaining: {})",
                visiting.join(", ")
            )));
        }
        visiting.push(aggregate.name.clone());

        match (aggregate.function.as_deref(), aggregate.expression()) {
            (None, Some(expression)) => {
                for variable in expression.variables() {
                    match self.cube.aggregate(&variable) {
                        Ok(other) if other.name != aggregate.name => {
                            self.aggregate_dependencies(other, refs, visiting)?
                        }
                        _ => refs.push(variable),
                    }
                }
            }
            (Some(_), Some(expression)) => refs.extend(expression.variables()),
            (Some(_), None) => refs.extend(aggregate.measure.iter().cloned()),
            (None, None) => refs.push(
                aggregate
                    .measure
                    .clone()
                    .unwrap_or_else(|| aggregate.name.clone()),
            ),
        }

        visiting.pop();
        Ok(())
    }

    fn compile_aggregate(
        &self,
        aggregate: &MeasureAggregate,
        context: &QueryContext<'_>,
        compiled: &mut HashMap<String, Expr>,
        visiting: &mut Vec<String>,
    ) -> QueryResult<Expr> {
        if let Some(expr) = compiled.get(&aggregate.name) {
            return Ok(expr.clone());
        }
        if visiting.contains(&aggregate.name) {
            return Err(QueryError::model(format!(
                "Circular aggregate reference (remaining: {})",
                visiting.join(", ")
            )));
        }
        visiting.push(aggregate.name.clone());

        let expr = match (aggregate.function.as_deref(), aggregate.expression()) {
            (Some(name), expression) => {
                let function = AggregateFunction::from_name(name).ok_or_else(|| {
                    QueryError::argument(format!(
                        "Unknown aggregate function '{}' of aggregate '{}'",
                        name, aggregate.name
                    ))
                })?;
                let argument = match (expression, aggregate.measure.as_deref()) {
                    (Some(expression), _) => {
                        Some(expression.compile(&mut |variable: &str| context.column(variable))?)
                    }
                    (None, Some(measure)) => Some(context.column(measure)?),
                    (None, None) => None,
                };
                function.compile(
                    &aggregate.name,
                    argument,
                    context.column(FACT_KEY_LABEL)?,
                    self.settings.coalesce_measures,
                )?
            }
            (None, Some(expression)) => expression.compile(&mut |variable: &str| {
                match self.cube.aggregate(variable) {
                    Ok(other) if other.name != aggregate.name => {
                        self.compile_aggregate(other, context, compiled, visiting)
                    }
                    _ => context.column(variable),
                }
            })?,
            (None, None) => {
                context.column(aggregate.measure.as_deref().unwrap_or(&aggregate.name))?
            }
        };

        visiting.pop();
        compiled.insert(aggregate.name.clone(), expr.clone());
        Ok(expr)
    }

    /// Statement aggregating `cell`, and the attribute reference of every
    /// selected column.
    ///
    /// Selects the drilldown attributes, the split flag and the aggregates,
    /// grouped by everything but the aggregates. With `for_summary` only the
    /// aggregates are selected; the drilldown then only decides the joined
    /// tables. Window function aggregates are left to the calculators.
    pub fn aggregation_statement(
        &self,
        cell: &Cell,
        aggregates: &[&MeasureAggregate],
        drilldown: &Drilldown,
        split: Option<&Cell>,
        for_summary: bool,
    ) -> QueryResult<(Query, Vec<String>)> {
        let aggregates: Vec<&MeasureAggregate> = aggregates
            .iter()
            .copied()
            .filter(|a| !a.is_post_aggregate())
            .collect();
        if aggregates.is_empty() {
            return Err(QueryError::argument("List of aggregates should not be empty"));
        }
        debug!(
            cell = %cell,
            drilldown = %drilldown,
            for_summary,
            "preparing aggregation statement"
        );

        let mut refs: Vec<String> = Vec::new();
        for aggregate in &aggregates {
            self.aggregate_dependencies(aggregate, &mut refs, &mut Vec::new())?;
        }
        let mut keys = cell.collect_key_attributes(self.cube)?;
        keys.extend(drilldown.all_attributes());
        if let Some(split) = split {
            keys.extend(split.collect_key_attributes(self.cube)?);
        }
        refs.extend(keys.iter().map(|a| a.reference.clone()));

        let mut seen = HashSet::new();
        refs.retain(|r| seen.insert(r.clone()));
        let refs: Vec<&str> = refs.iter().map(String::as_str).collect();
        let attributes = self.cube.collect_dependencies(&refs)?;

        let mut context = QueryContext::new(
            &self.star,
            &attributes,
            self.hierarchies.clone(),
            self.settings.safe_labels,
        )?;

        let mut compiled = HashMap::new();
        for aggregate in &aggregates {
            self.compile_aggregate(aggregate, &context, &mut compiled, &mut Vec::new())?;
        }
        for aggregate in &aggregates {
            if let Some(expr) = compiled.remove(&aggregate.name) {
                context.set_column(&aggregate.name, expr);
            }
        }

        let drilled: Vec<String> = drilldown
            .all_attributes()
            .iter()
            .map(|a| a.reference.clone())
            .collect();
        let drilled: Vec<&str> = drilled.iter().map(String::as_str).collect();
        let mut selection = context.select_columns(&drilled)?;
        if let Some(split) = split {
            selection.push(context.column_for_split(split)?);
        }

        let condition = context.condition_for_cell(cell)?;
        let group_by: Vec<Expr> = if for_summary {
            Vec::new()
        } else {
            selection.iter().map(|s| s.expr.clone()).collect()
        };

        let names: Vec<&str> = aggregates.iter().map(|a| a.name.as_str()).collect();
        let aggregate_columns = context.select_columns(&names)?;
        if for_summary {
            selection = aggregate_columns;
        } else {
            selection.extend(aggregate_columns);
        }

        let column_labels: Vec<String> = selection
            .iter()
            .map(|s| s.alias.clone().unwrap_or_default())
            .collect();
        let labels = context.get_labels(&column_labels);

        let mut query = Query::new().select(selection).from(context.star().clone());
        if let Some(condition) = condition {
            query = query.filter(condition);
        }
        if !group_by.is_empty() {
            query = query.group_by(group_by);
        }
        Ok((query, labels))
    }

    /// Order `query`: the split flag first, then the explicit order, then
    /// the natural order of the selected levels not ordered yet.
    fn order_query(
        &self,
        query: Query,
        labels: &[String],
        order: &[(String, Option<String>)],
        natural_order: &[(String, String)],
    ) -> QueryResult<Query> {
        let columns: Vec<(&str, &str)> = labels
            .iter()
            .zip(&query.select)
            .map(|(label, select)| {
                (
                    label.as_str(),
                    select.alias.as_deref().unwrap_or(label.as_str()),
                )
            })
            .collect();
        let column_of = |name: &str| {
            columns
                .iter()
                .find(|(label, _)| *label == name)
                .map(|(_, alias)| col(alias))
        };

        let mut ordered: Vec<String> = Vec::new();
        let mut order_by: Vec<OrderByExpr> = Vec::new();

        if let Some(split) = column_of(SPLIT_DIMENSION_NAME) {
            order_by.push(OrderByExpr::new(split));
            ordered.push(SPLIT_DIMENSION_NAME.to_string());
        }

        for (name, direction) in order {
            if ordered.contains(name) {
                continue;
            }
            let column = column_of(name).ok_or_else(|| {
                QueryError::argument(format!(
                    "Can not order by '{}': it is not selected by the query",
                    name
                ))
            })?;
            order_by.push(order_column(column, direction.as_deref())?);
            ordered.push(name.clone());
        }

        for (name, _) in &columns {
            if ordered.iter().any(|o| o == name) {
                continue;
            }
            let Some((_, direction)) = natural_order.iter().find(|(n, _)| n == name) else {
                continue;
            };
            if let Some(column) = column_of(name) {
                order_by.push(order_column(column, Some(direction))?);
                ordered.push(name.to_string());
            }
        }

        if order_by.is_empty() {
            return Ok(query);
        }
        Ok(query.order_by(order_by))
    }

    /// Run `query` and key the values of every row by `labels`.
    fn execute(&self, query: &Query, labels: &[String], purpose: &str) -> QueryResult<Vec<Record>> {
        let sql = query.to_sql(self.store.dialect());
        debug!(cube = %self.cube.name, purpose, sql = %sql, "executing aggregation statement");
        let rows = self.store.fetch(&sql)?;
        Ok(rows.into_records(labels.to_vec()).collect())
    }

    /// Like [`Browser::execute`], but the records are labeled as they are
    /// pulled.
    fn execute_lazy(
        &self,
        query: &Query,
        labels: &[String],
        purpose: &str,
    ) -> QueryResult<impl Iterator<Item = Record> + 'static> {
        let sql = query.to_sql(self.store.dialect());
        debug!(cube = %self.cube.name, purpose, sql = %sql, "executing aggregation statement");
        let rows = self.store.fetch(&sql)?;
        Ok(rows.into_records(labels.to_vec()))
    }

    /// Display labels of the aggregates and drilled attributes.
    fn display_labels(
        &self,
        aggregates: &[&MeasureAggregate],
        drilldown: &Drilldown,
    ) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        for aggregate in aggregates {
            let label = match (&aggregate.label, aggregate.function.as_deref()) {
                (Some(label), _) => label.clone(),
                (None, Some(function)) => match WindowFunction::from_name(function) {
                    Some(window) => {
                        window.label(aggregate.measure.as_deref().unwrap_or(&aggregate.name))
                    }
                    None => aggregate.name.clone(),
                },
                (None, None) => aggregate.name.clone(),
            };
            labels.insert(aggregate.name.clone(), label);
        }
        for attribute in drilldown.all_attributes() {
            labels.insert(
                attribute.reference.clone(),
                attribute.label.clone().unwrap_or_else(|| attribute.name.clone()),
            );
        }
        labels
    }

    /// Resolve the request and compile its statements.
    fn prepare(&self, request: &AggregateRequest) -> QueryResult<PreparedAggregate<'a>> {
        let names: Vec<&str> = request.aggregates.iter().map(String::as_str).collect();
        let aggregates = self.prepare_aggregates(&names)?;
        let cell = &request.cell;
        let drilldown = Drilldown::new(self.cube, &request.drilldown, cell)?;
        let split = request.split.as_ref();
        let is_drilled = !drilldown.is_empty() || split.is_some();

        let mut summary = None;
        if self.settings.include_summary || !is_drilled {
            summary = Some(self.aggregation_statement(cell, &aggregates, &drilldown, None, true)?);
        }

        let mut cells = None;
        let mut cell_count = None;
        if is_drilled {
            if request.page.is_none() || request.page_size.is_none() {
                self.assert_low_cardinality(cell, &drilldown)?;
            }

            let (statement, labels) =
                self.aggregation_statement(cell, &aggregates, &drilldown, split, false)?;
            if self.settings.include_cell_count {
                cell_count = Some(count_query(&statement));
            }

            let order = self.prepare_order(&request.order)?;
            let mut statement =
                self.order_query(statement, &labels, &order, &drilldown.natural_order())?;
            if let (Some(page), Some(page_size)) = (request.page, request.page_size) {
                let offset = page.checked_mul(page_size).ok_or_else(|| {
                    QueryError::argument(format!(
                        "Page {} of size {} is out of range",
                        page, page_size
                    ))
                })?;
                statement = statement.offset(offset).limit(page_size);
            }
            cells = Some((statement, labels));
        }

        Ok(PreparedAggregate {
            aggregates,
            drilldown,
            is_drilled,
            summary,
            cells,
            cell_count,
        })
    }

    /// Statements `request` would run, rendered for the configured query
    /// dialect.
    pub fn explain(&self, request: &AggregateRequest) -> QueryResult<AggregateStatements> {
        self.explain_in(request, self.settings.dialect)
    }

    /// Statements `request` would run, rendered for `dialect`.
    pub fn explain_in(
        &self,
        request: &AggregateRequest,
        dialect: Dialect,
    ) -> QueryResult<AggregateStatements> {
        let prepared = self.prepare(request)?;
        Ok(AggregateStatements {
            dialect,
            summary: prepared.summary.map(|(query, _)| query.to_sql(dialect)),
            cells: prepared.cells.map(|(query, _)| query.to_sql(dialect)),
            cell_count: prepared.cell_count.map(|query| query.to_sql(dialect)),
        })
    }

    /// Aggregate the request's cell, drilled down and split as requested.
    pub fn aggregate(&self, request: &AggregateRequest) -> QueryResult<AggregationResult> {
        let has_split = request.split.is_some();
        info!(
            cube = %self.cube.name,
            cell = %request.cell,
            split = has_split,
            "aggregate"
        );
        let prepared = self.prepare(request)?;
        debug!(drilldown = %prepared.drilldown, "resolved drilldown");

        let mut summary = None;
        if let Some((statement, labels)) = &prepared.summary {
            summary = self
                .execute(statement, labels, "aggregation summary")?
                .into_iter()
                .next();
        }

        let mut total_cell_count = None;
        if let Some(statement) = &prepared.cell_count {
            let records = self.execute(statement, &["count".to_string()], "total cell count")?;
            total_cell_count = records
                .first()
                .and_then(|r| r.get("count"))
                .and_then(Value::as_u64);
        }

        let mut cells = None;
        if let Some((statement, labels)) = &prepared.cells {
            cells = Some(self.execute_lazy(statement, labels, "aggregation drilldown")?);
        }

        let PreparedAggregate {
            aggregates,
            drilldown,
            is_drilled,
            ..
        } = prepared;
        let post_aggregates: Vec<&MeasureAggregate> = aggregates
            .iter()
            .copied()
            .filter(|a| a.is_post_aggregate())
            .collect();
        let calculators =
            calculators_for_aggregates(self.cube, &post_aggregates, &drilldown, has_split)?;

        let labels = self.display_labels(&aggregates, &drilldown);
        let mut result = AggregationResult::new(
            request.cell.clone(),
            aggregates.iter().map(|a| a.name.clone()).collect(),
            is_drilled.then_some(drilldown),
            has_split,
        );
        if let Some(summary) = summary {
            result.set_summary(summary, &calculators);
        }
        result.total_cell_count = total_cell_count;
        result.labels = labels;
        result.set_cells(cells.into_iter().flatten(), calculators);
        Ok(result)
    }
}

/// Resolved request with its compiled, not yet rendered, statements.
struct PreparedAggregate<'a> {
    aggregates: Vec<&'a MeasureAggregate>,
    drilldown: Drilldown,
    is_drilled: bool,
    summary: Option<(Query, Vec<String>)>,
    cells: Option<(Query, Vec<String>)>,
    cell_count: Option<Query>,
}

/// Rendered statements of one aggregation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStatements {
    pub dialect: Dialect,
    pub summary: Option<String>,
    pub cells: Option<String>,
    pub cell_count: Option<String>,
}

fn count_query(query: &Query) -> Query {
    Query::new()
        .select(vec![count_star()])
        .from(FromItem::subquery(query.clone(), "subquery"))
}
