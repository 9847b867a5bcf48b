//! Per-query compilation context: labelled columns of the requested
//! attributes and WHERE conditions of cells.

use std::collections::HashMap;

use tracing::trace;

use super::mapping::FACT_KEY_LABEL;
use super::schema::StarSchema;
use crate::error::{QueryError, QueryResult};
use crate::model::{Cube, LogicalAttribute};
use crate::query::{Cell, Cut, CutKind, SPLIT_DIMENSION_NAME};
use crate::sql::{and_all, case_when, lit_bool, lit_str, or_all, Expr, ExprExt, FromItem, SelectExpr};

/// Level key references per `(dimension, hierarchy)`. `None` stands for the
/// default hierarchy.
pub type HierarchyKeys = HashMap<(String, Option<String>), Vec<String>>;

/// Level keys of every hierarchy of `cube`, including the default hierarchy
/// of each dimension under `None`.
pub fn hierarchies_for_cube(cube: &Cube) -> HierarchyKeys {
    let mut keys = HierarchyKeys::new();
    for dimension in &cube.dimensions {
        for hierarchy in &dimension.hierarchies {
            let refs: Vec<String> = hierarchy
                .keys(None)
                .iter()
                .map(|a| a.reference.clone())
                .collect();
            if hierarchy.name == dimension.default_hierarchy_name() {
                keys.insert((dimension.name.clone(), None), refs.clone());
            }
            keys.insert((dimension.name.clone(), Some(hierarchy.name.clone())), refs);
        }
    }
    keys
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Lower,
    Upper,
}

/// Columns and conditions of one query.
///
/// Base attributes are served by the star schema, derived attributes are
/// compiled over the columns of the attributes they depend on. Build one
/// context per query.
#[derive(Debug)]
pub struct QueryContext<'s> {
    star_schema: &'s StarSchema,
    star: FromItem,
    columns: HashMap<String, Expr>,
    /// Reference to column label.
    labels: HashMap<String, String>,
    /// Column label to reference.
    label_attributes: HashMap<String, String>,
    hierarchies: HierarchyKeys,
    safe_labels: bool,
}

impl<'s> QueryContext<'s> {
    /// `attributes` must be ordered so that derived attributes follow the
    /// attributes they are computed from.
    ///
    /// With `safe_labels` columns are labelled `a0`, `a1`, ... for databases
    /// that do not accept dots in labels.
    pub fn new(
        star_schema: &'s StarSchema,
        attributes: &[&dyn LogicalAttribute],
        hierarchies: HierarchyKeys,
        safe_labels: bool,
    ) -> QueryResult<Self> {
        let base_names: Vec<&str> = attributes
            .iter()
            .filter(|a| a.is_base())
            .map(|a| a.reference())
            .collect();
        let star = star_schema.get_star(&base_names)?;

        let mut order: Vec<String> = Vec::with_capacity(attributes.len() + 1);
        let mut columns: HashMap<String, Expr> = HashMap::new();
        for name in &base_names {
            columns.insert(name.to_string(), star_schema.column(name)?);
            order.push(name.to_string());
        }
        columns.insert(FACT_KEY_LABEL.to_string(), star_schema.fact_key_column().clone());
        order.push(FACT_KEY_LABEL.to_string());

        for attribute in attributes.iter().filter(|a| !a.is_base()) {
            let Some(expression) = attribute.expression() else {
                continue;
            };
            let compiled = expression.compile(&mut |name: &str| {
                columns.get(name).cloned().ok_or_else(|| {
                    QueryError::Internal(format!(
                        "Attribute '{}' depends on '{}' which is not compiled yet",
                        attribute.reference(),
                        name
                    ))
                })
            })?;
            columns.insert(attribute.reference().to_string(), compiled);
            order.push(attribute.reference().to_string());
        }

        let mut labels = HashMap::new();
        let mut label_attributes = HashMap::new();
        for (i, reference) in order.into_iter().enumerate() {
            let label = if safe_labels {
                format!("a{}", i)
            } else {
                reference.clone()
            };
            label_attributes.insert(label.clone(), reference.clone());
            labels.insert(reference, label);
        }

        trace!(
            star = %star_schema.label(),
            columns = columns.len(),
            safe_labels,
            "prepared query context"
        );

        Ok(Self {
            star_schema,
            star,
            columns,
            labels,
            label_attributes,
            hierarchies,
            safe_labels,
        })
    }

    pub fn star_schema(&self) -> &StarSchema {
        self.star_schema
    }

    /// Join expression of the tables of the base attributes.
    pub fn star(&self) -> &FromItem {
        &self.star
    }

    /// Column expression of the attribute `reference`.
    pub fn column(&self, reference: &str) -> QueryResult<Expr> {
        self.columns.get(reference).cloned().ok_or_else(|| {
            QueryError::Internal(format!(
                "Missing column '{}'. Query context not properly initialized or \
                 dependencies were not correctly ordered?",
                reference
            ))
        })
    }

    /// Column label of the attribute `reference`.
    pub fn label(&self, reference: &str) -> QueryResult<&str> {
        self.labels
            .get(reference)
            .map(String::as_str)
            .ok_or_else(|| QueryError::Internal(format!("Missing column '{}'", reference)))
    }

    pub fn has_column(&self, reference: &str) -> bool {
        self.columns.contains_key(reference)
    }

    /// Register a column compiled outside of the context, such as an
    /// aggregate. A column of the same reference is replaced and keeps its
    /// label.
    pub fn set_column(&mut self, reference: &str, column: Expr) {
        if self.columns.insert(reference.to_string(), column).is_some() {
            return;
        }
        let label = if self.safe_labels {
            format!("a{}", self.labels.len())
        } else {
            reference.to_string()
        };
        self.label_attributes.insert(label.clone(), reference.to_string());
        self.labels.insert(reference.to_string(), label);
    }

    pub fn select_column(&self, reference: &str) -> QueryResult<SelectExpr> {
        Ok(self.column(reference)?.alias(self.label(reference)?))
    }

    pub fn select_columns(&self, references: &[&str]) -> QueryResult<Vec<SelectExpr>> {
        references.iter().map(|r| self.select_column(r)).collect()
    }

    /// Attribute references of result column labels.
    pub fn get_labels(&self, labels: &[String]) -> Vec<String> {
        if !self.safe_labels {
            return labels.to_vec();
        }
        labels
            .iter()
            .map(|label| {
                self.label_attributes
                    .get(label)
                    .cloned()
                    .unwrap_or_else(|| label.clone())
            })
            .collect()
    }

    /// Condition of all cuts of `cell`, `None` for an empty cell.
    pub fn condition_for_cell(&self, cell: &Cell) -> QueryResult<Option<Expr>> {
        Ok(and_all(self.conditions_for_cuts(&cell.cuts)?))
    }

    pub fn conditions_for_cuts(&self, cuts: &[Cut]) -> QueryResult<Vec<Expr>> {
        cuts.iter().map(|cut| self.condition_for_cut(cut)).collect()
    }

    fn condition_for_cut(&self, cut: &Cut) -> QueryResult<Expr> {
        let hierarchy = cut.hierarchy.as_deref();
        match &cut.kind {
            CutKind::Point { path } => {
                self.condition_for_point(&cut.dimension, path, hierarchy, cut.invert)
            }
            CutKind::Set { paths } => {
                let conditions = paths
                    .iter()
                    .map(|path| self.condition_for_point(&cut.dimension, path, hierarchy, false))
                    .collect::<QueryResult<Vec<_>>>()?;
                let condition = or_all(conditions).unwrap_or_else(|| lit_bool(false));
                Ok(if cut.invert { condition.not() } else { condition })
            }
            CutKind::Range { from, to } => self.range_condition(
                &cut.dimension,
                hierarchy,
                from.as_deref(),
                to.as_deref(),
                cut.invert,
            ),
        }
    }

    /// `level_key = value` for every level of `path`. A `None` member
    /// matches NULL.
    pub fn condition_for_point(
        &self,
        dimension: &str,
        path: &[Option<String>],
        hierarchy: Option<&str>,
        invert: bool,
    ) -> QueryResult<Expr> {
        let keys = self.level_keys(dimension, hierarchy, path)?;
        let conditions = keys
            .iter()
            .zip(path)
            .map(|(key, value)| Ok(member_condition(self.column(key)?, value)))
            .collect::<QueryResult<Vec<_>>>()?;
        let condition = and_all(conditions).unwrap_or_else(|| lit_bool(true));
        Ok(if invert { condition.not() } else { condition })
    }

    /// Condition of the hierarchical range `from`..=`to`. At least one bound
    /// is required.
    pub fn range_condition(
        &self,
        dimension: &str,
        hierarchy: Option<&str>,
        from: Option<&[Option<String>]>,
        to: Option<&[Option<String>]>,
        invert: bool,
    ) -> QueryResult<Expr> {
        let lower = match from {
            Some(path) => self.boundary_condition(dimension, hierarchy, path, Bound::Lower, true)?,
            None => None,
        };
        let upper = match to {
            Some(path) => self.boundary_condition(dimension, hierarchy, path, Bound::Upper, true)?,
            None => None,
        };
        let condition = and_all(lower.into_iter().chain(upper)).ok_or_else(|| {
            QueryError::argument(format!(
                "Range cut of dimension '{}' needs at least one bound",
                dimension
            ))
        })?;
        Ok(if invert { condition.not() } else { condition })
    }

    /// Lexicographic bound over a hierarchical path: the prefix pins all but
    /// the last level, the last level is compared, and a shorter prefix
    /// compared strictly is ORed in.
    fn boundary_condition(
        &self,
        dimension: &str,
        hierarchy: Option<&str>,
        path: &[Option<String>],
        bound: Bound,
        first: bool,
    ) -> QueryResult<Option<Expr>> {
        let Some((last_value, prefix)) = path.split_last() else {
            return Ok(None);
        };
        let shorter = self.boundary_condition(dimension, hierarchy, prefix, bound, false)?;

        let keys = self.level_keys(dimension, hierarchy, path)?;
        let mut conditions = Vec::with_capacity(path.len());
        for (key, value) in keys.iter().zip(prefix) {
            conditions.push(member_condition(self.column(key)?, value));
        }

        let last_key = keys.last().ok_or_else(|| {
            QueryError::Internal(format!("No level keys for dimension '{}'", dimension))
        })?;
        let column = self.column(last_key)?;
        let value = match last_value {
            Some(value) => lit_str(value),
            None => {
                return Err(QueryError::argument(format!(
                    "Range bound of dimension '{}' can not end with a null member",
                    dimension
                )))
            }
        };
        conditions.push(match (bound, first) {
            (Bound::Upper, true) => column.lte(value),
            (Bound::Upper, false) => column.lt(value),
            (Bound::Lower, true) => column.gte(value),
            (Bound::Lower, false) => column.gt(value),
        });

        let Some(condition) = and_all(conditions) else {
            return Ok(None);
        };
        Ok(Some(match shorter {
            Some(shorter) => condition.or(shorter),
            None => condition,
        }))
    }

    /// Level key references for the levels of `path`.
    pub fn level_keys(
        &self,
        dimension: &str,
        hierarchy: Option<&str>,
        path: &[Option<String>],
    ) -> QueryResult<&[String]> {
        let key = (dimension.to_string(), hierarchy.map(str::to_string));
        let levels = match self.hierarchies.get(&key) {
            Some(levels) => levels,
            None if !self.hierarchies.keys().any(|(dim, _)| dim == dimension) => {
                return Err(QueryError::not_found("dimension", dimension));
            }
            None => {
                return Err(QueryError::not_found(
                    "hierarchy",
                    format!("{}@{}", dimension, hierarchy.unwrap_or("default")),
                ));
            }
        };
        if path.len() > levels.len() {
            return Err(QueryError::hierarchy(format!(
                "Path '{}' is longer than hierarchy. Levels: {}",
                crate::query::string_from_path(path),
                levels.join(", ")
            )));
        }
        Ok(&levels[..path.len()])
    }

    /// Boolean column that tells whether a record lies within `split`.
    pub fn column_for_split(&self, split: &Cell) -> QueryResult<SelectExpr> {
        let condition = self.condition_for_cell(split)?.ok_or_else(|| {
            QueryError::argument("Split cell should have at least one cut")
        })?;
        Ok(case_when(condition, lit_bool(true), lit_bool(false)).alias(SPLIT_DIMENSION_NAME))
    }
}

fn member_condition(column: Expr, value: &Option<String>) -> Expr {
    match value {
        Some(value) => column.eq(lit_str(value)),
        None => column.is_null(),
    }
}
