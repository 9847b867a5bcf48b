//! Attribute descriptors: dimension attributes, measures and aggregates.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::expression::AttributeExpr;
use crate::error::{QueryError, QueryResult};

/// Anything that can be selected by a logical reference.
///
/// Base attributes map one-to-one to a physical column. Derived attributes
/// carry an expression over other attributes.
pub trait LogicalAttribute: std::fmt::Debug {
    fn name(&self) -> &str;

    /// Canonical logical reference, such as `date.year`.
    fn reference(&self) -> &str;

    fn expression(&self) -> Option<&AttributeExpr>;

    fn is_base(&self) -> bool {
        self.expression().is_none()
    }

    /// References this attribute is computed from.
    fn dependencies(&self) -> BTreeSet<String> {
        self.expression()
            .map(AttributeExpr::variables)
            .unwrap_or_default()
    }
}

fn parse_expression(text: &Option<String>) -> QueryResult<Option<AttributeExpr>> {
    text.as_deref().map(AttributeExpr::parse).transpose()
}

// =============================================================================
// Dimension attribute
// =============================================================================

/// Attribute of a dimension level, or a fact detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "AttributeSpec")]
pub struct Attribute {
    pub name: String,
    pub label: Option<String>,
    /// Natural order direction, `asc` or `desc`.
    pub order: Option<String>,
    pub expression: Option<String>,
    #[serde(skip)]
    pub reference: String,
    /// Owning dimension, empty for details.
    #[serde(skip)]
    pub dimension: Option<String>,
    #[serde(skip)]
    parsed: Option<AttributeExpr>,
}

/// Attributes are written either as a bare name or as a table.
#[derive(Deserialize)]
#[serde(untagged)]
enum AttributeSpec {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        order: Option<String>,
        #[serde(default)]
        expression: Option<String>,
    },
}

impl From<AttributeSpec> for Attribute {
    fn from(spec: AttributeSpec) -> Self {
        match spec {
            AttributeSpec::Name(name) => Attribute::new(&name),
            AttributeSpec::Full {
                name,
                label,
                order,
                expression,
            } => Attribute {
                reference: name.clone(),
                name,
                label,
                order,
                expression,
                ..Default::default()
            },
        }
    }
}

impl Attribute {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            reference: name.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_order(mut self, order: &str) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn with_expression(mut self, expression: &str) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// Bind the attribute to its dimension and parse the expression.
    ///
    /// `flat` marks the only attribute of a single-level dimension that
    /// carries the dimension name; it is referenced by the dimension name.
    pub(crate) fn link(&mut self, dimension: Option<&str>, flat: bool) -> QueryResult<()> {
        self.reference = match dimension {
            Some(dim) if flat && dim == self.name => dim.to_string(),
            Some(dim) => format!("{}.{}", dim, self.name),
            None => self.name.clone(),
        };
        self.dimension = dimension.map(str::to_string);
        self.parsed = parse_expression(&self.expression)?;
        Ok(())
    }
}

impl LogicalAttribute for Attribute {
    fn name(&self) -> &str {
        &self.name
    }

    fn reference(&self) -> &str {
        &self.reference
    }

    fn expression(&self) -> Option<&AttributeExpr> {
        self.parsed.as_ref()
    }
}

// =============================================================================
// Measures
// =============================================================================

/// Aggregate names that are computed after the query, over result rows.
pub const WINDOW_FUNCTIONS: &[&str] = &["wma", "sma", "sms", "smstd", "smrsd", "smvar"];

pub fn is_window_function(function: &str) -> bool {
    WINDOW_FUNCTIONS.contains(&function.to_lowercase().as_str())
}

/// A numeric fact column (or expression) that can be aggregated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Measure {
    pub name: String,
    pub label: Option<String>,
    pub order: Option<String>,
    pub expression: Option<String>,
    /// Aggregate functions to derive default aggregates from. `identity`
    /// selects the measure as it is.
    pub aggregates: Vec<String>,
    pub window_size: Option<usize>,
    #[serde(skip)]
    parsed: Option<AttributeExpr>,
}

impl Measure {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_aggregates(mut self, aggregates: &[&str]) -> Self {
        self.aggregates = aggregates.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_expression(mut self, expression: &str) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub(crate) fn link(&mut self) -> QueryResult<()> {
        self.parsed = parse_expression(&self.expression)?;
        Ok(())
    }

    /// Aggregates implied by [`Measure::aggregates`], `sum` when none are
    /// listed. Window functions run over the measure's `sum` aggregate.
    pub fn default_aggregates(&self) -> Vec<MeasureAggregate> {
        let functions = if self.aggregates.is_empty() {
            vec!["sum".to_string()]
        } else {
            self.aggregates.clone()
        };

        functions
            .into_iter()
            .map(|function| {
                if function == "identity" {
                    MeasureAggregate {
                        name: self.name.clone(),
                        label: self.label.clone(),
                        order: self.order.clone(),
                        window_size: self.window_size,
                        ..Default::default()
                    }
                } else {
                    let measure = if is_window_function(&function) {
                        format!("{}_sum", self.name)
                    } else {
                        self.name.clone()
                    };
                    MeasureAggregate {
                        name: format!("{}_{}", self.name, function),
                        label: None,
                        order: self.order.clone(),
                        function: Some(function),
                        measure: Some(measure),
                        window_size: self.window_size,
                        ..Default::default()
                    }
                }
            })
            .collect()
    }
}

impl LogicalAttribute for Measure {
    fn name(&self) -> &str {
        &self.name
    }

    fn reference(&self) -> &str {
        &self.name
    }

    fn expression(&self) -> Option<&AttributeExpr> {
        self.parsed.as_ref()
    }
}

/// An aggregated value of a measure, the unit of an aggregation result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureAggregate {
    pub name: String,
    pub label: Option<String>,
    pub order: Option<String>,
    /// Aggregate function such as `sum`, or a window function such as `sma`.
    pub function: Option<String>,
    /// Measure the function is applied to. For window functions this is the
    /// aggregate whose values are windowed.
    pub measure: Option<String>,
    /// Expression over other aggregates.
    pub expression: Option<String>,
    pub window_size: Option<usize>,
    #[serde(skip)]
    parsed: Option<AttributeExpr>,
}

impl MeasureAggregate {
    pub fn new(name: &str, function: &str, measure: &str) -> Self {
        Self {
            name: name.into(),
            function: Some(function.into()),
            measure: Some(measure.into()),
            ..Default::default()
        }
    }

    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = Some(size);
        self
    }

    pub(crate) fn link(&mut self) -> QueryResult<()> {
        if self.measure.is_some() && self.expression.is_some() {
            return Err(QueryError::model(format!(
                "Aggregate '{}' has both measure and expression set",
                self.name
            )));
        }
        self.parsed = parse_expression(&self.expression)?;
        Ok(())
    }

    /// Window functions are evaluated over result rows, not in SQL.
    pub fn is_post_aggregate(&self) -> bool {
        self.function.as_deref().is_some_and(is_window_function)
    }
}

impl LogicalAttribute for MeasureAggregate {
    fn name(&self) -> &str {
        &self.name
    }

    fn reference(&self) -> &str {
        &self.name
    }

    fn expression(&self) -> Option<&AttributeExpr> {
        self.parsed.as_ref()
    }

    fn is_base(&self) -> bool {
        self.parsed.is_none() && self.function.is_none()
    }

    fn dependencies(&self) -> BTreeSet<String> {
        match (&self.measure, &self.parsed) {
            (Some(measure), _) => BTreeSet::from([measure.clone()]),
            (None, Some(expr)) => expr.variables(),
            (None, None) => BTreeSet::new(),
        }
    }
}

impl std::fmt::Display for MeasureAggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
