//! Cube descriptor: dimensions, measures, aggregates and physical hints.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::attribute::{Attribute, LogicalAttribute, Measure, MeasureAggregate};
use super::dimension::Dimension;
use super::depsort_attributes;
use crate::error::{QueryError, QueryResult};
use crate::star::mapping::{ColumnReference, Join};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cube {
    pub name: String,
    pub label: Option<String>,
    /// Fact table, derived from the naming conventions when absent.
    pub fact: Option<String>,
    /// Fact key column.
    pub key: Option<String>,
    pub dimensions: Vec<Dimension>,
    pub measures: Vec<Measure>,
    pub aggregates: Vec<MeasureAggregate>,
    /// Fact attributes that are neither measures nor dimension keys.
    pub details: Vec<Attribute>,
    /// Explicit physical columns by attribute reference.
    pub mappings: BTreeMap<String, ColumnReference>,
    pub joins: Vec<Join>,
    pub browser_options: serde_json::Map<String, Value>,
}

impl Cube {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> QueryResult<Self> {
        let cube: Cube = serde_json::from_str(json)
            .map_err(|e| QueryError::model(format!("Invalid cube description: {}", e)))?;
        cube.link()
    }

    pub fn from_value(value: Value) -> QueryResult<Self> {
        let cube: Cube = serde_json::from_value(value)
            .map_err(|e| QueryError::model(format!("Invalid cube description: {}", e)))?;
        cube.link()
    }

    pub fn with_fact(mut self, fact: &str) -> Self {
        self.fact = Some(fact.into());
        self
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn with_measure(mut self, measure: Measure) -> Self {
        self.measures.push(measure);
        self
    }

    pub fn with_aggregate(mut self, aggregate: MeasureAggregate) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    pub fn with_detail(mut self, detail: Attribute) -> Self {
        self.details.push(detail);
        self
    }

    pub fn with_mapping(mut self, reference: &str, column: ColumnReference) -> Self {
        self.mappings.insert(reference.into(), column);
        self
    }

    pub fn with_join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Resolve references and expressions. Cubes without explicit aggregates
    /// get the default aggregates of their measures.
    pub fn link(mut self) -> QueryResult<Self> {
        for dimension in &mut self.dimensions {
            dimension.link()?;
        }
        for detail in &mut self.details {
            detail.link(None, false)?;
        }
        for measure in &mut self.measures {
            measure.link()?;
        }
        if self.aggregates.is_empty() {
            self.aggregates = self
                .measures
                .iter()
                .flat_map(Measure::default_aggregates)
                .collect();
        }
        for aggregate in &mut self.aggregates {
            aggregate.link()?;
        }

        let mut seen = BTreeSet::new();
        for name in self.all_attributes().iter().map(|a| a.reference()) {
            if !seen.insert(name) {
                return Err(QueryError::model(format!(
                    "Duplicate attribute '{}' in cube '{}'",
                    name, self.name
                )));
            }
        }
        Ok(self)
    }

    pub fn dimension(&self, name: &str) -> QueryResult<&Dimension> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| QueryError::not_found("dimension", name))
    }

    pub fn measure(&self, name: &str) -> QueryResult<&Measure> {
        self.measures
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| QueryError::not_found("measure", name))
    }

    pub fn aggregate(&self, name: &str) -> QueryResult<&MeasureAggregate> {
        self.aggregates
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| QueryError::not_found("aggregate", name))
    }

    /// Dimension attributes, details and measures.
    pub fn all_attributes(&self) -> Vec<&dyn LogicalAttribute> {
        let dimension_attributes = self
            .dimensions
            .iter()
            .flat_map(|d| d.all_attributes())
            .map(|a| a as &dyn LogicalAttribute);
        dimension_attributes
            .chain(self.details.iter().map(|a| a as &dyn LogicalAttribute))
            .chain(self.measures.iter().map(|m| m as &dyn LogicalAttribute))
            .collect()
    }

    pub fn attribute(&self, reference: &str) -> QueryResult<&dyn LogicalAttribute> {
        let attributes = self.all_attributes();
        attributes
            .iter()
            .find(|a| a.reference() == reference)
            .copied()
            .ok_or_else(|| QueryError::NoSuchAttribute {
                name: reference.to_string(),
                available: attributes.iter().map(|a| a.reference().to_string()).collect(),
            })
    }

    /// Attributes by reference, all attributes for an empty list.
    pub fn get_attributes(&self, references: &[&str]) -> QueryResult<Vec<&dyn LogicalAttribute>> {
        if references.is_empty() {
            return Ok(self.all_attributes());
        }
        references.iter().map(|r| self.attribute(r)).collect()
    }

    /// Aggregates by name, all aggregates for an empty list.
    pub fn get_aggregates(&self, names: &[&str]) -> QueryResult<Vec<&MeasureAggregate>> {
        if names.is_empty() {
            return Ok(self.aggregates.iter().collect());
        }
        names.iter().map(|n| self.aggregate(n)).collect()
    }

    /// `references` and everything they are computed from, base attributes
    /// first.
    pub fn collect_dependencies(
        &self,
        references: &[&str],
    ) -> QueryResult<Vec<&dyn LogicalAttribute>> {
        let mut collected: BTreeMap<String, &dyn LogicalAttribute> = BTreeMap::new();
        let mut pending: Vec<String> = references.iter().map(|r| r.to_string()).collect();

        while let Some(reference) = pending.pop() {
            if collected.contains_key(&reference) {
                continue;
            }
            let attribute = self.attribute(&reference)?;
            pending.extend(attribute.dependencies());
            collected.insert(reference, attribute);
        }

        depsort_attributes(collected.into_values().collect())
    }
}
