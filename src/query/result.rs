//! Aggregation results.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use super::cell::Cell;
use super::drilldown::Drilldown;
use super::statutils::WindowCalculator;
use super::Record;
use crate::error::{QueryError, QueryResult};
use crate::model::{Cube, HierarchyPath};

/// Result records in query order, pulled lazily from the row source. Every
/// record passes through the window calculators, in registration order, as
/// it is yielded.
pub struct Cells {
    records: Box<dyn Iterator<Item = Record>>,
    calculators: Vec<WindowCalculator>,
}

impl Cells {
    pub fn new<I>(records: I, calculators: Vec<WindowCalculator>) -> Self
    where
        I: IntoIterator<Item = Record>,
        I::IntoIter: 'static,
    {
        Self {
            records: Box::new(records.into_iter()),
            calculators,
        }
    }
}

impl Default for Cells {
    fn default() -> Self {
        Self::new(std::iter::empty(), Vec::new())
    }
}

impl std::fmt::Debug for Cells {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cells")
            .field("calculators", &self.calculators)
            .finish_non_exhaustive()
    }
}

impl Iterator for Cells {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let mut record = self.records.next()?;
        for calculator in &mut self.calculators {
            calculator.calculate(&mut record);
        }
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

#[derive(Debug)]
enum CellSource {
    Pending(Cells),
    Cached(Vec<Record>),
}

/// One drilled-down row of a dimension, as listed in a table or a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    /// Key value of the level of interest.
    pub key: Value,
    pub label: Value,
    /// Path of the drilled-down member.
    pub path: HierarchyPath,
    /// `true` when the member can not be drilled further.
    pub is_base: bool,
    pub record: Record,
}

/// Result of an aggregation query: a summary of the whole cell and, with a
/// drilldown, one record per group.
#[derive(Debug)]
pub struct AggregationResult {
    pub cell: Cell,
    /// Names of the aggregates computed.
    pub aggregates: Vec<String>,
    pub drilldown: Option<Drilldown>,
    /// References of the drilldown attributes in each record.
    pub attributes: Vec<String>,
    pub has_split: bool,
    /// Drilled level names per dimension.
    pub levels: BTreeMap<String, Vec<String>>,
    pub summary: Option<Record>,
    pub total_cell_count: Option<u64>,
    pub remainder: Record,
    /// Display labels per aggregate and attribute reference.
    pub labels: BTreeMap<String, String>,
    cells: CellSource,
}

impl AggregationResult {
    pub fn new(cell: Cell, aggregates: Vec<String>, drilldown: Option<Drilldown>, has_split: bool) -> Self {
        let levels = drilldown
            .as_ref()
            .map(|d| d.result_levels(has_split))
            .unwrap_or_default();
        let attributes = drilldown
            .as_ref()
            .map(|d| {
                d.all_attributes()
                    .iter()
                    .map(|a| a.reference.clone())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            cell,
            aggregates,
            drilldown,
            attributes,
            has_split,
            levels,
            summary: None,
            total_cell_count: None,
            remainder: Record::new(),
            labels: BTreeMap::new(),
            cells: CellSource::Cached(Vec::new()),
        }
    }

    /// Set the summary record. It is passed through fresh copies of
    /// `calculators`, so it does not join the windows of the cells.
    pub fn set_summary(&mut self, mut summary: Record, calculators: &[WindowCalculator]) {
        for calculator in calculators {
            calculator.clone().calculate(&mut summary);
        }
        self.summary = Some(summary);
    }

    /// Hand over the cell records. Nothing is read from `records` until the
    /// cells are iterated or [`AggregationResult::cached`] is called.
    pub fn set_cells<I>(&mut self, records: I, calculators: Vec<WindowCalculator>)
    where
        I: IntoIterator<Item = Record>,
        I::IntoIter: 'static,
    {
        self.cells = CellSource::Pending(Cells::new(records, calculators));
    }

    /// Take the cell records. Records already materialized by
    /// [`AggregationResult::cached`] are returned as they are.
    pub fn into_cells(self) -> Cells {
        match self.cells {
            CellSource::Pending(cells) => cells,
            CellSource::Cached(records) => Cells::new(records, Vec::new()),
        }
    }

    /// Materialize the cells, so they can be read more than once.
    pub fn cached(&mut self) -> &[Record] {
        if let CellSource::Pending(cells) = &mut self.cells {
            let records: Vec<Record> = cells.collect();
            self.cells = CellSource::Cached(records);
        }
        match &self.cells {
            CellSource::Cached(records) => records,
            CellSource::Pending(_) => &[],
        }
    }

    /// Rows of `dimension` drilled to `depth`, or one level past the cell's
    /// point cut of the dimension.
    pub fn table_rows(
        &mut self,
        cube: &Cube,
        dimension: &str,
        depth: Option<usize>,
    ) -> QueryResult<Vec<TableRow>> {
        let path: HierarchyPath = self
            .cell
            .point_cut_for_dimension(dimension)
            .and_then(|cut| cut.point_path().cloned())
            .unwrap_or_default();
        let hierarchy_name = self
            .drilldown
            .as_ref()
            .and_then(|d| d.drilldown_for_dimension(dimension))
            .map(|item| item.hierarchy.clone());

        let dim = cube.dimension(dimension)?;
        let hierarchy = dim.hierarchy(hierarchy_name.as_deref())?;

        let is_base = if self.levels.is_empty() {
            hierarchy.len() == 1
        } else {
            let level_key = if hierarchy.name == dim.default_hierarchy_name() {
                dimension.to_string()
            } else {
                format!("{}@{}", dimension, hierarchy.name)
            };
            self.levels.get(&level_key).map_or(0, Vec::len) >= hierarchy.len()
        };

        let level = match depth {
            Some(depth) if depth > 0 => hierarchy.levels().get(depth - 1).ok_or_else(|| {
                QueryError::hierarchy(format!(
                    "Depth {} is out of hierarchy '{}' with {} levels",
                    depth,
                    hierarchy.name,
                    hierarchy.len()
                ))
            })?,
            _ => hierarchy
                .levels_for_depth(path.len(), true)?
                .last()
                .ok_or_else(|| {
                    QueryError::Internal(format!("Hierarchy '{}' has no levels", hierarchy.name))
                })?,
        };
        let key_ref = level.key().reference.clone();
        let label_ref = level.label_attribute().reference.clone();

        let rows = self
            .cached()
            .iter()
            .map(|record| {
                let key = record.get(&key_ref).cloned().unwrap_or(Value::Null);
                let label = record.get(&label_ref).cloned().unwrap_or(Value::Null);
                let mut drill_path = path.clone();
                drill_path.push(path_member(&key));
                TableRow {
                    key,
                    label,
                    path: drill_path,
                    is_base,
                    record: record.clone(),
                }
            })
            .collect();
        Ok(rows)
    }

    pub fn to_dict(&mut self) -> Value {
        let cells = self.cached().to_vec();
        json!({
            "summary": self.summary,
            "remainder": self.remainder,
            "cells": cells,
            "total_cell_count": self.total_cell_count,
            "aggregates": self.aggregates,
            "cell": self.cell.to_dict()["cuts"],
            "levels": self.levels,
            "attributes": self.attributes,
            "has_split": self.has_split,
        })
    }

    pub fn to_json(&mut self) -> QueryResult<String> {
        serde_json::to_string(&self.to_dict())
            .map_err(|e| QueryError::Internal(format!("Can not serialize result: {}", e)))
    }
}

fn path_member(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
