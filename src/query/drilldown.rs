//! Drilldown resolution: requested dimensions to concrete level lists.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use super::cell::Cell;
use super::cut::string_to_dimension_level;
use super::SPLIT_DIMENSION_NAME;
use crate::error::{QueryError, QueryResult};
use crate::model::{Attribute, Cardinality, Cube, Level, LogicalAttribute};

/// One requested drilldown: a dimension, optionally a hierarchy and the level
/// to drill to. Without a level the drill goes one level past the cell's
/// point cut of the dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrilldownRequest {
    pub dimension: String,
    pub hierarchy: Option<String>,
    pub level: Option<String>,
}

impl DrilldownRequest {
    pub fn new(dimension: &str) -> Self {
        Self {
            dimension: dimension.into(),
            ..Default::default()
        }
    }

    pub fn with_hierarchy(mut self, hierarchy: &str) -> Self {
        self.hierarchy = Some(hierarchy.into());
        self
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Parse `dimension@hierarchy:level`.
    pub fn parse(text: &str) -> QueryResult<Self> {
        let (dimension, hierarchy, level) = string_to_dimension_level(text)?;
        Ok(Self {
            dimension,
            hierarchy,
            level,
        })
    }
}

/// Resolved drilldown of one dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct DrilldownItem {
    pub dimension: String,
    pub hierarchy: String,
    /// Whether `hierarchy` is the default hierarchy of the dimension.
    pub is_default_hierarchy: bool,
    /// Hierarchy levels from the first one down to the drilled level.
    pub levels: Vec<Level>,
    /// Key attribute references of `levels`.
    pub keys: Vec<String>,
}

impl DrilldownItem {
    /// The level drilled down to.
    pub fn deepest_level(&self) -> Option<&Level> {
        self.levels.last()
    }

    fn as_string(&self) -> String {
        let hierarchy = if self.is_default_hierarchy {
            String::new()
        } else {
            format!("@{}", self.hierarchy)
        };
        let level = self.deepest_level().map(|l| l.name.as_str()).unwrap_or_default();
        format!("{}{}:{}", self.dimension, hierarchy, level)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Drilldown {
    items: Vec<DrilldownItem>,
}

impl Drilldown {
    /// Resolve `requests` against `cube`, inferring implicit levels from the
    /// point cuts of `cell`.
    ///
    /// A dimension requested twice keeps the deeper of the two drilldowns.
    pub fn new(cube: &Cube, requests: &[DrilldownRequest], cell: &Cell) -> QueryResult<Self> {
        let mut items: Vec<DrilldownItem> = Vec::with_capacity(requests.len());

        for request in requests {
            let item = resolve_item(cube, request, cell)?;
            match items.iter_mut().find(|i| i.dimension == item.dimension) {
                Some(existing) => {
                    warn!(
                        dimension = %item.dimension,
                        "dimension requested more than once in drilldown, keeping the deeper one"
                    );
                    if item.levels.len() > existing.levels.len() {
                        *existing = item;
                    }
                }
                None => items.push(item),
            }
        }

        let drilldown = Self { items };
        debug!(drilldown = %drilldown, "resolved drilldown");
        Ok(drilldown)
    }

    /// Parse `dimension@hierarchy:level` strings and resolve them.
    pub fn from_strings(cube: &Cube, requests: &[&str], cell: &Cell) -> QueryResult<Self> {
        let requests = requests
            .iter()
            .map(|r| DrilldownRequest::parse(r))
            .collect::<QueryResult<Vec<_>>>()?;
        Self::new(cube, &requests, cell)
    }

    pub fn items(&self) -> &[DrilldownItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_dimension(&self, dimension: &str) -> bool {
        self.items.iter().any(|i| i.dimension == dimension)
    }

    pub fn drilldown_for_dimension(&self, dimension: &str) -> Option<&DrilldownItem> {
        self.items.iter().find(|i| i.dimension == dimension)
    }

    /// Items as `dimension@hierarchy:level`, without the hierarchy when it is
    /// the default one.
    pub fn items_as_strings(&self) -> Vec<String> {
        self.items.iter().map(DrilldownItem::as_string).collect()
    }

    /// `(dimension, hierarchy, level)` of the level each item drills to.
    pub fn deepest_levels(&self) -> Vec<(&str, &str, &Level)> {
        self.items
            .iter()
            .filter_map(|item| {
                item.deepest_level()
                    .map(|level| (item.dimension.as_str(), item.hierarchy.as_str(), level))
            })
            .collect()
    }

    /// Level names per dimension key (`dim`, or `dim@hier` for a non-default
    /// hierarchy).
    pub fn result_levels(&self, include_split: bool) -> BTreeMap<String, Vec<String>> {
        let mut result: BTreeMap<String, Vec<String>> = self
            .items
            .iter()
            .map(|item| {
                let key = if item.is_default_hierarchy {
                    item.dimension.clone()
                } else {
                    format!("{}@{}", item.dimension, item.hierarchy)
                };
                (key, item.levels.iter().map(|l| l.name.clone()).collect())
            })
            .collect();

        if include_split {
            result.insert(
                SPLIT_DIMENSION_NAME.to_string(),
                vec![SPLIT_DIMENSION_NAME.to_string()],
            );
        }
        result
    }

    pub fn key_attributes(&self) -> Vec<&Attribute> {
        self.items
            .iter()
            .flat_map(|item| item.levels.iter().map(Level::key))
            .collect()
    }

    pub fn all_attributes(&self) -> Vec<&Attribute> {
        self.items
            .iter()
            .flat_map(|item| item.levels.iter().flat_map(|l| l.attributes.iter()))
            .collect()
    }

    /// Default ordering: `(attribute reference, "asc" | "desc")` per level.
    pub fn natural_order(&self) -> Vec<(String, String)> {
        self.items
            .iter()
            .flat_map(|item| item.levels.iter())
            .map(|level| {
                (
                    level.order_attribute().reference().to_string(),
                    level.order.clone().unwrap_or_else(|| "asc".to_string()),
                )
            })
            .collect()
    }

    /// Levels of high cardinality, or of a high cardinality dimension, that
    /// no point or set cut of `cell` pins.
    pub fn high_cardinality_levels(&self, cube: &Cube, cell: &Cell) -> QueryResult<Vec<&Level>> {
        let mut levels = Vec::new();
        for item in &self.items {
            let dimension = cube.dimension(&item.dimension)?;
            for level in &item.levels {
                let high = level.cardinality == Some(Cardinality::High)
                    || dimension.is_high_cardinality();
                if high
                    && !cell.contains_level(
                        cube,
                        &item.dimension,
                        &level.name,
                        Some(&item.hierarchy),
                    )?
                {
                    levels.push(level);
                }
            }
        }
        Ok(levels)
    }
}

impl fmt::Display for Drilldown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.items_as_strings().join(","))
    }
}

impl<'a> IntoIterator for &'a Drilldown {
    type Item = &'a DrilldownItem;
    type IntoIter = std::slice::Iter<'a, DrilldownItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

fn resolve_item(cube: &Cube, request: &DrilldownRequest, cell: &Cell) -> QueryResult<DrilldownItem> {
    let dimension = cube.dimension(&request.dimension)?;
    let hierarchy = dimension.hierarchy(request.hierarchy.as_deref())?;

    let levels = match &request.level {
        Some(level) => {
            let index = hierarchy.level_index(level)?;
            &hierarchy.levels()[..=index]
        }
        None => {
            let depth = match cell.point_cut_for_dimension(&dimension.name) {
                Some(cut) => {
                    let cut_hierarchy = dimension.hierarchy(cut.hierarchy.as_deref())?;
                    if cut_hierarchy.name != hierarchy.name {
                        return Err(QueryError::hierarchy(format!(
                            "Cut hierarchy '{}' for dimension '{}' is different than \
                             drilldown hierarchy '{}'. Can not determine implicit next level.",
                            cut_hierarchy.name, dimension.name, hierarchy.name
                        )));
                    }
                    // An inverted cut does not pin its last level
                    if cut.invert {
                        cut.level_depth().saturating_sub(1)
                    } else {
                        cut.level_depth()
                    }
                }
                None => 0,
            };
            if depth >= hierarchy.len() {
                return Err(QueryError::hierarchy(format!(
                    "Hierarchy '{}' in dimension '{}' has only {} levels, can not drill to {}",
                    hierarchy.name,
                    dimension.name,
                    hierarchy.len(),
                    depth + 1
                )));
            }
            &hierarchy.levels()[..=depth]
        }
    };

    Ok(DrilldownItem {
        dimension: dimension.name.clone(),
        hierarchy: hierarchy.name.clone(),
        is_default_hierarchy: hierarchy.name == dimension.default_hierarchy_name(),
        keys: levels.iter().map(|l| l.key().reference().to_string()).collect(),
        levels: levels.to_vec(),
    })
}
