//! Dimensions, hierarchies and levels.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::attribute::Attribute;
use crate::error::{QueryError, QueryResult};

/// Path of member keys through a hierarchy, root first. `None` is the null
/// member.
pub type HierarchyPath = Vec<Option<String>>;

/// Approximate number of members of a level or dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Tiny,
    Low,
    Medium,
    High,
}

// =============================================================================
// Level
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "LevelSpec")]
pub struct Level {
    pub name: String,
    pub label: Option<String>,
    pub attributes: Vec<Attribute>,
    /// Name of the key attribute, the first attribute when absent.
    pub key: Option<String>,
    pub label_attribute: Option<String>,
    pub order_attribute: Option<String>,
    pub order: Option<String>,
    pub cardinality: Option<Cardinality>,
    pub info: serde_json::Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LevelSpec {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        attributes: Vec<Attribute>,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        label_attribute: Option<String>,
        #[serde(default)]
        order_attribute: Option<String>,
        #[serde(default)]
        order: Option<String>,
        #[serde(default)]
        cardinality: Option<Cardinality>,
        #[serde(default)]
        info: serde_json::Map<String, Value>,
    },
}

impl From<LevelSpec> for Level {
    fn from(spec: LevelSpec) -> Self {
        match spec {
            LevelSpec::Name(name) => Level::new(&name, vec![Attribute::new(&name)]),
            LevelSpec::Full {
                name,
                label,
                attributes,
                key,
                label_attribute,
                order_attribute,
                order,
                cardinality,
                info,
            } => {
                let attributes = if attributes.is_empty() {
                    vec![Attribute::new(&name)]
                } else {
                    attributes
                };
                Level {
                    name,
                    label,
                    attributes,
                    key,
                    label_attribute,
                    order_attribute,
                    order,
                    cardinality,
                    info,
                }
            }
        }
    }
}

impl Level {
    pub fn new(name: &str, attributes: Vec<Attribute>) -> Self {
        Self {
            name: name.into(),
            attributes,
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_label_attribute(mut self, attribute: &str) -> Self {
        self.label_attribute = Some(attribute.into());
        self
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = Some(cardinality);
        self
    }

    pub fn with_info(mut self, key: &str, value: Value) -> Self {
        self.info.insert(key.into(), value);
        self
    }

    fn link(&mut self, dimension: &str, flat: bool) -> QueryResult<()> {
        if self.attributes.is_empty() {
            return Err(QueryError::model(format!(
                "Attribute list of level '{}' in dimension '{}' should not be empty",
                self.name, dimension
            )));
        }
        for attribute in &mut self.attributes {
            attribute.link(Some(dimension), flat)?;
        }
        for (role, name) in [
            ("key", &self.key),
            ("label", &self.label_attribute),
            ("order", &self.order_attribute),
        ] {
            if let Some(name) = name {
                if self.attribute(name).is_none() {
                    return Err(QueryError::model(format!(
                        "Unknown {} attribute '{}' in level '{}'",
                        role, name, self.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Attribute that identifies a member of the level.
    pub fn key(&self) -> &Attribute {
        self.key
            .as_deref()
            .and_then(|name| self.attribute(name))
            .unwrap_or(&self.attributes[0])
    }

    pub fn label_attribute(&self) -> &Attribute {
        match self.label_attribute.as_deref().and_then(|n| self.attribute(n)) {
            Some(attr) => attr,
            None if self.attributes.len() > 1 => &self.attributes[1],
            None => self.key(),
        }
    }

    pub fn order_attribute(&self) -> &Attribute {
        self.order_attribute
            .as_deref()
            .and_then(|name| self.attribute(name))
            .unwrap_or(&self.attributes[0])
    }

    /// Window size hint for moving calculations drilled down to this level.
    pub fn aggregation_units(&self) -> Option<usize> {
        self.info
            .get("aggregation_units")
            .and_then(Value::as_u64)
            .map(|units| units as usize)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

// =============================================================================
// Hierarchy
// =============================================================================

/// Ordered list of levels, root first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "levels")]
    pub level_names: Vec<String>,
    #[serde(skip)]
    levels: Vec<Level>,
}

impl Hierarchy {
    pub fn new(name: &str, levels: &[&str]) -> Self {
        Self {
            name: name.into(),
            label: None,
            level_names: levels.iter().map(|l| l.to_string()).collect(),
            levels: Vec::new(),
        }
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_index(&self, level: &str) -> QueryResult<usize> {
        self.levels
            .iter()
            .position(|l| l.name == level)
            .ok_or_else(|| {
                QueryError::hierarchy(format!(
                    "Level '{}' is not part of hierarchy '{}'",
                    level, self.name
                ))
            })
    }

    pub fn contains_level(&self, level: &str) -> bool {
        self.levels.iter().any(|l| l.name == level)
    }

    /// Levels down to `depth`, one more when `drilldown` is set.
    pub fn levels_for_depth(&self, depth: usize, drilldown: bool) -> QueryResult<&[Level]> {
        let extend = usize::from(drilldown);
        if depth + extend > self.levels.len() {
            return Err(QueryError::hierarchy(format!(
                "Depth {} is longer than hierarchy '{}' levels ({}) (drilldown: {})",
                depth,
                self.name,
                self.level_names.join(", "),
                drilldown
            )));
        }
        Ok(&self.levels[..depth + extend])
    }

    pub fn levels_for_path(
        &self,
        path: &[Option<String>],
        drilldown: bool,
    ) -> QueryResult<&[Level]> {
        self.levels_for_depth(path.len(), drilldown)
    }

    /// Level after `level`, the first level for `None`. `None` past the last
    /// level.
    pub fn next_level(&self, level: Option<&str>) -> QueryResult<Option<&Level>> {
        match level {
            None => Ok(self.levels.first()),
            Some(name) => {
                let index = self.level_index(name)?;
                Ok(self.levels.get(index + 1))
            }
        }
    }

    pub fn previous_level(&self, level: Option<&str>) -> QueryResult<Option<&Level>> {
        match level {
            None => Ok(None),
            Some(name) => {
                let index = self.level_index(name)?;
                Ok(index.checked_sub(1).and_then(|i| self.levels.get(i)))
            }
        }
    }

    pub fn is_last(&self, level: &str) -> bool {
        self.levels.last().is_some_and(|l| l.name == level)
    }

    /// Roll `path` up to `level`, or by one level when `level` is `None`.
    pub fn rollup(&self, path: &[Option<String>], level: Option<&str>) -> QueryResult<HierarchyPath> {
        let last = match level {
            Some(level) => {
                let last = self.level_index(level)? + 1;
                if last > path.len() {
                    return Err(QueryError::hierarchy(format!(
                        "Can not roll-up: level '{}' is deeper than deepest element of path {:?}",
                        level, path
                    )));
                }
                last
            }
            None => path.len().saturating_sub(1),
        };
        Ok(path[..last].to_vec())
    }

    /// `true` when no further drill-down is possible below `path`.
    pub fn path_is_base(&self, path: &[Option<String>]) -> bool {
        path.len() == self.levels.len()
    }

    /// Key attributes of the levels down to `depth`, all levels for `None`.
    pub fn keys(&self, depth: Option<usize>) -> Vec<&Attribute> {
        let depth = depth.unwrap_or(self.levels.len()).min(self.levels.len());
        self.levels[..depth].iter().map(Level::key).collect()
    }

    pub fn all_attributes(&self) -> Vec<&Attribute> {
        self.levels.iter().flat_map(|l| l.attributes.iter()).collect()
    }
}

impl std::fmt::Display for Hierarchy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

// =============================================================================
// Dimension
// =============================================================================

pub const DEFAULT_HIERARCHY_NAME: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dimension {
    pub name: String,
    pub label: Option<String>,
    pub levels: Vec<Level>,
    pub hierarchies: Vec<Hierarchy>,
    pub default_hierarchy_name: Option<String>,
    pub cardinality: Option<Cardinality>,
    /// Shorthand for a single-level dimension.
    pub attributes: Vec<Attribute>,
    pub info: serde_json::Map<String, Value>,
}

impl Dimension {
    pub fn new(name: &str, levels: Vec<Level>) -> QueryResult<Self> {
        let mut dimension = Self {
            name: name.into(),
            levels,
            ..Default::default()
        };
        dimension.link()?;
        Ok(dimension)
    }

    /// Single level, single attribute dimension named `name`.
    pub fn flat(name: &str) -> QueryResult<Self> {
        Self::new(name, Vec::new())
    }

    pub fn with_hierarchies(mut self, hierarchies: Vec<Hierarchy>) -> QueryResult<Self> {
        self.hierarchies = hierarchies;
        self.link()?;
        Ok(self)
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = Some(cardinality);
        self
    }

    /// Resolve levels, attribute references and hierarchies.
    pub(crate) fn link(&mut self) -> QueryResult<()> {
        if self.levels.is_empty() {
            let attributes = if self.attributes.is_empty() {
                vec![Attribute::new(&self.name)]
            } else {
                std::mem::take(&mut self.attributes)
            };
            self.levels.push(Level::new(&self.name, attributes));
        } else if !self.attributes.is_empty() {
            return Err(QueryError::model(format!(
                "Both levels and attributes specified for dimension '{}'",
                self.name
            )));
        }

        let flat = self.levels.len() == 1 && self.levels[0].attributes.len() == 1;
        for level in &mut self.levels {
            level.link(&self.name, flat)?;
        }

        if self.hierarchies.is_empty() {
            let names: Vec<&str> = self.levels.iter().map(|l| l.name.as_str()).collect();
            self.hierarchies
                .push(Hierarchy::new(DEFAULT_HIERARCHY_NAME, &names));
        }

        for hierarchy in &mut self.hierarchies {
            if hierarchy.level_names.is_empty() {
                return Err(QueryError::model(format!(
                    "Hierarchy '{}' of dimension '{}' has no levels",
                    hierarchy.name, self.name
                )));
            }
            hierarchy.levels = hierarchy
                .level_names
                .iter()
                .map(|name| {
                    self.levels
                        .iter()
                        .find(|l| &l.name == name)
                        .cloned()
                        .ok_or_else(|| {
                            QueryError::model(format!(
                                "Unknown level '{}' in hierarchy '{}' of dimension '{}'",
                                name, hierarchy.name, self.name
                            ))
                        })
                })
                .collect::<QueryResult<Vec<_>>>()?;
        }

        if let Some(default) = &self.default_hierarchy_name {
            if !self.hierarchies.iter().any(|h| &h.name == default) {
                return Err(QueryError::model(format!(
                    "Unknown default hierarchy '{}' in dimension '{}'",
                    default, self.name
                )));
            }
        }
        Ok(())
    }

    /// Hierarchy by name, the default hierarchy for `None`.
    pub fn hierarchy(&self, name: Option<&str>) -> QueryResult<&Hierarchy> {
        let name = name.or(self.default_hierarchy_name.as_deref());
        let found = match name {
            Some(name) => self.hierarchies.iter().find(|h| h.name == name),
            None => self.hierarchies.first(),
        };
        found.ok_or_else(|| {
            QueryError::not_found(
                "hierarchy",
                format!("{}@{}", self.name, name.unwrap_or(DEFAULT_HIERARCHY_NAME)),
            )
        })
    }

    pub fn default_hierarchy_name(&self) -> &str {
        self.default_hierarchy_name
            .as_deref()
            .or_else(|| self.hierarchies.first().map(|h| h.name.as_str()))
            .unwrap_or(DEFAULT_HIERARCHY_NAME)
    }

    pub fn level(&self, name: &str) -> QueryResult<&Level> {
        self.levels
            .iter()
            .find(|l| l.name == name)
            .ok_or_else(|| QueryError::not_found("level", format!("{}:{}", self.name, name)))
    }

    pub fn is_flat(&self) -> bool {
        self.levels.len() == 1
    }

    pub fn has_details(&self) -> bool {
        self.levels.iter().any(|l| l.attributes.len() > 1)
    }

    pub fn is_high_cardinality(&self) -> bool {
        self.cardinality == Some(Cardinality::High)
    }

    pub fn key_attributes(&self) -> Vec<&Attribute> {
        self.levels.iter().map(Level::key).collect()
    }

    pub fn all_attributes(&self) -> Vec<&Attribute> {
        self.levels.iter().flat_map(|l| l.attributes.iter()).collect()
    }

    /// Attribute by reference (`dim.attr`) or by plain name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.levels
            .iter()
            .flat_map(|l| l.attributes.iter())
            .find(|a| a.reference == name || a.name == name)
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
