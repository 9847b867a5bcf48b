//! Cells: conjunctions of cuts.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::BitAnd;
use std::str::FromStr;

use serde_json::{json, Value};

use super::cut::{cuts_from_string, string_from_cuts, Cut, CutKind};
use crate::error::{QueryError, QueryResult};
use crate::model::{Attribute, Cube, HierarchyPath, Level};

/// Selection of a cube. Every operation returns a new cell.
///
/// Equality ignores the order of the cuts; repeated cuts have to repeat
/// equally often in both cells.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub cuts: Vec<Cut>,
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        let occurrences = |cuts: &[Cut], cut: &Cut| cuts.iter().filter(|c| *c == cut).count();
        self.cuts.len() == other.cuts.len()
            && self
                .cuts
                .iter()
                .all(|c| occurrences(&self.cuts, c) == occurrences(&other.cuts, c))
    }
}

impl Cell {
    pub fn new(cuts: Vec<Cut>) -> Self {
        Self { cuts }
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    /// Replace the cut of the same dimension, or append `cut`.
    pub fn slice(&self, cut: Cut) -> Cell {
        let mut cuts = self.cuts.clone();
        match cuts.iter().position(|c| c.dimension == cut.dimension) {
            Some(index) => cuts[index] = cut,
            None => cuts.push(cut),
        }
        Cell { cuts }
    }

    pub fn multi_slice(&self, cuts: Vec<Cut>) -> Cell {
        cuts.into_iter().fold(self.clone(), |cell, cut| cell.slice(cut))
    }

    /// Point-slice `dimension` at `path`; an empty path removes its cuts.
    pub fn point_slice(&self, dimension: &str, path: HierarchyPath) -> Cell {
        let mut cuts: Vec<Cut> = self.cuts_for_dimension(dimension, true).into_iter().cloned().collect();
        if !path.is_empty() {
            cuts.push(Cut::point(dimension, path));
        }
        Cell { cuts }
    }

    /// Drill one level down to member `value`.
    ///
    /// Extends the point cut of `dimension`. A dimension cut by a set or
    /// range starts a new path, next to the existing cut.
    pub fn drilldown(&self, dimension: &str, value: &str, hierarchy: Option<&str>) -> Cell {
        let existing = self
            .cuts
            .iter()
            .position(|c| c.dimension == dimension && c.is_point());
        let mut cuts = self.cuts.clone();
        let mut path = match existing {
            Some(index) => match cuts.remove(index).kind {
                CutKind::Point { path } => path,
                _ => Vec::new(),
            },
            None => Vec::new(),
        };
        path.push(Some(value.to_string()));
        cuts.push(Cut::point(dimension, path).with_hierarchy(hierarchy));
        Cell { cuts }
    }

    /// Roll the point cut of `dimension` up to `level`, or one level up. A
    /// cut rolled up past the first level is removed.
    pub fn rollup_dim(
        &self,
        cube: &Cube,
        dimension: &str,
        level: Option<&str>,
        hierarchy: Option<&str>,
    ) -> QueryResult<Cell> {
        let dim = cube.dimension(dimension)?;
        let Some(index) = self
            .cuts
            .iter()
            .position(|c| c.dimension == dimension && c.is_point())
        else {
            return Ok(self.clone());
        };

        let mut cuts = self.cuts.clone();
        let cut = cuts.remove(index);
        let hierarchy = hierarchy.or(cut.hierarchy.as_deref());
        let path = cut.point_path().map(Vec::as_slice).unwrap_or_default();
        let rolled = dim.hierarchy(hierarchy)?.rollup(path, level)?;
        if !rolled.is_empty() {
            cuts.push(Cut::point(dimension, rolled).with_hierarchy(hierarchy));
        }
        Ok(Cell { cuts })
    }

    /// Roll up several dimensions, each to a level or by one level. Only
    /// point cuts can be rolled up.
    pub fn rollup(&self, cube: &Cube, rollup: &[(&str, Option<&str>)]) -> QueryResult<Cell> {
        let mut cell = self.clone();
        for (dimension, level) in rollup {
            if let Some(cut) = cell.cut_for_dimension(dimension) {
                if !cut.is_point() {
                    return Err(QueryError::argument(format!(
                        "Only point cuts can be rolled up (rollup dimension: {})",
                        dimension
                    )));
                }
            }
            cell = cell.rollup_dim(cube, dimension, *level, None)?;
        }
        Ok(cell)
    }

    pub fn cut_for_dimension(&self, dimension: &str) -> Option<&Cut> {
        self.cuts.iter().find(|c| c.dimension == dimension)
    }

    pub fn point_cut_for_dimension(&self, dimension: &str) -> Option<&Cut> {
        self.cuts
            .iter()
            .find(|c| c.dimension == dimension && c.is_point())
    }

    /// Cuts of `dimension`, or of every other dimension with `exclude`.
    pub fn cuts_for_dimension(&self, dimension: &str, exclude: bool) -> Vec<&Cut> {
        self.cuts
            .iter()
            .filter(|c| (c.dimension == dimension) != exclude)
            .collect()
    }

    /// Cell without hidden cuts, as shown to clients.
    pub fn public_cell(&self) -> Cell {
        Cell {
            cuts: self.cuts.iter().filter(|c| !c.hidden).cloned().collect(),
        }
    }

    /// Deepest cut level per dimension.
    pub fn level_depths(&self) -> BTreeMap<String, usize> {
        let mut depths = BTreeMap::new();
        for cut in &self.cuts {
            let depth = depths.entry(cut.dimension.clone()).or_insert(0);
            *depth = cut.level_depth().max(*depth);
        }
        depths
    }

    /// Level key attributes every cut of the cell is compared on.
    pub fn collect_key_attributes<'c>(&self, cube: &'c Cube) -> QueryResult<Vec<&'c Attribute>> {
        let mut attributes: Vec<&Attribute> = Vec::new();
        for cut in &self.cuts {
            let hierarchy = cube
                .dimension(&cut.dimension)?
                .hierarchy(cut.hierarchy.as_deref())?;
            for key in hierarchy.keys(Some(cut.level_depth())) {
                if !attributes.iter().any(|a| a.reference == key.reference) {
                    attributes.push(key);
                }
            }
        }
        Ok(attributes)
    }

    /// `(dimension, hierarchy, level)` of the deepest level of every cut
    /// that has a path.
    pub fn deepest_levels<'c>(
        &self,
        cube: &'c Cube,
    ) -> QueryResult<Vec<(String, String, &'c Level)>> {
        let mut levels = Vec::new();
        for cut in &self.cuts {
            let depth = cut.level_depth();
            if depth == 0 {
                continue;
            }
            let hierarchy = cube
                .dimension(&cut.dimension)?
                .hierarchy(cut.hierarchy.as_deref())?;
            let level = hierarchy.levels_for_depth(depth, false)?.last().ok_or_else(|| {
                QueryError::Internal(format!("Hierarchy '{}' has no levels", hierarchy.name))
            })?;
            levels.push((cut.dimension.clone(), hierarchy.name.clone(), level));
        }
        Ok(levels)
    }

    /// `true` when a point cut reaches the last level of the hierarchy.
    pub fn is_base(&self, cube: &Cube, dimension: &str, hierarchy: Option<&str>) -> QueryResult<bool> {
        let hierarchy = cube.dimension(dimension)?.hierarchy(hierarchy)?;
        Ok(self
            .point_cut_for_dimension(dimension)
            .is_some_and(|cut| cut.level_depth() >= hierarchy.len()))
    }

    /// `true` when a point or set cut on `hierarchy` pins `level`.
    pub fn contains_level(
        &self,
        cube: &Cube,
        dimension: &str,
        level: &str,
        hierarchy: Option<&str>,
    ) -> QueryResult<bool> {
        let dim = cube.dimension(dimension)?;
        let hierarchy = dim.hierarchy(hierarchy)?;

        for cut in self.cuts_for_dimension(dimension, false) {
            if dim.hierarchy(cut.hierarchy.as_deref())?.name != hierarchy.name {
                continue;
            }
            let paths: Vec<&HierarchyPath> = match &cut.kind {
                CutKind::Point { path } => vec![path],
                CutKind::Set { paths } => paths.iter().collect(),
                CutKind::Range { .. } => continue,
            };
            for path in paths {
                let levels = hierarchy.levels_for_path(path, false)?;
                if levels.iter().any(|l| l.name == level) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub fn to_str(&self) -> String {
        string_from_cuts(&self.cuts)
    }

    pub fn to_dict(&self) -> Value {
        json!({ "cuts": self.cuts.iter().map(Cut::to_dict).collect::<Vec<_>>() })
    }
}

impl BitAnd for &Cell {
    type Output = Cell;

    /// Conjunction: the cuts of both cells, without conflict resolution.
    fn bitand(self, other: &Cell) -> Cell {
        Cell {
            cuts: self.cuts.iter().chain(&other.cuts).cloned().collect(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str())
    }
}

impl FromStr for Cell {
    type Err = QueryError;

    fn from_str(s: &str) -> QueryResult<Self> {
        Ok(Cell::new(cuts_from_string(s)?))
    }
}
