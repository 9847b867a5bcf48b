//! Cuts: point, set and range restrictions of one dimension, and their
//! string and dictionary forms.
//!
//! String grammar:
//!
//! ```text
//! cuts   := cut ('|' cut)*
//! cut    := ['!'] dimension ['@' hierarchy] ':' payload
//! point  := element (',' element)*
//! set    := point (';' point)+
//! range  := [point] '-' [point]
//! ```
//!
//! Path elements escape `\ ! | : ; , -` with a backslash. The element
//! `__null__` is the null member.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::error::{QueryError, QueryResult};
use crate::model::HierarchyPath;

pub const NULL_PATH_VALUE: &str = "__null__";

const ESCAPED_CHARS: &[char] = &['\\', '!', '|', ':', ';', ',', '-'];

static DIMENSION_SPEC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<invert>!)?(?P<dim>\w+)(@(?P<hier>\w+))?$").unwrap());

// Element: escaped character or anything but the separators
static POINT_PAYLOAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\\.|[^:;|\-\\])*$").unwrap());

static SET_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\\.|[^:;|\-\\])*(?:;(?:\\.|[^:;|\-\\])*)+$").unwrap()
});

static RANGE_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<from>(?:\\.|[^:;|\-\\])*)-(?P<to>(?:\\.|[^:;|\-\\])*)$").unwrap()
});

/// Build a path of non-null members.
pub fn path<S: AsRef<str>>(members: &[S]) -> HierarchyPath {
    members.iter().map(|m| Some(m.as_ref().to_string())).collect()
}

// =============================================================================
// Cut
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CutKind {
    Point { path: HierarchyPath },
    /// Disjunction of points; order only affects serialization.
    Set { paths: Vec<HierarchyPath> },
    /// Inclusive bounds, either may be open.
    Range {
        from: Option<HierarchyPath>,
        to: Option<HierarchyPath>,
    },
}

/// Restriction of a cell to part of one dimension.
///
/// Equality ignores `hierarchy` and `hidden`.
#[derive(Debug, Clone)]
pub struct Cut {
    pub dimension: String,
    pub hierarchy: Option<String>,
    /// Select the complement.
    pub invert: bool,
    /// Injected restriction that is not shown to clients.
    pub hidden: bool,
    pub kind: CutKind,
}

impl PartialEq for Cut {
    fn eq(&self, other: &Self) -> bool {
        self.dimension == other.dimension
            && self.invert == other.invert
            && self.kind == other.kind
    }
}

impl Cut {
    fn with_kind(dimension: &str, kind: CutKind) -> Self {
        Self {
            dimension: dimension.into(),
            hierarchy: None,
            invert: false,
            hidden: false,
            kind,
        }
    }

    pub fn point(dimension: &str, path: HierarchyPath) -> Self {
        Self::with_kind(dimension, CutKind::Point { path })
    }

    pub fn set(dimension: &str, paths: Vec<HierarchyPath>) -> Self {
        Self::with_kind(dimension, CutKind::Set { paths })
    }

    pub fn range(
        dimension: &str,
        from: Option<HierarchyPath>,
        to: Option<HierarchyPath>,
    ) -> Self {
        Self::with_kind(dimension, CutKind::Range { from, to })
    }

    pub fn with_hierarchy(mut self, hierarchy: Option<&str>) -> Self {
        self.hierarchy = hierarchy.map(str::to_string);
        self
    }

    pub fn inverted(mut self) -> Self {
        self.invert = !self.invert;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            CutKind::Point { .. } => "point",
            CutKind::Set { .. } => "set",
            CutKind::Range { .. } => "range",
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self.kind, CutKind::Point { .. })
    }

    /// Point path, `None` for set and range cuts.
    pub fn point_path(&self) -> Option<&HierarchyPath> {
        match &self.kind {
            CutKind::Point { path } => Some(path),
            _ => None,
        }
    }

    /// Number of levels the cut reaches: the longest of its paths.
    pub fn level_depth(&self) -> usize {
        match &self.kind {
            CutKind::Point { path } => path.len(),
            CutKind::Set { paths } => paths.iter().map(Vec::len).max().unwrap_or(0),
            CutKind::Range { from, to } => {
                let from = from.as_ref().map_or(0, Vec::len);
                let to = to.as_ref().map_or(0, Vec::len);
                from.max(to)
            }
        }
    }

    pub fn to_dict(&self) -> Value {
        let mut dict = json!({
            "type": self.kind_name(),
            "dimension": self.dimension,
            "hierarchy": self.hierarchy,
            "level_depth": self.level_depth(),
            "invert": self.invert,
            "hidden": self.hidden,
        });
        let fields = match &self.kind {
            CutKind::Point { path } => json!({ "path": path }),
            CutKind::Set { paths } => json!({ "paths": paths }),
            CutKind::Range { from, to } => json!({ "from": from, "to": to }),
        };
        if let (Some(dict), Value::Object(fields)) = (dict.as_object_mut(), fields) {
            dict.extend(fields);
        }
        dict
    }
}

impl fmt::Display for Cut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.invert {
            f.write_str("!")?;
        }
        f.write_str(&string_from_hierarchy(&self.dimension, self.hierarchy.as_deref()))?;
        f.write_str(":")?;
        match &self.kind {
            CutKind::Point { path } => f.write_str(&string_from_path(path)),
            CutKind::Set { paths } => {
                let paths: Vec<String> = paths.iter().map(|p| string_from_path(p)).collect();
                f.write_str(&paths.join(";"))
            }
            CutKind::Range { from, to } => write!(
                f,
                "{}-{}",
                from.as_deref().map(string_from_path).unwrap_or_default(),
                to.as_deref().map(string_from_path).unwrap_or_default()
            ),
        }
    }
}

impl Serialize for Cut {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_dict().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Cut {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        cut_from_dict(&value).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Escaping
// =============================================================================

fn escape_element(element: &str) -> String {
    let mut escaped = String::with_capacity(element.len());
    for c in element.chars() {
        if ESCAPED_CHARS.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn unescape_element(element: &str) -> Option<String> {
    if element == NULL_PATH_VALUE {
        return None;
    }
    let mut unescaped = String::with_capacity(element.len());
    let mut chars = element.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) if ESCAPED_CHARS.contains(&next) => unescaped.push(next),
                Some(next) => {
                    unescaped.push('\\');
                    unescaped.push(next);
                }
                None => unescaped.push('\\'),
            },
            _ => unescaped.push(c),
        }
    }
    Some(unescaped)
}

/// Split at every `separator` that is not escaped. Escapes are kept.
fn split_unescaped(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == separator {
            parts.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Comma separated, escaped path elements. Empty for an empty path.
pub fn string_from_path(path: &[Option<String>]) -> String {
    path.iter()
        .map(|element| match element {
            Some(element) => escape_element(element),
            None => NULL_PATH_VALUE.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

pub fn path_from_string(text: &str) -> HierarchyPath {
    split_unescaped(text, ',')
        .into_iter()
        .map(unescape_element)
        .collect()
}

/// `dimension` or `dimension@hierarchy`.
pub fn string_from_hierarchy(dimension: &str, hierarchy: Option<&str>) -> String {
    match hierarchy {
        Some(hierarchy) => format!("{}@{}", escape_element(dimension), escape_element(hierarchy)),
        None => escape_element(dimension),
    }
}

/// Path of plain member keys as used in URLs.
pub fn string_from_hierarchical_path<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|element| escape_element(element.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse `dim[@hier]:payload`, optionally prefixed with `!`.
///
/// An empty range bound is open, so a bound of `[""]` reads back as `None`.
/// Members are taken verbatim; there are no per-dimension converters.
pub fn cut_from_string(text: &str) -> QueryResult<Cut> {
    let parts = split_unescaped(text, ':');
    let [dimspec, payload] = parts.as_slice() else {
        return Err(QueryError::argument(format!(
            "Wrong dimension cut string: '{}'",
            text
        )));
    };

    let captures = DIMENSION_SPEC.captures(dimspec).ok_or_else(|| {
        QueryError::argument(format!(
            "Dimension spec '{}' does not match pattern 'dimension@hierarchy'",
            dimspec
        ))
    })?;
    let invert = captures.name("invert").is_some();
    let dimension = &captures["dim"];
    let hierarchy = captures.name("hier").map(|m| m.as_str());

    let kind = if POINT_PAYLOAD.is_match(payload) {
        // An empty payload is the path [""], not an empty path
        CutKind::Point {
            path: path_from_string(payload),
        }
    } else if SET_PAYLOAD.is_match(payload) {
        CutKind::Set {
            paths: split_unescaped(payload, ';')
                .into_iter()
                .map(path_from_string)
                .collect(),
        }
    } else if let Some(captures) = RANGE_PAYLOAD.captures(payload) {
        let bound = |name: &str| {
            captures
                .name(name)
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
                .map(path_from_string)
        };
        CutKind::Range {
            from: bound("from"),
            to: bound("to"),
        }
    } else {
        return Err(QueryError::argument(format!(
            "Unknown cut format (check that keys consist only of alphanumeric \
             characters and underscore): {}",
            payload
        )));
    };

    let mut cut = Cut::with_kind(dimension, kind).with_hierarchy(hierarchy);
    cut.invert = invert;
    Ok(cut)
}

/// Parse `|` separated cuts. An empty string has no cuts.
pub fn cuts_from_string(text: &str) -> QueryResult<Vec<Cut>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    split_unescaped(text, '|')
        .into_iter()
        .map(cut_from_string)
        .collect()
}

pub fn string_from_cuts(cuts: &[Cut]) -> String {
    cuts.iter()
        .map(Cut::to_string)
        .collect::<Vec<_>>()
        .join("|")
}

fn path_from_value(value: &Value, field: &str) -> QueryResult<HierarchyPath> {
    let items = value.as_array().ok_or_else(|| {
        QueryError::argument(format!("Cut field '{}' should be a list of members", field))
    })?;
    items
        .iter()
        .map(|item| match item {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            Value::Number(n) => Ok(Some(n.to_string())),
            Value::Bool(b) => Ok(Some(b.to_string())),
            other => Err(QueryError::argument(format!(
                "Invalid path member {} in cut field '{}'",
                other, field
            ))),
        })
        .collect()
}

fn optional_path(value: Option<&Value>, field: &str) -> QueryResult<Option<HierarchyPath>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => path_from_value(value, field).map(Some),
    }
}

/// Inverse of [`Cut::to_dict`].
pub fn cut_from_dict(dict: &Value) -> QueryResult<Cut> {
    let text_field = |name: &str| dict.get(name).and_then(Value::as_str);
    let cut_type = text_field("type")
        .ok_or_else(|| QueryError::argument("Cut type is missing"))?
        .to_lowercase();
    let dimension = text_field("dimension")
        .ok_or_else(|| QueryError::argument("Cut dimension is missing"))?;

    let kind = match cut_type.as_str() {
        "point" => CutKind::Point {
            path: optional_path(dict.get("path"), "path")?.unwrap_or_default(),
        },
        "set" => {
            let paths = dict
                .get("paths")
                .and_then(Value::as_array)
                .ok_or_else(|| QueryError::argument("Set cut requires a list of paths"))?;
            CutKind::Set {
                paths: paths
                    .iter()
                    .map(|p| path_from_value(p, "paths"))
                    .collect::<QueryResult<_>>()?,
            }
        }
        "range" => CutKind::Range {
            from: optional_path(dict.get("from"), "from")?,
            to: optional_path(dict.get("to"), "to")?,
        },
        other => {
            return Err(QueryError::argument(format!("Unknown cut type {}", other)));
        }
    };

    let flag = |name: &str| dict.get(name).and_then(Value::as_bool).unwrap_or(false);
    let mut cut = Cut::with_kind(dimension, kind).with_hierarchy(text_field("hierarchy"));
    cut.invert = flag("invert");
    cut.hidden = flag("hidden");
    Ok(cut)
}

/// Split `dimension@hierarchy:level` into its parts.
pub fn string_to_dimension_level(
    text: &str,
) -> QueryResult<(String, Option<String>, Option<String>)> {
    static DRILLDOWN_LEVEL: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(?P<dim>\w+)(@(?P<hier>\w+))?(:(?P<level>\w+))?$").unwrap()
    });

    if text.is_empty() {
        return Err(QueryError::argument("Drilldown string should not be empty"));
    }
    let captures = DRILLDOWN_LEVEL.captures(text).ok_or_else(|| {
        QueryError::argument(format!(
            "String '{}' does not match drilldown level pattern 'dimension@hierarchy:level'",
            text
        ))
    })?;
    let part = |name: &str| captures.name(name).map(|m| m.as_str().to_string());
    Ok((captures["dim"].to_string(), part("hier"), part("level")))
}
