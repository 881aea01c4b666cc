//! Parameter values, bags and parsed argument buckets

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Keys that never reach a task body: positionals holder and program name
pub const RESERVED_KEYS: [&str; 2] = ["_", "$0"];

/// A single parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean flag (`--flag`, `--no-flag`)
    Bool(bool),
    /// Numeric value, `NaN` when a forced number could not be parsed
    Num(f64),
    /// Raw string value
    Str(String),
}

impl ParamValue {
    /// Returns the string if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean if this is a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the number if this is a numeric value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns true for a numeric `NaN`
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Num(n) if n.is_nan())
    }

    /// Name of the value's type, as shown in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Num(_) => "number",
            Self::Str(_) => "string",
        }
    }

    /// Convert a scalar JSON value; arrays, objects and null have no equivalent
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Num),
            serde_json::Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Str(s) => f.write_str(s),
            Self::Num(n) if n.is_infinite() => {
                f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Self::Num(n) => write!(f, "{n}"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        Self::Num(n)
    }
}

impl From<i32> for ParamValue {
    fn from(n: i32) -> Self {
        Self::Num(f64::from(n))
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        Self::Num(n as f64)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// Flat mapping from parameter name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamBag(BTreeMap<String, ParamValue>);

impl ParamBag {
    /// Create an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, returning the previous value
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Option<ParamValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Get a parameter
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Get a parameter as a string slice
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ParamValue::as_str)
    }

    /// Remove a parameter
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.0.remove(key)
    }

    /// Check whether a parameter is set
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the bag is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over parameters in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Iterate over parameter names in key order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Layer `other` on top of this bag; keys in `other` win
    pub fn merge(&mut self, other: &ParamBag) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Merge layers from lowest to highest precedence into a new bag
    pub fn layered<'a, I>(layers: I) -> Self
    where
        I: IntoIterator<Item = &'a ParamBag>,
    {
        let mut merged = Self::new();
        for layer in layers {
            merged.merge(layer);
        }
        merged
    }

    /// Remove the reserved keys
    pub fn strip_reserved(&mut self) {
        for key in RESERVED_KEYS {
            self.0.remove(key);
        }
    }

    /// Copy of this bag without the reserved keys
    pub fn without_reserved(&self) -> Self {
        let mut bag = self.clone();
        bag.strip_reserved();
        bag
    }

    /// Render as flag syntax (`--key=value`) for labels, reserved keys skipped.
    ///
    /// Booleans render as `--key` / `--no-key`. Output parses back to the same
    /// bag for values without whitespace, up to numeric coercion of
    /// numeric-looking strings. Strings that are empty or contain whitespace
    /// are shown quoted and escaped; flag strings are split on whitespace only,
    /// so those labels do not parse back. A `NaN` number renders as `NaN`.
    pub fn to_flags(&self) -> String {
        self.0
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| match value {
                ParamValue::Bool(true) => format!("--{key}"),
                ParamValue::Bool(false) => format!("--no-{key}"),
                ParamValue::Str(s) if s.is_empty() || s.contains(char::is_whitespace) => {
                    format!("--{key}={s:?}")
                }
                other => format!("--{key}={other}"),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ParamBag {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<ParamValue>, const N: usize> From<[(K, V); N]> for ParamBag {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl IntoIterator for ParamBag {
    type Item = (String, ParamValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ParamBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_flags())
    }
}

/// Parameter bags keyed by task name; `None` holds untargeted parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArgs(IndexMap<Option<String>, ParamBag>);

impl ParsedArgs {
    /// Create parsed args holding only an empty untargeted bucket
    pub fn new() -> Self {
        let mut buckets = IndexMap::new();
        buckets.insert(None, ParamBag::new());
        Self(buckets)
    }

    /// Wrap a bag as the untargeted bucket
    pub fn untargeted_only(bag: ParamBag) -> Self {
        let mut buckets = IndexMap::new();
        buckets.insert(None, bag);
        Self(buckets)
    }

    /// Set the bag for a bucket
    pub fn insert(&mut self, task: Option<String>, bag: ParamBag) {
        self.0.insert(task, bag);
    }

    /// Parameters that preceded any task name
    pub fn untargeted(&self) -> Option<&ParamBag> {
        self.0.get(&None)
    }

    /// Parameters for a named task
    pub fn task(&self, name: &str) -> Option<&ParamBag> {
        self.0.get(&Some(name.to_string()))
    }

    /// Look up a bucket by optional task name
    pub fn get(&self, task: Option<&str>) -> Option<&ParamBag> {
        self.0.get(&task.map(str::to_string))
    }

    /// Task names in the order they first appeared
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().filter_map(|k| k.as_deref())
    }

    /// Iterate over buckets in the order they first appeared
    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &ParamBag)> {
        self.0.iter().map(|(k, v)| (k.as_deref(), v))
    }

    /// Number of buckets, the untargeted one included
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no buckets at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ParsedArgs {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<(Option<String>, ParamBag)> for ParsedArgs {
    fn from_iter<T: IntoIterator<Item = (Option<String>, ParamBag)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for ParsedArgs {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (task, bag) in &self.0 {
            map.serialize_entry(task.as_deref().unwrap_or("null"), bag)?;
        }
        map.end()
    }
}

/// Any accepted shape of parameter input
#[derive(Debug, Clone)]
pub enum ParamSource {
    /// Already-parsed flat mapping
    Bag(ParamBag),
    /// Already-bucketed mapping using the untargeted-key convention
    Parsed(ParsedArgs),
    /// Pre-split tokens
    Tokens(Vec<String>),
    /// Whitespace-separated flag string
    Line(String),
    /// Dynamically typed input, validated at parse time
    Json(serde_json::Value),
}

impl ParamSource {
    /// Short name of the input shape, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bag(_) | Self::Parsed(_) => "object",
            Self::Tokens(_) => "array",
            Self::Line(_) => "string",
            Self::Json(value) => json_type_name(value),
        }
    }
}

/// JavaScript-style type name of a JSON value
pub fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl From<ParamBag> for ParamSource {
    fn from(bag: ParamBag) -> Self {
        Self::Bag(bag)
    }
}

impl From<ParsedArgs> for ParamSource {
    fn from(parsed: ParsedArgs) -> Self {
        Self::Parsed(parsed)
    }
}

impl From<&str> for ParamSource {
    fn from(line: &str) -> Self {
        Self::Line(line.to_string())
    }
}

impl From<String> for ParamSource {
    fn from(line: String) -> Self {
        Self::Line(line)
    }
}

impl From<Vec<String>> for ParamSource {
    fn from(tokens: Vec<String>) -> Self {
        Self::Tokens(tokens)
    }
}

impl From<Vec<&str>> for ParamSource {
    fn from(tokens: Vec<&str>) -> Self {
        Self::Tokens(tokens.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for ParamSource {
    fn from(tokens: &[&str]) -> Self {
        Self::Tokens(tokens.iter().map(|t| t.to_string()).collect())
    }
}

impl From<serde_json::Value> for ParamSource {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}
