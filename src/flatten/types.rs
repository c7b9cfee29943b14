use crate::flatten::schema::Schema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// A key of a document entry: an array index or an object field name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key<'a> {
    Index(usize),
    Name(&'a str),
}

impl<'a> Key<'a> {
    /// Textual form of the key, as seen by regexp matchers
    pub fn as_text(&self) -> Cow<'a, str> {
        match *self {
            Key::Index(index) => Cow::Owned(index.to_string()),
            Key::Name(name) => Cow::Borrowed(name),
        }
    }
}

impl fmt::Display for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(index) => write!(f, "{}", index),
            Key::Name(name) => f.write_str(name),
        }
    }
}

/// An owned path segment, used by literal matchers and value resolver paths
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    Index(usize),
    Name(String),
}

impl Segment {
    /// Strict equality: an index segment never equals a field name, even "0"
    pub fn matches_key(&self, key: Key<'_>) -> bool {
        match (self, key) {
            (Segment::Index(a), Key::Index(b)) => *a == b,
            (Segment::Name(a), Key::Name(b)) => a == b,
            _ => false,
        }
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

impl From<&str> for Segment {
    fn from(name: &str) -> Self {
        Segment::Name(name.to_string())
    }
}

impl From<String> for Segment {
    fn from(name: String) -> Self {
        Segment::Name(name)
    }
}

/// The content of one table cell
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResolvedValue {
    Number(Number),
    String(String),
    /// No value; serialized as `null`
    #[default]
    Missing,
}

impl ResolvedValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, ResolvedValue::Missing)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResolvedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            ResolvedValue::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Join `other` onto this value with `delimiter`.
    ///
    /// A missing value on either side contributes nothing, so the first
    /// capture keeps its original type and later ones turn the cell into a
    /// delimited string.
    pub fn append(&mut self, other: ResolvedValue, delimiter: &str) {
        if other.is_missing() {
            return;
        }
        if self.is_missing() {
            *self = other;
            return;
        }
        *self = ResolvedValue::String(format!("{}{}{}", self, delimiter, other));
    }

    pub fn to_json(&self) -> Value {
        match self {
            ResolvedValue::Number(n) => Value::Number(n.clone()),
            ResolvedValue::String(s) => Value::String(s.clone()),
            ResolvedValue::Missing => Value::Null,
        }
    }
}

/// Missing values display as the empty string
impl fmt::Display for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedValue::Number(n) => write!(f, "{}", n),
            ResolvedValue::String(s) => f.write_str(s),
            ResolvedValue::Missing => Ok(()),
        }
    }
}

impl From<Key<'_>> for ResolvedValue {
    fn from(key: Key<'_>) -> Self {
        match key {
            Key::Index(index) => ResolvedValue::Number(Number::from(index)),
            Key::Name(name) => ResolvedValue::String(name.to_string()),
        }
    }
}

impl From<&str> for ResolvedValue {
    fn from(s: &str) -> Self {
        ResolvedValue::String(s.to_string())
    }
}

impl From<String> for ResolvedValue {
    fn from(s: String) -> Self {
        ResolvedValue::String(s)
    }
}

impl From<i64> for ResolvedValue {
    fn from(n: i64) -> Self {
        ResolvedValue::Number(Number::from(n))
    }
}

static MISSING: ResolvedValue = ResolvedValue::Missing;

/// One extracted row: column name to cell value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, ResolvedValue>);

impl Row {
    pub fn new() -> Self {
        Row(BTreeMap::new())
    }

    /// Value of `column`, or `Missing` when the row has no such cell
    pub fn get(&self, column: &str) -> &ResolvedValue {
        self.0.get(column).unwrap_or(&MISSING)
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: ResolvedValue) {
        self.0.insert(column.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResolvedValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, ResolvedValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, ResolvedValue)>>(iter: I) -> Self {
        Row(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// An output table: a header fixed by the schema and rows in match order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    header: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(header: Vec<String>) -> Self {
        Table {
            header,
            rows: Vec::new(),
        }
    }

    /// Column names, captures first, in a stable order
    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of `row` in header order
    pub fn cells<'t>(&'t self, row: &'t Row) -> impl Iterator<Item = &'t ResolvedValue> + 't {
        self.header.iter().map(move |column| row.get(column))
    }

    /// `row` as a JSON object in header order, missing cells as `null`
    pub fn record(&self, row: &Row) -> Map<String, Value> {
        self.header
            .iter()
            .map(|column| (column.clone(), row.get(column).to_json()))
            .collect()
    }

    pub(crate) fn push(&mut self, row: Row) {
        self.rows.push(row);
    }
}

/// All tables produced by one flatten run, keyed by table name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tables(BTreeMap<String, Table>);

impl Tables {
    /// Empty tables for every table name the schema targets
    pub fn from_schema(schema: &Schema<'_>) -> Self {
        Tables(
            schema
                .headers()
                .iter()
                .map(|(name, header)| (name.clone(), Table::new(header.clone())))
                .collect(),
        )
    }

    pub fn get(&self, table_name: &str) -> Option<&Table> {
        self.0.get(table_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, Table> {
        self.0
    }

    /// Append `row` to the end of `table_name`; no deduplication
    pub fn append_row(&mut self, table_name: &str, row: Row) {
        match self.0.get_mut(table_name) {
            Some(table) => table.push(row),
            None => {
                let mut table = Table::new(row.iter().map(|(c, _)| c.to_string()).collect());
                table.push(row);
                self.0.insert(table_name.to_string(), table);
            }
        }
    }
}

/// Configuration for the flattening process
#[derive(Debug, Clone, Default)]
pub struct FlattenConfig {
    /// Deepest container level the traversal enters (root = 0). `None` means no limit.
    pub max_depth: Option<usize>,

    /// Let wildcards in the middle of a path match zero levels, not only a leading one
    pub interior_zero_length_wildcards: bool,
}
