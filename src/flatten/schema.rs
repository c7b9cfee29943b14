//! Table resolver definitions and their validation

use crate::flatten::matcher::Matcher;
use crate::flatten::value::ValueResolver;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

/// A rule extracting rows for a named table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResolver {
    pub table_name: String,
    pub path: Vec<Matcher>,
    #[serde(default)]
    pub columns: BTreeMap<String, ValueResolver>,
}

impl TableResolver {
    pub fn new(table_name: impl Into<String>) -> Self {
        TableResolver {
            table_name: table_name.into(),
            path: Vec::new(),
            columns: BTreeMap::new(),
        }
    }

    pub fn matcher(mut self, matcher: Matcher) -> Self {
        self.path.push(matcher);
        self
    }

    pub fn column(mut self, name: impl Into<String>, resolver: ValueResolver) -> Self {
        self.columns.insert(name.into(), resolver);
        self
    }
}

/// The structural rule a table resolver broke
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaRule {
    #[error("Path must not be empty.")]
    EmptyPath,

    #[error("Path must not end with a wildcard matcher.")]
    TrailingWildcard,

    #[error("Path must not contain two consecutive wildcard matchers (at position {position}).")]
    ConsecutiveWildcards { position: usize },

    #[error("Two path matchers write to the column {column}")]
    DuplicateCapture { column: String },

    #[error("A path matcher and a value column write to the column {column}")]
    CaptureValueConflict { column: String },

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// A table resolver failed validation; nothing is flattened
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Error in table resolver {table_name}: {rule}")]
pub struct SchemaError {
    pub table_name: String,
    pub rule: SchemaRule,
}

impl SchemaError {
    fn new(resolver: &TableResolver, rule: SchemaRule) -> Self {
        SchemaError {
            table_name: resolver.table_name.clone(),
            rule,
        }
    }
}

/// Columns one resolver writes, in header order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverColumns {
    /// Columns written by path matcher captures, in path order
    pub capture_columns: Vec<String>,
    /// Declared value columns
    pub value_columns: Vec<String>,
}

/// Check `resolver` for structural well-formedness, stopping at the first violation
pub fn validate(resolver: &TableResolver) -> Result<ResolverColumns, SchemaError> {
    let Some(last) = resolver.path.last() else {
        return Err(SchemaError::new(resolver, SchemaRule::EmptyPath));
    };
    if last.is_wildcard() {
        return Err(SchemaError::new(resolver, SchemaRule::TrailingWildcard));
    }

    if let Some(position) = resolver
        .path
        .windows(2)
        .position(|pair| pair[0].is_wildcard() && pair[1].is_wildcard())
    {
        return Err(SchemaError::new(
            resolver,
            SchemaRule::ConsecutiveWildcards { position: position + 1 },
        ));
    }

    let mut seen = BTreeSet::new();
    let mut capture_columns = Vec::new();
    for column in resolver
        .path
        .iter()
        .filter_map(Matcher::capture)
        .flat_map(|spec| spec.column_names())
    {
        if !seen.insert(column) {
            return Err(SchemaError::new(
                resolver,
                SchemaRule::DuplicateCapture {
                    column: column.to_string(),
                },
            ));
        }
        capture_columns.push(column.to_string());
    }

    let mut value_columns = Vec::with_capacity(resolver.columns.len());
    for column in resolver.columns.keys() {
        if seen.contains(column.as_str()) {
            return Err(SchemaError::new(
                resolver,
                SchemaRule::CaptureValueConflict {
                    column: column.clone(),
                },
            ));
        }
        value_columns.push(column.clone());
    }

    for matcher in &resolver.path {
        if let Matcher::Regexp(re) = matcher {
            re.regex().map_err(|message| {
                SchemaError::new(
                    resolver,
                    SchemaRule::InvalidPattern {
                        pattern: re.pattern.clone(),
                        message,
                    },
                )
            })?;
        }
    }

    Ok(ResolverColumns {
        capture_columns,
        value_columns,
    })
}

/// A validated set of table resolvers with per-table headers
#[derive(Debug, Clone)]
pub struct Schema<'r> {
    resolvers: &'r [TableResolver],
    headers: BTreeMap<String, Vec<String>>,
}

impl<'r> Schema<'r> {
    /// Validate every resolver and compute each table's header.
    ///
    /// A header is the ordered union of capture and value columns over all
    /// resolvers targeting that table; it depends only on the schema.
    pub fn validate(resolvers: &'r [TableResolver]) -> Result<Self, SchemaError> {
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for resolver in resolvers {
            let columns = validate(resolver)?;
            let header = headers.entry(resolver.table_name.clone()).or_default();
            for column in columns.capture_columns.into_iter().chain(columns.value_columns) {
                if !header.contains(&column) {
                    header.push(column);
                }
            }
        }

        debug!(
            resolvers = resolvers.len(),
            tables = headers.len(),
            "validated table resolvers"
        );

        Ok(Schema { resolvers, headers })
    }

    pub fn resolvers(&self) -> &'r [TableResolver] {
        self.resolvers
    }

    pub fn resolver(&self, index: usize) -> &'r TableResolver {
        &self.resolvers[index]
    }

    pub fn headers(&self) -> &BTreeMap<String, Vec<String>> {
        &self.headers
    }

    pub fn header(&self, table_name: &str) -> Option<&[String]> {
        self.headers.get(table_name).map(Vec::as_slice)
    }
}
