//! # Tabula - Relational Flattening for JSON
//!
//! Converts an arbitrary nested JSON document into one or more flat tables,
//! guided by a declarative schema of path-matching rules.
//!
//! ## Modules
//!
//! - **flatten**: matchers, value resolution, schema validation and the traversal engine
//! - **flatten::writer**: JSON Lines and CSV export of the resulting tables
//!
//! ## Quick Start
//!
//! ```rust
//! use tabula::flatten::{JsonFlattener, Matcher, TableResolver, ValueResolver};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let data = json!({
//!     "users": {
//!         "u1": {"name": "Ann"},
//!         "u2": {"name": "Bo"}
//!     }
//! });
//!
//! let resolvers = vec![TableResolver::new("users")
//!     .matcher(Matcher::literal("users"))
//!     .matcher(Matcher::regexp(".*", "").capture_key_as("id"))
//!     .column("name", ValueResolver::path(["name"]))];
//!
//! let tables = JsonFlattener::default().flatten(&data, &resolvers)?;
//!
//! // users: header [id, name], rows (u1, Ann), (u2, Bo)
//! assert_eq!(tables.get("users").map(|t| t.len()), Some(2));
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::Read;

pub mod flatten;

// Re-export commonly used types for convenience
pub use flatten::{
    parse_schema, FlattenConfig, JsonFlattener, Matcher, ResolvedValue, Schema, SchemaError, Table,
    TableResolver, Tables, ValueResolver,
};

/// Main entry point: read one JSON document and flatten it with `resolvers`
pub fn flatten_json<R: Read>(
    reader: R,
    resolvers: &[TableResolver],
    config: FlattenConfig,
) -> Result<Tables> {
    let document: Value = serde_json::from_reader(reader).context("Failed to parse JSON")?;

    let flattener = JsonFlattener::new(config);
    let tables = flattener.flatten(&document, resolvers)?;

    Ok(tables)
}
