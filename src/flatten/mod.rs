//! Schema-driven flattening of nested JSON into relational tables
//!
//! A schema is a list of [`TableResolver`]s. Each resolver names a table,
//! a path of [`Matcher`]s selecting nodes in the document, and the columns
//! to resolve from every selected node. [`JsonFlattener`] validates the
//! resolvers and walks the document once, appending a row each time a
//! resolver's path is fully matched.

pub mod types;
pub mod value;
pub mod matcher;
pub mod schema;
pub mod engine;
pub mod envelope;
pub mod writer;

pub use types::{FlattenConfig, Key, ResolvedValue, Row, Segment, Table, Tables};
pub use value::{resolve_value, ValueResolver};
pub use matcher::{matches, update_captures, CaptureSpec, Captures, Matcher, RegexpMatcher};
pub use schema::{validate, ResolverColumns, Schema, SchemaError, SchemaRule, TableResolver};
pub use engine::JsonFlattener;
pub use envelope::{parse_schema, SchemaEnvelope, SCHEMA_VERSION};
pub use writer::{ExportFormat, SingleWriter, TableWriter};
