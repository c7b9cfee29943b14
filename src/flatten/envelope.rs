//! Versioned schema files
//!
//! A serialized schema wraps the table resolvers in an envelope carrying a
//! format version; only version "2" is understood.

use crate::flatten::schema::TableResolver;
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only schema format version this crate reads
pub const SCHEMA_VERSION: &str = "2";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEnvelope {
    pub version: String,
    pub resolvers: Vec<TableResolver>,
}

impl SchemaEnvelope {
    pub fn new(resolvers: Vec<TableResolver>) -> Self {
        SchemaEnvelope {
            version: SCHEMA_VERSION.to_string(),
            resolvers,
        }
    }
}

/// Decode a schema file into its table resolvers
pub fn parse_schema(text: &str) -> Result<Vec<TableResolver>> {
    let raw: Value = serde_json::from_str(text).context("Invalid schema syntax")?;

    if raw.get("version").and_then(Value::as_str) != Some(SCHEMA_VERSION) {
        bail!("Unsupported schema version.");
    }

    let resolvers = raw
        .get("resolvers")
        .filter(|r| r.is_array())
        .ok_or_else(|| anyhow!("Schema has no table resolvers."))?;

    Vec::<TableResolver>::deserialize(resolvers).context("Invalid table resolver definition")
}
