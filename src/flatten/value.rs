//! Cell value resolution
//!
//! A [`ValueResolver`] describes where a cell's value lives relative to the
//! node that completed a match: the node itself, a relative path below it, or
//! a path below one of its ancestors.

use crate::flatten::types::{ResolvedValue, Segment};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How to compute one cell value relative to a resolution root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueResolver {
    /// Fall back to the resolution root itself when the path yields nothing
    #[serde(rename = "self", default, skip_serializing_if = "std::ops::Not::not")]
    pub include_self: bool,

    /// Relative path from the resolution root
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Segment>,

    /// Start at an ancestor instead of the current node.
    /// `0..` counts down from the document root, `..-1` counts up from the current depth.
    #[serde(
        rename = "startAtAncestor",
        alias = "ancestorOffset",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ancestor_offset: Option<i64>,
}

impl ValueResolver {
    /// Resolve `path` below the current node
    pub fn path<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Segment>,
    {
        ValueResolver {
            path: path.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Resolve to the current node itself
    pub fn this() -> Self {
        ValueResolver {
            include_self: true,
            ..Default::default()
        }
    }

    pub fn from_ancestor(mut self, offset: i64) -> Self {
        self.ancestor_offset = Some(offset);
        self
    }

    pub fn or_self(mut self) -> Self {
        self.include_self = true;
        self
    }
}

/// Resolve a cell value for `node`.
///
/// `ancestors` is the chain of containers from the document root down to the
/// parent of `node`. Resolution never fails: every structural mismatch yields
/// [`ResolvedValue::Missing`].
pub fn resolve_value(node: &Value, ancestors: &[&Value], resolver: &ValueResolver) -> ResolvedValue {
    let root = match resolver.ancestor_offset {
        None => Some(node),
        Some(offset) => ancestor_at(ancestors, offset),
    };
    let Some(root) = root else {
        return ResolvedValue::Missing;
    };

    let found = if resolver.path.is_empty() {
        None
    } else {
        extract_value(root, &resolver.path)
    };

    coerce(found.or(if resolver.include_self { Some(root) } else { None }))
}

fn ancestor_at<'d>(ancestors: &[&'d Value], offset: i64) -> Option<&'d Value> {
    let index = if offset >= 0 {
        usize::try_from(offset).ok()?
    } else {
        let back = usize::try_from(offset.unsigned_abs()).ok()?;
        ancestors.len().checked_sub(back)?
    };
    ancestors.get(index).copied()
}

/// Walk `path` from `root`; index segments only step into arrays, name segments only into objects
fn extract_value<'d>(root: &'d Value, path: &[Segment]) -> Option<&'d Value> {
    path.iter().try_fold(root, |current, segment| match (segment, current) {
        (Segment::Index(index), Value::Array(items)) => items.get(*index),
        (Segment::Name(name), Value::Object(fields)) => fields.get(name),
        _ => None,
    })
}

fn coerce(value: Option<&Value>) -> ResolvedValue {
    match value {
        None => ResolvedValue::Missing,
        Some(Value::Number(n)) => ResolvedValue::Number(n.clone()),
        Some(Value::String(s)) => ResolvedValue::String(s.clone()),
        Some(other) => ResolvedValue::String(other.to_string()),
    }
}
