//! The traversal engine
//!
//! Walks the document depth-first once, carrying a frontier of partially
//! matched table resolvers. Each entry of a container tests every candidate
//! in the frontier; candidates that match either complete a row or move on,
//! into a child frontier private to that entry.

use crate::flatten::matcher::{matches, update_captures, Captures};
use crate::flatten::schema::{Schema, SchemaError, TableResolver};
use crate::flatten::types::{FlattenConfig, Key, Row, Tables};
use crate::flatten::value::resolve_value;
use serde_json::Value;
use tracing::{debug, trace, warn};

/// Flattens documents into tables according to a set of table resolvers
#[derive(Debug, Clone, Default)]
pub struct JsonFlattener {
    config: FlattenConfig,
}

/// A partially matched resolver: `next` indexes the matcher still to satisfy
#[derive(Debug, Clone)]
struct Candidate {
    resolver: usize,
    next: usize,
    captures: Captures,
}

impl JsonFlattener {
    pub fn new(config: FlattenConfig) -> Self {
        JsonFlattener { config }
    }

    pub fn config(&self) -> &FlattenConfig {
        &self.config
    }

    /// Validate `resolvers`, then flatten `document` with them
    pub fn flatten(&self, document: &Value, resolvers: &[TableResolver]) -> Result<Tables, SchemaError> {
        let schema = Schema::validate(resolvers)?;
        Ok(self.flatten_with_schema(document, &schema))
    }

    /// Flatten `document` with an already validated schema. Never fails.
    pub fn flatten_with_schema(&self, document: &Value, schema: &Schema<'_>) -> Tables {
        let mut walk = Walk {
            schema,
            config: &self.config,
            tables: Tables::from_schema(schema),
            ancestors: Vec::new(),
        };

        let frontier = walk.initial_frontier();
        walk.visit(document, &frontier);

        let tables = walk.tables;
        debug!(
            tables = tables.len(),
            rows = tables.iter().map(|(_, t)| t.len()).sum::<usize>(),
            "flattened document"
        );
        tables
    }
}

struct Walk<'s, 'd> {
    schema: &'s Schema<'s>,
    config: &'s FlattenConfig,
    tables: Tables,
    /// Containers from the document root down to the node being visited
    ancestors: Vec<&'d Value>,
}

impl<'s, 'd> Walk<'s, 'd> {
    /// One candidate per resolver, plus one past a leading wildcard so it may match zero levels
    fn initial_frontier(&self) -> Vec<Candidate> {
        let mut frontier = Vec::with_capacity(self.schema.resolvers().len());
        for (index, resolver) in self.schema.resolvers().iter().enumerate() {
            frontier.push(Candidate {
                resolver: index,
                next: 0,
                captures: Captures::new(),
            });
            if resolver.path[0].is_wildcard() {
                frontier.push(Candidate {
                    resolver: index,
                    next: 1,
                    captures: Captures::new(),
                });
            }
        }
        frontier
    }

    fn visit(&mut self, node: &'d Value, frontier: &[Candidate]) {
        if let Some(limit) = self.config.max_depth {
            if self.ancestors.len() > limit && !is_scalar(node) {
                warn!(depth = self.ancestors.len(), limit, "depth limit reached, skipping subtree");
                return;
            }
        }

        self.ancestors.push(node);
        match node {
            Value::Array(items) => {
                for (index, value) in items.iter().enumerate() {
                    self.visit_entry(Key::Index(index), value, frontier);
                }
            }
            Value::Object(fields) => {
                for (name, value) in fields {
                    self.visit_entry(Key::Name(name), value, frontier);
                }
            }
            _ => {}
        }
        self.ancestors.pop();
    }

    fn visit_entry(&mut self, key: Key<'d>, value: &'d Value, frontier: &[Candidate]) {
        let schema = self.schema;
        let mut children = Vec::new();

        for candidate in frontier {
            let resolver = schema.resolver(candidate.resolver);
            let matcher = &resolver.path[candidate.next];
            if !matches(key, matcher) {
                continue;
            }

            let captures = update_captures(key, value, &self.ancestors, matcher, &candidate.captures);

            if candidate.next + 1 == resolver.path.len() {
                let row = resolve_row(value, &self.ancestors, resolver, &captures);
                trace!(table = %resolver.table_name, key = %key, "row completed");
                self.tables.append_row(&resolver.table_name, row);
                continue;
            }

            let wildcard = matcher.is_wildcard();
            if wildcard {
                children.push(Candidate {
                    resolver: candidate.resolver,
                    next: candidate.next,
                    captures: captures.clone(),
                });
            }
            self.advance(&mut children, candidate.resolver, candidate.next + 1, captures);
        }

        if !children.is_empty() {
            self.visit(value, &children);
        }
    }

    /// Push a candidate waiting on matcher `next`. With interior zero-length
    /// wildcards enabled, landing on a wildcard also spawns the state past it.
    fn advance(&self, children: &mut Vec<Candidate>, resolver: usize, next: usize, captures: Captures) {
        let skip_wildcard = self.config.interior_zero_length_wildcards
            && self.schema.resolver(resolver).path[next].is_wildcard();
        if skip_wildcard {
            children.push(Candidate {
                resolver,
                next: next + 1,
                captures: captures.clone(),
            });
        }
        children.push(Candidate {
            resolver,
            next,
            captures,
        });
    }
}

fn is_scalar(node: &Value) -> bool {
    !matches!(node, Value::Array(_) | Value::Object(_))
}

/// Build a row from the captures and the resolver's value columns
fn resolve_row(node: &Value, ancestors: &[&Value], resolver: &TableResolver, captures: &Captures) -> Row {
    let mut row: Row = captures
        .iter()
        .map(|(column, value)| (column, value.clone()))
        .collect();
    for (column, value_resolver) in &resolver.columns {
        row.insert(column.as_str(), resolve_value(node, ancestors, value_resolver));
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::matcher::{CaptureSpec, Matcher};
    use crate::flatten::schema::SchemaRule;
    use crate::flatten::types::ResolvedValue;
    use crate::flatten::value::ValueResolver;
    use serde_json::json;

    fn flatten(document: &Value, resolvers: &[TableResolver]) -> Tables {
        JsonFlattener::default().flatten(document, resolvers).unwrap()
    }

    fn column(tables: &Tables, table: &str, column: &str) -> Vec<ResolvedValue> {
        tables
            .get(table)
            .unwrap()
            .rows()
            .iter()
            .map(|row| row.get(column).clone())
            .collect()
    }

    fn strings(values: &[&str]) -> Vec<ResolvedValue> {
        values.iter().map(|v| ResolvedValue::from(*v)).collect()
    }

    fn numbers(values: &[i64]) -> Vec<ResolvedValue> {
        values.iter().map(|v| ResolvedValue::from(*v)).collect()
    }

    fn users_resolver() -> TableResolver {
        TableResolver::new("users")
            .matcher(Matcher::literal("users"))
            .matcher(Matcher::regexp(".*", "").capture_key_as("id"))
            .column("name", ValueResolver::path(["name"]))
    }

    #[test]
    fn test_users_example() {
        let document = json!({"users": {"u1": {"name": "Ann"}, "u2": {"name": "Bo"}}});
        let tables = flatten(&document, &[users_resolver()]);

        let users = tables.get("users").unwrap();
        assert_eq!(users.header(), ["id", "name"]);
        assert_eq!(users.len(), 2);
        assert_eq!(users.rows()[0].get("id"), &ResolvedValue::from("u1"));
        assert_eq!(users.rows()[0].get("name"), &ResolvedValue::from("Ann"));
        assert_eq!(users.rows()[1].get("id"), &ResolvedValue::from("u2"));
        assert_eq!(users.rows()[1].get("name"), &ResolvedValue::from("Bo"));
    }

    #[test]
    fn test_missing_field_example() {
        let document = json!({"x": {}});
        let resolver = TableResolver::new("t")
            .matcher(Matcher::literal("x"))
            .column("v", ValueResolver::path(["missing"]));
        let tables = flatten(&document, &[resolver]);

        let table = tables.get("t").unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.rows()[0].contains_column("v"));
        assert!(table.rows()[0].get("v").is_missing());
    }

    #[test]
    fn test_rows_follow_document_order() {
        let document = json!({
            "groups": [
                {"items": [{"v": 1}, {"v": 2}]},
                {"items": []},
                {"items": [{"v": 3}]}
            ]
        });
        let resolver = TableResolver::new("items")
            .matcher(Matcher::literal("groups"))
            .matcher(Matcher::index().capture_key_as("group"))
            .matcher(Matcher::literal("items"))
            .matcher(Matcher::index())
            .column("v", ValueResolver::path(["v"]));
        let tables = flatten(&document, &[resolver]);

        let values = column(&tables, "items", "v");
        assert_eq!(values, numbers(&[1, 2, 3]));
        let groups = column(&tables, "items", "group");
        assert_eq!(groups, numbers(&[0, 0, 2]));
    }

    #[test]
    fn test_object_keys_keep_declaration_order() {
        let document: Value = serde_json::from_str(r#"{"zeta": 1, "alpha": 2, "mid": 3}"#).unwrap();
        let resolver = TableResolver::new("t")
            .matcher(Matcher::regexp(".", "").capture_key_as("k"));
        let tables = flatten(&document, &[resolver]);
        let keys = column(&tables, "t", "k");
        assert_eq!(keys, strings(&["zeta", "alpha", "mid"]));
    }

    #[test]
    fn test_partial_matches_produce_no_rows() {
        let document = json!({"a": {"b": 1}, "b": 2, "x": {"a": 3}});
        let resolver = TableResolver::new("t")
            .matcher(Matcher::literal("a"))
            .matcher(Matcher::literal("b"))
            .column("v", ValueResolver::this());
        let tables = flatten(&document, &[resolver]);
        assert_eq!(column(&tables, "t", "v"), numbers(&[1]));
    }

    #[test]
    fn test_rows_only_at_exact_depth() {
        let document = json!({"a": {"a": {"a": 1}}});
        let resolver = TableResolver::new("t")
            .matcher(Matcher::literal("a"))
            .matcher(Matcher::literal("a"))
            .column("v", ValueResolver::this());
        let tables = flatten(&document, &[resolver]);
        assert_eq!(column(&tables, "t", "v"), strings(&[r#"{"a":1}"#]));
    }

    #[test]
    fn test_leading_wildcard_matches_zero_or_more_levels() {
        let document = json!({
            "id": "top",
            "children": {"id": "mid", "deeper": {"id": "low"}}
        });
        let resolver = TableResolver::new("ids")
            .matcher(Matcher::wildcard())
            .matcher(Matcher::literal("id"))
            .column("id", ValueResolver::this());
        let tables = flatten(&document, &[resolver]);
        let ids = column(&tables, "ids", "id");
        assert_eq!(ids, strings(&["top", "mid", "low"]));
    }

    #[test]
    fn test_interior_wildcard_needs_one_level_by_default() {
        let document = json!({"root": {"leaf": 1, "x": {"leaf": 2, "y": {"leaf": 3}}}});
        let resolver = TableResolver::new("t")
            .matcher(Matcher::literal("root"))
            .matcher(Matcher::wildcard())
            .matcher(Matcher::literal("leaf"))
            .column("v", ValueResolver::this());

        let tables = flatten(&document, &[resolver.clone()]);
        let values = column(&tables, "t", "v");
        assert_eq!(values, numbers(&[2, 3]));

        let config = FlattenConfig {
            interior_zero_length_wildcards: true,
            ..Default::default()
        };
        let tables = JsonFlattener::new(config).flatten(&document, &[resolver]).unwrap();
        let values = column(&tables, "t", "v");
        assert_eq!(values, numbers(&[1, 2, 3]));
    }

    #[test]
    fn test_wildcard_capture_accumulates_across_levels() {
        let document = json!({"a": {"b": {"c": {"leaf": true}}}});
        let resolver = TableResolver::new("t")
            .matcher(Matcher::wildcard().capture_key_as("c"))
            .matcher(Matcher::literal("leaf"));
        let tables = flatten(&document, &[resolver]);
        assert_eq!(column(&tables, "t", "c"), strings(&["a,b,c"]));
    }

    #[test]
    fn test_wildcard_column_capture_reads_each_level() {
        let document = json!({
            "name": "root",
            "sub": {"name": "docs", "sub": {"name": "api", "page": "index"}}
        });
        let resolver = TableResolver::new("pages")
            .matcher(
                Matcher::wildcard().with_capture(
                    CaptureSpec::default()
                        .column("trail", ValueResolver::path(["name"]))
                        .delimiter(" > "),
                ),
            )
            .matcher(Matcher::literal("page"))
            .column("page", ValueResolver::this());
        let tables = flatten(&document, &[resolver]);
        assert_eq!(column(&tables, "pages", "trail"), strings(&["docs > api"]));
    }

    #[test]
    fn test_sibling_branches_do_not_share_captures() {
        let document = json!({"a": {"x": {"v": 1}}, "b": {"y": {"v": 2}}});
        let resolver = TableResolver::new("t")
            .matcher(Matcher::regexp(".", "").capture_key_as("outer"))
            .matcher(Matcher::regexp(".", "").capture_key_as("inner"))
            .column("v", ValueResolver::path(["v"]));
        let tables = flatten(&document, &[resolver]);
        let table = tables.get("t").unwrap();
        assert_eq!(table.rows()[0].get("outer"), &ResolvedValue::from("a"));
        assert_eq!(table.rows()[0].get("inner"), &ResolvedValue::from("x"));
        assert_eq!(table.rows()[1].get("outer"), &ResolvedValue::from("b"));
        assert_eq!(table.rows()[1].get("inner"), &ResolvedValue::from("y"));
    }

    #[test]
    fn test_ancestor_column_reads_parent() {
        let document = json!({"orders": [{"name": "first", "lines": [{"sku": "A"}, {"sku": "B"}]}]});
        let resolver = TableResolver::new("lines")
            .matcher(Matcher::literal("orders"))
            .matcher(Matcher::index())
            .matcher(Matcher::literal("lines"))
            .matcher(Matcher::index())
            .column("sku", ValueResolver::path(["sku"]))
            .column("order", ValueResolver::path(["name"]).from_ancestor(-2))
            .column("lines", ValueResolver::path([0]).from_ancestor(-1).or_self());
        let tables = flatten(&document, &[resolver]);
        let table = tables.get("lines").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].get("sku"), &ResolvedValue::from("B"));
        assert_eq!(table.rows()[1].get("order"), &ResolvedValue::from("first"));
        assert_eq!(table.rows()[1].get("lines"), &ResolvedValue::from(r#"{"sku":"A"}"#));
    }

    #[test]
    fn test_immediate_parent_name() {
        let document = json!({"name": "parent", "child": {"name": "child"}});
        let resolver = TableResolver::new("t")
            .matcher(Matcher::literal("child"))
            .column("own", ValueResolver::path(["name"]))
            .column("parent", ValueResolver::path(["name"]).from_ancestor(-1));
        let tables = flatten(&document, &[resolver]);
        let row = &tables.get("t").unwrap().rows()[0];
        assert_eq!(row.get("own"), &ResolvedValue::from("child"));
        assert_eq!(row.get("parent"), &ResolvedValue::from("parent"));
    }

    #[test]
    fn test_resolvers_share_a_table() {
        let document = json!({"staff": [{"name": "Ann"}], "guests": [{"name": "Bo", "host": "Ann"}]});
        let resolvers = vec![
            TableResolver::new("people")
                .matcher(Matcher::literal("staff"))
                .matcher(Matcher::index())
                .column("name", ValueResolver::path(["name"])),
            TableResolver::new("people")
                .matcher(Matcher::literal("guests"))
                .matcher(Matcher::index())
                .column("name", ValueResolver::path(["name"]))
                .column("host", ValueResolver::path(["host"])),
        ];
        let tables = flatten(&document, &resolvers);
        let people = tables.get("people").unwrap();
        assert_eq!(people.header(), ["name", "host"]);
        assert_eq!(people.len(), 2);
        assert!(!people.rows()[0].contains_column("host"));
        assert_eq!(people.rows()[1].get("host"), &ResolvedValue::from("Ann"));
    }

    #[test]
    fn test_tables_exist_without_rows() {
        let tables = flatten(&json!(42), &[users_resolver()]);
        let users = tables.get("users").unwrap();
        assert!(users.is_empty());
        assert_eq!(users.header(), ["id", "name"]);
    }

    #[test]
    fn test_invalid_schema_produces_no_tables() {
        let resolvers = vec![
            users_resolver(),
            TableResolver::new("broken")
                .matcher(Matcher::literal("a"))
                .matcher(Matcher::wildcard()),
        ];
        let err = JsonFlattener::default()
            .flatten(&json!({"users": {}}), &resolvers)
            .unwrap_err();
        assert_eq!(err.table_name, "broken");
        assert_eq!(err.rule, SchemaRule::TrailingWildcard);
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let document = json!({
            "users": {"u1": {"name": "Ann", "tags": ["x"]}, "u2": {"name": "Bo"}},
            "meta": {"users": {"u3": {"name": "Cy"}}}
        });
        let resolvers = vec![
            users_resolver(),
            TableResolver::new("everywhere")
                .matcher(Matcher::wildcard().capture_key_as("trail"))
                .matcher(Matcher::literal("name"))
                .column("name", ValueResolver::this()),
        ];
        let first = serde_json::to_string(&flatten(&document, &resolvers)).unwrap();
        let second = serde_json::to_string(&flatten(&document, &resolvers)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_max_depth_prunes_deep_containers() {
        let document = json!({"a": {"b": {"c": {"d": 1}}}});
        let resolver = TableResolver::new("t")
            .matcher(Matcher::wildcard())
            .matcher(Matcher::regexp(".", "").capture_key_as("k"));
        let config = FlattenConfig {
            max_depth: Some(1),
            ..Default::default()
        };
        let tables = JsonFlattener::new(config).flatten(&document, &[resolver]).unwrap();
        let keys = column(&tables, "t", "k");
        assert_eq!(keys, strings(&["a", "b"]));
    }
}
