//! Premium-feature detection and extended data field rewriting
//!
//! Fields under the free-form `data.` and `ref.` namespaces are stored in typed
//! index fields named `idx.<name>-<type>`. The type suffix is inferred from the
//! values the query compares against:
//!
//! | suffix | inferred from                                  |
//! |--------|------------------------------------------------|
//! | `b`    | `true` / `false`                               |
//! | `n`    | integers and decimals                          |
//! | `d`    | dates, and `now` / `now/...` date math         |
//! | `s`    | anything else                                  |
//! | `r`    | always used for `ref.` fields                  |

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, warn};

use super::ast::{NodeId, QueryNode, QueryTree};
use super::generate::generate_query;
use super::query_string::parse;
use super::visitor::{walk, QueryNodeVisitor};
use crate::config::QueryConfig;

/// Index type suffix for an extended data field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexedTermType {
    Boolean,
    Number,
    Date,
    String,
    Reference,
}

impl IndexedTermType {
    pub fn suffix(&self) -> &'static str {
        match self {
            IndexedTermType::Boolean => "b",
            IndexedTermType::Number => "n",
            IndexedTermType::Date => "d",
            IndexedTermType::String => "s",
            IndexedTermType::Reference => "r",
        }
    }

    /// Infer the index type from the values a field is compared against.
    ///
    /// The first distinct value that is not a leading wildcard decides the type.
    /// A string result is upgraded to a date when every value is Elasticsearch
    /// date math (`now`, `now/d+1d`).
    pub fn infer<'a>(terms: impl IntoIterator<Item = &'a str>) -> Self {
        let mut distinct: Vec<&str> = Vec::new();
        for term in terms {
            let term = term.trim();
            if !distinct.contains(&term) {
                distinct.push(term);
            }
        }

        let mut term_type = IndexedTermType::String;
        if let Some(term) = distinct.iter().find(|t| !t.starts_with('*')) {
            if is_boolean(term) {
                term_type = IndexedTermType::Boolean;
            } else if is_numeric(term) {
                term_type = IndexedTermType::Number;
            } else if is_date(term) {
                term_type = IndexedTermType::Date;
            }
        }

        if term_type == IndexedTermType::String
            && !distinct.is_empty()
            && distinct.iter().all(|t| is_date_math(t))
        {
            term_type = IndexedTermType::Date;
        }

        term_type
    }
}

fn is_boolean(term: &str) -> bool {
    term.eq_ignore_ascii_case("true") || term.eq_ignore_ascii_case("false")
}

fn is_numeric(term: &str) -> bool {
    let digits = term.strip_prefix(['-', '+']).unwrap_or(term);
    let mut seen_digit = false;
    let mut seen_dot = false;
    for ch in digits.chars() {
        match ch {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}

fn is_date(term: &str) -> bool {
    const DATE_TIME_FORMATS: [&str; 3] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%m/%d/%Y %H:%M:%S",
    ];
    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

    DateTime::parse_from_rfc3339(term).is_ok()
        || DATE_TIME_FORMATS
            .iter()
            .any(|f| NaiveDateTime::parse_from_str(term, f).is_ok())
        || DATE_FORMATS
            .iter()
            .any(|f| NaiveDate::parse_from_str(term, f).is_ok())
}

fn is_date_math(term: &str) -> bool {
    term.eq_ignore_ascii_case("now")
        || term
            .get(..4)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("now/"))
}

fn strip_prefix_ignore_case<'a>(field: &'a str, prefix: &str) -> Option<&'a str> {
    let head = field.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &field[prefix.len()..])
}

/// Outcome of processing or validating a query
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryProcessResult {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub uses_premium_features: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded_query: Option<String>,
}

/// Validates queries and expands extended data fields
#[derive(Clone, Debug, Default)]
pub struct QueryProcessor {
    config: QueryConfig,
}

impl QueryProcessor {
    pub fn new(config: QueryConfig) -> Self {
        Self { config }
    }

    /// Parse, classify and expand a query.
    ///
    /// The original string is returned untouched unless a `data.`/`ref.` field
    /// was rewritten, in which case the query is regenerated from the tree.
    pub fn process(&self, query: &str) -> QueryProcessResult {
        if query.trim().is_empty() {
            return QueryProcessResult {
                is_valid: true,
                expanded_query: Some(query.to_string()),
                ..Default::default()
            };
        }

        let (tree, visitor) = match self.visit(query) {
            Ok(visited) => visited,
            Err(result) => return result,
        };

        let expanded_query = if visitor.uses_data_fields {
            let expanded = generate_query(&tree);
            debug!(query, expanded = %expanded, "expanded data fields");
            expanded
        } else {
            query.to_string()
        };

        QueryProcessResult {
            is_valid: true,
            message: None,
            uses_premium_features: visitor.uses_premium_features,
            expanded_query: Some(expanded_query),
        }
    }

    /// Parse and classify a query without regenerating it
    pub fn validate(&self, query: &str) -> QueryProcessResult {
        if query.trim().is_empty() {
            return QueryProcessResult {
                is_valid: true,
                ..Default::default()
            };
        }

        match self.visit(query) {
            Ok((_, visitor)) => QueryProcessResult {
                is_valid: true,
                message: None,
                uses_premium_features: visitor.uses_premium_features,
                expanded_query: None,
            },
            Err(result) => result,
        }
    }

    /// Run the rewriting visitor over an already parsed tree
    pub fn process_tree(&self, tree: &mut QueryTree) -> QueryProcessorVisitor<'_> {
        let mut visitor = QueryProcessorVisitor::new(&self.config);
        walk(tree, &mut visitor);
        visitor
    }

    fn visit(
        &self,
        query: &str,
    ) -> std::result::Result<(QueryTree, QueryProcessorVisitor<'_>), QueryProcessResult> {
        let mut tree = parse(query).map_err(|err| {
            warn!(query, error = %err, "failed to parse query");
            QueryProcessResult {
                is_valid: false,
                message: Some(err.user_message()),
                ..Default::default()
            }
        })?;

        let visitor = self.process_tree(&mut tree);
        Ok((tree, visitor))
    }
}

/// Visitor that rewrites extended data fields and flags premium usage
pub struct QueryProcessorVisitor<'a> {
    config: &'a QueryConfig,
    pub uses_premium_features: bool,
    pub uses_data_fields: bool,
}

impl<'a> QueryProcessorVisitor<'a> {
    pub fn new(config: &'a QueryConfig) -> Self {
        Self {
            config,
            uses_premium_features: false,
            uses_data_fields: false,
        }
    }

    /// Rewritten name for `field`, or `None` when the field is kept as-is
    fn custom_field_name(&mut self, field: &str, terms: &[&str]) -> Option<String> {
        if !self.config.is_free_query_field(field) {
            self.uses_premium_features = true;
        }

        let rewritten = if let Some(rest) = strip_prefix_ignore_case(field, "data.") {
            let term_type = IndexedTermType::infer(terms.iter().copied());
            format!("idx.{}-{}", rest.to_lowercase(), term_type.suffix())
        } else if let Some(rest) = strip_prefix_ignore_case(field, "ref.") {
            format!(
                "idx.{}-{}",
                rest.to_lowercase(),
                IndexedTermType::Reference.suffix()
            )
        } else {
            return None;
        };

        self.uses_data_fields = true;
        Some(rewritten)
    }

    fn rewrite_field(&mut self, tree: &mut QueryTree, id: NodeId, terms: &[&str]) {
        let Some(field) = tree.field(id).map(str::to_string) else {
            return;
        };
        if let Some(rewritten) = self.custom_field_name(&field, terms) {
            tree.set_field(id, rewritten);
        }
    }
}

/// Literal values of a node's own term(s); ranges contribute both bounds
fn own_terms(node: &QueryNode) -> Vec<String> {
    match node {
        QueryNode::Term(term) => vec![term.term.clone()],
        QueryNode::TermRange(range) => range.min.iter().chain(range.max.iter()).cloned().collect(),
        _ => Vec::new(),
    }
}

impl QueryNodeVisitor for QueryProcessorVisitor<'_> {
    fn visit_group(&mut self, tree: &mut QueryTree, id: NodeId) {
        // A fielded group borrows its type from the unfielded terms it scopes
        let child_terms: Vec<String> = [tree.left(id), tree.right(id)]
            .into_iter()
            .flatten()
            .filter(|child| tree.field(*child).is_none())
            .flat_map(|child| own_terms(tree.node(child)))
            .collect();
        let terms: Vec<&str> = child_terms.iter().map(String::as_str).collect();
        self.rewrite_field(tree, id, &terms);

        self.visit_children(tree, id);
    }

    fn visit_term(&mut self, tree: &mut QueryTree, id: NodeId) {
        let Some(term) = tree.term(id) else {
            return;
        };
        if term.field.is_none() {
            // Searching all fields is a premium feature; terms of a fielded
            // group were already handled with the group
            if tree.effective_field(id).is_none() {
                self.uses_premium_features = true;
            }
            return;
        }
        let value = term.term.clone();
        self.rewrite_field(tree, id, &[value.as_str()]);
    }

    fn visit_term_range(&mut self, tree: &mut QueryTree, id: NodeId) {
        let bounds = own_terms(tree.node(id));
        let terms: Vec<&str> = bounds.iter().map(String::as_str).collect();
        self.rewrite_field(tree, id, &terms);
    }

    fn visit_exists(&mut self, tree: &mut QueryTree, id: NodeId) {
        self.rewrite_field(tree, id, &[]);
    }

    fn visit_missing(&mut self, tree: &mut QueryTree, id: NodeId) {
        self.rewrite_field(tree, id, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> QueryProcessor {
        QueryProcessor::default()
    }

    #[test]
    fn test_term_type_inference() {
        assert_eq!(IndexedTermType::infer(["true"]), IndexedTermType::Boolean);
        assert_eq!(IndexedTermType::infer(["FALSE"]), IndexedTermType::Boolean);
        assert_eq!(IndexedTermType::infer(["123"]), IndexedTermType::Number);
        assert_eq!(IndexedTermType::infer(["-1.5"]), IndexedTermType::Number);
        assert_eq!(IndexedTermType::infer(["2020-01-01"]), IndexedTermType::Date);
        assert_eq!(
            IndexedTermType::infer(["2020-01-01T10:00:00Z"]),
            IndexedTermType::Date
        );
        assert_eq!(IndexedTermType::infer(["bar"]), IndexedTermType::String);
        assert_eq!(IndexedTermType::infer(["now", "now/d+1d"]), IndexedTermType::Date);
        assert_eq!(IndexedTermType::infer(["NOW/d"]), IndexedTermType::Date);
        assert_eq!(IndexedTermType::infer(["*", "10"]), IndexedTermType::Number);
        assert_eq!(IndexedTermType::infer(["*abc"]), IndexedTermType::String);
        assert_eq!(IndexedTermType::infer(std::iter::empty()), IndexedTermType::String);
    }

    #[test]
    fn test_first_value_decides() {
        assert_eq!(IndexedTermType::infer(["10", "abc"]), IndexedTermType::Number);
        assert_eq!(IndexedTermType::infer(["abc", "10"]), IndexedTermType::String);
    }

    #[test]
    fn test_mixed_date_math_stays_string() {
        assert_eq!(IndexedTermType::infer(["abc", "now"]), IndexedTermType::String);
        let result = processor().process("data.foo:[abc TO now]");
        assert_eq!(result.expanded_query.as_deref(), Some("idx.foo-s:[abc TO now]"));
    }

    #[test]
    fn test_numeric_edge_cases() {
        assert!(is_numeric("42"));
        assert!(is_numeric("+0.5"));
        assert!(!is_numeric("1.2.3"));
        assert!(!is_numeric("-"));
        assert!(!is_numeric("inf"));
        assert!(!is_numeric("NaN"));
    }

    #[test]
    fn test_data_field_rewrites() {
        let cases = [
            ("data.foo:true", "idx.foo-b:true"),
            ("data.foo:123", "idx.foo-n:123"),
            ("data.foo:2020-01-01", "idx.foo-d:2020-01-01"),
            ("data.foo:bar", "idx.foo-s:bar"),
            ("data.foo:[now TO now/d+1d}", "idx.foo-d:[now TO now/d+1d}"),
            ("data.Foo:[1 TO 5]", "idx.foo-n:[1 TO 5]"),
            ("ref.session:abc", "idx.session-r:abc"),
            ("_exists_:data.foo", "_exists_:idx.foo-s"),
            ("_missing_:ref.parent", "_missing_:idx.parent-r"),
        ];

        for (query, expected) in cases {
            let result = processor().process(query);
            assert!(result.is_valid, "{}", query);
            assert!(result.uses_premium_features, "{}", query);
            assert_eq!(result.expanded_query.as_deref(), Some(expected), "{}", query);
        }
    }

    #[test]
    fn test_fielded_group_uses_child_terms() {
        let result = processor().process("data.age:(18 OR 21)");
        assert_eq!(result.expanded_query.as_deref(), Some("idx.age-n:(18 OR 21)"));
    }

    #[test]
    fn test_no_rewrite_returns_original() {
        let query = "status:open   AND  -type:error";
        let result = processor().process(query);
        assert!(result.is_valid);
        assert_eq!(result.expanded_query.as_deref(), Some(query));
    }

    #[test]
    fn test_free_fields() {
        let result = processor()
            .validate("organization:a AND project:b AND stack:c AND type:error AND reference:x AND hidden:false AND fixed:true");
        assert!(result.is_valid);
        assert!(!result.uses_premium_features);
        assert!(result.expanded_query.is_none());
    }

    #[test]
    fn test_fielded_group_children_use_group_field() {
        assert!(!processor().validate("type:(error OR log)").uses_premium_features);
        assert!(!processor().validate("hidden:(true OR false)").uses_premium_features);
        assert!(processor().validate("status:(open OR regressed)").uses_premium_features);
    }

    #[test]
    fn test_premium_fields() {
        assert!(processor().validate("status:open").uses_premium_features);
        assert!(processor().validate("crash").uses_premium_features);
        assert!(processor().validate("_exists_:title").uses_premium_features);
    }

    #[test]
    fn test_custom_free_field() {
        let processor = QueryProcessor::new(QueryConfig::default().with_free_query_field("status"));
        assert!(!processor.validate("status:open").uses_premium_features);
    }

    #[test]
    fn test_validate_is_repeatable() {
        let query = "data.foo:bar OR project:123";
        let first = processor().validate(query);
        let second = processor().validate(query);
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_error() {
        let result = processor().process("status:(open");
        assert!(!result.is_valid);
        assert!(result.message.is_some());
        assert!(result.expanded_query.is_none());

        let result = processor().validate("status:(open");
        assert!(!result.is_valid);
    }

    #[test]
    fn test_empty_query() {
        let result = processor().process("");
        assert!(result.is_valid);
        assert!(!result.uses_premium_features);
        assert_eq!(result.expanded_query.as_deref(), Some(""));

        assert!(processor().validate("  ").is_valid);
    }
}
