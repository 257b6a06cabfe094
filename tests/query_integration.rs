//! Integration tests for the query pipeline
//!
//! Tests end-to-end behavior from raw query strings through parsing, rewriting
//! and regeneration.

use event_query::query::{generate_query, parse, walk, QueryNodeVisitor, QueryTree};
use event_query::{
    EventStackFilter, FieldAggregationProcessor, QueryConfig, QueryMode, QueryProcessor,
};

const FREE_FIELD_QUERIES: &[&str] = &[
    "hidden:false",
    "fixed:true AND hidden:false",
    "type:error OR type:log",
    "reference:abc123",
    "organization:537650f3b77efe23a47914f3 AND project:537650f3b77efe23a47914f4",
    "stack:537650f3b77efe23a47914f5",
    "(type:error OR type:log) AND NOT hidden:true",
    "type:(error OR log)",
    "hidden:(true OR false)",
];

const NON_EXTENDED_QUERIES: &[&str] = &[
    "status:open",
    "status:open   AND project:123",
    "-type:error",
    "(organization:abc OR status:open)",
    "title:\"null reference\"",
    "date:[2020-01-01 TO now}",
    "_exists_:tag AND crash",
];

#[test]
fn test_free_fields_never_premium() {
    let processor = QueryProcessor::default();
    for query in FREE_FIELD_QUERIES {
        let result = processor.validate(query);
        assert!(result.is_valid, "{}", query);
        assert!(!result.uses_premium_features, "{}", query);
    }
}

#[test]
fn test_non_extended_queries_are_returned_verbatim() {
    let processor = QueryProcessor::default();
    for query in NON_EXTENDED_QUERIES {
        let result = processor.process(query);
        assert!(result.is_valid, "{}", query);
        assert_eq!(result.expanded_query.as_deref(), Some(*query));
    }
}

#[test]
fn test_premium_classification_is_stable() {
    let processor = QueryProcessor::default();
    for query in FREE_FIELD_QUERIES.iter().chain(NON_EXTENDED_QUERIES) {
        let first = processor.validate(query).uses_premium_features;
        for _ in 0..3 {
            assert_eq!(processor.validate(query).uses_premium_features, first);
        }
    }
}

#[test]
fn test_mixed_query_expansion() {
    let result = QueryProcessor::default()
        .process("project:123 AND (data.browser:chrome OR data.version:[1 TO 2]) AND ref.session:abc");
    assert!(result.is_valid);
    assert!(result.uses_premium_features);
    assert_eq!(
        result.expanded_query.as_deref(),
        Some("project:123 AND (idx.browser-s:chrome OR idx.version-n:[1 TO 2]) AND idx.session-r:abc")
    );
}

#[test]
fn test_processed_then_filtered() {
    // Processing and stack filtering can be chained on the same tree
    let mut tree = parse("data.count:5 AND status:open AND project:1").unwrap();
    let processor = QueryProcessor::default();
    let visitor = processor.process_tree(&mut tree);
    assert!(visitor.uses_data_fields);

    let result = EventStackFilter::new().run_tree(&mut tree, QueryMode::Events);
    assert_eq!(result.query, "idx.count-n:5 AND project:1");
}

#[test]
fn test_stack_and_event_split() {
    let query = "status:open AND type:error AND data.user:bob";
    let filter = EventStackFilter::new();

    let stacks = filter.run(query, QueryMode::Stacks);
    assert_eq!(stacks.query, "status:open AND type:error");
    assert!(stacks.has_stack_specific_criteria);

    let events = filter.run(query, QueryMode::Events);
    assert_eq!(events.query, "type:error AND data.user:bob");
    assert!(!events.has_stack_specific_criteria);
}

#[test]
fn test_inverted_stacks_scenarios() {
    let filter = EventStackFilter::new();

    let result = filter.run("(organization:abc OR status:open)", QueryMode::InvertedStacks);
    assert!(!result.is_invert_successful);

    let result = filter.run("(organization:abc AND status:open)", QueryMode::InvertedStacks);
    assert!(result.is_invert_successful);
    assert_eq!(result.query, "(organization:abc AND NOT status:open)");

    let result = filter.run(
        "project:1 AND (is_fixed:true OR is_regressed:true)",
        QueryMode::InvertedStacks,
    );
    assert!(result.is_invert_successful);
    assert_eq!(
        result.query,
        "project:1 AND NOT (status:fixed OR status:regressed)"
    );
}

#[test]
fn test_aggregation_rules() {
    let processor = FieldAggregationProcessor::default();

    assert!(!processor.process("avg:value,avg:value", true).is_valid);
    assert!(processor.process("avg:value,sum:value", true).is_valid);

    let strict = FieldAggregationProcessor::new(QueryConfig::default().with_max_aggregations(1));
    let result = strict.process("avg:value,sum:value", true);
    assert!(!result.is_valid);
    assert_eq!(result.message.as_deref(), Some("Aggregation count exceeded"));
}

#[derive(Default)]
struct FieldCollector {
    fields: Vec<String>,
}

impl QueryNodeVisitor for FieldCollector {
    fn visit_term(&mut self, tree: &mut QueryTree, id: event_query::query::NodeId) {
        if let Some(field) = tree.field(id) {
            self.fields.push(field.to_string());
        }
    }
}

#[test]
fn test_custom_visitor_sees_rewritten_fields() {
    let mut tree = parse("is_fixed:true AND data.x:1 AND project:2").unwrap();
    EventStackFilter::new().run_tree(&mut tree, QueryMode::Stacks);

    let mut collector = FieldCollector::default();
    walk(&mut tree, &mut collector);
    assert_eq!(collector.fields, vec!["status", "project"]);
    assert_eq!(generate_query(&tree), "status:fixed AND project:2");
}
