//! Query parsing, validation and rewriting
//!
//! A query string goes through a fixed pipeline:
//!
//! 1. [`query_string::parse`] builds a [`QueryTree`]
//! 2. one or more visitors rewrite the tree in place
//!    ([`QueryProcessor`] for extended data fields and premium detection,
//!    [`EventStackFilter`] for stack/event scoping and inversion)
//! 3. [`generate_query`] serializes the rewritten tree
//!
//! Aggregation strings (`avg:value,distinct:data.user`) use their own grammar and
//! are handled by [`FieldAggregationProcessor`].
//!
//! # Example
//!
//! ```rust
//! use event_query::query::{EventStackFilter, QueryMode, QueryProcessor};
//!
//! let processed = QueryProcessor::default().process("data.age:21");
//! assert_eq!(processed.expanded_query.as_deref(), Some("idx.age-n:21"));
//!
//! let filtered = EventStackFilter::new().run("status:open AND project:123", QueryMode::Events);
//! assert_eq!(filtered.query, "project:123");
//! ```

pub mod aggregations;
pub mod ast;
pub mod generate;
pub mod processor;
pub mod query_string;
pub mod referenced_fields;
pub mod stack_filter;
pub mod visitor;

pub use aggregations::{
    FieldAggregation, FieldAggregationProcessor, FieldAggregationType, FieldAggregationsResult,
};
pub use ast::{GroupNode, GroupOperator, NodeId, QueryNode, QueryTree, TermNode, TermRangeNode};
pub use generate::generate_query;
pub use processor::{IndexedTermType, QueryProcessResult, QueryProcessor};
pub use query_string::{parse, QueryStringParser};
pub use referenced_fields::referenced_fields;
pub use stack_filter::{EventStackFilter, EventStackFilterQueryResult, QueryMode};
pub use visitor::{accept, walk, QueryNodeVisitor};
