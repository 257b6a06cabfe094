//! Split event queries between the event index and the stack index
//!
//! A user filter is written against events, but some of its criteria (status,
//! first/last occurrence, title, ...) only exist on stacks. [`EventStackFilter`]
//! rewrites one query into the shape needed for a given [`QueryMode`]:
//!
//! - [`QueryMode::Stacks`] keeps only criteria the stack index understands and
//!   expands the synthetic `is_fixed`, `is_regressed` and `is_hidden` fields.
//! - [`QueryMode::InvertedStacks`] does the same, then negates the stack criteria
//!   so the query selects stacks that do *not* match. Scoping fields
//!   (organization, project, stack, type) are never negated; when a negation
//!   would have to be distributed over an `OR` that contains one of them the
//!   result reports `is_invert_successful == false`.
//! - [`QueryMode::Events`] drops every stack-only criterion.
//!
//! Criteria with unknown fields are silently dropped in the stack modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use super::ast::{GroupOperator, NodeId, QueryNode, QueryTree, TermNode};
use super::generate::generate_query;
use super::query_string::parse;
use super::referenced_fields::referenced_fields;
use super::visitor::{walk, QueryNodeVisitor};
use crate::error::QueryError;

/// Fields that only exist on stacks, canonical name and alias
const STACK_ONLY_FIELDS: &[&str] = &[
    "status",
    "snooze_until_utc",
    "snooze",
    "signature_hash",
    "signature",
    "title",
    "description",
    "first_occurrence",
    "first",
    "last_occurrence",
    "last",
    "total_occurrences",
    "occurrences",
    "references",
    "links",
    "date_fixed",
    "fixedon",
    "fixed_in_version",
    "fixedin",
    "occurrences_are_critical",
    "critical",
];

/// Synthetic boolean fields expanded into status criteria
const STACK_ONLY_SPECIAL_FIELDS: &[&str] = &["is_fixed", "is_regressed", "is_hidden"];

/// Scoping fields whose polarity must never be flipped by inversion
const STACK_NON_INVERTED_FIELDS: &[&str] = &[
    "organization_id",
    "organization",
    "project_id",
    "project",
    "stack_id",
    "stack",
    "id",
    "type",
];

/// Fields valid against both the stack and the event index
const STACK_AND_EVENT_FIELDS: &[&str] = &[
    "organization_id",
    "organization",
    "project_id",
    "project",
    "stack_id",
    "stack",
    "type",
    "tags",
    "tag",
];

fn contains(fields: &[&str], field: &str) -> bool {
    fields.iter().any(|f| f.eq_ignore_ascii_case(field))
}

fn is_stack_only_field(field: &str) -> bool {
    contains(STACK_ONLY_FIELDS, field)
}

fn is_stack_only_special_field(field: &str) -> bool {
    contains(STACK_ONLY_SPECIAL_FIELDS, field)
}

fn is_non_inverted_field(field: &str) -> bool {
    contains(STACK_NON_INVERTED_FIELDS, field)
}

fn is_stack_field(field: &str) -> bool {
    is_stack_only_field(field) || contains(STACK_AND_EVENT_FIELDS, field)
}

fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Which index the rewritten query targets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    Stacks,
    InvertedStacks,
    Events,
}

impl QueryMode {
    fn targets_stacks(self) -> bool {
        matches!(self, QueryMode::Stacks | QueryMode::InvertedStacks)
    }
}

impl FromStr for QueryMode {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "stacks" => Ok(QueryMode::Stacks),
            "inverted_stacks" | "invertedstacks" => Ok(QueryMode::InvertedStacks),
            "events" => Ok(QueryMode::Events),
            other => Err(QueryError::Config(format!("Unknown query mode: {}", other))),
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMode::Stacks => f.write_str("stacks"),
            QueryMode::InvertedStacks => f.write_str("inverted_stacks"),
            QueryMode::Events => f.write_str("events"),
        }
    }
}

/// Outcome of rewriting a query for one [`QueryMode`]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventStackFilterQueryResult {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub query: String,
    /// False when the inversion could not be expressed soundly; callers must
    /// then fall back to the un-inverted query
    pub is_invert_successful: bool,
    pub has_stack_specific_criteria: bool,
    /// An unnegated `status:open` criterion was present
    pub has_status_open: bool,
}

/// Rewrites event queries into stack, inverted-stack or event queries
#[derive(Clone, Copy, Debug, Default)]
pub struct EventStackFilter;

impl EventStackFilter {
    pub fn new() -> Self {
        Self
    }

    /// Parse `query` and rewrite it for `mode`. Parse failures come back as an
    /// invalid result carrying the parser's message.
    pub fn run(&self, query: &str, mode: QueryMode) -> EventStackFilterQueryResult {
        match parse(query) {
            Ok(mut tree) => self.run_tree(&mut tree, mode),
            Err(err) => {
                warn!(query, %mode, error = %err, "failed to parse stack filter query");
                EventStackFilterQueryResult {
                    is_valid: false,
                    message: Some(err.user_message()),
                    query: query.to_string(),
                    is_invert_successful: false,
                    has_stack_specific_criteria: false,
                    has_status_open: false,
                }
            }
        }
    }

    /// Rewrite an already parsed tree in place and regenerate its query
    pub fn run_tree(&self, tree: &mut QueryTree, mode: QueryMode) -> EventStackFilterQueryResult {
        let mut visitor = EventStackFilterVisitor::new(mode);
        walk(tree, &mut visitor);

        let query = generate_query(tree);
        debug!(
            %mode,
            query = %query,
            is_invert_successful = visitor.is_invert_successful,
            has_stack_specific_criteria = visitor.has_stack_specific_criteria,
            "applied stack filter"
        );

        EventStackFilterQueryResult {
            is_valid: true,
            message: None,
            query,
            is_invert_successful: visitor.is_invert_successful,
            has_stack_specific_criteria: visitor.has_stack_specific_criteria,
            has_status_open: visitor.has_status_open,
        }
    }
}

/// Visitor state for one rewrite
pub struct EventStackFilterVisitor {
    mode: QueryMode,
    pub is_invert_successful: bool,
    pub has_status_open: bool,
    pub has_stack_specific_criteria: bool,
    /// Set while walking the terms of a synthesized `is_hidden` group
    in_synthesized_group: bool,
}

impl EventStackFilterVisitor {
    pub fn new(mode: QueryMode) -> Self {
        Self {
            mode,
            is_invert_successful: true,
            has_status_open: false,
            has_stack_specific_criteria: false,
            in_synthesized_group: false,
        }
    }

    /// Keep, rewrite or remove a node for the current mode.
    ///
    /// Returns the node that now stands in its place, or `None` if it was removed.
    fn apply_filter(&mut self, tree: &mut QueryTree, id: NodeId) -> Option<NodeId> {
        let is_group = tree.group(id).is_some();

        if !self.mode.targets_stacks() {
            let Some(field) = tree.effective_field(id) else {
                return Some(id);
            };
            if is_stack_only_field(field) || is_stack_only_special_field(field) {
                tree.remove(id);
                return None;
            }
            return Some(id);
        }

        if is_group && tree.field(id).is_none() {
            return Some(id);
        }

        if let Some(term) = tree.term(id) {
            if let Some(field) = term.field.as_deref() {
                let field = field.to_lowercase();
                match field.as_str() {
                    "stack_id" | "stack" => {
                        tree.set_field(id, "id");
                        self.has_stack_specific_criteria = true;
                        return Some(id);
                    }
                    "is_fixed" => return self.rewrite_status(tree, id, "fixed"),
                    "is_regressed" => return self.rewrite_status(tree, id, "regressed"),
                    "is_hidden" => return self.rewrite_hidden(tree, id),
                    _ => {}
                }
            }
        }

        if let Some(field) = tree.effective_field(id) {
            if is_stack_field(field) {
                if is_stack_only_field(field) {
                    self.has_stack_specific_criteria = true;
                }
                return Some(id);
            }
        }

        tree.remove(id);
        None
    }

    /// `is_fixed:<bool>` / `is_regressed:<bool>` become `status:<status>`
    fn rewrite_status(&mut self, tree: &mut QueryTree, id: NodeId, status: &str) -> Option<NodeId> {
        let Some(value) = self.special_value(tree, id) else {
            tree.remove(id);
            return None;
        };

        if let Some(term) = tree.term_mut(id) {
            term.field = Some("status".to_string());
            term.term = status.to_string();
            term.is_negated = Some(!value);
        }
        self.has_stack_specific_criteria = true;
        Some(id)
    }

    /// `is_hidden:true` becomes `NOT (status:open OR status:regressed)`,
    /// `is_hidden:false` becomes `(status:open OR status:regressed)`
    fn rewrite_hidden(&mut self, tree: &mut QueryTree, id: NodeId) -> Option<NodeId> {
        let Some(is_hidden) = self.special_value(tree, id) else {
            tree.remove(id);
            return None;
        };

        let open = tree.add(QueryNode::term("status", "open"));
        let regressed = tree.add(QueryNode::term("status", "regressed"));
        let group = tree.add_group(Some(open), GroupOperator::Or, Some(regressed));
        if let Some(g) = tree.group_mut(group) {
            g.has_parens = true;
            g.is_negated = is_hidden.then_some(true);
        }

        tree.replace(id, group);
        self.has_stack_specific_criteria = true;
        Some(group)
    }

    /// Boolean value of a special field term, folding in an explicit negation
    fn special_value(&self, tree: &QueryTree, id: NodeId) -> Option<bool> {
        let term = tree.term(id)?;
        let value = parse_bool(&term.term)?;
        Some(if term.is_negated == Some(true) {
            !value
        } else {
            value
        })
    }

    fn track_status_open(&mut self, tree: &QueryTree, id: NodeId) {
        let Some(TermNode {
            term, is_negated, ..
        }) = tree.term(id)
        else {
            return;
        };
        let is_status = tree
            .effective_field(id)
            .is_some_and(|f| f.eq_ignore_ascii_case("status"));
        if is_status && *is_negated != Some(true) && term.eq_ignore_ascii_case("open") {
            self.has_status_open = true;
        }
    }

    /// Negate a stack criterion without flipping any scoping criteria
    fn invert(&mut self, tree: &mut QueryTree, id: NodeId) {
        let Some(group) = tree.enclosing_parens_group(id) else {
            tree.toggle_negation(id);
            return;
        };

        if tree.group(group).is_some_and(|g| g.is_inverted) {
            return;
        }

        let fields = referenced_fields(tree, group);
        if fields.iter().any(|f| is_non_inverted_field(f)) {
            let operator = tree.group(group).map(|g| g.operator);
            if operator == Some(GroupOperator::Or) {
                debug!(
                    fields = ?fields,
                    "cannot invert OR group containing scoping criteria"
                );
                self.is_invert_successful = false;
            } else {
                tree.toggle_negation(id);
            }
            return;
        }

        tree.toggle_negation(group);
        if let Some(g) = tree.group_mut(group) {
            g.is_inverted = true;
        }
    }
}

impl QueryNodeVisitor for EventStackFilterVisitor {
    fn visit_group(&mut self, tree: &mut QueryTree, id: NodeId) {
        if let Some(kept) = self.apply_filter(tree, id) {
            self.visit_children(tree, kept);
        }
    }

    fn visit_term(&mut self, tree: &mut QueryTree, id: NodeId) {
        // Tracked before filtering so stripped terms still count
        if !self.in_synthesized_group {
            self.track_status_open(tree, id);
        }

        let Some(filtered) = self.apply_filter(tree, id) else {
            return;
        };

        if filtered != id {
            // Replaced by a synthesized group; only the unnegated form selects open stacks
            if tree.is_negated(filtered) != Some(true) {
                self.has_status_open = true;
            }
            self.in_synthesized_group = true;
            self.visit_children(tree, filtered);
            self.in_synthesized_group = false;
            return;
        }

        if self.mode != QueryMode::InvertedStacks {
            return;
        }
        if tree
            .effective_field(id)
            .map_or(true, is_non_inverted_field)
        {
            return;
        }

        self.invert(tree, id);
    }

    fn visit_term_range(&mut self, tree: &mut QueryTree, id: NodeId) {
        self.apply_filter(tree, id);
    }

    fn visit_exists(&mut self, tree: &mut QueryTree, id: NodeId) {
        self.apply_filter(tree, id);
    }

    fn visit_missing(&mut self, tree: &mut QueryTree, id: NodeId) {
        self.apply_filter(tree, id);
    }
}
