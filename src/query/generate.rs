//! Serialize a (possibly rewritten) query tree back into query string syntax

use super::ast::{GroupOperator, NodeId, QueryNode, QueryTree};

/// Regenerate the query string for the whole tree
pub fn generate_query(tree: &QueryTree) -> String {
    generate_node(tree, tree.root())
}

/// Regenerate the query string for the subtree rooted at `id`
///
/// Groups whose children were all removed render as an empty string, and a
/// group with a single remaining child renders just that child.
pub fn generate_node(tree: &QueryTree, id: NodeId) -> String {
    let mut out = String::new();

    match tree.node(id) {
        QueryNode::Group(group) => {
            let left = group
                .left
                .map(|child| generate_node(tree, child))
                .unwrap_or_default();
            let right = group
                .right
                .map(|child| generate_node(tree, child))
                .unwrap_or_default();

            let body = match (left.is_empty(), right.is_empty()) {
                (true, true) => return out,
                (false, true) => left,
                (true, false) => right,
                (false, false) => {
                    let operator = match group.operator {
                        GroupOperator::Default => " ",
                        GroupOperator::And => " AND ",
                        GroupOperator::Or => " OR ",
                    };
                    format!("{}{}{}", left, operator, right)
                }
            };

            let is_negated = group.is_negated == Some(true);
            push_prefix(&mut out, is_negated, group.is_required);
            if let Some(field) = &group.field {
                out.push_str(field);
                out.push(':');
            }

            let has_both = group.left.is_some() && group.right.is_some();
            if group.has_parens || group.field.is_some() || (is_negated && has_both) {
                out.push('(');
                out.push_str(&body);
                out.push(')');
            } else {
                out.push_str(&body);
            }
        }
        QueryNode::Term(term) => {
            push_prefix(&mut out, term.is_negated == Some(true), term.is_required);
            if let Some(field) = &term.field {
                out.push_str(field);
                out.push(':');
            }
            if term.is_quoted {
                out.push('"');
                out.push_str(&term.term.replace('\\', "\\\\").replace('"', "\\\""));
                out.push('"');
            } else {
                out.push_str(&term.term);
            }
            if let Some(proximity) = &term.proximity {
                out.push('~');
                out.push_str(proximity);
            }
            if let Some(boost) = &term.boost {
                out.push('^');
                out.push_str(boost);
            }
        }
        QueryNode::TermRange(range) => {
            push_prefix(&mut out, range.is_negated == Some(true), range.is_required);
            if let Some(field) = &range.field {
                out.push_str(field);
                out.push(':');
            }
            out.push(if range.min_inclusive { '[' } else { '{' });
            out.push_str(range.min.as_deref().unwrap_or("*"));
            out.push_str(" TO ");
            out.push_str(range.max.as_deref().unwrap_or("*"));
            out.push(if range.max_inclusive { ']' } else { '}' });
        }
        QueryNode::Exists(exists) => {
            push_prefix(&mut out, exists.is_negated == Some(true), false);
            out.push_str("_exists_:");
            out.push_str(exists.field.as_deref().unwrap_or_default());
        }
        QueryNode::Missing(missing) => {
            push_prefix(&mut out, missing.is_negated == Some(true), false);
            out.push_str("_missing_:");
            out.push_str(missing.field.as_deref().unwrap_or_default());
        }
    }

    out
}

fn push_prefix(out: &mut String, is_negated: bool, is_required: bool) {
    if is_negated {
        out.push_str("NOT ");
    } else if is_required {
        out.push('+');
    }
}
