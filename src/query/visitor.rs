//! Visitor dispatch over [`QueryTree`] nodes
//!
//! [`accept`] matches on the node variant and calls the corresponding
//! `visit_*` method. The default `visit_group` chains into both children, so a
//! visitor that only cares about leaves implements just those methods. A visitor
//! that overrides `visit_group` decides itself whether to call
//! [`QueryNodeVisitor::visit_children`].
//!
//! Visitors receive the tree mutably: they may rename fields, flip negation and
//! replace or remove nodes. Children are read from the group's slots at the
//! moment each is visited, so a child replaced while visiting its left sibling is
//! still reached.

use super::ast::{NodeId, QueryNode, QueryTree};

pub trait QueryNodeVisitor {
    fn visit_group(&mut self, tree: &mut QueryTree, id: NodeId) {
        self.visit_children(tree, id);
    }

    fn visit_term(&mut self, _tree: &mut QueryTree, _id: NodeId) {}

    fn visit_term_range(&mut self, _tree: &mut QueryTree, _id: NodeId) {}

    fn visit_exists(&mut self, _tree: &mut QueryTree, _id: NodeId) {}

    fn visit_missing(&mut self, _tree: &mut QueryTree, _id: NodeId) {}

    /// Visit the left then the right child of a group
    fn visit_children(&mut self, tree: &mut QueryTree, id: NodeId) {
        if let Some(left) = tree.left(id) {
            accept(tree, left, self);
        }
        if let Some(right) = tree.right(id) {
            accept(tree, right, self);
        }
    }
}

/// Dispatch `id` to the visitor method matching its node variant
pub fn accept<V: QueryNodeVisitor + ?Sized>(tree: &mut QueryTree, id: NodeId, visitor: &mut V) {
    match tree.node(id) {
        QueryNode::Group(_) => visitor.visit_group(tree, id),
        QueryNode::Term(_) => visitor.visit_term(tree, id),
        QueryNode::TermRange(_) => visitor.visit_term_range(tree, id),
        QueryNode::Exists(_) => visitor.visit_exists(tree, id),
        QueryNode::Missing(_) => visitor.visit_missing(tree, id),
    }
}

/// Walk the whole tree starting at the root
pub fn walk<V: QueryNodeVisitor + ?Sized>(tree: &mut QueryTree, visitor: &mut V) {
    let root = tree.root();
    accept(tree, root, visitor);
}
