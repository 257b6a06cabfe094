//! Abstract Syntax Tree for parsed query strings
//!
//! Nodes live in a flat arena owned by [`QueryTree`] and refer to each other by
//! [`NodeId`]. Each node records its parent group so rewriting visitors can walk
//! upwards and replace a node in its parent's slot without rebuilding the tree.
//!
//! Invariant: when `parent(id)` is `Some(group)`, that group's `left` or `right`
//! is exactly `id`. All slot mutations go through [`QueryTree`] methods which keep
//! the back-references consistent.

use serde::{Deserialize, Serialize};

/// Handle to a node stored in a [`QueryTree`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Operator linking the two children of a group
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOperator {
    /// Implicit operator (adjacent clauses)
    #[default]
    Default,
    And,
    Or,
}

/// Binary (or unary once a child is removed) combination of two nodes
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupNode {
    /// Field applied to unfielded children, as in `status:(open OR regressed)`
    pub field: Option<String>,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    pub operator: GroupOperator,
    /// `None` means no explicit negation, which is distinct from `Some(false)`
    pub is_negated: Option<bool>,
    pub is_required: bool,
    pub has_parens: bool,
    /// Set by the stack filter once the whole group has been negated
    pub is_inverted: bool,
}

/// Leaf `field:term` criterion
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TermNode {
    /// `None` searches all fields
    pub field: Option<String>,
    pub term: String,
    pub is_quoted: bool,
    pub is_negated: Option<bool>,
    pub is_required: bool,
    /// Raw text after `~` (empty for a bare tilde)
    pub proximity: Option<String>,
    /// Raw text after `^` (empty for a bare caret)
    pub boost: Option<String>,
}

/// `field:[min TO max]` criterion; `None` bounds are open-ended (`*`)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TermRangeNode {
    pub field: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
    pub min_inclusive: bool,
    pub max_inclusive: bool,
    pub is_negated: Option<bool>,
    pub is_required: bool,
}

/// `_exists_:field`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExistsNode {
    pub field: Option<String>,
    pub is_negated: Option<bool>,
}

/// `_missing_:field`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MissingNode {
    pub field: Option<String>,
    pub is_negated: Option<bool>,
}

/// The node variants of a parsed query
#[derive(Clone, Debug, PartialEq)]
pub enum QueryNode {
    Group(GroupNode),
    Term(TermNode),
    TermRange(TermRangeNode),
    Exists(ExistsNode),
    Missing(MissingNode),
}

impl QueryNode {
    /// Create an unfielded group without parentheses
    pub fn group(left: Option<NodeId>, operator: GroupOperator, right: Option<NodeId>) -> Self {
        QueryNode::Group(GroupNode {
            left,
            right,
            operator,
            ..Default::default()
        })
    }

    /// Create a `field:term` node
    pub fn term(field: impl Into<String>, term: impl Into<String>) -> Self {
        QueryNode::Term(TermNode {
            field: Some(field.into()),
            term: term.into(),
            ..Default::default()
        })
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            QueryNode::Group(n) => n.field.as_deref(),
            QueryNode::Term(n) => n.field.as_deref(),
            QueryNode::TermRange(n) => n.field.as_deref(),
            QueryNode::Exists(n) => n.field.as_deref(),
            QueryNode::Missing(n) => n.field.as_deref(),
        }
    }

    pub fn set_field(&mut self, field: Option<String>) {
        match self {
            QueryNode::Group(n) => n.field = field,
            QueryNode::Term(n) => n.field = field,
            QueryNode::TermRange(n) => n.field = field,
            QueryNode::Exists(n) => n.field = field,
            QueryNode::Missing(n) => n.field = field,
        }
    }

    pub fn is_negated(&self) -> Option<bool> {
        match self {
            QueryNode::Group(n) => n.is_negated,
            QueryNode::Term(n) => n.is_negated,
            QueryNode::TermRange(n) => n.is_negated,
            QueryNode::Exists(n) => n.is_negated,
            QueryNode::Missing(n) => n.is_negated,
        }
    }

    pub fn set_negated(&mut self, is_negated: Option<bool>) {
        match self {
            QueryNode::Group(n) => n.is_negated = is_negated,
            QueryNode::Term(n) => n.is_negated = is_negated,
            QueryNode::TermRange(n) => n.is_negated = is_negated,
            QueryNode::Exists(n) => n.is_negated = is_negated,
            QueryNode::Missing(n) => n.is_negated = is_negated,
        }
    }

    fn set_required(&mut self, is_required: bool) {
        match self {
            QueryNode::Group(n) => n.is_required = is_required,
            QueryNode::Term(n) => n.is_required = is_required,
            QueryNode::TermRange(n) => n.is_required = is_required,
            QueryNode::Exists(_) | QueryNode::Missing(_) => {}
        }
    }
}

#[derive(Clone, Debug)]
struct Slot {
    node: QueryNode,
    parent: Option<NodeId>,
}

/// Arena-backed mutable query tree
///
/// Nodes detached by [`QueryTree::remove`] or [`QueryTree::replace`] stay in the
/// arena but are no longer reachable from the root.
#[derive(Clone, Debug)]
pub struct QueryTree {
    nodes: Vec<Slot>,
    root: NodeId,
}

impl Default for QueryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryTree {
    /// Create a tree holding a single empty root group
    pub fn new() -> Self {
        Self {
            nodes: vec![Slot {
                node: QueryNode::Group(GroupNode::default()),
                parent: None,
            }],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Make a detached node the root of the tree
    pub fn set_root(&mut self, id: NodeId) {
        self.detach(id);
        self.root = id;
    }

    /// Add a detached node to the arena
    pub fn add(&mut self, node: QueryNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Slot { node, parent: None });
        id
    }

    /// Add a group and adopt its children
    pub fn add_group(
        &mut self,
        left: Option<NodeId>,
        operator: GroupOperator,
        right: Option<NodeId>,
    ) -> NodeId {
        let id = self.add(QueryNode::group(None, operator, None));
        self.set_left(id, left);
        self.set_right(id, right);
        id
    }

    pub fn node(&self, id: NodeId) -> &QueryNode {
        &self.nodes[id.0].node
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut QueryNode {
        &mut self.nodes[id.0].node
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn group(&self, id: NodeId) -> Option<&GroupNode> {
        match self.node(id) {
            QueryNode::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn group_mut(&mut self, id: NodeId) -> Option<&mut GroupNode> {
        match self.node_mut(id) {
            QueryNode::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn term(&self, id: NodeId) -> Option<&TermNode> {
        match self.node(id) {
            QueryNode::Term(term) => Some(term),
            _ => None,
        }
    }

    pub fn term_mut(&mut self, id: NodeId) -> Option<&mut TermNode> {
        match self.node_mut(id) {
            QueryNode::Term(term) => Some(term),
            _ => None,
        }
    }

    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        self.group(id).and_then(|g| g.left)
    }

    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        self.group(id).and_then(|g| g.right)
    }

    pub fn field(&self, id: NodeId) -> Option<&str> {
        self.node(id).field()
    }

    pub fn set_field(&mut self, id: NodeId, field: impl Into<String>) {
        self.node_mut(id).set_field(Some(field.into()));
    }

    /// The node's own field, or the field of the nearest fielded ancestor group
    pub fn effective_field(&self, id: NodeId) -> Option<&str> {
        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(field) = self.field(node) {
                return Some(field);
            }
            current = self.parent(node);
        }
        None
    }

    pub fn is_negated(&self, id: NodeId) -> Option<bool> {
        self.node(id).is_negated()
    }

    pub fn set_negated(&mut self, id: NodeId, is_negated: Option<bool>) {
        self.node_mut(id).set_negated(is_negated);
    }

    pub fn set_required(&mut self, id: NodeId, is_required: bool) {
        self.node_mut(id).set_required(is_required);
    }

    /// Flip the meaning of the negation flag; unset becomes negated
    pub fn toggle_negation(&mut self, id: NodeId) {
        let flipped = match self.is_negated(id) {
            Some(negated) => Some(!negated),
            None => Some(true),
        };
        self.set_negated(id, flipped);
    }

    /// Put `child` in the left slot of `group`, releasing the previous occupant
    pub fn set_left(&mut self, group: NodeId, child: Option<NodeId>) {
        self.set_slot(group, child, true);
    }

    /// Put `child` in the right slot of `group`, releasing the previous occupant
    pub fn set_right(&mut self, group: NodeId, child: Option<NodeId>) {
        self.set_slot(group, child, false);
    }

    fn set_slot(&mut self, group: NodeId, child: Option<NodeId>, left: bool) {
        if let Some(child) = child {
            self.detach(child);
        }

        let previous = {
            let slot = self
                .group_mut(group)
                .unwrap_or_else(|| panic!("node {:?} is not a group", group));
            let slot = if left { &mut slot.left } else { &mut slot.right };
            std::mem::replace(slot, child)
        };

        if let Some(previous) = previous {
            self.nodes[previous.0].parent = None;
        }
        if let Some(child) = child {
            self.nodes[child.0].parent = Some(group);
        }
    }

    /// Release `id` from whichever parent slot currently holds it
    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if self.left(parent) == Some(id) {
            self.set_left(parent, None);
        } else if self.right(parent) == Some(id) {
            self.set_right(parent, None);
        }
        self.nodes[id.0].parent = None;
    }

    /// Remove a node from the tree.
    ///
    /// A child is dropped from its parent's slot, leaving the sibling as the
    /// group's only child. Removing the root leaves an empty root group.
    pub fn remove(&mut self, id: NodeId) {
        if self.parent(id).is_some() {
            self.detach(id);
        } else if id == self.root {
            self.root = self.add(QueryNode::Group(GroupNode::default()));
        }
    }

    /// Put `replacement` where `id` currently sits (parent slot or root)
    pub fn replace(&mut self, id: NodeId, replacement: NodeId) {
        match self.parent(id) {
            Some(parent) if self.left(parent) == Some(id) => {
                self.set_left(parent, Some(replacement))
            }
            Some(parent) => self.set_right(parent, Some(replacement)),
            None if id == self.root => self.set_root(replacement),
            None => {}
        }
    }

    /// Smallest group with explicit parentheses that contains `id` (or is `id`)
    pub fn enclosing_parens_group(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.group(node).is_some_and(|g| g.has_parens) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// Node ids reachable from the root, parents before children
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            out.push(node);
            if let Some(right) = self.right(node) {
                stack.push(right);
            }
            if let Some(left) = self.left(node) {
                stack.push(left);
            }
        }
        out
    }
}
