//! Collect the field names a subtree refers to

use std::collections::HashSet;

use super::ast::{NodeId, QueryTree};

/// Every field referenced by the subtree rooted at `id`, including group fields
pub fn referenced_fields(tree: &QueryTree, id: NodeId) -> HashSet<String> {
    tree.descendants(id)
        .into_iter()
        .filter_map(|node| tree.field(node))
        .map(|field| field.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::query_string::parse;

    #[test]
    fn test_collects_all_fields() {
        let tree = parse("organization:abc AND (status:open OR _exists_:title) AND tag:(a b)").unwrap();
        let fields = referenced_fields(&tree, tree.root());
        let expected: HashSet<String> = ["organization", "status", "title", "tag"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(fields, expected);
    }

    #[test]
    fn test_subtree_only() {
        let tree = parse("organization:abc AND (status:open OR type:error)").unwrap();
        let group = tree.right(tree.root()).unwrap();
        let fields = referenced_fields(&tree, group);
        assert!(fields.contains("status"));
        assert!(fields.contains("type"));
        assert!(!fields.contains("organization"));
    }

    #[test]
    fn test_unfielded_terms_add_nothing() {
        let tree = parse("crash timeout").unwrap();
        assert!(referenced_fields(&tree, tree.root()).is_empty());
    }
}
