//! Recursive descent parser for query strings
//!
//! # Grammar
//!
//! ```text
//! query       := or_expr?
//! or_expr     := and_expr (OR and_expr)*
//! and_expr    := not_expr (AND? not_expr)*
//! not_expr    := (NOT | '-' | '+')? primary
//! primary     := grouped | field_query | term_expr
//! field_query := TERM COLON value_expr
//! value_expr  := range | grouped | phrase | '-'? term_with_modifiers
//! range       := ('[' | '{') value TO value (']' | '}')
//! modifiers   := (TILDE distance?)? (CARET boost?)?
//! grouped     := '(' or_expr ')'
//! ```
//!
//! The result is a binary [`QueryTree`] whose root is always an unparenthesized
//! group. `_exists_:field` and `_missing_:field` produce dedicated nodes.

use super::lexer::{Lexer, Token};
use crate::error::QueryError;
use crate::query::ast::{
    ExistsNode, GroupOperator, MissingNode, NodeId, QueryNode, QueryTree, TermNode,
    TermRangeNode,
};
use crate::Result;

const EXISTS_FIELD: &str = "_exists_";
const MISSING_FIELD: &str = "_missing_";

/// Parser for Lucene-style query strings
pub struct QueryStringParser {
    lexer: Lexer,
    current_token: Token,
    tree: QueryTree,
}

impl QueryStringParser {
    /// Create a new parser for the given query string
    pub fn new(input: &str) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token()?;

        Ok(Self {
            lexer,
            current_token,
            tree: QueryTree::new(),
        })
    }

    /// Parse the query string into a query tree
    pub fn parse(mut self) -> Result<QueryTree> {
        if self.current_token == Token::Eof {
            return Ok(self.tree);
        }

        let expr = self.parse_or_expr()?;

        // Ensure we've consumed all input
        if self.current_token != Token::Eof {
            return Err(QueryError::QueryParse(format!(
                "Unexpected token after query: {:?}",
                self.current_token
            )));
        }

        let is_plain_group = self.tree.group(expr).is_some_and(|g| {
            !g.has_parens && g.field.is_none() && g.is_negated.is_none() && !g.is_required
        });
        if is_plain_group {
            self.tree.set_root(expr);
        } else {
            let root = self.tree.root();
            self.tree.set_left(root, Some(expr));
        }

        Ok(self.tree)
    }

    /// Parse: or_expr := and_expr (OR and_expr)*
    fn parse_or_expr(&mut self) -> Result<NodeId> {
        let mut left = self.parse_and_expr()?;

        while self.current_token == Token::Or {
            self.advance()?;
            let right = self.parse_and_expr()?;
            left = self
                .tree
                .add_group(Some(left), GroupOperator::Or, Some(right));
        }

        Ok(left)
    }

    /// Parse: and_expr := not_expr (AND? not_expr)*
    ///
    /// Adjacent clauses without an explicit operator are joined with
    /// [`GroupOperator::Default`].
    fn parse_and_expr(&mut self) -> Result<NodeId> {
        let mut left = self.parse_not_expr()?;

        loop {
            let operator = if self.current_token == Token::And {
                self.advance()?;
                GroupOperator::And
            } else if self.is_start_of_clause() {
                GroupOperator::Default
            } else {
                break;
            };

            let right = self.parse_not_expr()?;
            left = self.tree.add_group(Some(left), operator, Some(right));
        }

        Ok(left)
    }

    /// Parse: not_expr := (NOT | '-' | '+')? primary
    fn parse_not_expr(&mut self) -> Result<NodeId> {
        let is_negated = matches!(self.current_token, Token::Not | Token::Minus);
        if is_negated {
            self.advance()?;
        }

        let is_required = !is_negated && self.current_token == Token::Plus;
        if is_required {
            self.advance()?;
        }

        let node = self.parse_primary()?;

        if is_negated {
            self.tree.toggle_negation(node);
        } else if is_required {
            self.tree.set_required(node, true);
        }

        Ok(node)
    }

    /// Parse: primary := grouped | field_query | term_expr
    fn parse_primary(&mut self) -> Result<NodeId> {
        match &self.current_token {
            Token::LeftParen => self.parse_grouped(None),
            Token::Term(term) => {
                let term_str = term.clone();
                self.advance()?;

                // Check if this is a field query (term followed by colon)
                if self.current_token == Token::Colon {
                    self.advance()?; // consume ':'
                    self.parse_field_value(term_str)
                } else {
                    self.parse_term_with_modifiers(None, term_str, false)
                }
            }
            Token::QuotedString(text) => {
                let phrase = text.clone();
                self.advance()?;
                self.parse_term_with_modifiers(None, phrase, true)
            }
            _ => Err(QueryError::QueryParse(format!(
                "Unexpected token: {:?}",
                self.current_token
            ))),
        }
    }

    /// Parse: grouped := '(' or_expr ')', optionally scoped to a field
    fn parse_grouped(&mut self, field: Option<String>) -> Result<NodeId> {
        self.advance()?; // consume '('
        let inner = self.parse_or_expr()?;
        self.expect(Token::RightParen)?;

        let reuse_inner = self.tree.group(inner).is_some_and(|g| {
            !g.has_parens && g.field.is_none() && g.is_negated.is_none() && !g.is_required
        });
        let group = if reuse_inner {
            inner
        } else {
            self.tree
                .add_group(Some(inner), GroupOperator::Default, None)
        };

        if let Some(g) = self.tree.group_mut(group) {
            g.has_parens = true;
            g.field = field;
        }
        Ok(group)
    }

    /// Parse field value after field:
    fn parse_field_value(&mut self, field: String) -> Result<NodeId> {
        if field == EXISTS_FIELD || field == MISSING_FIELD {
            return self.parse_exists_or_missing(&field);
        }

        match &self.current_token {
            Token::LeftBracket | Token::LeftBrace => self.parse_range_query(field),
            Token::LeftParen => self.parse_grouped(Some(field)),
            Token::QuotedString(text) => {
                let phrase = text.clone();
                self.advance()?;
                self.parse_term_with_modifiers(Some(field), phrase, true)
            }
            Token::Term(term) => {
                let term_str = term.clone();
                self.advance()?;
                self.parse_term_with_modifiers(Some(field), term_str, false)
            }
            Token::Minus => {
                // Negative value such as `data.amount:-5`
                let value = self.parse_negative_value()?;
                self.parse_term_with_modifiers(Some(field), value, false)
            }
            _ => Err(QueryError::QueryParse(format!(
                "Expected value after field '{}:', got {:?}",
                field, self.current_token
            ))),
        }
    }

    fn parse_exists_or_missing(&mut self, keyword: &str) -> Result<NodeId> {
        let target = match &self.current_token {
            Token::Term(term) => term.clone(),
            _ => {
                return Err(QueryError::QueryParse(format!(
                    "Expected field name after '{}:', got {:?}",
                    keyword, self.current_token
                )))
            }
        };
        self.advance()?;

        let node = if keyword == EXISTS_FIELD {
            QueryNode::Exists(ExistsNode {
                field: Some(target),
                is_negated: None,
            })
        } else {
            QueryNode::Missing(MissingNode {
                field: Some(target),
                is_negated: None,
            })
        };
        Ok(self.tree.add(node))
    }

    /// Parse a term with optional proximity/boost modifiers
    fn parse_term_with_modifiers(
        &mut self,
        field: Option<String>,
        term: String,
        is_quoted: bool,
    ) -> Result<NodeId> {
        let (proximity, boost) = self.parse_modifiers()?;

        Ok(self.tree.add(QueryNode::Term(TermNode {
            field,
            term,
            is_quoted,
            proximity,
            boost,
            ..Default::default()
        })))
    }

    /// Parse optional modifiers (tilde for fuzzy/slop, caret for boost)
    fn parse_modifiers(&mut self) -> Result<(Option<String>, Option<String>)> {
        let mut proximity = None;
        let mut boost = None;

        if let Token::Tilde(distance) = &self.current_token {
            proximity = Some(distance.clone());
            self.advance()?;
        }

        if let Token::Caret(boost_val) = &self.current_token {
            boost = Some(boost_val.clone());
            self.advance()?;
        }

        Ok((proximity, boost))
    }

    /// Parse range query: [low TO high] or {low TO high}
    fn parse_range_query(&mut self, field: String) -> Result<NodeId> {
        let min_inclusive = self.current_token == Token::LeftBracket;
        self.advance()?; // consume '[' or '{'

        let min = self.parse_range_value()?;
        self.expect(Token::To)?;
        let max = self.parse_range_value()?;

        let max_inclusive = self.current_token == Token::RightBracket;
        if self.current_token != Token::RightBracket && self.current_token != Token::RightBrace {
            return Err(QueryError::QueryParse(
                "Expected ']' or '}' at end of range".to_string(),
            ));
        }
        self.advance()?;

        Ok(self.tree.add(QueryNode::TermRange(TermRangeNode {
            field: Some(field),
            min,
            max,
            min_inclusive,
            max_inclusive,
            ..Default::default()
        })))
    }

    /// Parse a single range value; `*` is open-ended
    fn parse_range_value(&mut self) -> Result<Option<String>> {
        match &self.current_token {
            Token::Term(s) if s == "*" => {
                self.advance()?;
                Ok(None)
            }
            Token::Term(s) | Token::QuotedString(s) => {
                let value = s.clone();
                self.advance()?;
                Ok(Some(value))
            }
            Token::Minus => self.parse_negative_value().map(Some),
            _ => Err(QueryError::QueryParse(format!(
                "Expected range value, got: {:?}",
                self.current_token
            ))),
        }
    }

    fn parse_negative_value(&mut self) -> Result<String> {
        self.advance()?; // consume '-'
        match &self.current_token {
            Token::Term(term) => {
                let value = format!("-{}", term);
                self.advance()?;
                Ok(value)
            }
            _ => Err(QueryError::QueryParse(format!(
                "Expected value after '-', got {:?}",
                self.current_token
            ))),
        }
    }

    /// Check if current token can start another clause
    fn is_start_of_clause(&self) -> bool {
        matches!(
            self.current_token,
            Token::Term(_)
                | Token::QuotedString(_)
                | Token::LeftParen
                | Token::Plus
                | Token::Minus
                | Token::Not
        )
    }

    /// Advance to the next token
    fn advance(&mut self) -> Result<()> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    /// Expect a specific token and advance
    fn expect(&mut self, expected: Token) -> Result<()> {
        if std::mem::discriminant(&self.current_token) == std::mem::discriminant(&expected) {
            self.advance()
        } else {
            Err(QueryError::QueryParse(format!(
                "Expected {:?}, got {:?}",
                expected, self.current_token
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::GroupNode;

    fn parse_query(input: &str) -> Result<QueryTree> {
        QueryStringParser::new(input)?.parse()
    }

    fn root_group(tree: &QueryTree) -> &GroupNode {
        tree.group(tree.root()).unwrap()
    }

    #[test]
    fn test_field_term_wrapped_in_root_group() {
        let tree = parse_query("status:open").unwrap();
        let root = root_group(&tree);
        assert!(!root.has_parens);
        let term = tree.term(root.left.unwrap()).unwrap();
        assert_eq!(term.field.as_deref(), Some("status"));
        assert_eq!(term.term, "open");
        assert_eq!(tree.parent(root.left.unwrap()), Some(tree.root()));
    }

    #[test]
    fn test_unfielded_term() {
        let tree = parse_query("rust").unwrap();
        let term = tree.term(root_group(&tree).left.unwrap()).unwrap();
        assert!(term.field.is_none());
    }

    #[test]
    fn test_boolean_and_becomes_root() {
        let tree = parse_query("status:open AND project:123").unwrap();
        let root = root_group(&tree);
        assert_eq!(root.operator, GroupOperator::And);
        assert_eq!(tree.field(root.left.unwrap()), Some("status"));
        assert_eq!(tree.field(root.right.unwrap()), Some("project"));
    }

    #[test]
    fn test_implicit_operator() {
        let tree = parse_query("a b").unwrap();
        assert_eq!(root_group(&tree).operator, GroupOperator::Default);
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let tree = parse_query("a OR b AND c").unwrap();
        let root = root_group(&tree);
        assert_eq!(root.operator, GroupOperator::Or);
        let right = tree.group(root.right.unwrap()).unwrap();
        assert_eq!(right.operator, GroupOperator::And);
    }

    #[test]
    fn test_parenthesized_group() {
        let tree = parse_query("(organization:abc OR status:open)").unwrap();
        let root = root_group(&tree);
        let inner = tree.group(root.left.unwrap()).unwrap();
        assert!(inner.has_parens);
        assert_eq!(inner.operator, GroupOperator::Or);
    }

    #[test]
    fn test_single_term_parens() {
        let tree = parse_query("(status:open)").unwrap();
        let inner_id = root_group(&tree).left.unwrap();
        let inner = tree.group(inner_id).unwrap();
        assert!(inner.has_parens);
        assert!(tree.term(inner.left.unwrap()).is_some());
        assert_eq!(tree.parent(inner.left.unwrap()), Some(inner_id));
    }

    #[test]
    fn test_negation() {
        let tree = parse_query("NOT status:open -type:error").unwrap();
        let root = root_group(&tree);
        assert_eq!(tree.is_negated(root.left.unwrap()), Some(true));
        assert_eq!(tree.is_negated(root.right.unwrap()), Some(true));
    }

    #[test]
    fn test_negated_group() {
        let tree = parse_query("-(status:open OR status:regressed)").unwrap();
        let inner = tree.group(root_group(&tree).left.unwrap()).unwrap();
        assert_eq!(inner.is_negated, Some(true));
        assert!(inner.has_parens);
    }

    #[test]
    fn test_required() {
        let tree = parse_query("+status:open").unwrap();
        let term = tree.term(root_group(&tree).left.unwrap()).unwrap();
        assert!(term.is_required);
        assert_eq!(term.is_negated, None);
    }

    #[test]
    fn test_fielded_group() {
        let tree = parse_query("status:(open OR regressed)").unwrap();
        let group = tree.group(root_group(&tree).left.unwrap()).unwrap();
        assert_eq!(group.field.as_deref(), Some("status"));
        assert!(tree.term(group.left.unwrap()).unwrap().field.is_none());
    }

    #[test]
    fn test_range() {
        let tree = parse_query("data.count:[1 TO *}").unwrap();
        let range = match tree.node(root_group(&tree).left.unwrap()) {
            QueryNode::TermRange(range) => range.clone(),
            other => panic!("expected range, got {:?}", other),
        };
        assert_eq!(range.min.as_deref(), Some("1"));
        assert_eq!(range.max, None);
        assert!(range.min_inclusive);
        assert!(!range.max_inclusive);
    }

    #[test]
    fn test_exists_and_missing() {
        let tree = parse_query("_exists_:title AND _missing_:data.foo").unwrap();
        let root = root_group(&tree);
        assert!(matches!(tree.node(root.left.unwrap()), QueryNode::Exists(_)));
        assert!(matches!(tree.node(root.right.unwrap()), QueryNode::Missing(_)));
        assert_eq!(tree.field(root.right.unwrap()), Some("data.foo"));
    }

    #[test]
    fn test_quoted_and_modifiers() {
        let tree = parse_query("title:\"null reference\"~2^3").unwrap();
        let term = tree.term(root_group(&tree).left.unwrap()).unwrap();
        assert!(term.is_quoted);
        assert_eq!(term.term, "null reference");
        assert_eq!(term.proximity.as_deref(), Some("2"));
        assert_eq!(term.boost.as_deref(), Some("3"));
    }

    #[test]
    fn test_negative_value() {
        let tree = parse_query("data.amount:-5").unwrap();
        let term = tree.term(root_group(&tree).left.unwrap()).unwrap();
        assert_eq!(term.term, "-5");
        assert_eq!(term.is_negated, None);
    }

    #[test]
    fn test_empty_query() {
        let tree = parse_query("   ").unwrap();
        let root = root_group(&tree);
        assert!(root.left.is_none() && root.right.is_none());
    }

    #[test]
    fn test_unmatched_paren() {
        assert!(parse_query("(status:open AND type:error").is_err());
    }

    #[test]
    fn test_missing_value() {
        assert!(parse_query("status:").is_err());
        assert!(parse_query("status:open AND").is_err());
    }

    #[test]
    fn test_unterminated_range() {
        assert!(parse_query("date:[1 TO 2").is_err());
    }
}
