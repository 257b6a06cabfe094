//! Lucene-style query string parser
//!
//! Supports syntax like:
//! - `status:open AND project:537650f3b77efe23a47914f4`
//! - `data.age:[18 TO 65]` and `date:[now-7d TO now}`
//! - `_exists_:reference` / `_missing_:data.user`
//! - `-(status:open OR status:regressed)`
//! - `status:(open OR regressed)`
//!
//! # Example
//!
//! ```rust
//! use event_query::query::query_string::parse;
//!
//! let tree = parse("status:open AND project:123").unwrap();
//! assert!(tree.group(tree.root()).is_some());
//! ```

pub mod lexer;
pub mod parser;

pub use lexer::{Lexer, Token};
pub use parser::QueryStringParser;

use crate::query::ast::QueryTree;
use crate::Result;

/// Parse a query string into a fresh tree
pub fn parse(input: &str) -> Result<QueryTree> {
    QueryStringParser::new(input)?.parse()
}
