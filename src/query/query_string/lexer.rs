//! Lexer for query string syntax
//!
//! Tokenizes Lucene-style query strings into a stream of tokens.

use crate::error::QueryError;
use crate::Result;

/// Token types for query string parsing
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A term (unquoted word, number, date, wildcard or date-math expression)
    Term(String),
    /// A quoted string (phrase)
    QuotedString(String),

    /// AND operator
    And,
    /// OR operator
    Or,
    /// NOT operator
    Not,
    /// Colon separator (field:value)
    Colon,

    /// Tilde with the raw digits that follow it (may be empty)
    Tilde(String),
    /// Caret with the raw boost digits that follow it (may be empty)
    Caret(String),

    /// Left square bracket (inclusive range start)
    LeftBracket,
    /// Right square bracket (inclusive range end)
    RightBracket,
    /// Left curly brace (exclusive range start)
    LeftBrace,
    /// Right curly brace (exclusive range end)
    RightBrace,
    /// TO keyword for ranges
    To,

    /// Left parenthesis (grouping)
    LeftParen,
    /// Right parenthesis (grouping)
    RightParen,

    /// Plus sign (required clause)
    Plus,
    /// Minus sign (excluded clause, equivalent to NOT)
    Minus,

    /// End of input
    Eof,
}

/// Lexer for tokenizing query strings
pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    /// Create a new lexer for the given input string
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        if self.position >= self.input.len() {
            return Ok(Token::Eof);
        }

        let ch = self.current_char();

        match ch {
            ':' => {
                self.advance();
                Ok(Token::Colon)
            }
            '~' => {
                self.advance();
                Ok(Token::Tilde(self.read_number_text()))
            }
            '^' => {
                self.advance();
                Ok(Token::Caret(self.read_number_text()))
            }
            '[' => {
                self.advance();
                Ok(Token::LeftBracket)
            }
            ']' => {
                self.advance();
                Ok(Token::RightBracket)
            }
            '{' => {
                self.advance();
                Ok(Token::LeftBrace)
            }
            '}' => {
                self.advance();
                Ok(Token::RightBrace)
            }
            '(' => {
                self.advance();
                Ok(Token::LeftParen)
            }
            ')' => {
                self.advance();
                Ok(Token::RightParen)
            }
            '+' => {
                self.advance();
                Ok(Token::Plus)
            }
            '-' => {
                self.advance();
                Ok(Token::Minus)
            }
            '"' => {
                self.advance();
                self.read_quoted_string()
            }
            _ if Self::is_term_start(ch) => self.read_term(),
            _ => Err(QueryError::QueryParse(format!(
                "Unexpected character at position {}: '{}'",
                self.position, ch
            ))),
        }
    }

    /// Peek at the next token without consuming it
    pub fn peek_token(&mut self) -> Result<Token> {
        let saved_position = self.position;
        let token = self.next_token();
        self.position = saved_position;
        token
    }

    /// Check if the lexer has reached the end of input
    pub fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    fn read_term(&mut self) -> Result<Token> {
        let mut term = String::new();

        while self.position < self.input.len() {
            let ch = self.current_char();
            if ch == '\\' {
                // Escaped characters stay escaped so the term regenerates verbatim
                term.push(ch);
                self.advance();
                if self.position < self.input.len() {
                    term.push(self.current_char());
                    self.advance();
                }
            } else if Self::is_term_char(ch) {
                term.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // Check for keywords (case-insensitive)
        match term.to_uppercase().as_str() {
            "AND" | "&&" => Ok(Token::And),
            "OR" | "||" => Ok(Token::Or),
            "NOT" => Ok(Token::Not),
            "TO" => Ok(Token::To),
            _ => Ok(Token::Term(term)),
        }
    }

    fn read_quoted_string(&mut self) -> Result<Token> {
        let mut s = String::new();

        while self.position < self.input.len() {
            let ch = self.current_char();
            if ch == '"' {
                self.advance();
                return Ok(Token::QuotedString(s));
            }
            if ch == '\\' {
                self.advance();
                if self.position < self.input.len() {
                    let escaped = self.current_char();
                    match escaped {
                        '"' | '\\' => s.push(escaped),
                        _ => {
                            s.push('\\');
                            s.push(escaped);
                        }
                    }
                    self.advance();
                }
            } else {
                s.push(ch);
                self.advance();
            }
        }

        Err(QueryError::QueryParse(
            "Unterminated quoted string".to_string(),
        ))
    }

    fn read_number_text(&mut self) -> String {
        let mut num_str = String::new();
        let mut has_dot = false;

        while self.position < self.input.len() {
            let ch = self.current_char();
            if ch.is_ascii_digit() {
                num_str.push(ch);
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                num_str.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        num_str
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.position < self.input.len() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    /// Check if a character can start a term
    fn is_term_start(ch: char) -> bool {
        ch.is_alphanumeric()
            || ch == '_'
            || ch == '@'
            || ch == '#'
            || ch == '*'
            || ch == '?'
            || ch == '.'
            || ch == '\\'
            || ch == '&'
            || ch == '|'
    }

    /// Check if a character can be part of a term
    fn is_term_char(ch: char) -> bool {
        ch.is_alphanumeric()
            || ch == '_'
            || ch == '-'
            || ch == '+'
            || ch == '/'
            || ch == '.'
            || ch == '@'
            || ch == '#'
            || ch == '*'
            || ch == '?'
            || ch == '&'
            || ch == '|'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token == Token::Eof {
                break;
            }
            tokens.push(token);
        }
        tokens
    }

    fn term(s: &str) -> Token {
        Token::Term(s.to_string())
    }

    #[test]
    fn test_simple_term() {
        let mut lexer = Lexer::new("hello");
        assert_eq!(lexer.next_token().unwrap(), term("hello"));
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
        assert!(lexer.is_eof());
    }

    #[test]
    fn test_field_value() {
        assert_eq!(
            tokens("status:open"),
            vec![term("status"), Token::Colon, term("open")]
        );
    }

    #[test]
    fn test_dotted_field() {
        assert_eq!(
            tokens("data.user_agent:chrome"),
            vec![term("data.user_agent"), Token::Colon, term("chrome")]
        );
    }

    #[test]
    fn test_boolean_operators() {
        assert_eq!(
            tokens("a AND b OR c NOT d"),
            vec![
                term("a"),
                Token::And,
                term("b"),
                Token::Or,
                term("c"),
                Token::Not,
                term("d")
            ]
        );
    }

    #[test]
    fn test_case_insensitive_operators() {
        assert_eq!(
            tokens("a and b or c not d"),
            vec![
                term("a"),
                Token::And,
                term("b"),
                Token::Or,
                term("c"),
                Token::Not,
                term("d")
            ]
        );
    }

    #[test]
    fn test_quoted_string_escaped() {
        assert_eq!(
            tokens("\"hello \\\"world\\\"\""),
            vec![Token::QuotedString("hello \"world\"".to_string())]
        );
    }

    #[test]
    fn test_numbers_and_dates_are_terms() {
        assert_eq!(
            tokens("42 3.14 2024-01-15"),
            vec![term("42"), term("3.14"), term("2024-01-15")]
        );
    }

    #[test]
    fn test_minus_before_number() {
        // Minus is treated as operator, not negative number
        assert_eq!(tokens("-10"), vec![Token::Minus, term("10")]);
    }

    #[test]
    fn test_date_math() {
        assert_eq!(
            tokens("[now TO now/d+1d}"),
            vec![
                Token::LeftBracket,
                term("now"),
                Token::To,
                term("now/d+1d"),
                Token::RightBrace
            ]
        );
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(
            tokens("*error prog* [* TO 5]"),
            vec![
                term("*error"),
                term("prog*"),
                Token::LeftBracket,
                term("*"),
                Token::To,
                term("5"),
                Token::RightBracket
            ]
        );
    }

    #[test]
    fn test_modifiers() {
        assert_eq!(
            tokens("rust~2 rust~ rust^2.5"),
            vec![
                term("rust"),
                Token::Tilde("2".to_string()),
                term("rust"),
                Token::Tilde(String::new()),
                term("rust"),
                Token::Caret("2.5".to_string())
            ]
        );
    }

    #[test]
    fn test_plus_minus() {
        assert_eq!(
            tokens("+required -excluded"),
            vec![
                Token::Plus,
                term("required"),
                Token::Minus,
                term("excluded")
            ]
        );
    }

    #[test]
    fn test_exists() {
        assert_eq!(
            tokens("_exists_:data.foo"),
            vec![term("_exists_"), Token::Colon, term("data.foo")]
        );
    }

    #[test]
    fn test_escaped_term() {
        assert_eq!(tokens("path:c\\:\\\\tmp"), vec![term("path"), Token::Colon, term("c\\:\\\\tmp")]);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut lexer = Lexer::new("a b");
        assert_eq!(lexer.peek_token().unwrap(), term("a"));
        assert_eq!(lexer.next_token().unwrap(), term("a"));
        assert_eq!(lexer.next_token().unwrap(), term("b"));
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("\"unterminated");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn test_unexpected_character() {
        let mut lexer = Lexer::new("status:open !");
        lexer.next_token().unwrap();
        lexer.next_token().unwrap();
        lexer.next_token().unwrap();
        assert!(lexer.next_token().is_err());
    }
}
