//! Shared parser infrastructure: token navigation and error helpers.

use crate::ast::Span;
use crate::diag::Diag;
use crate::lexer::token::{Token, TokenKind};
use smol_str::SmolStr;

/// Parse error carried as a boxed diagnostic.
pub type ParseError = Box<Diag>;

/// Result type for all parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Token stream navigator.
///
/// Provides lookahead, matching, and backtracking over the lexed token
/// slice. The slice is guaranteed non-empty and `Eof`-terminated by the
/// parser entry points.
pub struct TokenStream<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenStream<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// The current token; clamps to the final `Eof`.
    pub fn current(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("token stream must be non-empty"))
    }

    /// The token after the current one.
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    pub fn advance(&mut self) {
        if self.pos < self.tokens.len().saturating_sub(1) {
            self.pos += 1;
        }
    }

    pub fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    /// True when the current token is an identifier spelling `word`
    /// case-insensitively (used for unreserved keywords).
    pub fn check_ident_kw(&self, word: &str) -> bool {
        match &self.current().kind {
            TokenKind::Ident(name) => name.eq_ignore_ascii_case(word),
            _ => false,
        }
    }

    /// Consumes an unreserved-keyword identifier when it matches.
    pub fn consume_ident_kw(&mut self, word: &str) -> bool {
        if self.check_ident_kw(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expects `kind` and returns its span, or an error diagnostic.
    pub fn expect(&mut self, kind: TokenKind) -> ParseResult<Span> {
        if self.check(&kind) {
            let span = self.current().span.clone();
            self.advance();
            Ok(span)
        } else {
            Err(self.error_here(format!("expected {kind}, found {}", self.current().kind)))
        }
    }

    /// Expects a name token: identifier or quoted identifier.
    ///
    /// Reserved keywords are rejected with a dedicated message, per the rule
    /// that they cannot serve as short names.
    pub fn expect_name(&mut self, what: &str) -> ParseResult<(SmolStr, Span)> {
        let tok = self.current();
        match &tok.kind {
            TokenKind::Ident(name) | TokenKind::QuotedIdent(name) => {
                let result = (name.clone(), tok.span.clone());
                self.advance();
                Ok(result)
            }
            kind if kind.is_reserved_keyword() => {
                let word = kind.keyword_text().unwrap_or("this word");
                Err(Box::new(
                    Diag::error(format!(
                        "reserved keyword {word} cannot be used as {what}"
                    ))
                    .with_primary_label(tok.span.clone(), "reserved keyword")
                    .with_help("enclose the name in backquotes to use it as an identifier"),
                ))
            }
            kind => Err(self.error_here(format!("expected {what}, found {kind}"))),
        }
    }

    pub fn error_here(&self, message: impl Into<String>) -> ParseError {
        Box::new(
            Diag::error(message.into()).with_primary_label(self.current().span.clone(), "here"),
        )
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Rewinds to a previously saved position (backtracking).
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.tokens.len().saturating_sub(1));
    }

    /// Span of the most recently consumed token.
    pub fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span.clone()
        } else {
            self.current().span.clone()
        }
    }

    pub fn at_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks() -> Vec<Token> {
        vec![
            Token::new(TokenKind::Select, 0..6),
            Token::new(TokenKind::Ident("User".into()), 7..11),
            Token::new(TokenKind::Semicolon, 11..12),
            Token::new(TokenKind::Eof, 12..12),
        ]
    }

    #[test]
    fn navigation_and_clamping() {
        let tokens = toks();
        let mut stream = TokenStream::new(&tokens);
        assert_eq!(stream.current().kind, TokenKind::Select);
        stream.advance();
        stream.advance();
        stream.advance();
        stream.advance(); // clamped at Eof
        assert!(stream.at_eof());
    }

    #[test]
    fn expect_reports_found_token() {
        let tokens = toks();
        let mut stream = TokenStream::new(&tokens);
        let err = stream.expect(TokenKind::Insert).unwrap_err();
        assert!(err.message.contains("keyword INSERT"));
        assert!(err.message.contains("keyword SELECT"));
        // Failed expect does not consume.
        assert_eq!(stream.current().kind, TokenKind::Select);
    }

    #[test]
    fn expect_name_rejects_reserved_keywords() {
        let tokens = toks();
        let mut stream = TokenStream::new(&tokens);
        let err = stream.expect_name("a module name").unwrap_err();
        assert!(err.message.contains("reserved keyword"));
    }

    #[test]
    fn backtracking() {
        let tokens = toks();
        let mut stream = TokenStream::new(&tokens);
        let mark = stream.position();
        stream.advance();
        stream.advance();
        stream.set_position(mark);
        assert_eq!(stream.current().kind, TokenKind::Select);
    }

    #[test]
    fn ident_keyword_matching_is_case_insensitive() {
        let tokens = vec![
            Token::new(TokenKind::Ident("TYPE".into()), 0..4),
            Token::new(TokenKind::Eof, 4..4),
        ];
        let mut stream = TokenStream::new(&tokens);
        assert!(stream.check_ident_kw("type"));
        assert!(stream.consume_ident_kw("Type"));
        assert!(stream.at_eof());
    }
}
