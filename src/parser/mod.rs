//! Parser infrastructure for EdgeQL.
//!
//! The parser consumes the lexed token stream and produces AST nodes with
//! full span propagation: every node's span is the union of its
//! constituents' spans. Three entry points mirror the public API: single
//! statement (bare expressions are promoted to `SELECT`), bare fragment,
//! and semicolon-separated block.

pub mod base;
mod ddl;
mod expr;
mod shape;
mod stmt;

use crate::ast::expr::Expr;
use crate::ast::stmt::{SelectQuery, Statement, WithEntry};
use crate::diag::{Diag, SourceFile, reports_from_diags};
use crate::lexer::{self, token::TokenKind};
use base::{ParseResult as InnerResult, TokenStream};
use miette::Report;
use smol_str::SmolStr;

/// Result of parsing a statement.
#[derive(Debug)]
pub struct ParseResult {
    /// The parsed statement, or `None` on failure.
    pub ast: Option<Statement>,
    /// Rendered diagnostics from lexing and parsing.
    pub diagnostics: Vec<Report>,
}

/// Result of parsing an expression fragment.
#[derive(Debug)]
pub struct FragmentResult {
    pub ast: Option<Expr>,
    pub diagnostics: Vec<Report>,
}

/// Result of parsing a statement block.
#[derive(Debug)]
pub struct BlockResult {
    pub ast: Option<Vec<Statement>>,
    pub diagnostics: Vec<Report>,
}

/// Internal recursive-descent parser; one instance per source unit.
pub(crate) struct QlParser<'a> {
    pub(crate) stream: TokenStream<'a>,
}

impl<'a> QlParser<'a> {
    pub(crate) fn new(tokens: &'a [lexer::token::Token]) -> Self {
        Self {
            stream: TokenStream::new(tokens),
        }
    }

    /// A single statement; bare expressions are wrapped into `SELECT`.
    fn parse_single(&mut self) -> InnerResult<Statement> {
        let stmt = if is_statement_start(&self.stream) {
            self.parse_statement()?
        } else {
            let expr = self.parse_expr()?;
            Statement::Select(SelectQuery::wrapping(expr))
        };

        self.expect_input_end()?;
        Ok(stmt)
    }

    fn parse_fragment_only(&mut self) -> InnerResult<Expr> {
        let expr = self.parse_expr()?;
        self.expect_input_end()?;
        Ok(expr)
    }

    fn expect_input_end(&mut self) -> InnerResult<()> {
        while self.stream.consume(&TokenKind::Semicolon) {}
        if !self.stream.at_eof() {
            return Err(self.stream.error_here(format!(
                "unexpected {} after the end of the statement",
                self.stream.current().kind
            )));
        }
        Ok(())
    }
}

fn is_statement_start(stream: &TokenStream<'_>) -> bool {
    matches!(
        stream.current().kind,
        TokenKind::With
            | TokenKind::Select
            | TokenKind::For
            | TokenKind::Group
            | TokenKind::Insert
            | TokenKind::Update
            | TokenKind::Delete
            | TokenKind::Set
            | TokenKind::Create
            | TokenKind::Alter
            | TokenKind::Drop
    )
}

fn run_parse<T>(
    source: &str,
    parse: impl FnOnce(&mut QlParser<'_>) -> InnerResult<T>,
) -> (Option<T>, Vec<Report>) {
    let lexed = lexer::tokenize(source);
    let mut diags: Vec<Diag> = lexed.diagnostics;

    let ast = if diags.is_empty() {
        let mut parser = QlParser::new(&lexed.tokens);
        match parse(&mut parser) {
            Ok(ast) => Some(ast),
            Err(diag) => {
                diags.push(*diag);
                None
            }
        }
    } else {
        None
    };

    let file = SourceFile::new(source);
    (ast, reports_from_diags(&diags, &file))
}

/// Parses a single statement. Bare expressions are promoted to
/// `SELECT expr`.
pub fn parse(source: &str) -> ParseResult {
    let (ast, diagnostics) = run_parse(source, |p| QlParser::parse_single(p));
    ParseResult { ast, diagnostics }
}

/// Parses a statement and merges programmatic module aliases into its WITH
/// block.
pub fn parse_with_aliases(
    source: &str,
    modaliases: &[(Option<SmolStr>, SmolStr)],
) -> ParseResult {
    let mut result = parse(source);

    if let Some(stmt) = result.ast.as_mut()
        && let Some(aliases) = stmt.aliases_mut()
    {
        for (alias, module) in modaliases {
            aliases.push(WithEntry::ModuleAlias {
                alias: alias.clone(),
                module: module.clone(),
                span: 0..0,
            });
        }
    }

    result
}

/// Parses a bare expression fragment.
pub fn parse_fragment(source: &str) -> FragmentResult {
    let (ast, diagnostics) = run_parse(source, |p| QlParser::parse_fragment_only(p));
    FragmentResult { ast, diagnostics }
}

/// Parses a semicolon-separated sequence of statements (DDL included).
pub fn parse_block(source: &str) -> BlockResult {
    let (ast, diagnostics) = run_parse(source, |p| p.parse_statement_block());
    BlockResult { ast, diagnostics }
}

/// Fragment parse for internal callers (computables, defaults) that keeps
/// the structured diagnostic.
pub(crate) fn parse_fragment_internal(source: &str) -> Result<Expr, Box<Diag>> {
    let lexed = lexer::tokenize(source);
    if let Some(diag) = lexed.diagnostics.into_iter().next() {
        return Err(Box::new(diag));
    }
    let mut parser = QlParser::new(&lexed.tokens);
    parser.parse_fragment_only()
}

/// Statement parse for internal callers (stored view bodies).
pub(crate) fn parse_statement_internal(source: &str) -> Result<Statement, Box<Diag>> {
    let lexed = lexer::tokenize(source);
    if let Some(diag) = lexed.diagnostics.into_iter().next() {
        return Err(Box::new(diag));
    }
    let mut parser = QlParser::new(&lexed.tokens);
    parser.parse_single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::{BinOpKind, Constant};

    #[test]
    fn bare_expression_is_wrapped_in_select() {
        let result = parse("40 + 2");
        assert!(result.diagnostics.is_empty());
        let Some(Statement::Select(q)) = result.ast else {
            panic!("expected a select statement");
        };
        assert!(matches!(
            q.result,
            Expr::BinOp {
                op: BinOpKind::Add,
                ..
            }
        ));
    }

    #[test]
    fn lexer_errors_stop_parsing() {
        let result = parse("SELECT ~");
        assert!(result.ast.is_none());
        assert!(!result.diagnostics.is_empty());
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let result = parse("SELECT 1 1");
        assert!(result.ast.is_none());
        assert!(!result.diagnostics.is_empty());
    }

    #[test]
    fn fragment_parses_expression_only() {
        let result = parse_fragment("1 + 2 * 3");
        let Some(Expr::BinOp { op, right, .. }) = result.ast else {
            panic!("expected binop");
        };
        assert_eq!(op, BinOpKind::Add);
        assert!(matches!(
            *right,
            Expr::BinOp {
                op: BinOpKind::Mul,
                ..
            }
        ));
    }

    #[test]
    fn block_splits_on_semicolons() {
        let result = parse_block("SELECT 1; SELECT 2;");
        let stmts = result.ast.expect("block should parse");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn module_aliases_are_merged() {
        let result = parse_with_aliases(
            "SELECT 1",
            &[(Some("m".into()), "my.module".into())],
        );
        let Some(Statement::Select(q)) = result.ast else {
            panic!("expected select");
        };
        assert_eq!(q.aliases.len(), 1);
    }

    #[test]
    fn constants_parse() {
        let result = parse_fragment("3.5");
        assert!(matches!(
            result.ast,
            Some(Expr::Constant(Constant::Float(v), _)) if (v - 3.5).abs() < f64::EPSILON
        ));
    }
}
