//! Statement parsing: queries with WITH blocks, session commands, and the
//! statement-block entry point.

use crate::ast::expr::Expr;
use crate::ast::merge_spans;
use crate::ast::stmt::{
    DeleteQuery, ForQuery, GroupQuery, InsertQuery, SelectQuery, SessionStmt, Statement,
    UpdateQuery, WithEntry,
};
use crate::lexer::token::TokenKind;
use crate::parser::QlParser;
use crate::parser::base::ParseResult;
use smol_str::SmolStr;

impl QlParser<'_> {
    /// Parses one statement, including an optional leading WITH block.
    pub(crate) fn parse_statement(&mut self) -> ParseResult<Statement> {
        let start = self.stream.current().span.clone();
        let aliases = if self.stream.check(&TokenKind::With) {
            self.parse_with_block()?
        } else {
            Vec::new()
        };

        match self.stream.current().kind {
            TokenKind::Select => self.parse_select(aliases, start),
            TokenKind::For => self.parse_for(aliases, start),
            TokenKind::Group => self.parse_group(aliases, start),
            TokenKind::Insert => self.parse_insert(aliases, start),
            TokenKind::Update => self.parse_update(aliases, start),
            TokenKind::Delete => self.parse_delete(aliases, start),
            TokenKind::Set if aliases.is_empty() => self.parse_session_set(),
            TokenKind::Create | TokenKind::Alter | TokenKind::Drop => {
                if !aliases.is_empty() {
                    return Err(self
                        .stream
                        .error_here("WITH block is not allowed before a DDL statement"));
                }
                Ok(Statement::Ddl(self.parse_ddl()?))
            }
            ref kind => Err(self
                .stream
                .error_here(format!("expected a statement, found {kind}"))),
        }
    }

    /// `WITH decl, decl, …`.
    fn parse_with_block(&mut self) -> ParseResult<Vec<WithEntry>> {
        self.stream.expect(TokenKind::With)?;
        let mut entries = Vec::new();

        loop {
            entries.push(self.parse_with_entry()?);
            if !self.stream.consume(&TokenKind::Comma) {
                break;
            }
        }

        Ok(entries)
    }

    fn parse_with_entry(&mut self) -> ParseResult<WithEntry> {
        let start = self.stream.current().span.clone();

        // `MODULE foo.bar` — default module override.
        if self.stream.check(&TokenKind::Module) {
            self.stream.advance();
            let (module, end) = self.parse_dotted_name()?;
            return Ok(WithEntry::ModuleAlias {
                alias: None,
                module,
                span: merge_spans(&start, &end),
            });
        }

        // `CARDINALITY '1'` declaration.
        if self.stream.check_ident_kw("cardinality")
            && matches!(
                self.stream.peek().map(|t| &t.kind),
                Some(TokenKind::StringLiteral(_))
            )
        {
            self.stream.advance();
            let tok = self.stream.current().clone();
            let TokenKind::StringLiteral(value) = tok.kind else {
                unreachable!("peeked string literal");
            };
            if value != "1" && value != "*" {
                return Err(self
                    .stream
                    .error_here(format!("invalid cardinality '{value}': expected '1' or '*'")));
            }
            self.stream.advance();
            return Ok(WithEntry::Cardinality {
                value: SmolStr::new(value),
                span: merge_spans(&start, &tok.span),
            });
        }

        let (alias, _) = self.stream.expect_name("an alias name")?;
        self.stream.expect(TokenKind::Turnstile)?;

        if self.stream.consume(&TokenKind::Module) {
            let (module, end) = self.parse_dotted_name()?;
            return Ok(WithEntry::ModuleAlias {
                alias: Some(alias),
                module,
                span: merge_spans(&start, &end),
            });
        }

        let expr = self.parse_expr()?;
        let span = merge_spans(&start, &expr.span());
        Ok(WithEntry::AliasedExpr { alias, expr, span })
    }

    /// A dotted module path: `foo`, `foo.bar.baz`.
    pub(crate) fn parse_dotted_name(&mut self) -> ParseResult<(SmolStr, crate::ast::Span)> {
        let (first, first_span) = self.stream.expect_name("a module name")?;
        let mut name = first.to_string();
        let mut span = first_span;

        while self.stream.consume(&TokenKind::Dot) {
            let (part, part_span) = self.stream.expect_name("a module name")?;
            name.push('.');
            name.push_str(&part);
            span = merge_spans(&span, &part_span);
        }

        Ok((SmolStr::new(name), span))
    }

    /// `[alias :=] expr` in result/subject position.
    fn parse_optionally_aliased_expr(&mut self) -> ParseResult<(Option<SmolStr>, Expr)> {
        if matches!(self.stream.current().kind, TokenKind::Ident(_))
            && matches!(self.stream.peek().map(|t| &t.kind), Some(TokenKind::Turnstile))
        {
            let (alias, _) = self.stream.expect_name("an alias")?;
            self.stream.advance(); // :=
            let expr = self.parse_expr()?;
            return Ok((Some(alias), expr));
        }
        Ok((None, self.parse_expr()?))
    }

    fn parse_select(
        &mut self,
        aliases: Vec<WithEntry>,
        start: crate::ast::Span,
    ) -> ParseResult<Statement> {
        self.stream.expect(TokenKind::Select)?;
        let (result_alias, result) = self.parse_optionally_aliased_expr()?;
        let mut span = merge_spans(&start, &result.span());

        let where_ = self.parse_opt_filter(&mut span)?;
        let orderby = self.parse_opt_orderby(&mut span)?;
        let (offset, limit) = self.parse_opt_offset_limit(&mut span)?;

        Ok(Statement::Select(SelectQuery {
            aliases,
            result,
            result_alias,
            where_,
            orderby,
            offset,
            limit,
            span,
        }))
    }

    /// `FOR x IN iterator UNION result …`.
    fn parse_for(
        &mut self,
        aliases: Vec<WithEntry>,
        start: crate::ast::Span,
    ) -> ParseResult<Statement> {
        self.stream.expect(TokenKind::For)?;
        let (iterator_alias, _) = self.stream.expect_name("an iterator alias")?;
        self.stream.expect(TokenKind::In)?;
        let iterator = self.parse_expr()?;
        self.stream.expect(TokenKind::Union)?;
        let (result_alias, result) = self.parse_optionally_aliased_expr()?;
        let mut span = merge_spans(&start, &result.span());

        let where_ = self.parse_opt_filter(&mut span)?;
        let orderby = self.parse_opt_orderby(&mut span)?;
        let (offset, limit) = self.parse_opt_offset_limit(&mut span)?;

        Ok(Statement::For(ForQuery {
            aliases,
            iterator_alias,
            iterator,
            result,
            result_alias,
            where_,
            orderby,
            offset,
            limit,
            span,
        }))
    }

    /// `GROUP subject [USING alias := expr, …] BY expr, … INTO result …`.
    fn parse_group(
        &mut self,
        aliases: Vec<WithEntry>,
        start: crate::ast::Span,
    ) -> ParseResult<Statement> {
        self.stream.expect(TokenKind::Group)?;
        let (subject_alias, subject) = self.parse_optionally_aliased_expr()?;

        let mut using = Vec::new();
        if self.stream.consume_ident_kw("using") {
            loop {
                let (alias, _) = self.stream.expect_name("an alias")?;
                self.stream.expect(TokenKind::Turnstile)?;
                using.push((alias, self.parse_expr()?));
                if !self.stream.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }

        self.stream.expect(TokenKind::By)?;
        let mut by = vec![self.parse_expr()?];
        while self.stream.consume(&TokenKind::Comma) {
            by.push(self.parse_expr()?);
        }

        if !self.stream.consume_ident_kw("into") {
            return Err(self.stream.error_here("expected INTO after GROUP BY clause"));
        }
        let (result_alias, result) = self.parse_optionally_aliased_expr()?;
        let mut span = merge_spans(&start, &result.span());

        let where_ = self.parse_opt_filter(&mut span)?;
        let orderby = self.parse_opt_orderby(&mut span)?;
        let (offset, limit) = self.parse_opt_offset_limit(&mut span)?;

        Ok(Statement::Group(GroupQuery {
            aliases,
            subject,
            subject_alias,
            using,
            by,
            result,
            result_alias,
            where_,
            orderby,
            offset,
            limit,
            span,
        }))
    }

    /// `INSERT Type { shape }` — the shape parses as part of the subject
    /// expression and is split off here.
    fn parse_insert(
        &mut self,
        aliases: Vec<WithEntry>,
        start: crate::ast::Span,
    ) -> ParseResult<Statement> {
        self.stream.expect(TokenKind::Insert)?;
        let (subject_alias, subject_expr) = self.parse_optionally_aliased_expr()?;
        let span = merge_spans(&start, &subject_expr.span());

        let (subject, shape) = match subject_expr {
            Expr::Shape(shape) => (*shape.expr, shape.elements),
            other => (other, Vec::new()),
        };

        Ok(Statement::Insert(InsertQuery {
            aliases,
            subject,
            subject_alias,
            shape,
            span,
        }))
    }

    /// `UPDATE Type [FILTER cond] SET { shape }`.
    fn parse_update(
        &mut self,
        aliases: Vec<WithEntry>,
        start: crate::ast::Span,
    ) -> ParseResult<Statement> {
        self.stream.expect(TokenKind::Update)?;
        let (subject_alias, subject) = self.parse_optionally_aliased_expr()?;
        let mut span = merge_spans(&start, &subject.span());

        let where_ = self.parse_opt_filter(&mut span)?;

        self.stream.expect(TokenKind::Set)?;
        let (shape, end) = self.parse_shape_block()?;
        span = merge_spans(&span, &end);

        Ok(Statement::Update(UpdateQuery {
            aliases,
            subject,
            subject_alias,
            where_,
            shape,
            span,
        }))
    }

    fn parse_delete(
        &mut self,
        aliases: Vec<WithEntry>,
        start: crate::ast::Span,
    ) -> ParseResult<Statement> {
        self.stream.expect(TokenKind::Delete)?;
        let (subject_alias, subject) = self.parse_optionally_aliased_expr()?;
        let mut span = merge_spans(&start, &subject.span());

        let where_ = self.parse_opt_filter(&mut span)?;

        Ok(Statement::Delete(DeleteQuery {
            aliases,
            subject,
            subject_alias,
            where_,
            span,
        }))
    }

    /// `SET MODULE foo` / `SET alias := MODULE foo`.
    fn parse_session_set(&mut self) -> ParseResult<Statement> {
        let start = self.stream.expect(TokenKind::Set)?;

        if self.stream.consume(&TokenKind::Module) {
            let (module, end) = self.parse_dotted_name()?;
            return Ok(Statement::Session(SessionStmt::SetModule {
                module,
                span: merge_spans(&start, &end),
            }));
        }

        let (alias, _) = self.stream.expect_name("an alias name")?;
        self.stream.expect(TokenKind::Turnstile)?;
        self.stream.expect(TokenKind::Module)?;
        let (module, end) = self.parse_dotted_name()?;
        Ok(Statement::Session(SessionStmt::SetAlias {
            alias,
            module,
            span: merge_spans(&start, &end),
        }))
    }

    fn parse_opt_filter(&mut self, span: &mut crate::ast::Span) -> ParseResult<Option<Expr>> {
        if self.stream.consume(&TokenKind::Filter) {
            let cond = self.parse_expr()?;
            *span = merge_spans(span, &cond.span());
            Ok(Some(cond))
        } else {
            Ok(None)
        }
    }

    fn parse_opt_orderby(
        &mut self,
        span: &mut crate::ast::Span,
    ) -> ParseResult<Vec<crate::ast::expr::SortExpr>> {
        if self.stream.check(&TokenKind::Order) {
            let sort = self.parse_order_by()?;
            if let Some(last) = sort.last() {
                *span = merge_spans(span, &last.span);
            }
            Ok(sort)
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_opt_offset_limit(
        &mut self,
        span: &mut crate::ast::Span,
    ) -> ParseResult<(Option<Expr>, Option<Expr>)> {
        let offset = if self.stream.consume(&TokenKind::Offset) {
            let expr = self.parse_expr()?;
            *span = merge_spans(span, &expr.span());
            Some(expr)
        } else {
            None
        };

        let limit = if self.stream.consume(&TokenKind::Limit) {
            let expr = self.parse_expr()?;
            *span = merge_spans(span, &expr.span());
            Some(expr)
        } else {
            None
        };

        Ok((offset, limit))
    }

    /// Parses a semicolon-separated statement sequence up to end of input.
    pub(crate) fn parse_statement_block(&mut self) -> ParseResult<Vec<Statement>> {
        let mut statements = Vec::new();

        loop {
            while self.stream.consume(&TokenKind::Semicolon) {}
            if self.stream.at_eof() {
                break;
            }
            statements.push(self.parse_statement()?);
            if !self.stream.check(&TokenKind::Semicolon) && !self.stream.at_eof() {
                return Err(self.stream.error_here(format!(
                    "expected ';' between statements, found {}",
                    self.stream.current().kind
                )));
            }
        }

        Ok(statements)
    }
}
