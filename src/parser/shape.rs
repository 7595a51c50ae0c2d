//! Shape parsing: `Expr { elem, elem, … }`.
//!
//! A shape element is a pointer spec (optionally direction-prefixed,
//! type-qualified, or a link property), a recursion marker, a sub-shape, an
//! explicit computable, and optional per-element clauses.

use crate::ast::expr::{
    Expr, Path, PathStep, Ptr, PtrDirection, PtrKind, Shape, ShapeElement,
};
use crate::ast::merge_spans;
use crate::lexer::token::TokenKind;
use crate::parser::QlParser;
use crate::parser::base::ParseResult;

impl QlParser<'_> {
    /// Parses `{ elements }` following `subject` and wraps both in a shape.
    pub(crate) fn parse_shape_for(&mut self, subject: Expr) -> ParseResult<Expr> {
        let start = subject.span();
        let (elements, end) = self.parse_shape_block()?;
        let span = merge_spans(&start, &end);
        Ok(Expr::Shape(Shape {
            expr: Box::new(subject),
            elements,
            span,
        }))
    }

    /// Parses a braced element list, returning the elements and the span of
    /// the closing brace.
    pub(crate) fn parse_shape_block(
        &mut self,
    ) -> ParseResult<(Vec<ShapeElement>, crate::ast::Span)> {
        self.stream.expect(TokenKind::LBrace)?;
        let mut elements = Vec::new();

        while !self.stream.check(&TokenKind::RBrace) {
            elements.push(self.parse_shape_element()?);
            if !self.stream.consume(&TokenKind::Comma) {
                break;
            }
        }

        let end = self.stream.expect(TokenKind::RBrace)?;
        Ok((elements, end))
    }

    fn parse_shape_element(&mut self) -> ParseResult<ShapeElement> {
        let path = self.parse_shape_path()?;
        let mut element = ShapeElement::pointer(path);
        let mut span = element.span.clone();

        // `link*` or `link*3` recursion marker.
        if self.stream.consume(&TokenKind::Star) {
            element.recurse = true;
            span = merge_spans(&span, &self.stream.previous_span());
            if let TokenKind::IntLiteral(_) = self.stream.current().kind {
                let limit = self.parse_expr()?;
                span = merge_spans(&span, &limit.span());
                element.recurse_limit = Some(limit);
            }
        }

        if self.stream.consume(&TokenKind::Colon) {
            // Sub-shape, optionally prefixed by a target type:
            // `friends: { name }`, `owner: User { name }`, `pet: Animal`.
            if self.stream.check(&TokenKind::LBrace) {
                let (nested, end) = self.parse_shape_block()?;
                element.elements = nested;
                span = merge_spans(&span, &end);
            } else {
                let target = self.parse_class_ref("a type name")?;
                span = merge_spans(&span, &target.span);
                set_tip_target(&mut element.path, target)
                    .map_err(|msg| self.stream.error_here(msg))?;
                if self.stream.check(&TokenKind::LBrace) {
                    let (nested, end) = self.parse_shape_block()?;
                    element.elements = nested;
                    span = merge_spans(&span, &end);
                }
            }
        } else if self.stream.consume(&TokenKind::Turnstile) {
            let compexpr = self.parse_expr()?;
            span = merge_spans(&span, &compexpr.span());
            element.compexpr = Some(compexpr);
        }

        if self.stream.consume(&TokenKind::Filter) {
            let cond = self.parse_expr()?;
            span = merge_spans(&span, &cond.span());
            element.where_ = Some(cond);
        }

        if self.stream.check(&TokenKind::Order) {
            let sort = self.parse_order_by()?;
            if let Some(last) = sort.last() {
                span = merge_spans(&span, &last.span);
            }
            element.orderby = sort;
        }

        if self.stream.consume(&TokenKind::Offset) {
            let offset = self.parse_expr()?;
            span = merge_spans(&span, &offset.span());
            element.offset = Some(offset);
        }

        if self.stream.consume(&TokenKind::Limit) {
            let limit = self.parse_expr()?;
            span = merge_spans(&span, &limit.span());
            element.limit = Some(limit);
        }

        element.span = span;
        Ok(element)
    }

    /// The pointer spec of a shape element.
    ///
    /// Accepted forms: `name`, `.name`, `.>name`, `.<name`, `@prop`,
    /// `Type.name`, each with an optional `[IS Target]` filter.
    fn parse_shape_path(&mut self) -> ParseResult<Path> {
        let tok = self.stream.current().clone();

        let mut path = match &tok.kind {
            TokenKind::At => {
                self.stream.advance();
                let (name, end) = self.stream.expect_name("a link property name")?;
                let span = merge_spans(&tok.span, &end);
                Path {
                    steps: vec![PathStep::Ptr(Ptr {
                        module: None,
                        name,
                        direction: PtrDirection::Outbound,
                        kind: PtrKind::Property,
                        target: None,
                        span: span.clone(),
                    })],
                    partial: true,
                    span,
                }
            }
            TokenKind::Dot | TokenKind::DotFw | TokenKind::DotBw => {
                let direction = if matches!(tok.kind, TokenKind::DotBw) {
                    PtrDirection::Inbound
                } else {
                    PtrDirection::Outbound
                };
                self.stream.advance();
                let (name, end) = self.stream.expect_name("a pointer name")?;
                let span = merge_spans(&tok.span, &end);
                Path {
                    steps: vec![PathStep::Ptr(Ptr {
                        module: None,
                        name,
                        direction,
                        kind: PtrKind::Link,
                        target: None,
                        span: span.clone(),
                    })],
                    partial: true,
                    span,
                }
            }
            TokenKind::Ident(_) | TokenKind::QuotedIdent(_) => {
                let first = self.parse_class_ref("a pointer name")?;

                if self.stream.check(&TokenKind::Dot) {
                    // `Type.ptr` — pointer qualified by its source type.
                    self.stream.advance();
                    let (name, end) = self.stream.expect_name("a pointer name")?;
                    let span = merge_spans(&first.span, &end);
                    Path {
                        steps: vec![
                            PathStep::Root(first),
                            PathStep::Ptr(Ptr {
                                module: None,
                                name,
                                direction: PtrDirection::Outbound,
                                kind: PtrKind::Link,
                                target: None,
                                span: self.stream.previous_span(),
                            }),
                        ],
                        partial: false,
                        span,
                    }
                } else {
                    let span = first.span.clone();
                    Path {
                        steps: vec![PathStep::Ptr(Ptr {
                            module: first.module,
                            name: first.name,
                            direction: PtrDirection::Outbound,
                            kind: PtrKind::Link,
                            target: None,
                            span: span.clone(),
                        })],
                        partial: true,
                        span,
                    }
                }
            }
            kind => {
                return Err(self
                    .stream
                    .error_here(format!("expected a shape element, found {kind}")));
            }
        };

        // `[IS Target]` on the pointer itself.
        if self.stream.check(&TokenKind::LBracket)
            && matches!(self.stream.peek().map(|t| &t.kind), Some(TokenKind::Is))
        {
            self.stream.advance();
            self.stream.advance();
            let target = self.parse_class_ref("a type name")?;
            let end = self.stream.expect(TokenKind::RBracket)?;
            path.span = merge_spans(&path.span, &end);
            set_tip_target(&mut path, target).map_err(|msg| self.stream.error_here(msg))?;
        }

        Ok(path)
    }
}

/// Sets the `[IS T]` target on the final pointer step of a shape path.
fn set_tip_target(
    path: &mut Path,
    target: crate::ast::expr::ClassRef,
) -> Result<(), &'static str> {
    match path.steps.last_mut() {
        Some(PathStep::Ptr(ptr)) if ptr.target.is_none() => {
            ptr.target = Some(target);
            Ok(())
        }
        Some(PathStep::Ptr(_)) => Err("duplicate type filter on shape pointer"),
        _ => Err("type filter requires a pointer"),
    }
}
