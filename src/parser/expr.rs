//! Expression parsing.
//!
//! One method per precedence level, loosest binding first. The ladder,
//! from loosest to tightest: `UNION`, `IF…ELSE`, `OR`, `AND`, `NOT`/`EXISTS`,
//! `=`, `<`/`>`, `LIKE`/`ILIKE`, `IN`, the `!= >= <= ?= ?!=` family,
//! `IS`, `+`/`-`, `*`/`/`/`%`, `??`, unary sign, `^`, `<T>` cast, and
//! finally path steps and indirection.

use crate::ast::expr::{
    BinOpKind, ClassRef, Constant, Expr, FuncArg, FunctionCall, IndirectionEl, NamedTupleElement,
    NonesOrder, Path, PathStep, Ptr, PtrDirection, PtrKind, SortDirection, SortExpr, TypeName,
    UnaryOpKind,
};
use crate::ast::merge_spans;
use crate::lexer::token::TokenKind;
use crate::parser::QlParser;
use crate::parser::base::ParseResult;
use smol_str::SmolStr;

impl QlParser<'_> {
    /// Parses a full expression.
    pub(crate) fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_union_expr()
    }

    /// `a UNION b UNION c` — left-associative.
    fn parse_union_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_distinct_expr()?;

        while self.stream.check(&TokenKind::Union) {
            self.stream.advance();
            let right = self.parse_distinct_expr()?;
            let span = merge_spans(&left.span(), &right.span());
            left = Expr::BinOp {
                left: Box::new(left),
                op: BinOpKind::Union,
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    /// Prefix `DISTINCT expr` — its own level, binding tighter than
    /// `UNION` and looser than `IF…ELSE`.
    fn parse_distinct_expr(&mut self) -> ParseResult<Expr> {
        if self.stream.check(&TokenKind::Distinct) {
            let start = self.stream.current().span.clone();
            self.stream.advance();
            let operand = self.parse_distinct_expr()?;
            let span = merge_spans(&start, &operand.span());
            return Ok(Expr::UnaryOp {
                op: UnaryOpKind::Distinct,
                operand: Box::new(operand),
                span,
            });
        }

        self.parse_ifelse_expr()
    }

    /// `x IF cond ELSE y` — right-associative.
    fn parse_ifelse_expr(&mut self) -> ParseResult<Expr> {
        let if_expr = self.parse_or_expr()?;

        if self.stream.check(&TokenKind::If) {
            self.stream.advance();
            let condition = self.parse_or_expr()?;
            self.stream.expect(TokenKind::Else)?;
            let else_expr = self.parse_ifelse_expr()?;
            let span = merge_spans(&if_expr.span(), &else_expr.span());
            return Ok(Expr::IfElse {
                if_expr: Box::new(if_expr),
                condition: Box::new(condition),
                else_expr: Box::new(else_expr),
                span,
            });
        }

        Ok(if_expr)
    }

    fn parse_or_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and_expr()?;
        while self.stream.check(&TokenKind::Or) {
            self.stream.advance();
            let right = self.parse_and_expr()?;
            let span = merge_spans(&left.span(), &right.span());
            left = Expr::BinOp {
                left: Box::new(left),
                op: BinOpKind::Or,
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_not_expr()?;
        while self.stream.check(&TokenKind::And) {
            self.stream.advance();
            let right = self.parse_not_expr()?;
            let span = merge_spans(&left.span(), &right.span());
            left = Expr::BinOp {
                left: Box::new(left),
                op: BinOpKind::And,
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    /// Prefix `NOT` and `EXISTS` share this binding level.
    fn parse_not_expr(&mut self) -> ParseResult<Expr> {
        if self.stream.check(&TokenKind::Not) {
            let start = self.stream.current().span.clone();
            self.stream.advance();
            let operand = self.parse_not_expr()?;
            let span = merge_spans(&start, &operand.span());
            return Ok(Expr::UnaryOp {
                op: UnaryOpKind::Not,
                operand: Box::new(operand),
                span,
            });
        }

        if self.stream.check(&TokenKind::Exists) {
            let start = self.stream.current().span.clone();
            self.stream.advance();
            let operand = self.parse_not_expr()?;
            let span = merge_spans(&start, &operand.span());
            return Ok(Expr::Exists {
                expr: Box::new(operand),
                span,
            });
        }

        self.parse_eq_expr()
    }

    /// `=` — right-associative.
    fn parse_eq_expr(&mut self) -> ParseResult<Expr> {
        let left = self.parse_angle_cmp_expr()?;
        if self.stream.check(&TokenKind::Eq) {
            self.stream.advance();
            let right = self.parse_eq_expr()?;
            let span = merge_spans(&left.span(), &right.span());
            return Ok(Expr::BinOp {
                left: Box::new(left),
                op: BinOpKind::Eq,
                right: Box::new(right),
                span,
            });
        }
        Ok(left)
    }

    /// `<` / `>` comparisons — non-associative.
    fn parse_angle_cmp_expr(&mut self) -> ParseResult<Expr> {
        let left = self.parse_like_expr()?;

        let op = match self.stream.current().kind {
            TokenKind::Lt => Some(BinOpKind::Lt),
            TokenKind::Gt => Some(BinOpKind::Gt),
            _ => None,
        };

        if let Some(op) = op {
            self.stream.advance();
            let right = self.parse_like_expr()?;
            if matches!(self.stream.current().kind, TokenKind::Lt | TokenKind::Gt) {
                return Err(self
                    .stream
                    .error_here("comparison operators cannot be chained without parentheses"));
            }
            let span = merge_spans(&left.span(), &right.span());
            return Ok(Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
                span,
            });
        }

        Ok(left)
    }

    /// `LIKE` / `ILIKE` and their `NOT` forms — non-associative.
    fn parse_like_expr(&mut self) -> ParseResult<Expr> {
        let left = self.parse_in_expr()?;

        let op = match (&self.stream.current().kind, self.stream.peek().map(|t| &t.kind)) {
            (TokenKind::Like, _) => Some((BinOpKind::Like, 1)),
            (TokenKind::Ilike, _) => Some((BinOpKind::Ilike, 1)),
            (TokenKind::Not, Some(TokenKind::Like)) => Some((BinOpKind::NotLike, 2)),
            (TokenKind::Not, Some(TokenKind::Ilike)) => Some((BinOpKind::NotIlike, 2)),
            _ => None,
        };

        if let Some((op, tokens)) = op {
            for _ in 0..tokens {
                self.stream.advance();
            }
            let right = self.parse_in_expr()?;
            let span = merge_spans(&left.span(), &right.span());
            return Ok(Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
                span,
            });
        }

        Ok(left)
    }

    /// `IN` / `NOT IN` — non-associative.
    fn parse_in_expr(&mut self) -> ParseResult<Expr> {
        let left = self.parse_op_family_expr()?;

        let op = match (&self.stream.current().kind, self.stream.peek().map(|t| &t.kind)) {
            (TokenKind::In, _) => Some((BinOpKind::In, 1)),
            (TokenKind::Not, Some(TokenKind::In)) => Some((BinOpKind::NotIn, 2)),
            _ => None,
        };

        if let Some((op, tokens)) = op {
            for _ in 0..tokens {
                self.stream.advance();
            }
            let right = self.parse_op_family_expr()?;
            let span = merge_spans(&left.span(), &right.span());
            return Ok(Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
                span,
            });
        }

        Ok(left)
    }

    /// The `!= >= <= ?= ?!=` family — left-associative.
    fn parse_op_family_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_is_expr()?;

        loop {
            let op = match self.stream.current().kind {
                TokenKind::NotEq => BinOpKind::NotEq,
                TokenKind::GtEq => BinOpKind::GtEq,
                TokenKind::LtEq => BinOpKind::LtEq,
                TokenKind::QEq => BinOpKind::EquivEq,
                TokenKind::QNotEq => BinOpKind::EquivNotEq,
                _ => break,
            };
            self.stream.advance();
            let right = self.parse_is_expr()?;
            let span = merge_spans(&left.span(), &right.span());
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    /// `IS` / `IS NOT` type checks — non-associative. The right operand is
    /// a type reference expression.
    fn parse_is_expr(&mut self) -> ParseResult<Expr> {
        let left = self.parse_additive_expr()?;

        if self.stream.check(&TokenKind::Is) {
            self.stream.advance();
            let op = if self.stream.consume(&TokenKind::Not) {
                BinOpKind::IsNot
            } else {
                BinOpKind::Is
            };
            let right = self.parse_additive_expr()?;
            let span = merge_spans(&left.span(), &right.span());
            return Ok(Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
                span,
            });
        }

        Ok(left)
    }

    fn parse_additive_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative_expr()?;

        loop {
            let op = match self.stream.current().kind {
                TokenKind::Plus => BinOpKind::Add,
                TokenKind::Minus => BinOpKind::Sub,
                _ => break,
            };
            self.stream.advance();
            let right = self.parse_multiplicative_expr()?;
            let span = merge_spans(&left.span(), &right.span());
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn parse_multiplicative_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_coalesce_expr()?;

        loop {
            let op = match self.stream.current().kind {
                TokenKind::Star => BinOpKind::Mul,
                TokenKind::Slash => BinOpKind::Div,
                TokenKind::Percent => BinOpKind::Mod,
                _ => break,
            };
            self.stream.advance();
            let right = self.parse_coalesce_expr()?;
            let span = merge_spans(&left.span(), &right.span());
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    /// `a ?? b ?? c` — collected into one flattened coalescing chain.
    fn parse_coalesce_expr(&mut self) -> ParseResult<Expr> {
        let first = self.parse_unary_expr()?;

        if !self.stream.check(&TokenKind::DoubleQMark) {
            return Ok(first);
        }

        let mut args = vec![first];
        while self.stream.consume(&TokenKind::DoubleQMark) {
            args.push(self.parse_unary_expr()?);
        }
        let span = merge_spans(
            &args.first().expect("nonempty").span(),
            &args.last().expect("nonempty").span(),
        );
        Ok(Expr::Coalesce { args, span })
    }

    fn parse_unary_expr(&mut self) -> ParseResult<Expr> {
        let op = match self.stream.current().kind {
            TokenKind::Plus => Some(UnaryOpKind::Plus),
            TokenKind::Minus => Some(UnaryOpKind::Minus),
            _ => None,
        };

        if let Some(op) = op {
            let start = self.stream.current().span.clone();
            self.stream.advance();
            let operand = self.parse_unary_expr()?;
            let span = merge_spans(&start, &operand.span());
            return Ok(Expr::UnaryOp {
                op,
                operand: Box::new(operand),
                span,
            });
        }

        self.parse_power_expr()
    }

    /// `^` — right-associative; the right side re-admits unary sign.
    fn parse_power_expr(&mut self) -> ParseResult<Expr> {
        let left = self.parse_cast_expr()?;

        if self.stream.check(&TokenKind::Caret) {
            self.stream.advance();
            let right = self.parse_unary_expr()?;
            let span = merge_spans(&left.span(), &right.span());
            return Ok(Expr::BinOp {
                left: Box::new(left),
                op: BinOpKind::Pow,
                right: Box::new(right),
                span,
            });
        }

        Ok(left)
    }

    /// `<Type> expr` prefix cast. Unambiguous: `<` cannot start an operand
    /// otherwise.
    fn parse_cast_expr(&mut self) -> ParseResult<Expr> {
        if self.stream.check(&TokenKind::Lt) {
            let start = self.stream.current().span.clone();
            self.stream.advance();
            let ty = self.parse_type_name()?;
            self.stream.expect(TokenKind::Gt)?;
            let operand = self.parse_cast_expr()?;
            let span = merge_spans(&start, &operand.span());
            return Ok(Expr::TypeCast {
                ty,
                expr: Box::new(operand),
                span,
            });
        }

        self.parse_postfix_expr()
    }

    /// A type name with optional collection subtypes: `int64`,
    /// `array<int64>`, `tuple<str, int64>`.
    pub(crate) fn parse_type_name(&mut self) -> ParseResult<TypeName> {
        let maintype = self.parse_class_ref("a type name")?;
        let mut span = maintype.span.clone();
        let mut subtypes = Vec::new();

        if self.stream.consume(&TokenKind::Lt) {
            loop {
                subtypes.push(self.parse_type_name()?);
                if !self.stream.consume(&TokenKind::Comma) {
                    break;
                }
            }
            let end = self.stream.expect(TokenKind::Gt)?;
            span = merge_spans(&span, &end);
        }

        Ok(TypeName {
            maintype,
            subtypes,
            span,
        })
    }

    /// A possibly module-qualified name: `User` or `std::Object`.
    pub(crate) fn parse_class_ref(&mut self, what: &str) -> ParseResult<ClassRef> {
        let (first, first_span) = self.stream.expect_name(what)?;

        if self.stream.check(&TokenKind::DoubleColon) {
            self.stream.advance();
            let (name, name_span) = self.stream.expect_name(what)?;
            let span = merge_spans(&first_span, &name_span);
            return Ok(ClassRef {
                module: Some(first),
                name,
                span,
            });
        }

        Ok(ClassRef {
            module: None,
            name: first,
            span: first_span,
        })
    }

    /// Postfix loop: path steps, indirection, type filters, and shapes.
    fn parse_postfix_expr(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary_expr()?;

        loop {
            match self.stream.current().kind.clone() {
                TokenKind::Dot => {
                    self.stream.advance();
                    let steps = self.parse_ptr_step_names(PtrDirection::Outbound)?;
                    expr = push_path_steps(expr, steps);
                }
                TokenKind::DotFw => {
                    self.stream.advance();
                    let steps = self.parse_ptr_step_names(PtrDirection::Outbound)?;
                    expr = push_path_steps(expr, steps);
                }
                TokenKind::DotBw => {
                    self.stream.advance();
                    let steps = self.parse_ptr_step_names(PtrDirection::Inbound)?;
                    expr = push_path_steps(expr, steps);
                }
                TokenKind::At => {
                    self.stream.advance();
                    let (name, span) = self.stream.expect_name("a link property name")?;
                    let step = Ptr {
                        module: None,
                        name,
                        direction: PtrDirection::Outbound,
                        kind: PtrKind::Property,
                        target: None,
                        span,
                    };
                    expr = push_path_steps(expr, vec![step]);
                }
                TokenKind::LBracket => {
                    if matches!(self.stream.peek().map(|t| &t.kind), Some(TokenKind::Is)) {
                        // `expr[IS Type]`
                        self.stream.advance();
                        self.stream.advance();
                        let target = self.parse_class_ref("a type name")?;
                        let end = self.stream.expect(TokenKind::RBracket)?;
                        expr = attach_type_filter(expr, target, end);
                    } else {
                        expr = self.parse_indirection(expr)?;
                    }
                }
                TokenKind::LBrace => {
                    expr = self.parse_shape_for(expr)?;
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// Names after a dot. A float literal like `0.1` denotes two tuple-field
    /// steps at once.
    fn parse_ptr_step_names(&mut self, direction: PtrDirection) -> ParseResult<Vec<Ptr>> {
        let tok = self.stream.current().clone();
        match tok.kind {
            TokenKind::Ident(name) | TokenKind::QuotedIdent(name) => {
                self.stream.advance();
                // Module-qualified pointer: `.std::__class__`.
                if self.stream.check(&TokenKind::DoubleColon) {
                    self.stream.advance();
                    let (ptr_name, end) = self.stream.expect_name("a pointer name")?;
                    let span = merge_spans(&tok.span, &end);
                    return Ok(vec![Ptr {
                        module: Some(name),
                        name: ptr_name,
                        direction,
                        kind: PtrKind::Link,
                        target: None,
                        span,
                    }]);
                }
                Ok(vec![Ptr {
                    module: None,
                    name,
                    direction,
                    kind: PtrKind::Link,
                    target: None,
                    span: tok.span,
                }])
            }
            TokenKind::IntLiteral(text) => {
                self.stream.advance();
                Ok(vec![Ptr {
                    module: None,
                    name: text,
                    direction,
                    kind: PtrKind::Link,
                    target: None,
                    span: tok.span,
                }])
            }
            TokenKind::FloatLiteral(text) => {
                // `tup.0.1` lexes the trailing `0.1` as a float literal;
                // split it into the two tuple-field steps it denotes.
                self.stream.advance();
                match text.split_once('.') {
                    Some((a, b)) if !a.is_empty() && !b.is_empty() => {
                        let mid = tok.span.start + a.len();
                        Ok(vec![
                            Ptr {
                                module: None,
                                name: SmolStr::new(a),
                                direction,
                                kind: PtrKind::Link,
                                target: None,
                                span: tok.span.start..mid,
                            },
                            Ptr {
                                module: None,
                                name: SmolStr::new(b),
                                direction: PtrDirection::Outbound,
                                kind: PtrKind::Link,
                                target: None,
                                span: mid + 1..tok.span.end,
                            },
                        ])
                    }
                    _ => Err(self.stream.error_here("invalid tuple field access")),
                }
            }
            kind => Err(self
                .stream
                .error_here(format!("expected a pointer name, found {kind}"))),
        }
    }

    /// `expr[i]`, `expr[a:b]`, `expr[a:]`, `expr[:b]`.
    fn parse_indirection(&mut self, arg: Expr) -> ParseResult<Expr> {
        self.stream.expect(TokenKind::LBracket)?;

        let element = if self.stream.consume(&TokenKind::Colon) {
            let stop = self.parse_expr()?;
            IndirectionEl::Slice {
                start: None,
                stop: Some(stop),
            }
        } else {
            let first = self.parse_expr()?;
            if self.stream.consume(&TokenKind::Colon) {
                if self.stream.check(&TokenKind::RBracket) {
                    IndirectionEl::Slice {
                        start: Some(first),
                        stop: None,
                    }
                } else {
                    let stop = self.parse_expr()?;
                    IndirectionEl::Slice {
                        start: Some(first),
                        stop: Some(stop),
                    }
                }
            } else {
                IndirectionEl::Index(first)
            }
        };

        let end = self.stream.expect(TokenKind::RBracket)?;
        let span = merge_spans(&arg.span(), &end);

        // Chain onto an existing indirection instead of nesting.
        if let Expr::Indirection {
            arg,
            mut elements,
            ..
        } = arg
        {
            elements.push(element);
            return Ok(Expr::Indirection {
                arg,
                elements,
                span,
            });
        }

        Ok(Expr::Indirection {
            arg: Box::new(arg),
            elements: vec![element],
            span,
        })
    }

    fn parse_primary_expr(&mut self) -> ParseResult<Expr> {
        let tok = self.stream.current().clone();

        match tok.kind {
            TokenKind::IntLiteral(text) => {
                self.stream.advance();
                let value: i64 = text.replace('_', "").parse().map_err(|_| {
                    Box::new(
                        crate::diag::Diag::error(format!("integer literal '{text}' out of range"))
                            .with_primary_label(tok.span.clone(), "here"),
                    )
                })?;
                Ok(Expr::Constant(Constant::Int(value), tok.span))
            }
            TokenKind::FloatLiteral(text) => {
                self.stream.advance();
                let value: f64 = text.parse().map_err(|_| {
                    Box::new(
                        crate::diag::Diag::error(format!("invalid float literal '{text}'"))
                            .with_primary_label(tok.span.clone(), "here"),
                    )
                })?;
                Ok(Expr::Constant(Constant::Float(value), tok.span))
            }
            TokenKind::StringLiteral(value) => {
                self.stream.advance();
                Ok(Expr::Constant(Constant::Str(value), tok.span))
            }
            TokenKind::True => {
                self.stream.advance();
                Ok(Expr::Constant(Constant::Bool(true), tok.span))
            }
            TokenKind::False => {
                self.stream.advance();
                Ok(Expr::Constant(Constant::Bool(false), tok.span))
            }
            TokenKind::Parameter(name) => {
                self.stream.advance();
                Ok(Expr::Parameter(name, tok.span))
            }
            TokenKind::SelfKw => {
                self.stream.advance();
                Ok(Expr::Path(Path {
                    steps: vec![PathStep::SelfAnchor(tok.span.clone())],
                    partial: false,
                    span: tok.span,
                }))
            }
            TokenKind::Subject => {
                self.stream.advance();
                Ok(Expr::Path(Path {
                    steps: vec![PathStep::SubjectAnchor(tok.span.clone())],
                    partial: false,
                    span: tok.span,
                }))
            }
            TokenKind::Ident(_) | TokenKind::QuotedIdent(_) => self.parse_name_expr(),
            TokenKind::Dot | TokenKind::DotFw | TokenKind::DotBw => {
                // Partial path: `.name` inside a shape element scope.
                let direction = if matches!(tok.kind, TokenKind::DotBw) {
                    PtrDirection::Inbound
                } else {
                    PtrDirection::Outbound
                };
                self.stream.advance();
                let steps = self.parse_ptr_step_names(direction)?;
                let span = merge_spans(&tok.span, &steps.last().expect("nonempty").span);
                Ok(Expr::Path(Path {
                    steps: steps.into_iter().map(PathStep::Ptr).collect(),
                    partial: true,
                    span,
                }))
            }
            TokenKind::LParen => self.parse_paren_expr(),
            TokenKind::LBrace => self.parse_set_literal(),
            TokenKind::LBracket => self.parse_array_or_mapping(),
            kind => Err(self
                .stream
                .error_here(format!("expected an expression, found {kind}"))),
        }
    }

    /// A name in expression position: class reference or function call.
    fn parse_name_expr(&mut self) -> ParseResult<Expr> {
        let class_ref = self.parse_class_ref("a name")?;

        if self.stream.check(&TokenKind::LParen) {
            return self.parse_function_call(class_ref);
        }

        let span = class_ref.span.clone();
        Ok(Expr::Path(Path {
            steps: vec![PathStep::Root(class_ref)],
            partial: false,
            span,
        }))
    }

    fn parse_function_call(&mut self, func: ClassRef) -> ParseResult<Expr> {
        self.stream.expect(TokenKind::LParen)?;
        let mut args = Vec::new();

        if !self.stream.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_func_arg()?);
                if !self.stream.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let end = self.stream.expect(TokenKind::RParen)?;
        let span = merge_spans(&func.span, &end);
        Ok(Expr::FunctionCall(FunctionCall { func, args, span }))
    }

    /// One call argument: `[name :=] expr [FILTER cond] [ORDER BY …]`.
    fn parse_func_arg(&mut self) -> ParseResult<FuncArg> {
        let mut name = None;
        if let TokenKind::Ident(n) = &self.stream.current().kind
            && matches!(self.stream.peek().map(|t| &t.kind), Some(TokenKind::Turnstile))
        {
            name = Some(n.clone());
            self.stream.advance();
            self.stream.advance();
        }

        let arg = self.parse_expr()?;
        let mut span = arg.span();

        let filter = if self.stream.consume(&TokenKind::Filter) {
            let cond = self.parse_expr()?;
            span = merge_spans(&span, &cond.span());
            Some(cond)
        } else {
            None
        };

        let sort = if self.stream.check(&TokenKind::Order) {
            let sort = self.parse_order_by()?;
            if let Some(last) = sort.last() {
                span = merge_spans(&span, &last.span);
            }
            sort
        } else {
            Vec::new()
        };

        Ok(FuncArg {
            name,
            arg,
            filter,
            sort,
            span,
        })
    }

    /// `ORDER BY expr [ASC|DESC] [EMPTY FIRST|LAST] {THEN …}`.
    pub(crate) fn parse_order_by(&mut self) -> ParseResult<Vec<SortExpr>> {
        self.stream.expect(TokenKind::Order)?;
        self.stream.expect(TokenKind::By)?;

        let mut items = Vec::new();
        loop {
            let expr = self.parse_expr()?;
            let mut span = expr.span();

            let direction = if self.stream.check_ident_kw("asc") {
                span = merge_spans(&span, &self.stream.current().span);
                self.stream.advance();
                Some(SortDirection::Asc)
            } else if self.stream.check_ident_kw("desc") {
                span = merge_spans(&span, &self.stream.current().span);
                self.stream.advance();
                Some(SortDirection::Desc)
            } else {
                None
            };

            let nones_order = if self.stream.check(&TokenKind::Empty) {
                self.stream.advance();
                if self.stream.consume_ident_kw("first") {
                    span = merge_spans(&span, &self.stream.previous_span());
                    Some(NonesOrder::First)
                } else if self.stream.consume_ident_kw("last") {
                    span = merge_spans(&span, &self.stream.previous_span());
                    Some(NonesOrder::Last)
                } else {
                    return Err(self
                        .stream
                        .error_here("expected FIRST or LAST after EMPTY"));
                }
            } else {
                None
            };

            items.push(SortExpr {
                expr,
                direction,
                nones_order,
                span,
            });

            if !self.stream.consume_ident_kw("then") {
                break;
            }
        }

        Ok(items)
    }

    /// `(` — subquery, tuple, named tuple, or grouping.
    fn parse_paren_expr(&mut self) -> ParseResult<Expr> {
        let start = self.stream.expect(TokenKind::LParen)?;

        // Parenthesized statement in expression position.
        if matches!(
            self.stream.current().kind,
            TokenKind::With
                | TokenKind::Select
                | TokenKind::For
                | TokenKind::Group
                | TokenKind::Insert
                | TokenKind::Update
                | TokenKind::Delete
        ) {
            let stmt = self.parse_statement()?;
            let end = self.stream.expect(TokenKind::RParen)?;
            let span = merge_spans(&start, &end);
            return Ok(Expr::Statement(Box::new(stmt), span));
        }

        // Named tuple: `(name := expr, …)`.
        if matches!(self.stream.current().kind, TokenKind::Ident(_))
            && matches!(self.stream.peek().map(|t| &t.kind), Some(TokenKind::Turnstile))
        {
            let mut elements = Vec::new();
            loop {
                let (name, name_span) = self.stream.expect_name("a tuple field name")?;
                self.stream.expect(TokenKind::Turnstile)?;
                let val = self.parse_expr()?;
                let span = merge_spans(&name_span, &val.span());
                elements.push(NamedTupleElement { name, val, span });
                if !self.stream.consume(&TokenKind::Comma) {
                    break;
                }
                if self.stream.check(&TokenKind::RParen) {
                    break;
                }
            }
            let end = self.stream.expect(TokenKind::RParen)?;
            let span = merge_spans(&start, &end);
            return Ok(Expr::NamedTuple { elements, span });
        }

        let first = self.parse_expr()?;

        if self.stream.consume(&TokenKind::Comma) {
            // Positional tuple; `(a,)` is a one-element tuple.
            let mut elements = vec![first];
            while !self.stream.check(&TokenKind::RParen) {
                elements.push(self.parse_expr()?);
                if !self.stream.consume(&TokenKind::Comma) {
                    break;
                }
            }
            let end = self.stream.expect(TokenKind::RParen)?;
            let span = merge_spans(&start, &end);
            return Ok(Expr::Tuple { elements, span });
        }

        self.stream.expect(TokenKind::RParen)?;
        // Plain grouping passes the inner expression through.
        Ok(first)
    }

    /// `{a, b, c}` set literal; `{}` is the empty set.
    fn parse_set_literal(&mut self) -> ParseResult<Expr> {
        let start = self.stream.expect(TokenKind::LBrace)?;
        let mut elements = Vec::new();

        while !self.stream.check(&TokenKind::RBrace) {
            elements.push(self.parse_expr()?);
            if !self.stream.consume(&TokenKind::Comma) {
                break;
            }
        }

        let end = self.stream.expect(TokenKind::RBrace)?;
        let span = merge_spans(&start, &end);
        Ok(Expr::Set { elements, span })
    }

    /// `[a, b]` array, `[k -> v]` mapping, or `[]` empty collection.
    fn parse_array_or_mapping(&mut self) -> ParseResult<Expr> {
        let start = self.stream.expect(TokenKind::LBracket)?;

        if self.stream.check(&TokenKind::RBracket) {
            let end = self.stream.expect(TokenKind::RBracket)?;
            return Ok(Expr::EmptyCollection {
                span: merge_spans(&start, &end),
            });
        }

        let first = self.parse_expr()?;

        if self.stream.consume(&TokenKind::Arrow) {
            let mut keys = vec![first];
            let mut values = vec![self.parse_expr()?];
            while self.stream.consume(&TokenKind::Comma) {
                if self.stream.check(&TokenKind::RBracket) {
                    break;
                }
                keys.push(self.parse_expr()?);
                self.stream.expect(TokenKind::Arrow)?;
                values.push(self.parse_expr()?);
            }
            let end = self.stream.expect(TokenKind::RBracket)?;
            let span = merge_spans(&start, &end);
            return Ok(Expr::Mapping { keys, values, span });
        }

        let mut elements = vec![first];
        while self.stream.consume(&TokenKind::Comma) {
            if self.stream.check(&TokenKind::RBracket) {
                break;
            }
            elements.push(self.parse_expr()?);
        }
        let end = self.stream.expect(TokenKind::RBracket)?;
        let span = merge_spans(&start, &end);
        Ok(Expr::Array { elements, span })
    }
}

/// Extends `expr` with pointer steps, folding into an existing path when
/// possible.
fn push_path_steps(expr: Expr, steps: Vec<Ptr>) -> Expr {
    let last_span = steps
        .last()
        .map(|s| s.span.clone())
        .unwrap_or_else(|| expr.span());

    match expr {
        Expr::Path(mut path) => {
            let span = merge_spans(&path.span, &last_span);
            path.steps.extend(steps.into_iter().map(PathStep::Ptr));
            path.span = span;
            Expr::Path(path)
        }
        other => {
            let span = merge_spans(&other.span(), &last_span);
            let mut all_steps = vec![PathStep::Expr(Box::new(other))];
            all_steps.extend(steps.into_iter().map(PathStep::Ptr));
            Expr::Path(Path {
                steps: all_steps,
                partial: false,
                span,
            })
        }
    }
}

/// Attaches an `[IS Type]` filter: onto the final pointer step when the
/// expression is a path whose tip has no filter yet, otherwise as a
/// standalone type-filter node.
fn attach_type_filter(expr: Expr, target: ClassRef, end: crate::ast::Span) -> Expr {
    if let Expr::Path(mut path) = expr {
        if let Some(PathStep::Ptr(ptr)) = path.steps.last_mut()
            && ptr.target.is_none()
        {
            ptr.target = Some(target);
            path.span = merge_spans(&path.span, &end);
            return Expr::Path(path);
        }
        let span = merge_spans(&path.span, &end);
        return Expr::TypeFilter {
            expr: Box::new(Expr::Path(path)),
            ty: target,
            span,
        };
    }

    let span = merge_spans(&expr.span(), &end);
    Expr::TypeFilter {
        expr: Box::new(expr),
        ty: target,
        span,
    }
}
