//! DDL parsing: `CREATE`, `ALTER`, and `DROP` for every schema entity kind.
//!
//! Entity kinds are spelled with unreserved keywords (`TYPE`, `LINK`, …) so
//! they are matched by identifier text. ALTER bodies are braced subcommand
//! blocks; nested pointer/constraint commands recurse through the same
//! machinery.

use crate::ast::ddl::{
    DdlCommand, DdlObject, DdlOp, DdlSubcommand, FuncParam, FunctionCode, Language, ParamKind,
};
use crate::ast::expr::ClassRef;
use crate::ast::merge_spans;
use crate::ast::Span;
use crate::lexer::token::TokenKind;
use crate::parser::QlParser;
use crate::parser::base::ParseResult;

impl QlParser<'_> {
    /// Parses a complete DDL command starting at CREATE/ALTER/DROP.
    pub(crate) fn parse_ddl(&mut self) -> ParseResult<DdlCommand> {
        let start = self.stream.current().span.clone();
        let op = match self.stream.current().kind {
            TokenKind::Create => DdlOp::Create,
            TokenKind::Alter => DdlOp::Alter,
            TokenKind::Drop => DdlOp::Drop,
            ref kind => {
                return Err(self
                    .stream
                    .error_here(format!("expected a DDL command, found {kind}")));
            }
        };
        self.stream.advance();

        // Modifier flags preceding the entity kind.
        let mut abstract_ = false;
        let mut final_ = false;
        let mut required = false;
        loop {
            if self.stream.consume_ident_kw("abstract") {
                abstract_ = true;
            } else if self.stream.consume_ident_kw("final") {
                final_ = true;
            } else if self.stream.consume_ident_kw("required") {
                required = true;
            } else if self.stream.consume_ident_kw("delegated") {
                // Accepted and folded into the constraint form.
            } else {
                break;
            }
        }

        let object = self.parse_ddl_object(op, abstract_, final_, required)?;
        let span = merge_spans(&start, &self.stream.previous_span());

        Ok(DdlCommand { op, object, span })
    }

    fn parse_ddl_object(
        &mut self,
        op: DdlOp,
        abstract_: bool,
        final_: bool,
        required: bool,
    ) -> ParseResult<DdlObject> {
        if self.stream.check(&TokenKind::Module) {
            self.stream.advance();
            let name = self.parse_ddl_name()?;
            let commands = self.parse_opt_command_block(op)?;
            return Ok(DdlObject::Module { name, commands });
        }

        if self.stream.check(&TokenKind::Function) || self.stream.check(&TokenKind::Aggregate) {
            let aggregate = self.stream.check(&TokenKind::Aggregate);
            self.stream.advance();
            return self.parse_ddl_function(op, aggregate);
        }

        if self.stream.consume_ident_kw("database") {
            let name = self.parse_ddl_name()?;
            return Ok(DdlObject::Database { name });
        }

        if self.stream.consume_ident_kw("migration") {
            return self.parse_ddl_migration(op);
        }

        if self.stream.consume_ident_kw("action") {
            let name = self.parse_ddl_name()?;
            let extending = self.parse_opt_extending()?;
            let commands = self.parse_opt_command_block(op)?;
            return Ok(DdlObject::Action {
                name,
                extending,
                commands,
            });
        }

        if self.stream.consume_ident_kw("scalar") {
            if !self.stream.consume_ident_kw("type") {
                return Err(self.stream.error_here("expected TYPE after SCALAR"));
            }
            let name = self.parse_ddl_name()?;
            let extending = self.parse_opt_extending()?;
            let commands = self.parse_opt_command_block(op)?;
            return Ok(DdlObject::ScalarType {
                name,
                abstract_,
                final_,
                extending,
                commands,
            });
        }

        if self.stream.consume_ident_kw("attribute") {
            let name = self.parse_ddl_name()?;
            let ty = if matches!(
                self.stream.current().kind,
                TokenKind::Ident(_) | TokenKind::QuotedIdent(_)
            ) {
                Some(self.parse_type_name()?)
            } else {
                None
            };
            let commands = self.parse_opt_command_block(op)?;
            return Ok(DdlObject::Attribute { name, ty, commands });
        }

        if self.stream.consume_ident_kw("type") {
            let name = self.parse_ddl_name()?;
            let extending = self.parse_opt_extending()?;
            let commands = self.parse_opt_command_block(op)?;
            return Ok(DdlObject::ObjectType {
                name,
                abstract_,
                final_,
                extending,
                commands,
            });
        }

        if self.stream.consume_ident_kw("view") {
            let name = self.parse_ddl_name()?;
            let expr = if self.stream.consume(&TokenKind::Turnstile) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            let commands = if expr.is_none() {
                self.parse_opt_command_block(op)?
            } else {
                Vec::new()
            };
            return Ok(DdlObject::View {
                name,
                expr,
                commands,
            });
        }

        if self.stream.consume_ident_kw("constraint") {
            let name = self.parse_ddl_name()?;
            let extending = self.parse_opt_extending()?;
            let commands = self.parse_opt_command_block(op)?;
            return Ok(DdlObject::Constraint {
                name,
                extending,
                commands,
            });
        }

        if self.stream.check_ident_kw("link") {
            self.stream.advance();
            let is_property = self.stream.consume_ident_kw("property");
            let name = self.parse_ddl_name()?;
            let extending = self.parse_opt_extending()?;
            let target = if self.stream.consume(&TokenKind::Arrow) {
                Some(self.parse_type_name()?)
            } else {
                None
            };
            let commands = self.parse_opt_command_block(op)?;
            return Ok(if is_property {
                DdlObject::LinkProperty {
                    name,
                    extending,
                    target,
                    required,
                    commands,
                }
            } else {
                DdlObject::Link {
                    name,
                    extending,
                    target,
                    required,
                    commands,
                }
            });
        }

        // Bare `PROPERTY` inside link blocks is a link property.
        if self.stream.consume_ident_kw("property") {
            let name = self.parse_ddl_name()?;
            let extending = self.parse_opt_extending()?;
            let target = if self.stream.consume(&TokenKind::Arrow) {
                Some(self.parse_type_name()?)
            } else {
                None
            };
            let commands = self.parse_opt_command_block(op)?;
            return Ok(DdlObject::LinkProperty {
                name,
                extending,
                target,
                required,
                commands,
            });
        }

        if self.stream.consume_ident_kw("event") {
            let name = self.parse_ddl_name()?;
            let extending = self.parse_opt_extending()?;
            let commands = self.parse_opt_command_block(op)?;
            return Ok(DdlObject::Event {
                name,
                extending,
                commands,
            });
        }

        Err(self.stream.error_here(format!(
            "expected a schema entity kind, found {}",
            self.stream.current().kind
        )))
    }

    /// `MIGRATION name [TO <lang> <text>] [{ commands }]`.
    fn parse_ddl_migration(&mut self, op: DdlOp) -> ParseResult<DdlObject> {
        let name = self.parse_ddl_name()?;

        let target = if self.stream.consume_ident_kw("to") {
            let lang_start = self.stream.current().span.clone();
            let (lang_name, _) = self.stream.expect_name("a language name")?;
            let Some(language) = Language::from_name(&lang_name, true) else {
                return Err(Box::new(
                    crate::diag::Diag::error(format!(
                        "unknown migration language '{lang_name}'"
                    ))
                    .with_primary_label(lang_start, "here")
                    .with_help("supported languages: SQL, EDGEQL, PYTHON, ESCHEMA"),
                ));
            };
            let tok = self.stream.current().clone();
            let TokenKind::StringLiteral(code) = tok.kind else {
                return Err(self.stream.error_here("expected migration text"));
            };
            self.stream.advance();
            Some(FunctionCode {
                language,
                code,
                span: merge_spans(&lang_start, &tok.span),
            })
        } else {
            None
        };

        let commands = self.parse_opt_command_block(op)?;
        Ok(DdlObject::Migration {
            name,
            target,
            commands,
        })
    }

    /// `FUNCTION name(params) -> type [INITIAL VALUE expr] FROM <lang> <code>`.
    fn parse_ddl_function(&mut self, op: DdlOp, aggregate: bool) -> ParseResult<DdlObject> {
        let name = self.parse_ddl_name()?;
        let mut params = Vec::new();

        self.stream.expect(TokenKind::LParen)?;
        if !self.stream.check(&TokenKind::RParen) {
            loop {
                params.push(self.parse_func_param()?);
                if !self.stream.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.stream.expect(TokenKind::RParen)?;

        self.stream.expect(TokenKind::Arrow)?;
        let returning = self.parse_type_name()?;

        let initial_value = if self.stream.check_ident_kw("initial") {
            self.stream.advance();
            if !self.stream.consume_ident_kw("value") {
                return Err(self.stream.error_here("expected VALUE after INITIAL"));
            }
            Some(self.parse_expr()?)
        } else {
            None
        };

        let body = if self.stream.check(&TokenKind::From) {
            Some(self.parse_function_body()?)
        } else {
            None
        };

        let commands = if body.is_none() {
            self.parse_opt_command_block(op)?
        } else {
            Vec::new()
        };

        Ok(DdlObject::Function {
            name,
            params,
            returning,
            aggregate,
            initial_value,
            body,
            commands,
        })
    }

    /// `[NAMED ONLY] [OPTIONAL|VARIADIC|SET OF] [name:] type [= default]`.
    fn parse_func_param(&mut self) -> ParseResult<FuncParam> {
        let start = self.stream.current().span.clone();

        let named_only = if self.stream.consume_ident_kw("named") {
            if !self.stream.consume_ident_kw("only") {
                return Err(self.stream.error_here("expected ONLY after NAMED"));
            }
            true
        } else {
            false
        };

        let kind = if self.stream.consume_ident_kw("optional") {
            ParamKind::Optional
        } else if self.stream.consume_ident_kw("variadic") {
            ParamKind::Variadic
        } else if self.stream.check(&TokenKind::Set) {
            self.stream.advance();
            if !self.stream.consume_ident_kw("of") {
                return Err(self.stream.error_here("expected OF after SET"));
            }
            ParamKind::SetOf
        } else {
            ParamKind::Positional
        };

        // `name: type` or a bare type.
        let name = if matches!(
            self.stream.current().kind,
            TokenKind::Ident(_) | TokenKind::QuotedIdent(_)
        ) && matches!(self.stream.peek().map(|t| &t.kind), Some(TokenKind::Colon))
        {
            let (name, _) = self.stream.expect_name("a parameter name")?;
            self.stream.advance(); // :
            Some(name)
        } else {
            None
        };

        let ty = self.parse_type_name()?;

        let default = if self.stream.consume(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let span = merge_spans(&start, &self.stream.previous_span());
        Ok(FuncParam {
            name,
            ty,
            kind,
            named_only,
            default,
            span,
        })
    }

    /// `FROM <lang> <code-string>`; the language set is closed.
    fn parse_function_body(&mut self) -> ParseResult<FunctionCode> {
        let start = self.stream.expect(TokenKind::From)?;
        let lang_span = self.stream.current().span.clone();
        let (lang_name, _) = self.stream.expect_name("a language name")?;

        let Some(language) = Language::from_name(&lang_name, false) else {
            return Err(Box::new(
                crate::diag::Diag::error(format!("unknown function language '{lang_name}'"))
                    .with_primary_label(lang_span, "here")
                    .with_help("supported languages: SQL, EDGEQL, PYTHON"),
            ));
        };

        let tok = self.stream.current().clone();
        let TokenKind::StringLiteral(code) = tok.kind else {
            return Err(self.stream.error_here("expected function code string"));
        };
        self.stream.advance();

        Ok(FunctionCode {
            language,
            code,
            span: merge_spans(&start, &tok.span),
        })
    }

    /// `EXTENDING name, name, …`.
    fn parse_opt_extending(&mut self) -> ParseResult<Vec<ClassRef>> {
        if !self.stream.consume_ident_kw("extending") {
            return Ok(Vec::new());
        }

        let mut bases = vec![self.parse_class_ref("a base type name")?];
        while self.stream.consume(&TokenKind::Comma) {
            bases.push(self.parse_class_ref("a base type name")?);
        }
        Ok(bases)
    }

    /// An optional braced subcommand block. ALTER requires one.
    fn parse_opt_command_block(&mut self, op: DdlOp) -> ParseResult<Vec<DdlSubcommand>> {
        if !self.stream.check(&TokenKind::LBrace) {
            if op == DdlOp::Alter {
                return Err(self
                    .stream
                    .error_here("ALTER requires a braced command block"));
            }
            return Ok(Vec::new());
        }

        self.stream.expect(TokenKind::LBrace)?;
        let mut commands = Vec::new();

        while !self.stream.check(&TokenKind::RBrace) {
            commands.push(self.parse_ddl_subcommand()?);
            while self.stream.consume(&TokenKind::Semicolon) {}
        }

        self.stream.expect(TokenKind::RBrace)?;
        Ok(commands)
    }

    fn parse_ddl_subcommand(&mut self) -> ParseResult<DdlSubcommand> {
        let start = self.stream.current().span.clone();

        // `RENAME TO name`.
        if self.stream.consume_ident_kw("rename") {
            if !self.stream.consume_ident_kw("to") {
                return Err(self.stream.error_here("expected TO after RENAME"));
            }
            let name = self.parse_ddl_name()?;
            let span = merge_spans(&start, &self.stream.previous_span());
            return Ok(DdlSubcommand::RenameTo { name, span });
        }

        // `SET field := expr`.
        if self.stream.check(&TokenKind::Set) {
            self.stream.advance();
            let (name, _) = self.stream.expect_name("a field name")?;
            self.stream.expect(TokenKind::Turnstile)?;
            let value = self.parse_expr()?;
            let span = merge_spans(&start, &value.span());
            return Ok(DdlSubcommand::SetField { name, value, span });
        }

        // Nested CREATE/ALTER/DROP — including bare `DROP field`.
        match self.stream.current().kind {
            TokenKind::Create | TokenKind::Alter => {
                return Ok(DdlSubcommand::Nested(self.parse_ddl()?));
            }
            TokenKind::Drop => {
                if self.peek_is_entity_kind() {
                    return Ok(DdlSubcommand::Nested(self.parse_ddl()?));
                }
                self.stream.advance();
                let (name, end) = self.stream.expect_name("a field name")?;
                return Ok(DdlSubcommand::DropField {
                    name,
                    span: merge_spans(&start, &end),
                });
            }
            _ => {}
        }

        Err(self.stream.error_here(format!(
            "expected a DDL subcommand, found {}",
            self.stream.current().kind
        )))
    }

    /// True when the token after DROP names an entity kind (nested command)
    /// rather than a plain field.
    fn peek_is_entity_kind(&self) -> bool {
        match self.stream.peek().map(|t| &t.kind) {
            Some(TokenKind::Module | TokenKind::Function | TokenKind::Aggregate) => true,
            Some(TokenKind::Ident(name)) => {
                let kinds = [
                    "database",
                    "migration",
                    "action",
                    "scalar",
                    "attribute",
                    "type",
                    "view",
                    "constraint",
                    "link",
                    "property",
                    "event",
                ];
                kinds.iter().any(|k| name.eq_ignore_ascii_case(k))
            }
            _ => false,
        }
    }

    /// Entity names in DDL: possibly module-qualified, dotted segments
    /// allowed for modules and migrations.
    fn parse_ddl_name(&mut self) -> ParseResult<ClassRef> {
        let first = self.parse_class_ref("an entity name")?;

        // Fold `a.b.c` into one dotted name (module paths).
        if first.module.is_none() && self.stream.check(&TokenKind::Dot) {
            let mut name = first.name.to_string();
            let mut span: Span = first.span.clone();
            while self.stream.consume(&TokenKind::Dot) {
                let (part, part_span) = self.stream.expect_name("a name segment")?;
                name.push('.');
                name.push_str(&part);
                span = merge_spans(&span, &part_span);
            }
            return Ok(ClassRef::new(None, name, span));
        }

        Ok(first)
    }
}
