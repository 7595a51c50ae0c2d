//! Statement compilation: SELECT, FOR, GROUP, INSERT, UPDATE, DELETE.
//!
//! All handlers share the `init_stmt`/`fini_stmt` prologue and epilogue:
//! the prologue installs the statement node and processes the WITH block;
//! the epilogue infers the statement type, applies result-view naming, and
//! wraps the statement into its result set.

use crate::ast::Span;
use crate::ast::expr::Expr as QlExpr;
use crate::ast::stmt::{
    DeleteQuery, ForQuery, GroupQuery, InsertQuery, SelectQuery, Statement, UpdateQuery,
    WithEntry,
};
use crate::compiler::astutils;
use crate::compiler::context::Compiler;
use crate::compiler::error::{CompileError, CompileResult};
use crate::ir::{
    DeclaredCardinality, DeleteStmt, Expr, GroupStmt, InsertStmt, SelectStmt, SetId, SetNode,
    StmtId, StmtKind, StmtNode, UpdateStmt,
};
use crate::schema::{QualName, Type, TypeKind, TypeRef, material_type, type_of};
use smol_str::SmolStr;

impl Compiler<'_> {
    /// Compiles a statement into its result set.
    pub(crate) fn compile_statement(&mut self, stmt: &Statement) -> CompileResult<SetId> {
        match stmt {
            Statement::Select(q) => self.compile_select(q),
            Statement::For(q) => self.compile_for(q),
            Statement::Group(q) => self.compile_group(q),
            Statement::Insert(q) => self.compile_insert(q),
            Statement::Update(q) => self.compile_update(q),
            Statement::Delete(q) => self.compile_delete(q),
            Statement::Session(s) => Err(CompileError::expression(
                "session commands cannot be compiled to IR",
                Some(s.span()),
            )),
            Statement::Ddl(d) => Err(CompileError::expression(
                "DDL statements cannot be compiled to IR",
                Some(d.span.clone()),
            )),
        }
    }

    fn compile_select(&mut self, q: &SelectQuery) -> CompileResult<SetId> {
        // The degenerate top-level `SELECT Path` compiles to the bare
        // path, with no wrapping statement.
        if astutils::is_degenerate_select(q) && self.toplevel_stmt.is_none() {
            return self.in_new(|c| {
                c.process_with_entries(&q.aliases, None)?;
                let set = c.compile_expr(&q.result)?;
                Ok(c.scoped_set(set))
            });
        }

        let view_name = self.ctx().toplevel_result_view_name.clone();
        let is_toplevel = self.toplevel_stmt.is_none();

        self.in_subquery(|c| {
            let stmt_id = c.ir.alloc_stmt(StmtNode {
                kind: StmtKind::Select(SelectStmt::default()),
                parent: None,
                cardinality: None,
            });
            c.init_stmt(stmt_id, &q.aliases)?;

            if !is_toplevel {
                let fence = c.scope_tree.add_fence(c.ctx().scope);
                c.ctx_mut().scope = fence;
            }

            // OFFSET and LIMIT take whole-set operands; the statement
            // body compiles behind an extra fence so its paths do not
            // correlate with theirs.
            let has_offset_limit = q.offset.is_some() || q.limit.is_some();
            let body_outer_scope = c.ctx().scope;
            if has_offset_limit {
                let fence = c.scope_tree.add_fence(body_outer_scope);
                c.ctx_mut().scope = fence;
            }

            let result = c.compile_result_clause(&q.result, q.result_alias.as_ref())?;
            c.set_stmt_select(stmt_id, |s| s.result = Some(result));
            // ORDER BY and friends see one result element per evaluation.
            c.update_singletons(result);

            let where_ = c.compile_where_clause(q.where_.as_ref())?;
            c.set_stmt_select(stmt_id, |s| s.where_ = where_);

            let orderby = c.compile_orderby_clause(&q.orderby)?;
            c.set_stmt_select(stmt_id, |s| s.orderby = orderby);

            if has_offset_limit {
                c.ctx_mut().scope = body_outer_scope;
                let offset = c.compile_limit_offset_clause(q.offset.as_ref())?;
                let limit = c.compile_limit_offset_clause(q.limit.as_ref())?;
                c.set_stmt_select(stmt_id, |s| {
                    s.offset = offset;
                    s.limit = limit;
                });
            }

            c.fini_stmt(stmt_id, view_name.as_ref(), &q.span)
        })
    }

    fn compile_for(&mut self, q: &ForQuery) -> CompileResult<SetId> {
        let view_name = self.ctx().toplevel_result_view_name.clone();
        let is_toplevel = self.toplevel_stmt.is_none();

        self.in_subquery(|c| {
            let stmt_id = c.ir.alloc_stmt(StmtNode {
                kind: StmtKind::Select(SelectStmt::default()),
                parent: None,
                cardinality: None,
            });
            c.init_stmt(stmt_id, &q.aliases)?;

            if !is_toplevel {
                let fence = c.scope_tree.add_fence(c.ctx().scope);
                c.ctx_mut().scope = fence;
            }

            // The iterator binds behind its own fence; its path id is a
            // singleton for the body (one iteration sees one element).
            let iterator = c.in_fenced(|c| {
                let set = c.declare_view(&q.iterator, &q.iterator_alias, false)?;
                Ok(c.scoped_set(set))
            })?;
            let iter_path = c.ir.set(iterator).path_id.clone();
            c.ctx_mut().singletons.insert(iter_path.clone());
            c.register_path_scope(&iter_path);
            c.set_stmt_select(stmt_id, |s| s.iterator = Some(iterator));

            let result = c.compile_result_clause(&q.result, q.result_alias.as_ref())?;
            c.set_stmt_select(stmt_id, |s| s.result = Some(result));
            c.update_singletons(result);

            let where_ = c.compile_where_clause(q.where_.as_ref())?;
            c.set_stmt_select(stmt_id, |s| s.where_ = where_);

            let orderby = c.compile_orderby_clause(&q.orderby)?;
            c.set_stmt_select(stmt_id, |s| s.orderby = orderby);

            let offset = c.compile_limit_offset_clause(q.offset.as_ref())?;
            let limit = c.compile_limit_offset_clause(q.limit.as_ref())?;
            c.set_stmt_select(stmt_id, |s| {
                s.offset = offset;
                s.limit = limit;
            });

            c.fini_stmt(stmt_id, view_name.as_ref(), &q.span)
        })
    }

    fn compile_group(&mut self, q: &GroupQuery) -> CompileResult<SetId> {
        let view_name = self.ctx().toplevel_result_view_name.clone();

        self.in_subquery(|c| {
            let stmt_id = c.ir.alloc_stmt(StmtNode {
                kind: StmtKind::Group(GroupStmt::default()),
                parent: None,
                cardinality: None,
            });
            c.init_stmt(stmt_id, &q.aliases)?;

            // The grouping itself is represented by a synthetic object
            // type derived from the object root.
            let group_name = c.aliases.get("Group");
            let object_root = c.std_type("Object")?;
            let group_ty = TypeRef::Derived(c.derived.add_type(Type {
                name: QualName::new("__group__", group_name),
                kind: TypeKind::Object {
                    bases: vec![object_root],
                    is_virtual: false,
                },
            }));
            let group_path_id = c.new_path_id(group_ty);
            c.register_path_scope(&group_path_id);
            if let StmtKind::Group(g) = &mut c.ir.stmt_mut(stmt_id).kind {
                g.group_path_id = Some(group_path_id);
            }

            let subject = c.in_fenced(|c| {
                let set = c.compile_expr(&q.subject)?;
                Ok(c.scoped_set(set))
            })?;
            if let Some(alias) = &q.subject_alias {
                c.ctx_mut().pathvars.insert(alias.clone(), subject);
            }
            if let StmtKind::Group(g) = &mut c.ir.stmt_mut(stmt_id).kind {
                g.subject = Some(subject);
            }

            for (alias, expr) in &q.using {
                c.in_new(|c| c.declare_view(expr, alias, false))?;
            }

            // Each BY expression is fenced and becomes a singleton for
            // the result clause: per group, a grouping key has exactly
            // one value.
            let mut groupby = Vec::new();
            for by_expr in &q.by {
                let by_set = c.in_fenced(|c| {
                    let set = c.compile_expr(by_expr)?;
                    Ok(c.scoped_set(set))
                })?;
                let by_path = c.ir.set(by_set).path_id.clone();
                c.ctx_mut().singletons.insert(by_path.clone());
                c.ctx_mut().group_paths.insert(by_path);
                groupby.push(by_set);
            }
            if let StmtKind::Group(g) = &mut c.ir.stmt_mut(stmt_id).kind {
                g.groupby = groupby;
            }

            // The INTO clause compiles as an inner SELECT over the
            // grouped subject.
            let result = c.in_subquery(|c| {
                let inner_id = c.ir.alloc_stmt(StmtNode {
                    kind: StmtKind::Select(SelectStmt::default()),
                    parent: Some(stmt_id),
                    cardinality: None,
                });
                c.ctx_mut().stmt = Some(inner_id);
                let fence = c.scope_tree.add_fence(c.ctx().scope);
                c.ctx_mut().scope = fence;

                let result = c.compile_result_clause(&q.result, q.result_alias.as_ref())?;
                c.set_stmt_select(inner_id, |s| s.result = Some(result));
                c.update_singletons(result);

                let where_ = c.compile_where_clause(q.where_.as_ref())?;
                c.set_stmt_select(inner_id, |s| s.where_ = where_);

                let orderby = c.compile_orderby_clause(&q.orderby)?;
                c.set_stmt_select(inner_id, |s| s.orderby = orderby);

                let offset = c.compile_limit_offset_clause(q.offset.as_ref())?;
                let limit = c.compile_limit_offset_clause(q.limit.as_ref())?;
                c.set_stmt_select(inner_id, |s| {
                    s.offset = offset;
                    s.limit = limit;
                });

                let inner_ty = c.stmt_type(inner_id, &q.span)?;
                let set =
                    c.generated_set(Expr::Stmt(inner_id), None, Some(inner_ty), Some(q.span.clone()))?;
                Ok(c.scoped_set(set))
            })?;
            if let StmtKind::Group(g) = &mut c.ir.stmt_mut(stmt_id).kind {
                g.result = Some(result);
            }

            c.fini_stmt(stmt_id, view_name.as_ref(), &q.span)
        })
    }

    fn compile_insert(&mut self, q: &InsertQuery) -> CompileResult<SetId> {
        let view_name = self.ctx().toplevel_result_view_name.clone();

        self.in_subquery(|c| {
            let stmt_id = c.ir.alloc_stmt(StmtNode {
                kind: StmtKind::Insert(InsertStmt::default()),
                parent: None,
                cardinality: None,
            });
            c.init_stmt(stmt_id, &q.aliases)?;

            let subject = c.compile_expr(&q.subject)?;
            let subject_ty = c.ir.set(subject).ty;
            if !c.is_object_type(subject_ty) {
                return Err(CompileError::expression(
                    "cannot insert non-object values",
                    Some(q.subject.span()),
                ));
            }

            let subject = c.compile_query_subject(
                subject,
                &q.shape,
                q.subject_alias.as_ref(),
                true,
                false,
                &q.span,
            )?;
            if let StmtKind::Insert(i) = &mut c.ir.stmt_mut(stmt_id).kind {
                i.subject = Some(subject);
            }

            // The inserted value is selected back as its material type,
            // under a fresh set so the mutation shape stays on the subject.
            let material = material_type(c.schema, &c.derived, c.ir.set(subject).ty);
            let result_path = c.new_path_id(material);
            let result = c.ir.alloc_set(SetNode::new(result_path, material));
            if let StmtKind::Insert(i) = &mut c.ir.stmt_mut(stmt_id).kind {
                i.result = Some(result);
            }

            c.fini_stmt(stmt_id, view_name.as_ref(), &q.span)
        })
    }

    fn compile_update(&mut self, q: &UpdateQuery) -> CompileResult<SetId> {
        let view_name = self.ctx().toplevel_result_view_name.clone();

        self.in_subquery(|c| {
            let stmt_id = c.ir.alloc_stmt(StmtNode {
                kind: StmtKind::Update(UpdateStmt::default()),
                parent: None,
                cardinality: None,
            });
            c.init_stmt(stmt_id, &q.aliases)?;

            let subject = c.compile_expr(&q.subject)?;
            let subject_ty = c.set_type(subject, &q.subject.span())?;
            if !c.is_object_type(subject_ty) {
                return Err(CompileError::expression(
                    "cannot update non-object values",
                    Some(q.subject.span()),
                ));
            }

            // Partial paths in FILTER and in the SET shape resolve
            // against the update subject.
            c.ctx_mut().partial_path_anchor = Some(subject);

            let subject = c.compile_query_subject(
                subject,
                &q.shape,
                q.subject_alias.as_ref(),
                false,
                true,
                &q.span,
            )?;
            if let StmtKind::Update(u) = &mut c.ir.stmt_mut(stmt_id).kind {
                u.subject = Some(subject);
            }

            let material = material_type(c.schema, &c.derived, c.ir.set(subject).ty);
            let result_path = c.new_path_id(material);
            let result = c.ir.alloc_set(SetNode::new(result_path, material));

            let where_ = c.compile_where_clause(q.where_.as_ref())?;
            if let StmtKind::Update(u) = &mut c.ir.stmt_mut(stmt_id).kind {
                u.where_ = where_;
                u.result = Some(result);
            }

            c.fini_stmt(stmt_id, view_name.as_ref(), &q.span)
        })
    }

    fn compile_delete(&mut self, q: &DeleteQuery) -> CompileResult<SetId> {
        let view_name = self.ctx().toplevel_result_view_name.clone();

        self.in_subquery(|c| {
            let stmt_id = c.ir.alloc_stmt(StmtNode {
                kind: StmtKind::Delete(DeleteStmt::default()),
                parent: None,
                cardinality: None,
            });
            c.init_stmt(stmt_id, &q.aliases)?;

            // DELETE takes its subject as a whole set.
            let subject = c.in_fenced(|c| {
                let set = c.compile_expr(&q.subject)?;
                Ok(c.scoped_set(set))
            })?;

            let subject_ty = c.set_type(subject, &q.subject.span())?;
            if !c.is_object_type(subject_ty) {
                return Err(CompileError::expression(
                    "cannot delete non-object values",
                    Some(q.subject.span()),
                ));
            }

            if let Some(alias) = &q.subject_alias {
                c.ctx_mut().pathvars.insert(alias.clone(), subject);
            }
            c.ctx_mut().partial_path_anchor = Some(subject);

            let where_ = c.compile_where_clause(q.where_.as_ref())?;

            // The result is the material extent under the subject's own
            // path id.
            let material = material_type(c.schema, &c.derived, subject_ty);
            let subject_path = c.ir.set(subject).path_id.clone();
            let result = c.ir.alloc_set(SetNode::new(subject_path, material));

            if let StmtKind::Delete(d) = &mut c.ir.stmt_mut(stmt_id).kind {
                d.subject = Some(subject);
                d.where_ = where_;
                d.result = Some(result);
            }

            c.fini_stmt(stmt_id, view_name.as_ref(), &q.span)
        })
    }

    /// Shared statement prologue: records the statement node, links the
    /// parent, and processes the WITH block.
    fn init_stmt(&mut self, stmt_id: StmtId, aliases: &[WithEntry]) -> CompileResult<()> {
        self.ctx_mut().stmt = Some(stmt_id);
        if self.toplevel_stmt.is_none() {
            self.toplevel_stmt = Some(stmt_id);
        } else {
            let parent = self.parent_stmt();
            self.ir.stmt_mut(stmt_id).parent = parent;
        }

        self.process_with_entries(aliases, Some(stmt_id))
    }

    pub(crate) fn process_with_entries(
        &mut self,
        aliases: &[WithEntry],
        stmt_id: Option<StmtId>,
    ) -> CompileResult<()> {
        for entry in aliases {
            match entry {
                WithEntry::ModuleAlias {
                    alias: None,
                    module,
                    ..
                } => {
                    self.ctx_mut().module = module.clone();
                }
                WithEntry::ModuleAlias {
                    alias: Some(alias),
                    module,
                    ..
                } => {
                    self.ctx_mut()
                        .namespaces
                        .insert(alias.clone(), module.clone());
                }
                WithEntry::Cardinality { value, .. } => {
                    if let Some(stmt_id) = stmt_id {
                        self.ir.stmt_mut(stmt_id).cardinality = Some(if value == "1" {
                            DeclaredCardinality::One
                        } else {
                            DeclaredCardinality::Many
                        });
                    }
                }
                WithEntry::AliasedExpr { alias, expr, .. } => {
                    self.in_new(|c| c.declare_view(expr, alias, false))?;
                }
            }
        }
        Ok(())
    }

    /// Shared statement epilogue: infers the statement type, derives (or
    /// matches) the requested result view, and wraps the statement into
    /// its result set.
    fn fini_stmt(
        &mut self,
        stmt_id: StmtId,
        view_name: Option<&QualName>,
        span: &Span,
    ) -> CompileResult<SetId> {
        let ty = self.stmt_type(stmt_id, span)?;

        let (result_ty, path_id) = match view_name {
            Some(view_name) => {
                let already_named =
                    type_of(self.schema, &self.derived, ty).name == *view_name;
                let view = if already_named {
                    ty
                } else {
                    self.derive_view(ty, view_name.clone())
                };
                let path_id = self.new_path_id(view);
                self.register_path_scope(&path_id);
                (view, Some(path_id))
            }
            None => (ty, None),
        };

        let set = self.generated_set(
            Expr::Stmt(stmt_id),
            path_id,
            Some(result_ty),
            Some(span.clone()),
        )?;

        if Some(stmt_id) == self.toplevel_stmt {
            return Ok(self.scoped_set(set));
        }
        Ok(set)
    }

    /// Compiles the result clause; an alias binds the result as a
    /// statement-local view. The compiled result becomes the anchor that
    /// `.ptr` partial paths in the remaining clauses resolve against.
    fn compile_result_clause(
        &mut self,
        result: &QlExpr,
        result_alias: Option<&SmolStr>,
    ) -> CompileResult<SetId> {
        let set = match result_alias {
            Some(alias) => {
                let set = self.in_new(|c| c.declare_view(result, alias, false))?;
                let pid = self.ir.set(set).path_id.clone();
                self.register_path_scope(&pid);
                set
            }
            None => self.compile_expr(result)?,
        };

        self.ctx_mut().partial_path_anchor = Some(set);
        Ok(set)
    }

    pub(crate) fn stmt_type(&self, stmt_id: StmtId, span: &Span) -> CompileResult<TypeRef> {
        let result = self.ir.stmt_result(stmt_id).ok_or_else(|| {
            CompileError::internal("statement has no result set")
        })?;
        self.set_type(result, span)
    }

    fn set_stmt_select(&mut self, stmt_id: StmtId, update: impl FnOnce(&mut SelectStmt)) {
        if let StmtKind::Select(s) = &mut self.ir.stmt_mut(stmt_id).kind {
            update(s);
        }
    }
}
