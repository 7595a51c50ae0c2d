//! Statement-level context management: view declaration, anchors, and the
//! final namespace-stripping pass.

use crate::ast::Span;
use crate::ast::expr::Expr as QlExpr;
use crate::compiler::astutils;
use crate::compiler::context::Compiler;
use crate::compiler::error::{CompileError, CompileResult};
use crate::ir::{IrStatement, Namespace, SetId};
use crate::schema::{PtrRef, PtrSource, QualName, TypeKind, TypeRef, type_of};
use indexmap::IndexMap;
use smol_str::SmolStr;

/// A pre-bound name supplied by the embedder.
#[derive(Debug, Clone, Copy)]
pub enum AnchorTarget {
    /// The anchor denotes the whole extent of a type.
    Type(TypeRef),
    /// The anchor denotes a pointer traversal off its source.
    Pointer(PtrRef),
}

impl Compiler<'_> {
    /// Declares a statement-local view for `alias := expr`.
    ///
    /// The body compiles in a detached, fenced subcontext under a fresh
    /// weak namespace; the namespace is recorded on the enclosing fence so
    /// the final pass can strip it. The view's own path id is restored to
    /// the outer namespace so external references use the plain id.
    pub(crate) fn declare_view(
        &mut self,
        expr: &QlExpr,
        alias: &SmolStr,
        fully_detached: bool,
    ) -> CompileResult<SetId> {
        let qlstmt = astutils::ensure_qlstmt(expr);

        let outer_namespace = self.ctx().path_id_namespace.clone();
        let outer_scope = self.ctx().scope;

        let view_counter = self.aliases.get("w");
        let view_name = QualName::new("_", format!("{alias}@@{view_counter}"));

        let view_set = self.in_subquery(|c| {
            let fence = c.scope_tree.add_fence(outer_scope);
            c.ctx_mut().scope = fence;

            if !fully_detached {
                let ns = c.aliases.get("ns");
                c.scope_tree.add_namespace(outer_scope, ns.clone());
                c.ctx_mut().path_id_namespace.push(ns);
            }

            c.ctx_mut().toplevel_result_view_name = Some(view_name.clone());
            c.compile_statement(&qlstmt)
        })?;

        // The view path id itself must live in the outer namespace.
        let restored = self
            .ir
            .set(view_set)
            .path_id
            .replace_namespace(
                outer_namespace
                    .iter()
                    .map(|ns| Namespace::Weak(ns.clone()))
                    .collect(),
            );
        self.ir.set_mut(view_set).path_id = restored;

        let view_ty = self.ir.set(view_set).ty;
        self.ctx_mut().aliased_views.insert(alias.clone(), view_ty);
        self.ctx_mut().pathvars.insert(alias.clone(), view_set);

        Ok(view_set)
    }

    /// Materializes a view stored in the schema: parses its body, compiles
    /// it in a fully detached context, and caches the result on the view
    /// name. A placeholder class set is cached before compilation so
    /// self-referential views resolve to their own base instead of
    /// recursing forever.
    pub(crate) fn declare_view_from_schema(
        &mut self,
        view_ty: TypeRef,
        span: &Span,
    ) -> CompileResult<SetId> {
        let (name, expr_text) = {
            let ty = type_of(self.schema, &self.derived, view_ty);
            let TypeKind::View { expr, .. } = &ty.kind else {
                return Err(CompileError::internal(format!(
                    "{} is not a view",
                    ty.name
                )));
            };
            (ty.name.clone(), expr.clone())
        };

        if let Some(cached) = self.view_cache.get(&name) {
            if let Some(set) = cached {
                return Ok(*set);
            }
            return Err(CompileError::reference(
                format!("cyclic definition of view {name}"),
                Some(span.clone()),
            ));
        }

        // Cycle breaker: until the body finishes compiling, references to
        // this view resolve to its plain class set.
        let placeholder = self.class_set(view_ty, Some(span.clone()));
        self.view_cache.insert(name.clone(), Some(placeholder));

        let parsed = crate::parser::parse_statement_internal(&expr_text).map_err(|diag| {
            CompileError::new(
                crate::compiler::error::CompileErrorKind::Syntax,
                format!("error in the definition of view {name}: {}", diag.message),
                Some(span.clone()),
            )
        })?;

        let alias = name.name.clone();
        let view_set = self.in_subquery(|c| {
            let stmt_expr = QlExpr::Statement(Box::new(parsed), span.clone());
            c.declare_view(&stmt_expr, &alias, true)
        })?;

        self.views.insert(name.clone(), self.ir.set(view_set).ty);
        self.view_cache.insert(name, Some(view_set));
        Ok(view_set)
    }

    /// Installs embedder-supplied anchors into the root context.
    pub(crate) fn populate_anchors(
        &mut self,
        anchors: &[(SmolStr, AnchorTarget)],
    ) -> CompileResult<()> {
        for (name, target) in anchors {
            let set = match target {
                AnchorTarget::Type(ty) => self.class_set(*ty, None),
                AnchorTarget::Pointer(ptr_ref) => {
                    let ptr = self.ptr_data(*ptr_ref);
                    let PtrSource::Type(source_ty) = ptr.source else {
                        return Err(CompileError::expression(
                            format!("anchor '{name}' must be a link on an object type"),
                            None,
                        ));
                    };
                    let source = self.class_set(source_ty, None);
                    self.extend_path(
                        source,
                        *ptr_ref,
                        crate::ast::expr::PtrDirection::Outbound,
                        ptr.target,
                        &(0..0),
                    )?
                }
            };
            self.ir.set_mut(set).anchor = Some(name.clone());
            self.ctx_mut().anchors.insert(name.clone(), set);
        }
        Ok(())
    }

    /// The final pass: strips weak namespaces from every recorded set and
    /// every scope-tree node, then packages the finished IR.
    pub(crate) fn fini_expression(mut self, root: SetId) -> IrStatement {
        for set in self.ir.sets.iter_mut() {
            if set.path_id.namespace().iter().any(|ns| ns.is_weak()) {
                set.path_id = set.path_id.strip_weak_namespaces();
            }
            set.path_scope = set
                .path_scope
                .iter()
                .map(|p| p.strip_weak_namespaces())
                .collect();
        }
        self.scope_tree.strip_weak_namespaces();

        let params: IndexMap<SmolStr, TypeRef> = self
            .ctx()
            .arguments
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();

        IrStatement {
            root,
            ir: self.ir,
            scope_tree: self.scope_tree,
            params,
            views: self.views,
            derived: self.derived,
        }
    }
}
