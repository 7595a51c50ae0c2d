//! Set construction: path compilation, canonical-set interning, pointer
//! traversal, and computable expansion.
//!
//! The interning map guarantees that two syntactic occurrences of the same
//! canonical path within one context level yield the same set, which is
//! what downstream prefix factoring relies on.

use crate::ast::Span;
use crate::ast::expr::{Path, PathStep as AstStep, Ptr, PtrDirection, PtrKind};
use crate::compiler::context::{Compiler, SetKey};
use crate::compiler::error::{CompileError, CompileResult};
use crate::ir::infer::{InferCtx, infer_expr_type};
use crate::ir::{Expr, PathId, PointerRef, SetId, SetNode, StmtId, StmtKind, SelectStmt, StmtNode};
use crate::schema::{
    PtrRef, PtrSource, QualName, TypeKind, TypeRef, material_type, ptr_of,
    resolve_link_property, resolve_pointer, type_of,
};
use smol_str::SmolStr;

impl Compiler<'_> {
    /// A path id rooted at `ty`, qualified by the active namespace stack.
    pub(crate) fn new_path_id(&self, ty: TypeRef) -> PathId {
        let mut path_id = PathId::from_type(ty);
        for ns in &self.ctx().path_id_namespace {
            path_id = path_id.with_weak_namespace(ns.clone());
        }
        path_id
    }

    /// The canonical set for a bare class reference.
    pub(crate) fn class_set(&mut self, ty: TypeRef, span: Option<Span>) -> SetId {
        let path_id = self.new_path_id(ty);
        let key = SetKey::Path(path_id.clone());

        if let Some(existing) = self.ctx().sets.get(&key) {
            let existing = *existing;
            self.register_path_scope(&path_id);
            return existing;
        }

        let mut node = SetNode::new(path_id.clone(), ty);
        node.span = span;
        let set = self.ir.alloc_set(node);
        self.ctx_mut().sets.insert(key, set);
        self.register_path_scope(&path_id);
        set
    }

    /// Wraps an IR expression in a fresh set.
    ///
    /// The set's path id is a type-rooted id under a unique expression
    /// namespace, or `path_id` when the caller supplies one (computables
    /// share their pointer path).
    pub(crate) fn generated_set(
        &mut self,
        expr: Expr,
        path_id: Option<PathId>,
        typehint: Option<TypeRef>,
        span: Option<Span>,
    ) -> CompileResult<SetId> {
        let ty = match typehint {
            Some(ty) => ty,
            None => {
                let ctx = InferCtx {
                    schema: self.schema,
                    derived: &self.derived,
                    ir: &self.ir,
                };
                infer_expr_type(ctx, &expr, None)
                    .map_err(|e| CompileError::type_error(e.message, span.clone()))?
            }
        };

        let path_id = match path_id {
            Some(pid) => pid,
            None => {
                let alias = self.aliases.get("expr");
                PathId::from_type(ty).with_expr_namespace(alias)
            }
        };

        let mut node = SetNode::new(path_id, ty);
        node.expr = Some(expr);
        node.span = span;
        Ok(self.ir.alloc_set(node))
    }

    /// Attaches the current path-scope snapshot to a set (statement
    /// results, fenced sub-expressions).
    pub(crate) fn scoped_set(&mut self, set: SetId) -> SetId {
        let snapshot = self.path_scope_snapshot();
        self.ir.set_mut(set).path_scope = snapshot;
        set
    }

    /// Ensures a statement node: sets whose expression already is a
    /// statement pass through; anything else is wrapped into a bare
    /// `SELECT`.
    pub(crate) fn ensure_stmt(&mut self, set: SetId) -> StmtId {
        if let Some(Expr::Stmt(id)) = &self.ir.set(set).expr {
            return *id;
        }
        let parent = self.ctx().stmt;
        self.ir.alloc_stmt(StmtNode {
            kind: StmtKind::Select(SelectStmt {
                result: Some(set),
                ..SelectStmt::default()
            }),
            parent,
            cardinality: None,
        })
    }

    /// Compiles a path expression into its canonical set: anchors and
    /// path variables resolve first, then schema names; pointer steps
    /// extend the tip with interning.
    pub(crate) fn compile_path(&mut self, path: &Path) -> CompileResult<SetId> {
        let mut path_tip: Option<SetId> = None;

        if path.partial {
            let Some(anchor) = self.ctx().partial_path_anchor else {
                return Err(CompileError::expression(
                    "could not resolve partial path: no result subject in scope",
                    Some(path.span.clone()),
                ));
            };
            path_tip = Some(anchor);
        }

        for (i, step) in path.steps.iter().enumerate() {
            match step {
                AstStep::SelfAnchor(span) => {
                    let anchor = self.ctx().anchors.get("self").copied();
                    path_tip = Some(anchor.ok_or_else(|| {
                        CompileError::reference(
                            "'self' is not bound in this context",
                            Some(span.clone()),
                        )
                    })?);
                }
                AstStep::SubjectAnchor(span) => {
                    let anchor = self.ctx().anchors.get("__subject__").copied();
                    path_tip = Some(anchor.ok_or_else(|| {
                        CompileError::reference(
                            "'__subject__' is not bound in this context",
                            Some(span.clone()),
                        )
                    })?);
                }
                AstStep::Root(class_ref) => {
                    if i > 0 {
                        return Err(CompileError::internal(
                            "unexpected class reference as a non-first path step",
                        ));
                    }

                    if class_ref.module.is_none() {
                        if let Some(anchor) = self.ctx().anchors.get(&class_ref.name) {
                            path_tip = Some(*anchor);
                            continue;
                        }
                        if let Some(var) = self.ctx().pathvars.get(&class_ref.name) {
                            let var = *var;
                            let pid = self.ir.set(var).path_id.clone();
                            self.register_path_scope(&pid);
                            path_tip = Some(var);
                            continue;
                        }
                    }

                    let ty = self.get_schema_type(class_ref)?;
                    let is_view =
                        type_of(self.schema, &self.derived, ty).is_view()
                            && matches!(ty, TypeRef::Schema(_));
                    path_tip = Some(if is_view {
                        self.declare_view_from_schema(ty, &class_ref.span)?
                    } else {
                        self.class_set(ty, Some(class_ref.span.clone()))
                    });
                }
                AstStep::Ptr(ptr) => {
                    let tip = path_tip.ok_or_else(|| {
                        CompileError::internal("pointer step without a path root")
                    })?;
                    path_tip = Some(self.path_step(tip, ptr)?);
                }
                AstStep::Expr(expr) => {
                    if i > 0 {
                        return Err(CompileError::internal(
                            "unexpected expression as a non-first path step",
                        ));
                    }
                    path_tip = Some(self.compile_expr(expr)?);
                }
            }
        }

        let tip =
            path_tip.ok_or_else(|| CompileError::internal("path compiled to no steps"))?;
        let tip_path = self.ir.set(tip).path_id.clone();
        self.register_path_scope(&tip_path);
        Ok(tip)
    }

    /// Compiles one pointer step off `path_tip`.
    pub(crate) fn path_step(&mut self, path_tip: SetId, ptr: &Ptr) -> CompileResult<SetId> {
        // Link properties traverse off the preceding pointer, not its
        // target type.
        if ptr.kind == PtrKind::Property {
            return self.link_property_step(path_tip, ptr);
        }

        let tip_ty = self.ir.set(path_tip).ty;
        let tip_material = material_type(self.schema, &self.derived, tip_ty);

        // Tuple field access compiles to a tuple indirection.
        if let TypeKind::Tuple { elements, .. } =
            &type_of(self.schema, &self.derived, tip_material).kind
        {
            let elements = elements.clone();
            return self.tuple_field_step(path_tip, ptr, &elements);
        }

        // A matching element in the tip's shape wins over schema
        // resolution, so view computables resolve to their definitions.
        if let Some(found) = self.find_shape_pointer(path_tip, &ptr.name) {
            let found_path = self.ir.set(found).path_id.clone();
            self.register_path_scope(&found_path);
            return Ok(found);
        }

        let ptr_target = match &ptr.target {
            Some(target_ref) => {
                let target_ty = self.get_schema_type(target_ref)?;
                if !self.is_object_type(target_ty) {
                    return Err(CompileError::expression(
                        format!(
                            "invalid type filter operand: {} is not an object type",
                            self.type_display(target_ty)
                        ),
                        Some(target_ref.span.clone()),
                    ));
                }
                Some(target_ty)
            }
            None => None,
        };

        let ptr_ref = self.resolve_ptr(tip_ty, ptr, ptr_target)?;
        let ptr_data = self.ptr_data(ptr_ref);
        let far = ptr_data.far_endpoint(ptr.direction).ok_or_else(|| {
            CompileError::pointer(
                format!(
                    "pointer '{}' has no endpoint in that direction",
                    ptr_data.name
                ),
                Some(ptr.span.clone()),
            )
        })?;
        let target = ptr_target.unwrap_or(far);

        let mut tip = self.extend_path(path_tip, ptr_ref, ptr.direction, target, &ptr.span)?;

        // A type filter over a virtual target wraps the tip; concrete
        // targets were already narrowed during pointer resolution.
        if let Some(filter_ty) = ptr_target {
            let is_virtual = type_of(self.schema, &self.derived, far).is_virtual();
            if is_virtual {
                tip = self.type_filtered_set(tip, filter_ty, &ptr.span)?;
            }
        }

        Ok(tip)
    }

    fn tuple_field_step(
        &mut self,
        path_tip: SetId,
        ptr: &Ptr,
        elements: &[(SmolStr, TypeRef)],
    ) -> CompileResult<SetId> {
        let Some((_, el_ty)) = elements.iter().find(|(n, _)| *n == ptr.name) else {
            return Err(CompileError::reference(
                format!("'{}' is not a member of the tuple", ptr.name),
                Some(ptr.span.clone()),
            ));
        };
        let el_ty = *el_ty;

        let key = SetKey::TupleField(path_tip, ptr.name.clone());
        if let Some(existing) = self.ctx().sets.get(&key) {
            return Ok(*existing);
        }

        let path_id = self
            .ir
            .set(path_tip)
            .path_id
            .extend_tuple(ptr.name.clone(), el_ty);
        let set = self.generated_set(
            Expr::TupleIndirection {
                expr: path_tip,
                name: ptr.name.clone(),
            },
            Some(path_id.clone()),
            Some(el_ty),
            Some(ptr.span.clone()),
        )?;
        self.ctx_mut().sets.insert(key, set);
        self.register_path_scope(&path_id);
        Ok(set)
    }

    fn link_property_step(&mut self, path_tip: SetId, ptr: &Ptr) -> CompileResult<SetId> {
        let rptr = self.ir.set(path_tip).rptr.clone().or_else(|| {
            self.ctx()
                .toplevel_shape_rptr
                .as_ref()
                .and_then(|partial| {
                    partial.ptr.map(|p| PointerRef {
                        source: partial.source,
                        ptr: p,
                        direction: partial.direction,
                    })
                })
        });

        let Some(rptr) = rptr else {
            return Err(CompileError::expression(
                format!(
                    "link property '@{}' can only be referenced off a link",
                    ptr.name
                ),
                Some(ptr.span.clone()),
            ));
        };

        let lprop =
            resolve_link_property(self.schema, &self.derived, rptr.ptr, &ptr.name).ok_or_else(
                || {
                    CompileError::reference(
                        format!("link has no property '{}'", ptr.name),
                        Some(ptr.span.clone()),
                    )
                },
            )?;

        let lprop_data = self.ptr_data(lprop);
        let target = lprop_data.target;

        // Link-property paths extend the pointer-flavored id of the link.
        let base = self.ir.set(path_tip).path_id.ptr_path();
        let path_id = base.extend(lprop, PtrDirection::Outbound, target);

        let key = SetKey::Path(path_id.clone());
        if let Some(existing) = self.ctx().sets.get(&key) {
            return Ok(*existing);
        }

        let mut node = SetNode::new(path_id.clone(), target);
        node.rptr = Some(PointerRef {
            source: path_tip,
            ptr: lprop,
            direction: PtrDirection::Outbound,
        });
        node.span = Some(ptr.span.clone());
        let set = self.ir.alloc_set(node);
        self.ctx_mut().sets.insert(key, set);
        self.register_path_scope(&path_id);
        Ok(set)
    }

    /// Searches the tip's shape for an element matching the pointer name.
    fn find_shape_pointer(&self, path_tip: SetId, name: &SmolStr) -> Option<SetId> {
        for el in &self.ir.set(path_tip).shape {
            let Some(rptr) = &self.ir.set(*el).rptr else {
                continue;
            };
            let ptr = ptr_of(self.schema, &self.derived, rptr.ptr);
            if ptr.shortname() == name {
                return Some(*el);
            }
        }
        None
    }

    /// Resolves a pointer name on the tip type, with the `std::__class__`
    /// special case for non-source expressions.
    fn resolve_ptr(
        &mut self,
        source: TypeRef,
        ptr: &Ptr,
        far_endpoint: Option<TypeRef>,
    ) -> CompileResult<PtrRef> {
        if let Some(found) = resolve_pointer(
            self.schema,
            &self.derived,
            source,
            &ptr.name,
            ptr.direction,
            far_endpoint,
        ) {
            return Ok(found);
        }

        // `.__class__` is defined on the object root; scalar and derived
        // expressions get a derived instance onto the metaclass.
        if ptr.direction == PtrDirection::Outbound && ptr.name == "__class__" {
            let object = self
                .schema
                .get(&QualName::new("std", "Object"))
                .map(TypeRef::Schema)
                .map_err(|_| CompileError::internal("std::Object is missing"))?;
            if let Some(base) = resolve_pointer(
                self.schema,
                &self.derived,
                object,
                "__class__",
                PtrDirection::Outbound,
                None,
            ) {
                let template = self.ptr_data(base);
                let target = template.target;
                let cardinality = template.cardinality;
                return Ok(self.derive_pointer(
                    &template,
                    PtrSource::Type(source),
                    target,
                    cardinality,
                ));
            }
        }

        let direction = match ptr.direction {
            PtrDirection::Outbound => ">",
            PtrDirection::Inbound => "<",
        };
        let mut shown = format!(
            "({}).{}({})",
            self.type_display(source),
            direction,
            ptr.name
        );
        if let Some(far) = far_endpoint {
            shown.push_str(&format!("[IS {}]", self.type_display(far)));
        }
        Err(CompileError::reference(
            format!("{shown} does not resolve to any known path"),
            Some(ptr.span.clone()),
        ))
    }

    /// Extends the path tip through a pointer, interning by path id.
    /// Pure-computable pointers are replaced by their compiled expression,
    /// sharing the path id.
    pub(crate) fn extend_path(
        &mut self,
        source_set: SetId,
        ptr_ref: PtrRef,
        direction: PtrDirection,
        target: TypeRef,
        span: &Span,
    ) -> CompileResult<SetId> {
        let path_id = self
            .ir
            .set(source_set)
            .path_id
            .extend(ptr_ref, direction, target);

        // Only plain path tips share canonical sets; derived expressions
        // build their own traversals.
        let source_is_plain = self.ir.set(source_set).expr.is_none()
            || type_of(self.schema, &self.derived, self.ir.set(source_set).ty).is_view();
        let key = SetKey::Path(path_id.clone());
        if source_is_plain
            && let Some(existing) = self.ctx().sets.get(&key)
        {
            let existing = *existing;
            self.register_path_scope(&path_id);
            return Ok(existing);
        }

        let mut node = SetNode::new(path_id.clone(), target);
        node.rptr = Some(PointerRef {
            source: source_set,
            ptr: ptr_ref,
            direction,
        });
        node.span = Some(span.clone());
        let mut target_set = self.ir.alloc_set(node);

        let ptr_data = self.ptr_data(ptr_ref);
        if ptr_data.is_pure_computable() {
            target_set = self.computable_ptr_set(source_set, ptr_ref, direction, span)?;
        }

        self.ctx_mut().sets.insert(key, target_set);
        self.register_path_scope(&path_id);
        Ok(target_set)
    }

    /// Interns an `expr[IS Type]` wrapper over a virtual-typed tip.
    fn type_filtered_set(
        &mut self,
        tip: SetId,
        filter_ty: TypeRef,
        span: &Span,
    ) -> CompileResult<SetId> {
        let path_id = self.ir.set(tip).path_id.clone();
        let filter_name = type_of(self.schema, &self.derived, filter_ty).name.clone();
        let key = SetKey::TypeFiltered(path_id.clone(), filter_name);

        if let Some(existing) = self.ctx().sets.get(&key) {
            return Ok(*existing);
        }

        let rptr = self.ir.set(tip).rptr.clone();
        let filtered = self.generated_set(
            Expr::TypeFilter {
                expr: tip,
                ty: filter_ty,
            },
            Some(path_id),
            Some(filter_ty),
            Some(span.clone()),
        )?;
        self.ir.set_mut(filtered).rptr = rptr;
        self.ctx_mut().sets.insert(key, filtered);
        Ok(filtered)
    }

    /// Compiles the stored expression of a pure-computable pointer into a
    /// set that stands in for the traversal, sharing its path id.
    pub(crate) fn computable_ptr_set(
        &mut self,
        source_set: SetId,
        ptr_ref: PtrRef,
        direction: PtrDirection,
        span: &Span,
    ) -> CompileResult<SetId> {
        let ptr_data = self.ptr_data(ptr_ref);
        let Some(text) = ptr_data.computable_expr.clone() else {
            return Err(CompileError::internal(format!(
                "'{}' is not a computable pointer",
                ptr_data.name
            )));
        };

        let default_expr = crate::parser::parse_fragment_internal(&text).map_err(|diag| {
            CompileError::new(
                crate::compiler::error::CompileErrorKind::Syntax,
                format!(
                    "error in the computed expression of '{}': {}",
                    ptr_data.name, diag.message
                ),
                Some(span.clone()),
            )
        })?;

        // The computable is compiled in a detached context where `self`
        // denotes the traversal source; only the source's own prefixes
        // remain visible for correlation.
        let source_prefixes: std::collections::HashSet<PathId> = self
            .ir
            .set(source_set)
            .path_id
            .iter_prefixes()
            .collect();

        let substmt = self.in_subquery(|c| {
            let ns = c.aliases.get("ns");
            {
                let ctx = c.ctx_mut();
                ctx.anchors.clear();
                ctx.pathvars.clear();
                ctx.anchors.insert(SmolStr::new("self"), source_set);
                ctx.path_id_namespace.push(ns);
                ctx.path_scope
                    .retain(|p| source_prefixes.contains(p));
                ctx.stmt_local_path_scope
                    .retain(|p| source_prefixes.contains(p));
            }
            c.compile_expr(&default_expr)
        })?;

        let target = {
            let ctx = InferCtx {
                schema: self.schema,
                derived: &self.derived,
                ir: &self.ir,
            };
            crate::ir::infer::infer_type(ctx, substmt)
                .map_err(|e| CompileError::type_error(e.message, Some(span.clone())))?
        };

        let path_id = self
            .ir
            .set(source_set)
            .path_id
            .extend(ptr_ref, direction, target);

        let expr = Expr::Stmt(self.ensure_stmt(substmt));
        let set = self.generated_set(expr, Some(path_id), Some(target), Some(span.clone()))?;
        self.ir.set_mut(set).rptr = Some(PointerRef {
            source: source_set,
            ptr: ptr_ref,
            direction,
        });
        Ok(set)
    }
}
