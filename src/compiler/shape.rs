//! Shape compilation: projections, computables, nested mutation shapes,
//! and view-type derivation.
//!
//! Shapes compile onto their source set: each element becomes a set hung
//! off `SetNode::shape`, and the source's type is replaced by a derived
//! view type. Plain object shapes get an implicit `id` element; shapes on
//! link traversals get an implicit `@target`.

use crate::ast::Span;
use crate::ast::expr::{
    Path, PathStep as AstStep, Ptr, PtrDirection, PtrKind, Shape, ShapeElement,
};
use crate::compiler::astutils;
use crate::compiler::context::{Compiler, PartialPointer};
use crate::compiler::error::{CompileError, CompileResult};
use crate::ir::infer::{Cardinality, InferCtx, infer_cardinality};
use crate::ir::{
    DeclaredCardinality, Expr, InsertStmt, PointerRef, SelectStmt, SetId, SetNode, StmtKind,
    StmtNode,
};
use crate::schema::{
    PointerKind, Pointer, PtrCardinality, PtrSource, QualName, TypeRef, is_subclass,
    material_type, resolve_pointer, type_of,
};
use smol_str::SmolStr;

/// Flags steering one shape compilation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ShapeOpts {
    pub include_implicit: bool,
    pub is_insert: bool,
    pub is_update: bool,
    /// Mutation shapes may not reference unknown pointers.
    pub require_known_pointers: bool,
}

impl Compiler<'_> {
    /// `expr { … }` in expression position.
    pub(crate) fn compile_shape_expr(&mut self, shape: &Shape) -> CompileResult<SetId> {
        let source = self.compile_expr(&shape.expr)?;
        let view_ty = self.compile_shape_on(
            source,
            &shape.elements,
            None,
            ShapeOpts {
                include_implicit: true,
                ..ShapeOpts::default()
            },
            &shape.span,
        )?;
        self.ir.set_mut(source).ty = view_ty;
        Ok(source)
    }

    /// The statement-subject form used by INSERT and UPDATE.
    pub(crate) fn compile_query_subject(
        &mut self,
        subject: SetId,
        shape: &[ShapeElement],
        subject_alias: Option<&SmolStr>,
        is_insert: bool,
        is_update: bool,
        span: &Span,
    ) -> CompileResult<SetId> {
        if let Some(alias) = subject_alias {
            self.ctx_mut().pathvars.insert(alias.clone(), subject);
        }

        if shape.is_empty() {
            return Ok(subject);
        }

        let view_ty = self.compile_shape_on(
            subject,
            shape,
            None,
            ShapeOpts {
                include_implicit: false,
                is_insert,
                is_update,
                require_known_pointers: is_insert || is_update,
            },
            span,
        )?;
        self.ir.set_mut(subject).ty = view_ty;
        Ok(subject)
    }

    /// Compiles `elements` into `source`'s shape and derives the view
    /// type that carries the projection.
    pub(crate) fn compile_shape_on(
        &mut self,
        source: SetId,
        elements: &[ShapeElement],
        view_name: Option<QualName>,
        opts: ShapeOpts,
        span: &Span,
    ) -> CompileResult<TypeRef> {
        let source_ty = self.ir.set(source).ty;

        let mut all_elements: Vec<ShapeElement> = Vec::new();
        if opts.include_implicit {
            if self.is_object_type(source_ty) {
                all_elements.push(implicit_pointer_element("id", PtrKind::Link, span));
            } else if self.ir.set(source).rptr.is_some() {
                all_elements.push(implicit_pointer_element(
                    "target",
                    PtrKind::Property,
                    span,
                ));
            }
        }
        all_elements.extend(elements.iter().cloned());

        let mut compiled = Vec::new();
        for element in &all_elements {
            let el_set = self.in_fenced(|c| {
                let el_set = c.compile_shape_el(source, element, opts)?;
                Ok(c.scoped_set(el_set))
            })?;
            compiled.push(el_set);
        }
        self.ir.set_mut(source).shape = compiled;

        let name = match view_name {
            Some(name) => name,
            None => QualName::new("__view__", self.aliases.get("v")),
        };
        Ok(self.derive_view(source_ty, name))
    }

    fn compile_shape_el(
        &mut self,
        source: SetId,
        element: &ShapeElement,
        opts: ShapeOpts,
    ) -> CompileResult<SetId> {
        let (ptr, ptrsource) = self.shape_element_pointer(source, element)?;

        let target_step = if let Some(compexpr) = &element.compexpr {
            self.compile_shape_compexpr(source, element, &ptr, ptrsource, compexpr, opts)?
        } else {
            let step_source = match ptrsource {
                Some(qualifier_ty) => {
                    // `Type.ptr` qualification narrows the source first.
                    let qualified = self.class_set(qualifier_ty, Some(element.span.clone()));
                    self.path_step(qualified, &ptr)?
                }
                None => self.path_step(source, &ptr)?,
            };
            let pid = self.ir.set(step_source).path_id.clone();
            self.ctx_mut().singletons.insert(pid.clone());
            self.register_path_scope(&pid);
            step_source
        };

        // Nested shape handling depends on the statement kind.
        let el = if !element.elements.is_empty() {
            let in_insert = opts.is_insert
                && self
                    .ctx()
                    .stmt
                    .is_some_and(|s| matches!(self.ir.stmt(s).kind, StmtKind::Insert(_)));
            let in_update = opts.is_update
                && self
                    .ctx()
                    .stmt
                    .is_some_and(|s| matches!(self.ir.stmt(s).kind, StmtKind::Update(_)));

            if in_insert {
                self.compile_insert_nested_shape(target_step, &element.elements, &element.span)?
            } else if in_update {
                self.compile_update_nested_shape(target_step, &element.elements, &element.span)?
            } else {
                let nested_view = self.compile_shape_on(
                    target_step,
                    &element.elements,
                    None,
                    ShapeOpts {
                        include_implicit: true,
                        ..ShapeOpts::default()
                    },
                    &element.span,
                )?;
                self.ir.set_mut(target_step).ty = nested_view;
                target_step
            }
        } else {
            target_step
        };

        // Per-element FILTER/ORDER BY/OFFSET/LIMIT (and recursion bounds)
        // wrap the element in a sub-select.
        if element.has_clauses() || element.recurse {
            return self.wrap_shape_el_clauses(el, element);
        }

        Ok(el)
    }

    /// Splits the element's pointer spec: the traversal step itself plus
    /// an optional explicit source-type qualification.
    fn shape_element_pointer(
        &mut self,
        source: SetId,
        element: &ShapeElement,
    ) -> CompileResult<(Ptr, Option<TypeRef>)> {
        match element.path.steps.as_slice() {
            [AstStep::Ptr(ptr)] => {
                if ptr.kind == PtrKind::Property && self.ir.set(source).rptr.is_none() {
                    // Allowed when a computable pointer context is active
                    // (nested mutation shapes); otherwise invalid at top
                    // level.
                    if self.ctx().toplevel_shape_rptr.is_none() {
                        return Err(CompileError::expression(
                            "invalid reference to a link property in a top-level shape",
                            Some(ptr.span.clone()),
                        ));
                    }
                }
                Ok((ptr.clone(), None))
            }
            [AstStep::Root(class_ref), AstStep::Ptr(ptr)] => {
                let qualifier = self.get_schema_type(class_ref)?;
                Ok((ptr.clone(), Some(qualifier)))
            }
            _ => Err(CompileError::expression(
                "invalid shape element path",
                Some(element.span.clone()),
            )),
        }
    }

    /// `ptr := expr` computable elements.
    ///
    /// The expression compiles with the pointer-under-definition exposed,
    /// so link-property references inside resolve against it. When the
    /// pointer does not exist on the source, a new one is derived with a
    /// cardinality taken from the statement's declaration or inferred.
    fn compile_shape_compexpr(
        &mut self,
        source: SetId,
        element: &ShapeElement,
        ptr: &Ptr,
        ptrsource: Option<TypeRef>,
        compexpr: &crate::ast::expr::Expr,
        opts: ShapeOpts,
    ) -> CompileResult<SetId> {
        let is_linkprop = ptr.kind == PtrKind::Property;
        let source_ty = ptrsource.unwrap_or(self.ir.set(source).ty);

        if ptr.name == "__class__" {
            return Err(CompileError::expression(
                "cannot assign to __class__",
                Some(ptr.span.clone()),
            ));
        }

        let existing = if is_linkprop {
            self.ir.set(source).rptr.as_ref().and_then(|rptr| {
                crate::schema::resolve_link_property(
                    self.schema,
                    &self.derived,
                    rptr.ptr,
                    &ptr.name,
                )
            })
        } else {
            resolve_pointer(
                self.schema,
                &self.derived,
                source_ty,
                &ptr.name,
                ptr.direction,
                None,
            )
        };

        let qlstmt = astutils::ensure_qlstmt(compexpr);
        let compiled = self.in_new(|c| {
            c.ctx_mut().toplevel_shape_rptr = Some(PartialPointer {
                source,
                ptr: existing,
                direction: ptr.direction,
            });
            c.ctx_mut().partial_path_anchor = Some(source);
            c.compile_statement(&qlstmt)
        })?;

        let target_ty = self.set_type(compiled, &element.span)?;

        let ptr_ref = match existing {
            Some(found) => {
                // Mutations must write values compatible with the
                // declared pointer target; `std::Object` results pass as
                // an insert-by-id escape hatch.
                if opts.require_known_pointers {
                    let found_data = self.ptr_data(found);
                    let declared = found_data.target;
                    let object = self.std_type("Object")?;
                    if self.is_object_type(declared)
                        && !is_subclass(self.schema, &self.derived, target_ty, declared)
                        && material_type(self.schema, &self.derived, target_ty) != object
                    {
                        return Err(CompileError::pointer(
                            format!(
                                "invalid target for link '{}.{}': '{}' (expecting '{}')",
                                self.type_display(source_ty),
                                ptr.name,
                                self.type_display(target_ty),
                                self.type_display(declared),
                            ),
                            Some(element.span.clone()),
                        ));
                    }
                }
                found
            }
            None => {
                if opts.require_known_pointers {
                    return Err(CompileError::reference(
                        format!("reference to unknown pointer '{}'", ptr.name),
                        Some(ptr.span.clone()),
                    ));
                }

                let cardinality = self.computable_cardinality(compiled);
                let module = ptr
                    .module
                    .clone()
                    .or_else(|| self.ctx().derived_target_module.clone())
                    .unwrap_or_else(|| {
                        type_of(self.schema, &self.derived, source_ty).name.module.clone()
                    });
                let template = Pointer {
                    name: QualName::new(module, ptr.name.clone()),
                    kind: if is_linkprop {
                        PointerKind::Property
                    } else {
                        PointerKind::Link
                    },
                    source: PtrSource::Type(source_ty),
                    target: target_ty,
                    cardinality,
                    required: false,
                    readonly: false,
                    computable_expr: None,
                    is_system: false,
                };
                let source_kind = if is_linkprop {
                    match &self.ir.set(source).rptr {
                        Some(rptr) => PtrSource::Pointer(rptr.ptr),
                        None => PtrSource::Type(source_ty),
                    }
                } else {
                    PtrSource::Type(source_ty)
                };
                self.derive_pointer(&template, source_kind, target_ty, cardinality)
            }
        };

        let path_id = if is_linkprop {
            self.ir
                .set(source)
                .path_id
                .ptr_path()
                .extend(ptr_ref, ptr.direction, target_ty)
        } else {
            self.ir
                .set(source)
                .path_id
                .extend(ptr_ref, ptr.direction, target_ty)
        };

        let stmt_id = self.ensure_stmt(compiled);
        let mut node = SetNode::new(path_id.clone(), target_ty);
        node.expr = Some(Expr::Stmt(stmt_id));
        node.rptr = Some(PointerRef {
            source,
            ptr: ptr_ref,
            direction: ptr.direction,
        });
        node.span = Some(element.span.clone());
        let target_step = self.ir.alloc_set(node);

        self.ctx_mut().singletons.insert(path_id);
        Ok(target_step)
    }

    /// Cardinality of a derived computable pointer: the statement's
    /// declared cardinality wins; otherwise it is inferred from the
    /// compiled expression.
    fn computable_cardinality(&self, compiled: SetId) -> PtrCardinality {
        let declared = self
            .ctx()
            .stmt
            .and_then(|s| self.ir.stmt(s).cardinality);
        match declared {
            Some(DeclaredCardinality::One) => PtrCardinality::ManyToOne,
            Some(DeclaredCardinality::Many) => PtrCardinality::ManyToMany,
            None => {
                let singletons = self.ctx().singletons.iter().cloned().collect();
                let ctx = InferCtx {
                    schema: self.schema,
                    derived: &self.derived,
                    ir: &self.ir,
                };
                if infer_cardinality(ctx, compiled, &singletons) == Cardinality::One {
                    PtrCardinality::ManyToOne
                } else {
                    PtrCardinality::ManyToMany
                }
            }
        }
    }

    /// Nested INSERT shapes split into the mutation shape (plain
    /// pointers, inserted) and the returning shape (link properties,
    /// selected back).
    fn compile_insert_nested_shape(
        &mut self,
        target_step: SetId,
        elements: &[ShapeElement],
        span: &Span,
    ) -> CompileResult<SetId> {
        let (returning, mutation): (Vec<ShapeElement>, Vec<ShapeElement>) = elements
            .iter()
            .cloned()
            .partition(|el| is_linkprop_element(el));

        let rptr = self.ir.set(target_step).rptr.clone();

        // The returning selection works on a copy of the target step, so
        // the mutation shape and the returning shape stay separate.
        let ret_set = {
            let node = self.ir.set(target_step).clone();
            self.ir.alloc_set(node)
        };

        self.compile_shape_on(
            target_step,
            &mutation,
            None,
            ShapeOpts {
                include_implicit: false,
                is_insert: true,
                is_update: false,
                require_known_pointers: true,
            },
            span,
        )?;

        self.compile_shape_on(
            ret_set,
            &returning,
            None,
            ShapeOpts {
                include_implicit: true,
                ..ShapeOpts::default()
            },
            span,
        )?;

        let parent = self.ctx().stmt;
        let substmt = self.ir.alloc_stmt(StmtNode {
            kind: StmtKind::Insert(InsertStmt {
                subject: Some(target_step),
                result: Some(ret_set),
            }),
            parent,
            cardinality: None,
        });

        let result_ty = self.ir.set(ret_set).ty;
        let result = self.generated_set(
            Expr::Stmt(substmt),
            None,
            Some(result_ty),
            Some(span.clone()),
        )?;
        self.ir.set_mut(result).rptr = rptr;
        Ok(result)
    }

    /// Nested UPDATE shapes may only adjust link properties; they compile
    /// to a selection over the existing targets.
    fn compile_update_nested_shape(
        &mut self,
        target_step: SetId,
        elements: &[ShapeElement],
        span: &Span,
    ) -> CompileResult<SetId> {
        for el in elements {
            if !is_linkprop_element(el) {
                return Err(CompileError::expression(
                    "only references to link properties are allowed in nested UPDATE shapes",
                    Some(el.span.clone()),
                ));
            }
        }

        let rptr = self.ir.set(target_step).rptr.clone();

        self.compile_shape_on(
            target_step,
            elements,
            None,
            ShapeOpts {
                include_implicit: false,
                is_insert: false,
                is_update: true,
                require_known_pointers: true,
            },
            span,
        )?;

        let parent = self.ctx().stmt;
        let substmt = self.ir.alloc_stmt(StmtNode {
            kind: StmtKind::Select(SelectStmt {
                result: Some(target_step),
                ..SelectStmt::default()
            }),
            parent,
            cardinality: None,
        });

        let result_ty = self.ir.set(target_step).ty;
        let result = self.generated_set(
            Expr::Stmt(substmt),
            None,
            Some(result_ty),
            Some(span.clone()),
        )?;
        self.ir.set_mut(result).rptr = rptr;
        Ok(result)
    }

    /// Wraps a shape element carrying FILTER/ORDER BY/OFFSET/LIMIT (or a
    /// recursion bound) into a sub-select sharing the element's path id.
    fn wrap_shape_el_clauses(
        &mut self,
        el: SetId,
        element: &ShapeElement,
    ) -> CompileResult<SetId> {
        let (where_, orderby, offset, limit, recurse_depth) = {
            self.ctx_mut().partial_path_anchor = Some(el);

            let where_ = self.compile_where_clause(element.where_.as_ref())?;
            let orderby = self.compile_orderby_clause(&element.orderby)?;
            let offset = self.compile_limit_offset_clause(element.offset.as_ref())?;
            let limit = self.compile_limit_offset_clause(element.limit.as_ref())?;

            let recurse_depth = match &element.recurse_limit {
                Some(limit_expr) => Some(self.compile_expr(limit_expr)?),
                None if element.recurse => {
                    // An unbounded recursion marker records depth zero.
                    let int64 = self.std_type("int64")?;
                    Some(self.generated_set(
                        Expr::Constant {
                            value: crate::ir::ConstValue::Int(0),
                            ty: int64,
                        },
                        None,
                        Some(int64),
                        Some(element.span.clone()),
                    )?)
                }
                None => None,
            };

            (where_, orderby, offset, limit, recurse_depth)
        };

        let parent = self.ctx().stmt;
        let substmt = self.ir.alloc_stmt(StmtNode {
            kind: StmtKind::Select(SelectStmt {
                result: Some(el),
                where_,
                orderby,
                offset,
                limit,
                iterator: None,
                recurse_depth,
            }),
            parent,
            cardinality: None,
        });

        let el_node = self.ir.set(el).clone();
        let wrapper = self.generated_set(
            Expr::Stmt(substmt),
            Some(el_node.path_id.clone()),
            Some(el_node.ty),
            Some(element.span.clone()),
        )?;
        self.ir.set_mut(wrapper).rptr = el_node.rptr.clone();
        self.ir.set_mut(wrapper).shape = el_node.shape.clone();
        self.ir.set_mut(el).shape = Vec::new();
        Ok(wrapper)
    }
}

/// Builds the implicit `id` / `@target` shape elements.
fn implicit_pointer_element(name: &str, kind: PtrKind, span: &Span) -> ShapeElement {
    ShapeElement::pointer(Path {
        steps: vec![AstStep::Ptr(Ptr {
            module: None,
            name: SmolStr::new(name),
            direction: PtrDirection::Outbound,
            kind,
            target: None,
            span: span.clone(),
        })],
        partial: true,
        span: span.clone(),
    })
}

/// True when the element's first step is a link property reference.
fn is_linkprop_element(element: &ShapeElement) -> bool {
    matches!(
        element.path.steps.first(),
        Some(AstStep::Ptr(ptr)) if ptr.kind == PtrKind::Property
    )
}
