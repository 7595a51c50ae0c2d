//! Expression compilation: the AST-kind dispatch and all non-statement
//! handlers.
//!
//! Dispatch is a single exhaustive match; every handler returns a set.
//! Several surface forms are desugared before compilation: `?=`/`?!=`
//! into an IF/ELSE over EXISTS, `IF/ELSE` into an exclusive UNION of two
//! filtered selects, and set literals into left-associated UNION chains.

use crate::ast::expr::{
    BinOpKind, ClassRef, Constant, Expr as QlExpr, IndirectionEl, Ptr, PtrDirection, PtrKind,
    TypeName, UnaryOpKind,
};
use crate::ast::{Span, merge_spans};
use crate::compiler::astutils;
use crate::compiler::context::Compiler;
use crate::compiler::error::{CompileError, CompileResult};
use crate::ir::infer::{InferCtx, infer_type};
use crate::ir::{ConstValue, Expr, SetId, TupleElement};
use crate::schema::{QualName, TypeKind, TypeRef, nearest_common_ancestor, type_of};
use smol_str::SmolStr;

impl Compiler<'_> {
    /// Compiles any expression into a set.
    pub(crate) fn compile_expr(&mut self, expr: &QlExpr) -> CompileResult<SetId> {
        match expr {
            QlExpr::Path(path) => self.compile_path(path),
            QlExpr::Constant(value, span) => self.compile_constant(value, span),
            QlExpr::Parameter(name, span) => self.compile_parameter(name, span),
            QlExpr::BinOp {
                left,
                op,
                right,
                span,
            } => self.compile_binop(left, *op, right, span),
            QlExpr::UnaryOp { op, operand, span } => self.compile_unary(*op, operand, span),
            QlExpr::IfElse {
                if_expr,
                condition,
                else_expr,
                span,
            } => self.compile_ifelse(condition, if_expr, else_expr, span),
            QlExpr::Exists { expr, span } => self.compile_exists(expr, span),
            QlExpr::Coalesce { args, span } => self.compile_coalesce(args, span),
            QlExpr::TypeCast { ty, expr, span } => self.compile_typecast(ty, expr, span),
            QlExpr::TypeFilter { expr, ty, span } => self.compile_typefilter(expr, ty, span),
            QlExpr::Indirection {
                arg,
                elements,
                span,
            } => self.compile_indirection(arg, elements, span),
            QlExpr::Tuple { elements, span } => self.compile_tuple(elements, span),
            QlExpr::NamedTuple { elements, span } => self.compile_named_tuple(elements, span),
            QlExpr::Array { elements, span } => self.compile_array(elements, span),
            QlExpr::Mapping { keys, values, span } => self.compile_mapping(keys, values, span),
            QlExpr::Set { elements, span } => self.compile_set_literal(elements, span),
            QlExpr::EmptyCollection { span } => Err(CompileError::expression(
                "could not determine the type of an empty collection",
                Some(span.clone()),
            )
            .with_hint("add a cast, e.g. <array<int64>>[]")),
            QlExpr::FunctionCall(call) => self.compile_function_call(call),
            QlExpr::Shape(shape) => self.compile_shape_expr(shape),
            QlExpr::Statement(stmt, _) => self.compile_statement(stmt),
        }
    }

    pub(crate) fn std_type(&self, name: &str) -> CompileResult<TypeRef> {
        self.schema
            .get(&QualName::new("std", name))
            .map(TypeRef::Schema)
            .map_err(|_| CompileError::internal(format!("standard type std::{name} is missing")))
    }

    fn compile_constant(&mut self, value: &Constant, span: &Span) -> CompileResult<SetId> {
        let (value, ty) = match value {
            Constant::Int(v) => (ConstValue::Int(*v), self.std_type("int64")?),
            Constant::Float(v) => (ConstValue::Float(*v), self.std_type("float64")?),
            Constant::Str(v) => (ConstValue::Str(v.clone()), self.std_type("str")?),
            Constant::Bool(v) => (ConstValue::Bool(*v), self.std_type("bool")?),
        };
        self.generated_set(
            Expr::Constant { value, ty },
            None,
            Some(ty),
            Some(span.clone()),
        )
    }

    fn compile_parameter(&mut self, name: &SmolStr, span: &Span) -> CompileResult<SetId> {
        let Some(ty) = self.ctx().arguments.get(name).copied() else {
            return Err(CompileError::expression(
                format!("no type information for parameter ${name}"),
                Some(span.clone()),
            ));
        };
        self.generated_set(
            Expr::Parameter {
                name: name.clone(),
                ty,
            },
            None,
            Some(ty),
            Some(span.clone()),
        )
    }

    fn compile_binop(
        &mut self,
        left: &QlExpr,
        op: BinOpKind,
        right: &QlExpr,
        span: &Span,
    ) -> CompileResult<SetId> {
        if op.is_type_check() {
            return self.compile_type_check_op(left, op, right, span);
        }
        if op.is_set_op() {
            return self.compile_set_op(left, right, span);
        }
        if op.is_equivalence() {
            return self.compile_equivalence_op(left, op, right, span);
        }
        if op.is_membership() {
            return self.compile_membership_op(left, op, right, span);
        }

        let left_set = self.compile_expr(left)?;
        let right_set = self.compile_expr(right)?;

        if let Some(folded) = self.try_fold_binop(left_set, op, right_set, span)? {
            return Ok(folded);
        }

        self.generated_set(
            Expr::BinOp {
                left: left_set,
                op,
                right: right_set,
            },
            None,
            None,
            Some(span.clone()),
        )
    }

    /// `<Expr> IS <Type>`: the left side steps through `__class__`; the
    /// right side is evaluated as a type reference expression.
    fn compile_type_check_op(
        &mut self,
        left: &QlExpr,
        op: BinOpKind,
        right: &QlExpr,
        span: &Span,
    ) -> CompileResult<SetId> {
        let left_set = self.compile_expr(left)?;
        let class_step = Ptr {
            module: Some(SmolStr::new("std")),
            name: SmolStr::new("__class__"),
            direction: PtrDirection::Outbound,
            kind: PtrKind::Link,
            target: None,
            span: span.clone(),
        };
        let left_class = self.path_step(left_set, &class_step)?;

        let right_set = self.in_new(|c| {
            c.ctx_mut().path_as_type = true;
            c.compile_expr(right)
        })?;
        let right_ref = self.process_type_ref_expr(right_set, span)?;

        self.generated_set(
            Expr::BinOp {
                left: left_class,
                op,
                right: right_ref,
            },
            None,
            None,
            Some(span.clone()),
        )
    }

    /// Converts a compiled type-position expression into type-reference
    /// form: a bare class set becomes a `TypeRefExpr`; a tuple of them
    /// becomes an array of type references.
    fn process_type_ref_expr(&mut self, set: SetId, span: &Span) -> CompileResult<SetId> {
        enum Form {
            TupleOf(Vec<SetId>),
            Plain(TypeRef),
            Invalid,
        }

        let form = {
            let node = self.ir.set(set);
            match &node.expr {
                Some(Expr::Tuple { elements, .. }) => {
                    Form::TupleOf(elements.iter().map(|el| el.val).collect())
                }
                None if node.rptr.is_none() => Form::Plain(node.ty),
                _ => Form::Invalid,
            }
        };

        match form {
            Form::TupleOf(element_sets) => {
                let mut refs = Vec::new();
                for el in element_sets {
                    refs.push(self.process_type_ref_expr(el, span)?);
                }
                let anytype = self.std_type("anytype")?;
                let arr_ty = self.mint_array_type(anytype);
                self.generated_set(
                    Expr::Array { elements: refs },
                    None,
                    Some(arr_ty),
                    Some(span.clone()),
                )
            }
            Form::Plain(ty) => self.generated_set(
                Expr::TypeRefExpr { ty },
                None,
                Some(ty),
                Some(span.clone()),
            ),
            Form::Invalid => Err(CompileError::expression(
                "expecting a type reference",
                Some(span.clone()),
            )),
        }
    }

    /// `a UNION b`: both sides compile as statements; the result carries a
    /// fresh path id for its common ancestor type.
    fn compile_set_op(
        &mut self,
        left: &QlExpr,
        right: &QlExpr,
        span: &Span,
    ) -> CompileResult<SetId> {
        let left_ql = astutils::ensure_qlstmt(left);
        let right_ql = astutils::ensure_qlstmt(right);

        let left_set = self.compile_statement(&left_ql)?;
        let right_set = self.compile_statement(&right_ql)?;
        let left_stmt = self.ensure_stmt(left_set);
        let right_stmt = self.ensure_stmt(right_set);

        let set_op = Expr::SetOp {
            left: left_stmt,
            right: right_stmt,
            exclusive: false,
        };

        let result_ty = {
            let ctx = InferCtx {
                schema: self.schema,
                derived: &self.derived,
                ir: &self.ir,
            };
            crate::ir::infer::infer_expr_type(ctx, &set_op, None)
                .map_err(|e| CompileError::type_error(e.message, Some(span.clone())))?
        };

        let result_path = self.new_path_id(result_ty);
        self.register_path_scope(&result_path);

        self.generated_set(set_op, None, Some(result_ty), Some(span.clone()))
    }

    /// `a ?= b` desugars to
    /// `a = b IF EXISTS a AND EXISTS b ELSE EXISTS a = EXISTS b`.
    fn compile_equivalence_op(
        &mut self,
        left: &QlExpr,
        op: BinOpKind,
        right: &QlExpr,
        span: &Span,
    ) -> CompileResult<SetId> {
        let plain_op = if op == BinOpKind::EquivEq {
            BinOpKind::Eq
        } else {
            BinOpKind::NotEq
        };

        let ex_left = QlExpr::Exists {
            expr: Box::new(left.clone()),
            span: left.span(),
        };
        let ex_right = QlExpr::Exists {
            expr: Box::new(right.clone()),
            span: right.span(),
        };

        let condition = QlExpr::BinOp {
            left: Box::new(ex_left.clone()),
            op: BinOpKind::And,
            right: Box::new(ex_right.clone()),
            span: span.clone(),
        };
        let if_expr = QlExpr::BinOp {
            left: Box::new(left.clone()),
            op: plain_op,
            right: Box::new(right.clone()),
            span: span.clone(),
        };
        let else_expr = QlExpr::BinOp {
            left: Box::new(ex_left),
            op: plain_op,
            right: Box::new(ex_right),
            span: span.clone(),
        };

        self.compile_ifelse(&condition, &if_expr, &else_expr, span)
    }

    /// `a IN b`: both operands compile behind a traced fence; the traced
    /// paths become the result's scope.
    fn compile_membership_op(
        &mut self,
        left: &QlExpr,
        op: BinOpKind,
        right: &QlExpr,
        span: &Span,
    ) -> CompileResult<SetId> {
        let (result, traced) = self.in_traced(|c| -> CompileResult<SetId> {
            let left_set = c.compile_expr(left)?;
            let right_set = c.compile_expr(right)?;
            c.generated_set(
                Expr::BinOp {
                    left: left_set,
                    op,
                    right: right_set,
                },
                None,
                None,
                Some(span.clone()),
            )
        });
        let result = result?;
        self.ir.set_mut(result).path_scope = traced;
        Ok(result)
    }

    fn compile_unary(
        &mut self,
        op: UnaryOpKind,
        operand: &QlExpr,
        span: &Span,
    ) -> CompileResult<SetId> {
        let operand_set = self.compile_expr(operand)?;

        // `DISTINCT x` is a whole-set unary over its operand; the result
        // keeps the operand's type. Exclusive unions (`SetOp.exclusive`)
        // stay an internal form produced by the IF/ELSE desugaring.
        if op == UnaryOpKind::Distinct {
            let ty = self.set_type(operand_set, span)?;
            return self.generated_set(
                Expr::UnaryOp {
                    op,
                    operand: operand_set,
                },
                None,
                Some(ty),
                Some(span.clone()),
            );
        }

        // `NOT EXISTS x` folds into the EXISTS node itself.
        let is_exists = matches!(
            self.ir.set(operand_set).expr,
            Some(Expr::ExistsPred { .. })
        );
        if op == UnaryOpKind::Not && is_exists {
            if let Some(Expr::ExistsPred { negated, .. }) =
                self.ir.set_mut(operand_set).expr.as_mut()
            {
                *negated = !*negated;
            }
            return Ok(operand_set);
        }

        // Sign on a numeric constant folds immediately.
        if matches!(op, UnaryOpKind::Plus | UnaryOpKind::Minus)
            && let Some(Expr::Constant { value, ty }) = self.ir.set(operand_set).expr.clone()
        {
            match (&op, &value) {
                (UnaryOpKind::Plus, _) => return Ok(operand_set),
                (UnaryOpKind::Minus, ConstValue::Int(v)) => {
                    return self.generated_set(
                        Expr::Constant {
                            value: ConstValue::Int(-v),
                            ty,
                        },
                        None,
                        Some(ty),
                        Some(span.clone()),
                    );
                }
                (UnaryOpKind::Minus, ConstValue::Float(v)) => {
                    return self.generated_set(
                        Expr::Constant {
                            value: ConstValue::Float(-v),
                            ty,
                        },
                        None,
                        Some(ty),
                        Some(span.clone()),
                    );
                }
                _ => {}
            }
        }

        self.generated_set(
            Expr::UnaryOp {
                op,
                operand: operand_set,
            },
            None,
            None,
            Some(span.clone()),
        )
    }

    /// `x IF c ELSE y` desugars to
    /// `(SELECT x FILTER c) UNION (SELECT y FILTER NOT c)` with the union
    /// marked exclusive; the result type is the nearest common ancestor of
    /// the branches.
    pub(crate) fn compile_ifelse(
        &mut self,
        condition: &QlExpr,
        if_expr: &QlExpr,
        else_expr: &QlExpr,
        span: &Span,
    ) -> CompileResult<SetId> {
        let mut if_stmt = astutils::ensure_qlstmt(if_expr);
        astutils::stmt_extend_where(&mut if_stmt, condition.clone());

        let not_condition = QlExpr::UnaryOp {
            op: UnaryOpKind::Not,
            operand: Box::new(condition.clone()),
            span: condition.span(),
        };
        let mut else_stmt = astutils::ensure_qlstmt(else_expr);
        astutils::stmt_extend_where(&mut else_stmt, not_condition);

        let if_set = self.compile_statement(&if_stmt)?;
        let else_set = self.compile_statement(&else_stmt)?;

        let (if_ty, else_ty) = {
            let ctx = InferCtx {
                schema: self.schema,
                derived: &self.derived,
                ir: &self.ir,
            };
            (
                infer_type(ctx, if_set)
                    .map_err(|e| CompileError::type_error(e.message, Some(span.clone())))?,
                infer_type(ctx, else_set)
                    .map_err(|e| CompileError::type_error(e.message, Some(span.clone())))?,
            )
        };

        let Some(result_ty) = nearest_common_ancestor(self.schema, &self.derived, if_ty, else_ty)
        else {
            return Err(CompileError::type_error(
                format!(
                    "if/else clauses must be of related types, got: {}/{}",
                    self.type_display(if_ty),
                    self.type_display(else_ty)
                ),
                Some(span.clone()),
            ));
        };

        let left_stmt = self.ensure_stmt(if_set);
        let right_stmt = self.ensure_stmt(else_set);
        self.generated_set(
            Expr::SetOp {
                left: left_stmt,
                right: right_stmt,
                exclusive: true,
            },
            None,
            Some(result_ty),
            Some(span.clone()),
        )
    }

    /// `EXISTS x`: the operand compiles behind a traced fence, like any
    /// aggregate argument; traced paths attach to the predicate's scope.
    fn compile_exists(&mut self, operand: &QlExpr, span: &Span) -> CompileResult<SetId> {
        let (operand_set, traced) = self.in_traced(|c| c.compile_expr(operand));
        let operand_set = operand_set?;

        let bool_ty = self.std_type("bool")?;
        let set = self.generated_set(
            Expr::ExistsPred {
                expr: operand_set,
                negated: false,
            },
            None,
            Some(bool_ty),
            Some(span.clone()),
        )?;
        self.ir.set_mut(set).path_scope = traced;
        Ok(set)
    }

    fn compile_coalesce(&mut self, args: &[QlExpr], span: &Span) -> CompileResult<SetId> {
        let all_empty = args
            .iter()
            .all(|a| matches!(a, QlExpr::Set { elements, .. } if elements.is_empty()));
        if all_empty {
            let anytype = self.std_type("anytype")?;
            return self.generated_set(
                Expr::EmptySet,
                None,
                Some(anytype),
                Some(span.clone()),
            );
        }

        let mut compiled = Vec::new();
        for arg in args {
            compiled.push(self.compile_expr(arg)?);
        }
        self.generated_set(
            Expr::Coalesce { args: compiled },
            None,
            None,
            Some(span.clone()),
        )
    }

    fn compile_typecast(
        &mut self,
        ty: &TypeName,
        operand: &QlExpr,
        span: &Span,
    ) -> CompileResult<SetId> {
        let target = self.resolve_type_name(ty)?;

        // `<array<T>>[]` and `<map<K,V>>[]` produce typed empty
        // collections directly.
        if matches!(operand, QlExpr::EmptyCollection { .. }) {
            let name = ty.maintype.name.as_str();
            if ty.maintype.module.is_none() && (name == "array" || name == "map") {
                return self.generated_set(
                    Expr::EmptyCollection { ty: target },
                    None,
                    Some(target),
                    Some(span.clone()),
                );
            }
            return Err(CompileError::expression(
                "only array and map casts apply to an empty collection",
                Some(span.clone()),
            ));
        }

        let operand_set = self.compile_expr(operand)?;
        self.cast_set(operand_set, ty, target, span)
    }

    /// Applies a cast; tuple-to-tuple casts expand element-wise into a new
    /// tuple, recursively casting elements whose types differ.
    fn cast_set(
        &mut self,
        operand: SetId,
        ql_ty: &TypeName,
        target: TypeRef,
        span: &Span,
    ) -> CompileResult<SetId> {
        let orig_ty = {
            let ctx = InferCtx {
                schema: self.schema,
                derived: &self.derived,
                ir: &self.ir,
            };
            infer_type(ctx, operand).ok()
        };

        let orig_elements = orig_ty.and_then(|t| {
            match &type_of(self.schema, &self.derived, t).kind {
                TypeKind::Tuple { elements, .. } => Some(elements.clone()),
                _ => None,
            }
        });

        if let Some(orig_elements) = orig_elements {
            let (new_elements, named) =
                match &type_of(self.schema, &self.derived, target).kind {
                    TypeKind::Tuple { elements, named } => (elements.clone(), *named),
                    _ => {
                        return Err(CompileError::type_error(
                            format!("cannot cast tuple to {}", self.type_display(target)),
                            Some(span.clone()),
                        ));
                    }
                };

            if orig_elements.len() != new_elements.len() {
                return Err(CompileError::type_error(
                    format!(
                        "cannot cast to {}: number of elements is not the same",
                        self.type_display(target)
                    ),
                    Some(span.clone()),
                ));
            }

            let mut elements = Vec::new();
            for (i, ((orig_name, orig_el_ty), (new_name, new_el_ty))) in
                orig_elements.iter().zip(new_elements.iter()).enumerate()
            {
                let path_id = self
                    .ir
                    .set(operand)
                    .path_id
                    .extend_tuple(orig_name.clone(), *orig_el_ty);
                let mut val = self.generated_set(
                    Expr::TupleIndirection {
                        expr: operand,
                        name: orig_name.clone(),
                    },
                    Some(path_id),
                    Some(*orig_el_ty),
                    Some(span.clone()),
                )?;

                if orig_el_ty != new_el_ty {
                    let sub_ql = ql_ty.subtypes.get(i).ok_or_else(|| {
                        CompileError::type_error(
                            "tuple cast requires explicit element types",
                            Some(span.clone()),
                        )
                    })?;
                    val = self.cast_set(val, sub_ql, *new_el_ty, span)?;
                }

                elements.push(TupleElement {
                    name: new_name.clone(),
                    val,
                });
            }

            return self.generated_set(
                Expr::Tuple { elements, named },
                None,
                Some(target),
                Some(span.clone()),
            );
        }

        self.generated_set(
            Expr::TypeCast {
                expr: operand,
                ty: target,
            },
            None,
            Some(target),
            Some(span.clone()),
        )
    }

    /// Standalone `expr[IS Type]` over a non-path expression.
    fn compile_typefilter(
        &mut self,
        operand: &QlExpr,
        ty: &ClassRef,
        span: &Span,
    ) -> CompileResult<SetId> {
        let operand_set = self.compile_expr(operand)?;

        let operand_ty = {
            let ctx = InferCtx {
                schema: self.schema,
                derived: &self.derived,
                ir: &self.ir,
            };
            infer_type(ctx, operand_set)
                .map_err(|e| CompileError::type_error(e.message, Some(span.clone())))?
        };
        if !self.is_object_type(operand_ty) {
            return Err(CompileError::expression(
                format!(
                    "invalid type filter operand: {} is not an object type",
                    self.type_display(operand_ty)
                ),
                Some(operand.span()),
            ));
        }

        let filter_ty = self.get_schema_type(ty)?;
        if !self.is_object_type(filter_ty) {
            return Err(CompileError::expression(
                format!(
                    "invalid type filter operand: {} is not an object type",
                    self.type_display(filter_ty)
                ),
                Some(ty.span.clone()),
            ));
        }

        self.generated_set(
            Expr::TypeFilter {
                expr: operand_set,
                ty: filter_ty,
            },
            None,
            Some(filter_ty),
            Some(span.clone()),
        )
    }

    fn compile_indirection(
        &mut self,
        arg: &QlExpr,
        elements: &[IndirectionEl],
        span: &Span,
    ) -> CompileResult<SetId> {
        let mut node = self.compile_expr(arg)?;
        let int64 = self.std_type("int64")?;

        for element in elements {
            node = match element {
                IndirectionEl::Index(index) => {
                    let index = self.compile_expr(index)?;
                    self.generated_set(
                        Expr::IndexIndirection { expr: node, index },
                        None,
                        None,
                        Some(span.clone()),
                    )?
                }
                IndirectionEl::Slice { start, stop } => {
                    let start = match start {
                        Some(e) => self.compile_expr(e)?,
                        None => self.empty_int_constant(int64, span)?,
                    };
                    let stop = match stop {
                        Some(e) => self.compile_expr(e)?,
                        None => self.empty_int_constant(int64, span)?,
                    };
                    self.generated_set(
                        Expr::SliceIndirection {
                            expr: node,
                            start,
                            stop,
                        },
                        None,
                        None,
                        Some(span.clone()),
                    )?
                }
            };
        }

        Ok(node)
    }

    /// The absent-bound constant used for open slice ends.
    fn empty_int_constant(&mut self, int64: TypeRef, span: &Span) -> CompileResult<SetId> {
        self.generated_set(
            Expr::Constant {
                value: ConstValue::Empty,
                ty: int64,
            },
            None,
            Some(int64),
            Some(span.clone()),
        )
    }

    fn compile_tuple(&mut self, elements: &[QlExpr], span: &Span) -> CompileResult<SetId> {
        let mut ir_elements = Vec::new();
        let mut el_types = Vec::new();

        for (i, el) in elements.iter().enumerate() {
            let val = self.compile_expr(el)?;
            let name = SmolStr::new(i.to_string());
            let ty = self.set_type(val, span)?;
            el_types.push((name.clone(), ty));
            ir_elements.push(TupleElement { name, val });
        }

        let tuple_ty = self.mint_tuple_type(el_types, false);
        self.generated_set(
            Expr::Tuple {
                elements: ir_elements,
                named: false,
            },
            None,
            Some(tuple_ty),
            Some(span.clone()),
        )
    }

    fn compile_named_tuple(
        &mut self,
        elements: &[crate::ast::expr::NamedTupleElement],
        span: &Span,
    ) -> CompileResult<SetId> {
        let mut ir_elements = Vec::new();
        let mut el_types = Vec::new();

        for el in elements {
            let val = self.compile_expr(&el.val)?;
            let ty = self.set_type(val, span)?;
            el_types.push((el.name.clone(), ty));
            ir_elements.push(TupleElement {
                name: el.name.clone(),
                val,
            });
        }

        let tuple_ty = self.mint_tuple_type(el_types, true);
        self.generated_set(
            Expr::Tuple {
                elements: ir_elements,
                named: true,
            },
            None,
            Some(tuple_ty),
            Some(span.clone()),
        )
    }

    fn compile_array(&mut self, elements: &[QlExpr], span: &Span) -> CompileResult<SetId> {
        let mut compiled = Vec::new();
        let mut element_ty: Option<TypeRef> = None;

        for el in elements {
            let set = self.compile_expr(el)?;
            let ty = self.set_type(set, span)?;
            element_ty = Some(match element_ty {
                None => ty,
                Some(prev) => nearest_common_ancestor(self.schema, &self.derived, prev, ty)
                    .ok_or_else(|| {
                        CompileError::type_error(
                            "array elements are of unrelated types",
                            Some(span.clone()),
                        )
                    })?,
            });
            compiled.push(set);
        }

        let element_ty = match element_ty {
            Some(ty) => ty,
            None => self.std_type("anytype")?,
        };
        let array_ty = self.mint_array_type(element_ty);
        self.generated_set(
            Expr::Array { elements: compiled },
            None,
            Some(array_ty),
            Some(span.clone()),
        )
    }

    fn compile_mapping(
        &mut self,
        keys: &[QlExpr],
        values: &[QlExpr],
        span: &Span,
    ) -> CompileResult<SetId> {
        let mut ir_keys = Vec::new();
        let mut ir_values = Vec::new();
        let mut value_ty: Option<TypeRef> = None;

        for (k, v) in keys.iter().zip(values) {
            ir_keys.push(self.compile_expr(k)?);
            let val = self.compile_expr(v)?;
            let ty = self.set_type(val, span)?;
            value_ty = Some(match value_ty {
                None => ty,
                Some(prev) => nearest_common_ancestor(self.schema, &self.derived, prev, ty)
                    .ok_or_else(|| {
                        CompileError::type_error(
                            "mapping values are of unrelated types",
                            Some(span.clone()),
                        )
                    })?,
            });
            ir_values.push(val);
        }

        let value_ty = match value_ty {
            Some(ty) => ty,
            None => self.std_type("anytype")?,
        };
        let mapping_ty = self.mint_array_type(value_ty);
        self.generated_set(
            Expr::Mapping {
                keys: ir_keys,
                values: ir_values,
            },
            None,
            Some(mapping_ty),
            Some(span.clone()),
        )
    }

    /// `{a, b, c}` desugars into `(a UNION b) UNION c`; a single element
    /// compiles bare; empty braces are the empty set.
    fn compile_set_literal(&mut self, elements: &[QlExpr], span: &Span) -> CompileResult<SetId> {
        match elements {
            [] => {
                let anytype = self.std_type("anytype")?;
                self.generated_set(Expr::EmptySet, None, Some(anytype), Some(span.clone()))
            }
            [single] => self.compile_expr(single),
            _ => {
                let mut union = QlExpr::BinOp {
                    left: Box::new(elements[0].clone()),
                    op: BinOpKind::Union,
                    right: Box::new(elements[1].clone()),
                    span: merge_spans(&elements[0].span(), &elements[1].span()),
                };
                for el in &elements[2..] {
                    let span = merge_spans(&union.span(), &el.span());
                    union = QlExpr::BinOp {
                        left: Box::new(union),
                        op: BinOpKind::Union,
                        right: Box::new(el.clone()),
                        span,
                    };
                }
                self.compile_expr(&union)
            }
        }
    }

    pub(crate) fn set_type(&self, set: SetId, span: &Span) -> CompileResult<TypeRef> {
        let ctx = InferCtx {
            schema: self.schema,
            derived: &self.derived,
            ir: &self.ir,
        };
        infer_type(ctx, set).map_err(|e| CompileError::type_error(e.message, Some(span.clone())))
    }

    /// Constant folding over binary operations.
    ///
    /// Folds `const op const` arithmetic outright, and re-associates
    /// `C + (C' + X)` into `(C + C') + X` (likewise for `*`) so constant
    /// pairs separated by a variable still fold.
    fn try_fold_binop(
        &mut self,
        left: SetId,
        op: BinOpKind,
        right: SetId,
        span: &Span,
    ) -> CompileResult<Option<SetId>> {
        let left_const = self.constant_of(left);
        let right_const = self.constant_of(right);

        if let (Some(lv), Some(rv)) = (&left_const, &right_const)
            && let Some((value, ty)) = self.fold_arithmetic(op, lv, rv)?
        {
            let set =
                self.generated_set(Expr::Constant { value, ty }, None, Some(ty), Some(span.clone()))?;
            return Ok(Some(set));
        }

        if matches!(op, BinOpKind::Add | BinOpKind::Mul) {
            // Normalize so the lone constant is on the left.
            let (my_const, other) = if left_const.is_some() {
                (left_const, right)
            } else if right_const.is_some() {
                (right_const, left)
            } else {
                return Ok(None);
            };

            if let Some(Expr::BinOp {
                left: inner_left,
                op: inner_op,
                right: inner_right,
            }) = self.ir.set(other).expr.clone()
                && inner_op == op
            {
                let (inner_const, inner_other) = if self.constant_of(inner_left).is_some() {
                    (self.constant_of(inner_left), inner_right)
                } else if self.constant_of(inner_right).is_some() {
                    (self.constant_of(inner_right), inner_left)
                } else {
                    return Ok(None);
                };

                if let (Some(a), Some(b)) = (my_const, inner_const)
                    && let Some((value, ty)) = self.fold_arithmetic(op, &a, &b)?
                {
                    let folded = self.generated_set(
                        Expr::Constant { value, ty },
                        None,
                        Some(ty),
                        Some(span.clone()),
                    )?;
                    let set = self.generated_set(
                        Expr::BinOp {
                            left: folded,
                            op,
                            right: inner_other,
                        },
                        None,
                        None,
                        Some(span.clone()),
                    )?;
                    return Ok(Some(set));
                }
            }
        }

        Ok(None)
    }

    fn constant_of(&self, set: SetId) -> Option<ConstValue> {
        match &self.ir.set(set).expr {
            Some(Expr::Constant { value, .. }) => Some(value.clone()),
            _ => None,
        }
    }

    fn fold_arithmetic(
        &self,
        op: BinOpKind,
        left: &ConstValue,
        right: &ConstValue,
    ) -> CompileResult<Option<(ConstValue, TypeRef)>> {
        use BinOpKind::*;
        use ConstValue::{Float, Int};

        let int64 = self.std_type("int64")?;
        let float64 = self.std_type("float64")?;

        let result = match (left, right) {
            (Int(a), Int(b)) => {
                let value = match op {
                    Add => a.checked_add(*b).map(Int),
                    Sub => a.checked_sub(*b).map(Int),
                    Mul => a.checked_mul(*b).map(Int),
                    Div => {
                        if *b == 0 {
                            None
                        } else {
                            a.checked_div(*b).map(Int)
                        }
                    }
                    Mod => {
                        if *b == 0 {
                            None
                        } else {
                            a.checked_rem(*b).map(Int)
                        }
                    }
                    Pow => u32::try_from(*b).ok().and_then(|e| a.checked_pow(e)).map(Int),
                    _ => None,
                };
                value.map(|v| (v, int64))
            }
            (Int(_), Float(_)) | (Float(_), Int(_)) | (Float(_), Float(_)) => {
                let a = match left {
                    Int(v) => *v as f64,
                    Float(v) => *v,
                    _ => return Ok(None),
                };
                let b = match right {
                    Int(v) => *v as f64,
                    Float(v) => *v,
                    _ => return Ok(None),
                };
                let value = match op {
                    Add => Some(a + b),
                    Sub => Some(a - b),
                    Mul => Some(a * b),
                    Div => Some(a / b),
                    Mod => Some(a % b),
                    Pow => Some(a.powf(b)),
                    _ => None,
                };
                value.map(|v| (Float(v), float64))
            }
            _ => None,
        };

        Ok(result)
    }
}
