//! Type and cardinality inference over compiled IR.
//!
//! Both passes are read-only and idempotent: repeated invocation over the
//! same subtree yields the same answer. Collection constructors and empty
//! sets get their types assigned at construction time; inference returns
//! the carrier set's recorded type for those.

use crate::ast::expr::{BinOpKind, PtrDirection, UnaryOpKind};
use crate::ir::path_id::PathId;
use crate::ir::{Expr, IrData, SetId, StmtKind};
use crate::schema::{
    DerivedSchema, PointerKind, QualName, Schema, TypeKind, TypeRef, nearest_common_ancestor,
    ptr_of, type_of,
};
use std::collections::HashSet;
use thiserror::Error;

/// Inference failure; the compiler attaches span context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InferError {
    pub message: String,
}

impl InferError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Read-only environment for inference passes.
#[derive(Clone, Copy)]
pub struct InferCtx<'a> {
    pub schema: &'a Schema,
    pub derived: &'a DerivedSchema,
    pub ir: &'a IrData,
}

/// Multiplicity of an expression per evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

fn std_type(ctx: InferCtx<'_>, name: &str) -> Result<TypeRef, InferError> {
    ctx.schema
        .get(&QualName::new("std", name))
        .map(TypeRef::Schema)
        .map_err(|_| InferError::new(format!("standard type std::{name} is missing")))
}

/// Infers the type of a set.
pub fn infer_type(ctx: InferCtx<'_>, set: SetId) -> Result<TypeRef, InferError> {
    let node = ctx.ir.set(set);
    match &node.expr {
        None => Ok(node.ty),
        Some(expr) => infer_expr_type(ctx, expr, Some(node.ty)),
    }
}

/// Infers the type of an expression; `carrier` is the recorded type of the
/// owning set, used for constructor forms typed at build time.
pub fn infer_expr_type(
    ctx: InferCtx<'_>,
    expr: &Expr,
    carrier: Option<TypeRef>,
) -> Result<TypeRef, InferError> {
    match expr {
        Expr::Constant { ty, .. } | Expr::Parameter { ty, .. } => Ok(*ty),

        Expr::BinOp { left, op, right } => infer_binop_type(ctx, *left, *op, *right),

        Expr::UnaryOp { op, operand } => match op {
            UnaryOpKind::Not => std_type(ctx, "bool"),
            UnaryOpKind::Plus | UnaryOpKind::Minus | UnaryOpKind::Distinct => {
                infer_type(ctx, *operand)
            }
        },

        Expr::SetOp { left, right, .. } => {
            let lt = infer_stmt_type(ctx, *left)?;
            let rt = infer_stmt_type(ctx, *right)?;
            nearest_common_ancestor(ctx.schema, ctx.derived, lt, rt).ok_or_else(|| {
                InferError::new(format!(
                    "set operands are of unrelated types: {} vs {}",
                    type_of(ctx.schema, ctx.derived, lt).name,
                    type_of(ctx.schema, ctx.derived, rt).name
                ))
            })
        }

        Expr::ExistsPred { .. } => std_type(ctx, "bool"),

        Expr::Coalesce { args } => {
            let mut result: Option<TypeRef> = None;
            for arg in args {
                let at = infer_type(ctx, *arg)?;
                result = Some(match result {
                    None => at,
                    Some(prev) => nearest_common_ancestor(ctx.schema, ctx.derived, prev, at)
                        .ok_or_else(|| {
                            InferError::new("coalescing operands are of unrelated types")
                        })?,
                });
            }
            result.ok_or_else(|| InferError::new("cannot infer the type of an empty coalesce"))
        }

        Expr::TypeCast { ty, .. }
        | Expr::TypeFilter { ty, .. }
        | Expr::TypeRefExpr { ty }
        | Expr::EmptyCollection { ty } => Ok(*ty),

        Expr::Tuple { .. } | Expr::Array { .. } | Expr::Mapping { .. } | Expr::EmptySet => carrier
            .ok_or_else(|| InferError::new("constructor expression has no carrier type")),

        Expr::FunctionCall { func, .. } => Ok(ctx.schema.function(*func).return_type),

        Expr::IndexIndirection { expr, .. } => {
            let base = infer_type(ctx, *expr)?;
            match &type_of(ctx.schema, ctx.derived, base).kind {
                TypeKind::Array { element } => Ok(*element),
                _ => Ok(base),
            }
        }

        Expr::SliceIndirection { expr, .. } => infer_type(ctx, *expr),

        Expr::TupleIndirection { expr, name } => {
            let base = infer_type(ctx, *expr)?;
            match &type_of(ctx.schema, ctx.derived, base).kind {
                TypeKind::Tuple { elements, .. } => elements
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, t)| *t)
                    .ok_or_else(|| {
                        InferError::new(format!("'{name}' is not a member of the tuple"))
                    }),
                _ => Err(InferError::new(
                    "tuple indirection over a non-tuple expression",
                )),
            }
        }

        Expr::Stmt(id) => infer_stmt_type(ctx, *id),
    }
}

fn infer_stmt_type(ctx: InferCtx<'_>, stmt: crate::ir::StmtId) -> Result<TypeRef, InferError> {
    match ctx.ir.stmt_result(stmt) {
        Some(result) => infer_type(ctx, result),
        None => Err(InferError::new("statement has no result")),
    }
}

fn infer_binop_type(
    ctx: InferCtx<'_>,
    left: SetId,
    op: BinOpKind,
    right: SetId,
) -> Result<TypeRef, InferError> {
    use BinOpKind::*;
    match op {
        Eq | NotEq | Lt | Gt | LtEq | GtEq | And | Or | Like | NotLike | Ilike | NotIlike | In
        | NotIn | Is | IsNot | EquivEq | EquivNotEq => std_type(ctx, "bool"),

        Add | Sub | Mul | Div | Mod | Pow => {
            let lt = infer_type(ctx, left)?;
            let rt = infer_type(ctx, right)?;
            let float64 = std_type(ctx, "float64")?;
            if lt == float64 || rt == float64 {
                Ok(float64)
            } else {
                Ok(lt)
            }
        }

        Union => {
            let lt = infer_type(ctx, left)?;
            let rt = infer_type(ctx, right)?;
            nearest_common_ancestor(ctx.schema, ctx.derived, lt, rt)
                .ok_or_else(|| InferError::new("union operands are of unrelated types"))
        }
    }
}

/// Infers the cardinality of a set. `singletons` holds the path ids known
/// to be single-valued in the enclosing scope.
pub fn infer_cardinality(
    ctx: InferCtx<'_>,
    set: SetId,
    singletons: &HashSet<PathId>,
) -> Cardinality {
    let node = ctx.ir.set(set);

    if singletons.contains(&node.path_id)
        || singletons.contains(&node.path_id.strip_weak_namespaces())
    {
        return Cardinality::One;
    }

    match &node.expr {
        Some(expr) => infer_expr_cardinality(ctx, expr, singletons),
        None => match &node.rptr {
            Some(rptr) => {
                let ptr = ptr_of(ctx.schema, ctx.derived, rptr.ptr);
                let step_single = match rptr.direction {
                    PtrDirection::Outbound => {
                        ptr.cardinality.single_target() || ptr.kind == PointerKind::Property
                    }
                    PtrDirection::Inbound => false,
                };
                if step_single
                    && infer_cardinality(ctx, rptr.source, singletons) == Cardinality::One
                {
                    Cardinality::One
                } else {
                    Cardinality::Many
                }
            }
            // A bare class reference is the whole extent of the type.
            None => Cardinality::Many,
        },
    }
}

fn infer_expr_cardinality(
    ctx: InferCtx<'_>,
    expr: &Expr,
    singletons: &HashSet<PathId>,
) -> Cardinality {
    let all_one = |ids: &[SetId]| {
        ids.iter()
            .all(|id| infer_cardinality(ctx, *id, singletons) == Cardinality::One)
    };

    match expr {
        Expr::Constant { .. }
        | Expr::Parameter { .. }
        | Expr::EmptySet
        | Expr::EmptyCollection { .. }
        | Expr::TypeRefExpr { .. }
        | Expr::ExistsPred { .. } => Cardinality::One,

        Expr::BinOp { left, right, .. } => {
            if all_one(&[*left, *right]) {
                Cardinality::One
            } else {
                Cardinality::Many
            }
        }

        Expr::UnaryOp { operand, .. }
        | Expr::TypeCast { expr: operand, .. }
        | Expr::TypeFilter { expr: operand, .. } => infer_cardinality(ctx, *operand, singletons),

        Expr::Coalesce { args } => {
            if all_one(args) {
                Cardinality::One
            } else {
                Cardinality::Many
            }
        }

        Expr::Tuple { elements, .. } => {
            if elements
                .iter()
                .all(|el| infer_cardinality(ctx, el.val, singletons) == Cardinality::One)
            {
                Cardinality::One
            } else {
                Cardinality::Many
            }
        }

        Expr::Array { elements } => {
            if all_one(elements) {
                Cardinality::One
            } else {
                Cardinality::Many
            }
        }

        Expr::Mapping { keys, values } => {
            if all_one(keys) && all_one(values) {
                Cardinality::One
            } else {
                Cardinality::Many
            }
        }

        Expr::FunctionCall { func, args, .. } => {
            if ctx.schema.function(*func).aggregate {
                Cardinality::One
            } else if all_one(args) {
                Cardinality::One
            } else {
                Cardinality::Many
            }
        }

        Expr::IndexIndirection { expr, .. }
        | Expr::SliceIndirection { expr, .. }
        | Expr::TupleIndirection { expr, .. } => infer_cardinality(ctx, *expr, singletons),

        Expr::SetOp { .. } => Cardinality::Many,

        Expr::Stmt(id) => match &ctx.ir.stmt(*id).kind {
            StmtKind::Select(s) => {
                // LIMIT 1 pins a statement to singleton cardinality.
                if let Some(limit) = s.limit
                    && let Some(Expr::Constant {
                        value: crate::ir::ConstValue::Int(1),
                        ..
                    }) = &ctx.ir.set(limit).expr
                {
                    return Cardinality::One;
                }
                match s.result {
                    Some(result) => infer_cardinality(ctx, result, singletons),
                    None => Cardinality::Many,
                }
            }
            StmtKind::Insert(_) => Cardinality::One,
            _ => Cardinality::Many,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstValue, SetNode};
    use crate::schema::SchemaBuilder;

    fn setup() -> (Schema, DerivedSchema, IrData) {
        (
            SchemaBuilder::with_std().build(),
            DerivedSchema::default(),
            IrData::default(),
        )
    }

    fn const_int(schema: &Schema, ir: &mut IrData, v: i64) -> SetId {
        let int64 = TypeRef::Schema(schema.get(&QualName::new("std", "int64")).unwrap());
        let mut node = SetNode::new(PathId::from_type(int64), int64);
        node.expr = Some(Expr::Constant {
            value: ConstValue::Int(v),
            ty: int64,
        });
        ir.alloc_set(node)
    }

    #[test]
    fn constants_infer_their_type_and_cardinality() {
        let (schema, derived, mut ir) = setup();
        let c = const_int(&schema, &mut ir, 42);
        let ctx = InferCtx {
            schema: &schema,
            derived: &derived,
            ir: &ir,
        };
        let int64 = TypeRef::Schema(schema.get(&QualName::new("std", "int64")).unwrap());
        assert_eq!(infer_type(ctx, c).unwrap(), int64);
        assert_eq!(
            infer_cardinality(ctx, c, &HashSet::new()),
            Cardinality::One
        );
    }

    #[test]
    fn arithmetic_promotes_to_float() {
        let (schema, derived, mut ir) = setup();
        let int64 = TypeRef::Schema(schema.get(&QualName::new("std", "int64")).unwrap());
        let float64 = TypeRef::Schema(schema.get(&QualName::new("std", "float64")).unwrap());

        let left = const_int(&schema, &mut ir, 1);
        let mut fnode = SetNode::new(PathId::from_type(float64), float64);
        fnode.expr = Some(Expr::Constant {
            value: ConstValue::Float(0.5),
            ty: float64,
        });
        let right = ir.alloc_set(fnode);

        let mut sum = SetNode::new(PathId::from_type(int64), int64);
        sum.expr = Some(Expr::BinOp {
            left,
            op: BinOpKind::Add,
            right,
        });
        let sum = ir.alloc_set(sum);

        let ctx = InferCtx {
            schema: &schema,
            derived: &derived,
            ir: &ir,
        };
        assert_eq!(infer_type(ctx, sum).unwrap(), float64);
        // Idempotent.
        assert_eq!(infer_type(ctx, sum).unwrap(), float64);
    }

    #[test]
    fn comparison_yields_bool() {
        let (schema, derived, mut ir) = setup();
        let left = const_int(&schema, &mut ir, 1);
        let right = const_int(&schema, &mut ir, 2);
        let int64 = TypeRef::Schema(schema.get(&QualName::new("std", "int64")).unwrap());
        let mut cmp = SetNode::new(PathId::from_type(int64), int64);
        cmp.expr = Some(Expr::BinOp {
            left,
            op: BinOpKind::Lt,
            right,
        });
        let cmp = ir.alloc_set(cmp);

        let ctx = InferCtx {
            schema: &schema,
            derived: &derived,
            ir: &ir,
        };
        let bool_ty = TypeRef::Schema(schema.get(&QualName::new("std", "bool")).unwrap());
        assert_eq!(infer_type(ctx, cmp).unwrap(), bool_ty);
    }

    #[test]
    fn class_sets_are_many_until_declared_singleton() {
        let (schema, derived, mut ir) = setup();
        let object = TypeRef::Schema(schema.get(&QualName::new("std", "Object")).unwrap());
        let pid = PathId::from_type(object);
        let set = ir.alloc_set(SetNode::new(pid.clone(), object));

        let ctx = InferCtx {
            schema: &schema,
            derived: &derived,
            ir: &ir,
        };
        assert_eq!(
            infer_cardinality(ctx, set, &HashSet::new()),
            Cardinality::Many
        );
        let mut singletons = HashSet::new();
        singletons.insert(pid);
        assert_eq!(infer_cardinality(ctx, set, &singletons), Cardinality::One);
    }
}
