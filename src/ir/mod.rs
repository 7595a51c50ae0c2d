//! Intermediate representation.
//!
//! The IR is a typed, scope-annotated, interned graph of sets, statements,
//! and expressions. Nodes live in arenas inside [`IrData`]; `Set` and
//! `Stmt` references are indices, so back-edges (`rptr`, parent statement)
//! never form ownership cycles.

pub mod infer;
pub mod path_id;
pub mod scope;

pub use path_id::{Namespace, PathId, PathStep};
pub use scope::{ScopeId, ScopeNode, ScopeTree};

use crate::ast::Span;
use crate::ast::expr::{BinOpKind, NonesOrder, PtrDirection, SortDirection, UnaryOpKind};
use crate::schema::{DerivedSchema, FuncId, PtrRef, QualName, TypeRef};
use indexmap::IndexMap;
use smol_str::SmolStr;

/// Index of a set node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetId(pub u32);

/// Index of a statement node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(pub u32);

/// A pointer traversal embedded in its target set.
///
/// The target is the owning set itself; `source` is the set the traversal
/// started from.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerRef {
    pub source: SetId,
    pub ptr: PtrRef,
    pub direction: PtrDirection,
}

/// The central value carrier: a set of values identified by a canonical
/// path id.
///
/// `expr == None` marks a root reference to a schema entity; a present
/// `expr` makes this a derived/computed set sharing the path id.
#[derive(Debug, Clone, PartialEq)]
pub struct SetNode {
    pub path_id: PathId,
    pub ty: TypeRef,
    pub expr: Option<Expr>,
    pub rptr: Option<PointerRef>,
    /// Shape elements projected from this set.
    pub shape: Vec<SetId>,
    /// Paths this set re-binds (attached for EXISTS, membership tests, and
    /// statement results).
    pub path_scope: Vec<PathId>,
    /// Anchor name when this set was pre-bound by the embedder.
    pub anchor: Option<SmolStr>,
    pub span: Option<Span>,
}

impl SetNode {
    pub fn new(path_id: PathId, ty: TypeRef) -> Self {
        Self {
            path_id,
            ty,
            expr: None,
            rptr: None,
            shape: Vec::new(),
            path_scope: Vec::new(),
            anchor: None,
            span: None,
        }
    }
}

/// Constant values carried by the IR.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    /// The absent value used for open slice bounds.
    Empty,
}

/// One element of an IR tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleElement {
    pub name: SmolStr,
    pub val: SetId,
}

/// One ORDER BY item in IR form. Direction is always explicit (`Asc` is
/// the normalized default).
#[derive(Debug, Clone, PartialEq)]
pub struct SortExprIr {
    pub expr: SetId,
    pub direction: SortDirection,
    pub nones_order: Option<NonesOrder>,
}

/// IR expressions. Operand sets are arena indices.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant {
        value: ConstValue,
        ty: TypeRef,
    },
    Parameter {
        name: SmolStr,
        ty: TypeRef,
    },
    BinOp {
        left: SetId,
        op: BinOpKind,
        right: SetId,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: SetId,
    },
    /// A set operation over two statement operands. `exclusive` marks
    /// unions whose branches cannot overlap (IF/ELSE desugaring).
    SetOp {
        left: StmtId,
        right: StmtId,
        exclusive: bool,
    },
    ExistsPred {
        expr: SetId,
        negated: bool,
    },
    Coalesce {
        args: Vec<SetId>,
    },
    TypeCast {
        expr: SetId,
        ty: TypeRef,
    },
    TypeFilter {
        expr: SetId,
        ty: TypeRef,
    },
    /// A bare type reference (the right side of `IS`).
    TypeRefExpr {
        ty: TypeRef,
    },
    Tuple {
        elements: Vec<TupleElement>,
        named: bool,
    },
    Array {
        elements: Vec<SetId>,
    },
    Mapping {
        keys: Vec<SetId>,
        values: Vec<SetId>,
    },
    /// The empty set literal `{}` (type unresolved by construction).
    EmptySet,
    /// A typed empty array/mapping produced by casting `[]`.
    EmptyCollection {
        ty: TypeRef,
    },
    FunctionCall {
        func: FuncId,
        args: Vec<SetId>,
        kwargs: Vec<(SmolStr, SetId)>,
        initial_value: Option<SetId>,
    },
    IndexIndirection {
        expr: SetId,
        index: SetId,
    },
    SliceIndirection {
        expr: SetId,
        start: SetId,
        stop: SetId,
    },
    TupleIndirection {
        expr: SetId,
        name: SmolStr,
    },
    /// An embedded statement; the set wrapping this expression is the
    /// statement's value.
    Stmt(StmtId),
}

/// SELECT and FOR bodies (FOR carries an iterator).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStmt {
    pub result: Option<SetId>,
    pub where_: Option<SetId>,
    pub orderby: Vec<SortExprIr>,
    pub offset: Option<SetId>,
    pub limit: Option<SetId>,
    pub iterator: Option<SetId>,
    /// Recursion depth bound for `link*N` shape elements; present only on
    /// the wrapper statements shape compilation creates.
    pub recurse_depth: Option<SetId>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsertStmt {
    pub subject: Option<SetId>,
    pub result: Option<SetId>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateStmt {
    pub subject: Option<SetId>,
    pub where_: Option<SetId>,
    pub result: Option<SetId>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteStmt {
    pub subject: Option<SetId>,
    pub where_: Option<SetId>,
    pub result: Option<SetId>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupStmt {
    pub subject: Option<SetId>,
    pub groupby: Vec<SetId>,
    pub result: Option<SetId>,
    /// Path id of the synthetic grouping type.
    pub group_path_id: Option<PathId>,
}

/// Statement payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    Group(GroupStmt),
}

/// Declared statement cardinality from `WITH CARDINALITY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredCardinality {
    One,
    Many,
}

/// A statement node with its parent link.
#[derive(Debug, Clone, PartialEq)]
pub struct StmtNode {
    pub kind: StmtKind,
    pub parent: Option<StmtId>,
    pub cardinality: Option<DeclaredCardinality>,
}

/// The IR arenas of one compilation.
#[derive(Debug, Clone, Default)]
pub struct IrData {
    pub sets: Vec<SetNode>,
    pub stmts: Vec<StmtNode>,
}

impl IrData {
    pub fn alloc_set(&mut self, node: SetNode) -> SetId {
        let id = SetId(self.sets.len() as u32);
        self.sets.push(node);
        id
    }

    pub fn alloc_stmt(&mut self, node: StmtNode) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(node);
        id
    }

    pub fn set(&self, id: SetId) -> &SetNode {
        &self.sets[id.0 as usize]
    }

    pub fn set_mut(&mut self, id: SetId) -> &mut SetNode {
        &mut self.sets[id.0 as usize]
    }

    pub fn stmt(&self, id: StmtId) -> &StmtNode {
        &self.stmts[id.0 as usize]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut StmtNode {
        &mut self.stmts[id.0 as usize]
    }

    /// The result set of a statement.
    pub fn stmt_result(&self, id: StmtId) -> Option<SetId> {
        match &self.stmt(id).kind {
            StmtKind::Select(s) => s.result,
            StmtKind::Insert(s) => s.result,
            StmtKind::Update(s) => s.result,
            StmtKind::Delete(s) => s.result,
            StmtKind::Group(s) => s.result,
        }
    }
}

/// The finished product of a compilation: the root set (whose expression
/// is the top-level statement), the arenas, the scope tree, and everything
/// minted along the way.
#[derive(Debug, Clone)]
pub struct IrStatement {
    pub root: SetId,
    pub ir: IrData,
    pub scope_tree: ScopeTree,
    /// Parameter types, in first-use order.
    pub params: IndexMap<SmolStr, TypeRef>,
    /// View types declared by WITH bindings, by schema name.
    pub views: IndexMap<QualName, TypeRef>,
    /// Types and pointers minted during compilation; needed to resolve
    /// `TypeRef::Derived` references in the IR.
    pub derived: DerivedSchema,
}

impl IrStatement {
    /// The root statement node, when the compilation produced a statement
    /// (fragments may produce a bare set).
    pub fn root_stmt(&self) -> Option<StmtId> {
        match &self.ir.set(self.root).expr {
            Some(Expr::Stmt(id)) => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{TypeId, TypeRef};

    fn dummy_ty() -> TypeRef {
        TypeRef::Schema(TypeId(0))
    }

    #[test]
    fn arena_allocation_and_backlinks() {
        let mut ir = IrData::default();
        let source = ir.alloc_set(SetNode::new(PathId::from_type(dummy_ty()), dummy_ty()));
        let target_path =
            PathId::from_type(dummy_ty()).extend_tuple("0".into(), dummy_ty());
        let target = ir.alloc_set(SetNode::new(target_path, dummy_ty()));

        ir.set_mut(target).rptr = Some(PointerRef {
            source,
            ptr: crate::schema::PtrRef::Schema(crate::schema::PtrId(0)),
            direction: PtrDirection::Outbound,
        });

        assert_eq!(ir.set(target).rptr.as_ref().unwrap().source, source);
    }

    #[test]
    fn stmt_result_extraction() {
        let mut ir = IrData::default();
        let result = ir.alloc_set(SetNode::new(PathId::from_type(dummy_ty()), dummy_ty()));
        let stmt = ir.alloc_stmt(StmtNode {
            kind: StmtKind::Select(SelectStmt {
                result: Some(result),
                ..SelectStmt::default()
            }),
            parent: None,
            cardinality: None,
        });
        assert_eq!(ir.stmt_result(stmt), Some(result));
    }
}
