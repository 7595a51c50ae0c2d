//! Expression AST nodes.
//!
//! The expression system covers literals, paths with pointer steps, shapes,
//! operators, collections, casts, and function calls. Literal values keep
//! their parsed form; numeric text is converted during lexing.

use crate::ast::Span;
use crate::ast::stmt::Statement;
use smol_str::SmolStr;

/// Any EdgeQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A path: anchor or class reference followed by pointer steps.
    Path(Path),

    /// A literal constant.
    Constant(Constant, Span),

    /// A query parameter reference (`$name`).
    Parameter(SmolStr, Span),

    /// Binary operation, including comparisons and logical connectives.
    BinOp {
        left: Box<Expr>,
        op: BinOpKind,
        right: Box<Expr>,
        span: Span,
    },

    /// Unary `+`, `-`, or `NOT`.
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<Expr>,
        span: Span,
    },

    /// `if_expr IF condition ELSE else_expr` (right-associative).
    IfElse {
        if_expr: Box<Expr>,
        condition: Box<Expr>,
        else_expr: Box<Expr>,
        span: Span,
    },

    /// `EXISTS expr`.
    Exists { expr: Box<Expr>, span: Span },

    /// `a ?? b ?? …` coalescing chain, flattened left to right.
    Coalesce { args: Vec<Expr>, span: Span },

    /// `<Type> expr` cast.
    TypeCast {
        ty: TypeName,
        expr: Box<Expr>,
        span: Span,
    },

    /// `expr[IS Type]` type filter.
    TypeFilter {
        expr: Box<Expr>,
        ty: ClassRef,
        span: Span,
    },

    /// Index and slice chains: `expr[i]`, `expr[a:b]`.
    Indirection {
        arg: Box<Expr>,
        elements: Vec<IndirectionEl>,
        span: Span,
    },

    /// Positional tuple `(a, b)` (also `(a,)`).
    Tuple { elements: Vec<Expr>, span: Span },

    /// Named tuple `(x := a, y := b)`.
    NamedTuple {
        elements: Vec<NamedTupleElement>,
        span: Span,
    },

    /// Array literal `[a, b, c]`.
    Array { elements: Vec<Expr>, span: Span },

    /// Mapping literal `[k -> v, …]`.
    Mapping {
        keys: Vec<Expr>,
        values: Vec<Expr>,
        span: Span,
    },

    /// Set literal `{a, b, c}`; empty braces denote the empty set.
    Set { elements: Vec<Expr>, span: Span },

    /// `[]` — an empty collection of yet-unknown type; only valid under a
    /// cast.
    EmptyCollection { span: Span },

    /// A function or aggregate call.
    FunctionCall(FunctionCall),

    /// `expr { shape … }` projection.
    Shape(Shape),

    /// A parenthesized statement used in expression position.
    Statement(Box<Statement>, Span),
}

impl Expr {
    /// Returns the source span of this expression.
    pub fn span(&self) -> Span {
        match self {
            Expr::Path(p) => p.span.clone(),
            Expr::Constant(_, span)
            | Expr::Parameter(_, span)
            | Expr::BinOp { span, .. }
            | Expr::UnaryOp { span, .. }
            | Expr::IfElse { span, .. }
            | Expr::Exists { span, .. }
            | Expr::Coalesce { span, .. }
            | Expr::TypeCast { span, .. }
            | Expr::TypeFilter { span, .. }
            | Expr::Indirection { span, .. }
            | Expr::Tuple { span, .. }
            | Expr::NamedTuple { span, .. }
            | Expr::Array { span, .. }
            | Expr::Mapping { span, .. }
            | Expr::Set { span, .. }
            | Expr::EmptyCollection { span }
            | Expr::Statement(_, span) => span.clone(),
            Expr::FunctionCall(fc) => fc.span.clone(),
            Expr::Shape(shape) => shape.span.clone(),
        }
    }
}

/// Literal constant values.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
    Like,
    NotLike,
    Ilike,
    NotIlike,
    In,
    NotIn,
    Is,
    IsNot,
    Union,
    /// `?=` — equal, treating the empty set as a comparable value.
    EquivEq,
    /// `?!=`
    EquivNotEq,
}

impl BinOpKind {
    /// True for `UNION` (the only surface set operator).
    pub fn is_set_op(self) -> bool {
        matches!(self, BinOpKind::Union)
    }

    /// True for `IS` / `IS NOT`.
    pub fn is_type_check(self) -> bool {
        matches!(self, BinOpKind::Is | BinOpKind::IsNot)
    }

    /// True for `?=` / `?!=`.
    pub fn is_equivalence(self) -> bool {
        matches!(self, BinOpKind::EquivEq | BinOpKind::EquivNotEq)
    }

    /// True for `IN` / `NOT IN`.
    pub fn is_membership(self) -> bool {
        matches!(self, BinOpKind::In | BinOpKind::NotIn)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Plus,
    Minus,
    Not,
    /// `DISTINCT expr` — duplicate elimination over a whole set.
    Distinct,
}

/// A possibly module-qualified name reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRef {
    pub module: Option<SmolStr>,
    pub name: SmolStr,
    pub span: Span,
}

impl ClassRef {
    pub fn new(module: Option<SmolStr>, name: impl Into<SmolStr>, span: Span) -> Self {
        Self {
            module,
            name: name.into(),
            span,
        }
    }
}

/// Pointer traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PtrDirection {
    Outbound,
    Inbound,
}

/// Whether a pointer step names a link or a link property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtrKind {
    Link,
    Property,
}

/// A single pointer step in a path: `.name`, `.>name`, `.<name`, `@prop`,
/// optionally with an `[IS Target]` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Ptr {
    pub module: Option<SmolStr>,
    pub name: SmolStr,
    pub direction: PtrDirection,
    pub kind: PtrKind,
    pub target: Option<ClassRef>,
    pub span: Span,
}

/// A step in a path expression.
///
/// Only the first step may be a root (anchor, class reference, or arbitrary
/// expression); all later steps are pointer traversals.
#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    /// A class reference root: `User`, `std::Object`.
    Root(ClassRef),
    /// The `self` anchor.
    SelfAnchor(Span),
    /// The `__subject__` anchor.
    SubjectAnchor(Span),
    /// An arbitrary expression root: `(SELECT …).name`.
    Expr(Box<Expr>),
    /// A pointer traversal.
    Ptr(Ptr),
}

impl PathStep {
    pub fn span(&self) -> Span {
        match self {
            PathStep::Root(r) => r.span.clone(),
            PathStep::SelfAnchor(span) | PathStep::SubjectAnchor(span) => span.clone(),
            PathStep::Expr(e) => e.span(),
            PathStep::Ptr(p) => p.span.clone(),
        }
    }
}

/// A path expression. Invariant: `steps` is non-empty; `partial` paths start
/// directly with a pointer step (`.name` inside a shape element).
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub steps: Vec<PathStep>,
    pub partial: bool,
    pub span: Span,
}

/// A type name with optional collection subtypes: `array<int64>`,
/// `tuple<str, int64>`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeName {
    pub maintype: ClassRef,
    pub subtypes: Vec<TypeName>,
    pub span: Span,
}

/// A named-tuple element `name := value`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTupleElement {
    pub name: SmolStr,
    pub val: Expr,
    pub span: Span,
}

/// One element of an index/slice chain.
#[derive(Debug, Clone, PartialEq)]
pub enum IndirectionEl {
    Index(Expr),
    Slice {
        start: Option<Expr>,
        stop: Option<Expr>,
    },
}

/// A function call with positional and named arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub func: ClassRef,
    pub args: Vec<FuncArg>,
    pub span: Span,
}

/// A single call argument; aggregate arguments may carry FILTER and ORDER BY
/// modifiers which desugar into a sub-SELECT during compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncArg {
    pub name: Option<SmolStr>,
    pub arg: Expr,
    pub filter: Option<Expr>,
    pub sort: Vec<SortExpr>,
    pub span: Span,
}

/// Sort direction in ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Placement of empty values in an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonesOrder {
    First,
    Last,
}

/// One ORDER BY item.
#[derive(Debug, Clone, PartialEq)]
pub struct SortExpr {
    pub expr: Expr,
    pub direction: Option<SortDirection>,
    pub nones_order: Option<NonesOrder>,
    pub span: Span,
}

/// An `expr { … }` shape projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub expr: Box<Expr>,
    pub elements: Vec<ShapeElement>,
    pub span: Span,
}

/// One element of a shape.
///
/// `path` holds the pointer spec (possibly type-qualified, possibly a link
/// property); `compexpr` is set for `ptr := expr` computables; nested
/// `elements` describe a sub-shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeElement {
    pub path: Path,
    pub compexpr: Option<Expr>,
    pub elements: Vec<ShapeElement>,
    pub where_: Option<Expr>,
    pub orderby: Vec<SortExpr>,
    pub offset: Option<Expr>,
    pub limit: Option<Expr>,
    pub recurse: bool,
    pub recurse_limit: Option<Expr>,
    pub span: Span,
}

impl ShapeElement {
    /// A bare pointer element with no modifiers.
    pub fn pointer(path: Path) -> Self {
        let span = path.span.clone();
        Self {
            path,
            compexpr: None,
            elements: Vec::new(),
            where_: None,
            orderby: Vec::new(),
            offset: None,
            limit: None,
            recurse: false,
            recurse_limit: None,
            span,
        }
    }

    /// True when this element has any FILTER/ORDER BY/OFFSET/LIMIT clause.
    pub fn has_clauses(&self) -> bool {
        self.where_.is_some()
            || !self.orderby.is_empty()
            || self.offset.is_some()
            || self.limit.is_some()
    }
}
