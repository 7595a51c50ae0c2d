//! Abstract syntax tree for EdgeQL.
//!
//! The parser produces these nodes; the compiler consumes them read-only.
//! Every node carries a [`Span`] covering its full source extent.

pub mod codegen;
pub mod ddl;
pub mod expr;
pub mod span;
pub mod stmt;

pub use ddl::{
    DdlCommand, DdlObject, DdlOp, DdlSubcommand, FuncParam, FunctionCode, Language, ParamKind,
};
pub use expr::{
    ClassRef, Constant, Expr, FuncArg, FunctionCall, IndirectionEl, NamedTupleElement, Path,
    PathStep, Ptr, PtrDirection, PtrKind, Shape, ShapeElement, SortDirection, SortExpr, TypeName,
    UnaryOpKind,
};
pub use expr::{BinOpKind, NonesOrder};
pub use span::{Span, Spanned, merge_spans};
pub use stmt::{
    DeleteQuery, ForQuery, GroupQuery, InsertQuery, SelectQuery, SessionStmt, Statement,
    UpdateQuery, WithEntry,
};
