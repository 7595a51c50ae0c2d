//! DDL AST nodes.
//!
//! The parser accepts the full CREATE/ALTER/DROP surface for schema
//! entities. The compiler does not lower DDL to IR; these nodes are handed
//! to the schema-management collaborator as-is.

use crate::ast::Span;
use crate::ast::expr::{ClassRef, Expr, TypeName};
use smol_str::SmolStr;

/// The DDL verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlOp {
    Create,
    Alter,
    Drop,
}

/// A complete DDL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DdlCommand {
    pub op: DdlOp,
    pub object: DdlObject,
    pub span: Span,
}

/// Languages accepted in `FROM <lang>` bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Sql,
    EdgeQL,
    Python,
    /// Only valid for migrations.
    Eschema,
}

impl Language {
    /// Parses a language name; `allow_eschema` is true in migration bodies.
    pub fn from_name(name: &str, allow_eschema: bool) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SQL" => Some(Language::Sql),
            "EDGEQL" => Some(Language::EdgeQL),
            "PYTHON" => Some(Language::Python),
            "ESCHEMA" if allow_eschema => Some(Language::Eschema),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::Sql => "SQL",
            Language::EdgeQL => "EDGEQL",
            Language::Python => "PYTHON",
            Language::Eschema => "ESCHEMA",
        }
    }
}

/// A `FROM <lang> <code>` body.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCode {
    pub language: Language,
    pub code: String,
    pub span: Span,
}

/// Parameter passing mode in function definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Positional,
    Optional,
    Variadic,
    SetOf,
}

/// One parameter of a CREATE FUNCTION / CREATE AGGREGATE definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncParam {
    pub name: Option<SmolStr>,
    pub ty: TypeName,
    pub kind: ParamKind,
    /// True for `NAMED ONLY` parameters (keyword-only at call sites).
    pub named_only: bool,
    pub default: Option<Expr>,
    pub span: Span,
}

/// The schema entity a DDL command addresses.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlObject {
    Module {
        name: ClassRef,
        commands: Vec<DdlSubcommand>,
    },
    Database {
        name: ClassRef,
    },
    Migration {
        name: ClassRef,
        /// `TO ESCHEMA <text>` target declaration, when present.
        target: Option<FunctionCode>,
        commands: Vec<DdlSubcommand>,
    },
    Action {
        name: ClassRef,
        extending: Vec<ClassRef>,
        commands: Vec<DdlSubcommand>,
    },
    ScalarType {
        name: ClassRef,
        abstract_: bool,
        final_: bool,
        extending: Vec<ClassRef>,
        commands: Vec<DdlSubcommand>,
    },
    Attribute {
        name: ClassRef,
        ty: Option<TypeName>,
        commands: Vec<DdlSubcommand>,
    },
    ObjectType {
        name: ClassRef,
        abstract_: bool,
        final_: bool,
        extending: Vec<ClassRef>,
        commands: Vec<DdlSubcommand>,
    },
    View {
        name: ClassRef,
        expr: Option<Expr>,
        commands: Vec<DdlSubcommand>,
    },
    Constraint {
        name: ClassRef,
        extending: Vec<ClassRef>,
        commands: Vec<DdlSubcommand>,
    },
    Link {
        name: ClassRef,
        extending: Vec<ClassRef>,
        /// Target type for inline `CREATE LINK name -> Type` forms.
        target: Option<TypeName>,
        required: bool,
        commands: Vec<DdlSubcommand>,
    },
    LinkProperty {
        name: ClassRef,
        extending: Vec<ClassRef>,
        target: Option<TypeName>,
        required: bool,
        commands: Vec<DdlSubcommand>,
    },
    Event {
        name: ClassRef,
        extending: Vec<ClassRef>,
        commands: Vec<DdlSubcommand>,
    },
    Function {
        name: ClassRef,
        params: Vec<FuncParam>,
        returning: TypeName,
        /// True for CREATE AGGREGATE.
        aggregate: bool,
        /// Aggregate initial value.
        initial_value: Option<Expr>,
        body: Option<FunctionCode>,
        commands: Vec<DdlSubcommand>,
    },
}

impl DdlObject {
    /// The primary name of the addressed entity.
    pub fn name(&self) -> &ClassRef {
        match self {
            DdlObject::Module { name, .. }
            | DdlObject::Database { name }
            | DdlObject::Migration { name, .. }
            | DdlObject::Action { name, .. }
            | DdlObject::ScalarType { name, .. }
            | DdlObject::Attribute { name, .. }
            | DdlObject::ObjectType { name, .. }
            | DdlObject::View { name, .. }
            | DdlObject::Constraint { name, .. }
            | DdlObject::Link { name, .. }
            | DdlObject::LinkProperty { name, .. }
            | DdlObject::Event { name, .. }
            | DdlObject::Function { name, .. } => name,
        }
    }
}

/// A subcommand inside an ALTER (or braced CREATE) block.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlSubcommand {
    /// `RENAME TO newname`.
    RenameTo { name: ClassRef, span: Span },
    /// `SET attr := expr`.
    SetField {
        name: SmolStr,
        value: Expr,
        span: Span,
    },
    /// `DROP attr`-style field removal.
    DropField { name: SmolStr, span: Span },
    /// A nested CREATE/ALTER/DROP command (pointers, constraints, …).
    Nested(DdlCommand),
}

impl DdlSubcommand {
    pub fn span(&self) -> Span {
        match self {
            DdlSubcommand::RenameTo { span, .. }
            | DdlSubcommand::SetField { span, .. }
            | DdlSubcommand::DropField { span, .. } => span.clone(),
            DdlSubcommand::Nested(cmd) => cmd.span.clone(),
        }
    }
}
