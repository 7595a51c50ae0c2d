//! Statement AST nodes: queries, session commands, and DDL wrappers.

use crate::ast::Span;
use crate::ast::ddl::DdlCommand;
use crate::ast::expr::{Expr, ShapeElement, SortExpr};
use smol_str::SmolStr;

/// A complete EdgeQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectQuery),
    For(ForQuery),
    Group(GroupQuery),
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
    Session(SessionStmt),
    Ddl(DdlCommand),
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Select(q) => q.span.clone(),
            Statement::For(q) => q.span.clone(),
            Statement::Group(q) => q.span.clone(),
            Statement::Insert(q) => q.span.clone(),
            Statement::Update(q) => q.span.clone(),
            Statement::Delete(q) => q.span.clone(),
            Statement::Session(s) => s.span(),
            Statement::Ddl(d) => d.span.clone(),
        }
    }

    /// WITH-block entries, when the statement form carries them.
    pub fn aliases(&self) -> &[WithEntry] {
        match self {
            Statement::Select(q) => &q.aliases,
            Statement::For(q) => &q.aliases,
            Statement::Group(q) => &q.aliases,
            Statement::Insert(q) => &q.aliases,
            Statement::Update(q) => &q.aliases,
            Statement::Delete(q) => &q.aliases,
            Statement::Session(_) | Statement::Ddl(_) => &[],
        }
    }

    pub fn aliases_mut(&mut self) -> Option<&mut Vec<WithEntry>> {
        match self {
            Statement::Select(q) => Some(&mut q.aliases),
            Statement::For(q) => Some(&mut q.aliases),
            Statement::Group(q) => Some(&mut q.aliases),
            Statement::Insert(q) => Some(&mut q.aliases),
            Statement::Update(q) => Some(&mut q.aliases),
            Statement::Delete(q) => Some(&mut q.aliases),
            Statement::Session(_) | Statement::Ddl(_) => None,
        }
    }

    /// Declared result cardinality from a `WITH CARDINALITY` entry.
    pub fn declared_cardinality(&self) -> Option<&SmolStr> {
        self.aliases().iter().find_map(|a| match a {
            WithEntry::Cardinality { value, .. } => Some(value),
            _ => None,
        })
    }
}

/// One entry of a `WITH` block.
#[derive(Debug, Clone, PartialEq)]
pub enum WithEntry {
    /// `MODULE foo` or `alias := MODULE foo.bar`.
    ModuleAlias {
        alias: Option<SmolStr>,
        module: SmolStr,
        span: Span,
    },
    /// `CARDINALITY '1'` / `CARDINALITY '*'`.
    Cardinality { value: SmolStr, span: Span },
    /// `alias := expr` — a statement-local view.
    AliasedExpr {
        alias: SmolStr,
        expr: Expr,
        span: Span,
    },
}

/// `SELECT … [FILTER …] [ORDER BY …] [OFFSET …] [LIMIT …]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub aliases: Vec<WithEntry>,
    pub result: Expr,
    pub result_alias: Option<SmolStr>,
    pub where_: Option<Expr>,
    pub orderby: Vec<SortExpr>,
    pub offset: Option<Expr>,
    pub limit: Option<Expr>,
    pub span: Span,
}

impl SelectQuery {
    /// Wraps a bare expression the way `parse` promotes fragments.
    pub fn wrapping(result: Expr) -> Self {
        let span = result.span();
        Self {
            aliases: Vec::new(),
            result,
            result_alias: None,
            where_: None,
            orderby: Vec::new(),
            offset: None,
            limit: None,
            span,
        }
    }
}

/// `FOR x IN iterator UNION result …`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForQuery {
    pub aliases: Vec<WithEntry>,
    pub iterator_alias: SmolStr,
    pub iterator: Expr,
    pub result: Expr,
    pub result_alias: Option<SmolStr>,
    pub where_: Option<Expr>,
    pub orderby: Vec<SortExpr>,
    pub offset: Option<Expr>,
    pub limit: Option<Expr>,
    pub span: Span,
}

/// `GROUP subject USING alias := expr, … BY expr, … INTO result …`.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupQuery {
    pub aliases: Vec<WithEntry>,
    pub subject: Expr,
    pub subject_alias: Option<SmolStr>,
    pub using: Vec<(SmolStr, Expr)>,
    pub by: Vec<Expr>,
    pub result: Expr,
    pub result_alias: Option<SmolStr>,
    pub where_: Option<Expr>,
    pub orderby: Vec<SortExpr>,
    pub offset: Option<Expr>,
    pub limit: Option<Expr>,
    pub span: Span,
}

/// `INSERT Type { shape }`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub aliases: Vec<WithEntry>,
    pub subject: Expr,
    pub subject_alias: Option<SmolStr>,
    pub shape: Vec<ShapeElement>,
    pub span: Span,
}

/// `UPDATE Type [FILTER …] SET { shape }`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    pub aliases: Vec<WithEntry>,
    pub subject: Expr,
    pub subject_alias: Option<SmolStr>,
    pub where_: Option<Expr>,
    pub shape: Vec<ShapeElement>,
    pub span: Span,
}

/// `DELETE expr [FILTER …]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub aliases: Vec<WithEntry>,
    pub subject: Expr,
    pub subject_alias: Option<SmolStr>,
    pub where_: Option<Expr>,
    pub span: Span,
}

/// Session-state statements.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStmt {
    /// `SET MODULE foo`.
    SetModule { module: SmolStr, span: Span },
    /// `SET alias := MODULE foo`.
    SetAlias {
        alias: SmolStr,
        module: SmolStr,
        span: Span,
    },
}

impl SessionStmt {
    pub fn span(&self) -> Span {
        match self {
            SessionStmt::SetModule { span, .. } | SessionStmt::SetAlias { span, .. } => {
                span.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::Constant;

    #[test]
    fn wrapping_select_inherits_span() {
        let q = SelectQuery::wrapping(Expr::Constant(Constant::Int(1), 3..4));
        assert_eq!(q.span, 3..4);
        assert!(q.aliases.is_empty());
        assert!(q.where_.is_none());
    }

    #[test]
    fn declared_cardinality_found_in_with_block() {
        let mut q = SelectQuery::wrapping(Expr::Constant(Constant::Int(1), 0..1));
        q.aliases.push(WithEntry::Cardinality {
            value: "1".into(),
            span: 0..0,
        });
        let stmt = Statement::Select(q);
        assert_eq!(stmt.declared_cardinality().map(|c| c.as_str()), Some("1"));
    }
}
