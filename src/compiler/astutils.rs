//! AST classification helpers and small desugaring transforms.

use crate::ast::expr::{BinOpKind, Expr, Path, PathStep};
use crate::ast::stmt::{SelectQuery, Statement, WithEntry};

/// Wraps a bare expression into a `SELECT` statement; statements pass
/// through unchanged.
pub(crate) fn ensure_qlstmt(expr: &Expr) -> Statement {
    match expr {
        Expr::Statement(stmt, _) => (**stmt).clone(),
        other => Statement::Select(SelectQuery::wrapping(other.clone())),
    }
}

/// Conjoins `extra` onto a statement's filter condition with `AND`.
pub(crate) fn stmt_extend_where(stmt: &mut Statement, extra: Expr) {
    let where_ = match stmt {
        Statement::Select(q) => &mut q.where_,
        Statement::For(q) => &mut q.where_,
        Statement::Group(q) => &mut q.where_,
        Statement::Update(q) => &mut q.where_,
        Statement::Delete(q) => &mut q.where_,
        Statement::Insert(_) | Statement::Session(_) | Statement::Ddl(_) => return,
    };
    *where_ = Some(extend_condition(where_.take(), extra));
}

/// Conjoins `extra` onto an optional filter condition with `AND`.
pub(crate) fn extend_condition(existing: Option<Expr>, extra: Expr) -> Expr {
    match existing {
        None => extra,
        Some(current) => {
            let span = crate::ast::merge_spans(&current.span(), &extra.span());
            Expr::BinOp {
                left: Box::new(current),
                op: BinOpKind::And,
                right: Box::new(extra),
                span,
            }
        }
    }
}

/// True when the expression is a plain path (shapes are looked through).
pub(crate) fn is_ql_path(expr: &Expr) -> bool {
    let expr = match expr {
        Expr::Shape(shape) => shape.expr.as_ref(),
        other => other,
    };

    let Expr::Path(path) = expr else {
        return false;
    };

    matches!(
        path.steps.first(),
        Some(
            PathStep::Root(_)
                | PathStep::SelfAnchor(_)
                | PathStep::SubjectAnchor(_)
                | PathStep::Ptr(_)
        )
    )
}

/// The degenerate SELECT: a pure path result with no clauses and no
/// references to statement-local views. It compiles to the bare path.
pub(crate) fn is_degenerate_select(query: &SelectQuery) -> bool {
    if !is_ql_path(&query.result) {
        return false;
    }

    if query.where_.is_some()
        || !query.orderby.is_empty()
        || query.offset.is_some()
        || query.limit.is_some()
        || query.result_alias.is_some()
    {
        return false;
    }

    // A result referring to a view declared in this very statement needs
    // the full statement machinery.
    let result = match &query.result {
        Expr::Shape(shape) => shape.expr.as_ref(),
        other => other,
    };
    if let Expr::Path(Path { steps, .. }) = result
        && let Some(PathStep::Root(root)) = steps.first()
        && root.module.is_none()
    {
        let shadowed = query.aliases.iter().any(|entry| {
            matches!(entry, WithEntry::AliasedExpr { alias, .. } if *alias == root.name)
        });
        if shadowed {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::Constant;
    use crate::parser;

    fn parse_select(source: &str) -> SelectQuery {
        match parser::parse(source).ast {
            Some(Statement::Select(q)) => q,
            other => panic!("expected select, got {other:?}"),
        }
    }

    #[test]
    fn degenerate_select_detection() {
        assert!(is_degenerate_select(&parse_select("SELECT User")));
        assert!(is_degenerate_select(&parse_select("SELECT User.name")));
        assert!(!is_degenerate_select(&parse_select("SELECT User FILTER true")));
        assert!(!is_degenerate_select(&parse_select("SELECT User LIMIT 1")));
        assert!(!is_degenerate_select(&parse_select("SELECT 1")));
        assert!(!is_degenerate_select(&parse_select(
            "WITH U := Person SELECT U"
        )));
    }

    #[test]
    fn ensure_qlstmt_wraps_expressions() {
        let expr = Expr::Constant(Constant::Int(1), 0..1);
        let Statement::Select(q) = ensure_qlstmt(&expr) else {
            panic!("expected select");
        };
        assert_eq!(q.result, expr);
    }

    #[test]
    fn extend_condition_conjoins() {
        let a = Expr::Constant(Constant::Bool(true), 0..4);
        let b = Expr::Constant(Constant::Bool(false), 5..10);
        let combined = extend_condition(Some(a), b);
        assert!(matches!(
            combined,
            Expr::BinOp {
                op: BinOpKind::And,
                ..
            }
        ));
    }
}
