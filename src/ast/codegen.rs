//! EdgeQL source generation from the AST.
//!
//! Renders query statements back to canonical text: single spaces between
//! tokens, no redundant `ASC`, fully parenthesized operand nesting so the
//! output re-parses to the same structure. Generation is idempotent:
//! `generate(parse(generate(x)))` equals `generate(x)`.
//!
//! DDL is not rendered here; its source form belongs to the schema
//! definition language, which is a separate surface.

use crate::ast::expr::{
    BinOpKind, Constant, Expr, IndirectionEl, Path, PathStep, Ptr, PtrDirection, PtrKind,
    ShapeElement, SortDirection, SortExpr, TypeName, UnaryOpKind,
};
use crate::ast::stmt::{SelectQuery, SessionStmt, Statement, WithEntry};
use std::fmt::Write;

/// Renders a statement to EdgeQL source text.
pub fn statement_to_source(stmt: &Statement) -> String {
    let mut out = String::new();
    write_statement(&mut out, stmt);
    out
}

/// Renders an expression to EdgeQL source text.
pub fn expr_to_source(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

fn write_statement(out: &mut String, stmt: &Statement) {
    match stmt {
        Statement::Select(q) => write_select(out, q),
        Statement::For(q) => {
            write_with_block(out, &q.aliases);
            out.push_str("FOR ");
            out.push_str(&q.iterator_alias);
            out.push_str(" IN ");
            write_expr(out, &q.iterator);
            out.push_str(" UNION ");
            write_aliased(out, q.result_alias.as_deref(), &q.result);
            write_clauses(out, &q.where_, &q.orderby, &q.offset, &q.limit);
        }
        Statement::Group(q) => {
            write_with_block(out, &q.aliases);
            out.push_str("GROUP ");
            write_aliased(out, q.subject_alias.as_deref(), &q.subject);
            if !q.using.is_empty() {
                out.push_str(" USING ");
                for (i, (alias, expr)) in q.using.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{alias} := ");
                    write_expr(out, expr);
                }
            }
            out.push_str(" BY ");
            for (i, by) in q.by.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, by);
            }
            out.push_str(" INTO ");
            write_aliased(out, q.result_alias.as_deref(), &q.result);
            write_clauses(out, &q.where_, &q.orderby, &q.offset, &q.limit);
        }
        Statement::Insert(q) => {
            write_with_block(out, &q.aliases);
            out.push_str("INSERT ");
            write_aliased(out, q.subject_alias.as_deref(), &q.subject);
            if !q.shape.is_empty() {
                out.push(' ');
                write_shape_block(out, &q.shape);
            }
        }
        Statement::Update(q) => {
            write_with_block(out, &q.aliases);
            out.push_str("UPDATE ");
            write_aliased(out, q.subject_alias.as_deref(), &q.subject);
            if let Some(where_) = &q.where_ {
                out.push_str(" FILTER ");
                write_expr(out, where_);
            }
            out.push_str(" SET ");
            write_shape_block(out, &q.shape);
        }
        Statement::Delete(q) => {
            write_with_block(out, &q.aliases);
            out.push_str("DELETE ");
            write_aliased(out, q.subject_alias.as_deref(), &q.subject);
            if let Some(where_) = &q.where_ {
                out.push_str(" FILTER ");
                write_expr(out, where_);
            }
        }
        Statement::Session(s) => match s {
            SessionStmt::SetModule { module, .. } => {
                let _ = write!(out, "SET MODULE {module}");
            }
            SessionStmt::SetAlias { alias, module, .. } => {
                let _ = write!(out, "SET {alias} := MODULE {module}");
            }
        },
        Statement::Ddl(_) => {
            out.push_str("# <ddl>");
        }
    }
}

fn write_select(out: &mut String, q: &SelectQuery) {
    write_with_block(out, &q.aliases);
    out.push_str("SELECT ");
    write_aliased(out, q.result_alias.as_deref(), &q.result);
    write_clauses(out, &q.where_, &q.orderby, &q.offset, &q.limit);
}

fn write_with_block(out: &mut String, aliases: &[WithEntry]) {
    if aliases.is_empty() {
        return;
    }
    out.push_str("WITH ");
    for (i, entry) in aliases.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match entry {
            WithEntry::ModuleAlias {
                alias: None,
                module,
                ..
            } => {
                let _ = write!(out, "MODULE {module}");
            }
            WithEntry::ModuleAlias {
                alias: Some(alias),
                module,
                ..
            } => {
                let _ = write!(out, "{alias} := MODULE {module}");
            }
            WithEntry::Cardinality { value, .. } => {
                let _ = write!(out, "CARDINALITY '{value}'");
            }
            WithEntry::AliasedExpr { alias, expr, .. } => {
                let _ = write!(out, "{alias} := ");
                write_paren_expr(out, expr);
            }
        }
    }
    out.push(' ');
}

fn write_aliased(out: &mut String, alias: Option<&str>, expr: &Expr) {
    if let Some(alias) = alias {
        let _ = write!(out, "{alias} := ");
    }
    write_expr(out, expr);
}

fn write_clauses(
    out: &mut String,
    where_: &Option<Expr>,
    orderby: &[SortExpr],
    offset: &Option<Expr>,
    limit: &Option<Expr>,
) {
    if let Some(where_) = where_ {
        out.push_str(" FILTER ");
        write_expr(out, where_);
    }
    if !orderby.is_empty() {
        out.push_str(" ORDER BY ");
        for (i, sort) in orderby.iter().enumerate() {
            if i > 0 {
                out.push_str(" THEN ");
            }
            write_expr(out, &sort.expr);
            if sort.direction == Some(SortDirection::Desc) {
                out.push_str(" DESC");
            }
            match sort.nones_order {
                Some(crate::ast::expr::NonesOrder::First) => out.push_str(" EMPTY FIRST"),
                Some(crate::ast::expr::NonesOrder::Last) => out.push_str(" EMPTY LAST"),
                None => {}
            }
        }
    }
    if let Some(offset) = offset {
        out.push_str(" OFFSET ");
        write_expr(out, offset);
    }
    if let Some(limit) = limit {
        out.push_str(" LIMIT ");
        write_expr(out, limit);
    }
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Path(path) => write_path(out, path),
        Expr::Constant(value, _) => write_constant(out, value),
        Expr::Parameter(name, _) => {
            let _ = write!(out, "${name}");
        }
        Expr::BinOp {
            left, op, right, ..
        } => {
            write_paren_expr(out, left);
            let _ = write!(out, " {} ", binop_text(*op));
            write_paren_expr(out, right);
        }
        Expr::UnaryOp { op, operand, .. } => {
            match op {
                UnaryOpKind::Plus => out.push('+'),
                UnaryOpKind::Minus => out.push('-'),
                UnaryOpKind::Not => out.push_str("NOT "),
                UnaryOpKind::Distinct => out.push_str("DISTINCT "),
            }
            write_paren_expr(out, operand);
        }
        Expr::IfElse {
            if_expr,
            condition,
            else_expr,
            ..
        } => {
            write_paren_expr(out, if_expr);
            out.push_str(" IF ");
            write_paren_expr(out, condition);
            out.push_str(" ELSE ");
            write_paren_expr(out, else_expr);
        }
        Expr::Exists { expr, .. } => {
            out.push_str("EXISTS ");
            write_paren_expr(out, expr);
        }
        Expr::Coalesce { args, .. } => {
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(" ?? ");
                }
                write_paren_expr(out, arg);
            }
        }
        Expr::TypeCast { ty, expr, .. } => {
            out.push('<');
            write_type_name(out, ty);
            out.push('>');
            write_paren_expr(out, expr);
        }
        Expr::TypeFilter { expr, ty, .. } => {
            write_paren_expr(out, expr);
            out.push_str("[IS ");
            write_class_ref(out, ty);
            out.push(']');
        }
        Expr::Indirection { arg, elements, .. } => {
            write_paren_expr(out, arg);
            for el in elements {
                out.push('[');
                match el {
                    IndirectionEl::Index(index) => write_expr(out, index),
                    IndirectionEl::Slice { start, stop } => {
                        if let Some(start) = start {
                            write_expr(out, start);
                        }
                        out.push(':');
                        if let Some(stop) = stop {
                            write_expr(out, stop);
                        }
                    }
                }
                out.push(']');
            }
        }
        Expr::Tuple { elements, .. } => {
            out.push('(');
            for (i, el) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, el);
            }
            if elements.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Expr::NamedTuple { elements, .. } => {
            out.push('(');
            for (i, el) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{} := ", el.name);
                write_expr(out, &el.val);
            }
            out.push(')');
        }
        Expr::Array { elements, .. } => {
            out.push('[');
            for (i, el) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, el);
            }
            out.push(']');
        }
        Expr::Mapping { keys, values, .. } => {
            out.push('[');
            for (i, (k, v)) in keys.iter().zip(values).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, k);
                out.push_str(" -> ");
                write_expr(out, v);
            }
            out.push(']');
        }
        Expr::Set { elements, .. } => {
            out.push('{');
            for (i, el) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, el);
            }
            out.push('}');
        }
        Expr::EmptyCollection { .. } => out.push_str("[]"),
        Expr::FunctionCall(call) => {
            write_class_ref(out, &call.func);
            out.push('(');
            for (i, arg) in call.args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if let Some(name) = &arg.name {
                    let _ = write!(out, "{name} := ");
                }
                write_expr(out, &arg.arg);
                if let Some(filter) = &arg.filter {
                    out.push_str(" FILTER ");
                    write_expr(out, filter);
                }
                if !arg.sort.is_empty() {
                    out.push_str(" ORDER BY ");
                    for (j, sort) in arg.sort.iter().enumerate() {
                        if j > 0 {
                            out.push_str(" THEN ");
                        }
                        write_expr(out, &sort.expr);
                        if sort.direction == Some(SortDirection::Desc) {
                            out.push_str(" DESC");
                        }
                    }
                }
            }
            out.push(')');
        }
        Expr::Shape(shape) => {
            write_paren_expr(out, &shape.expr);
            out.push(' ');
            write_shape_block(out, &shape.elements);
        }
        Expr::Statement(stmt, _) => {
            out.push('(');
            write_statement(out, stmt);
            out.push(')');
        }
    }
}

/// Parenthesizes operands that would otherwise re-associate.
fn write_paren_expr(out: &mut String, expr: &Expr) {
    let needs_parens = matches!(
        expr,
        Expr::BinOp { .. }
            | Expr::UnaryOp { .. }
            | Expr::IfElse { .. }
            | Expr::Coalesce { .. }
            | Expr::Exists { .. }
    );
    if needs_parens {
        out.push('(');
        write_expr(out, expr);
        out.push(')');
    } else {
        write_expr(out, expr);
    }
}

fn write_path(out: &mut String, path: &Path) {
    for (i, step) in path.steps.iter().enumerate() {
        match step {
            PathStep::Root(class_ref) => write_class_ref(out, class_ref),
            PathStep::SelfAnchor(_) => out.push_str("self"),
            PathStep::SubjectAnchor(_) => out.push_str("__subject__"),
            PathStep::Expr(expr) => write_paren_expr(out, expr),
            PathStep::Ptr(ptr) => {
                if i > 0 || path.partial {
                    write_ptr_prefix(out, ptr);
                }
                write_ptr(out, ptr);
            }
        }
    }
}

fn write_ptr_prefix(out: &mut String, ptr: &Ptr) {
    if ptr.kind == PtrKind::Property {
        out.push('@');
    } else {
        match ptr.direction {
            PtrDirection::Outbound => out.push('.'),
            PtrDirection::Inbound => out.push_str(".<"),
        }
    }
}

fn write_ptr(out: &mut String, ptr: &Ptr) {
    if let Some(module) = &ptr.module {
        let _ = write!(out, "{module}::");
    }
    out.push_str(&ptr.name);
    if let Some(target) = &ptr.target {
        out.push_str("[IS ");
        write_class_ref(out, target);
        out.push(']');
    }
}

fn write_class_ref(out: &mut String, class_ref: &crate::ast::expr::ClassRef) {
    if let Some(module) = &class_ref.module {
        let _ = write!(out, "{module}::");
    }
    out.push_str(&class_ref.name);
}

fn write_type_name(out: &mut String, ty: &TypeName) {
    write_class_ref(out, &ty.maintype);
    if !ty.subtypes.is_empty() {
        out.push('<');
        for (i, sub) in ty.subtypes.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write_type_name(out, sub);
        }
        out.push('>');
    }
}

fn write_shape_block(out: &mut String, elements: &[ShapeElement]) {
    out.push('{');
    for (i, el) in elements.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_shape_element(out, el);
    }
    out.push('}');
}

fn write_shape_element(out: &mut String, el: &ShapeElement) {
    // Shape pointer spec.
    match el.path.steps.as_slice() {
        [PathStep::Ptr(ptr)] => {
            if ptr.kind == PtrKind::Property {
                out.push('@');
            } else if ptr.direction == PtrDirection::Inbound {
                out.push_str(".<");
            }
            write_ptr(out, ptr);
        }
        [PathStep::Root(root), PathStep::Ptr(ptr)] => {
            write_class_ref(out, root);
            out.push('.');
            write_ptr(out, ptr);
        }
        _ => write_path(out, &el.path),
    }

    if el.recurse {
        out.push('*');
        if let Some(limit) = &el.recurse_limit {
            write_expr(out, limit);
        }
    }

    if !el.elements.is_empty() {
        out.push_str(": ");
        write_shape_block(out, &el.elements);
    }

    if let Some(compexpr) = &el.compexpr {
        out.push_str(" := ");
        write_expr(out, compexpr);
    }

    if let Some(where_) = &el.where_ {
        out.push_str(" FILTER ");
        write_expr(out, where_);
    }
    if !el.orderby.is_empty() {
        out.push_str(" ORDER BY ");
        for (i, sort) in el.orderby.iter().enumerate() {
            if i > 0 {
                out.push_str(" THEN ");
            }
            write_expr(out, &sort.expr);
            if sort.direction == Some(SortDirection::Desc) {
                out.push_str(" DESC");
            }
        }
    }
    if let Some(offset) = &el.offset {
        out.push_str(" OFFSET ");
        write_expr(out, offset);
    }
    if let Some(limit) = &el.limit {
        out.push_str(" LIMIT ");
        write_expr(out, limit);
    }
}

fn write_constant(out: &mut String, value: &Constant) {
    match value {
        Constant::Int(v) => {
            let _ = write!(out, "{v}");
        }
        Constant::Float(v) => {
            if v.fract() == 0.0 && v.is_finite() {
                let _ = write!(out, "{v:.1}");
            } else {
                let _ = write!(out, "{v}");
            }
        }
        Constant::Str(v) => {
            out.push('\'');
            for ch in v.chars() {
                match ch {
                    '\'' => out.push_str("\\'"),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    '\r' => out.push_str("\\r"),
                    _ => out.push(ch),
                }
            }
            out.push('\'');
        }
        Constant::Bool(true) => out.push_str("TRUE"),
        Constant::Bool(false) => out.push_str("FALSE"),
    }
}

fn binop_text(op: BinOpKind) -> &'static str {
    use BinOpKind::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Mod => "%",
        Pow => "^",
        Eq => "=",
        NotEq => "!=",
        Lt => "<",
        Gt => ">",
        LtEq => "<=",
        GtEq => ">=",
        And => "AND",
        Or => "OR",
        Like => "LIKE",
        NotLike => "NOT LIKE",
        Ilike => "ILIKE",
        NotIlike => "NOT ILIKE",
        In => "IN",
        NotIn => "NOT IN",
        Is => "IS",
        IsNot => "IS NOT",
        Union => "UNION",
        EquivEq => "?=",
        EquivNotEq => "?!=",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn roundtrip(source: &str) -> String {
        let first = parser::parse(source).ast.expect("source must parse");
        let generated = statement_to_source(&first);
        let second = parser::parse(&generated)
            .ast
            .unwrap_or_else(|| panic!("generated text must re-parse: {generated}"));
        let regenerated = statement_to_source(&second);
        assert_eq!(generated, regenerated, "generation must be idempotent");
        generated
    }

    #[test]
    fn simple_select() {
        assert_eq!(roundtrip("select 40+2"), "SELECT 40 + 2");
    }

    #[test]
    fn paths_and_shapes() {
        roundtrip("SELECT User.name");
        roundtrip("SELECT User { name, friends: { name } }");
        roundtrip("SELECT User { total := count(User.friends) }");
    }

    #[test]
    fn clauses() {
        let text = roundtrip("SELECT User FILTER User.age > 30 ORDER BY User.name ASC LIMIT 5");
        // Explicit ASC is the normalized default and is dropped.
        assert!(!text.contains("ASC"));
        assert!(text.contains("ORDER BY"));
        assert!(text.contains("LIMIT 5"));
    }

    #[test]
    fn operators_keep_structure() {
        roundtrip("SELECT 1 + 2 * 3");
        roundtrip("SELECT NOT EXISTS User.name");
        roundtrip("SELECT 1 UNION 2 UNION 3");
        roundtrip("SELECT a.b ?? 1 IF TRUE ELSE 2");
        assert_eq!(
            roundtrip("SELECT DISTINCT User.name"),
            "SELECT DISTINCT User.name"
        );
    }

    #[test]
    fn collections() {
        roundtrip("SELECT [1, 2, 3]");
        roundtrip("SELECT ('a', 'b')");
        roundtrip("SELECT (x := 1, y := 2)");
        roundtrip("SELECT {1, 2}");
        roundtrip("SELECT ['k' -> 'v']");
    }

    #[test]
    fn mutations() {
        roundtrip("INSERT User { name := 'Alice' }");
        roundtrip("UPDATE User FILTER User.age > 99 SET { name := 'old' }");
        roundtrip("DELETE User FILTER User.name = 'x'");
        roundtrip("FOR x IN {1, 2} UNION x + 1");
    }
}
