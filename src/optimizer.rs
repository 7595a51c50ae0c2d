//! AST normalization for serialization: module-alias optimization.
//!
//! `optimize` strips module qualifications that are redundant under the
//! statement's aliases — `std::` always, and any module bound to an alias
//! gets the alias instead. `deoptimize` reverses the aliasing, expanding
//! every alias back into the fully qualified module name.

use crate::ast::expr::{ClassRef, Expr, IndirectionEl, Path, PathStep, ShapeElement, TypeName};
use crate::ast::stmt::{Statement, WithEntry};
use indexmap::IndexMap;
use smol_str::SmolStr;

/// Direction of the normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Optimize,
    Deoptimize,
}

/// Shortens module references under the statement's aliases.
pub fn optimize(mut stmt: Statement) -> Statement {
    let aliases = collect_aliases(&stmt);
    rewrite_statement(&mut stmt, &aliases, Mode::Optimize);
    stmt
}

/// Expands module aliases back into fully qualified names.
pub fn deoptimize(mut stmt: Statement) -> Statement {
    let aliases = collect_aliases(&stmt);
    rewrite_statement(&mut stmt, &aliases, Mode::Deoptimize);
    stmt
}

/// `alias → module` from the WITH block.
fn collect_aliases(stmt: &Statement) -> IndexMap<SmolStr, SmolStr> {
    stmt.aliases()
        .iter()
        .filter_map(|entry| match entry {
            WithEntry::ModuleAlias {
                alias: Some(alias),
                module,
                ..
            } => Some((alias.clone(), module.clone())),
            _ => None,
        })
        .collect()
}

fn rewrite_class_ref(class_ref: &mut ClassRef, aliases: &IndexMap<SmolStr, SmolStr>, mode: Mode) {
    match mode {
        Mode::Optimize => {
            if let Some(module) = &class_ref.module {
                if module == "std" {
                    // Unqualified lookup falls back to std.
                    class_ref.module = None;
                } else if let Some((alias, _)) = aliases.iter().find(|(_, m)| *m == module) {
                    class_ref.module = Some(alias.clone());
                }
            }
        }
        Mode::Deoptimize => {
            if let Some(module) = &class_ref.module
                && let Some(full) = aliases.get(module)
            {
                class_ref.module = Some(full.clone());
            }
        }
    }
}

fn rewrite_statement(stmt: &mut Statement, aliases: &IndexMap<SmolStr, SmolStr>, mode: Mode) {
    match stmt {
        Statement::Select(q) => {
            rewrite_with_entries(&mut q.aliases, aliases, mode);
            rewrite_expr(&mut q.result, aliases, mode);
            rewrite_clauses(
                &mut q.where_,
                &mut q.orderby,
                &mut q.offset,
                &mut q.limit,
                aliases,
                mode,
            );
        }
        Statement::For(q) => {
            rewrite_with_entries(&mut q.aliases, aliases, mode);
            rewrite_expr(&mut q.iterator, aliases, mode);
            rewrite_expr(&mut q.result, aliases, mode);
            rewrite_clauses(
                &mut q.where_,
                &mut q.orderby,
                &mut q.offset,
                &mut q.limit,
                aliases,
                mode,
            );
        }
        Statement::Group(q) => {
            rewrite_with_entries(&mut q.aliases, aliases, mode);
            rewrite_expr(&mut q.subject, aliases, mode);
            for (_, expr) in &mut q.using {
                rewrite_expr(expr, aliases, mode);
            }
            for by in &mut q.by {
                rewrite_expr(by, aliases, mode);
            }
            rewrite_expr(&mut q.result, aliases, mode);
            rewrite_clauses(
                &mut q.where_,
                &mut q.orderby,
                &mut q.offset,
                &mut q.limit,
                aliases,
                mode,
            );
        }
        Statement::Insert(q) => {
            rewrite_with_entries(&mut q.aliases, aliases, mode);
            rewrite_expr(&mut q.subject, aliases, mode);
            for el in &mut q.shape {
                rewrite_shape_element(el, aliases, mode);
            }
        }
        Statement::Update(q) => {
            rewrite_with_entries(&mut q.aliases, aliases, mode);
            rewrite_expr(&mut q.subject, aliases, mode);
            if let Some(where_) = &mut q.where_ {
                rewrite_expr(where_, aliases, mode);
            }
            for el in &mut q.shape {
                rewrite_shape_element(el, aliases, mode);
            }
        }
        Statement::Delete(q) => {
            rewrite_with_entries(&mut q.aliases, aliases, mode);
            rewrite_expr(&mut q.subject, aliases, mode);
            if let Some(where_) = &mut q.where_ {
                rewrite_expr(where_, aliases, mode);
            }
        }
        Statement::Session(_) | Statement::Ddl(_) => {}
    }
}

fn rewrite_with_entries(
    entries: &mut [WithEntry],
    aliases: &IndexMap<SmolStr, SmolStr>,
    mode: Mode,
) {
    for entry in entries {
        if let WithEntry::AliasedExpr { expr, .. } = entry {
            rewrite_expr(expr, aliases, mode);
        }
    }
}

fn rewrite_clauses(
    where_: &mut Option<Expr>,
    orderby: &mut [crate::ast::expr::SortExpr],
    offset: &mut Option<Expr>,
    limit: &mut Option<Expr>,
    aliases: &IndexMap<SmolStr, SmolStr>,
    mode: Mode,
) {
    if let Some(where_) = where_ {
        rewrite_expr(where_, aliases, mode);
    }
    for sort in orderby {
        rewrite_expr(&mut sort.expr, aliases, mode);
    }
    if let Some(offset) = offset {
        rewrite_expr(offset, aliases, mode);
    }
    if let Some(limit) = limit {
        rewrite_expr(limit, aliases, mode);
    }
}

fn rewrite_type_name(ty: &mut TypeName, aliases: &IndexMap<SmolStr, SmolStr>, mode: Mode) {
    rewrite_class_ref(&mut ty.maintype, aliases, mode);
    for sub in &mut ty.subtypes {
        rewrite_type_name(sub, aliases, mode);
    }
}

fn rewrite_path(path: &mut Path, aliases: &IndexMap<SmolStr, SmolStr>, mode: Mode) {
    for step in &mut path.steps {
        match step {
            PathStep::Root(class_ref) => rewrite_class_ref(class_ref, aliases, mode),
            PathStep::Ptr(ptr) => {
                if let Some(target) = &mut ptr.target {
                    rewrite_class_ref(target, aliases, mode);
                }
            }
            PathStep::Expr(expr) => rewrite_expr(expr, aliases, mode),
            PathStep::SelfAnchor(_) | PathStep::SubjectAnchor(_) => {}
        }
    }
}

fn rewrite_shape_element(
    el: &mut ShapeElement,
    aliases: &IndexMap<SmolStr, SmolStr>,
    mode: Mode,
) {
    rewrite_path(&mut el.path, aliases, mode);
    if let Some(compexpr) = &mut el.compexpr {
        rewrite_expr(compexpr, aliases, mode);
    }
    for nested in &mut el.elements {
        rewrite_shape_element(nested, aliases, mode);
    }
    if let Some(where_) = &mut el.where_ {
        rewrite_expr(where_, aliases, mode);
    }
    for sort in &mut el.orderby {
        rewrite_expr(&mut sort.expr, aliases, mode);
    }
    if let Some(offset) = &mut el.offset {
        rewrite_expr(offset, aliases, mode);
    }
    if let Some(limit) = &mut el.limit {
        rewrite_expr(limit, aliases, mode);
    }
}

fn rewrite_expr(expr: &mut Expr, aliases: &IndexMap<SmolStr, SmolStr>, mode: Mode) {
    match expr {
        Expr::Path(path) => rewrite_path(path, aliases, mode),
        Expr::BinOp { left, right, .. } => {
            rewrite_expr(left, aliases, mode);
            rewrite_expr(right, aliases, mode);
        }
        Expr::UnaryOp { operand, .. } => rewrite_expr(operand, aliases, mode),
        Expr::IfElse {
            if_expr,
            condition,
            else_expr,
            ..
        } => {
            rewrite_expr(if_expr, aliases, mode);
            rewrite_expr(condition, aliases, mode);
            rewrite_expr(else_expr, aliases, mode);
        }
        Expr::Exists { expr, .. } => rewrite_expr(expr, aliases, mode),
        Expr::Coalesce { args, .. } => {
            for arg in args {
                rewrite_expr(arg, aliases, mode);
            }
        }
        Expr::TypeCast { ty, expr, .. } => {
            rewrite_type_name(ty, aliases, mode);
            rewrite_expr(expr, aliases, mode);
        }
        Expr::TypeFilter { expr, ty, .. } => {
            rewrite_expr(expr, aliases, mode);
            rewrite_class_ref(ty, aliases, mode);
        }
        Expr::Indirection { arg, elements, .. } => {
            rewrite_expr(arg, aliases, mode);
            for el in elements {
                match el {
                    IndirectionEl::Index(index) => rewrite_expr(index, aliases, mode),
                    IndirectionEl::Slice { start, stop } => {
                        if let Some(start) = start {
                            rewrite_expr(start, aliases, mode);
                        }
                        if let Some(stop) = stop {
                            rewrite_expr(stop, aliases, mode);
                        }
                    }
                }
            }
        }
        Expr::Tuple { elements, .. } | Expr::Array { elements, .. } | Expr::Set { elements, .. } => {
            for el in elements {
                rewrite_expr(el, aliases, mode);
            }
        }
        Expr::NamedTuple { elements, .. } => {
            for el in elements {
                rewrite_expr(&mut el.val, aliases, mode);
            }
        }
        Expr::Mapping { keys, values, .. } => {
            for el in keys.iter_mut().chain(values) {
                rewrite_expr(el, aliases, mode);
            }
        }
        Expr::FunctionCall(call) => {
            rewrite_class_ref(&mut call.func, aliases, mode);
            for arg in &mut call.args {
                rewrite_expr(&mut arg.arg, aliases, mode);
                if let Some(filter) = &mut arg.filter {
                    rewrite_expr(filter, aliases, mode);
                }
                for sort in &mut arg.sort {
                    rewrite_expr(&mut sort.expr, aliases, mode);
                }
            }
        }
        Expr::Shape(shape) => {
            rewrite_expr(&mut shape.expr, aliases, mode);
            for el in &mut shape.elements {
                rewrite_shape_element(el, aliases, mode);
            }
        }
        Expr::Statement(stmt, _) => rewrite_statement(stmt, aliases, mode),
        Expr::Constant(..) | Expr::Parameter(..) | Expr::EmptyCollection { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::codegen::statement_to_source;
    use crate::parser;

    fn parse(source: &str) -> Statement {
        parser::parse(source).ast.expect("source must parse")
    }

    #[test]
    fn optimize_strips_std() {
        let stmt = optimize(parse("SELECT std::int64"));
        let text = statement_to_source(&stmt);
        assert_eq!(text, "SELECT int64");
    }

    #[test]
    fn optimize_applies_aliases() {
        let stmt = optimize(parse("WITH m := MODULE mymod SELECT mymod::Thing"));
        let text = statement_to_source(&stmt);
        assert!(text.contains("m::Thing"), "got: {text}");
    }

    #[test]
    fn deoptimize_expands_aliases() {
        let stmt = deoptimize(parse("WITH m := MODULE mymod SELECT m::Thing"));
        let text = statement_to_source(&stmt);
        assert!(text.contains("mymod::Thing"), "got: {text}");
    }

    #[test]
    fn optimize_and_deoptimize_are_inverse() {
        let original =
            parse("WITH m := MODULE mymod SELECT mymod::Thing FILTER std::len(.name) > 0");
        let optimized = optimize(original);
        let restored = deoptimize(optimized);
        // Module references are back to their qualified form.
        let text = statement_to_source(&restored);
        assert!(text.contains("mymod::Thing"));
    }
}
