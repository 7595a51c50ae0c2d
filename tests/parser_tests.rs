//! Parser integration tests: precedence, spans, paths, shapes, statements.

mod common;

use common::{parse_err, parse_fragment_ok, parse_ok};
use eql_compiler::ast::expr::{
    BinOpKind, Constant, Expr, PathStep, PtrDirection, PtrKind, SortDirection, UnaryOpKind,
};
use eql_compiler::ast::stmt::{SessionStmt, Statement, WithEntry};

fn select_result(source: &str) -> Expr {
    match parse_ok(source) {
        Statement::Select(q) => q.result,
        other => panic!("expected SELECT, got {other:?}"),
    }
}

#[test]
fn select_addition_parses_to_binop() {
    // SELECT 40 + 2 yields BinOp(Constant 40, Add, Constant 2).
    let result = select_result("SELECT 40 + 2;");
    let Expr::BinOp {
        left, op, right, ..
    } = result
    else {
        panic!("expected a binary operation");
    };
    assert_eq!(op, BinOpKind::Add);
    assert!(matches!(*left, Expr::Constant(Constant::Int(40), _)));
    assert!(matches!(*right, Expr::Constant(Constant::Int(2), _)));
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let result = select_result("SELECT 1 + 2 * 3");
    let Expr::BinOp { op, right, .. } = result else {
        panic!("expected binop");
    };
    assert_eq!(op, BinOpKind::Add);
    assert!(matches!(
        *right,
        Expr::BinOp {
            op: BinOpKind::Mul,
            ..
        }
    ));
}

#[test]
fn coalesce_binds_tighter_than_multiplication() {
    // `a * b ?? c` parses as `a * (b ?? c)`.
    let result = select_result("SELECT 2 * 3 ?? 4");
    let Expr::BinOp { op, right, .. } = result else {
        panic!("expected binop");
    };
    assert_eq!(op, BinOpKind::Mul);
    assert!(matches!(*right, Expr::Coalesce { .. }));
}

#[test]
fn comparison_binds_looser_than_arithmetic() {
    let result = select_result("SELECT 1 + 2 < 3 * 4");
    let Expr::BinOp { op, .. } = result else {
        panic!("expected binop");
    };
    assert_eq!(op, BinOpKind::Lt);
}

#[test]
fn logical_ladder() {
    // NOT binds tighter than AND, AND tighter than OR.
    let result = select_result("SELECT NOT TRUE OR FALSE AND TRUE");
    let Expr::BinOp { left, op, right, .. } = result else {
        panic!("expected binop");
    };
    assert_eq!(op, BinOpKind::Or);
    assert!(matches!(
        *left,
        Expr::UnaryOp {
            op: UnaryOpKind::Not,
            ..
        }
    ));
    assert!(matches!(
        *right,
        Expr::BinOp {
            op: BinOpKind::And,
            ..
        }
    ));
}

#[test]
fn union_is_left_associative() {
    let result = select_result("SELECT 1 UNION 2 UNION 3");
    let Expr::BinOp { left, op, .. } = result else {
        panic!("expected binop");
    };
    assert_eq!(op, BinOpKind::Union);
    assert!(matches!(
        *left,
        Expr::BinOp {
            op: BinOpKind::Union,
            ..
        }
    ));
}

#[test]
fn distinct_parses_as_prefix_operator() {
    let result = select_result("SELECT DISTINCT User.name");
    let Expr::UnaryOp { op, operand, .. } = result else {
        panic!("expected unary op");
    };
    assert_eq!(op, UnaryOpKind::Distinct);
    assert!(matches!(*operand, Expr::Path(_)));
}

#[test]
fn distinct_binds_tighter_than_union() {
    // `DISTINCT 1 UNION 2` parses as `(DISTINCT 1) UNION 2`.
    let result = select_result("SELECT DISTINCT 1 UNION 2");
    let Expr::BinOp { left, op, .. } = result else {
        panic!("expected union");
    };
    assert_eq!(op, BinOpKind::Union);
    assert!(matches!(
        *left,
        Expr::UnaryOp {
            op: UnaryOpKind::Distinct,
            ..
        }
    ));
}

#[test]
fn distinct_binds_looser_than_ifelse() {
    // `DISTINCT a IF c ELSE b` parses as `DISTINCT (a IF c ELSE b)`.
    let result = select_result("SELECT DISTINCT 1 IF TRUE ELSE 2");
    let Expr::UnaryOp { op, operand, .. } = result else {
        panic!("expected unary op");
    };
    assert_eq!(op, UnaryOpKind::Distinct);
    assert!(matches!(*operand, Expr::IfElse { .. }));
}

#[test]
fn ifelse_is_right_associative() {
    let result = select_result("SELECT 1 IF TRUE ELSE 2 IF FALSE ELSE 3");
    let Expr::IfElse { else_expr, .. } = result else {
        panic!("expected if/else");
    };
    assert!(matches!(*else_expr, Expr::IfElse { .. }));
}

#[test]
fn ifelse_binds_looser_than_union_operand_chain() {
    // `??` binds tighter than IF…ELSE.
    let result = select_result("SELECT 1 ?? 2 IF TRUE ELSE 3");
    let Expr::IfElse { if_expr, .. } = result else {
        panic!("expected if/else");
    };
    assert!(matches!(*if_expr, Expr::Coalesce { .. }));
}

#[test]
fn power_is_right_associative_and_tighter_than_unary() {
    // `-2 ^ 2` parses as `-(2 ^ 2)`.
    let result = select_result("SELECT -2 ^ 2");
    assert!(matches!(
        result,
        Expr::UnaryOp {
            op: UnaryOpKind::Minus,
            ..
        }
    ));

    let result = select_result("SELECT 2 ^ 3 ^ 4");
    let Expr::BinOp { op, right, .. } = result else {
        panic!("expected binop");
    };
    assert_eq!(op, BinOpKind::Pow);
    assert!(matches!(
        *right,
        Expr::BinOp {
            op: BinOpKind::Pow,
            ..
        }
    ));
}

#[test]
fn typecast_parses_prefix() {
    let result = select_result("SELECT <str>42");
    let Expr::TypeCast { ty, expr, .. } = result else {
        panic!("expected cast");
    };
    assert_eq!(ty.maintype.name.as_str(), "str");
    assert!(matches!(*expr, Expr::Constant(Constant::Int(42), _)));
}

#[test]
fn nested_collection_casts() {
    let result = select_result("SELECT <array<int64>>[]");
    let Expr::TypeCast { ty, expr, .. } = result else {
        panic!("expected cast");
    };
    assert_eq!(ty.maintype.name.as_str(), "array");
    assert_eq!(ty.subtypes.len(), 1);
    assert!(matches!(*expr, Expr::EmptyCollection { .. }));
}

#[test]
fn equivalence_operators() {
    let result = select_result("SELECT 1 ?= 2");
    assert!(matches!(
        result,
        Expr::BinOp {
            op: BinOpKind::EquivEq,
            ..
        }
    ));
    let result = select_result("SELECT 1 ?!= 2");
    assert!(matches!(
        result,
        Expr::BinOp {
            op: BinOpKind::EquivNotEq,
            ..
        }
    ));
}

#[test]
fn membership_and_negated_forms() {
    assert!(matches!(
        select_result("SELECT 1 IN {1, 2}"),
        Expr::BinOp {
            op: BinOpKind::In,
            ..
        }
    ));
    assert!(matches!(
        select_result("SELECT 1 NOT IN {1, 2}"),
        Expr::BinOp {
            op: BinOpKind::NotIn,
            ..
        }
    ));
    assert!(matches!(
        select_result("SELECT 'a' NOT LIKE 'b'"),
        Expr::BinOp {
            op: BinOpKind::NotLike,
            ..
        }
    ));
}

#[test]
fn is_and_is_not() {
    assert!(matches!(
        select_result("SELECT User IS SpecialUser"),
        Expr::BinOp {
            op: BinOpKind::Is,
            ..
        }
    ));
    assert!(matches!(
        select_result("SELECT User IS NOT SpecialUser"),
        Expr::BinOp {
            op: BinOpKind::IsNot,
            ..
        }
    ));
}

#[test]
fn paths_with_directions_and_link_properties() {
    let Expr::Path(path) = select_result("SELECT User.friends@weight") else {
        panic!("expected a path");
    };
    assert_eq!(path.steps.len(), 3);
    let PathStep::Ptr(friends) = &path.steps[1] else {
        panic!("expected pointer step");
    };
    assert_eq!(friends.name.as_str(), "friends");
    assert_eq!(friends.kind, PtrKind::Link);
    let PathStep::Ptr(weight) = &path.steps[2] else {
        panic!("expected pointer step");
    };
    assert_eq!(weight.kind, PtrKind::Property);

    let Expr::Path(path) = select_result("SELECT User.<author") else {
        panic!("expected a path");
    };
    let PathStep::Ptr(author) = &path.steps[1] else {
        panic!("expected pointer step");
    };
    assert_eq!(author.direction, PtrDirection::Inbound);
}

#[test]
fn path_type_filter_folds_into_pointer() {
    let Expr::Path(path) = select_result("SELECT User.friends[IS SpecialUser]") else {
        panic!("expected a path");
    };
    let PathStep::Ptr(friends) = &path.steps[1] else {
        panic!("expected pointer step");
    };
    assert_eq!(
        friends.target.as_ref().map(|t| t.name.as_str()),
        Some("SpecialUser")
    );
}

#[test]
fn tuple_field_access_via_float_token() {
    // `.0.1` arrives as a float token and splits into two steps.
    let Expr::Path(path) = select_result("SELECT tup.0.1") else {
        panic!("expected a path");
    };
    assert_eq!(path.steps.len(), 3);
    let PathStep::Ptr(first) = &path.steps[1] else {
        panic!("expected pointer step");
    };
    assert_eq!(first.name.as_str(), "0");
    let PathStep::Ptr(second) = &path.steps[2] else {
        panic!("expected pointer step");
    };
    assert_eq!(second.name.as_str(), "1");
}

#[test]
fn collections() {
    assert!(matches!(
        select_result("SELECT [1, 2, 3]"),
        Expr::Array { .. }
    ));
    assert!(matches!(
        select_result("SELECT ['k' -> 'v']"),
        Expr::Mapping { .. }
    ));
    assert!(matches!(select_result("SELECT (1,)"), Expr::Tuple { .. }));
    assert!(matches!(
        select_result("SELECT (a := 1, b := 2)"),
        Expr::NamedTuple { .. }
    ));
    let Expr::Set { elements, .. } = select_result("SELECT {}") else {
        panic!("expected set literal");
    };
    assert!(elements.is_empty());
}

#[test]
fn indirections() {
    let Expr::Indirection { elements, .. } = select_result("SELECT x[1][2:3]") else {
        panic!("expected indirection");
    };
    assert_eq!(elements.len(), 2);
}

#[test]
fn spans_cover_descendants() {
    let source = "SELECT 40 + 2";
    let Statement::Select(q) = parse_ok(source) else {
        panic!("expected select");
    };
    let Expr::BinOp {
        left, right, span, ..
    } = &q.result
    else {
        panic!("expected binop");
    };
    // The parent span covers both children; siblings are disjoint and in
    // source order.
    assert!(span.start <= left.span().start);
    assert!(span.end >= right.span().end);
    assert!(left.span().end <= right.span().start);
    assert_eq!(&source[span.clone()], "40 + 2");
}

#[test]
fn shape_with_elements() {
    let Expr::Shape(shape) = select_result("SELECT User { name, friends: { name } }") else {
        panic!("expected shape");
    };
    assert_eq!(shape.elements.len(), 2);
    assert_eq!(shape.elements[1].elements.len(), 1);
}

#[test]
fn shape_computable_and_clauses() {
    let Expr::Shape(shape) = select_result(
        "SELECT User { total := count(User.friends), friends FILTER .age > 20 ORDER BY .name LIMIT 3 }",
    ) else {
        panic!("expected shape");
    };
    assert!(shape.elements[0].compexpr.is_some());
    let with_clauses = &shape.elements[1];
    assert!(with_clauses.where_.is_some());
    assert_eq!(with_clauses.orderby.len(), 1);
    assert!(with_clauses.limit.is_some());
}

#[test]
fn shape_recursion_marker() {
    let Expr::Shape(shape) = select_result("SELECT User { friends*2 }") else {
        panic!("expected shape");
    };
    assert!(shape.elements[0].recurse);
    assert!(shape.elements[0].recurse_limit.is_some());
}

#[test]
fn with_block_entries() {
    let Statement::Select(q) =
        parse_ok("WITH MODULE other, m := MODULE other2, U := User SELECT U")
    else {
        panic!("expected select");
    };
    assert_eq!(q.aliases.len(), 3);
    assert!(matches!(
        &q.aliases[0],
        WithEntry::ModuleAlias { alias: None, .. }
    ));
    assert!(matches!(
        &q.aliases[1],
        WithEntry::ModuleAlias {
            alias: Some(alias),
            ..
        } if alias == "m"
    ));
    assert!(matches!(&q.aliases[2], WithEntry::AliasedExpr { .. }));
}

#[test]
fn cardinality_declaration() {
    let Statement::Select(q) = parse_ok("WITH CARDINALITY '1' SELECT 1") else {
        panic!("expected select");
    };
    assert!(matches!(
        &q.aliases[0],
        WithEntry::Cardinality { value, .. } if value == "1"
    ));

    parse_err("WITH CARDINALITY '2' SELECT 1");
}

#[test]
fn statement_clauses() {
    let Statement::Select(q) = parse_ok(
        "SELECT User FILTER User.age > 30 ORDER BY User.name DESC EMPTY LAST OFFSET 5 LIMIT 10",
    ) else {
        panic!("expected select");
    };
    assert!(q.where_.is_some());
    assert_eq!(q.orderby.len(), 1);
    assert_eq!(q.orderby[0].direction, Some(SortDirection::Desc));
    assert!(q.orderby[0].nones_order.is_some());
    assert!(q.offset.is_some());
    assert!(q.limit.is_some());
}

#[test]
fn for_statement() {
    let Statement::For(q) = parse_ok("FOR x IN {1, 2, 3} UNION x + 1") else {
        panic!("expected for");
    };
    assert_eq!(q.iterator_alias.as_str(), "x");
}

#[test]
fn group_statement() {
    let Statement::Group(q) =
        parse_ok("GROUP User USING a := User.age BY User.age INTO count(User)")
    else {
        panic!("expected group");
    };
    assert_eq!(q.using.len(), 1);
    assert_eq!(q.by.len(), 1);
}

#[test]
fn insert_update_delete() {
    let Statement::Insert(q) = parse_ok("INSERT User { name := 'Alice' }") else {
        panic!("expected insert");
    };
    assert_eq!(q.shape.len(), 1);

    let Statement::Update(q) = parse_ok("UPDATE User FILTER User.age > 99 SET { name := 'x' }")
    else {
        panic!("expected update");
    };
    assert!(q.where_.is_some());
    assert_eq!(q.shape.len(), 1);

    let Statement::Delete(q) = parse_ok("DELETE User FILTER User.name = 'x'") else {
        panic!("expected delete");
    };
    assert!(q.where_.is_some());
}

#[test]
fn session_statements() {
    assert!(matches!(
        parse_ok("SET MODULE my.mod"),
        Statement::Session(SessionStmt::SetModule { .. })
    ));
    assert!(matches!(
        parse_ok("SET m := MODULE my.mod"),
        Statement::Session(SessionStmt::SetAlias { .. })
    ));
}

#[test]
fn parenthesized_subqueries() {
    let result = select_result("SELECT (SELECT 1)");
    assert!(matches!(result, Expr::Statement(..)));
}

#[test]
fn reserved_keyword_as_name_is_rejected() {
    let rendered = parse_err("WITH select := 1 SELECT 1");
    assert!(rendered.contains("reserved keyword"), "got: {rendered}");

    // Back-quoting makes the same word usable.
    parse_ok("WITH `select` := 1 SELECT 1");
}

#[test]
fn chained_comparisons_are_rejected() {
    let rendered = parse_err("SELECT 1 < 2 < 3");
    assert!(rendered.contains("chained"), "got: {rendered}");
}

#[test]
fn partial_paths_parse() {
    let expr = parse_fragment_ok(".name");
    let Expr::Path(path) = expr else {
        panic!("expected path");
    };
    assert!(path.partial);
}

#[test]
fn exists_parses_prefix() {
    assert!(matches!(
        select_result("SELECT EXISTS User.email"),
        Expr::Exists { .. }
    ));
}
