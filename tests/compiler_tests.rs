//! Compiler integration tests: lowering, interning, folding, scoping, and
//! statement semantics against the fixture schema.

mod common;

use common::{compile, compile_err, test_schema};
use eql_compiler::ast::expr::BinOpKind;
use eql_compiler::compiler::{CompileErrorKind, CompileOptions, compile_fragment_to_ir, compile_to_ir};
use eql_compiler::ir::{ConstValue, Expr, IrStatement, SetId, StmtKind};
use eql_compiler::schema::{QualName, TypeRef, type_of};

/// The result set of the root statement.
fn root_result(ir: &IrStatement) -> SetId {
    let stmt = ir.root_stmt().expect("root must be a statement");
    ir.ir.stmt_result(stmt).expect("statement must have a result")
}

fn type_name(ir: &IrStatement, ty: TypeRef) -> String {
    type_of(&test_schema(), &ir.derived, ty).name.to_string()
}

#[test]
fn constant_folding_collapses_addition() {
    // SELECT 40 + 2 compiles to a single constant; no BinOp remains.
    let ir = compile("SELECT 40 + 2;");
    let result = root_result(&ir);
    match &ir.ir.set(result).expr {
        Some(Expr::Constant {
            value: ConstValue::Int(42),
            ty,
        }) => {
            assert_eq!(type_name(&ir, *ty), "std::int64");
        }
        other => panic!("expected folded Constant(42), got {other:?}"),
    }
}

#[test]
fn unary_sign_folds_on_constants() {
    let ir = compile("SELECT -3");
    let result = root_result(&ir);
    assert!(matches!(
        &ir.ir.set(result).expr,
        Some(Expr::Constant {
            value: ConstValue::Int(-3),
            ..
        })
    ));

    let ir = compile("SELECT +3");
    let result = root_result(&ir);
    assert!(matches!(
        &ir.ir.set(result).expr,
        Some(Expr::Constant {
            value: ConstValue::Int(3),
            ..
        })
    ));
}

#[test]
fn constant_reassociation_folds_across_variables() {
    // 1 + (2 + User.age) refolds the constant pair.
    let ir = compile("SELECT 1 + (2 + User.age)");
    let result = root_result(&ir);
    let Some(Expr::BinOp { left, .. }) = &ir.ir.set(result).expr else {
        panic!("expected a binop");
    };
    assert!(matches!(
        &ir.ir.set(*left).expr,
        Some(Expr::Constant {
            value: ConstValue::Int(3),
            ..
        })
    ));
}

#[test]
fn path_interning_shares_sets() {
    // Two occurrences of User.name are the same Set instance.
    let ir = compile("SELECT (User.name, User.name);");
    let result = root_result(&ir);
    let Some(Expr::Tuple { elements, .. }) = &ir.ir.set(result).expr else {
        panic!("expected a tuple");
    };
    assert_eq!(elements.len(), 2);
    assert_eq!(
        elements[0].val, elements[1].val,
        "same canonical path must yield the same set"
    );
}

#[test]
fn prefix_sharing_across_longer_paths() {
    let ir = compile("SELECT (User.best_friend.name, User.best_friend.age)");
    let result = root_result(&ir);
    let Some(Expr::Tuple { elements, .. }) = &ir.ir.set(result).expr else {
        panic!("expected a tuple");
    };
    let first = ir.ir.set(elements[0].val).rptr.as_ref().unwrap().source;
    let second = ir.ir.set(elements[1].val).rptr.as_ref().unwrap().source;
    assert_eq!(first, second, "shared prefix must be one set");
}

#[test]
fn degenerate_select_compiles_to_bare_path() {
    let schema = test_schema();
    let stmt_ir = compile_to_ir("SELECT User", &schema, &CompileOptions::new()).unwrap();
    let frag_ir = compile_fragment_to_ir("User", &schema, &CompileOptions::new()).unwrap();

    let stmt_root = stmt_ir.ir.set(stmt_ir.root);
    let frag_root = frag_ir.ir.set(frag_ir.root);

    assert!(stmt_ir.root_stmt().is_none(), "no wrapping statement");
    assert!(stmt_root.expr.is_none());
    assert_eq!(stmt_root.path_id, frag_root.path_id);
    assert_eq!(stmt_root.ty, frag_root.ty);
}

#[test]
fn exists_negation_folds_into_predicate() {
    let ir = compile("SELECT NOT EXISTS User.email;");
    let result = root_result(&ir);
    match &ir.ir.set(result).expr {
        Some(Expr::ExistsPred { expr, negated }) => {
            assert!(*negated, "negation must fold into the predicate");
            let operand = ir.ir.set(*expr);
            let rptr = operand.rptr.as_ref().expect("operand is a path");
            let _ = rptr;
        }
        other => panic!("expected a single ExistsPred, got {other:?}"),
    }
}

#[test]
fn union_is_left_associative_in_ir() {
    let ir = compile("SELECT 1 UNION 2 UNION 3;");
    let result = root_result(&ir);
    let Some(Expr::SetOp {
        left, exclusive, ..
    }) = &ir.ir.set(result).expr
    else {
        panic!("expected a set operation");
    };
    assert!(!exclusive);

    // The left operand statement's result is itself a UNION.
    let left_result = ir.ir.stmt_result(*left).unwrap();
    assert!(matches!(
        &ir.ir.set(left_result).expr,
        Some(Expr::SetOp { .. })
    ));
}

#[test]
fn set_literal_desugars_to_union_chain() {
    let ir = compile("SELECT {1, 2, 3}");
    let result = root_result(&ir);
    assert!(matches!(&ir.ir.set(result).expr, Some(Expr::SetOp { .. })));
}

#[test]
fn ifelse_desugars_to_exclusive_union() {
    let ir = compile("SELECT 1 IF TRUE ELSE 2");
    let result = root_result(&ir);
    let Some(Expr::SetOp { exclusive, .. }) = &ir.ir.set(result).expr else {
        panic!("expected a set operation");
    };
    assert!(exclusive, "IF/ELSE branches cannot overlap");
}

#[test]
fn ifelse_of_unrelated_types_is_rejected() {
    let err = compile_err("SELECT 1 IF TRUE ELSE User");
    assert_eq!(err.kind, CompileErrorKind::Type);
}

#[test]
fn equivalence_desugars_to_ifelse_over_exists() {
    let ir = compile("SELECT User.name ?= User.email");
    let result = root_result(&ir);
    assert!(matches!(
        &ir.ir.set(result).expr,
        Some(Expr::SetOp {
            exclusive: true,
            ..
        })
    ));
}

#[test]
fn shape_compilation_adds_implicit_id() {
    // SELECT User { name } FILTER .age > 30
    let ir = compile("SELECT User { name } FILTER .age > 30;");
    let stmt = ir.root_stmt().unwrap();
    let StmtKind::Select(select) = &ir.ir.stmt(stmt).kind else {
        panic!("expected select");
    };

    let result = select.result.unwrap();
    let shape = &ir.ir.set(result).shape;
    assert_eq!(shape.len(), 2, "implicit id plus name");

    // The result type is a derived view over User.
    assert!(matches!(ir.ir.set(result).ty, TypeRef::Derived(_)));

    // The filter compiled the partial path against the subject.
    let where_ = select.where_.expect("filter present");
    let Some(Expr::BinOp { left, op, right }) = &ir.ir.set(where_).expr else {
        panic!("expected comparison in filter");
    };
    assert_eq!(*op, BinOpKind::Gt);
    assert!(ir.ir.set(*left).rptr.is_some(), "left side is User.age");
    assert!(matches!(
        &ir.ir.set(*right).expr,
        Some(Expr::Constant {
            value: ConstValue::Int(30),
            ..
        })
    ));
}

#[test]
fn nested_shapes_and_link_properties() {
    let ir = compile("SELECT User { name, friends: { name, @weight } }");
    let stmt = ir.root_stmt().unwrap();
    let result = ir.ir.stmt_result(stmt).unwrap();
    let shape = &ir.ir.set(result).shape;
    assert_eq!(shape.len(), 3, "id, name, friends");

    let friends = shape[2];
    let nested = &ir.ir.set(friends).shape;
    // Implicit id, name, @weight.
    assert_eq!(nested.len(), 3);
}

#[test]
fn shape_computables_derive_pointers() {
    let ir = compile("SELECT User { upper_name := upper(User.name) }");
    let stmt = ir.root_stmt().unwrap();
    let result = ir.ir.stmt_result(stmt).unwrap();
    let shape = &ir.ir.set(result).shape;
    // Implicit id plus the computable.
    assert_eq!(shape.len(), 2);
    let computed = ir.ir.set(shape[1]);
    assert!(computed.expr.is_some(), "computable carries its own IR");
    assert!(computed.rptr.is_some(), "computable hangs off a pointer");
}

#[test]
fn shape_element_clauses_wrap_in_substatement() {
    let ir = compile("SELECT User { friends FILTER .age > 20 LIMIT 3 }");
    let stmt = ir.root_stmt().unwrap();
    let result = ir.ir.stmt_result(stmt).unwrap();
    let shape = &ir.ir.set(result).shape;
    let friends = ir.ir.set(shape[1]);
    let Some(Expr::Stmt(sub)) = &friends.expr else {
        panic!("clauses must wrap the element in a statement");
    };
    let StmtKind::Select(sub_select) = &ir.ir.stmt(*sub).kind else {
        panic!("expected select wrapper");
    };
    assert!(sub_select.where_.is_some());
    assert!(sub_select.limit.is_some());
}

#[test]
fn computable_pointers_expand_in_paths() {
    // name_upper is a stored computable: upper(self.name).
    let ir = compile("SELECT User.name_upper");
    let root = ir.ir.set(ir.root);
    assert!(
        matches!(&root.expr, Some(Expr::Stmt(_))),
        "computable expands to its compiled expression"
    );
    assert!(root.rptr.is_some(), "still reachable as a pointer step");
}

#[test]
fn type_check_steps_through_class() {
    let ir = compile("SELECT User IS SpecialUser");
    let result = root_result(&ir);
    let Some(Expr::BinOp { left, op, right }) = &ir.ir.set(result).expr else {
        panic!("expected binop");
    };
    assert_eq!(*op, BinOpKind::Is);
    assert!(
        ir.ir.set(*left).rptr.is_some(),
        "left side must step through __class__"
    );
    assert!(matches!(
        &ir.ir.set(*right).expr,
        Some(Expr::TypeRefExpr { .. })
    ));
}

#[test]
fn membership_attaches_traced_scope() {
    let ir = compile("SELECT User.age IN {18, 21}");
    let result = root_result(&ir);
    assert!(matches!(
        &ir.ir.set(result).expr,
        Some(Expr::BinOp {
            op: BinOpKind::In,
            ..
        })
    ));
    assert!(
        !ir.ir.set(result).path_scope.is_empty(),
        "membership records its traced paths"
    );
}

#[test]
fn tuple_indirection_and_types() {
    let ir = compile("SELECT (1, 'a').0");
    let result = root_result(&ir);
    let node = ir.ir.set(result);
    assert!(matches!(
        &node.expr,
        Some(Expr::TupleIndirection { name, .. }) if name == "0"
    ));
    assert_eq!(type_name(&ir, node.ty), "std::int64");
}

#[test]
fn slices_fill_missing_bounds_with_empty_constants() {
    let ir = compile("SELECT User.name[1:]");
    let result = root_result(&ir);
    let Some(Expr::SliceIndirection { stop, .. }) = &ir.ir.set(result).expr else {
        panic!("expected slice");
    };
    assert!(matches!(
        &ir.ir.set(*stop).expr,
        Some(Expr::Constant {
            value: ConstValue::Empty,
            ..
        })
    ));
}

#[test]
fn casts() {
    let ir = compile("SELECT <str>42");
    let result = root_result(&ir);
    let node = ir.ir.set(result);
    assert!(matches!(&node.expr, Some(Expr::TypeCast { .. })));
    assert_eq!(type_name(&ir, node.ty), "std::str");

    let ir = compile("SELECT <array<int64>>[]");
    let result = root_result(&ir);
    assert!(matches!(
        &ir.ir.set(result).expr,
        Some(Expr::EmptyCollection { .. })
    ));
}

#[test]
fn tuple_cast_expands_elementwise() {
    let ir = compile("SELECT <tuple<str, str>>('a', 'b')");
    let result = root_result(&ir);
    let Some(Expr::Tuple { elements, .. }) = &ir.ir.set(result).expr else {
        panic!("tuple casts expand into a new tuple");
    };
    assert_eq!(elements.len(), 2);
    assert!(matches!(
        &ir.ir.set(elements[0].val).expr,
        Some(Expr::TupleIndirection { .. })
    ));
}

#[test]
fn empty_collection_without_cast_is_rejected() {
    let err = compile_err("SELECT []");
    assert_eq!(err.kind, CompileErrorKind::Expression);
}

#[test]
fn empty_set_literal_compiles() {
    let ir = compile("SELECT {}");
    let result = root_result(&ir);
    assert!(matches!(&ir.ir.set(result).expr, Some(Expr::EmptySet)));
}

#[test]
fn function_dispatch_and_aggregates() {
    let ir = compile("SELECT count(User)");
    let result = root_result(&ir);
    let Some(Expr::FunctionCall {
        initial_value,
        args,
        ..
    }) = &ir.ir.set(result).expr
    else {
        panic!("expected function call");
    };
    assert_eq!(args.len(), 1);
    assert!(
        initial_value.is_some(),
        "aggregates compile their initial value"
    );
    assert_eq!(type_name(&ir, ir.ir.set(result).ty), "std::int64");
}

#[test]
fn function_overload_failure_is_reference_error() {
    let err = compile_err("SELECT len(User)");
    assert_eq!(err.kind, CompileErrorKind::Reference);
    assert!(err.message.contains("function variant"));
}

#[test]
fn unknown_function_is_reference_error() {
    let err = compile_err("SELECT frobnicate(1)");
    assert_eq!(err.kind, CompileErrorKind::Reference);
    assert!(err.message.contains("could not resolve function name"));
}

#[test]
fn aggregate_argument_modifiers_desugar() {
    let ir = compile("SELECT count(User FILTER User.age > 10)");
    let result = root_result(&ir);
    let Some(Expr::FunctionCall { args, .. }) = &ir.ir.set(result).expr else {
        panic!("expected function call");
    };
    // The argument became a substatement with the filter inside.
    assert!(matches!(
        &ir.ir.set(args[0]).expr,
        Some(Expr::Stmt(_))
    ));
}

#[test]
fn variadic_dispatch() {
    compile("SELECT any(TRUE, FALSE, TRUE)");
    compile("SELECT any(TRUE)");
}

#[test]
fn distinct_lowers_to_unary_op() {
    use eql_compiler::ast::expr::UnaryOpKind;

    let ir = compile("SELECT DISTINCT User.name");
    let result = root_result(&ir);
    let node = ir.ir.set(result);
    let Some(Expr::UnaryOp { op, operand }) = &node.expr else {
        panic!("expected a unary op, got {:?}", node.expr);
    };
    assert_eq!(*op, UnaryOpKind::Distinct);
    // DISTINCT keeps the operand's type.
    assert_eq!(type_name(&ir, node.ty), "std::str");
    assert!(ir.ir.set(*operand).rptr.is_some(), "operand is User.name");
}

#[test]
fn array_agg_dispatches_as_aggregate() {
    let ir = compile("SELECT array_agg(User.name)");
    let result = root_result(&ir);
    let Some(Expr::FunctionCall { args, .. }) = &ir.ir.set(result).expr else {
        panic!("expected function call");
    };
    assert_eq!(args.len(), 1);
    assert_eq!(type_name(&ir, ir.ir.set(result).ty), "std::array");
}

#[test]
fn named_only_params_require_keyword_arguments() {
    use eql_compiler::schema::{Param, ParamMode, QualName, SchemaBuilder};

    let mut b = SchemaBuilder::with_std();
    let str_ty = b.get_type("std", "str");
    b.add_function(
        QualName::new("default", "pad"),
        vec![
            Param {
                name: Some("text".into()),
                ty: str_ty,
                mode: ParamMode::Positional,
                named_only: false,
                default: None,
            },
            Param {
                name: Some("fill".into()),
                ty: str_ty,
                mode: ParamMode::Positional,
                named_only: true,
                default: Some("' '".to_string()),
            },
        ],
        str_ty,
        false,
        None,
    );
    let schema = b.build();

    // The keyword form and the defaulted form dispatch.
    compile_to_ir("SELECT pad('x', fill := '.')", &schema, &CompileOptions::new())
        .expect("keyword argument binds the named-only parameter");
    compile_to_ir("SELECT pad('x')", &schema, &CompileOptions::new())
        .expect("named-only parameter falls back to its default");

    // Passing it positionally does not.
    let err = compile_to_ir("SELECT pad('x', '.')", &schema, &CompileOptions::new())
        .unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Reference);
    assert!(err.message.contains("function variant"));
}

#[test]
fn orderby_requires_singletons() {
    // Single-valued per subject: fine.
    compile("SELECT User ORDER BY User.name");

    // friends is many-valued per subject: rejected.
    let err = compile_err("SELECT User ORDER BY User.friends.name");
    assert_eq!(err.kind, CompileErrorKind::Cardinality);
}

#[test]
fn offset_limit_compile_behind_fences() {
    let ir = compile("SELECT User OFFSET 2 LIMIT 3");
    let stmt = ir.root_stmt().unwrap();
    let StmtKind::Select(select) = &ir.ir.stmt(stmt).kind else {
        panic!("expected select");
    };
    assert!(select.offset.is_some());
    assert!(select.limit.is_some());
}

#[test]
fn with_views_bind_and_intern() {
    let ir = compile("WITH U := User SELECT U FILTER U.age > 30");
    let stmt = ir.root_stmt().unwrap();
    let StmtKind::Select(select) = &ir.ir.stmt(stmt).kind else {
        panic!("expected select");
    };
    assert!(select.where_.is_some());
    // The view registered under its schema name.
    assert!(!ir.views.is_empty());
}

#[test]
fn weak_namespaces_are_stripped_from_final_ir() {
    let ir = compile("WITH U := User SELECT U FILTER U.age > 30");
    for set in &ir.ir.sets {
        assert!(
            set.path_id.namespace().iter().all(|ns| !ns.is_weak()),
            "weak namespaces must not survive finalization"
        );
    }
}

#[test]
fn schema_views_materialize() {
    let ir = compile("SELECT RecentPosts");
    assert!(
        ir.ir.sets.len() > 1,
        "view materialization compiles the stored body"
    );
}

#[test]
fn for_statement_binds_iterator() {
    let ir = compile("FOR x IN {1, 2} UNION x + 1");
    let stmt = ir.root_stmt().unwrap();
    let StmtKind::Select(select) = &ir.ir.stmt(stmt).kind else {
        panic!("expected select body");
    };
    assert!(select.iterator.is_some(), "FOR carries its iterator");
    assert!(select.result.is_some());
}

#[test]
fn group_statement_compiles() {
    let ir = compile("GROUP User BY User.age INTO count(User)");
    let stmt = ir.root_stmt().unwrap();
    let StmtKind::Group(group) = &ir.ir.stmt(stmt).kind else {
        panic!("expected group");
    };
    assert!(group.subject.is_some());
    assert_eq!(group.groupby.len(), 1);
    assert!(group.result.is_some());
    assert!(group.group_path_id.is_some());
}

#[test]
fn insert_compiles_shape() {
    let ir = compile("INSERT User { name := 'Alice', age := 30 }");
    let stmt = ir.root_stmt().unwrap();
    let StmtKind::Insert(insert) = &ir.ir.stmt(stmt).kind else {
        panic!("expected insert");
    };
    let subject = insert.subject.unwrap();
    assert_eq!(ir.ir.set(subject).shape.len(), 2);
    assert!(insert.result.is_some());
}

#[test]
fn insert_unknown_pointer_is_rejected() {
    let err = compile_err("INSERT User { nickname := 'x' }");
    assert_eq!(err.kind, CompileErrorKind::Reference);
    assert!(err.message.contains("unknown pointer"));
}

#[test]
fn insert_non_object_is_rejected() {
    let err = compile_err("INSERT int64");
    assert_eq!(err.kind, CompileErrorKind::Expression);
}

#[test]
fn update_compiles_filter_and_shape() {
    let ir = compile("UPDATE User FILTER User.age > 99 SET { name := 'old' }");
    let stmt = ir.root_stmt().unwrap();
    let StmtKind::Update(update) = &ir.ir.stmt(stmt).kind else {
        panic!("expected update");
    };
    assert!(update.subject.is_some());
    assert!(update.where_.is_some());
    assert!(update.result.is_some());
}

#[test]
fn delete_keeps_subject_path_id() {
    let ir = compile("DELETE User FILTER User.name = 'x'");
    let stmt = ir.root_stmt().unwrap();
    let StmtKind::Delete(delete) = &ir.ir.stmt(stmt).kind else {
        panic!("expected delete");
    };
    let subject = delete.subject.unwrap();
    let result = delete.result.unwrap();
    assert_eq!(
        ir.ir.set(subject).path_id,
        ir.ir.set(result).path_id,
        "delete result shares the subject's path id"
    );
}

#[test]
fn parameters_take_declared_types() {
    let schema = test_schema();
    let str_ty = TypeRef::Schema(schema.get(&QualName::new("std", "str")).unwrap());
    let options = CompileOptions::new().with_arg_type("who", str_ty);

    let ir = compile_to_ir("SELECT User FILTER User.name = $who", &schema, &options)
        .expect("parameterized query compiles");
    assert_eq!(ir.params.len(), 1);

    let err = compile_to_ir(
        "SELECT User FILTER User.name = $who",
        &schema,
        &CompileOptions::new(),
    )
    .unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Expression);
}

#[test]
fn anchors_resolve_as_roots() {
    let schema = test_schema();
    let user = TypeRef::Schema(schema.get(&QualName::new("default", "User")).unwrap());
    let options = CompileOptions::new()
        .with_anchor("self", eql_compiler::AnchorTarget::Type(user));

    let ir = compile_fragment_to_ir("self.name", &schema, &options)
        .expect("anchored fragment compiles");
    let root = ir.ir.set(ir.root);
    assert!(root.rptr.is_some());
}

#[test]
fn unknown_names_are_reference_errors_with_spans() {
    let err = compile_err("SELECT Nonexistent");
    assert_eq!(err.kind, CompileErrorKind::Reference);
    assert!(err.span.is_some());

    let err = compile_err("SELECT User.nonexistent");
    assert_eq!(err.kind, CompileErrorKind::Reference);
    assert!(err.message.contains("does not resolve"));
}

#[test]
fn backlink_traversal() {
    let ir = compile("SELECT User.<author");
    let root = ir.ir.set(ir.root);
    assert!(root.rptr.is_some());
    assert_eq!(type_name(&ir, root.ty), "default::Post");
}

#[test]
fn type_inference_is_idempotent() {
    use eql_compiler::ir::infer::{InferCtx, infer_type};

    let schema = test_schema();
    let ir = compile_to_ir("SELECT 1 + 2.5", &schema, &CompileOptions::new()).unwrap();
    let result = root_result(&ir);

    let ctx = InferCtx {
        schema: &schema,
        derived: &ir.derived,
        ir: &ir.ir,
    };
    let first = infer_type(ctx, result).unwrap();
    let second = infer_type(ctx, result).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        type_of(&schema, &ir.derived, first).name.to_string(),
        "std::float64"
    );
}

#[test]
fn ddl_statements_do_not_lower_to_ir() {
    let err = compile_err("CREATE TYPE Widget");
    assert_eq!(err.kind, CompileErrorKind::Expression);
}
