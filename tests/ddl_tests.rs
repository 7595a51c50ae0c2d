//! DDL parsing tests: the CREATE/ALTER/DROP surface for every entity kind.

mod common;

use common::{parse_err, parse_ok};
use eql_compiler::ast::ddl::{DdlObject, DdlOp, DdlSubcommand, Language, ParamKind};
use eql_compiler::ast::stmt::Statement;
use eql_compiler::parse_block;

fn parse_ddl(source: &str) -> (DdlOp, DdlObject) {
    match parse_ok(source) {
        Statement::Ddl(cmd) => (cmd.op, cmd.object),
        other => panic!("expected DDL, got {other:?}"),
    }
}

#[test]
fn create_module_and_database() {
    let (op, obj) = parse_ddl("CREATE MODULE my.nested.mod");
    assert_eq!(op, DdlOp::Create);
    let DdlObject::Module { name, .. } = obj else {
        panic!("expected module");
    };
    assert_eq!(name.name.as_str(), "my.nested.mod");

    let (_, obj) = parse_ddl("CREATE DATABASE main");
    assert!(matches!(obj, DdlObject::Database { .. }));
}

#[test]
fn create_migration_with_target() {
    let (_, obj) = parse_ddl("CREATE MIGRATION init TO eschema $$ type X $$");
    let DdlObject::Migration { target, .. } = obj else {
        panic!("expected migration");
    };
    let target = target.expect("target present");
    assert_eq!(target.language, Language::Eschema);
    assert_eq!(target.code.trim(), "type X");
}

#[test]
fn migration_rejects_unknown_language() {
    let rendered = parse_err("CREATE MIGRATION init TO perl $$ x $$");
    assert!(rendered.contains("unknown migration language"), "{rendered}");
}

#[test]
fn create_scalar_type() {
    let (_, obj) = parse_ddl("CREATE ABSTRACT SCALAR TYPE length EXTENDING std::anyreal");
    let DdlObject::ScalarType {
        abstract_,
        extending,
        ..
    } = obj
    else {
        panic!("expected scalar type");
    };
    assert!(abstract_);
    assert_eq!(extending.len(), 1);
}

#[test]
fn create_object_type_with_pointers() {
    let (_, obj) = parse_ddl(
        "CREATE TYPE Widget EXTENDING Named { \
           CREATE REQUIRED LINK owner -> User; \
           CREATE LINK PROPERTY note -> std::str; \
           SET title := 'widget'; \
         }",
    );
    let DdlObject::ObjectType {
        extending,
        commands,
        ..
    } = obj
    else {
        panic!("expected object type");
    };
    assert_eq!(extending.len(), 1);
    assert_eq!(commands.len(), 3);

    let DdlSubcommand::Nested(link_cmd) = &commands[0] else {
        panic!("expected nested link command");
    };
    let DdlObject::Link {
        required, target, ..
    } = &link_cmd.object
    else {
        panic!("expected link");
    };
    assert!(required);
    assert!(target.is_some());

    assert!(matches!(
        &commands[1],
        DdlSubcommand::Nested(cmd) if matches!(cmd.object, DdlObject::LinkProperty { .. })
    ));
    assert!(matches!(&commands[2], DdlSubcommand::SetField { .. }));
}

#[test]
fn create_view_attribute_constraint_action_event() {
    let (_, obj) = parse_ddl("CREATE VIEW Tops := (SELECT User FILTER User.age > 90)");
    let DdlObject::View { expr, .. } = obj else {
        panic!("expected view");
    };
    assert!(expr.is_some());

    let (_, obj) = parse_ddl("CREATE ATTRIBUTE description std::str");
    assert!(matches!(obj, DdlObject::Attribute { ty: Some(_), .. }));

    let (_, obj) = parse_ddl("CREATE ABSTRACT CONSTRAINT maxlength EXTENDING std::constraint");
    assert!(matches!(obj, DdlObject::Constraint { .. }));

    let (_, obj) = parse_ddl("CREATE ACTION audit");
    assert!(matches!(obj, DdlObject::Action { .. }));

    let (_, obj) = parse_ddl("CREATE EVENT on_update EXTENDING base_event");
    assert!(matches!(obj, DdlObject::Event { .. }));
}

#[test]
fn create_function_with_params_and_body() {
    let (_, obj) = parse_ddl(
        "CREATE FUNCTION shorten(s: std::str, max: std::int64 = 80) -> std::str \
         FROM SQL $$ SELECT left(s, max) $$",
    );
    let DdlObject::Function {
        params,
        aggregate,
        body,
        ..
    } = obj
    else {
        panic!("expected function");
    };
    assert!(!aggregate);
    assert_eq!(params.len(), 2);
    assert_eq!(params[0].name.as_deref(), Some("s"));
    assert_eq!(params[0].kind, ParamKind::Positional);
    assert!(params[1].default.is_some());
    assert_eq!(body.expect("body").language, Language::Sql);
}

#[test]
fn create_aggregate_with_set_of_and_initial_value() {
    let (_, obj) = parse_ddl(
        "CREATE AGGREGATE total(SET OF std::int64) -> std::int64 \
         INITIAL VALUE 0 FROM SQL $$ sum $$",
    );
    let DdlObject::Function {
        params,
        aggregate,
        initial_value,
        ..
    } = obj
    else {
        panic!("expected aggregate");
    };
    assert!(aggregate);
    assert_eq!(params[0].kind, ParamKind::SetOf);
    assert!(initial_value.is_some());
}

#[test]
fn function_param_qualifiers() {
    let (_, obj) = parse_ddl(
        "CREATE FUNCTION f(OPTIONAL a: std::str, VARIADIC b: std::int64) -> std::bool \
         FROM EdgeQL $$ SELECT TRUE $$",
    );
    let DdlObject::Function { params, body, .. } = obj else {
        panic!("expected function");
    };
    assert_eq!(params[0].kind, ParamKind::Optional);
    assert!(!params[0].named_only);
    assert_eq!(params[1].kind, ParamKind::Variadic);
    assert_eq!(body.expect("body").language, Language::EdgeQL);
}

#[test]
fn named_only_parameters() {
    let (_, obj) = parse_ddl(
        "CREATE FUNCTION pad(text: std::str, NAMED ONLY fill: std::str = ' ') -> std::str \
         FROM SQL $$ rpad $$",
    );
    let DdlObject::Function { params, .. } = obj else {
        panic!("expected function");
    };
    assert!(!params[0].named_only);
    assert!(params[1].named_only);
    assert_eq!(params[1].name.as_deref(), Some("fill"));
    assert!(params[1].default.is_some());

    let rendered = parse_err(
        "CREATE FUNCTION f(NAMED x: std::str) -> std::str FROM SQL $$ y $$",
    );
    assert!(rendered.contains("expected ONLY after NAMED"), "{rendered}");
}

#[test]
fn function_rejects_unknown_language() {
    let rendered = parse_err(
        "CREATE FUNCTION f() -> std::bool FROM perl $$ true $$",
    );
    assert!(rendered.contains("unknown function language"), "{rendered}");
}

#[test]
fn alter_blocks() {
    let (op, obj) = parse_ddl(
        "ALTER TYPE User { \
           RENAME TO Person; \
           SET title := 'person'; \
           DROP LINK friends; \
           DROP old_field; \
         }",
    );
    assert_eq!(op, DdlOp::Alter);
    let DdlObject::ObjectType { commands, .. } = obj else {
        panic!("expected object type");
    };
    assert_eq!(commands.len(), 4);
    assert!(matches!(&commands[0], DdlSubcommand::RenameTo { .. }));
    assert!(matches!(&commands[1], DdlSubcommand::SetField { .. }));
    assert!(matches!(
        &commands[2],
        DdlSubcommand::Nested(cmd) if cmd.op == DdlOp::Drop
    ));
    assert!(matches!(&commands[3], DdlSubcommand::DropField { .. }));
}

#[test]
fn alter_requires_a_block() {
    let rendered = parse_err("ALTER TYPE User");
    assert!(rendered.contains("braced command block"), "{rendered}");
}

#[test]
fn drop_statements() {
    for source in [
        "DROP MODULE my.mod",
        "DROP TYPE User",
        "DROP LINK friends",
        "DROP LINK PROPERTY weight",
        "DROP VIEW Tops",
        "DROP EVENT on_update",
    ] {
        let result = eql_compiler::parse(source);
        assert!(
            result.ast.is_some(),
            "{source:?} failed:\n{}",
            common::format_reports(&result.diagnostics)
        );
    }
}

#[test]
fn ddl_block_with_queries() {
    let result = parse_block(
        "CREATE MODULE app; CREATE TYPE app::Thing; SELECT 1;",
    );
    let stmts = result.ast.expect("block parses");
    assert_eq!(stmts.len(), 3);
    assert!(matches!(stmts[0], Statement::Ddl(_)));
    assert!(matches!(stmts[2], Statement::Select(_)));
}

#[test]
fn with_block_before_ddl_is_rejected() {
    let rendered = parse_err("WITH MODULE app CREATE TYPE Thing");
    assert!(rendered.contains("not allowed"), "{rendered}");
}
