//! Shared test fixtures: the sample schema and parse/compile helpers.
#![allow(dead_code)]

use eql_compiler::compiler::{CompileError, CompileOptions, compile_to_ir};
use eql_compiler::ast::stmt::Statement;
use eql_compiler::ir::IrStatement;
use eql_compiler::schema::{PtrCardinality, QualName, Schema, SchemaBuilder};
use eql_compiler::{parse, parse_fragment};

/// The fixture catalog used across compiler tests:
///
/// - virtual `Named` with a `name` property,
/// - `User` extending `Named` with `age`, `email`, a many-to-many
///   `friends` link carrying a `weight` link property, a single
///   `best_friend` link, and a computed `name_upper` property,
/// - `SpecialUser` extending `User`,
/// - `Post` extending `Named` with `body` and a single `author` link,
/// - stored view `RecentPosts`.
pub fn test_schema() -> Schema {
    let mut b = SchemaBuilder::with_std();

    let str_ty = b.get_type("std", "str");
    let int64 = b.get_type("std", "int64");
    let float64 = b.get_type("std", "float64");

    let named = b.add_virtual_object_type(QualName::new("default", "Named"), &[]);
    b.add_property(named, QualName::new("default", "name"), str_ty);

    let user = b.add_object_type(QualName::new("default", "User"), &[named]);
    b.add_property(user, QualName::new("default", "age"), int64);
    b.add_property(user, QualName::new("default", "email"), str_ty);
    let friends = b.add_link(
        user,
        QualName::new("default", "friends"),
        user,
        PtrCardinality::ManyToMany,
    );
    b.add_link_property(friends, QualName::new("default", "weight"), float64);
    b.add_link(
        user,
        QualName::new("default", "best_friend"),
        user,
        PtrCardinality::ManyToOne,
    );
    b.add_computable(
        user,
        QualName::new("default", "name_upper"),
        str_ty,
        "upper(self.name)",
    );

    b.add_object_type(QualName::new("default", "SpecialUser"), &[user]);

    let post = b.add_object_type(QualName::new("default", "Post"), &[named]);
    b.add_property(post, QualName::new("default", "body"), str_ty);
    b.add_link(
        post,
        QualName::new("default", "author"),
        user,
        PtrCardinality::ManyToOne,
    );

    b.add_view(
        QualName::new("default", "RecentPosts"),
        post,
        "SELECT Post FILTER Post.body != ''",
    );

    b.build()
}

/// Parses a statement, panicking on diagnostics.
pub fn parse_ok(source: &str) -> Statement {
    let result = parse(source);
    assert!(
        result.diagnostics.is_empty(),
        "unexpected diagnostics for {source:?}:\n{}",
        format_reports(&result.diagnostics)
    );
    result.ast.expect("no AST despite clean diagnostics")
}

/// Parses an expression fragment, panicking on diagnostics.
pub fn parse_fragment_ok(source: &str) -> eql_compiler::ast::expr::Expr {
    let result = parse_fragment(source);
    assert!(
        result.diagnostics.is_empty(),
        "unexpected diagnostics for {source:?}:\n{}",
        format_reports(&result.diagnostics)
    );
    result.ast.expect("no AST despite clean diagnostics")
}

/// Asserts that a statement fails to parse and returns the rendered
/// diagnostics.
pub fn parse_err(source: &str) -> String {
    let result = parse(source);
    assert!(
        result.ast.is_none() || !result.diagnostics.is_empty(),
        "expected a parse failure for {source:?}"
    );
    format_reports(&result.diagnostics)
}

/// Compiles source against the fixture schema, panicking on failure.
pub fn compile(source: &str) -> IrStatement {
    let schema = test_schema();
    compile_to_ir(source, &schema, &CompileOptions::new())
        .unwrap_or_else(|err| panic!("compilation of {source:?} failed: {err}"))
}

/// Compiles source expecting failure.
pub fn compile_err(source: &str) -> CompileError {
    let schema = test_schema();
    match compile_to_ir(source, &schema, &CompileOptions::new()) {
        Ok(_) => panic!("expected compilation of {source:?} to fail"),
        Err(err) => err,
    }
}

pub fn format_reports(reports: &[miette::Report]) -> String {
    reports
        .iter()
        .map(|r| format!("{r:?}"))
        .collect::<Vec<_>>()
        .join("\n")
}
