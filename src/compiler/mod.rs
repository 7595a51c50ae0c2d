//! The EdgeQL-to-IR compiler.
//!
//! The public entry points parse (when given text), set up a fresh
//! [`Compiler`], lower the AST, and run the finalization pass. The
//! compiler runs single-threaded per compilation unit; the schema is
//! consulted read-only and may be shared across concurrent compilations.

mod astutils;
mod clauses;
pub mod context;
pub mod error;
mod expr;
mod func;
mod pathctx;
mod schemactx;
mod setgen;
mod shape;
mod stmt;
mod stmtctx;

pub use context::Compiler;
pub use error::{CompileError, CompileErrorKind, CompileResult};
pub use stmtctx::AnchorTarget;

use crate::ast::stmt::Statement;
use crate::ir::IrStatement;
use crate::parser;
use crate::schema::{Schema, TypeRef};
use smol_str::SmolStr;

/// Options for a compilation: pre-bound anchors, parameter types, and
/// module aliases.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub anchors: Vec<(SmolStr, AnchorTarget)>,
    pub arg_types: Vec<(SmolStr, TypeRef)>,
    /// `(alias, module)`; a `None` alias overrides the default module.
    pub modaliases: Vec<(Option<SmolStr>, SmolStr)>,
    /// Name to give the top-level result view, when the consumer needs a
    /// stable derived type.
    pub result_view_name: Option<crate::schema::QualName>,
    /// Module for pointers derived by shape computables.
    pub derived_target_module: Option<SmolStr>,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_anchor(mut self, name: impl Into<SmolStr>, target: AnchorTarget) -> Self {
        self.anchors.push((name.into(), target));
        self
    }

    pub fn with_arg_type(mut self, name: impl Into<SmolStr>, ty: TypeRef) -> Self {
        self.arg_types.push((name.into(), ty));
        self
    }

    pub fn with_modalias(mut self, alias: Option<SmolStr>, module: impl Into<SmolStr>) -> Self {
        self.modaliases.push((alias, module.into()));
        self
    }
}

fn init_compiler<'s>(
    schema: &'s Schema,
    options: &CompileOptions,
) -> CompileResult<Compiler<'s>> {
    let mut compiler = Compiler::new(schema);

    for (alias, module) in &options.modaliases {
        match alias {
            Some(alias) => {
                compiler
                    .ctx_mut()
                    .namespaces
                    .insert(alias.clone(), module.clone());
            }
            None => compiler.ctx_mut().module = module.clone(),
        }
    }

    for (name, ty) in &options.arg_types {
        compiler.ctx_mut().arguments.insert(name.clone(), *ty);
    }

    compiler.ctx_mut().derived_target_module = options.derived_target_module.clone();
    compiler.ctx_mut().toplevel_result_view_name = options.result_view_name.clone();

    compiler.populate_anchors(&options.anchors)?;

    Ok(compiler)
}

/// Compiles EdgeQL source text into IR.
pub fn compile_to_ir(
    source: &str,
    schema: &Schema,
    options: &CompileOptions,
) -> CompileResult<IrStatement> {
    let result = parser::parse(source);
    let Some(ast) = result.ast else {
        let message = result
            .diagnostics
            .first()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "parse error".to_string());
        return Err(CompileError::new(CompileErrorKind::Syntax, message, None));
    };
    compile_ast_to_ir(&ast, schema, options)
}

/// Compiles an already-parsed statement into IR.
pub fn compile_ast_to_ir(
    ast: &Statement,
    schema: &Schema,
    options: &CompileOptions,
) -> CompileResult<IrStatement> {
    let mut compiler = init_compiler(schema, options)?;
    let root = compiler
        .compile_statement(ast)
        .map_err(|e| e.or_span(ast.span()))?;
    Ok(compiler.fini_expression(root))
}

/// Compiles an EdgeQL expression fragment into IR.
pub fn compile_fragment_to_ir(
    source: &str,
    schema: &Schema,
    options: &CompileOptions,
) -> CompileResult<IrStatement> {
    let result = parser::parse_fragment(source);
    let Some(ast) = result.ast else {
        let message = result
            .diagnostics
            .first()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "parse error".to_string());
        return Err(CompileError::new(CompileErrorKind::Syntax, message, None));
    };
    compile_ast_fragment_to_ir(&ast, schema, options)
}

/// Compiles an already-parsed expression fragment into IR.
pub fn compile_ast_fragment_to_ir(
    ast: &crate::ast::expr::Expr,
    schema: &Schema,
    options: &CompileOptions,
) -> CompileResult<IrStatement> {
    let mut compiler = init_compiler(schema, options)?;
    let root = compiler
        .compile_expr(ast)
        .map_err(|e| e.or_span(ast.span()))?;
    Ok(compiler.fini_expression(root))
}
