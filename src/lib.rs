//! Pure-Rust EdgeQL front end: lexer, parser, and schema-aware AST-to-IR
//! compiler with rich diagnostics.
//!
//! # Parse
//!
//! ```
//! use eql_compiler::parse;
//!
//! let result = parse("SELECT 40 + 2");
//! assert!(result.ast.is_some());
//! ```
//!
//! # Compile
//!
//! ```
//! use eql_compiler::schema::{QualName, SchemaBuilder};
//! use eql_compiler::{CompileOptions, compile_to_ir};
//!
//! let mut builder = SchemaBuilder::with_std();
//! builder.add_object_type(QualName::new("default", "User"), &[]);
//! let schema = builder.build();
//!
//! let ir = compile_to_ir("SELECT User", &schema, &CompileOptions::new())
//!     .expect("compilation succeeds");
//! assert!(!ir.ir.sets.is_empty());
//! ```
//!
//! # Normalize for serialization
//!
//! ```
//! use eql_compiler::ast::codegen::statement_to_source;
//! use eql_compiler::{optimize, parse};
//!
//! let stmt = parse("SELECT std::int64").ast.unwrap();
//! assert_eq!(statement_to_source(&optimize(stmt)), "SELECT int64");
//! ```

pub mod ast;
pub mod compiler;
pub mod diag;
pub mod ir;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod schema;

// Span primitives.
pub use ast::{Span, Spanned};

// Diagnostics.
pub use diag::{Diag, DiagLabel, DiagSeverity, LabelRole, SourceFile};

// Lexer.
pub use lexer::keywords::{is_reserved_keyword, is_unreserved_keyword};
pub use lexer::token::{Token, TokenKind};
pub use lexer::{Lexer, LexerResult, tokenize};

// Parser.
pub use parser::{
    BlockResult, FragmentResult, ParseResult, parse, parse_block, parse_fragment,
    parse_with_aliases,
};

// Compiler.
pub use compiler::{
    AnchorTarget, CompileError, CompileErrorKind, CompileOptions, CompileResult,
    compile_ast_fragment_to_ir, compile_ast_to_ir, compile_fragment_to_ir, compile_to_ir,
};
pub use ir::IrStatement;

// AST normalization.
pub use optimizer::{deoptimize, optimize};
