//! Shared clause compilation: FILTER, ORDER BY, OFFSET, and LIMIT.

use crate::ast::expr::{Expr as QlExpr, SortDirection, SortExpr};
use crate::compiler::context::Compiler;
use crate::compiler::error::CompileResult;
use crate::ir::{SetId, SortExprIr};

impl Compiler<'_> {
    /// Compiles a FILTER condition inside its own fence. Aggregates inside
    /// the filter may not unnest past it.
    pub(crate) fn compile_where_clause(
        &mut self,
        where_: Option<&QlExpr>,
    ) -> CompileResult<Option<SetId>> {
        let Some(where_) = where_ else {
            return Ok(None);
        };

        let set = self.in_fenced(|c| {
            let scope = c.current_scope();
            c.scope_tree.node_mut(scope).unnest_fence = true;
            c.ctx_mut().clause = Some("filter");
            let set = c.compile_expr(where_)?;
            Ok(c.scoped_set(set))
        })?;

        Ok(Some(set))
    }

    /// Compiles ORDER BY items. Each item gets its own fence and must be a
    /// singleton per iteration; the direction is normalized to an explicit
    /// `ASC` when absent.
    pub(crate) fn compile_orderby_clause(
        &mut self,
        sortexprs: &[SortExpr],
    ) -> CompileResult<Vec<SortExprIr>> {
        let mut result = Vec::new();

        for sortexpr in sortexprs {
            let set = self.in_fenced(|c| {
                let scope = c.current_scope();
                c.scope_tree.node_mut(scope).unnest_fence = true;
                c.ctx_mut().clause = Some("orderby");
                let set = c.compile_expr(&sortexpr.expr)?;
                let set = c.scoped_set(set);
                c.enforce_singleton(set)?;
                Ok(set)
            })?;

            result.push(SortExprIr {
                expr: set,
                direction: sortexpr.direction.unwrap_or(SortDirection::Asc),
                nones_order: sortexpr.nones_order,
            });
        }

        Ok(result)
    }

    /// Compiles an OFFSET or LIMIT operand: fenced (both operands are
    /// whole-set) and singleton-checked.
    pub(crate) fn compile_limit_offset_clause(
        &mut self,
        expr: Option<&QlExpr>,
    ) -> CompileResult<Option<SetId>> {
        let Some(expr) = expr else {
            return Ok(None);
        };

        let set = self.in_fenced(|c| {
            c.ctx_mut().clause = Some("offsetlimit");
            let set = c.compile_expr(expr)?;
            let set = c.scoped_set(set);
            c.enforce_singleton(set)?;
            Ok(set)
        })?;

        Ok(Some(set))
    }
}
