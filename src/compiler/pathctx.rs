//! Path-scope bookkeeping: registration, correlation, and singleton
//! tracking.

use crate::compiler::context::Compiler;
use crate::compiler::error::{CompileError, CompileResult};
use crate::ir::infer::{Cardinality, InferCtx, infer_cardinality};
use crate::ir::{Expr, PathId, SetId};
use indexmap::IndexSet;

impl Compiler<'_> {
    /// Registers a path id (and all its prefixes) in the current scope.
    ///
    /// Prefixes that extend a GROUP BY path are skipped: grouped paths are
    /// re-bound by the grouping and must not leak into the plain scope.
    pub(crate) fn register_path_scope(&mut self, path_id: &PathId) {
        if self.ctx().path_as_type {
            return;
        }

        let group_paths = self.ctx().group_paths.clone();
        let scope = self.ctx().scope;

        for prefix in path_id.iter_prefixes() {
            if prefix.starts_any_of(group_paths.iter()) {
                continue;
            }
            let ctx = self.ctx_mut();
            ctx.path_scope.insert(prefix.clone());
            ctx.stmt_local_path_scope.insert(prefix.clone());
            if let Some(traced) = ctx.traced_path_scope.as_mut() {
                traced.insert(prefix.clone());
            }
            self.scope_tree.add_path(scope, prefix);
        }
    }

    /// Snapshot of the current path scope, attached to statement results
    /// and fenced sub-expressions.
    pub(crate) fn path_scope_snapshot(&self) -> Vec<PathId> {
        let mut paths: Vec<PathId> = self.ctx().path_scope.iter().cloned().collect();
        paths.sort_by_key(|p| (p.len(), format!("{p:?}")));
        paths
    }

    /// Raises a cardinality error when `set` may produce more than one
    /// element (ORDER BY, OFFSET, and LIMIT operands demand singletons).
    pub(crate) fn enforce_singleton(&self, set: SetId) -> CompileResult<()> {
        let singletons = self
            .ctx()
            .singletons
            .iter()
            .cloned()
            .collect::<std::collections::HashSet<_>>();
        let ctx = InferCtx {
            schema: self.schema,
            derived: &self.derived,
            ir: &self.ir,
        };
        if infer_cardinality(ctx, set, &singletons) != Cardinality::One {
            let span = self.ir.set(set).span.clone();
            return Err(CompileError::cardinality(
                "possibly more than one element returned by an expression \
                 where only singletons are allowed",
                span,
            ));
        }
        Ok(())
    }

    /// Records every path prefix used by `set` as a known singleton in the
    /// enclosing scope. Type-filter arguments are marked as well, so the
    /// filtered and unfiltered sets agree.
    pub(crate) fn update_singletons(&mut self, set: SetId) {
        let prefixes = self.extract_prefixes(set);
        for path_id in prefixes {
            for prefix in path_id.iter_prefixes() {
                self.ctx_mut().singletons.insert(prefix);
            }
        }
    }

    /// Collects the path ids of all sets reachable from `set` without
    /// descending into substatements or aggregate call arguments, and
    /// excluding GROUP BY paths.
    pub(crate) fn extract_prefixes(&self, set: SetId) -> Vec<PathId> {
        let mut out: IndexSet<PathId> = IndexSet::new();
        self.walk_prefixes(set, &mut out);
        let group_paths = &self.ctx().group_paths;
        out.into_iter()
            .filter(|p| !p.starts_any_of(group_paths.iter()))
            .collect()
    }

    fn walk_prefixes(&self, set: SetId, out: &mut IndexSet<PathId>) {
        let node = self.ir.set(set);

        if let Some(expr) = &node.expr {
            match expr {
                // Substatements own their paths.
                Expr::Stmt(_) | Expr::SetOp { .. } => {}
                Expr::FunctionCall { func, args, .. } => {
                    if !self.schema.function(*func).aggregate {
                        for arg in args {
                            self.walk_prefixes(*arg, out);
                        }
                    }
                }
                Expr::BinOp { left, right, .. } => {
                    self.walk_prefixes(*left, out);
                    self.walk_prefixes(*right, out);
                }
                Expr::UnaryOp { operand, .. } => self.walk_prefixes(*operand, out),
                Expr::ExistsPred { expr, .. }
                | Expr::TypeCast { expr, .. }
                | Expr::TypeFilter { expr, .. }
                | Expr::TupleIndirection { expr, .. } => self.walk_prefixes(*expr, out),
                Expr::IndexIndirection { expr, index } => {
                    self.walk_prefixes(*expr, out);
                    self.walk_prefixes(*index, out);
                }
                Expr::SliceIndirection { expr, start, stop } => {
                    self.walk_prefixes(*expr, out);
                    self.walk_prefixes(*start, out);
                    self.walk_prefixes(*stop, out);
                }
                Expr::Coalesce { args } => {
                    for arg in args {
                        self.walk_prefixes(*arg, out);
                    }
                }
                Expr::Tuple { elements, .. } => {
                    for el in elements {
                        self.walk_prefixes(el.val, out);
                    }
                }
                Expr::Array { elements } => {
                    for el in elements {
                        self.walk_prefixes(*el, out);
                    }
                }
                Expr::Mapping { keys, values } => {
                    for el in keys.iter().chain(values) {
                        self.walk_prefixes(*el, out);
                    }
                }
                Expr::Constant { .. }
                | Expr::Parameter { .. }
                | Expr::TypeRefExpr { .. }
                | Expr::EmptySet
                | Expr::EmptyCollection { .. } => {}
            }
        }

        if let Some(rptr) = &node.rptr {
            self.walk_prefixes(rptr.source, out);
        }

        out.insert(node.path_id.clone());
    }
}
