//! Function-call compilation: overload selection, argument scoping, and
//! aggregate initial values.
//!
//! Every argument compiles behind a preemptive fence, because whether the
//! parameter is `SET OF` is unknown until polymorphic matching picks an
//! overload. Fences of non-`SET OF` arguments are collapsed afterwards so
//! those arguments correlate with the caller's scope again.

use crate::ast::expr::{Expr as QlExpr, FunctionCall};
use crate::compiler::astutils;
use crate::compiler::context::Compiler;
use crate::compiler::error::{CompileError, CompileResult};
use crate::ir::scope::ScopeId;
use crate::ir::{Expr, SetId};
use crate::schema::{FuncId, Function, ParamMode, QualName, TypeRef, is_subclass};
use smol_str::SmolStr;

impl Compiler<'_> {
    pub(crate) fn compile_function_call(&mut self, call: &FunctionCall) -> CompileResult<SetId> {
        let candidates = self.function_candidates(call)?;

        let mut args: Vec<SetId> = Vec::new();
        let mut kwargs: Vec<(SmolStr, SetId)> = Vec::new();
        let mut pos_types: Vec<TypeRef> = Vec::new();
        let mut kw_types: Vec<TypeRef> = Vec::new();
        let mut arg_scopes: Vec<ScopeId> = Vec::new();
        let mut kwarg_scopes: Vec<(SmolStr, ScopeId)> = Vec::new();

        for (index, arg) in call.args.iter().enumerate() {
            // FILTER/ORDER BY argument modifiers desugar into a statement
            // around the argument before compilation.
            let arg_ql: QlExpr = if arg.filter.is_some() || !arg.sort.is_empty() {
                let mut stmt = astutils::ensure_qlstmt(&arg.arg);
                if let Some(filter) = &arg.filter {
                    astutils::stmt_extend_where(&mut stmt, filter.clone());
                }
                if !arg.sort.is_empty()
                    && let crate::ast::stmt::Statement::Select(q) = &mut stmt
                {
                    let mut sort = arg.sort.clone();
                    sort.extend(q.orderby.drain(..));
                    q.orderby = sort;
                }
                QlExpr::Statement(Box::new(stmt), arg.span.clone())
            } else {
                arg.arg.clone()
            };

            let mut fence = self.current_scope();
            let compiled = self.in_fenced(|c| {
                fence = c.current_scope();
                let set = c.compile_expr(&arg_ql)?;
                Ok(c.scoped_set(set))
            })?;

            let arg_ty = self.set_type(compiled, &arg.span).map_err(|_| {
                CompileError::expression(
                    format!(
                        "could not resolve the type of argument {} of function {}",
                        arg.name
                            .as_ref()
                            .map(|n| format!("'{n}'"))
                            .unwrap_or_else(|| index.to_string()),
                        call.func.name
                    ),
                    Some(arg.span.clone()),
                )
            })?;

            match &arg.name {
                Some(name) => {
                    kwargs.push((name.clone(), compiled));
                    kwarg_scopes.push((name.clone(), fence));
                    kw_types.push(arg_ty);
                }
                None => {
                    args.push(compiled);
                    arg_scopes.push(fence);
                    pos_types.push(arg_ty);
                }
            }
        }

        // Positional types lead; keyword argument types follow in call
        // order, so the lock-step signature walk stays positional.
        let positional_count = pos_types.len();
        let mut arg_types = pos_types;
        arg_types.extend(kw_types);

        let func_id = candidates
            .iter()
            .copied()
            .find(|id| {
                self.check_function(self.schema.function(*id), &arg_types, positional_count)
            })
            .ok_or_else(|| {
                CompileError::reference(
                    format!("could not find a function variant {}", call.func.name),
                    Some(call.span.clone()),
                )
            })?;

        self.collapse_non_setof_scopes(func_id, &arg_scopes, &kwarg_scopes);

        let initial_value = self.compile_initial_value(func_id, &call.span)?;

        let return_type = self.schema.function(func_id).return_type;
        self.generated_set(
            Expr::FunctionCall {
                func: func_id,
                args,
                kwargs,
                initial_value,
            },
            None,
            Some(return_type),
            Some(call.span.clone()),
        )
    }

    fn function_candidates(&self, call: &FunctionCall) -> CompileResult<Vec<FuncId>> {
        let found = match &call.func.module {
            Some(module) => {
                let real = self.resolve_module_alias(module);
                self.schema
                    .get_functions(&QualName::new(real, call.func.name.clone()))
            }
            None => self
                .schema
                .get_functions_unqualified(&call.func.name, &self.ctx().module),
        };

        match found {
            Some(ids) if !ids.is_empty() => Ok(ids.to_vec()),
            _ => Err(CompileError::reference(
                format!("could not resolve function name {}", call.func.name),
                Some(call.func.span.clone()),
            )),
        }
    }

    /// Signature check: parameters and argument types walk in lock-step;
    /// the variadic parameter (if any) absorbs surplus arguments, and
    /// missing trailing arguments must have defaults. Arguments before
    /// `positional_count` were passed positionally and may not bind
    /// `NAMED ONLY` parameters.
    fn check_function(
        &self,
        func: &Function,
        arg_types: &[TypeRef],
        positional_count: usize,
    ) -> bool {
        if func.params.is_empty() {
            return arg_types.is_empty();
        }

        let variadic_index = func.variadic_index();

        if arg_types.is_empty() {
            return func
                .params
                .iter()
                .enumerate()
                .all(|(i, p)| p.default.is_some() || Some(i) == variadic_index);
        }

        let len = func.params.len().max(arg_types.len());
        for i in 0..len {
            let param = match func.params.get(i) {
                Some(p) => p,
                None => match variadic_index {
                    Some(vi) => &func.params[vi],
                    None => return false,
                },
            };

            match arg_types.get(i) {
                None => {
                    if param.default.is_none() && Some(i) != variadic_index {
                        return false;
                    }
                }
                Some(arg_ty) => {
                    if param.named_only && i < positional_count {
                        return false;
                    }
                    if !is_subclass(self.schema, &self.derived, *arg_ty, param.ty) {
                        return false;
                    }
                }
            }
        }

        true
    }

    /// Collapses the preemptive fences of arguments whose selected
    /// parameter is not `SET OF`.
    fn collapse_non_setof_scopes(
        &mut self,
        func_id: FuncId,
        arg_scopes: &[ScopeId],
        kwarg_scopes: &[(SmolStr, ScopeId)],
    ) {
        let func = self.schema.function(func_id);
        let variadic_index = func.variadic_index();

        let mut modes: Vec<ParamMode> = Vec::new();
        for i in 0..arg_scopes.len() {
            let mode = match func.params.get(i) {
                Some(p) => p.mode,
                None => match variadic_index {
                    Some(vi) => func.params[vi].mode,
                    None => ParamMode::Positional,
                },
            };
            modes.push(mode);
        }

        let mut kw_modes: Vec<(usize, ParamMode)> = Vec::new();
        for (i, (name, _)) in kwarg_scopes.iter().enumerate() {
            let mode = func
                .params
                .iter()
                .find(|p| p.name.as_ref() == Some(name))
                .map(|p| p.mode)
                .unwrap_or(ParamMode::Positional);
            kw_modes.push((i, mode));
        }

        for (scope, mode) in arg_scopes.iter().zip(modes) {
            if mode != ParamMode::SetOf {
                self.scope_tree.collapse(*scope);
            }
        }
        for (i, mode) in kw_modes {
            if mode != ParamMode::SetOf {
                self.scope_tree.collapse(kwarg_scopes[i].1);
            }
        }
    }

    /// Compiles an aggregate's initial value: the stored text parses as
    /// EdgeQL and is cast to the selected overload's return type.
    fn compile_initial_value(
        &mut self,
        func_id: FuncId,
        span: &crate::ast::Span,
    ) -> CompileResult<Option<SetId>> {
        let (text, return_type) = {
            let func = self.schema.function(func_id);
            match &func.initial_value {
                Some(text) => (text.clone(), func.return_type),
                None => return Ok(None),
            }
        };

        let parsed = crate::parser::parse_fragment_internal(&text).map_err(|diag| {
            CompileError::new(
                crate::compiler::error::CompileErrorKind::Syntax,
                format!("error in aggregate initial value: {}", diag.message),
                Some(span.clone()),
            )
        })?;

        let compiled = self.compile_expr(&parsed)?;
        let cast = self.generated_set(
            Expr::TypeCast {
                expr: compiled,
                ty: return_type,
            },
            None,
            Some(return_type),
            Some(span.clone()),
        )?;
        Ok(Some(cast))
    }
}
