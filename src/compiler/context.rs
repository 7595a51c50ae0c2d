//! Compiler context: the level stack and the `Compiler` value that owns
//! all mutable compilation state.
//!
//! A [`ContextLevel`] is pushed for statements (subquery mode — alias maps
//! cloned, interning map reset), nested expression scopes (shared mode —
//! map mutations propagate to the parent on pop), and traced scopes used
//! inside `EXISTS`, aggregate arguments, and membership tests.

use crate::ast::expr::PtrDirection;
use crate::ir::scope::{ScopeId, ScopeTree};
use crate::ir::{IrData, PathId, SetId, StmtId};
use crate::schema::{DerivedSchema, PtrRef, QualName, Schema, TypeRef};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::collections::HashSet;

/// Key of the canonical-set interning map.
///
/// Plain paths intern by path id; tuple indirections and type-filtered
/// tips get their own key shapes, mirroring how they are deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SetKey {
    Path(PathId),
    TupleField(SetId, SmolStr),
    TypeFiltered(PathId, QualName),
}

/// The pointer context exposed while compiling shape computables, so link
/// property references resolve against the pointer being defined.
#[derive(Debug, Clone)]
pub struct PartialPointer {
    pub source: SetId,
    pub ptr: Option<PtrRef>,
    pub direction: PtrDirection,
}

/// How a pushed level relates to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtxMode {
    /// Shared maps: mutations merge back into the parent on pop.
    New,
    /// Alias maps cloned; interning map, statement, and aggregate state
    /// reset. Nothing merges back.
    Subquery,
    /// Like `New`, with a fresh traced-path recorder.
    Traced,
}

/// One level of the compiler context stack.
#[derive(Debug, Clone)]
pub struct ContextLevel {
    /// Mode this level was pushed with; drives pop-time merging.
    pub mode: CtxMode,

    /// Default module for unqualified names.
    pub module: SmolStr,
    /// Module alias map from WITH blocks and compile options.
    pub namespaces: IndexMap<SmolStr, SmolStr>,
    /// Pre-bound names supplied by the embedder.
    pub anchors: IndexMap<SmolStr, SetId>,
    /// Path variables bound by WITH aliased expressions and FOR iterators.
    pub pathvars: IndexMap<SmolStr, SetId>,
    /// View types declared in this statement, by alias.
    pub aliased_views: IndexMap<SmolStr, TypeRef>,
    /// Parameter types.
    pub arguments: IndexMap<SmolStr, TypeRef>,

    /// Statement currently being built.
    pub stmt: Option<StmtId>,
    /// Canonical-set interning map.
    pub sets: IndexMap<SetKey, SetId>,
    /// Path ids bound by GROUP BY; they are excluded from scope
    /// registration and singleton extraction.
    pub group_paths: HashSet<PathId>,
    pub in_aggregate: bool,
    /// When set, path roots compile as type references (right side of IS).
    pub path_as_type: bool,

    /// The set partial paths (`.ptr`) resolve against: the statement's
    /// result subject, or the current shape source.
    pub partial_path_anchor: Option<SetId>,
    /// Pointer being defined, while compiling a shape computable.
    pub toplevel_shape_rptr: Option<PartialPointer>,
    /// Requested name for the top-level result view.
    pub toplevel_result_view_name: Option<QualName>,
    /// Module for derived pointers minted by shape computables.
    pub derived_target_module: Option<SmolStr>,

    /// Path ids known to be singletons in this scope.
    pub singletons: HashSet<PathId>,
    /// Every path id registered in this context.
    pub path_scope: HashSet<PathId>,
    /// Path ids registered since the current statement began.
    pub stmt_local_path_scope: HashSet<PathId>,
    /// Recorder active inside traced scopes.
    pub traced_path_scope: Option<HashSet<PathId>>,
    /// Weak namespace stack applied to new path ids.
    pub path_id_namespace: Vec<SmolStr>,

    /// Current node in the scope-fence tree.
    pub scope: ScopeId,
    /// Clause being compiled, for error wording.
    pub clause: Option<&'static str>,
}

impl ContextLevel {
    fn root(scope: ScopeId) -> Self {
        Self {
            mode: CtxMode::New,
            module: SmolStr::new("default"),
            namespaces: IndexMap::new(),
            anchors: IndexMap::new(),
            pathvars: IndexMap::new(),
            aliased_views: IndexMap::new(),
            arguments: IndexMap::new(),
            stmt: None,
            sets: IndexMap::new(),
            group_paths: HashSet::new(),
            in_aggregate: false,
            path_as_type: false,
            partial_path_anchor: None,
            toplevel_shape_rptr: None,
            toplevel_result_view_name: None,
            derived_target_module: None,
            singletons: HashSet::new(),
            path_scope: HashSet::new(),
            stmt_local_path_scope: HashSet::new(),
            traced_path_scope: None,
            path_id_namespace: Vec::new(),
            scope,
            clause: None,
        }
    }

    fn child(&self, mode: CtxMode) -> Self {
        let mut next = self.clone();
        next.mode = mode;
        match mode {
            CtxMode::New => {}
            CtxMode::Traced => {
                next.traced_path_scope = Some(HashSet::new());
            }
            CtxMode::Subquery => {
                next.stmt = None;
                next.sets = IndexMap::new();
                next.group_paths = HashSet::new();
                next.in_aggregate = false;
                next.partial_path_anchor = None;
                next.toplevel_shape_rptr = None;
                next.toplevel_result_view_name = None;
                next.stmt_local_path_scope = HashSet::new();
                next.traced_path_scope = None;
            }
        }
        next
    }
}

/// Fresh-name generator for internal aliases (`expr1`, `ns2`, `w3`, …).
#[derive(Debug, Default)]
pub struct AliasGenerator {
    counters: IndexMap<&'static str, u32>,
}

impl AliasGenerator {
    pub fn get(&mut self, hint: &'static str) -> SmolStr {
        let counter = self.counters.entry(hint).or_insert(0);
        *counter += 1;
        SmolStr::new(format!("{hint}{counter}"))
    }
}

/// The compiler for one compilation unit.
///
/// Owns the context stack, the IR arenas, the scope tree, and the derived
/// schema overlay. The base schema is read-only and shareable.
pub struct Compiler<'s> {
    pub schema: &'s Schema,
    pub derived: DerivedSchema,
    pub ir: IrData,
    pub scope_tree: ScopeTree,
    pub aliases: AliasGenerator,
    pub toplevel_stmt: Option<StmtId>,
    /// Cache for views materialized from the schema; `None` marks a view
    /// whose compilation is in progress (cycle breaker).
    pub view_cache: IndexMap<QualName, Option<SetId>>,
    /// All view types declared during this compilation, by schema name.
    pub views: IndexMap<QualName, TypeRef>,
    stack: Vec<ContextLevel>,
}

impl<'s> Compiler<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        let scope_tree = ScopeTree::new();
        let root = ContextLevel::root(scope_tree.root());
        Self {
            schema,
            derived: DerivedSchema::default(),
            ir: IrData::default(),
            scope_tree,
            aliases: AliasGenerator::default(),
            toplevel_stmt: None,
            view_cache: IndexMap::new(),
            views: IndexMap::new(),
            stack: vec![root],
        }
    }

    pub fn ctx(&self) -> &ContextLevel {
        self.stack.last().expect("context stack is never empty")
    }

    pub fn ctx_mut(&mut self) -> &mut ContextLevel {
        self.stack.last_mut().expect("context stack is never empty")
    }

    /// The statement enclosing the parent context (for substatement
    /// parent links).
    pub fn parent_stmt(&self) -> Option<StmtId> {
        if self.stack.len() >= 2 {
            self.stack[self.stack.len() - 2].stmt
        } else {
            None
        }
    }

    fn push(&mut self, mode: CtxMode) {
        let child = self.ctx().child(mode);
        self.stack.push(child);
    }

    fn pop(&mut self) {
        let child = self.stack.pop().expect("pop on empty context stack");
        let Some(parent) = self.stack.last_mut() else {
            return;
        };

        match child.mode {
            CtxMode::New | CtxMode::Traced => {
                // Shared maps: the child worked on a clone; move the final
                // state back so mutations are parent-visible.
                parent.namespaces = child.namespaces;
                parent.anchors = child.anchors;
                parent.pathvars = child.pathvars;
                parent.aliased_views = child.aliased_views;
                parent.sets = child.sets;
                parent.group_paths = child.group_paths;
                parent.singletons = child.singletons;
                parent.path_scope = child.path_scope;
                parent.stmt_local_path_scope = child.stmt_local_path_scope;
                if child.mode == CtxMode::New {
                    // Traced recorders stay with their level; outer
                    // recorders keep accumulating through nested news.
                    parent.traced_path_scope = child.traced_path_scope;
                } else if let (Some(outer), Some(inner)) =
                    (parent.traced_path_scope.as_mut(), child.traced_path_scope)
                {
                    outer.extend(inner);
                }
            }
            CtxMode::Subquery => {
                // Isolated: nothing merges back.
            }
        }
    }

    /// Runs `f` in a shared child context.
    pub fn in_new<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.push(CtxMode::New);
        let result = f(self);
        self.pop();
        result
    }

    /// Runs `f` in subquery mode: alias maps cloned, interning reset.
    pub fn in_subquery<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.push(CtxMode::Subquery);
        let result = f(self);
        self.pop();
        result
    }

    /// Runs `f` in a shared child context behind a new scope fence.
    pub fn in_fenced<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.push(CtxMode::New);
        let fence = self.scope_tree.add_fence(self.ctx().scope);
        self.ctx_mut().scope = fence;
        let result = f(self);
        self.pop();
        result
    }

    /// Runs `f` in a traced scope (fenced, with a path recorder); returns
    /// the recorded paths alongside the result.
    pub fn in_traced<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> (R, Vec<PathId>) {
        self.push(CtxMode::Traced);
        let fence = self.scope_tree.add_fence(self.ctx().scope);
        self.ctx_mut().scope = fence;
        let result = f(self);
        let traced = self
            .stack
            .last()
            .and_then(|lvl| lvl.traced_path_scope.as_ref())
            .map(|set| {
                let mut v: Vec<PathId> = set.iter().cloned().collect();
                v.sort_by_key(|p| (p.len(), format!("{p:?}")));
                v
            })
            .unwrap_or_default();
        self.pop();
        (result, traced)
    }

    /// Current fence in the scope tree, for collapse bookkeeping.
    pub fn current_scope(&self) -> ScopeId {
        self.ctx().scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;

    #[test]
    fn new_mode_merges_maps_back() {
        let schema = SchemaBuilder::with_std().build();
        let mut compiler = Compiler::new(&schema);

        compiler.in_new(|c| {
            c.ctx_mut()
                .namespaces
                .insert("m".into(), "my.module".into());
        });
        assert_eq!(
            compiler.ctx().namespaces.get("m").map(|s| s.as_str()),
            Some("my.module")
        );
    }

    #[test]
    fn subquery_mode_is_isolated() {
        let schema = SchemaBuilder::with_std().build();
        let mut compiler = Compiler::new(&schema);

        compiler.in_subquery(|c| {
            c.ctx_mut()
                .namespaces
                .insert("m".into(), "my.module".into());
            assert!(c.ctx().sets.is_empty());
        });
        assert!(compiler.ctx().namespaces.get("m").is_none());
    }

    #[test]
    fn subquery_inherits_parent_aliases() {
        let schema = SchemaBuilder::with_std().build();
        let mut compiler = Compiler::new(&schema);
        compiler
            .ctx_mut()
            .namespaces
            .insert("outer".into(), "o".into());

        compiler.in_subquery(|c| {
            assert!(c.ctx().namespaces.get("outer").is_some());
        });
    }

    #[test]
    fn traced_scope_records_paths() {
        let schema = SchemaBuilder::with_std().build();
        let mut compiler = Compiler::new(&schema);
        let object = TypeRef::Schema(
            schema
                .get(&QualName::new("std", "Object"))
                .expect("std::Object"),
        );

        let ((), traced) = compiler.in_traced(|c| {
            let pid = PathId::from_type(object);
            if let Some(rec) = c.ctx_mut().traced_path_scope.as_mut() {
                rec.insert(pid);
            }
        });
        assert_eq!(traced.len(), 1);
    }

    #[test]
    fn alias_generator_is_sequential() {
        let mut r#gen = AliasGenerator::default();
        assert_eq!(r#gen.get("expr"), "expr1");
        assert_eq!(r#gen.get("expr"), "expr2");
        assert_eq!(r#gen.get("ns"), "ns1");
    }

    #[test]
    fn fenced_scope_adds_tree_node() {
        let schema = SchemaBuilder::with_std().build();
        let mut compiler = Compiler::new(&schema);
        let root = compiler.current_scope();
        compiler.in_fenced(|c| {
            assert_ne!(c.current_scope(), root);
        });
        assert_eq!(compiler.current_scope(), root);
    }
}
