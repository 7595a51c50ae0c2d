//! The scope-fence tree.
//!
//! Scope nodes decide correlation: a path registered inside a fence does
//! not correlate with the same path id outside it. Fences are created for
//! statement bodies, `EXISTS` and aggregate arguments, membership tests,
//! OFFSET/LIMIT operands, and shape elements with their own clauses. A
//! fence around a non-`SET OF` function argument can later be collapsed
//! back into its parent.

use crate::ir::path_id::PathId;
use indexmap::IndexSet;
use smol_str::SmolStr;
use std::collections::HashSet;

/// Index of a node in the scope tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// One node of the scope tree.
#[derive(Debug, Clone)]
pub struct ScopeNode {
    /// Fences isolate inner paths from outer correlation.
    pub fenced: bool,
    /// Set on WHERE/ORDER BY scopes: inner aggregates may not unnest
    /// through this node.
    pub unnest_fence: bool,
    /// Path ids attached directly to this node.
    pub path_ids: IndexSet<PathId>,
    /// Weak namespaces recorded by view declarations under this node.
    pub namespaces: HashSet<SmolStr>,
    pub children: Vec<ScopeId>,
    pub parent: Option<ScopeId>,
    /// True once the fence was collapsed into its parent.
    pub collapsed: bool,
}

impl ScopeNode {
    fn new(fenced: bool, parent: Option<ScopeId>) -> Self {
        Self {
            fenced,
            unnest_fence: false,
            path_ids: IndexSet::new(),
            namespaces: HashSet::new(),
            children: Vec::new(),
            parent,
            collapsed: false,
        }
    }
}

/// The scope tree of one compilation. Arena-backed; nodes are addressed by
/// [`ScopeId`].
#[derive(Debug, Clone)]
pub struct ScopeTree {
    nodes: Vec<ScopeNode>,
    root: ScopeId,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    /// A tree with a single root fence.
    pub fn new() -> Self {
        Self {
            nodes: vec![ScopeNode::new(true, None)],
            root: ScopeId(0),
        }
    }

    pub fn root(&self) -> ScopeId {
        self.root
    }

    pub fn node(&self, id: ScopeId) -> &ScopeNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: ScopeId) -> &mut ScopeNode {
        &mut self.nodes[id.0 as usize]
    }

    /// Adds a fence child under `parent`.
    pub fn add_fence(&mut self, parent: ScopeId) -> ScopeId {
        self.add_child(parent, true)
    }

    /// Adds a non-fencing branch child under `parent`.
    pub fn add_branch(&mut self, parent: ScopeId) -> ScopeId {
        self.add_child(parent, false)
    }

    fn add_child(&mut self, parent: ScopeId, fenced: bool) -> ScopeId {
        let id = ScopeId(self.nodes.len() as u32);
        self.nodes.push(ScopeNode::new(fenced, Some(parent)));
        self.node_mut(parent).children.push(id);
        id
    }

    /// Attaches a path id to `scope`.
    pub fn add_path(&mut self, scope: ScopeId, path_id: PathId) {
        self.node_mut(scope).path_ids.insert(path_id);
    }

    /// Records a weak namespace on `scope` so the final pass can strip it.
    pub fn add_namespace(&mut self, scope: ScopeId, ns: SmolStr) {
        self.node_mut(scope).namespaces.insert(ns);
    }

    /// Collapses a fence: its paths are hoisted into the nearest
    /// non-collapsed ancestor and the fence stops isolating.
    ///
    /// Used after function-signature matching, when an argument that was
    /// preemptively fenced turns out to bind a non-`SET OF` parameter.
    pub fn collapse(&mut self, scope: ScopeId) {
        let Some(parent) = self.node(scope).parent else {
            return;
        };
        let paths: Vec<PathId> = self.node_mut(scope).path_ids.drain(..).collect();
        let node = self.node_mut(scope);
        node.fenced = false;
        node.collapsed = true;
        let target = self.effective_scope(parent);
        for path in paths {
            self.node_mut(target).path_ids.insert(path);
        }
    }

    /// The nearest ancestor (or self) that has not been collapsed.
    fn effective_scope(&self, scope: ScopeId) -> ScopeId {
        let mut current = scope;
        while self.node(current).collapsed {
            match self.node(current).parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    /// True when `path_id` is visible at `scope`: attached to the node
    /// itself or to an ancestor. Enclosing fences do not block the walk;
    /// a fence isolates inner paths from the outside, not the reverse.
    pub fn is_visible(&self, scope: ScopeId, path_id: &PathId) -> bool {
        let mut current = Some(scope);
        while let Some(id) = current {
            let node = self.node(id);
            if node.path_ids.contains(path_id) {
                return true;
            }
            current = node.parent;
        }
        false
    }

    /// True when `path_id` registered under an inner fence of `scope` —
    /// fenced paths do not correlate with the outside.
    pub fn is_fenced_from(&self, scope: ScopeId, path_id: &PathId) -> bool {
        for child in &self.node(scope).children {
            let node = self.node(*child);
            if node.fenced && !node.collapsed && self.subtree_contains(*child, path_id) {
                return true;
            }
        }
        false
    }

    fn subtree_contains(&self, scope: ScopeId, path_id: &PathId) -> bool {
        let node = self.node(scope);
        if node.path_ids.contains(path_id) {
            return true;
        }
        node.children
            .iter()
            .any(|child| self.subtree_contains(*child, path_id))
    }

    /// All nodes, for the final namespace-stripping pass.
    pub fn all_nodes_mut(&mut self) -> impl Iterator<Item = &mut ScopeNode> {
        self.nodes.iter_mut()
    }

    /// Strips weak namespaces from every recorded path id.
    pub fn strip_weak_namespaces(&mut self) {
        for node in self.nodes.iter_mut() {
            let stripped: IndexSet<PathId> = node
                .path_ids
                .iter()
                .map(|p| p.strip_weak_namespaces())
                .collect();
            node.path_ids = stripped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::path_id::PathId;
    use crate::schema::{TypeId, TypeRef};

    fn pid(n: u32) -> PathId {
        PathId::from_type(TypeRef::Schema(TypeId(n)))
    }

    #[test]
    fn fences_isolate_inner_paths() {
        let mut tree = ScopeTree::new();
        let fence = tree.add_fence(tree.root());
        tree.add_path(fence, pid(1));

        assert!(tree.is_fenced_from(tree.root(), &pid(1)));
        assert!(tree.is_visible(fence, &pid(1)));
        assert!(!tree.is_visible(tree.root(), &pid(1)));
    }

    #[test]
    fn branch_paths_stay_visible() {
        let mut tree = ScopeTree::new();
        tree.add_path(tree.root(), pid(7));
        let branch = tree.add_branch(tree.root());
        assert!(tree.is_visible(branch, &pid(7)));
    }

    #[test]
    fn collapse_hoists_paths_to_parent() {
        let mut tree = ScopeTree::new();
        let fence = tree.add_fence(tree.root());
        tree.add_path(fence, pid(3));
        assert!(tree.is_fenced_from(tree.root(), &pid(3)));

        tree.collapse(fence);
        assert!(!tree.is_fenced_from(tree.root(), &pid(3)));
        assert!(tree.node(tree.root()).path_ids.contains(&pid(3)));
        assert!(tree.node(fence).path_ids.is_empty());
    }

    #[test]
    fn collapse_chains_to_effective_ancestor() {
        let mut tree = ScopeTree::new();
        let outer = tree.add_fence(tree.root());
        let inner = tree.add_fence(outer);
        tree.collapse(outer);
        tree.add_path(inner, pid(4));
        tree.collapse(inner);
        // outer is collapsed, so the path lands at the root.
        assert!(tree.node(tree.root()).path_ids.contains(&pid(4)));
    }

    #[test]
    fn strip_weak_namespaces_rewrites_ids() {
        let mut tree = ScopeTree::new();
        let ns_id = pid(1).with_weak_namespace("ns1".into());
        tree.add_path(tree.root(), ns_id.clone());
        tree.strip_weak_namespaces();
        assert!(!tree.node(tree.root()).path_ids.contains(&ns_id));
        assert!(tree.node(tree.root()).path_ids.contains(&pid(1)));
    }
}
