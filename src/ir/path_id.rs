//! Canonical path identifiers.
//!
//! A [`PathId`] names a path expression irrespective of syntax: a root type
//! followed by pointer-traversal (or tuple-field) steps, optionally
//! qualified by namespaces. Two syntactic paths with the same id denote the
//! same set, which is what the compiler's interning map keys on.

use crate::ast::expr::PtrDirection;
use crate::schema::{PtrRef, TypeRef};
use smol_str::SmolStr;

/// One step of a canonical path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Ptr {
        ptr: PtrRef,
        direction: PtrDirection,
        target: TypeRef,
    },
    TupleField {
        name: SmolStr,
        target: TypeRef,
    },
}

impl PathStep {
    pub fn target(&self) -> TypeRef {
        match self {
            PathStep::Ptr { target, .. } | PathStep::TupleField { target, .. } => *target,
        }
    }
}

/// A namespace qualifier on a path id.
///
/// Weak namespaces isolate view-local paths during compilation and are
/// stripped from the final IR. Expression namespaces name generated sets
/// (one per internal alias) and survive stripping, keeping derived sets'
/// ids unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Namespace {
    Weak(SmolStr),
    Expr(SmolStr),
}

impl Namespace {
    pub fn is_weak(&self) -> bool {
        matches!(self, Namespace::Weak(_))
    }
}

/// Canonical identifier of a path expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathId {
    root: TypeRef,
    steps: Vec<PathStep>,
    namespace: Vec<Namespace>,
    /// True for ids denoting the pointer itself rather than its target
    /// (link-property paths hang off these).
    ptr_path: bool,
}

impl PathId {
    /// The id of a bare class reference.
    pub fn from_type(root: TypeRef) -> Self {
        Self {
            root,
            steps: Vec::new(),
            namespace: Vec::new(),
            ptr_path: false,
        }
    }

    /// Extends with a pointer traversal step.
    pub fn extend(&self, ptr: PtrRef, direction: PtrDirection, target: TypeRef) -> Self {
        let mut next = self.clone();
        next.steps.push(PathStep::Ptr {
            ptr,
            direction,
            target,
        });
        next.ptr_path = false;
        next
    }

    /// Extends with a tuple-field indirection step.
    pub fn extend_tuple(&self, name: SmolStr, target: TypeRef) -> Self {
        let mut next = self.clone();
        next.steps.push(PathStep::TupleField { name, target });
        next.ptr_path = false;
        next
    }

    /// The pointer-flavored variant of this id, used as the base for
    /// link-property paths.
    pub fn ptr_path(&self) -> Self {
        let mut next = self.clone();
        next.ptr_path = true;
        next
    }

    pub fn is_ptr_path(&self) -> bool {
        self.ptr_path
    }

    pub fn root_type(&self) -> TypeRef {
        self.root
    }

    /// The type at the tip of the path.
    pub fn target_type(&self) -> TypeRef {
        self.steps.last().map(|s| s.target()).unwrap_or(self.root)
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Number of steps; a bare root has length zero.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn namespace(&self) -> &[Namespace] {
        &self.namespace
    }

    /// All prefixes of this id, shortest first, the id itself included.
    /// Every prefix carries the same namespace qualification.
    pub fn iter_prefixes(&self) -> impl Iterator<Item = PathId> + '_ {
        (0..=self.steps.len()).map(move |n| PathId {
            root: self.root,
            steps: self.steps[..n].to_vec(),
            namespace: self.namespace.clone(),
            ptr_path: if n == self.steps.len() {
                self.ptr_path
            } else {
                false
            },
        })
    }

    /// True when `prefix` is a (non-strict) prefix of this id.
    pub fn starts_with(&self, prefix: &PathId) -> bool {
        self.root == prefix.root
            && self.namespace == prefix.namespace
            && self.steps.len() >= prefix.steps.len()
            && self.steps[..prefix.steps.len()] == prefix.steps[..]
    }

    /// True when this id extends any member of `others`.
    pub fn starts_any_of<'a>(&self, others: impl IntoIterator<Item = &'a PathId>) -> bool {
        others.into_iter().any(|other| self.starts_with(other))
    }

    /// Appends a weak namespace qualifier.
    pub fn with_weak_namespace(&self, ns: SmolStr) -> Self {
        let mut next = self.clone();
        next.namespace.push(Namespace::Weak(ns));
        next
    }

    /// Appends an expression-alias namespace (generated sets).
    pub fn with_expr_namespace(&self, ns: SmolStr) -> Self {
        let mut next = self.clone();
        next.namespace.push(Namespace::Expr(ns));
        next
    }

    /// Replaces the namespace qualification wholesale.
    pub fn replace_namespace(&self, namespace: Vec<Namespace>) -> Self {
        let mut next = self.clone();
        next.namespace = namespace;
        next
    }

    /// Drops every weak namespace qualifier; the final pass applies this to
    /// all recorded ids before the IR is handed out.
    pub fn strip_weak_namespaces(&self) -> Self {
        let mut next = self.clone();
        next.namespace.retain(|ns| !ns.is_weak());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DerivedTypeId, PtrId, TypeId};

    fn ty(n: u32) -> TypeRef {
        TypeRef::Schema(TypeId(n))
    }

    fn ptr(n: u32) -> PtrRef {
        PtrRef::Schema(PtrId(n))
    }

    #[test]
    fn extend_builds_distinct_ids() {
        let root = PathId::from_type(ty(0));
        let a = root.extend(ptr(1), PtrDirection::Outbound, ty(2));
        let b = root.extend(ptr(1), PtrDirection::Inbound, ty(2));
        assert_ne!(a, b);
        assert_eq!(a.target_type(), ty(2));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn equal_paths_hash_equal() {
        let a = PathId::from_type(ty(0)).extend(ptr(1), PtrDirection::Outbound, ty(2));
        let b = PathId::from_type(ty(0)).extend(ptr(1), PtrDirection::Outbound, ty(2));
        assert_eq!(a, b);
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn prefixes_shortest_first() {
        let id = PathId::from_type(ty(0))
            .extend(ptr(1), PtrDirection::Outbound, ty(2))
            .extend(ptr(3), PtrDirection::Outbound, ty(4));
        let prefixes: Vec<_> = id.iter_prefixes().collect();
        assert_eq!(prefixes.len(), 3);
        assert_eq!(prefixes[0].len(), 0);
        assert_eq!(prefixes[2], id);
        assert!(id.starts_with(&prefixes[1]));
        assert!(!prefixes[1].starts_with(&id));
    }

    #[test]
    fn namespace_qualification_separates_ids() {
        let plain = PathId::from_type(ty(0));
        let namespaced = plain.with_weak_namespace("ns1".into());
        assert_ne!(plain, namespaced);
        assert_eq!(namespaced.strip_weak_namespaces(), plain);
        assert!(!namespaced.starts_with(&plain));
    }

    #[test]
    fn tuple_steps_and_ptr_paths() {
        let base = PathId::from_type(ty(0)).extend(ptr(1), PtrDirection::Outbound, ty(2));
        let field = base.extend_tuple("0".into(), ty(3));
        assert_eq!(field.target_type(), ty(3));

        let as_ptr = base.ptr_path();
        assert_ne!(base, as_ptr);
        assert!(as_ptr.is_ptr_path());
        let derived_target = TypeRef::Derived(DerivedTypeId(0));
        let lprop = as_ptr.extend(ptr(9), PtrDirection::Outbound, derived_target);
        assert_eq!(lprop.target_type(), derived_target);
        assert!(!lprop.is_ptr_path());
    }
}
