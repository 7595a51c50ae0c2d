//! Schema catalog: the port boundary between the compiler and the
//! persistent schema.
//!
//! The compiler consumes a read-only [`Schema`] — modules, types, pointers,
//! and functions addressed by index ids. Everything the compiler itself
//! mints during a compilation (view types, derived pointers, synthesized
//! tuple and array types) lives in a compiler-owned [`DerivedSchema`]
//! overlay; the two arenas are addressed uniformly through [`TypeRef`] and
//! [`PtrRef`].

pub mod builder;

pub use builder::SchemaBuilder;

use crate::ast::expr::PtrDirection;
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::fmt;
use thiserror::Error;

/// A module-qualified schema name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualName {
    pub module: SmolStr,
    pub name: SmolStr,
}

impl QualName {
    pub fn new(module: impl Into<SmolStr>, name: impl Into<SmolStr>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Parses `module::name`; a bare name gets the given default module.
    pub fn parse(text: &str, default_module: &str) -> Self {
        match text.split_once("::") {
            Some((module, name)) => Self::new(module, name),
            None => Self::new(default_module, text),
        }
    }
}

impl fmt::Display for QualName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.name)
    }
}

/// Index of a type in the base schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Index of a pointer in the base schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PtrId(pub u32);

/// Index of a function in the base schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

/// Index of a type in the per-compilation derived overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DerivedTypeId(pub u32);

/// Index of a pointer in the per-compilation derived overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DerivedPtrId(pub u32);

/// A type reference: either into the base schema or the derived overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Schema(TypeId),
    Derived(DerivedTypeId),
}

/// A pointer reference: base schema or derived overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PtrRef {
    Schema(PtrId),
    Derived(DerivedPtrId),
}

/// Errors surfaced by schema lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema item '{name}' does not exist")]
    NameNotFound { name: String },
    #[error("module '{module}' does not exist")]
    ModuleNotFound { module: String },
}

/// Kinds of schema types.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Scalar {
        bases: Vec<TypeRef>,
        abstract_: bool,
    },
    Object {
        bases: Vec<TypeRef>,
        is_virtual: bool,
    },
    Tuple {
        /// Element names and types; positional tuples use `"0"`, `"1"`, ….
        elements: Vec<(SmolStr, TypeRef)>,
        named: bool,
    },
    Array {
        element: TypeRef,
    },
    Enum {
        labels: Vec<SmolStr>,
    },
    View {
        /// The object type the view projects.
        base: TypeRef,
        /// Stored EdgeQL text of the view body.
        expr: String,
    },
}

/// A schema type.
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub name: QualName,
    pub kind: TypeKind,
}

impl Type {
    pub fn is_object(&self) -> bool {
        matches!(self.kind, TypeKind::Object { .. })
    }

    pub fn is_view(&self) -> bool {
        matches!(self.kind, TypeKind::View { .. })
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, TypeKind::Scalar { .. })
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.kind, TypeKind::Object { is_virtual, .. } if is_virtual)
    }

    pub fn bases(&self) -> &[TypeRef] {
        match &self.kind {
            TypeKind::Scalar { bases, .. } | TypeKind::Object { bases, .. } => bases,
            TypeKind::View { base, .. } => std::slice::from_ref(base),
            _ => &[],
        }
    }
}

/// Link vs. link property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Link,
    Property,
}

/// Pointer cardinality (source-to-target mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtrCardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl PtrCardinality {
    /// True when an outbound traversal yields at most one target per source.
    pub fn single_target(self) -> bool {
        matches!(self, PtrCardinality::OneToOne | PtrCardinality::ManyToOne)
    }
}

/// What a pointer hangs off: a type (links, properties) or another pointer
/// (link properties).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtrSource {
    Type(TypeRef),
    Pointer(PtrRef),
}

/// A schema pointer: link, property, or link property.
#[derive(Debug, Clone, PartialEq)]
pub struct Pointer {
    pub name: QualName,
    pub kind: PointerKind,
    pub source: PtrSource,
    pub target: TypeRef,
    pub cardinality: PtrCardinality,
    pub required: bool,
    pub readonly: bool,
    /// Stored EdgeQL text when the pointer is computed.
    pub computable_expr: Option<String>,
    /// System pointers (`std::id`, `std::__class__`, …) are never treated
    /// as computables.
    pub is_system: bool,
}

impl Pointer {
    /// The user-facing short name.
    pub fn shortname(&self) -> &SmolStr {
        &self.name.name
    }

    /// A pointer is pure-computable when it has a computed expression, is
    /// not readonly, and is not a system pointer.
    pub fn is_pure_computable(&self) -> bool {
        self.computable_expr.is_some() && !self.readonly && !self.is_system
    }

    /// The endpoint reached by traversing in `direction`.
    pub fn far_endpoint(&self, direction: PtrDirection) -> Option<TypeRef> {
        match direction {
            PtrDirection::Outbound => Some(self.target),
            PtrDirection::Inbound => match self.source {
                PtrSource::Type(ty) => Some(ty),
                PtrSource::Pointer(_) => None,
            },
        }
    }
}

/// Parameter passing modes, mirroring the DDL surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    Positional,
    Optional,
    Variadic,
    SetOf,
}

/// One function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Option<SmolStr>,
    pub ty: TypeRef,
    pub mode: ParamMode,
    /// True for `NAMED ONLY` parameters, which can only be bound by
    /// keyword.
    pub named_only: bool,
    /// Stored EdgeQL default expression text.
    pub default: Option<String>,
}

/// A schema function (or aggregate).
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: QualName,
    pub params: Vec<Param>,
    /// Names of the `NAMED ONLY` parameters, in declaration order.
    pub named_only: Vec<SmolStr>,
    pub return_type: TypeRef,
    pub aggregate: bool,
    /// Aggregate initial value as stored EdgeQL text.
    pub initial_value: Option<String>,
}

impl Function {
    /// Index of the variadic parameter, if any.
    pub fn variadic_index(&self) -> Option<usize> {
        self.params.iter().position(|p| p.mode == ParamMode::Variadic)
    }
}

/// The read-only schema catalog handed to the compiler.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub(crate) modules: Vec<SmolStr>,
    pub(crate) types: Vec<Type>,
    pub(crate) type_index: IndexMap<QualName, TypeId>,
    pub(crate) pointers: Vec<Pointer>,
    /// Pointers owned by each object type.
    pub(crate) type_pointers: IndexMap<TypeId, Vec<PtrId>>,
    /// Link properties owned by each link.
    pub(crate) ptr_properties: IndexMap<PtrId, Vec<PtrId>>,
    pub(crate) functions: Vec<Function>,
    pub(crate) func_index: IndexMap<QualName, Vec<FuncId>>,
}

impl Schema {
    pub fn has_module(&self, module: &str) -> bool {
        self.modules.iter().any(|m| m == module)
    }

    pub fn type_(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn pointer(&self, id: PtrId) -> &Pointer {
        &self.pointers[id.0 as usize]
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    /// Exact lookup by qualified name.
    pub fn get(&self, name: &QualName) -> Result<TypeId, SchemaError> {
        self.type_index
            .get(name)
            .copied()
            .ok_or_else(|| SchemaError::NameNotFound {
                name: name.to_string(),
            })
    }

    /// Unqualified lookup: the default module first, then `std`.
    pub fn get_unqualified(&self, name: &str, default_module: &str) -> Result<TypeId, SchemaError> {
        let in_default = QualName::new(default_module, name);
        if let Some(id) = self.type_index.get(&in_default) {
            return Ok(*id);
        }
        let in_std = QualName::new("std", name);
        self.type_index
            .get(&in_std)
            .copied()
            .ok_or(SchemaError::NameNotFound {
                name: name.to_string(),
            })
    }

    /// All overloads registered under a function name.
    pub fn get_functions(&self, name: &QualName) -> Option<&[FuncId]> {
        self.func_index.get(name).map(|v| v.as_slice())
    }

    /// Function lookup with the same unqualified fallback as types.
    pub fn get_functions_unqualified(
        &self,
        name: &str,
        default_module: &str,
    ) -> Option<&[FuncId]> {
        let in_default = QualName::new(default_module, name);
        if let Some(funcs) = self.func_index.get(&in_default) {
            return Some(funcs.as_slice());
        }
        self.func_index
            .get(&QualName::new("std", name))
            .map(|v| v.as_slice())
    }

    /// Pointers defined directly on `ty` (inherited ones are found by
    /// walking bases in `resolve_pointer`).
    pub fn own_pointers(&self, ty: TypeId) -> &[PtrId] {
        self.type_pointers.get(&ty).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Link properties defined on a link.
    pub fn own_properties(&self, ptr: PtrId) -> &[PtrId] {
        self.ptr_properties
            .get(&ptr)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_pointers(&self) -> impl Iterator<Item = (PtrId, &Pointer)> {
        self.pointers
            .iter()
            .enumerate()
            .map(|(i, p)| (PtrId(i as u32), p))
    }
}

/// Per-compilation overlay holding minted types and pointers.
///
/// The base schema stays immutable (and shareable across concurrent
/// compilations); everything the compiler derives lands here and travels
/// with the finished IR.
#[derive(Debug, Clone, Default)]
pub struct DerivedSchema {
    pub types: Vec<Type>,
    pub pointers: Vec<Pointer>,
    /// Interning map for synthesized collection types.
    collection_index: IndexMap<String, DerivedTypeId>,
}

impl DerivedSchema {
    pub fn add_type(&mut self, ty: Type) -> DerivedTypeId {
        let id = DerivedTypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn add_pointer(&mut self, ptr: Pointer) -> DerivedPtrId {
        let id = DerivedPtrId(self.pointers.len() as u32);
        self.pointers.push(ptr);
        id
    }

    pub fn type_(&self, id: DerivedTypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn pointer(&self, id: DerivedPtrId) -> &Pointer {
        &self.pointers[id.0 as usize]
    }

    /// Interns a synthesized collection type under a structural key so
    /// repeated construction yields the same reference.
    pub fn intern_collection(&mut self, key: String, make: impl FnOnce() -> Type) -> DerivedTypeId {
        if let Some(id) = self.collection_index.get(&key) {
            return *id;
        }
        let id = self.add_type(make());
        self.collection_index.insert(key, id);
        id
    }
}

/// Resolves a [`TypeRef`] against the base schema and overlay.
pub fn type_of<'a>(schema: &'a Schema, derived: &'a DerivedSchema, r: TypeRef) -> &'a Type {
    match r {
        TypeRef::Schema(id) => schema.type_(id),
        TypeRef::Derived(id) => derived.type_(id),
    }
}

/// Resolves a [`PtrRef`].
pub fn ptr_of<'a>(schema: &'a Schema, derived: &'a DerivedSchema, r: PtrRef) -> &'a Pointer {
    match r {
        PtrRef::Schema(id) => schema.pointer(id),
        PtrRef::Derived(id) => derived.pointer(id),
    }
}

/// Peels view types down to their material object type.
pub fn material_type(schema: &Schema, derived: &DerivedSchema, r: TypeRef) -> TypeRef {
    let mut current = r;
    loop {
        match &type_of(schema, derived, current).kind {
            TypeKind::View { base, .. } => current = *base,
            _ => return current,
        }
    }
}

/// Subclass check, reflexive, walking base chains across both arenas.
pub fn is_subclass(schema: &Schema, derived: &DerivedSchema, a: TypeRef, b: TypeRef) -> bool {
    if a == b {
        return true;
    }
    type_of(schema, derived, a)
        .bases()
        .iter()
        .any(|base| is_subclass(schema, derived, *base, b))
}

/// All ancestors of `a`, nearest first, including `a` itself.
fn ancestry(schema: &Schema, derived: &DerivedSchema, a: TypeRef) -> Vec<TypeRef> {
    let mut out = vec![a];
    let mut frontier = vec![a];
    while let Some(current) = frontier.pop() {
        for base in type_of(schema, derived, current).bases() {
            if !out.contains(base) {
                out.push(*base);
                frontier.push(*base);
            }
        }
    }
    out
}

/// Nearest common ancestor of two types, if related.
pub fn nearest_common_ancestor(
    schema: &Schema,
    derived: &DerivedSchema,
    a: TypeRef,
    b: TypeRef,
) -> Option<TypeRef> {
    for candidate in ancestry(schema, derived, a) {
        if is_subclass(schema, derived, b, candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Resolves a pointer by short name on a source type.
///
/// Outbound resolution searches the type's own pointers and then its bases;
/// inbound resolution searches every pointer targeting the type (or an
/// ancestor of it). `far_endpoint` restricts matches to pointers whose far
/// end is compatible with the given type.
pub fn resolve_pointer(
    schema: &Schema,
    derived: &DerivedSchema,
    source: TypeRef,
    name: &str,
    direction: PtrDirection,
    far_endpoint: Option<TypeRef>,
) -> Option<PtrRef> {
    match direction {
        PtrDirection::Outbound => {
            let material = material_type(schema, derived, source);
            let mut frontier = vec![material];
            while let Some(current) = frontier.pop() {
                if let TypeRef::Schema(id) = current {
                    for ptr_id in schema.own_pointers(id) {
                        let ptr = schema.pointer(*ptr_id);
                        if ptr.shortname() == name {
                            if let Some(far) = far_endpoint
                                && !is_subclass(schema, derived, far, ptr.target)
                            {
                                continue;
                            }
                            return Some(PtrRef::Schema(*ptr_id));
                        }
                    }
                }
                frontier.extend(type_of(schema, derived, current).bases().iter().copied());
            }
            None
        }
        PtrDirection::Inbound => {
            let material = material_type(schema, derived, source);
            for (ptr_id, ptr) in schema.all_pointers() {
                if ptr.shortname() != name {
                    continue;
                }
                if !is_subclass(schema, derived, material, ptr.target) {
                    continue;
                }
                if let Some(far) = far_endpoint
                    && let PtrSource::Type(src_ty) = ptr.source
                    && !is_subclass(schema, derived, far, src_ty)
                {
                    continue;
                }
                return Some(PtrRef::Schema(ptr_id));
            }
            None
        }
    }
}

/// Resolves a link property by short name on a link.
pub fn resolve_link_property(
    schema: &Schema,
    derived: &DerivedSchema,
    link: PtrRef,
    name: &str,
) -> Option<PtrRef> {
    match link {
        PtrRef::Schema(id) => schema
            .own_properties(id)
            .iter()
            .find(|p| schema.pointer(**p).shortname() == name)
            .map(|p| PtrRef::Schema(*p)),
        PtrRef::Derived(_) => {
            // Derived pointers carry no properties of their own; fall back
            // to the pointer they were derived from via its name.
            let ptr = ptr_of(schema, derived, link);
            let base = schema
                .all_pointers()
                .find(|(_, p)| p.name == ptr.name)
                .map(|(id, _)| id)?;
            schema
                .own_properties(base)
                .iter()
                .find(|p| schema.pointer(**p).shortname() == name)
                .map(|p| PtrRef::Schema(*p))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qual_name_parse() {
        assert_eq!(
            QualName::parse("std::int64", "default"),
            QualName::new("std", "int64")
        );
        assert_eq!(
            QualName::parse("User", "default"),
            QualName::new("default", "User")
        );
        assert_eq!(QualName::new("std", "str").to_string(), "std::str");
    }

    #[test]
    fn subclass_and_nca() {
        let schema = SchemaBuilder::with_std().build();
        let derived = DerivedSchema::default();
        let int64 = TypeRef::Schema(schema.get(&QualName::new("std", "int64")).unwrap());
        let float64 = TypeRef::Schema(schema.get(&QualName::new("std", "float64")).unwrap());
        let anyreal = TypeRef::Schema(schema.get(&QualName::new("std", "anyreal")).unwrap());
        let strty = TypeRef::Schema(schema.get(&QualName::new("std", "str")).unwrap());

        assert!(is_subclass(&schema, &derived, int64, anyreal));
        assert!(!is_subclass(&schema, &derived, anyreal, int64));
        assert_eq!(
            nearest_common_ancestor(&schema, &derived, int64, float64),
            Some(anyreal)
        );
        assert_eq!(
            nearest_common_ancestor(&schema, &derived, int64, int64),
            Some(int64)
        );
        assert!(nearest_common_ancestor(&schema, &derived, int64, strty).is_some());
    }

    #[test]
    fn unqualified_lookup_falls_back_to_std() {
        let schema = SchemaBuilder::with_std().build();
        assert!(schema.get_unqualified("int64", "default").is_ok());
        assert!(schema.get_unqualified("no_such_type", "default").is_err());
    }

    #[test]
    fn pure_computable_excludes_system_pointers() {
        let schema = SchemaBuilder::with_std().build();
        let object = schema.get(&QualName::new("std", "Object")).unwrap();
        let derived = DerivedSchema::default();
        let id_ptr = resolve_pointer(
            &schema,
            &derived,
            TypeRef::Schema(object),
            "id",
            PtrDirection::Outbound,
            None,
        )
        .expect("std::id must resolve");
        assert!(!ptr_of(&schema, &derived, id_ptr).is_pure_computable());
    }

    #[test]
    fn derived_collection_interning() {
        let mut derived = DerivedSchema::default();
        let a = derived.intern_collection("array<x>".to_string(), || Type {
            name: QualName::new("std", "array"),
            kind: TypeKind::Array {
                element: TypeRef::Derived(DerivedTypeId(0)),
            },
        });
        let b = derived.intern_collection("array<x>".to_string(), || unreachable!());
        assert_eq!(a, b);
    }
}
