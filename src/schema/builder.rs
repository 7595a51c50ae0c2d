//! Schema catalog assembly.
//!
//! [`SchemaBuilder`] is how embedders (and tests) put a catalog together.
//! `with_std` pre-seeds the `std` module: the object root, system pointers,
//! the scalar hierarchy, and the built-in function set.

use super::{
    FuncId, Function, Param, ParamMode, Pointer, PointerKind, PtrCardinality, PtrId, PtrSource,
    QualName, Schema, Type, TypeId, TypeKind, TypeRef,
};
use smol_str::SmolStr;

/// Builder for an in-memory [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// An empty catalog with no modules.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog pre-seeded with the `std` and `schema` modules.
    pub fn with_std() -> Self {
        let mut b = Self::new();
        b.add_module("std");
        b.add_module("schema");
        b.add_module("default");

        // The universal top type; empty sets and NCA bottom out here.
        let anytype = b.add_abstract_scalar(QualName::new("std", "anytype"), &[]);

        // The metaclass target of `std::__class__`.
        let meta = b.add_object_type(QualName::new("schema", "Object"), &[anytype]);

        let object = b.add_object_type(QualName::new("std", "Object"), &[anytype]);

        // Scalar hierarchy.
        let anyscalar = b.add_abstract_scalar(QualName::new("std", "anyscalar"), &[anytype]);
        let anyreal = b.add_abstract_scalar(QualName::new("std", "anyreal"), &[anyscalar]);
        b.add_scalar(QualName::new("std", "int64"), &[anyreal]);
        b.add_scalar(QualName::new("std", "float64"), &[anyreal]);
        b.add_scalar(QualName::new("std", "decimal"), &[anyreal]);
        let str_ty = b.add_scalar(QualName::new("std", "str"), &[anyscalar]);
        let bool_ty = b.add_scalar(QualName::new("std", "bool"), &[anyscalar]);
        b.add_scalar(QualName::new("std", "bytes"), &[anyscalar]);
        b.add_scalar(QualName::new("std", "datetime"), &[anyscalar]);
        let uuid = b.add_scalar(QualName::new("std", "uuid"), &[anyscalar]);

        // System pointers on the object root.
        b.add_system_property(object, QualName::new("std", "id"), uuid);
        b.add_system_link(object, QualName::new("std", "__class__"), meta);

        // Built-in functions.
        let int64 = b.get_type("std", "int64");
        let float64 = b.get_type("std", "float64");
        b.add_function(
            QualName::new("std", "count"),
            vec![Param {
                name: None,
                ty: object,
                mode: ParamMode::SetOf,
                named_only: false,
                default: None,
            }],
            int64,
            true,
            Some("0".to_string()),
        );
        b.add_function(
            QualName::new("std", "sum"),
            vec![Param {
                name: None,
                ty: anyreal,
                mode: ParamMode::SetOf,
                named_only: false,
                default: None,
            }],
            float64,
            true,
            Some("0".to_string()),
        );
        let anytype_array = b.add_array(QualName::new("std", "array"), anytype);
        b.add_function(
            QualName::new("std", "array_agg"),
            vec![Param {
                name: None,
                ty: anytype,
                mode: ParamMode::SetOf,
                named_only: false,
                default: None,
            }],
            anytype_array,
            true,
            None,
        );
        b.add_function(
            QualName::new("std", "len"),
            vec![Param {
                name: None,
                ty: str_ty,
                mode: ParamMode::Positional,
                named_only: false,
                default: None,
            }],
            int64,
            false,
            None,
        );
        b.add_function(
            QualName::new("std", "lower"),
            vec![Param {
                name: None,
                ty: str_ty,
                mode: ParamMode::Positional,
                named_only: false,
                default: None,
            }],
            str_ty,
            false,
            None,
        );
        b.add_function(
            QualName::new("std", "upper"),
            vec![Param {
                name: None,
                ty: str_ty,
                mode: ParamMode::Positional,
                named_only: false,
                default: None,
            }],
            str_ty,
            false,
            None,
        );
        b.add_function(QualName::new("std", "random"), vec![], float64, false, None);
        // `any` — a variadic bool reducer, exercising variadic dispatch.
        b.add_function(
            QualName::new("std", "any"),
            vec![Param {
                name: None,
                ty: bool_ty,
                mode: ParamMode::Variadic,
                named_only: false,
                default: None,
            }],
            bool_ty,
            false,
            None,
        );

        b
    }

    pub fn add_module(&mut self, name: impl Into<SmolStr>) -> &mut Self {
        let name = name.into();
        if !self.schema.modules.contains(&name) {
            self.schema.modules.push(name);
        }
        self
    }

    fn push_type(&mut self, ty: Type) -> TypeRef {
        let id = TypeId(self.schema.types.len() as u32);
        self.schema.type_index.insert(ty.name.clone(), id);
        self.schema.types.push(ty);
        TypeRef::Schema(id)
    }

    pub fn add_object_type(&mut self, name: QualName, bases: &[TypeRef]) -> TypeRef {
        let bases = self.default_object_bases(&name, bases);
        self.push_type(Type {
            name,
            kind: TypeKind::Object {
                bases,
                is_virtual: false,
            },
        })
    }

    pub fn add_virtual_object_type(&mut self, name: QualName, bases: &[TypeRef]) -> TypeRef {
        let bases = self.default_object_bases(&name, bases);
        self.push_type(Type {
            name,
            kind: TypeKind::Object {
                bases,
                is_virtual: true,
            },
        })
    }

    /// Every concrete object type implicitly extends `std::Object`.
    fn default_object_bases(&self, name: &QualName, bases: &[TypeRef]) -> Vec<TypeRef> {
        if !bases.is_empty() {
            return bases.to_vec();
        }
        if name.module == "std" || name.module == "schema" {
            return Vec::new();
        }
        match self.schema.get(&QualName::new("std", "Object")) {
            Ok(id) => vec![TypeRef::Schema(id)],
            Err(_) => Vec::new(),
        }
    }

    pub fn add_scalar(&mut self, name: QualName, bases: &[TypeRef]) -> TypeRef {
        self.push_type(Type {
            name,
            kind: TypeKind::Scalar {
                bases: bases.to_vec(),
                abstract_: false,
            },
        })
    }

    pub fn add_abstract_scalar(&mut self, name: QualName, bases: &[TypeRef]) -> TypeRef {
        self.push_type(Type {
            name,
            kind: TypeKind::Scalar {
                bases: bases.to_vec(),
                abstract_: true,
            },
        })
    }

    pub fn add_enum(&mut self, name: QualName, labels: &[&str]) -> TypeRef {
        self.push_type(Type {
            name,
            kind: TypeKind::Enum {
                labels: labels.iter().map(|l| SmolStr::new(l)).collect(),
            },
        })
    }

    /// An array type in the base catalog (function signatures need one;
    /// expression-level arrays are minted per compilation).
    pub fn add_array(&mut self, name: QualName, element: TypeRef) -> TypeRef {
        self.push_type(Type {
            name,
            kind: TypeKind::Array { element },
        })
    }

    /// A stored view: a named query that behaves as a derived type.
    pub fn add_view(&mut self, name: QualName, base: TypeRef, expr: impl Into<String>) -> TypeRef {
        self.push_type(Type {
            name,
            kind: TypeKind::View {
                base,
                expr: expr.into(),
            },
        })
    }

    fn push_pointer(&mut self, ptr: Pointer) -> PtrId {
        let id = PtrId(self.schema.pointers.len() as u32);
        match ptr.source {
            PtrSource::Type(TypeRef::Schema(ty)) => {
                self.schema.type_pointers.entry(ty).or_default().push(id);
            }
            PtrSource::Pointer(super::PtrRef::Schema(owner)) => {
                self.schema.ptr_properties.entry(owner).or_default().push(id);
            }
            _ => {}
        }
        self.schema.pointers.push(ptr);
        id
    }

    /// A link with the given cardinality; implicit `std::source` and
    /// `std::target` properties are added so link-level shapes resolve.
    pub fn add_link(
        &mut self,
        source: TypeRef,
        name: QualName,
        target: TypeRef,
        cardinality: PtrCardinality,
    ) -> PtrId {
        let link = self.push_pointer(Pointer {
            name,
            kind: PointerKind::Link,
            source: PtrSource::Type(source),
            target,
            cardinality,
            required: false,
            readonly: false,
            computable_expr: None,
            is_system: false,
        });

        for (prop, endpoint) in [("source", source), ("target", target)] {
            self.push_pointer(Pointer {
                name: QualName::new("std", prop),
                kind: PointerKind::Property,
                source: PtrSource::Pointer(super::PtrRef::Schema(link)),
                target: endpoint,
                cardinality: PtrCardinality::ManyToOne,
                required: true,
                readonly: true,
                computable_expr: None,
                is_system: true,
            });
        }

        link
    }

    /// A single-valued property.
    pub fn add_property(&mut self, source: TypeRef, name: QualName, target: TypeRef) -> PtrId {
        self.push_pointer(Pointer {
            name,
            kind: PointerKind::Property,
            source: PtrSource::Type(source),
            target,
            cardinality: PtrCardinality::ManyToOne,
            required: false,
            readonly: false,
            computable_expr: None,
            is_system: false,
        })
    }

    /// A computed pointer with a stored EdgeQL expression.
    pub fn add_computable(
        &mut self,
        source: TypeRef,
        name: QualName,
        target: TypeRef,
        expr: impl Into<String>,
    ) -> PtrId {
        self.push_pointer(Pointer {
            name,
            kind: PointerKind::Property,
            source: PtrSource::Type(source),
            target,
            cardinality: PtrCardinality::ManyToOne,
            required: false,
            readonly: false,
            computable_expr: Some(expr.into()),
            is_system: false,
        })
    }

    /// A link property on an existing link.
    pub fn add_link_property(
        &mut self,
        link: PtrId,
        name: QualName,
        target: TypeRef,
    ) -> PtrId {
        self.push_pointer(Pointer {
            name,
            kind: PointerKind::Property,
            source: PtrSource::Pointer(super::PtrRef::Schema(link)),
            target,
            cardinality: PtrCardinality::ManyToOne,
            required: false,
            readonly: false,
            computable_expr: None,
            is_system: false,
        })
    }

    fn add_system_property(&mut self, source: TypeRef, name: QualName, target: TypeRef) -> PtrId {
        self.push_pointer(Pointer {
            name,
            kind: PointerKind::Property,
            source: PtrSource::Type(source),
            target,
            cardinality: PtrCardinality::ManyToOne,
            required: true,
            readonly: true,
            computable_expr: None,
            is_system: true,
        })
    }

    fn add_system_link(&mut self, source: TypeRef, name: QualName, target: TypeRef) -> PtrId {
        self.push_pointer(Pointer {
            name,
            kind: PointerKind::Link,
            source: PtrSource::Type(source),
            target,
            cardinality: PtrCardinality::ManyToOne,
            required: true,
            readonly: true,
            computable_expr: None,
            is_system: true,
        })
    }

    pub fn add_function(
        &mut self,
        name: QualName,
        params: Vec<Param>,
        return_type: TypeRef,
        aggregate: bool,
        initial_value: Option<String>,
    ) -> FuncId {
        let id = FuncId(self.schema.functions.len() as u32);
        self.schema
            .func_index
            .entry(name.clone())
            .or_default()
            .push(id);
        let named_only = params
            .iter()
            .filter(|p| p.named_only)
            .filter_map(|p| p.name.clone())
            .collect();
        self.schema.functions.push(Function {
            name,
            params,
            named_only,
            return_type,
            aggregate,
            initial_value,
        });
        id
    }

    /// Looks up a previously added type; panics on a missing name (builder
    /// misuse, not runtime input).
    pub fn get_type(&self, module: &str, name: &str) -> TypeRef {
        TypeRef::Schema(
            self.schema
                .get(&QualName::new(module, name))
                .unwrap_or_else(|_| panic!("builder: unknown type {module}::{name}")),
        )
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::PtrDirection;
    use crate::schema::{DerivedSchema, resolve_link_property, resolve_pointer};

    #[test]
    fn std_seed_has_core_items() {
        let schema = SchemaBuilder::with_std().build();
        assert!(schema.has_module("std"));
        assert!(schema.get(&QualName::new("std", "Object")).is_ok());
        assert!(schema.get(&QualName::new("std", "int64")).is_ok());
        assert!(
            schema
                .get_functions(&QualName::new("std", "count"))
                .is_some()
        );
    }

    #[test]
    fn object_types_inherit_system_pointers() {
        let mut b = SchemaBuilder::with_std();
        let user = b.add_object_type(QualName::new("default", "User"), &[]);
        let schema = b.build();
        let derived = DerivedSchema::default();

        let id_ptr = resolve_pointer(&schema, &derived, user, "id", PtrDirection::Outbound, None);
        assert!(id_ptr.is_some(), "inherited std::id must resolve");
        let class_ptr = resolve_pointer(
            &schema,
            &derived,
            user,
            "__class__",
            PtrDirection::Outbound,
            None,
        );
        assert!(class_ptr.is_some());
    }

    #[test]
    fn links_get_source_and_target_properties() {
        let mut b = SchemaBuilder::with_std();
        let user = b.add_object_type(QualName::new("default", "User"), &[]);
        let friends = b.add_link(
            user,
            QualName::new("default", "friends"),
            user,
            PtrCardinality::ManyToMany,
        );
        let schema = b.build();
        let derived = DerivedSchema::default();

        let target = resolve_link_property(
            &schema,
            &derived,
            crate::schema::PtrRef::Schema(friends),
            "target",
        );
        assert!(target.is_some());
    }

    #[test]
    fn inbound_resolution_finds_backlinks() {
        let mut b = SchemaBuilder::with_std();
        let user = b.add_object_type(QualName::new("default", "User"), &[]);
        let post = b.add_object_type(QualName::new("default", "Post"), &[]);
        b.add_link(
            post,
            QualName::new("default", "author"),
            user,
            PtrCardinality::ManyToOne,
        );
        let schema = b.build();
        let derived = DerivedSchema::default();

        let back = resolve_pointer(
            &schema,
            &derived,
            user,
            "author",
            PtrDirection::Inbound,
            None,
        );
        assert!(back.is_some(), "User.<author must resolve to Post.author");
    }
}
