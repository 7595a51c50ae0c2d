//! Schema helpers: name resolution under module aliases and derivation of
//! view types and pointers into the overlay.

use crate::ast::expr::{ClassRef, TypeName};
use crate::compiler::context::Compiler;
use crate::compiler::error::{CompileError, CompileResult};
use crate::schema::{
    Pointer, PtrCardinality, PtrRef, PtrSource, QualName, Type, TypeKind, TypeRef,
};
use smol_str::SmolStr;

impl Compiler<'_> {
    /// Resolves a class reference to a schema type, applying module
    /// aliases; unqualified names try the default module, then `std`.
    pub(crate) fn get_schema_type(&self, class_ref: &ClassRef) -> CompileResult<TypeRef> {
        let not_found = || {
            CompileError::reference(
                format!(
                    "schema item '{}' does not exist",
                    match &class_ref.module {
                        Some(m) => format!("{m}::{}", class_ref.name),
                        None => class_ref.name.to_string(),
                    }
                ),
                Some(class_ref.span.clone()),
            )
        };

        match &class_ref.module {
            Some(module) => {
                let real_module = self.resolve_module_alias(module);
                let name = QualName::new(real_module, class_ref.name.clone());
                self.schema
                    .get(&name)
                    .map(TypeRef::Schema)
                    .map_err(|_| not_found())
            }
            None => {
                // Statement-local views shadow schema names.
                if let Some(view) = self.ctx().aliased_views.get(&class_ref.name) {
                    return Ok(*view);
                }
                self.schema
                    .get_unqualified(&class_ref.name, &self.ctx().module)
                    .map(TypeRef::Schema)
                    .map_err(|_| not_found())
            }
        }
    }

    /// Applies the WITH-block alias map to a module name.
    pub(crate) fn resolve_module_alias(&self, module: &SmolStr) -> SmolStr {
        self.ctx()
            .namespaces
            .get(module)
            .cloned()
            .unwrap_or_else(|| module.clone())
    }

    /// Resolves a surface type name, minting collection types into the
    /// overlay as needed. `array<T>`, `map<K, V>` and `tuple<…>` are the
    /// collection constructors.
    pub(crate) fn resolve_type_name(&mut self, ty: &TypeName) -> CompileResult<TypeRef> {
        let name = ty.maintype.name.as_str();
        if ty.maintype.module.is_none() {
            match name {
                "array" => {
                    let [element] = ty.subtypes.as_slice() else {
                        return Err(CompileError::expression(
                            "array type takes exactly one element type",
                            Some(ty.span.clone()),
                        ));
                    };
                    let element = self.resolve_type_name(element)?;
                    return Ok(self.mint_array_type(element));
                }
                "map" => {
                    let [key, value] = ty.subtypes.as_slice() else {
                        return Err(CompileError::expression(
                            "map type takes exactly two element types",
                            Some(ty.span.clone()),
                        ));
                    };
                    let _key = self.resolve_type_name(key)?;
                    let value = self.resolve_type_name(value)?;
                    // Maps are value-typed on the target side.
                    return Ok(self.mint_array_type(value));
                }
                "tuple" => {
                    let mut elements = Vec::new();
                    for (i, sub) in ty.subtypes.iter().enumerate() {
                        let el = self.resolve_type_name(sub)?;
                        elements.push((SmolStr::new(i.to_string()), el));
                    }
                    return Ok(self.mint_tuple_type(elements, false));
                }
                _ => {}
            }
        }
        self.get_schema_type(&ty.maintype)
    }

    /// Structural key used to intern minted collection types.
    fn type_key(&self, r: TypeRef) -> String {
        match r {
            TypeRef::Schema(id) => format!("s{}", id.0),
            TypeRef::Derived(id) => format!("d{}", id.0),
        }
    }

    pub(crate) fn mint_array_type(&mut self, element: TypeRef) -> TypeRef {
        let key = format!("array<{}>", self.type_key(element));
        let id = self.derived.intern_collection(key, || Type {
            name: QualName::new("std", "array"),
            kind: TypeKind::Array { element },
        });
        TypeRef::Derived(id)
    }

    pub(crate) fn mint_tuple_type(
        &mut self,
        elements: Vec<(SmolStr, TypeRef)>,
        named: bool,
    ) -> TypeRef {
        let key = format!(
            "tuple<{}>",
            elements
                .iter()
                .map(|(n, t)| format!("{n}:{}", self.type_key(*t)))
                .collect::<Vec<_>>()
                .join(",")
        );
        let id = self.derived.intern_collection(key, || Type {
            name: QualName::new("std", "tuple"),
            kind: TypeKind::Tuple { elements, named },
        });
        TypeRef::Derived(id)
    }

    /// Derives a view type from `base` under the given schema name.
    pub(crate) fn derive_view(&mut self, base: TypeRef, name: QualName) -> TypeRef {
        let id = self.derived.add_type(Type {
            name: name.clone(),
            kind: TypeKind::View {
                base,
                expr: String::new(),
            },
        });
        let view = TypeRef::Derived(id);
        self.views.insert(name, view);
        view
    }

    /// Derives a fresh pointer (used for shape computables and for
    /// `__class__` steps off non-source expressions).
    pub(crate) fn derive_pointer(
        &mut self,
        template: &Pointer,
        source: PtrSource,
        target: TypeRef,
        cardinality: PtrCardinality,
    ) -> PtrRef {
        let id = self.derived.add_pointer(Pointer {
            name: template.name.clone(),
            kind: template.kind,
            source,
            target,
            cardinality,
            required: false,
            readonly: template.readonly,
            computable_expr: template.computable_expr.clone(),
            is_system: template.is_system,
        });
        PtrRef::Derived(id)
    }

    /// Copies pointer data out of either arena (borrow-friendly).
    pub(crate) fn ptr_data(&self, r: PtrRef) -> Pointer {
        crate::schema::ptr_of(self.schema, &self.derived, r).clone()
    }

    /// The display name of a type.
    pub(crate) fn type_display(&self, r: TypeRef) -> String {
        crate::schema::type_of(self.schema, &self.derived, r)
            .name
            .to_string()
    }

    /// True when `r` names an object (concept) type, views included.
    pub(crate) fn is_object_type(&self, r: TypeRef) -> bool {
        let material = crate::schema::material_type(self.schema, &self.derived, r);
        crate::schema::type_of(self.schema, &self.derived, material).is_object()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;

    #[test]
    fn qualified_names_resolve_through_aliases() {
        let schema = SchemaBuilder::with_std().build();
        let mut compiler = Compiler::new(&schema);
        compiler
            .ctx_mut()
            .namespaces
            .insert("s".into(), "std".into());

        let r = compiler.get_schema_type(&ClassRef::new(Some("s".into()), "int64", 0..5));
        assert!(r.is_ok());
    }

    #[test]
    fn unqualified_falls_back_to_std() {
        let schema = SchemaBuilder::with_std().build();
        let compiler = Compiler::new(&schema);
        assert!(
            compiler
                .get_schema_type(&ClassRef::new(None, "int64", 0..5))
                .is_ok()
        );
        let err = compiler
            .get_schema_type(&ClassRef::new(None, "NoSuch", 0..6))
            .unwrap_err();
        assert_eq!(err.kind, crate::compiler::error::CompileErrorKind::Reference);
        assert_eq!(err.span, Some(0..6));
    }

    #[test]
    fn collection_types_are_interned() {
        let schema = SchemaBuilder::with_std().build();
        let mut compiler = Compiler::new(&schema);
        let int64 = compiler
            .get_schema_type(&ClassRef::new(None, "int64", 0..0))
            .unwrap();
        let a = compiler.mint_array_type(int64);
        let b = compiler.mint_array_type(int64);
        assert_eq!(a, b);
    }
}
