//! A pool of methods and type definitions, the IL and metadata provider the
//! analyses run against.

use crate::il::*;
use crate::Error;
use crate::RC;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum TypeKind {
    Class,
    Struct,
    Enum,
    Interface,
}

/// A field declared by a type.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FieldDefinition {
    pub name: String,
    pub type_: Type,
    pub is_static: bool,
}

impl FieldDefinition {
    pub fn new<S: Into<String>>(name: S, type_: Type, is_static: bool) -> FieldDefinition {
        FieldDefinition {
            name: name.into(),
            type_,
            is_static,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct TypeDefinition {
    name: String,
    kind: TypeKind,
    base_type: Option<String>,
    fields: Vec<FieldDefinition>,
}

impl TypeDefinition {
    pub fn new<S: Into<String>>(name: S, kind: TypeKind) -> TypeDefinition {
        TypeDefinition {
            name: name.into(),
            kind,
            base_type: None,
            fields: Vec::new(),
        }
    }

    pub fn with_base<S: Into<String>>(mut self, base_type: S) -> TypeDefinition {
        self.base_type = Some(base_type.into());
        self
    }

    pub fn with_field(mut self, field: FieldDefinition) -> TypeDefinition {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn base_type(&self) -> Option<&str> {
        self.base_type.as_deref()
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Instance fields in declaration order.
    pub fn instance_fields(&self) -> Vec<&FieldDefinition> {
        self.fields.iter().filter(|field| !field.is_static).collect()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Methods keyed by signature, and type definitions keyed by full name.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Program {
    main_module: String,
    methods: BTreeMap<String, RC<Method>>,
    types: BTreeMap<String, TypeDefinition>,
}

impl Program {
    /// Create an empty program whose analyzed module is `main_module`.
    pub fn new<S: Into<String>>(main_module: S) -> Program {
        Program {
            main_module: main_module.into(),
            methods: BTreeMap::new(),
            types: BTreeMap::new(),
        }
    }

    /// Parse a program serialized as JSON.
    pub fn from_json(json: &str) -> Result<Program, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn main_module(&self) -> &str {
        &self.main_module
    }

    pub fn add_method(&mut self, method: Method) {
        self.methods.insert(method.signature(), RC::new(method));
    }

    pub fn add_type(&mut self, type_definition: TypeDefinition) {
        self.types
            .insert(type_definition.name().to_string(), type_definition);
    }

    pub fn methods(&self) -> impl Iterator<Item = &RC<Method>> {
        self.methods.values()
    }

    pub fn method(&self, signature: &str) -> Option<&RC<Method>> {
        self.methods.get(signature)
    }

    /// The method with the given signature, or an error.
    pub fn require_method(&self, signature: &str) -> Result<&RC<Method>, Error> {
        self.method(signature)
            .ok_or_else(|| Error::MethodNotFound(signature.to_string()))
    }

    /// Resolve the target of a call site to its definition, if the program
    /// knows it.
    pub fn resolve(&self, method: &MethodRef) -> Option<&RC<Method>> {
        self.methods.get(&method.signature())
    }

    /// Find a method by declaring type and name. The first overload wins.
    pub fn find_method(&self, declaring_type: &str, name: &str) -> Option<&RC<Method>> {
        self.methods
            .values()
            .find(|method| method.declaring_type() == declaring_type && method.name() == name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    pub fn type_definition(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    /// The IL type values of the named type have. Unknown types are taken to
    /// be reference types.
    pub fn type_of(&self, name: &str) -> Type {
        match self.type_definition(name).map(|definition| definition.kind()) {
            Some(TypeKind::Struct) => Type::structure(name),
            Some(TypeKind::Enum) => Type::enumeration(name),
            _ => Type::object(name),
        }
    }

    pub fn require_type(&self, name: &str) -> Result<&TypeDefinition, Error> {
        self.type_definition(name)
            .ok_or_else(|| Error::TypeNotFound(name.to_string()))
    }

    /// Resolve a field by its declaring type and name.
    pub fn field(&self, declaring_type: &str, name: &str) -> Option<FieldRef> {
        self.type_definition(declaring_type)
            .and_then(|type_definition| type_definition.field(name))
            .map(|field| {
                FieldRef::new(
                    declaring_type,
                    field.name.clone(),
                    field.type_.clone(),
                    field.is_static,
                )
            })
    }

    /// True if `method` belongs to the analyzed module.
    pub fn is_main_module(&self, method: &Method) -> bool {
        method.module() == self.main_module
    }

    /// True if `type_name` is, or derives from, `base`.
    pub fn derives_from(&self, type_name: &str, base: &str) -> bool {
        let mut current = Some(type_name);
        let mut depth = 0;
        while let Some(name) = current {
            if name == base {
                return true;
            }
            depth += 1;
            if depth > self.types.len() {
                return false;
            }
            current = self
                .type_definition(name)
                .and_then(|definition| definition.base_type());
        }
        false
    }
}
