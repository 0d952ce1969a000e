use crate::il::*;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    #[derive(Default, Deserialize, Serialize)]
    pub struct MethodFlags: u32 {
        const STATIC      = 0b0001;
        const CONSTRUCTOR = 0b0010;
        const VIRTUAL     = 0b0100;
        const ABSTRACT    = 0b1000;
    }
}

/// A reference to a method, as found at a call site.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct MethodRef {
    declaring_type: String,
    name: String,
    parameter_types: Vec<Type>,
    return_type: Type,
    flags: MethodFlags,
}

impl MethodRef {
    pub fn new<S: Into<String>, T: Into<String>>(
        declaring_type: S,
        name: T,
        parameter_types: Vec<Type>,
        return_type: Type,
        flags: MethodFlags,
    ) -> MethodRef {
        MethodRef {
            declaring_type: declaring_type.into(),
            name: name.into(),
            parameter_types,
            return_type,
            flags,
        }
    }

    pub fn static_<S: Into<String>, T: Into<String>>(
        declaring_type: S,
        name: T,
        parameter_types: Vec<Type>,
        return_type: Type,
    ) -> MethodRef {
        MethodRef::new(
            declaring_type,
            name,
            parameter_types,
            return_type,
            MethodFlags::STATIC,
        )
    }

    pub fn instance<S: Into<String>, T: Into<String>>(
        declaring_type: S,
        name: T,
        parameter_types: Vec<Type>,
        return_type: Type,
    ) -> MethodRef {
        MethodRef::new(
            declaring_type,
            name,
            parameter_types,
            return_type,
            MethodFlags::empty(),
        )
    }

    pub fn constructor<S: Into<String>>(declaring_type: S, parameter_types: Vec<Type>) -> MethodRef {
        MethodRef::new(
            declaring_type,
            ".ctor",
            parameter_types,
            Type::Void,
            MethodFlags::CONSTRUCTOR,
        )
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_types(&self) -> &[Type] {
        &self.parameter_types
    }

    pub fn return_type(&self) -> &Type {
        &self.return_type
    }

    pub fn flags(&self) -> MethodFlags {
        self.flags
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.flags.contains(MethodFlags::CONSTRUCTOR)
    }

    /// The declaring type, as a reference type. Use
    /// `Program::type_of` to tell value types apart.
    pub fn declaring_type_as_type(&self) -> Type {
        Type::object(self.declaring_type.clone())
    }

    /// `DeclaringType.Name`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.declaring_type, self.name)
    }

    /// `DeclaringType.Name(ParamType1;ParamType2)`, the key every analysis
    /// result is stored under.
    pub fn signature(&self) -> String {
        let parameters = self
            .parameter_types
            .iter()
            .map(|type_| type_.full_name())
            .collect::<Vec<String>>();
        format!("{}({})", self.full_name(), parameters.join(";"))
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// A formal parameter.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Parameter {
    name: String,
    type_: Type,
}

impl Parameter {
    pub fn new<S: Into<String>>(name: S, type_: Type) -> Parameter {
        Parameter {
            name: name.into(),
            type_,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_(&self) -> &Type {
        &self.type_
    }
}

/// A method definition, with its body when the method has one.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Method {
    reference: MethodRef,
    parameters: Vec<Parameter>,
    module: String,
    body: Option<Body>,
}

impl Method {
    pub fn new(
        reference: MethodRef,
        parameters: Vec<Parameter>,
        module: String,
        body: Option<Body>,
    ) -> Result<Method, Error> {
        if reference.parameter_types().len() != parameters.len() {
            return Err(Error::Custom(format!(
                "{} declares {} parameter types but {} parameters",
                reference,
                reference.parameter_types().len(),
                parameters.len()
            )));
        }
        Ok(Method {
            reference,
            parameters,
            module,
            body,
        })
    }

    /// Start building a method declared by `declaring_type`.
    pub fn builder<S: Into<String>, T: Into<String>>(declaring_type: S, name: T) -> MethodBuilder {
        MethodBuilder::new(declaring_type.into(), name.into())
    }

    pub fn reference(&self) -> &MethodRef {
        &self.reference
    }

    pub fn name(&self) -> &str {
        self.reference.name()
    }

    pub fn declaring_type(&self) -> &str {
        self.reference.declaring_type()
    }

    pub fn signature(&self) -> String {
        self.reference.signature()
    }

    pub fn full_name(&self) -> String {
        self.reference.full_name()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn return_type(&self) -> &Type {
        self.reference.return_type()
    }

    pub fn is_static(&self) -> bool {
        self.reference.is_static()
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> Option<&mut Body> {
        self.body.as_mut()
    }

    /// The body of this method, or an error naming the method.
    pub fn require_body(&self) -> Result<&Body, Error> {
        self.body
            .as_ref()
            .ok_or_else(|| Error::NoBody(self.signature()))
    }

    /// The variable bound to the parameter at `index`.
    pub fn parameter_variable(&self, index: usize) -> Option<Variable> {
        self.parameters
            .get(index)
            .map(|p| Variable::parameter(p.name(), index, p.type_().clone()))
    }

    /// The instruction at `location`.
    pub fn instruction(&self, location: InstructionLocation) -> Result<&Instruction, Error> {
        self.require_body()?
            .block(location.block())?
            .instruction(location.index())
            .ok_or(Error::InstructionNotFound(
                location.block(),
                location.index(),
            ))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "method {} {{", self.reference.full_name())?;
        if let Some(body) = &self.body {
            write!(f, "{}", body)?;
        }
        write!(f, "}}")
    }
}

/// Builds `Method`s, mostly for tests and IL providers.
pub struct MethodBuilder {
    declaring_type: String,
    name: String,
    parameters: Vec<Parameter>,
    return_type: Type,
    flags: MethodFlags,
    module: String,
    body: Option<Body>,
}

impl MethodBuilder {
    fn new(declaring_type: String, name: String) -> MethodBuilder {
        MethodBuilder {
            declaring_type,
            name,
            parameters: Vec::new(),
            return_type: Type::Void,
            flags: MethodFlags::empty(),
            module: String::new(),
            body: None,
        }
    }

    pub fn parameter<S: Into<String>>(mut self, name: S, type_: Type) -> MethodBuilder {
        self.parameters.push(Parameter::new(name, type_));
        self
    }

    pub fn returns(mut self, type_: Type) -> MethodBuilder {
        self.return_type = type_;
        self
    }

    pub fn static_(mut self) -> MethodBuilder {
        self.flags |= MethodFlags::STATIC;
        self
    }

    pub fn constructor(mut self) -> MethodBuilder {
        self.flags |= MethodFlags::CONSTRUCTOR;
        self
    }

    pub fn module<S: Into<String>>(mut self, module: S) -> MethodBuilder {
        self.module = module.into();
        self
    }

    pub fn body(mut self, body: Body) -> MethodBuilder {
        self.body = Some(body);
        self
    }

    pub fn build(self) -> Method {
        let reference = MethodRef::new(
            self.declaring_type,
            self.name,
            self.parameters.iter().map(|p| p.type_().clone()).collect(),
            self.return_type,
            self.flags,
        );
        Method {
            reference,
            parameters: self.parameters,
            module: self.module,
            body: self.body,
        }
    }
}
