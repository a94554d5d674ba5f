//! Function and field metadata

use skua_types::{AbstractType, ClassId};

/// What kind of function is being compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Regular,
    Constructor,
    Factory,
    /// Getter synthesised for a field.
    ImplicitGetter,
    /// Getter synthesised for a const field.
    ConstImplicitGetter,
    /// An explicit closure function.
    Closure,
    /// Closure implicitly created by tearing off an instance method.
    ImplicitInstanceClosure,
    /// Closure implicitly created by tearing off a static method.
    ImplicitStaticClosure,
}

/// Compile-time metadata of a function
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub kind: FunctionKind,
    pub is_static: bool,
    pub result_type: AbstractType,
    /// Class the function is a member of.
    pub owner: ClassId,
    pub num_fixed_parameters: usize,
    pub num_optional_parameters: usize,
    /// Enclosing function, for local functions.
    pub parent: Option<Box<Function>>,
    /// Signature class of a closure function; generic signature classes
    /// require a type-argument vector when the closure object is created.
    pub signature_class: Option<ClassId>,
}

impl Function {
    /// Constructor-phase argument passed as the second operand of every
    /// non-factory constructor call: run both the initializers and the
    /// body.
    pub const CTOR_PHASE_ALL: i64 = 3;

    pub fn new(name: impl Into<String>, owner: ClassId, result_type: AbstractType) -> Self {
        Self {
            name: name.into(),
            kind: FunctionKind::Regular,
            is_static: false,
            result_type,
            owner,
            num_fixed_parameters: 0,
            num_optional_parameters: 0,
            parent: None,
            signature_class: None,
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.num_fixed_parameters + self.num_optional_parameters
    }

    pub fn is_factory(&self) -> bool {
        self.kind == FunctionKind::Factory
    }

    pub fn is_constructor(&self) -> bool {
        self.kind == FunctionKind::Constructor
    }

    /// An instance function dispatched dynamically on its receiver.
    pub fn is_dynamic_function(&self) -> bool {
        !self.is_static && self.kind == FunctionKind::Regular
    }

    pub fn is_implicit_getter(&self) -> bool {
        matches!(
            self.kind,
            FunctionKind::ImplicitGetter | FunctionKind::ConstImplicitGetter
        )
    }

    pub fn is_local_function(&self) -> bool {
        self.parent.is_some()
    }

    pub fn is_closure_function(&self) -> bool {
        matches!(
            self.kind,
            FunctionKind::Closure
                | FunctionKind::ImplicitInstanceClosure
                | FunctionKind::ImplicitStaticClosure
        )
    }

    /// Walk out of local functions to the enclosing member function.
    pub fn outermost(&self) -> &Function {
        let mut current = self;
        while let Some(parent) = &current.parent {
            current = parent;
        }
        current
    }
}

/// A field declaration referenced by field access nodes
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub owner: ClassId,
    pub ty: AbstractType,
    pub is_static: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, owner: ClassId, ty: AbstractType, is_static: bool) -> Self {
        Self {
            name: name.into(),
            owner,
            ty,
            is_static,
        }
    }

    /// Selector of the synthesised getter for this field.
    pub fn getter_name(&self) -> String {
        format!("get:{}", self.name)
    }

    /// Selector of the synthesised setter for this field.
    pub fn setter_name(&self) -> String {
        format!("set:{}", self.name)
    }
}
