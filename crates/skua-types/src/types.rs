//! Classes, abstract types and the relational queries
//!
//! The flow-graph builder never inspects type structure directly; it asks
//! the [`TypeSystem`] the handful of questions listed in its interface and
//! treats the answers as authoritative.

use crate::instance::Instance;

/// Class identifier into the [`TypeSystem`] class table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

impl ClassId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "class{}", self.0)
    }
}

/// A class declaration as the type system sees it
#[derive(Debug, Clone)]
pub struct Class {
    pub name: String,
    /// Direct superclass; `None` only for Object.
    pub super_class: Option<ClassId>,
    /// Number of declared type parameters.
    pub num_type_parameters: usize,
    /// Upper bounds of the type parameters, one per parameter.
    pub type_parameter_bounds: Vec<AbstractType>,
    /// Word-slot offset of the instance field holding the type-argument
    /// vector, present iff the class is generic.
    pub type_arguments_field_offset: Option<usize>,
}

impl Class {
    /// Create a non-generic class.
    pub fn new(name: impl Into<String>, super_class: Option<ClassId>) -> Self {
        Self {
            name: name.into(),
            super_class,
            num_type_parameters: 0,
            type_parameter_bounds: Vec::new(),
            type_arguments_field_offset: None,
        }
    }

    /// Create a generic class with the given type-parameter bounds.
    pub fn generic(
        name: impl Into<String>,
        super_class: Option<ClassId>,
        bounds: Vec<AbstractType>,
        type_arguments_field_offset: usize,
    ) -> Self {
        Self {
            name: name.into(),
            super_class,
            num_type_parameters: bounds.len(),
            type_parameter_bounds: bounds,
            type_arguments_field_offset: Some(type_arguments_field_offset),
        }
    }

    pub fn has_type_arguments(&self) -> bool {
        self.num_type_parameters > 0
    }
}

/// Structure of an abstract type
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// The dynamic type; assignable both ways.
    Dynamic,
    /// The void type; only null flows into it.
    Void,
    /// A (possibly generic) class type.
    Class {
        class: ClassId,
        type_arguments: Option<TypeArguments>,
    },
    /// A reference to an enclosing class's type parameter; never
    /// instantiated at compile time.
    TypeParameter { name: String },
    /// A type that failed resolution or finalization.
    Malformed,
}

/// An abstract type as it appears in checks, casts and declarations
#[derive(Debug, Clone, PartialEq)]
pub struct AbstractType {
    pub kind: TypeKind,
    /// Set once the class finalizer has processed the type. Types reaching
    /// the flow-graph builder are always finalized.
    pub finalized: bool,
}

impl AbstractType {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            finalized: true,
        }
    }

    pub fn dynamic() -> Self {
        Self::new(TypeKind::Dynamic)
    }

    pub fn void_type() -> Self {
        Self::new(TypeKind::Void)
    }

    pub fn malformed() -> Self {
        Self::new(TypeKind::Malformed)
    }

    pub fn class_type(class: ClassId) -> Self {
        Self::new(TypeKind::Class {
            class,
            type_arguments: None,
        })
    }

    pub fn parameterized(class: ClassId, type_arguments: TypeArguments) -> Self {
        Self::new(TypeKind::Class {
            class,
            type_arguments: Some(type_arguments),
        })
    }

    pub fn type_parameter(name: impl Into<String>) -> Self {
        Self::new(TypeKind::TypeParameter { name: name.into() })
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self.kind, TypeKind::Malformed)
    }

    pub fn is_dynamic_type(&self) -> bool {
        matches!(self.kind, TypeKind::Dynamic)
    }

    pub fn is_void_type(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }

    /// A type is instantiated when it contains no type-parameter
    /// references anywhere.
    pub fn is_instantiated(&self) -> bool {
        match &self.kind {
            TypeKind::Dynamic | TypeKind::Void | TypeKind::Malformed => true,
            TypeKind::TypeParameter { .. } => false,
            TypeKind::Class { type_arguments, .. } => type_arguments
                .as_ref()
                .map(|args| args.is_instantiated())
                .unwrap_or(true),
        }
    }

    pub fn class_id(&self) -> Option<ClassId> {
        match &self.kind {
            TypeKind::Class { class, .. } => Some(*class),
            _ => None,
        }
    }
}

impl std::fmt::Display for AbstractType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TypeKind::Dynamic => write!(f, "dynamic"),
            TypeKind::Void => write!(f, "void"),
            TypeKind::Class { class, type_arguments } => {
                write!(f, "{}", class)?;
                if let Some(args) = type_arguments {
                    write!(f, "<{}>", args)?;
                }
                Ok(())
            }
            TypeKind::TypeParameter { name } => write!(f, "{}", name),
            TypeKind::Malformed => write!(f, "<malformed>"),
        }
    }
}

/// A vector of type arguments supplied to a generic class
#[derive(Debug, Clone, PartialEq)]
pub struct TypeArguments {
    pub types: Vec<AbstractType>,
}

impl TypeArguments {
    pub fn new(types: Vec<AbstractType>) -> Self {
        Self { types }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn is_instantiated(&self) -> bool {
        self.types.iter().all(|t| t.is_instantiated())
    }
}

impl std::fmt::Display for TypeArguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, ty) in self.types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", ty)?;
        }
        Ok(())
    }
}

/// The class table plus every query the compiler asks of it
#[derive(Debug)]
pub struct TypeSystem {
    classes: Vec<Class>,
}

impl TypeSystem {
    pub const OBJECT: ClassId = ClassId(0);
    pub const NULL: ClassId = ClassId(1);
    pub const BOOL: ClassId = ClassId(2);
    pub const SMI: ClassId = ClassId(3);
    pub const DOUBLE: ClassId = ClassId(4);
    pub const STRING: ClassId = ClassId(5);

    /// Create a type system with the core classes registered.
    pub fn new() -> Self {
        let mut ts = Self { classes: Vec::new() };
        ts.register_class(Class::new("Object", None));
        ts.register_class(Class::new("Null", Some(Self::OBJECT)));
        ts.register_class(Class::new("bool", Some(Self::OBJECT)));
        ts.register_class(Class::new("int", Some(Self::OBJECT)));
        ts.register_class(Class::new("double", Some(Self::OBJECT)));
        ts.register_class(Class::new("String", Some(Self::OBJECT)));
        ts
    }

    pub fn register_class(&mut self, class: Class) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(class);
        id
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.0 as usize]
    }

    pub fn object_type(&self) -> AbstractType {
        AbstractType::class_type(Self::OBJECT)
    }

    pub fn null_type(&self) -> AbstractType {
        AbstractType::class_type(Self::NULL)
    }

    pub fn bool_type(&self) -> AbstractType {
        AbstractType::class_type(Self::BOOL)
    }

    pub fn is_object_type(&self, ty: &AbstractType) -> bool {
        ty.class_id() == Some(Self::OBJECT)
    }

    pub fn is_null_type(&self, ty: &AbstractType) -> bool {
        ty.class_id() == Some(Self::NULL)
    }

    /// The class of a runtime literal.
    pub fn class_of(&self, literal: &Instance) -> ClassId {
        match literal {
            Instance::Null => Self::NULL,
            Instance::Bool(_) => Self::BOOL,
            Instance::Smi(_) => Self::SMI,
            Instance::Double(_) => Self::DOUBLE,
            Instance::Str(_) => Self::STRING,
            Instance::TypeArgs(_) => Self::OBJECT,
        }
    }

    /// The static type of a runtime literal.
    pub fn type_of(&self, literal: &Instance) -> AbstractType {
        AbstractType::class_type(self.class_of(literal))
    }

    fn is_class_subtype(&self, sub: ClassId, sup: ClassId) -> bool {
        let mut current = Some(sub);
        while let Some(id) = current {
            if id == sup {
                return true;
            }
            current = self.class(id).super_class;
        }
        false
    }

    /// Subtype query over finalized types. Malformed or uninstantiated
    /// types are never provably subtypes.
    pub fn is_subtype_of(&self, sub: &AbstractType, sup: &AbstractType) -> bool {
        if sub.is_malformed() || sup.is_malformed() {
            return false;
        }
        if sup.is_dynamic_type() {
            return true;
        }
        if sub.is_dynamic_type() || sub.is_void_type() || sup.is_void_type() {
            return false;
        }
        match (sub.class_id(), sup.class_id()) {
            (Some(s), Some(t)) => {
                if !self.is_class_subtype(s, t) {
                    return false;
                }
                // Compare argument vectors only when both sides supply them
                // for the same class; otherwise treat the raw type as the
                // instantiation with dynamic arguments, which is a supertype.
                match (sub_type_args(sub), sub_type_args(sup)) {
                    (Some(sa), Some(ta)) if s == t => {
                        sa.len() == ta.len()
                            && sa
                                .types
                                .iter()
                                .zip(ta.types.iter())
                                .all(|(a, b)| self.is_subtype_of(a, b) || b.is_dynamic_type())
                    }
                    _ => true,
                }
            }
            _ => false,
        }
    }

    /// The transitive "more specific than" relation used for type-check
    /// elision. Unlike plain subtyping it treats the dynamic type as more
    /// general than everything, so `S ⊏ T` guarantees every runtime value
    /// of static type `S` passes a `T` check.
    pub fn is_more_specific_than(&self, ty: &AbstractType, other: &AbstractType) -> bool {
        if ty.is_malformed() || other.is_malformed() {
            return false;
        }
        if other.is_dynamic_type() {
            return true;
        }
        if ty.is_dynamic_type() {
            return false;
        }
        self.is_subtype_of(ty, other)
    }

    /// Compile-time instance-of decision for a literal. Only called with
    /// instantiated, non-malformed destination types.
    pub fn is_instance_of(&self, literal: &Instance, ty: &AbstractType) -> bool {
        assert!(ty.is_instantiated() && !ty.is_malformed());
        if ty.is_dynamic_type() {
            return true;
        }
        if ty.is_void_type() {
            return false;
        }
        if matches!(literal, Instance::Null) {
            // Null is only an instance of Object and dynamic.
            return self.is_object_type(ty);
        }
        self.is_subtype_of(&self.type_of(literal), ty)
    }

    /// Whether a type-argument vector is provably within the declared
    /// bounds of `class`. Uninstantiated arguments are never provable.
    pub fn is_within_bounds_of(&self, args: &TypeArguments, class: ClassId) -> bool {
        let cls = self.class(class);
        if args.len() != cls.num_type_parameters {
            return false;
        }
        args.types
            .iter()
            .zip(cls.type_parameter_bounds.iter())
            .all(|(arg, bound)| arg.is_instantiated() && self.is_subtype_of(arg, bound))
    }
}

impl Default for TypeSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn sub_type_args(ty: &AbstractType) -> Option<&TypeArguments> {
    match &ty.kind {
        TypeKind::Class { type_arguments, .. } => type_arguments.as_ref(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_classes() {
        let ts = TypeSystem::new();
        assert_eq!(ts.class(TypeSystem::OBJECT).name, "Object");
        assert!(ts.class(TypeSystem::NULL).super_class == Some(TypeSystem::OBJECT));
    }

    #[test]
    fn test_subtype_chain() {
        let mut ts = TypeSystem::new();
        let animal = ts.register_class(Class::new("Animal", Some(TypeSystem::OBJECT)));
        let cat = ts.register_class(Class::new("Cat", Some(animal)));

        let cat_ty = AbstractType::class_type(cat);
        let animal_ty = AbstractType::class_type(animal);
        assert!(ts.is_subtype_of(&cat_ty, &animal_ty));
        assert!(!ts.is_subtype_of(&animal_ty, &cat_ty));
        assert!(ts.is_subtype_of(&cat_ty, &ts.object_type()));
    }

    #[test]
    fn test_dynamic_rules() {
        let ts = TypeSystem::new();
        let bool_ty = ts.bool_type();
        assert!(ts.is_subtype_of(&bool_ty, &AbstractType::dynamic()));
        assert!(ts.is_more_specific_than(&bool_ty, &AbstractType::dynamic()));
        assert!(!ts.is_more_specific_than(&AbstractType::dynamic(), &bool_ty));
    }

    #[test]
    fn test_instantiated() {
        assert!(AbstractType::dynamic().is_instantiated());
        assert!(!AbstractType::type_parameter("T").is_instantiated());
        let args = TypeArguments::new(vec![AbstractType::type_parameter("T")]);
        assert!(!args.is_instantiated());
    }

    #[test]
    fn test_literal_instance_of() {
        let ts = TypeSystem::new();
        assert!(ts.is_instance_of(&Instance::Smi(3), &AbstractType::class_type(TypeSystem::SMI)));
        assert!(ts.is_instance_of(&Instance::Smi(3), &ts.object_type()));
        assert!(!ts.is_instance_of(&Instance::Null, &ts.bool_type()));
        assert!(ts.is_instance_of(&Instance::Null, &ts.object_type()));
    }

    #[test]
    fn test_within_bounds() {
        let mut ts = TypeSystem::new();
        let bound = ts.bool_type();
        let boxed = ts.register_class(Class::generic(
            "Box",
            Some(TypeSystem::OBJECT),
            vec![bound],
            3,
        ));

        let good = TypeArguments::new(vec![ts.bool_type()]);
        let bad = TypeArguments::new(vec![AbstractType::class_type(TypeSystem::STRING)]);
        let open = TypeArguments::new(vec![AbstractType::type_parameter("T")]);
        assert!(ts.is_within_bounds_of(&good, boxed));
        assert!(!ts.is_within_bounds_of(&bad, boxed));
        assert!(!ts.is_within_bounds_of(&open, boxed));
    }
}
