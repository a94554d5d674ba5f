//! Computations: the right-hand sides carried by Do and Bind instructions
//!
//! A computation describes one operation with a fixed arity of input
//! values. Emitting one deallocates its inputs from the expression temp
//! stack; binding one allocates a fresh temp for the result.

use super::value::Value;
use skua_ast::{Field, Function, LocalVariable, TokenKind, TokenPos};
use skua_types::{AbstractType, ClassId, Instance, TypeArguments};

/// Index of the try block whose handler an instruction targets; `None`
/// outside any try block.
pub type TryIndex = Option<u32>;

/// One three-address operation
#[derive(Debug, Clone)]
pub enum Computation {
    /// Embed a runtime object.
    Constant {
        token_pos: TokenPos,
        literal: Instance,
    },

    /// Read a non-captured local from its frame slot.
    LoadLocal {
        local: LocalVariable,
        context_level: usize,
    },

    /// Write a non-captured local's frame slot.
    StoreLocal {
        local: LocalVariable,
        value: Value,
        context_level: usize,
    },

    /// Read a word-slot field of a VM-internal object (context chains,
    /// type-argument vectors).
    LoadVMField {
        object: Value,
        offset_in_words: usize,
        /// Static type of the loaded value when one is known.
        ty: Option<AbstractType>,
    },

    /// Write a word-slot field of a VM-internal object.
    StoreVMField {
        object: Value,
        offset_in_words: usize,
        value: Value,
        ty: Option<AbstractType>,
    },

    /// Read the current context register.
    CurrentContext { token_pos: TokenPos },

    /// Replace the current context register.
    StoreContext { value: Value },

    /// Install a freshly allocated context whose parent is the current one.
    ChainContext { context: Value },

    /// Shallow-copy a context so loop iterations capture distinct
    /// variables.
    CloneContext {
        token_pos: TokenPos,
        try_index: TryIndex,
        context: Value,
    },

    /// Allocate a context with room for `num_context_variables`.
    AllocateContext {
        token_pos: TokenPos,
        try_index: TryIndex,
        num_context_variables: usize,
    },

    /// First computation of a catch handler; names the locals the runtime
    /// populates with the caught exception and stack trace.
    CatchEntry {
        exception_var: LocalVariable,
        stacktrace_var: LocalVariable,
    },

    /// Interruption point at loop heads.
    CheckStackOverflow {
        token_pos: TokenPos,
        try_index: TryIndex,
    },

    /// Allocate an instance of `class`.
    AllocateObject {
        token_pos: TokenPos,
        try_index: TryIndex,
        class: ClassId,
        arguments: Vec<Value>,
    },

    /// Allocate an instance whose uninstantiated type arguments must be
    /// bounds-checked at run time.
    AllocateObjectWithBoundsCheck {
        token_pos: TokenPos,
        try_index: TryIndex,
        class: ClassId,
        arguments: Vec<Value>,
    },

    /// Materialise an array literal; the trailing input is the reified
    /// element type-argument vector.
    CreateArray {
        token_pos: TokenPos,
        try_index: TryIndex,
        elements: Vec<Value>,
        element_type: Value,
    },

    /// Materialise a closure object over `function`.
    CreateClosure {
        token_pos: TokenPos,
        try_index: TryIndex,
        function: Function,
        type_arguments: Value,
        receiver: Value,
    },

    /// Dynamically dispatched call; the receiver is the first argument.
    InstanceCall {
        token_pos: TokenPos,
        try_index: TryIndex,
        function_name: String,
        /// Operator/getter/setter kind of the selector, for later passes.
        token_kind: TokenKind,
        arguments: Vec<Value>,
        argument_names: Vec<String>,
        /// How many leading arguments the runtime type-checks.
        checked_argument_count: usize,
    },

    /// Statically bound call.
    StaticCall {
        token_pos: TokenPos,
        try_index: TryIndex,
        function: Function,
        argument_names: Vec<String>,
        arguments: Vec<Value>,
    },

    /// Call through a closure object; the closure is the first argument.
    ClosureCall {
        token_pos: TokenPos,
        try_index: TryIndex,
        arguments: Vec<Value>,
    },

    /// Call into the embedder; arguments travel on the frame.
    NativeCall {
        token_pos: TokenPos,
        try_index: TryIndex,
        native_name: String,
    },

    /// Dynamically dispatched setter.
    InstanceSetter {
        token_pos: TokenPos,
        try_index: TryIndex,
        field_name: String,
        receiver: Value,
        value: Value,
    },

    /// Statically bound setter.
    StaticSetter {
        token_pos: TokenPos,
        try_index: TryIndex,
        setter_function: Function,
        value: Value,
    },

    LoadInstanceField {
        field: Field,
        instance: Value,
    },

    StoreInstanceField {
        field: Field,
        instance: Value,
        value: Value,
    },

    LoadStaticField {
        field: Field,
    },

    StoreStaticField {
        field: Field,
        value: Value,
    },

    LoadIndexed {
        token_pos: TokenPos,
        try_index: TryIndex,
        array: Value,
        index: Value,
    },

    StoreIndexed {
        token_pos: TokenPos,
        try_index: TryIndex,
        array: Value,
        index: Value,
        value: Value,
    },

    /// Identity comparison; never calls user code.
    StrictCompare {
        kind: TokenKind,
        left: Value,
        right: Value,
    },

    /// `==` dispatch honouring user-defined equality.
    EqualityCompare {
        token_pos: TokenPos,
        try_index: TryIndex,
        left: Value,
        right: Value,
    },

    RelationalOp {
        token_pos: TokenPos,
        try_index: TryIndex,
        kind: TokenKind,
        left: Value,
        right: Value,
    },

    BooleanNegate { value: Value },

    /// Runtime subtype check; throws on failure.
    AssertAssignable {
        token_pos: TokenPos,
        try_index: TryIndex,
        value: Value,
        instantiator: Value,
        instantiator_type_arguments: Value,
        dst_type: AbstractType,
        dst_name: String,
    },

    /// Verify a condition value is a boolean under strict checks.
    AssertBoolean {
        token_pos: TokenPos,
        try_index: TryIndex,
        value: Value,
    },

    /// Runtime `is` / `is!` test producing a boolean.
    InstanceOf {
        token_pos: TokenPos,
        try_index: TryIndex,
        value: Value,
        instantiator: Value,
        instantiator_type_arguments: Value,
        ty: AbstractType,
        negate_result: bool,
    },

    /// Instantiate an uninstantiated type-argument vector against the
    /// instantiator's vector.
    InstantiateTypeArguments {
        token_pos: TokenPos,
        try_index: TryIndex,
        type_arguments: TypeArguments,
        instantiator: Value,
    },

    /// Extract the type-argument vector a constructor allocation needs.
    ExtractConstructorTypeArguments {
        token_pos: TokenPos,
        try_index: TryIndex,
        type_arguments: TypeArguments,
        instantiator: Value,
    },

    /// Extract the instantiator a constructor allocation needs.
    ExtractConstructorInstantiator {
        class: ClassId,
        instantiator: Value,
    },
}

impl Computation {
    /// Number of input values consumed from the expression temp stack.
    pub fn input_count(&self) -> usize {
        self.inputs().len()
    }

    /// The input values, in operand order.
    pub fn inputs(&self) -> Vec<&Value> {
        match self {
            Computation::Constant { .. }
            | Computation::LoadLocal { .. }
            | Computation::CurrentContext { .. }
            | Computation::AllocateContext { .. }
            | Computation::CatchEntry { .. }
            | Computation::CheckStackOverflow { .. }
            | Computation::NativeCall { .. }
            | Computation::LoadStaticField { .. } => Vec::new(),

            Computation::StoreLocal { value, .. }
            | Computation::StoreContext { value }
            | Computation::BooleanNegate { value }
            | Computation::AssertBoolean { value, .. }
            | Computation::StaticSetter { value, .. }
            | Computation::StoreStaticField { value, .. } => vec![value],

            Computation::LoadVMField { object, .. } => vec![object],
            Computation::ChainContext { context } => vec![context],
            Computation::CloneContext { context, .. } => vec![context],
            Computation::InstantiateTypeArguments { instantiator, .. }
            | Computation::ExtractConstructorTypeArguments { instantiator, .. }
            | Computation::ExtractConstructorInstantiator { instantiator, .. } => {
                vec![instantiator]
            }
            Computation::LoadInstanceField { instance, .. } => vec![instance],

            Computation::StoreVMField { object, value, .. } => vec![object, value],
            Computation::StoreInstanceField {
                instance, value, ..
            } => vec![instance, value],
            Computation::InstanceSetter {
                receiver, value, ..
            } => vec![receiver, value],
            Computation::LoadIndexed { array, index, .. } => vec![array, index],
            Computation::StrictCompare { left, right, .. }
            | Computation::EqualityCompare { left, right, .. }
            | Computation::RelationalOp { left, right, .. } => vec![left, right],

            Computation::StoreIndexed {
                array,
                index,
                value,
                ..
            } => vec![array, index, value],
            Computation::AssertAssignable {
                value,
                instantiator,
                instantiator_type_arguments,
                ..
            }
            | Computation::InstanceOf {
                value,
                instantiator,
                instantiator_type_arguments,
                ..
            } => vec![value, instantiator, instantiator_type_arguments],

            Computation::CreateClosure {
                type_arguments,
                receiver,
                ..
            } => vec![type_arguments, receiver],

            Computation::AllocateObject { arguments, .. }
            | Computation::AllocateObjectWithBoundsCheck { arguments, .. }
            | Computation::StaticCall { arguments, .. }
            | Computation::InstanceCall { arguments, .. }
            | Computation::ClosureCall { arguments, .. } => arguments.iter().collect(),

            Computation::CreateArray {
                elements,
                element_type,
                ..
            } => {
                let mut v: Vec<&Value> = elements.iter().collect();
                v.push(element_type);
                v
            }
        }
    }

    /// Mutable access to the input values, in operand order.
    pub fn inputs_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Computation::Constant { .. }
            | Computation::LoadLocal { .. }
            | Computation::CurrentContext { .. }
            | Computation::AllocateContext { .. }
            | Computation::CatchEntry { .. }
            | Computation::CheckStackOverflow { .. }
            | Computation::NativeCall { .. }
            | Computation::LoadStaticField { .. } => Vec::new(),

            Computation::StoreLocal { value, .. }
            | Computation::StoreContext { value }
            | Computation::BooleanNegate { value }
            | Computation::AssertBoolean { value, .. }
            | Computation::StaticSetter { value, .. }
            | Computation::StoreStaticField { value, .. } => vec![value],

            Computation::LoadVMField { object, .. } => vec![object],
            Computation::ChainContext { context } => vec![context],
            Computation::CloneContext { context, .. } => vec![context],
            Computation::InstantiateTypeArguments { instantiator, .. }
            | Computation::ExtractConstructorTypeArguments { instantiator, .. }
            | Computation::ExtractConstructorInstantiator { instantiator, .. } => {
                vec![instantiator]
            }
            Computation::LoadInstanceField { instance, .. } => vec![instance],

            Computation::StoreVMField { object, value, .. } => vec![object, value],
            Computation::StoreInstanceField {
                instance, value, ..
            } => vec![instance, value],
            Computation::InstanceSetter {
                receiver, value, ..
            } => vec![receiver, value],
            Computation::LoadIndexed { array, index, .. } => vec![array, index],
            Computation::StrictCompare { left, right, .. }
            | Computation::EqualityCompare { left, right, .. }
            | Computation::RelationalOp { left, right, .. } => vec![left, right],

            Computation::StoreIndexed {
                array,
                index,
                value,
                ..
            } => vec![array, index, value],
            Computation::AssertAssignable {
                value,
                instantiator,
                instantiator_type_arguments,
                ..
            }
            | Computation::InstanceOf {
                value,
                instantiator,
                instantiator_type_arguments,
                ..
            } => vec![value, instantiator, instantiator_type_arguments],

            Computation::CreateClosure {
                type_arguments,
                receiver,
                ..
            } => vec![type_arguments, receiver],

            Computation::AllocateObject { arguments, .. }
            | Computation::AllocateObjectWithBoundsCheck { arguments, .. }
            | Computation::StaticCall { arguments, .. }
            | Computation::InstanceCall { arguments, .. }
            | Computation::ClosureCall { arguments, .. } => arguments.iter_mut().collect(),

            Computation::CreateArray {
                elements,
                element_type,
                ..
            } => {
                let mut v: Vec<&mut Value> = elements.iter_mut().collect();
                v.push(element_type);
                v
            }
        }
    }

    pub fn is_load_local(&self) -> bool {
        matches!(self, Computation::LoadLocal { .. })
    }

    pub fn is_store_local(&self) -> bool {
        matches!(self, Computation::StoreLocal { .. })
    }

    pub fn as_load_local(&self) -> Option<&LocalVariable> {
        match self {
            Computation::LoadLocal { local, .. } => Some(local),
            _ => None,
        }
    }

    pub fn as_store_local(&self) -> Option<(&LocalVariable, &Value)> {
        match self {
            Computation::StoreLocal { local, value, .. } => Some((local, value)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Computation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Computation::Constant { literal, .. } => write!(f, "{}", literal),
            Computation::LoadLocal { local, .. } => write!(f, "LoadLocal({})", local.name),
            Computation::StoreLocal { local, value, .. } => {
                write!(f, "StoreLocal({}, {})", local.name, value)
            }
            Computation::LoadVMField {
                object,
                offset_in_words,
                ..
            } => write!(f, "LoadVMField({}, {})", object, offset_in_words),
            Computation::StoreVMField {
                object,
                offset_in_words,
                value,
                ..
            } => write!(f, "StoreVMField({}, {}, {})", object, offset_in_words, value),
            Computation::CurrentContext { .. } => write!(f, "CurrentContext"),
            Computation::StoreContext { value } => write!(f, "StoreContext({})", value),
            Computation::ChainContext { context } => write!(f, "ChainContext({})", context),
            Computation::CloneContext { context, .. } => write!(f, "CloneContext({})", context),
            Computation::AllocateContext {
                num_context_variables,
                ..
            } => write!(f, "AllocateContext({})", num_context_variables),
            Computation::CatchEntry {
                exception_var,
                stacktrace_var,
            } => write!(f, "CatchEntry({}, {})", exception_var.name, stacktrace_var.name),
            Computation::CheckStackOverflow { .. } => write!(f, "CheckStackOverflow"),
            Computation::AllocateObject { class, .. } => write!(f, "AllocateObject({})", class),
            Computation::AllocateObjectWithBoundsCheck { class, .. } => {
                write!(f, "AllocateObjectWithBoundsCheck({})", class)
            }
            Computation::CreateArray { elements, .. } => {
                write!(f, "CreateArray[{}]", elements.len())
            }
            Computation::CreateClosure { function, .. } => {
                write!(f, "CreateClosure({})", function.name)
            }
            Computation::InstanceCall {
                function_name,
                arguments,
                ..
            } => {
                write!(f, "InstanceCall({}", function_name)?;
                for arg in arguments {
                    write!(f, ", {}", arg)?;
                }
                write!(f, ")")
            }
            Computation::StaticCall {
                function,
                arguments,
                ..
            } => {
                write!(f, "StaticCall({}", function.name)?;
                for arg in arguments {
                    write!(f, ", {}", arg)?;
                }
                write!(f, ")")
            }
            Computation::ClosureCall { arguments, .. } => {
                write!(f, "ClosureCall[{}]", arguments.len())
            }
            Computation::NativeCall { native_name, .. } => {
                write!(f, "NativeCall({})", native_name)
            }
            Computation::InstanceSetter {
                field_name,
                receiver,
                value,
                ..
            } => write!(f, "InstanceSetter({}, {}, {})", field_name, receiver, value),
            Computation::StaticSetter {
                setter_function,
                value,
                ..
            } => write!(f, "StaticSetter({}, {})", setter_function.name, value),
            Computation::LoadInstanceField { field, instance } => {
                write!(f, "LoadInstanceField({}, {})", field.name, instance)
            }
            Computation::StoreInstanceField {
                field,
                instance,
                value,
            } => write!(f, "StoreInstanceField({}, {}, {})", field.name, instance, value),
            Computation::LoadStaticField { field } => {
                write!(f, "LoadStaticField({})", field.name)
            }
            Computation::StoreStaticField { field, value } => {
                write!(f, "StoreStaticField({}, {})", field.name, value)
            }
            Computation::LoadIndexed { array, index, .. } => {
                write!(f, "LoadIndexed({}, {})", array, index)
            }
            Computation::StoreIndexed {
                array,
                index,
                value,
                ..
            } => write!(f, "StoreIndexed({}, {}, {})", array, index, value),
            Computation::StrictCompare { kind, left, right } => {
                write!(f, "StrictCompare({}, {}, {})", kind, left, right)
            }
            Computation::EqualityCompare { left, right, .. } => {
                write!(f, "EqualityCompare({}, {})", left, right)
            }
            Computation::RelationalOp {
                kind, left, right, ..
            } => write!(f, "RelationalOp({}, {}, {})", kind, left, right),
            Computation::BooleanNegate { value } => write!(f, "BooleanNegate({})", value),
            Computation::AssertAssignable {
                value, dst_type, ..
            } => write!(f, "AssertAssignable({}, {})", value, dst_type),
            Computation::AssertBoolean { value, .. } => write!(f, "AssertBoolean({})", value),
            Computation::InstanceOf {
                value,
                ty,
                negate_result,
                ..
            } => write!(
                f,
                "InstanceOf({} {} {})",
                value,
                if *negate_result { "is!" } else { "is" },
                ty
            ),
            Computation::InstantiateTypeArguments { instantiator, .. } => {
                write!(f, "InstantiateTypeArguments({})", instantiator)
            }
            Computation::ExtractConstructorTypeArguments { instantiator, .. } => {
                write!(f, "ExtractConstructorTypeArguments({})", instantiator)
            }
            Computation::ExtractConstructorInstantiator { instantiator, .. } => {
                write!(f, "ExtractConstructorInstantiator({})", instantiator)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skua_ast::{ScopeId, VarIndex};

    fn local(name: &str) -> LocalVariable {
        LocalVariable::new(
            name,
            AbstractType::dynamic(),
            TokenPos(0),
            ScopeId(0),
            VarIndex::Stack(0),
        )
    }

    #[test]
    fn test_input_counts() {
        let pos = TokenPos(0);
        assert_eq!(
            Computation::Constant {
                token_pos: pos,
                literal: Instance::Null
            }
            .input_count(),
            0
        );
        assert_eq!(
            Computation::LoadLocal {
                local: local("x"),
                context_level: 0
            }
            .input_count(),
            0
        );
        assert_eq!(
            Computation::StoreLocal {
                local: local("x"),
                value: Value::constant(Instance::Null),
                context_level: 0
            }
            .input_count(),
            1
        );
        assert_eq!(
            Computation::StrictCompare {
                kind: TokenKind::EqStrict,
                left: Value::constant(Instance::Null),
                right: Value::constant(Instance::Null),
            }
            .input_count(),
            2
        );
        assert_eq!(
            Computation::AssertAssignable {
                token_pos: pos,
                try_index: None,
                value: Value::constant(Instance::Null),
                instantiator: Value::constant(Instance::Null),
                instantiator_type_arguments: Value::constant(Instance::Null),
                dst_type: AbstractType::dynamic(),
                dst_name: "x".to_string(),
            }
            .input_count(),
            3
        );
    }

    #[test]
    fn test_call_input_count_tracks_arguments() {
        let call = Computation::InstanceCall {
            token_pos: TokenPos(0),
            try_index: None,
            function_name: "+".to_string(),
            token_kind: TokenKind::Add,
            arguments: vec![
                Value::constant(Instance::Smi(1)),
                Value::constant(Instance::Smi(2)),
            ],
            argument_names: vec![],
            checked_argument_count: 2,
        };
        assert_eq!(call.input_count(), 2);
    }

    #[test]
    fn test_create_array_counts_element_type() {
        let create = Computation::CreateArray {
            token_pos: TokenPos(0),
            try_index: None,
            elements: vec![Value::constant(Instance::Smi(1))],
            element_type: Value::constant(Instance::Null),
        };
        assert_eq!(create.input_count(), 2);
    }

    #[test]
    fn test_store_local_accessors() {
        let comp = Computation::StoreLocal {
            local: local("x"),
            value: Value::constant(Instance::Smi(5)),
            context_level: 0,
        };
        assert!(comp.is_store_local());
        let (var, value) = comp.as_store_local().unwrap();
        assert_eq!(var.name, "x");
        assert_eq!(value.as_literal(), Some(&Instance::Smi(5)));
    }
}
