//! Lowering of the typed tree to SSA IR
//!
//! Generic code is monomorphized on demand: lowering starts from the roots
//! (the entry function, or every non-generic body) and every call requests
//! an instance keyed by its mangled name, e.g. `id<int>` or `Stack.pop<int>`.
//! Trait method calls on generic receivers are resolved against the concrete
//! receiver type here.

mod builder;
mod expressions;
mod matches;

use crate::concurrency::ConcurrencyInfo;
use crate::context::UnitContext;
use crate::error::{at, Diagnostics, LoweringError};
use crate::ir::IrModule;
use crate::traits::{ImplId, ImplSource, Resolution};
use crate::typed_ast::{FunctionKey, TypedFunction, TypedProgram};
use crate::types::Type;
use crate::CompilerOptions;
use builder::FunctionBuilder;
use std::collections::VecDeque;
use tracing::{debug, instrument, trace};
use vela_ast::Span;

/// Instance name of `base` applied to `type_args`
pub fn mangle(base: &str, type_args: &[Type]) -> String {
    if type_args.is_empty() {
        return base.to_string();
    }
    let args = type_args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{base}<{args}>")
}

/// Monomorphize and lower a checked, concurrency-lowered program
#[instrument(skip_all, fields(functions = program.functions.len()))]
pub fn lower_program(
    program: &TypedProgram,
    context: &UnitContext,
    concurrency: &ConcurrencyInfo,
    options: &CompilerOptions,
) -> Result<IrModule, Diagnostics> {
    let mut lowering = ModuleLowering::new(program, context);

    match &options.entry {
        Some(entry) => {
            let key = FunctionKey::Free(entry.clone());
            match program.function(&key) {
                Some(function) if function.generics.is_empty() => {
                    lowering.request(function, Vec::new());
                }
                _ => lowering.diagnostics.push(LoweringError::UnknownEntry { name: entry.clone() }),
            }
        }
        None => {
            for function in program.functions.iter().filter(|function| function.generics.is_empty()) {
                lowering.request(function, Vec::new());
            }
        }
    }

    while let Some(instance) = lowering.queue.pop_front() {
        trace!(instance = %instance.name, "lowering instance");
        let ir = FunctionBuilder::lower_instance(&mut lowering, instance.function, &instance.type_args, &instance.name);
        if let Some(machine) = concurrency.state_machine(&instance.function.key.to_string()) {
            trace!(instance = %instance.name, segments = machine.segments, "async instance");
        }
        lowering.module.functions.insert(instance.name.clone(), ir);
    }

    if !lowering.diagnostics.is_empty() {
        return Err(lowering.diagnostics);
    }
    debug!(instances = lowering.module.functions.len(), "monomorphized program");
    Ok(lowering.module)
}

/// One requested instance of a checked function
struct Instance<'p> {
    function: &'p TypedFunction,
    type_args: Vec<Type>,
    name: String,
}

/// A requested instance as seen by its caller
pub(crate) struct Requested {
    pub name: String,
    pub is_async: bool,
    /// Parameter types including the receiver
    pub params: Vec<Type>,
    pub ret: Type,
}

pub(crate) struct ModuleLowering<'p> {
    program: &'p TypedProgram,
    context: &'p UnitContext,
    pub(crate) module: IrModule,
    queue: VecDeque<Instance<'p>>,
    /// Names of every requested instance, lowered or queued
    requested: indexmap::IndexSet<String>,
    pub(crate) diagnostics: Diagnostics,
}

impl<'p> ModuleLowering<'p> {
    fn new(program: &'p TypedProgram, context: &'p UnitContext) -> Self {
        Self {
            program,
            context,
            module: IrModule::default(),
            queue: VecDeque::new(),
            requested: indexmap::IndexSet::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub(crate) fn context(&self) -> &'p UnitContext {
        self.context
    }

    /// Queue an instance unless it was already requested
    fn request(&mut self, function: &'p TypedFunction, type_args: Vec<Type>) -> Requested {
        let name = mangle(&function.key.to_string(), &type_args);
        let (params, ret) = FunctionBuilder::instance_signature(function, &type_args);
        if self.requested.insert(name.clone()) {
            self.queue.push_back(Instance {
                function,
                type_args,
                name: name.clone(),
            });
        }
        Requested {
            name,
            is_async: function.is_async,
            params,
            ret,
        }
    }

    fn request_key(&mut self, key: &FunctionKey, type_args: Vec<Type>, span: Span) -> Option<Requested> {
        let program = self.program;
        let found = program.functions.iter().find(|function| match (&function.key, key) {
            (
                FunctionKey::ImplMethod {
                    impl_id, method, ..
                },
                FunctionKey::ImplMethod {
                    impl_id: wanted,
                    method: wanted_method,
                    ..
                },
            ) => impl_id == wanted && method == wanted_method,
            (found, wanted) => found == wanted,
        });
        match found {
            Some(function) => Some(self.request(function, type_args)),
            None => {
                self.diagnostics.push(LoweringError::MissingBody {
                    name: key.to_string(),
                    span: at(span),
                });
                None
            }
        }
    }

    pub(crate) fn request_function(&mut self, name: &str, type_args: Vec<Type>, span: Span) -> Option<Requested> {
        self.request_key(&FunctionKey::Free(name.to_string()), type_args, span)
    }

    pub(crate) fn request_class_method(
        &mut self,
        class: &str,
        method: &str,
        type_args: Vec<Type>,
        span: Span,
    ) -> Option<Requested> {
        let key = FunctionKey::ClassMethod {
            class: class.to_string(),
            method: method.to_string(),
        };
        self.request_key(&key, type_args, span)
    }

    pub(crate) fn request_impl_method(
        &mut self,
        impl_id: ImplId,
        method: &str,
        type_args: Vec<Type>,
        span: Span,
    ) -> Option<Requested> {
        let key = FunctionKey::ImplMethod {
            impl_id,
            display: String::new(),
            method: method.to_string(),
        };
        self.request_key(&key, type_args, span)
    }

    /// Pick the implementation of a trait method for a concrete receiver
    pub(crate) fn request_trait_method(
        &mut self,
        trait_name: &str,
        method: &str,
        receiver: &Type,
        span: Span,
    ) -> Option<Requested> {
        let traits = &self.context.traits;
        let found = match traits.resolve(receiver, trait_name, &[]) {
            Resolution::Impl(found) => traits
                .get_impl(found.impl_id)
                .map(|info| (info.source.clone(), info.id, found.type_args(info))),
            _ => None,
        };
        match found {
            Some((ImplSource::Class(class), _, type_args)) => {
                self.request_class_method(&class, method, type_args, span)
            }
            Some((ImplSource::Block, impl_id, type_args)) => {
                self.request_impl_method(impl_id, method, type_args, span)
            }
            Some((ImplSource::Builtin, _, _)) | None => {
                self.diagnostics.push(LoweringError::UnresolvedTraitMethod {
                    trait_name: trait_name.to_string(),
                    method: method.to_string(),
                    ty: receiver.clone(),
                    span: at(span),
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mangle_generic_instances() {
        assert_eq!(mangle("id", &[]), "id");
        assert_eq!(mangle("id", &[Type::int()]), "id<int>");
        assert_eq!(
            mangle("Stack.pop", &[Type::list(Type::str())]),
            "Stack.pop<list<str>>"
        );
        assert_eq!(mangle("pair", &[Type::int(), Type::bool()]), "pair<int, bool>");
    }
}
