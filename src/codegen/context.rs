//! Code generation context and symbol maps.
//!
//! `CodegenContext` owns the LLVM context, module and builder for the
//! lifetime of one compilation unit, exactly as `why_lib`'s
//! `CodegenContext` does; `Scope` is the per-function-body symbol table
//! that gets pushed when entering a closure body and popped on exit, so
//! captures and locals never leak between sibling closures.

use std::collections::{HashMap, HashSet};

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::values::{BasicValueEnum, FunctionValue, IntValue, PointerValue};
use inkwell::basic_block::BasicBlock;

use crate::infer::Signature;
use crate::types::ReturnTag;

/// Either the value itself (SSA, immutable) or the alloca backing it
/// (mutable - `set!`/reassignment stores through the pointer). Mirrors
/// the `variables` map's documented invariant directly.
#[derive(Debug, Clone)]
pub enum VarSlot<'ctx> {
    Immutable(BasicValueEnum<'ctx>),
    Mutable(PointerValue<'ctx>, inkwell::types::BasicTypeEnum<'ctx>),
}

#[derive(Debug, Default)]
pub struct Scope<'ctx> {
    pub variables: HashMap<String, VarSlot<'ctx>>,
    /// Runtime type tag (an `i32` IR value) for each closure parameter
    /// bound in this scope - set while lowering the parameter-binding
    /// prologue of a closure body, consulted by the `type` builtin.
    pub param_type_tags: HashMap<String, IntValue<'ctx>>,
}

pub struct LoopFrame<'ctx> {
    pub exit_block: BasicBlock<'ctx>,
    pub incr_block: BasicBlock<'ctx>,
}

pub struct CodegenContext<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,

    /// Lexical stack of scopes; the last entry is the innermost. Pushed
    /// on entering a closure body, popped on leaving it.
    pub scopes: Vec<Scope<'ctx>>,

    pub functions: HashMap<String, FunctionValue<'ctx>>,
    /// Every top-level function's inferred signature, discovered before
    /// any body is compiled. Consulted when a nested closure's body
    /// calls a top-level function, so the call's return type doesn't
    /// need to fall back to `Unknown` just because the callee lives
    /// outside the closure being compiled.
    pub known_functions: HashMap<String, Signature>,
    pub closures: HashSet<String>,
    pub global_symbols: HashSet<String>,
    pub generic_variables: HashSet<String>,
    pub void_variables: HashSet<String>,
    pub type_metadata: HashMap<String, String>,
    pub return_type_tags: HashMap<String, ReturnTag>,

    pub loop_stack: Vec<LoopFrame<'ctx>>,

    pub enable_tco: bool,
    pub in_tail_position: bool,

    lambda_counter: std::cell::Cell<usize>,
}

impl<'ctx> CodegenContext<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str, enable_tco: bool) -> Self {
        let module = context.create_module(module_name);
        let builder = context.create_builder();

        let mut global_symbols = HashSet::new();
        for name in super::builtins::BUILTIN_NAMES {
            global_symbols.insert((*name).to_string());
        }

        Self {
            context,
            module,
            builder,
            scopes: vec![Scope::default()],
            functions: HashMap::new(),
            known_functions: HashMap::new(),
            closures: HashSet::new(),
            global_symbols,
            generic_variables: HashSet::new(),
            void_variables: HashSet::new(),
            type_metadata: HashMap::new(),
            return_type_tags: HashMap::new(),
            loop_stack: Vec::new(),
            enable_tco,
            in_tail_position: false,
            lambda_counter: std::cell::Cell::new(0),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) -> Scope<'ctx> {
        self.scopes.pop().expect("scope stack underflow")
    }

    pub fn scope(&self) -> &Scope<'ctx> {
        self.scopes.last().expect("no active scope")
    }

    pub fn scope_mut(&mut self) -> &mut Scope<'ctx> {
        self.scopes.last_mut().expect("no active scope")
    }

    /// Look a name up starting at the innermost scope and walking
    /// outward. Unlike a real lexical-scope chain, captured names are
    /// materialized into the innermost scope by closure lowering before
    /// the body is compiled, so this rarely needs to walk past index 0;
    /// it still checks every scope because top-level constants live in
    /// the outermost one.
    pub fn lookup_variable(&self, name: &str) -> Option<&VarSlot<'ctx>> {
        self.scopes.iter().rev().find_map(|s| s.variables.get(name))
    }

    pub fn fresh_lambda_name(&self) -> String {
        let n = self.lambda_counter.get();
        self.lambda_counter.set(n + 1);
        format!("__franz_lambda_{n}")
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.global_symbols.contains(name) || self.functions.contains_key(name)
    }
}
