//! C4 - LLVM IR generator.
//!
//! `codegen_node` is the single dispatch point every opcode goes
//! through; `compile_program` drives the three passes over a whole
//! module: discover every top-level function's signature, forward-
//! declare them (so mutual and out-of-order calls resolve), then
//! compile every body plus the remaining top-level statements in
//! source order. Grounded in `why_lib`'s `Codegen` trait dispatch and
//! its `Compiler::compile_program` driver.

pub mod builtins;
pub mod call;
pub mod closures;
pub mod context;
pub mod util;

use std::collections::HashMap;

use inkwell::types::BasicMetadataTypeEnum;
use inkwell::values::BasicValueEnum;
use inkwell::AddressSpace;

use crate::ast::{Node, Opcode};
use crate::error::{ArgumentCount, FranzError, ImmutableReassignment, IrVerification, ParseError, UndefinedVariable};
use crate::infer::{infer_function, Signature};
use crate::span::Span;
use crate::types::Type;

use context::{CodegenContext, VarSlot};

/// Compile a whole program into `ctx.module`, emitting a `main` that
/// runs every top-level statement in source order.
pub fn compile_program<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    program: &[Node],
) -> Result<(), FranzError> {
    // Pass 1: signature discovery, in source order. A function calling
    // one declared later in the file sees `Unknown` for that call -
    // `Unknown` is handled safely everywhere downstream, so this never
    // produces invalid IR, only a less precise static type.
    let mut known_functions: HashMap<String, Signature> = HashMap::new();
    for node in program {
        if node.opcode != Opcode::Assignment {
            continue;
        }
        if let Some(func) = node.children.first().filter(|c| c.opcode == Opcode::Function) {
            let sig = infer_function(file, func, &known_functions)?;
            known_functions.insert(node.value.clone(), sig);
        }
    }
    ctx.known_functions = known_functions.clone();

    // Pass 2: forward-declare every top-level function from its
    // discovered signature.
    for node in program {
        if node.opcode != Opcode::Assignment {
            continue;
        }
        if node.children.first().map(|c| c.opcode) != Some(Opcode::Function) {
            continue;
        }
        let sig = known_functions.get(&node.value).expect("discovered in pass 1");
        let param_types: Vec<BasicMetadataTypeEnum> = sig
            .param_types
            .iter()
            .map(|t| closures::llvm_type_for(ctx, *t).into())
            .collect();
        let ret_ty = closures::llvm_type_for(ctx, sig.return_type);
        let fn_type = ret_ty.fn_type(&param_types, false);
        let declared = ctx.module.add_function(&node.value, fn_type, None);
        ctx.functions.insert(node.value.clone(), declared);
    }

    // `main` hosts every top-level non-function assignment and bare
    // expression statement, executed in source order.
    let main_fn_type = ctx.context.i32_type().fn_type(&[], false);
    let main = ctx.module.add_function("main", main_fn_type, None);
    let entry = ctx.context.append_basic_block(main, "entry");
    ctx.builder.position_at_end(entry);

    for node in program {
        match node.opcode {
            Opcode::Assignment if node.children.first().map(|c| c.opcode) == Some(Opcode::Function) => {
                let func = &node.children[0];
                let forward = ctx.functions.get(&node.value).copied();
                let (encoded, tag, _sig) =
                    closures::lower_function(ctx, file, &node.value, func, &known_functions, forward)?;
                ctx.closures.insert(node.value.clone());
                ctx.return_type_tags.insert(node.value.clone(), tag);
                ctx.scope_mut().variables.insert(node.value.clone(), VarSlot::Immutable(encoded.into()));
            }
            _ => {
                let _ = codegen_node(ctx, node)?;
            }
        }
    }

    ctx.builder.build_return(Some(&ctx.context.i32_type().const_zero())).unwrap();

    ctx.module
        .verify()
        .map_err(|e| FranzError::IrVerification(IrVerification { message: e.to_string() }, Span::new(file, 0)))
}

/// Dispatch one AST node to its code generator. Every opcode funnels
/// through here, including recursively from `closures`/`call`/
/// `builtins`, which is why this lives at the module root rather than
/// behind a narrower entry point.
pub fn codegen_node<'ctx>(ctx: &mut CodegenContext<'ctx>, node: &Node) -> Result<BasicValueEnum<'ctx>, FranzError> {
    match node.opcode {
        Opcode::Int => {
            let v: i64 = node.value.parse().map_err(|_| {
                FranzError::Parse(
                    ParseError { message: format!("'{}' is not a valid integer literal", node.value) },
                    Span::new("", node.line),
                )
            })?;
            Ok(ctx.context.i64_type().const_int(v as u64, true).into())
        }
        Opcode::Float => {
            let v: f64 = node.value.parse().unwrap_or(0.0);
            Ok(ctx.context.f64_type().const_float(v).into())
        }
        Opcode::String => Ok(ctx
            .builder
            .build_global_string_ptr(&node.value, "str")
            .unwrap()
            .as_pointer_value()
            .into()),
        Opcode::Identifier => codegen_identifier(ctx, node),
        Opcode::List => {
            let mut values = Vec::with_capacity(node.children.len());
            for child in &node.children {
                values.push(codegen_node(ctx, child)?);
            }
            Ok(builtins::build_list_literal(ctx, values))
        }
        Opcode::Statement => {
            let mut last = builtins::void_marker(ctx);
            for child in &node.children {
                last = codegen_node(ctx, child)?;
            }
            Ok(last)
        }
        Opcode::Return => codegen_return(ctx, node),
        Opcode::Function => {
            let name_hint = ctx.fresh_lambda_name();
            let known = ctx.known_functions.clone();
            let (encoded, _tag, _sig) = closures::lower_function(ctx, "", &name_hint, node, &known, None)?;
            Ok(encoded.into())
        }
        Opcode::Assignment => codegen_assignment(ctx, node),
        Opcode::Application => codegen_application(ctx, node),
    }
}

fn codegen_identifier<'ctx>(ctx: &mut CodegenContext<'ctx>, node: &Node) -> Result<BasicValueEnum<'ctx>, FranzError> {
    match ctx.lookup_variable(&node.value) {
        Some(VarSlot::Immutable(v)) => Ok(*v),
        Some(VarSlot::Mutable(ptr, ty)) => {
            let ptr = *ptr;
            let ty = *ty;
            Ok(ctx.builder.build_load(ty, ptr, &node.value).unwrap())
        }
        None => Err(FranzError::UndefinedVariable(
            UndefinedVariable { name: node.value.clone() },
            Span::new("", node.line),
        )),
    }
}

/// Loop-aware `<-`: outside a loop it's the function body's yielded
/// value; inside one, it's a conditional early exit that breaks only
/// when the yielded value is truthy (non-zero/non-null) - a void or
/// zero result lets the loop keep iterating, matching search-style
/// patterns like `loop { <- (when (is x target) x) }`.
fn codegen_return<'ctx>(ctx: &mut CodegenContext<'ctx>, node: &Node) -> Result<BasicValueEnum<'ctx>, FranzError> {
    let value = codegen_node(ctx, &node.children[0])?;

    let Some(frame) = ctx.loop_stack.last() else {
        return Ok(value);
    };
    let exit_block = frame.exit_block;

    let should_break = match value {
        BasicValueEnum::IntValue(i) => ctx
            .builder
            .build_int_compare(inkwell::IntPredicate::NE, i, i.get_type().const_zero(), "return.truthy")
            .unwrap(),
        BasicValueEnum::FloatValue(f) => ctx
            .builder
            .build_float_compare(inkwell::FloatPredicate::ONE, f, f.get_type().const_zero(), "return.truthy")
            .unwrap(),
        BasicValueEnum::PointerValue(p) => ctx.builder.build_is_not_null(p, "return.truthy").unwrap(),
        _ => ctx.context.bool_type().const_zero(),
    };

    let function = ctx.builder.get_insert_block().unwrap().get_parent().unwrap();
    let continue_bb = ctx.context.append_basic_block(function, "return.continue");
    ctx.builder.build_conditional_branch(should_break, exit_block, continue_bb).unwrap();
    ctx.builder.position_at_end(continue_bb);
    Ok(builtins::void_marker(ctx))
}

/// Literal opcodes have a type name `compile_type` can hand back
/// directly without touching the compiled value.
fn static_type_name(node: &Node) -> Option<&'static str> {
    match node.opcode {
        Opcode::Int => Some("int"),
        Opcode::Float => Some("float"),
        Opcode::String => Some("string"),
        Opcode::List => Some("list"),
        _ => None,
    }
}

const VOID_PRODUCING_BUILTINS: &[&str] = &["set!", "println", "print", "break", "continue", "write_file"];

fn produces_void(node: &Node) -> bool {
    node.opcode == Opcode::Application && VOID_PRODUCING_BUILTINS.contains(&node.value.as_str())
}

/// A nested assignment: `x = e` inside a function body, block, or
/// another closure's prologue. Reassigning a function parameter or a
/// top-level function name is an error; every other local is mutable
/// by default, matching the parser always marking `Assignment` nodes
/// `is_mutable`.
fn codegen_assignment<'ctx>(ctx: &mut CodegenContext<'ctx>, node: &Node) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if ctx.functions.contains_key(&node.value) {
        return Err(FranzError::ImmutableReassignment(
            ImmutableReassignment { name: node.value.clone() },
            Span::new("", node.line),
        ));
    }

    if let Some(VarSlot::Immutable(_)) = ctx.scope().variables.get(&node.value) {
        return Err(FranzError::ImmutableReassignment(
            ImmutableReassignment { name: node.value.clone() },
            Span::new("", node.line),
        ));
    }

    let existing = match ctx.scope().variables.get(&node.value) {
        Some(VarSlot::Mutable(ptr, ty)) => Some((*ptr, *ty)),
        _ => None,
    };

    let rhs = &node.children[0];
    let value = if rhs.opcode == Opcode::Function {
        let name_hint = format!("{}_{}", node.value, ctx.fresh_lambda_name());
        let known = ctx.known_functions.clone();
        let (encoded, _tag, _sig) = closures::lower_function(ctx, "", &name_hint, rhs, &known, None)?;
        encoded.into()
    } else {
        codegen_node(ctx, rhs)?
    };

    // Track what this binding statically looks like so `maybe_unbox`,
    // the `is` builtin's void check, and `type` can answer without
    // re-deriving it from the value itself (which, once stored, is just
    // an opaque LLVM value with no tag attached).
    ctx.generic_variables.remove(&node.value);
    ctx.void_variables.remove(&node.value);
    ctx.type_metadata.remove(&node.value);
    if rhs.opcode == Opcode::Application && rhs.value == "ref" {
        ctx.generic_variables.insert(node.value.clone());
    } else if let Some(name) = static_type_name(rhs) {
        ctx.type_metadata.insert(node.value.clone(), name.to_string());
    }
    if produces_void(rhs) {
        ctx.void_variables.insert(node.value.clone());
    }

    match existing {
        Some((ptr, ty)) => {
            let adapted = call::adapt_value_to_type(ctx, value, ty);
            ctx.builder.build_store(ptr, adapted).unwrap();
        }
        None => {
            let ptr = ctx.builder.build_alloca(value.get_type(), &node.value).unwrap();
            ctx.builder.build_store(ptr, value).unwrap();
            ctx.scope_mut().variables.insert(node.value.clone(), VarSlot::Mutable(ptr, value.get_type()));
        }
    }

    Ok(builtins::void_marker(ctx))
}

/// An `APPLICATION` is either a builtin, a direct call to a known
/// top-level function (compiled against its natural ABI for
/// efficiency), or a call through a closure value bound to a variable.
fn codegen_application<'ctx>(ctx: &mut CodegenContext<'ctx>, node: &Node) -> Result<BasicValueEnum<'ctx>, FranzError> {
    let head = node.value.as_str();

    if builtins::is_builtin(head) {
        return builtins::compile_application(ctx, "", node);
    }

    // A function whose return rides on a parameter's runtime tag (bare
    // terminal reference, `returns_param.is_some()`) or whose return
    // type was never pinned down by inference compiles its natural ABI
    // uniformly to `i8*`, which can only round-trip correctly through
    // the closure call path's per-call tag resolution - the natural
    // fast path below would freeze it to whatever the first call site
    // happened to produce.
    let is_dynamic_return = ctx
        .known_functions
        .get(head)
        .map(|sig| sig.returns_param.is_some() || sig.return_type == Type::Unknown)
        .unwrap_or(false);

    if let Some(natural) = (!is_dynamic_return).then(|| ctx.functions.get(head).copied()).flatten() {
        if node.children.len() != natural.count_params() as usize {
            return Err(FranzError::ArgumentCount(
                ArgumentCount {
                    builtin: head.to_string(),
                    expected: natural.count_params() as usize,
                    actual: node.children.len(),
                },
                Span::new("", node.line),
            ));
        }
        let declared_types = natural.get_type().get_param_types();
        let mut args = Vec::with_capacity(node.children.len());
        for (child, declared) in node.children.iter().zip(declared_types.iter()) {
            let value = codegen_node(ctx, child)?;
            args.push(call::adapt_value_to_type(ctx, value, *declared).into());
        }
        let result = ctx.builder.build_call(natural, &args, "call").unwrap().try_as_basic_value();
        return Ok(result.left().unwrap_or_else(|| {
            ctx.context.i8_type().ptr_type(AddressSpace::default()).const_null().into()
        }));
    }

    match ctx.lookup_variable(head).cloned() {
        Some(VarSlot::Immutable(v)) => {
            let closure = call::closure_i64_from_value(ctx, v);
            let mut args = Vec::with_capacity(node.children.len());
            for child in &node.children {
                args.push(codegen_node(ctx, child)?);
            }
            Ok(call::call_closure(ctx, closure, args))
        }
        Some(VarSlot::Mutable(ptr, ty)) => {
            let loaded = ctx.builder.build_load(ty, ptr, head).unwrap();
            let closure = call::closure_i64_from_value(ctx, loaded);
            let mut args = Vec::with_capacity(node.children.len());
            for child in &node.children {
                args.push(codegen_node(ctx, child)?);
            }
            Ok(call::call_closure(ctx, closure, args))
        }
        None => Err(FranzError::UndefinedVariable(
            UndefinedVariable { name: head.to_string() },
            Span::new("", node.line),
        )),
    }
}
