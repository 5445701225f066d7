//! C3 - Closure lowering.
//!
//! Every function literal - named top-level function or nested lambda,
//! capturing or not - is transformed into a closure record with the
//! uniform four-field ABI `{fn_ptr, env_ptr, return_tag, param_index}`.
//! Capturing functions get a heap-allocated environment built from their
//! free variables; non-capturing functions keep their natural signature
//! and get a generated wrapper (see [`super::call`]) so that direct
//! calls, first-class use, and higher-order callbacks are
//! indistinguishable at the call site. Grounded in `why_lib`'s
//! `codegen_capturing_lambda` / `codegen_non_capturing_lambda` pair.

use std::collections::HashMap;

use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum};
use inkwell::values::{BasicValue, BasicValueEnum, FunctionValue, IntValue, PointerValue};
use inkwell::AddressSpace;

use crate::ast::{Node, Opcode};
use crate::error::FranzError;
use crate::infer::{infer_function, Signature};
use crate::types::{ReturnTag, Type};

use super::context::{CodegenContext, VarSlot};

/// The ABI-visible closure record: `{fn_ptr: i8*, env_ptr: i8*,
/// return_tag: i32, param_index: i32}`.
pub fn closure_record_type<'ctx>(ctx: &CodegenContext<'ctx>) -> inkwell::types::StructType<'ctx> {
    let i8ptr = ctx.context.i8_type().ptr_type(AddressSpace::default());
    let i32t = ctx.context.i32_type();
    ctx.context.struct_type(&[i8ptr.into(), i8ptr.into(), i32t.into(), i32t.into()], false)
}

/// `(i8* env, i64, i32, i64, i32, ...) -> i8*` - the signature every
/// closure-bearing function pointer is called through at a call site,
/// regardless of what it was originally declared with. `arity` is taken
/// from the call site's own argument count, which is always statically
/// known (see C5's call-site protocol).
pub fn universal_fn_type<'ctx>(
    ctx: &CodegenContext<'ctx>,
    arity: usize,
) -> inkwell::types::FunctionType<'ctx> {
    let i8ptr = ctx.context.i8_type().ptr_type(AddressSpace::default());
    let i64t = ctx.context.i64_type();
    let i32t = ctx.context.i32_type();

    let mut params: Vec<BasicMetadataTypeEnum> = vec![i8ptr.into()];
    for _ in 0..arity {
        params.push(i64t.into());
        params.push(i32t.into());
    }
    i8ptr.fn_type(&params, false)
}

pub(crate) fn llvm_type_for<'ctx>(ctx: &CodegenContext<'ctx>, ty: Type) -> BasicTypeEnum<'ctx> {
    match ty {
        Type::Int => ctx.context.i64_type().into(),
        Type::Float => ctx.context.f64_type().into(),
        Type::String | Type::List | Type::Unknown | Type::Void => {
            ctx.context.i8_type().ptr_type(AddressSpace::default()).into()
        }
    }
}

/// malloc a closure record and populate its four fields. Returns the
/// record pointer, which the caller encodes as `i64` via `ptrtoint`
/// before storing it anywhere (the closure record travels as a plain
/// integer so it composes with the universal value representation).
pub fn build_closure_record<'ctx>(
    ctx: &CodegenContext<'ctx>,
    fn_ptr: PointerValue<'ctx>,
    env_ptr: PointerValue<'ctx>,
    return_tag: IntValue<'ctx>,
    param_index: IntValue<'ctx>,
) -> PointerValue<'ctx> {
    let record_ty = closure_record_type(ctx);
    let malloc = super::util::get_or_declare_malloc(ctx);
    let size = record_ty.size_of().expect("sized closure record");
    let raw = ctx
        .builder
        .build_call(malloc, &[size.into()], "closure.raw")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap()
        .into_pointer_value();
    let record = ctx
        .builder
        .build_bit_cast(raw, record_ty.ptr_type(AddressSpace::default()), "closure.rec")
        .unwrap()
        .into_pointer_value();

    let i8ptr = ctx.context.i8_type().ptr_type(AddressSpace::default());
    let fn_ptr_cast = ctx.builder.build_bit_cast(fn_ptr, i8ptr, "closure.fnptr").unwrap();

    let p0 = ctx.builder.build_struct_gep(record_ty, record, 0, "closure.fnptr.slot").unwrap();
    ctx.builder.build_store(p0, fn_ptr_cast).unwrap();
    let p1 = ctx.builder.build_struct_gep(record_ty, record, 1, "closure.envptr.slot").unwrap();
    ctx.builder.build_store(p1, env_ptr).unwrap();
    let p2 = ctx.builder.build_struct_gep(record_ty, record, 2, "closure.tag.slot").unwrap();
    ctx.builder.build_store(p2, return_tag).unwrap();
    let p3 = ctx.builder.build_struct_gep(record_ty, record, 3, "closure.paramidx.slot").unwrap();
    ctx.builder.build_store(p3, param_index).unwrap();

    record
}

pub fn load_closure_field<'ctx>(
    ctx: &CodegenContext<'ctx>,
    record: PointerValue<'ctx>,
    index: u32,
    name: &str,
) -> BasicValueEnum<'ctx> {
    let record_ty = closure_record_type(ctx);
    let slot = ctx.builder.build_struct_gep(record_ty, record, index, &format!("{name}.slot")).unwrap();
    let ty = record_ty.get_field_type_at_index(index).unwrap();
    ctx.builder.build_load(ty, slot, name).unwrap()
}

/// Precedence ladder from the closure-lowering return-tag rule: a
/// literal nested closure wins outright, then the "returns a bare
/// parameter" shape (the `DYNAMIC` trigger), then inference's verdict
/// when concrete, then whatever the generator otherwise observed.
pub fn determine_return_tag(body: &Node, sig: &Signature, fallback: Type) -> (ReturnTag, i32) {
    if terminal_is_function_literal(body) {
        return (ReturnTag::Closure, -1);
    }
    if let Some(idx) = sig.returns_param {
        return (ReturnTag::Dynamic, idx as i32);
    }
    match sig.return_type {
        Type::Int => (ReturnTag::Int, -1),
        Type::Float => (ReturnTag::Float, -1),
        _ => (ReturnTag::from_type(fallback), -1),
    }
}

fn terminal_is_function_literal(body: &Node) -> bool {
    let terminal = match body.opcode {
        Opcode::Statement => match body.children.last() {
            Some(n) => n,
            None => return false,
        },
        _ => body,
    };
    let terminal = match terminal.opcode {
        Opcode::Return => match terminal.children.first() {
            Some(n) => n,
            None => return false,
        },
        _ => terminal,
    };
    terminal.opcode == Opcode::Function
}

/// Lower a function literal (named top-level definition or nested
/// lambda) into a closure record value, encoded as the `i64` that
/// travels through `variables`/the universal calling convention.
///
/// `forward` is `Some(function_value)` for a top-level definition that
/// already has a Pass-2 forward declaration to compile into; `None` for
/// a nested lambda, which always gets a fresh function.
#[allow(clippy::too_many_arguments)]
pub fn lower_function<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    name_hint: &str,
    func: &Node,
    known_functions: &HashMap<String, Signature>,
    forward: Option<FunctionValue<'ctx>>,
) -> Result<(IntValue<'ctx>, ReturnTag, Signature), FranzError> {
    let sig = infer_function(file, func, known_functions)?;
    let captures: Vec<String> = func
        .free_vars
        .iter()
        .filter(|name| !ctx.is_global(name))
        .cloned()
        .collect();

    if captures.is_empty() {
        lower_non_capturing(ctx, name_hint, func, &sig, forward)
    } else {
        lower_capturing(ctx, name_hint, func, &sig, &captures)
    }
}

fn lower_non_capturing<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    name_hint: &str,
    func: &Node,
    sig: &Signature,
    forward: Option<FunctionValue<'ctx>>,
) -> Result<(IntValue<'ctx>, ReturnTag, Signature), FranzError> {
    let param_types: Vec<BasicMetadataTypeEnum> =
        sig.param_types.iter().map(|t| llvm_type_for(ctx, *t).into()).collect();
    let ret_llvm_ty = llvm_type_for(ctx, sig.return_type);
    let fn_type = ret_llvm_ty.fn_type(&param_types, false);

    let natural = forward.unwrap_or_else(|| ctx.module.add_function(name_hint, fn_type, None));

    let prior_block = ctx.builder.get_insert_block();
    let entry = ctx.context.append_basic_block(natural, "entry");
    ctx.builder.position_at_end(entry);
    ctx.push_scope();

    for (i, param_node) in func.params().iter().enumerate() {
        let value = natural.get_nth_param(i as u32).unwrap();
        ctx.scope_mut().variables.insert(param_node.value.clone(), VarSlot::Immutable(value));
    }

    let body_value = super::codegen_node(ctx, func.body())?;
    build_return(ctx, body_value, ret_llvm_ty);

    ctx.pop_scope();
    if let Some(block) = prior_block {
        ctx.builder.position_at_end(block);
    }

    let (return_tag, param_index) = determine_return_tag(func.body(), sig, sig.return_type);
    let wrapper = super::call::build_wrapper(ctx, name_hint, natural, &sig.param_types, sig.return_type);

    let null_env = ctx.context.i8_type().ptr_type(AddressSpace::default()).const_null();
    let tag_val = ctx.context.i32_type().const_int(return_tag.as_i32() as u64, false);
    let idx_val = ctx.context.i32_type().const_int(param_index as i64 as u64, true);
    let record = build_closure_record(ctx, wrapper.as_global_value().as_pointer_value(), null_env, tag_val, idx_val);
    let encoded = ctx
        .builder
        .build_ptr_to_int(record, ctx.context.i64_type(), "closure.encoded")
        .unwrap();

    Ok((encoded, return_tag, sig.clone()))
}

fn lower_capturing<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    name_hint: &str,
    func: &Node,
    sig: &Signature,
    captures: &[String],
) -> Result<(IntValue<'ctx>, ReturnTag, Signature), FranzError> {
    // 1. Build the environment record type from each capture's current
    // value type and heap-allocate + populate it (captures are taken by
    // value, loading an alloca first if the source is mutable).
    let mut field_types = Vec::new();
    let mut field_values = Vec::new();
    for capture in captures {
        let slot = ctx
            .lookup_variable(capture)
            .unwrap_or_else(|| panic!("capture '{capture}' missing from scope at lowering time"))
            .clone();
        let (ty, value) = match slot {
            VarSlot::Immutable(v) => (v.get_type(), v),
            VarSlot::Mutable(ptr, ty) => {
                let loaded = ctx.builder.build_load(ty, ptr, capture).unwrap();
                (ty, loaded)
            }
        };
        field_types.push(ty);
        field_values.push(value);
    }
    let env_record_ty = ctx.context.struct_type(&field_types, false);

    let malloc = super::util::get_or_declare_malloc(ctx);
    let env_size = env_record_ty.size_of().expect("sized environment record");
    let env_raw = ctx
        .builder
        .build_call(malloc, &[env_size.into()], "env.raw")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap()
        .into_pointer_value();
    let env_ptr = ctx
        .builder
        .build_bit_cast(env_raw, env_record_ty.ptr_type(AddressSpace::default()), "env.rec")
        .unwrap()
        .into_pointer_value();
    for (i, value) in field_values.into_iter().enumerate() {
        let slot = ctx
            .builder
            .build_struct_gep(env_record_ty, env_ptr, i as u32, "env.slot")
            .unwrap();
        ctx.builder.build_store(slot, value).unwrap();
    }

    // 2. Create the function with the universal signature
    // `(env: i8*, (arg_i: i64, tag_i: i32)*) -> i8*`.
    let arity = func.params().len();
    let fn_type = universal_fn_type(ctx, arity);
    let inner = ctx.module.add_function(name_hint, fn_type, None);

    let prior_block = ctx.builder.get_insert_block();
    let entry = ctx.context.append_basic_block(inner, "entry");
    ctx.builder.position_at_end(entry);
    ctx.push_scope();

    // 3. Cast `env` back and load captures into a fresh variables map.
    let raw_env = inner.get_nth_param(0).unwrap().into_pointer_value();
    let typed_env = ctx
        .builder
        .build_bit_cast(raw_env, env_record_ty.ptr_type(AddressSpace::default()), "env.typed")
        .unwrap()
        .into_pointer_value();
    for (i, capture) in captures.iter().enumerate() {
        let slot = ctx
            .builder
            .build_struct_gep(env_record_ty, typed_env, i as u32, "env.field")
            .unwrap();
        let ty = env_record_ty.get_field_type_at_index(i as u32).unwrap();
        let value = ctx.builder.build_load(ty, slot, capture).unwrap();
        ctx.scope_mut().variables.insert(capture.clone(), VarSlot::Immutable(value));
    }

    // 4. Bind parameters via tag-directed downcast from the universal
    // `(i64, i32)` pair into the inferred parameter type.
    for (i, param_node) in func.params().iter().enumerate() {
        let raw = inner.get_nth_param(1 + i as u32 * 2).unwrap().into_int_value();
        let tag = inner.get_nth_param(2 + i as u32 * 2).unwrap().into_int_value();
        let param_ty = sig.param_types.get(i).copied().unwrap_or(Type::Unknown);
        let value = super::call::downcast_universal_value(ctx, raw, tag, param_ty);
        ctx.scope_mut().param_type_tags.insert(param_node.value.clone(), tag);
        ctx.scope_mut().variables.insert(param_node.value.clone(), VarSlot::Immutable(value));
    }

    // 5/6. Compile the body, reconcile the terminal value against the
    // universal `i8*` return, emit `ret`.
    let body_value = super::codegen_node(ctx, func.body())?;
    let i8ptr = ctx.context.i8_type().ptr_type(AddressSpace::default());
    let universal = super::call::to_universal_return(ctx, body_value, sig.return_type);
    let casted = ctx.builder.build_bit_cast(universal, i8ptr, "ret.universal").unwrap();
    ctx.builder.build_return(Some(&casted)).unwrap();

    ctx.pop_scope();
    if let Some(block) = prior_block {
        ctx.builder.position_at_end(block);
    }

    // 7. Allocate the closure record; non-capturing's null env becomes
    // this function's real environment pointer.
    let (return_tag, param_index) = determine_return_tag(func.body(), sig, sig.return_type);
    let tag_val = ctx.context.i32_type().const_int(return_tag.as_i32() as u64, false);
    let idx_val = ctx.context.i32_type().const_int(param_index as i64 as u64, true);
    let env_i8ptr = ctx.builder.build_bit_cast(env_ptr, i8ptr, "env.i8").unwrap().into_pointer_value();
    let record = build_closure_record(ctx, inner.as_global_value().as_pointer_value(), env_i8ptr, tag_val, idx_val);
    let encoded = ctx
        .builder
        .build_ptr_to_int(record, ctx.context.i64_type(), "closure.encoded")
        .unwrap();

    Ok((encoded, return_tag, sig.clone()))
}

/// Adapt a compiled value to a function's declared natural return type
/// and emit `ret`, matching the integer-widen / float-bitcast / pointer
/// pass-through rule used for the universal return path but applied
/// directly to a concrete type (used by non-capturing, natural-ABI
/// functions, which do not go through `i8*`).
fn build_return<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>, declared: BasicTypeEnum<'ctx>) {
    let adapted = super::call::adapt_value_to_type(ctx, value, declared);
    ctx.builder.build_return(Some(&adapted)).unwrap();
}
