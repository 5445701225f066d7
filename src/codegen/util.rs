//! Declarations for the external C runtime and libc functions the
//! generator calls into. Grounded in the same "declare once, cache by
//! name" pattern `why_lib`'s codegen context uses for its external
//! symbols; mirrors the runtime export list verbatim.

use inkwell::values::FunctionValue;
use inkwell::AddressSpace;

use super::context::CodegenContext;

fn get_or_declare<'ctx>(
    ctx: &CodegenContext<'ctx>,
    name: &str,
    build: impl FnOnce(&CodegenContext<'ctx>) -> FunctionValue<'ctx>,
) -> FunctionValue<'ctx> {
    if let Some(existing) = ctx.module.get_function(name) {
        return existing;
    }
    build(ctx)
}

pub fn get_or_declare_malloc<'ctx>(ctx: &CodegenContext<'ctx>) -> FunctionValue<'ctx> {
    get_or_declare(ctx, "malloc", |ctx| {
        let i8ptr = ctx.context.i8_type().ptr_type(AddressSpace::default());
        let fn_type = i8ptr.fn_type(&[ctx.context.i64_type().into()], false);
        ctx.module.add_function("malloc", fn_type, None)
    })
}

pub fn get_or_declare_printf<'ctx>(ctx: &CodegenContext<'ctx>) -> FunctionValue<'ctx> {
    get_or_declare(ctx, "printf", |ctx| {
        let i8ptr = ctx.context.i8_type().ptr_type(AddressSpace::default());
        let fn_type = ctx.context.i32_type().fn_type(&[i8ptr.into()], true);
        ctx.module.add_function("printf", fn_type, None)
    })
}

pub fn get_or_declare_strcmp<'ctx>(ctx: &CodegenContext<'ctx>) -> FunctionValue<'ctx> {
    get_or_declare(ctx, "strcmp", |ctx| {
        let i8ptr = ctx.context.i8_type().ptr_type(AddressSpace::default());
        let fn_type = ctx
            .context
            .i32_type()
            .fn_type(&[i8ptr.into(), i8ptr.into()], false);
        ctx.module.add_function("strcmp", fn_type, None)
    })
}

/// Declare one of the `franz_*` runtime entry points on demand, with the
/// signature `(i8*...) -> i8*`. Every boxing/list/dict/print helper that
/// only ever moves Generic pointers around goes through this so the
/// declaration and the call site can never drift apart.
pub fn get_or_declare_runtime<'ctx>(
    ctx: &CodegenContext<'ctx>,
    name: &str,
    arity: usize,
) -> FunctionValue<'ctx> {
    get_or_declare(ctx, name, |ctx| {
        let i8ptr = ctx.context.i8_type().ptr_type(AddressSpace::default());
        let params = vec![i8ptr.into(); arity];
        let fn_type = i8ptr.fn_type(&params, false);
        ctx.module.add_function(name, fn_type, None)
    })
}

/// Declare a `franz_*` entry point whose parameters are not all plain
/// Generic pointers - `franz_box_int`/`franz_box_float` take the raw
/// scalar being boxed, and `franz_format_int`/`franz_format_float` take
/// an `i64` value alongside an `i64` base/precision. The return type is
/// still always `i8*`, matching every other runtime entry point.
pub fn get_or_declare_runtime_with_params<'ctx>(
    ctx: &CodegenContext<'ctx>,
    name: &str,
    params: &[inkwell::types::BasicMetadataTypeEnum<'ctx>],
) -> FunctionValue<'ctx> {
    get_or_declare(ctx, name, |ctx| {
        let i8ptr = ctx.context.i8_type().ptr_type(AddressSpace::default());
        let fn_type = i8ptr.fn_type(params, false);
        ctx.module.add_function(name, fn_type, None)
    })
}
