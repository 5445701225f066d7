//! C5 - Universal-value calling convention.
//!
//! The contract that lets any closure be passed, stored, and called
//! without its static signature: arguments travel as `(i64 value, i32
//! tag)` pairs, results travel as `i8*` plus an out-of-band return tag
//! read from the closure record. This is the glue that keeps the
//! monomorphic `INT -> INT` path free of boxing while still allowing
//! fully dynamic dispatch when tags demand it.

use inkwell::types::{BasicType, BasicTypeEnum};
use inkwell::values::{BasicValue, BasicValueEnum, FunctionValue, IntValue, PointerValue};
use inkwell::{AddressSpace, IntPredicate};

use crate::types::{ReturnTag, Type};

use super::closures::{load_closure_field, universal_fn_type};
use super::context::CodegenContext;

/// Runtime tag used at call sites - `LIST`/other boxed pointer -> tag 2
/// (`POINTER`), plain integer -> 0, plain float -> 1, string/closure/
/// other pointer -> 2, literal void -> 4. Matches `ReturnTag`'s
/// encoding exactly so the same constants serve both directions.
pub fn runtime_tag_of<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>) -> IntValue<'ctx> {
    let tag = match value {
        BasicValueEnum::IntValue(_) => ReturnTag::Int,
        BasicValueEnum::FloatValue(_) => ReturnTag::Float,
        BasicValueEnum::PointerValue(_) => ReturnTag::Pointer,
        _ => ReturnTag::Pointer,
    };
    ctx.context.i32_type().const_int(tag.as_i32() as u64, false)
}

/// Pack a value into the `(i64, i32)` universal-argument pair.
pub fn to_universal_arg<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: BasicValueEnum<'ctx>,
) -> (IntValue<'ctx>, IntValue<'ctx>) {
    let tag = runtime_tag_of(ctx, value);
    let i64t = ctx.context.i64_type();
    let packed = match value {
        BasicValueEnum::IntValue(i) => {
            ctx.builder.build_int_z_extend_or_bit_cast(i, i64t, "arg.i64").unwrap()
        }
        BasicValueEnum::FloatValue(f) => {
            ctx.builder.build_bit_cast(f, i64t, "arg.bits").unwrap().into_int_value()
        }
        BasicValueEnum::PointerValue(p) => {
            ctx.builder.build_ptr_to_int(p, i64t, "arg.ptr").unwrap()
        }
        other => panic!("unsupported universal argument value {other:?}"),
    };
    (packed, tag)
}

/// Downcast a `(value: i64, tag: i32)` pair back to `declared`, the
/// statically inferred parameter type. When the tag disagrees with
/// `declared` at runtime (inferred float but tag says int, etc.) this
/// performs a tag-directed fix-up via `select`/`bitcast` rather than
/// trusting the static type blindly.
pub fn downcast_universal_value<'ctx>(
    ctx: &CodegenContext<'ctx>,
    raw: IntValue<'ctx>,
    tag: IntValue<'ctx>,
    declared: Type,
) -> BasicValueEnum<'ctx> {
    match declared {
        Type::Int => {
            // if tag says FLOAT at runtime, the bit pattern is a double
            // reinterpreted as i64; truncate it back through a bitcast
            // then convert, otherwise treat raw as the integer directly.
            let is_float_tag = ctx
                .builder
                .build_int_compare(
                    IntPredicate::EQ,
                    tag,
                    ctx.context.i32_type().const_int(ReturnTag::Float.as_i32() as u64, false),
                    "tag.is_float",
                )
                .unwrap();
            let as_double = ctx.builder.build_bit_cast(raw, ctx.context.f64_type(), "raw.as_f64").unwrap();
            let as_double = as_double.into_float_value();
            let truncated = ctx
                .builder
                .build_float_to_signed_int(as_double, ctx.context.i64_type(), "raw.f_to_i")
                .unwrap();
            ctx.builder
                .build_select(is_float_tag, truncated, raw, "param.int")
                .unwrap()
        }
        Type::Float => {
            let is_int_tag = ctx
                .builder
                .build_int_compare(
                    IntPredicate::EQ,
                    tag,
                    ctx.context.i32_type().const_int(ReturnTag::Int.as_i32() as u64, false),
                    "tag.is_int",
                )
                .unwrap();
            let from_int = ctx
                .builder
                .build_signed_int_to_float(raw, ctx.context.f64_type(), "raw.i_to_f")
                .unwrap();
            let from_bits = ctx.builder.build_bit_cast(raw, ctx.context.f64_type(), "raw.as_f64").unwrap();
            ctx.builder
                .build_select(is_int_tag, from_int, from_bits, "param.float")
                .unwrap()
        }
        Type::String | Type::List | Type::Unknown | Type::Void => {
            let i8ptr = ctx.context.i8_type().ptr_type(AddressSpace::default());
            ctx.builder.build_int_to_ptr(raw, i8ptr, "param.ptr").unwrap().into()
        }
    }
}

/// Adapt a compiled value to a function's declared concrete return type
/// (natural-ABI path, used before the non-capturing function's `ret`).
pub fn adapt_value_to_type<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: BasicValueEnum<'ctx>,
    declared: BasicTypeEnum<'ctx>,
) -> BasicValueEnum<'ctx> {
    match (value, declared) {
        (BasicValueEnum::IntValue(i), BasicTypeEnum::FloatType(f)) => ctx
            .builder
            .build_signed_int_to_float(i, f, "adapt.i_to_f")
            .unwrap()
            .into(),
        (BasicValueEnum::FloatValue(fv), BasicTypeEnum::IntType(it)) => ctx
            .builder
            .build_float_to_signed_int(fv, it, "adapt.f_to_i")
            .unwrap()
            .into(),
        // a literal-closure terminal (return tag CLOSURE) compiles to
        // the i64-encoded closure record, but a function returning it
        // with an otherwise-Unknown signature declares its natural
        // return as `i8*` - reinterpret the bits as a pointer rather
        // than truncating through a numeric conversion.
        (BasicValueEnum::IntValue(i), BasicTypeEnum::PointerType(pt)) => {
            ctx.builder.build_int_to_ptr(i, pt, "adapt.i_to_ptr").unwrap().into()
        }
        _ => value,
    }
}

/// Convert a compiled terminal value to the universal `i8*` return
/// representation, per the closure-ABI round-trip law: integers widen
/// to `i64` then `inttoptr`; floats bitcast to `i64` then `inttoptr`;
/// pointers pass through a plain bitcast.
pub fn to_universal_return<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: BasicValueEnum<'ctx>,
    inferred: Type,
) -> PointerValue<'ctx> {
    let i8ptr = ctx.context.i8_type().ptr_type(AddressSpace::default());
    match (value, inferred) {
        (BasicValueEnum::IntValue(i), _) => {
            let widened = ctx.builder.build_int_z_extend_or_bit_cast(i, ctx.context.i64_type(), "ret.widen").unwrap();
            ctx.builder.build_int_to_ptr(widened, i8ptr, "ret.int").unwrap()
        }
        (BasicValueEnum::FloatValue(f), _) => {
            let bits = ctx.builder.build_bit_cast(f, ctx.context.i64_type(), "ret.bits").unwrap().into_int_value();
            ctx.builder.build_int_to_ptr(bits, i8ptr, "ret.float").unwrap()
        }
        (BasicValueEnum::PointerValue(p), _) => {
            ctx.builder.build_bit_cast(p, i8ptr, "ret.ptr").unwrap().into_pointer_value()
        }
        _ => i8ptr.const_null(),
    }
}

/// Convert the raw `i8*` universal return back to a usable value given
/// the (possibly runtime-resolved) return tag. Every tag is boxed into
/// a heap Generic - `select`'s operands must share one LLVM type, and
/// the call site has no static knowledge of which tag shows up, so the
/// merge itself has to happen in the one representation the runtime
/// offers that's self-describing at any type: a tagged `Generic*`.
/// INT/FLOAT/CLOSURE each get their own boxing call per spec; anything
/// else goes through the runtime's shape-guessing smart boxer.
pub fn from_universal_return<'ctx>(
    ctx: &CodegenContext<'ctx>,
    raw: PointerValue<'ctx>,
    tag: IntValue<'ctx>,
) -> BasicValueEnum<'ctx> {
    let i64t = ctx.context.i64_type();
    let as_int = ctx.builder.build_ptr_to_int(raw, i64t, "raw.as_i64").unwrap();
    let as_float = ctx.builder.build_bit_cast(as_int, ctx.context.f64_type(), "raw.as_f64").unwrap();

    let tag_is = |t: ReturnTag, name: &str| {
        ctx.builder
            .build_int_compare(IntPredicate::EQ, tag, ctx.context.i32_type().const_int(t.as_i32() as u64, false), name)
            .unwrap()
    };
    let is_int = tag_is(ReturnTag::Int, "tag.is_int");
    let is_float = tag_is(ReturnTag::Float, "tag.is_float");
    let is_closure = tag_is(ReturnTag::Closure, "tag.is_closure");

    let boxed_int = super::builtins::call_runtime_box_for(ctx, as_int.into());
    let boxed_float = super::builtins::call_runtime_box_for(ctx, as_float.into());
    let boxed_closure = super::builtins::call_runtime_box_closure(ctx, raw);
    let boxed_smart = super::builtins::call_runtime_box_pointer_smart(ctx, raw);

    let closure_or_smart =
        ctx.builder.build_select(is_closure, boxed_closure, boxed_smart, "ret.closure_or_smart").unwrap();
    let float_or_rest = ctx.builder.build_select(is_float, boxed_float, closure_or_smart, "ret.float_or_rest").unwrap();
    ctx.builder.build_select(is_int, boxed_int, float_or_rest, "ret.value").unwrap()
}

/// Emit a wrapper `wrap_f(env: i8*, (a_i64, a_tag), ...) -> i8*` that
/// adapts a natural-ABI function to the universal ABI, so non-capturing
/// functions can live in a closure record like every other callable.
pub fn build_wrapper<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    natural_name: &str,
    natural: FunctionValue<'ctx>,
    param_types: &[Type],
    return_type: Type,
) -> FunctionValue<'ctx> {
    let fn_type = universal_fn_type(ctx, param_types.len());
    let wrapper = ctx.module.add_function(&format!("wrap_{natural_name}"), fn_type, None);

    let prior_block = ctx.builder.get_insert_block();
    let entry = ctx.context.append_basic_block(wrapper, "entry");
    ctx.builder.position_at_end(entry);

    let mut args = Vec::new();
    for (i, param_ty) in param_types.iter().enumerate() {
        let raw = wrapper.get_nth_param(1 + i as u32 * 2).unwrap().into_int_value();
        let tag = wrapper.get_nth_param(2 + i as u32 * 2).unwrap().into_int_value();
        args.push(downcast_universal_value(ctx, raw, tag, *param_ty).into());
    }

    let result = ctx
        .builder
        .build_call(natural, &args, "wrap.call")
        .unwrap()
        .try_as_basic_value();

    let i8ptr = ctx.context.i8_type().ptr_type(AddressSpace::default());
    let universal = match result.left() {
        Some(value) => to_universal_return(ctx, value, return_type),
        None => i8ptr.const_null(),
    };
    ctx.builder.build_return(Some(&universal)).unwrap();

    if let Some(block) = prior_block {
        ctx.builder.position_at_end(block);
    }
    wrapper
}

/// A closure-bearing variable holds either the raw i64-encoded closure
/// record (direct function-literal assignment) or a boxed `Generic*`
/// (assigned from a dynamic call result routed through
/// `from_universal_return`). Both shapes are valid `VarSlot` payloads;
/// this normalizes either back to the raw i64 `call_closure` expects.
pub fn closure_i64_from_value<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>) -> IntValue<'ctx> {
    match value {
        BasicValueEnum::IntValue(i) => i,
        BasicValueEnum::PointerValue(p) => {
            let unbox_fn = super::util::get_or_declare_runtime(ctx, "franz_unbox_closure", 1);
            let raw = ctx
                .builder
                .build_call(unbox_fn, &[p.into()], "closure.unboxed")
                .unwrap()
                .try_as_basic_value()
                .left()
                .unwrap()
                .into_pointer_value();
            ctx.builder.build_ptr_to_int(raw, ctx.context.i64_type(), "closure.i64").unwrap()
        }
        other => panic!("unsupported closure value {other:?}"),
    }
}

/// Call-site protocol: decode the closure record, evaluate arguments
/// left-to-right, compute each argument's runtime tag, call through the
/// arity-specific universal function type, then resolve the return
/// value using `return_tag` (or, when `DYNAMIC`, the tag of argument
/// `param_index`).
pub fn call_closure<'ctx>(
    ctx: &CodegenContext<'ctx>,
    closure_i64: IntValue<'ctx>,
    args: Vec<BasicValueEnum<'ctx>>,
) -> BasicValueEnum<'ctx> {
    let i8ptr = ctx.context.i8_type().ptr_type(AddressSpace::default());
    let record_ptr_ty = super::closures::closure_record_type(ctx).ptr_type(AddressSpace::default());
    let record = ctx.builder.build_int_to_ptr(closure_i64, record_ptr_ty, "call.record").unwrap();

    let fn_ptr = load_closure_field(ctx, record, 0, "call.fn_ptr").into_pointer_value();
    let env_ptr = load_closure_field(ctx, record, 1, "call.env_ptr").into_pointer_value();
    let return_tag = load_closure_field(ctx, record, 2, "call.return_tag").into_int_value();
    let param_index = load_closure_field(ctx, record, 3, "call.param_index").into_int_value();

    let packed: Vec<(IntValue, IntValue)> = args.iter().map(|a| to_universal_arg(ctx, *a)).collect();

    let fn_type = universal_fn_type(ctx, args.len());
    let typed_fn_ptr = ctx
        .builder
        .build_bit_cast(fn_ptr, fn_type.ptr_type(AddressSpace::default()), "call.typed_fn")
        .unwrap()
        .into_pointer_value();

    let mut call_args: Vec<inkwell::values::BasicMetadataValueEnum> = vec![env_ptr.into()];
    for (value, tag) in &packed {
        call_args.push((*value).into());
        call_args.push((*tag).into());
    }

    let raw_result = ctx
        .builder
        .build_indirect_call(fn_type, typed_fn_ptr, &call_args, "call.result")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap_or_else(|| i8ptr.const_null().into())
        .into_pointer_value();

    // if DYNAMIC, the actual tag is argument `param_index`'s own tag
    // (clamped to argument count at codegen time is the caller's job;
    // here we trust param_index is in range because C3 only ever
    // stores an index that pointed at a real parameter).
    let actual_tag = if packed.is_empty() {
        return_tag
    } else {
        let mut selected = packed[0].1;
        for (i, (_, tag)) in packed.iter().enumerate() {
            let matches = ctx
                .builder
                .build_int_compare(
                    IntPredicate::EQ,
                    param_index,
                    ctx.context.i32_type().const_int(i as u64, false),
                    "param_index.matches",
                )
                .unwrap();
            selected = ctx.builder.build_select(matches, *tag, selected, "dyn.tag").unwrap().into_int_value();
        }
        let is_dynamic = ctx
            .builder
            .build_int_compare(
                IntPredicate::EQ,
                return_tag,
                ctx.context.i32_type().const_int(ReturnTag::Dynamic.as_i32() as u64, false),
                "tag.is_dynamic",
            )
            .unwrap();
        ctx.builder.build_select(is_dynamic, selected, return_tag, "call.actual_tag").unwrap().into_int_value()
    };

    from_universal_return(ctx, raw_result, actual_tag)
}
