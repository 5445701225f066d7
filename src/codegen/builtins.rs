//! C4's built-in dispatch table.
//!
//! Every `APPLICATION` whose head names a built-in is routed here rather
//! than through the user-function or closure call paths. Keeping this
//! as one string-keyed table (rather than, say, a trait per builtin)
//! mirrors the dispatch-table note in the design notes: an interned-
//! symbol table would be a legitimate swap-in but must preserve this
//! exact observable name list.

use inkwell::values::{BasicValue, BasicValueEnum, IntValue};
use inkwell::{AddressSpace, FloatPredicate, IntPredicate};

use crate::ast::{Node, Opcode};
use crate::error::{ArgumentCount, FranzError, TypeMismatch, UnsupportedOpcode};
use crate::span::Span;
use crate::types::Type;

use super::context::{CodegenContext, LoopFrame, VarSlot};
use super::util::{get_or_declare_printf, get_or_declare_runtime, get_or_declare_runtime_with_params, get_or_declare_strcmp};

pub const BUILTIN_NAMES: &[&str] = &[
    "add", "subtract", "multiply", "divide", "remainder",
    "is", "less", "greater", "less-or-equal", "greater-or-equal",
    "if", "when", "unless", "cond", "loop", "while", "break", "continue",
    "println", "print",
    "map", "filter", "reduce", "map2", "dict_map", "dict_filter",
    "ref", "deref", "set!",
    "variant", "match",
    "type", "format-int", "format-float",
    "use", "use_as", "use_with",
    "read_file", "write_file",
];

const ARITHMETIC_OPS: &[&str] = &["add", "subtract", "multiply", "divide", "remainder"];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

pub fn compile_application<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    let head = node.value.as_str();

    if ARITHMETIC_OPS.contains(&head) {
        return compile_arithmetic(ctx, file, node);
    }

    match head {
        "is" => compile_is(ctx, file, node),
        "less" | "greater" | "less-or-equal" | "greater-or-equal" => {
            compile_ordering(ctx, file, node, head)
        }
        "if" => compile_if(ctx, file, node),
        "when" => compile_single_sided(ctx, file, node, true),
        "unless" => compile_single_sided(ctx, file, node, false),
        "cond" => compile_cond(ctx, file, node),
        "loop" => compile_loop(ctx, file, node, None),
        "while" => compile_while(ctx, file, node),
        "break" => compile_break(ctx, file, node),
        "continue" => compile_continue(ctx, file, node),
        "println" | "print" => compile_print(ctx, file, node, head == "println"),
        "map" | "filter" | "map2" => compile_list_hof(ctx, file, node, head),
        "reduce" => compile_reduce(ctx, file, node),
        "dict_map" | "dict_filter" => compile_dict_hof(ctx, file, node, head),
        "ref" => compile_ref(ctx, file, node),
        "deref" => compile_deref(ctx, file, node),
        "set!" => compile_set(ctx, file, node),
        "variant" => compile_variant(ctx, file, node),
        "match" => compile_match(ctx, file, node),
        "type" => compile_type(ctx, file, node),
        "format-int" => compile_format_int(ctx, file, node),
        "format-float" => compile_format_float(ctx, file, node),
        "read_file" => compile_runtime_call1(ctx, file, node, "readFile"),
        "write_file" => compile_runtime_call2(ctx, file, node, "writeFile"),
        "use" | "use_as" | "use_with" => Err(FranzError::UnsupportedOpcode(
            UnsupportedOpcode { opcode: format!("'{head}' must be handled by the module loader before codegen") },
            Span::new(file, node.line),
        )),
        other => Err(FranzError::UnsupportedOpcode(
            UnsupportedOpcode { opcode: other.to_string() },
            Span::new(file, node.line),
        )),
    }
}

fn maybe_unbox<'ctx>(ctx: &CodegenContext<'ctx>, name: Option<&str>, value: BasicValueEnum<'ctx>) -> BasicValueEnum<'ctx> {
    match name {
        Some(n) if ctx.generic_variables.contains(n) => {
            let unboxed = get_or_declare_runtime(ctx, "franz_unbox_int", 1);
            ctx.builder
                .build_call(unboxed, &[value.into()], "unboxed")
                .unwrap()
                .try_as_basic_value()
                .left()
                .unwrap_or(value)
        }
        _ => value,
    }
}

fn name_of(node: &Node) -> Option<&str> {
    (node.opcode == Opcode::Identifier).then_some(node.value.as_str())
}

fn compile_arithmetic<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.is_empty() {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: node.value.clone(), expected: 1, actual: 0 },
            Span::new(file, node.line),
        ));
    }

    // literal-zero-divisor is a compile-time error; only detectable
    // when the divisor is itself a literal (not a runtime value).
    if node.value == "divide" {
        if let Some(divisor) = node.children.get(1) {
            if divisor.opcode == Opcode::Int && divisor.value == "0" {
                return Err(FranzError::TypeMismatch(
                    TypeMismatch { expected: Type::Int, actual: Type::Int },
                    Span::new(file, node.line),
                ));
            }
        }
    }

    let mut values = Vec::new();
    let mut any_float = false;
    for child in &node.children {
        let v = super::codegen_node(ctx, child)?;
        let v = maybe_unbox(ctx, name_of(child), v);
        any_float |= matches!(v, BasicValueEnum::FloatValue(_));
        values.push(v);
    }

    if any_float {
        let promoted: Vec<_> = values
            .into_iter()
            .map(|v| match v {
                BasicValueEnum::IntValue(i) => ctx
                    .builder
                    .build_signed_int_to_float(i, ctx.context.f64_type(), "promote")
                    .unwrap(),
                BasicValueEnum::FloatValue(f) => f,
                other => panic!("non-numeric operand {other:?} reached arithmetic codegen"),
            })
            .collect();
        let mut acc = promoted[0];
        for v in &promoted[1..] {
            acc = match node.value.as_str() {
                "add" => ctx.builder.build_float_add(acc, *v, "").unwrap(),
                "subtract" => ctx.builder.build_float_sub(acc, *v, "").unwrap(),
                "multiply" => ctx.builder.build_float_mul(acc, *v, "").unwrap(),
                "divide" => ctx.builder.build_float_div(acc, *v, "").unwrap(),
                "remainder" => ctx.builder.build_float_rem(acc, *v, "").unwrap(),
                _ => unreachable!(),
            };
        }
        Ok(acc.into())
    } else {
        let ints: Vec<IntValue> = values
            .into_iter()
            .map(|v| match v {
                BasicValueEnum::IntValue(i) => i,
                other => panic!("non-numeric operand {other:?} reached arithmetic codegen"),
            })
            .collect();
        let mut acc = ints[0];
        for v in &ints[1..] {
            acc = match node.value.as_str() {
                "add" => ctx.builder.build_int_add(acc, *v, "").unwrap(),
                "subtract" => ctx.builder.build_int_sub(acc, *v, "").unwrap(),
                "multiply" => ctx.builder.build_int_mul(acc, *v, "").unwrap(),
                "divide" => ctx.builder.build_int_signed_div(acc, *v, "").unwrap(),
                "remainder" => ctx.builder.build_int_signed_rem(acc, *v, "").unwrap(),
                _ => unreachable!(),
            };
        }
        Ok(acc.into())
    }
}

/// `(is a b)` - type-aware equality. Strings compare via `strcmp`, void
/// is a compile-time-known boolean against any non-void operand, and
/// numeric operands compare after promotion exactly like arithmetic.
fn compile_is<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 2 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: "is".into(), expected: 2, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let left_is_void = name_of(&node.children[0]).is_some_and(|n| ctx.void_variables.contains(n));
    let right_is_void = name_of(&node.children[1]).is_some_and(|n| ctx.void_variables.contains(n));
    if left_is_void || right_is_void {
        let equal = left_is_void && right_is_void;
        return Ok(ctx.context.bool_type().const_int(equal as u64, false).into());
    }

    let left = super::codegen_node(ctx, &node.children[0])?;
    let right = super::codegen_node(ctx, &node.children[1])?;

    match (left, right) {
        (BasicValueEnum::IntValue(l), BasicValueEnum::IntValue(r)) => {
            Ok(ctx.builder.build_int_compare(IntPredicate::EQ, l, r, "").unwrap().into())
        }
        (BasicValueEnum::FloatValue(l), BasicValueEnum::FloatValue(r)) => {
            Ok(ctx.builder.build_float_compare(FloatPredicate::OEQ, l, r, "").unwrap().into())
        }
        (BasicValueEnum::IntValue(l), BasicValueEnum::FloatValue(r)) => {
            let l = ctx.builder.build_signed_int_to_float(l, ctx.context.f64_type(), "").unwrap();
            Ok(ctx.builder.build_float_compare(FloatPredicate::OEQ, l, r, "").unwrap().into())
        }
        (BasicValueEnum::FloatValue(l), BasicValueEnum::IntValue(r)) => {
            let r = ctx.builder.build_signed_int_to_float(r, ctx.context.f64_type(), "").unwrap();
            Ok(ctx.builder.build_float_compare(FloatPredicate::OEQ, l, r, "").unwrap().into())
        }
        (BasicValueEnum::PointerValue(l), BasicValueEnum::PointerValue(r)) => {
            let strcmp = get_or_declare_strcmp(ctx);
            let result = ctx
                .builder
                .build_call(strcmp, &[l.into(), r.into()], "strcmp")
                .unwrap()
                .try_as_basic_value()
                .left()
                .unwrap()
                .into_int_value();
            Ok(ctx
                .builder
                .build_int_compare(IntPredicate::EQ, result, ctx.context.i32_type().const_zero(), "")
                .unwrap()
                .into())
        }
        _ => Ok(ctx.context.bool_type().const_zero().into()),
    }
}

fn compile_ordering<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
    op: &str,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 2 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: op.into(), expected: 2, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let left = super::codegen_node(ctx, &node.children[0])?;
    let right = super::codegen_node(ctx, &node.children[1])?;
    let (int_pred, float_pred) = match op {
        "less" => (IntPredicate::SLT, FloatPredicate::OLT),
        "greater" => (IntPredicate::SGT, FloatPredicate::OGT),
        "less-or-equal" => (IntPredicate::SLE, FloatPredicate::OLE),
        "greater-or-equal" => (IntPredicate::SGE, FloatPredicate::OGE),
        _ => unreachable!(),
    };
    match (left, right) {
        (BasicValueEnum::IntValue(l), BasicValueEnum::IntValue(r)) => {
            Ok(ctx.builder.build_int_compare(int_pred, l, r, "").unwrap().into())
        }
        (l, r) => {
            let to_f = |ctx: &CodegenContext<'ctx>, v: BasicValueEnum<'ctx>| match v {
                BasicValueEnum::FloatValue(f) => f,
                BasicValueEnum::IntValue(i) => {
                    ctx.builder.build_signed_int_to_float(i, ctx.context.f64_type(), "").unwrap()
                }
                other => panic!("non-numeric operand {other:?} in ordering comparison"),
            };
            let l = to_f(ctx, l);
            let r = to_f(ctx, r);
            Ok(ctx.builder.build_float_compare(float_pred, l, r, "").unwrap().into())
        }
    }
}

/// `if` compiles to a three-way branch with a `phi` at the merge block.
/// Both arms are bare blocks (`Opcode::Statement`), not closures - they
/// are inlined directly rather than called through the universal ABI.
fn compile_if<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 3 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: "if".into(), expected: 3, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let cond = super::codegen_node(ctx, &node.children[0])?.into_int_value();

    let function = current_function(ctx);
    let then_bb = ctx.context.append_basic_block(function, "if.then");
    let else_bb = ctx.context.append_basic_block(function, "if.else");
    let merge_bb = ctx.context.append_basic_block(function, "if.merge");

    ctx.builder.build_conditional_branch(cond, then_bb, else_bb).unwrap();

    ctx.builder.position_at_end(then_bb);
    let then_val = super::codegen_node(ctx, &node.children[1])?;
    ctx.builder.build_unconditional_branch(merge_bb).unwrap();
    let then_end_bb = ctx.builder.get_insert_block().unwrap();

    ctx.builder.position_at_end(else_bb);
    let else_val = super::codegen_node(ctx, &node.children[2])?;
    ctx.builder.build_unconditional_branch(merge_bb).unwrap();
    let else_end_bb = ctx.builder.get_insert_block().unwrap();

    ctx.builder.position_at_end(merge_bb);
    let phi = ctx.builder.build_phi(then_val.get_type(), "if.result").unwrap();
    phi.add_incoming(&[(&then_val, then_end_bb), (&else_val, else_end_bb)]);
    Ok(phi.as_basic_value())
}

/// `when`/`unless` are single-sided `if` variants: the branch not taken
/// yields void.
fn compile_single_sided<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
    positive: bool,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 2 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: node.value.clone(), expected: 2, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let cond = super::codegen_node(ctx, &node.children[0])?.into_int_value();
    let cond = if positive {
        cond
    } else {
        ctx.builder.build_not(cond, "unless.not").unwrap()
    };

    let function = current_function(ctx);
    let then_bb = ctx.context.append_basic_block(function, "when.then");
    let merge_bb = ctx.context.append_basic_block(function, "when.merge");

    ctx.builder.build_conditional_branch(cond, then_bb, merge_bb).unwrap();
    ctx.builder.position_at_end(then_bb);
    let _ = super::codegen_node(ctx, &node.children[1])?;
    ctx.builder.build_unconditional_branch(merge_bb).unwrap();

    ctx.builder.position_at_end(merge_bb);
    Ok(void_marker(ctx))
}

/// `cond` compiles to a chain of basic blocks, one per clause, early-
/// exiting on first match, with a designated `else` target.
fn compile_cond<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.is_empty() || node.children.len() % 2 == 0 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: "cond".into(), expected: node.children.len() + 1, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let function = current_function(ctx);
    let merge_bb = ctx.context.append_basic_block(function, "cond.merge");
    let clause_count = (node.children.len() - 1) / 2;

    let mut incoming: Vec<(BasicValueEnum, inkwell::basic_block::BasicBlock)> = Vec::new();
    let mut next_check_bb = ctx.context.append_basic_block(function, "cond.check0");
    ctx.builder.build_unconditional_branch(next_check_bb).unwrap();

    for i in 0..clause_count {
        ctx.builder.position_at_end(next_check_bb);
        let cond = super::codegen_node(ctx, &node.children[i * 2])?.into_int_value();
        let body_bb = ctx.context.append_basic_block(function, "cond.body");
        let is_last = i + 1 == clause_count;
        let after_bb = if is_last {
            ctx.context.append_basic_block(function, "cond.else")
        } else {
            ctx.context.append_basic_block(function, "cond.check")
        };
        ctx.builder.build_conditional_branch(cond, body_bb, after_bb).unwrap();

        ctx.builder.position_at_end(body_bb);
        let value = super::codegen_node(ctx, &node.children[i * 2 + 1])?;
        ctx.builder.build_unconditional_branch(merge_bb).unwrap();
        incoming.push((value, ctx.builder.get_insert_block().unwrap()));

        next_check_bb = after_bb;
    }

    ctx.builder.position_at_end(next_check_bb);
    let else_value = super::codegen_node(ctx, node.children.last().unwrap())?;
    ctx.builder.build_unconditional_branch(merge_bb).unwrap();
    incoming.push((else_value, ctx.builder.get_insert_block().unwrap()));

    ctx.builder.position_at_end(merge_bb);
    let phi = ctx.builder.build_phi(incoming[0].0.get_type(), "cond.result").unwrap();
    let refs: Vec<(&dyn BasicValue, inkwell::basic_block::BasicBlock)> =
        incoming.iter().map(|(v, b)| (v as &dyn BasicValue, *b)).collect();
    phi.add_incoming(&refs);
    Ok(phi.as_basic_value())
}

fn current_function<'ctx>(ctx: &CodegenContext<'ctx>) -> inkwell::values::FunctionValue<'ctx> {
    ctx.builder
        .get_insert_block()
        .and_then(|b| b.get_parent())
        .expect("codegen always runs inside a function body")
}

/// `loop`/`while` install `loopExitBlock`/`loopIncrBlock` in generator
/// state (here, `ctx.loop_stack`) so `break`/`continue` (and a `<-`
/// return encountered inside the loop) compile to direct branches;
/// leaving the loop restores the prior state in LIFO order.
fn compile_loop<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
    condition: Option<&Node>,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    let body = node.children.last().ok_or_else(|| {
        FranzError::ArgumentCount(
            ArgumentCount { builtin: node.value.clone(), expected: 1, actual: 0 },
            Span::new(file, node.line),
        )
    })?;

    let function = current_function(ctx);
    let header_bb = ctx.context.append_basic_block(function, "loop.header");
    let body_bb = ctx.context.append_basic_block(function, "loop.body");
    let incr_bb = ctx.context.append_basic_block(function, "loop.incr");
    let exit_bb = ctx.context.append_basic_block(function, "loop.exit");

    ctx.builder.build_unconditional_branch(header_bb).unwrap();
    ctx.builder.position_at_end(header_bb);
    match condition {
        Some(cond_node) => {
            let cond = super::codegen_node(ctx, cond_node)?.into_int_value();
            ctx.builder.build_conditional_branch(cond, body_bb, exit_bb).unwrap();
        }
        None => {
            ctx.builder.build_unconditional_branch(body_bb).unwrap();
        }
    }

    ctx.builder.position_at_end(body_bb);
    ctx.loop_stack.push(LoopFrame { exit_block: exit_bb, incr_block: incr_bb });
    let _ = super::codegen_node(ctx, body)?;
    ctx.loop_stack.pop();
    if ctx.builder.get_insert_block().unwrap().get_terminator().is_none() {
        ctx.builder.build_unconditional_branch(incr_bb).unwrap();
    }

    ctx.builder.position_at_end(incr_bb);
    ctx.builder.build_unconditional_branch(header_bb).unwrap();

    ctx.builder.position_at_end(exit_bb);
    Ok(void_marker(ctx))
}

fn compile_while<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 2 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: "while".into(), expected: 2, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    compile_loop(ctx, file, node, Some(&node.children[0]))
}

fn compile_break<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    let frame = ctx.loop_stack.last().ok_or_else(|| {
        FranzError::UnsupportedOpcode(
            UnsupportedOpcode { opcode: "break outside of a loop".into() },
            Span::new(file, node.line),
        )
    })?;
    let exit = frame.exit_block;
    if let Some(value_node) = node.children.first() {
        let _ = super::codegen_node(ctx, value_node)?;
    }
    ctx.builder.build_unconditional_branch(exit).unwrap();
    Ok(void_marker(ctx))
}

fn compile_continue<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    let frame = ctx.loop_stack.last().ok_or_else(|| {
        FranzError::UnsupportedOpcode(
            UnsupportedOpcode { opcode: "continue outside of a loop".into() },
            Span::new(file, node.line),
        )
    })?;
    ctx.builder.build_unconditional_branch(frame.incr_block).unwrap();
    Ok(void_marker(ctx))
}

pub fn void_marker<'ctx>(ctx: &CodegenContext<'ctx>) -> BasicValueEnum<'ctx> {
    ctx.context.i8_type().ptr_type(AddressSpace::default()).const_null().into()
}

fn compile_print<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
    newline: bool,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 1 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: node.value.clone(), expected: 1, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let value = super::codegen_node(ctx, &node.children[0])?;
    match value {
        BasicValueEnum::IntValue(_) | BasicValueEnum::FloatValue(_) => {
            let printf = get_or_declare_printf(ctx);
            let fmt = match value {
                BasicValueEnum::IntValue(_) => if newline { "%lld\n" } else { "%lld" },
                _ => if newline { "%f\n" } else { "%f" },
            };
            let fmt_ptr = ctx.builder.build_global_string_ptr(fmt, "fmt").unwrap().as_pointer_value();
            ctx.builder.build_call(printf, &[fmt_ptr.into(), value.into()], "printf.call").unwrap();
        }
        _ => {
            // a pointer here is either a raw C string or a boxed
            // Generic (closure-call result, ref cell, format-int/
            // format-float) - `franz_print_smart` tells them apart.
            let print_fn = get_or_declare_runtime(ctx, if newline { "franz_println_smart" } else { "franz_print_smart" }, 1);
            ctx.builder.build_call(print_fn, &[value.into()], "print.call").unwrap();
        }
    }
    Ok(void_marker(ctx))
}

/// `map`/`filter`/`map2` each loop over a list at runtime, invoking the
/// callback closure per element via the universal ABI. The callback's
/// arity is fixed by the builtin (`(item, index)` for map/filter,
/// `(item1, item2, index)` for map2); the runtime owns the actual list
/// traversal (`franz_list_nth`/`franz_list_length`), the generator only
/// emits the driving loop and the per-element closure call.
fn compile_list_hof<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
    which: &str,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    let expected = if which == "map2" { 3 } else { 2 };
    if node.children.len() != expected {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: which.into(), expected, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let list = super::codegen_node(ctx, &node.children[0])?;
    let list2 = if which == "map2" {
        Some(super::codegen_node(ctx, &node.children[1])?)
    } else {
        None
    };
    let callback_node = node.children.last().unwrap();
    let callback = super::codegen_node(ctx, callback_node)?;
    let callback = super::call::closure_i64_from_value(ctx, callback);

    let length_fn = get_or_declare_runtime(ctx, "franz_list_length", 1);
    let nth_fn = get_or_declare_runtime(ctx, "franz_list_nth", 2);
    let new_fn = get_or_declare_runtime(ctx, "franz_list_new", 0);
    let push_fn = get_or_declare_runtime(ctx, "franz_list_push", 2);

    let i64t = ctx.context.i64_type();
    let length = ctx
        .builder
        .build_call(length_fn, &[list.into()], "len")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap()
        .into_pointer_value();
    let length = ctx.builder.build_ptr_to_int(length, i64t, "len.i64").unwrap();

    let result = ctx
        .builder
        .build_call(new_fn, &[], "result.list")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap();

    let function = current_function(ctx);
    let header = ctx.context.append_basic_block(function, "hof.header");
    let body = ctx.context.append_basic_block(function, "hof.body");
    let exit = ctx.context.append_basic_block(function, "hof.exit");

    let index_alloca = ctx.builder.build_alloca(i64t, "hof.index").unwrap();
    ctx.builder.build_store(index_alloca, i64t.const_zero()).unwrap();
    ctx.builder.build_unconditional_branch(header).unwrap();

    ctx.builder.position_at_end(header);
    let index = ctx.builder.build_load(i64t, index_alloca, "hof.index.load").unwrap().into_int_value();
    let cont = ctx.builder.build_int_compare(IntPredicate::SLT, index, length, "hof.cont").unwrap();
    ctx.builder.build_conditional_branch(cont, body, exit).unwrap();

    ctx.builder.position_at_end(body);
    let item = ctx
        .builder
        .build_call(nth_fn, &[list.into(), index.into()], "hof.item")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap();
    let mut call_args = vec![item];
    if let Some(l2) = list2 {
        let item2 = ctx
            .builder
            .build_call(nth_fn, &[l2.into(), index.into()], "hof.item2")
            .unwrap()
            .try_as_basic_value()
            .left()
            .unwrap();
        call_args.push(item2);
    }
    call_args.push(index.into());
    let call_result = super::call::call_closure(ctx, callback, call_args);

    if which == "map" || which == "map2" {
        ctx.builder.build_call(push_fn, &[result.into(), call_result.into()], "hof.push").unwrap();
    } else {
        let keep = unbox_int(ctx, call_result);
        let push_bb = ctx.context.append_basic_block(function, "hof.filter.push");
        let skip_bb = ctx.context.append_basic_block(function, "hof.filter.skip");
        ctx.builder.build_conditional_branch(keep, push_bb, skip_bb).unwrap();
        ctx.builder.position_at_end(push_bb);
        ctx.builder.build_call(push_fn, &[result.into(), item.into()], "hof.push").unwrap();
        ctx.builder.build_unconditional_branch(skip_bb).unwrap();
        ctx.builder.position_at_end(skip_bb);
    }

    let next = ctx.builder.build_int_add(index, i64t.const_int(1, false), "hof.next").unwrap();
    ctx.builder.build_store(index_alloca, next).unwrap();
    ctx.builder.build_unconditional_branch(header).unwrap();

    ctx.builder.position_at_end(exit);
    Ok(result)
}

/// `reduce` invokes `(acc, item, index)` per element; starts from a
/// void initial value when none is supplied.
fn compile_reduce<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() < 2 || node.children.len() > 3 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: "reduce".into(), expected: 3, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let list = super::codegen_node(ctx, &node.children[0])?;
    let callback = super::codegen_node(ctx, &node.children[1])?;
    let callback = super::call::closure_i64_from_value(ctx, callback);
    // `next_acc` below is always a boxed `Generic*` (call_closure's
    // result), so the accumulator slot has to start out boxed too -
    // otherwise the loop's second iteration stores a pointer into an
    // alloca sized/typed for whatever `initial` happened to be.
    let initial = if node.children.len() == 3 {
        let seed = super::codegen_node(ctx, &node.children[2])?;
        call_runtime_box_for(ctx, seed)
    } else {
        void_marker(ctx)
    };

    let length_fn = get_or_declare_runtime(ctx, "franz_list_length", 1);
    let nth_fn = get_or_declare_runtime(ctx, "franz_list_nth", 2);
    let i64t = ctx.context.i64_type();
    let length = ctx
        .builder
        .build_call(length_fn, &[list.into()], "len")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap()
        .into_pointer_value();
    let length = ctx.builder.build_ptr_to_int(length, i64t, "len.i64").unwrap();

    let function = current_function(ctx);
    let header = ctx.context.append_basic_block(function, "reduce.header");
    let body = ctx.context.append_basic_block(function, "reduce.body");
    let exit = ctx.context.append_basic_block(function, "reduce.exit");

    let index_alloca = ctx.builder.build_alloca(i64t, "reduce.index").unwrap();
    ctx.builder.build_store(index_alloca, i64t.const_zero()).unwrap();
    let acc_alloca = ctx.builder.build_alloca(initial.get_type(), "reduce.acc").unwrap();
    ctx.builder.build_store(acc_alloca, initial).unwrap();
    ctx.builder.build_unconditional_branch(header).unwrap();

    ctx.builder.position_at_end(header);
    let index = ctx.builder.build_load(i64t, index_alloca, "reduce.index.load").unwrap().into_int_value();
    let cont = ctx.builder.build_int_compare(IntPredicate::SLT, index, length, "reduce.cont").unwrap();
    ctx.builder.build_conditional_branch(cont, body, exit).unwrap();

    ctx.builder.position_at_end(body);
    let item = ctx
        .builder
        .build_call(nth_fn, &[list.into(), index.into()], "reduce.item")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap();
    let acc = ctx.builder.build_load(initial.get_type(), acc_alloca, "reduce.acc.load").unwrap();
    let next_acc = super::call::call_closure(ctx, callback, vec![acc, item, index.into()]);
    ctx.builder.build_store(acc_alloca, next_acc).unwrap();
    let next_index = ctx.builder.build_int_add(index, i64t.const_int(1, false), "reduce.next").unwrap();
    ctx.builder.build_store(index_alloca, next_index).unwrap();
    ctx.builder.build_unconditional_branch(header).unwrap();

    ctx.builder.position_at_end(exit);
    Ok(ctx.builder.build_load(initial.get_type(), acc_alloca, "reduce.result").unwrap())
}

/// `dict_map`/`dict_filter` invoke `(key, value)` per entry; structurally
/// identical to the list variants but driven by `franz_dict_keys`.
fn compile_dict_hof<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
    which: &str,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 2 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: which.into(), expected: 2, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let dict = super::codegen_node(ctx, &node.children[0])?;
    let callback = super::codegen_node(ctx, &node.children[1])?;
    let callback = super::call::closure_i64_from_value(ctx, callback);

    let keys_fn = get_or_declare_runtime(ctx, "franz_dict_keys", 1);
    let get_fn = get_or_declare_runtime(ctx, "franz_dict_get", 2);
    let set_fn = get_or_declare_runtime(ctx, "franz_dict_set", 3);
    let new_fn = get_or_declare_runtime(ctx, "franz_dict_new", 0);
    let length_fn = get_or_declare_runtime(ctx, "franz_list_length", 1);
    let nth_fn = get_or_declare_runtime(ctx, "franz_list_nth", 2);

    let keys = ctx
        .builder
        .build_call(keys_fn, &[dict.into()], "dict.keys")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap();
    let i64t = ctx.context.i64_type();
    let length = ctx
        .builder
        .build_call(length_fn, &[keys.into()], "dict.keys.len")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap()
        .into_pointer_value();
    let length = ctx.builder.build_ptr_to_int(length, i64t, "dict.keys.len.i64").unwrap();

    let result = ctx
        .builder
        .build_call(new_fn, &[], "dict.result")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap();

    let function = current_function(ctx);
    let header = ctx.context.append_basic_block(function, "dicthof.header");
    let body = ctx.context.append_basic_block(function, "dicthof.body");
    let exit = ctx.context.append_basic_block(function, "dicthof.exit");

    let index_alloca = ctx.builder.build_alloca(i64t, "dicthof.index").unwrap();
    ctx.builder.build_store(index_alloca, i64t.const_zero()).unwrap();
    ctx.builder.build_unconditional_branch(header).unwrap();

    ctx.builder.position_at_end(header);
    let index = ctx.builder.build_load(i64t, index_alloca, "dicthof.index.load").unwrap().into_int_value();
    let cont = ctx.builder.build_int_compare(IntPredicate::SLT, index, length, "dicthof.cont").unwrap();
    ctx.builder.build_conditional_branch(cont, body, exit).unwrap();

    ctx.builder.position_at_end(body);
    let key = ctx
        .builder
        .build_call(nth_fn, &[keys.into(), index.into()], "dicthof.key")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap();
    let value = ctx
        .builder
        .build_call(get_fn, &[dict.into(), key.into()], "dicthof.value")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap();
    let call_result = super::call::call_closure(ctx, callback, vec![key, value]);

    if which == "dict_map" {
        ctx.builder.build_call(set_fn, &[result.into(), key.into(), call_result.into()], "dicthof.set").unwrap();
    } else {
        let keep = unbox_int(ctx, call_result);
        let set_bb = ctx.context.append_basic_block(function, "dicthof.filter.set");
        let skip_bb = ctx.context.append_basic_block(function, "dicthof.filter.skip");
        ctx.builder.build_conditional_branch(keep, set_bb, skip_bb).unwrap();
        ctx.builder.position_at_end(set_bb);
        ctx.builder.build_call(set_fn, &[result.into(), key.into(), value.into()], "dicthof.set").unwrap();
        ctx.builder.build_unconditional_branch(skip_bb).unwrap();
        ctx.builder.position_at_end(skip_bb);
    }

    let next = ctx.builder.build_int_add(index, i64t.const_int(1, false), "dicthof.next").unwrap();
    ctx.builder.build_store(index_alloca, next).unwrap();
    ctx.builder.build_unconditional_branch(header).unwrap();

    ctx.builder.position_at_end(exit);
    Ok(result)
}

/// `ref` boxes a value into a heap Generic; the receiving binding is
/// marked Generic so downstream arithmetic auto-unboxes it.
fn compile_ref<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 1 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: "ref".into(), expected: 1, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let value = super::codegen_node(ctx, &node.children[0])?;
    Ok(call_runtime_box_for(ctx, value))
}

fn compile_deref<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 1 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: "deref".into(), expected: 1, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let cell = super::codegen_node(ctx, &node.children[0])?;
    let unbox = get_or_declare_runtime(ctx, "franz_unbox_int", 1);
    Ok(ctx
        .builder
        .build_call(unbox, &[cell.into()], "deref")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap())
}

/// `set!` replaces the value behind a `ref` cell. Operates on the heap
/// Generic directly and does not require the host variable to be
/// mutable (a deliberate divergence point noted in the design notes).
fn compile_set<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 2 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: "set!".into(), expected: 2, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let cell = super::codegen_node(ctx, &node.children[0])?;
    let value = super::codegen_node(ctx, &node.children[1])?;
    let boxed = call_runtime_box_for(ctx, value);
    let set_fn = get_or_declare_runtime(ctx, "franz_set_generic", 2);
    ctx.builder.build_call(set_fn, &[cell.into(), boxed.into()], "set!.call").unwrap();
    Ok(void_marker(ctx))
}

/// `call_closure`'s result is always a boxed `Generic*` now (see
/// `from_universal_return`); a predicate callback's boolean still needs
/// to drive a real conditional branch, so unbox it back to an `IntValue`
/// via the runtime rather than trusting the static LLVM variant.
fn unbox_int<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>) -> inkwell::values::IntValue<'ctx> {
    let unbox_fn = get_or_declare_runtime(ctx, "franz_unbox_int", 1);
    let result = ctx
        .builder
        .build_call(unbox_fn, &[value.into()], "unboxed.int")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap();
    // declared (like every `franz_*` entry point) as returning `i8*`,
    // but the real symbol returns `int64_t` - reinterpret the bits
    // rather than `into_int_value()`, which would panic on the
    // pointer-typed SSA value the declaration actually produces.
    ctx.builder.build_ptr_to_int(result.into_pointer_value(), ctx.context.i64_type(), "unboxed.int.bits").unwrap()
}

pub(crate) fn call_runtime_box_for<'ctx>(ctx: &CodegenContext<'ctx>, value: BasicValueEnum<'ctx>) -> BasicValueEnum<'ctx> {
    let args: Vec<inkwell::values::BasicMetadataValueEnum> = vec![value.into()];
    let f = match value {
        BasicValueEnum::IntValue(i) => {
            get_or_declare_runtime_with_params(ctx, "franz_box_int", &[i.get_type().into()])
        }
        BasicValueEnum::FloatValue(fv) => {
            get_or_declare_runtime_with_params(ctx, "franz_box_float", &[fv.get_type().into()])
        }
        _ => get_or_declare_runtime(ctx, "franz_box_pointer_smart", 1),
    };
    ctx.builder
        .build_call(f, &args, "boxed")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap()
}

/// Build a `franz_list` from already-compiled element values, boxing
/// each one. Used for `LIST` literal nodes.
pub fn build_list_literal<'ctx>(
    ctx: &CodegenContext<'ctx>,
    elements: Vec<BasicValueEnum<'ctx>>,
) -> BasicValueEnum<'ctx> {
    let new_fn = get_or_declare_runtime(ctx, "franz_list_new", 0);
    let push_fn = get_or_declare_runtime(ctx, "franz_list_push", 2);
    let list = ctx
        .builder
        .build_call(new_fn, &[], "list.literal")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap();
    for value in elements {
        let boxed = call_runtime_box_for(ctx, value);
        ctx.builder.build_call(push_fn, &[list.into(), boxed.into()], "list.push").unwrap();
    }
    list
}

pub fn call_runtime_box_pointer_smart<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: inkwell::values::PointerValue<'ctx>,
) -> BasicValueEnum<'ctx> {
    let f = get_or_declare_runtime(ctx, "franz_box_pointer_smart", 1);
    ctx.builder
        .build_call(f, &[value.into()], "boxed.smart")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap()
}

/// Box a raw `i8*` known (by its `CLOSURE` return tag) to be an
/// unboxed closure record, via `franz_box_closure` rather than the
/// shape-guessing `franz_box_pointer_smart` - an unboxed closure's
/// first field is a function pointer, not a tag byte, so the smart
/// boxer's heuristic would misread it.
pub fn call_runtime_box_closure<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: inkwell::values::PointerValue<'ctx>,
) -> BasicValueEnum<'ctx> {
    let f = get_or_declare_runtime(ctx, "franz_box_closure", 1);
    ctx.builder
        .build_call(f, &[value.into()], "boxed.closure")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap()
}

/// `(variant "Tag" v1 v2 ...)` lowers to a two-element list
/// `[boxed_tag_string, list_of_boxed_values]`.
fn compile_variant<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.is_empty() {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: "variant".into(), expected: 1, actual: 0 },
            Span::new(file, node.line),
        ));
    }
    let tag_node = &node.children[0];
    let tag_value = super::codegen_node(ctx, tag_node)?;

    let new_fn = get_or_declare_runtime(ctx, "franz_list_new", 0);
    let push_fn = get_or_declare_runtime(ctx, "franz_list_push", 2);
    let values_list = ctx
        .builder
        .build_call(new_fn, &[], "variant.values")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap();
    for value_node in &node.children[1..] {
        let v = super::codegen_node(ctx, value_node)?;
        let boxed = call_runtime_box_for(ctx, v);
        ctx.builder.build_call(push_fn, &[values_list.into(), boxed.into()], "variant.push").unwrap();
    }

    let outer_list = ctx
        .builder
        .build_call(new_fn, &[], "variant.outer")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap();
    ctx.builder.build_call(push_fn, &[outer_list.into(), tag_value.into()], "variant.tag.push").unwrap();
    ctx.builder.build_call(push_fn, &[outer_list.into(), values_list.into()], "variant.values.push").unwrap();
    Ok(outer_list)
}

/// `(match variant "Tag1" h1 "Tag2" h2 ... default)` lowers to a cascade
/// of `strcmp` comparisons, each unpacking the value list into the
/// matched handler's parameters (via the universal ABI) and a `phi` at
/// the merge yielding the expression value.
fn compile_match<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    // subject, then `clause_count` (tag, handler) pairs, then an optional
    // trailing default expression. With a default the total is even
    // (subject + pairs + 1); without one it's odd (subject + pairs only).
    // Either shape needs at least one clause or a default to be useful.
    if node.children.len() < 2 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: "match".into(), expected: node.children.len() + 1, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let has_default = node.children.len() % 2 == 0;
    let clause_count = if has_default { (node.children.len() - 2) / 2 } else { (node.children.len() - 1) / 2 };
    let subject = super::codegen_node(ctx, &node.children[0])?;
    let nth_fn = get_or_declare_runtime(ctx, "franz_list_nth", 2);
    let tag_value = ctx
        .builder
        .build_call(nth_fn, &[subject.into(), ctx.context.i64_type().const_zero().into()], "match.tag")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap();
    let values_list = ctx
        .builder
        .build_call(nth_fn, &[subject.into(), ctx.context.i64_type().const_int(1, false).into()], "match.values")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap();

    let function = current_function(ctx);
    let merge_bb = ctx.context.append_basic_block(function, "match.merge");

    let mut incoming = Vec::new();
    let mut next_check = ctx.context.append_basic_block(function, "match.check0");
    ctx.builder.build_unconditional_branch(next_check).unwrap();

    for i in 0..clause_count {
        ctx.builder.position_at_end(next_check);
        let clause_tag = super::codegen_node(ctx, &node.children[1 + i * 2])?;
        let strcmp = get_or_declare_strcmp(ctx);
        let cmp_result = ctx
            .builder
            .build_call(strcmp, &[tag_value.into(), clause_tag.into()], "match.strcmp")
            .unwrap()
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_int_value();
        let matches = ctx
            .builder
            .build_int_compare(IntPredicate::EQ, cmp_result, ctx.context.i32_type().const_zero(), "match.eq")
            .unwrap();

        let handler_bb = ctx.context.append_basic_block(function, "match.handler");
        let is_last = i + 1 == clause_count;
        let after_bb = if is_last {
            ctx.context.append_basic_block(function, "match.default")
        } else {
            ctx.context.append_basic_block(function, "match.check")
        };
        ctx.builder.build_conditional_branch(matches, handler_bb, after_bb).unwrap();

        ctx.builder.position_at_end(handler_bb);
        let handler = super::codegen_node(ctx, &node.children[2 + i * 2])?;
        let handler = super::call::closure_i64_from_value(ctx, handler);
        let nth = get_or_declare_runtime(ctx, "franz_list_nth", 2);
        let length_fn = get_or_declare_runtime(ctx, "franz_list_length", 1);
        let length = ctx
            .builder
            .build_call(length_fn, &[values_list.into()], "match.values.len")
            .unwrap()
            .try_as_basic_value()
            .left()
            .unwrap()
            .into_pointer_value();
        let length = ctx.builder.build_ptr_to_int(length, ctx.context.i64_type(), "match.values.len.i64").unwrap();
        let length = length.get_zero_extended_constant().unwrap_or(0);
        let mut args = Vec::new();
        for j in 0..length {
            let idx = ctx.context.i64_type().const_int(j, false);
            let v = ctx
                .builder
                .build_call(nth, &[values_list.into(), idx.into()], "match.arg")
                .unwrap()
                .try_as_basic_value()
                .left()
                .unwrap();
            args.push(v);
        }
        let value = super::call::call_closure(ctx, handler, args);
        ctx.builder.build_unconditional_branch(merge_bb).unwrap();
        incoming.push((value, ctx.builder.get_insert_block().unwrap()));

        next_check = after_bb;
    }

    ctx.builder.position_at_end(next_check);
    // Every clause handler result is a boxed `Generic*` (routed through
    // `call_closure`/`from_universal_return`), so the default branch has
    // to produce the same shape for `build_phi` below - box it the same
    // way list literals box their elements.
    let default_value = if has_default {
        let raw = super::codegen_node(ctx, node.children.last().unwrap())?;
        call_runtime_box_for(ctx, raw)
    } else {
        void_marker(ctx)
    };
    ctx.builder.build_unconditional_branch(merge_bb).unwrap();
    incoming.push((default_value, ctx.builder.get_insert_block().unwrap()));

    ctx.builder.position_at_end(merge_bb);
    let phi = ctx.builder.build_phi(incoming[0].0.get_type(), "match.result").unwrap();
    let refs: Vec<(&dyn BasicValue, inkwell::basic_block::BasicBlock)> =
        incoming.iter().map(|(v, b)| (v as &dyn BasicValue, *b)).collect();
    phi.add_incoming(&refs);
    Ok(phi.as_basic_value())
}

/// `type` consults `typeMetadata` for variables and the AST opcode for
/// literals. For closure parameters (no static type) it emits a
/// runtime switch on `paramTypeTags`.
fn compile_type<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 1 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: "type".into(), expected: 1, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let target = &node.children[0];
    let literal_name = match target.opcode {
        Opcode::Int => Some("int"),
        Opcode::Float => Some("float"),
        Opcode::String => Some("string"),
        Opcode::List => Some("list"),
        _ => None,
    };
    if let Some(name) = literal_name {
        return Ok(ctx.builder.build_global_string_ptr(name, "type.name").unwrap().as_pointer_value().into());
    }

    if let Opcode::Identifier = target.opcode {
        if let Some(tag_value) = ctx.scope().param_type_tags.get(&target.value).copied() {
            return Ok(compile_param_type_switch(ctx, tag_value));
        }
        if let Some(source_type) = ctx.type_metadata.get(&target.value).cloned() {
            return Ok(ctx.builder.build_global_string_ptr(&source_type, "type.name").unwrap().as_pointer_value().into());
        }
    }

    let _ = super::codegen_node(ctx, target)?;
    Err(FranzError::UnsupportedOpcode(
        UnsupportedOpcode { opcode: "type() of a call result without a concretely inferred type".into() },
        Span::new(file, node.line),
    ))
}

fn compile_param_type_switch<'ctx>(ctx: &CodegenContext<'ctx>, tag: IntValue<'ctx>) -> BasicValueEnum<'ctx> {
    let function = current_function(ctx);
    let merge_bb = ctx.context.append_basic_block(function, "type.merge");
    let cases = [
        (crate::types::ReturnTag::Int, "int"),
        (crate::types::ReturnTag::Float, "float"),
        (crate::types::ReturnTag::Pointer, "pointer"),
        (crate::types::ReturnTag::Closure, "closure"),
        (crate::types::ReturnTag::Void, "void"),
    ];
    let mut incoming = Vec::new();
    let default_bb = ctx.context.append_basic_block(function, "type.default");
    let mut blocks = Vec::new();
    for (tag_value, name) in &cases {
        let bb = ctx.context.append_basic_block(function, "type.case");
        blocks.push((ctx.context.i32_type().const_int(tag_value.as_i32() as u64, false), bb));
        let string_ptr = ctx.builder.build_global_string_ptr(name, "type.name").unwrap().as_pointer_value();
        incoming.push((string_ptr, bb));
    }
    ctx.builder.build_switch(tag, default_bb, &blocks).unwrap();
    for (_, bb) in &blocks {
        ctx.builder.position_at_end(*bb);
        ctx.builder.build_unconditional_branch(merge_bb).unwrap();
    }
    ctx.builder.position_at_end(default_bb);
    let unknown = ctx.builder.build_global_string_ptr("unknown", "type.unknown").unwrap().as_pointer_value();
    ctx.builder.build_unconditional_branch(merge_bb).unwrap();
    incoming.push((unknown, default_bb));

    ctx.builder.position_at_end(merge_bb);
    let phi = ctx.builder.build_phi(incoming[0].0.get_type(), "type.result").unwrap();
    let refs: Vec<(&dyn BasicValue, inkwell::basic_block::BasicBlock)> =
        incoming.iter().map(|(v, b)| (v as &dyn BasicValue, *b)).collect();
    phi.add_incoming(&refs);
    phi.as_basic_value()
}

/// `(format-int n base)` - only base 2, 8, 10, 16 are supported;
/// anything else is a compile-time error (a literal base is required to
/// make this decision at compile time).
fn compile_format_int<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 2 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: "format-int".into(), expected: 2, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let base_node = &node.children[1];
    if base_node.opcode == Opcode::Int {
        let base: i64 = base_node.value.parse().unwrap_or(0);
        if ![2, 8, 10, 16].contains(&base) {
            return Err(FranzError::UnsupportedOpcode(
                UnsupportedOpcode { opcode: format!("format-int with unsupported base {base}") },
                Span::new(file, node.line),
            ));
        }
    }
    let n = super::codegen_node(ctx, &node.children[0])?;
    let base = super::codegen_node(ctx, base_node)?;
    let f = get_or_declare_runtime_with_params(
        ctx,
        "franz_format_int",
        &[ctx.context.i64_type().into(), ctx.context.i64_type().into()],
    );
    Ok(ctx.builder.build_call(f, &[n.into(), base.into()], "format-int").unwrap().try_as_basic_value().left().unwrap())
}

/// `(format-float n precision)` - precision is clamped to 17, never an
/// error.
fn compile_format_float<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 2 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: "format-float".into(), expected: 2, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let n = super::codegen_node(ctx, &node.children[0])?;
    let precision = &node.children[1];
    let precision_value = if precision.opcode == Opcode::Int {
        let requested: i64 = precision.value.parse().unwrap_or(0);
        ctx.context.i64_type().const_int(requested.min(17).max(0) as u64, false).into()
    } else {
        super::codegen_node(ctx, precision)?
    };
    let f = get_or_declare_runtime_with_params(
        ctx,
        "franz_format_float",
        &[ctx.context.f64_type().into(), ctx.context.i64_type().into()],
    );
    Ok(ctx
        .builder
        .build_call(f, &[n.into(), precision_value.into()], "format-float")
        .unwrap()
        .try_as_basic_value()
        .left()
        .unwrap())
}

fn compile_runtime_call1<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
    runtime_name: &str,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 1 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: node.value.clone(), expected: 1, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let arg = super::codegen_node(ctx, &node.children[0])?;
    let f = get_or_declare_runtime(ctx, runtime_name, 1);
    Ok(ctx.builder.build_call(f, &[arg.into()], runtime_name).unwrap().try_as_basic_value().left().unwrap())
}

fn compile_runtime_call2<'ctx>(
    ctx: &mut CodegenContext<'ctx>,
    file: &str,
    node: &Node,
    runtime_name: &str,
) -> Result<BasicValueEnum<'ctx>, FranzError> {
    if node.children.len() != 2 {
        return Err(FranzError::ArgumentCount(
            ArgumentCount { builtin: node.value.clone(), expected: 2, actual: node.children.len() },
            Span::new(file, node.line),
        ));
    }
    let a = super::codegen_node(ctx, &node.children[0])?;
    let b = super::codegen_node(ctx, &node.children[1])?;
    let f = get_or_declare_runtime(ctx, runtime_name, 2);
    Ok(ctx.builder.build_call(f, &[a.into(), b.into()], runtime_name).unwrap().try_as_basic_value().left().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_name_is_recognized() {
        for name in BUILTIN_NAMES {
            assert!(is_builtin(name));
        }
        assert!(!is_builtin("factorial"));
    }
}
