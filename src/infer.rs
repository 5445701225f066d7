//! C2 - Hindley-Milner-style type inferencer.
//!
//! Contract: given a function literal node, return `{parameter-types[],
//! return-type}`, each drawn from {INT, FLOAT, STRING, LIST, VOID,
//! UNKNOWN}. Arithmetic constrains operands to numeric and promotes to
//! FLOAT if any operand is FLOAT; calls to already-declared user
//! functions read their return type from `returnTypeTags` rather than
//! re-inferring; unresolved variables fall back to UNKNOWN, which is the
//! generator's signal to compile the universal return ABI. Running this
//! twice on the same node yields the same `Signature` - it only reads
//! the AST and `known_functions`, it never mutates either.

use std::collections::HashMap;

use crate::ast::{Node, Opcode};
use crate::error::{FranzError, TypeMismatch};
use crate::span::Span;
use crate::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub param_types: Vec<Type>,
    pub return_type: Type,
    /// `Some(i)` when the body's terminal expression is a direct
    /// reference to parameter `i` (the polymorphic-identity shape that
    /// later triggers the closure record's `DYNAMIC` tag).
    pub returns_param: Option<usize>,
}

const ARITHMETIC_OPS: &[&str] = &["add", "subtract", "multiply", "divide", "remainder"];
const COMPARISON_OPS: &[&str] = &["is", "less", "greater", "less-or-equal", "greater-or-equal"];

struct Ctx<'a> {
    file: &'a str,
    known_functions: &'a HashMap<String, Signature>,
}

pub fn infer_function(
    file: &str,
    func: &Node,
    known_functions: &HashMap<String, Signature>,
) -> Result<Signature, FranzError> {
    let ctx = Ctx { file, known_functions };

    let param_names: Vec<String> = func.params().iter().map(|p| p.value.clone()).collect();
    let mut param_types: Vec<Type> = vec![Type::Unknown; param_names.len()];
    let index_of: HashMap<&str, usize> = param_names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();

    let mut env: HashMap<String, Type> = HashMap::new();
    for name in &param_names {
        env.insert(name.clone(), Type::Unknown);
    }

    let body = func.body();
    let return_type = infer_statement(&ctx, body, &mut env, &mut param_types, &index_of)?;

    // sync the (possibly-narrowed-by-constraint) parameter types back
    // from `env`, since constraint propagation updates `env`, not the
    // `param_types` vec, for ease of lookups while walking.
    for (i, name) in param_names.iter().enumerate() {
        if let Some(ty) = env.get(name) {
            if *ty != Type::Unknown {
                param_types[i] = *ty;
            }
        }
    }

    let returns_param = terminal_param_reference(body, &index_of);

    Ok(Signature {
        param_types,
        return_type: if returns_param.is_some() { Type::Unknown } else { return_type },
        returns_param,
    })
}

/// Does the body's terminal expression (after unwrapping `Statement`/
/// `Return` wrappers) directly reference parameter `i`? This is the
/// shape `{x -> <- x}` takes, and it's detected structurally rather than
/// through the type lattice because `Unknown == Unknown` carries no
/// information about *which* unknown.
fn terminal_param_reference(body: &Node, index_of: &HashMap<&str, usize>) -> Option<usize> {
    let terminal = match body.opcode {
        Opcode::Statement => body.children.last()?,
        _ => body,
    };
    let terminal = match terminal.opcode {
        Opcode::Return => terminal.children.first()?,
        _ => terminal,
    };
    match terminal.opcode {
        Opcode::Identifier => index_of.get(terminal.value.as_str()).copied(),
        _ => None,
    }
}

fn infer_statement(
    ctx: &Ctx,
    node: &Node,
    env: &mut HashMap<String, Type>,
    param_types: &mut [Type],
    index_of: &HashMap<&str, usize>,
) -> Result<Type, FranzError> {
    match node.opcode {
        Opcode::Statement => {
            let mut last = Type::Void;
            for child in &node.children {
                last = infer_statement(ctx, child, env, param_types, index_of)?;
            }
            Ok(last)
        }
        Opcode::Return => infer_statement(ctx, &node.children[0], env, param_types, index_of),
        Opcode::Assignment => {
            let ty = infer_statement(ctx, &node.children[0], env, param_types, index_of)?;
            env.insert(node.value.clone(), ty);
            if let Some(&i) = index_of.get(node.value.as_str()) {
                param_types[i] = ty;
            }
            Ok(Type::Void)
        }
        _ => infer_expr(ctx, node, env, param_types, index_of),
    }
}

fn infer_expr(
    ctx: &Ctx,
    node: &Node,
    env: &mut HashMap<String, Type>,
    param_types: &mut [Type],
    index_of: &HashMap<&str, usize>,
) -> Result<Type, FranzError> {
    match node.opcode {
        Opcode::Int => Ok(Type::Int),
        Opcode::Float => Ok(Type::Float),
        Opcode::String => Ok(Type::String),
        Opcode::List => Ok(Type::List),
        Opcode::Identifier => Ok(env.get(&node.value).copied().unwrap_or(Type::Unknown)),
        Opcode::Function => Ok(Type::Unknown),
        Opcode::Application => infer_application(ctx, node, env, param_types, index_of),
        Opcode::Statement | Opcode::Return | Opcode::Assignment => {
            infer_statement(ctx, node, env, param_types, index_of)
        }
    }
}

fn infer_application(
    ctx: &Ctx,
    node: &Node,
    env: &mut HashMap<String, Type>,
    param_types: &mut [Type],
    index_of: &HashMap<&str, usize>,
) -> Result<Type, FranzError> {
    let head = node.value.as_str();

    if ARITHMETIC_OPS.contains(&head) {
        let mut saw_float = false;
        let mut concrete_args: Vec<(usize, Type)> = Vec::new();
        for (i, arg) in node.children.iter().enumerate() {
            let ty = infer_expr(ctx, arg, env, param_types, index_of)?;
            if ty != Type::Unknown {
                if !ty.is_numeric() {
                    return Err(FranzError::TypeMismatch(
                        TypeMismatch { expected: Type::Int, actual: ty },
                        Span::new(ctx.file, node.line),
                    ));
                }
                saw_float |= ty == Type::Float;
                concrete_args.push((i, ty));
            }
        }
        let result = if concrete_args.is_empty() {
            Type::Unknown
        } else if saw_float {
            Type::Float
        } else {
            Type::Int
        };
        if result != Type::Unknown {
            // constraint propagation: an Unknown-typed parameter that
            // fed this operator is now known to be numeric.
            for arg in &node.children {
                if arg.opcode == Opcode::Identifier {
                    if let Some(&i) = index_of.get(arg.value.as_str()) {
                        if param_types[i] == Type::Unknown {
                            param_types[i] = result;
                            env.insert(arg.value.clone(), result);
                        }
                    }
                }
            }
        }
        return Ok(result);
    }

    if COMPARISON_OPS.contains(&head) {
        for arg in &node.children {
            infer_expr(ctx, arg, env, param_types, index_of)?;
        }
        return Ok(Type::Int);
    }

    if let Some(ty) = stdlib_return_type(head) {
        for arg in &node.children {
            infer_expr(ctx, arg, env, param_types, index_of)?;
        }
        return Ok(ty);
    }

    if let Some(sig) = ctx.known_functions.get(head) {
        for arg in &node.children {
            infer_expr(ctx, arg, env, param_types, index_of)?;
        }
        return Ok(sig.return_type);
    }

    // Unknown head: a closure parameter, a not-yet-declared function, or
    // a higher-order callback. The generator resolves the actual
    // dispatch later; inference just reports Unknown.
    for arg in &node.children {
        infer_expr(ctx, arg, env, param_types, index_of)?;
    }
    Ok(Type::Unknown)
}

fn stdlib_return_type(name: &str) -> Option<Type> {
    Some(match name {
        "println" | "print" | "set!" | "write_file" => Type::Void,
        "map" | "filter" | "map2" | "list" | "variant" => Type::List,
        "read_file" | "format-int" | "format-float" | "type" => Type::String,
        "length" | "nth" => Type::Int,
        "ref" | "deref" => Type::Unknown,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn function_of(source: &str) -> Node {
        let tokens = lex("t.franz", source).unwrap();
        let nodes = parse("t.franz", tokens).unwrap();
        nodes.into_iter().next().unwrap().children.into_iter().next().unwrap()
    }

    #[test]
    fn infers_int_arithmetic() {
        let func = function_of("f = {n -> <- (add n 1)}");
        let sig = infer_function("t.franz", &func, &HashMap::new()).unwrap();
        assert_eq!(sig.param_types[0], Type::Int);
        assert_eq!(sig.return_type, Type::Int);
    }

    #[test]
    fn promotes_to_float_when_any_operand_is_float() {
        let func = function_of("f = {n -> <- (add n 1.5)}");
        let sig = infer_function("t.franz", &func, &HashMap::new()).unwrap();
        assert_eq!(sig.param_types[0], Type::Float);
        assert_eq!(sig.return_type, Type::Float);
    }

    #[test]
    fn polymorphic_identity_is_unknown_with_param_index() {
        let func = function_of("f = {x -> <- x}");
        let sig = infer_function("t.franz", &func, &HashMap::new()).unwrap();
        assert_eq!(sig.return_type, Type::Unknown);
        assert_eq!(sig.returns_param, Some(0));
    }

    #[test]
    fn rejects_numeric_and_string_under_arithmetic() {
        let func = function_of(r#"f = {-> <- (add 1 "x")}"#);
        let err = infer_function("t.franz", &func, &HashMap::new()).unwrap_err();
        assert!(matches!(err, FranzError::TypeMismatch(_, _)));
    }

    #[test]
    fn is_idempotent() {
        let func = function_of("f = {n -> <- (add n 1)}");
        let sig1 = infer_function("t.franz", &func, &HashMap::new()).unwrap();
        let sig2 = infer_function("t.franz", &func, &HashMap::new()).unwrap();
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn calls_to_known_functions_read_their_return_type() {
        let mut known = HashMap::new();
        known.insert(
            "helper".to_string(),
            Signature { param_types: vec![Type::Int], return_type: Type::Float, returns_param: None },
        );
        let func = function_of("f = {n -> <- (helper n)}");
        let sig = infer_function("t.franz", &func, &known).unwrap();
        assert_eq!(sig.return_type, Type::Float);
    }
}
