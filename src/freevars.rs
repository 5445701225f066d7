//! C1 - Free-variable analyzer.
//!
//! Walks a function literal's body once, tracking a stack of locally
//! bound names (parameters, assignment targets introduced inside the
//! body). Any identifier reference not on that stack is free. Pure: the
//! only AST mutation is writing `free_vars` on `Function` nodes,
//! matching `why_lib`'s `find_free_variables`/`collect_free_variables`
//! pass over `Lambda` nodes.

use std::collections::HashSet;

use crate::ast::{Node, Opcode};

/// Runs C1 on every `Function` node reachable from `nodes`, writing
/// `free_vars` in place (including on nested function literals, whose
/// own captures are folded into the outer function's captures when the
/// outer function doesn't bind them itself - this is what makes
/// arbitrary-depth nesting work).
pub fn analyze_program(nodes: &mut [Node]) {
    let mut bound = HashSet::new();
    for node in nodes.iter_mut() {
        analyze_node(node, &mut bound);
    }
}

fn analyze_node(node: &mut Node, bound: &mut HashSet<String>) {
    match node.opcode {
        Opcode::Function => {
            let free = analyze_function(node);
            node.free_vars = free;
        }
        Opcode::Assignment => {
            bound.insert(node.value.clone());
            for child in node.children.iter_mut() {
                analyze_node(child, bound);
            }
        }
        _ => {
            for child in node.children.iter_mut() {
                analyze_node(child, bound);
            }
        }
    }
}

/// Analyze one function literal, returning its free variables in
/// discovery order (de-duplicated). `locals` tracks everything bound
/// inside this function (parameters plus local assignment targets);
/// nested function literals are recursed into and their own free
/// variables are propagated outward for any name `locals` doesn't bind.
fn analyze_function(func: &mut Node) -> Vec<String> {
    let mut locals: HashSet<String> = func.params().iter().map(|p| p.value.clone()).collect();
    let mut free = Vec::new();
    let mut seen = HashSet::new();

    let body_index = func.children.len() - 1;
    collect_free(&mut func.children[body_index], &mut locals, &mut free, &mut seen);

    free
}

fn collect_free(
    node: &mut Node,
    locals: &mut HashSet<String>,
    free: &mut Vec<String>,
    seen: &mut HashSet<String>,
) {
    match node.opcode {
        Opcode::Identifier => {
            if !locals.contains(&node.value) && seen.insert(node.value.clone()) {
                free.push(node.value.clone());
            }
        }
        Opcode::Assignment => {
            // RHS is evaluated under the locals known so far (so
            // self-referential assignment of a non-function value isn't
            // magically bound), then the target becomes local for
            // everything that follows.
            for child in node.children.iter_mut() {
                collect_free(child, locals, free, seen);
            }
            locals.insert(node.value.clone());
        }
        Opcode::Function => {
            let mut inner_locals: HashSet<String> =
                node.params().iter().map(|p| p.value.clone()).collect();
            let mut inner_free = Vec::new();
            let mut inner_seen = HashSet::new();
            let body_index = node.children.len() - 1;
            collect_free(
                &mut node.children[body_index],
                &mut inner_locals,
                &mut inner_free,
                &mut inner_seen,
            );
            node.free_vars = inner_free.clone();

            for name in inner_free {
                if !locals.contains(&name) && seen.insert(name.clone()) {
                    free.push(name);
                }
            }
        }
        _ => {
            for child in node.children.iter_mut() {
                collect_free(child, locals, free, seen);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn function_of(source: &str) -> Node {
        let tokens = lex("t.franz", source).unwrap();
        let mut nodes = parse("t.franz", tokens).unwrap();
        analyze_program(&mut nodes);
        nodes.into_iter().next().unwrap().children.into_iter().next().unwrap()
    }

    #[test]
    fn a_parameter_is_never_free() {
        let func = function_of("f = {n -> <- n}");
        assert!(func.free_vars.is_empty());
    }

    #[test]
    fn an_outer_local_referenced_in_the_body_is_free() {
        let func = function_of("f = {-> <- count}");
        assert_eq!(func.free_vars, vec!["count".to_string()]);
    }

    #[test]
    fn nested_lambda_captures_propagate_to_the_outer_function() {
        // the inner lambda captures `count`; the outer function binds
        // nothing of that name, so it must also be reported as free on
        // the outer node.
        let func = function_of("f = {-> <- {-> <- count}}");
        assert_eq!(func.free_vars, vec!["count".to_string()]);
        let inner = &func.body().children[0];
        assert_eq!(inner.free_vars, vec!["count".to_string()]);
    }

    #[test]
    fn a_locally_bound_name_is_not_free() {
        let func = function_of("f = {-> x = 1; <- x}");
        assert!(func.free_vars.is_empty());
    }

    #[test]
    fn free_variables_are_deduplicated_in_discovery_order() {
        let func = function_of("f = {-> <- (add count count)}");
        assert_eq!(func.free_vars, vec!["count".to_string()]);
    }
}
