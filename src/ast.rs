//! The uniform AST node shared by every stage of the compiler.
//!
//! C1 through C4 all operate on this single node shape rather than a
//! family of per-construct types; the opcode distinguishes what a node
//! means and `children` carries everything opcode-specific (a function's
//! parameter list and body, a list's elements, an application's arguments,
//! ...). This keeps the generator's dispatch a single `match` in
//! [`crate::codegen`] instead of a trait implemented per node type.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Int,
    Float,
    String,
    Identifier,
    List,
    Assignment,
    Application,
    Statement,
    Function,
    Return,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Int => "INT",
            Opcode::Float => "FLOAT",
            Opcode::String => "STRING",
            Opcode::Identifier => "IDENTIFIER",
            Opcode::List => "LIST",
            Opcode::Assignment => "ASSIGNMENT",
            Opcode::Application => "APPLICATION",
            Opcode::Statement => "STATEMENT",
            Opcode::Function => "FUNCTION",
            Opcode::Return => "RETURN",
        };
        f.write_str(name)
    }
}

/// Uniform AST node: `{opcode, value, children[], line, free_vars[],
/// is_mutable}`. `child_count`/`free_vars_count` are not stored as
/// separate fields (they'd just be `children.len()`/`free_vars.len()`
/// kept in sync by hand); `Node` exposes them as methods instead so the
/// two can never drift out of sync.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub opcode: Opcode,
    pub value: String,
    pub children: Vec<Node>,
    pub line: usize,
    /// Populated by C1 for `Function` nodes; empty for every other opcode
    /// until analyzed. Order is discovery order, not sorted - the
    /// environment layout in C3 depends on this.
    pub free_vars: Vec<String>,
    pub is_mutable: bool,
}

impl Node {
    pub fn new(opcode: Opcode, value: impl Into<String>, line: usize) -> Self {
        Self {
            opcode,
            value: value.into(),
            children: Vec::new(),
            line,
            free_vars: Vec::new(),
            is_mutable: false,
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn mutable(mut self) -> Self {
        self.is_mutable = true;
        self
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn free_vars_count(&self) -> usize {
        self.free_vars.len()
    }

    /// Function nodes store their parameter-name list as the leading
    /// children with opcode `Identifier`, immediately followed by the
    /// body (a `Statement` node). `params()`/`body()` are the accessors
    /// every C1-C4 consumer uses instead of indexing `children` by hand.
    pub fn params(&self) -> &[Node] {
        debug_assert_eq!(self.opcode, Opcode::Function);
        &self.children[..self.children.len() - 1]
    }

    pub fn body(&self) -> &Node {
        debug_assert_eq!(self.opcode, Opcode::Function);
        self.children.last().expect("function node has no body")
    }
}
