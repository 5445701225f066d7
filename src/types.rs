//! Inferred source-level types and the runtime return-tag encoding.
//!
//! `Type` is what C2 produces per parameter/return position. `ReturnTag`
//! is the separate, smaller vocabulary stored in the closure record
//! (`{fn_ptr, env_ptr, return_tag, param_index}`) - the two are related
//! (`Type::to_return_tag`) but not identical: `Type` has `Unknown` and
//! `List`, while the ABI-visible tag collapses those into `Dynamic` /
//! `Pointer`.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    String,
    List,
    Void,
    Unknown,
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Width-promotion: if either operand is `Float`, the result is
    /// `Float`; otherwise `Int`. Only meaningful for two numeric types.
    pub fn promote(a: Type, b: Type) -> Type {
        if a == Type::Float || b == Type::Float {
            Type::Float
        } else {
            Type::Int
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Type::Int => "int",
            Type::Float => "float",
            Type::String => "string",
            Type::List => "list",
            Type::Void => "void",
            Type::Unknown => "unknown",
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The four-bit-ish vocabulary stored in a closure record's `return_tag`
/// field and used at every call site to decide how to reinterpret the
/// universal `i8*` return value. See the universal-value calling
/// convention for the precedence rules that pick one of these per
/// closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnTag {
    Int = 0,
    Float = 1,
    Pointer = 2,
    Closure = 3,
    Void = 4,
    Dynamic = 5,
}

impl ReturnTag {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(v: i32) -> Self {
        match v {
            0 => ReturnTag::Int,
            1 => ReturnTag::Float,
            2 => ReturnTag::Pointer,
            3 => ReturnTag::Closure,
            4 => ReturnTag::Void,
            5 => ReturnTag::Dynamic,
            other => panic!("invalid return tag {other}"),
        }
    }

    /// Derive a tag purely from an LLVM-level type shape, the lowest
    /// rung of the precedence ladder in closure lowering (used only when
    /// inference didn't pin down INT/FLOAT and the terminal expression
    /// isn't a literal closure or a bare parameter reference). `Unknown`
    /// compiles to `i8*` like every other non-numeric type, so it maps
    /// to `Pointer`, not `Dynamic` - `Dynamic` is reserved for the
    /// bare-parameter rung above this one, which carries a real
    /// `param_index` to resolve against.
    pub fn from_type(ty: Type) -> Self {
        match ty {
            Type::Int => ReturnTag::Int,
            Type::Float => ReturnTag::Float,
            Type::String | Type::List | Type::Unknown => ReturnTag::Pointer,
            Type::Void => ReturnTag::Void,
        }
    }
}
