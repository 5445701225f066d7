//! Compile-time error taxonomy.
//!
//! One variant per error kind named in the error handling design, each
//! wrapping a small struct implementing [`Display`] + [`Error`], with the
//! outer enum delegating rendering to `span().to_string(err())`. This is
//! the same shape `why_lib`'s `typechecker::error::TypeCheckError` uses.

use std::error::Error;
use std::fmt::Display;

use crate::span::Span;
use crate::types::Type;

#[derive(Clone, Debug, PartialEq)]
pub enum FranzError {
    Parse(ParseError, Span),
    UndefinedVariable(UndefinedVariable, Span),
    ImmutableReassignment(ImmutableReassignment, Span),
    TypeMismatch(TypeMismatch, Span),
    ArgumentCount(ArgumentCount, Span),
    CircularImport(CircularImport, Span),
    CapabilityDenied(CapabilityDenied, Span),
    UnsupportedOpcode(UnsupportedOpcode, Span),
    IrVerification(IrVerification, Span),
}

impl Display for FranzError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.span().to_string(self.err()).as_str())
    }
}

impl FranzError {
    fn span(&self) -> Span {
        match self {
            FranzError::Parse(_, span) => span.clone(),
            FranzError::UndefinedVariable(_, span) => span.clone(),
            FranzError::ImmutableReassignment(_, span) => span.clone(),
            FranzError::TypeMismatch(_, span) => span.clone(),
            FranzError::ArgumentCount(_, span) => span.clone(),
            FranzError::CircularImport(_, span) => span.clone(),
            FranzError::CapabilityDenied(_, span) => span.clone(),
            FranzError::UnsupportedOpcode(_, span) => span.clone(),
            FranzError::IrVerification(_, span) => span.clone(),
        }
    }

    fn err(&self) -> Box<dyn Error> {
        match self {
            FranzError::Parse(e, _) => Box::new(e.clone()),
            FranzError::UndefinedVariable(e, _) => Box::new(e.clone()),
            FranzError::ImmutableReassignment(e, _) => Box::new(e.clone()),
            FranzError::TypeMismatch(e, _) => Box::new(e.clone()),
            FranzError::ArgumentCount(e, _) => Box::new(e.clone()),
            FranzError::CircularImport(e, _) => Box::new(e.clone()),
            FranzError::CapabilityDenied(e, _) => Box::new(e.clone()),
            FranzError::UnsupportedOpcode(e, _) => Box::new(e.clone()),
            FranzError::IrVerification(e, _) => Box::new(e.clone()),
        }
    }
}

impl Error for FranzError {}

#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for ParseError {}

#[derive(Clone, Debug, PartialEq)]
pub struct UndefinedVariable {
    pub name: String,
}

impl Display for UndefinedVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "undefined variable '{}'", self.name)
    }
}

impl Error for UndefinedVariable {}

#[derive(Clone, Debug, PartialEq)]
pub struct ImmutableReassignment {
    pub name: String,
}

impl Display for ImmutableReassignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot reassign immutable variable '{}'", self.name)
    }
}

impl Error for ImmutableReassignment {}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeMismatch {
    pub expected: Type,
    pub actual: Type,
}

impl Display for TypeMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected type {:?} but got {:?}", self.expected, self.actual)
    }
}

impl Error for TypeMismatch {}

#[derive(Clone, Debug, PartialEq)]
pub struct ArgumentCount {
    pub builtin: String,
    pub expected: usize,
    pub actual: usize,
}

impl Display for ArgumentCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' expects {} argument(s) but got {}",
            self.builtin, self.expected, self.actual
        )
    }
}

impl Error for ArgumentCount {}

#[derive(Clone, Debug, PartialEq)]
pub struct CircularImport {
    pub chain: Vec<String>,
}

impl Display for CircularImport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "circular import: ")?;
        for (i, path) in self.chain.iter().enumerate() {
            write!(f, "{path}")?;
            if i + 1 < self.chain.len() {
                write!(f, " -> ")?;
            }
        }
        write!(f, " CYCLE BACK TO [1]")
    }
}

impl Error for CircularImport {}

#[derive(Clone, Debug, PartialEq)]
pub struct CapabilityDenied {
    pub capability: String,
    pub module: String,
}

impl Display for CapabilityDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "module '{}' is not permitted to use capability '{}'",
            self.module, self.capability
        )
    }
}

impl Error for CapabilityDenied {}

#[derive(Clone, Debug, PartialEq)]
pub struct UnsupportedOpcode {
    pub opcode: String,
}

impl Display for UnsupportedOpcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unsupported opcode '{}'", self.opcode)
    }
}

impl Error for UnsupportedOpcode {}

#[derive(Clone, Debug, PartialEq)]
pub struct IrVerification {
    pub message: String,
}

impl Display for IrVerification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IR verification failed: {}", self.message)
    }
}

impl Error for IrVerification {}
