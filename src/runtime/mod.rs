//! WebAssembly runtime
//!
//! Instantiation of parsed modules and the interpreter that runs their
//! linearized code on a flat value stack.

pub mod config;
pub mod executor;
pub mod frame;
pub mod instance;
pub mod memory;
pub mod ops;
pub mod stack;
pub mod table;
pub mod value;

pub use config::Config;
pub use instance::Instance;
pub use memory::Memory;
pub use table::Table;
pub use value::Value;

/// Semantic violations detected while executing code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TrapKind {
    #[error("unreachable")]
    Unreachable,
    #[error("integer divide by zero")]
    IntegerDivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversionToInteger,
    #[error("undefined element")]
    UndefinedElement,
    #[error("uninitialized element")]
    UninitializedElement,
    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,
    #[error("out of bounds table access")]
    TableOutOfBounds,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("{0}")]
    Trap(#[from] TrapKind),
    #[error("out of bounds memory access")]
    MemoryOutOfBounds,
    #[error("call stack exhausted")]
    CallStackOverflow,
    #[error("cannot allocate {0} bytes of linear memory")]
    OutOfMemory(usize),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("misuse: {0}")]
    Misuse(String),
    #[error("invalid arguments: {0}")]
    ValidationFailed(String),
    #[error("unknown import {module}.{name}")]
    UnresolvedImport { module: String, name: String },
    #[error("stack underflow")]
    StackUnderflow,
}

impl RuntimeError {
    /// Traps are the failures a module can cause by executing; the rest come
    /// from the host or from execution limits.
    pub fn is_trap(&self) -> bool {
        matches!(self, RuntimeError::Trap(_) | RuntimeError::MemoryOutOfBounds)
    }
}
