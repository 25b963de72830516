//! A portable WebAssembly bytecode interpreter.
//!
//! tarn takes a binary module through four stages: decoding, validation,
//! linearization into flat bytecode with absolute branch targets, and
//! execution on an untagged value stack.
//!
//! # Modules
//!
//! - [`parser`] -- Binary decoder, validator and linearizer. Produces a [`Module`].
//! - [`runtime`] -- Instances, memory, tables and the interpreter.
//!
//! # Example
//!
//! ```
//! use tarn::{parse, Instance, Value};
//!
//! // (func (export "add") (param i32 i32) (result i32)
//! //   local.get 0 local.get 1 i32.add)
//! let bytes = hex::decode(concat!(
//!     "0061736d01000000",
//!     "0107016002017f7f017f",
//!     "03020100",
//!     "070701036164640000",
//!     "0a09010700200020016a0b",
//! ))
//! .unwrap();
//!
//! let module = parse(&bytes).unwrap();
//! let mut instance = Instance::new(&module).unwrap();
//! let results = instance.call_export("add", &[Value::I32(10), Value::I32(20)]).unwrap();
//! assert_eq!(results, vec![Value::I32(30)]);
//! ```
//!
//! No logger is installed; events go through the `log` facade.

pub mod parser;
pub mod runtime;

pub use parser::module::{ExternDescriptor, ExternKind, FunctionType, Module, ValueType};
pub use parser::validate::ValidationError;
pub use parser::{parse, ParseError};
pub use runtime::{Config, Instance, RuntimeError, TrapKind, Value};
