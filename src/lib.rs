//! Myula: a compiler and bytecode virtual machine for a small Lox-family
//! scripting language (`let`/`const` bindings, closures, single-inheritance
//! classes, `switch`).

pub mod backend;
pub mod common;
pub mod frontend;

pub use backend::vm::{InterpretResult, VirtualMachine};
