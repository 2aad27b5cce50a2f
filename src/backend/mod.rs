//! Execution backend: the bytecode virtual machine (§4.3, §4.4).

pub mod vm;
