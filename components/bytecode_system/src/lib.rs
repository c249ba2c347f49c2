//! Bytecode opcode set and the `Compiled` program representation the
//! compiler emits and the interpreter executes (spec §4.6).

pub mod compiled;
pub mod opcode;
pub mod packed;

pub use compiled::{Compiled, ConstValue, DirectiveSite, ExceptionEntry};
pub use opcode::{CodeAddr, ConstIdx, OpCode, StrIdx, VarIdx};
