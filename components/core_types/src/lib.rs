//! Shared vocabulary for the script engine: the tagged `Value` type, source
//! positions, and the error/exception taxonomy used by every other crate in
//! the workspace.
//!
//! This crate has no GC, parser or VM logic of its own — see
//! `memory_manager`, `script_parser`, `bytecode_system` and `interpreter`
//! for those. Keeping it leaf-level lets every other crate depend on a
//! stable, tiny vocabulary without pulling in the heap or the VM.

#![warn(missing_docs)]

pub mod error;
pub mod source;
pub mod value;

pub use error::{EngineError, ExceptionKind, ParseError, StackFrame};
pub use source::SourcePosition;
pub use value::{ArrayRef, BinaryRef, ExceptionRef, IterRef, ObjectRef, StringRef, Value};
