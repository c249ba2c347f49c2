//! Error vocabulary shared across the pipeline.
//!
//! Parse/compile failures and runtime exceptions are deliberately kept as
//! distinct types (see spec §7): a `ParseError` never reaches the VM, and a
//! `RuntimeException` is always a heap value the script itself can catch.

use crate::SourcePosition;
use thiserror::Error;

/// A failure produced by the tokenizer, parser or bytecode compiler.
///
/// No partial `Compiled` program is ever returned alongside one of these.
#[derive(Debug, Clone, Error)]
#[error("{message} (offset {offset})")]
pub struct ParseError {
    /// Human-readable description of what went wrong.
    pub message: String,
    /// Byte offset into the source where the error was detected.
    pub offset: usize,
}

impl ParseError {
    /// Construct a parse error at the given offset.
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        ParseError {
            message: message.into(),
            offset,
        }
    }
}

/// The well-known exception names the VM raises on operator/allocation
/// failure (spec §4.7, §7). Library callees and user `throw` statements may
/// use any name; these are only the ones the *interpreter itself* produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// Mismatched operand types for an operator.
    TypeError,
    /// Integer or float division/modulo by zero.
    DivisionByZero,
    /// Out-of-range array/string index.
    IndexError,
    /// Heap allocation failed.
    OutOfMemory,
    /// An awaited async library call's task failed abnormally.
    AsyncError,
}

impl ExceptionKind {
    /// The exception `name` string used when this kind is materialized as a
    /// heap exception value (e.g. `EXEC_TYPE_ERROR`).
    pub fn name(&self) -> &'static str {
        match self {
            ExceptionKind::TypeError => "EXEC_TYPE_ERROR",
            ExceptionKind::DivisionByZero => "EXEC_DIVISION_BY_ZERO",
            ExceptionKind::IndexError => "EXEC_INDEX_ERROR",
            ExceptionKind::OutOfMemory => "EXEC_OOM",
            ExceptionKind::AsyncError => "EXEC_ASYNC_ERROR",
        }
    }
}

/// A single stack frame recorded for diagnostics (not exposed to scripts).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    /// Position of the call site.
    pub position: SourcePosition,
}

/// Top-level error type for the host-facing `script_engine` surface: spans
/// parse, compile and runtime failures under one umbrella so a host can
/// match once instead of threading three separate error types through its
/// own call sites.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Tokenizer/parser failure.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// Heap allocation failed while compiling or preparing execution.
    #[error("out of memory")]
    OutOfMemory,
}
