//! The abstract host capability surface (spec §6): the `Library` contract
//! the parser resolves names against and the interpreter dispatches
//! through, plus the `ExecutionContext` a callee receives.
//!
//! This crate defines traits only; it owns no concrete host. A host
//! embeds the engine by implementing [`Library`] and handing it to
//! `script_engine`.

mod context;
mod function;
mod library;

pub use context::{Attach, ExecutionContext, UNDEFINED};
pub use function::{AsyncConstant, AsyncFunction, Constant, DirectiveDef, Function};
pub use library::Library;
