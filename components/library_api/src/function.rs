//! The callable shapes a library exposes (spec §6).

use core_types::Value;

use async_runtime::Task;
use crate::context::ExecutionContext;

/// A synchronous library function. `Err` carries an exception value the
/// VM throws as if the script itself had thrown it (spec §7).
pub trait Function {
    fn call(&self, ctx: &mut dyn ExecutionContext) -> Result<Value, Value>;
}

/// An asynchronous library function, called at `CALL_ASYNC_FUNC`/
/// `CALL_ASYNC_FUNC_SPREAD`. Returns a task rather than a value directly;
/// the VM suspends awaiting it (spec §5's three suspension points).
pub trait AsyncFunction {
    fn call(&self, ctx: &mut dyn ExecutionContext) -> Task<Result<Value, Value>>;
}

/// A zero-argument library constant, looked up by `$ns.key` (spec §4.5).
/// Constants are callable rather than plain stored values because
/// producing one may still need heap access (e.g. interning a string) or
/// the attach pointer.
pub trait Constant {
    fn get(&self, ctx: &mut dyn ExecutionContext) -> Result<Value, Value>;
}

/// The async counterpart to [`Constant`], looked up by `CALL_ASYNC_CONST`.
pub trait AsyncConstant {
    fn get(&self, ctx: &mut dyn ExecutionContext) -> Task<Result<Value, Value>>;
}

/// A directive's own function table, returned by
/// [`crate::Library::find_directive_def`]. `NAME.METHOD(args)` resolves
/// through here once the directive statement that introduced `NAME` has
/// been registered (spec §4.5).
pub trait DirectiveDef {
    fn find_func(&self, directive: &str, function: &str) -> Option<&dyn Function>;
    fn find_async_func(&self, directive: &str, function: &str) -> Option<&dyn AsyncFunction>;
}
