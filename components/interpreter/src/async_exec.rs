//! Asynchronous execution surface (spec §4.7, §5, §2's `exec_async`).
//!
//! `exec_async` hands back a plain [`Task`]; it does not take a scheduler
//! itself. A caller with a cooperative event loop composes the returned
//! task with [`async_runtime::await_task`]; a caller with none can run it to
//! completion with [`async_runtime::drive_inline`]. This mirrors
//! `async_runtime::Task`'s own doc comment: "the VM's own `exec_async`
//! surface is itself implemented as one, so that a script awaiting a native
//! async call is just one `Task` polling another."

use std::cell::RefCell;
use std::rc::Rc;

use async_runtime::{Poll, Task};
use bytecode_system::Compiled;
use core_types::Value;
use library_api::{Attach, Library};
use memory_manager::Heap;

use crate::vm::{self, StepOutcome, VmState};

/// Begin (but do not drive) an asynchronous run of `compiled`. Every poll
/// either advances the dispatch loop until the program finishes or the next
/// suspension point, or — if an awaited task is already pending — polls
/// that task first and resumes the loop only once it settles.
pub fn exec_async(
    compiled: Rc<Compiled>,
    root: Value,
    attach: Attach,
    heap: Rc<RefCell<Heap>>,
    library: Rc<dyn Library>,
) -> Task<Result<Value, Value>> {
    let mut state = VmState::new(&compiled);
    let mut pending: Option<Task<Result<Value, Value>>> = None;

    Task::from_poll_fn(move || loop {
        if let Some(task) = pending.as_mut() {
            let settled = match task.poll() {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(result) => result,
            };
            pending = None;
            let mut heap_ref = heap.borrow_mut();
            match vm::resume_after_await(
                &mut state,
                &compiled,
                &mut heap_ref,
                library.as_ref(),
                &root,
                &attach,
                settled,
            ) {
                StepOutcome::Done(result) => return Poll::Ready(result),
                StepOutcome::Await(next) => {
                    pending = Some(next);
                    continue;
                }
            }
        }

        let mut heap_ref = heap.borrow_mut();
        match vm::run(&mut state, &compiled, &mut heap_ref, library.as_ref(), &root, &attach, true) {
            StepOutcome::Done(result) => return Poll::Ready(result),
            StepOutcome::Await(task) => {
                pending = Some(task);
                continue;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_runtime::drive_inline;
    use bytecode_system::{ConstValue, OpCode};
    use library_api::{AsyncConstant, AsyncFunction, Constant, DirectiveDef, ExecutionContext, Function};
    use core_types::SourcePosition;

    struct DoubleAsync;
    impl AsyncFunction for DoubleAsync {
        fn call(&self, ctx: &mut dyn ExecutionContext) -> Task<Result<Value, Value>> {
            let arg = ctx.arg_value(0).clone();
            let n = match arg {
                Value::Integer(n) => n,
                _ => 0,
            };
            // Resolves on its second poll, to exercise a real suspension.
            let mut polled_once = false;
            Task::from_poll_fn(move || {
                if !polled_once {
                    polled_once = true;
                    Poll::Pending
                } else {
                    Poll::Ready(Ok(Value::Integer(n * 2)))
                }
            })
        }
    }

    struct OneAsyncFuncLibrary {
        doubler: DoubleAsync,
    }

    impl Library for OneAsyncFuncLibrary {
        fn find_func(&self, _name: &str) -> Option<&dyn Function> {
            None
        }
        fn find_async_func(&self, name: &str) -> Option<&dyn AsyncFunction> {
            (name == "double").then_some(&self.doubler as &dyn AsyncFunction)
        }
        fn find_constant(&self, _ns: &str, _key: &str) -> Option<&dyn Constant> {
            None
        }
        fn find_async_constant(&self, _ns: &str, _key: &str) -> Option<&dyn AsyncConstant> {
            None
        }
        fn find_directive_def(
            &self,
            _directive_type: &str,
            _name: &str,
            _literals: &[ConstValue],
        ) -> Option<&dyn DirectiveDef> {
            None
        }
    }

    /// `return double(21);` where `double` is an async library function
    /// that resolves to `42` after one suspension.
    #[test]
    fn async_call_suspends_then_resumes_with_its_result() {
        let mut compiled = Compiled::new();
        let arg = compiled.add_const(ConstValue::Integer(21));
        let fn_idx = compiled.intern_string("double");
        compiled.codes = vec![
            OpCode::LoadConst(arg),
            OpCode::CallAsyncFunc { argc: 1, fn_idx },
            OpCode::EndReturn,
        ];
        compiled.positions = vec![SourcePosition::UNKNOWN; compiled.codes.len()];
        compiled.contains_async = true;
        compiled.stack_size = 1;

        let compiled = Rc::new(compiled);
        let heap = Rc::new(RefCell::new(Heap::new()));
        let library: Rc<dyn Library> = Rc::new(OneAsyncFuncLibrary { doubler: DoubleAsync });
        let attach: Attach = Rc::new(());

        let task = exec_async(compiled, Value::Undefined, attach, heap, library);
        let result = drive_inline(task).unwrap();
        assert!(matches!(result, Value::Integer(42)));
    }
}
