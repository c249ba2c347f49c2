//! Synchronous execution surface (spec §4.7, §2's `exec_sync`).

use bytecode_system::Compiled;
use core_types::{ExceptionKind, SourcePosition, Value};
use library_api::{Attach, Library};
use memory_manager::Heap;

use crate::vm::{self, StepOutcome, VmState};

/// Run `compiled` to completion on the calling thread. A program that
/// contains any `CALL_ASYNC_*` opcode is rejected up front with an
/// `EXEC_ASYNC_ERROR` exception rather than ever starting the dispatch loop
/// (spec §4.7: "a program requiring suspension must be run through
/// `exec_async`").
pub fn exec_sync(
    compiled: &Compiled,
    root: Value,
    attach: Attach,
    heap: &mut Heap,
    library: &dyn Library,
) -> Result<Value, Value> {
    if compiled.contains_async {
        let exc = heap
            .new_exception_from_kind(
                ExceptionKind::AsyncError,
                "program requires asynchronous execution; use exec_async",
                SourcePosition::UNKNOWN,
            )
            .map(Value::Exception)
            .unwrap_or(Value::Null);
        return Err(exc);
    }

    let mut state = VmState::new(compiled);
    match vm::run(&mut state, compiled, heap, library, &root, &attach, false) {
        StepOutcome::Done(result) => result,
        StepOutcome::Await(_) => unreachable!(
            "exec_sync's allow_async=false guarantees run() never returns StepOutcome::Await"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecode_system::{ConstValue, OpCode};
    use library_api::{AsyncConstant, AsyncFunction, Constant, DirectiveDef, Function};
    use std::rc::Rc;

    struct EmptyLibrary;
    impl Library for EmptyLibrary {
        fn find_func(&self, _name: &str) -> Option<&dyn Function> {
            None
        }
        fn find_async_func(&self, _name: &str) -> Option<&dyn AsyncFunction> {
            None
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

    fn attach() -> Attach {
        Rc::new(())
    }

    /// `return 1 + 2 * 3;` already folded to `1 + 6` by the optimizer, or
    /// left as three loads and two binary ops; either compiles fine here.
    #[test]
    fn arithmetic_expression_returns_seven() {
        let mut compiled = Compiled::new();
        let one = compiled.add_const(ConstValue::Integer(1));
        let two = compiled.add_const(ConstValue::Integer(2));
        let three = compiled.add_const(ConstValue::Integer(3));
        compiled.codes = vec![
            OpCode::LoadConst(one),
            OpCode::LoadConst(two),
            OpCode::LoadConst(three),
            OpCode::BopMultiply,
            OpCode::BopPlus,
            OpCode::EndReturn,
        ];
        compiled.positions = vec![SourcePosition::UNKNOWN; compiled.codes.len()];
        compiled.stack_size = 3;

        let mut heap = Heap::new();
        let lib = EmptyLibrary;
        let result = exec_sync(&compiled, Value::Undefined, attach(), &mut heap, &lib).unwrap();
        assert!(matches!(result, Value::Integer(7)));
    }

    /// `try { throw "oops"; } catch (e) { return e; }` — the thrown value
    /// reaches the catch variable unwrapped (spec scenario 3).
    #[test]
    fn thrown_string_is_caught_unwrapped() {
        let mut compiled = Compiled::new();
        let oops = compiled.add_const(ConstValue::Str("oops".to_string()));
        // 0: LoadConst oops   (try body)
        // 1: ThrowExp
        // 2: IntoCatch var0   (catch target)
        // 3: LoadVar 0
        // 4: EndReturn
        compiled.codes = vec![
            OpCode::LoadConst(oops),
            OpCode::ThrowExp,
            OpCode::IntoCatch(0),
            OpCode::LoadVar(0),
            OpCode::EndReturn,
        ];
        compiled.positions = vec![SourcePosition::UNKNOWN; compiled.codes.len()];
        compiled.var_table_size = 1;
        compiled.stack_size = 1;
        compiled.exception_table.push(bytecode_system::ExceptionEntry {
            try_begin: 0,
            catch_begin: 2,
            catch_end: 5,
        });

        let mut heap = Heap::new();
        let lib = EmptyLibrary;
        let result = exec_sync(&compiled, Value::Undefined, attach(), &mut heap, &lib).unwrap();
        match result {
            Value::HeapString(r) => assert_eq!(heap.string_content(r), "oops"),
            other => panic!("expected the raw thrown string, got {:?}", other),
        }
    }

    #[test]
    fn program_containing_async_opcode_is_rejected_up_front() {
        let mut compiled = Compiled::new();
        compiled.codes = vec![OpCode::CallAsyncFunc { argc: 0, fn_idx: 0 }, OpCode::EndReturn];
        compiled.positions = vec![SourcePosition::UNKNOWN; compiled.codes.len()];
        compiled.contains_async = true;

        let mut heap = Heap::new();
        let lib = EmptyLibrary;
        let err = exec_sync(&compiled, Value::Undefined, attach(), &mut heap, &lib).unwrap_err();
        match err {
            Value::Exception(r) => {
                let exc = heap.exception(r).unwrap();
                assert_eq!(heap.string_content(exc.name), "EXEC_ASYNC_ERROR");
            }
            other => panic!("expected an exception value, got {:?}", other),
        }
    }
}
