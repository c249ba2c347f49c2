//! Lowers an optimised AST (`script_parser::Block`) into a
//! `bytecode_system::Compiled` program (spec §4.6).
//!
//! Evaluation-stack and accessor conventions this compiler settles on
//! (the spec names the opcodes but leaves their exact push/pop contract
//! to the implementation):
//! - `PropSet`/`IdxSet` are *consuming*: they pop the value and the base
//!   (and index, for `IdxSet`) and push nothing. Used for plain
//!   `a.b = v;`/`a[i] = v;` statements.
//! - `PropSet1`/`IdxSet1` are *non-consuming*: they pop only the value,
//!   leaving the base object/array on the stack. Used while building an
//!   object/array literal, where the base is reused across many entries.
//! - `JumpIfFalse`/`JumpIfTrue` pop the tested value unconditionally,
//!   whether or not the jump is taken.

mod generator;

pub use generator::compile;

#[cfg(test)]
mod tests {
    use bytecode_system::{ConstValue, OpCode};
    use core_types::Value;
    use library_api::{AsyncConstant, AsyncFunction, Constant, DirectiveDef, ExecutionContext, Function, Library};

    struct NoopLibrary;
    impl Library for NoopLibrary {
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

    struct Identity;
    impl Function for Identity {
        fn call(&self, ctx: &mut dyn ExecutionContext) -> Result<Value, Value> {
            Ok(ctx.arg_value(0).clone())
        }
    }

    struct WithIdentity {
        identity: Identity,
    }
    impl Library for WithIdentity {
        fn find_func(&self, name: &str) -> Option<&dyn Function> {
            (name == "identity").then_some(&self.identity as &dyn Function)
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

    fn compile_src(src: &str, library: &dyn Library) -> bytecode_system::Compiled {
        let block = script_parser::parse_and_optimize(src, library).unwrap();
        compile(&block).unwrap()
    }

    #[test]
    fn arithmetic_folds_to_a_single_const_and_return() {
        let program = compile_src("return 1 + 2 * 3;", &NoopLibrary);
        assert_eq!(program.codes.last(), Some(&OpCode::EndReturn));
        assert!(program
            .codes
            .iter()
            .any(|c| matches!(c, OpCode::LoadConst(_))));
    }

    #[test]
    fn missing_trailing_return_is_materialised() {
        let program = compile_src("let x = 1;", &NoopLibrary);
        assert_eq!(program.codes.last(), Some(&OpCode::EndReturn));
        assert_eq!(program.const_pool.last(), Some(&ConstValue::Undefined));
    }

    #[test]
    fn for_of_loop_emits_the_iteration_opcode_sequence() {
        let program = compile_src(
            "let s = 0; for (let k, v of arr) { s = v; } return s;",
            &NoopLibrary,
        );
        assert!(matches!(program.codes.iter().find(|c| matches!(c, OpCode::IterateInto(_))), Some(_)));
        assert!(program.codes.iter().any(|c| matches!(c, OpCode::IterateNext(_))));
        assert!(program.codes.iter().any(|c| matches!(c, OpCode::IterateKey { .. })));
        assert!(program.codes.iter().any(|c| matches!(c, OpCode::IterateValue { .. })));
    }

    #[test]
    fn try_catch_appends_a_well_formed_exception_table_entry() {
        let program = compile_src(
            "try { throw 1; } catch (e) { return e; }",
            &NoopLibrary,
        );
        assert_eq!(program.exception_table.len(), 1);
        assert!(program.exception_table_is_well_formed());
    }

    #[test]
    fn function_call_without_spread_passes_a_fixed_argc() {
        let library = WithIdentity { identity: Identity };
        let program = compile_src("return identity(42);", &library);
        assert!(program.codes.iter().any(|c| matches!(c, OpCode::CallFunc { argc: 1, .. })));
    }

    #[test]
    fn function_call_with_spread_builds_an_array_first() {
        let library = WithIdentity { identity: Identity };
        let program = compile_src("return identity(...xs);", &library);
        assert!(program.codes.iter().any(|c| matches!(c, OpCode::NewArray(0))));
        assert!(program.codes.iter().any(|c| matches!(c, OpCode::ExpArray)));
        assert!(program.codes.iter().any(|c| matches!(c, OpCode::CallFuncSpread { .. })));
    }

    #[test]
    fn object_literal_reuses_the_base_without_dumping() {
        let program = compile_src("return { a: 1, b: 2 };", &NoopLibrary);
        assert!(program.codes.iter().any(|c| matches!(c, OpCode::NewObject(0))));
        assert_eq!(
            program.codes.iter().filter(|c| matches!(c, OpCode::PropSet1(_))).count(),
            2
        );
    }

    #[test]
    fn logical_and_short_circuits_via_dump_and_jump() {
        let program = compile_src("return false && 1;", &NoopLibrary);
        assert!(program.codes.iter().any(|c| matches!(c, OpCode::Dump)));
        assert!(program.codes.iter().any(|c| matches!(c, OpCode::JumpIfFalse(_))));
    }

    #[test]
    fn break_and_continue_resolve_to_loop_boundaries() {
        let program = compile_src(
            "for (let k, v of arr) { if (v) { break; } continue; }",
            &NoopLibrary,
        );
        // Two jumps patched for break/continue, plus the loop's own back-edge
        // and the `ITERATE_NEXT` guard jump.
        assert!(program.codes.iter().filter(|c| matches!(c, OpCode::Jump(_))).count() >= 2);
    }

    #[test]
    fn stack_size_is_reported_and_never_left_at_zero_for_nonempty_programs() {
        let program = compile_src("return 1 + 2;", &NoopLibrary);
        assert!(program.stack_size >= 2);
    }
}
