//! Tokenizer, AST, recursive-descent parser and structural optimiser
//! (spec §4.5-§4.6). Consumes a `library_api::Library` purely for name
//! resolution at parse time; produces an optimised `Block` ready for the
//! bytecode compiler.

mod ast;
mod optimizer;
mod parser;
mod token;

pub use ast::{Block, Callee, Expr, ObjectEntry, Stmt};
pub use optimizer::optimize_block;
pub use parser::parse;
pub use token::{tokenize, Token};

use core_types::ParseError;
use library_api::Library;

/// Parse and optimise a script in one call: the shape every caller outside
/// this crate actually wants.
pub fn parse_and_optimize(source: &str, library: &dyn Library) -> Result<Block, ParseError> {
    parse(source, library).map(optimize_block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecode_system::ConstValue;
    use library_api::{AsyncConstant, AsyncFunction, Constant, DirectiveDef, ExecutionContext, Function};
    use core_types::Value;

    struct NoopLibrary;
    impl Library for NoopLibrary {
        fn find_func(&self, name: &str) -> Option<&dyn Function> {
            let _ = name;
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

    #[test]
    fn parses_and_folds_a_simple_arithmetic_script() {
        let block = parse_and_optimize("let x = 1 + 2 * 3;", &NoopLibrary).unwrap();
        assert_eq!(block.statements.len(), 1);
        match &block.statements[0] {
            Stmt::VariableDeclare { name, init, .. } => {
                assert_eq!(name, "x");
                assert_eq!(init, &Some(Expr::Literal(ConstValue::Integer(7), init.as_ref().unwrap().position())));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn rejects_a_call_to_an_unknown_function() {
        let err = parse_and_optimize("identity(1);", &NoopLibrary).unwrap_err();
        assert!(err.message.contains("identity"));
    }

    #[test]
    fn accepts_a_call_to_a_known_function() {
        let library = WithIdentity { identity: Identity };
        let block = parse_and_optimize("identity(1);", &library).unwrap();
        assert_eq!(block.statements.len(), 1);
    }

    #[test]
    fn for_of_try_catch_and_directives_parse_end_to_end() {
        let source = r#"
            let total = 0;
            try {
                for (let k, v of items) {
                    total = total + v;
                }
            } catch (e) {
                throw e;
            }
        "#;
        let block = parse_and_optimize(source, &NoopLibrary).unwrap();
        assert_eq!(block.statements.len(), 2);
        assert!(matches!(block.statements[1], Stmt::TryCatch { .. }));
    }

    #[test]
    fn ternary_ands_ors_and_ins_all_parse() {
        let block = parse_and_optimize("let ok = (1 < 2) && (3 > 2) ? \"a\" in b : 0;", &NoopLibrary).unwrap();
        assert_eq!(block.statements.len(), 1);
    }

    #[test]
    fn duplicate_object_literal_keys_are_a_parse_error() {
        let err = parse_and_optimize("let o = { a: 1, a: 2 };", &NoopLibrary).unwrap_err();
        assert!(err.message.contains("duplicate"));
    }

    #[test]
    fn assignment_to_a_non_lvalue_is_a_parse_error() {
        let err = parse_and_optimize("1 + 1 = 2;", &NoopLibrary).unwrap_err();
        assert!(err.message.contains("assign"));
    }

    struct NoopDirectiveDef;
    impl DirectiveDef for NoopDirectiveDef {
        fn find_func(&self, _directive: &str, _function: &str) -> Option<&dyn Function> {
            None
        }
        fn find_async_func(&self, _directive: &str, _function: &str) -> Option<&dyn AsyncFunction> {
            None
        }
    }

    struct WithDirective {
        def: NoopDirectiveDef,
    }
    impl Library for WithDirective {
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
            directive_type: &str,
            _name: &str,
            _literals: &[ConstValue],
        ) -> Option<&dyn DirectiveDef> {
            (directive_type == "Logger").then_some(&self.def as &dyn DirectiveDef)
        }
    }

    /// Spec §9 open question: both the `=` and `from` directive forms
    /// parse to the same statement shape.
    #[test]
    fn directive_statement_accepts_both_assign_and_from_forms() {
        let library = WithDirective { def: NoopDirectiveDef };
        let assign_form = parse_and_optimize("directive log = Logger;", &library).unwrap();
        let from_form = parse_and_optimize("directive log from Logger;", &library).unwrap();
        for block in [assign_form, from_form] {
            assert_eq!(block.statements.len(), 1);
            match &block.statements[0] {
                Stmt::Directive { name, directive_type, .. } => {
                    assert_eq!(name, "log");
                    assert_eq!(directive_type, "Logger");
                }
                other => panic!("unexpected statement: {:?}", other),
            }
        }
    }

    #[test]
    fn unrecognized_directive_type_is_a_parse_error() {
        let err = parse_and_optimize("directive log = Unknown;", &NoopLibrary).unwrap_err();
        assert!(err.message.contains("not recognized"));
    }
}
