//! The `Library` contract itself (spec §6), consumed by both the parser
//! (name resolution at parse time) and the interpreter (dispatch at run
//! time).

use bytecode_system::ConstValue;

use crate::function::{AsyncConstant, AsyncFunction, Constant, DirectiveDef, Function};

/// The capability surface a host embeds. A bare identifier call resolves
/// through `find_func`/`find_async_func`; `$ns.key` resolves through
/// `find_constant`/`find_async_constant`; a `directive NAME = TYPE
/// [literals…];` statement resolves its definition through
/// `find_directive_def` once, at the point the directive is declared.
pub trait Library {
    fn find_func(&self, name: &str) -> Option<&dyn Function>;
    fn find_async_func(&self, name: &str) -> Option<&dyn AsyncFunction>;

    fn find_constant(&self, ns: &str, key: &str) -> Option<&dyn Constant>;
    fn find_async_constant(&self, ns: &str, key: &str) -> Option<&dyn AsyncConstant>;

    /// Resolve a directive's own function table from its `TYPE`, declared
    /// `NAME`, and parsed literal arguments. Returns `None` if `type` is
    /// unknown to this library, which is a parse error at the call site.
    fn find_directive_def(
        &self,
        directive_type: &str,
        name: &str,
        literals: &[ConstValue],
    ) -> Option<&dyn DirectiveDef>;

    /// Pure notification the parser sends when it sees `$.prop` — the
    /// distinguished root namespace's property access is left as a plain
    /// property reference at runtime (spec §4.5), but the host may want to
    /// warm a cache knowing which root properties a script touches.
    /// Default is a no-op; hosts that don't care need not override it.
    fn mark_root_prop(&self, _prop_name: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use core_types::Value;

    struct Identity;
    impl Function for Identity {
        fn call(&self, ctx: &mut dyn ExecutionContext) -> Result<Value, Value> {
            Ok(ctx.arg_value(0).clone())
        }
    }

    struct TestLibrary {
        identity: Identity,
    }

    impl Library for TestLibrary {
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
    fn unknown_names_resolve_to_none() {
        let lib = TestLibrary { identity: Identity };
        assert!(lib.find_func("identity").is_some());
        assert!(lib.find_func("nope").is_none());
        assert!(lib.find_async_func("identity").is_none());
    }

    #[test]
    fn mark_root_prop_default_is_a_harmless_no_op() {
        let lib = TestLibrary { identity: Identity };
        lib.mark_root_prop("whatever");
    }
}
