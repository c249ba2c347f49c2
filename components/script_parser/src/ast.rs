//! The AST node set (spec §4.5). Parsing always produces a `Block` at the
//! root; the optimiser and compiler both walk this same shape.

use bytecode_system::ConstValue;
use core_types::SourcePosition;
use value_ops::{BinaryOp, UnaryOp};

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VariableDeclare {
        name: String,
        init: Option<Expr>,
        position: SourcePosition,
    },
    ExpressionStatement(Expr),
    Block(Block),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        position: SourcePosition,
    },
    Foreach {
        key_name: String,
        value_name: String,
        iterable: Expr,
        body: Box<Stmt>,
        position: SourcePosition,
    },
    Break(SourcePosition),
    Continue(SourcePosition),
    Return(Option<Expr>, SourcePosition),
    Throw(Expr, SourcePosition),
    TryCatch {
        try_block: Block,
        catch_name: String,
        catch_block: Block,
        position: SourcePosition,
    },
    /// `directive NAME = TYPE [literals…];` or the equivalent `directive
    /// NAME from TYPE [literals…];` form (spec §9 open question: both are
    /// accepted). By the time this node exists the parser has already
    /// confirmed the library recognizes `TYPE` with these literals (spec
    /// §4.5).
    Directive {
        name: String,
        directive_type: String,
        literals: Vec<ConstValue>,
        position: SourcePosition,
    },
}

/// What a call's callee resolved to during parsing (spec §4.5's
/// resolution-during-parsing rules). Only the *name* survives into the
/// compiled program — the library is consulted again at dispatch time —
/// so this carries no borrowed library reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Function { name: String, is_async: bool },
    Directive {
        directive_type: String,
        directive_name: String,
        method: String,
        literals: Vec<ConstValue>,
        is_async: bool,
    },
}

/// One entry of an inline object literal: a plain `key: value` pair or a
/// `...expr` spread (spec §4.5: "ExpandArrArg (spread in call/array/object)").
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEntry {
    Pair(String, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(ConstValue, SourcePosition),
    /// A resolved `$ns.key` library constant.
    ConstantVal {
        ns: String,
        key: String,
        is_async: bool,
        position: SourcePosition,
    },
    /// A bare name that is neither a call nor a constant reference: a
    /// local variable read, usable as an l-value.
    VariableReference {
        name: String,
        is_lvalue: bool,
        position: SourcePosition,
    },
    PropertyReference {
        base: Box<Expr>,
        prop: String,
        is_lvalue: bool,
        position: SourcePosition,
    },
    Indexer {
        base: Box<Expr>,
        index: Box<Expr>,
        is_lvalue: bool,
        position: SourcePosition,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
        position: SourcePosition,
    },
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        position: SourcePosition,
    },
    BinaryOperator {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        position: SourcePosition,
    },
    UnaryOperator {
        op: UnaryOp,
        operand: Box<Expr>,
        position: SourcePosition,
    },
    /// `&&`/`||`: short-circuiting, lowered to jumps rather than an
    /// operator opcode (spec §4.6).
    LogicRelationalExpression {
        is_and: bool,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        position: SourcePosition,
    },
    FunctionCall {
        callee: Callee,
        args: Vec<Expr>,
        position: SourcePosition,
    },
    InlineList {
        elements: Vec<Expr>,
        position: SourcePosition,
    },
    /// Duplicate string keys are rejected at parse time, not compile
    /// time, so this never carries one.
    InlineObject {
        entries: Vec<ObjectEntry>,
        position: SourcePosition,
    },
    /// `...expr`, valid inside a call's argument list or an inline
    /// list/object literal.
    ExpandArrArg {
        inner: Box<Expr>,
        position: SourcePosition,
    },
}

impl Expr {
    pub fn position(&self) -> SourcePosition {
        match self {
            Expr::Literal(_, p)
            | Expr::ConstantVal { position: p, .. }
            | Expr::VariableReference { position: p, .. }
            | Expr::PropertyReference { position: p, .. }
            | Expr::Indexer { position: p, .. }
            | Expr::Assign { position: p, .. }
            | Expr::Ternary { position: p, .. }
            | Expr::BinaryOperator { position: p, .. }
            | Expr::UnaryOperator { position: p, .. }
            | Expr::LogicRelationalExpression { position: p, .. }
            | Expr::FunctionCall { position: p, .. }
            | Expr::InlineList { position: p, .. }
            | Expr::InlineObject { position: p, .. }
            | Expr::ExpandArrArg { position: p, .. } => *p,
        }
    }

    /// Whether this node is one of the three l-value-capable shapes
    /// (spec §4.5: "Assignment accepts only variable, property, or
    /// indexer on the left-hand side").
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Expr::VariableReference { .. } | Expr::PropertyReference { .. } | Expr::Indexer { .. }
        )
    }
}
