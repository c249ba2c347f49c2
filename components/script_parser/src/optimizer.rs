//! Structural optimizer: constant folding, dead-branch elimination on
//! constant `if` conditions, and nested-block flattening. Runs after
//! parsing and before bytecode compilation; never changes the node *kinds*
//! the compiler has to handle, only collapses ones whose value is already
//! known (spec §4.6).

use bytecode_system::ConstValue;
use value_ops::{BinaryOp, UnaryOp};

use crate::ast::{Block, Expr, ObjectEntry, Stmt};

/// Numeric/boolean-only constant folding for bare literals. `binary_op`/
/// `unary_op` in `value_ops` operate on heap-backed `Value`s (string
/// concatenation needs an allocator), so this stays deliberately narrower:
/// it folds exactly the operator/operand combinations that need no heap at
/// all, and leaves everything else for the VM to evaluate at runtime.
fn fold_binary(op: BinaryOp, lhs: &ConstValue, rhs: &ConstValue) -> Option<ConstValue> {
    use ConstValue::{Boolean, Float, Integer};

    fn as_f64(v: &ConstValue) -> Option<f64> {
        match v {
            Integer(n) => Some(*n as f64),
            Float(f) => Some(*f),
            _ => None,
        }
    }

    if let (Integer(a), Integer(b)) = (lhs, rhs) {
        match op {
            BinaryOp::Add => return a.checked_add(*b).map(Integer),
            BinaryOp::Sub => return a.checked_sub(*b).map(Integer),
            BinaryOp::Mul => return a.checked_mul(*b).map(Integer),
            BinaryOp::Div if *b != 0 => return a.checked_div(*b).map(Integer),
            BinaryOp::Mod if *b != 0 => return Some(Integer(a % b)),
            BinaryOp::Lt => return Some(Boolean(a < b)),
            BinaryOp::Le => return Some(Boolean(a <= b)),
            BinaryOp::Gt => return Some(Boolean(a > b)),
            BinaryOp::Ge => return Some(Boolean(a >= b)),
            BinaryOp::Eq | BinaryOp::StrictEq => return Some(Boolean(a == b)),
            BinaryOp::Ne | BinaryOp::StrictNe => return Some(Boolean(a != b)),
            _ => {}
        }
    }

    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            let (a, b) = (as_f64(lhs)?, as_f64(rhs)?);
            match op {
                BinaryOp::Add => Some(Float(a + b)),
                BinaryOp::Sub => Some(Float(a - b)),
                BinaryOp::Mul => Some(Float(a * b)),
                BinaryOp::Div if b != 0.0 => Some(Float(a / b)),
                _ => None,
            }
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let (a, b) = (as_f64(lhs)?, as_f64(rhs)?);
            match op {
                BinaryOp::Lt => Some(Boolean(a < b)),
                BinaryOp::Le => Some(Boolean(a <= b)),
                BinaryOp::Gt => Some(Boolean(a > b)),
                BinaryOp::Ge => Some(Boolean(a >= b)),
                _ => None,
            }
        }
        BinaryOp::Eq | BinaryOp::StrictEq | BinaryOp::Ne | BinaryOp::StrictNe => match (lhs, rhs) {
            (Boolean(a), Boolean(b)) => {
                let eq = a == b;
                Some(Boolean(if matches!(op, BinaryOp::Eq | BinaryOp::StrictEq) { eq } else { !eq }))
            }
            (ConstValue::Str(a), ConstValue::Str(b)) => {
                let eq = a == b;
                Some(Boolean(if matches!(op, BinaryOp::Eq | BinaryOp::StrictEq) { eq } else { !eq }))
            }
            (ConstValue::Null, ConstValue::Null) => {
                Some(Boolean(matches!(op, BinaryOp::Eq | BinaryOp::StrictEq)))
            }
            _ => {
                let (a, b) = (as_f64(lhs)?, as_f64(rhs)?);
                let eq = a == b;
                Some(Boolean(if matches!(op, BinaryOp::Eq | BinaryOp::StrictEq) { eq } else { !eq }))
            }
        },
        _ => None,
    }
}

fn fold_unary(op: UnaryOp, operand: &ConstValue) -> Option<ConstValue> {
    match (op, operand) {
        (UnaryOp::Plus, ConstValue::Integer(n)) => Some(ConstValue::Integer(*n)),
        (UnaryOp::Plus, ConstValue::Float(f)) => Some(ConstValue::Float(*f)),
        (UnaryOp::Negate, ConstValue::Integer(n)) => n.checked_neg().map(ConstValue::Integer),
        (UnaryOp::Negate, ConstValue::Float(f)) => Some(ConstValue::Float(-f)),
        (UnaryOp::LogicalNot, ConstValue::Boolean(b)) => Some(ConstValue::Boolean(!b)),
        _ => None,
    }
}

/// Optimize a parsed block in place. Idempotent: running it twice produces
/// the same result as running it once.
pub fn optimize_block(block: Block) -> Block {
    Block {
        statements: block.statements.into_iter().flat_map(optimize_stmt).collect(),
    }
}

/// A statement may fold away entirely (an `if (false) {...}` with no else)
/// or flatten into zero/one/many statements (a nested block), so this
/// returns a small sequence rather than a single replacement.
fn optimize_stmt(stmt: Stmt) -> Vec<Stmt> {
    match stmt {
        Stmt::VariableDeclare { name, init, position } => {
            vec![Stmt::VariableDeclare { name, init: init.map(optimize_expr), position }]
        }
        Stmt::ExpressionStatement(expr) => vec![Stmt::ExpressionStatement(optimize_expr(expr))],
        Stmt::Block(inner) => {
            let inner = optimize_block(inner);
            // A nested block with no `let` shadowing concerns at this
            // level just flattens into its parent; variable scoping is
            // resolved by name in the compiler, not by block nesting, so
            // this is safe (spec §4.6).
            inner.statements
        }
        Stmt::If { condition, then_branch, else_branch, position } => {
            let condition = optimize_expr(condition);
            let then_branch = flatten_one(optimize_stmt(*then_branch));
            let else_branch = else_branch.map(|b| flatten_one(optimize_stmt(*b)));
            match constant_bool(&condition) {
                Some(true) => vec![then_branch],
                Some(false) => match else_branch {
                    Some(branch) => vec![branch],
                    None => vec![],
                },
                None => vec![Stmt::If {
                    condition,
                    then_branch: Box::new(then_branch),
                    else_branch: else_branch.map(Box::new),
                    position,
                }],
            }
        }
        Stmt::Foreach { key_name, value_name, iterable, body, position } => {
            vec![Stmt::Foreach {
                key_name,
                value_name,
                iterable: optimize_expr(iterable),
                body: Box::new(flatten_one(optimize_stmt(*body))),
                position,
            }]
        }
        Stmt::Break(p) => vec![Stmt::Break(p)],
        Stmt::Continue(p) => vec![Stmt::Continue(p)],
        Stmt::Return(expr, p) => vec![Stmt::Return(expr.map(optimize_expr), p)],
        Stmt::Throw(expr, p) => vec![Stmt::Throw(optimize_expr(expr), p)],
        Stmt::TryCatch { try_block, catch_name, catch_block, position } => {
            vec![Stmt::TryCatch {
                try_block: optimize_block(try_block),
                catch_name,
                catch_block: optimize_block(catch_block),
                position,
            }]
        }
        Stmt::Directive { .. } => vec![stmt],
    }
}

/// `optimize_stmt` returns a `Vec`; a statement slot that expects a single
/// child (an `if`'s branch, a `for`'s body) re-wraps a multi-statement
/// result as a block and passes a lone result through unchanged.
fn flatten_one(mut stmts: Vec<Stmt>) -> Stmt {
    if stmts.len() == 1 {
        stmts.pop().unwrap()
    } else {
        Stmt::Block(Block { statements: stmts })
    }
}

fn constant_bool(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Literal(ConstValue::Boolean(b), _) => Some(*b),
        _ => None,
    }
}

fn optimize_expr(expr: Expr) -> Expr {
    match expr {
        Expr::BinaryOperator { op, lhs, rhs, position } => {
            let lhs = optimize_expr(*lhs);
            let rhs = optimize_expr(*rhs);
            if let (Some(l), Some(r)) = (as_const(&lhs), as_const(&rhs)) {
                if let Some(folded) = fold_binary(op, &l, &r) {
                    return Expr::Literal(folded, position);
                }
            }
            Expr::BinaryOperator { op, lhs: Box::new(lhs), rhs: Box::new(rhs), position }
        }
        Expr::UnaryOperator { op, operand, position } => {
            let operand = optimize_expr(*operand);
            if let Some(v) = as_const(&operand) {
                if let Some(folded) = fold_unary(op, &v) {
                    return Expr::Literal(folded, position);
                }
            }
            Expr::UnaryOperator { op, operand: Box::new(operand), position }
        }
        Expr::LogicRelationalExpression { is_and, lhs, rhs, position } => {
            let lhs = optimize_expr(*lhs);
            let rhs = optimize_expr(*rhs);
            // Only fold when the left side alone decides the outcome
            // without evaluating the right side, since `rhs` may have
            // side effects (a call) that must still run otherwise.
            match (is_and, constant_bool(&lhs)) {
                (true, Some(false)) => Expr::Literal(ConstValue::Boolean(false), position),
                (false, Some(true)) => Expr::Literal(ConstValue::Boolean(true), position),
                _ => Expr::LogicRelationalExpression {
                    is_and,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    position,
                },
            }
        }
        Expr::Ternary { condition, then_expr, else_expr, position } => {
            let condition = optimize_expr(*condition);
            let then_expr = optimize_expr(*then_expr);
            let else_expr = optimize_expr(*else_expr);
            match constant_bool(&condition) {
                Some(true) => then_expr,
                Some(false) => else_expr,
                None => Expr::Ternary {
                    condition: Box::new(condition),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                    position,
                },
            }
        }
        Expr::Assign { target, value, position } => Expr::Assign {
            target: Box::new(optimize_expr(*target)),
            value: Box::new(optimize_expr(*value)),
            position,
        },
        Expr::PropertyReference { base, prop, is_lvalue, position } => Expr::PropertyReference {
            base: Box::new(optimize_expr(*base)),
            prop,
            is_lvalue,
            position,
        },
        Expr::Indexer { base, index, is_lvalue, position } => Expr::Indexer {
            base: Box::new(optimize_expr(*base)),
            index: Box::new(optimize_expr(*index)),
            is_lvalue,
            position,
        },
        Expr::FunctionCall { callee, args, position } => Expr::FunctionCall {
            callee,
            args: args.into_iter().map(optimize_expr).collect(),
            position,
        },
        Expr::InlineList { elements, position } => Expr::InlineList {
            elements: elements.into_iter().map(optimize_expr).collect(),
            position,
        },
        Expr::InlineObject { entries, position } => Expr::InlineObject {
            entries: entries
                .into_iter()
                .map(|e| match e {
                    ObjectEntry::Pair(k, v) => ObjectEntry::Pair(k, optimize_expr(v)),
                    ObjectEntry::Spread(inner) => ObjectEntry::Spread(optimize_expr(inner)),
                })
                .collect(),
            position,
        },
        Expr::ExpandArrArg { inner, position } => {
            Expr::ExpandArrArg { inner: Box::new(optimize_expr(*inner)), position }
        }
        Expr::Literal(..) | Expr::ConstantVal { .. } | Expr::VariableReference { .. } => expr,
    }
}

fn as_const(expr: &Expr) -> Option<ConstValue> {
    match expr {
        Expr::Literal(v, _) => Some(v.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::SourcePosition;

    fn lit_int(n: i64) -> Expr {
        Expr::Literal(ConstValue::Integer(n), SourcePosition::UNKNOWN)
    }

    #[test]
    fn folds_constant_arithmetic() {
        let expr = Expr::BinaryOperator {
            op: BinaryOp::Add,
            lhs: Box::new(lit_int(1)),
            rhs: Box::new(Expr::BinaryOperator {
                op: BinaryOp::Mul,
                lhs: Box::new(lit_int(2)),
                rhs: Box::new(lit_int(3)),
                position: SourcePosition::UNKNOWN,
            }),
            position: SourcePosition::UNKNOWN,
        };
        assert_eq!(optimize_expr(expr), Expr::Literal(ConstValue::Integer(7), SourcePosition::UNKNOWN));
    }

    #[test]
    fn drops_the_untaken_branch_of_a_constant_if() {
        let block = Block {
            statements: vec![Stmt::If {
                condition: Expr::Literal(ConstValue::Boolean(false), SourcePosition::UNKNOWN),
                then_branch: Box::new(Stmt::Break(SourcePosition::UNKNOWN)),
                else_branch: Some(Box::new(Stmt::Continue(SourcePosition::UNKNOWN))),
                position: SourcePosition::UNKNOWN,
            }],
        };
        let optimized = optimize_block(block);
        assert_eq!(optimized.statements, vec![Stmt::Continue(SourcePosition::UNKNOWN)]);
    }

    #[test]
    fn flattens_nested_blocks() {
        let block = Block {
            statements: vec![Stmt::Block(Block {
                statements: vec![Stmt::Break(SourcePosition::UNKNOWN), Stmt::Continue(SourcePosition::UNKNOWN)],
            })],
        };
        let optimized = optimize_block(block);
        assert_eq!(
            optimized.statements,
            vec![Stmt::Break(SourcePosition::UNKNOWN), Stmt::Continue(SourcePosition::UNKNOWN)]
        );
    }

    #[test]
    fn never_folds_away_the_right_side_of_logical_and_or() {
        // `false && call()` must still be reducible to `false`, but
        // `call() && false` must not drop the call.
        let rhs_call = Expr::FunctionCall {
            callee: crate::ast::Callee::Function { name: "f".to_string(), is_async: false },
            args: vec![],
            position: SourcePosition::UNKNOWN,
        };
        let expr = Expr::LogicRelationalExpression {
            is_and: true,
            lhs: Box::new(Expr::Literal(ConstValue::Boolean(false), SourcePosition::UNKNOWN)),
            rhs: Box::new(rhs_call.clone()),
            position: SourcePosition::UNKNOWN,
        };
        assert_eq!(optimize_expr(expr), Expr::Literal(ConstValue::Boolean(false), SourcePosition::UNKNOWN));

        let expr2 = Expr::LogicRelationalExpression {
            is_and: true,
            lhs: Box::new(rhs_call.clone()),
            rhs: Box::new(Expr::Literal(ConstValue::Boolean(false), SourcePosition::UNKNOWN)),
            position: SourcePosition::UNKNOWN,
        };
        assert_eq!(
            optimize_expr(expr2),
            Expr::LogicRelationalExpression {
                is_and: true,
                lhs: Box::new(rhs_call),
                rhs: Box::new(Expr::Literal(ConstValue::Boolean(false), SourcePosition::UNKNOWN)),
                position: SourcePosition::UNKNOWN,
            }
        );
    }
}
