use std::collections::HashMap;

use bytecode_system::{Compiled, ConstValue as BcConst, DirectiveSite, ExceptionEntry, OpCode};
use core_types::{ParseError, SourcePosition};
use value_ops::{BinaryOp, UnaryOp};

use script_parser::{Block, Callee, Expr, ObjectEntry, Stmt};

/// Lower an optimised AST block into a ready-to-run `Compiled` program.
pub fn compile(block: &Block) -> Result<Compiled, ParseError> {
    let mut gen = Generator::new();
    gen.enter_scope();
    gen.compile_block_body(block)?;
    gen.materialize_trailing_return();
    gen.exit_scope();
    gen.program.stack_size = gen.max_depth;
    gen.program.var_table_size = gen.next_var as usize;
    Ok(gen.program)
}

struct LoopCtx {
    start: u32,
    break_patches: Vec<usize>,
}

struct Generator {
    program: Compiled,
    scopes: Vec<HashMap<String, u32>>,
    next_var: u32,
    tmp_var: Option<u32>,
    loop_stack: Vec<LoopCtx>,
    depth: i64,
    max_depth: usize,
}

impl Generator {
    fn new() -> Self {
        Generator {
            program: Compiled::new(),
            scopes: Vec::new(),
            next_var: 0,
            tmp_var: None,
            loop_stack: Vec::new(),
            depth: 0,
            max_depth: 0,
        }
    }

    // ---- scope / stack bookkeeping ---------------------------------------

    fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str) -> u32 {
        let idx = self.next_var;
        self.next_var += 1;
        self.scopes.last_mut().expect("a scope is always active").insert(name.to_string(), idx);
        idx
    }

    /// Spec §4.6: "lookup walks scopes outward and auto-declares at the
    /// innermost scope if unseen".
    fn resolve_or_declare(&mut self, name: &str) -> u32 {
        for scope in self.scopes.iter().rev() {
            if let Some(&idx) = scope.get(name) {
                return idx;
            }
        }
        self.declare(name)
    }

    fn tmp_slot(&mut self) -> u32 {
        if let Some(idx) = self.tmp_var {
            return idx;
        }
        let idx = self.next_var;
        self.next_var += 1;
        self.tmp_var = Some(idx);
        idx
    }

    fn push(&mut self) {
        self.depth += 1;
        if self.depth as usize > self.max_depth {
            self.max_depth = self.depth as usize;
        }
    }

    fn pop(&mut self) {
        self.depth -= 1;
        debug_assert!(self.depth >= 0, "compiler emitted an unbalanced opcode sequence");
    }

    fn emit(&mut self, op: OpCode, position: SourcePosition) -> usize {
        self.program.codes.push(op);
        self.program.positions.push(position);
        self.program.codes.len() - 1
    }

    fn patch_jump(&mut self, idx: usize, target: u32) {
        match &mut self.program.codes[idx] {
            OpCode::Jump(t) | OpCode::JumpIfFalse(t) | OpCode::JumpIfTrue(t) => *t = target,
            other => unreachable!("patch_jump called on a non-jump opcode: {:?}", other),
        }
    }

    fn here(&self) -> u32 {
        self.program.codes.len() as u32
    }

    fn err(&self, message: impl Into<String>, position: SourcePosition) -> ParseError {
        ParseError::new(message, position.0.max(0) as usize)
    }

    fn materialize_trailing_return(&mut self) {
        if !matches!(self.program.codes.last(), Some(OpCode::EndReturn)) {
            let position = self.program.positions.last().copied().unwrap_or_default();
            let idx = self.program.add_const(BcConst::Undefined);
            self.emit(OpCode::LoadConst(idx), position);
            self.push();
            self.emit(OpCode::EndReturn, position);
            self.pop();
        }
    }

    // ---- statements --------------------------------------------------------

    fn compile_block_body(&mut self, block: &Block) -> Result<(), ParseError> {
        for stmt in &block.statements {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), ParseError> {
        self.enter_scope();
        self.compile_block_body(block)?;
        self.exit_scope();
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), ParseError> {
        match stmt {
            Stmt::VariableDeclare { name, init, position } => {
                let var = self.declare(name);
                if let Some(init) = init {
                    self.compile_expr(init)?;
                    self.emit(OpCode::StoreVar(var), *position);
                    self.pop();
                }
                Ok(())
            }
            Stmt::ExpressionStatement(expr) => {
                self.compile_expr(expr)?;
                self.emit(OpCode::Pop, expr.position());
                self.pop();
                Ok(())
            }
            Stmt::Block(block) => self.compile_block(block),
            Stmt::If { condition, then_branch, else_branch, position } => {
                self.compile_expr(condition)?;
                let jf = self.emit(OpCode::JumpIfFalse(0), *position);
                self.pop();
                self.compile_stmt(then_branch)?;
                match else_branch {
                    Some(else_stmt) => {
                        let jend = self.emit(OpCode::Jump(0), *position);
                        let else_start = self.here();
                        self.patch_jump(jf, else_start);
                        self.compile_stmt(else_stmt)?;
                        let end = self.here();
                        self.patch_jump(jend, end);
                    }
                    None => {
                        let end = self.here();
                        self.patch_jump(jf, end);
                    }
                }
                Ok(())
            }
            Stmt::Foreach { key_name, value_name, iterable, body, position } => {
                self.compile_expr(iterable)?;
                let iter_var = self.tmp_slot_for_iterator();
                self.emit(OpCode::IterateInto(iter_var), *position);
                self.pop();

                let loop_start = self.here();
                self.emit(OpCode::IterateNext(iter_var), *position);
                self.push();
                let guard = self.emit(OpCode::JumpIfFalse(0), *position);
                self.pop();

                self.enter_scope();
                let key_var = self.declare(key_name);
                let value_var = self.declare(value_name);
                self.emit(OpCode::IterateKey { key_var, iter_var }, *position);
                self.emit(OpCode::IterateValue { val_var: value_var, iter_var }, *position);

                self.loop_stack.push(LoopCtx { start: loop_start, break_patches: Vec::new() });
                self.compile_stmt(body)?;
                let ctx = self.loop_stack.pop().expect("pushed above");

                self.emit(OpCode::Jump(loop_start), *position);
                let loop_end = self.here();
                self.patch_jump(guard, loop_end);
                for bp in ctx.break_patches {
                    self.patch_jump(bp, loop_end);
                }
                self.exit_scope();
                Ok(())
            }
            Stmt::Break(position) => {
                let start = self
                    .loop_stack
                    .last()
                    .map(|c| c.start)
                    .ok_or_else(|| self.err("'break' outside of a loop", *position))?;
                let _ = start;
                let idx = self.emit(OpCode::Jump(0), *position);
                self.loop_stack.last_mut().unwrap().break_patches.push(idx);
                Ok(())
            }
            Stmt::Continue(position) => {
                let start = self
                    .loop_stack
                    .last()
                    .map(|c| c.start)
                    .ok_or_else(|| self.err("'continue' outside of a loop", *position))?;
                self.emit(OpCode::Jump(start), *position);
                Ok(())
            }
            Stmt::Return(expr, position) => {
                match expr {
                    Some(e) => self.compile_expr(e)?,
                    None => {
                        let idx = self.program.add_const(BcConst::Undefined);
                        self.emit(OpCode::LoadConst(idx), *position);
                        self.push();
                    }
                }
                self.emit(OpCode::EndReturn, *position);
                self.pop();
                Ok(())
            }
            Stmt::Throw(expr, position) => {
                self.compile_expr(expr)?;
                self.emit(OpCode::ThrowExp, *position);
                self.pop();
                Ok(())
            }
            Stmt::TryCatch { try_block, catch_name, catch_block, position } => {
                let try_begin = self.here();
                self.compile_block(try_block)?;
                let jover = self.emit(OpCode::Jump(0), *position);
                let catch_begin = self.here();

                self.enter_scope();
                let e_var = self.declare(catch_name);
                // The VM pushes the exception value itself before jumping
                // here; account for that push/pop pair without touching
                // our running net depth (spec §4.7).
                self.push();
                self.emit(OpCode::IntoCatch(e_var), *position);
                self.pop();
                self.compile_block_body(catch_block)?;
                self.exit_scope();

                let catch_end = self.here();
                self.patch_jump(jover, catch_end);
                self.program.exception_table.push(ExceptionEntry { try_begin, catch_begin, catch_end });
                Ok(())
            }
            Stmt::Directive { .. } => Ok(()),
        }
    }

    fn tmp_slot_for_iterator(&mut self) -> u32 {
        let idx = self.next_var;
        self.next_var += 1;
        idx
    }

    // ---- expressions --------------------------------------------------------

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), ParseError> {
        match expr {
            Expr::Literal(value, position) => {
                let idx = self.program.add_const(to_bc_const(value));
                self.emit(OpCode::LoadConst(idx), *position);
                self.push();
            }
            Expr::ConstantVal { ns, key, is_async, position } => {
                let idx = self.program.intern_string(&format!("{}.{}", ns, key));
                if *is_async {
                    self.program.contains_async = true;
                    self.emit(OpCode::CallAsyncConst(idx), *position);
                } else {
                    self.emit(OpCode::CallConst(idx), *position);
                }
                self.push();
            }
            Expr::VariableReference { name, position, .. } => {
                if name == "$" {
                    self.emit(OpCode::LoadRoot, *position);
                } else {
                    let var = self.resolve_or_declare(name);
                    self.emit(OpCode::LoadVar(var), *position);
                }
                self.push();
            }
            Expr::PropertyReference { base, prop, position, .. } => {
                self.compile_expr(base)?;
                let idx = self.program.intern_string(prop);
                self.emit(OpCode::PropGet(idx), *position);
            }
            Expr::Indexer { base, index, position, .. } => {
                self.compile_expr(base)?;
                self.compile_expr(index)?;
                self.emit(OpCode::IdxGet, *position);
                self.pop();
            }
            Expr::Assign { target, value, position } => {
                self.compile_assign(target, value, *position)?;
            }
            Expr::Ternary { condition, then_expr, else_expr, position } => {
                self.compile_expr(condition)?;
                let jf = self.emit(OpCode::JumpIfFalse(0), *position);
                self.pop();
                self.compile_expr(then_expr)?;
                let jend = self.emit(OpCode::Jump(0), *position);
                self.pop(); // the `then` arm's push is undone on this path by the `else` arm's own push
                let else_start = self.here();
                self.patch_jump(jf, else_start);
                self.compile_expr(else_expr)?;
                let end = self.here();
                self.patch_jump(jend, end);
            }
            Expr::BinaryOperator { op, lhs, rhs, position } => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.emit(binary_opcode(*op), *position);
                self.pop();
            }
            Expr::UnaryOperator { op, operand, position } => {
                self.compile_expr(operand)?;
                self.emit(unary_opcode(*op), *position);
            }
            Expr::LogicRelationalExpression { is_and, lhs, rhs, position } => {
                self.compile_expr(lhs)?;
                self.emit(OpCode::Dump, *position);
                self.push();
                let guard = if *is_and {
                    self.emit(OpCode::JumpIfFalse(0), *position)
                } else {
                    self.emit(OpCode::JumpIfTrue(0), *position)
                };
                self.pop();
                self.emit(OpCode::Pop, *position);
                self.pop();
                self.compile_expr(rhs)?;
                let end = self.here();
                self.patch_jump(guard, end);
            }
            Expr::FunctionCall { callee, args, position } => {
                self.compile_call(callee, args, *position)?;
            }
            Expr::InlineList { elements, position } => {
                let idx = self.emit(OpCode::NewArray(0), *position);
                let _ = idx;
                self.push();
                for element in elements {
                    match element {
                        Expr::ExpandArrArg { inner, position } => {
                            self.compile_expr(inner)?;
                            self.emit(OpCode::ExpArray, *position);
                            self.pop();
                        }
                        _ => {
                            self.compile_expr(element)?;
                            self.emit(OpCode::PushArray, element.position());
                            self.pop();
                        }
                    }
                }
            }
            Expr::InlineObject { entries, position } => {
                self.emit(OpCode::NewObject(0), *position);
                self.push();
                for entry in entries {
                    match entry {
                        ObjectEntry::Pair(key, value) => {
                            self.compile_expr(value)?;
                            let key_idx = self.program.intern_string(key);
                            self.emit(OpCode::PropSet1(key_idx), value.position());
                            self.pop();
                        }
                        ObjectEntry::Spread(inner) => {
                            self.compile_expr(inner)?;
                            self.emit(OpCode::ExpObject, inner.position());
                            self.pop();
                        }
                    }
                }
            }
            Expr::ExpandArrArg { inner, position } => {
                // Only meaningful inside a call/list/object; reaching this
                // arm means the optimiser handed back a bare spread (never
                // produced by the parser outside those positions), so just
                // compile the inner value through.
                self.compile_expr(inner)?;
                let _ = position;
            }
        }
        Ok(())
    }

    fn compile_assign(&mut self, target: &Expr, value: &Expr, position: SourcePosition) -> Result<(), ParseError> {
        match target {
            Expr::VariableReference { name, .. } => {
                let var = self.resolve_or_declare(name);
                self.compile_expr(value)?;
                self.emit(OpCode::Dump, position);
                self.push();
                self.emit(OpCode::StoreVar(var), position);
                self.pop();
            }
            Expr::PropertyReference { base, prop, .. } => {
                let tmp = self.tmp_slot();
                self.compile_expr(base)?;
                self.compile_expr(value)?;
                self.emit(OpCode::StoreVar(tmp), position);
                self.pop();
                self.emit(OpCode::LoadVar(tmp), position);
                self.push();
                let idx = self.program.intern_string(prop);
                self.emit(OpCode::PropSet(idx), position);
                self.pop();
                self.pop();
                self.emit(OpCode::LoadVar(tmp), position);
                self.push();
            }
            Expr::Indexer { base, index, .. } => {
                let tmp = self.tmp_slot();
                self.compile_expr(base)?;
                self.compile_expr(index)?;
                self.compile_expr(value)?;
                self.emit(OpCode::StoreVar(tmp), position);
                self.pop();
                self.emit(OpCode::LoadVar(tmp), position);
                self.push();
                self.emit(OpCode::IdxSet, position);
                self.pop();
                self.pop();
                self.pop();
                self.emit(OpCode::LoadVar(tmp), position);
                self.push();
            }
            other => {
                return Err(self.err(
                    format!("expression {:?} is not assignable", other),
                    position,
                ));
            }
        }
        Ok(())
    }

    fn compile_call(&mut self, callee: &Callee, args: &[Expr], position: SourcePosition) -> Result<(), ParseError> {
        let has_spread = args.iter().any(|a| matches!(a, Expr::ExpandArrArg { .. }));
        let (fn_idx, is_async) = match callee {
            Callee::Function { name, is_async } => (self.program.intern_string(name), *is_async),
            Callee::Directive { directive_type, directive_name, method, literals, is_async } => {
                let idx = self.program.intern_string(&format!("{}.{}", directive_name, method));
                self.program.add_directive_site(
                    idx,
                    DirectiveSite {
                        directive_type: directive_type.clone(),
                        directive_name: directive_name.clone(),
                        method: method.clone(),
                        literals: literals.iter().map(to_bc_const).collect(),
                    },
                );
                (idx, *is_async)
            }
        };

        if has_spread {
            self.emit(OpCode::NewArray(0), position);
            self.push();
            for arg in args {
                match arg {
                    Expr::ExpandArrArg { inner, position } => {
                        self.compile_expr(inner)?;
                        self.emit(OpCode::ExpArray, *position);
                        self.pop();
                    }
                    _ => {
                        self.compile_expr(arg)?;
                        self.emit(OpCode::PushArray, arg.position());
                        self.pop();
                    }
                }
            }
            if is_async {
                self.program.contains_async = true;
                self.emit(OpCode::CallAsyncFuncSpread { fn_idx }, position);
            } else {
                self.emit(OpCode::CallFuncSpread { fn_idx }, position);
            }
            // net 0: the array built above is replaced one-for-one by the result.
        } else {
            for arg in args {
                self.compile_expr(arg)?;
            }
            let argc = args.len() as u16;
            if is_async {
                self.program.contains_async = true;
                self.emit(OpCode::CallAsyncFunc { argc, fn_idx }, position);
            } else {
                self.emit(OpCode::CallFunc { argc, fn_idx }, position);
            }
            for _ in 0..args.len() {
                self.pop();
            }
            self.push();
        }
        Ok(())
    }
}

fn to_bc_const(value: &BcConst) -> BcConst {
    value.clone()
}

fn binary_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::BopPlus,
        BinaryOp::Sub => OpCode::BopMinus,
        BinaryOp::Mul => OpCode::BopMultiply,
        BinaryOp::Div => OpCode::BopDivide,
        BinaryOp::Mod => OpCode::BopMod,
        BinaryOp::Match => OpCode::BopMatch,
        BinaryOp::Lt => OpCode::BopLt,
        BinaryOp::Le => OpCode::BopLte,
        BinaryOp::Gt => OpCode::BopGt,
        BinaryOp::Ge => OpCode::BopGte,
        BinaryOp::Eq => OpCode::BopEq,
        BinaryOp::StrictEq => OpCode::BopSeq,
        BinaryOp::Ne => OpCode::BopNe,
        BinaryOp::StrictNe => OpCode::BopSne,
        BinaryOp::In => OpCode::BopIn,
    }
}

/// `UnaryNeg` is the boolean `!` (spec's unary group has exactly four
/// opcodes for exactly four `UnaryOp` variants); `UnaryMinus` is the
/// arithmetic negation.
fn unary_opcode(op: UnaryOp) -> OpCode {
    match op {
        UnaryOp::Plus => OpCode::UnaryPlus,
        UnaryOp::Negate => OpCode::UnaryMinus,
        UnaryOp::LogicalNot => OpCode::UnaryNeg,
        UnaryOp::Typeof => OpCode::UnaryTypeof,
    }
}
