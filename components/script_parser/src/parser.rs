//! Recursive-descent parser (spec §4.5): fixed precedence ladder
//! `assignment / ternary → logical-or → logical-and → relational / in /
//! match → sum → product → unary → primary`, with library-backed name
//! resolution happening inline as each call/constant reference is parsed.

use std::collections::HashMap;

use bytecode_system::ConstValue;
use core_types::{ParseError, SourcePosition};
use library_api::Library;
use value_ops::{BinaryOp, UnaryOp};

use crate::ast::{Block, Callee, Expr, ObjectEntry, Stmt};
use crate::token::{tokenize, Token};

/// Parse a complete script into its root `Block` (spec §4.5: "the parser
/// always produces a block for scripts").
pub fn parse(source: &str, library: &dyn Library) -> Result<Block, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        library,
        directives: HashMap::new(),
    };
    let block = parser.parse_block_contents()?;
    parser.expect(&Token::Eof)?;
    Ok(block)
}

struct Parser<'a> {
    tokens: Vec<(Token, SourcePosition)>,
    pos: usize,
    library: &'a dyn Library,
    /// Declared directive names: `name -> (directive_type, literals)`.
    directives: HashMap<String, (String, Vec<ConstValue>)>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|(t, _)| t)
            .unwrap_or(&Token::Eof)
    }

    fn position(&self) -> SourcePosition {
        self.tokens[self.pos].1
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].0.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.position().0.max(0) as usize)
    }

    fn expect(&mut self, want: &Token) -> Result<(), ParseError> {
        if self.peek() == want {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}, got {:?}", want, self.peek())))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Token::Identifier(name) => Ok(name),
            other => Err(self.error(format!("expected identifier, got {:?}", other))),
        }
    }

    // ---- Statements -----------------------------------------------------

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.expect(&Token::LBrace)?;
        let block = self.parse_block_contents()?;
        self.expect(&Token::RBrace)?;
        Ok(block)
    }

    fn parse_block_contents(&mut self) -> Result<Block, ParseError> {
        let mut statements = Vec::new();
        while !matches!(self.peek(), Token::Eof | Token::RBrace) {
            statements.push(self.parse_statement()?);
        }
        Ok(Block { statements })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            Token::Let => self.parse_variable_declare(),
            Token::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            Token::If => self.parse_if(),
            Token::For => self.parse_foreach(),
            Token::Break => {
                let position = self.position();
                self.advance();
                self.expect(&Token::Semicolon)?;
                Ok(Stmt::Break(position))
            }
            Token::Continue => {
                let position = self.position();
                self.advance();
                self.expect(&Token::Semicolon)?;
                Ok(Stmt::Continue(position))
            }
            Token::Return => {
                let position = self.position();
                self.advance();
                let value = if matches!(self.peek(), Token::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&Token::Semicolon)?;
                Ok(Stmt::Return(value, position))
            }
            Token::Throw => {
                let position = self.position();
                self.advance();
                let value = self.parse_expr()?;
                self.expect(&Token::Semicolon)?;
                Ok(Stmt::Throw(value, position))
            }
            Token::Try => self.parse_try_catch(),
            Token::Directive => self.parse_directive(),
            _ => {
                let position = self.position();
                let expr = self.parse_expr()?;
                self.expect(&Token::Semicolon)?;
                let _ = position;
                Ok(Stmt::ExpressionStatement(expr))
            }
        }
    }

    fn parse_variable_declare(&mut self) -> Result<Stmt, ParseError> {
        let position = self.position();
        self.advance(); // let
        let name = self.expect_identifier()?;
        let init = if matches!(self.peek(), Token::Assign) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(&Token::Semicolon)?;
        Ok(Stmt::VariableDeclare { name, init, position })
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let position = self.position();
        self.advance(); // if
        self.expect(&Token::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        let then_branch = Box::new(Stmt::Block(self.parse_block()?));
        let else_branch = if matches!(self.peek(), Token::Else) {
            self.advance();
            if matches!(self.peek(), Token::If) {
                Some(Box::new(self.parse_if()?))
            } else {
                Some(Box::new(Stmt::Block(self.parse_block()?)))
            }
        } else {
            None
        };
        Ok(Stmt::If { condition, then_branch, else_branch, position })
    }

    fn parse_foreach(&mut self) -> Result<Stmt, ParseError> {
        let position = self.position();
        self.advance(); // for
        self.expect(&Token::LParen)?;
        self.expect(&Token::Let)?;
        let key_name = self.expect_identifier()?;
        self.expect(&Token::Comma)?;
        let value_name = self.expect_identifier()?;
        self.expect(&Token::Of)?;
        let iterable = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        let body = Box::new(Stmt::Block(self.parse_block()?));
        Ok(Stmt::Foreach { key_name, value_name, iterable, body, position })
    }

    fn parse_try_catch(&mut self) -> Result<Stmt, ParseError> {
        let position = self.position();
        self.advance(); // try
        let try_block = self.parse_block()?;
        self.expect(&Token::Catch)?;
        self.expect(&Token::LParen)?;
        let catch_name = self.expect_identifier()?;
        self.expect(&Token::RParen)?;
        let catch_block = self.parse_block()?;
        Ok(Stmt::TryCatch { try_block, catch_name, catch_block, position })
    }

    fn parse_directive(&mut self) -> Result<Stmt, ParseError> {
        let position = self.position();
        self.advance(); // directive
        let name = self.expect_identifier()?;
        // Spec §9 open question: the grammar admits both `directive NAME =
        // TYPE …;` and `directive NAME from TYPE …;`; accept either.
        if matches!(self.peek(), Token::From) {
            self.advance();
        } else {
            self.expect(&Token::Assign)?;
        }
        let directive_type = self.expect_identifier()?;
        let mut literals = Vec::new();
        while !matches!(self.peek(), Token::Semicolon) {
            literals.push(self.parse_literal_value()?);
        }
        self.expect(&Token::Semicolon)?;
        if self
            .library
            .find_directive_def(&directive_type, &name, &literals)
            .is_none()
        {
            return Err(self.error(format!(
                "directive type '{}' is not recognized by the host library",
                directive_type
            )));
        }
        self.directives
            .insert(name.clone(), (directive_type.clone(), literals.clone()));
        Ok(Stmt::Directive { name, directive_type, literals, position })
    }

    /// A directive declaration's literal arguments: plain constant values,
    /// no expressions.
    fn parse_literal_value(&mut self) -> Result<ConstValue, ParseError> {
        let position = self.position();
        match self.advance() {
            Token::Int(n) | Token::Long(n) | Token::HexInt(n) | Token::HexLong(n) => {
                Ok(ConstValue::Integer(n))
            }
            Token::Real(f) | Token::RealFloat(f) => Ok(ConstValue::Float(f)),
            Token::Str(s) => Ok(ConstValue::Str(s)),
            Token::True => Ok(ConstValue::Boolean(true)),
            Token::False => Ok(ConstValue::Boolean(false)),
            Token::Null => Ok(ConstValue::Null),
            other => Err(ParseError::new(
                format!("expected a literal value, got {:?}", other),
                position.0.max(0) as usize,
            )),
        }
    }

    /// Whether the current token is the plain `Identifier` contextual
    /// keyword `keyword` (spec line: "Identifier 'typeof'/'in' are mapped
    /// at parse time").
    fn peek_is_identifier(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Identifier(name) if name == keyword)
    }

    // ---- Expressions, by precedence tier --------------------------------

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_ternary()?;
        if matches!(self.peek(), Token::Assign) {
            let position = self.position();
            self.advance();
            if !expr.is_assignable() {
                return Err(ParseError::new(
                    "left-hand side of assignment must be a variable, property, or indexer",
                    position.0.max(0) as usize,
                ));
            }
            let value = self.parse_assignment()?;
            return Ok(Expr::Assign { target: Box::new(expr), value: Box::new(value), position });
        }
        Ok(expr)
    }

    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let condition = self.parse_logical_or()?;
        if matches!(self.peek(), Token::Question) {
            let position = self.position();
            self.advance();
            let then_expr = self.parse_assignment()?;
            self.expect(&Token::Colon)?;
            let else_expr = self.parse_ternary()?;
            return Ok(Expr::Ternary {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
                position,
            });
        }
        Ok(condition)
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_logical_and()?;
        while matches!(self.peek(), Token::OrOr) {
            let position = self.position();
            self.advance();
            let rhs = self.parse_logical_and()?;
            lhs = Expr::LogicRelationalExpression {
                is_and: false,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                position,
            };
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_relational()?;
        while matches!(self.peek(), Token::AndAnd) {
            let position = self.position();
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::LogicRelationalExpression {
                is_and: true,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                position,
            };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_sum()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                Token::Eq => BinaryOp::Eq,
                Token::Ne => BinaryOp::Ne,
                Token::StrictEq => BinaryOp::StrictEq,
                Token::StrictNe => BinaryOp::StrictNe,
                Token::Tilde => BinaryOp::Match,
                _ if self.peek_is_identifier("in") => BinaryOp::In,
                _ => break,
            };
            let position = self.position();
            self.advance();
            let rhs = self.parse_sum()?;
            lhs = Expr::BinaryOperator { op, lhs: Box::new(lhs), rhs: Box::new(rhs), position };
        }
        Ok(lhs)
    }

    fn parse_sum(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_product()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            let position = self.position();
            self.advance();
            let rhs = self.parse_product()?;
            lhs = Expr::BinaryOperator { op, lhs: Box::new(lhs), rhs: Box::new(rhs), position };
        }
        Ok(lhs)
    }

    fn parse_product(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Mod,
                _ => break,
            };
            let position = self.position();
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::BinaryOperator { op, lhs: Box::new(lhs), rhs: Box::new(rhs), position };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Token::Plus => Some(UnaryOp::Plus),
            Token::Minus => Some(UnaryOp::Negate),
            Token::Not => Some(UnaryOp::LogicalNot),
            _ if self.peek_is_identifier("typeof") => Some(UnaryOp::Typeof),
            _ => None,
        };
        if let Some(op) = op {
            let position = self.position();
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::UnaryOperator { op, operand: Box::new(operand), position });
        }
        self.parse_primary_with_postfix()
    }

    // ---- Primary / postfix chains ----------------------------------------

    fn parse_primary_with_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    let position = self.position();
                    self.advance();
                    let prop = self.expect_identifier()?;
                    expr = Expr::PropertyReference {
                        base: Box::new(expr),
                        prop,
                        is_lvalue: true,
                        position,
                    };
                }
                Token::LBracket => {
                    let position = self.position();
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Indexer {
                        base: Box::new(expr),
                        index: Box::new(index),
                        is_lvalue: true,
                        position,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let position = self.position();
        match self.peek().clone() {
            Token::Int(n) | Token::Long(n) | Token::HexInt(n) | Token::HexLong(n) => {
                self.advance();
                Ok(Expr::Literal(ConstValue::Integer(n), position))
            }
            Token::Real(f) | Token::RealFloat(f) => {
                self.advance();
                Ok(Expr::Literal(ConstValue::Float(f), position))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(ConstValue::Str(s), position))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Literal(ConstValue::Boolean(true), position))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Literal(ConstValue::Boolean(false), position))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Literal(ConstValue::Null, position))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => self.parse_inline_list(),
            Token::LBrace => self.parse_inline_object(),
            Token::Spread => {
                self.advance();
                let inner = self.parse_assignment()?;
                Ok(Expr::ExpandArrArg { inner: Box::new(inner), position })
            }
            Token::Dollar => self.parse_dollar(),
            Token::Identifier(name) => self.parse_identifier_form(name, position),
            other => Err(self.error(format!("unexpected token {:?}", other))),
        }
    }

    fn parse_inline_list(&mut self) -> Result<Expr, ParseError> {
        let position = self.position();
        self.advance(); // [
        let mut elements = Vec::new();
        while !matches!(self.peek(), Token::RBracket) {
            elements.push(self.parse_assignment()?);
            if matches!(self.peek(), Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(Expr::InlineList { elements, position })
    }

    fn parse_inline_object(&mut self) -> Result<Expr, ParseError> {
        let position = self.position();
        self.advance(); // {
        let mut entries: Vec<ObjectEntry> = Vec::new();
        while !matches!(self.peek(), Token::RBrace) {
            if matches!(self.peek(), Token::Spread) {
                self.advance();
                let inner = self.parse_assignment()?;
                entries.push(ObjectEntry::Spread(inner));
            } else {
                let key = match self.advance() {
                    Token::Identifier(name) => name,
                    Token::Str(s) => s,
                    other => return Err(self.error(format!("expected object key, got {:?}", other))),
                };
                if entries.iter().any(|e| matches!(e, ObjectEntry::Pair(k, _) if k == &key)) {
                    return Err(self.error(format!("duplicate key '{}' in object literal", key)));
                }
                self.expect(&Token::Colon)?;
                let value = self.parse_assignment()?;
                entries.push(ObjectEntry::Pair(key, value));
            }
            if matches!(self.peek(), Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::InlineObject { entries, position })
    }

    /// `$.prop` (root access, `mark_root_prop` notified) or `$ns.key`
    /// (library constant lookup), per spec §4.5.
    fn parse_dollar(&mut self) -> Result<Expr, ParseError> {
        let position = self.position();
        self.advance(); // $
        if matches!(self.peek(), Token::Dot) {
            self.advance();
            let prop = self.expect_identifier()?;
            self.library.mark_root_prop(&prop);
            return Ok(Expr::PropertyReference {
                base: Box::new(Expr::VariableReference {
                    name: "$".to_string(),
                    is_lvalue: false,
                    position,
                }),
                prop,
                is_lvalue: true,
                position,
            });
        }
        let ns = self.expect_identifier()?;
        self.expect(&Token::Dot)?;
        let key = self.expect_identifier()?;
        let is_async = if self.library.find_constant(&ns, &key).is_some() {
            false
        } else if self.library.find_async_constant(&ns, &key).is_some() {
            true
        } else {
            return Err(self.error(format!("unknown library constant '${}.{}'", ns, key)));
        };
        Ok(Expr::ConstantVal { ns, key, is_async, position })
    }

    fn parse_identifier_form(&mut self, name: String, position: SourcePosition) -> Result<Expr, ParseError> {
        self.advance(); // identifier

        if matches!(self.peek(), Token::LParen) {
            // Bare `name(args)`: a library function call (spec §4.5).
            let is_async = if self.library.find_func(&name).is_some() {
                false
            } else if self.library.find_async_func(&name).is_some() {
                true
            } else {
                return Err(ParseError::new(
                    format!("unknown function '{}'", name),
                    position.0.max(0) as usize,
                ));
            };
            let args = self.parse_call_args()?;
            return Ok(Expr::FunctionCall {
                callee: Callee::Function { name, is_async },
                args,
                position,
            });
        }

        if let Some((directive_type, literals)) = self.directives.get(&name).cloned() {
            if matches!(self.peek(), Token::Dot) {
                self.advance();
                let method = self.expect_identifier()?;
                let def = self
                    .library
                    .find_directive_def(&directive_type, &name, &literals)
                    .ok_or_else(|| {
                        ParseError::new(
                            format!("directive '{}' is no longer recognized by the library", name),
                            position.0.max(0) as usize,
                        )
                    })?;
                let is_async = if def.find_func(&name, &method).is_some() {
                    false
                } else if def.find_async_func(&name, &method).is_some() {
                    true
                } else {
                    return Err(ParseError::new(
                        format!("directive '{}' has no method '{}'", name, method),
                        position.0.max(0) as usize,
                    ));
                };
                self.expect(&Token::LParen)?;
                let args = self.parse_call_args_rest()?;
                return Ok(Expr::FunctionCall {
                    callee: Callee::Directive {
                        directive_type,
                        directive_name: name,
                        method,
                        literals,
                        is_async,
                    },
                    args,
                    position,
                });
            }
        }

        Ok(Expr::VariableReference { name, is_lvalue: true, position })
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(&Token::LParen)?;
        self.parse_call_args_rest()
    }

    /// Parses `arg, arg, ...)` assuming the opening `(` was already
    /// consumed by the caller.
    fn parse_call_args_rest(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        while !matches!(self.peek(), Token::RParen) {
            args.push(self.parse_assignment()?);
            if matches!(self.peek(), Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }
}
