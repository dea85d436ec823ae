// File: src/compiler.rs
//
// Single-pass Pratt compiler: tokens flow straight from the scanner into
// bytecode with no intermediate tree. Each nested function literal gets its
// own `FunctionState` (locals, upvalues, scope depth); `Compiler::functions`
// is that chain represented as a stack instead of a linked list of
// enclosing pointers, which keeps borrow-checking tractable while still
// reading top-to-bottom the way the teacher's own `Compiler` struct does.

use crate::chunk::Chunk;
use crate::heap::{FunctionObj, Handle, Heap};
use crate::opcode::OpCode;
use crate::scanner::Scanner;
use crate::token::{Token, TokenKind};
use crate::value::Value;

const MAX_LOCALS: usize = 256;
const MAX_UPVALUES: usize = 256;
const MAX_CONSTANTS: usize = crate::chunk::MAX_CONSTANTS;

#[derive(Debug, Clone, Copy, PartialEq)]
enum FunctionType {
    Script,
    Function,
    Method,
    Initializer,
}

struct Local<'src> {
    name: &'src str,
    /// -1 means declared but not yet initialized; reading it is an error.
    depth: i32,
    is_captured: bool,
}

#[derive(Clone, Copy)]
struct UpvalueDesc {
    index: u8,
    is_local: bool,
}

struct FunctionState<'src> {
    function_type: FunctionType,
    name: Option<Handle>,
    arity: u8,
    chunk: Chunk,
    locals: Vec<Local<'src>>,
    scope_depth: i32,
    upvalues: Vec<UpvalueDesc>,
}

struct ClassState {
    has_superclass: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

#[derive(Clone, Copy)]
enum ParseFnId {
    Grouping,
    Unary,
    Binary,
    Number,
    StringLit,
    Literal,
    Variable,
    And,
    Or,
    Call,
    Dot,
    This,
    Super,
}

fn get_rule(kind: TokenKind) -> (Option<ParseFnId>, Option<ParseFnId>, Precedence) {
    use ParseFnId::*;
    use TokenKind::*;
    match kind {
        LeftParen => (Some(Grouping), Some(Call), Precedence::Call),
        Dot => (None, Some(Dot), Precedence::Call),
        Minus => (Some(Unary), Some(Binary), Precedence::Term),
        Plus => (None, Some(Binary), Precedence::Term),
        Slash => (None, Some(Binary), Precedence::Factor),
        Star => (None, Some(Binary), Precedence::Factor),
        Bang => (Some(Unary), None, Precedence::None),
        BangEqual => (None, Some(Binary), Precedence::Equality),
        EqualEqual => (None, Some(Binary), Precedence::Equality),
        Greater | GreaterEqual | Less | LessEqual => (None, Some(Binary), Precedence::Comparison),
        Identifier => (Some(Variable), None, Precedence::None),
        String => (Some(StringLit), None, Precedence::None),
        Number => (Some(Number), None, Precedence::None),
        And => (None, Some(ParseFnId::And), Precedence::And),
        Or => (None, Some(ParseFnId::Or), Precedence::Or),
        False | Nil | True => (Some(Literal), None, Precedence::None),
        Super => (Some(ParseFnId::Super), None, Precedence::None),
        This => (Some(ParseFnId::This), None, Precedence::None),
        _ => (None, None, Precedence::None),
    }
}

pub struct Compiler<'src, 'heap> {
    scanner: Scanner<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    heap: &'heap mut Heap,
    functions: Vec<FunctionState<'src>>,
    classes: Vec<ClassState>,
    errors: Vec<String>,
}

/// Compiles `source` to a top-level function. On success, the returned
/// handle is a `FunctionObj` with no name and no enclosing scope — the VM
/// wraps it in a closure and calls it the same way it calls any other.
/// On failure, every accumulated message is formatted `[line L] Error ...`,
/// ready to print.
pub fn compile(source: &str, heap: &mut Heap) -> Result<Handle, Vec<String>> {
    let mut compiler = Compiler::new(source, heap);
    compiler.advance();
    while !compiler.check(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.consume(TokenKind::Eof, "Expect end of expression.");
    let function = compiler.finish_function();
    if compiler.had_error {
        Err(compiler.errors)
    } else {
        Ok(function)
    }
}

const DUMMY_TOKEN: Token<'static> = Token { kind: TokenKind::Eof, lexeme: "", line: 0 };

impl<'src, 'heap> Compiler<'src, 'heap> {
    fn new(source: &'src str, heap: &'heap mut Heap) -> Self {
        let mut compiler = Compiler {
            scanner: Scanner::new(source),
            previous: DUMMY_TOKEN,
            current: DUMMY_TOKEN,
            had_error: false,
            panic_mode: false,
            heap,
            functions: Vec::new(),
            classes: Vec::new(),
            errors: Vec::new(),
        };
        compiler.push_function(FunctionType::Script, None);
        compiler
    }

    // ---- token stream -------------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.error_at_current(self.current.lexeme);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_tok(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current;
        self.error_at(token, message);
    }

    fn error(&mut self, message: &str) {
        let token = self.previous;
        self.error_at(token, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let mut line = format!("[line {}] Error", token.line);
        match token.kind {
            TokenKind::Eof => line.push_str(" at end"),
            TokenKind::Error => {}
            _ => line.push_str(&format!(" at '{}'", token.lexeme)),
        }
        line.push_str(": ");
        line.push_str(message);
        self.errors.push(line);
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ---- emission -------------------------------------------------------

    fn current_chunk_mut(&mut self) -> &mut Chunk {
        &mut self.functions.last_mut().unwrap().chunk
    }

    fn current_function_type(&self) -> FunctionType {
        self.functions.last().unwrap().function_type
    }

    fn emit(&mut self, op: OpCode) {
        let line = self.previous.line;
        self.current_chunk_mut().write(op, line);
    }

    fn emit_jump(&mut self, make: impl FnOnce(u16) -> OpCode) -> usize {
        let line = self.previous.line;
        self.current_chunk_mut().write(make(0xFFFF), line)
    }

    fn patch_jump(&mut self, index: usize) {
        let after = self.current_chunk_mut().code.len();
        let jump = after - index - 1;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        match &mut self.current_chunk_mut().code[index] {
            OpCode::Jump(j) | OpCode::JumpIfFalse(j) => *j = jump as u16,
            _ => unreachable!("patch_jump target is not a jump instruction"),
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        let index = self.current_chunk_mut().code.len();
        let offset = index + 1 - loop_start;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        self.emit(OpCode::Loop(offset as u16));
    }

    fn emit_return(&mut self) {
        if self.current_function_type() == FunctionType::Initializer {
            self.emit(OpCode::GetLocal(0));
        } else {
            self.emit(OpCode::Nil);
        }
        self.emit(OpCode::Return);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        let index = self.current_chunk_mut().add_constant(value);
        if index >= MAX_CONSTANTS {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index as u8
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let handle = self.heap.copy_string(name);
        self.make_constant(Value::Obj(handle))
    }

    // ---- function-frame management --------------------------------------

    fn push_function(&mut self, function_type: FunctionType, name: Option<Handle>) {
        let mut locals = Vec::with_capacity(MAX_LOCALS);
        let slot0 = if function_type == FunctionType::Function { "" } else { "this" };
        locals.push(Local { name: slot0, depth: 0, is_captured: false });
        self.functions.push(FunctionState {
            function_type,
            name,
            arity: 0,
            chunk: Chunk::new(),
            locals,
            scope_depth: 0,
            upvalues: Vec::new(),
        });
    }

    fn finish_function(&mut self) -> Handle {
        self.emit_return();
        let state = self.functions.pop().expect("function stack underflow");
        let function = FunctionObj {
            name: state.name,
            arity: state.arity,
            upvalue_count: state.upvalues.len() as u8,
            chunk: state.chunk,
        };
        self.heap.alloc_function(function)
    }

    fn begin_scope(&mut self) {
        self.functions.last_mut().unwrap().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let frame = self.functions.last_mut().unwrap();
        frame.scope_depth -= 1;
        let depth = frame.scope_depth;
        while let Some(local) = frame.locals.last() {
            if local.depth <= depth {
                break;
            }
            if local.is_captured {
                self.emit(OpCode::CloseUpvalue);
            } else {
                self.emit(OpCode::Pop);
            }
            self.functions.last_mut().unwrap().locals.pop();
        }
    }

    // ---- name resolution --------------------------------------------------

    fn resolve_local(&mut self, func_idx: usize, name: &str) -> Option<u8> {
        let found = self.functions[func_idx]
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, l)| l.name == name)
            .map(|(i, l)| (i as u8, l.depth));
        match found {
            Some((i, -1)) => {
                self.error("Can't read local variable in its own initializer.");
                Some(i)
            }
            Some((i, _)) => Some(i),
            None => None,
        }
    }

    fn resolve_upvalue(&mut self, func_idx: usize, name: &str) -> Option<u8> {
        if func_idx == 0 {
            return None;
        }
        let enclosing = func_idx - 1;
        if let Some(local) = self.resolve_local(enclosing, name) {
            self.functions[enclosing].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(func_idx, local, true));
        }
        if let Some(upvalue) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(func_idx, upvalue, false));
        }
        None
    }

    fn add_upvalue(&mut self, func_idx: usize, index: u8, is_local: bool) -> u8 {
        let upvalues = &self.functions[func_idx].upvalues;
        for (i, uv) in upvalues.iter().enumerate() {
            if uv.index == index && uv.is_local == is_local {
                return i as u8;
            }
        }
        if upvalues.len() == MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }
        self.functions[func_idx].upvalues.push(UpvalueDesc { index, is_local });
        (self.functions[func_idx].upvalues.len() - 1) as u8
    }

    fn named_variable(&mut self, name: &str, can_assign: bool) {
        let func_idx = self.functions.len() - 1;
        let (get_op, set_op) = if let Some(slot) = self.resolve_local(func_idx, name) {
            (OpCode::GetLocal(slot), OpCode::SetLocal(slot))
        } else if let Some(slot) = self.resolve_upvalue(func_idx, name) {
            (OpCode::GetUpvalue(slot), OpCode::SetUpvalue(slot))
        } else {
            let idx = self.identifier_constant(name);
            (OpCode::GetGlobal(idx), OpCode::SetGlobal(idx))
        };
        if can_assign && self.match_tok(TokenKind::Equal) {
            self.expression();
            self.emit(set_op);
        } else {
            self.emit(get_op);
        }
    }

    // ---- declarations ------------------------------------------------------

    fn declaration(&mut self) {
        if self.match_tok(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_tok(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_tok(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.functions.last().unwrap().scope_depth > 0 {
            return 0;
        }
        let name = self.previous.lexeme;
        self.identifier_constant(name)
    }

    fn declare_variable(&mut self) {
        let frame = self.functions.last().unwrap();
        if frame.scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme;
        let depth = frame.scope_depth;
        let clashes = frame
            .locals
            .iter()
            .rev()
            .take_while(|l| l.depth == -1 || l.depth == depth)
            .any(|l| l.depth == depth && l.name == name);
        if clashes {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    fn add_local(&mut self, name: &'src str) {
        let frame = self.functions.last_mut().unwrap();
        if frame.locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.functions.last_mut().unwrap().locals.push(Local { name, depth: -1, is_captured: false });
    }

    fn mark_initialized(&mut self) {
        let frame = self.functions.last_mut().unwrap();
        if frame.scope_depth == 0 {
            return;
        }
        let depth = frame.scope_depth;
        frame.locals.last_mut().unwrap().depth = depth;
    }

    fn define_variable(&mut self, global: u8) {
        if self.functions.last().unwrap().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit(OpCode::DefineGlobal(global));
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_tok(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionType::Function);
        self.define_variable(global);
    }

    fn function(&mut self, function_type: FunctionType) {
        let name = self.heap.copy_string(self.previous.lexeme);
        self.push_function(function_type, Some(name));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                let arity = self.functions.last().unwrap().arity as u16 + 1;
                if arity > 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                self.functions.last_mut().unwrap().arity = arity.min(255) as u8;
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_tok(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        let upvalues = self.functions.last().unwrap().upvalues.clone();
        let handle = self.finish_function();
        let const_idx = self.make_constant(Value::Obj(handle));
        let descs = upvalues.into_iter().map(|u| (u.is_local, u.index)).collect();
        self.emit(OpCode::Closure(const_idx, descs));
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let name_const = self.identifier_constant(self.previous.lexeme);
        let function_type =
            if self.previous.lexeme == "init" { FunctionType::Initializer } else { FunctionType::Method };
        self.function(function_type);
        self.emit(OpCode::Method(name_const));
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let class_name = self.previous.lexeme;
        let name_const = self.identifier_constant(class_name);
        self.declare_variable();

        self.emit(OpCode::Class(name_const));
        self.define_variable(name_const);

        self.classes.push(ClassState { has_superclass: false });

        if self.match_tok(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            self.variable(false);
            if self.previous.lexeme == class_name {
                self.error("A class can't inherit from itself.");
            }
            self.begin_scope();
            self.add_local("super");
            self.define_variable(0);
            self.named_variable(class_name, false);
            self.emit(OpCode::Inherit);
            self.classes.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable(class_name, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit(OpCode::Pop);

        if self.classes.last().unwrap().has_superclass {
            self.end_scope();
        }
        self.classes.pop();
    }

    // ---- statements ------------------------------------------------------

    fn statement(&mut self) {
        if self.match_tok(TokenKind::Print) {
            self.print_statement();
        } else if self.match_tok(TokenKind::For) {
            self.for_statement();
        } else if self.match_tok(TokenKind::If) {
            self.if_statement();
        } else if self.match_tok(TokenKind::Return) {
            self.return_statement();
        } else if self.match_tok(TokenKind::While) {
            self.while_statement();
        } else if self.match_tok(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit(OpCode::Pop);

        if self.match_tok(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk_mut().code.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.match_tok(TokenKind::Semicolon) {
            // no initializer
        } else if self.match_tok(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk_mut().code.len();
        let mut exit_jump: Option<usize> = None;
        if !self.match_tok(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit(OpCode::Pop);
        }

        if !self.match_tok(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_chunk_mut().code.len();
            self.expression();
            self.emit(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit(OpCode::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.current_function_type() == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_tok(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.current_function_type() == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit(OpCode::Return);
        }
    }

    // ---- expressions -------------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix = get_rule(self.previous.kind).0;
        let Some(prefix) = prefix else {
            self.error("Expect expression.");
            return;
        };
        let can_assign = precedence <= Precedence::Assignment;
        self.apply(prefix, can_assign);

        while precedence <= get_rule(self.current.kind).2 {
            self.advance();
            let infix = get_rule(self.previous.kind).1.expect("infix rule must exist for this token");
            self.apply(infix, can_assign);
        }

        if can_assign && self.match_tok(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn apply(&mut self, id: ParseFnId, can_assign: bool) {
        match id {
            ParseFnId::Grouping => self.grouping(can_assign),
            ParseFnId::Unary => self.unary(can_assign),
            ParseFnId::Binary => self.binary(can_assign),
            ParseFnId::Number => self.number(can_assign),
            ParseFnId::StringLit => self.string_literal(can_assign),
            ParseFnId::Literal => self.literal(can_assign),
            ParseFnId::Variable => self.variable(can_assign),
            ParseFnId::And => self.and(can_assign),
            ParseFnId::Or => self.or(can_assign),
            ParseFnId::Call => self.call(can_assign),
            ParseFnId::Dot => self.dot(can_assign),
            ParseFnId::This => self.this(can_assign),
            ParseFnId::Super => self.super_(can_assign),
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Minus => self.emit(OpCode::Negate),
            TokenKind::Bang => self.emit(OpCode::Not),
            _ => unreachable!("unary() called for non-unary operator"),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        let rule = get_rule(operator);
        self.parse_precedence(rule.2.next());
        match operator {
            TokenKind::BangEqual => {
                self.emit(OpCode::Equal);
                self.emit(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit(OpCode::Equal),
            TokenKind::Greater => self.emit(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit(OpCode::Less);
                self.emit(OpCode::Not);
            }
            TokenKind::Less => self.emit(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit(OpCode::Greater);
                self.emit(OpCode::Not);
            }
            TokenKind::Plus => self.emit(OpCode::Add),
            TokenKind::Minus => self.emit(OpCode::Subtract),
            TokenKind::Star => self.emit(OpCode::Multiply),
            TokenKind::Slash => self.emit(OpCode::Divide),
            _ => unreachable!("binary() called for non-binary operator"),
        }
    }

    fn call(&mut self, _can_assign: bool) {
        let arg_count = self.argument_list();
        self.emit(OpCode::Call(arg_count));
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name_const = self.identifier_constant(self.previous.lexeme);
        if can_assign && self.match_tok(TokenKind::Equal) {
            self.expression();
            self.emit(OpCode::SetProperty(name_const));
        } else if self.match_tok(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.emit(OpCode::Invoke(name_const, arg_count));
        } else {
            self.emit(OpCode::GetProperty(name_const));
        }
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u16 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.match_tok(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count as u8
    }

    fn and(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn number(&mut self, _can_assign: bool) {
        let value: f64 = self.previous.lexeme.parse().expect("scanner guarantees a valid number literal");
        let idx = self.make_constant(Value::Number(value));
        self.emit(OpCode::Constant(idx));
    }

    fn string_literal(&mut self, _can_assign: bool) {
        let raw = self.previous.lexeme;
        let contents = &raw[1..raw.len() - 1];
        let handle = self.heap.copy_string(contents);
        let idx = self.make_constant(Value::Obj(handle));
        self.emit(OpCode::Constant(idx));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit(OpCode::False),
            TokenKind::Nil => self.emit(OpCode::Nil),
            TokenKind::True => self.emit(OpCode::True),
            _ => unreachable!("literal() called for non-literal token"),
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous.lexeme;
        self.named_variable(name, can_assign);
    }

    fn this(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.named_variable("this", false);
    }

    fn super_(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Can't use 'super' outside of a class.");
        } else if !self.classes.last().unwrap().has_superclass {
            self.error("Can't use 'super' in a class with no superclass.");
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let name_const = self.identifier_constant(self.previous.lexeme);

        self.named_variable("this", false);
        if self.match_tok(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable("super", false);
            self.emit(OpCode::SuperInvoke(name_const, arg_count));
        } else {
            self.named_variable("super", false);
            self.emit(OpCode::GetSuper(name_const));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(source: &str) -> (Handle, Heap) {
        let mut heap = Heap::new();
        let result = compile(source, &mut heap);
        let handle = result.unwrap_or_else(|errs| panic!("unexpected compile errors: {errs:?}"));
        (handle, heap)
    }

    fn compile_err(source: &str) -> Vec<String> {
        let mut heap = Heap::new();
        compile(source, &mut heap).expect_err("expected a compile error")
    }

    #[test]
    fn compiles_arithmetic_with_precedence() {
        let (handle, heap) = compile_ok("print 1 + 2 * 3;");
        let crate::heap::Obj::Function(f) = heap.get(handle) else { panic!("expected function") };
        assert!(f.chunk.code.iter().any(|op| matches!(op, OpCode::Multiply)));
        assert!(f.chunk.code.iter().any(|op| matches!(op, OpCode::Add)));
    }

    #[test]
    fn reports_unterminated_string() {
        let errs = compile_err("var s = \"oops;");
        assert!(errs[0].contains("Unterminated string."));
    }

    #[test]
    fn reports_top_level_return() {
        let errs = compile_err("return 1;");
        assert!(errs.iter().any(|e| e.contains("Can't return from top-level code.")));
    }

    #[test]
    fn reports_self_inheritance() {
        let errs = compile_err("class Oops < Oops {}");
        assert!(errs.iter().any(|e| e.contains("can't inherit from itself")));
    }

    #[test]
    fn closure_captures_upvalue() {
        let (handle, heap) = compile_ok(
            "fun outer() { var x = 1; fun inner() { return x; } return inner; }",
        );
        let crate::heap::Obj::Function(f) = heap.get(handle) else { panic!("expected function") };
        // `outer`'s body should emit a CLOSURE carrying one upvalue descriptor.
        let closure_op = f.chunk.code.iter().find(|op| matches!(op, OpCode::Closure(..)));
        match closure_op {
            Some(OpCode::Closure(_, upvalues)) => assert_eq!(upvalues.len(), 1),
            _ => panic!("expected a CLOSURE instruction"),
        }
    }
}
