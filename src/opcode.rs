// File: src/opcode.rs
//
// The bytecode instruction set (spec.md §6). Each opcode is a variant of a
// Rust enum carrying its own operands rather than a raw byte followed by a
// manually-decoded operand stream — the idiomatic-Rust rendering of the
// same instruction set, in the vein of the teacher's own `OpCode` (see
// `ruff`'s bytecode.rs, which already embeds operands in its variants).
// Jump offsets stay within `u16` and the `!=`/`<=`/`>=` composite
// encodings are preserved exactly as spec.md describes them, so disassembly
// and execution still observe the same instruction sequence.

#[derive(Debug, Clone, PartialEq)]
pub enum OpCode {
    Constant(u8),
    Nil,
    True,
    False,
    Pop,
    GetLocal(u8),
    SetLocal(u8),
    GetUpvalue(u8),
    SetUpvalue(u8),
    CloseUpvalue,
    GetGlobal(u8),
    DefineGlobal(u8),
    SetGlobal(u8),
    GetProperty(u8),
    SetProperty(u8),
    GetSuper(u8),
    Method(u8),
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Negate,
    Not,
    Print,
    Jump(u16),
    JumpIfFalse(u16),
    Loop(u16),
    Call(u8),
    Invoke(u8, u8),
    SuperInvoke(u8, u8),
    /// Constant-pool index of the function, plus one `(is_local, index)`
    /// descriptor per upvalue the closure captures.
    Closure(u8, Vec<(bool, u8)>),
    Return,
    Class(u8),
    Inherit,
}

impl OpCode {
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Constant(_) => "CONSTANT",
            OpCode::Nil => "NIL",
            OpCode::True => "TRUE",
            OpCode::False => "FALSE",
            OpCode::Pop => "POP",
            OpCode::GetLocal(_) => "GET_LOCAL",
            OpCode::SetLocal(_) => "SET_LOCAL",
            OpCode::GetUpvalue(_) => "GET_UPVALUE",
            OpCode::SetUpvalue(_) => "SET_UPVALUE",
            OpCode::CloseUpvalue => "CLOSE_UPVALUE",
            OpCode::GetGlobal(_) => "GET_GLOBAL",
            OpCode::DefineGlobal(_) => "DEFINE_GLOBAL",
            OpCode::SetGlobal(_) => "SET_GLOBAL",
            OpCode::GetProperty(_) => "GET_PROPERTY",
            OpCode::SetProperty(_) => "SET_PROPERTY",
            OpCode::GetSuper(_) => "GET_SUPER",
            OpCode::Method(_) => "METHOD",
            OpCode::Equal => "EQUAL",
            OpCode::Greater => "GREATER",
            OpCode::Less => "LESS",
            OpCode::Add => "ADD",
            OpCode::Subtract => "SUBTRACT",
            OpCode::Multiply => "MULTIPLY",
            OpCode::Divide => "DIVIDE",
            OpCode::Negate => "NEGATE",
            OpCode::Not => "NOT",
            OpCode::Print => "PRINT",
            OpCode::Jump(_) => "JUMP",
            OpCode::JumpIfFalse(_) => "JUMP_IF_FALSE",
            OpCode::Loop(_) => "LOOP",
            OpCode::Call(_) => "CALL",
            OpCode::Invoke(..) => "INVOKE",
            OpCode::SuperInvoke(..) => "SUPER_INVOKE",
            OpCode::Closure(..) => "CLOSURE",
            OpCode::Return => "RETURN",
            OpCode::Class(_) => "CLASS",
            OpCode::Inherit => "INHERIT",
        }
    }
}
