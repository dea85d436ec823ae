// File: src/vm.rs
//
// The stack-based bytecode interpreter (spec.md §4.2). Owns the value
// stack, the call-frame stack, globals, and the open-upvalue list; the
// heap itself lives here too since nothing outside a VM instance ever
// needs to allocate. Where the teacher's original `vm.rs` dispatched a
// tree-walking `Interpreter` plus a half-wired JIT, this VM instead reads
// `OpCode` values straight out of a `Chunk` — no JIT, no async runtime, no
// pattern matching, matching spec.md's non-goals.

use crate::chunk::Chunk;
use crate::compiler;
use crate::disasm;
use crate::errors::{RuntimeError, TraceFrame};
use crate::heap::{
    BoundMethodObj, ClassObj, ClosureObj, Handle, Heap, InstanceObj, NativeObj, Obj, Table,
    UpvalueLoc,
};
use crate::natives;
use crate::opcode::OpCode;
use crate::value::Value;

const FRAMES_MAX: usize = 64;
const STACK_MAX: usize = FRAMES_MAX * 256;

struct CallFrame {
    closure: Handle,
    ip: usize,
    slot_base: usize,
}

pub enum InterpretError {
    Compile(Vec<String>),
    Runtime(RuntimeError),
}

pub struct VM {
    heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    open_upvalues: Vec<Handle>,
    init_string: Handle,
}

impl VM {
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let init_string = heap.copy_string("init");
        let mut globals = Table::new();
        natives::install(&mut heap, |heap, name, value| {
            let handle = heap.copy_string(name);
            let hash = heap.str_hash(handle);
            globals.set(handle, hash, value);
        });
        VM { heap, stack: Vec::with_capacity(256), frames: Vec::with_capacity(8), globals, open_upvalues: Vec::new(), init_string }
    }

    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let function_handle = match compiler::compile(source, &mut self.heap) {
            Ok(handle) => handle,
            Err(errors) => return Err(InterpretError::Compile(errors)),
        };

        // Root the bare function through a push/alloc/pop/push dance, the
        // same sequencing clox's `interpret` uses, before wrapping it in a
        // closure with no captured upvalues.
        self.push(Value::Obj(function_handle));
        let closure_handle = self.heap.alloc_closure(ClosureObj { function: function_handle, upvalues: Vec::new() });
        self.pop();
        self.push(Value::Obj(closure_handle));

        if let Err(e) = self.call(closure_handle, 0) {
            self.reset_stack();
            return Err(InterpretError::Runtime(e));
        }
        match self.run() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.reset_stack();
                Err(InterpretError::Runtime(e))
            }
        }
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    // ---- stack helpers ----------------------------------------------------

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("value stack underflow")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    // ---- the dispatch loop --------------------------------------------------

    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            if disasm::trace_exec_enabled() {
                self.trace_stack();
                self.trace_instruction();
            }
            let op = self.fetch();
            match op {
                OpCode::Constant(idx) => {
                    let v = self.read_constant(idx);
                    self.push(v);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal(slot) => {
                    let base = self.frames.last().unwrap().slot_base;
                    self.push(self.stack[base + slot as usize]);
                }
                OpCode::SetLocal(slot) => {
                    let base = self.frames.last().unwrap().slot_base;
                    let value = self.peek(0);
                    self.stack[base + slot as usize] = value;
                }
                OpCode::GetUpvalue(slot) => {
                    let value = self.read_upvalue(slot);
                    self.push(value);
                }
                OpCode::SetUpvalue(slot) => {
                    let value = self.peek(0);
                    self.write_upvalue(slot, value);
                }
                OpCode::CloseUpvalue => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(top);
                    self.pop();
                }
                OpCode::GetGlobal(idx) => {
                    let name = self.read_constant_handle(idx);
                    let hash = self.heap.str_hash(name);
                    match self.globals.get(name, hash) {
                        Some(v) => self.push(v),
                        None => return Err(self.runtime_error(undefined_variable(&self.heap, name))),
                    }
                }
                OpCode::DefineGlobal(idx) => {
                    let name = self.read_constant_handle(idx);
                    let hash = self.heap.str_hash(name);
                    let value = self.pop();
                    self.globals.set(name, hash, value);
                }
                OpCode::SetGlobal(idx) => {
                    let name = self.read_constant_handle(idx);
                    let hash = self.heap.str_hash(name);
                    if self.globals.get(name, hash).is_none() {
                        self.globals.delete(name, hash);
                        return Err(self.runtime_error(undefined_variable(&self.heap, name)));
                    }
                    let value = self.peek(0);
                    self.globals.set(name, hash, value);
                }
                OpCode::GetProperty(idx) => self.op_get_property(idx)?,
                OpCode::SetProperty(idx) => self.op_set_property(idx)?,
                OpCode::GetSuper(idx) => {
                    let name = self.read_constant_handle(idx);
                    let superclass = self.pop();
                    let Value::Obj(super_handle) = superclass else {
                        unreachable!("compiler only ever pushes a class value before GET_SUPER")
                    };
                    self.bind_method(super_handle, name)?;
                }
                OpCode::Method(idx) => self.op_method(idx),
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Greater => self.binary_compare(|a, b| a > b)?,
                OpCode::Less => self.binary_compare(|a, b| a < b)?,
                OpCode::Add => self.op_add()?,
                OpCode::Subtract => self.binary_number(|a, b| a - b)?,
                OpCode::Multiply => self.binary_number(|a, b| a * b)?,
                OpCode::Divide => self.binary_number(|a, b| a / b)?,
                OpCode::Negate => {
                    let v = self.peek(0);
                    match v.as_number() {
                        Some(n) => {
                            self.pop();
                            self.push(Value::Number(-n));
                        }
                        None => return Err(self.runtime_error("Operand must be a number.".to_string())),
                    }
                }
                OpCode::Not => {
                    let v = self.pop();
                    self.push(Value::Bool(v.is_falsey()));
                }
                OpCode::Print => {
                    let v = self.pop();
                    println!("{}", v.display(&self.heap));
                }
                OpCode::Jump(offset) => {
                    self.frames.last_mut().unwrap().ip += offset as usize;
                }
                OpCode::JumpIfFalse(offset) => {
                    if self.peek(0).is_falsey() {
                        self.frames.last_mut().unwrap().ip += offset as usize;
                    }
                }
                OpCode::Loop(offset) => {
                    self.frames.last_mut().unwrap().ip -= offset as usize;
                }
                OpCode::Call(argc) => {
                    let callee = self.peek(argc as usize);
                    self.call_value(callee, argc)?;
                }
                OpCode::Invoke(idx, argc) => {
                    let name = self.read_constant_handle(idx);
                    self.invoke(name, argc)?;
                }
                OpCode::SuperInvoke(idx, argc) => {
                    let name = self.read_constant_handle(idx);
                    let superclass = self.pop();
                    let Value::Obj(super_handle) = superclass else {
                        unreachable!("compiler only ever pushes a class value before SUPER_INVOKE")
                    };
                    self.invoke_from_class(super_handle, name, argc)?;
                }
                OpCode::Closure(idx, descriptors) => self.op_closure(idx, &descriptors),
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("RETURN with no active frame");
                    self.close_upvalues(frame.slot_base);
                    if self.frames.is_empty() {
                        self.stack.truncate(frame.slot_base);
                        return Ok(());
                    }
                    self.stack.truncate(frame.slot_base);
                    self.push(result);
                }
                OpCode::Class(idx) => {
                    let name = self.read_constant_handle(idx);
                    self.maybe_collect(&[name]);
                    let handle = self.heap.alloc_class(ClassObj { name, methods: Table::new() });
                    self.push(Value::Obj(handle));
                }
                OpCode::Inherit => self.op_inherit()?,
            }
        }
    }

    // ---- instruction/constant fetch ----------------------------------------

    fn fetch(&mut self) -> OpCode {
        let (ip, closure) = {
            let frame = self.frames.last_mut().expect("no active call frame");
            let ip = frame.ip;
            frame.ip += 1;
            (ip, frame.closure)
        };
        self.chunk_of(closure).code[ip].clone()
    }

    fn chunk_of(&self, closure: Handle) -> &Chunk {
        let Obj::Closure(c) = self.heap.get(closure) else { unreachable!("expected closure") };
        let Obj::Function(f) = self.heap.get(c.function) else { unreachable!("expected function") };
        &f.chunk
    }

    fn read_constant(&self, idx: u8) -> Value {
        let closure = self.frames.last().unwrap().closure;
        self.chunk_of(closure).constants[idx as usize]
    }

    fn read_constant_handle(&self, idx: u8) -> Handle {
        match self.read_constant(idx) {
            Value::Obj(h) => h,
            _ => unreachable!("constant at this index is not an object"),
        }
    }

    // ---- arithmetic/comparison ----------------------------------------------

    fn binary_number(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let b = self.peek(0).as_number();
        let a = self.peek(1).as_number();
        match (a, b) {
            (Some(a), Some(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(f(a, b)));
                Ok(())
            }
            _ => Err(self.runtime_error("Operands must be numbers.".to_string())),
        }
    }

    fn binary_compare(&mut self, f: impl Fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
        let b = self.peek(0).as_number();
        let a = self.peek(1).as_number();
        match (a, b) {
            (Some(a), Some(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Bool(f(a, b)));
                Ok(())
            }
            _ => Err(self.runtime_error("Operands must be numbers.".to_string())),
        }
    }

    /// Both operands stay on the stack — reachable as GC roots — for the
    /// duration of the allocation, per spec.md's GC-safety note on ADD.
    fn op_add(&mut self) -> Result<(), RuntimeError> {
        let b = self.peek(0);
        let a = self.peek(1);
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(x + y));
                Ok(())
            }
            (Value::Obj(ha), Value::Obj(hb))
                if a.is_string(&self.heap) && b.is_string(&self.heap) =>
            {
                let concatenated = format!("{}{}", self.heap.str_chars(ha), self.heap.str_chars(hb));
                self.maybe_collect(&[]);
                let handle = self.heap.take_string(concatenated);
                self.pop();
                self.pop();
                self.push(Value::Obj(handle));
                Ok(())
            }
            _ => Err(self.runtime_error("Operands must be two numbers or two strings.".to_string())),
        }
    }

    // ---- properties/classes --------------------------------------------------

    fn op_get_property(&mut self, idx: u8) -> Result<(), RuntimeError> {
        let name = self.read_constant_handle(idx);
        let Value::Obj(inst_handle) = self.peek(0) else {
            return Err(self.runtime_error("Only instances have properties.".to_string()));
        };
        let Obj::Instance(inst) = self.heap.get(inst_handle) else {
            return Err(self.runtime_error("Only instances have properties.".to_string()));
        };
        let hash = self.heap.str_hash(name);
        if let Some(value) = inst.fields.get(name, hash) {
            self.pop();
            self.push(value);
            return Ok(());
        }
        let class_handle = inst.class;
        self.bind_method(class_handle, name)
    }

    fn op_set_property(&mut self, idx: u8) -> Result<(), RuntimeError> {
        let name = self.read_constant_handle(idx);
        let Value::Obj(inst_handle) = self.peek(1) else {
            return Err(self.runtime_error("Only instances have fields.".to_string()));
        };
        let value = self.peek(0);
        let hash = self.heap.str_hash(name);
        let (before, after) = {
            let Obj::Instance(inst) = self.heap.get_mut(inst_handle) else {
                return Err(self.runtime_error("Only instances have fields.".to_string()));
            };
            let before = inst.fields.capacity();
            inst.fields.set(name, hash, value);
            (before, inst.fields.capacity())
        };
        self.heap.note_table_growth(inst_handle, before, after);
        self.pop();
        self.pop();
        self.push(value);
        Ok(())
    }

    fn bind_method(&mut self, class_handle: Handle, name: Handle) -> Result<(), RuntimeError> {
        let hash = self.heap.str_hash(name);
        let Obj::Class(c) = self.heap.get(class_handle) else { unreachable!("expected class") };
        let method = match c.methods.get(name, hash) {
            Some(Value::Obj(h)) => h,
            _ => return Err(self.runtime_error(undefined_property(&self.heap, name))),
        };
        let receiver = self.peek(0);
        self.maybe_collect(&[method]);
        let bound = self.heap.alloc_bound_method(BoundMethodObj { receiver, method });
        self.pop();
        self.push(Value::Obj(bound));
        Ok(())
    }

    fn op_method(&mut self, idx: u8) {
        let name = self.read_constant_handle(idx);
        let method = self.peek(0);
        let Value::Obj(class_handle) = self.peek(1) else { unreachable!("expected class under method") };
        let hash = self.heap.str_hash(name);
        let mut growth = None;
        if let Obj::Class(c) = self.heap.get_mut(class_handle) {
            let before = c.methods.capacity();
            c.methods.set(name, hash, method);
            growth = Some((before, c.methods.capacity()));
        }
        if let Some((before, after)) = growth {
            self.heap.note_table_growth(class_handle, before, after);
        }
        self.pop();
    }

    fn op_inherit(&mut self) -> Result<(), RuntimeError> {
        let Value::Obj(super_handle) = self.peek(1) else {
            return Err(self.runtime_error("Superclass must be a class.".to_string()));
        };
        if !matches!(self.heap.get(super_handle), Obj::Class(_)) {
            return Err(self.runtime_error("Superclass must be a class.".to_string()));
        }
        let Value::Obj(sub_handle) = self.peek(0) else { unreachable!("expected class on top") };
        let Obj::Class(superclass) = self.heap.get(super_handle) else { unreachable!() };
        let super_methods = superclass.methods.clone();
        let mut growth = None;
        if let Obj::Class(subclass) = self.heap.get_mut(sub_handle) {
            let before = subclass.methods.capacity();
            subclass.methods.add_all(&super_methods);
            growth = Some((before, subclass.methods.capacity()));
        }
        if let Some((before, after)) = growth {
            self.heap.note_table_growth(sub_handle, before, after);
        }
        self.pop();
        Ok(())
    }

    // ---- calls --------------------------------------------------------------

    fn call_value(&mut self, callee: Value, argc: u8) -> Result<(), RuntimeError> {
        let Value::Obj(handle) = callee else {
            return Err(self.runtime_error("Can only call functions and classes.".to_string()));
        };
        match self.heap.get(handle) {
            Obj::Closure(_) => self.call(handle, argc),
            Obj::Native(n) => {
                let n = *n;
                self.call_native(n, argc)
            }
            Obj::Class(_) => self.call_class(handle, argc),
            Obj::BoundMethod(b) => {
                let receiver = b.receiver;
                let method = b.method;
                let base = self.stack.len() - argc as usize - 1;
                self.stack[base] = receiver;
                self.call(method, argc)
            }
            _ => Err(self.runtime_error("Can only call functions and classes.".to_string())),
        }
    }

    fn call(&mut self, closure_handle: Handle, argc: u8) -> Result<(), RuntimeError> {
        let Obj::Closure(c) = self.heap.get(closure_handle) else { unreachable!("expected closure") };
        let function_handle = c.function;
        let Obj::Function(f) = self.heap.get(function_handle) else { unreachable!("expected function") };
        let arity = f.arity;
        if argc != arity {
            return Err(self.runtime_error(format!("Expected {arity} arguments but got {argc}.")));
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow.".to_string()));
        }
        if self.stack.len() >= STACK_MAX {
            return Err(self.runtime_error("Stack overflow.".to_string()));
        }
        let slot_base = self.stack.len() - argc as usize - 1;
        self.frames.push(CallFrame { closure: closure_handle, ip: 0, slot_base });
        Ok(())
    }

    fn call_native(&mut self, native: NativeObj, argc: u8) -> Result<(), RuntimeError> {
        let start = self.stack.len() - argc as usize;
        let args: Vec<Value> = self.stack[start..].to_vec();
        match (native.func)(&args) {
            Ok(value) => {
                self.stack.truncate(start - 1);
                self.push(value);
                Ok(())
            }
            Err(message) => Err(self.runtime_error(message)),
        }
    }

    fn call_class(&mut self, class_handle: Handle, argc: u8) -> Result<(), RuntimeError> {
        self.maybe_collect(&[class_handle]);
        let instance_handle = self.heap.alloc_instance(InstanceObj { class: class_handle, fields: Table::new() });
        let base = self.stack.len() - argc as usize - 1;
        self.stack[base] = Value::Obj(instance_handle);

        let hash = self.heap.str_hash(self.init_string);
        let Obj::Class(c) = self.heap.get(class_handle) else { unreachable!("expected class") };
        match c.methods.get(self.init_string, hash) {
            Some(Value::Obj(init_handle)) => self.call(init_handle, argc),
            _ if argc != 0 => Err(self.runtime_error(format!("Expected 0 arguments but got {argc}."))),
            _ => Ok(()),
        }
    }

    fn invoke(&mut self, name: Handle, argc: u8) -> Result<(), RuntimeError> {
        let receiver = self.peek(argc as usize);
        let Value::Obj(inst_handle) = receiver else {
            return Err(self.runtime_error("Only instances have methods.".to_string()));
        };
        let hash = self.heap.str_hash(name);
        let Obj::Instance(inst) = self.heap.get(inst_handle) else {
            return Err(self.runtime_error("Only instances have methods.".to_string()));
        };
        if let Some(value) = inst.fields.get(name, hash) {
            let base = self.stack.len() - argc as usize - 1;
            self.stack[base] = value;
            return self.call_value(value, argc);
        }
        let class_handle = inst.class;
        self.invoke_from_class(class_handle, name, argc)
    }

    fn invoke_from_class(&mut self, class_handle: Handle, name: Handle, argc: u8) -> Result<(), RuntimeError> {
        let hash = self.heap.str_hash(name);
        let Obj::Class(c) = self.heap.get(class_handle) else { unreachable!("expected class") };
        match c.methods.get(name, hash) {
            Some(Value::Obj(method_handle)) => self.call(method_handle, argc),
            _ => Err(self.runtime_error(undefined_property(&self.heap, name))),
        }
    }

    // ---- closures/upvalues --------------------------------------------------

    fn op_closure(&mut self, idx: u8, descriptors: &[(bool, u8)]) {
        let Value::Obj(function_handle) = self.read_constant(idx) else {
            unreachable!("CLOSURE constant is not a function")
        };
        let frame_base = self.frames.last().unwrap().slot_base;
        let enclosing = self.frames.last().unwrap().closure;
        let mut upvalues = Vec::with_capacity(descriptors.len());
        for &(is_local, index) in descriptors {
            if is_local {
                upvalues.push(self.capture_upvalue(frame_base + index as usize));
            } else {
                let Obj::Closure(ec) = self.heap.get(enclosing) else { unreachable!() };
                upvalues.push(ec.upvalues[index as usize]);
            }
        }
        self.maybe_collect(&upvalues);
        let handle = self.heap.alloc_closure(ClosureObj { function: function_handle, upvalues });
        self.push(Value::Obj(handle));
    }

    /// Returns an existing open upvalue for `slot` if one is already being
    /// shared, otherwise allocates one and inserts it keeping
    /// `open_upvalues` sorted by decreasing stack slot.
    fn capture_upvalue(&mut self, slot: usize) -> Handle {
        for &h in &self.open_upvalues {
            if let Obj::Upvalue(UpvalueLoc::Open(loc)) = self.heap.get(h) {
                if *loc == slot {
                    return h;
                }
            }
        }
        self.maybe_collect(&[]);
        let handle = self.heap.alloc_upvalue(UpvalueLoc::Open(slot));
        let pos = self
            .open_upvalues
            .iter()
            .position(|&h| match self.heap.get(h) {
                Obj::Upvalue(UpvalueLoc::Open(loc)) => *loc < slot,
                _ => false,
            })
            .unwrap_or(self.open_upvalues.len());
        self.open_upvalues.insert(pos, handle);
        handle
    }

    fn close_upvalues(&mut self, from_slot: usize) {
        while let Some(&h) = self.open_upvalues.first() {
            let loc = match self.heap.get(h) {
                Obj::Upvalue(UpvalueLoc::Open(loc)) => *loc,
                _ => break,
            };
            if loc < from_slot {
                break;
            }
            let value = self.stack[loc];
            if let Obj::Upvalue(u) = self.heap.get_mut(h) {
                *u = UpvalueLoc::Closed(value);
            }
            self.open_upvalues.remove(0);
        }
    }

    fn read_upvalue(&self, slot: u8) -> Value {
        let closure = self.frames.last().unwrap().closure;
        let Obj::Closure(c) = self.heap.get(closure) else { unreachable!() };
        let handle = c.upvalues[slot as usize];
        match self.heap.get(handle) {
            Obj::Upvalue(UpvalueLoc::Open(loc)) => self.stack[*loc],
            Obj::Upvalue(UpvalueLoc::Closed(v)) => *v,
            _ => unreachable!("upvalue slot does not hold an upvalue"),
        }
    }

    fn write_upvalue(&mut self, slot: u8, value: Value) {
        let closure = self.frames.last().unwrap().closure;
        let Obj::Closure(c) = self.heap.get(closure) else { unreachable!() };
        let handle = c.upvalues[slot as usize];
        match self.heap.get(handle) {
            Obj::Upvalue(UpvalueLoc::Open(loc)) => {
                let loc = *loc;
                self.stack[loc] = value;
            }
            Obj::Upvalue(UpvalueLoc::Closed(_)) => {
                if let Obj::Upvalue(u) = self.heap.get_mut(handle) {
                    *u = UpvalueLoc::Closed(value);
                }
            }
            _ => unreachable!("upvalue slot does not hold an upvalue"),
        }
    }

    // ---- GC plumbing ----------------------------------------------------------

    fn maybe_collect(&mut self, extra: &[Handle]) {
        if !self.heap.should_collect() {
            return;
        }
        let frame_closures: Vec<Handle> = self.frames.iter().map(|f| f.closure).collect();
        let mut roots: Vec<Handle> = extra.to_vec();
        roots.push(self.init_string);
        self.heap.collect_garbage(&self.stack, &frame_closures, &self.open_upvalues, &self.globals, &[], &roots);
    }

    pub fn object_count(&self) -> usize {
        self.heap.object_count()
    }

    // ---- errors/tracing ---------------------------------------------------------

    fn runtime_error(&self, message: String) -> RuntimeError {
        let mut trace = Vec::with_capacity(self.frames.len());
        for frame in self.frames.iter().rev() {
            let Obj::Closure(c) = self.heap.get(frame.closure) else { unreachable!() };
            let Obj::Function(f) = self.heap.get(c.function) else { unreachable!() };
            let line = f.chunk.lines.get(frame.ip.saturating_sub(1)).copied().unwrap_or(0);
            let function_name = f.name.map(|h| self.heap.str_chars(h).to_string());
            trace.push(TraceFrame { line, function_name });
        }
        RuntimeError { message, trace }
    }

    fn trace_stack(&self) {
        print!("          ");
        for v in &self.stack {
            print!("[ {} ]", v.display(&self.heap));
        }
        println!();
    }

    fn trace_instruction(&self) {
        let frame = self.frames.last().unwrap();
        let chunk = self.chunk_of(frame.closure);
        disasm::disassemble_instruction_at(chunk, &self.heap, frame.ip, frame.ip);
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

fn undefined_variable(heap: &Heap, name: Handle) -> String {
    format!("Undefined variable '{}'.", heap.str_chars(name))
}

fn undefined_property(heap: &Heap, name: Handle) -> String {
    format!("Undefined property '{}'.", heap.str_chars(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_capture(source: &str) -> String {
        // Tests run single-threaded; stdout capture would need a harness
        // dependency the teacher doesn't carry, so scenario tests instead
        // live in tests/vm_tests.rs where `Command` can capture real stdout.
        let mut vm = VM::new();
        match vm.interpret(source) {
            Ok(()) => "ok".to_string(),
            Err(InterpretError::Compile(errs)) => format!("compile error: {:?}", errs),
            Err(InterpretError::Runtime(e)) => format!("runtime error: {}", e.message),
        }
    }

    #[test]
    fn arithmetic_runs_without_error() {
        assert_eq!(run_capture("print 1 + 2 * 3;"), "ok");
    }

    #[test]
    fn stack_is_empty_after_top_level_return() {
        let mut vm = VM::new();
        vm.interpret("var a = 1; { var b = 2; } print a;").unwrap_or(());
        assert_eq!(vm.stack.len(), 0);
        assert_eq!(vm.frames.len(), 0);
    }

    #[test]
    fn undefined_variable_is_a_runtime_error() {
        assert_eq!(run_capture("print x;"), "runtime error: Undefined variable 'x'.");
    }

    #[test]
    fn adding_number_and_string_is_a_runtime_error() {
        assert_eq!(
            run_capture("print 1 + \"a\";"),
            "runtime error: Operands must be two numbers or two strings."
        );
    }

    #[test]
    fn closures_share_mutable_captured_state() {
        let source = "fun makeCounter(){ var i=0; fun c(){ i=i+1; return i;} return c;} var c = makeCounter(); c(); c();";
        assert_eq!(run_capture(source), "ok");
    }

    #[test]
    fn classes_and_inheritance_run_without_error() {
        let source = "class A { greet(){ print \"A\"; } } class B < A { greet(){ super.greet(); print \"B\"; } } B().greet();";
        assert_eq!(run_capture(source), "ok");
    }

    #[test]
    fn string_interning_survives_a_collection() {
        let mut vm = VM::new();
        std::env::set_var("WISP_STRESS_GC", "1");
        vm.heap = Heap::new();
        let init_string = vm.heap.copy_string("init");
        vm.init_string = init_string;
        let result = vm.interpret("var a = \"hi\" + \"!\"; var b = \"hi!\"; print a == b;");
        std::env::remove_var("WISP_STRESS_GC");
        assert!(matches!(result, Ok(())));
    }
}
