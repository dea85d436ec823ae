// File: src/disasm.rs
//
// Pure instruction-printer used only for debugging (spec.md §1 lists the
// disassembler as an external collaborator, not part of the compiler/VM
// control flow). Enabled per-instruction via `WISP_TRACE_EXEC`, read once
// through a `OnceLock` the way the teacher gates its own debug toggles.

use crate::chunk::Chunk;
use crate::heap::Heap;
use crate::opcode::OpCode;
use std::sync::OnceLock;

pub fn trace_exec_enabled() -> bool {
    static FLAG: OnceLock<bool> = OnceLock::new();
    *FLAG.get_or_init(|| std::env::var("WISP_TRACE_EXEC").is_ok())
}

pub fn disassemble_chunk(chunk: &Chunk, heap: &Heap, name: &str) {
    println!("== {name} ==");
    let mut offset = 0;
    for (index, op) in chunk.code.iter().enumerate() {
        disassemble_instruction_at(chunk, heap, index, offset);
        offset += 1;
        let _ = op;
    }
}

/// Prints one instruction, suppressing the line number when it repeats the
/// previous instruction's (the "adjacent-equal suppression" spec.md §3
/// describes for the line table).
pub fn disassemble_instruction_at(chunk: &Chunk, heap: &Heap, index: usize, _offset: usize) {
    print!("{index:04} ");
    if index > 0 && chunk.lines[index] == chunk.lines[index - 1] {
        print!("   | ");
    } else {
        print!("{:4} ", chunk.lines[index]);
    }
    println!("{}", format_instruction(&chunk.code[index], chunk, heap));
}

pub fn format_instruction(op: &OpCode, chunk: &Chunk, heap: &Heap) -> String {
    match op {
        OpCode::Constant(idx) => {
            format!("{:-16} {:4} '{}'", op.name(), idx, display_constant(chunk, heap, *idx))
        }
        OpCode::GetLocal(slot)
        | OpCode::SetLocal(slot)
        | OpCode::GetUpvalue(slot)
        | OpCode::SetUpvalue(slot) => format!("{:-16} {:4}", op.name(), slot),
        OpCode::GetGlobal(idx)
        | OpCode::DefineGlobal(idx)
        | OpCode::SetGlobal(idx)
        | OpCode::GetProperty(idx)
        | OpCode::SetProperty(idx)
        | OpCode::GetSuper(idx)
        | OpCode::Method(idx)
        | OpCode::Class(idx) => {
            format!("{:-16} {:4} '{}'", op.name(), idx, display_constant(chunk, heap, *idx))
        }
        OpCode::Jump(off) | OpCode::JumpIfFalse(off) => {
            format!("{:-16} {:4}", op.name(), off)
        }
        OpCode::Loop(off) => format!("{:-16} {:4}", op.name(), off),
        OpCode::Call(argc) => format!("{:-16} {:4}", op.name(), argc),
        OpCode::Invoke(idx, argc) | OpCode::SuperInvoke(idx, argc) => {
            format!("{:-16} ({} args) {:4} '{}'", op.name(), argc, idx, display_constant(chunk, heap, *idx))
        }
        OpCode::Closure(idx, upvalues) => {
            format!(
                "{:-16} {:4} '{}' ({} upvalue{})",
                op.name(),
                idx,
                display_constant(chunk, heap, *idx),
                upvalues.len(),
                if upvalues.len() == 1 { "" } else { "s" }
            )
        }
        _ => op.name().to_string(),
    }
}

fn display_constant(chunk: &Chunk, heap: &Heap, idx: u8) -> String {
    chunk
        .constants
        .get(idx as usize)
        .map(|v| v.display(heap))
        .unwrap_or_else(|| "<out of range>".to_string())
}
