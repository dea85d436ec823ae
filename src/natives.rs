// File: src/natives.rs
//
// Host-provided native functions bound into globals at VM startup (spec.md
// §4.2). The teacher's `performance_now`/`time_us` pair this same
// `OnceLock<Instant>`-since-start idiom (see `builtins.rs`); `clock()` is
// the one native spec.md actually asks for.

use crate::heap::{Heap, NativeObj};
use crate::value::Value;
use std::sync::OnceLock;
use std::time::Instant;

fn program_start() -> Instant {
    static START: OnceLock<Instant> = OnceLock::new();
    *START.get_or_init(Instant::now)
}

fn clock(_args: &[Value]) -> Result<Value, String> {
    Ok(Value::Number(program_start().elapsed().as_secs_f64()))
}

/// Installs every native into `globals`, the way the VM's constructor wires
/// up its standard library before the first `interpret` call.
pub fn install(heap: &mut Heap, mut define: impl FnMut(&mut Heap, &'static str, Value)) {
    for &(name, arity, func) in NATIVES {
        let handle = heap.alloc_native(NativeObj { name, arity, func });
        define(heap, name, Value::Obj(handle));
    }
}

type NativeEntry = (&'static str, u8, crate::heap::NativeFn);

const NATIVES: &[NativeEntry] = &[("clock", 0, clock)];
