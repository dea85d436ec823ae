// File: src/heap.rs
//
// The managed heap: every object that outlives a single expression lives
// here, addressed by a `Handle` rather than a Rust reference. This is the
// "arena of typed objects keyed by integer handles" shape an ownership
// language needs in place of clox's intrusive `Obj*` linked list — marking
// flips a bit on the slot instead of chasing a raw pointer.

use crate::chunk::Chunk;
use crate::value::Value;

/// A reference to a heap-allocated object. Two handles are equal iff they
/// name the same slot, which — because strings are interned — means two
/// equal-content strings always share one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

/// Where an open upvalue's variable currently lives.
#[derive(Debug, Clone, Copy)]
pub enum UpvalueLoc {
    /// Still on the VM's value stack, at this slot index.
    Open(usize),
    /// Copied off the stack; the value lives with the upvalue itself.
    Closed(Value),
}

#[derive(Debug, Clone)]
pub struct StrObj {
    pub chars: String,
    pub hash: u32,
}

#[derive(Debug, Clone)]
pub struct FunctionObj {
    pub name: Option<Handle>,
    pub arity: u8,
    pub upvalue_count: u8,
    pub chunk: Chunk,
}

pub type NativeFn = fn(&[Value]) -> Result<Value, String>;

#[derive(Clone, Copy)]
pub struct NativeObj {
    pub name: &'static str,
    pub arity: u8,
    pub func: NativeFn,
}

impl std::fmt::Debug for NativeObj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<native {}>", self.name)
    }
}

#[derive(Debug, Clone)]
pub struct ClosureObj {
    pub function: Handle,
    pub upvalues: Vec<Handle>,
}

#[derive(Debug, Clone)]
pub struct ClassObj {
    pub name: Handle,
    pub methods: Table,
}

#[derive(Debug, Clone)]
pub struct InstanceObj {
    pub class: Handle,
    pub fields: Table,
}

#[derive(Debug, Clone)]
pub struct BoundMethodObj {
    pub receiver: Value,
    pub method: Handle,
}

#[derive(Debug, Clone)]
pub enum Obj {
    Str(StrObj),
    Function(FunctionObj),
    Native(NativeObj),
    Upvalue(UpvalueLoc),
    Closure(ClosureObj),
    Class(ClassObj),
    Instance(InstanceObj),
    BoundMethod(BoundMethodObj),
}

impl Obj {
    pub fn type_name(&self) -> &'static str {
        match self {
            Obj::Str(_) => "string",
            Obj::Function(_) => "function",
            Obj::Native(_) => "native",
            Obj::Upvalue(_) => "upvalue",
            Obj::Closure(_) => "closure",
            Obj::Class(_) => "class",
            Obj::Instance(_) => "instance",
            Obj::BoundMethod(_) => "bound method",
        }
    }
}

struct Slot {
    marked: bool,
    /// Bytes charged to `bytes_allocated` for this object: the size at
    /// alloc time plus every `note_table_growth` delta since. Sweeping
    /// subtracts exactly this, so growth after allocation (an instance's
    /// fields, a class's methods) never desyncs the running total.
    size: usize,
    obj: Obj,
}

/// An FNV-1a-32 hasher over raw bytes, matching the field every `StrObj`
/// carries.
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Approximate bytes per `Table` bucket, for `Heap` byte accounting.
const TABLE_ENTRY_BYTES: usize = 24;

/// Open-addressed hash table, String-keyed, used for globals, the intern
/// table, class method tables, and instance field tables. Power-of-two
/// capacity, load factor 0.75, linear probing, tombstone deletion — see
/// `Entry` for the exact sentinel encoding.
#[derive(Debug, Clone)]
pub struct Table {
    entries: Vec<Entry>,
    count: usize,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    /// `None` + `Value::Bool(true)` is a tombstone; `None` + `Value::Nil`
    /// is a never-used slot. Probing skips the former, stops at the latter.
    key: Option<Handle>,
    /// Cached so resizing and lookups never need to dereference `key` back
    /// into the heap — a `Table` living inside a heap-allocated class or
    /// instance would otherwise need simultaneous read/write access to the
    /// very arena it lives in.
    hash: u32,
    value: Value,
}

const TABLE_MAX_LOAD: f64 = 0.75;

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    pub fn new() -> Self {
        Table { entries: Vec::new(), count: 0 }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Backing-array size in slots (0 until the first insert grows it).
    /// Used to charge table growth against `Heap::bytes_allocated` for
    /// tables embedded in a managed object (a class's methods, an
    /// instance's fields) rather than the len-based approximation, which
    /// drifts once a table grows past its allocation-time size.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn grow_capacity(capacity: usize) -> usize {
        if capacity < 8 { 8 } else { capacity * 2 }
    }

    fn find_entry(entries: &[Entry], capacity: usize, hash: u32, key: Handle) -> usize {
        let mut index = (hash as usize) & (capacity - 1);
        let mut tombstone: Option<usize> = None;
        loop {
            let entry = &entries[index];
            match entry.key {
                None => {
                    if matches!(entry.value, Value::Nil) {
                        return tombstone.unwrap_or(index);
                    } else if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Some(k) if k == key => return index,
                _ => {}
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    fn adjust_capacity(&mut self, capacity: usize) {
        let mut entries = vec![Entry { key: None, hash: 0, value: Value::Nil }; capacity];
        let mut count = 0;
        for entry in &self.entries {
            if let Some(key) = entry.key {
                let dest = Self::find_entry(&entries, capacity, entry.hash, key);
                entries[dest] = Entry { key: Some(key), hash: entry.hash, value: entry.value };
                count += 1;
            }
        }
        self.entries = entries;
        self.count = count;
    }

    pub fn get(&self, key: Handle, hash: u32) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let index = Self::find_entry(&self.entries, self.entries.len(), hash, key);
        self.entries[index].key.map(|_| self.entries[index].value)
    }

    /// Returns true if this created a brand-new entry (as opposed to
    /// overwriting an existing one).
    pub fn set(&mut self, key: Handle, hash: u32, value: Value) -> bool {
        if (self.count + 1) as f64 > self.entries.len() as f64 * TABLE_MAX_LOAD {
            let capacity = Self::grow_capacity(self.entries.len());
            self.adjust_capacity(capacity);
        }
        let index = Self::find_entry(&self.entries, self.entries.len(), hash, key);
        let entry = &mut self.entries[index];
        let is_new = entry.key.is_none();
        if is_new && matches!(entry.value, Value::Nil) {
            self.count += 1;
        }
        entry.key = Some(key);
        entry.hash = hash;
        entry.value = value;
        is_new
    }

    pub fn delete(&mut self, key: Handle, hash: u32) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = Self::find_entry(&self.entries, self.entries.len(), hash, key);
        if self.entries[index].key.is_none() {
            return false;
        }
        self.entries[index] = Entry { key: None, hash: 0, value: Value::Bool(true) };
        true
    }

    pub fn add_all(&mut self, from: &Table) {
        for entry in &from.entries {
            if let Some(key) = entry.key {
                self.set(key, entry.hash, entry.value);
            }
        }
    }

    /// Content-based lookup used during string interning, before a
    /// candidate string has been allocated a handle.
    pub fn find_string(&self, heap: &Heap, chars: &str, hash: u32) -> Option<Handle> {
        if self.count == 0 {
            return None;
        }
        let capacity = self.entries.len();
        let mut index = (hash as usize) & (capacity - 1);
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None if matches!(entry.value, Value::Nil) => return None,
                Some(k) => {
                    let s = heap.as_str(k);
                    if s.hash == hash && s.chars == chars {
                        return Some(k);
                    }
                }
                None => {}
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (Handle, u32, Value)> + '_ {
        self.entries.iter().filter_map(|e| e.key.map(|k| (k, e.hash, e.value)))
    }

    pub fn keys(&self) -> impl Iterator<Item = Handle> + '_ {
        self.entries.iter().filter_map(|e| e.key)
    }
}

/// The garbage-collected heap: an arena of objects plus the intern table
/// and the byte-accounting used to schedule collections.
pub struct Heap {
    slots: Vec<Option<Slot>>,
    free_list: Vec<u32>,
    pub strings: Table,
    bytes_allocated: usize,
    next_gc: usize,
    stress_gc: bool,
}

const INITIAL_NEXT_GC: usize = 1024 * 1024;

impl Heap {
    pub fn new() -> Self {
        Heap {
            slots: Vec::new(),
            free_list: Vec::new(),
            strings: Table::new(),
            bytes_allocated: 0,
            next_gc: INITIAL_NEXT_GC,
            stress_gc: stress_gc_enabled(),
        }
    }

    pub fn should_collect(&self) -> bool {
        self.stress_gc || self.bytes_allocated > self.next_gc
    }

    fn approx_size(obj: &Obj) -> usize {
        match obj {
            Obj::Str(s) => 24 + s.chars.len(),
            Obj::Function(f) => 64 + f.chunk.code.len() * 8 + f.chunk.constants.len() * 16,
            Obj::Native(_) => 24,
            Obj::Upvalue(_) => 24,
            Obj::Closure(c) => 16 + c.upvalues.len() * 4,
            Obj::Class(c) => 32 + c.methods.capacity() * TABLE_ENTRY_BYTES,
            Obj::Instance(i) => 32 + i.fields.capacity() * TABLE_ENTRY_BYTES,
            Obj::BoundMethod(_) => 24,
        }
    }

    fn alloc(&mut self, obj: Obj) -> Handle {
        let size = Self::approx_size(&obj);
        self.bytes_allocated += size;
        let slot = Slot { marked: false, size, obj };
        if let Some(index) = self.free_list.pop() {
            self.slots[index as usize] = Some(slot);
            Handle(index)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Some(slot));
            Handle(index)
        }
    }

    /// Charges growth of an object's embedded table (an instance's fields,
    /// a class's methods) against `bytes_allocated` after the fact, since
    /// `alloc` only ever sees the table's size at construction time.
    pub fn note_table_growth(&mut self, handle: Handle, before_capacity: usize, after_capacity: usize) {
        if after_capacity <= before_capacity {
            return;
        }
        let delta = (after_capacity - before_capacity) * TABLE_ENTRY_BYTES;
        self.bytes_allocated += delta;
        if let Some(slot) = self.slots[handle.0 as usize].as_mut() {
            slot.size += delta;
        }
    }

    pub fn alloc_function(&mut self, f: FunctionObj) -> Handle {
        self.alloc(Obj::Function(f))
    }

    pub fn alloc_native(&mut self, n: NativeObj) -> Handle {
        self.alloc(Obj::Native(n))
    }

    pub fn alloc_upvalue(&mut self, loc: UpvalueLoc) -> Handle {
        self.alloc(Obj::Upvalue(loc))
    }

    pub fn alloc_closure(&mut self, c: ClosureObj) -> Handle {
        self.alloc(Obj::Closure(c))
    }

    pub fn alloc_class(&mut self, c: ClassObj) -> Handle {
        self.alloc(Obj::Class(c))
    }

    pub fn alloc_instance(&mut self, i: InstanceObj) -> Handle {
        self.alloc(Obj::Instance(i))
    }

    pub fn alloc_bound_method(&mut self, b: BoundMethodObj) -> Handle {
        self.alloc(Obj::BoundMethod(b))
    }

    /// Copy-from-borrowed string construction; interns.
    pub fn copy_string(&mut self, s: &str) -> Handle {
        let hash = fnv1a_hash(s.as_bytes());
        if let Some(h) = self.strings.find_string(self, s, hash) {
            return h;
        }
        let handle = self.alloc(Obj::Str(StrObj { chars: s.to_owned(), hash }));
        self.strings.set(handle, hash, Value::Nil);
        handle
    }

    /// Adopt-an-owned-buffer construction; interns, discarding the buffer
    /// if an equal string already exists.
    pub fn take_string(&mut self, s: String) -> Handle {
        let hash = fnv1a_hash(s.as_bytes());
        if let Some(h) = self.strings.find_string(self, &s, hash) {
            return h;
        }
        let handle = self.alloc(Obj::Str(StrObj { chars: s, hash }));
        self.strings.set(handle, hash, Value::Nil);
        handle
    }

    pub fn get(&self, h: Handle) -> &Obj {
        &self.slots[h.0 as usize].as_ref().expect("dangling handle").obj
    }

    pub fn get_mut(&mut self, h: Handle) -> &mut Obj {
        &mut self.slots[h.0 as usize].as_mut().expect("dangling handle").obj
    }

    pub fn as_str(&self, h: Handle) -> &StrObj {
        match self.get(h) {
            Obj::Str(s) => s,
            other => panic!("expected string object, found {}", other.type_name()),
        }
    }

    pub fn str_hash(&self, h: Handle) -> u32 {
        self.as_str(h).hash
    }

    pub fn str_chars(&self, h: Handle) -> &str {
        &self.as_str(h).chars
    }

    pub fn is_marked(&self, h: Handle) -> bool {
        self.slots[h.0 as usize].as_ref().map(|s| s.marked).unwrap_or(false)
    }

    pub fn mark_handle(&mut self, h: Handle, gray: &mut Vec<Handle>) {
        if let Some(slot) = self.slots[h.0 as usize].as_mut() {
            if !slot.marked {
                slot.marked = true;
                gray.push(h);
            }
        }
    }

    pub fn mark_value(&mut self, v: &Value, gray: &mut Vec<Handle>) {
        if let Value::Obj(h) = v {
            self.mark_handle(*h, gray);
        }
    }

    /// Pushes every value/handle `h` directly references onto the gray
    /// worklist via `mark_value`/`mark_handle`. Each arm explicitly
    /// terminates — no case is left to fall through into the next.
    fn blacken(&mut self, h: Handle, gray: &mut Vec<Handle>) {
        let refs: Vec<Value> = match self.get(h) {
            Obj::Str(_) => Vec::new(),
            Obj::Native(_) => Vec::new(),
            Obj::Function(f) => {
                let mut refs: Vec<Value> = f.name.into_iter().map(Value::Obj).collect();
                refs.extend(f.chunk.constants.iter().copied());
                refs
            }
            Obj::Upvalue(loc) => match loc {
                UpvalueLoc::Closed(v) => vec![*v],
                UpvalueLoc::Open(_) => Vec::new(),
            },
            Obj::Closure(c) => {
                let mut refs = vec![Value::Obj(c.function)];
                refs.extend(c.upvalues.iter().map(|u| Value::Obj(*u)));
                refs
            }
            Obj::Class(c) => {
                let mut refs = vec![Value::Obj(c.name)];
                for (key, _, value) in c.methods.entries() {
                    refs.push(Value::Obj(key));
                    refs.push(value);
                }
                refs
            }
            Obj::Instance(i) => {
                let mut refs = vec![Value::Obj(i.class)];
                for (key, _, value) in i.fields.entries() {
                    refs.push(Value::Obj(key));
                    refs.push(value);
                }
                refs
            }
            Obj::BoundMethod(b) => vec![b.receiver, Value::Obj(b.method)],
        };
        for v in refs {
            self.mark_value(&v, gray);
        }
    }

    fn sweep(&mut self) {
        for index in 0..self.slots.len() {
            let marked = match &mut self.slots[index] {
                Some(slot) => {
                    if slot.marked {
                        slot.marked = false;
                        true
                    } else {
                        false
                    }
                }
                None => continue,
            };
            if !marked {
                let freed = self.slots[index].take().unwrap().size;
                self.bytes_allocated -= freed;
                self.free_list.push(index as u32);
            }
        }
    }

    /// Runs one full mark-sweep cycle. Roots come from the caller (the VM
    /// owns the value stack/frames/globals; the compiler owns its
    /// in-progress function chain) since the heap itself has no notion of
    /// either.
    pub fn collect_garbage(
        &mut self,
        stack: &[Value],
        frame_closures: &[Handle],
        open_upvalues: &[Handle],
        globals: &Table,
        compiler_roots: &[Handle],
        extra: &[Handle],
    ) {
        let mut gray: Vec<Handle> = Vec::new();
        for v in stack {
            self.mark_value(v, &mut gray);
        }
        for &h in frame_closures {
            self.mark_handle(h, &mut gray);
        }
        for &h in open_upvalues {
            self.mark_handle(h, &mut gray);
        }
        let global_entries: Vec<(Handle, Value)> = globals.entries().map(|(k, _, v)| (k, v)).collect();
        for (k, v) in global_entries {
            self.mark_handle(k, &mut gray);
            self.mark_value(&v, &mut gray);
        }
        for &h in compiler_roots {
            self.mark_handle(h, &mut gray);
        }
        for &h in extra {
            self.mark_handle(h, &mut gray);
        }
        while let Some(h) = gray.pop() {
            self.blacken(h, &mut gray);
        }
        self.intern_remove_white();
        self.sweep();
        self.next_gc = self.bytes_allocated * 2;
    }

    /// Drops every intern-table entry whose string turned out to be
    /// unreachable, so a dead string doesn't stay pinned forever.
    fn intern_remove_white(&mut self) {
        let dead: Vec<Handle> = self.strings.keys().filter(|&k| !self.is_marked(k)).collect();
        for key in dead {
            let hash = self.str_hash(key);
            self.strings.delete(key, hash);
        }
    }

    pub fn object_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

fn stress_gc_enabled() -> bool {
    static FLAG: once_cell::sync::OnceCell<bool> = once_cell::sync::OnceCell::new();
    *FLAG.get_or_init(|| std::env::var("WISP_STRESS_GC").is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_starts_empty_and_grows_on_first_insert() {
        let mut heap = Heap::new();
        let key = heap.copy_string("a");
        let mut table = Table::new();
        assert_eq!(table.len(), 0);
        table.set(key, heap.str_hash(key), Value::Number(1.0));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(key, heap.str_hash(key)), Some(Value::Number(1.0)));
    }

    #[test]
    fn delete_then_reuses_tombstone_on_insert() {
        let mut heap = Heap::new();
        let a = heap.copy_string("a");
        let b = heap.copy_string("b");
        let mut table = Table::new();
        table.set(a, heap.str_hash(a), Value::Number(1.0));
        assert!(table.delete(a, heap.str_hash(a)));
        assert_eq!(table.get(a, heap.str_hash(a)), None);
        // Re-inserting a different key should not be blocked by the tombstone.
        table.set(b, heap.str_hash(b), Value::Number(2.0));
        assert_eq!(table.get(b, heap.str_hash(b)), Some(Value::Number(2.0)));
    }

    #[test]
    fn probing_skips_tombstones_to_find_later_entries() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let keys: Vec<Handle> = (0..16).map(|i| heap.copy_string(&format!("k{i}"))).collect();
        for (i, &k) in keys.iter().enumerate() {
            table.set(k, heap.str_hash(k), Value::Number(i as f64));
        }
        // Delete every other key, then confirm the survivors are still reachable.
        for &k in keys.iter().step_by(2) {
            table.delete(k, heap.str_hash(k));
        }
        for (i, &k) in keys.iter().enumerate() {
            let expected = if i % 2 == 0 { None } else { Some(Value::Number(i as f64)) };
            assert_eq!(table.get(k, heap.str_hash(k)), expected);
        }
    }

    #[test]
    fn copy_string_interns_equal_contents() {
        let mut heap = Heap::new();
        let a = heap.copy_string("hello");
        let b = heap.copy_string("hello");
        assert_eq!(a, b);
    }

    #[test]
    fn take_string_discards_buffer_when_already_interned() {
        let mut heap = Heap::new();
        let a = heap.copy_string("hello");
        let b = heap.take_string("hello".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn unreachable_objects_are_freed_after_collection() {
        let mut heap = Heap::new();
        let garbage = heap.copy_string("garbage");
        let _ = garbage;
        let before = heap.object_count();
        heap.collect_garbage(&[], &[], &[], &Table::new(), &[], &[]);
        assert!(heap.object_count() < before);
    }

    #[test]
    fn reachable_objects_survive_collection() {
        let mut heap = Heap::new();
        let kept = heap.copy_string("kept");
        heap.collect_garbage(&[Value::Obj(kept)], &[], &[], &Table::new(), &[], &[]);
        assert_eq!(heap.str_chars(kept), "kept");
    }

    #[test]
    fn fnv1a_matches_known_vector() {
        // FNV-1a-32 of the empty string is the offset basis itself.
        assert_eq!(fnv1a_hash(b""), 2166136261);
    }
}
