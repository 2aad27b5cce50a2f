// Myula VM heap
// Created by: Yuyang Feng <mu_yunaaaa@mail.nwpu.edu.cn>
//
// Allocator + string-intern table for every GC-managed object (§3, §4.4).
// Objects are boxed once via `Box::into_raw` and never moved again; the
// heap's `objects` field is the head of the intrusive singly-linked list
// the collector's sweep phase walks. Allocation here never triggers a
// collection itself — that check lives on `VirtualMachine` (backend::vm::gc)
// because a collection needs VM roots (stack, frames, open upvalues) that
// don't exist yet while the compiler is still running. The compiler instead
// keeps every constant it interns alive through its own owning `Chunk`.

use crate::common::chunk::Chunk;
use crate::common::hash::fnv1a;
use crate::common::object::{
    NativeArgType, NativeFn, Obj, ObjBoundMethod, ObjClass, ObjClosure, ObjFunction, ObjHeader,
    ObjInstance, ObjKind, ObjNative, ObjString, ObjUpvalue, obj_ref,
};
use crate::common::table::Table;
use crate::common::value::Value;

pub struct Heap {
    pub objects: *mut Obj,
    pub strings: Table,
    pub bytes_allocated: usize,
    pub next_gc: usize,
    pub init_string: *mut Obj,
}

const INITIAL_NEXT_GC: usize = 1024 * 1024;

impl Heap {
    pub fn new() -> Self {
        let mut heap = Heap {
            objects: std::ptr::null_mut(),
            strings: Table::new(),
            bytes_allocated: 0,
            next_gc: INITIAL_NEXT_GC,
            init_string: std::ptr::null_mut(),
        };
        heap.init_string = heap.intern_string("init");
        heap
    }

    fn register(&mut self, kind: ObjKind, size: usize) -> *mut Obj {
        let obj = Box::new(Obj { header: ObjHeader { marked: false, next: self.objects }, kind });
        let ptr = Box::into_raw(obj);
        self.objects = ptr;
        self.bytes_allocated += size;
        ptr
    }

    /// Interns `text`, returning the canonical `ObjString` pointer — either
    /// an existing one or a freshly allocated one (§4.5 find_string).
    pub fn intern_string(&mut self, text: &str) -> *mut Obj {
        let hash = fnv1a(text.as_bytes());
        if let Some(existing) = self.strings.find_string(text, hash) {
            return existing;
        }
        let size = std::mem::size_of::<Obj>() + text.len();
        let ptr = self.register(ObjKind::String(ObjString { hash, data: text.to_string() }), size);
        self.strings.set(ptr, Value::Nil);
        ptr
    }

    /// Same as `intern_string`, but takes ownership of an already-built
    /// `String` (the `ADD`-concatenation path, so the new buffer isn't
    /// copied twice when it turns out not to already be interned).
    pub fn intern_owned_string(&mut self, text: String) -> *mut Obj {
        let hash = fnv1a(text.as_bytes());
        if let Some(existing) = self.strings.find_string(&text, hash) {
            return existing;
        }
        let size = std::mem::size_of::<Obj>() + text.len();
        let ptr = self.register(ObjKind::String(ObjString { hash, data: text }), size);
        self.strings.set(ptr, Value::Nil);
        ptr
    }

    pub fn alloc_function(&mut self) -> *mut Obj {
        let size = std::mem::size_of::<Obj>() + std::mem::size_of::<ObjFunction>();
        self.register(
            ObjKind::Function(ObjFunction {
                arity: 0,
                upvalue_count: 0,
                chunk: Chunk::new(),
                name: None,
            }),
            size,
        )
    }

    pub fn alloc_closure(&mut self, function: *mut Obj, upvalues: Vec<*mut Obj>) -> *mut Obj {
        let size = std::mem::size_of::<Obj>() + upvalues.capacity() * std::mem::size_of::<*mut Obj>();
        self.register(ObjKind::Closure(ObjClosure { function, upvalues }), size)
    }

    pub fn alloc_native(
        &mut self,
        name: &'static str,
        arity: u8,
        arg_types: Vec<NativeArgType>,
        function: NativeFn,
    ) -> *mut Obj {
        let size = std::mem::size_of::<Obj>();
        self.register(ObjKind::Native(ObjNative { name, arity, arg_types, function }), size)
    }

    pub fn alloc_class(&mut self, name: *mut Obj) -> *mut Obj {
        let size = std::mem::size_of::<Obj>();
        self.register(ObjKind::Class(ObjClass { name, methods: Table::new() }), size)
    }

    pub fn alloc_instance(&mut self, class: *mut Obj) -> *mut Obj {
        let size = std::mem::size_of::<Obj>();
        self.register(ObjKind::Instance(ObjInstance { class, fields: Table::new() }), size)
    }

    pub fn alloc_bound_method(&mut self, receiver: Value, method: *mut Obj) -> *mut Obj {
        let size = std::mem::size_of::<Obj>();
        self.register(ObjKind::BoundMethod(ObjBoundMethod { receiver, method }), size)
    }

    pub fn alloc_upvalue(&mut self, location: *mut Value) -> *mut Obj {
        let size = std::mem::size_of::<Obj>();
        self.register(
            ObjKind::Upvalue(ObjUpvalue { location, closed: Value::Nil, next_open: std::ptr::null_mut() }),
            size,
        )
    }

    /// Walks the intrusive allocation list, unlinking and freeing every
    /// object whose mark bit is still clear, then clears the bit on every
    /// survivor (§4.4 Sweep).
    pub fn sweep(&mut self, log: bool) {
        let mut previous: *mut Obj = std::ptr::null_mut();
        let mut current = self.objects;
        while !current.is_null() {
            let next = unsafe { (*current).header.next };
            if unsafe { (*current).header.marked } {
                unsafe { (*current).header.marked = false };
                previous = current;
            } else {
                if previous.is_null() {
                    self.objects = next;
                } else {
                    unsafe { (*previous).header.next = next };
                }
                if log {
                    let obj = unsafe { obj_ref(current) };
                    eprintln!("[gc] free {:p} kind={}", current, obj.type_name());
                }
                let freed = Self::object_size(current);
                self.bytes_allocated = self.bytes_allocated.saturating_sub(freed);
                unsafe { drop(Box::from_raw(current)) };
            }
            current = next;
        }
        self.next_gc = self.bytes_allocated * 2;
        if self.next_gc < INITIAL_NEXT_GC {
            self.next_gc = INITIAL_NEXT_GC;
        }
    }

    fn object_size(ptr: *mut Obj) -> usize {
        let obj = unsafe { obj_ref(ptr) };
        let base = std::mem::size_of::<Obj>();
        match &obj.kind {
            ObjKind::String(s) => base + s.data.len(),
            ObjKind::Closure(c) => base + c.upvalues.capacity() * std::mem::size_of::<*mut Obj>(),
            _ => base,
        }
    }

    /// Frees every object still linked (used when the VM itself is torn
    /// down, so the process doesn't have to wait for a final collection to
    /// reclaim heap memory).
    pub fn free_all(&mut self) {
        let mut current = self.objects;
        while !current.is_null() {
            let next = unsafe { (*current).header.next };
            unsafe { drop(Box::from_raw(current)) };
            current = next;
        }
        self.objects = std::ptr::null_mut();
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        self.free_all();
    }
}
