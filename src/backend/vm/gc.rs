//! Tri-color precise mark-sweep collector (§4.4).
//!
//! Allocation-triggered: `VirtualMachine::maybe_collect` (in `mod.rs`) is
//! called at every heap-allocation call site inside the VM before handing
//! control to `Heap::alloc_*`, exactly the discipline §4.4/§5 describes —
//! there is no generic `reallocate` hook to centralize the check behind,
//! since `Heap` itself has no access to VM roots.

use crate::common::object::{Obj, ObjKind, obj_mut, obj_ref};
use crate::common::value::Value;

use super::VirtualMachine;

impl VirtualMachine {
    pub(crate) fn collect_garbage(&mut self) {
        let log = self.log_gc;
        if log {
            eprintln!(
                "[gc] begin collect (bytes_allocated={}, next_gc={})",
                self.heap.bytes_allocated, self.heap.next_gc
            );
        }

        self.mark_roots();
        self.trace_references();
        self.heap.strings.remove_white();
        self.heap.sweep(log);

        if log {
            eprintln!("[gc] end collect (bytes_allocated={})", self.heap.bytes_allocated);
        }
    }

    /// §4.4 Roots: VM stack, call-frame closures, open upvalues, the
    /// runtime globals table. The compiler keeps its own in-progress
    /// constants alive directly (§4.4 root 5) and never triggers collection
    /// itself, so there is nothing for this VM-side pass to add for it.
    fn mark_roots(&mut self) {
        for i in 0..self.stack_top {
            let value = self.stack[i];
            self.mark_value(value);
        }
        for frame in &self.frames {
            self.mark_object(frame.closure);
        }

        let mut upvalue = self.open_upvalues;
        while !upvalue.is_null() {
            self.mark_object(upvalue);
            upvalue = unsafe { obj_ref(upvalue) }.as_upvalue().next_open;
        }

        let globals_snapshot: Vec<(*mut Obj, Value)> = self.globals.iter().collect();
        for (key, value) in globals_snapshot {
            self.mark_object(key);
            self.mark_value(value);
        }

        // Kept alive so `--trace` (§6A) can still disassemble the most
        // recently compiled top-level chunk after its frame has returned.
        self.mark_object(self.last_function);

        // Cached by `Heap::new` and dereferenced by every class construction
        // (`call_class`) whether or not `"init"` appears in any chunk's
        // constant pool — it has no other root once a class with no `init`
        // method is the only thing still reaching it.
        self.mark_object(self.heap.init_string);
    }

    pub(crate) fn mark_value(&mut self, value: Value) {
        if let Some(ptr) = value.as_obj() {
            self.mark_object(ptr);
        }
    }

    pub(crate) fn mark_object(&mut self, ptr: *mut Obj) {
        if ptr.is_null() {
            return;
        }
        let header = &mut unsafe { obj_mut(ptr) }.header;
        if header.marked {
            return;
        }
        header.marked = true;
        self.gray_stack.push(ptr);
    }

    fn trace_references(&mut self) {
        while let Some(ptr) = self.gray_stack.pop() {
            self.blacken_object(ptr);
        }
    }

    /// §4.4 Blacken: marks every outgoing reference of one gray object.
    fn blacken_object(&mut self, ptr: *mut Obj) {
        let entries: Vec<(*mut Obj, Value)>;
        match &unsafe { obj_ref(ptr) }.kind {
            ObjKind::String(_) | ObjKind::Native(_) => return,
            ObjKind::Upvalue(u) => {
                let closed = u.closed;
                self.mark_value(closed);
                return;
            }
            ObjKind::Function(f) => {
                let name = f.name;
                let constants: Vec<Value> = f.chunk.constants.clone();
                if let Some(name) = name {
                    self.mark_object(name);
                }
                for c in constants {
                    self.mark_value(c);
                }
                return;
            }
            ObjKind::Closure(c) => {
                let function = c.function;
                let upvalues = c.upvalues.clone();
                self.mark_object(function);
                for up in upvalues {
                    self.mark_object(up);
                }
                return;
            }
            ObjKind::Class(c) => {
                let name = c.name;
                entries = c.methods.iter().collect();
                self.mark_object(name);
            }
            ObjKind::Instance(i) => {
                let class = i.class;
                entries = i.fields.iter().collect();
                self.mark_object(class);
            }
            ObjKind::BoundMethod(b) => {
                let receiver = b.receiver;
                let method = b.method;
                self.mark_value(receiver);
                self.mark_object(method);
                return;
            }
        }
        for (key, value) in entries {
            self.mark_object(key);
            self.mark_value(value);
        }
    }
}
