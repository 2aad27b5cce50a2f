//! Heap-object model (§3 DATA MODEL).
//!
//! Every GC-managed value is an `Obj`: a shared header (mark bit + intrusive
//! `next` pointer into the heap's allocation list) plus a `kind`-tagged
//! payload, one variant per object type the language knows about. Objects
//! are allocated on the Rust heap via `Box::into_raw` and live at a fixed
//! address for their whole lifetime; the collector frees them with
//! `Box::from_raw` during sweep. See `backend::vm::heap` for the allocator
//! and `backend::vm::gc` for the tracer.

use crate::common::chunk::Chunk;
use crate::common::table::Table;
use crate::common::value::Value;

pub struct ObjHeader {
    pub marked: bool,
    pub next: *mut Obj,
}

pub struct Obj {
    pub header: ObjHeader,
    pub kind: ObjKind,
}

pub enum ObjKind {
    String(ObjString),
    Upvalue(ObjUpvalue),
    Function(ObjFunction),
    Closure(ObjClosure),
    Native(ObjNative),
    Class(ObjClass),
    Instance(ObjInstance),
    BoundMethod(ObjBoundMethod),
}

pub struct ObjString {
    pub hash: u32,
    pub data: String,
}

/// `location` points into the live VM stack while open, and at this same
/// object's `closed` field once the backing slot has been popped (§4.3
/// close_upvalues). `next_open` links the VM's sorted open-upvalue list and
/// is meaningless once the upvalue is closed.
pub struct ObjUpvalue {
    pub location: *mut Value,
    pub closed: Value,
    pub next_open: *mut Obj,
}

pub struct ObjFunction {
    pub arity: u8,
    pub upvalue_count: u8,
    pub chunk: Chunk,
    pub name: Option<*mut Obj>,
}

pub struct ObjClosure {
    pub function: *mut Obj,
    pub upvalues: Vec<*mut Obj>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NativeArgType {
    Number,
    String,
    Any,
}

pub type NativeFn = fn(&[Value]) -> Result<Value, String>;

pub struct ObjNative {
    pub name: &'static str,
    pub arity: u8,
    pub arg_types: Vec<NativeArgType>,
    pub function: NativeFn,
}

pub struct ObjClass {
    pub name: *mut Obj,
    pub methods: Table,
}

pub struct ObjInstance {
    pub class: *mut Obj,
    pub fields: Table,
}

pub struct ObjBoundMethod {
    pub receiver: Value,
    pub method: *mut Obj,
}

impl Obj {
    pub fn as_string(&self) -> &ObjString {
        match &self.kind {
            ObjKind::String(s) => s,
            _ => panic!("Obj::as_string called on a non-string object"),
        }
    }

    pub fn as_function(&self) -> &ObjFunction {
        match &self.kind {
            ObjKind::Function(f) => f,
            _ => panic!("Obj::as_function called on a non-function object"),
        }
    }

    pub fn as_function_mut(&mut self) -> &mut ObjFunction {
        match &mut self.kind {
            ObjKind::Function(f) => f,
            _ => panic!("Obj::as_function_mut called on a non-function object"),
        }
    }

    pub fn as_closure(&self) -> &ObjClosure {
        match &self.kind {
            ObjKind::Closure(c) => c,
            _ => panic!("Obj::as_closure called on a non-closure object"),
        }
    }

    pub fn as_upvalue(&self) -> &ObjUpvalue {
        match &self.kind {
            ObjKind::Upvalue(u) => u,
            _ => panic!("Obj::as_upvalue called on a non-upvalue object"),
        }
    }

    pub fn as_upvalue_mut(&mut self) -> &mut ObjUpvalue {
        match &mut self.kind {
            ObjKind::Upvalue(u) => u,
            _ => panic!("Obj::as_upvalue_mut called on a non-upvalue object"),
        }
    }

    pub fn as_class(&self) -> &ObjClass {
        match &self.kind {
            ObjKind::Class(c) => c,
            _ => panic!("Obj::as_class called on a non-class object"),
        }
    }

    pub fn as_class_mut(&mut self) -> &mut ObjClass {
        match &mut self.kind {
            ObjKind::Class(c) => c,
            _ => panic!("Obj::as_class_mut called on a non-class object"),
        }
    }

    pub fn as_instance(&self) -> &ObjInstance {
        match &self.kind {
            ObjKind::Instance(i) => i,
            _ => panic!("Obj::as_instance called on a non-instance object"),
        }
    }

    pub fn as_instance_mut(&mut self) -> &mut ObjInstance {
        match &mut self.kind {
            ObjKind::Instance(i) => i,
            _ => panic!("Obj::as_instance_mut called on a non-instance object"),
        }
    }

    pub fn as_bound_method(&self) -> &ObjBoundMethod {
        match &self.kind {
            ObjKind::BoundMethod(b) => b,
            _ => panic!("Obj::as_bound_method called on a non-bound-method object"),
        }
    }

    pub fn as_native(&self) -> &ObjNative {
        match &self.kind {
            ObjKind::Native(n) => n,
            _ => panic!("Obj::as_native called on a non-native object"),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ObjKind::String(_) => "string",
            ObjKind::Upvalue(_) => "upvalue",
            ObjKind::Function(_) => "function",
            ObjKind::Closure(_) => "closure",
            ObjKind::Native(_) => "native fn",
            ObjKind::Class(_) => "class",
            ObjKind::Instance(_) => "instance",
            ObjKind::BoundMethod(_) => "bound method",
        }
    }
}

/// Safe accessor: every live `*mut Obj` handed out by the heap stays valid
/// and non-null for as long as the object is reachable, which the collector
/// guarantees via the push-before-allocate discipline (§5).
pub unsafe fn obj_ref<'a>(ptr: *mut Obj) -> &'a Obj {
    unsafe { &*ptr }
}

pub unsafe fn obj_mut<'a>(ptr: *mut Obj) -> &'a mut Obj {
    unsafe { &mut *ptr }
}
