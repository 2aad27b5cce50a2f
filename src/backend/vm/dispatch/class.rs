//! Classes, instances, properties, and closures (§4.3 Properties, Closures;
//! §9A `this`/`super` wiring). The counterpart of the teacher's
//! `dispatch/table.rs` — the one structured-data kind each language has,
//! Lua tables there, classes and instances here.

use crate::backend::vm::ControlSignal;
use crate::backend::vm::error::VmError;
use crate::common::object::{Obj, ObjKind, obj_mut, obj_ref};
use crate::common::value::Value;

use super::super::VirtualMachine;

impl VirtualMachine {
    pub(crate) fn op_get_property(&mut self) -> Result<ControlSignal, VmError> {
        let receiver = self.peek(0);
        let Some(instance_ptr) = receiver.as_obj() else {
            return Err(self.runtime_error("Only instances have properties."));
        };
        let obj = unsafe { obj_ref(instance_ptr) };
        if !matches!(obj.kind, ObjKind::Instance(_)) {
            return Err(self.runtime_error("Only instances have properties."));
        }

        let name_value = self.read_constant_u8();
        let name_ptr = self.read_string(name_value);

        let inst = obj.as_instance();
        if let Some(value) = inst.fields.get(name_ptr) {
            self.pop();
            self.push(value);
            return Ok(ControlSignal::Continue);
        }

        let class_ptr = inst.class;
        self.bind_method(class_ptr, name_ptr)?;
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_set_property(&mut self) -> Result<ControlSignal, VmError> {
        let receiver = self.peek(1);
        let Some(instance_ptr) = receiver.as_obj() else {
            return Err(self.runtime_error("Only instances have fields."));
        };
        if !matches!(unsafe { obj_ref(instance_ptr) }.kind, ObjKind::Instance(_)) {
            return Err(self.runtime_error("Only instances have fields."));
        }

        let name_value = self.read_constant_u8();
        let name_ptr = self.read_string(name_value);
        let value = self.peek(0);
        unsafe { obj_mut(instance_ptr) }.as_instance_mut().fields.set(name_ptr, value);

        let value = self.pop();
        self.pop();
        self.push(value);
        Ok(ControlSignal::Continue)
    }

    /// `GET_SUPER`: the instance sits below the resolved `super` local/
    /// upvalue that `SUPER` expressions push just before this op (§9A).
    pub(crate) fn op_get_super(&mut self) -> Result<ControlSignal, VmError> {
        let name_value = self.read_constant_u8();
        let name_ptr = self.read_string(name_value);
        let superclass_ptr = self.pop().as_obj().expect("compiler only emits GET_SUPER under a resolved super");
        self.bind_method(superclass_ptr, name_ptr)?;
        Ok(ControlSignal::Continue)
    }

    /// Looks `name` up in `class`'s method table, allocates a `BoundMethod`
    /// binding the current stack top as receiver, and replaces it in place.
    fn bind_method(&mut self, class_ptr: *mut Obj, name_ptr: *mut Obj) -> Result<(), VmError> {
        let class = unsafe { obj_ref(class_ptr) }.as_class();
        let Some(method_value) = class.methods.get(name_ptr) else {
            let name = unsafe { obj_ref(name_ptr) }.as_string().data.clone();
            return Err(self.runtime_error(&format!("Undefined property '{}'.", name)));
        };
        let method_ptr = method_value.as_obj().expect("method table values are always closures");
        let receiver = self.peek(0);
        self.maybe_collect();
        let bound_ptr = self.heap_mut().alloc_bound_method(receiver, method_ptr);
        self.pop();
        self.push(Value::Obj(bound_ptr));
        Ok(())
    }

    pub(crate) fn op_closure(&mut self) -> Result<ControlSignal, VmError> {
        let function_value = self.read_constant_u8();
        let function_ptr = function_value.as_obj().expect("CLOSURE operand must be a function constant");
        let upvalue_count = unsafe { obj_ref(function_ptr) }.as_function().upvalue_count;

        let mut upvalues = Vec::with_capacity(upvalue_count as usize);
        for _ in 0..upvalue_count {
            let is_local = self.read_byte() != 0;
            let index = self.read_byte() as usize;
            let upvalue_ptr = if is_local {
                let slot = self.slots_base() + index;
                let slot_ptr = &mut self.stack[slot] as *mut Value;
                self.capture_upvalue(slot_ptr)
            } else {
                let enclosing = unsafe { obj_ref(self.frame().closure) }.as_closure();
                enclosing.upvalues[index]
            };
            upvalues.push(upvalue_ptr);
        }

        self.maybe_collect();
        let closure_ptr = self.heap_mut().alloc_closure(function_ptr, upvalues);
        self.push(Value::Obj(closure_ptr));
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_close_upvalue(&mut self) -> Result<ControlSignal, VmError> {
        let top = self.stack_top;
        let slot_ptr = &mut self.stack[top - 1] as *mut Value;
        self.close_upvalues(slot_ptr);
        self.pop();
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_class(&mut self) -> Result<ControlSignal, VmError> {
        let name_value = self.read_constant_u8();
        let name_ptr = self.read_string(name_value);
        self.maybe_collect();
        let class_ptr = self.heap_mut().alloc_class(name_ptr);
        self.push(Value::Obj(class_ptr));
        Ok(ControlSignal::Continue)
    }

    /// `superclass` stays on the stack afterward — it is the scope's
    /// `super` local, popped later by the enclosing `end_scope` (§9A).
    pub(crate) fn op_inherit(&mut self) -> Result<ControlSignal, VmError> {
        let superclass_value = self.peek(1);
        let Some(superclass_ptr) = superclass_value.as_obj() else {
            return Err(self.runtime_error("Superclass must be a class."));
        };
        if !matches!(unsafe { obj_ref(superclass_ptr) }.kind, ObjKind::Class(_)) {
            return Err(self.runtime_error("Superclass must be a class."));
        }

        let subclass_ptr = self.peek(0).as_obj().expect("compiler only emits INHERIT under a class declaration");
        let superclass = unsafe { obj_ref(superclass_ptr) }.as_class();
        let subclass = unsafe { obj_mut(subclass_ptr) }.as_class_mut();
        subclass.methods.add_all(&superclass.methods);

        self.pop();
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_method(&mut self) -> Result<ControlSignal, VmError> {
        let name_value = self.read_constant_u8();
        let name_ptr = self.read_string(name_value);
        let method_value = self.peek(0);
        let class_ptr = self.peek(1).as_obj().expect("compiler only emits METHOD under a class declaration");
        unsafe { obj_mut(class_ptr) }.as_class_mut().methods.set(name_ptr, method_value);
        self.pop();
        Ok(ControlSignal::Continue)
    }
}
