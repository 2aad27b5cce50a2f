//! Control flow, `print`, calls, and `return` (§4.3). The counterpart of
//! the teacher's `dispatch/control.rs` (`handle_jump`/`handle_call`/
//! `handle_return`), reworked around a value stack with call frames
//! instead of a register window per call.

use crate::backend::vm::ControlSignal;
use crate::backend::vm::error::VmError;
use crate::common::object::obj_ref;

use super::super::VirtualMachine;

impl VirtualMachine {
    pub(crate) fn op_print(&mut self) -> Result<ControlSignal, VmError> {
        let value = self.pop();
        let text = value.to_string();
        self.write_output(&text);
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_jump(&mut self) -> Result<ControlSignal, VmError> {
        let offset = self.read_short();
        self.jump_forward(offset);
        Ok(ControlSignal::Continue)
    }

    /// Peeks (never pops) the condition — both `if` and `switch` rely on the
    /// value staying on the stack for their own trailing `POP`s (§4.2).
    pub(crate) fn op_jump_if_false(&mut self) -> Result<ControlSignal, VmError> {
        let offset = self.read_short();
        if self.peek(0).is_falsey() {
            self.jump_forward(offset);
        }
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_loop(&mut self) -> Result<ControlSignal, VmError> {
        let offset = self.read_short();
        self.jump_backward(offset);
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_call(&mut self) -> Result<ControlSignal, VmError> {
        let argc = self.read_byte();
        let callee = self.peek(argc as usize);
        self.call_value(callee, argc)?;
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_invoke(&mut self) -> Result<ControlSignal, VmError> {
        let name_value = self.read_constant_u8();
        let name_ptr = self.read_string(name_value);
        let argc = self.read_byte();
        self.invoke(name_ptr, argc)?;
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_super_invoke(&mut self) -> Result<ControlSignal, VmError> {
        let name_value = self.read_constant_u8();
        let name_ptr = self.read_string(name_value);
        let argc = self.read_byte();
        let superclass = self.pop().as_obj().expect("compiler only emits SUPER_INVOKE under a resolved super");
        self.invoke_from_class(superclass, name_ptr, argc)?;
        Ok(ControlSignal::Continue)
    }

    /// Unwinds the returning frame (§4.3 Return): closes any upvalues still
    /// open into it, then either halts the VM (top-level script returning)
    /// or resumes the caller with the result on top of its own stack.
    pub(crate) fn op_return(&mut self) -> Result<ControlSignal, VmError> {
        let result = self.pop();
        let bound = self.slots_base();
        let bound_ptr = &mut self.stack[bound] as *mut crate::common::value::Value;
        self.close_upvalues(bound_ptr);
        self.frames.pop();

        if self.frames.is_empty() {
            self.stack_top = 0;
            return Ok(ControlSignal::Halt);
        }

        self.stack_top = bound;
        self.push(result);
        Ok(ControlSignal::Continue)
    }
}

impl VirtualMachine {
    /// `INVOKE`'s fast path (§4.3 Properties): a stored closure field is
    /// still invokable through dot-call syntax, but a real method skips the
    /// `BoundMethod` allocation `GET_PROPERTY; CALL` would otherwise need.
    fn invoke(&mut self, name_ptr: *mut crate::common::object::Obj, argc: u8) -> Result<(), VmError> {
        let receiver = self.peek(argc as usize);
        let Some(instance_ptr) = receiver.as_obj() else {
            return Err(self.runtime_error("Only instances have methods."));
        };
        let instance = unsafe { obj_ref(instance_ptr) };
        if !matches!(instance.kind, crate::common::object::ObjKind::Instance(_)) {
            return Err(self.runtime_error("Only instances have methods."));
        }
        let inst = instance.as_instance();
        if let Some(field_value) = inst.fields.get(name_ptr) {
            let slot = self.stack_top - argc as usize - 1;
            self.stack[slot] = field_value;
            return self.call_value(field_value, argc);
        }
        let class_ptr = inst.class;
        self.invoke_from_class(class_ptr, name_ptr, argc)
    }
}
