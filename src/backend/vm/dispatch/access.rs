//! Literal pushes and variable access: constants, locals, globals, upvalues
//! (§4.3). The counterpart of the teacher's `dispatch/access.rs`
//! (`handle_move`/`handle_loadk`/`handle_get_global`/…), reworked around a
//! value *stack* instead of a register file.

use crate::backend::vm::ControlSignal;
use crate::backend::vm::error::VmError;
use crate::common::object::obj_ref;
use crate::common::value::Value;

use super::super::VirtualMachine;

impl VirtualMachine {
    pub(crate) fn op_constant(&mut self) -> Result<ControlSignal, VmError> {
        let value = self.read_constant_u8();
        self.push(value);
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_constant_long(&mut self) -> Result<ControlSignal, VmError> {
        let value = self.read_constant_long();
        self.push(value);
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_nil(&mut self) -> Result<ControlSignal, VmError> {
        self.push(Value::Nil);
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_true(&mut self) -> Result<ControlSignal, VmError> {
        self.push(Value::Bool(true));
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_false(&mut self) -> Result<ControlSignal, VmError> {
        self.push(Value::Bool(false));
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_pop(&mut self) -> Result<ControlSignal, VmError> {
        self.pop();
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_get_local(&mut self) -> Result<ControlSignal, VmError> {
        let slot = self.read_byte() as usize;
        let value = self.stack_slot(slot);
        self.push(value);
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_set_local(&mut self) -> Result<ControlSignal, VmError> {
        let slot = self.read_byte() as usize;
        let value = self.peek(0);
        self.set_stack_slot(slot, value);
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_get_global(&mut self) -> Result<ControlSignal, VmError> {
        let name_value = self.read_constant_u8();
        let name_ptr = self.read_string(name_value);
        match self.globals().get(name_ptr) {
            Some(value) => {
                self.push(value);
                Ok(ControlSignal::Continue)
            }
            None => {
                let name = unsafe { obj_ref(name_ptr) }.as_string().data.clone();
                Err(self.runtime_error(&format!("Undefined variable '{}'.", name)))
            }
        }
    }

    pub(crate) fn op_define_global(&mut self) -> Result<ControlSignal, VmError> {
        let name_value = self.read_constant_u8();
        let name_ptr = self.read_string(name_value);
        let value = self.peek(0);
        self.globals_mut().set(name_ptr, value);
        self.pop();
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_set_global(&mut self) -> Result<ControlSignal, VmError> {
        let name_value = self.read_constant_u8();
        let name_ptr = self.read_string(name_value);
        if self.globals().get(name_ptr).is_none() {
            let name = unsafe { obj_ref(name_ptr) }.as_string().data.clone();
            return Err(self.runtime_error(&format!("Undefined variable '{}'.", name)));
        }
        let value = self.peek(0);
        self.globals_mut().set(name_ptr, value);
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_get_upvalue(&mut self) -> Result<ControlSignal, VmError> {
        let idx = self.read_byte() as usize;
        let value = self.read_upvalue_slot(idx);
        self.push(value);
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_set_upvalue(&mut self) -> Result<ControlSignal, VmError> {
        let idx = self.read_byte() as usize;
        let value = self.peek(0);
        self.write_upvalue_slot(idx, value);
        Ok(ControlSignal::Continue)
    }
}
