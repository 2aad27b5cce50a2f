//! The opcode decode/execute step (§4.3), split by concern across the
//! sibling files here the way the teacher's own `backend/vm/dispatch`
//! divides a single `execute_instruction` match across
//! `{access,arithmetic,compare,control}.rs`. `class.rs` takes the place of
//! the teacher's `table.rs`: both hold the one structured-data kind their
//! respective language has (Lua tables there, classes/instances here).

mod access;
mod arithmetic;
mod class;
mod compare;
mod control;

use crate::backend::vm::VirtualMachine;
use crate::backend::vm::error::VmError;
use crate::common::opcode::OpCode;

use super::ControlSignal;

impl VirtualMachine {
    pub(crate) fn dispatch(&mut self, op: OpCode) -> Result<ControlSignal, VmError> {
        match op {
            OpCode::Constant => self.op_constant(),
            OpCode::ConstantLong => self.op_constant_long(),
            OpCode::Nil => self.op_nil(),
            OpCode::True => self.op_true(),
            OpCode::False => self.op_false(),
            OpCode::Pop => self.op_pop(),
            OpCode::GetLocal => self.op_get_local(),
            OpCode::SetLocal => self.op_set_local(),
            OpCode::GetGlobal => self.op_get_global(),
            OpCode::DefineGlobal => self.op_define_global(),
            OpCode::SetGlobal => self.op_set_global(),
            OpCode::GetUpvalue => self.op_get_upvalue(),
            OpCode::SetUpvalue => self.op_set_upvalue(),

            OpCode::GetProperty => self.op_get_property(),
            OpCode::SetProperty => self.op_set_property(),
            OpCode::GetSuper => self.op_get_super(),
            OpCode::Class => self.op_class(),
            OpCode::Inherit => self.op_inherit(),
            OpCode::Method => self.op_method(),
            OpCode::Closure => self.op_closure(),
            OpCode::CloseUpvalue => self.op_close_upvalue(),

            OpCode::Equal => self.op_equal(),
            OpCode::Greater => self.op_greater(),
            OpCode::Less => self.op_less(),
            OpCode::Compare => self.op_compare(),

            OpCode::Add => self.op_add(),
            OpCode::Subtract => self.op_subtract(),
            OpCode::Multiply => self.op_multiply(),
            OpCode::Divide => self.op_divide(),
            OpCode::Not => self.op_not(),
            OpCode::Negate => self.op_negate(),

            OpCode::Print => self.op_print(),
            OpCode::Jump => self.op_jump(),
            OpCode::JumpIfFalse => self.op_jump_if_false(),
            OpCode::Loop => self.op_loop(),
            OpCode::Call => self.op_call(),
            OpCode::Invoke => self.op_invoke(),
            OpCode::SuperInvoke => self.op_super_invoke(),
            OpCode::Return => self.op_return(),
        }
    }
}
