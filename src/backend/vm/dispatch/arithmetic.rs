//! Numeric and string-concatenation binary ops, plus the two unary ops
//! (§4.3 Binary arithmetic). The counterpart of the teacher's
//! `dispatch/arithmetic.rs`.

use crate::backend::vm::ControlSignal;
use crate::backend::vm::error::VmError;
use crate::common::object::obj_ref;
use crate::common::value::Value;

use super::super::VirtualMachine;

impl VirtualMachine {
    /// `ADD` additionally concatenates two strings into a fresh interned
    /// string (§4.3) — every other binary numeric op only accepts numbers.
    pub(crate) fn op_add(&mut self) -> Result<ControlSignal, VmError> {
        let (a, b) = (self.peek(1), self.peek(0));
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(x + y));
            }
            (Value::Obj(_), Value::Obj(_)) if a.is_string() && b.is_string() => {
                let (left, right) = (
                    unsafe { obj_ref(a.as_obj().unwrap()) }.as_string().data.clone(),
                    unsafe { obj_ref(b.as_obj().unwrap()) }.as_string().data.clone(),
                );
                self.pop();
                self.pop();
                self.maybe_collect();
                let ptr = self.heap_mut().intern_owned_string(left + &right);
                self.push(Value::Obj(ptr));
            }
            _ => return Err(self.runtime_error("Operands must be two numbers or two strings.")),
        }
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_subtract(&mut self) -> Result<ControlSignal, VmError> {
        self.numeric_binary(|a, b| a - b)
    }

    pub(crate) fn op_multiply(&mut self) -> Result<ControlSignal, VmError> {
        self.numeric_binary(|a, b| a * b)
    }

    pub(crate) fn op_divide(&mut self) -> Result<ControlSignal, VmError> {
        self.numeric_binary(|a, b| a / b)
    }

    fn numeric_binary(&mut self, op: fn(f64, f64) -> f64) -> Result<ControlSignal, VmError> {
        let (a, b) = (self.peek(1), self.peek(0));
        match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(op(x, y)));
                Ok(ControlSignal::Continue)
            }
            _ => Err(self.runtime_error("Operands must be numbers.")),
        }
    }

    pub(crate) fn op_not(&mut self) -> Result<ControlSignal, VmError> {
        let value = self.pop();
        self.push(Value::Bool(value.is_falsey()));
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_negate(&mut self) -> Result<ControlSignal, VmError> {
        match self.peek(0).as_number() {
            Some(n) => {
                self.pop();
                self.push(Value::Number(-n));
                Ok(ControlSignal::Continue)
            }
            None => Err(self.runtime_error("Operand must be a number.")),
        }
    }
}
