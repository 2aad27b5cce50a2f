//! Equality, ordering, and the non-destructive `switch`-support compare
//! (§4.3, §8 testable property 5). The counterpart of the teacher's
//! `dispatch/compare.rs`.

use crate::backend::vm::ControlSignal;
use crate::backend::vm::error::VmError;
use crate::common::value::Value;

use super::super::VirtualMachine;

impl VirtualMachine {
    pub(crate) fn op_equal(&mut self) -> Result<ControlSignal, VmError> {
        let b = self.pop();
        let a = self.pop();
        self.push(Value::Bool(Value::values_equal(&a, &b)));
        Ok(ControlSignal::Continue)
    }

    pub(crate) fn op_greater(&mut self) -> Result<ControlSignal, VmError> {
        self.numeric_compare(|a, b| a > b)
    }

    pub(crate) fn op_less(&mut self) -> Result<ControlSignal, VmError> {
        self.numeric_compare(|a, b| a < b)
    }

    fn numeric_compare(&mut self, op: fn(f64, f64) -> bool) -> Result<ControlSignal, VmError> {
        let (a, b) = (self.peek(1), self.peek(0));
        match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => {
                self.pop();
                self.pop();
                self.push(Value::Bool(op(x, y)));
                Ok(ControlSignal::Continue)
            }
            _ => Err(self.runtime_error("Operands must be numbers.")),
        }
    }

    /// `switch`'s case test (§4.2): leaves both operands on the stack below
    /// the resulting bool so the case body's trailing `POP POP` can discard
    /// them regardless of which branch was taken.
    pub(crate) fn op_compare(&mut self) -> Result<ControlSignal, VmError> {
        let b = self.peek(0);
        let a = self.peek(1);
        self.push(Value::Bool(Value::values_equal(&a, &b)));
        Ok(ControlSignal::Continue)
    }
}
