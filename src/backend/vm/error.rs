//! Runtime diagnostics (§7). Named `VmError` rather than `RuntimeError` to
//! avoid reading like a clash with `std::fmt`'s own vocabulary, mirroring
//! the teacher's `VMError{kind, func_name, pc, stack_trace}` shape but
//! carrying a full per-frame backtrace instead of a single call site.

use std::fmt;

/// One entry of the unwound call stack, captured at the moment the error
/// was raised (§4.3 Error reporting): `name` is `None` for the top-level
/// script frame, matching the `<script>` rendering used elsewhere.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub name: Option<String>,
    pub line: i32,
}

#[derive(Debug, Clone)]
pub struct VmError {
    pub message: String,
    pub trace: Vec<TraceFrame>,
}

impl VmError {
    pub fn new(message: impl Into<String>) -> Self {
        VmError { message: message.into(), trace: Vec::new() }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)?;
        // `trace` is already innermost-first (see `VirtualMachine::runtime_error`);
        // printing it in order walks the frames innermost outward, script last.
        for frame in &self.trace {
            let name = frame.name.as_deref().unwrap_or("script");
            writeln!(f, "[line {}] in {}", frame.line, name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtrace_prints_innermost_frame_first_and_script_last() {
        let mut error = VmError::new("Undefined property 'z'.");
        error.trace.push(TraceFrame { name: Some("inner".to_string()), line: 3 });
        error.trace.push(TraceFrame { name: Some("outer".to_string()), line: 2 });
        error.trace.push(TraceFrame { name: None, line: 1 });

        let rendered = error.to_string();
        let inner_pos = rendered.find("in inner").unwrap();
        let outer_pos = rendered.find("in outer").unwrap();
        let script_pos = rendered.find("in script").unwrap();
        assert!(inner_pos < outer_pos);
        assert!(outer_pos < script_pos);
    }
}
