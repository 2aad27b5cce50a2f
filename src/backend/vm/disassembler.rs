//! Chunk disassembly for the `--trace` CLI flag (§6A), replacing the
//! teacher's `print_emitter_report`/`dump_internal_state` pair with a
//! version that walks a real byte-encoded `Chunk` instead of the teacher's
//! `Vec<OpCode>` pseudo-bytecode.

use crate::common::chunk::Chunk;
use crate::common::opcode::OpCode;

/// Renders every instruction in `chunk` as one line, `clox`-disassembler
/// style: `[line] offset OPNAME operand`. Unknown opcode bytes (which
/// cannot occur for code this compiler emitted, but could for a corrupted
/// or hand-written chunk) are rendered rather than panicking.
pub fn disassemble_chunk(chunk: &Chunk, name: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("== {} ==\n", name));
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset, &mut out);
    }
    out
}

fn disassemble_instruction(chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    out.push_str(&format!("{:04} ", offset));
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        out.push_str("   | ");
    } else {
        out.push_str(&format!("{:4} ", chunk.lines[offset]));
    }

    let Some(op) = OpCode::from_u8(chunk.code[offset]) else {
        out.push_str(&format!("Unknown opcode {}\n", chunk.code[offset]));
        return offset + 1;
    };

    match op {
        OpCode::Constant => constant_instruction(op, chunk, offset, out, 1),
        OpCode::ConstantLong => constant_long_instruction(op, chunk, offset, out),
        OpCode::GetLocal | OpCode::SetLocal | OpCode::GetUpvalue | OpCode::SetUpvalue | OpCode::Call => {
            byte_instruction(op, chunk, offset, out)
        }
        OpCode::GetGlobal
        | OpCode::DefineGlobal
        | OpCode::SetGlobal
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::GetSuper
        | OpCode::Class
        | OpCode::Method => constant_instruction(op, chunk, offset, out, 1),
        OpCode::Invoke | OpCode::SuperInvoke => invoke_instruction(op, chunk, offset, out),
        OpCode::Jump | OpCode::JumpIfFalse => jump_instruction(op, chunk, offset, out, 1),
        OpCode::Loop => jump_instruction(op, chunk, offset, out, -1),
        OpCode::Closure => closure_instruction(chunk, offset, out),
        _ => simple_instruction(op, offset, out),
    }
}

fn simple_instruction(op: OpCode, offset: usize, out: &mut String) -> usize {
    out.push_str(&format!("{}\n", op.name()));
    offset + 1
}

fn byte_instruction(op: OpCode, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let slot = chunk.code[offset + 1];
    out.push_str(&format!("{:-16} {:4}\n", op.name(), slot));
    offset + 2
}

fn constant_instruction(op: OpCode, chunk: &Chunk, offset: usize, out: &mut String, size: usize) -> usize {
    let index = chunk.code[offset + 1] as usize;
    out.push_str(&format!("{:-16} {:4} '{}'\n", op.name(), index, chunk.constants[index]));
    offset + 1 + size
}

fn constant_long_instruction(op: OpCode, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let index = chunk.code[offset + 1] as usize
        | (chunk.code[offset + 2] as usize) << 8
        | (chunk.code[offset + 3] as usize) << 16;
    out.push_str(&format!("{:-16} {:4} '{}'\n", op.name(), index, chunk.constants[index]));
    offset + 4
}

fn invoke_instruction(op: OpCode, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let index = chunk.code[offset + 1] as usize;
    let argc = chunk.code[offset + 2];
    out.push_str(&format!(
        "{:-16} ({} args) {:4} '{}'\n",
        op.name(),
        argc,
        index,
        chunk.constants[index]
    ));
    offset + 3
}

fn jump_instruction(op: OpCode, chunk: &Chunk, offset: usize, out: &mut String, sign: i32) -> usize {
    let jump = ((chunk.code[offset + 1] as u16) << 8 | chunk.code[offset + 2] as u16) as i32;
    let target = offset as i32 + 3 + sign * jump;
    out.push_str(&format!("{:-16} {:4} -> {}\n", op.name(), offset, target));
    offset + 3
}

fn closure_instruction(chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let mut offset = offset + 1;
    let index = chunk.code[offset] as usize;
    offset += 1;
    out.push_str(&format!("{:-16} {:4} '{}'\n", OpCode::Closure.name(), index, chunk.constants[index]));

    let upvalue_count = match &chunk.constants[index] {
        crate::common::value::Value::Obj(p) => {
            unsafe { crate::common::object::obj_ref(*p) }.as_function().upvalue_count
        }
        _ => 0,
    };
    for _ in 0..upvalue_count {
        let is_local = chunk.code[offset];
        let idx = chunk.code[offset + 1];
        out.push_str(&format!(
            "{:04}      |                     {} {}\n",
            offset,
            if is_local == 1 { "local" } else { "upvalue" },
            idx
        ));
        offset += 2;
    }
    offset
}
