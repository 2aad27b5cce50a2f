//! Single-pass Pratt parser → bytecode (§4.2).
//!
//! Mirrors the shape of the teacher's `translator` stage (scan, then emit)
//! but collapses both into one pass: there is no separate IR here, each
//! parse function emits directly into the `Chunk` of the function
//! currently being compiled. Scope/upvalue resolution, `const` tracking,
//! and class/method wiring (§9A) all happen inline as the source is
//! walked once, left to right.
//!
//! Per §9's design note, the compiler frame chain and the class-compiler
//! chain are both explicit `Vec`-backed stacks on `Compiler` rather than
//! the reference implementation's file-scope `static Compiler* current`.

use crate::backend::vm::heap::Heap;
use crate::common::object::{Obj, obj_mut, obj_ref};
use crate::common::opcode::OpCode;
use crate::common::value::Value;
use crate::frontend::error::CompileError;
use crate::frontend::lexer::{Lexer, Token, TokenKind};

const MAX_LOCALS: usize = 256;
const MAX_UPVALUES: usize = 256;
const MAX_GLOBALS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParseFn = fn(&mut Compiler, bool);

#[derive(Clone, Copy)]
struct ParseRule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

fn rule(kind: TokenKind) -> ParseRule {
    use TokenKind::*;
    let r = |prefix, infix, precedence| ParseRule { prefix, infix, precedence };
    match kind {
        LeftParen => r(Some(Compiler::grouping as ParseFn), Some(Compiler::call as ParseFn), Precedence::Call),
        Dot => r(None, Some(Compiler::dot as ParseFn), Precedence::Call),
        Minus => r(Some(Compiler::unary as ParseFn), Some(Compiler::binary as ParseFn), Precedence::Term),
        Plus => r(None, Some(Compiler::binary as ParseFn), Precedence::Term),
        Slash => r(None, Some(Compiler::binary as ParseFn), Precedence::Factor),
        Star => r(None, Some(Compiler::binary as ParseFn), Precedence::Factor),
        Bang => r(Some(Compiler::unary as ParseFn), None, Precedence::None),
        BangEqual => r(None, Some(Compiler::binary as ParseFn), Precedence::Equality),
        EqualEqual => r(None, Some(Compiler::binary as ParseFn), Precedence::Equality),
        Greater => r(None, Some(Compiler::binary as ParseFn), Precedence::Comparison),
        GreaterEqual => r(None, Some(Compiler::binary as ParseFn), Precedence::Comparison),
        Less => r(None, Some(Compiler::binary as ParseFn), Precedence::Comparison),
        LessEqual => r(None, Some(Compiler::binary as ParseFn), Precedence::Comparison),
        Identifier => r(Some(Compiler::variable as ParseFn), None, Precedence::None),
        String => r(Some(Compiler::string as ParseFn), None, Precedence::None),
        Number => r(Some(Compiler::number as ParseFn), None, Precedence::None),
        And => r(None, Some(Compiler::and_ as ParseFn), Precedence::And),
        Or => r(None, Some(Compiler::or_ as ParseFn), Precedence::Or),
        False => r(Some(Compiler::literal as ParseFn), None, Precedence::None),
        True => r(Some(Compiler::literal as ParseFn), None, Precedence::None),
        Nil => r(Some(Compiler::literal as ParseFn), None, Precedence::None),
        This => r(Some(Compiler::this_ as ParseFn), None, Precedence::None),
        Super => r(Some(Compiler::super_ as ParseFn), None, Precedence::None),
        _ => r(None, None, Precedence::None),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

struct Local {
    name: String,
    depth: i32,
    is_captured: bool,
    immutable: bool,
}

#[derive(Clone, Copy)]
struct UpvalueDesc {
    index: u8,
    is_local: bool,
}

/// The compile-time record of a single global declaration, used only for
/// shadowing/immutability checks — the runtime value lives in the VM's own
/// `globals` table (§3 Compiler state).
struct GlobalDecl {
    name: String,
    immutable: bool,
}

struct ClassCompilerState {
    has_superclass: bool,
}

/// One activation of the compiler, one per function/method/script body
/// currently being compiled. `function` points at a heap-allocated
/// `ObjFunction` mutated in place as bytecode is emitted, exactly like the
/// reference compiler's `current->function`.
struct FunctionCompiler {
    function: *mut Obj,
    kind: FunctionKind,
    locals: Vec<Local>,
    upvalues: Vec<UpvalueDesc>,
    scope_depth: i32,
}

impl FunctionCompiler {
    fn new(function: *mut Obj, kind: FunctionKind) -> Self {
        let mut locals = Vec::with_capacity(MAX_LOCALS);
        // Slot 0 is reserved for the receiver in methods/initializers, and
        // for the callee closure itself otherwise (never referenced by
        // name from user code in the latter case).
        let slot0_name = if matches!(kind, FunctionKind::Method | FunctionKind::Initializer) {
            "this"
        } else {
            ""
        };
        locals.push(Local {
            name: slot0_name.to_string(),
            depth: 0,
            is_captured: false,
            immutable: true,
        });
        FunctionCompiler { function, kind, locals, upvalues: Vec::new(), scope_depth: 0 }
    }
}

pub struct Compiler<'src> {
    lexer: Lexer<'src>,
    heap: &'src mut Heap,
    global_decls: &'src mut Vec<GlobalDecl>,
    previous: Token<'src>,
    current: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<CompileError>,
    frames: Vec<FunctionCompiler>,
    class_compilers: Vec<ClassCompilerState>,
}

/// Opaque owner for the persistent compile-time globals table; the VM
/// holds one of these across the whole session so `const` checks carry
/// over between successive REPL compiles (§3: "process-wide").
pub struct GlobalDeclTable(Vec<GlobalDecl>);

impl GlobalDeclTable {
    pub fn new() -> Self {
        let mut decls = Vec::new();
        for name in crate::backend::vm::natives::NATIVE_NAMES {
            decls.push(GlobalDecl { name: name.to_string(), immutable: true });
        }
        GlobalDeclTable(decls)
    }
}

impl Default for GlobalDeclTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiles `source` into a top-level `Script` function object, or a list
/// of compile errors. `globals` persists across calls within one VM
/// session (§3).
pub fn compile(
    source: &str,
    heap: &mut Heap,
    globals: &mut GlobalDeclTable,
) -> Result<*mut Obj, Vec<CompileError>> {
    let mut lexer = Lexer::new(source);
    let first = lexer.scan_token();

    let script_fn = heap.alloc_function();

    let mut compiler = Compiler {
        lexer,
        heap,
        global_decls: &mut globals.0,
        previous: first,
        current: first,
        had_error: false,
        panic_mode: false,
        errors: Vec::new(),
        frames: vec![FunctionCompiler::new(script_fn, FunctionKind::Script)],
        class_compilers: Vec::new(),
    };

    while !compiler.check(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.consume(TokenKind::Eof, "Expect end of expression.");

    let (function, _upvalues) = compiler.end_compiler();

    if compiler.had_error {
        Err(compiler.errors)
    } else {
        Ok(function)
    }
}

impl<'src> Compiler<'src> {
    // ---- token stream -----------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.to_string();
            self.error_at_current(&message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn error_at_current(&mut self, message: &str) {
        let tok = self.current;
        self.error_at(tok, message);
    }

    fn error(&mut self, message: &str) {
        let tok = self.previous;
        self.error_at(tok, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let lexeme = if token.kind == TokenKind::Eof || token.kind == TokenKind::Error {
            None
        } else {
            Some(token.lexeme.to_string())
        };
        self.errors.push(CompileError { line: token.line, lexeme, message: message.to_string() });
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Let
                | TokenKind::Const
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ---- frame / chunk access ------------------------------------------

    fn frame_idx(&self) -> usize {
        self.frames.len() - 1
    }

    fn current_fn(&self) -> &FunctionCompiler {
        self.frames.last().expect("compiler frame stack is never empty while compiling")
    }

    fn current_fn_mut(&mut self) -> &mut FunctionCompiler {
        self.frames.last_mut().expect("compiler frame stack is never empty while compiling")
    }

    fn chunk_mut(&mut self) -> &mut crate::common::chunk::Chunk {
        &mut unsafe { obj_mut(self.current_fn().function) }.as_function_mut().chunk
    }

    fn current_line(&self) -> i32 {
        self.previous.line
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.current_line();
        self.chunk_mut().write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op.into());
    }

    fn emit_two(&mut self, op: OpCode, byte: u8) {
        self.emit_op(op);
        self.emit_byte(byte);
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.chunk_mut().code.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        self.emit_byte(((offset >> 8) & 0xff) as u8);
        self.emit_byte((offset & 0xff) as u8);
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk_mut().code.len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        let jump = self.chunk_mut().code.len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        self.chunk_mut().code[offset] = ((jump >> 8) & 0xff) as u8;
        self.chunk_mut().code[offset + 1] = (jump & 0xff) as u8;
    }

    fn emit_return(&mut self) {
        if self.current_fn().kind == FunctionKind::Initializer {
            self.emit_two(OpCode::GetLocal, 0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    /// Adds `value` to the current chunk's constant pool, emitting
    /// `CONSTANT`/`CONSTANT_LONG` as needed (§4.2).
    fn emit_constant(&mut self, value: Value) {
        let index = self.chunk_mut().add_constant(value);
        if index <= u8::MAX as usize {
            self.emit_two(OpCode::Constant, index as u8);
        } else if index <= 0x00ff_ffff {
            self.emit_op(OpCode::ConstantLong);
            self.emit_byte((index & 0xff) as u8);
            self.emit_byte(((index >> 8) & 0xff) as u8);
            self.emit_byte(((index >> 16) & 0xff) as u8);
        } else {
            self.error("Too many constants in one chunk.");
        }
    }

    /// Emits `CLOSURE <constant>` followed by `(is_local, index)` for each
    /// upvalue the just-finished function captured (§4.2).
    fn emit_closure(&mut self, function: *mut Obj, upvalues: &[UpvalueDesc]) {
        let index = self.chunk_mut().add_constant(Value::Obj(function));
        if index > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return;
        }
        self.emit_two(OpCode::Closure, index as u8);
        for up in upvalues {
            self.emit_byte(if up.is_local { 1 } else { 0 });
            self.emit_byte(up.index);
        }
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let ptr = self.heap.intern_string(name);
        let index = self.chunk_mut().add_constant(Value::Obj(ptr));
        if index > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index as u8
    }

    // ---- scopes --------------------------------------------------------

    fn begin_scope(&mut self) {
        self.current_fn_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.current_fn_mut().scope_depth -= 1;
        let depth = self.current_fn().scope_depth;
        while let Some(local) = self.current_fn().locals.last() {
            if local.depth <= depth {
                break;
            }
            if local.is_captured {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
            self.current_fn_mut().locals.pop();
        }
    }

    // ---- variable declaration & resolution -----------------------------

    fn declare_global(&mut self, name: &str, immutable: bool) {
        if self.global_decls.len() >= MAX_GLOBALS {
            self.error("Too many global variables declared.");
            return;
        }
        if let Some(existing) = self.global_decls.iter_mut().find(|g| g.name == name) {
            existing.immutable = immutable;
        } else {
            self.global_decls.push(GlobalDecl { name: name.to_string(), immutable });
        }
    }

    fn global_is_immutable(&self, name: &str) -> bool {
        self.global_decls.iter().rev().find(|g| g.name == name).map(|g| g.immutable).unwrap_or(false)
    }

    /// Declares `name` as a variable in the current scope: a Local if
    /// inside a function/block, a compile-time global-declaration record
    /// otherwise (§4.2 Declarations).
    fn declare_variable(&mut self, name: &str, immutable: bool) {
        if self.current_fn().scope_depth == 0 {
            self.declare_global(name, immutable);
            return;
        }

        let scope_depth = self.current_fn().scope_depth;
        for local in self.current_fn().locals.iter().rev() {
            if local.depth != -1 && local.depth < scope_depth {
                break;
            }
            if local.name == name {
                self.error("Already a variable with this name in this scope.");
                return;
            }
        }
        self.add_local(name, immutable);
    }

    fn add_local(&mut self, name: &str, immutable: bool) {
        if self.current_fn().locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.current_fn_mut().locals.push(Local {
            name: name.to_string(),
            depth: -1,
            is_captured: false,
            immutable,
        });
    }

    fn mark_initialized(&mut self) {
        if self.current_fn().scope_depth == 0 {
            return;
        }
        let depth = self.current_fn().scope_depth;
        if let Some(local) = self.current_fn_mut().locals.last_mut() {
            local.depth = depth;
        }
    }

    /// `let`/`const name [= expr];` shared machinery: parses the name,
    /// declares it, then lets the caller compile the initializer before
    /// `define_variable` finishes it off.
    fn parse_variable(&mut self, error_message: &str, immutable: bool) -> u8 {
        self.consume(TokenKind::Identifier, error_message);
        let name = self.previous.lexeme.to_string();
        self.declare_variable(&name, immutable);
        if self.current_fn().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(&name)
    }

    fn define_variable(&mut self, global: u8) {
        if self.current_fn().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_two(OpCode::DefineGlobal, global);
    }

    /// Scans `self.frames[frame_idx].locals` bottom-up for `name`
    /// (§4.2 variable resolution, step 1).
    fn resolve_local(&mut self, frame_idx: usize, name: &str) -> Option<(u8, bool)> {
        let frame = &self.frames[frame_idx];
        for (i, local) in frame.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth == -1 {
                    self.error("Can't read local variable in its own initializer.");
                }
                return Some((i as u8, local.immutable));
            }
        }
        None
    }

    /// Resolves `name` as an upvalue of `self.frames[frame_idx]`, recursing
    /// into the enclosing frame (`frame_idx - 1`) first (§4.2 step 2).
    fn resolve_upvalue(&mut self, frame_idx: usize, name: &str) -> Option<(u8, bool)> {
        if frame_idx == 0 {
            return None;
        }

        if let Some((local_idx, immutable)) = self.resolve_local(frame_idx - 1, name) {
            self.frames[frame_idx - 1].locals[local_idx as usize].is_captured = true;
            let idx = self.add_upvalue(frame_idx, local_idx, true);
            return Some((idx, immutable));
        }

        if let Some((upvalue_idx, immutable)) = self.resolve_upvalue(frame_idx - 1, name) {
            let idx = self.add_upvalue(frame_idx, upvalue_idx, false);
            return Some((idx, immutable));
        }

        None
    }

    fn add_upvalue(&mut self, frame_idx: usize, index: u8, is_local: bool) -> u8 {
        {
            let frame = &self.frames[frame_idx];
            for (i, up) in frame.upvalues.iter().enumerate() {
                if up.index == index && up.is_local == is_local {
                    return i as u8;
                }
            }
        }
        if self.frames[frame_idx].upvalues.len() >= MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }
        self.frames[frame_idx].upvalues.push(UpvalueDesc { index, is_local });
        let count = self.frames[frame_idx].upvalues.len() as u8;
        let function = self.frames[frame_idx].function;
        unsafe { obj_mut(function) }.as_function_mut().upvalue_count = count;
        count - 1
    }

    // ---- declarations ----------------------------------------------------

    fn declaration(&mut self) {
        if self.matches(TokenKind::Let) {
            self.var_declaration(false);
        } else if self.matches(TokenKind::Const) {
            self.var_declaration(true);
        } else if self.matches(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.matches(TokenKind::Class) {
            self.class_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self, immutable: bool) {
        let message = if immutable { "Expect const name." } else { "Expect variable name." };
        let global = self.parse_variable(message, immutable);

        if self.matches(TokenKind::Equal) {
            self.expression();
        } else if immutable {
            self.error("Const variables must be initialized.");
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn fun_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect function name.");
        let name = self.previous.lexeme.to_string();
        self.declare_variable(&name, true);
        if self.current_fn().scope_depth > 0 {
            self.mark_initialized();
        }
        let global = if self.current_fn().scope_depth == 0 { self.identifier_constant(&name) } else { 0 };
        self.function(FunctionKind::Function, &name);
        self.define_variable(global);
    }

    fn function(&mut self, kind: FunctionKind, name: &str) {
        let name_ptr = self.heap.intern_string(name);
        let function_obj = self.heap.alloc_function();
        unsafe { obj_mut(function_obj) }.as_function_mut().name = Some(name_ptr);

        self.frames.push(FunctionCompiler::new(function_obj, kind));

        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                {
                    let function = self.current_fn().function;
                    let f = unsafe { obj_mut(function) }.as_function_mut();
                    if f.arity == u8::MAX {
                        self.error("Can't have more than 255 parameters.");
                    }
                    f.arity += 1;
                }
                let constant = self.parse_variable("Expect parameter name.", false);
                self.define_variable(constant);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        let (function, upvalues) = self.end_compiler();
        self.emit_closure(function, &upvalues);
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let class_name = self.previous.lexeme.to_string();
        let name_constant = self.identifier_constant(&class_name);
        self.declare_variable(&class_name, true);

        self.emit_two(OpCode::Class, name_constant);
        self.define_variable(name_constant);

        self.class_compilers.push(ClassCompilerState { has_superclass: false });

        let mut has_superclass = false;
        if self.matches(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            let super_name = self.previous.lexeme.to_string();
            if super_name == class_name {
                self.error("A class can't inherit from itself.");
            }
            self.named_variable(&super_name, false);

            self.begin_scope();
            self.add_local("super", true);
            self.mark_initialized();

            self.named_variable(&class_name, false);
            self.emit_op(OpCode::Inherit);
            has_superclass = true;
        }
        if let Some(cc) = self.class_compilers.last_mut() {
            cc.has_superclass = has_superclass;
        }

        self.named_variable(&class_name, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit_op(OpCode::Pop);

        if has_superclass {
            self.end_scope();
        }

        self.class_compilers.pop();
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let method_name = self.previous.lexeme.to_string();
        let constant = self.identifier_constant(&method_name);

        let kind = if method_name == "init" { FunctionKind::Initializer } else { FunctionKind::Method };
        self.function(kind, &method_name);
        self.emit_two(OpCode::Method, constant);
    }

    // ---- statements --------------------------------------------------------

    fn statement(&mut self) {
        if self.matches(TokenKind::Print) {
            self.print_statement();
        } else if self.matches(TokenKind::If) {
            self.if_statement();
        } else if self.matches(TokenKind::Return) {
            self.return_statement();
        } else if self.matches(TokenKind::While) {
            self.while_statement();
        } else if self.matches(TokenKind::For) {
            self.for_statement();
        } else if self.matches(TokenKind::Switch) {
            self.switch_statement();
        } else if self.matches(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn return_statement(&mut self) {
        if self.current_fn().kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }
        if self.matches(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.current_fn().kind == FunctionKind::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.matches(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk_mut().code.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");

        if self.matches(TokenKind::Semicolon) {
            // no initializer
        } else if self.matches(TokenKind::Let) {
            self.var_declaration(false);
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk_mut().code.len();
        let mut exit_jump: Option<usize> = None;
        if !self.matches(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.matches(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.chunk_mut().code.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit_op(OpCode::Pop);
        }

        self.end_scope();
    }

    fn switch_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'switch'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after switch expression.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before switch body.");

        let mut end_jumps: Vec<usize> = Vec::new();
        let mut saw_default = false;

        while self.matches(TokenKind::Case) {
            if saw_default {
                self.error("A 'default' case must be the last case in a switch.");
            }
            self.expression();
            self.consume(TokenKind::Colon, "Expect ':' after case value.");
            self.emit_op(OpCode::Compare);
            let next_case = self.emit_jump(OpCode::JumpIfFalse);
            self.emit_op(OpCode::Pop);
            self.emit_op(OpCode::Pop);

            while !self.check(TokenKind::Case)
                && !self.check(TokenKind::Default)
                && !self.check(TokenKind::RightBrace)
                && !self.check(TokenKind::Eof)
            {
                self.statement();
            }
            end_jumps.push(self.emit_jump(OpCode::Jump));
            self.patch_jump(next_case);
            self.emit_op(OpCode::Pop);
            self.emit_op(OpCode::Pop);
        }

        if self.matches(TokenKind::Default) {
            saw_default = true;
            self.consume(TokenKind::Colon, "Expect ':' after 'default'.");
            while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
                self.statement();
            }
        }

        self.consume(TokenKind::RightBrace, "Expect '}' after switch body.");
        for jump in end_jumps {
            self.patch_jump(jump);
        }
        self.emit_op(OpCode::Pop); // the switch subject
    }

    // ---- expressions --------------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix = rule(self.previous.kind).prefix;
        let Some(prefix) = prefix else {
            self.error("Expect expression.");
            return;
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= rule(self.current.kind).precedence {
            self.advance();
            let infix = rule(self.previous.kind).infix.expect("infix rule must exist above None precedence");
            infix(self, can_assign);
        }

        if can_assign && self.matches(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn number(&mut self, _can_assign: bool) {
        let value: f64 = self.previous.lexeme.parse().unwrap_or(0.0);
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self, _can_assign: bool) {
        let lexeme = self.previous.lexeme;
        let text = &lexeme[1..lexeme.len() - 1];
        let ptr = self.heap.intern_string(text);
        self.emit_constant(Value::Obj(ptr));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            _ => unreachable!(),
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self, _can_assign: bool) {
        let op_kind = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match op_kind {
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            TokenKind::Bang => self.emit_op(OpCode::Not),
            _ => unreachable!(),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let op_kind = self.previous.kind;
        let next_precedence = rule(op_kind).precedence.next();
        self.parse_precedence(next_precedence);
        match op_kind {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            _ => unreachable!(),
        }
    }

    fn and_(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self, _can_assign: bool) {
        let argc = self.argument_list();
        self.emit_two(OpCode::Call, argc);
    }

    fn argument_list(&mut self) -> u8 {
        let mut argc: u16 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if argc == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                argc += 1;
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        argc as u8
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name = self.previous.lexeme.to_string();
        let name_constant = self.identifier_constant(&name);

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_two(OpCode::SetProperty, name_constant);
        } else if self.matches(TokenKind::LeftParen) {
            let argc = self.argument_list();
            self.emit_two(OpCode::Invoke, name_constant);
            self.emit_byte(argc);
        } else {
            self.emit_two(OpCode::GetProperty, name_constant);
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous.lexeme.to_string();
        self.named_variable(&name, can_assign);
    }

    fn named_variable(&mut self, name: &str, can_assign: bool) {
        let frame_idx = self.frame_idx();

        let (get_op, set_op, arg, immutable): (OpCode, OpCode, u8, bool) =
            if let Some((slot, immutable)) = self.resolve_local(frame_idx, name) {
                (OpCode::GetLocal, OpCode::SetLocal, slot, immutable)
            } else if let Some((idx, immutable)) = self.resolve_upvalue(frame_idx, name) {
                (OpCode::GetUpvalue, OpCode::SetUpvalue, idx, immutable)
            } else {
                let idx = self.identifier_constant(name);
                let immutable = self.global_is_immutable(name);
                (OpCode::GetGlobal, OpCode::SetGlobal, idx, immutable)
            };

        if can_assign && self.matches(TokenKind::Equal) {
            if immutable {
                self.error(&format!("Cannot assign to immutable variable '{}'.", name));
            }
            self.expression();
            self.emit_two(set_op, arg);
        } else {
            self.emit_two(get_op, arg);
        }
    }

    fn this_(&mut self, _can_assign: bool) {
        if self.class_compilers.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.variable(false);
    }

    fn super_(&mut self, _can_assign: bool) {
        match self.class_compilers.last() {
            None => {
                self.error("Can't use 'super' outside of a class.");
            }
            Some(cc) if !cc.has_superclass => {
                self.error("Can't use 'super' in a class with no superclass.");
            }
            _ => {}
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let method_name = self.previous.lexeme.to_string();
        let name_constant = self.identifier_constant(&method_name);

        let frame_idx = self.frame_idx();
        let this_arg = self.resolve_variable_op(frame_idx, "this");
        self.emit_two(this_arg.0, this_arg.1);

        if self.matches(TokenKind::LeftParen) {
            let argc = self.argument_list();
            let super_arg = self.resolve_variable_op(frame_idx, "super");
            self.emit_two(super_arg.0, super_arg.1);
            self.emit_two(OpCode::SuperInvoke, name_constant);
            self.emit_byte(argc);
        } else {
            let super_arg = self.resolve_variable_op(frame_idx, "super");
            self.emit_two(super_arg.0, super_arg.1);
            self.emit_two(OpCode::GetSuper, name_constant);
        }
    }

    /// Resolves a synthetic binding (`this`/`super`) to a get-opcode and
    /// operand, checking locals then upvalues — never globals, since these
    /// names are never declared at scope depth 0.
    fn resolve_variable_op(&mut self, frame_idx: usize, name: &str) -> (OpCode, u8) {
        if let Some((slot, _)) = self.resolve_local(frame_idx, name) {
            (OpCode::GetLocal, slot)
        } else if let Some((idx, _)) = self.resolve_upvalue(frame_idx, name) {
            (OpCode::GetUpvalue, idx)
        } else {
            self.error(&format!("'{}' must resolve inside a method body.", name));
            (OpCode::GetLocal, 0)
        }
    }

    /// Finishes the function-in-progress: emits the implicit trailing
    /// return, pops the `FunctionCompiler` off the frame stack. Returns
    /// the finished function along with the upvalue descriptors it
    /// recorded, which the caller emits alongside `CLOSURE` (top-level
    /// `compile()` discards the latter — a script has no enclosing
    /// function to capture into).
    fn end_compiler(&mut self) -> (*mut Obj, Vec<UpvalueDesc>) {
        self.emit_return();
        let frame = self.frames.pop().expect("end_compiler called with no active frame");
        (frame.function, frame.upvalues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::object::obj_ref;
    use crate::common::opcode::OpCode;

    fn compile_ok(source: &str) -> *mut Obj {
        let mut heap = Heap::new();
        let mut globals = GlobalDeclTable::new();
        compile(source, &mut heap, &mut globals).unwrap_or_else(|errs| {
            panic!("expected compile success, got errors: {:?}", errs.iter().map(|e| e.to_string()).collect::<Vec<_>>())
        })
    }

    fn compile_err(source: &str) -> Vec<CompileError> {
        let mut heap = Heap::new();
        let mut globals = GlobalDeclTable::new();
        compile(source, &mut heap, &mut globals).expect_err("expected a compile error")
    }

    #[test]
    fn compiles_simple_arithmetic_print() {
        let func = compile_ok("print 1 + 2 * 3;");
        let chunk = &unsafe { obj_ref(func) }.as_function().chunk;
        assert!(chunk.code.contains(&u8::from(OpCode::Print)));
    }

    #[test]
    fn const_reassignment_is_a_compile_error() {
        let errs = compile_err("const k = 1; k = 2;");
        assert!(errs.iter().any(|e| e.message.contains("immutable")));
    }

    #[test]
    fn const_without_initializer_is_a_compile_error() {
        let errs = compile_err("const k;");
        assert!(errs.iter().any(|e| e.message.contains("initialized")));
    }

    #[test]
    fn return_at_top_level_is_a_compile_error() {
        let errs = compile_err("return 1;");
        assert!(errs.iter().any(|e| e.message.contains("top-level")));
    }

    #[test]
    fn this_outside_class_is_a_compile_error() {
        let errs = compile_err("print this;");
        assert!(errs.iter().any(|e| e.message.contains("this")));
    }

    #[test]
    fn class_inheriting_from_itself_is_a_compile_error() {
        let errs = compile_err("class A < A {}");
        assert!(errs.iter().any(|e| e.message.contains("inherit from itself")));
    }

    #[test]
    fn many_constants_force_constant_long() {
        let mut src = String::new();
        for i in 0..300 {
            src.push_str(&format!("let x{} = {};\n", i, i));
        }
        let func = compile_ok(&src);
        let chunk = &unsafe { obj_ref(func) }.as_function().chunk;
        assert!(chunk.code.contains(&u8::from(OpCode::ConstantLong)));
    }
}
