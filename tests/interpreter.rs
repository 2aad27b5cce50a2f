//! End-to-end scenarios for the compiler + VM pipeline (§8), run through the
//! public `VirtualMachine::with_output` entry point against an in-memory
//! buffer instead of stdout.

use std::io::{self, Write as _};
use std::sync::{Arc, Mutex};

use myula::backend::vm::InterpretResult;
use myula::VirtualMachine;

/// `Box<dyn Write>` must be `'static`, so a plain `&mut Vec<u8>` can't be
/// handed to `with_output` — share the buffer instead and read it back out
/// once the VM is done with it.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn run(source: &str) -> (InterpretResult, String) {
    let buffer = SharedBuffer::default();
    let mut vm = VirtualMachine::with_output(Box::new(buffer.clone()));
    let result = vm.interpret(source);
    let bytes = buffer.0.lock().unwrap().clone();
    (result, String::from_utf8(bytes).expect("vm output is always valid utf-8"))
}

fn run_lines(source: &str) -> Vec<String> {
    let (result, output) = run(source);
    assert_eq!(result, InterpretResult::Ok, "expected successful run, output so far:\n{}", output);
    output.lines().map(str::to_string).collect()
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(run_lines("print 1 + 2 * 3;"), vec!["7"]);
}

#[test]
fn string_concatenation_interns_the_result() {
    assert_eq!(run_lines(r#"let x = "ab"; let y = "cd"; print x + y;"#), vec!["abcd"]);
}

#[test]
fn closures_capture_a_shared_mutable_upvalue() {
    let lines = run_lines(
        "fun make() { let i = 0; fun inc(){ i = i + 1; return i; } return inc; } \
         let c = make(); print c(); print c(); print c();",
    );
    assert_eq!(lines, vec!["1", "2", "3"]);
}

#[test]
fn for_loop_iterates_with_a_mutable_local() {
    assert_eq!(run_lines("for (let i=0; i<3; i=i+1) print i;"), vec!["0", "1", "2"]);
}

#[test]
fn method_call_on_an_instance() {
    assert_eq!(run_lines(r#"class A { greet(){ print "hi"; } } let a = A(); a.greet();"#), vec!["hi"]);
}

#[test]
fn switch_falls_through_to_the_matching_case_only() {
    assert_eq!(
        run_lines(r#"switch (2) { case 1: print "a"; case 2: print "b"; default: print "c"; }"#),
        vec!["b"]
    );
}

#[test]
fn switch_falls_back_to_default_when_nothing_matches() {
    assert_eq!(
        run_lines(r#"switch (99) { case 1: print "a"; case 2: print "b"; default: print "c"; }"#),
        vec!["c"]
    );
}

#[test]
fn reassigning_a_const_is_a_compile_error() {
    let (result, _) = run("const k = 1; k = 2;");
    assert_eq!(result, InterpretResult::CompileError);
}

#[test]
fn clock_native_returns_a_non_negative_number() {
    assert_eq!(run_lines("print clock() >= 0;"), vec!["true"]);
}

#[test]
fn super_dispatches_to_the_base_method_then_continues_in_the_subclass() {
    let lines = run_lines(
        r#"class Base { greet(){ print "base"; } }
           class Sub < Base { greet(){ super.greet(); print "sub"; } }
           Sub().greet();"#,
    );
    assert_eq!(lines, vec!["base", "sub"]);
}

#[test]
fn init_binds_constructor_arguments_to_fields() {
    assert_eq!(
        run_lines(
            "class Point { init(x,y){ this.x = x; this.y = y; } sum(){ return this.x + this.y; } } \
             print Point(1,2).sum();"
        ),
        vec!["3"]
    );
}

#[test]
fn invoking_a_nonexistent_method_is_a_runtime_error() {
    let (result, output) = run("class A {} A().missing();");
    assert_eq!(result, InterpretResult::RuntimeError);
    assert!(output.is_empty());
}

#[test]
fn inheriting_from_a_non_class_value_is_a_runtime_error() {
    let (result, _) = run("let notAClass = 1; class Sub < notAClass {}");
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn calling_a_non_callable_value_is_a_runtime_error() {
    let (result, _) = run("let n = 1; n();");
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn assigning_an_undeclared_global_is_a_runtime_error() {
    let (result, _) = run("nope = 1;");
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn deep_recursion_triggers_a_stack_overflow_runtime_error() {
    let (result, _) = run("fun rec(n) { return rec(n + 1); } rec(0);");
    assert_eq!(result, InterpretResult::RuntimeError);
}

#[test]
fn field_assignment_round_trips_through_get_and_set_property() {
    assert_eq!(
        run_lines("class Box {} let b = Box(); b.value = 41; b.value = b.value + 1; print b.value;"),
        vec!["42"]
    );
}

#[test]
fn a_stored_closure_field_is_callable_through_invoke() {
    let lines = run_lines(
        "class Holder {} \
         let h = Holder(); \
         fun five() { return 5; } \
         h.fn = five; \
         print h.fn();",
    );
    assert_eq!(lines, vec!["5"]);
}

#[test]
fn stress_gc_does_not_corrupt_a_program_that_allocates_many_strings() {
    let buffer = SharedBuffer::default();
    let mut vm = VirtualMachine::with_output(Box::new(buffer.clone()));
    vm.stress_gc = true;
    let result = vm.interpret(
        "for (let i = 0; i < 50; i = i + 1) { \
             let s = \"a\" + \"b\"; \
             print s; \
         }",
    );
    assert_eq!(result, InterpretResult::Ok);
    let bytes = buffer.0.lock().unwrap().clone();
    let output = String::from_utf8(bytes).unwrap();
    assert_eq!(output.lines().count(), 50);
    assert!(output.lines().all(|line| line == "ab"));
}

#[test]
fn stress_gc_does_not_free_the_cached_init_string_for_an_init_less_class() {
    let buffer = SharedBuffer::default();
    let mut vm = VirtualMachine::with_output(Box::new(buffer.clone()));
    vm.stress_gc = true;
    let result = vm.interpret("class A {} for (let i = 0; i < 20; i = i + 1) { A(); }");
    assert_eq!(result, InterpretResult::Ok);
}
