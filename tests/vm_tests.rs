// Integration tests driving full source through `scanner` -> `compiler` ->
// `vm` and asserting on captured process stdout/stderr/exit code, the way
// the teacher's own `tests/interpreter_tests.rs` drives its pipeline
// end-to-end rather than unit-testing internals. Because the VM prints
// directly to stdout (spec.md's PRINT opcode), capturing output means
// shelling out to the built binary instead of calling library functions.

use std::io::Write;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

fn run_source(source: &str) -> (String, String, i32) {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let id = COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut path = std::env::temp_dir();
    path.push(format!("wisp_vm_test_{}_{}.wisp", std::process::id(), id));
    let mut file = std::fs::File::create(&path).expect("create temp script");
    file.write_all(source.as_bytes()).expect("write temp script");
    drop(file);

    let output = Command::new(env!("CARGO_BIN_EXE_wisp"))
        .arg(&path)
        .output()
        .expect("run wisp binary");

    let _ = std::fs::remove_file(&path);

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

#[test]
fn arithmetic_precedence() {
    let (stdout, _, code) = run_source("print 1 + 2 * 3;");
    assert_eq!(stdout, "7\n");
    assert_eq!(code, 0);
}

#[test]
fn string_concatenation() {
    let (stdout, _, code) = run_source("var a = \"foo\"; var b = \"bar\"; print a + b;");
    assert_eq!(stdout, "foobar\n");
    assert_eq!(code, 0);
}

#[test]
fn recursive_fibonacci() {
    let source = "fun fib(n){ if (n<2) return n; return fib(n-1)+fib(n-2);} print fib(10);";
    let (stdout, _, code) = run_source(source);
    assert_eq!(stdout, "55\n");
    assert_eq!(code, 0);
}

#[test]
fn closure_captures_and_mutates_upvalue() {
    let source = "fun makeCounter(){ var i=0; fun c(){ i = i+1; return i;} return c;} \
                  var c = makeCounter(); print c(); print c();";
    let (stdout, _, code) = run_source(source);
    assert_eq!(stdout, "1\n2\n");
    assert_eq!(code, 0);
}

#[test]
fn class_with_initializer() {
    let source = "class P { init(x){ this.x = x; } get(){ return this.x; } } print P(42).get();";
    let (stdout, _, code) = run_source(source);
    assert_eq!(stdout, "42\n");
    assert_eq!(code, 0);
}

#[test]
fn inheritance_and_super_call() {
    let source = "class A { greet(){ print \"A\"; } } \
                  class B < A { greet(){ super.greet(); print \"B\"; } } \
                  B().greet();";
    let (stdout, _, code) = run_source(source);
    assert_eq!(stdout, "A\nB\n");
    assert_eq!(code, 0);
}

#[test]
fn adding_number_and_string_is_a_runtime_error() {
    let (stdout, stderr, code) = run_source("print 1 + \"a\";");
    assert_eq!(stdout, "");
    assert!(stderr.contains("Operands must be two numbers or two strings."));
    assert_eq!(code, 70);
}

#[test]
fn undefined_variable_is_a_runtime_error() {
    let (stdout, stderr, code) = run_source("print x;");
    assert_eq!(stdout, "");
    assert!(stderr.contains("Undefined variable 'x'."));
    assert_eq!(code, 70);
}

#[test]
fn compile_error_reports_and_exits_65() {
    let (stdout, stderr, code) = run_source("print 1 +;");
    assert_eq!(stdout, "");
    assert!(stderr.contains("Error"));
    assert_eq!(code, 65);
}

#[test]
fn while_loop_and_logical_operators() {
    let source = "var i = 0; var hits = 0; \
                  while (i < 5) { if (i > 1 and i < 4) { hits = hits + 1; } i = i + 1; } \
                  print hits;";
    let (stdout, _, code) = run_source(source);
    assert_eq!(stdout, "2\n");
    assert_eq!(code, 0);
}

#[test]
fn for_loop_counts_to_ten() {
    let source = "var total = 0; for (var i = 0; i < 10; i = i + 1) { total = total + i; } print total;";
    let (stdout, _, code) = run_source(source);
    assert_eq!(stdout, "45\n");
    assert_eq!(code, 0);
}

#[test]
fn or_short_circuits_and_leaves_truthy_lhs() {
    let (stdout, _, code) = run_source("print nil or \"fallback\"; print \"first\" or \"second\";");
    assert_eq!(stdout, "fallback\nfirst\n");
    assert_eq!(code, 0);
}

#[test]
fn falsey_values_are_exactly_nil_and_false() {
    let source = "print !nil; print !false; print !0; print !\"\";";
    let (stdout, _, code) = run_source(source);
    assert_eq!(stdout, "true\ntrue\nfalse\nfalse\n");
    assert_eq!(code, 0);
}

#[test]
fn field_access_on_non_instance_is_a_runtime_error() {
    let (stdout, stderr, code) = run_source("var x = 1; print x.y;");
    assert_eq!(stdout, "");
    assert!(stderr.contains("Only instances have properties."));
    assert_eq!(code, 70);
}

#[test]
fn nonexistent_file_is_an_io_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_wisp"))
        .arg("/nonexistent/path/does_not_exist.wisp")
        .output()
        .expect("run wisp binary");
    assert_eq!(output.status.code(), Some(74));
}
