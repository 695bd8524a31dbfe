//! End-to-end tests: parse → compile → run on the VM, asserting against the
//! last-popped value surfaced by the interpreter facade.

use macaque::{Interpreter, Value};
use pretty_assertions::assert_eq;

fn run(input: &str) -> Value {
    Interpreter::new()
        .run(input)
        .unwrap_or_else(|err| panic!("running {:?}: {}", input, err))
}

fn run_err(input: &str) -> String {
    match Interpreter::new().run(input) {
        Err(err) => err.to_string(),
        Ok(value) => panic!("expected {:?} to fail, got {}", input, value),
    }
}

fn int(value: i64) -> Value {
    Value::Integer(value)
}

#[test]
fn integer_arithmetic() {
    let cases = [
        ("1", 1),
        ("1 + 2", 3),
        ("1 - 2", -1),
        ("4 / 2", 2),
        ("7 / 2", 3),
        ("50 / 2 * 2 + 10 - 5", 55),
        ("5 * (2 + 10)", 60),
        ("-5", -5),
        ("-50 + 100 + -50", 0),
        ("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50),
    ];
    for (input, expected) in cases {
        assert_eq!(run(input), int(expected), "input: {}", input);
    }
}

#[test]
fn boolean_expressions() {
    let cases = [
        ("true", true),
        ("false", false),
        ("1 < 2", true),
        ("1 > 2", false),
        ("1 == 1", true),
        ("1 != 2", true),
        ("true == true", true),
        ("true != false", true),
        ("(1 < 2) == true", true),
        ("!true", false),
        ("!!true", true),
        ("!5", false),
        ("!0", false),
        ("!(if (false) { 8; })", true),
    ];
    for (input, expected) in cases {
        assert_eq!(run(input), Value::Boolean(expected), "input: {}", input);
    }
}

#[test]
fn conditionals() {
    let cases = [
        ("if (true) { 10 }", int(10)),
        ("if (true) { 10 } else { 20 }", int(10)),
        ("if (false) { 10 } else { 20 }", int(20)),
        ("if (1) { 10 }", int(10)),
        ("if (1 < 2) { 10 }", int(10)),
        ("if (1 > 2) { 10 }", Value::Null),
        ("if (false) { 10 }", Value::Null),
        // A falsy condition without an alternative feeds null downstream.
        ("if ((if (false) { 10 })) { 10 } else { 20 }", int(20)),
        ("if (1 < 2) { 1 } else if (2 < 3) { 2 } else { 3 }", int(1)),
        ("if (1 > 2) { 1 } else if (2 < 3) { 2 } else { 3 }", int(2)),
        ("if (1 > 2) { 1 } else if (2 > 3) { 2 } else { 3 }", int(3)),
    ];
    for (input, expected) in cases {
        assert_eq!(run(input), expected, "input: {}", input);
    }
}

#[test]
fn global_let_bindings() {
    let cases = [
        ("let one = 1; one", 1),
        ("let one = 1; let two = 2; one + two", 3),
        ("let one = 1; let two = one + one; one + two", 3),
    ];
    for (input, expected) in cases {
        assert_eq!(run(input), int(expected), "input: {}", input);
    }
}

#[test]
fn string_expressions() {
    let cases = [
        (r#""monkey""#, "monkey"),
        (r#""mon" + "key""#, "monkey"),
        (r#""mon" + "key" + "banana""#, "monkeybanana"),
    ];
    for (input, expected) in cases {
        assert_eq!(run(input), Value::Str(expected.into()), "input: {}", input);
    }
}

#[test]
fn array_literals_and_indexing() {
    assert_eq!(run("[]"), Value::Array(vec![]));
    assert_eq!(
        run("[1 + 2, 3 * 4, 5 + 6]"),
        Value::Array(vec![int(3), int(12), int(11)])
    );

    let cases = [
        ("[1, 2, 3][1]", int(2)),
        ("[1, 2, 3][0 + 2]", int(3)),
        ("[[1, 1, 1]][0][0]", int(1)),
        ("[][0]", Value::Null),
        ("[1, 2, 3][99]", Value::Null),
        ("[1][-1]", Value::Null),
    ];
    for (input, expected) in cases {
        assert_eq!(run(input), expected, "input: {}", input);
    }
}

#[test]
fn hash_literals_and_indexing() {
    let cases = [
        ("{1: 2, 3: 4}[3]", int(4)),
        ("{1: 1 + 1, 2: 2 + 2}[2]", int(4)),
        (r#"{"one": 1, "two": 2}["two"]"#, int(2)),
        (r#"let key = "one"; {"one": 5}[key]"#, int(5)),
        ("{true: 5, false: 6}[true]", int(5)),
        ("{}[0]", Value::Null),
        ("{1: 5}[5]", Value::Null),
    ];
    for (input, expected) in cases {
        assert_eq!(run(input), expected, "input: {}", input);
    }
}

#[test]
fn function_calls() {
    let cases = [
        ("let f = fn() { 5 + 10 }; f()", int(15)),
        ("let f = fn() { return 99; 100; }; f()", int(99)),
        ("let f = fn() { }; f()", Value::Null),
        ("let a = fn() { 1 }; let b = fn() { a() + 1 }; b()", int(2)),
        ("let f = fn(a, b) { a + b }; f(2, 3)", int(5)),
        ("let identity = fn(x) { x }; identity(4)", int(4)),
        (
            "let returnsOne = fn() { 1 }; let wrap = fn() { returnsOne }; wrap()()",
            int(1),
        ),
        ("fn(){ 24 }()", int(24)),
    ];
    for (input, expected) in cases {
        assert_eq!(run(input), expected, "input: {}", input);
    }
}

#[test]
fn local_bindings_do_not_leak_between_frames() {
    let cases = [
        ("let f = fn() { let one = 1; one }; f()", int(1)),
        (
            "let f = fn() { let one = 1; let two = 2; one + two }; f()",
            int(3),
        ),
        (
            "let a = fn() { let foo = 50; foo }; let b = fn() { let foo = 100; foo }; a() + b()",
            int(150),
        ),
        (
            "let seed = 50;
             let minusOne = fn() { let num = 1; seed - num };
             let minusTwo = fn() { let num = 2; seed - num };
             minusOne() + minusTwo()",
            int(97),
        ),
        (
            "let globalNum = 10;
             let sum = fn(a, b) { let c = a + b; c + globalNum };
             sum(1, 2) + sum(3, 4) + globalNum",
            int(50),
        ),
    ];
    for (input, expected) in cases {
        assert_eq!(run(input), expected, "input: {}", input);
    }
}

#[test]
fn calls_preserve_the_callers_stack() {
    // The returned value lands exactly where the callee sat.
    let cases = [
        ("let one = fn() { 1 }; one() + one() + one()", int(3)),
        ("1 + fn(a) { a * 2 }(10) + 100", int(121)),
    ];
    for (input, expected) in cases {
        assert_eq!(run(input), expected, "input: {}", input);
    }
}

#[test]
fn top_level_return_ends_the_program() {
    assert_eq!(run("return 10; 20;"), int(10));
    assert_eq!(run("if (true) { return 3; }; 4;"), int(3));
}

#[test]
fn builtin_functions() {
    let cases = [
        (r#"len("")"#, int(0)),
        (r#"len("four")"#, int(4)),
        ("len([1, 2, 3])", int(3)),
        ("len(append([1, 2], 3))", int(3)),
        ("append([], 1)[0]", int(1)),
        ("insert([1, 3], 1, 2)[1]", int(2)),
        ("ordered_remove([1, 2, 3], 0)[0]", int(2)),
        ("unordered_remove([1, 2, 3, 4], 0)[0]", int(4)),
        ("puts()", Value::Null),
    ];
    for (input, expected) in cases {
        assert_eq!(run(input), expected, "input: {}", input);
    }

    // Builtin failures are Error values, not host errors.
    let cases = [
        ("len(1)", "argument to `len` not supported, got INTEGER"),
        (r#"len("one", "two")"#, "wrong number of arguments. got=2, want=1"),
        ("ordered_remove([1], 5)", "index out of bounds"),
    ];
    for (input, expected) in cases {
        assert_eq!(run(input), Value::Error(expected.into()), "input: {}", input);
    }
}

#[test]
fn builtins_can_be_shadowed() {
    assert_eq!(run("let len = 5; len"), int(5));
}

#[test]
fn runtime_errors() {
    let cases = [
        (
            "5 + true",
            "runtime error: unsupported types for binary operation: INTEGER BOOLEAN",
        ),
        (
            "5 + true; 5;",
            "runtime error: unsupported types for binary operation: INTEGER BOOLEAN",
        ),
        (
            r#""mon" - "key""#,
            "runtime error: unsupported types for binary operation: STRING STRING",
        ),
        (
            "-true",
            "runtime error: unsupported type for negation: BOOLEAN",
        ),
        (
            "true < false",
            "runtime error: unknown operator: OpLessThan (BOOLEAN BOOLEAN)",
        ),
        ("10 / 0", "runtime error: division by zero"),
        ("1();", "runtime error: calling non-function"),
        (
            "fn(a) { a }();",
            "runtime error: wrong number of arguments: want=1, got=0",
        ),
        (
            "{[1, 2]: 3}",
            "runtime error: unusable as hash key: ARRAY",
        ),
        (
            "[1, 2][fn() { 1 }]",
            "runtime error: index operator not supported: ARRAY",
        ),
        (
            "{1: 2}[fn() { 1 }]",
            "runtime error: unusable as hash key: COMPILED_FUNCTION",
        ),
        (
            r#""string"[0]"#,
            "runtime error: index operator not supported: STRING",
        ),
    ];
    for (input, expected) in cases {
        assert_eq!(run_err(input), expected, "input: {}", input);
    }
}

#[test]
fn mixed_type_equality_is_structural() {
    // One integer operand no longer drags the other through the integer
    // comparison; differing types simply compare unequal.
    assert_eq!(run("1 == true"), Value::Boolean(false));
    assert_eq!(run("1 != true"), Value::Boolean(true));
    assert_eq!(run(r#""1" == 1"#), Value::Boolean(false));
}

#[test]
fn compile_errors() {
    let cases = [
        ("foobar", "compile error: undefined variable foobar"),
        (
            "fn(a) { fn() { a } }",
            "compile error: capturing outer locals not supported: a",
        ),
    ];
    for (input, expected) in cases {
        assert_eq!(run_err(input), expected, "input: {}", input);
    }
}
