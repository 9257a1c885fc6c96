use std::cell::RefCell;
use std::rc::Rc;

use sregx::{Error, ExtensionError, Extensions, Sink, compile, evaluator};

/// Compile `expression` with a buffer sink and run it on `input`.
///
/// Returns the evaluation result and everything `p` wrote.
fn run_with(expression: &str, input: &str, extensions: &Extensions) -> (String, String) {
    let printed = Rc::new(RefCell::new(Vec::new()));
    let sink: Sink = printed.clone();
    let command = compile(expression, &sink, extensions).unwrap();
    let output = command.evaluate(input.as_bytes()).unwrap();
    let printed = printed.borrow().clone();
    (
        String::from_utf8(output).unwrap(),
        String::from_utf8(printed).unwrap(),
    )
}

fn run(expression: &str, input: &str) -> String {
    run_with(expression, input, &Extensions::new()).0
}

#[test]
fn renames_c_variable_outside_strings() {
    let expression = r#"y/".*"/ y/'.*'/ x/[a-zA-Z0-9]+/ g/n/ v/../ c/num/"#;
    let input = r#"#include <stdio.h>
int main() {
	char* n = "hello n \n";
	printf("%s\n", n);
}
"#;
    let want = r#"#include <stdio.h>
int main() {
	char* num = "hello n \n";
	printf("%s\n", num);
}
"#;
    assert_eq!(run(expression, "n"), "num");
    assert_eq!(run(expression, input), want);
}

#[test]
fn capitalizes_lone_i() {
    assert_eq!(
        run("x/[A-Za-z]+/ g/i/ v/../ c/I/", "ii i i i iii"),
        "ii I I I iii"
    );
    assert_eq!(
        run("x/[A-Za-z]+/ g/^i$/ c/I/", "i am making tests"),
        "I am making tests"
    );
}

#[test]
fn pipeline_applies_in_order() {
    assert_eq!(run("s/a//b/ | s/b//c/", "aab"), "ccc");
    assert_eq!(run("x/[0-9]+/d | s/  +// /", "a 1 2 b"), "a b");
}

#[test]
fn prints_in_evaluation_order() {
    let (output, printed) = run_with(
        "x/[a-z]+/ p | l[0:1] p",
        "ab 12\ncd\n",
        &Extensions::new(),
    );
    assert_eq!(output, "ab 12\ncd\n");
    assert_eq!(printed, "abcdab 12\n");
}

#[test]
fn prints_matching_lines() {
    // A grep: split into lines, print the ones containing a digit.
    let (_, printed) = run_with(
        r"x/.*\n/ g/[0-9]/ p",
        "one\ntwo 2\nthree\nfour 4\n",
        &Extensions::new(),
    );
    assert_eq!(printed, "two 2\nfour 4\n");
}

#[test]
fn octal_escapes_in_change_text() {
    assert_eq!(run(r"c/\101\102\12/", "x"), "AB\n");
}

#[test]
fn range_out_of_bounds_is_an_error() {
    let sink: Sink = Rc::new(RefCell::new(Vec::new()));
    let command = compile("n[0:10] d", &sink, &Extensions::new()).unwrap();
    match command.evaluate(b"short") {
        Err(Error::RangeOutOfBounds { start, end, len, .. }) => {
            assert_eq!((start, end, len), (0, 10, 5));
        }
        other => panic!("expected range error, got {:?}", other),
    }
}

#[test]
fn every_diagnostic_is_reported() {
    let sink: Sink = Rc::new(RefCell::new(Vec::new()));
    let diagnostics = compile(r"x/a\q/ d | 7 | c/open", &sink, &Extensions::new()).unwrap_err();
    let offsets: Vec<usize> = diagnostics.iter().map(|d| d.offset).collect();
    assert_eq!(offsets, vec![3, 11, 21]);

    let rendered = diagnostics.render(r"x/a\q/ d | 7 | c/open");
    assert!(rendered.contains("invalid escape sequence"));
    assert!(rendered.contains("expected a command letter"));
    assert!(rendered.contains("missing closing '/'"));
}

#[test]
fn extensions_are_per_compilation() {
    let mut shout = Extensions::new();
    shout.register('u', |_| Ok(evaluator(|b| Ok(b.to_ascii_uppercase()))));
    let mut hush = Extensions::new();
    hush.register('u', |_| Ok(evaluator(|b| Ok(b.to_ascii_lowercase()))));

    assert_eq!(run_with("u//", "MiXeD", &shout).0, "MIXED");
    assert_eq!(run_with("u//", "MiXeD", &hush).0, "mixed");
}

#[test]
fn failing_extension_does_not_abort_pipeline() {
    let mut extensions = Extensions::new();
    extensions.register('f', |arg| {
        let fallback = arg.as_bytes().to_vec();
        Ok(evaluator(move |_| {
            Err(ExtensionError::new("simulated failure", fallback.clone()))
        }))
    });
    assert_eq!(
        run_with("x/[0-9]+/ f/#/ | s/x//y/", "x1x22", &extensions).0,
        "y#y#"
    );
}
