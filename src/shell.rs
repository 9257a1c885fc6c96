//! The `u` command: pipe a span through an external program.
//!
//! `u/sort -r/` runs `sort -r` once per span it is applied to, feeding the
//! span on standard input and splicing in whatever the program writes to
//! standard output.

use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{Result, anyhow, bail};
use sregx::{Evaluator, ExtensionError, evaluator};

/// Build the evaluator for one `u/.../` occurrence.
pub fn factory(argument: &str) -> Result<Evaluator> {
    let words = shlex::split(argument)
        .ok_or_else(|| anyhow!("unbalanced quotes or trailing backslash in {:?}", argument))?;
    let Some((program, args)) = words.split_first() else {
        bail!("no program given");
    };
    let program = program.clone();
    let args = args.to_vec();
    Ok(evaluator(move |input| run(&program, &args, input)))
}

/// Run `program` with `input` on stdin and return its stdout.
///
/// Blocks until the program exits. Spawn failures and non-zero exits are
/// reported with whatever output was produced.
fn run(program: &str, args: &[String], input: &[u8]) -> Result<Vec<u8>, ExtensionError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| ExtensionError::new(format!("{}: {}", program, e), Vec::new()))?;

    let stdin = child.stdin.take();
    let output = thread::scope(|scope| {
        // Feed stdin from a second thread so a program that writes before
        // it finishes reading cannot fill the stdout pipe and stall.
        if let Some(mut stdin) = stdin {
            scope.spawn(move || {
                let _ = stdin.write_all(input);
            });
        }
        child.wait_with_output()
    })
    .map_err(|e| ExtensionError::new(format!("{}: {}", program, e), Vec::new()))?;

    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(ExtensionError::new(
            format!("{}: {}", program, output.status),
            output.stdout,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_rejects_unbalanced_quotes() {
        for argument in ["echo 'oops", "echo \"oops", "echo \\"] {
            let err = factory(argument).err().unwrap();
            assert!(err.to_string().starts_with("unbalanced quotes"));
        }
    }

    #[test]
    fn factory_needs_a_program() {
        assert!(factory("").is_err());
        assert!(factory("   ").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn pipes_span_through_program() {
        let eval = factory("tr a-z A-Z").unwrap();
        assert_eq!(eval("hello".as_bytes()).unwrap(), b"HELLO");
    }

    #[cfg(unix)]
    #[test]
    fn quoted_arguments_reach_the_program() {
        let eval = factory(r#"sh -c 'printf "%s|%s" "$0" "$1"' "a b" c\ d"#).unwrap();
        assert_eq!(eval("".as_bytes()).unwrap(), b"a b|c d");
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_keeps_its_output() {
        let eval = factory("sh -c 'printf partial; exit 3'").unwrap();
        let err = eval("x".as_bytes()).unwrap_err();
        assert_eq!(err.output, b"partial");
    }

    #[test]
    fn missing_program_is_an_extension_error() {
        let eval = factory("sregx-test-no-such-program").unwrap();
        let err = eval("x".as_bytes()).unwrap_err();
        assert!(err.output.is_empty());
        assert!(err.message.starts_with("sregx-test-no-such-program"));
    }
}
