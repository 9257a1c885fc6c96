//! Structural regular expressions.
//!
//! An expression such as `x/[a-z]+/ g/^i$/ c/I/` is a pipeline of
//! pattern-scoped edits over a byte buffer. [`compile`] turns the expression
//! text into a [`Command`] tree, and [`Command::evaluate`] applies it.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use sregx::{Extensions, Sink, compile};
//!
//! let sink: Sink = Rc::new(RefCell::new(Vec::new()));
//! let command = compile("x/[A-Za-z]+/ g/^i$/ c/I/", &sink, &Extensions::new()).unwrap();
//! let output = command.evaluate(b"i think i am").unwrap();
//! assert_eq!(output, b"I think I am");
//! ```

pub mod ast;
pub mod error;
pub mod interpreter;
pub mod operators;
pub mod parser;
pub mod ranges;

pub use error::{Diagnostic, Diagnostics, Error, Result};
pub use interpreter::{Extensions, Factory, compile};
pub use operators::{Command, Evaluator, Extension, ExtensionError, Sink, evaluator};
