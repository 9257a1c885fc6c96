use std::cell::RefCell;
use std::fs;
use std::io::{self, BufWriter, IsTerminal, Read};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{Level, debug};
use yansi::Paint;

use sregx::{Diagnostics, Extensions, Sink, compile, parser};

mod shell;

#[derive(Parser)]
#[command(name = "sregx", version)]
#[command(
    about = "Structural regular expressions: edit text by extracting, guarding and changing the parts a pattern matches."
)]
struct Cli {
    /// Expression to evaluate, e.g. 'x/[a-z]+/ g/^i$/ c/I/'
    expression: String,

    /// Input file; standard input when absent or '-'
    file: Option<PathBuf>,

    /// Rewrite the input file instead of writing to standard output
    #[arg(short = 'i', long = "in-place")]
    in_place: bool,

    /// Print the expression's parse tree as JSON and exit
    #[arg(long = "tree")]
    tree: bool,

    /// Log debug information to standard error
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

impl Cli {
    /// The input file, unless input comes from standard input.
    fn input_path(&self) -> Option<&PathBuf> {
        self.file.as_ref().filter(|path| path.as_os_str() != "-")
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
    if !io::stderr().is_terminal() {
        yansi::disable();
    }

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    if cli.tree {
        return print_tree(&cli.expression);
    }

    let data = match cli.input_path() {
        Some(path) => {
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?
        }
        None => {
            let mut data = Vec::new();
            io::stdin()
                .read_to_end(&mut data)
                .context("failed to read standard input")?;
            data
        }
    };

    let mut extensions = Extensions::new();
    extensions.register('u', shell::factory);

    // In place, output is buffered so the file is only touched once the
    // expression has compiled and run.
    let in_place = if cli.in_place { cli.input_path() } else { None };
    let buffer = Rc::new(RefCell::new(Vec::new()));
    let sink: Sink = match in_place {
        Some(_) => buffer.clone(),
        None => Rc::new(RefCell::new(BufWriter::new(io::stdout().lock()))),
    };

    let command = match compile(&cli.expression, &sink, &extensions) {
        Ok(command) => command,
        Err(diagnostics) => {
            report(&cli.expression, &diagnostics);
            std::process::exit(1);
        }
    };
    debug!(input_bytes = data.len(), "evaluating");

    let output = command.evaluate(&data)?;
    if !command.contains_print() {
        sink.borrow_mut()
            .write_all(&output)
            .context("failed to write output")?;
    }
    sink.borrow_mut().flush().context("failed to flush output")?;

    if let Some(path) = in_place {
        fs::write(path, buffer.borrow().as_slice())
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn print_tree(expression: &str) -> Result<()> {
    let (tree, diagnostics) = parser::parse(expression);
    if !diagnostics.is_empty() {
        report(expression, &Diagnostics::from(diagnostics));
        std::process::exit(1);
    }
    let json = serde_json::to_string_pretty(&tree).context("failed to serialize parse tree")?;
    println!("{}", json);
    Ok(())
}

/// Print every diagnostic with a caret under its position.
fn report(expression: &str, diagnostics: &Diagnostics) {
    for diagnostic in diagnostics {
        eprintln!("{} {}", "error:".red().bold(), diagnostic.render(expression));
    }
}
