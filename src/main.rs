use std::io::{self, IsTerminal, Read};

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use lisp::config::Config;
use lisp::eval::Machine;
use lisp::reader;

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::from_env();

    // Process command-line flags
    let mut load_files: Vec<String> = Vec::new();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--load" => {
                if i + 1 < args.len() {
                    load_files.push(args[i + 1].clone());
                    i += 2;
                } else {
                    eprintln!("--load requires a file path");
                    std::process::exit(1);
                }
            }
            "--gc-threshold" => {
                let applied = args
                    .get(i + 1)
                    .map_or(false, |raw| config.apply_gc_threshold(raw));
                if !applied {
                    eprintln!("--gc-threshold requires a positive integer");
                    std::process::exit(1);
                }
                i += 2;
            }
            "--no-prelude" => {
                config.prelude = false;
                i += 1;
            }
            "--help" | "-h" => {
                println!("Usage: lisp [OPTIONS]");
                println!();
                println!("Options:");
                println!("  --load <file>         Evaluate a source file before reading stdin");
                println!("  --gc-threshold <n>    Evaluation steps between collections");
                println!("  --no-prelude          Start with primitives only");
                println!("  --help, -h            Show this help message");
                println!();
                println!("Environment variables:");
                println!("  LISP_LOG=<filter>          Log filter, e.g. debug or lisp=trace");
                println!("  LISP_GC_THRESHOLD=<n>      Default for --gc-threshold");
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                eprintln!("Try 'lisp --help' for usage information.");
                std::process::exit(1);
            }
        }
    }

    let mut machine = match Machine::with_primitives(config) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Failed to initialize: {}", e);
            std::process::exit(1);
        }
    };

    for path in &load_files {
        load_file(&mut machine, path);
    }

    if io::stdin().is_terminal() {
        println!(
            "Lisp ({} cells live, {} symbols interned)",
            machine.heap.live_count(),
            machine.symbols.count()
        );
        if let Err(e) = run_interactive(&mut machine) {
            eprintln!("Line editor error: {}", e);
            std::process::exit(1);
        }
    } else {
        run_piped(&mut machine);
    }
}

/// Logs go to stderr, filtered by `LISP_LOG` (default: warnings only).
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_env("LISP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(true))
        .with(filter)
        .init();
}

/// Evaluate a source file form by form, printing each result. A failing
/// form is reported and the rest of the file still runs.
fn load_file(machine: &mut Machine, path: &str) {
    let input = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading {}: {}", path, e);
            std::process::exit(1);
        }
    };
    tracing::debug!(path, bytes = input.len(), "loading file");
    eval_and_print(&input, machine);
}

/// Interactive REPL: accumulate lines until parens are balanced.
fn run_interactive(machine: &mut Machine) -> Result<(), ReadlineError> {
    let mut rl = DefaultEditor::new()?;
    let mut buf = String::new();

    loop {
        let prompt = if buf.is_empty() { "> " } else { "  " };
        match rl.readline(prompt) {
            Ok(line) => {
                buf.push_str(&line);
                buf.push('\n');
                if paren_depth(&buf) > 0 {
                    continue;
                }

                let input = std::mem::take(&mut buf);
                if input.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(input.trim());
                eval_and_print(&input, machine);
            }
            Err(ReadlineError::Interrupted) => buf.clear(),
            Err(ReadlineError::Eof) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

/// Open parens minus close parens, ignoring comments.
fn paren_depth(src: &str) -> i64 {
    let mut depth = 0;
    for line in src.lines() {
        let code = line.split(';').next().unwrap_or("");
        for ch in code.chars() {
            match ch {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
        }
    }
    depth
}

/// Piped mode: read all input, then parse and evaluate one expression at a time.
fn run_piped(machine: &mut Machine) {
    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        eprintln!("Failed to read input: {}", e);
        std::process::exit(1);
    }
    eval_and_print(&input, machine);
}

/// Evaluate each form in a string and print its value. Forms are read one
/// at a time so unread text never holds heap references the collector
/// cannot see.
fn eval_and_print(input: &str, machine: &mut Machine) {
    let mut pos = 0;
    loop {
        match reader::read_one_at(input, pos, &mut machine.heap, &mut machine.symbols) {
            Ok(Some((expr, new_pos))) => {
                pos = new_pos;
                let global = machine.global;
                // Pinned so the form can still be shown if evaluation fails.
                machine.pin(expr);
                match machine.eval(expr, global) {
                    Ok(val) => println!("{}", machine.print(val)),
                    Err(e) => {
                        eprintln!("{}", e);
                        eprintln!("  in: {}", machine.print(expr));
                    }
                }
                machine.unpin(expr);
            }
            Ok(None) => break,
            Err(e) => {
                eprintln!("{}", e);
                break;
            }
        }
    }
}
