use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::env;
use std::fs;
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;
use trifle::Error;
use trifle::ast::Value;
use trifle::evaluator::{self, Environment};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = env::args().nth(1) {
        process::exit(run_file(&path));
    }

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// Run a whole program. Returns the process exit status.
fn run_file(path: &str) -> i32 {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read {path}: {err}");
            return 1;
        }
    };

    let env = evaluator::create_global_env();
    match evaluator::run_source(&source, &env) {
        Ok(_) => 0,
        Err(Error::Exit(code)) => code,
        Err(err @ Error::Exception(_)) => {
            eprintln!("{err}");
            1
        }
    }
}

fn run_repl() {
    println!("Trifle interpreter");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            process::exit(1);
        }
    };
    let env = evaluator::create_global_env();

    loop {
        match rl.readline("trifle> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(&env);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                // The environment persists, so definitions carry over between lines
                match evaluator::run_source(line, &env) {
                    Ok(result) => println!("{result}"),
                    Err(Error::Exit(code)) => process::exit(code),
                    Err(err) => println!("{err}"),
                }
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("Trifle REPL commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Literals:");
    println!("  Numbers: 42, -5, 1_000, 1/3, 2.5");
    println!("  Booleans and null: #true, #false, #null");
    println!("  Text: \"string\", 'c', #bytes(\"\\x00ab\")");
    println!("  Symbols and keywords: name, :key");
    println!("  Lists and hashmaps: (1 2 3), {{:a 1 :b 2}}");
    println!();
    println!("Examples:");
    println!("  (set-symbol! (quote square) (lambda (x) (* x x)))");
    println!("  (square 1/3)");
    println!("  (try (/ 1 0) :catch division-by-zero e (message e))");
    println!("  (macro unless (condition then) (quote (if (unquote condition) #null (unquote then))))");
    println!();
    println!("Set RUST_LOG=trifle=debug to trace exceptions and macro expansion.");
}

fn print_environment(env: &Environment) {
    let mut bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }
    bindings.sort_by(|(a, _), (b, _)| a.cmp(b));

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Function(_) | Value::SpecialForm(_) | Value::ExceptionType(_) => {
                builtins.push(name)
            }
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in bindings ({}):", builtins.len());
        let mut col = 0;
        for name in builtins {
            print!("  {name:<22}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
