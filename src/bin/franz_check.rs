use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser as ClapParser;
use log::error;

use franz::ast::Opcode;
use franz::freevars;
use franz::infer::{infer_function, Signature};
use franz::loader::Loader;
use franz::types::Type;

#[derive(ClapParser, Debug)]
#[command(author, version, about = "Type-check a Franz source file without compiling it")]
struct Cli {
    /// Entry `.franz` source file.
    file: PathBuf,

    /// Fail if any top-level function signature still contains `UNKNOWN`.
    #[arg(long)]
    strict: bool,

    /// Print every top-level function's inferred signature.
    #[arg(long = "show-types")]
    show_types: bool,
}

fn main() {
    simple_logger::init_with_level(log::Level::Warn).unwrap();
    let args = Cli::parse();

    let file = args.file.to_string_lossy().into_owned();
    let mut loader = Loader::new(&file);
    let modules = match loader.load_entry(&file) {
        Ok(m) => m,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let mut known_functions: HashMap<String, Signature> = HashMap::new();
    let mut had_unknown = false;

    for (path, mut nodes) in modules {
        freevars::analyze_program(&mut nodes);

        for node in &nodes {
            if node.opcode != Opcode::Assignment {
                continue;
            }
            let Some(func) = node.children.first().filter(|c| c.opcode == Opcode::Function) else {
                continue;
            };
            let sig = match infer_function(&path, func, &known_functions) {
                Ok(s) => s,
                Err(e) => {
                    error!("{e}");
                    std::process::exit(1);
                }
            };

            if args.show_types {
                println!("{}: {}", node.value, format_signature(&sig));
            }

            if sig.param_types.iter().any(|t| *t == Type::Unknown) || sig.return_type == Type::Unknown {
                had_unknown = true;
            }

            known_functions.insert(node.value.clone(), sig);
        }
    }

    if args.strict && had_unknown {
        error!("strict type checking failed: at least one signature is UNKNOWN");
        std::process::exit(1);
    }

    println!("ok: {} top-level function(s) checked", known_functions.len());
}

fn format_signature(sig: &Signature) -> String {
    let params: Vec<String> = sig.param_types.iter().map(|t| format!("{t:?}")).collect();
    format!("({}) -> {:?}", params.join(", "), sig.return_type)
}
