//! C7 - compilation driver.
//!
//! Orchestrates the pipeline end to end: load the entry module and
//! everything it transitively imports (C6), run free-variable analysis
//! over every module (C1), hand the flattened program to the code
//! generator (C2-C4, internally), emit an LLVM object file and link it
//! with the system `cc` into a native executable. Modeled on `y_lang`'s
//! `compiler::Compiler::compile_program`, which drives nasm + `cc`
//! through the same "write intermediate, shell out, link" shape - here
//! the intermediate is an LLVM module instead of assembly text.

use std::path::{Path, PathBuf};
use std::process::Command;

use inkwell::context::Context;
use inkwell::targets::{CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine};
use inkwell::OptimizationLevel;
use log::{debug, info};

use crate::codegen::context::CodegenContext;
use crate::error::{FranzError, IrVerification};
use crate::loader::Loader;
use crate::span::Span;
use crate::{codegen, freevars};

pub struct CompileOptions {
    pub enable_tco: bool,
    pub dump_ir: bool,
    pub assert_types: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            enable_tco: true,
            dump_ir: false,
            assert_types: false,
        }
    }
}

/// Compile `entry` to a native executable at `output`. Returns the
/// path actually written (`output` verbatim - the temp `.o`/`.ll` files
/// alongside it are left for inspection when `dump_ir` is set, removed
/// otherwise).
pub fn compile_to_executable(
    entry: &str,
    output: &Path,
    options: &CompileOptions,
) -> Result<PathBuf, FranzError> {
    let mut loader = Loader::new(entry);
    let modules = loader.load_entry(entry)?;
    debug!("loaded {} module(s)", modules.len());

    let mut program: Vec<crate::ast::Node> = Vec::new();
    for (path, mut nodes) in modules {
        freevars::analyze_program(&mut nodes);
        debug!("analyzed module '{path}' ({} top-level node(s))", nodes.len());
        program.extend(nodes);
    }

    let context = Context::create();
    let module_name = Path::new(entry)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "franz_module".to_string());

    let mut ctx = CodegenContext::new(&context, &module_name, options.enable_tco);
    codegen::compile_program(&mut ctx, entry, &program)?;

    if options.dump_ir {
        let ir_path = output.with_extension("ll");
        ctx.module
            .print_to_file(&ir_path)
            .map_err(|e| FranzError::IrVerification(IrVerification { message: e.to_string() }, Span::new(entry, 0)))?;
        debug!("wrote IR to {}", ir_path.display());
    }

    let object_path = output.with_extension("o");
    emit_object(&ctx, &object_path)?;
    link(&object_path, output)?;

    if !options.dump_ir {
        let _ = std::fs::remove_file(&object_path);
    }

    Ok(output.to_path_buf())
}

fn emit_object(ctx: &CodegenContext<'_>, object_path: &Path) -> Result<(), FranzError> {
    Target::initialize_native(&InitializationConfig::default())
        .map_err(|e| FranzError::IrVerification(IrVerification { message: e }, Span::new("", 0)))?;

    let triple = TargetMachine::get_default_triple();
    let target = Target::from_triple(&triple)
        .map_err(|e| FranzError::IrVerification(IrVerification { message: e.to_string() }, Span::new("", 0)))?;
    let machine = target
        .create_target_machine(
            &triple,
            &TargetMachine::get_host_cpu_name().to_string(),
            &TargetMachine::get_host_cpu_features().to_string(),
            OptimizationLevel::Default,
            RelocMode::PIC,
            CodeModel::Default,
        )
        .ok_or_else(|| FranzError::IrVerification(IrVerification { message: "no target machine available".into() }, Span::new("", 0)))?;

    machine
        .write_to_file(&ctx.module, FileType::Object, object_path)
        .map_err(|e| FranzError::IrVerification(IrVerification { message: e.to_string() }, Span::new("", 0)))
}

/// Link the generated object against the C runtime with `clang`, the
/// same shell-out-to-the-linker shape as `y_lang`'s `link_program`.
fn link(object_path: &Path, output: &Path) -> Result<(), FranzError> {
    info!("linking program...");

    let runtime_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("runtime");
    let runtime_c = runtime_dir.join("franz_runtime.c");

    let result = Command::new("clang")
        .args([
            "-o",
            &output.to_string_lossy(),
            &object_path.to_string_lossy(),
            &runtime_c.to_string_lossy(),
            "-lm",
        ])
        .output()
        .map_err(|e| FranzError::IrVerification(IrVerification { message: format!("failed to invoke clang: {e}") }, Span::new("", 0)))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
        return Err(FranzError::IrVerification(IrVerification { message: format!("link failed: {stderr}") }, Span::new("", 0)));
    }

    Ok(())
}
