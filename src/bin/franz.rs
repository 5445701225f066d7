use std::path::PathBuf;

use clap::Parser as ClapParser;
use log::error;

use franz::driver::{compile_to_executable, CompileOptions};

#[derive(ClapParser, Debug)]
#[command(author, about = "Ahead-of-time native compiler for Franz", disable_version_flag = true)]
struct Cli {
    /// Entry `.franz` source file. Omit when passing `-c`.
    file: Option<PathBuf>,

    /// Compile a literal snippet of source passed inline, instead of a file.
    #[arg(short = 'c', long = "compile", value_name = "CODE")]
    inline: Option<String>,

    /// Print the compiler's version and exit.
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Output executable path.
    #[arg(short = 'o', long, default_value = "a.out")]
    output: PathBuf,

    /// Dump the generated LLVM IR next to the output.
    #[arg(short = 'd', long)]
    dump_ir: bool,

    /// Disable tail-call elimination in the generated IR.
    #[arg(long = "no-tco")]
    no_tco: bool,

    /// Fail compilation if type inference leaves any signature `UNKNOWN`.
    #[arg(long = "assert-types")]
    assert_types: bool,
}

fn main() {
    let level = if std::env::var("FRANZ_SCOPING").is_ok() { log::Level::Debug } else { log::Level::Warn };
    simple_logger::init_with_level(level).unwrap();

    let args = Cli::parse();

    if args.version {
        println!("franz {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let options = CompileOptions {
        enable_tco: !args.no_tco,
        dump_ir: args.dump_ir,
        assert_types: args.assert_types,
    };

    let (entry, _inline_guard) = match resolve_entry(&args) {
        Ok(resolved) => resolved,
        Err(message) => {
            error!("{message}");
            std::process::exit(1);
        }
    };

    match compile_to_executable(&entry, &args.output, &options) {
        Ok(path) => {
            log::debug!("wrote executable to {}", path.display());
            run(&path);
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}

/// Resolves the compile entry point: a source file path, or (with `-c`)
/// a temp file holding the inline snippet - `compile_to_executable`
/// reads from a path throughout (the loader has to, to resolve relative
/// `use` imports), so an inline snippet still needs one. The returned
/// `TempDir` guard keeps that file alive until compilation finishes.
fn resolve_entry(args: &Cli) -> Result<(String, Option<tempfile_guard::TempDir>), String> {
    match (&args.file, &args.inline) {
        (Some(_), Some(_)) => Err("pass either a source file or -c, not both".into()),
        (None, None) => Err("no input: pass a source file or -c 'code'".into()),
        (Some(file), None) => Ok((file.to_string_lossy().into_owned(), None)),
        (None, Some(code)) => {
            let dir = tempfile_guard::TempDir::new().map_err(|e| format!("cannot create temp dir: {e}"))?;
            let path = dir.path().join("inline.franz");
            std::fs::write(&path, code).map_err(|e| format!("cannot write inline source: {e}"))?;
            Ok((path.to_string_lossy().into_owned(), Some(dir)))
        }
    }
}

/// `franz <source.franz>` compiles and runs by default - exec the freshly
/// linked executable and propagate its exit status as our own.
fn run(path: &std::path::Path) -> ! {
    match std::process::Command::new(path).status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(e) => {
            error!("failed to run compiled executable: {e}");
            std::process::exit(1);
        }
    }
}

/// A minimal self-cleaning temp directory, avoiding a dependency just
/// for `-c`'s one-off scratch file.
mod tempfile_guard {
    use std::io;
    use std::path::{Path, PathBuf};

    pub struct TempDir(PathBuf);

    impl TempDir {
        pub fn new() -> io::Result<Self> {
            let mut dir = std::env::temp_dir();
            dir.push(format!("franz-inline-{}", std::process::id()));
            std::fs::create_dir_all(&dir)?;
            Ok(Self(dir))
        }

        pub fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }
}
