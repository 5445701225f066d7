use std::{
    error::Error,
    io,
    path::Path,
    process::{Command, Output},
    str,
};

const FRANZ_PATH: &str = "./target/debug/franz";
const FRANZ_CHECK_PATH: &str = "./target/debug/franz-check";
const OUTPUT_PATH: &str = "./output";

pub struct Expected<'a> {
    pub stdout: &'a str,
    pub stderr: &'a str,
}

impl<'a> Expected<'a> {
    fn assert_matches(self, output: &Output) -> Result<(), Box<dyn Error>> {
        assert_eq!(str::from_utf8(&output.stdout)?, self.stdout);
        assert_eq!(str::from_utf8(&output.stderr)?, self.stderr);
        Ok(())
    }
}

fn run_type_checker(src_path: &Path, extra_args: &[&str]) -> Result<Output, io::Error> {
    Command::new(FRANZ_CHECK_PATH).args(extra_args).arg(src_path).output()
}

fn run_compiler(src_path: &Path, out_path: &Path) -> Result<Output, io::Error> {
    Command::new(FRANZ_PATH).arg("-o").arg(out_path).arg(src_path).output()
}

/// Compile `src_path`, run the resulting executable, and assert its
/// stdout/stderr match `expected`. Mirrors `y-lang`'s
/// `check_compilation`, swapped to the `franz` binary's flag shape.
pub fn check_compilation(src_path: &Path, expected: Expected) -> Result<(), Box<dyn Error>> {
    let out_path = Path::new(OUTPUT_PATH).join(src_path.file_stem().unwrap());
    std::fs::create_dir_all(OUTPUT_PATH)?;

    let compile_output = run_compiler(src_path, &out_path)?;
    let compile_stdout = std::str::from_utf8(&compile_output.stdout)?;
    let compile_stderr = std::str::from_utf8(&compile_output.stderr)?;

    println!("{compile_stdout}");
    assert!(compile_stderr.is_empty(), "{}", compile_stderr);
    assert!(
        compile_output.status.success(),
        "franz exited with status {:?}",
        compile_output.status.code()
    );

    let output = Command::new(&out_path).output()?;

    expected.assert_matches(&output)?;
    assert!(
        output.status.success(),
        "compiled program exited with status {:?}",
        output.status.code()
    );

    Ok(())
}

/// Compile `src_path` and assert it fails with a non-zero exit status,
/// for scenarios expected to be rejected before an executable exists
/// (circular import, `ImmutableReassignment`, literal-zero division).
pub fn check_failing_compilation(src_path: &Path) -> Result<(), Box<dyn Error>> {
    let out_path = Path::new(OUTPUT_PATH).join(src_path.file_stem().unwrap());
    std::fs::create_dir_all(OUTPUT_PATH)?;

    let compile_output = run_compiler(src_path, &out_path)?;
    println!("{compile_output:?}");
    assert!(
        !compile_output.status.success(),
        "franz should have exited with a non-zero status"
    );

    Ok(())
}

pub fn check_failing_type_checking(src_path: &Path) -> Result<(), Box<dyn Error>> {
    let type_check_output = run_type_checker(src_path, &["--strict"])?;

    println!("{type_check_output:?}");
    assert!(
        !type_check_output.status.success(),
        "franz-check --strict should exit with a non-zero status"
    );

    Ok(())
}
