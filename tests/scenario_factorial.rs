use std::{error::Error, path::Path};
use test_utils::{check_compilation, Expected};

#[test]
fn factorial_recursion() -> Result<(), Box<dyn Error>> {
    check_compilation(
        Path::new("./demos/factorial.franz"),
        Expected { stdout: "120\n", stderr: "" },
    )
}
