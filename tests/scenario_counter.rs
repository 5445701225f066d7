use std::{error::Error, path::Path};
use test_utils::{check_compilation, Expected};

/// Closure captures `count` by reference across calls; each call to `c`
/// mutates the captured environment slot rather than rebinding it.
#[test]
fn counter_closure_mutates_capture() -> Result<(), Box<dyn Error>> {
    check_compilation(
        Path::new("./demos/counter.franz"),
        Expected { stdout: "1\n2\n3\n", stderr: "" },
    )
}
