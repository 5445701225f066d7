use std::{error::Error, path::Path};
use test_utils::{check_compilation, Expected};

/// `is_even`/`is_odd` call each other before either has a forward
/// declaration in source order - pass 1's signature discovery and pass
/// 2's forward declarations have to run ahead of body codegen for this
/// to link at all.
#[test]
fn mutual_recursion_terminates() -> Result<(), Box<dyn Error>> {
    check_compilation(
        Path::new("./demos/mutual_recursion.franz"),
        Expected { stdout: "1\n", stderr: "" },
    )
}
