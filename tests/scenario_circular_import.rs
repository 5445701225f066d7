use std::{error::Error, path::Path};
use test_utils::check_failing_compilation;

/// `circular_a.franz` imports `circular_b.franz` which imports it back;
/// the loader's import stack has to catch this before codegen ever
/// starts, since there is no static recursion-depth limit otherwise.
#[test]
fn direct_circular_import_is_rejected() -> Result<(), Box<dyn Error>> {
    check_failing_compilation(Path::new("./demos/circular_a.franz"))
}
