use std::{error::Error, path::Path};
use test_utils::{check_compilation, Expected};

/// `map` over a literal list, printed whole: exercises list
/// construction, the higher-order-function call through a closure
/// value, and the recursive list case of the runtime's generic printer.
#[test]
fn map_over_list_literal() -> Result<(), Box<dyn Error>> {
    check_compilation(
        Path::new("./demos/map_list.franz"),
        Expected { stdout: "[2, 4, 6, 8, 10]\n", stderr: "" },
    )
}
