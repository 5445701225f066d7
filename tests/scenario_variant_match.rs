use std::{error::Error, path::Path};
use test_utils::{check_compilation, Expected};

/// `match` over a `variant` value: a matching tag unpacks its values
/// into the handler's parameters, and a tag none of the clauses name
/// falls through to the trailing default expression.
#[test]
fn match_dispatches_on_variant_tag_or_falls_to_default() -> Result<(), Box<dyn Error>> {
    check_compilation(
        Path::new("./demos/variant_match.franz"),
        Expected { stdout: "9\n16\n0\n", stderr: "" },
    )
}
