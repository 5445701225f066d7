use std::{error::Error, path::Path};
use test_utils::{check_compilation, Expected};

/// `id`'s terminal expression is a bare reference to its only parameter,
/// so its closure record carries the `DYNAMIC` return tag with
/// `param_index = 0` - the same function body must print an int, a
/// string and a float correctly despite a single compiled body.
#[test]
fn polymorphic_identity_round_trips_every_type() -> Result<(), Box<dyn Error>> {
    check_compilation(
        Path::new("./demos/identity.franz"),
        Expected { stdout: "42\nhi\n3.140000\n", stderr: "" },
    )
}
