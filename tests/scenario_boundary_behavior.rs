use std::{error::Error, path::Path};
use test_utils::{check_compilation, check_failing_compilation, Expected};

/// Dividing by a literal `0` is caught at compile time - the divisor
/// is a constant, so there is no runtime value to defer the check to.
#[test]
fn division_by_literal_zero_is_rejected() -> Result<(), Box<dyn Error>> {
    check_failing_compilation(Path::new("./demos/divide_by_literal_zero.franz"))
}

/// `format-int` only supports bases 2, 8, 10, 16; any other literal
/// base is rejected at compile time rather than silently falling back
/// to base 10.
#[test]
fn format_int_with_unsupported_base_is_rejected() -> Result<(), Box<dyn Error>> {
    check_failing_compilation(Path::new("./demos/format_int_bad_base.franz"))
}

/// `format-float`'s precision is clamped to `[0, 17]` at runtime rather
/// than rejected, since unlike the base for `format-int` there is no
/// natural small enum of valid values to check against at compile time.
#[test]
fn format_float_precision_is_clamped_not_rejected() -> Result<(), Box<dyn Error>> {
    check_compilation(
        Path::new("./demos/format_float_precision.franz"),
        Expected { stdout: "3.14158999999999988\n", stderr: "" },
    )
}
