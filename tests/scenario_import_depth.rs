use std::{error::Error, fs, path::Path};
use test_utils::check_failing_compilation;

/// A straight-line import chain with no cycle, but deeper than the
/// loader's `MAX_IMPORT_DEPTH`, is rejected the same way a true cycle
/// is - the depth cap exists precisely because nothing else bounds an
/// acyclic chain.
#[test]
fn overlong_import_chain_is_rejected() -> Result<(), Box<dyn Error>> {
    let dir = Path::new("./output/import_depth_chain");
    fs::create_dir_all(dir)?;

    const CHAIN_LEN: usize = 257;
    for i in 0..CHAIN_LEN {
        let contents = if i + 1 < CHAIN_LEN {
            format!("(use \"chain_{}.franz\" {{->}})\n", i + 1)
        } else {
            "(println 0)\n".to_string()
        };
        fs::write(dir.join(format!("chain_{i}.franz")), contents)?;
    }

    check_failing_compilation(&dir.join("chain_0.franz"))
}
