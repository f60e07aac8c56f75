//! Test fixture helpers shared across the workspace.

use std::path::{Path, PathBuf};

/// Returns the full path to the specified fixture.
///
/// Fixtures live in the `fixtures` directory of whichever crate's tests
/// call this, and paths should be given relative to that location.
///
/// # Example
///
/// ```
/// use nd_testutils::fixture;
///
/// let path = fixture("elf/hello.debug_abbrev");
/// assert!(path.ends_with("elf/hello.debug_abbrev"));
/// ```
pub fn fixture<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut full_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    full_path.push("fixtures");

    let path = path.as_ref();
    full_path.push(path);

    assert!(full_path.exists(), "fixture does not exist: {}", full_path.display());

    full_path
}
