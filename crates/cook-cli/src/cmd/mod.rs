pub mod artifact;
pub mod audit;
pub mod coverage;
pub mod drift;
pub mod index;
pub mod memory;
pub mod patterns;
pub mod validate;
pub mod verify;

use anyhow::{bail, Context};
use cook_core::paths;
use std::path::{Path, PathBuf};

/// Resolve an artifact argument: a path that exists is used as-is,
/// anything else is treated as a slug and matched against the cook dir,
/// newest date first.
pub fn resolve_artifact(root: &Path, arg: &str) -> anyhow::Result<PathBuf> {
    let as_path = root.join(arg);
    if as_path.is_file() {
        return Ok(as_path);
    }
    if Path::new(arg).is_file() {
        return Ok(PathBuf::from(arg));
    }

    paths::validate_slug(arg).with_context(|| format!("'{arg}' is not a file or a valid slug"))?;

    let cook_dir = paths::cook_dir(root);
    let candidates = cook_core::index::scan_artifacts(&cook_dir);
    for path in &candidates {
        if paths::slug_from_filename(path) == arg {
            return Ok(path.clone());
        }
    }

    bail!(
        "no artifact found for '{arg}' in {}",
        cook_dir.display()
    );
}
