//! Render output labelling.

use std::collections::BTreeMap;

/// Captured render outputs, keyed by label.
pub type Artifacts = BTreeMap<String, Vec<u8>>;

/// Label used when an output filename reduces to nothing.
pub const DEFAULT_LABEL: &str = "render";

/// Derive an artifact label from an output filename.
///
/// The name is split on `.` and the scene token, purely numeric tokens (frame
/// numbers), and the extension are dropped. What remains is re-joined with
/// `.`; an empty result yields [`DEFAULT_LABEL`].
///
/// `Scene.beauty.0012.exr` with scene token `Scene` and extension `exr`
/// becomes `beauty`.
#[must_use]
pub fn derive_label(file_name: &str, scene_token: &str, extension: &str) -> String {
    let kept: Vec<&str> = file_name
        .split('.')
        .filter(|part| {
            !part.is_empty()
                && *part != scene_token
                && *part != extension
                && part.parse::<i64>().is_err()
        })
        .collect();

    if kept.is_empty() {
        DEFAULT_LABEL.to_string()
    } else {
        kept.join(".")
    }
}
