//! RenderMan `prman` renderer fed a rewritten RIB on stdin.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::artifact::{Artifacts, derive_label};
use crate::error::EngineError;
use crate::recipe::{Invocation, RenderContext, RenderRecipe};

/// Engine key for RenderMan jobs.
pub const NODE_TYPE: &str = "RENDERMAN";

/// Token exported RIB files and their displays are prefixed with.
pub const SCENE_TOKEN: &str = "Scene";

const EXTENSION: &str = "exr";

/// A RIB stream with its `Display` targets redirected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedRib {
    /// The rewritten RIB text.
    pub rib: String,
    /// File names of every display, in declaration order.
    pub outputs: Vec<String>,
}

/// Rewrite every `Display` line so its image lands in `output_dir`.
///
/// The first display keeps a plain path; later displays get RenderMan's `+`
/// prefix so they are added alongside the primary one instead of replacing it.
#[must_use]
pub fn sanitize_rib(source: &str, output_dir: &Path) -> SanitizedRib {
    let mut lines = Vec::new();
    let mut outputs = Vec::new();

    for line in source.lines() {
        let line = line.trim();
        if !line.starts_with("Display ") {
            lines.push(line.to_string());
            continue;
        }

        let mut parts: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        let Some(target) = parts.get(1) else {
            lines.push(line.to_string());
            continue;
        };

        let file_name = Path::new(target.trim_matches('"').trim_start_matches('+'))
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let redirected = output_dir.join(&file_name);
        let prefix = if outputs.is_empty() { "" } else { "+" };
        parts[1] = format!("\"{prefix}{}\"", redirected.display());

        outputs.push(file_name);
        lines.push(parts.join(" "));
    }

    SanitizedRib {
        rib: lines.join("\n"),
        outputs,
    }
}

/// Renders `<scene>/Scene.<frame:04>.rib` through `prman`.
#[derive(Debug, Clone)]
pub struct RendermanRecipe {
    rmantree: PathBuf,
    output_dir: PathBuf,
    outputs: Vec<String>,
}

impl RendermanRecipe {
    /// Create a recipe for the RenderMan install at `rmantree`, writing
    /// images into `output_dir`.
    #[must_use]
    pub fn new(rmantree: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            rmantree: rmantree.into(),
            output_dir: output_dir.into(),
            outputs: Vec::new(),
        }
    }

    /// RIB file for a frame.
    #[must_use]
    pub fn rib_path(job: &RenderContext<'_>) -> PathBuf {
        job.scene_dir()
            .join(format!("{SCENE_TOKEN}.{:04}.rib", job.frame))
    }
}

impl RenderRecipe for RendermanRecipe {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn extension(&self) -> &str {
        EXTENSION
    }

    fn prepare(&mut self, job: &RenderContext<'_>) -> Result<Invocation, EngineError> {
        let rib_path = Self::rib_path(job);
        let source = fs::read_to_string(&rib_path).map_err(|e| EngineError::io(&rib_path, e))?;
        let sanitized = sanitize_rib(&source, &self.output_dir);
        debug!(
            rib = %rib_path.display(),
            outputs = sanitized.outputs.len(),
            "prepared RIB"
        );
        self.outputs = sanitized.outputs;

        Ok(Invocation::new(&job.settings.executable)
            .arg("-cwd")
            .arg(job.scene_dir().to_string_lossy())
            .arg("-Progress")
            .arg("-loglevel")
            .arg("4")
            .arg("-")
            .current_dir(job.scene_dir())
            .env(
                "RENDERMAN_USER_CONFIG",
                job.settings.config_path.to_string_lossy(),
            )
            .env("RMANTREE", self.rmantree.to_string_lossy())
            .env("TMP", self.output_dir.to_string_lossy())
            .stdin(sanitized.rib.into_bytes()))
    }

    fn collect(&mut self, _job: &RenderContext<'_>) -> Result<Artifacts, EngineError> {
        let mut artifacts = Artifacts::new();
        for file_name in &self.outputs {
            let path = self.output_dir.join(file_name);
            let bytes = fs::read(&path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => EngineError::MissingOutput(path.clone()),
                _ => EngineError::io(&path, e),
            })?;
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove temporary render result");
            }
            artifacts.insert(derive_label(file_name, SCENE_TOKEN, EXTENSION), bytes);
        }
        Ok(artifacts)
    }
}
