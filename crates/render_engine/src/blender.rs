//! Blender command-line renderer.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::artifact::{Artifacts, DEFAULT_LABEL};
use crate::error::EngineError;
use crate::recipe::{Invocation, RenderContext, RenderRecipe};

/// Engine key for Blender jobs.
pub const NODE_TYPE: &str = "BLENDER";

/// Scene file expected inside each scene directory.
pub const SCENE_FILE: &str = "scene.blend";

const SEED_SCRIPT_NAME: &str = "seed_script.py";

const SEED_SCRIPT: &str = concat!(
    "import bpy\n",
    "import time\n",
    "seed = int(time.time())\n",
    "for scene in bpy.data.scenes:\n",
    "    scene.cycles.seed = seed\n",
);

/// Renders one frame of `<scene>/scene.blend` to a PNG.
#[derive(Debug, Clone)]
pub struct BlenderRecipe {
    output_dir: PathBuf,
    scratch_dir: PathBuf,
    cache_dir: Option<PathBuf>,
}

impl BlenderRecipe {
    /// Create a recipe writing frames into `output_dir` and helper files into
    /// `scratch_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            scratch_dir: scratch_dir.into(),
            cache_dir: None,
        }
    }

    /// Purge every file in `dir` whenever a renderer process is released.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Where Blender writes `frame`.
    #[must_use]
    pub fn output_path(&self, frame: i64) -> PathBuf {
        self.output_dir.join(format!("render_{frame:08}.png"))
    }

    fn seed_script_path(&self) -> PathBuf {
        self.scratch_dir.join(SEED_SCRIPT_NAME)
    }
}

impl Default for BlenderRecipe {
    fn default() -> Self {
        Self::new("/tmp/Renders", "/tmp")
    }
}

impl RenderRecipe for BlenderRecipe {
    fn node_type(&self) -> &str {
        NODE_TYPE
    }

    fn extension(&self) -> &str {
        "png"
    }

    fn prepare(&mut self, job: &RenderContext<'_>) -> Result<Invocation, EngineError> {
        let seed_script = self.seed_script_path();
        fs::write(&seed_script, SEED_SCRIPT).map_err(|e| EngineError::io(&seed_script, e))?;
        fs::create_dir_all(&self.output_dir).map_err(|e| EngineError::io(&self.output_dir, e))?;

        // A leftover frame from an earlier attempt would pass the success check.
        remove_if_present(&self.output_path(job.frame));

        let scene_file = job.scene_dir().join(SCENE_FILE);
        let output_pattern = self.output_dir.join("render_########");

        Ok(Invocation::new(&job.settings.executable)
            .arg("-b")
            .arg(scene_file.to_string_lossy())
            .arg("-y")
            .arg("-P")
            .arg(seed_script.to_string_lossy())
            .arg("-noaudio")
            .arg("-o")
            .arg(output_pattern.to_string_lossy())
            .arg("-F")
            .arg("PNG")
            .arg("-f")
            .arg(job.frame.to_string())
            .env(
                "BLENDER_USER_CONFIG",
                job.settings.config_path.to_string_lossy(),
            )
            .env("TMP", self.scratch_dir.to_string_lossy()))
    }

    fn collect(&mut self, job: &RenderContext<'_>) -> Result<Artifacts, EngineError> {
        let path = self.output_path(job.frame);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::MissingOutput(path.clone()),
            _ => EngineError::io(&path, e),
        })?;
        if let Err(e) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "failed to remove temporary render result");
        }

        let mut artifacts = Artifacts::new();
        artifacts.insert(DEFAULT_LABEL.to_string(), bytes);
        Ok(artifacts)
    }

    fn verify_despite_failure(&self, job: &RenderContext<'_>) -> bool {
        self.output_path(job.frame).exists()
    }

    fn cleanup(&mut self, _job: &RenderContext<'_>) -> Result<(), EngineError> {
        let Some(cache_dir) = &self.cache_dir else {
            return Ok(());
        };
        let entries = fs::read_dir(cache_dir).map_err(|e| EngineError::io(cache_dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| EngineError::io(cache_dir, e))?.path();
            if path.is_file() {
                fs::remove_file(&path).map_err(|e| EngineError::io(&path, e))?;
            }
        }
        debug!(dir = %cache_dir.display(), "purged render cache");
        Ok(())
    }
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale render output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove stale render output"),
    }
}
