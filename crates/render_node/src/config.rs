//! Node configuration.
//!
//! Settings come from the command line (with environment fallbacks) and an
//! optional TOML engines file:
//!
//! ```toml
//! scene_path = "/mnt/scenes"
//!
//! [engines.blender]
//! kind = "blender"
//! exec = "/opt/blender/blender"
//! config_path = "/etc/render/blender"
//! timeout = 3600
//! attempts = 3
//! cache_dir = "/tmp/blender-cache"
//!
//! [engines.prman]
//! kind = "renderman"
//! enabled = false
//! exec = "/opt/pixar/RenderManProServer/bin/prman"
//! config_path = "/etc/render/rman"
//! rmantree = "/opt/pixar/RenderManProServer"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use render_engine::{
    AdapterSettings, BlenderRecipe, EngineAdapter, ProcessAdapter, RenderRegistry,
    RendermanRecipe,
};
use render_net::connection::{DEFAULT_NATS_URL, NATS_URL_ENV};
use render_net::manager::{DEFAULT_MANAGER_URL, MANAGER_URL_ENV};

/// Default directory scene identifiers are resolved against.
pub const DEFAULT_SCENE_PATH: &str = "/tmp";

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "render_node", about = "Render farm worker node over NATS JetStream")]
pub struct Args {
    /// TOML file describing the render engines
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// NATS server URL
    #[arg(short, long, env = NATS_URL_ENV, default_value = DEFAULT_NATS_URL)]
    pub nats_url: String,

    /// Farm manager base URL
    #[arg(short, long, env = MANAGER_URL_ENV, default_value = DEFAULT_MANAGER_URL)]
    pub manager_url: String,

    /// Directory scene identifiers are resolved against [default: /tmp]
    #[arg(short, long)]
    pub scene_path: Option<PathBuf>,

    /// Name this node tags its events with [default: random UUID]
    #[arg(long)]
    pub node_name: Option<String>,

    /// Seconds between render checks and queue refreshes
    #[arg(long, default_value_t = 5)]
    pub check_interval: u64,

    /// Seconds to wait before retrying a failed broker connection
    #[arg(long, default_value_t = 5)]
    pub reconnect_delay: u64,

    /// Milliseconds between dispatcher polls
    #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,
}

/// Contents of the engines file.
#[derive(Debug, Default, Deserialize)]
pub struct EnginesFile {
    /// Scene root; the `--scene-path` flag takes precedence.
    #[serde(default)]
    pub scene_path: Option<PathBuf>,
    /// Engine sections keyed by a free-form name.
    #[serde(default)]
    pub engines: BTreeMap<String, EngineSection>,
}

impl EnginesFile {
    /// Parse an engines file.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read and parse an engines file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read engines file {}", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("failed to parse engines file {}", path.display()))
    }
}

fn enabled_default() -> bool {
    true
}

fn timeout_default() -> f64 {
    -1.0
}

fn attempts_default() -> u32 {
    1
}

/// Settings shared by every engine kind.
#[derive(Debug, Clone, Deserialize)]
pub struct CommonSection {
    /// Whether the engine is registered at startup.
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Renderer executable.
    pub exec: PathBuf,
    /// Renderer user configuration directory.
    pub config_path: PathBuf,
    /// Seconds per attempt; negative disables the timeout.
    #[serde(default = "timeout_default")]
    pub timeout: f64,
    /// Maximum attempts per render.
    #[serde(default = "attempts_default")]
    pub attempts: u32,
}

impl CommonSection {
    fn settings(&self, scene_root: &Path) -> AdapterSettings {
        AdapterSettings::new(&self.exec, &self.config_path, scene_root)
            .with_timeout_secs(self.timeout)
            .with_attempts(self.attempts)
    }
}

fn blender_output_default() -> PathBuf {
    PathBuf::from("/tmp/Renders")
}

fn scratch_default() -> PathBuf {
    PathBuf::from("/tmp")
}

/// `kind = "blender"`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlenderSection {
    /// Shared settings.
    #[serde(flatten)]
    pub common: CommonSection,
    /// Where frames are written.
    #[serde(default = "blender_output_default")]
    pub output_dir: PathBuf,
    /// Where the seed script and `TMP` point.
    #[serde(default = "scratch_default")]
    pub scratch_dir: PathBuf,
    /// Directory purged whenever a Blender process is released.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

/// `kind = "renderman"`.
#[derive(Debug, Clone, Deserialize)]
pub struct RendermanSection {
    /// Shared settings.
    #[serde(flatten)]
    pub common: CommonSection,
    /// RenderMan installation root.
    pub rmantree: PathBuf,
    /// Where displays are redirected.
    #[serde(default = "scratch_default")]
    pub output_dir: PathBuf,
}

/// One `[engines.<name>]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EngineSection {
    /// Blender command-line renderer.
    Blender(BlenderSection),
    /// RenderMan `prman`.
    Renderman(RendermanSection),
}

impl EngineSection {
    /// Settings shared by every kind.
    #[must_use]
    pub fn common(&self) -> &CommonSection {
        match self {
            Self::Blender(section) => &section.common,
            Self::Renderman(section) => &section.common,
        }
    }

    /// Build the adapter this section describes.
    #[must_use]
    pub fn build(&self, scene_root: &Path) -> Box<dyn EngineAdapter> {
        let settings = self.common().settings(scene_root);
        match self {
            Self::Blender(section) => {
                let mut recipe = BlenderRecipe::new(&section.output_dir, &section.scratch_dir);
                if let Some(cache_dir) = &section.cache_dir {
                    recipe = recipe.with_cache_dir(cache_dir);
                }
                Box::new(ProcessAdapter::new(recipe, settings))
            }
            Self::Renderman(section) => {
                let recipe = RendermanRecipe::new(&section.rmantree, &section.output_dir);
                Box::new(ProcessAdapter::new(recipe, settings))
            }
        }
    }
}

/// Resolved configuration of a render node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Name events are tagged with.
    pub node_name: String,
    /// NATS server URL.
    pub nats_url: String,
    /// Farm manager base URL.
    pub manager_url: String,
    /// Directory scene identifiers are resolved against.
    pub scene_path: PathBuf,
    /// Period of render checks and queue refreshes.
    pub check_interval: Duration,
    /// Delay between failed broker connection attempts.
    pub reconnect_delay: Duration,
    /// Period of dispatcher polls.
    pub poll_interval: Duration,
    /// Engine sections keyed by name.
    pub engines: BTreeMap<String, EngineSection>,
}

impl NodeConfig {
    /// Create a config with default endpoints and timings and no engines.
    #[must_use]
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            nats_url: DEFAULT_NATS_URL.to_string(),
            manager_url: DEFAULT_MANAGER_URL.to_string(),
            scene_path: PathBuf::from(DEFAULT_SCENE_PATH),
            check_interval: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            engines: BTreeMap::new(),
        }
    }

    /// Override the NATS URL.
    #[must_use]
    pub fn with_nats_url(mut self, url: impl Into<String>) -> Self {
        self.nats_url = url.into();
        self
    }

    /// Override the manager URL.
    #[must_use]
    pub fn with_manager_url(mut self, url: impl Into<String>) -> Self {
        self.manager_url = url.into();
        self
    }

    /// Override the scene root.
    #[must_use]
    pub fn with_scene_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.scene_path = path.into();
        self
    }

    /// Add an engine section.
    #[must_use]
    pub fn with_engine(mut self, name: impl Into<String>, section: EngineSection) -> Self {
        self.engines.insert(name.into(), section);
        self
    }

    /// Resolve command-line arguments, loading the engines file if given.
    ///
    /// # Errors
    ///
    /// Returns an error if the engines file cannot be loaded or the scene
    /// root is not a directory.
    pub fn from_args(args: Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => EnginesFile::load(path)?,
            None => EnginesFile::default(),
        };

        let scene_path = args
            .scene_path
            .or(file.scene_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCENE_PATH));
        ensure!(
            scene_path.is_dir(),
            "scene path {} is not a directory",
            scene_path.display()
        );

        let node_name = args
            .node_name
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut config = Self::new(node_name)
            .with_nats_url(args.nats_url)
            .with_manager_url(args.manager_url)
            .with_scene_path(scene_path);
        config.check_interval = Duration::from_secs(args.check_interval);
        config.reconnect_delay = Duration::from_secs(args.reconnect_delay);
        config.poll_interval = Duration::from_millis(args.poll_interval_ms);
        config.engines = file.engines;
        Ok(config)
    }

    /// Build a registry holding one adapter per enabled engine, keyed by the
    /// engine's job type.
    #[must_use]
    pub fn build_registry(&self) -> RenderRegistry {
        let mut registry = RenderRegistry::new();
        for (name, section) in &self.engines {
            if !section.common().enabled {
                info!(engine = %name, "render engine disabled");
                continue;
            }
            let adapter = section.build(&self.scene_path);
            if registry.can_handle(adapter.node_type()) {
                warn!(
                    engine = %name,
                    job_type = adapter.node_type(),
                    "duplicate engine type, replacing earlier section"
                );
            }
            registry.register_adapter(adapter);
        }
        registry
    }
}
