//! Render registry: the node's table of engine adapters.
//!
//! The registry owns one adapter per engine key and remembers which one ran
//! the current job, so status, log, and artifact queries can be forwarded
//! without the caller tracking the engine type.

use std::collections::HashMap;

use tracing::info;

use crate::adapter::EngineAdapter;
use crate::artifact::Artifacts;
use crate::error::EngineError;
use crate::state::ProcessState;

/// Metadata of the job most recently started through the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderInfo {
    /// Frame number.
    pub frame: i64,
    /// Scene identifier.
    pub scene: String,
    /// Job identifier assigned by the manager.
    pub uuid: String,
    /// Engine key.
    pub render_type: String,
}

/// Type-keyed collection of engine adapters.
#[derive(Default)]
pub struct RenderRegistry {
    adapters: HashMap<String, Box<dyn EngineAdapter>>,
    active: Option<String>,
    last_info: Option<RenderInfo>,
}

impl std::fmt::Debug for RenderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderRegistry")
            .field("engines", &self.adapters.keys().collect::<Vec<_>>())
            .field("active", &self.active)
            .field("last_info", &self.last_info)
            .finish()
    }
}

static NO_ARTIFACTS: Artifacts = Artifacts::new();

impl RenderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under `key`, replacing any previous one.
    pub fn register(&mut self, key: impl Into<String>, adapter: Box<dyn EngineAdapter>) {
        let key = key.into();
        info!(engine = %key, "registered render engine");
        if let Some(mut previous) = self.adapters.insert(key, adapter) {
            previous.stop_render();
        }
    }

    /// Register an adapter under its own [`node_type`](EngineAdapter::node_type).
    pub fn register_adapter(&mut self, adapter: Box<dyn EngineAdapter>) {
        let key = adapter.node_type().to_string();
        self.register(key, adapter);
    }

    /// Whether jobs of type `key` can be rendered here.
    #[must_use]
    pub fn can_handle(&self, key: &str) -> bool {
        self.adapters.contains_key(key)
    }

    /// Registered engine keys, sorted.
    #[must_use]
    pub fn engine_types(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Start rendering `frame` of `scene` on the adapter registered as
    /// `render_type`, making it the active adapter.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownEngine`] if no adapter is registered for
    /// `render_type`.
    pub fn render(
        &mut self,
        scene: &str,
        frame: i64,
        uuid: &str,
        render_type: &str,
    ) -> Result<(), EngineError> {
        if self.can_handle(render_type)
            && self.active.as_deref().is_some_and(|key| key != render_type)
        {
            self.stop_active();
        }
        let adapter = self
            .adapters
            .get_mut(render_type)
            .ok_or_else(|| EngineError::UnknownEngine(render_type.to_string()))?;

        self.active = Some(render_type.to_string());
        adapter.set_scene(scene);
        adapter.set_frame(frame);
        adapter.begin_render();

        self.last_info = Some(RenderInfo {
            frame,
            scene: scene.to_string(),
            uuid: uuid.to_string(),
            render_type: render_type.to_string(),
        });
        Ok(())
    }

    fn active_mut(&mut self) -> Option<&mut Box<dyn EngineAdapter>> {
        let key = self.active.as_deref()?;
        self.adapters.get_mut(key)
    }

    fn active_ref(&self) -> Option<&dyn EngineAdapter> {
        let key = self.active.as_deref()?;
        self.adapters.get(key).map(Box::as_ref)
    }

    /// Status of the active adapter; `Stopped` when nothing has run yet.
    pub fn status(&mut self) -> ProcessState {
        self.active_mut()
            .map_or(ProcessState::Stopped, |adapter| adapter.status())
    }

    /// Drain the active adapter's captured output.
    pub fn log(&mut self) -> String {
        self.active_mut()
            .map(|adapter| adapter.log())
            .unwrap_or_default()
    }

    /// Artifacts of the active adapter's last successful render.
    #[must_use]
    pub fn last_render(&self) -> &Artifacts {
        self.active_ref()
            .map_or(&NO_ARTIFACTS, |adapter| adapter.last_render())
    }

    /// Metadata of the last job started.
    #[must_use]
    pub fn last_render_info(&self) -> Option<&RenderInfo> {
        self.last_info.as_ref()
    }

    /// Artifact extension of the active adapter.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.active_ref().map(|adapter| adapter.extension())
    }

    /// Kill the active adapter's process, if any.
    pub fn stop_active(&mut self) {
        if let Some(adapter) = self.active_mut() {
            adapter.stop_render();
        }
    }
}
