//! # render_engine
//!
//! Renderer supervision for the render node.
//!
//! This crate provides:
//!
//! - [`adapter`] — The [`EngineAdapter`] trait every renderer is driven through.
//! - [`process`] — [`ProcessAdapter`], the retry/timeout state machine that
//!   owns one external renderer process at a time.
//! - [`recipe`] — The engine-specific half of an adapter: how to launch a
//!   renderer and where to find its output.
//! - [`blender`] / [`renderman`] — The built-in recipes.
//! - [`registry`] — [`RenderRegistry`], the type-keyed adapter table.
//! - [`clock`] — Injectable time source for timeout handling.
//! - [`log_reader`] — Background thread draining a process's output.
//! - [`input_writer`] — Background thread feeding a process's stdin.
//! - [`artifact`] — Output labelling helpers.
//! - [`error`] — Engine-layer error types.

pub mod adapter;
pub mod artifact;
pub mod blender;
pub mod clock;
pub mod error;
pub mod input_writer;
pub mod log_reader;
pub mod process;
pub mod recipe;
pub mod registry;
pub mod renderman;
pub mod state;

pub use adapter::{AdapterSettings, EngineAdapter};
pub use artifact::Artifacts;
pub use blender::BlenderRecipe;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::EngineError;
pub use process::ProcessAdapter;
pub use recipe::{Invocation, RenderContext, RenderRecipe};
pub use registry::{RenderInfo, RenderRegistry};
pub use renderman::RendermanRecipe;
pub use state::ProcessState;
