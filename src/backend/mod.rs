//! Render backends and the factory that instantiates the selected one.

mod engine;

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::RenderConfig;
use crate::error::{CliError, CliResult};
use crate::options::RendererKind;
use crate::script::SceneDescriptor;

pub use engine::{EngineProcessBackend, ENGINE_PROTOCOL_VERSION};

/// Files produced by rendering one scene.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderArtifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gif_path: Option<PathBuf>,
}

/// Everything a backend needs to render one scene.
#[derive(Debug, Clone, Copy)]
pub struct SceneRequest<'a> {
    pub scene: &'a SceneDescriptor,
    pub output_name: Option<&'a str>,
    pub config: &'a RenderConfig,
}

pub trait RenderBackend {
    fn kind(&self) -> RendererKind;

    /// Renders one scene. An error here is scoped to that scene.
    fn render_scene(&mut self, request: &SceneRequest<'_>) -> Result<RenderArtifacts>;
}

/// Instantiates the backend chosen in `config`. There is no fallback: a
/// backend that cannot run is reported, not substituted.
pub fn create_backend(config: &RenderConfig) -> CliResult<Box<dyn RenderBackend>> {
    match config.renderer {
        RendererKind::Software => Ok(Box::new(EngineProcessBackend::connect(
            RendererKind::Software,
            config,
        )?)),
        RendererKind::Gpu => {
            #[cfg(feature = "gpu")]
            {
                Ok(Box::new(EngineProcessBackend::connect(
                    RendererKind::Gpu,
                    config,
                )?))
            }
            #[cfg(not(feature = "gpu"))]
            {
                Err(missing_feature(RendererKind::Gpu, "gpu"))
            }
        }
        RendererKind::Remote => {
            #[cfg(feature = "remote")]
            {
                Ok(Box::new(EngineProcessBackend::connect(
                    RendererKind::Remote,
                    config,
                )?))
            }
            #[cfg(not(feature = "remote"))]
            {
                Err(missing_feature(RendererKind::Remote, "remote"))
            }
        }
    }
}

#[allow(dead_code)]
fn missing_feature(kind: RendererKind, feature: &str) -> CliError {
    CliError::BackendUnavailable {
        backend: kind.keyword().to_owned(),
        hint: format!(
            "scenecast was built without `{feature}`. Rebuild with `cargo install scenecast --features {feature}`."
        ),
    }
}
