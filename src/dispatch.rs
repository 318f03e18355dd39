//! Scene dispatch: picks the scenes to render and drives the backend over
//! them one at a time.

use std::collections::HashSet;

use tracing::{error, info, warn};

use crate::actions::{run_actions, FileOpener};
use crate::backend::{RenderArtifacts, RenderBackend, SceneRequest};
use crate::config::RenderConfig;
use crate::error::{CliError, CliResult};
use crate::script::{SceneDescriptor, SceneModule};

/// What happened to one scene.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Rendered {
        scene: String,
        artifacts: RenderArtifacts,
    },
    Failed {
        scene: String,
        error: String,
    },
}

impl RenderOutcome {
    pub fn scene(&self) -> &str {
        match self {
            Self::Rendered { scene, .. } | Self::Failed { scene, .. } => scene,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Rendered { .. })
    }
}

/// Scenes to render, in render order.
///
/// `write_all` or an empty name list selects every scene in declaration
/// order. Otherwise the requested order is kept and every unknown name is
/// reported at once, before anything renders.
pub fn select_scenes<'m>(
    module: &'m SceneModule,
    config: &RenderConfig,
) -> CliResult<Vec<&'m SceneDescriptor>> {
    if config.write_all || config.scene_names.is_empty() {
        if config.write_all && !config.scene_names.is_empty() {
            warn!(
                requested = %config.scene_names.join(", "),
                "--write-all renders every scene; ignoring the listed scene names"
            );
        }
        return Ok(module.scenes.iter().collect());
    }

    let mut missing = Vec::new();
    let mut selected = Vec::with_capacity(config.scene_names.len());
    let mut seen = HashSet::new();
    for name in &config.scene_names {
        if !seen.insert(name.as_str()) {
            continue;
        }
        match module.scenes.iter().find(|scene| &scene.name == name) {
            Some(scene) => selected.push(scene),
            None => missing.push(name.clone()),
        }
    }

    if !missing.is_empty() {
        return Err(CliError::SceneNotFound {
            file: module.path.clone(),
            names: missing,
        });
    }
    Ok(selected)
}

/// Renders the selected scenes sequentially.
///
/// A scene that fails is logged and recorded; the remaining scenes still
/// render. Only selection problems abort the whole run.
pub fn dispatch(
    config: &RenderConfig,
    module: &SceneModule,
    backend: &mut dyn RenderBackend,
    opener: &dyn FileOpener,
) -> CliResult<Vec<RenderOutcome>> {
    let scenes = select_scenes(module, config)?;
    if config.output_files.len() > scenes.len() {
        warn!(
            given = config.output_files.len(),
            scenes = scenes.len(),
            "more output names than scenes; extra names are unused"
        );
    }

    let mut outcomes = Vec::with_capacity(scenes.len());
    for (index, scene) in scenes.into_iter().enumerate() {
        let request = SceneRequest {
            scene,
            output_name: config.output_name_for(index),
            config,
        };
        info!(scene = %scene.name, renderer = %backend.kind(), "rendering scene");

        match backend.render_scene(&request) {
            Ok(artifacts) => {
                if let Err(action_error) = run_actions(config, &artifacts, opener) {
                    warn!(scene = %scene.name, "could not open rendered files: {action_error:#}");
                }
                outcomes.push(RenderOutcome::Rendered {
                    scene: scene.name.clone(),
                    artifacts,
                });
            }
            Err(render_error) => {
                error!(scene = %scene.name, "scene failed: {render_error:#}");
                outcomes.push(RenderOutcome::Failed {
                    scene: scene.name.clone(),
                    error: format!("{render_error:#}"),
                });
            }
        }
    }

    let failed = outcomes.iter().filter(|outcome| !outcome.is_success()).count();
    if failed == 0 {
        info!(rendered = outcomes.len(), "all scenes rendered");
    } else {
        let names = outcomes
            .iter()
            .filter(|outcome| !outcome.is_success())
            .map(RenderOutcome::scene)
            .collect::<Vec<_>>()
            .join(", ");
        warn!(
            rendered = outcomes.len() - failed,
            failed,
            "some scenes failed: {names}"
        );
    }
    Ok(outcomes)
}
