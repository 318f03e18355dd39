//! Configuration sources and the merger that folds them into a
//! [`RenderConfig`].

pub mod file;
pub mod merge;

use anyhow::{Context, Result};

pub use file::{ConfigFile, ConfigLevel, CustomFolders, LoadedConfigFile};
pub use merge::{merge, resolve_folders, ConfigLayer, RenderConfig};

/// Folds config files (lowest precedence first) into a single layer.
pub fn file_layer(files: &[LoadedConfigFile]) -> Result<Option<ConfigLayer>> {
    let mut folded: Option<ConfigLayer> = None;
    for loaded in files {
        let layer = ConfigLayer::from_file(&loaded.file)
            .with_context(|| format!("invalid value in config file {}", loaded.path.display()))?;
        folded = Some(match folded {
            Some(lower) => lower.overlay(layer),
            None => layer,
        });
    }
    Ok(folded)
}

/// The folded file-level configuration, as `cfg show` prints it. Goes through
/// [`ConfigLayer::overlay`] so files fold exactly as they do for a render.
pub fn fold_config_files(files: &[LoadedConfigFile]) -> Result<ConfigFile> {
    Ok(file_layer(files)?
        .map(|layer| layer.to_file())
        .unwrap_or_default())
}
