//! Scene scripts: the user-supplied module that declares renderable scenes.
//!
//! The dispatcher only sees [`SceneModule`]s; how they are produced is behind
//! [`ModuleLoader`].

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::CliError;

/// A declared scene: its name plus an opaque definition handed to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDescriptor {
    pub name: String,
    pub definition: Value,
}

impl SceneDescriptor {
    pub fn new(name: impl Into<String>, definition: Value) -> Self {
        Self {
            name: name.into(),
            definition,
        }
    }
}

/// Scenes of one script, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneModule {
    pub path: PathBuf,
    pub scenes: Vec<SceneDescriptor>,
}

pub trait ModuleLoader {
    fn load(&self, path: &Path) -> Result<SceneModule>;
}

/// Loads YAML scene scripts of the form `scenes: [{ name, ...body }]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlScriptLoader;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptFile {
    #[serde(default)]
    scenes: Vec<SceneEntry>,
}

#[derive(Debug, Deserialize)]
struct SceneEntry {
    name: String,
    #[serde(flatten)]
    body: Map<String, Value>,
}

impl ModuleLoader for YamlScriptLoader {
    fn load(&self, path: &Path) -> Result<SceneModule> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read scene script {}", path.display()))?;
        let script: ScriptFile = if contents.trim().is_empty() {
            ScriptFile { scenes: Vec::new() }
        } else {
            serde_yaml::from_str(&contents).map_err(|error| {
                let location = error
                    .location()
                    .map(|location| {
                        format!("line {}, column {}", location.line(), location.column())
                    })
                    .unwrap_or_else(|| "unknown location".to_owned());
                anyhow!(
                    "failed to parse scene script {} at {}: {}",
                    path.display(),
                    location,
                    error
                )
            })?
        };

        if script.scenes.is_empty() {
            return Err(anyhow!(CliError::NoScenes {
                file: path.to_path_buf(),
            }));
        }

        let mut seen = HashSet::with_capacity(script.scenes.len());
        let mut scenes = Vec::with_capacity(script.scenes.len());
        for (index, entry) in script.scenes.into_iter().enumerate() {
            let name = entry.name.trim().to_owned();
            if name.is_empty() {
                bail!("scenes[{index}] in {} has an empty name", path.display());
            }
            if !seen.insert(name.clone()) {
                bail!("duplicate scene name '{}' in {}", name, path.display());
            }
            scenes.push(SceneDescriptor::new(name, Value::Object(entry.body)));
        }

        Ok(SceneModule {
            path: path.to_path_buf(),
            scenes,
        })
    }
}
