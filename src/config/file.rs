use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CliError;
use crate::options::{OutputFormat, ProgressBar, Quality, RendererKind, Verbosity};

pub const CONFIG_DIR_NAME: &str = "scenecast";
pub const CONFIG_FILE_NAME: &str = "scenecast.yaml";

/// On-disk configuration. Every field is optional; an absent field leaves the
/// lower-precedence value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_to_file: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<RendererKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_caching: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flush_cache: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tex_template: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_bar: Option<ProgressBar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_in_file_browser: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_last_frame: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_to_movie: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_all: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<Verbosity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webgl_renderer_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_folders: Option<CustomFolders>,
}

/// Alternate folder layout, applied only with `--custom-folders`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomFolders {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

/// A parsed config file together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfigFile {
    pub path: PathBuf,
    pub file: ConfigFile,
}

/// Where `cfg write` puts its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigLevel {
    User,
    Cwd,
}

pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(&text).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(CliError::Config {
            source_path: path.to_path_buf(),
            message: format!("{location}: {error}"),
        })
    })
}

pub fn save_config_file(path: &Path, file: &ConfigFile) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let yaml = serde_yaml::to_string(file).context("failed to serialize config yaml")?;
    fs::write(path, yaml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

/// Config files that apply to a run, lowest precedence first: user-wide,
/// the one in `folder` (usually the script's directory), then the explicit
/// `--config-file`.
///
/// Implicit locations are skipped when absent; an explicit path must exist.
pub fn discover_config_files(
    folder: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<Vec<LoadedConfigFile>> {
    let mut candidates = Vec::new();
    if let Ok(user_path) = user_config_path() {
        candidates.push(user_path);
    }
    if let Some(folder) = folder {
        candidates.push(folder.join(CONFIG_FILE_NAME));
    }

    let mut loaded = Vec::with_capacity(candidates.len() + 1);
    for path in candidates {
        if !path.is_file() {
            continue;
        }
        if loaded
            .iter()
            .any(|existing: &LoadedConfigFile| same_file(&existing.path, &path))
        {
            continue;
        }
        let file = load_config_file(&path)?;
        loaded.push(LoadedConfigFile { path, file });
    }

    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("config file {} does not exist", path.display());
        }
        let file = load_config_file(path)?;
        loaded.push(LoadedConfigFile {
            path: path.to_path_buf(),
            file,
        });
    }

    Ok(loaded)
}

/// Directory whose `scenecast.yaml` applies to `script`.
pub fn script_folder(script: &Path) -> &Path {
    script
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

pub fn config_path_for_level(level: ConfigLevel, launch_cwd: &Path) -> Result<PathBuf> {
    match level {
        ConfigLevel::User => user_config_path(),
        ConfigLevel::Cwd => Ok(launch_cwd.join(CONFIG_FILE_NAME)),
    }
}

pub fn user_config_path() -> Result<PathBuf> {
    Ok(user_config_dir()?
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

/// Written by `cfg write`; every value equals the built-in default.
pub fn starter_config_file() -> ConfigFile {
    ConfigFile {
        media_dir: Some(PathBuf::from("./media")),
        log_to_file: Some(false),
        format: Some(OutputFormat::Mp4),
        quality: Some(Quality::High),
        renderer: Some(RendererKind::Software),
        progress_bar: Some(ProgressBar::Display),
        verbosity: Some(Verbosity::Info),
        background_color: Some(String::from("#000000")),
        ..ConfigFile::default()
    }
}

fn same_file(left: &Path, right: &Path) -> bool {
    match (fs::canonicalize(left), fs::canonicalize(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => left == right,
    }
}

fn user_config_dir() -> Result<PathBuf> {
    platform_config_dir(|key| env::var_os(key)).ok_or_else(|| {
        anyhow!("cannot locate the user config directory; set HOME (APPDATA on Windows)")
    })
}

/// Per-user config root: `%APPDATA%` on Windows, `~/Library/Application Support`
/// on macOS, `$XDG_CONFIG_HOME` or `~/.config` elsewhere.
fn platform_config_dir(var: impl Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
    let home = || var("HOME").filter(|home| !home.is_empty()).map(PathBuf::from);
    if cfg!(windows) {
        var("APPDATA").map(PathBuf::from).or_else(|| {
            var("USERPROFILE").map(|profile| PathBuf::from(profile).join("AppData").join("Roaming"))
        })
    } else if cfg!(target_os = "macos") {
        home().map(|home| home.join("Library").join("Application Support"))
    } else {
        var("XDG_CONFIG_HOME")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .or_else(|| home().map(|home| home.join(".config")))
    }
}
