//! Post-render actions: previewing produced files and revealing them in the
//! platform file browser.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::backend::RenderArtifacts;
use crate::config::RenderConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Preview,
    Reveal,
}

/// Whether the opener's standard output reaches the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenerOutput {
    Quiet,
    Inherit,
}

impl OpenerOutput {
    pub fn for_config(config: &RenderConfig) -> Self {
        if config.verbosity.is_debug() {
            Self::Inherit
        } else {
            Self::Quiet
        }
    }
}

pub trait FileOpener {
    fn open(&self, path: &Path, mode: OpenMode, output: OpenerOutput) -> Result<()>;
}

/// Opens files with the operating system's default handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl FileOpener for SystemOpener {
    fn open(&self, path: &Path, mode: OpenMode, output: OpenerOutput) -> Result<()> {
        let mut command = open_command(path, mode);
        // Only the child's stdout is redirected; ours is untouched.
        if output == OpenerOutput::Quiet {
            command.stdout(Stdio::null());
        }
        let status = command
            .status()
            .with_context(|| format!("failed to launch file opener for {}", path.display()))?;
        if !status.success() {
            bail!(
                "file opener exited with status {status} for {}",
                path.display()
            );
        }
        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn open_command(path: &Path, mode: OpenMode) -> Command {
    let mut command = Command::new("open");
    if mode == OpenMode::Reveal {
        command.arg("-R");
    }
    command.arg(path);
    command
}

#[cfg(target_os = "windows")]
fn open_command(path: &Path, mode: OpenMode) -> Command {
    match mode {
        OpenMode::Preview => {
            let mut command = Command::new("cmd");
            command.args(["/C", "start", ""]).arg(path);
            command
        }
        OpenMode::Reveal => {
            let mut select = std::ffi::OsString::from("/select,");
            select.push(path.as_os_str());
            let mut command = Command::new("explorer");
            command.arg(select);
            command
        }
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn open_command(path: &Path, mode: OpenMode) -> Command {
    let target = match mode {
        OpenMode::Preview => path,
        OpenMode::Reveal => path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new(".")),
    };
    let mut command = Command::new("xdg-open");
    command.arg(target);
    command
}

/// Files worth opening for one rendered scene, in opening order.
pub fn artifact_paths(config: &RenderConfig, artifacts: &RenderArtifacts) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if config.save_last_frame {
        paths.extend(artifacts.image_path.clone());
    }
    if config.write_to_movie && !config.save_as_gif() {
        paths.extend(artifacts.movie_path.clone());
    }
    if config.save_as_gif() {
        paths.extend(artifacts.gif_path.clone());
    }
    paths
}

/// Runs the requested preview/reveal actions for one successful scene.
/// A no-op unless `preview` or `show_in_file_browser` is set. Every file is
/// attempted; the first failure is returned after the rest have run.
pub fn run_actions(
    config: &RenderConfig,
    artifacts: &RenderArtifacts,
    opener: &dyn FileOpener,
) -> Result<()> {
    if !config.preview && !config.show_in_file_browser {
        return Ok(());
    }

    let output = OpenerOutput::for_config(config);
    let paths = artifact_paths(config, artifacts);
    if paths.is_empty() {
        debug!("no produced files to open");
    }
    let modes = [
        (config.show_in_file_browser, OpenMode::Reveal),
        (config.preview, OpenMode::Preview),
    ];
    let mut first_error = None;
    for path in &paths {
        for (_, mode) in modes.iter().filter(|(enabled, _)| *enabled) {
            if let Err(error) = opener.open(path, *mode, output) {
                warn!(path = %path.display(), ?mode, "could not open file: {error:#}");
                first_error.get_or_insert(error);
            }
        }
    }
    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
