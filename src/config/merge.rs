use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::file::{ConfigFile, CustomFolders};
use crate::error::{CliError, CliResult};
use crate::options::{
    parse_resolution, AnimationRange, OutputFormat, ProgressBar, Quality, RendererKind,
    Resolution, Verbosity,
};
use crate::selector::{select, RendererRequest};

pub const DEFAULT_ENGINE: &str = "scenecast-engine";

/// The canonical configuration for one invocation.
///
/// Built only by [`merge`], then shared by reference with the dispatcher and
/// backends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct RenderConfig {
    pub input_file: Option<PathBuf>,
    /// Empty means every scene in the script.
    pub scene_names: Vec<String>,
    /// Matched positionally with the scenes being rendered.
    pub output_files: Vec<String>,
    pub media_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_to_file: bool,
    pub from_animation_number: Option<AnimationRange>,
    pub write_all: bool,
    pub format: OutputFormat,
    pub save_last_frame: bool,
    pub write_to_movie: bool,
    pub quality: Quality,
    pub resolution: Resolution,
    pub frame_rate: f64,
    pub renderer: RendererKind,
    pub webgl_renderer_path: Option<PathBuf>,
    pub transparent: bool,
    pub background_color: String,
    pub progress_bar: ProgressBar,
    pub preview: bool,
    pub show_in_file_browser: bool,
    pub verbosity: Verbosity,
    pub disable_caching: bool,
    pub flush_cache: bool,
    pub tex_template: Option<PathBuf>,
    pub engine: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let media_dir = PathBuf::from("./media");
        let quality = Quality::High;
        Self {
            input_file: None,
            scene_names: Vec::new(),
            output_files: Vec::new(),
            log_dir: media_dir.join("logs"),
            media_dir,
            log_to_file: false,
            from_animation_number: None,
            write_all: false,
            format: OutputFormat::Mp4,
            save_last_frame: false,
            write_to_movie: true,
            quality,
            resolution: quality.resolution(),
            frame_rate: quality.frame_rate(),
            renderer: RendererKind::Software,
            webgl_renderer_path: None,
            transparent: false,
            background_color: String::from("#000000"),
            progress_bar: ProgressBar::Display,
            preview: false,
            show_in_file_browser: false,
            verbosity: Verbosity::Info,
            disable_caching: false,
            flush_cache: false,
            tex_template: None,
            engine: String::from(DEFAULT_ENGINE),
        }
    }
}

impl RenderConfig {
    pub fn save_as_gif(&self) -> bool {
        self.write_to_movie && self.format == OutputFormat::Gif
    }

    /// Output name for the scene at `index` in render order, if one was given.
    pub fn output_name_for(&self, index: usize) -> Option<&str> {
        self.output_files.get(index).map(String::as_str)
    }
}

/// One source of settings. `None` means "this source did not set it".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigLayer {
    pub input_file: Option<PathBuf>,
    pub scene_names: Option<Vec<String>>,
    pub output_files: Option<Vec<String>>,
    pub media_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_to_file: Option<bool>,
    pub custom_folders: Option<bool>,
    pub custom_media_dir: Option<PathBuf>,
    pub custom_log_dir: Option<PathBuf>,
    pub from_animation_number: Option<AnimationRange>,
    pub write_all: Option<bool>,
    pub format: Option<OutputFormat>,
    pub save_last_frame: Option<bool>,
    pub write_to_movie: Option<bool>,
    pub quality: Option<Quality>,
    pub resolution: Option<Resolution>,
    pub frame_rate: Option<f64>,
    pub renderer: Option<RendererKind>,
    pub use_gpu_renderer: Option<bool>,
    pub use_remote_renderer: Option<bool>,
    pub webgl_renderer_path: Option<PathBuf>,
    pub transparent: Option<bool>,
    pub background_color: Option<String>,
    pub progress_bar: Option<ProgressBar>,
    pub preview: Option<bool>,
    pub show_in_file_browser: Option<bool>,
    pub verbosity: Option<Verbosity>,
    pub disable_caching: Option<bool>,
    pub flush_cache: Option<bool>,
    pub tex_template: Option<PathBuf>,
    pub engine: Option<String>,
}

impl ConfigLayer {
    pub fn from_file(file: &ConfigFile) -> CliResult<Self> {
        let resolution = match file.resolution.as_deref() {
            Some(raw) => parse_resolution(raw)?,
            None => None,
        };
        let custom = file.custom_folders.clone().unwrap_or_default();

        Ok(Self {
            media_dir: file.media_dir.clone(),
            log_dir: file.log_dir.clone(),
            log_to_file: file.log_to_file,
            custom_media_dir: custom.media_dir,
            custom_log_dir: custom.log_dir,
            write_all: file.write_all,
            format: file.format,
            save_last_frame: file.save_last_frame,
            write_to_movie: file.write_to_movie,
            quality: file.quality,
            resolution,
            frame_rate: file.frame_rate,
            renderer: file.renderer,
            webgl_renderer_path: file.webgl_renderer_path.clone(),
            transparent: file.transparent,
            background_color: file.background_color.clone(),
            progress_bar: file.progress_bar,
            preview: file.preview,
            show_in_file_browser: file.show_in_file_browser,
            verbosity: file.verbosity,
            disable_caching: file.disable_caching,
            flush_cache: file.flush_cache,
            tex_template: file.tex_template.clone(),
            engine: file.engine.clone(),
            ..Self::default()
        })
    }

    /// The file-level view of this layer, for `cfg show` and `cfg export`.
    pub fn to_file(&self) -> ConfigFile {
        let custom_folders = (self.custom_media_dir.is_some() || self.custom_log_dir.is_some())
            .then(|| CustomFolders {
                media_dir: self.custom_media_dir.clone(),
                log_dir: self.custom_log_dir.clone(),
            });
        ConfigFile {
            media_dir: self.media_dir.clone(),
            log_dir: self.log_dir.clone(),
            log_to_file: self.log_to_file,
            format: self.format,
            quality: self.quality,
            resolution: self
                .resolution
                .map(|resolution| format!("{},{}", resolution.width, resolution.height)),
            frame_rate: self.frame_rate,
            renderer: self.renderer,
            disable_caching: self.disable_caching,
            flush_cache: self.flush_cache,
            tex_template: self.tex_template.clone(),
            transparent: self.transparent,
            background_color: self.background_color.clone(),
            progress_bar: self.progress_bar,
            preview: self.preview,
            show_in_file_browser: self.show_in_file_browser,
            save_last_frame: self.save_last_frame,
            write_to_movie: self.write_to_movie,
            write_all: self.write_all,
            verbosity: self.verbosity,
            engine: self.engine.clone(),
            webgl_renderer_path: self.webgl_renderer_path.clone(),
            custom_folders,
        }
    }

    /// A layer that reproduces `config` exactly when merged over any defaults.
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            input_file: config.input_file.clone(),
            scene_names: Some(config.scene_names.clone()),
            output_files: Some(config.output_files.clone()),
            media_dir: Some(config.media_dir.clone()),
            log_dir: Some(config.log_dir.clone()),
            log_to_file: Some(config.log_to_file),
            custom_folders: Some(false),
            custom_media_dir: None,
            custom_log_dir: None,
            from_animation_number: config.from_animation_number,
            write_all: Some(config.write_all),
            format: Some(config.format),
            save_last_frame: Some(config.save_last_frame),
            write_to_movie: Some(config.write_to_movie),
            quality: Some(config.quality),
            resolution: Some(config.resolution),
            frame_rate: Some(config.frame_rate),
            renderer: Some(config.renderer),
            use_gpu_renderer: Some(false),
            use_remote_renderer: Some(false),
            webgl_renderer_path: config.webgl_renderer_path.clone(),
            transparent: Some(config.transparent),
            background_color: Some(config.background_color.clone()),
            progress_bar: Some(config.progress_bar),
            preview: Some(config.preview),
            show_in_file_browser: Some(config.show_in_file_browser),
            verbosity: Some(config.verbosity),
            disable_caching: Some(config.disable_caching),
            flush_cache: Some(config.flush_cache),
            tex_template: config.tex_template.clone(),
            engine: Some(config.engine.clone()),
        }
    }

    /// Returns `self` with every field that `higher` sets replaced.
    ///
    /// A layer that names a quality preset without an explicit resolution or
    /// frame rate also clears the lower layers' explicit values, so the preset
    /// is not shadowed by a less specific source. Deprecated renderer flags
    /// clear a lower `renderer` the same way.
    pub fn overlay(self, higher: ConfigLayer) -> Self {
        let higher_deprecated_flag = higher.use_gpu_renderer == Some(true)
            || higher.use_remote_renderer == Some(true);
        let renderer = match higher.renderer {
            Some(renderer) => Some(renderer),
            None if higher_deprecated_flag => None,
            None => self.renderer,
        };
        let resolution = match (higher.resolution, higher.quality) {
            (Some(resolution), _) => Some(resolution),
            (None, Some(_)) => None,
            (None, None) => self.resolution,
        };
        let frame_rate = match (higher.frame_rate, higher.quality) {
            (Some(frame_rate), _) => Some(frame_rate),
            (None, Some(_)) => None,
            (None, None) => self.frame_rate,
        };

        Self {
            input_file: higher.input_file.or(self.input_file),
            scene_names: higher.scene_names.or(self.scene_names),
            output_files: higher.output_files.or(self.output_files),
            media_dir: higher.media_dir.or(self.media_dir),
            log_dir: higher.log_dir.or(self.log_dir),
            log_to_file: higher.log_to_file.or(self.log_to_file),
            custom_folders: higher.custom_folders.or(self.custom_folders),
            custom_media_dir: higher.custom_media_dir.or(self.custom_media_dir),
            custom_log_dir: higher.custom_log_dir.or(self.custom_log_dir),
            from_animation_number: higher.from_animation_number.or(self.from_animation_number),
            write_all: higher.write_all.or(self.write_all),
            format: higher.format.or(self.format),
            save_last_frame: higher.save_last_frame.or(self.save_last_frame),
            write_to_movie: higher.write_to_movie.or(self.write_to_movie),
            quality: higher.quality.or(self.quality),
            resolution,
            frame_rate,
            renderer,
            use_gpu_renderer: higher.use_gpu_renderer.or(self.use_gpu_renderer),
            use_remote_renderer: higher.use_remote_renderer.or(self.use_remote_renderer),
            webgl_renderer_path: higher.webgl_renderer_path.or(self.webgl_renderer_path),
            transparent: higher.transparent.or(self.transparent),
            background_color: higher.background_color.or(self.background_color),
            progress_bar: higher.progress_bar.or(self.progress_bar),
            preview: higher.preview.or(self.preview),
            show_in_file_browser: higher.show_in_file_browser.or(self.show_in_file_browser),
            verbosity: higher.verbosity.or(self.verbosity),
            disable_caching: higher.disable_caching.or(self.disable_caching),
            flush_cache: higher.flush_cache.or(self.flush_cache),
            tex_template: higher.tex_template.or(self.tex_template),
            engine: higher.engine.or(self.engine),
        }
    }

    fn renderer_request(&self) -> RendererRequest {
        RendererRequest {
            renderer: self.renderer,
            use_gpu_renderer: self.use_gpu_renderer.unwrap_or(false),
            use_remote_renderer: self.use_remote_renderer.unwrap_or(false),
        }
    }
}

/// Media and log directories. Explicit CLI folders always win; with
/// `--custom-folders` the files' `custom_folders` section replaces their plain
/// folders. The log directory follows the media directory unless set on its own.
pub fn resolve_folders(
    file: Option<&ConfigLayer>,
    cli: &ConfigLayer,
    defaults: &RenderConfig,
) -> (PathBuf, PathBuf) {
    let custom = cli
        .custom_folders
        .or_else(|| file.and_then(|file| file.custom_folders))
        .unwrap_or(false);
    let (file_media, file_log) = match file {
        Some(file) if custom => (
            file.custom_media_dir.as_ref().or(file.media_dir.as_ref()),
            file.custom_log_dir.as_ref().or(file.log_dir.as_ref()),
        ),
        Some(file) => (file.media_dir.as_ref(), file.log_dir.as_ref()),
        None => (None, None),
    };
    let media_dir = cli.media_dir.as_ref().or(file_media);
    let log_dir = cli.log_dir.as_ref().or(file_log);

    let log_dir = match (log_dir, media_dir) {
        (Some(log_dir), _) => log_dir.clone(),
        (None, Some(media_dir)) => media_dir.join("logs"),
        (None, None) => defaults.log_dir.clone(),
    };
    let media_dir = media_dir.cloned().unwrap_or_else(|| defaults.media_dir.clone());
    (media_dir, log_dir)
}

/// Folds `defaults < file < cli` into one validated [`RenderConfig`].
pub fn merge(
    defaults: &RenderConfig,
    file: Option<&ConfigLayer>,
    cli: &ConfigLayer,
) -> CliResult<RenderConfig> {
    let layer = file
        .cloned()
        .unwrap_or_default()
        .overlay(cli.clone());

    let selection = select(&layer.renderer_request())?;
    if let Some(notice) = selection.deprecation_notice() {
        warn!("{notice}");
    }

    let (media_dir, log_dir) = resolve_folders(file, cli, defaults);

    let quality = layer.quality.unwrap_or(defaults.quality);
    let resolution = match (layer.resolution, layer.quality) {
        (Some(resolution), _) => resolution,
        (None, Some(quality)) => quality.resolution(),
        (None, None) => defaults.resolution,
    };
    let frame_rate = match (layer.frame_rate, layer.quality) {
        (Some(frame_rate), _) => frame_rate,
        (None, Some(quality)) => quality.frame_rate(),
        (None, None) => defaults.frame_rate,
    };
    if resolution.width == 0 || resolution.height == 0 {
        return Err(CliError::InvalidResolution {
            raw: resolution.to_string(),
        });
    }
    if !frame_rate.is_finite() || frame_rate <= 0.0 {
        return Err(CliError::InvalidFrameRate {
            raw: frame_rate.to_string(),
        });
    }

    let format = layer.format.unwrap_or(defaults.format);
    let save_last_frame = layer.save_last_frame.unwrap_or(defaults.save_last_frame);
    let write_to_movie = layer
        .write_to_movie
        .unwrap_or(format != OutputFormat::Png && !save_last_frame);

    let config = RenderConfig {
        input_file: layer.input_file.or_else(|| defaults.input_file.clone()),
        scene_names: layer
            .scene_names
            .unwrap_or_else(|| defaults.scene_names.clone()),
        output_files: layer
            .output_files
            .unwrap_or_else(|| defaults.output_files.clone()),
        media_dir,
        log_dir,
        log_to_file: layer.log_to_file.unwrap_or(defaults.log_to_file),
        from_animation_number: layer
            .from_animation_number
            .or(defaults.from_animation_number),
        write_all: layer.write_all.unwrap_or(defaults.write_all),
        format,
        save_last_frame,
        write_to_movie,
        quality,
        resolution,
        frame_rate,
        renderer: selection.kind,
        webgl_renderer_path: layer
            .webgl_renderer_path
            .or_else(|| defaults.webgl_renderer_path.clone()),
        transparent: layer.transparent.unwrap_or(defaults.transparent),
        background_color: layer
            .background_color
            .unwrap_or_else(|| defaults.background_color.clone()),
        progress_bar: layer.progress_bar.unwrap_or(defaults.progress_bar),
        preview: layer.preview.unwrap_or(defaults.preview),
        show_in_file_browser: layer
            .show_in_file_browser
            .unwrap_or(defaults.show_in_file_browser),
        verbosity: layer.verbosity.unwrap_or(defaults.verbosity),
        disable_caching: layer.disable_caching.unwrap_or(defaults.disable_caching),
        flush_cache: layer.flush_cache.unwrap_or(defaults.flush_cache),
        tex_template: layer
            .tex_template
            .or_else(|| defaults.tex_template.clone()),
        engine: layer.engine.unwrap_or_else(|| defaults.engine.clone()),
    };

    debug!(
        renderer = %config.renderer,
        resolution = %config.resolution,
        frame_rate = config.frame_rate,
        format = config.format.keyword(),
        quality = config.quality.keyword(),
        "merged render configuration"
    );
    Ok(config)
}
