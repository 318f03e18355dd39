//! Command-line surface: argument parsing, default-command routing and the
//! `render`, `cfg` and `plugins` commands.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{debug, info};

use crate::actions::SystemOpener;
use crate::backend::create_backend;
use crate::config::file::{
    config_path_for_level, discover_config_files, save_config_file, script_folder,
    starter_config_file, ConfigLevel, LoadedConfigFile, CONFIG_FILE_NAME,
};
use crate::config::{
    file_layer, fold_config_files, merge, resolve_folders, ConfigLayer, RenderConfig,
};
use crate::dispatch::dispatch;
use crate::error::{find_cli_error, CliError, CliResult, ErrorEnvelope};
use crate::executables::executables_with_prefix;
use crate::logging::{init_logging, log_file_for, LoggingConfig};
use crate::options::{
    parse_range, parse_resolution, OutputFormat, ProgressBar, Quality, RendererKind, Verbosity,
};
use crate::script::{ModuleLoader, YamlScriptLoader};

pub const AGENT_MODE_ENV: &str = "SCENECAST_AGENT_MODE";
pub const PLUGIN_PREFIX: &str = "scenecast-";

/// First arguments that are handled by clap itself rather than `render`.
const ROUTED_ARGS: &[&str] = &[
    "render",
    "cfg",
    "plugins",
    "help",
    "-h",
    "--help",
    "-V",
    "--version",
];

const USAGE_HINT: &str = "usage: scenecast [OPTIONS] [FILE] [SCENES]...\n\
     Options now go before the script path, e.g. `scenecast -pql talk.yaml Intro`.";

#[derive(Debug, Parser)]
#[command(name = "scenecast")]
#[command(version = version(), propagate_version = true)]
#[command(about = "Configure and dispatch scene renders to an animation engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Render scenes from a script (default when no command is given)
    Render(RenderArgs),
    /// Inspect and write configuration files
    Cfg {
        #[command(subcommand)]
        action: CfgAction,
    },
    /// List external `scenecast-*` plugins
    Plugins(PluginsArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct RenderArgs {
    /// Path to the scene script
    pub file: Option<PathBuf>,

    /// Scenes to render, in order (all scenes when omitted)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub scenes: Vec<String>,

    /// Extra config file, applied above the user and folder configs
    #[arg(long, alias = "config_file", env = "SCENECAST_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Use the `custom_folders` section of config files
    #[arg(long, alias = "custom_folders")]
    pub custom_folders: bool,

    #[arg(long, alias = "disable_caching")]
    pub disable_caching: bool,

    #[arg(long, alias = "flush_cache")]
    pub flush_cache: bool,

    #[arg(long, alias = "tex_template", value_name = "PATH")]
    pub tex_template: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Output name, one per rendered scene in order
    #[arg(short = 'o', long = "output", value_name = "NAME", action = ArgAction::Append)]
    pub output: Vec<String>,

    #[arg(long, alias = "media_dir", env = "SCENECAST_MEDIA_DIR", value_name = "DIR")]
    pub media_dir: Option<PathBuf>,

    #[arg(long, alias = "log_dir", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Also write logs to <log-dir>/<script>.log
    #[arg(long, alias = "log_to_file")]
    pub log_to_file: bool,

    /// Start at animation A, optionally stopping at B ("A", "A,B", "A;B" or "A-B")
    #[arg(short = 'n', long, alias = "from_animation_number", value_name = "RANGE")]
    pub from_animation_number: Option<String>,

    /// Render every scene in the script
    #[arg(short = 'a', long, alias = "write_all")]
    pub write_all: bool,

    #[arg(short = 'f', long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Save the last frame as an image
    #[arg(short = 's', long, alias = "save_last_frame")]
    pub save_last_frame: bool,

    /// Force movie output even for png or last-frame renders
    #[arg(long, alias = "write_to_movie")]
    pub write_to_movie: bool,

    #[arg(short = 'q', long, value_enum)]
    pub quality: Option<Quality>,

    /// Explicit resolution ("W,H", "W;H" or "W-H"); wins over --quality
    #[arg(short = 'r', long, value_name = "W,H")]
    pub resolution: Option<String>,

    /// Explicit frame rate; wins over --quality
    #[arg(long = "fps", visible_alias = "frame-rate", alias = "frame_rate", value_name = "FPS")]
    pub fps: Option<f64>,

    #[arg(long, value_enum)]
    pub renderer: Option<RendererKind>,

    /// Deprecated: use `--renderer gpu`
    #[arg(long, alias = "use_opengl_renderer")]
    pub use_opengl_renderer: bool,

    /// Deprecated: use `--renderer remote`
    #[arg(long, alias = "use_webgl_renderer")]
    pub use_webgl_renderer: bool,

    #[arg(long, alias = "webgl_renderer_path", value_name = "PATH")]
    pub webgl_renderer_path: Option<PathBuf>,

    #[arg(short = 't', long)]
    pub transparent: bool,

    #[arg(short = 'c', long, alias = "background_color", value_name = "COLOR")]
    pub background_color: Option<String>,

    #[arg(long, value_enum, alias = "progress_bar")]
    pub progress_bar: Option<ProgressBar>,

    /// Open the rendered file when done
    #[arg(short = 'p', long)]
    pub preview: bool,

    /// Reveal the rendered file in the file browser
    #[arg(long, alias = "show_in_file_browser")]
    pub show_in_file_browser: bool,

    /// Print the merged configuration as JSON instead of rendering
    #[arg(long)]
    pub jupyter: bool,

    /// Engine command line used by the render backends
    #[arg(long, env = "SCENECAST_ENGINE", value_name = "COMMAND")]
    pub engine: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum CfgAction {
    /// Print the file-level configuration and the files it was read from
    Show(CfgSourceArgs),
    /// Write a starter config file
    Write {
        #[arg(short = 'l', long, value_enum, default_value = "cwd")]
        level: ConfigLevel,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Write the folded file-level configuration to DIR/scenecast.yaml
    Export {
        #[arg(short = 'd', long, value_name = "DIR")]
        dir: PathBuf,
        #[command(flatten)]
        source: CfgSourceArgs,
    },
}

#[derive(Debug, Clone, Args)]
pub struct CfgSourceArgs {
    /// Script whose folder config applies (defaults to the current directory)
    pub file: Option<PathBuf>,

    #[arg(long, env = "SCENECAST_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct PluginsArgs {
    /// List installed plugins
    #[arg(short = 'l', long)]
    pub list: bool,
}

fn version() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION.get_or_init(|| match option_env!("SCENECAST_GIT_HASH") {
        Some(hash) => format!("{} ({hash})", env!("CARGO_PKG_VERSION")),
        None => env!("CARGO_PKG_VERSION").to_owned(),
    })
}

/// Inserts `render` after the program name unless the first argument already
/// names a command or a top-level help/version flag.
pub fn normalize_argv(mut argv: Vec<OsString>) -> Vec<OsString> {
    if argv.is_empty() {
        argv.push(OsString::from("scenecast"));
    }
    let routed = argv
        .get(1)
        .and_then(|first| first.to_str())
        .is_some_and(|first| ROUTED_ARGS.contains(&first));
    if !routed {
        argv.insert(1, OsString::from("render"));
    }
    argv
}

/// Scene names never start with `-`; one that does is an option written
/// after the scenes in the old argument order.
pub fn check_legacy_syntax(scenes: &[String]) -> CliResult<()> {
    match scenes.iter().find(|scene| scene.starts_with('-')) {
        Some(token) => Err(CliError::LegacySyntax {
            token: token.clone(),
        }),
        None => Ok(()),
    }
}

impl RenderArgs {
    /// The CLI layer: only flags the user actually gave are `Some`.
    pub fn to_layer(&self) -> CliResult<ConfigLayer> {
        let from_animation_number = match self.from_animation_number.as_deref() {
            Some(raw) => parse_range(raw)?,
            None => None,
        };
        let resolution = match self.resolution.as_deref() {
            Some(raw) => parse_resolution(raw)?,
            None => None,
        };

        Ok(ConfigLayer {
            input_file: self.file.clone(),
            scene_names: non_empty(&self.scenes),
            output_files: non_empty(&self.output),
            media_dir: self.media_dir.clone(),
            log_dir: self.log_dir.clone(),
            log_to_file: flag(self.log_to_file),
            custom_folders: flag(self.custom_folders),
            custom_media_dir: None,
            custom_log_dir: None,
            from_animation_number,
            write_all: flag(self.write_all),
            format: self.format,
            save_last_frame: flag(self.save_last_frame),
            write_to_movie: flag(self.write_to_movie),
            quality: self.quality,
            resolution,
            frame_rate: self.fps,
            renderer: self.renderer,
            use_gpu_renderer: flag(self.use_opengl_renderer),
            use_remote_renderer: flag(self.use_webgl_renderer),
            webgl_renderer_path: self.webgl_renderer_path.clone(),
            transparent: flag(self.transparent),
            background_color: self.background_color.clone(),
            progress_bar: self.progress_bar,
            preview: flag(self.preview),
            show_in_file_browser: flag(self.show_in_file_browser),
            verbosity: Verbosity::from_count(self.verbose),
            disable_caching: flag(self.disable_caching),
            flush_cache: flag(self.flush_cache),
            tex_template: self.tex_template.clone(),
            engine: self.engine.clone(),
        })
    }

    /// Reads config files, installs logging and merges every layer.
    pub fn resolve(&self) -> Result<RenderConfig> {
        check_legacy_syntax(&self.scenes)?;
        let cli_layer = self.to_layer()?;

        let files = discover_config_files(
            self.file.as_deref().map(script_folder),
            self.config_file.as_deref(),
        )?;
        let file_layer = file_layer(&files)?;

        let defaults = RenderConfig::default();
        let combined = file_layer
            .clone()
            .unwrap_or_default()
            .overlay(cli_layer.clone());
        let (_, log_dir) = resolve_folders(file_layer.as_ref(), &cli_layer, &defaults);
        init_logging(&LoggingConfig {
            verbosity: combined.verbosity.unwrap_or(defaults.verbosity),
            log_file: combined
                .log_to_file
                .unwrap_or(defaults.log_to_file)
                .then(|| log_file_for(&log_dir, self.file.as_deref())),
        })?;
        log_sources(&files);

        Ok(merge(&defaults, file_layer.as_ref(), &cli_layer)?)
    }
}

fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    (!values.is_empty()).then(|| values.to_vec())
}

fn log_sources(files: &[LoadedConfigFile]) {
    for loaded in files {
        debug!(path = %loaded.path.display(), "applied config file");
    }
}

/// Parses `args` (including the program name), runs the command and maps the
/// result onto a process exit code.
pub fn run<I, T>(args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let argv = normalize_argv(args.into_iter().map(Into::into).collect());
    let cli = match Cli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return ExitCode::from(u8::try_from(error.exit_code()).unwrap_or(2));
        }
    };

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report(&error),
    }
}

pub fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Render(args) => run_render(&args),
        Commands::Cfg { action } => run_cfg(action),
        Commands::Plugins(args) => run_plugins(&args),
    }
}

fn run_render(args: &RenderArgs) -> Result<()> {
    let config = args.resolve()?;

    if args.jupyter {
        let json =
            serde_json::to_string_pretty(&config).context("failed to serialize configuration")?;
        println!("{json}");
        return Ok(());
    }

    let input = config.input_file.clone().ok_or(CliError::MissingInputFile)?;
    let module = YamlScriptLoader.load(&input)?;
    let mut backend = create_backend(&config)?;
    let outcomes = dispatch(&config, &module, backend.as_mut(), &SystemOpener)?;
    debug!(scenes = outcomes.len(), "render finished");
    Ok(())
}

fn run_cfg(action: CfgAction) -> Result<()> {
    init_logging(&LoggingConfig::default())?;
    match action {
        CfgAction::Show(source) => {
            let files = source.discover()?;
            if files.is_empty() {
                println!("# no config files found; built-in defaults apply");
            } else {
                println!("# sources, lowest precedence first:");
                for loaded in &files {
                    println!("#   {}", loaded.path.display());
                }
            }
            let folded = fold_config_files(&files)?;
            let yaml = serde_yaml::to_string(&folded).context("failed to serialize config yaml")?;
            print!("{yaml}");
            Ok(())
        }
        CfgAction::Write { level, force } => {
            let cwd = env::current_dir().context("failed to resolve current directory")?;
            let path = config_path_for_level(level, &cwd)?;
            if path.exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite it",
                    path.display()
                );
            }
            save_config_file(&path, &starter_config_file())?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        CfgAction::Export { dir, source } => {
            let files = source.discover()?;
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create export directory {}", dir.display()))?;
            let path = dir.join(CONFIG_FILE_NAME);
            save_config_file(&path, &fold_config_files(&files)?)?;
            info!(sources = files.len(), "exported configuration");
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

impl CfgSourceArgs {
    fn discover(&self) -> Result<Vec<LoadedConfigFile>> {
        let folder = match self.file.as_deref() {
            Some(script) => script_folder(script).to_path_buf(),
            None => env::current_dir().context("failed to resolve current directory")?,
        };
        discover_config_files(Some(&folder), self.config_file.as_deref())
    }
}

fn run_plugins(args: &PluginsArgs) -> Result<()> {
    if !args.list {
        println!("No flag provided; use `scenecast plugins --list` to list plugins.");
        return Ok(());
    }
    let plugins = executables_with_prefix(PLUGIN_PREFIX, env::var_os("PATH"));
    if plugins.is_empty() {
        println!("No plugins installed.");
        return Ok(());
    }
    println!("Plugins:");
    for (name, path) in &plugins {
        println!("  {name}\t{}", path.display());
    }
    Ok(())
}

fn agent_mode() -> bool {
    env::var(AGENT_MODE_ENV).is_ok_and(|value| value == "1")
}

fn report(error: &anyhow::Error) -> ExitCode {
    let typed = find_cli_error(error);
    if agent_mode() {
        let envelope = match typed {
            Some(cli_error) => cli_error.envelope(),
            None => ErrorEnvelope::runtime(format!("{error:#}")),
        };
        match serde_json::to_string_pretty(&envelope) {
            Ok(json) => eprintln!("{json}"),
            Err(_) => eprintln!("error: {error:#}"),
        }
    } else {
        eprintln!("error: {error:#}");
        if matches!(typed, Some(CliError::LegacySyntax { .. })) {
            eprintln!("{USAGE_HINT}");
        }
    }
    ExitCode::from(typed.map_or(1, CliError::exit_code))
}

/// Parses a `render` command line given without the program name.
pub fn parse_render_args(args: &[&str]) -> Result<RenderArgs> {
    let argv = normalize_argv(
        std::iter::once("scenecast")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect(),
    );
    match Cli::try_parse_from(argv)?.command {
        Commands::Render(args) => Ok(args),
        other => bail!("expected a render command, got {other:?}"),
    }
}
