//! Backend that hands each scene to the external engine executable.
//!
//! One process per scene: a JSON request goes to the engine's stdin and the
//! last non-empty stdout line is parsed as [`RenderArtifacts`]. Earlier stdout
//! lines are free-form progress and may be written before the request is read.
//! The engine's stderr is left attached to the terminal.

use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{ChildStdin, Command, Stdio};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{RenderArtifacts, RenderBackend, SceneRequest};
use crate::config::RenderConfig;
use crate::error::{CliError, CliResult};
use crate::executables::resolve_executable;
use crate::options::RendererKind;

pub const ENGINE_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct EngineProcessBackend {
    kind: RendererKind,
    program: PathBuf,
    args: Vec<String>,
}

#[derive(Debug, Serialize)]
struct EngineRequest<'a> {
    protocol: u32,
    scene: &'a str,
    definition: &'a Value,
    output_name: Option<&'a str>,
    renderer: RendererKind,
    config: &'a RenderConfig,
}

impl EngineProcessBackend {
    /// `config.engine` is a command line: the program followed by any fixed
    /// arguments, separated by whitespace.
    pub fn connect(kind: RendererKind, config: &RenderConfig) -> CliResult<Self> {
        let mut words = config.engine.split_whitespace().map(str::to_owned);
        let program = words
            .next()
            .and_then(|program| resolve_executable(&program))
            .ok_or_else(|| CliError::BackendUnavailable {
                backend: kind.keyword().to_owned(),
                hint: format!(
                    "engine executable '{}' was not found. Install it on PATH, or point `engine:` in the config file, --engine, or SCENECAST_ENGINE at it.",
                    config.engine
                ),
            })?;
        debug!(renderer = %kind, program = %program.display(), "using engine executable");
        Ok(Self {
            kind,
            program,
            args: words.collect(),
        })
    }
}

impl RenderBackend for EngineProcessBackend {
    fn kind(&self) -> RendererKind {
        self.kind
    }

    fn render_scene(&mut self, request: &SceneRequest<'_>) -> Result<RenderArtifacts> {
        let payload = serde_json::to_vec(&EngineRequest {
            protocol: ENGINE_PROTOCOL_VERSION,
            scene: &request.scene.name,
            definition: &request.scene.definition,
            output_name: request.output_name,
            renderer: self.kind,
            config: request.config,
        })
        .context("failed to serialize engine request")?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("render")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| {
                format!(
                    "failed to spawn engine process {}",
                    self.program.display()
                )
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("failed to capture engine stdin"))?;
        // The request is fed from its own thread so an engine that prints
        // before reading stdin cannot fill the stdout pipe and stall us.
        let (written, output) = thread::scope(|scope| {
            let writer = scope.spawn(move || write_request(stdin, &payload));
            let output = child.wait_with_output();
            (writer.join(), output)
        });
        let output = output.context("failed waiting for engine process")?;
        written.map_err(|_| anyhow!("engine request writer panicked"))??;
        if !output.status.success() {
            bail!(
                "engine failed with status {} while rendering scene '{}'",
                output.status,
                request.scene.name
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_reply(&stdout).with_context(|| {
            format!(
                "engine returned an invalid reply for scene '{}'",
                request.scene.name
            )
        })
    }
}

fn write_request(mut stdin: ChildStdin, payload: &[u8]) -> Result<()> {
    match stdin.write_all(payload).and_then(|()| stdin.flush()) {
        Ok(()) => Ok(()),
        // The engine may exit before reading; its status says why.
        Err(error) if error.kind() == ErrorKind::BrokenPipe => Ok(()),
        Err(error) => Err(error).context("failed to write engine request"),
    }
}

fn parse_reply(stdout: &str) -> Result<RenderArtifacts> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .ok_or_else(|| anyhow!("engine produced no output"))?;
    serde_json::from_str(line).with_context(|| format!("expected a JSON object, got '{line}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn reply_is_last_non_empty_line() {
        let stdout = "rendering...\n{\"movie_path\": \"media/Intro.mp4\"}\n\n";
        let artifacts = parse_reply(stdout).expect("reply parses");
        assert_eq!(
            artifacts.movie_path.as_deref(),
            Some(Path::new("media/Intro.mp4"))
        );
        assert_eq!(artifacts.image_path, None);
    }

    #[test]
    fn empty_or_garbled_reply_is_an_error() {
        assert!(parse_reply("").is_err());
        assert!(parse_reply("done\n").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn round_trips_through_a_fake_engine() {
        use crate::script::SceneDescriptor;
        use std::fs;

        let temp = tempfile::tempdir().expect("tempdir");
        let request_log = temp.path().join("request.json");
        let engine = temp.path().join("fake-engine.sh");
        fs::write(
            &engine,
            format!(
                "cat > '{}'\necho '{{\"image_path\": \"out/Intro.png\"}}'\n",
                request_log.display()
            ),
        )
        .expect("write engine");

        let mut config = RenderConfig::default();
        config.engine = format!("sh {}", engine.display());
        let mut backend =
            EngineProcessBackend::connect(RendererKind::Software, &config).expect("connect");
        let scene = SceneDescriptor::new("Intro", serde_json::json!({ "duration": 1 }));
        let artifacts = backend
            .render_scene(&SceneRequest {
                scene: &scene,
                output_name: Some("opening"),
                config: &config,
            })
            .expect("render succeeds");
        assert_eq!(
            artifacts.image_path.as_deref(),
            Some(Path::new("out/Intro.png"))
        );

        let request: Value =
            serde_json::from_str(&fs::read_to_string(&request_log).expect("request logged"))
                .expect("request is json");
        assert_eq!(request["protocol"], ENGINE_PROTOCOL_VERSION);
        assert_eq!(request["scene"], "Intro");
        assert_eq!(request["output_name"], "opening");
        assert_eq!(request["renderer"], "software");
        assert_eq!(request["definition"]["duration"], 1);
        assert_eq!(request["config"]["quality"], "h");
    }

    #[cfg(unix)]
    #[test]
    fn chatty_engine_that_reads_late_still_completes() {
        use crate::script::SceneDescriptor;
        use std::fs;

        let temp = tempfile::tempdir().expect("tempdir");
        let engine = temp.path().join("chatty-engine.sh");
        fs::write(
            &engine,
            "yes 'warming up' | head -n 40000
cat > /dev/null
echo '{\"movie_path\": \"out/Intro.mp4\"}'\n",
        )
        .expect("write engine");

        let mut config = RenderConfig::default();
        config.engine = format!("sh {}", engine.display());
        let mut backend =
            EngineProcessBackend::connect(RendererKind::Software, &config).expect("connect");
        let scene = SceneDescriptor::new("Intro", Value::Null);
        let artifacts = backend
            .render_scene(&SceneRequest {
                scene: &scene,
                output_name: None,
                config: &config,
            })
            .expect("render succeeds");
        assert_eq!(
            artifacts.movie_path.as_deref(),
            Some(Path::new("out/Intro.mp4"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn failing_engine_is_a_scene_error() {
        use crate::script::SceneDescriptor;
        use std::fs;

        let temp = tempfile::tempdir().expect("tempdir");
        let engine = temp.path().join("broken-engine");
        fs::write(&engine, "exit 3\n").expect("write engine");

        let mut config = RenderConfig::default();
        config.engine = format!("sh {}", engine.display());
        let mut backend =
            EngineProcessBackend::connect(RendererKind::Software, &config).expect("connect");
        let scene = SceneDescriptor::new("Broken", Value::Null);
        let error = backend
            .render_scene(&SceneRequest {
                scene: &scene,
                output_name: None,
                config: &config,
            })
            .expect_err("render should fail");
        assert!(error.to_string().contains("scene 'Broken'"), "{error}");
    }
}
