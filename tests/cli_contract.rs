use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::tempdir;

/// Runs the binary in `cwd` with user-level config isolated to `cwd/home`.
fn run_scenecast(cwd: &Path, args: &[&str], envs: &[(&str, &str)]) -> Output {
    let home = cwd.join("home");
    fs::create_dir_all(&home).expect("home should create");
    let mut command = Command::new(env!("CARGO_BIN_EXE_scenecast"));
    command
        .current_dir(cwd)
        .args(args)
        .env("HOME", &home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("APPDATA", &home)
        .env_remove("SCENECAST_CONFIG_FILE")
        .env_remove("SCENECAST_MEDIA_DIR")
        .env_remove("SCENECAST_ENGINE")
        .env_remove("SCENECAST_AGENT_MODE")
        .env_remove("RUST_LOG");
    for (key, value) in envs {
        command.env(key, value);
    }
    command.output().expect("scenecast command should run")
}

fn agent_error(output: &Output) -> Value {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let start = stderr.find('{').expect("stderr should contain a json envelope");
    serde_json::from_str(&stderr[start..]).expect("envelope should be valid json")
}

fn write_script(dir: &Path, yaml: &str) {
    fs::write(dir.join("talk.yaml"), yaml).expect("script should write");
}

#[test]
fn options_after_scene_names_exit_with_usage_error() {
    let dir = tempdir().expect("tempdir should create");
    write_script(dir.path(), "scenes:\n  - name: Intro\n");

    let output = run_scenecast(dir.path(), &["talk.yaml", "Intro", "-p"], &[]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("'-p'"), "stderr: {stderr}");
    assert!(
        stderr.contains("scenecast [OPTIONS] [FILE] [SCENES]"),
        "stderr: {stderr}"
    );
}

#[test]
fn both_deprecated_renderer_flags_are_rejected() {
    let dir = tempdir().expect("tempdir should create");
    write_script(dir.path(), "scenes:\n  - name: Intro\n");

    let output = run_scenecast(
        dir.path(),
        &[
            "--use-opengl-renderer",
            "--use-webgl-renderer",
            "talk.yaml",
        ],
        &[("SCENECAST_AGENT_MODE", "1")],
    );
    assert_eq!(output.status.code(), Some(1));
    let envelope = agent_error(&output);
    assert_eq!(envelope["ok"], Value::Bool(false));
    assert_eq!(envelope["error"]["code"], "CONFLICTING_RENDERER");
}

#[test]
fn malformed_range_is_a_validation_error() {
    let dir = tempdir().expect("tempdir should create");
    write_script(dir.path(), "scenes:\n  - name: Intro\n");

    let output = run_scenecast(
        dir.path(),
        &["-n", "1,2,3", "talk.yaml"],
        &[("SCENECAST_AGENT_MODE", "1")],
    );
    assert_eq!(output.status.code(), Some(1));
    let envelope = agent_error(&output);
    assert_eq!(envelope["error"]["code"], "INVALID_RANGE");
    assert_eq!(envelope["error"]["details"]["provided"], "1,2,3");
}

#[test]
fn missing_input_file_is_reported() {
    let dir = tempdir().expect("tempdir should create");
    let output = run_scenecast(dir.path(), &["-ql"], &[("SCENECAST_AGENT_MODE", "1")]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(agent_error(&output)["error"]["code"], "MISSING_INPUT_FILE");
}

#[test]
fn missing_engine_is_backend_unavailable() {
    let dir = tempdir().expect("tempdir should create");
    write_script(dir.path(), "scenes:\n  - name: Intro\n");

    let output = run_scenecast(
        dir.path(),
        &["talk.yaml"],
        &[
            ("SCENECAST_AGENT_MODE", "1"),
            ("SCENECAST_ENGINE", "scenecast-engine-not-installed"),
        ],
    );
    assert_eq!(output.status.code(), Some(1));
    let envelope = agent_error(&output);
    assert_eq!(envelope["error"]["code"], "BACKEND_UNAVAILABLE");
    assert_eq!(envelope["error"]["details"]["backend"], "software");
}

#[test]
fn jupyter_prints_the_merged_config() {
    let dir = tempdir().expect("tempdir should create");
    fs::write(dir.path().join("scenecast.yaml"), "format: gif\nquality: m\n")
        .expect("folder config should write");
    write_script(dir.path(), "scenes:\n  - name: Intro\n");

    let output = run_scenecast(
        dir.path(),
        &["--jupyter", "-q", "l", "--fps", "12", "talk.yaml"],
        &[],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let config: Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be the config json");
    assert_eq!(config["format"], "gif");
    assert_eq!(config["quality"], "l");
    assert_eq!(config["resolution"]["width"], 854);
    assert_eq!(config["frame_rate"], 12.0);
    assert_eq!(config["renderer"], "software");
}

#[test]
fn media_dir_flag_beats_custom_folders_from_config() {
    let dir = tempdir().expect("tempdir should create");
    fs::write(
        dir.path().join("scenecast.yaml"),
        "custom_folders:\n  media_dir: file-custom\n",
    )
    .expect("folder config should write");
    write_script(dir.path(), "scenes:\n  - name: Intro\n");

    let output = run_scenecast(
        dir.path(),
        &[
            "--jupyter",
            "--custom-folders",
            "--media-dir",
            "cli-media",
            "talk.yaml",
        ],
        &[],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let config: Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be the config json");
    assert_eq!(config["media_dir"], "cli-media");
}

#[test]
fn scene_not_found_lists_missing_names() {
    let dir = tempdir().expect("tempdir should create");
    write_script(dir.path(), "scenes:\n  - name: A\n  - name: B\n");

    let output = run_scenecast(
        dir.path(),
        &["talk.yaml", "Z"],
        &[("SCENECAST_AGENT_MODE", "1"), ("SCENECAST_ENGINE", "sh")],
    );
    assert_eq!(output.status.code(), Some(1));
    let envelope = agent_error(&output);
    assert_eq!(envelope["error"]["code"], "SCENE_NOT_FOUND");
    assert_eq!(envelope["error"]["details"]["missing"][0], "Z");
}

#[cfg(unix)]
#[test]
fn fake_engine_renders_every_scene() {
    let dir = tempdir().expect("tempdir should create");
    write_script(dir.path(), "scenes:\n  - name: A\n  - name: B\n");
    let requests = dir.path().join("requests.log");
    let engine = dir.path().join("engine.sh");
    fs::write(
        &engine,
        format!(
            "cat >> '{}'\necho >> '{}'\necho '{{\"movie_path\": \"media/out.mp4\"}}'\n",
            requests.display(),
            requests.display()
        ),
    )
    .expect("engine should write");
    let engine_command = format!("sh {}", engine.display());

    let output = run_scenecast(
        dir.path(),
        &["-q", "l", "talk.yaml"],
        &[("SCENECAST_ENGINE", engine_command.as_str())],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let log = fs::read_to_string(&requests).expect("engine should record requests");
    let scenes = log
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let request: Value = serde_json::from_str(line).expect("request should be json");
            assert_eq!(request["config"]["quality"], "l");
            request["scene"].as_str().unwrap_or_default().to_owned()
        })
        .collect::<Vec<_>>();
    assert_eq!(scenes, vec!["A", "B"]);
}

#[cfg(unix)]
#[test]
fn partial_scene_failure_still_exits_zero() {
    let dir = tempdir().expect("tempdir should create");
    write_script(dir.path(), "scenes:\n  - name: A\n  - name: B\n  - name: C\n");
    let engine = dir.path().join("engine.sh");
    fs::write(
        &engine,
        "request=$(cat)\ncase \"$request\" in\n  *'\"scene\":\"B\"'*) echo 'B is broken' >&2; exit 3 ;;\nesac\necho '{}'\n",
    )
    .expect("engine should write");
    let engine_command = format!("sh {}", engine.display());

    let output = run_scenecast(
        dir.path(),
        &["talk.yaml"],
        &[("SCENECAST_ENGINE", engine_command.as_str())],
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {stderr}");
    assert!(stderr.contains("B is broken"), "stderr: {stderr}");
    assert!(stderr.contains("scene 'B'"), "stderr: {stderr}");
}

#[test]
fn plugins_are_listed_from_path() {
    let dir = tempdir().expect("tempdir should create");
    let bin = dir.path().join("bin");
    fs::create_dir_all(&bin).expect("bin should create");
    let plugin = bin.join("scenecast-slides");
    fs::write(&plugin, "").expect("plugin should write");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&plugin, fs::Permissions::from_mode(0o755))
            .expect("plugin should be executable");
    }
    let path = bin.to_string_lossy().into_owned();

    let output = run_scenecast(dir.path(), &["plugins", "--list"], &[("PATH", path.as_str())]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("slides"), "stdout: {stdout}");

    let bare = run_scenecast(dir.path(), &["plugins"], &[]);
    assert!(bare.status.success());
    assert!(String::from_utf8_lossy(&bare.stdout).contains("--list"));
}

#[test]
fn cfg_write_then_show_round_trips() {
    let dir = tempdir().expect("tempdir should create");

    let first = run_scenecast(dir.path(), &["cfg", "write"], &[]);
    assert!(
        first.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&first.stderr)
    );
    assert!(dir.path().join("scenecast.yaml").is_file());

    let again = run_scenecast(dir.path(), &["cfg", "write"], &[]);
    assert_eq!(again.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&again.stderr).contains("--force"));

    let show = run_scenecast(dir.path(), &["cfg", "show"], &[]);
    assert!(show.status.success());
    let stdout = String::from_utf8_lossy(&show.stdout);
    assert!(stdout.contains("scenecast.yaml"), "stdout: {stdout}");
    assert!(stdout.contains("quality: h"), "stdout: {stdout}");

    let export_dir = dir.path().join("exported");
    let export = run_scenecast(
        dir.path(),
        &["cfg", "export", "--dir", export_dir.to_string_lossy().as_ref()],
        &[],
    );
    assert!(export.status.success());
    let exported =
        fs::read_to_string(export_dir.join("scenecast.yaml")).expect("export should write");
    assert!(exported.contains("renderer: software"), "exported: {exported}");
}
