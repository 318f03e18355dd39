use std::path::PathBuf;

use serde::Serialize;
use serde_json::{json, Value};

pub type CliResult<T> = Result<T, CliError>;

/// Failures that abort an invocation before or instead of rendering.
///
/// Scene-level render failures are not represented here; they are recorded
/// per scene by the dispatcher and never escalate to a `CliError`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    #[error("couldn't determine a range for -n option from '{raw}'")]
    InvalidRange { raw: String },

    #[error("resolution option '{raw}' is invalid: expected two integers separated by ';', ',' or '-'")]
    InvalidResolution { raw: String },

    #[error("frame rate must be a positive number, got {raw}")]
    InvalidFrameRate { raw: String },

    #[error("you may select only one renderer: --use-opengl-renderer and --use-webgl-renderer were both given")]
    ConflictingRenderer,

    #[error("scene(s) not found in {}: {}", file.display(), names.join(", "))]
    SceneNotFound { file: PathBuf, names: Vec<String> },

    #[error("there are no scenes inside {}", file.display())]
    NoScenes { file: PathBuf },

    #[error("no input FILE given; pass the path of a scene script")]
    MissingInputFile,

    #[error("options must come before FILE and SCENES; found '{token}' after the scene names")]
    LegacySyntax { token: String },

    #[error("the {backend} renderer is unavailable: {hint}")]
    BackendUnavailable { backend: String, hint: String },

    #[error("invalid configuration in {}: {message}", source_path.display())]
    Config { source_path: PathBuf, message: String },
}

impl CliError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRange { .. } => "INVALID_RANGE",
            Self::InvalidResolution { .. } => "INVALID_RESOLUTION",
            Self::InvalidFrameRate { .. } => "INVALID_FRAME_RATE",
            Self::ConflictingRenderer => "CONFLICTING_RENDERER",
            Self::SceneNotFound { .. } => "SCENE_NOT_FOUND",
            Self::NoScenes { .. } => "NO_SCENES",
            Self::MissingInputFile => "MISSING_INPUT_FILE",
            Self::LegacySyntax { .. } => "LEGACY_SYNTAX",
            Self::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            Self::Config { .. } => "INVALID_CONFIG",
        }
    }

    /// Usage errors exit with 2, everything else with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::LegacySyntax { .. } => 2,
            _ => 1,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::InvalidRange { raw } | Self::InvalidResolution { raw } => Some(json!({
                "provided": raw,
                "separators": [";", ",", "-"]
            })),
            Self::SceneNotFound { file, names } => Some(json!({
                "file": file.display().to_string(),
                "missing": names
            })),
            Self::BackendUnavailable { backend, hint } => Some(json!({
                "backend": backend,
                "hint": hint
            })),
            _ => None,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code().to_owned(),
                message: self.to_string(),
                details: self.details(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

impl ErrorEnvelope {
    /// Envelope for a failure outside the typed taxonomy.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: ErrorEnvelopeBody {
                code: String::from("RUNTIME_ERROR"),
                message: message.into(),
                details: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn find_cli_error(error: &anyhow::Error) -> Option<&CliError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CliError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn codes_are_stable() {
        assert_eq!(CliError::ConflictingRenderer.code(), "CONFLICTING_RENDERER");
        assert_eq!(
            CliError::InvalidRange { raw: "x".into() }.code(),
            "INVALID_RANGE"
        );
        assert_eq!(
            CliError::LegacySyntax { token: "-p".into() }.exit_code(),
            2
        );
        assert_eq!(CliError::MissingInputFile.exit_code(), 1);
    }

    #[test]
    fn scene_not_found_lists_every_name() {
        let error = CliError::SceneNotFound {
            file: PathBuf::from("talk.yaml"),
            names: vec!["Z".into(), "Y".into()],
        };
        let message = error.to_string();
        assert!(message.contains("talk.yaml"));
        assert!(message.contains("Z, Y"));

        let envelope = serde_json::to_value(error.envelope()).expect("envelope serializes");
        assert_eq!(envelope["ok"], json!(false));
        assert_eq!(envelope["error"]["code"], json!("SCENE_NOT_FOUND"));
        assert_eq!(envelope["error"]["details"]["missing"], json!(["Z", "Y"]));
    }

    #[test]
    fn typed_error_survives_anyhow_context() {
        let result: anyhow::Result<()> =
            Err(CliError::ConflictingRenderer).context("failed to merge configuration");
        let error = result.expect_err("should fail");
        assert_eq!(find_cli_error(&error), Some(&CliError::ConflictingRenderer));
    }
}
