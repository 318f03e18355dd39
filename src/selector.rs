//! Backend choice, kept apart from merging so the precedence policy can be
//! tested on its own.

use crate::error::{CliError, CliResult};
use crate::options::RendererKind;

pub const GPU_FLAG: &str = "--use-opengl-renderer";
pub const REMOTE_FLAG: &str = "--use-webgl-renderer";

/// The renderer-related inputs after layering, before a backend is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererRequest {
    pub renderer: Option<RendererKind>,
    pub use_gpu_renderer: bool,
    pub use_remote_renderer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    Explicit,
    DeprecatedFlag(&'static str),
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub kind: RendererKind,
    pub reason: SelectionReason,
    /// A deprecated flag that lost to `--renderer`.
    pub ignored_flag: Option<&'static str>,
}

impl Selection {
    pub fn deprecation_notice(&self) -> Option<String> {
        match self.reason {
            SelectionReason::DeprecatedFlag(flag) => Some(format!(
                "{flag} is deprecated, please use --renderer={} instead",
                self.kind
            )),
            _ => self.ignored_flag.map(|flag| {
                format!(
                    "{flag} is deprecated and ignored because --renderer={} was given",
                    self.kind
                )
            }),
        }
    }
}

/// Decision table, first match wins:
/// both deprecated flags -> conflict; `--renderer` -> it; one deprecated
/// flag -> its backend; otherwise software.
pub fn select(request: &RendererRequest) -> CliResult<Selection> {
    if request.use_gpu_renderer && request.use_remote_renderer {
        return Err(CliError::ConflictingRenderer);
    }

    let deprecated = if request.use_gpu_renderer {
        Some((RendererKind::Gpu, GPU_FLAG))
    } else if request.use_remote_renderer {
        Some((RendererKind::Remote, REMOTE_FLAG))
    } else {
        None
    };

    let selection = match (request.renderer, deprecated) {
        (Some(kind), deprecated) => Selection {
            kind,
            reason: SelectionReason::Explicit,
            ignored_flag: deprecated.map(|(_, flag)| flag),
        },
        (None, Some((kind, flag))) => Selection {
            kind,
            reason: SelectionReason::DeprecatedFlag(flag),
            ignored_flag: None,
        },
        (None, None) => Selection {
            kind: RendererKind::Software,
            reason: SelectionReason::Default,
            ignored_flag: None,
        },
    };
    Ok(selection)
}
