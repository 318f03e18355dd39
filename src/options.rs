//! Per-flag mini-grammars and the enumerated option values.
//!
//! Everything here is a pure function of its input. Empty input means "no
//! override" and is never an error; malformed input always is.

use std::fmt;
use std::sync::OnceLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::error::{CliError, CliResult};

/// `-n` value: render from animation `start` up to `end` (inclusive), or to
/// the last animation when `end` is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationRange {
    pub start: u32,
    pub end: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn pair_separators() -> &'static Regex {
    static SEPARATOR_RE: OnceLock<Regex> = OnceLock::new();
    SEPARATOR_RE.get_or_init(|| Regex::new(r"[;,-]").expect("separator regex should compile"))
}

/// Splits on `;`, `,` or `-` and requires every token to be an integer.
fn split_integers(raw: &str) -> Option<Vec<u32>> {
    pair_separators()
        .split(raw)
        .map(|token| token.trim().parse::<u32>().ok())
        .collect()
}

pub fn parse_range(raw: &str) -> CliResult<Option<AnimationRange>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if let Ok(start) = trimmed.parse::<u32>() {
        return Ok(Some(AnimationRange { start, end: None }));
    }

    match split_integers(trimmed).as_deref() {
        Some([start, end]) => Ok(Some(AnimationRange {
            start: *start,
            end: Some(*end),
        })),
        _ => Err(CliError::InvalidRange {
            raw: raw.to_owned(),
        }),
    }
}

pub fn parse_resolution(raw: &str) -> CliResult<Option<Resolution>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    match split_integers(trimmed).as_deref() {
        Some([width, height]) => Ok(Some(Resolution::new(*width, *height))),
        _ => Err(CliError::InvalidResolution {
            raw: raw.to_owned(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Gif,
    Mp4,
}

impl OutputFormat {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Mp4 => "mp4",
        }
    }
}

/// Named shorthand for a fixed resolution and frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Quality {
    #[value(name = "l", alias = "low")]
    #[serde(rename = "l", alias = "low", alias = "low_quality")]
    Low,
    #[value(name = "m", alias = "medium")]
    #[serde(rename = "m", alias = "medium", alias = "medium_quality")]
    Medium,
    #[value(name = "h", alias = "high")]
    #[serde(rename = "h", alias = "high", alias = "high_quality")]
    High,
    #[value(name = "p", alias = "production")]
    #[serde(rename = "p", alias = "production", alias = "production_quality")]
    Production,
    #[value(name = "k", alias = "fourk")]
    #[serde(rename = "k", alias = "fourk", alias = "fourk_quality")]
    FourK,
}

impl Quality {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Low => "l",
            Self::Medium => "m",
            Self::High => "h",
            Self::Production => "p",
            Self::FourK => "k",
        }
    }

    pub fn resolution(self) -> Resolution {
        match self {
            Self::Low => Resolution::new(854, 480),
            Self::Medium => Resolution::new(1280, 720),
            Self::High => Resolution::new(1920, 1080),
            Self::Production => Resolution::new(2560, 1440),
            Self::FourK => Resolution::new(3840, 2160),
        }
    }

    pub fn frame_rate(self) -> f64 {
        match self {
            Self::Low | Self::Medium => 30.0,
            Self::High | Self::Production | Self::FourK => 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProgressBar {
    Display,
    Leave,
    #[value(name = "none")]
    #[serde(rename = "none")]
    Hidden,
}

/// The three mutually exclusive render backends.
///
/// The engine's historical names (`cairo`, `opengl`, `webgl`) are accepted
/// as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    #[value(alias = "cairo")]
    #[serde(alias = "cairo")]
    Software,
    #[value(alias = "opengl")]
    #[serde(alias = "opengl")]
    Gpu,
    #[value(alias = "webgl")]
    #[serde(alias = "webgl")]
    Remote,
}

impl RendererKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Software => "software",
            Self::Gpu => "gpu",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[serde(alias = "TRACE")]
    Trace,
    #[serde(alias = "DEBUG")]
    Debug,
    #[serde(alias = "INFO")]
    Info,
    #[serde(alias = "WARNING", alias = "warn")]
    Warning,
    #[serde(alias = "ERROR")]
    Error,
    #[serde(alias = "CRITICAL")]
    Critical,
}

impl Verbosity {
    /// Maps a repeated `-v` count onto a level. Zero means "not given".
    pub fn from_count(count: u8) -> Option<Self> {
        match count {
            0 => None,
            1 => Some(Self::Debug),
            _ => Some(Self::Trace),
        }
    }

    pub fn is_debug(self) -> bool {
        self <= Self::Debug
    }

    pub fn level_filter(self) -> LevelFilter {
        match self {
            Self::Trace => LevelFilter::TRACE,
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warning => LevelFilter::WARN,
            Self::Error | Self::Critical => LevelFilter::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_accepts_single_and_pairs() {
        assert_eq!(
            parse_range("3").unwrap(),
            Some(AnimationRange { start: 3, end: None })
        );
        for raw in ["2,7", "2;7", "2-7", " 2 , 7 "] {
            assert_eq!(
                parse_range(raw).unwrap(),
                Some(AnimationRange {
                    start: 2,
                    end: Some(7)
                }),
                "{raw}"
            );
        }
    }

    #[test]
    fn range_rejects_malformed_input() {
        for raw in ["a", "1,2,3", "1,", ",1", "1-2-3", "1;x", "-1", "1.5"] {
            assert_eq!(
                parse_range(raw),
                Err(CliError::InvalidRange {
                    raw: raw.to_owned()
                }),
                "{raw}"
            );
        }
    }

    #[test]
    fn empty_input_is_no_override() {
        assert_eq!(parse_range("").unwrap(), None);
        assert_eq!(parse_range("   ").unwrap(), None);
        assert_eq!(parse_resolution("").unwrap(), None);
    }

    #[test]
    fn resolution_requires_exactly_two_integers() {
        assert_eq!(
            parse_resolution("1080,1920").unwrap(),
            Some(Resolution::new(1080, 1920))
        );
        assert_eq!(
            parse_resolution("640;480").unwrap(),
            Some(Resolution::new(640, 480))
        );
        assert_eq!(
            parse_resolution("640-480").unwrap(),
            Some(Resolution::new(640, 480))
        );
        for raw in ["640", "640x480", "1,2,3", "w,h", "640,"] {
            assert!(
                matches!(parse_resolution(raw), Err(CliError::InvalidResolution { .. })),
                "{raw}"
            );
        }
    }

    #[test]
    fn quality_presets_expand_to_fixed_pairs() {
        assert_eq!(Quality::Low.resolution(), Resolution::new(854, 480));
        assert_eq!(Quality::Low.frame_rate(), 30.0);
        assert_eq!(Quality::Medium.resolution(), Resolution::new(1280, 720));
        assert_eq!(Quality::High.frame_rate(), 60.0);
        assert_eq!(Quality::FourK.resolution(), Resolution::new(3840, 2160));
    }

    #[test]
    fn enumerations_parse_like_the_cli() {
        assert_eq!(
            Quality::from_str("k", true).unwrap(),
            Quality::FourK
        );
        assert_eq!(
            RendererKind::from_str("opengl", true).unwrap(),
            RendererKind::Gpu
        );
        assert_eq!(
            ProgressBar::from_str("none", true).unwrap(),
            ProgressBar::Hidden
        );
        assert!(OutputFormat::from_str("webm", true).is_err());
    }

    #[test]
    fn verbosity_threshold() {
        assert!(Verbosity::Debug.is_debug());
        assert!(Verbosity::Trace.is_debug());
        assert!(!Verbosity::Info.is_debug());
        assert_eq!(Verbosity::from_count(0), None);
        assert_eq!(Verbosity::from_count(1), Some(Verbosity::Debug));
        assert_eq!(Verbosity::from_count(4), Some(Verbosity::Trace));
    }
}
