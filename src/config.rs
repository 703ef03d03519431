use crate::projection::ScreenPlacement;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// How the left and right eye images are packed into one video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Layout {
    #[default]
    #[serde(rename = "mono")]
    Mono,
    #[serde(rename = "stereoLeftRight")]
    StereoLeftRight,
    #[serde(rename = "stereoTopBottom")]
    StereoTopBottom,
}

impl Layout {
    pub fn label(self) -> &'static str {
        match self {
            Layout::Mono => "mono",
            Layout::StereoLeftRight => "stereoLeftRight",
            Layout::StereoTopBottom => "stereoTopBottom",
        }
    }
}

/// Projection geometry the video is mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Format {
    #[default]
    #[serde(rename = "screen")]
    Screen,
    /// 180° hemisphere.
    #[serde(rename = "180")]
    Half,
    /// 360° full sphere.
    #[serde(rename = "360")]
    Full,
}

impl Format {
    pub fn label(self) -> &'static str {
        match self {
            Format::Screen => "screen",
            Format::Half => "180",
            Format::Full => "360",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Eye {
    #[default]
    #[serde(rename = "left")]
    Left,
    #[serde(rename = "right")]
    Right,
    /// The single view of a mono display.
    #[serde(rename = "none")]
    None,
}

impl Eye {
    pub fn label(self) -> &'static str {
        match self {
            Eye::Left => "left",
            Eye::Right => "right",
            Eye::None => "none",
        }
    }
}

macro_rules! display_via_label {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        })*
    };
}

display_via_label!(Layout, Format, Eye);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unrecognized layout `{0}` (expected mono, stereoLeftRight or stereoTopBottom)")]
    UnknownLayout(String),
    #[error("unrecognized format `{0}` (expected screen, 180 or 360)")]
    UnknownFormat(String),
    #[error("unrecognized eye `{0}` (expected left, right or none)")]
    UnknownEye(String),
    #[error("failed to read player config: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed player config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl FromStr for Layout {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "mono" => Ok(Layout::Mono),
            "stereoLeftRight" => Ok(Layout::StereoLeftRight),
            "stereoTopBottom" => Ok(Layout::StereoTopBottom),
            other => Err(ConfigError::UnknownLayout(other.to_string())),
        }
    }
}

impl FromStr for Format {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "screen" => Ok(Format::Screen),
            "180" => Ok(Format::Half),
            "360" => Ok(Format::Full),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

impl FromStr for Eye {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "left" => Ok(Eye::Left),
            "right" => Ok(Eye::Right),
            "none" => Ok(Eye::None),
            other => Err(ConfigError::UnknownEye(other.to_string())),
        }
    }
}

pub const DEFAULT_SEGMENTS: u32 = 64;

/// Everything a renderer instance is built from. A renderer never mutates
/// its copy; a new configuration means a new renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerConfig {
    pub layout: Layout,
    pub flip_layout: bool,
    pub format: Format,
    pub segments: u32,
    pub screen: ScreenPlacement,
    pub clear_color: [f32; 4],
    pub debug_view: Eye,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            layout: Layout::Mono,
            flip_layout: false,
            format: Format::Screen,
            segments: DEFAULT_SEGMENTS,
            screen: ScreenPlacement::default(),
            clear_color: [1.0, 1.0, 1.0, 1.0],
            debug_view: Eye::Left,
        }
    }
}

impl PlayerConfig {
    pub fn new(layout: Layout, flip_layout: bool, format: Format) -> Self {
        Self {
            layout,
            flip_layout,
            format,
            ..Self::default()
        }
    }

    pub fn with_segments(mut self, segments: u32) -> Self {
        self.segments = segments;
        self
    }

    pub fn with_debug_view(mut self, eye: Eye) -> Self {
        self.debug_view = eye;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&contents)?;
        log::debug!(
            "[config] loaded {} (layout {}, format {}, flip {})",
            path.as_ref().display(),
            config.layout,
            config.format,
            config.flip_layout
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ui_strings() {
        assert_eq!("stereoLeftRight".parse::<Layout>().unwrap(), Layout::StereoLeftRight);
        assert_eq!("180".parse::<Format>().unwrap(), Format::Half);
        assert_eq!("360".parse::<Format>().unwrap(), Format::Full);
        assert_eq!("right".parse::<Eye>().unwrap(), Eye::Right);
    }

    #[test]
    fn rejects_unknown_values() {
        let err = "sideBySide".parse::<Layout>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownLayout(ref value) if value == "sideBySide"));
        assert!("720".parse::<Format>().is_err());
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = PlayerConfig::from_json_str(
            r#"{ "layout": "stereoTopBottom", "format": "180", "flipLayout": true }"#,
        )
        .expect("config should parse");
        assert_eq!(config.layout, Layout::StereoTopBottom);
        assert_eq!(config.format, Format::Half);
        assert!(config.flip_layout);
        assert_eq!(config.segments, DEFAULT_SEGMENTS);
        assert_eq!(config.debug_view, Eye::Left);
    }

    #[test]
    fn json_rejects_unknown_layout() {
        let err = PlayerConfig::from_json_str(r#"{ "layout": "quad" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn display_matches_parse() {
        for layout in [Layout::Mono, Layout::StereoLeftRight, Layout::StereoTopBottom] {
            assert_eq!(layout.to_string().parse::<Layout>().unwrap(), layout);
        }
        for format in [Format::Screen, Format::Half, Format::Full] {
            assert_eq!(format.to_string().parse::<Format>().unwrap(), format);
        }
    }
}
