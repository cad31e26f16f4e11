use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RetouchError;

/// Most artifacts a single image API request may return.
pub const MAX_RESULT_COUNT: u32 = 10;

/// Which part of the thumbnail an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusMode {
    Background,
    Foreground,
}

impl FocusMode {
    /// Segmentation semantics the vision service must run for this focus.
    pub fn segmentation_mode(self) -> SegmentationMode {
        match self {
            Self::Background => SegmentationMode::BackgroundRemoval,
            Self::Foreground => SegmentationMode::ForegroundMatting,
        }
    }
}

impl FromStr for FocusMode {
    type Err = RetouchError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "background" => Ok(Self::Background),
            "foreground" => Ok(Self::Foreground),
            other => Err(RetouchError::input(format!(
                "unsupported focus mode '{other}'; expected 'background' or 'foreground'"
            ))),
        }
    }
}

/// Segmentation variant requested from the vision service. Always passed
/// explicitly, never inferred from prior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationMode {
    /// Cutout with the background made transparent.
    BackgroundRemoval,
    /// Grayscale matte: 0 = background, 255 = foreground confidence.
    ForegroundMatting,
}

impl SegmentationMode {
    /// The mode value the service's query string expects.
    pub fn as_query_value(self) -> &'static str {
        match self {
            Self::BackgroundRemoval => "backgroundRemoval",
            Self::ForegroundMatting => "foregroundMatting",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditOptions {
    pub prompt: String,
    pub source: PathBuf,
    pub focus: FocusMode,
    #[serde(default = "default_count")]
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub prompt: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationOptions {
    pub source: PathBuf,
    #[serde(default = "default_variant_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

fn default_variant_count() -> u32 {
    4
}

/// Check a requested artifact count before any network work happens.
pub fn validate_result_count(count: u32) -> Result<u32, RetouchError> {
    if count == 0 || count > MAX_RESULT_COUNT {
        return Err(RetouchError::input(format!(
            "result count must be between 1 and {MAX_RESULT_COUNT}, got {count}"
        )));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_mode_parses_both_recognized_values() {
        assert_eq!(
            "background".parse::<FocusMode>().unwrap(),
            FocusMode::Background
        );
        assert_eq!(
            " Foreground ".parse::<FocusMode>().unwrap(),
            FocusMode::Foreground
        );
    }

    #[test]
    fn unknown_focus_mode_is_an_input_error() {
        let err = "blurry".parse::<FocusMode>().unwrap_err();
        assert!(matches!(err, RetouchError::Input(_)));
        assert!(err.to_string().contains("blurry"));
    }

    #[test]
    fn focus_maps_to_the_matching_segmentation_mode() {
        assert_eq!(
            FocusMode::Background.segmentation_mode().as_query_value(),
            "backgroundRemoval"
        );
        assert_eq!(
            FocusMode::Foreground.segmentation_mode().as_query_value(),
            "foregroundMatting"
        );
    }

    #[test]
    fn result_count_bounds() {
        assert!(validate_result_count(0).is_err());
        assert!(validate_result_count(MAX_RESULT_COUNT + 1).is_err());
        assert_eq!(validate_result_count(1).unwrap(), 1);
        assert_eq!(validate_result_count(4).unwrap(), 4);
        assert_eq!(validate_result_count(MAX_RESULT_COUNT).unwrap(), MAX_RESULT_COUNT);
    }

    #[test]
    fn variation_count_defaults_to_four() {
        let options: VariationOptions =
            serde_json::from_str(r#"{"source": "photo.jpg"}"#).unwrap();
        assert_eq!(options.count, 4);
    }
}
