use serde::{Deserialize, Serialize};

/// Square output resolutions the image edit API accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetSize {
    Square256,
    Square512,
    Square1024,
}

impl TargetSize {
    /// Pick the target for an arbitrary source image.
    ///
    /// First match wins: either dimension at or above a tier selects that
    /// tier, with 1024 as the ceiling. Small images are never upscaled past
    /// their natural resolution class.
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        if width >= 1024 || height >= 1024 {
            Self::Square1024
        } else if width >= 512 || height >= 512 {
            Self::Square512
        } else {
            Self::Square256
        }
    }

    /// Edge length in pixels.
    pub fn pixels(self) -> u32 {
        match self {
            Self::Square256 => 256,
            Self::Square512 => 512,
            Self::Square1024 => 1024,
        }
    }

    /// The literal size string the edit API expects.
    pub fn token(self) -> &'static str {
        match self {
            Self::Square256 => "256x256",
            Self::Square512 => "512x512",
            Self::Square1024 => "1024x1024",
        }
    }
}
