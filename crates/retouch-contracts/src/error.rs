use thiserror::Error;

pub type Result<T> = std::result::Result<T, RetouchError>;

/// Failure categories for a pipeline run.
///
/// No component retries; every error propagates unchanged to the caller,
/// and intermediate files already written stay on disk for inspection.
#[derive(Debug, Error)]
pub enum RetouchError {
    /// Caller-supplied image or options rejected before any network call.
    #[error("invalid input: {0}")]
    Input(String),

    /// The smart-crop or segmentation request failed, returned a
    /// non-success status, or returned a payload that does not decode as
    /// an image.
    #[error("segmentation service error: {0}")]
    Segmentation(String),

    /// The generative image endpoint rejected the request or returned an
    /// unusable payload.
    #[error("image API error: {0}")]
    EditApi(String),

    /// Reading or writing a pipeline artifact on local disk failed.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl RetouchError {
    pub fn input<S: Into<String>>(msg: S) -> Self {
        Self::Input(msg.into())
    }

    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    pub fn edit_api<S: Into<String>>(msg: S) -> Self {
        Self::EditApi(msg.into())
    }

    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }
}

impl From<std::io::Error> for RetouchError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
