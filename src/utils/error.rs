use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong between locating the input image and writing
/// the result. None of these abort a run: the processor converts each one
/// into an error-tagged fallback record.
#[derive(Error, Debug)]
pub enum KycError {
    #[error("Image unreadable: {0}")]
    ImageUnreadable(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("OCR timed out after {0:?}")]
    OcrTimeout(Duration),

    #[error("No input image found in {}", .0.display())]
    NoInputFound(PathBuf),

    #[error("Protected data entry not found: {0}")]
    NotFound(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KycError {
    /// Stable tag written to the `error_kind` field of the output record.
    pub fn kind(&self) -> &'static str {
        match self {
            KycError::ImageUnreadable(_) => "image_unreadable",
            KycError::Ocr(_) => "ocr_error",
            KycError::OcrTimeout(_) => "ocr_timeout",
            KycError::NoInputFound(_) => "no_input_found",
            KycError::NotFound(_) => "not_found",
            KycError::Deserialization(_) => "deserialization_error",
            KycError::Config(_) => "config_error",
            KycError::Io(_) => "io_error",
        }
    }
}

impl From<serde_json::Error> for KycError {
    fn from(err: serde_json::Error) -> Self {
        KycError::Deserialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KycError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(KycError::Ocr("boom".into()).kind(), "ocr_error");
        assert_eq!(
            KycError::NoInputFound(PathBuf::from("input")).kind(),
            "no_input_found"
        );
        assert_eq!(
            KycError::OcrTimeout(Duration::from_secs(3)).to_string(),
            "OCR timed out after 3s"
        );
    }

    #[test]
    fn test_json_errors_are_deserialization() {
        let err: KycError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "deserialization_error");
    }
}
