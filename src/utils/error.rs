//! Error Handling Module
//!
//! Defines the error taxonomy shared by the training, evaluation and serving
//! pipelines. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for tomato leaf classification operations
#[derive(Error, Debug)]
pub enum TomatoError {
    /// Error loading an image from disk
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error decoding image bytes (corrupt or unsupported data)
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Dataset root directory is missing
    #[error("Dataset directory not found: {0}")]
    DatasetNotFound(PathBuf),

    /// Error with model operations
    #[error("Model error: {0}")]
    Model(String),

    /// Model artifact is missing
    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Error with inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<serde_json::Error> for TomatoError {
    fn from(err: serde_json::Error) -> Self {
        TomatoError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for TomatoError {
    fn from(err: image::ImageError) -> Self {
        TomatoError::ImageDecode(err.to_string())
    }
}

/// Convenience Result type for tomato leaf operations
pub type Result<T> = std::result::Result<T, TomatoError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| TomatoError::InvalidInput(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| TomatoError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| TomatoError::InvalidInput(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| TomatoError::InvalidInput(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TomatoError::Dataset("test error".to_string());
        assert_eq!(format!("{}", err), "Dataset error: test error");
    }

    #[test]
    fn test_dataset_not_found_mentions_path() {
        let err = TomatoError::DatasetNotFound(PathBuf::from("Dataset"));
        assert!(format!("{}", err).contains("Dataset"));
    }

    #[test]
    fn test_image_error_conversion() {
        let err = image::load_from_memory(b"definitely not an image").unwrap_err();
        let err: TomatoError = err.into();
        assert!(matches!(err, TomatoError::ImageDecode(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let err = serde_json::from_str::<Vec<f64>>("{not json").unwrap_err();
        let err: TomatoError = err.into();
        assert!(matches!(err, TomatoError::Serialization(_)));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let with_context = result.context("Failed to read file");
        assert!(format!("{}", with_context.unwrap_err()).contains("Failed to read file"));
    }

    #[test]
    fn test_option_context() {
        let opt: Option<i32> = None;
        let with_context = opt.context("Value was None");
        assert!(with_context.is_err());
    }
}
