//! Error types for lipsync
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for the lipsync crate
#[derive(Error, Debug)]
pub enum LipSyncError {
    #[error("{}", friendly_network_error(.0))]
    Network(#[from] reqwest::Error),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for lipsync
pub type Result<T> = std::result::Result<T, LipSyncError>;

fn friendly_network_error(e: &reqwest::Error) -> String {
    if e.is_builder() {
        if let Some(url) = e.url() {
            return format!("Invalid URL: {url}");
        }
        return "Invalid URL".to_string();
    }
    if e.is_connect() {
        if let Some(url) = e.url() {
            return format!("Could not connect to {}", url.host_str().unwrap_or("server"));
        }
        return "Could not connect to server".to_string();
    }
    if e.is_body() || e.is_decode() {
        return "Failed to read response body".to_string();
    }
    format!("Network error: {e}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_error_display() {
        let err = LipSyncError::Audio("no output device".to_string());
        assert_eq!(err.to_string(), "Audio error: no output device");
    }

    #[test]
    fn decode_error_display() {
        let err = LipSyncError::Decode("Probe error: unsupported format".to_string());
        assert_eq!(
            err.to_string(),
            "Decode error: Probe error: unsupported format"
        );
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "clip.mp3");
        let err: LipSyncError = io.into();
        assert!(matches!(err, LipSyncError::Io(_)));
        assert!(err.to_string().contains("clip.mp3"));
    }

    #[test]
    fn invalid_url_is_friendly() {
        let e = reqwest::blocking::get("not a url").unwrap_err();
        let err: LipSyncError = e.into();
        assert!(err.to_string().starts_with("Invalid URL"), "{}", err);
    }
}
