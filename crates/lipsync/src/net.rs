//! Clip fetching
//!
//! A single best-effort HTTP GET: no retries, no timeout, no extra headers.

use std::time::Duration;

use crate::error::Result;

/// Body and content type of a fetched clip
#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// GET `url` and read the whole body.
///
/// The status code is not checked: an error page comes back as bytes and
/// fails later, at decode.
pub fn fetch(url: &str) -> Result<Fetched> {
    let client = reqwest::blocking::Client::builder()
        .timeout(None::<Duration>)
        .build()?;
    let response = client.get(url).send()?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let bytes = response.bytes()?.to_vec();
    Ok(Fetched {
        bytes,
        content_type,
    })
}

/// Detect a format hint from content-type and/or URL extension
pub fn detect_format_hint(url: &str, content_type: Option<&str>) -> Option<String> {
    // Content-type takes priority
    if let Some(ct) = content_type {
        let ct_lower = ct.to_lowercase();
        if ct_lower.contains("audio/mpeg") || ct_lower.contains("audio/mp3") {
            return Some("mp3".to_string());
        }
        if ct_lower.contains("audio/aac") || ct_lower.contains("audio/aacp") {
            return Some("aac".to_string());
        }
        if ct_lower.contains("audio/ogg") || ct_lower.contains("application/ogg") {
            return Some("ogg".to_string());
        }
        if ct_lower.contains("audio/flac") {
            return Some("flac".to_string());
        }
        if ct_lower.contains("audio/wav")
            || ct_lower.contains("audio/x-wav")
            || ct_lower.contains("audio/wave")
        {
            return Some("wav".to_string());
        }
        if ct_lower.contains("audio/mp4") || ct_lower.contains("audio/x-m4a") {
            return Some("m4a".to_string());
        }
    }

    // Fallback to URL extension
    let lower = url.to_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    let file = path.rsplit('/').next().unwrap_or(path);
    if let Some((_, ext)) = file.rsplit_once('.') {
        match ext {
            "mp3" => return Some("mp3".to_string()),
            "aac" | "adts" => return Some("aac".to_string()),
            "ogg" | "oga" => return Some("ogg".to_string()),
            "flac" => return Some("flac".to_string()),
            "wav" | "wave" => return Some("wav".to_string()),
            "m4a" | "mp4" => return Some("m4a".to_string()),
            _ => {}
        }
    }

    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one HTTP response on a loopback port; returns the URL
    pub(crate) fn serve_once(content_type: &str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let content_type = content_type.to_string();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 4096];
                let _ = stream.read(&mut request);
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    content_type,
                    body.len()
                );
                let _ = stream.write_all(header.as_bytes());
                let _ = stream.write_all(&body);
            }
        });
        format!("http://{}/clip", addr)
    }

    /// A loopback URL nothing is listening on
    pub(crate) fn refused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/clip.mp3", addr)
    }

    // --- fetch ---

    #[test]
    fn fetch_reads_body_and_content_type() {
        let url = serve_once("audio/wav", b"RIFF....".to_vec());
        let fetched = fetch(&url).unwrap();
        assert_eq!(fetched.bytes, b"RIFF....");
        assert_eq!(fetched.content_type.as_deref(), Some("audio/wav"));
    }

    #[test]
    fn fetch_refused_is_network_error() {
        let err = fetch(&refused_url()).unwrap_err();
        assert!(matches!(err, crate::error::LipSyncError::Network(_)));
    }

    #[test]
    fn fetch_invalid_url_is_error() {
        assert!(fetch("not a url").is_err());
    }

    // --- detect_format_hint ---

    #[test]
    fn hint_from_content_type() {
        assert_eq!(
            detect_format_hint("http://example.com/clip", Some("audio/mpeg")),
            Some("mp3".to_string())
        );
        assert_eq!(
            detect_format_hint("http://example.com/clip", Some("audio/ogg; codecs=vorbis")),
            Some("ogg".to_string())
        );
        assert_eq!(
            detect_format_hint("http://example.com/clip", Some("audio/x-wav")),
            Some("wav".to_string())
        );
    }

    #[test]
    fn content_type_beats_extension() {
        assert_eq!(
            detect_format_hint("http://example.com/clip.ogg", Some("audio/mpeg")),
            Some("mp3".to_string())
        );
    }

    #[test]
    fn hint_from_extension() {
        assert_eq!(
            detect_format_hint("http://example.com/voice/line01.WAV", None),
            Some("wav".to_string())
        );
        assert_eq!(
            detect_format_hint("http://example.com/a.m4a?token=abc", None),
            Some("m4a".to_string())
        );
    }

    #[test]
    fn extension_fallback_when_content_type_is_generic() {
        assert_eq!(
            detect_format_hint("http://example.com/a.flac", Some("application/octet-stream")),
            Some("flac".to_string())
        );
    }

    #[test]
    fn no_hint_without_extension() {
        assert_eq!(detect_format_hint("http://example.com/clip", None), None);
        assert_eq!(detect_format_hint("http://example.com.mp3/clip", None), None);
    }
}
