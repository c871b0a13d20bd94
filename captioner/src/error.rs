use std::path::PathBuf;

/// All errors that can abort a captioner job.
///
/// Missing branding assets are not errors; they surface as
/// [`Warning`](crate::types::Warning)s on the render report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("source video not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("could not read source video: {0}")]
    Probe(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("model not found: {path}")]
    ModelNotFound { path: PathBuf },

    #[error("model download failed: {0}")]
    ModelDownload(String),

    #[error("audio decoding error: {0}")]
    AudioDecode(String),

    #[error("unsupported language: \"{0}\"; use Language::supported() to list valid codes")]
    UnsupportedLanguage(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("whisper error: {0}")]
    Whisper(#[from] whisper_rs::WhisperError),

    #[error("caption rendering failed: {0}")]
    CaptionRender(String),

    #[error("logo rendering failed: {0}")]
    LogoRender(String),

    #[error("{tool} not found; install with: apt install ffmpeg")]
    ToolNotFound { tool: String },

    #[error("{tool} is missing the {capability} filter; rebuild it with libfreetype")]
    MissingCapability { tool: String, capability: String },

    #[error("export failed: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_source_not_found() {
        let e = Error::SourceNotFound {
            path: PathBuf::from("/tmp/upload.mp4"),
        };
        assert!(e.to_string().contains("/tmp/upload.mp4"));
    }

    #[test]
    fn test_caption_and_export_failures_are_distinguishable() {
        let caption = Error::CaptionRender("bad timing".into());
        let export = Error::Export("ffmpeg exited with 1".into());
        assert!(caption.to_string().starts_with("caption rendering failed"));
        assert!(export.to_string().starts_with("export failed"));
    }

    #[test]
    fn test_error_display_missing_capability() {
        let e = Error::MissingCapability {
            tool: "ffmpeg".into(),
            capability: "drawtext".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("drawtext"));
        assert!(msg.contains("libfreetype"));
    }

    #[test]
    fn test_error_display_unsupported_language() {
        let e = Error::UnsupportedLanguage("klingon".into());
        let msg = e.to_string();
        assert!(msg.contains("klingon"));
        assert!(msg.contains("Language::supported()"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<String>("invalid json").unwrap_err();
        let e: Error = json_err.into();
        assert!(matches!(e, Error::Json(_)));
    }
}
