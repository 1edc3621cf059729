use std::path::PathBuf;

/// Result for the app shell, where every error ends up printed to the user.
pub type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(thiserror::Error, Debug)]
pub enum SpeechError {
    #[error("nothing to say: text is empty")]
    EmptyText,

    #[error("no speech engine is initialized")]
    EngineUnavailable,

    #[error("speech is already playing")]
    AlreadyPlaying,

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("failed to run speech engine: {0}")]
    Spawn(#[from] std::io::Error),
}

impl SpeechError {
    /// Rejections of a `speak` call, as opposed to failures mid-utterance.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::EmptyText | Self::EngineUnavailable | Self::AlreadyPlaying
        )
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("failed to decode image '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("video probe failed: {0}")]
    Probe(String),

    #[error("ffmpeg is required for video depth sources, but was not found on PATH")]
    FfmpegMissing,

    #[error("source i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum LogError {
    #[error("log i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid log date '{0}', expected YYYY-MM-DD")]
    BadDate(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value: {0}")]
    Invalid(String),
}
