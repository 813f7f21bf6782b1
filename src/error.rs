use std::path::PathBuf;

pub type ComposeResult<T> = Result<T, ComposeError>;

#[derive(thiserror::Error, Debug)]
pub enum ComposeError {
    #[error("failed to decode image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode image {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write manifest: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ComposeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
