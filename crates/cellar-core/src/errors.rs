use cellar_components::ComponentError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Msg(String),

    #[error(transparent)]
    Component(#[from] ComponentError),

    #[error("environment `{0}` has an empty path, refusing to delete")]
    EmptyDestructivePath(String),

    #[error("manifest step {index} failed: {source}")]
    ManifestStep {
        index: usize,
        #[source]
        source: Box<CoreError>,
    },

    #[error("cannot set `{key}`: {reason}")]
    InvalidField { key: String, reason: String },

    #[error("unknown preset `{0}`")]
    UnknownPreset(String),

    #[error("environment `{0}` already exists")]
    EnvironmentExists(String),

    #[error("unknown environment `{0}`")]
    UnknownEnvironment(String),

    #[error("no runner is installed")]
    NoRunnerAvailable,

    #[error("no terminal emulator found")]
    NoTerminal,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Net(#[from] reqwest::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CoreError {
    /// The component-layer error underneath, if any.
    pub fn component(&self) -> Option<&ComponentError> {
        match self {
            CoreError::Component(e) => Some(e),
            CoreError::ManifestStep { source, .. } => source.component(),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(e: anyhow::Error) -> Self {
        CoreError::Msg(format!("{e:#}"))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
