use std::path::PathBuf;

pub type BeatshadeResult<T> = Result<T, BeatshadeError>;

#[derive(thiserror::Error, Debug)]
pub enum BeatshadeError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("missing input: {kind} '{}' not found", path.display())]
    MissingInput { kind: &'static str, path: PathBuf },

    #[error("engine failed ({status}): {stderr}")]
    EngineExecution { status: String, stderr: String },

    #[error("failed to launch '{program}': {message}")]
    Launch { program: String, message: String },

    #[error("probe error: {0}")]
    Probe(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BeatshadeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn missing_input(kind: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::MissingInput {
            kind,
            path: path.into(),
        }
    }

    pub fn engine(status: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::EngineExecution {
            status: status.into(),
            stderr: stderr.into(),
        }
    }

    pub fn launch(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Launch {
            program: program.into(),
            message: message.into(),
        }
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }
}
