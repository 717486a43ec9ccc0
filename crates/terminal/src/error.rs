use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("working directory does not exist: {0}")]
    InvalidWorkingDir(String),

    #[error("resume id is not a bare UUID: {0}")]
    InvalidResumeId(String),

    #[error("multiplexer session not found: {0}")]
    SessionNotFound(String),

    #[error("multiplexer unavailable: {0}")]
    MultiplexerUnavailable(String),

    #[error("multiplexer command failed: {0}")]
    CommandFailed(String),

    #[error("pty error: {0}")]
    Pty(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TerminalResult<T> = Result<T, TerminalError>;
