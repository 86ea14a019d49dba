use thiserror::Error;

#[derive(Error, Debug)]
pub enum BroadcasterError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Broken connection: {0}")]
    BrokenConnection(#[source] std::io::Error),

    #[error("Session closed")]
    SessionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Broadcaster already running")]
    AlreadyRunning,
}

impl BroadcasterError {
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BroadcasterError>;
