use thiserror::Error;

#[derive(Error, Debug)]
pub enum LanlinkError {
    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Discovery reply is not a TCP port: {0}")]
    InvalidDiscoveryReply(String),

    #[error("Discovery client already started")]
    AlreadyStarted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LanlinkError>;
