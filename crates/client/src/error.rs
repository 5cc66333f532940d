use engine::PersistenceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    /// Maps a non-success HTTP status and its error message.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict(message),
            400 | 422 => Self::Validation(message),
            _ => Self::Server(message),
        }
    }
}

impl From<ClientError> for PersistenceError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Unauthorized
            | ClientError::Forbidden
            | ClientError::NotFound
            | ClientError::Conflict(_)
            | ClientError::Validation(_) => PersistenceError::Rejected(err.to_string()),
            ClientError::Server(_) | ClientError::InvalidUrl(_) => {
                PersistenceError::Unavailable(err.to_string())
            }
            ClientError::Transport(ref inner) if inner.is_decode() => {
                PersistenceError::Malformed(err.to_string())
            }
            ClientError::Transport(_) => PersistenceError::Unavailable(err.to_string()),
        }
    }
}
