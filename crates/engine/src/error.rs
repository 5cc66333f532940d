//! The module contains the errors the engine can return.
//!
//! The errors fall in three families:
//!
//! - validation errors ([`KeyNotFound`], [`IndexOutOfBounds`],
//!   [`InvalidField`], [`InvalidAmount`]): the caller broke an id or index
//!   invariant. They are never expected at runtime.
//! - [`Persistence`]: the backend failed. Always recoverable, the session is
//!   left as it was before the call.
//! - [`StateConflict`]: a reload or save was requested while another one is
//!   in flight.
//!
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`IndexOutOfBounds`]: EngineError::IndexOutOfBounds
//!  [`InvalidField`]: EngineError::InvalidField
//!  [`InvalidAmount`]: EngineError::InvalidAmount
//!  [`Persistence`]: EngineError::Persistence
//!  [`StateConflict`]: EngineError::StateConflict
use thiserror::Error;

use crate::persistence::PersistenceError;

/// Engine custom errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("Index out of bounds: {0}")]
    IndexOutOfBounds(String),
    #[error("Invalid field: {0}")]
    InvalidField(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("State conflict: {0}")]
    StateConflict(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl EngineError {
    /// Returns `true` for errors caused by the caller passing an unknown id,
    /// an out of range index or a field the record does not have.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::KeyNotFound(_)
                | Self::IndexOutOfBounds(_)
                | Self::InvalidField(_)
                | Self::InvalidAmount(_)
        )
    }
}
