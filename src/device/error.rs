use thiserror::Error;

use crate::backend::BackendError;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("device `{0}` not found")]
    NotFound(String),
    #[error("history entry `{0}` not found")]
    EntryNotFound(String),
    #[error("device `{0}` is offline and cannot be controlled")]
    NotControllable(String),
    #[error("device `{0}` is not a lock")]
    NotALock(String),
    #[error("device `{0}` is not a {1}")]
    WrongKind(String, String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}
