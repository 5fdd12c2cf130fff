use crate::api;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("no authenticated user")]
    Unauthenticated,

    #[error("target not found")]
    NotFound,

    #[error("parent comment not found")]
    ParentNotFound,

    #[error("permission denied")]
    Forbidden,

    #[error("already reported")]
    AlreadyReported,

    #[error("another action of this kind is already in flight")]
    ConcurrentActionInProgress,

    #[error("invalid text: {0}")]
    InvalidText(api::Error),

    #[error("confirmation was dropped before completing")]
    Cancelled,

    #[error("service error: {0}")]
    Service(api::Error),
}

impl From<api::Error> for Error {
    fn from(e: api::Error) -> Error {
        match e {
            api::Error::Unauthenticated => Error::Unauthenticated,
            api::Error::PermissionDenied => Error::Forbidden,
            api::Error::NotFound => Error::NotFound,
            api::Error::AlreadyReported => Error::AlreadyReported,
            e => Error::Service(e),
        }
    }
}

pub(crate) fn validate_text(text: &str) -> Result<&str, Error> {
    api::validate_text(text).map_err(Error::InvalidText)
}
