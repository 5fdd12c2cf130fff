use anyhow::{anyhow, Context};
use serde_json::json;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Not found")]
    NotFound,

    #[error("Already reported")]
    AlreadyReported,

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Text is empty")]
    EmptyText,
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::AlreadyReported => StatusCode::CONFLICT,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::EmptyText => StatusCode::BAD_REQUEST,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::Unauthenticated => json!({
                "message": "not authenticated",
                "type": "unauthenticated",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::NotFound => json!({
                "message": "not found",
                "type": "not-found",
            }),
            Error::AlreadyReported => json!({
                "message": "already reported",
                "type": "already-reported",
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::EmptyText => json!({
                "message": "text is empty",
                "type": "empty-text",
            }),
        })
        .unwrap_or_default()
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(String::from(
                    data.get("message")
                        .and_then(|msg| msg.as_str())
                        .unwrap_or(""),
                )),
                "unauthenticated" => Error::Unauthenticated,
                "permission-denied" => Error::PermissionDenied,
                "not-found" => Error::NotFound,
                "already-reported" => Error::AlreadyReported,
                "null-byte" => Error::NullByteInString(String::from(
                    data.get("string").and_then(|s| s.as_str()).ok_or_else(|| {
                        anyhow!("error is a null-byte-in-string without a string")
                    })?,
                )),
                "empty-text" => Error::EmptyText,
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_byte_error_keeps_its_string() {
        let err = Error::NullByteInString(String::from("a\0b"));
        assert_eq!(Error::parse(&err.contents()).unwrap(), err);
    }

    #[test]
    fn unknown_without_message_parses() {
        assert_eq!(
            Error::parse(br#"{"type":"unknown"}"#).unwrap(),
            Error::Unknown(String::new())
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(Error::parse(br#"{"type":"teapot"}"#).is_err());
        assert!(Error::parse(b"not json").is_err());
    }

    #[test]
    fn already_reported_is_a_conflict() {
        assert_eq!(
            Error::AlreadyReported.status_code(),
            http::StatusCode::CONFLICT
        );
    }
}
