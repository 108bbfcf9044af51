use std::error::Error as StdError;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use realtime::auth::AuthError;

pub type Result<T> = core::result::Result<T, Error>;

/// Web-layer error. Authentication failures are deliberately collapsed to
/// a generic rejection on the wire; which check failed is never leaked to
/// the client.
#[derive(Debug)]
pub enum Error {
    Auth(AuthError),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{self:?}")
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Auth(e) => Some(e),
            Error::Io(e) => Some(e),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            // Same body for both auth variants: no probing which field failed
            Error::Auth(_) => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            Error::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
            }
        }
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Error::Auth(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
