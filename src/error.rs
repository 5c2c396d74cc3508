// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Failure kinds a request can hit while being handled. Every variant is
//! recovered locally by the worker: it either maps to an error response for
//! the client or to a silent abort of the exchange.

use thiserror::Error;

use crate::response::Status;

#[derive(Debug, Error)]
pub enum HandlerError {
    /// Malformed request line/headers, or the request headers never fit the
    /// read buffer.
    #[error("malformed request")]
    Protocol,
    /// Parsed fine but is not something we forward (non-GET, missing host or
    /// path).
    #[error("unsupported request")]
    Unsupported,
    #[error("upstream resolution failed: {0}")]
    Resolution(#[source] std::io::Error),
    #[error("upstream connect failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("upstream i/o failed: {0}")]
    UpstreamIo(#[source] std::io::Error),
    /// The client went away mid-exchange. Never answered; there is nobody
    /// left to answer to.
    #[error("client i/o failed: {0}")]
    ClientIo(#[source] std::io::Error),
}

impl HandlerError {
    /// The status to report to the client, or `None` when the failure is
    /// absorbed silently. `UpstreamIo` is only reportable while nothing has
    /// been forwarded yet; the handler enforces that part.
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::Protocol => Some(Status::BadRequest),
            Self::Unsupported => Some(Status::NotImplemented),
            Self::Resolution(_) | Self::Connect(_) | Self::UpstreamIo(_) => {
                Some(Status::InternalServerError)
            }
            Self::ClientIo(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(HandlerError::Protocol.status(), Some(Status::BadRequest));
        assert_eq!(
            HandlerError::Unsupported.status(),
            Some(Status::NotImplemented)
        );
        let io = || std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(
            HandlerError::Resolution(io()).status(),
            Some(Status::InternalServerError)
        );
        assert_eq!(
            HandlerError::Connect(io()).status(),
            Some(Status::InternalServerError)
        );
        assert_eq!(HandlerError::ClientIo(io()).status(), None);
    }
}
