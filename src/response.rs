// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Canned HTTP error responses. Each is a complete HTTP/1.1 message with a
//! small HTML body; write failures are deliberately ignored since the client
//! is being turned away regardless.

use std::io::Write;
use std::net::TcpStream;
use std::time::SystemTime;

/// Sent as the `Server` header here and as the `User-Agent` on forwarded
/// requests.
pub const SERVER_TOKEN: &str = concat!("hoard/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    BadRequest,
    Forbidden,
    NotFound,
    InternalServerError,
    NotImplemented,
    ServiceUnavailable,
    VersionNotSupported,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::InternalServerError => 500,
            Self::NotImplemented => 501,
            Self::ServiceUnavailable => 503,
            Self::VersionNotSupported => 505,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::BadRequest => "Bad Request",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::InternalServerError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
            Self::ServiceUnavailable => "Service Unavailable",
            Self::VersionNotSupported => "HTTP Version Not Supported",
        }
    }

    fn body(&self) -> &'static str {
        match self {
            Self::BadRequest => {
                "<HTML><HEAD><TITLE>400 Bad Request</TITLE></HEAD>\n<BODY><H1>400 Bad Request</H1>\n</BODY></HTML>"
            }
            Self::Forbidden => {
                "<HTML><HEAD><TITLE>403 Forbidden</TITLE></HEAD>\n<BODY><H1>403 Forbidden</H1><br>Permission Denied\n</BODY></HTML>"
            }
            Self::NotFound => {
                "<HTML><HEAD><TITLE>404 Not Found</TITLE></HEAD>\n<BODY><H1>404 Not Found</H1>\n</BODY></HTML>"
            }
            Self::InternalServerError => {
                "<HTML><HEAD><TITLE>500 Internal Server Error</TITLE></HEAD>\n<BODY><H1>500 Internal Server Error</H1>\n</BODY></HTML>"
            }
            Self::NotImplemented => {
                "<HTML><HEAD><TITLE>501 Not Implemented</TITLE></HEAD>\n<BODY><H1>501 Not Implemented</H1>\n</BODY></HTML>"
            }
            Self::ServiceUnavailable => {
                "<HTML><HEAD><TITLE>503 Service Unavailable</TITLE></HEAD>\n<BODY><H1>503 Service Unavailable</H1>\n</BODY></HTML>"
            }
            Self::VersionNotSupported => {
                "<HTML><HEAD><TITLE>505 HTTP Version Not Supported</TITLE></HEAD>\n<BODY><H1>505 HTTP Version Not Supported</H1>\n</BODY></HTML>"
            }
        }
    }
}

/// Renders the full wire form of an error response.
pub fn render(status: Status) -> Vec<u8> {
    let body = status.body();
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Length: {}\r\n\
         Content-Type: text/html\r\n\
         Connection: keep-alive\r\n\
         Date: {}\r\n\
         Server: {}\r\n\
         \r\n{}",
        status.code(),
        status.reason(),
        body.len(),
        httpdate::fmt_http_date(SystemTime::now()),
        SERVER_TOKEN,
        body,
    )
    .into_bytes()
}

pub fn send_error(session: &mut TcpStream, status: Status) {
    let _ = session.write_all(&render(status));
}
