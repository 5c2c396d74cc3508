// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! HTTP/1.1 request parsing for the forward-proxy case.
//!
//! Requests arrive either in absolute form (`GET http://host:port/path
//! HTTP/1.1`) or origin form (`GET /path HTTP/1.1` plus a `Host` header).
//! Both are reduced to the same `ParsedRequest`. Parsing is line-oriented;
//! header lines that do not look like `Name: value` are skipped rather than
//! failing the whole request.

use bytes::BytesMut;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    Malformed,
}

#[derive(Debug)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug)]
pub struct ParsedRequest {
    pub method: String,
    pub host: Option<String>,
    pub port: Option<String>,
    pub path: String,
    pub version: String,
    headers: Vec<Header>,
}

impl ParsedRequest {
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Serializes the retained client headers as `Name: value\r\n` lines,
    /// appending to `buf`. Returns the number of bytes written.
    pub fn unparse_headers(&self, buf: &mut BytesMut) -> usize {
        let before = buf.len();
        for header in &self.headers {
            buf.extend_from_slice(format!("{}: {}\r\n", header.name, header.value).as_bytes());
        }
        buf.len() - before
    }
}

pub fn parse(buf: &[u8]) -> Result<ParsedRequest, ParseError> {
    let text = std::str::from_utf8(buf).map_err(|_| ParseError::Malformed)?;

    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or(ParseError::Malformed)?;

    let (method, rest) = request_line.split_once(' ').ok_or(ParseError::Malformed)?;
    let (url, version) = rest.split_once(' ').ok_or(ParseError::Malformed)?;

    let (mut host, mut port, path) = split_url(url);

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push(Header {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            });
        }
    }

    // origin-form requests carry the authority in the Host header
    if host.is_none() {
        if let Some(header) = headers.iter().find(|h| h.name.eq_ignore_ascii_case("Host")) {
            match header.value.split_once(':') {
                Some((h, p)) => {
                    host = Some(h.to_string());
                    port = Some(p.to_string());
                }
                None => host = Some(header.value.clone()),
            }
        }
    }

    Ok(ParsedRequest {
        method: method.to_string(),
        host,
        port,
        path,
        version: version.to_string(),
        headers,
    })
}

/// Splits a request-target into `(host, port, path)`. Absolute-form targets
/// yield their authority parts; anything else is treated as a bare path.
fn split_url(url: &str) -> (Option<String>, Option<String>, String) {
    match url.strip_prefix("http://") {
        Some(rest) => {
            let (authority, path) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => (rest, "/"),
            };
            match authority.split_once(':') {
                Some((host, port)) => (
                    Some(host.to_string()),
                    Some(port.to_string()),
                    path.to_string(),
                ),
                None => (Some(authority.to_string()), None, path.to_string()),
            }
        }
        None => (None, None, url.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_form() {
        let request =
            parse(b"GET http://example.com/index.html HTTP/1.1\r\nHost: example.com\r\n\r\n")
                .unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.host.as_deref(), Some("example.com"));
        assert_eq!(request.port, None);
        assert_eq!(request.path, "/index.html");
        assert_eq!(request.version, "HTTP/1.1");
    }

    #[test]
    fn absolute_form_with_port() {
        let request = parse(b"GET http://example.com:8080/a/b HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.host.as_deref(), Some("example.com"));
        assert_eq!(request.port.as_deref(), Some("8080"));
        assert_eq!(request.path, "/a/b");
    }

    #[test]
    fn bare_authority_defaults_path_to_root() {
        let request = parse(b"GET http://example.com HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.path, "/");
        let request = parse(b"GET http://example.com/ HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.path, "/");
    }

    #[test]
    fn origin_form_uses_host_header() {
        let request =
            parse(b"GET /index.html HTTP/1.1\r\nHost: example.com:8081\r\n\r\n").unwrap();
        assert_eq!(request.host.as_deref(), Some("example.com"));
        assert_eq!(request.port.as_deref(), Some("8081"));
        assert_eq!(request.path, "/index.html");
    }

    #[test]
    fn origin_form_without_host_header() {
        let request = parse(b"GET /index.html HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.host, None);
        assert_eq!(request.path, "/index.html");
    }

    #[test]
    fn post_parses_with_its_own_method() {
        let request =
            parse(b"POST http://example.com/ HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
        assert_eq!(request.method, "POST");
    }

    #[test]
    fn request_line_without_spaces_is_malformed() {
        assert_eq!(parse(b"GET\r\n\r\n").unwrap_err(), ParseError::Malformed);
        assert_eq!(parse(b"GET /\r\n\r\n").unwrap_err(), ParseError::Malformed);
    }

    #[test]
    fn header_values_are_trimmed_and_lookup_is_case_insensitive() {
        let request = parse(
            b"GET http://example.com/ HTTP/1.1\r\nAccept:   text/html  \r\nuser-agent: curl\r\n\r\n",
        )
        .unwrap();
        assert_eq!(request.get_header("accept"), Some("text/html"));
        assert_eq!(request.get_header("User-Agent"), Some("curl"));
        assert_eq!(request.get_header("missing"), None);
    }

    #[test]
    fn junk_header_lines_are_skipped() {
        let request =
            parse(b"GET http://example.com/ HTTP/1.1\r\nnot a header\r\nAccept: */*\r\n\r\n")
                .unwrap();
        assert_eq!(request.headers().len(), 1);
        assert_eq!(request.get_header("Accept"), Some("*/*"));
    }

    #[test]
    fn unparse_headers_preserves_order() {
        let request =
            parse(b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n")
                .unwrap();
        let mut buf = BytesMut::new();
        let written = request.unparse_headers(&mut buf);
        assert_eq!(&buf[..], b"Host: example.com\r\nAccept: */*\r\n".as_slice());
        assert_eq!(written, buf.len());
    }
}
