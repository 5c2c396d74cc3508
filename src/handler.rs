// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Per-request lifecycle: read the request, try the cache, and on a miss
//! fetch from the origin while teeing the response to the client and a
//! capture buffer for insertion.
//!
//! Every failure is converted here into an error response or a silent abort;
//! nothing propagates past the worker. An error response is only sent while
//! the response stream is still untouched — once upstream bytes have been
//! forwarded the exchange can only be abandoned.

use bytes::BytesMut;

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Instant;

use crate::cache::Cache;
use crate::config::ProxyConfig;
use crate::error::HandlerError;
use crate::pool::ConnectionPool;
use crate::protocol::{self, ParsedRequest};
use crate::response::{self, SERVER_TOKEN};
use crate::stats::Stats;

pub fn handle(
    mut session: TcpStream,
    cache: &Cache,
    pool: &ConnectionPool,
    stats: &Stats,
    config: &ProxyConfig,
) {
    let started = Instant::now();
    let mut served: u64 = 0;

    if let Err(e) = serve(&mut session, cache, pool, config, &mut served) {
        debug!("request failed: {}", e);
        if served == 0 {
            if let Some(status) = e.status() {
                response::send_error(&mut session, status);
            }
        }
    }

    stats.record_request(served, started.elapsed());
    let _ = session.shutdown(Shutdown::Both);
}

fn serve(
    session: &mut TcpStream,
    cache: &Cache,
    pool: &ConnectionPool,
    config: &ProxyConfig,
    served: &mut u64,
) -> Result<(), HandlerError> {
    let buffer_size = config.sockio().buffer_size();

    let raw = read_request(session, buffer_size)?;

    // the raw request bytes are the cache key, byte-for-byte
    let parsed = protocol::parse(&raw);

    if let Some(body) = cache.lookup(&raw) {
        trace!("cache hit ({} bytes)", body.len());
        return stream_cached(session, &body, buffer_size, served);
    }

    let request = parsed.map_err(|_| HandlerError::Protocol)?;

    let host = match request.host.as_deref() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => return Err(HandlerError::Unsupported),
    };
    if request.method != "GET" || request.path.is_empty() {
        return Err(HandlerError::Unsupported);
    }
    let port: u16 = match request.port.as_deref() {
        Some(port) => port.parse().map_err(|_| {
            HandlerError::Connect(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "invalid upstream port",
            ))
        })?,
        None => 80,
    };

    let mut upstream = match pool.acquire(&host, port) {
        Some(stream) => stream,
        None => connect_upstream(&host, port, config)?,
    };

    let head = build_upstream_request(&request);
    upstream
        .write_all(&head)
        .map_err(HandlerError::UpstreamIo)?;

    // tee the response: forward each chunk to the client first, then append
    // it to the capture buffer as long as it still fits the entry ceiling
    let max_entry_bytes = config.cache().max_entry_bytes();
    let mut chunk = vec![0u8; buffer_size];
    let mut captured: Vec<u8> = Vec::new();
    let mut oversize = false;
    let mut clean = true;

    loop {
        let n = match upstream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                if *served == 0 {
                    return Err(HandlerError::UpstreamIo(e));
                }
                // mid-stream upstream failure: keep what was forwarded,
                // the socket is not reusable
                debug!("upstream read failed mid-stream: {}", e);
                clean = false;
                break;
            }
        };

        session
            .write_all(&chunk[..n])
            .map_err(HandlerError::ClientIo)?;
        *served += n as u64;

        if !oversize {
            if captured.len() + n <= max_entry_bytes {
                captured.extend_from_slice(&chunk[..n]);
            } else {
                oversize = true;
                captured = Vec::new();
            }
        }
    }

    if !oversize && !captured.is_empty() {
        cache.insert(&raw, captured);
    }

    if clean {
        pool.release(upstream, &host, port);
    }

    Ok(())
}

/// Accumulates client bytes until the end of the request headers. The
/// request must fit within `limit - 1` bytes; anything else is a protocol
/// error, as is the peer disappearing first.
fn read_request(session: &mut TcpStream, limit: usize) -> Result<BytesMut, HandlerError> {
    let mut buf = BytesMut::with_capacity(limit);
    let mut chunk = vec![0u8; limit];

    loop {
        if find_header_end(&buf).is_some() {
            return Ok(buf);
        }
        let remaining = limit - 1 - buf.len();
        if remaining == 0 {
            return Err(HandlerError::Protocol);
        }
        match session.read(&mut chunk[..remaining]) {
            Ok(0) => return Err(HandlerError::Protocol),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(_) => return Err(HandlerError::Protocol),
        }
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn stream_cached(
    session: &mut TcpStream,
    body: &[u8],
    chunk_size: usize,
    served: &mut u64,
) -> Result<(), HandlerError> {
    for piece in body.chunks(chunk_size) {
        session.write_all(piece).map_err(HandlerError::ClientIo)?;
        *served += piece.len() as u64;
    }
    Ok(())
}

fn connect_upstream(
    host: &str,
    port: u16,
    config: &ProxyConfig,
) -> Result<TcpStream, HandlerError> {
    let timeout = config.upstream().connect_timeout();
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(HandlerError::Resolution)?
        .collect();

    let mut last_error = std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "host resolved to no addresses",
    );
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                let _ = socket2::SockRef::from(&stream).set_keepalive(true);
                return Ok(stream);
            }
            Err(e) => last_error = e,
        }
    }
    Err(HandlerError::Connect(last_error))
}

/// Rebuilds the request for the origin: a fresh request line and hop headers
/// followed by the client's own headers.
fn build_upstream_request(request: &ParsedRequest) -> BytesMut {
    let mut buf = BytesMut::with_capacity(512);
    buf.extend_from_slice(
        format!(
            "GET {} {}\r\nHost: {}\r\nConnection: keep-alive\r\nUser-Agent: {}\r\n",
            request.path,
            request.version,
            request.host.as_deref().unwrap_or_default(),
            SERVER_TOKEN,
        )
        .as_bytes(),
    );
    request.unparse_headers(&mut buf);
    buf.extend_from_slice(b"\r\n");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_end_detection() {
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n\r\n"), Some(14));
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n"), None);
        assert_eq!(find_header_end(b""), None);
    }

    #[test]
    fn upstream_request_layout() {
        let request = protocol::parse(
            b"GET http://example.com/page HTTP/1.1\r\nAccept: */*\r\n\r\n",
        )
        .unwrap();
        let head = build_upstream_request(&request);
        let text = std::str::from_utf8(&head).unwrap();

        assert!(text.starts_with("GET /page HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.com\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.contains(&format!("User-Agent: {}\r\n", SERVER_TOKEN)));
        assert!(text.contains("Accept: */*\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
