// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Minimal HTTP/1.1 framing for IPP.
//
// IPP rides on HTTP POST with an `application/ipp` body (RFC 8010 §3); PPD
// files come back from a conditional GET.  Each connection carries exactly
// one exchange (`Connection: close`), so we only need to write one request
// and read one response: status line, headers, then a body delimited by
// Content-Length, chunked transfer coding, or end of stream.

use std::io::{self, BufRead, Read, Write};

use chrono::{DateTime, Utc};

use spoolgate_core::types::StatusCode;

use crate::codec::RequestBody;

/// Longest status or header line we accept.
const MAX_LINE_BYTES: u64 = 16 * 1024;

/// Maximum number of response headers.
const MAX_HEADERS: usize = 128;

const USER_AGENT: &str = concat!("spoolgate/", env!("CARGO_PKG_VERSION"));

/// Status line and headers of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

impl HttpResponseHead {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.header("last-modified").and_then(parse_http_date)
    }

    /// Responses that never carry a body (RFC 9112 §6.3).
    fn has_no_body(&self) -> bool {
        (100..200).contains(&self.status) || self.status == 204 || self.status == 304
    }
}

/// Write an IPP POST request, streaming `body` after the headers.
pub fn write_ipp_post<W: Write>(
    w: &mut W,
    host: &str,
    resource: &str,
    body: &mut RequestBody,
) -> io::Result<()> {
    write!(
        w,
        "POST {resource} HTTP/1.1\r\n\
         Host: {host}\r\n\
         User-Agent: {USER_AGENT}\r\n\
         Content-Type: application/ipp\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        body.len()
    )?;
    body.write_to(w)?;
    w.flush()
}

/// Write a GET request, conditional when `if_modified_since` is set.
pub fn write_get<W: Write>(
    w: &mut W,
    host: &str,
    resource: &str,
    if_modified_since: Option<DateTime<Utc>>,
) -> io::Result<()> {
    write!(
        w,
        "GET {resource} HTTP/1.1\r\n\
         Host: {host}\r\n\
         User-Agent: {USER_AGENT}\r\n\
         Connection: close\r\n"
    )?;
    if let Some(since) = if_modified_since {
        write!(w, "If-Modified-Since: {}\r\n", format_http_date(since))?;
    }
    w.write_all(b"\r\n")?;
    w.flush()
}

/// Write the OPTIONS request asking the server to switch to TLS (RFC 2817).
pub fn write_tls_upgrade<W: Write>(w: &mut W, host: &str) -> io::Result<()> {
    write!(
        w,
        "OPTIONS * HTTP/1.1\r\n\
         Host: {host}\r\n\
         User-Agent: {USER_AGENT}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: TLS/1.2,TLS/1.1,TLS/1.0\r\n\
         \r\n"
    )?;
    w.flush()
}

/// Read the status line and headers.
pub fn read_head<R: BufRead>(r: &mut R) -> io::Result<HttpResponseHead> {
    let status_line = read_line(r)?;
    if status_line.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "server closed the connection without a response",
        ));
    }

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(invalid(format!("bad status line: {status_line}")));
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| invalid(format!("bad status code in: {status_line}")))?;
    let reason = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let line = read_line(r)?;
        if line.is_empty() {
            break;
        }
        if headers.len() == MAX_HEADERS {
            return Err(invalid("too many response headers".to_string()));
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| invalid(format!("malformed header: {line}")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(HttpResponseHead {
        status,
        reason,
        headers,
    })
}

/// Copy the response body into `sink`, returning the number of bytes.
pub fn read_body<R: BufRead, W: Write + ?Sized>(
    r: &mut R,
    head: &HttpResponseHead,
    sink: &mut W,
) -> io::Result<u64> {
    if head.has_no_body() {
        return Ok(0);
    }
    if head.is_chunked() {
        return read_chunked(r, sink);
    }
    match head.content_length() {
        Some(len) => {
            let copied = io::copy(&mut r.by_ref().take(len), sink)?;
            if copied < len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("body ended after {copied} of {len} bytes"),
                ));
            }
            Ok(copied)
        }
        None => io::copy(r, sink),
    }
}

/// As [`read_body`], failing with `InvalidData` once the body would exceed
/// `limit` bytes.  A declared `Content-Length` over the limit fails before
/// anything is read.
pub fn read_body_capped<R: BufRead, W: Write + ?Sized>(
    r: &mut R,
    head: &HttpResponseHead,
    sink: &mut W,
    limit: u64,
) -> io::Result<u64> {
    if let Some(len) = head.content_length().filter(|&len| len > limit) {
        return Err(too_large(len, limit));
    }
    read_body(
        r,
        head,
        &mut CappedWriter {
            inner: sink,
            remaining: limit,
            limit,
        },
    )
}

struct CappedWriter<'a, W: ?Sized> {
    inner: &'a mut W,
    remaining: u64,
    limit: u64,
}

impl<W: Write + ?Sized> Write for CappedWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() as u64 > self.remaining {
            return Err(too_large(self.limit - self.remaining + buf.len() as u64, self.limit));
        }
        let n = self.inner.write(buf)?;
        self.remaining -= n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn too_large(len: u64, limit: u64) -> io::Error {
    invalid(format!("reply body of {len} bytes exceeds the {limit} byte limit"))
}

fn read_chunked<R: BufRead, W: Write + ?Sized>(r: &mut R, sink: &mut W) -> io::Result<u64> {
    let mut total = 0u64;
    loop {
        let line = read_line(r)?;
        let size_text = line.split(';').next().unwrap_or_default().trim();
        let size = u64::from_str_radix(size_text, 16)
            .map_err(|_| invalid(format!("bad chunk size: {line}")))?;
        if size == 0 {
            // Trailer section ends with an empty line.
            while !read_line(r)?.is_empty() {}
            return Ok(total);
        }
        let copied = io::copy(&mut r.by_ref().take(size), sink)?;
        if copied < size {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated chunk"));
        }
        total += copied;
        if !read_line(r)?.is_empty() {
            return Err(invalid("missing CRLF after chunk".to_string()));
        }
    }
}

/// Read one CRLF- or LF-terminated line without the terminator.
fn read_line<R: BufRead>(r: &mut R) -> io::Result<String> {
    let mut buf = Vec::new();
    r.by_ref().take(MAX_LINE_BYTES).read_until(b'\n', &mut buf)?;
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() as u64 == MAX_LINE_BYTES {
        return Err(invalid("header line too long".to_string()));
    }
    String::from_utf8(buf).map_err(|_| invalid("header line is not UTF-8".to_string()))
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

/// IPP status a CUPS client reports for an HTTP failure status, or `None`
/// when the HTTP status has no application-level meaning.
pub fn ipp_status_for_http(status: u16) -> Option<StatusCode> {
    let code = match status {
        400 => StatusCode::CLIENT_ERROR_BAD_REQUEST,
        401 => StatusCode::CLIENT_ERROR_NOT_AUTHENTICATED,
        403 => StatusCode::CLIENT_ERROR_FORBIDDEN,
        404 | 410 => StatusCode::CLIENT_ERROR_NOT_FOUND,
        408 => StatusCode::CLIENT_ERROR_TIMEOUT,
        500 => StatusCode::SERVER_ERROR_INTERNAL,
        501 => StatusCode::SERVER_ERROR_OPERATION_NOT_SUPPORTED,
        502..=504 => StatusCode::SERVER_ERROR_SERVICE_UNAVAILABLE,
        _ => return None,
    };
    Some(code)
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
